//! Canonical regions and the alias table used to resolve source spellings.

use std::{collections::BTreeMap, fmt};

use serde::{Deserialize, Serialize};

/// A canonical reporting region.
///
/// Declaration order defines the sort order of records sharing a date.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Region {
    Scotland,
    Wales,
    NorthWest,
    NorthEast,
    Yorkshire,
    Midlands,
    EastOfEngland,
    London,
    SouthEast,
    SouthWest,
}

impl Region {
    pub const ALL: [Region; 10] = [
        Region::Scotland,
        Region::Wales,
        Region::NorthWest,
        Region::NorthEast,
        Region::Yorkshire,
        Region::Midlands,
        Region::EastOfEngland,
        Region::London,
        Region::SouthEast,
        Region::SouthWest,
    ];

    #[must_use]
    pub fn id(self) -> &'static str {
        match self {
            Region::Scotland => "scotland",
            Region::Wales => "wales",
            Region::NorthWest => "north_west",
            Region::NorthEast => "north_east",
            Region::Yorkshire => "yorkshire",
            Region::Midlands => "midlands",
            Region::EastOfEngland => "east_of_england",
            Region::London => "london",
            Region::SouthEast => "south_east",
            Region::SouthWest => "south_west",
        }
    }

    #[must_use]
    pub fn name(self) -> &'static str {
        match self {
            Region::Scotland => "Scotland",
            Region::Wales => "Wales",
            Region::NorthWest => "North West",
            Region::NorthEast => "North East",
            Region::Yorkshire => "Yorkshire",
            Region::Midlands => "Midlands",
            Region::EastOfEngland => "East of England",
            Region::London => "London",
            Region::SouthEast => "South East",
            Region::SouthWest => "South West",
        }
    }
}

impl fmt::Display for Region {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.id())
    }
}

const BUILTIN_ALIASES: &[(&str, Region)] = &[
    ("scot", Region::Scotland),
    ("scotrail", Region::Scotland),
    ("cymru", Region::Wales),
    ("tfw", Region::Wales),
    ("transport for wales", Region::Wales),
    ("nw", Region::NorthWest),
    ("north west england", Region::NorthWest),
    ("ne", Region::NorthEast),
    ("north east england", Region::NorthEast),
    ("yorks", Region::Yorkshire),
    ("yorkshire and the humber", Region::Yorkshire),
    ("yorkshire & humber", Region::Yorkshire),
    ("east midlands", Region::Midlands),
    ("west midlands", Region::Midlands),
    ("mids", Region::Midlands),
    ("east anglia", Region::EastOfEngland),
    ("eoe", Region::EastOfEngland),
    ("east", Region::EastOfEngland),
    ("greater london", Region::London),
    ("ldn", Region::London),
    ("se", Region::SouthEast),
    ("sw", Region::SouthWest),
];

/// Lookup table from region spellings to canonical regions.
///
/// Keys are compared after folding: ASCII letters and digits are kept and lowercased,
/// everything else is dropped, so `"North-West"`, `"north west"` and `"NORTH_WEST"`
/// all resolve to [`Region::NorthWest`].
///
/// # Examples
///
/// ```
/// use railpulse_dataset::region::{Region, RegionAliases};
///
/// let aliases = RegionAliases::builtin();
/// assert_eq!(aliases.resolve("Yorkshire & Humber"), Some(Region::Yorkshire));
/// assert_eq!(aliases.resolve("Atlantis"), None);
/// ```
#[derive(Debug, Clone)]
pub struct RegionAliases {
    map: BTreeMap<String, Region>,
}

impl Default for RegionAliases {
    fn default() -> Self {
        Self::builtin()
    }
}

impl RegionAliases {
    /// Canonical ids, display names, and the fixed alias list.
    #[must_use]
    pub fn builtin() -> Self {
        let mut map = BTreeMap::new();
        for region in Region::ALL {
            map.insert(fold(region.id()), region);
            map.insert(fold(region.name()), region);
        }
        for (alias, region) in BUILTIN_ALIASES {
            map.insert(fold(alias), *region);
        }
        Self { map }
    }

    /// Built-in aliases extended (and overridden) by `extra`.
    #[must_use]
    pub fn with_extra<'a, I>(extra: I) -> Self
    where
        I: IntoIterator<Item = (&'a String, &'a Region)>,
    {
        let mut aliases = Self::builtin();
        for (alias, region) in extra {
            aliases.map.insert(fold(alias), *region);
        }
        aliases
    }

    #[must_use]
    pub fn resolve(&self, value: &str) -> Option<Region> {
        let key = fold(value);
        if key.is_empty() {
            return None;
        }
        self.map.get(&key).copied()
    }
}

fn fold(value: &str) -> String {
    value
        .chars()
        .filter(char::is_ascii_alphanumeric)
        .map(|c| c.to_ascii_lowercase())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_canonical_ids_and_names_resolve() {
        let aliases = RegionAliases::builtin();
        for region in Region::ALL {
            assert_eq!(aliases.resolve(region.id()), Some(region));
            assert_eq!(aliases.resolve(region.name()), Some(region));
        }
    }

    #[test]
    fn test_folding_ignores_case_and_punctuation() {
        let aliases = RegionAliases::builtin();
        assert_eq!(aliases.resolve("  NORTH-WEST "), Some(Region::NorthWest));
        assert_eq!(aliases.resolve("East_Of_England"), Some(Region::EastOfEngland));
        assert_eq!(aliases.resolve(""), None);
        assert_eq!(aliases.resolve("---"), None);
    }

    #[test]
    fn test_extra_aliases_extend_builtin() {
        let extra = BTreeMap::from([("Anglia Route".to_owned(), Region::EastOfEngland)]);
        let aliases = RegionAliases::with_extra(&extra);
        assert_eq!(aliases.resolve("anglia route"), Some(Region::EastOfEngland));
        assert_eq!(aliases.resolve("scotland"), Some(Region::Scotland));
    }
}
