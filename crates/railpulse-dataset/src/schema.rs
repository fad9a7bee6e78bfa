//! The canonical field catalog shared by every pipeline stage.
//!
//! Every numeric value in a [`MasterRecord`](crate::master::MasterRecord) is keyed by a
//! [`Field`] and has already been converted to the field's canonical [`Unit`] and checked
//! against its valid range.

use std::{collections::BTreeMap, fmt};

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::region::Region;

/// Version of the field catalog. Bumped whenever a field is added or its meaning changes.
pub const SCHEMA_VERSION: u32 = 1;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Field {
    TrainsPlanned,
    PunctualityPct,
    OnTimePct,
    Cancellations,
    CancellationPct,
    DelayMinutesInfrastructure,
    DelayMinutesOperator,
    DelayMinutesWeather,
    DelayMinutesExternal,
    PrecipitationMm,
    WindSpeedKmh,
    StaffAvailabilityPct,
}

impl Field {
    pub const ALL: [Field; 12] = [
        Field::TrainsPlanned,
        Field::PunctualityPct,
        Field::OnTimePct,
        Field::Cancellations,
        Field::CancellationPct,
        Field::DelayMinutesInfrastructure,
        Field::DelayMinutesOperator,
        Field::DelayMinutesWeather,
        Field::DelayMinutesExternal,
        Field::PrecipitationMm,
        Field::WindSpeedKmh,
        Field::StaffAvailabilityPct,
    ];

    #[must_use]
    pub fn id(self) -> &'static str {
        self.spec().id
    }

    /// Looks a field up by its snake_case id.
    #[must_use]
    pub fn from_id(id: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|f| f.id() == id)
    }

    #[must_use]
    pub fn spec(self) -> &'static FieldSpec {
        &FIELD_SPECS[self as usize]
    }
}

impl fmt::Display for Field {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.id())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FieldKind {
    Percentage,
    Count,
    Quantity,
}

/// Units a source column may be declared in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Unit {
    Percent,
    Fraction,
    Count,
    Minutes,
    Hours,
    Millimetres,
    KilometresPerHour,
    MilesPerHour,
}

impl Unit {
    /// Factor converting a value in `self` into `canonical`, if the two are compatible.
    #[must_use]
    pub fn factor_to(self, canonical: Unit) -> Option<f64> {
        const KM_PER_MILE: f64 = 1.609_344;
        match (self, canonical) {
            (a, b) if a == b => Some(1.0),
            (Unit::Fraction, Unit::Percent) => Some(100.0),
            (Unit::Hours, Unit::Minutes) => Some(60.0),
            (Unit::MilesPerHour, Unit::KilometresPerHour) => Some(KM_PER_MILE),
            _ => None,
        }
    }
}

impl fmt::Display for Unit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Unit::Percent => "percent",
            Unit::Fraction => "fraction",
            Unit::Count => "count",
            Unit::Minutes => "minutes",
            Unit::Hours => "hours",
            Unit::Millimetres => "millimetres",
            Unit::KilometresPerHour => "kilometres_per_hour",
            Unit::MilesPerHour => "miles_per_hour",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FieldSpec {
    pub id: &'static str,
    pub kind: FieldKind,
    pub unit: Unit,
    pub nullable: bool,
    pub min: f64,
    pub max: f64,
}

impl FieldSpec {
    #[must_use]
    pub fn contains(&self, value: f64) -> bool {
        value.is_finite() && (self.min..=self.max).contains(&value)
    }

    #[must_use]
    pub fn clamp(&self, value: f64) -> f64 {
        value.clamp(self.min, self.max)
    }
}

const fn percentage(id: &'static str, nullable: bool) -> FieldSpec {
    FieldSpec {
        id,
        kind: FieldKind::Percentage,
        unit: Unit::Percent,
        nullable,
        min: 0.0,
        max: 100.0,
    }
}

const fn count(id: &'static str) -> FieldSpec {
    FieldSpec {
        id,
        kind: FieldKind::Count,
        unit: Unit::Count,
        nullable: true,
        min: 0.0,
        max: 1.0e6,
    }
}

const fn quantity(id: &'static str, unit: Unit, max: f64) -> FieldSpec {
    FieldSpec {
        id,
        kind: FieldKind::Quantity,
        unit,
        nullable: true,
        min: 0.0,
        max,
    }
}

// indexed by `Field as usize`
const FIELD_SPECS: [FieldSpec; 12] = [
    count("trains_planned"),
    percentage("punctuality_pct", false),
    percentage("on_time_pct", true),
    count("cancellations"),
    percentage("cancellation_pct", true),
    quantity("delay_minutes_infrastructure", Unit::Minutes, 1.0e7),
    quantity("delay_minutes_operator", Unit::Minutes, 1.0e7),
    quantity("delay_minutes_weather", Unit::Minutes, 1.0e7),
    quantity("delay_minutes_external", Unit::Minutes, 1.0e7),
    quantity("precipitation_mm", Unit::Millimetres, 500.0),
    quantity("wind_speed_kmh", Unit::KilometresPerHour, 300.0),
    percentage("staff_availability_pct", true),
];

/// Unique identity of a record: one region on one day.
///
/// Ordered by date first, then region, which is the canonical dataset order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct RecordKey {
    pub date: NaiveDate,
    pub region: Region,
}

impl fmt::Display for RecordKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.date, self.region)
    }
}

/// Canonical-unit values of one record. Absent fields are nulls.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct FieldValues(BTreeMap<Field, f64>);

impl FieldValues {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn get(&self, field: Field) -> Option<f64> {
        self.0.get(&field).copied()
    }

    pub fn set(&mut self, field: Field, value: f64) {
        self.0.insert(field, value);
    }

    pub fn remove(&mut self, field: Field) -> Option<f64> {
        self.0.remove(&field)
    }

    pub fn iter(&self) -> impl Iterator<Item = (Field, f64)> + '_ {
        self.0.iter().map(|(f, v)| (*f, *v))
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl FromIterator<(Field, f64)> for FieldValues {
    fn from_iter<T: IntoIterator<Item = (Field, f64)>>(iter: T) -> Self {
        Self(iter.into_iter().collect())
    }
}

#[derive(Debug, Clone, PartialEq, derive_more::Display, derive_more::Error)]
pub enum SchemaViolation {
    #[display("duplicate record key {key}")]
    DuplicateKey { key: RecordKey },
    #[display("{key}: {field} = {value} is outside [{min}, {max}]")]
    OutOfRange {
        key: RecordKey,
        field: Field,
        value: f64,
        min: f64,
        max: f64,
    },
    #[display("{key}: mandatory field {field} is missing")]
    MissingMandatoryField { key: RecordKey, field: Field },
}

/// Checks a merged record against the catalog: ranges for every present value and
/// presence of every non-nullable field.
pub fn validate_record(key: RecordKey, values: &FieldValues) -> Result<(), SchemaViolation> {
    for (field, value) in values.iter() {
        let spec = field.spec();
        if !spec.contains(value) {
            return Err(SchemaViolation::OutOfRange {
                key,
                field,
                value,
                min: spec.min,
                max: spec.max,
            });
        }
    }
    for field in Field::ALL {
        if !field.spec().nullable && values.get(field).is_none() {
            return Err(SchemaViolation::MissingMandatoryField { key, field });
        }
    }
    Ok(())
}
