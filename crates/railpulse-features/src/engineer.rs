//! Builds labelled feature vectors from a master dataset.

use std::collections::BTreeMap;

use railpulse_dataset::{
    master::{MasterDataset, MasterRecord},
    region::Region,
    schema::Field,
};
use serde::{Deserialize, Serialize};

use crate::{
    schema::{FeatureSchema, FeatureSet, FeatureVector, LabelScheme},
    source::{self, BoxedFeatureSource, Lag, RollingMean, RollingStd},
};

/// What to do with a record whose history features cannot be computed.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MissingHistory {
    #[default]
    Drop,
    /// Fill from all strictly earlier values of the region; drop if there are none.
    FillExpandingMean,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FeatureConfig {
    pub lag_days: Vec<u32>,
    pub rolling_windows: Vec<u32>,
    /// Fields the lag and rolling features are computed for.
    pub fields: Vec<Field>,
    pub calendar: bool,
    pub label: LabelScheme,
    pub missing_history: MissingHistory,
}

impl Default for FeatureConfig {
    fn default() -> Self {
        Self {
            lag_days: vec![1, 7, 28],
            rolling_windows: vec![7, 28],
            fields: vec![Field::PunctualityPct, Field::CancellationPct],
            calendar: true,
            label: LabelScheme::default(),
            missing_history: MissingHistory::Drop,
        }
    }
}

#[derive(Debug, Clone, PartialEq, derive_more::Display, derive_more::Error)]
pub enum FeatureError {
    #[display("lag of 0 days would read the record being labelled")]
    ZeroLag,
    #[display("rolling window must cover at least 2 days, got {window}")]
    WindowTooShort { window: u32 },
    #[display("band cutoffs must be finite and strictly ascending, got {cutoffs:?}")]
    UnorderedCutoffs { cutoffs: Vec<f64> },
    #[display("feature configuration produces no features")]
    NoFeatures,
    #[display("feature id {id} is produced twice")]
    DuplicateFeature { id: String },
}

/// Turns master records into feature vectors under one [`FeatureSchema`].
///
/// # Examples
///
/// ```
/// use railpulse_features::engineer::{FeatureConfig, FeatureEngineer};
///
/// let engineer = FeatureEngineer::new(FeatureConfig::default()).unwrap();
/// let names = &engineer.schema().names;
/// assert!(names.contains(&"punctuality_pct_lag_7".to_owned()));
/// assert!(names.contains(&"is_holiday".to_owned()));
/// ```
#[derive(Debug, Clone)]
pub struct FeatureEngineer {
    missing_history: MissingHistory,
    sources: Vec<BoxedFeatureSource>,
    schema: FeatureSchema,
}

impl FeatureEngineer {
    pub fn new(config: FeatureConfig) -> Result<Self, FeatureError> {
        if config.lag_days.contains(&0) {
            return Err(FeatureError::ZeroLag);
        }
        if let Some(&window) = config.rolling_windows.iter().find(|w| **w < 2) {
            return Err(FeatureError::WindowTooShort { window });
        }
        if let LabelScheme::Bands { cutoffs } = &config.label {
            let ordered = cutoffs.iter().all(|c| c.is_finite())
                && cutoffs.windows(2).all(|w| w[0] < w[1]);
            if !ordered {
                return Err(FeatureError::UnorderedCutoffs {
                    cutoffs: cutoffs.clone(),
                });
            }
        }

        let mut sources: Vec<BoxedFeatureSource> = vec![];
        for &field in &config.fields {
            for &days in &config.lag_days {
                sources.push(Box::new(Lag::new(field, days)));
            }
            for &window in &config.rolling_windows {
                sources.push(Box::new(RollingMean::new(field, window)));
                sources.push(Box::new(RollingStd::new(field, window)));
            }
        }
        if config.calendar {
            sources.extend(source::calendar_sources());
        }
        if sources.is_empty() {
            return Err(FeatureError::NoFeatures);
        }

        let names = sources.iter().map(|s| s.id().to_owned()).collect::<Vec<_>>();
        for (i, name) in names.iter().enumerate() {
            if names[..i].contains(name) {
                return Err(FeatureError::DuplicateFeature { id: name.clone() });
            }
        }

        Ok(Self {
            missing_history: config.missing_history,
            sources,
            schema: FeatureSchema::new(names, config.label),
        })
    }

    #[must_use]
    pub fn schema(&self) -> &FeatureSchema {
        &self.schema
    }

    #[must_use]
    pub fn sources(&self) -> &[BoxedFeatureSource] {
        &self.sources
    }

    fn vector_for(&self, record: &MasterRecord, past: &[&MasterRecord]) -> Option<Vec<f64>> {
        self.sources
            .iter()
            .map(|source| {
                source.extract(&record.key, past).or_else(|| match self.missing_history {
                    MissingHistory::Drop => None,
                    MissingHistory::FillExpandingMean => source.fill(&record.key, past),
                })
            })
            .collect()
    }

    /// Builds one labelled vector per record whose features can all be computed.
    ///
    /// The result is sorted by (date, region) and depends only on the dataset and the
    /// configuration.
    #[must_use]
    pub fn build(&self, dataset: &MasterDataset) -> FeatureSet {
        let mut by_region: BTreeMap<Region, Vec<&MasterRecord>> = BTreeMap::new();
        for record in dataset.records() {
            by_region.entry(record.key.region).or_default().push(record);
        }

        let mut vectors = vec![];
        let mut dropped = 0_usize;
        for records in by_region.values() {
            for (i, record) in records.iter().enumerate() {
                let label_value = record.values.get(Field::PunctualityPct);
                let values = label_value.and_then(|_| self.vector_for(record, &records[..i]));
                match (values, label_value) {
                    (Some(values), Some(punctuality)) => vectors.push(FeatureVector {
                        key: record.key,
                        values,
                        label: self.schema.label.class_of(punctuality),
                    }),
                    _ => dropped += 1,
                }
            }
        }
        vectors.sort_by_key(|v| v.key);

        tracing::info!(
            vectors = vectors.len(),
            dropped,
            features = self.schema.len(),
            "built feature set"
        );
        FeatureSet {
            schema: self.schema.clone(),
            vectors,
        }
    }
}

#[cfg(test)]
mod tests {
    use chrono::{Days, NaiveDate};
    use railpulse_dataset::{
        master::BuildReport,
        schema::{FieldValues, RecordKey},
    };

    use super::*;

    fn dataset(days: u32, punctuality: impl Fn(Region, u32) -> f64) -> MasterDataset {
        let start = NaiveDate::from_ymd_opt(2024, 1, 1).unwrap();
        let mut records = vec![];
        for day in 0..days {
            for region in [Region::Wales, Region::London] {
                let mut values = FieldValues::new();
                values.set(Field::PunctualityPct, punctuality(region, day));
                values.set(Field::CancellationPct, f64::from(day % 5));
                records.push(MasterRecord {
                    key: RecordKey {
                        date: start.checked_add_days(Days::new(u64::from(day))).unwrap(),
                        region,
                    },
                    values,
                });
            }
        }
        MasterDataset::new(vec![], records, BuildReport::default()).unwrap()
    }

    fn small_config() -> FeatureConfig {
        FeatureConfig {
            lag_days: vec![1, 2],
            rolling_windows: vec![3],
            ..FeatureConfig::default()
        }
    }

    #[test]
    fn test_default_schema_layout() {
        let engineer = FeatureEngineer::new(FeatureConfig::default()).unwrap();
        // 2 fields x (3 lags + 2 windows x 2) + 6 calendar
        assert_eq!(engineer.schema().len(), 20);
        assert_eq!(engineer.schema().names[0], "punctuality_pct_lag_1");
    }

    #[test]
    fn test_drop_policy_skips_records_without_history() {
        let data = dataset(10, |_, day| 70.0 + f64::from(day));
        let set = FeatureEngineer::new(small_config()).unwrap().build(&data);
        // the first 3 days of each region lack a full 3-day window
        assert_eq!(set.len(), 2 * 7);
        let keys = set.vectors.iter().map(|v| v.key).collect::<Vec<_>>();
        let mut sorted = keys.clone();
        sorted.sort();
        assert_eq!(keys, sorted);
    }

    #[test]
    fn test_fill_policy_keeps_records_with_some_history() {
        let data = dataset(10, |_, day| 70.0 + f64::from(day));
        let config = FeatureConfig {
            missing_history: MissingHistory::FillExpandingMean,
            ..small_config()
        };
        let engineer = FeatureEngineer::new(config).unwrap();
        let set = engineer.build(&data);
        // the very first record has no earlier values; day 1 lacks a rolling std (needs 2)
        assert_eq!(set.len(), 2 * 8);
        let lag2 = engineer.schema().index_of("punctuality_pct_lag_2").unwrap();
        let day2 = set
            .vectors
            .iter()
            .find(|v| v.key.region == Region::Wales && v.key.date.to_string() == "2024-01-03")
            .unwrap();
        assert!((day2.values[lag2] - 70.0).abs() < 1e-12);
    }

    #[test]
    fn test_features_ignore_current_and_future_records() {
        let base = dataset(40, |region, day| {
            let base = if region == Region::Wales { 90.0 } else { 60.0 };
            base - f64::from(day % 7)
        });
        let engineer = FeatureEngineer::new(small_config()).unwrap();
        let original = engineer.build(&base);

        let cutoff = NaiveDate::from_ymd_opt(2024, 1, 20).unwrap();
        let mutated_records = base
            .records()
            .iter()
            .cloned()
            .map(|mut r| {
                if r.key.date >= cutoff {
                    r.values.set(Field::PunctualityPct, 5.0);
                    r.values.set(Field::CancellationPct, 99.0);
                }
                r
            })
            .collect();
        let mutated = MasterDataset::new(vec![], mutated_records, BuildReport::default()).unwrap();
        let changed = engineer.build(&mutated);

        for (a, b) in original.vectors.iter().zip(&changed.vectors) {
            assert_eq!(a.key, b.key);
            if a.key.date <= cutoff {
                assert_eq!(a.values, b.values, "features changed for {}", a.key);
            }
        }
    }

    #[test]
    fn test_labels_follow_scheme() {
        let data = dataset(10, |region, _| if region == Region::Wales { 90.0 } else { 60.0 });
        let set = FeatureEngineer::new(small_config()).unwrap().build(&data);
        for v in &set.vectors {
            let expected = usize::from(v.key.region == Region::London);
            assert_eq!(v.label, expected);
        }
        assert_eq!(set.class_counts(), vec![7, 7]);
    }

    #[test]
    fn test_rejects_invalid_config() {
        let zero_lag = FeatureConfig {
            lag_days: vec![0],
            ..FeatureConfig::default()
        };
        assert_eq!(FeatureEngineer::new(zero_lag).unwrap_err(), FeatureError::ZeroLag);

        let unordered = FeatureConfig {
            label: LabelScheme::Bands {
                cutoffs: vec![80.0, 70.0],
            },
            ..FeatureConfig::default()
        };
        assert!(matches!(
            FeatureEngineer::new(unordered),
            Err(FeatureError::UnorderedCutoffs { .. })
        ));

        let empty = FeatureConfig {
            fields: vec![],
            calendar: false,
            ..FeatureConfig::default()
        };
        assert_eq!(FeatureEngineer::new(empty).unwrap_err(), FeatureError::NoFeatures);
    }
}
