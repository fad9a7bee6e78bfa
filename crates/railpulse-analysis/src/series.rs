//! Extraction of regional groups and daily series from a master dataset.

use std::collections::BTreeMap;

use chrono::{Days, NaiveDate};
use railpulse_dataset::{master::MasterDataset, region::Region, schema::Field};
use serde::{Deserialize, Serialize};

/// Present values of `metric` grouped by region.
#[must_use]
pub fn regional_groups(dataset: &MasterDataset, metric: Field) -> BTreeMap<Region, Vec<f64>> {
    let mut groups: BTreeMap<Region, Vec<f64>> = BTreeMap::new();
    for record in dataset.records() {
        if let Some(value) = record.values.get(metric) {
            groups.entry(record.key.region).or_default().push(value);
        }
    }
    groups
}

/// Which records a daily series is built from.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "kind", content = "region")]
pub enum SeriesScope {
    /// Mean across all regions reporting on each day.
    #[default]
    AllRegions,
    Region(Region),
}

/// A gap-free daily series.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DailySeries {
    pub start: NaiveDate,
    pub values: Vec<f64>,
    /// Days with no observation, filled by linear interpolation.
    pub interpolated: usize,
}

impl DailySeries {
    /// Builds the daily series of `metric` for `scope`.
    ///
    /// Returns `None` when no day has a value. Days inside the observed range with no
    /// value are interpolated between their nearest observed neighbours.
    #[expect(clippy::cast_precision_loss)]
    #[must_use]
    pub fn from_dataset(dataset: &MasterDataset, metric: Field, scope: SeriesScope) -> Option<Self> {
        let mut daily: BTreeMap<NaiveDate, (f64, usize)> = BTreeMap::new();
        for record in dataset.records() {
            if matches!(scope, SeriesScope::Region(region) if region != record.key.region) {
                continue;
            }
            if let Some(value) = record.values.get(metric) {
                let entry = daily.entry(record.key.date).or_default();
                entry.0 += value;
                entry.1 += 1;
            }
        }
        let observed = daily
            .into_iter()
            .map(|(date, (sum, n))| (date, sum / n as f64))
            .collect::<Vec<_>>();
        let (start, _) = *observed.first()?;

        let mut values: Vec<f64> = vec![];
        let mut interpolated = 0;
        let mut previous: Option<(NaiveDate, f64)> = None;
        for (date, value) in observed {
            if let Some((prev_date, prev_value)) = previous {
                let gap = (date - prev_date).num_days();
                for step in 1..gap {
                    let t = step as f64 / gap as f64;
                    values.push(prev_value + t * (value - prev_value));
                    interpolated += 1;
                }
            }
            values.push(value);
            previous = Some((date, value));
        }
        Some(Self {
            start,
            values,
            interpolated,
        })
    }

    #[must_use]
    pub fn date_at(&self, index: usize) -> Option<NaiveDate> {
        self.start.checked_add_days(Days::new(u64::try_from(index).ok()?))
    }
}
