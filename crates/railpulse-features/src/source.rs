//! Feature source types.
//!
//! Every source computes one feature value for a record from its key and the records of
//! the same region strictly before it. Sources never see the record itself, so no
//! feature can leak the label or any later observation.
//!
//! History sources ([`Lag`], [`RollingMean`], [`RollingStd`]) return `None` when the
//! history they need is missing. Calendar sources always produce a value.

use std::{f64::consts::TAU, fmt};

use chrono::{Datelike as _, Days, NaiveDate, Weekday};
use railpulse_dataset::{
    master::MasterRecord,
    schema::{Field, RecordKey},
};
use railpulse_stats::descriptive;

use crate::holiday;

pub trait FeatureSource: fmt::Debug + Send + Sync {
    #[must_use]
    fn id(&self) -> &str;
    #[must_use]
    fn clone_boxed(&self) -> BoxedFeatureSource;

    /// Computes the feature for `key`. `past` holds the same region's records with
    /// dates strictly before `key.date`, in ascending date order.
    #[must_use]
    fn extract(&self, key: &RecordKey, past: &[&MasterRecord]) -> Option<f64>;

    /// Fallback used when [`extract`](Self::extract) has no value and missing history
    /// is filled rather than dropped.
    #[must_use]
    fn fill(&self, _key: &RecordKey, _past: &[&MasterRecord]) -> Option<f64> {
        None
    }
}

pub type BoxedFeatureSource = Box<dyn FeatureSource>;

impl Clone for BoxedFeatureSource {
    fn clone(&self) -> Self {
        self.clone_boxed()
    }
}

fn value_on(past: &[&MasterRecord], date: NaiveDate, field: Field) -> Option<f64> {
    let index = past.binary_search_by_key(&date, |r| r.key.date).ok()?;
    past[index].values.get(field)
}

/// Values of `field` on each of the `window` days before `date`; `None` if any is missing.
fn window_values(
    past: &[&MasterRecord],
    date: NaiveDate,
    field: Field,
    window: u32,
) -> Option<Vec<f64>> {
    (1..=window)
        .map(|offset| {
            let day = date.checked_sub_days(Days::new(u64::from(offset)))?;
            value_on(past, day, field)
        })
        .collect()
}

fn all_values(past: &[&MasterRecord], field: Field) -> Vec<f64> {
    past.iter().filter_map(|r| r.values.get(field)).collect()
}

/// Value of `field` exactly `days` days earlier.
///
/// Filled from the expanding mean of all earlier values.
#[derive(Debug, Clone)]
pub struct Lag {
    id: String,
    field: Field,
    days: u32,
}

impl Lag {
    #[must_use]
    pub fn new(field: Field, days: u32) -> Self {
        Self {
            id: format!("{field}_lag_{days}"),
            field,
            days,
        }
    }
}

impl FeatureSource for Lag {
    fn id(&self) -> &str {
        &self.id
    }
    fn clone_boxed(&self) -> BoxedFeatureSource {
        Box::new(self.clone())
    }
    fn extract(&self, key: &RecordKey, past: &[&MasterRecord]) -> Option<f64> {
        let day = key.date.checked_sub_days(Days::new(u64::from(self.days)))?;
        value_on(past, day, self.field)
    }
    fn fill(&self, _key: &RecordKey, past: &[&MasterRecord]) -> Option<f64> {
        descriptive::mean(&all_values(past, self.field))
    }
}

/// Mean of `field` over the `window` days before the record; every day must be present.
#[derive(Debug, Clone)]
pub struct RollingMean {
    id: String,
    field: Field,
    window: u32,
}

impl RollingMean {
    #[must_use]
    pub fn new(field: Field, window: u32) -> Self {
        Self {
            id: format!("{field}_rolling_mean_{window}"),
            field,
            window,
        }
    }
}

impl FeatureSource for RollingMean {
    fn id(&self) -> &str {
        &self.id
    }
    fn clone_boxed(&self) -> BoxedFeatureSource {
        Box::new(self.clone())
    }
    fn extract(&self, key: &RecordKey, past: &[&MasterRecord]) -> Option<f64> {
        descriptive::mean(&window_values(past, key.date, self.field, self.window)?)
    }
    fn fill(&self, _key: &RecordKey, past: &[&MasterRecord]) -> Option<f64> {
        descriptive::mean(&all_values(past, self.field))
    }
}

/// Sample standard deviation of `field` over the `window` days before the record.
///
/// Filled from the expanding standard deviation of all earlier values.
#[derive(Debug, Clone)]
pub struct RollingStd {
    id: String,
    field: Field,
    window: u32,
}

impl RollingStd {
    #[must_use]
    pub fn new(field: Field, window: u32) -> Self {
        Self {
            id: format!("{field}_rolling_std_{window}"),
            field,
            window,
        }
    }
}

impl FeatureSource for RollingStd {
    fn id(&self) -> &str {
        &self.id
    }
    fn clone_boxed(&self) -> BoxedFeatureSource {
        Box::new(self.clone())
    }
    fn extract(&self, key: &RecordKey, past: &[&MasterRecord]) -> Option<f64> {
        descriptive::sample_std_dev(&window_values(past, key.date, self.field, self.window)?)
    }
    fn fill(&self, _key: &RecordKey, past: &[&MasterRecord]) -> Option<f64> {
        descriptive::sample_std_dev(&all_values(past, self.field))
    }
}

/// Day of week, Monday = 0.
#[derive(Debug, Clone)]
pub struct DayOfWeek;

impl FeatureSource for DayOfWeek {
    fn id(&self) -> &'static str {
        "day_of_week"
    }
    fn clone_boxed(&self) -> BoxedFeatureSource {
        Box::new(self.clone())
    }
    fn extract(&self, key: &RecordKey, _past: &[&MasterRecord]) -> Option<f64> {
        Some(f64::from(key.date.weekday().num_days_from_monday()))
    }
}

/// Month of year, 1 to 12.
#[derive(Debug, Clone)]
pub struct Month;

impl FeatureSource for Month {
    fn id(&self) -> &'static str {
        "month"
    }
    fn clone_boxed(&self) -> BoxedFeatureSource {
        Box::new(self.clone())
    }
    fn extract(&self, key: &RecordKey, _past: &[&MasterRecord]) -> Option<f64> {
        Some(f64::from(key.date.month()))
    }
}

#[derive(Debug, Clone)]
pub struct IsWeekend;

impl FeatureSource for IsWeekend {
    fn id(&self) -> &'static str {
        "is_weekend"
    }
    fn clone_boxed(&self) -> BoxedFeatureSource {
        Box::new(self.clone())
    }
    fn extract(&self, key: &RecordKey, _past: &[&MasterRecord]) -> Option<f64> {
        let weekend = matches!(key.date.weekday(), Weekday::Sat | Weekday::Sun);
        Some(f64::from(u8::from(weekend)))
    }
}

/// Observed bank holiday in the record's region.
#[derive(Debug, Clone)]
pub struct IsHoliday;

impl FeatureSource for IsHoliday {
    fn id(&self) -> &'static str {
        "is_holiday"
    }
    fn clone_boxed(&self) -> BoxedFeatureSource {
        Box::new(self.clone())
    }
    fn extract(&self, key: &RecordKey, _past: &[&MasterRecord]) -> Option<f64> {
        let holiday = holiday::is_bank_holiday(key.date, key.region);
        Some(f64::from(u8::from(holiday)))
    }
}

fn month_angle(date: NaiveDate) -> f64 {
    TAU * f64::from(date.month0()) / 12.0
}

/// Sine of the month's position on the yearly cycle.
#[derive(Debug, Clone)]
pub struct MonthSin;

impl FeatureSource for MonthSin {
    fn id(&self) -> &'static str {
        "month_sin"
    }
    fn clone_boxed(&self) -> BoxedFeatureSource {
        Box::new(self.clone())
    }
    fn extract(&self, key: &RecordKey, _past: &[&MasterRecord]) -> Option<f64> {
        Some(month_angle(key.date).sin())
    }
}

/// Cosine of the month's position on the yearly cycle.
#[derive(Debug, Clone)]
pub struct MonthCos;

impl FeatureSource for MonthCos {
    fn id(&self) -> &'static str {
        "month_cos"
    }
    fn clone_boxed(&self) -> BoxedFeatureSource {
        Box::new(self.clone())
    }
    fn extract(&self, key: &RecordKey, _past: &[&MasterRecord]) -> Option<f64> {
        Some(month_angle(key.date).cos())
    }
}

#[must_use]
pub fn calendar_sources() -> Vec<BoxedFeatureSource> {
    vec![
        Box::new(DayOfWeek),
        Box::new(Month),
        Box::new(IsWeekend),
        Box::new(IsHoliday),
        Box::new(MonthSin),
        Box::new(MonthCos),
    ]
}

#[cfg(test)]
mod tests {
    use railpulse_dataset::{region::Region, schema::FieldValues};

    use super::*;

    fn record(day: u32, punctuality: Option<f64>) -> MasterRecord {
        let mut values = FieldValues::new();
        if let Some(p) = punctuality {
            values.set(Field::PunctualityPct, p);
        }
        MasterRecord {
            key: key(day),
            values,
        }
    }

    fn key(day: u32) -> RecordKey {
        RecordKey {
            date: NaiveDate::from_ymd_opt(2024, 7, day).unwrap(),
            region: Region::Midlands,
        }
    }

    #[test]
    fn test_lag_reads_exact_earlier_day() {
        let records = [record(1, Some(80.0)), record(2, Some(82.0)), record(3, None)];
        let past = records.iter().collect::<Vec<_>>();
        let lag1 = Lag::new(Field::PunctualityPct, 1);
        let lag2 = Lag::new(Field::PunctualityPct, 2);
        assert_eq!(lag1.id(), "punctuality_pct_lag_1");
        assert_eq!(lag2.extract(&key(4), &past), Some(82.0));
        assert_eq!(lag1.extract(&key(4), &past), None);
        assert_eq!(lag1.fill(&key(4), &past), Some(81.0));
    }

    #[test]
    fn test_rolling_requires_full_window() {
        let records = (1..=5)
            .map(|d| record(d, Some(f64::from(d))))
            .collect::<Vec<_>>();
        let past = records.iter().collect::<Vec<_>>();
        let mean3 = RollingMean::new(Field::PunctualityPct, 3);
        let std3 = RollingStd::new(Field::PunctualityPct, 3);
        assert_eq!(mean3.extract(&key(6), &past), Some(4.0));
        assert_eq!(std3.extract(&key(6), &past), Some(1.0));
        // day 3 only has two earlier days
        assert_eq!(mean3.extract(&key(3), &past[..2]), None);
    }

    #[test]
    fn test_calendar_sources() {
        // 2024-07-06 is a Saturday
        let k = key(6);
        assert_eq!(DayOfWeek.extract(&k, &[]), Some(5.0));
        assert_eq!(IsWeekend.extract(&k, &[]), Some(1.0));
        assert_eq!(Month.extract(&k, &[]), Some(7.0));
        assert_eq!(IsHoliday.extract(&k, &[]), Some(0.0));
        let sin = MonthSin.extract(&k, &[]).unwrap();
        let cos = MonthCos.extract(&k, &[]).unwrap();
        assert!((sin * sin + cos * cos - 1.0).abs() < 1e-12);
        assert!((cos + 1.0).abs() < 1e-12);
    }
}
