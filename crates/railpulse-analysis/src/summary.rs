//! Structured summary handed to the narrative writer.
//!
//! The writer is an external text-generation service. It receives one
//! [`NarrativeSummary`] and returns one opaque text per [`StakeholderCategory`]; nothing
//! in this crate depends on what it returns.

use std::collections::BTreeMap;

use chrono::NaiveDate;
use railpulse_dataset::{master::MasterDataset, region::Region, schema::Field};
use railpulse_stats::{descriptive::DescriptiveStats, percentiles::Percentiles};
use serde::{Deserialize, Serialize};

use crate::engine::AnalysisReport;

const DELAY_CAUSES: [Field; 4] = [
    Field::DelayMinutesInfrastructure,
    Field::DelayMinutesOperator,
    Field::DelayMinutesWeather,
    Field::DelayMinutesExternal,
];

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StakeholderCategory {
    Executive,
    Operations,
    Infrastructure,
    Passengers,
}

impl StakeholderCategory {
    pub const ALL: [StakeholderCategory; 4] = [
        StakeholderCategory::Executive,
        StakeholderCategory::Operations,
        StakeholderCategory::Infrastructure,
        StakeholderCategory::Passengers,
    ];
}

/// Headline indicators of one region.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RegionKpi {
    pub region: Region,
    pub records: usize,
    pub punctuality: Option<DescriptiveStats>,
    pub punctuality_percentiles: Option<Percentiles>,
    /// Share of days with punctuality below the low-performance threshold.
    pub low_performance_share: Option<f64>,
    pub mean_cancellation_pct: Option<f64>,
    /// Each cause's share of the total attributed delay minutes.
    pub delay_cause_shares: BTreeMap<Field, f64>,
}

impl RegionKpi {
    #[expect(clippy::cast_precision_loss)]
    fn from_dataset(dataset: &MasterDataset, region: Region, low_threshold: f64) -> Self {
        let records = dataset.by_region(region).collect::<Vec<_>>();
        let column = |field: Field| {
            records
                .iter()
                .filter_map(|r| r.values.get(field))
                .collect::<Vec<_>>()
        };

        let punctuality = column(Field::PunctualityPct);
        let low_performance_share = (!punctuality.is_empty()).then(|| {
            let low = punctuality.iter().filter(|p| **p < low_threshold).count();
            low as f64 / punctuality.len() as f64
        });
        let punctuality_percentiles = (!punctuality.is_empty())
            .then(|| Percentiles::new(&punctuality, &[10.0, 50.0, 90.0]));

        let totals = DELAY_CAUSES
            .iter()
            .map(|&f| (f, column(f).iter().sum::<f64>()))
            .collect::<Vec<_>>();
        let total = totals.iter().map(|(_, t)| t).sum::<f64>();
        let delay_cause_shares = if total > 0.0 {
            totals.into_iter().map(|(f, t)| (f, t / total)).collect()
        } else {
            BTreeMap::new()
        };

        Self {
            region,
            records: records.len(),
            punctuality: DescriptiveStats::new(punctuality.iter().copied()),
            punctuality_percentiles,
            low_performance_share,
            mean_cancellation_pct: railpulse_stats::descriptive::mean(&column(Field::CancellationPct)),
            delay_cause_shares,
        }
    }
}

/// Mean absolute contribution of one feature across scored records.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeatureAttribution {
    pub feature: String,
    pub mean_abs_contribution: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NarrativeSummary {
    pub period: Option<(NaiveDate, NaiveDate)>,
    pub record_count: usize,
    pub kpis: Vec<RegionKpi>,
    pub statistics: AnalysisReport,
    pub top_attributions: Vec<FeatureAttribution>,
    pub stakeholders: Vec<StakeholderCategory>,
}

impl NarrativeSummary {
    /// Assembles the summary. Attributions are ranked by magnitude and cut to `top_n`.
    #[must_use]
    pub fn new(
        dataset: &MasterDataset,
        statistics: AnalysisReport,
        mut attributions: Vec<FeatureAttribution>,
        top_n: usize,
        low_threshold: f64,
    ) -> Self {
        attributions.sort_by(|a, b| {
            b.mean_abs_contribution
                .total_cmp(&a.mean_abs_contribution)
                .then_with(|| a.feature.cmp(&b.feature))
        });
        attributions.truncate(top_n);
        Self {
            period: dataset.date_range(),
            record_count: dataset.len(),
            kpis: dataset
                .regions()
                .into_iter()
                .map(|region| RegionKpi::from_dataset(dataset, region, low_threshold))
                .collect(),
            statistics,
            top_attributions: attributions,
            stakeholders: StakeholderCategory::ALL.to_vec(),
        }
    }
}

#[cfg(test)]
mod tests {
    use railpulse_dataset::{
        master::{BuildReport, MasterRecord},
        schema::{FieldValues, RecordKey},
    };

    use super::*;
    use crate::engine::{AnalysisConfig, StatisticalEngine};

    fn record(day: u32, region: Region, punctuality: f64, weather_delay: f64) -> MasterRecord {
        let mut values = FieldValues::new();
        values.set(Field::PunctualityPct, punctuality);
        values.set(Field::DelayMinutesWeather, weather_delay);
        values.set(Field::DelayMinutesInfrastructure, 100.0);
        MasterRecord {
            key: RecordKey {
                date: NaiveDate::from_ymd_opt(2024, 9, day).unwrap(),
                region,
            },
            values,
        }
    }

    #[test]
    fn test_summary_kpis_and_ranking() {
        let records = (1..=4)
            .flat_map(|d| {
                [
                    record(d, Region::Wales, 70.0 + f64::from(d) * 2.0, 300.0),
                    record(d, Region::London, 90.0, 100.0),
                ]
            })
            .collect();
        let dataset = MasterDataset::new(vec![], records, BuildReport::default()).unwrap();
        let stats = StatisticalEngine::new(AnalysisConfig::default()).run(&dataset);
        let attributions = vec![
            FeatureAttribution {
                feature: "month".to_owned(),
                mean_abs_contribution: 0.01,
            },
            FeatureAttribution {
                feature: "punctuality_pct_lag_1".to_owned(),
                mean_abs_contribution: 0.2,
            },
        ];
        let summary = NarrativeSummary::new(&dataset, stats, attributions, 1, 75.0);

        assert_eq!(summary.record_count, 8);
        assert_eq!(summary.top_attributions.len(), 1);
        assert_eq!(summary.top_attributions[0].feature, "punctuality_pct_lag_1");
        assert_eq!(summary.stakeholders.len(), 4);

        let wales = summary.kpis.iter().find(|k| k.region == Region::Wales).unwrap();
        // 72, 74 below 75; 76, 78 above
        assert_eq!(wales.low_performance_share, Some(0.5));
        assert!((wales.delay_cause_shares[&Field::DelayMinutesWeather] - 0.75).abs() < 1e-12);
        assert_eq!(wales.mean_cancellation_pct, None);
        let london = summary.kpis.iter().find(|k| k.region == Region::London).unwrap();
        assert_eq!(london.punctuality.unwrap().mean, 90.0);
    }
}
