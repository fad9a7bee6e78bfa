//! The statistical test suite run over a master dataset.
//!
//! [`StatisticalEngine::run`] executes every configured test and records each one as
//! [`TestOutcome::Completed`] or [`TestOutcome::Skipped`]. A test that cannot run on the
//! available data is skipped with its reason; it never fails the pipeline.

use std::{collections::BTreeMap, fmt};

use chrono::NaiveDate;
use railpulse_dataset::{master::MasterDataset, region::Region, schema::Field};
use railpulse_stats::{
    decomposition::{self, Decomposition, DecompositionError},
    hypothesis::{self, AnovaResult, HypothesisError, KruskalWallisResult},
};
use serde::{Deserialize, Serialize};

use crate::series::{self, DailySeries, SeriesScope};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, derive_more::Display)]
#[serde(rename_all = "snake_case")]
pub enum TestKind {
    #[display("one-way ANOVA")]
    Anova,
    #[display("Kruskal-Wallis")]
    KruskalWallis,
    #[display("seasonal decomposition")]
    SeasonalDecomposition,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AnalysisConfig {
    /// Dataset field the tests are run on.
    pub metric: Field,
    pub tests: Vec<TestKind>,
    pub min_groups: usize,
    pub min_samples_per_group: usize,
    /// p-value below which a between-group difference is reported as significant.
    pub significance: f64,
    /// Seasonal period in days.
    pub period: usize,
    /// Residuals beyond this many standard deviations are outliers.
    pub outlier_sigma: f64,
    pub decomposition_scope: SeriesScope,
}

impl Default for AnalysisConfig {
    fn default() -> Self {
        Self {
            metric: Field::PunctualityPct,
            tests: vec![
                TestKind::Anova,
                TestKind::KruskalWallis,
                TestKind::SeasonalDecomposition,
            ],
            min_groups: 2,
            min_samples_per_group: 3,
            significance: 0.05,
            period: 7,
            outlier_sigma: 3.0,
            decomposition_scope: SeriesScope::AllRegions,
        }
    }
}

/// Why a test could not be computed.
#[derive(Debug, Clone, PartialEq, derive_more::Display)]
pub enum Shortfall {
    #[display("{groups} regional groups, at least {required} required")]
    Groups { groups: usize, required: usize },
    #[display("region {region} has {samples} samples, at least {required} required")]
    Samples {
        region: Region,
        samples: usize,
        required: usize,
    },
    #[display("no observations of the metric")]
    EmptySeries,
    #[display("series of {len} days, at least {required} required")]
    SeriesLength { len: usize, required: usize },
    #[display("{reason}")]
    Degenerate { reason: String },
}

#[derive(Debug, Clone, PartialEq, derive_more::Display, derive_more::Error)]
pub enum AnalysisError {
    #[display("insufficient data for {test} on {metric}: {shortfall}")]
    InsufficientData {
        test: TestKind,
        metric: Field,
        shortfall: Shortfall,
    },
    #[display("invalid analysis configuration: {reason}")]
    InvalidConfig { reason: String },
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GroupSummary {
    pub region: Region,
    pub count: usize,
    pub mean: f64,
}

/// A between-group test result with the groups it was computed on.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GroupTest<R> {
    pub result: R,
    pub groups: Vec<GroupSummary>,
    pub significant: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DecompositionReport {
    pub scope: SeriesScope,
    pub start: NaiveDate,
    pub interpolated_days: usize,
    pub decomposition: Decomposition,
    pub residual_std_dev: Option<f64>,
    pub outliers: Vec<NaiveDate>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum TestOutcome<T> {
    Completed { result: T },
    Skipped { reason: String },
}

impl<T> TestOutcome<T> {
    fn from_result(test: TestKind, result: Result<T, AnalysisError>) -> Self {
        match result {
            Ok(result) => Self::Completed { result },
            Err(e) => {
                tracing::warn!(%test, reason = %e, "statistical test skipped");
                Self::Skipped {
                    reason: e.to_string(),
                }
            }
        }
    }

    fn not_configured(test: TestKind) -> Self {
        Self::Skipped {
            reason: format!("{test} is not in the configured suite"),
        }
    }

    #[must_use]
    pub fn completed(&self) -> Option<&T> {
        match self {
            Self::Completed { result } => Some(result),
            Self::Skipped { .. } => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnalysisReport {
    pub metric: Field,
    pub anova: TestOutcome<GroupTest<AnovaResult>>,
    pub kruskal_wallis: TestOutcome<GroupTest<KruskalWallisResult>>,
    pub decomposition: TestOutcome<DecompositionReport>,
}

/// Runs the configured statistical tests.
///
/// # Examples
///
/// ```
/// use railpulse_analysis::engine::{AnalysisConfig, StatisticalEngine, TestOutcome};
/// use railpulse_dataset::master::{BuildReport, MasterDataset};
///
/// let empty = MasterDataset::new(vec![], vec![], BuildReport::default()).unwrap();
/// let report = StatisticalEngine::new(AnalysisConfig::default()).run(&empty);
/// assert!(matches!(report.anova, TestOutcome::Skipped { .. }));
/// ```
#[derive(Debug, Clone)]
pub struct StatisticalEngine {
    config: AnalysisConfig,
}

impl StatisticalEngine {
    #[must_use]
    pub fn new(config: AnalysisConfig) -> Self {
        Self { config }
    }

    #[must_use]
    pub fn config(&self) -> &AnalysisConfig {
        &self.config
    }

    fn insufficient(&self, test: TestKind, shortfall: Shortfall) -> AnalysisError {
        AnalysisError::InsufficientData {
            test,
            metric: self.config.metric,
            shortfall,
        }
    }

    fn degenerate(&self, test: TestKind, error: &HypothesisError) -> AnalysisError {
        self.insufficient(
            test,
            Shortfall::Degenerate {
                reason: error.to_string(),
            },
        )
    }

    /// Regional groups meeting the configured minimums.
    fn groups(
        &self,
        test: TestKind,
        dataset: &MasterDataset,
    ) -> Result<BTreeMap<Region, Vec<f64>>, AnalysisError> {
        let groups = series::regional_groups(dataset, self.config.metric);
        let required = self.config.min_groups.max(2);
        if groups.len() < required {
            return Err(self.insufficient(
                test,
                Shortfall::Groups {
                    groups: groups.len(),
                    required,
                },
            ));
        }
        let required = self.config.min_samples_per_group.max(1);
        if let Some((region, values)) = groups.iter().find(|(_, v)| v.len() < required) {
            return Err(self.insufficient(
                test,
                Shortfall::Samples {
                    region: *region,
                    samples: values.len(),
                    required,
                },
            ));
        }
        Ok(groups)
    }

    fn group_test<R>(
        &self,
        test: TestKind,
        dataset: &MasterDataset,
        compute: impl FnOnce(&[&Vec<f64>]) -> Result<R, HypothesisError>,
        p_value: impl Fn(&R) -> f64,
    ) -> Result<GroupTest<R>, AnalysisError> {
        let groups = self.groups(test, dataset)?;
        let values = groups.values().collect::<Vec<_>>();
        let result = compute(&values).map_err(|e| self.degenerate(test, &e))?;
        let significant = p_value(&result) < self.config.significance;
        let groups = groups
            .iter()
            .map(|(region, values)| GroupSummary {
                region: *region,
                count: values.len(),
                mean: railpulse_stats::descriptive::mean(values).unwrap_or(f64::NAN),
            })
            .collect();
        Ok(GroupTest {
            result,
            groups,
            significant,
        })
    }

    /// One-way ANOVA of the metric across regions.
    pub fn anova(&self, dataset: &MasterDataset) -> Result<GroupTest<AnovaResult>, AnalysisError> {
        self.group_test(
            TestKind::Anova,
            dataset,
            |groups| hypothesis::one_way_anova(groups),
            |r| r.p_value,
        )
    }

    /// Kruskal-Wallis H test of the metric across regions.
    pub fn kruskal_wallis(
        &self,
        dataset: &MasterDataset,
    ) -> Result<GroupTest<KruskalWallisResult>, AnalysisError> {
        self.group_test(
            TestKind::KruskalWallis,
            dataset,
            |groups| hypothesis::kruskal_wallis(groups),
            |r| r.p_value,
        )
    }

    /// Additive decomposition of the daily metric series with outlier flags.
    pub fn decompose(&self, dataset: &MasterDataset) -> Result<DecompositionReport, AnalysisError> {
        let test = TestKind::SeasonalDecomposition;
        if self.config.outlier_sigma.is_nan() || self.config.outlier_sigma <= 0.0 {
            return Err(AnalysisError::InvalidConfig {
                reason: format!("outlier_sigma must be positive, got {}", self.config.outlier_sigma),
            });
        }
        let scope = self.config.decomposition_scope;
        let series = DailySeries::from_dataset(dataset, self.config.metric, scope)
            .ok_or_else(|| self.insufficient(test, Shortfall::EmptySeries))?;
        let decomposition = decomposition::decompose_additive(&series.values, self.config.period)
            .map_err(|e| match e {
                DecompositionError::InvalidPeriod { period } => AnalysisError::InvalidConfig {
                    reason: format!("period must be at least 2 days, got {period}"),
                },
                DecompositionError::SeriesTooShort { len, period } => self.insufficient(
                    test,
                    Shortfall::SeriesLength {
                        len,
                        required: 2 * period,
                    },
                ),
            })?;
        let outliers = decomposition
            .outliers(self.config.outlier_sigma)
            .into_iter()
            .filter_map(|i| series.date_at(i))
            .collect::<Vec<_>>();
        if !outliers.is_empty() {
            tracing::info!(count = outliers.len(), "residual outliers flagged");
        }
        Ok(DecompositionReport {
            scope,
            start: series.start,
            interpolated_days: series.interpolated,
            residual_std_dev: decomposition.residual_std_dev(),
            decomposition,
            outliers,
        })
    }

    fn enabled(&self, test: TestKind) -> bool {
        self.config.tests.contains(&test)
    }

    /// Runs the configured suite. Tests that cannot run are recorded as skipped.
    #[must_use]
    pub fn run(&self, dataset: &MasterDataset) -> AnalysisReport {
        let anova = if self.enabled(TestKind::Anova) {
            TestOutcome::from_result(TestKind::Anova, self.anova(dataset))
        } else {
            TestOutcome::not_configured(TestKind::Anova)
        };
        let kruskal_wallis = if self.enabled(TestKind::KruskalWallis) {
            TestOutcome::from_result(TestKind::KruskalWallis, self.kruskal_wallis(dataset))
        } else {
            TestOutcome::not_configured(TestKind::KruskalWallis)
        };
        let decomposition = if self.enabled(TestKind::SeasonalDecomposition) {
            TestOutcome::from_result(TestKind::SeasonalDecomposition, self.decompose(dataset))
        } else {
            TestOutcome::not_configured(TestKind::SeasonalDecomposition)
        };
        tracing::info!(metric = %self.config.metric, "statistical suite finished");
        AnalysisReport {
            metric: self.config.metric,
            anova,
            kruskal_wallis,
            decomposition,
        }
    }
}

impl fmt::Display for GroupSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: n={} mean={:.2}", self.region, self.count, self.mean)
    }
}
