//! Statistical similarity checks between a synthetic batch and the real dataset.
//!
//! # Algorithm Overview
//!
//! 1. For every field with present values on both sides, a two-sample
//!    Kolmogorov–Smirnov test compares the real and synthetic distributions.
//! 2. The mean of those p-values must exceed `min_mean_p_value`.
//! 3. Pearson correlation matrices (pairwise complete) over the compared fields are
//!    computed for both sides; the Frobenius norm of their difference must stay below
//!    `max_correlation_difference`.
//!
//! A failed check is reported, never raised: the batch is kept either way.

use railpulse_dataset::{master::MasterDataset, schema::Field};
use railpulse_stats::{correlation, hypothesis};
use serde::{Deserialize, Serialize};

use crate::generator::SyntheticBatch;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ValidationConfig {
    pub min_mean_p_value: f64,
    pub max_correlation_difference: f64,
}

impl Default for ValidationConfig {
    fn default() -> Self {
        Self {
            min_mean_p_value: 0.05,
            max_correlation_difference: 0.1,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FieldSimilarity {
    pub field: Field,
    pub ks_statistic: f64,
    pub p_value: f64,
    pub real_count: usize,
    pub synthetic_count: usize,
}

#[derive(Debug, Clone, PartialEq, derive_more::Display, Serialize, Deserialize)]
#[serde(tag = "failure", rename_all = "snake_case")]
pub enum ValidationFailure {
    #[display("mean KS p-value {mean_p_value:.4} is not above {threshold}")]
    LowMeanPValue { mean_p_value: f64, threshold: f64 },
    #[display("correlation matrices differ by {difference:.4} (limit {threshold})")]
    CorrelationDrift { difference: f64, threshold: f64 },
    #[display("no field has values in both the real and the synthetic data")]
    NoComparableFields,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ValidationReport {
    pub fields: Vec<FieldSimilarity>,
    /// Fields absent from one of the two sides.
    pub skipped_fields: Vec<Field>,
    pub mean_p_value: Option<f64>,
    pub correlation_difference: Option<f64>,
    pub thresholds: ValidationConfig,
    pub passed: bool,
    pub failures: Vec<ValidationFailure>,
}

#[derive(Debug, Clone, Default)]
pub struct QualityValidator {
    config: ValidationConfig,
}

impl QualityValidator {
    #[must_use]
    pub fn new(config: ValidationConfig) -> Self {
        Self { config }
    }

    #[must_use]
    pub fn validate(&self, real: &MasterDataset, batch: &SyntheticBatch) -> ValidationReport {
        let mut fields = vec![];
        let mut skipped_fields = vec![];
        let mut real_columns = vec![];
        let mut synthetic_columns = vec![];

        for field in Field::ALL {
            let real_column = real.column(field);
            let synthetic_column = batch.column(field);
            let a = real_column.iter().flatten().copied().collect::<Vec<_>>();
            let b = synthetic_column.iter().flatten().copied().collect::<Vec<_>>();
            let Some(ks) = hypothesis::ks_two_sample(&a, &b) else {
                skipped_fields.push(field);
                continue;
            };
            tracing::debug!(%field, statistic = ks.statistic, p_value = ks.p_value, "ks test");
            fields.push(FieldSimilarity {
                field,
                ks_statistic: ks.statistic,
                p_value: ks.p_value,
                real_count: a.len(),
                synthetic_count: b.len(),
            });
            real_columns.push(real_column);
            synthetic_columns.push(synthetic_column);
        }

        let mut failures = vec![];
        let p_values = fields.iter().map(|f| f.p_value).collect::<Vec<_>>();
        let mean_p_value = railpulse_stats::descriptive::mean(&p_values);
        let correlation_difference = (!fields.is_empty()).then(|| {
            correlation::frobenius_difference(
                &correlation::correlation_matrix(&real_columns),
                &correlation::correlation_matrix(&synthetic_columns),
            )
        });

        match (mean_p_value, correlation_difference) {
            (Some(mean_p_value), Some(difference)) => {
                let config = self.config;
                if mean_p_value <= config.min_mean_p_value {
                    failures.push(ValidationFailure::LowMeanPValue {
                        mean_p_value,
                        threshold: config.min_mean_p_value,
                    });
                }
                if difference >= config.max_correlation_difference {
                    failures.push(ValidationFailure::CorrelationDrift {
                        difference,
                        threshold: config.max_correlation_difference,
                    });
                }
            }
            _ => failures.push(ValidationFailure::NoComparableFields),
        }

        let passed = failures.is_empty();
        if passed {
            tracing::info!(
                fields = fields.len(),
                mean_p_value,
                correlation_difference,
                "synthetic batch passed validation"
            );
        } else {
            for failure in &failures {
                tracing::warn!(%failure, "synthetic batch failed validation");
            }
        }
        ValidationReport {
            fields,
            skipped_fields,
            mean_p_value,
            correlation_difference,
            thresholds: self.config,
            passed,
            failures,
        }
    }
}

#[cfg(test)]
mod tests {
    use rand::{SeedableRng, seq::SliceRandom};
    use rand_pcg::Pcg64;

    use super::*;
    use crate::{
        generator::{
            DonorSampling, StrategyRecord, SynthesisConfig, SynthesisStrategy,
            SyntheticGenerator, SyntheticRecord,
        },
        testing::dataset,
    };

    fn batch(records: Vec<SyntheticRecord>) -> SyntheticBatch {
        SyntheticBatch {
            seed: 0,
            strategy: StrategyRecord::ResampleNoise {
                noise_scale: 0.0,
                sampling: DonorSampling::Bootstrap,
                fallback_reason: None,
            },
            records,
        }
    }

    fn copy(real: &MasterDataset) -> Vec<SyntheticRecord> {
        real.records()
            .iter()
            .map(|r| SyntheticRecord::new(r.key, r.values.clone()))
            .collect()
    }

    #[test]
    fn test_exact_copy_passes() {
        let real = dataset(30, 1, true);
        let report = QualityValidator::default().validate(&real, &batch(copy(&real)));

        assert!(report.passed, "{:?}", report.failures);
        assert_eq!(report.fields.len(), 4);
        assert!(report.fields.iter().all(|f| f.ks_statistic == 0.0));
        assert!(report.mean_p_value.unwrap() > 0.05);
        assert!(report.correlation_difference.unwrap() < 0.01);
        assert!(report.skipped_fields.contains(&Field::WindSpeedKmh));
    }

    #[test]
    fn test_zero_noise_permutation_matches_real_data() {
        let real = dataset(30, 2, true);
        let generator = SyntheticGenerator::new(SynthesisConfig {
            strategy: SynthesisStrategy::Resample,
            count: 2 * real.len(),
            noise_scale: 0.0,
            sampling: DonorSampling::Permutation,
            ..SynthesisConfig::default()
        })
        .unwrap();
        let report = QualityValidator::default().validate(&real, &generator.generate(&real).unwrap());

        assert!(report.passed, "{:?}", report.failures);
        assert_eq!(report.fields.len(), 4);
        assert!(report.fields.iter().all(|f| f.ks_statistic == 0.0));
        assert!(report.mean_p_value.unwrap() > 0.05);
        assert!(report.correlation_difference.unwrap() < 0.01);
    }

    #[test]
    fn test_zero_noise_bootstrap_passes() {
        let real = dataset(60, 2, false);
        let generator = SyntheticGenerator::new(SynthesisConfig {
            strategy: SynthesisStrategy::Resample,
            count: 2000,
            noise_scale: 0.0,
            ..SynthesisConfig::default()
        })
        .unwrap();
        let report = QualityValidator::default().validate(&real, &generator.generate(&real).unwrap());
        assert!(report.passed, "{:?}", report.failures);
        assert!(report.mean_p_value.unwrap() > 0.05);
        // drawing with replacement perturbs the correlations, but not past the limit
        assert!(report.correlation_difference.unwrap() < 0.1);
    }

    #[test]
    fn test_shifted_marginals_fail_p_value() {
        let real = dataset(30, 3, false);
        let mut records = copy(&real);
        for record in &mut records {
            let shrunk = record.values.iter().map(|(f, v)| (f, v * 0.5)).collect();
            record.values = shrunk;
        }
        let report = QualityValidator::default().validate(&real, &batch(records));

        assert!(!report.passed);
        assert!(matches!(
            report.failures.as_slice(),
            [ValidationFailure::LowMeanPValue { threshold, .. }] if *threshold == 0.05
        ));
    }

    #[test]
    fn test_broken_correlation_fails_drift() {
        let real = dataset(30, 4, false);
        let mut records = copy(&real);
        let mut cancellations = records
            .iter()
            .map(|r| r.values.get(Field::CancellationPct).unwrap())
            .collect::<Vec<_>>();
        cancellations.shuffle(&mut Pcg64::seed_from_u64(4));
        for (record, value) in records.iter_mut().zip(cancellations) {
            record.values.set(Field::CancellationPct, value);
        }
        let report = QualityValidator::default().validate(&real, &batch(records));

        // marginals are untouched
        assert!(report.fields.iter().all(|f| f.ks_statistic == 0.0));
        assert!(matches!(
            report.failures.as_slice(),
            [ValidationFailure::CorrelationDrift { difference, .. }] if *difference > 0.5
        ));
    }

    #[test]
    fn test_empty_batch_has_no_comparable_fields() {
        let real = dataset(5, 5, true);
        let report = QualityValidator::default().validate(&real, &batch(vec![]));
        assert!(!report.passed);
        assert_eq!(report.failures, vec![ValidationFailure::NoComparableFields]);
        assert_eq!(report.skipped_fields.len(), Field::ALL.len());
    }
}
