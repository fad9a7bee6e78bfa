//! Synthetic record generation from a master dataset.
//!
//! # Strategies
//!
//! - **Generative**: a [`TabularGan`] learns the joint distribution of the fields that
//!   are present in every record. Each synthetic record takes its key and its
//!   partially-null fields from a bootstrap donor row and its learned fields from the
//!   generator.
//! - **Resample + noise**: each synthetic record copies a donor row and adds
//!   `N(0, (noise_scale * σ_field)²)` to every present value. Keys are untouched.
//!
//! Donors are drawn with replacement ([`DonorSampling::Bootstrap`]) or as successive
//! shuffled passes over the dataset ([`DonorSampling::Permutation`]). A permutation
//! with zero noise and `count` equal to the dataset size reproduces the real records
//! exactly, in a different order.
//!
//! `auto` tries the generative strategy and falls back to resampling when the GAN
//! cannot be fitted (too few rows, non-finite losses, or generated moments outside
//! tolerance). The reason is kept in the batch's [`StrategyRecord`].
//!
//! Every output value is clamped to its field's valid range, and count fields are
//! rounded.

use nalgebra::DMatrix;
use railpulse_dataset::{
    master::{MasterDataset, MasterRecord},
    schema::{Field, FieldKind, FieldValues, RecordKey},
};
use rand::{Rng, SeedableRng, seq::SliceRandom};
use rand_distr::{Distribution, StandardNormal};
use rand_pcg::Pcg64;
use serde::{Deserialize, Serialize};

use crate::gan::{self, GanFit, GanParams, Standardizer, TabularGan};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SynthesisStrategy {
    /// GAN when the dataset is large enough, resample + noise otherwise.
    #[default]
    Auto,
    /// GAN regardless of `min_rows`; still falls back if fitting fails.
    Generative,
    /// Resample + noise only.
    Resample,
}

/// How donor rows are picked from the real dataset.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DonorSampling {
    /// Uniformly with replacement.
    #[default]
    Bootstrap,
    /// Every row once per shuffled pass; the last pass may be partial.
    Permutation,
}

impl DonorSampling {
    fn draw<R>(self, rows: usize, count: usize, rng: &mut R) -> Vec<usize>
    where
        R: Rng + ?Sized,
    {
        match self {
            Self::Bootstrap => (0..count).map(|_| rng.random_range(0..rows)).collect(),
            Self::Permutation => {
                let mut donors = Vec::with_capacity(count);
                while donors.len() < count {
                    let mut pass = (0..rows).collect::<Vec<_>>();
                    pass.shuffle(rng);
                    pass.truncate(count - donors.len());
                    donors.extend(pass);
                }
                donors
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SynthesisConfig {
    pub strategy: SynthesisStrategy,
    pub count: usize,
    pub seed: u64,
    pub noise_scale: f64,
    pub sampling: DonorSampling,
    pub gan: GanParams,
}

impl Default for SynthesisConfig {
    fn default() -> Self {
        Self {
            strategy: SynthesisStrategy::Auto,
            count: 1000,
            seed: 7,
            noise_scale: 0.1,
            sampling: DonorSampling::Bootstrap,
            gan: GanParams::default(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, derive_more::Display, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Moment {
    #[display("mean")]
    Mean,
    #[display("standard deviation")]
    StdDev,
}

/// Why the generative strategy could not be used.
#[derive(Debug, Clone, PartialEq, derive_more::Display, derive_more::Error, Serialize, Deserialize)]
#[serde(tag = "reason", rename_all = "snake_case")]
pub enum FitFailure {
    #[display("no numeric field is present in every record")]
    NoNumericFields,
    #[display("{rows} rows is below the {required} required to fit the generator")]
    TooFewRows { rows: usize, required: usize },
    #[display("generator loss became non-finite at epoch {epoch}")]
    NonFiniteLoss { epoch: usize },
    #[display(
        "generated {moment} of {field} is {generated:.3} but the real one is {real:.3} (tolerance {tolerance})"
    )]
    MomentMismatch {
        field: Field,
        moment: Moment,
        real: f64,
        generated: f64,
        tolerance: f64,
    },
}

/// Which strategy produced a batch and with which parameters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "strategy", rename_all = "snake_case")]
pub enum StrategyRecord {
    Generative {
        learned_fields: Vec<Field>,
        params: GanParams,
        fit: GanFit,
    },
    ResampleNoise {
        noise_scale: f64,
        sampling: DonorSampling,
        /// Set when the generative strategy was attempted and failed.
        fallback_reason: Option<FitFailure>,
    },
}

/// A master-record payload that is always flagged as synthetic.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SyntheticRecord {
    pub key: RecordKey,
    pub values: FieldValues,
    synthetic: bool,
}

impl SyntheticRecord {
    #[must_use]
    pub fn new(key: RecordKey, values: FieldValues) -> Self {
        Self {
            key,
            values,
            synthetic: true,
        }
    }

    #[must_use]
    pub fn is_synthetic(&self) -> bool {
        self.synthetic
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SyntheticBatch {
    pub seed: u64,
    pub strategy: StrategyRecord,
    pub records: Vec<SyntheticRecord>,
}

impl SyntheticBatch {
    #[must_use]
    pub fn len(&self) -> usize {
        self.records.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Values of `field` in record order, `None` where absent.
    #[must_use]
    pub fn column(&self, field: Field) -> Vec<Option<f64>> {
        self.records.iter().map(|r| r.values.get(field)).collect()
    }
}

#[derive(Debug, Clone, PartialEq, derive_more::Display, derive_more::Error)]
pub enum SynthError {
    #[display("cannot synthesize from an empty dataset")]
    EmptyDataset,
    #[display("invalid synthesis configuration: {reason}")]
    InvalidConfig { reason: String },
}

#[derive(Debug, Clone)]
pub struct SyntheticGenerator {
    config: SynthesisConfig,
}

impl SyntheticGenerator {
    pub fn new(config: SynthesisConfig) -> Result<Self, SynthError> {
        let invalid = |reason: &str| {
            Err(SynthError::InvalidConfig {
                reason: reason.to_owned(),
            })
        };
        if !(config.noise_scale.is_finite() && config.noise_scale >= 0.0) {
            return invalid("noise_scale must be a non-negative number");
        }
        let gan = &config.gan;
        if gan.noise_dim == 0 || gan.hidden == 0 || gan.batch_size == 0 {
            return invalid("gan noise_dim, hidden and batch_size must be positive");
        }
        if !(gan.learning_rate.is_finite() && gan.learning_rate > 0.0) {
            return invalid("gan learning_rate must be positive");
        }
        Ok(Self { config })
    }

    #[must_use]
    pub fn config(&self) -> &SynthesisConfig {
        &self.config
    }

    /// Generates `count` synthetic records. Running twice with the same seed and
    /// dataset gives the same batch.
    pub fn generate(&self, dataset: &MasterDataset) -> Result<SyntheticBatch, SynthError> {
        let records = dataset.records();
        if records.is_empty() {
            return Err(SynthError::EmptyDataset);
        }
        let mut rng = Pcg64::seed_from_u64(self.config.seed);

        let attempt = match self.config.strategy {
            SynthesisStrategy::Resample => None,
            SynthesisStrategy::Auto if records.len() < self.config.gan.min_rows => {
                Some(Err(FitFailure::TooFewRows {
                    rows: records.len(),
                    required: self.config.gan.min_rows,
                }))
            }
            SynthesisStrategy::Auto | SynthesisStrategy::Generative => {
                Some(self.generative(records, &mut rng))
            }
        };

        let (strategy, synthetic) = match attempt {
            Some(Ok(done)) => done,
            Some(Err(reason)) => {
                tracing::warn!(%reason, "generative synthesis failed; falling back to resample + noise");
                self.resample(dataset, Some(reason), &mut rng)
            }
            None => self.resample(dataset, None, &mut rng),
        };
        tracing::info!(
            count = synthetic.len(),
            strategy = strategy_name(&strategy),
            seed = self.config.seed,
            "generated synthetic batch"
        );
        Ok(SyntheticBatch {
            seed: self.config.seed,
            strategy,
            records: synthetic,
        })
    }

    fn generative<R>(
        &self,
        records: &[MasterRecord],
        rng: &mut R,
    ) -> Result<(StrategyRecord, Vec<SyntheticRecord>), FitFailure>
    where
        R: Rng + ?Sized,
    {
        const MIN_FIT_ROWS: usize = 2;
        if records.len() < MIN_FIT_ROWS {
            return Err(FitFailure::TooFewRows {
                rows: records.len(),
                required: MIN_FIT_ROWS,
            });
        }
        let learned = Field::ALL
            .into_iter()
            .filter(|f| records.iter().all(|r| r.values.get(*f).is_some()))
            .collect::<Vec<_>>();
        if learned.is_empty() {
            return Err(FitFailure::NoNumericFields);
        }

        let raw = DMatrix::from_fn(learned.len(), records.len(), |i, j| {
            records[j].values.get(learned[i]).unwrap_or_default()
        });
        let standardizer = Standardizer::fit(&raw);
        let real = standardizer.transform(&raw);

        let params = &self.config.gan;
        let mut gan = TabularGan::new(learned.len(), params, rng);
        let fit = gan.train(&real, rng)?;
        // check on at least as many samples as the real data has
        let generated = gan.sample(self.config.count.max(records.len()), rng);
        gan::check_moments(&real, &generated, &learned, params)?;
        let generated = standardizer.inverse(&generated);

        let donors = self.config.sampling.draw(records.len(), self.config.count, rng);
        let synthetic = donors
            .into_iter()
            .enumerate()
            .map(|(j, donor)| {
                let donor = &records[donor];
                let mut values = donor.values.clone();
                for (i, field) in learned.iter().enumerate() {
                    values.set(*field, finish(*field, generated[(i, j)]));
                }
                SyntheticRecord::new(donor.key, values)
            })
            .collect();
        let strategy = StrategyRecord::Generative {
            learned_fields: learned,
            params: params.clone(),
            fit,
        };
        Ok((strategy, synthetic))
    }

    fn resample<R>(
        &self,
        dataset: &MasterDataset,
        fallback_reason: Option<FitFailure>,
        rng: &mut R,
    ) -> (StrategyRecord, Vec<SyntheticRecord>)
    where
        R: Rng + ?Sized,
    {
        let records = dataset.records();
        let noise_scale = self.config.noise_scale;
        let sigmas = Field::ALL.map(|field| {
            let present = dataset.column(field).into_iter().flatten().collect::<Vec<_>>();
            railpulse_stats::descriptive::sample_std_dev(&present).unwrap_or(0.0) * noise_scale
        });

        let donors = self.config.sampling.draw(records.len(), self.config.count, rng);
        let synthetic = donors
            .into_iter()
            .map(|donor| {
                let donor = &records[donor];
                let values = donor
                    .values
                    .iter()
                    .map(|(field, value)| {
                        let sigma = sigmas[field as usize];
                        let noisy = if sigma > 0.0 {
                            let z: f64 = StandardNormal.sample(rng);
                            value + sigma * z
                        } else {
                            value
                        };
                        (field, finish(field, noisy))
                    })
                    .collect();
                SyntheticRecord::new(donor.key, values)
            })
            .collect();
        let strategy = StrategyRecord::ResampleNoise {
            noise_scale,
            sampling: self.config.sampling,
            fallback_reason,
        };
        (strategy, synthetic)
    }
}

fn strategy_name(strategy: &StrategyRecord) -> &'static str {
    match strategy {
        StrategyRecord::Generative { .. } => "generative",
        StrategyRecord::ResampleNoise { .. } => "resample_noise",
    }
}

/// Clamps to the field's range, rounding counts.
fn finish(field: Field, value: f64) -> f64 {
    let spec = field.spec();
    let value = if spec.kind == FieldKind::Count {
        value.round()
    } else {
        value
    };
    spec.clamp(value)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::dataset;

    fn config(strategy: SynthesisStrategy) -> SynthesisConfig {
        SynthesisConfig {
            strategy,
            count: 300,
            seed: 11,
            gan: GanParams {
                epochs: 15,
                ..GanParams::default()
            },
            ..SynthesisConfig::default()
        }
    }

    fn assert_valid(batch: &SyntheticBatch, real: &MasterDataset) {
        for record in &batch.records {
            assert!(record.is_synthetic());
            assert!(real.get(&record.key).is_some());
            assert!(record.values.get(Field::PunctualityPct).is_some());
            for (field, value) in record.values.iter() {
                assert!(field.spec().contains(value), "{field} = {value}");
            }
            if let Some(trains) = record.values.get(Field::TrainsPlanned) {
                assert_eq!(trains, trains.round());
            }
        }
    }

    #[test]
    fn test_resample_honours_count_and_ranges() {
        let real = dataset(40, 1, true);
        let generator = SyntheticGenerator::new(config(SynthesisStrategy::Resample)).unwrap();
        let batch = generator.generate(&real).unwrap();

        assert_eq!(batch.len(), 300);
        assert_eq!(batch.seed, 11);
        assert_eq!(
            batch.strategy,
            StrategyRecord::ResampleNoise {
                noise_scale: 0.1,
                sampling: DonorSampling::Bootstrap,
                fallback_reason: None
            }
        );
        assert_valid(&batch, &real);
        // partially-null fields stay partially null
        let precipitation = batch.column(Field::PrecipitationMm);
        assert!(precipitation.iter().any(Option::is_none));
        assert!(precipitation.iter().any(Option::is_some));
    }

    #[test]
    fn test_same_seed_same_batch() {
        let real = dataset(20, 2, true);
        let generator = SyntheticGenerator::new(config(SynthesisStrategy::Resample)).unwrap();
        assert_eq!(generator.generate(&real).unwrap(), generator.generate(&real).unwrap());
    }

    #[test]
    fn test_zero_noise_copies_donor_rows() {
        let real = dataset(10, 3, true);
        let generator = SyntheticGenerator::new(SynthesisConfig {
            noise_scale: 0.0,
            ..config(SynthesisStrategy::Resample)
        })
        .unwrap();
        for record in generator.generate(&real).unwrap().records {
            assert_eq!(real.get(&record.key).unwrap().values, record.values);
        }
    }

    #[test]
    fn test_permutation_covers_every_row_per_pass() {
        let real = dataset(5, 3, true);
        let rows = real.len();
        let generator = SyntheticGenerator::new(SynthesisConfig {
            noise_scale: 0.0,
            sampling: DonorSampling::Permutation,
            count: 2 * rows + 7,
            ..config(SynthesisStrategy::Resample)
        })
        .unwrap();
        let batch = generator.generate(&real).unwrap();
        assert_eq!(batch.len(), 2 * rows + 7);
        for pass in batch.records.chunks(rows).take(2) {
            let mut keys = pass.iter().map(|r| r.key).collect::<Vec<_>>();
            keys.sort_unstable();
            let expected = real.records().iter().map(|r| r.key).collect::<Vec<_>>();
            assert_eq!(keys, expected);
        }
        for record in &batch.records {
            assert_eq!(real.get(&record.key).unwrap().values, record.values);
        }
    }

    #[test]
    fn test_auto_with_few_rows_falls_back() {
        let real = dataset(2, 4, true);
        let generator = SyntheticGenerator::new(config(SynthesisStrategy::Auto)).unwrap();
        let batch = generator.generate(&real).unwrap();
        assert_eq!(
            batch.strategy,
            StrategyRecord::ResampleNoise {
                noise_scale: 0.1,
                sampling: DonorSampling::Bootstrap,
                fallback_reason: Some(FitFailure::TooFewRows {
                    rows: 20,
                    required: 50
                })
            }
        );
        assert_valid(&batch, &real);
    }

    #[test]
    fn test_failed_moment_check_falls_back() {
        let real = dataset(30, 5, true);
        let mut config = config(SynthesisStrategy::Generative);
        config.gan.mean_tolerance = 0.0;
        let batch = SyntheticGenerator::new(config).unwrap().generate(&real).unwrap();

        let StrategyRecord::ResampleNoise {
            fallback_reason: Some(reason),
            ..
        } = &batch.strategy
        else {
            panic!("expected a fallback, got {:?}", batch.strategy);
        };
        assert!(matches!(
            reason,
            FitFailure::MomentMismatch { moment: Moment::Mean, tolerance, .. } if *tolerance == 0.0
        ));
        assert!(reason.to_string().contains("mean"));
        assert_valid(&batch, &real);
    }

    #[test]
    fn test_generative_batch_overrides_learned_fields() {
        let real = dataset(30, 6, true);
        let mut config = config(SynthesisStrategy::Generative);
        config.gan.mean_tolerance = f64::INFINITY;
        config.gan.std_tolerance = f64::INFINITY;
        let batch = SyntheticGenerator::new(config).unwrap().generate(&real).unwrap();

        let StrategyRecord::Generative { learned_fields, fit, .. } = &batch.strategy else {
            panic!("expected the generative strategy, got {:?}", batch.strategy);
        };
        // precipitation has gaps, so only the fully-populated fields are learned
        assert_eq!(
            learned_fields,
            &vec![Field::TrainsPlanned, Field::PunctualityPct, Field::CancellationPct]
        );
        assert_eq!(fit.epochs, 15);
        assert_eq!(batch.len(), 300);
        assert_valid(&batch, &real);
    }

    #[test]
    fn test_strategy_record_serializes_reason() {
        let record = StrategyRecord::ResampleNoise {
            noise_scale: 0.1,
            sampling: DonorSampling::Permutation,
            fallback_reason: Some(FitFailure::NonFiniteLoss { epoch: 3 }),
        };
        let json = serde_json::to_value(&record).unwrap();
        assert_eq!(json["strategy"], "resample_noise");
        assert_eq!(json["sampling"], "permutation");
        assert_eq!(json["fallback_reason"]["reason"], "non_finite_loss");
        assert_eq!(json["fallback_reason"]["epoch"], 3);
    }

    #[test]
    fn test_rejects_negative_noise() {
        let result = SyntheticGenerator::new(SynthesisConfig {
            noise_scale: -1.0,
            ..SynthesisConfig::default()
        });
        assert!(matches!(result, Err(SynthError::InvalidConfig { .. })));
    }
}
