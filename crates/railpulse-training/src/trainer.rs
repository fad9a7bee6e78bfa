//! Cross-validated training of both model families.
//!
//! # Procedure
//!
//! 1. **Hold out** a stratified `test_fraction` of the vectors. The test rows take no
//!    part in model selection.
//! 2. **Fold** the remaining rows into `folds` stratified folds.
//! 3. **Cross-validate** every candidate of each family's grid: each fold fits on the
//!    other folds and is scored on itself.
//! 4. **Select** the candidate with the highest mean fold accuracy (first wins ties).
//! 5. **Refit** it on the whole training portion and score it once on the test rows.
//! 6. **Judge** acceptance from the mean cross-validated accuracy.
//!
//! # Parallelization
//!
//! Families run on scoped threads, and so do the folds of each candidate. Every fold
//! copies its own partition, uses its own seeded generator and returns an immutable
//! [`FoldMetrics`]; nothing is shared mutably across folds. Results do not depend on
//! thread scheduling.

use std::thread;

use chrono::Utc;
use railpulse_features::schema::FeatureSet;
use rand::SeedableRng;
use rand_pcg::Pcg64;
use serde::{Deserialize, Serialize};

use crate::{
    boosting::BoostingParams,
    forest::ForestParams,
    metrics::Metrics,
    model::{
        AcceptanceStatus, CandidateReport, CvReport, FoldMetrics, Hyperparameters, ModelFamily,
        TrainedModel,
    },
    split, weights,
};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TrainerConfig {
    pub families: Vec<ModelFamily>,
    pub test_fraction: f64,
    pub folds: usize,
    /// Mean CV accuracy must be strictly above this fraction for acceptance.
    pub acceptance_threshold: f64,
    pub seed: u64,
    pub forest_grid: Vec<ForestParams>,
    pub boosting_grid: Vec<BoostingParams>,
}

impl Default for TrainerConfig {
    fn default() -> Self {
        Self {
            families: ModelFamily::ALL.to_vec(),
            test_fraction: 0.2,
            folds: 5,
            acceptance_threshold: 0.75,
            seed: 42,
            forest_grid: vec![
                ForestParams {
                    max_depth: 6,
                    ..ForestParams::default()
                },
                ForestParams {
                    max_depth: 10,
                    ..ForestParams::default()
                },
            ],
            boosting_grid: vec![
                BoostingParams::default(),
                BoostingParams {
                    learning_rate: 0.05,
                    max_depth: 4,
                    ..BoostingParams::default()
                },
            ],
        }
    }
}

#[derive(Debug, Clone, PartialEq, derive_more::Display, derive_more::Error)]
pub enum TrainError {
    #[display("invalid trainer configuration: {reason}")]
    InvalidConfig { reason: String },
    #[display("{count} training vectors are too few, at least {required} are needed")]
    TooFewSamples { count: usize, required: usize },
    #[display("every vector has label {label}; at least two classes are needed")]
    SingleClass { label: String },
    #[display("vector {index} has {actual} values but the schema has {expected} features")]
    RaggedVector {
        index: usize,
        expected: usize,
        actual: usize,
    },
}

/// Rows of one training run, split into the selection and test portions.
struct Partition {
    n_classes: usize,
    train_rows: Vec<Vec<f64>>,
    train_labels: Vec<usize>,
    test_rows: Vec<Vec<f64>>,
    test_labels: Vec<usize>,
    folds: Vec<Vec<usize>>,
}

#[derive(Debug, Clone)]
pub struct Trainer {
    config: TrainerConfig,
}

impl Trainer {
    pub fn new(config: TrainerConfig) -> Result<Self, TrainError> {
        let invalid = |reason: &str| {
            Err(TrainError::InvalidConfig {
                reason: reason.to_owned(),
            })
        };
        if config.families.is_empty() {
            return invalid("no model family selected");
        }
        if config.folds < 2 {
            return invalid("cross-validation needs at least 2 folds");
        }
        if !(config.test_fraction > 0.0 && config.test_fraction < 1.0) {
            return invalid("test_fraction must be inside (0, 1)");
        }
        if !(0.0..=1.0).contains(&config.acceptance_threshold) {
            return invalid("acceptance_threshold is a fraction inside [0, 1]");
        }
        if config.families.contains(&ModelFamily::RandomForest) && config.forest_grid.is_empty() {
            return invalid("forest_grid is empty");
        }
        if config.families.contains(&ModelFamily::GradientBoosting)
            && config.boosting_grid.is_empty()
        {
            return invalid("boosting_grid is empty");
        }
        let boosting_ok = config.boosting_grid.iter().all(|p| {
            p.learning_rate > 0.0
                && p.subsample > 0.0
                && p.subsample <= 1.0
                && (0.0..1.0).contains(&p.validation_fraction)
        });
        if !boosting_ok {
            return invalid(
                "boosting needs learning_rate > 0, subsample in (0, 1] and validation_fraction in [0, 1)",
            );
        }
        Ok(Self { config })
    }

    #[must_use]
    pub fn config(&self) -> &TrainerConfig {
        &self.config
    }

    fn grid(&self, family: ModelFamily) -> Vec<Hyperparameters> {
        match family {
            ModelFamily::RandomForest => self
                .config
                .forest_grid
                .iter()
                .copied()
                .map(Hyperparameters::RandomForest)
                .collect(),
            ModelFamily::GradientBoosting => self
                .config
                .boosting_grid
                .iter()
                .copied()
                .map(Hyperparameters::GradientBoosting)
                .collect(),
        }
    }

    /// Seeded generator for one (family, candidate, fold) stream.
    fn stream_rng(&self, family: ModelFamily, candidate: usize, fold: usize) -> Pcg64 {
        let family_index = ModelFamily::ALL.iter().position(|f| *f == family).unwrap_or(0);
        let stream = ((family_index as u64) << 48) ^ ((candidate as u64) << 24) ^ (fold as u64 + 1);
        Pcg64::seed_from_u64(self.config.seed ^ stream.wrapping_mul(0x9E37_79B9_7F4A_7C15))
    }

    fn partition(&self, set: &FeatureSet) -> Result<Partition, TrainError> {
        let n_classes = set.schema.label.class_count();
        for (index, v) in set.vectors.iter().enumerate() {
            if v.values.len() != set.schema.len() {
                return Err(TrainError::RaggedVector {
                    index,
                    expected: set.schema.len(),
                    actual: v.values.len(),
                });
            }
        }
        let required = 2 * self.config.folds;
        if set.len() < required {
            return Err(TrainError::TooFewSamples {
                count: set.len(),
                required,
            });
        }
        let labels = set.labels();
        let counts = weights::class_counts(&labels, n_classes);
        if counts.iter().filter(|c| **c > 0).count() < 2 {
            let label = counts.iter().position(|c| *c > 0).unwrap_or(0);
            return Err(TrainError::SingleClass {
                label: set.schema.label.class_labels()[label].clone(),
            });
        }

        let mut rng = Pcg64::seed_from_u64(self.config.seed);
        let (train, test) =
            split::stratified_split(&labels, n_classes, self.config.test_fraction, &mut rng);
        if train.len() < self.config.folds || test.is_empty() {
            return Err(TrainError::TooFewSamples {
                count: set.len(),
                required,
            });
        }
        let take = |indices: &[usize]| {
            let rows = indices
                .iter()
                .map(|&i| set.vectors[i].values.clone())
                .collect::<Vec<_>>();
            let labels = indices.iter().map(|&i| labels[i]).collect::<Vec<_>>();
            (rows, labels)
        };
        let (train_rows, train_labels) = take(&train);
        let (test_rows, test_labels) = take(&test);
        let folds = split::stratified_folds(&train_labels, n_classes, self.config.folds, &mut rng);
        Ok(Partition {
            n_classes,
            train_rows,
            train_labels,
            test_rows,
            test_labels,
            folds,
        })
    }

    /// Trains every configured family on `set` and returns one artifact per family.
    ///
    /// An artifact is returned even when its accuracy is below the acceptance threshold;
    /// check [`TrainedModel::status`].
    pub fn train(&self, set: &FeatureSet) -> Result<Vec<TrainedModel>, TrainError> {
        let data = self.partition(set)?;
        tracing::info!(
            vectors = set.len(),
            train = data.train_rows.len(),
            test = data.test_rows.len(),
            folds = self.config.folds,
            families = self.config.families.len(),
            "training models"
        );

        let mut models = vec![None; self.config.families.len()];
        thread::scope(|s| {
            for (&family, slot) in self.config.families.iter().zip(&mut models) {
                let data = &data;
                s.spawn(move || {
                    *slot = Some(self.train_family(family, set, data));
                });
            }
        });
        Ok(models.into_iter().flatten().collect())
    }

    fn train_family(&self, family: ModelFamily, set: &FeatureSet, data: &Partition) -> TrainedModel {
        let candidates = self
            .grid(family)
            .into_iter()
            .enumerate()
            .map(|(c, hp)| self.cross_validate(family, c, hp, data))
            .collect::<Vec<_>>();
        let mut best = 0;
        for (i, candidate) in candidates.iter().enumerate() {
            if candidate.mean.accuracy > candidates[best].mean.accuracy {
                best = i;
            }
        }
        let cv = CvReport {
            fold_count: self.config.folds,
            candidates,
            best,
        };
        let chosen = cv.best();
        let hyperparameters = chosen.hyperparameters;
        let mean_accuracy = chosen.mean.accuracy;

        let mut rng = self.stream_rng(family, best, self.config.folds);
        let fitted = hyperparameters.fit(&data.train_rows, &data.train_labels, data.n_classes, &mut rng);
        let probabilities = data
            .test_rows
            .iter()
            .map(|x| fitted.predict_proba(x))
            .collect::<Vec<_>>();
        let test_metrics = Metrics::evaluate(&data.test_labels, &probabilities, data.n_classes);

        let status = AcceptanceStatus::judge(mean_accuracy, self.config.acceptance_threshold);
        match status {
            AcceptanceStatus::Accepted => tracing::info!(
                %family,
                mean_accuracy,
                test_accuracy = test_metrics.accuracy,
                "model accepted"
            ),
            AcceptanceStatus::BelowThreshold { threshold, .. } => tracing::warn!(
                %family,
                mean_accuracy,
                threshold,
                "model below acceptance threshold"
            ),
        }
        TrainedModel::new(
            hyperparameters,
            fitted,
            set.schema.clone(),
            cv,
            test_metrics,
            status,
            Utc::now(),
        )
    }

    fn cross_validate(
        &self,
        family: ModelFamily,
        candidate: usize,
        hyperparameters: Hyperparameters,
        data: &Partition,
    ) -> CandidateReport {
        let mut folds = vec![None; data.folds.len()];
        thread::scope(|s| {
            for (fold, slot) in folds.iter_mut().enumerate() {
                let mut rng = self.stream_rng(family, candidate, fold);
                s.spawn(move || {
                    *slot = Some(run_fold(&hyperparameters, fold, data, &mut rng));
                });
            }
        });
        let folds = folds.into_iter().flatten().collect::<Vec<FoldMetrics>>();
        let mean = Metrics::mean(&folds.iter().map(|f| f.metrics).collect::<Vec<_>>())
            .unwrap_or_default();
        tracing::debug!(
            %family,
            candidate,
            accuracy = mean.accuracy,
            f1 = mean.f1,
            auc = mean.auc,
            "cross-validated candidate"
        );
        CandidateReport {
            hyperparameters,
            folds,
            mean,
        }
    }
}

fn run_fold(
    hyperparameters: &Hyperparameters,
    fold: usize,
    data: &Partition,
    rng: &mut Pcg64,
) -> FoldMetrics {
    let validation = &data.folds[fold];
    let mut train_rows = vec![];
    let mut train_labels = vec![];
    for (_, indices) in data.folds.iter().enumerate().filter(|(i, _)| *i != fold) {
        for &i in indices {
            train_rows.push(data.train_rows[i].clone());
            train_labels.push(data.train_labels[i]);
        }
    }
    let fitted = hyperparameters.fit(&train_rows, &train_labels, data.n_classes, rng);
    let labels = validation
        .iter()
        .map(|&i| data.train_labels[i])
        .collect::<Vec<_>>();
    let probabilities = validation
        .iter()
        .map(|&i| fitted.predict_proba(&data.train_rows[i]))
        .collect::<Vec<_>>();
    FoldMetrics {
        fold,
        train_size: train_rows.len(),
        validation_size: validation.len(),
        metrics: Metrics::evaluate(&labels, &probabilities, data.n_classes),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{feature_set, flipped_feature_set};

    fn quick_config() -> TrainerConfig {
        TrainerConfig {
            forest_grid: vec![ForestParams {
                n_estimators: 20,
                max_depth: 5,
                ..ForestParams::default()
            }],
            boosting_grid: vec![
                BoostingParams {
                    max_rounds: 30,
                    ..BoostingParams::default()
                },
                BoostingParams {
                    max_rounds: 30,
                    learning_rate: 0.3,
                    max_depth: 2,
                    ..BoostingParams::default()
                },
            ],
            ..TrainerConfig::default()
        }
    }

    #[test]
    fn test_separable_data_is_accepted() {
        // 80% of labels follow the signal, the rest are coin flips
        let set = feature_set(400, 0.8, 1);
        let models = Trainer::new(quick_config()).unwrap().train(&set).unwrap();
        assert_eq!(models.len(), 2);
        for model in &models {
            let best = model.cv().best();
            assert_eq!(best.folds.len(), 5);
            assert!(best.mean.accuracy >= 0.75, "{}: {:?}", model.family(), best.mean);
            assert!(model.status().is_accepted());
            assert!(model.test_metrics().accuracy > 0.7);
            assert_eq!(model.schema_hash(), set.schema.hash());
        }
        assert_eq!(models[1].cv().candidates.len(), 2);
    }

    #[test]
    fn test_eighty_percent_separable_clears_threshold() {
        // exactly a fifth of the labels contradict the signal
        let set = flipped_feature_set(1000, 200, 5);
        let consistent = set
            .vectors
            .iter()
            .filter(|v| v.label == usize::from(v.values[0] < 0.0))
            .count();
        assert_eq!(consistent, 800);

        let config = TrainerConfig {
            acceptance_threshold: 0.75,
            ..quick_config()
        };
        let models = Trainer::new(config).unwrap().train(&set).unwrap();
        assert_eq!(models.len(), 2);
        for model in &models {
            let accuracy = model.cv().best().mean.accuracy;
            assert!(accuracy >= 0.75, "{}: {accuracy}", model.family());
            assert!(accuracy < 0.86, "{}: {accuracy}", model.family());
            assert_eq!(model.status(), AcceptanceStatus::Accepted);
        }
    }

    #[test]
    fn test_label_noise_stays_near_chance() {
        let set = feature_set(400, 0.0, 2);
        let models = Trainer::new(quick_config()).unwrap().train(&set).unwrap();
        for model in &models {
            let accuracy = model.cv().best().mean.accuracy;
            assert!((accuracy - 0.5).abs() < 0.12, "{}: {accuracy}", model.family());
            assert!(matches!(
                model.status(),
                AcceptanceStatus::BelowThreshold { threshold, .. } if threshold == 0.75
            ));
        }
    }

    #[test]
    fn test_training_is_reproducible() {
        let set = feature_set(120, 0.9, 3);
        let config = TrainerConfig {
            families: vec![ModelFamily::RandomForest],
            ..quick_config()
        };
        let trainer = Trainer::new(config).unwrap();
        let a = trainer.train(&set).unwrap();
        let b = trainer.train(&set).unwrap();
        assert_eq!(a[0].cv(), b[0].cv());
        assert_eq!(a[0].fitted(), b[0].fitted());
    }

    #[test]
    fn test_rejects_bad_inputs() {
        let one_fold = TrainerConfig {
            folds: 1,
            ..TrainerConfig::default()
        };
        assert!(matches!(
            Trainer::new(one_fold),
            Err(TrainError::InvalidConfig { .. })
        ));

        let trainer = Trainer::new(quick_config()).unwrap();
        let mut set = feature_set(100, 1.0, 4);
        set.vectors.iter_mut().for_each(|v| v.label = 0);
        assert_eq!(
            trainer.train(&set).unwrap_err(),
            TrainError::SingleClass {
                label: "acceptable".to_owned()
            }
        );

        let tiny = feature_set(6, 1.0, 5);
        assert!(matches!(
            trainer.train(&tiny),
            Err(TrainError::TooFewSamples { required: 10, .. })
        ));
    }
}
