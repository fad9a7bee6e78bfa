//! Trained model artifacts.
//!
//! A [`TrainedModel`] binds a fitted ensemble to the [`FeatureSchema`] it was trained
//! against, the hyperparameters that produced it and its validation metrics. It has no
//! mutating methods; retraining produces a new artifact.

use chrono::{DateTime, Utc};
use railpulse_features::schema::FeatureSchema;
use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::{
    boosting::{BoostingParams, GradientBoosting},
    forest::{ForestParams, RandomForest},
    metrics::Metrics,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ModelFamily {
    RandomForest,
    GradientBoosting,
}

impl ModelFamily {
    pub const ALL: [ModelFamily; 2] = [ModelFamily::RandomForest, ModelFamily::GradientBoosting];

    #[must_use]
    pub fn id(self) -> &'static str {
        match self {
            ModelFamily::RandomForest => "random_forest",
            ModelFamily::GradientBoosting => "gradient_boosting",
        }
    }
}

impl std::fmt::Display for ModelFamily {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.id())
    }
}

/// One candidate configuration of a model family.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "family", rename_all = "snake_case")]
pub enum Hyperparameters {
    RandomForest(ForestParams),
    GradientBoosting(BoostingParams),
}

impl Hyperparameters {
    #[must_use]
    pub fn family(&self) -> ModelFamily {
        match self {
            Hyperparameters::RandomForest(_) => ModelFamily::RandomForest,
            Hyperparameters::GradientBoosting(_) => ModelFamily::GradientBoosting,
        }
    }

    pub fn fit<R>(&self, rows: &[Vec<f64>], labels: &[usize], n_classes: usize, rng: &mut R) -> FittedModel
    where
        R: Rng + ?Sized,
    {
        match self {
            Hyperparameters::RandomForest(params) => {
                FittedModel::RandomForest(RandomForest::fit(rows, labels, n_classes, params, rng))
            }
            Hyperparameters::GradientBoosting(params) => FittedModel::GradientBoosting(
                GradientBoosting::fit(rows, labels, n_classes, params, rng),
            ),
        }
    }
}

/// Fitted parameters of either family.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "family", rename_all = "snake_case")]
pub enum FittedModel {
    RandomForest(RandomForest),
    GradientBoosting(GradientBoosting),
}

impl FittedModel {
    #[must_use]
    pub fn predict_proba(&self, x: &[f64]) -> Vec<f64> {
        match self {
            FittedModel::RandomForest(m) => m.predict_proba(x),
            FittedModel::GradientBoosting(m) => m.predict_proba(x),
        }
    }

    /// Per-member probabilities of `class`: one per tree for forests, one per
    /// left-out round for boosting.
    #[must_use]
    pub fn member_scores(&self, x: &[f64], class: usize) -> Vec<f64> {
        match self {
            FittedModel::RandomForest(m) => m.member_scores(x, class),
            FittedModel::GradientBoosting(m) => m.member_scores(x, class),
        }
    }

    #[must_use]
    pub fn explain(&self, x: &[f64], class: usize) -> (f64, Vec<f64>) {
        match self {
            FittedModel::RandomForest(m) => m.explain(x, class),
            FittedModel::GradientBoosting(m) => m.explain(x, class),
        }
    }
}

/// Whether the cross-validated accuracy cleared the acceptance threshold.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum AcceptanceStatus {
    Accepted,
    BelowThreshold { mean_accuracy: f64, threshold: f64 },
}

impl AcceptanceStatus {
    /// `Accepted` only when `mean_accuracy` is strictly above `threshold`.
    #[must_use]
    pub fn judge(mean_accuracy: f64, threshold: f64) -> Self {
        if mean_accuracy > threshold {
            AcceptanceStatus::Accepted
        } else {
            AcceptanceStatus::BelowThreshold {
                mean_accuracy,
                threshold,
            }
        }
    }

    #[must_use]
    pub fn is_accepted(&self) -> bool {
        matches!(self, AcceptanceStatus::Accepted)
    }
}

/// Metrics of one validation fold.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct FoldMetrics {
    pub fold: usize,
    pub train_size: usize,
    pub validation_size: usize,
    #[serde(flatten)]
    pub metrics: Metrics,
}

/// Cross-validation result of one grid candidate.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CandidateReport {
    pub hyperparameters: Hyperparameters,
    pub folds: Vec<FoldMetrics>,
    pub mean: Metrics,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CvReport {
    pub fold_count: usize,
    pub candidates: Vec<CandidateReport>,
    /// Index of the selected candidate.
    pub best: usize,
}

impl CvReport {
    #[must_use]
    pub fn best(&self) -> &CandidateReport {
        &self.candidates[self.best]
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrainedModel {
    family: ModelFamily,
    hyperparameters: Hyperparameters,
    fitted: FittedModel,
    schema: FeatureSchema,
    schema_hash: String,
    class_labels: Vec<String>,
    cv: CvReport,
    test_metrics: Metrics,
    status: AcceptanceStatus,
    trained_at: DateTime<Utc>,
}

impl TrainedModel {
    pub(crate) fn new(
        hyperparameters: Hyperparameters,
        fitted: FittedModel,
        schema: FeatureSchema,
        cv: CvReport,
        test_metrics: Metrics,
        status: AcceptanceStatus,
        trained_at: DateTime<Utc>,
    ) -> Self {
        Self {
            family: hyperparameters.family(),
            hyperparameters,
            fitted,
            schema_hash: schema.hash(),
            class_labels: schema.label.class_labels(),
            schema,
            cv,
            test_metrics,
            status,
            trained_at,
        }
    }

    #[must_use]
    pub fn family(&self) -> ModelFamily {
        self.family
    }

    #[must_use]
    pub fn hyperparameters(&self) -> &Hyperparameters {
        &self.hyperparameters
    }

    #[must_use]
    pub fn fitted(&self) -> &FittedModel {
        &self.fitted
    }

    #[must_use]
    pub fn schema(&self) -> &FeatureSchema {
        &self.schema
    }

    /// Schema hash recorded at training time.
    #[must_use]
    pub fn schema_hash(&self) -> &str {
        &self.schema_hash
    }

    #[must_use]
    pub fn class_labels(&self) -> &[String] {
        &self.class_labels
    }

    /// The riskiest class: the highest label index.
    #[must_use]
    pub fn risk_class(&self) -> usize {
        self.class_labels.len().saturating_sub(1)
    }

    #[must_use]
    pub fn cv(&self) -> &CvReport {
        &self.cv
    }

    #[must_use]
    pub fn test_metrics(&self) -> &Metrics {
        &self.test_metrics
    }

    #[must_use]
    pub fn status(&self) -> AcceptanceStatus {
        self.status
    }

    #[must_use]
    pub fn trained_at(&self) -> DateTime<Utc> {
        self.trained_at
    }

    /// `{family}-{first 12 hex digits of the schema hash}`.
    #[must_use]
    pub fn key(&self) -> String {
        model_key(self.family, &self.schema_hash)
    }
}

#[must_use]
pub fn model_key(family: ModelFamily, schema_hash: &str) -> String {
    let prefix = schema_hash.get(..12).unwrap_or(schema_hash);
    format!("{family}-{prefix}")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_acceptance_is_strict() {
        assert!(AcceptanceStatus::judge(0.76, 0.75).is_accepted());
        assert_eq!(
            AcceptanceStatus::judge(0.75, 0.75),
            AcceptanceStatus::BelowThreshold {
                mean_accuracy: 0.75,
                threshold: 0.75
            }
        );
    }

    #[test]
    fn test_model_key_uses_hash_prefix() {
        assert_eq!(
            model_key(ModelFamily::RandomForest, "0123456789abcdef"),
            "random_forest-0123456789ab"
        );
        assert_eq!(model_key(ModelFamily::GradientBoosting, "abc"), "gradient_boosting-abc");
    }

    #[test]
    fn test_hyperparameters_serialize_with_family_tag() {
        let hp = Hyperparameters::RandomForest(ForestParams::default());
        let json = serde_json::to_value(hp).unwrap();
        assert_eq!(json["family"], "random_forest");
        let back: Hyperparameters = serde_json::from_value(json).unwrap();
        assert_eq!(back.family(), ModelFamily::RandomForest);
    }
}
