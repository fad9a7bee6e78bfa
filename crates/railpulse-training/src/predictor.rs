//! Scoring of feature vectors with a trained model.
//!
//! A [`Predictor`] shares an immutable [`TrainedModel`]; a retraining run publishes a
//! new artifact and never touches the one being served.

use std::{collections::BTreeMap, sync::Arc};

use railpulse_features::schema::{FeatureSchema, FeatureVector};
use serde::{Deserialize, Serialize};

use crate::{
    metrics,
    model::{ModelFamily, TrainedModel},
};

/// Two-sided 95% normal quantile.
const Z_95: f64 = 1.959_963_984_540_054;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Attribution {
    pub feature: String,
    pub contribution: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ConfidenceInterval {
    pub level: f64,
    pub lower: f64,
    pub upper: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PredictionResult {
    pub probabilities: Vec<f64>,
    pub class: usize,
    pub class_label: String,
    /// Probability of the riskiest class.
    pub risk_score: f64,
    /// Risk score of the model with no feature information.
    pub baseline: f64,
    /// Per-feature contributions in schema order; they add up to `risk_score - baseline`.
    pub attributions: Vec<Attribution>,
    /// Interval around `risk_score` from the spread of the ensemble members, clamped to [0, 1].
    pub confidence_interval: ConfidenceInterval,
}

#[derive(Debug, Clone, PartialEq, derive_more::Display, derive_more::Error)]
pub enum PredictError {
    #[display(
        "feature schema {actual_hash} does not match the model schema {expected_hash} (missing: {missing:?}, unexpected: {unexpected:?})"
    )]
    SchemaMismatch {
        expected_hash: String,
        actual_hash: String,
        missing: Vec<String>,
        unexpected: Vec<String>,
    },
    #[display("feature {feature} is not finite: {value}")]
    NonFinite { feature: String, value: f64 },
}

#[derive(Debug, Clone)]
pub struct Predictor {
    model: Arc<TrainedModel>,
}

impl Predictor {
    #[must_use]
    pub fn new(model: Arc<TrainedModel>) -> Self {
        Self { model }
    }

    #[must_use]
    pub fn model(&self) -> &Arc<TrainedModel> {
        &self.model
    }

    fn mismatch(&self, names: &[String]) -> PredictError {
        let expected = &self.model.schema().names;
        let missing = expected
            .iter()
            .filter(|n| !names.contains(n))
            .cloned()
            .collect();
        let unexpected = names
            .iter()
            .filter(|n| !expected.contains(n))
            .cloned()
            .collect();
        let actual = FeatureSchema::new(names.to_vec(), self.model.schema().label.clone());
        PredictError::SchemaMismatch {
            expected_hash: self.model.schema_hash().to_owned(),
            actual_hash: actual.hash(),
            missing,
            unexpected,
        }
    }

    /// Scores a vector built under `schema`, which must hash to the model's schema.
    pub fn predict(
        &self,
        vector: &FeatureVector,
        schema: &FeatureSchema,
    ) -> Result<PredictionResult, PredictError> {
        if schema.hash() != self.model.schema_hash() || vector.values.len() != schema.len() {
            let mut error = self.mismatch(&schema.names);
            if let PredictError::SchemaMismatch { actual_hash, .. } = &mut error {
                *actual_hash = schema.hash();
            }
            return Err(error);
        }
        self.score(&vector.values)
    }

    /// Scores features given by name. The names must be exactly the model's features.
    pub fn predict_named(
        &self,
        features: &BTreeMap<String, f64>,
    ) -> Result<PredictionResult, PredictError> {
        let names = self.model.schema().names.clone();
        let values = names
            .iter()
            .map(|n| features.get(n).copied())
            .collect::<Option<Vec<_>>>();
        match values {
            Some(values) if features.len() == names.len() => self.score(&values),
            _ => Err(self.mismatch(&features.keys().cloned().collect::<Vec<_>>())),
        }
    }

    #[expect(clippy::cast_precision_loss)]
    fn score(&self, x: &[f64]) -> Result<PredictionResult, PredictError> {
        let names = &self.model.schema().names;
        if let Some((name, value)) = names.iter().zip(x).find(|(_, v)| !v.is_finite()) {
            return Err(PredictError::NonFinite {
                feature: name.clone(),
                value: *value,
            });
        }

        let fitted = self.model.fitted();
        let risk_class = self.model.risk_class();
        let probabilities = fitted.predict_proba(x);
        let class = metrics::argmax(&probabilities);
        let risk_score = probabilities[risk_class];
        let (baseline, contributions) = fitted.explain(x, risk_class);

        let members = fitted.member_scores(x, risk_class);
        let n = members.len() as f64;
        let spread = match self.model.family() {
            ModelFamily::RandomForest => {
                railpulse_stats::descriptive::sample_std_dev(&members).map(|s| s / n.sqrt())
            }
            ModelFamily::GradientBoosting => jackknife_std_error(&members),
        }
        .unwrap_or(0.0);

        Ok(PredictionResult {
            class_label: self.model.class_labels()[class].clone(),
            probabilities,
            class,
            risk_score,
            baseline,
            attributions: names
                .iter()
                .zip(contributions)
                .map(|(feature, contribution)| Attribution {
                    feature: feature.clone(),
                    contribution,
                })
                .collect(),
            confidence_interval: ConfidenceInterval {
                level: 0.95,
                lower: (risk_score - Z_95 * spread).clamp(0.0, 1.0),
                upper: (risk_score + Z_95 * spread).clamp(0.0, 1.0),
            },
        })
    }
}

/// Jackknife standard error from leave-one-out estimates.
#[expect(clippy::cast_precision_loss)]
fn jackknife_std_error(leave_one_out: &[f64]) -> Option<f64> {
    if leave_one_out.len() < 2 {
        return None;
    }
    let n = leave_one_out.len() as f64;
    let mean = railpulse_stats::descriptive::mean(leave_one_out)?;
    let sum_sq = leave_one_out.iter().map(|v| (v - mean).powi(2)).sum::<f64>();
    Some(((n - 1.0) / n * sum_sq).sqrt())
}
