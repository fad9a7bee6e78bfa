//! Softmax gradient boosting with Newton leaves.
//!
//! # Algorithm Overview
//!
//! The model keeps one raw score per class, starting from the log of the weighted class
//! priors. Every round fits one regression tree per class to the gradient and hessian
//! of the weighted softmax cross-entropy:
//!
//! ```text
//! g_ik = w_i * (p_ik - y_ik)
//! h_ik = w_i * p_ik * (1 - p_ik)
//! ```
//!
//! Leaves hold the penalized Newton step `-G / (H + λ)`, and scores move by
//! `learning_rate` times the leaf value. Each round trains on a random `subsample` of
//! the fitting rows.
//!
//! # Early Stopping
//!
//! A stratified `validation_fraction` of the training rows is held back. After every
//! round the weighted validation log-loss is recorded; when it has not improved for
//! `patience` rounds, training stops and the model is truncated to the best round.

use rand::{Rng, seq::index};
use serde::{Deserialize, Serialize};

use crate::{
    split,
    tree::{Newton, Tree, TreeParams},
    weights,
};

const MIN_HESSIAN: f64 = 1e-6;
const MIN_PROBABILITY: f64 = 1e-12;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BoostingParams {
    pub max_rounds: usize,
    pub learning_rate: f64,
    pub max_depth: usize,
    pub min_samples_leaf: usize,
    /// Fraction of fitting rows drawn without replacement for each round.
    pub subsample: f64,
    /// L2 penalty on leaf values.
    pub lambda: f64,
    pub patience: usize,
    pub validation_fraction: f64,
}

impl Default for BoostingParams {
    fn default() -> Self {
        Self {
            max_rounds: 200,
            learning_rate: 0.1,
            max_depth: 3,
            min_samples_leaf: 5,
            subsample: 0.8,
            lambda: 1.0,
            patience: 10,
            validation_fraction: 0.1,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GradientBoosting {
    n_classes: usize,
    learning_rate: f64,
    initial_scores: Vec<f64>,
    /// One tree per class for every kept round.
    rounds: Vec<Vec<Tree>>,
    best_validation_loss: Option<f64>,
}

impl GradientBoosting {
    #[expect(
        clippy::cast_precision_loss,
        clippy::cast_possible_truncation,
        clippy::cast_sign_loss
    )]
    pub fn fit<R>(
        rows: &[Vec<f64>],
        labels: &[usize],
        n_classes: usize,
        params: &BoostingParams,
        rng: &mut R,
    ) -> Self
    where
        R: Rng + ?Sized,
    {
        assert_eq!(rows.len(), labels.len());
        assert!(!rows.is_empty());
        let sample_weights = weights::balanced(labels, n_classes);
        let (fit_set, validation_set) =
            split::stratified_split(labels, n_classes, params.validation_fraction, rng);
        let fit_set = if fit_set.is_empty() {
            (0..rows.len()).collect()
        } else {
            fit_set
        };

        let mut prior = vec![0.0; n_classes];
        for &i in &fit_set {
            prior[labels[i]] += sample_weights[i];
        }
        let total = prior.iter().sum::<f64>();
        let initial_scores = prior
            .iter()
            .map(|w| (w / total).max(MIN_PROBABILITY).ln())
            .collect::<Vec<_>>();

        let mut model = Self {
            n_classes,
            learning_rate: params.learning_rate,
            initial_scores,
            rounds: vec![],
            best_validation_loss: None,
        };
        let tree_params = TreeParams {
            max_depth: params.max_depth,
            min_samples_leaf: params.min_samples_leaf,
            max_features: None,
        };
        let draw = ((params.subsample.clamp(0.0, 1.0) * fit_set.len() as f64).ceil() as usize)
            .clamp(1, fit_set.len());

        let mut scores = vec![model.initial_scores.clone(); rows.len()];
        let mut gradients = vec![0.0; rows.len()];
        let mut hessians = vec![0.0; rows.len()];
        let mut best_round = 0;
        let mut stale = 0;
        for round in 0..params.max_rounds {
            let probabilities = scores.iter().map(|s| softmax(s)).collect::<Vec<_>>();
            let samples = index::sample(rng, fit_set.len(), draw)
                .into_iter()
                .map(|i| fit_set[i])
                .collect::<Vec<_>>();

            let mut trees = Vec::with_capacity(n_classes);
            for class in 0..n_classes {
                for &i in &fit_set {
                    let p = probabilities[i][class];
                    let y = if labels[i] == class { 1.0 } else { 0.0 };
                    gradients[i] = sample_weights[i] * (p - y);
                    hessians[i] = sample_weights[i] * (p * (1.0 - p)).max(MIN_HESSIAN);
                }
                let criterion = Newton {
                    gradients: &gradients,
                    hessians: &hessians,
                    lambda: params.lambda,
                };
                trees.push(Tree::grow(rows, &samples, &criterion, &tree_params, rng));
            }
            for (row, score) in rows.iter().zip(&mut scores) {
                for (s, tree) in score.iter_mut().zip(&trees) {
                    *s += params.learning_rate * tree.predict(row)[0];
                }
            }
            model.rounds.push(trees);

            if validation_set.is_empty() {
                continue;
            }
            let loss = log_loss(&validation_set, labels, &sample_weights, &scores);
            tracing::debug!(round, loss, "boosting round");
            if model.best_validation_loss.is_none_or(|best| loss < best - 1e-12) {
                model.best_validation_loss = Some(loss);
                best_round = round + 1;
                stale = 0;
            } else {
                stale += 1;
                if stale >= params.patience {
                    break;
                }
            }
        }
        if model.best_validation_loss.is_some() {
            model.rounds.truncate(best_round);
        }
        tracing::debug!(
            rounds = model.rounds.len(),
            validation_loss = model.best_validation_loss,
            "fitted gradient boosting"
        );
        model
    }

    #[must_use]
    pub fn n_classes(&self) -> usize {
        self.n_classes
    }

    #[must_use]
    pub fn rounds(&self) -> usize {
        self.rounds.len()
    }

    #[must_use]
    pub fn best_validation_loss(&self) -> Option<f64> {
        self.best_validation_loss
    }

    fn round_scores(&self, x: &[f64], round: &[Tree]) -> Vec<f64> {
        round
            .iter()
            .map(|tree| self.learning_rate * tree.predict(x)[0])
            .collect()
    }

    /// Raw per-class scores before the softmax.
    #[must_use]
    pub fn raw_scores(&self, x: &[f64]) -> Vec<f64> {
        let mut scores = self.initial_scores.clone();
        for round in &self.rounds {
            for (s, r) in scores.iter_mut().zip(self.round_scores(x, round)) {
                *s += r;
            }
        }
        scores
    }

    #[must_use]
    pub fn predict_proba(&self, x: &[f64]) -> Vec<f64> {
        softmax(&self.raw_scores(x))
    }

    /// Probability of `class` with each round left out in turn.
    #[must_use]
    pub fn member_scores(&self, x: &[f64], class: usize) -> Vec<f64> {
        let full = self.raw_scores(x);
        self.rounds
            .iter()
            .map(|round| {
                let reduced = full
                    .iter()
                    .zip(self.round_scores(x, round))
                    .map(|(s, r)| s - r)
                    .collect::<Vec<_>>();
                softmax(&reduced)[class]
            })
            .collect()
    }

    /// Returns the baseline probability of `class` and per-feature contributions.
    ///
    /// Path contributions are collected in score space, turned into the margin of
    /// `class` over the baseline-weighted mean of all classes, then rescaled so they sum
    /// to the probability gap between prediction and baseline.
    #[must_use]
    pub fn explain(&self, x: &[f64], class: usize) -> (f64, Vec<f64>) {
        let mut base_scores = self.initial_scores.clone();
        let mut per_class = vec![vec![0.0; x.len()]; self.n_classes];
        for round in &self.rounds {
            for (k, tree) in round.iter().enumerate() {
                base_scores[k] += self.learning_rate * tree.root_value()[0];
                let mut contributions = vec![0.0; x.len()];
                tree.explain(x, 0, &mut contributions);
                for (total, c) in per_class[k].iter_mut().zip(contributions) {
                    *total += self.learning_rate * c;
                }
            }
        }
        let base_probabilities = softmax(&base_scores);
        let baseline = base_probabilities[class];
        let margins = (0..x.len())
            .map(|f| {
                let mean = (0..self.n_classes)
                    .map(|k| base_probabilities[k] * per_class[k][f])
                    .sum::<f64>();
                per_class[class][f] - mean
            })
            .collect::<Vec<_>>();

        let gap = self.predict_proba(x)[class] - baseline;
        let margin_total = margins.iter().sum::<f64>();
        let contributions = if margin_total.abs() > 1e-12 {
            margins.iter().map(|m| m * gap / margin_total).collect()
        } else {
            vec![0.0; x.len()]
        };
        (baseline, contributions)
    }
}

#[must_use]
pub fn softmax(scores: &[f64]) -> Vec<f64> {
    let max = scores.iter().copied().fold(f64::NEG_INFINITY, f64::max);
    let exp = scores.iter().map(|s| (s - max).exp()).collect::<Vec<_>>();
    let total = exp.iter().sum::<f64>();
    exp.iter().map(|e| e / total).collect()
}

fn log_loss(samples: &[usize], labels: &[usize], weights: &[f64], scores: &[Vec<f64>]) -> f64 {
    let mut loss = 0.0;
    let mut total = 0.0;
    for &i in samples {
        let p = softmax(&scores[i])[labels[i]].max(MIN_PROBABILITY);
        loss -= weights[i] * p.ln();
        total += weights[i];
    }
    loss / total
}

#[cfg(test)]
mod tests {
    use rand::SeedableRng;
    use rand_pcg::Pcg64;

    use super::*;

    fn bands(n: usize, rng: &mut Pcg64) -> (Vec<Vec<f64>>, Vec<usize>) {
        let mut rows = vec![];
        let mut labels = vec![];
        for _ in 0..n {
            let x: f64 = rng.random_range(0.0..3.0);
            rows.push(vec![x, rng.random_range(0.0..1.0)]);
            labels.push((x.floor() as usize).min(2));
        }
        (rows, labels)
    }

    #[test]
    fn test_softmax_is_shift_invariant() {
        let a = softmax(&[1.0, 2.0, 3.0]);
        let b = softmax(&[101.0, 102.0, 103.0]);
        for (x, y) in a.iter().zip(&b) {
            assert!((x - y).abs() < 1e-12);
        }
        assert!((a.iter().sum::<f64>() - 1.0).abs() < 1e-12);
    }

    #[test]
    fn test_boosting_learns_three_bands() {
        let mut rng = Pcg64::seed_from_u64(8);
        let (rows, labels) = bands(300, &mut rng);
        let params = BoostingParams {
            max_rounds: 40,
            ..BoostingParams::default()
        };
        let model = GradientBoosting::fit(&rows, &labels, 3, &params, &mut rng);
        assert!(model.rounds() > 0);
        assert!(model.rounds() <= 40);
        assert!(model.best_validation_loss().unwrap().is_finite());

        assert!(model.predict_proba(&[0.5, 0.5])[0] > 0.6);
        assert!(model.predict_proba(&[1.5, 0.5])[1] > 0.6);
        assert!(model.predict_proba(&[2.5, 0.5])[2] > 0.6);
    }

    #[test]
    fn test_early_stopping_on_noise() {
        let mut rng = Pcg64::seed_from_u64(13);
        let rows = (0..200)
            .map(|_| vec![rng.random_range(0.0..1.0)])
            .collect::<Vec<_>>();
        let labels = (0..200).map(|_| usize::from(rng.random_bool(0.5))).collect::<Vec<_>>();
        let params = BoostingParams {
            max_rounds: 300,
            patience: 5,
            ..BoostingParams::default()
        };
        let model = GradientBoosting::fit(&rows, &labels, 2, &params, &mut rng);
        assert!(model.rounds() < 300);
    }

    #[test]
    fn test_explain_and_jackknife_shapes() {
        let mut rng = Pcg64::seed_from_u64(17);
        let (rows, labels) = bands(150, &mut rng);
        let params = BoostingParams {
            max_rounds: 20,
            ..BoostingParams::default()
        };
        let model = GradientBoosting::fit(&rows, &labels, 3, &params, &mut rng);
        let x = [2.6, 0.2];
        let (baseline, contributions) = model.explain(&x, 2);
        let risk = model.predict_proba(&x)[2];
        assert_eq!(contributions.len(), 2);
        assert!((baseline + contributions.iter().sum::<f64>() - risk).abs() < 1e-9);
        // the banding feature carries the explanation
        assert!(contributions[0].abs() > contributions[1].abs());
        assert_eq!(model.member_scores(&x, 2).len(), model.rounds());
    }
}
