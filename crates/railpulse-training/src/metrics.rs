//! Classification metrics: accuracy, F1 and ROC AUC.
//!
//! For two classes F1 and AUC treat class 1 (the riskier class) as positive. With more
//! classes both are macro averages over one-vs-rest problems.

use railpulse_stats::rank::Ranks;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Metrics {
    pub accuracy: f64,
    pub f1: f64,
    /// `None` when no class has both positive and negative samples.
    pub auc: Option<f64>,
}

impl Metrics {
    /// Scores class probability rows against true labels.
    #[expect(clippy::cast_precision_loss)]
    #[must_use]
    pub fn evaluate(labels: &[usize], probabilities: &[Vec<f64>], n_classes: usize) -> Self {
        assert_eq!(labels.len(), probabilities.len());
        let predicted = probabilities.iter().map(|p| argmax(p)).collect::<Vec<_>>();
        let correct = labels.iter().zip(&predicted).filter(|(l, p)| l == p).count();
        let accuracy = if labels.is_empty() {
            0.0
        } else {
            correct as f64 / labels.len() as f64
        };

        let (f1, auc) = if n_classes == 2 {
            (f1_for(labels, &predicted, 1), auc_for(labels, probabilities, 1))
        } else {
            let per_class_f1 = (0..n_classes)
                .filter(|&c| labels.contains(&c) || predicted.contains(&c))
                .map(|c| f1_for(labels, &predicted, c))
                .collect::<Vec<_>>();
            let per_class_auc = (0..n_classes)
                .filter_map(|c| auc_for(labels, probabilities, c))
                .collect::<Vec<_>>();
            (
                railpulse_stats::descriptive::mean(&per_class_f1).unwrap_or(0.0),
                railpulse_stats::descriptive::mean(&per_class_auc),
            )
        };
        Self { accuracy, f1, auc }
    }

    /// Averages metrics, for example across folds. AUC averages the folds that have one.
    #[must_use]
    pub fn mean(all: &[Metrics]) -> Option<Self> {
        let pick = |f: fn(&Metrics) -> f64| all.iter().map(f).collect::<Vec<_>>();
        let aucs = all.iter().filter_map(|m| m.auc).collect::<Vec<_>>();
        Some(Self {
            accuracy: railpulse_stats::descriptive::mean(&pick(|m| m.accuracy))?,
            f1: railpulse_stats::descriptive::mean(&pick(|m| m.f1))?,
            auc: railpulse_stats::descriptive::mean(&aucs),
        })
    }
}

/// Index of the largest probability; the lowest index wins ties.
#[must_use]
pub fn argmax(values: &[f64]) -> usize {
    let mut best = 0;
    for (i, v) in values.iter().enumerate() {
        if *v > values[best] {
            best = i;
        }
    }
    best
}

fn f1_for(labels: &[usize], predicted: &[usize], class: usize) -> f64 {
    let mut tp = 0_u32;
    let mut fp = 0_u32;
    let mut fn_ = 0_u32;
    for (&l, &p) in labels.iter().zip(predicted) {
        match (l == class, p == class) {
            (true, true) => tp += 1,
            (false, true) => fp += 1,
            (true, false) => fn_ += 1,
            (false, false) => {}
        }
    }
    if tp == 0 {
        return 0.0;
    }
    2.0 * f64::from(tp) / (2.0 * f64::from(tp) + f64::from(fp) + f64::from(fn_))
}

/// Mann-Whitney form of the area under the ROC curve for `class` against the rest.
#[expect(clippy::cast_precision_loss)]
fn auc_for(labels: &[usize], probabilities: &[Vec<f64>], class: usize) -> Option<f64> {
    let scores = probabilities.iter().map(|p| p[class]).collect::<Vec<_>>();
    let positives = labels.iter().filter(|&&l| l == class).count();
    let negatives = labels.len() - positives;
    if positives == 0 || negatives == 0 {
        return None;
    }
    let ranks = Ranks::new(&scores);
    let rank_sum = labels
        .iter()
        .zip(&ranks.ranks)
        .filter(|(l, _)| **l == class)
        .map(|(_, r)| r)
        .sum::<f64>();
    let (pos, neg) = (positives as f64, negatives as f64);
    Some((rank_sum - pos * (pos + 1.0) / 2.0) / (pos * neg))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_perfect_binary_scores() {
        let labels = [0, 0, 1, 1];
        let probs = vec![
            vec![0.9, 0.1],
            vec![0.7, 0.3],
            vec![0.4, 0.6],
            vec![0.2, 0.8],
        ];
        let m = Metrics::evaluate(&labels, &probs, 2);
        assert_eq!(m.accuracy, 1.0);
        assert_eq!(m.f1, 1.0);
        assert_eq!(m.auc, Some(1.0));
    }

    #[test]
    fn test_binary_f1_and_auc_with_errors() {
        let labels = [0, 0, 1, 1];
        let probs = vec![
            vec![0.9, 0.1],
            vec![0.4, 0.6],
            vec![0.6, 0.4],
            vec![0.2, 0.8],
        ];
        let m = Metrics::evaluate(&labels, &probs, 2);
        assert_eq!(m.accuracy, 0.5);
        // tp 1, fp 1, fn 1
        assert!((m.f1 - 0.5).abs() < 1e-12);
        // positives ranked 2 and 4 of 4
        assert_eq!(m.auc, Some(0.75));
    }

    #[test]
    fn test_single_class_has_no_auc() {
        let m = Metrics::evaluate(&[0, 0], &[vec![0.8, 0.2], vec![0.6, 0.4]], 2);
        assert_eq!(m.auc, None);
        assert_eq!(m.f1, 0.0);
        assert_eq!(m.accuracy, 1.0);
    }

    #[test]
    fn test_macro_average_over_bands() {
        let labels = [0, 1, 2];
        let probs = vec![
            vec![0.8, 0.1, 0.1],
            vec![0.1, 0.8, 0.1],
            vec![0.1, 0.1, 0.8],
        ];
        let m = Metrics::evaluate(&labels, &probs, 3);
        assert_eq!(m.f1, 1.0);
        assert_eq!(m.auc, Some(1.0));
    }

    #[test]
    fn test_mean_skips_missing_auc() {
        let a = Metrics {
            accuracy: 0.8,
            f1: 0.6,
            auc: Some(0.9),
        };
        let b = Metrics {
            accuracy: 0.6,
            f1: 0.4,
            auc: None,
        };
        let m = Metrics::mean(&[a, b]).unwrap();
        assert!((m.accuracy - 0.7).abs() < 1e-12);
        assert_eq!(m.auc, Some(0.9));
        assert_eq!(Metrics::mean(&[]), None);
    }
}
