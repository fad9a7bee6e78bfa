//! Random forest of bootstrapped Gini trees.
//!
//! # Algorithm Overview
//!
//! 1. **Weights** - every training sample gets its balanced class weight
//! 2. **Bootstrap** - each tree draws `n` samples with replacement
//! 3. **Grow** - each node considers `max_features` randomly drawn features
//!    (default `ceil(sqrt(p))`) and splits on weighted Gini impurity
//! 4. **Vote** - class probabilities are the mean of the trees' leaf distributions
//!
//! Because the forest output is a plain average of tree outputs, the per-tree path
//! contributions average into attributions that sum exactly to the difference between
//! the prediction and the mean root distribution.

use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::{
    tree::{Gini, Tree, TreeParams},
    weights,
};

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ForestParams {
    pub n_estimators: usize,
    pub max_depth: usize,
    pub min_samples_leaf: usize,
    /// Features drawn per split. `None` uses `ceil(sqrt(p))`.
    pub max_features: Option<usize>,
}

impl Default for ForestParams {
    fn default() -> Self {
        Self {
            n_estimators: 100,
            max_depth: 8,
            min_samples_leaf: 3,
            max_features: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RandomForest {
    n_classes: usize,
    trees: Vec<Tree>,
}

impl RandomForest {
    #[expect(
        clippy::cast_precision_loss,
        clippy::cast_possible_truncation,
        clippy::cast_sign_loss
    )]
    pub fn fit<R>(
        rows: &[Vec<f64>],
        labels: &[usize],
        n_classes: usize,
        params: &ForestParams,
        rng: &mut R,
    ) -> Self
    where
        R: Rng + ?Sized,
    {
        assert_eq!(rows.len(), labels.len());
        assert!(!rows.is_empty());
        let n_features = rows[0].len();
        let sample_weights = weights::balanced(labels, n_classes);
        let criterion = Gini {
            labels,
            weights: &sample_weights,
            n_classes,
        };
        let tree_params = TreeParams {
            max_depth: params.max_depth,
            min_samples_leaf: params.min_samples_leaf,
            max_features: Some(
                params
                    .max_features
                    .unwrap_or_else(|| (n_features as f64).sqrt().ceil() as usize),
            ),
        };

        let n = rows.len();
        let trees = (0..params.n_estimators.max(1))
            .map(|_| {
                let bootstrap = (0..n).map(|_| rng.random_range(0..n)).collect::<Vec<_>>();
                Tree::grow(rows, &bootstrap, &criterion, &tree_params, rng)
            })
            .collect();
        Self { n_classes, trees }
    }

    #[must_use]
    pub fn n_classes(&self) -> usize {
        self.n_classes
    }

    #[must_use]
    pub fn trees(&self) -> &[Tree] {
        &self.trees
    }

    #[expect(clippy::cast_precision_loss)]
    #[must_use]
    pub fn predict_proba(&self, x: &[f64]) -> Vec<f64> {
        let mut probabilities = vec![0.0; self.n_classes];
        for tree in &self.trees {
            for (p, v) in probabilities.iter_mut().zip(tree.predict(x)) {
                *p += v;
            }
        }
        let count = self.trees.len() as f64;
        probabilities.iter_mut().for_each(|p| *p /= count);
        probabilities
    }

    /// Probability of `class` according to each tree.
    #[must_use]
    pub fn member_scores(&self, x: &[f64], class: usize) -> Vec<f64> {
        self.trees.iter().map(|t| t.predict(x)[class]).collect()
    }

    /// Returns the baseline probability of `class` and per-feature contributions that
    /// sum to `predict_proba(x)[class] - baseline`.
    #[expect(clippy::cast_precision_loss)]
    #[must_use]
    pub fn explain(&self, x: &[f64], class: usize) -> (f64, Vec<f64>) {
        let count = self.trees.len() as f64;
        let mut contributions = vec![0.0; x.len()];
        let mut baseline = 0.0;
        for tree in &self.trees {
            baseline += tree.root_value()[class];
            tree.explain(x, class, &mut contributions);
        }
        contributions.iter_mut().for_each(|c| *c /= count);
        (baseline / count, contributions)
    }
}

#[cfg(test)]
mod tests {
    use rand::SeedableRng;
    use rand_pcg::Pcg64;

    use super::*;

    fn separable(n: usize, rng: &mut Pcg64) -> (Vec<Vec<f64>>, Vec<usize>) {
        let mut rows = vec![];
        let mut labels = vec![];
        for i in 0..n {
            let label = usize::from(i % 4 == 0);
            let signal = if label == 1 { 2.0 } else { -2.0 };
            rows.push(vec![
                signal + rng.random_range(-1.0..1.0),
                rng.random_range(-1.0..1.0),
            ]);
            labels.push(label);
        }
        (rows, labels)
    }

    #[test]
    fn test_forest_learns_separable_classes() {
        let mut rng = Pcg64::seed_from_u64(21);
        let (rows, labels) = separable(200, &mut rng);
        let params = ForestParams {
            n_estimators: 15,
            ..ForestParams::default()
        };
        let forest = RandomForest::fit(&rows, &labels, 2, &params, &mut rng);
        assert_eq!(forest.trees().len(), 15);

        let p = forest.predict_proba(&[2.0, 0.0]);
        assert!(p[1] > 0.9, "{p:?}");
        assert!((p.iter().sum::<f64>() - 1.0).abs() < 1e-9);
        assert!(forest.predict_proba(&[-2.0, 0.0])[0] > 0.9);
    }

    #[test]
    fn test_attributions_sum_to_prediction_gap() {
        let mut rng = Pcg64::seed_from_u64(4);
        let (rows, labels) = separable(120, &mut rng);
        let params = ForestParams {
            n_estimators: 10,
            ..ForestParams::default()
        };
        let forest = RandomForest::fit(&rows, &labels, 2, &params, &mut rng);
        for row in rows.iter().take(20) {
            let (baseline, contributions) = forest.explain(row, 1);
            let risk = forest.predict_proba(row)[1];
            assert!((baseline + contributions.iter().sum::<f64>() - risk).abs() < 1e-9);
        }
        // balanced weights put the root of every tree near an even split
        let (baseline, _) = forest.explain(&rows[0], 1);
        assert!((baseline - 0.5).abs() < 0.15);
    }
}
