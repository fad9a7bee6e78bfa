//! Binary decision trees shared by both ensemble families.
//!
//! A [`Tree`] is grown greedily: every node scans each candidate feature in sorted order
//! and keeps the threshold with the largest improvement of a [`Criterion`] score. Two
//! criteria are provided:
//!
//! - [`Gini`] - weighted class distributions, used by the random forest. Node values are
//!   class probabilities.
//! - [`Newton`] - first and second order gradient sums, used by gradient boosting. Node
//!   values are one-element Newton steps `-G / (H + λ)`.
//!
//! Every node, including internal ones, stores its value. Walking the path from the root
//! to a leaf therefore decomposes a prediction into the root value plus one increment per
//! split, which is what [`Tree::explain`] reports.

use rand::{Rng, seq::index};
use serde::{Deserialize, Serialize};

/// Growth limits of a single tree.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TreeParams {
    pub max_depth: usize,
    pub min_samples_leaf: usize,
    /// Features drawn per node. `None` considers all features.
    pub max_features: Option<usize>,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Split {
    pub feature: usize,
    /// Samples with `value <= threshold` go left.
    pub threshold: f64,
    pub left: usize,
    pub right: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Node {
    pub value: Vec<f64>,
    pub split: Option<Split>,
}

/// A fitted tree stored as a flat node list with the root at index 0.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Tree {
    nodes: Vec<Node>,
}

impl Tree {
    /// Grows a tree over `samples` (indices into `rows`, repeats allowed).
    pub fn grow<C, R>(
        rows: &[Vec<f64>],
        samples: &[usize],
        criterion: &C,
        params: &TreeParams,
        rng: &mut R,
    ) -> Self
    where
        C: Criterion + ?Sized,
        R: Rng + ?Sized,
    {
        let n_features = rows.first().map_or(0, Vec::len);
        let mut grower = Grower {
            rows,
            criterion,
            params,
            n_features,
            nodes: vec![],
        };
        let mut samples = samples.to_vec();
        grower.grow_node(&mut samples, 0, rng);
        Self {
            nodes: grower.nodes,
        }
    }

    #[must_use]
    pub fn nodes(&self) -> &[Node] {
        &self.nodes
    }

    #[must_use]
    pub fn root_value(&self) -> &[f64] {
        &self.nodes[0].value
    }

    fn leaf_index(&self, x: &[f64]) -> usize {
        let mut index = 0;
        while let Some(split) = &self.nodes[index].split {
            index = if x[split.feature] <= split.threshold {
                split.left
            } else {
                split.right
            };
        }
        index
    }

    #[must_use]
    pub fn predict(&self, x: &[f64]) -> &[f64] {
        &self.nodes[self.leaf_index(x)].value
    }

    /// Adds the increments of output `output` along the decision path of `x` to
    /// `contributions` (indexed by feature) and returns the leaf value.
    ///
    /// The leaf value always equals `root_value()[output]` plus the added increments.
    pub fn explain(&self, x: &[f64], output: usize, contributions: &mut [f64]) -> f64 {
        let mut index = 0;
        while let Some(split) = &self.nodes[index].split {
            let child = if x[split.feature] <= split.threshold {
                split.left
            } else {
                split.right
            };
            contributions[split.feature] +=
                self.nodes[child].value[output] - self.nodes[index].value[output];
            index = child;
        }
        self.nodes[index].value[output]
    }

    #[must_use]
    pub fn depth(&self) -> usize {
        fn depth_of(nodes: &[Node], index: usize) -> usize {
            match &nodes[index].split {
                Some(split) => 1 + depth_of(nodes, split.left).max(depth_of(nodes, split.right)),
                None => 0,
            }
        }
        depth_of(&self.nodes, 0)
    }
}

/// Split quality measure over additive per-sample statistics.
///
/// The gain of a split is `score(left) + score(right) - score(parent)`.
pub trait Criterion {
    fn stats_len(&self) -> usize;
    /// Adds sample `sample` to `stats`.
    fn accumulate(&self, stats: &mut [f64], sample: usize);
    fn score(&self, stats: &[f64]) -> f64;
    fn value(&self, stats: &[f64]) -> Vec<f64>;
}

/// Weighted Gini impurity over class labels.
#[derive(Debug, Clone, Copy)]
pub struct Gini<'a> {
    pub labels: &'a [usize],
    pub weights: &'a [f64],
    pub n_classes: usize,
}

impl Criterion for Gini<'_> {
    fn stats_len(&self) -> usize {
        self.n_classes
    }

    fn accumulate(&self, stats: &mut [f64], sample: usize) {
        stats[self.labels[sample]] += self.weights[sample];
    }

    fn score(&self, stats: &[f64]) -> f64 {
        // weighted impurity decrease, up to a term shared by parent and children
        let total = stats.iter().sum::<f64>();
        if total <= 0.0 {
            return 0.0;
        }
        stats.iter().map(|w| w * w).sum::<f64>() / total
    }

    #[expect(clippy::cast_precision_loss)]
    fn value(&self, stats: &[f64]) -> Vec<f64> {
        let total = stats.iter().sum::<f64>();
        if total <= 0.0 {
            return vec![1.0 / self.n_classes as f64; self.n_classes];
        }
        stats.iter().map(|w| w / total).collect()
    }
}

/// Second order criterion for boosting with an L2 penalty `lambda` on leaf values.
#[derive(Debug, Clone, Copy)]
pub struct Newton<'a> {
    pub gradients: &'a [f64],
    pub hessians: &'a [f64],
    pub lambda: f64,
}

impl Criterion for Newton<'_> {
    fn stats_len(&self) -> usize {
        2
    }

    fn accumulate(&self, stats: &mut [f64], sample: usize) {
        stats[0] += self.gradients[sample];
        stats[1] += self.hessians[sample];
    }

    fn score(&self, stats: &[f64]) -> f64 {
        stats[0] * stats[0] / (stats[1] + self.lambda)
    }

    fn value(&self, stats: &[f64]) -> Vec<f64> {
        vec![-stats[0] / (stats[1] + self.lambda)]
    }
}

const MIN_GAIN: f64 = 1e-12;

struct Grower<'a, C: ?Sized> {
    rows: &'a [Vec<f64>],
    criterion: &'a C,
    params: &'a TreeParams,
    n_features: usize,
    nodes: Vec<Node>,
}

struct Candidate {
    feature: usize,
    threshold: f64,
    gain: f64,
}

impl<C> Grower<'_, C>
where
    C: Criterion + ?Sized,
{
    fn stats_of(&self, samples: &[usize]) -> Vec<f64> {
        let mut stats = vec![0.0; self.criterion.stats_len()];
        for &s in samples {
            self.criterion.accumulate(&mut stats, s);
        }
        stats
    }

    fn grow_node<R>(&mut self, samples: &mut [usize], depth: usize, rng: &mut R) -> usize
    where
        R: Rng + ?Sized,
    {
        let stats = self.stats_of(samples);
        let index = self.nodes.len();
        self.nodes.push(Node {
            value: self.criterion.value(&stats),
            split: None,
        });

        let min_leaf = self.params.min_samples_leaf.max(1);
        if depth >= self.params.max_depth || samples.len() < 2 * min_leaf {
            return index;
        }
        let Some(best) = self.best_split(samples, &stats, rng) else {
            return index;
        };

        let rows = self.rows;
        samples.sort_by_key(|&s| rows[s][best.feature] > best.threshold);
        let mid = samples.partition_point(|&s| rows[s][best.feature] <= best.threshold);
        let (left_samples, right_samples) = samples.split_at_mut(mid);
        let left = self.grow_node(left_samples, depth + 1, rng);
        let right = self.grow_node(right_samples, depth + 1, rng);
        self.nodes[index].split = Some(Split {
            feature: best.feature,
            threshold: best.threshold,
            left,
            right,
        });
        index
    }

    fn best_split<R>(&self, samples: &[usize], total: &[f64], rng: &mut R) -> Option<Candidate>
    where
        R: Rng + ?Sized,
    {
        let n = samples.len();
        let min_leaf = self.params.min_samples_leaf.max(1);
        let parent_score = self.criterion.score(total);
        let draw = self
            .params
            .max_features
            .unwrap_or(self.n_features)
            .clamp(1, self.n_features.max(1));

        let mut best: Option<Candidate> = None;
        let mut order = samples.to_vec();
        let mut left = vec![0.0; total.len()];
        let mut right = vec![0.0; total.len()];
        for feature in index::sample(rng, self.n_features, draw.min(self.n_features)) {
            order.sort_by(|&a, &b| self.rows[a][feature].total_cmp(&self.rows[b][feature]));
            left.fill(0.0);
            for i in 0..n - 1 {
                self.criterion.accumulate(&mut left, order[i]);
                let here = self.rows[order[i]][feature];
                let next = self.rows[order[i + 1]][feature];
                if here == next || i + 1 < min_leaf || n - (i + 1) < min_leaf {
                    continue;
                }
                for (r, (t, l)) in right.iter_mut().zip(total.iter().zip(&left)) {
                    *r = t - l;
                }
                let gain =
                    self.criterion.score(&left) + self.criterion.score(&right) - parent_score;
                if gain > MIN_GAIN && best.as_ref().is_none_or(|b| gain > b.gain) {
                    best = Some(Candidate {
                        feature,
                        threshold: here + (next - here) / 2.0,
                        gain,
                    });
                }
            }
        }
        best
    }
}
