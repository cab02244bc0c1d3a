//! Gradient-boosted decision trees for binary classification.
//!
//! Second-order boosting on the logistic loss: each round fits a depth-limited
//! regression tree to the gradient/hessian of the current margins and adds it,
//! scaled by the learning rate. Fits are deterministic for a given `seed`.

use crate::domain::errors::PredictorError;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};

const PROB_EPS: f64 = 1e-6;
const MIN_HESSIAN: f64 = 1e-16;
const MIN_SPLIT_GAIN: f64 = 1e-12;

/// GBM hyperparameters
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GbmParams {
    /// Number of boosting iterations (trees)
    pub n_estimators: usize,
    /// Maximum depth of each tree
    pub max_depth: usize,
    /// Learning rate (shrinkage)
    pub learning_rate: f64,
    /// Minimum samples required in a leaf node
    pub min_samples_leaf: usize,
    /// Minimum hessian sum required in a leaf node
    pub min_child_weight: f64,
    /// L2 penalty on leaf values
    pub l2_regularization: f64,
    /// Fraction of rows drawn (without replacement) for each tree
    pub subsample: f64,
    /// Seed for row subsampling
    pub seed: u64,
}

impl Default for GbmParams {
    fn default() -> Self {
        Self {
            n_estimators: 300,
            max_depth: 5,
            learning_rate: 0.05,
            min_samples_leaf: 1,
            min_child_weight: 1.0,
            l2_regularization: 1.0,
            subsample: 1.0,
            seed: 42,
        }
    }
}

impl GbmParams {
    pub fn validate(&self) -> Result<(), PredictorError> {
        let reason = if self.n_estimators == 0 {
            Some("n_estimators must be > 0".to_string())
        } else if self.max_depth == 0 {
            Some("max_depth must be > 0".to_string())
        } else if !(self.learning_rate > 0.0 && self.learning_rate <= 1.0) {
            Some(format!(
                "learning_rate must be in (0, 1], got {}",
                self.learning_rate
            ))
        } else if self.min_samples_leaf == 0 {
            Some("min_samples_leaf must be > 0".to_string())
        } else if !(self.min_child_weight >= 0.0 && self.min_child_weight.is_finite()) {
            Some(format!(
                "min_child_weight must be >= 0, got {}",
                self.min_child_weight
            ))
        } else if !(self.l2_regularization >= 0.0 && self.l2_regularization.is_finite()) {
            Some(format!(
                "l2_regularization must be >= 0, got {}",
                self.l2_regularization
            ))
        } else if !(self.subsample > 0.0 && self.subsample <= 1.0) {
            Some(format!("subsample must be in (0, 1], got {}", self.subsample))
        } else {
            None
        };

        match reason {
            Some(reason) => Err(PredictorError::InvalidParameters { reason }),
            None => Ok(()),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
enum Node {
    Leaf {
        value: f64,
    },
    Split {
        feature: usize,
        threshold: f64,
        left: usize,
        right: usize,
    },
}

/// Regression tree stored as a flat node arena; node 0 is the root.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RegressionTree {
    nodes: Vec<Node>,
}

impl RegressionTree {
    pub fn predict(&self, row: &[f64]) -> f64 {
        let mut index = 0;
        loop {
            match self.nodes.get(index) {
                Some(Node::Leaf { value }) => return *value,
                Some(Node::Split {
                    feature,
                    threshold,
                    left,
                    right,
                }) => {
                    let value = row.get(*feature).copied().unwrap_or(f64::NAN);
                    index = if value <= *threshold { *left } else { *right };
                }
                None => return 0.0,
            }
        }
    }

    pub fn depth(&self) -> usize {
        fn walk(nodes: &[Node], index: usize) -> usize {
            match nodes.get(index) {
                Some(Node::Split { left, right, .. }) => {
                    1 + walk(nodes, *left).max(walk(nodes, *right))
                }
                _ => 0,
            }
        }
        walk(&self.nodes, 0)
    }

    pub fn n_leaves(&self) -> usize {
        self.nodes
            .iter()
            .filter(|n| matches!(n, Node::Leaf { .. }))
            .count()
    }

    /// Nodes are stored in preorder, so every child sits after its parent.
    fn check(&self, n_features: usize) -> Result<(), String> {
        if self.nodes.is_empty() {
            return Err("tree has no nodes".to_string());
        }
        let len = self.nodes.len();
        for (index, node) in self.nodes.iter().enumerate() {
            match node {
                Node::Leaf { value } => {
                    if !value.is_finite() {
                        return Err(format!("leaf {} holds non-finite value {}", index, value));
                    }
                }
                Node::Split {
                    feature,
                    threshold,
                    left,
                    right,
                } => {
                    if *feature >= n_features {
                        return Err(format!(
                            "node {} splits on feature {} but the ensemble has {}",
                            index, feature, n_features
                        ));
                    }
                    if threshold.is_nan() {
                        return Err(format!("node {} has a NaN threshold", index));
                    }
                    for child in [*left, *right] {
                        if child <= index || child >= len {
                            return Err(format!(
                                "node {} points to child {} in a tree of {} nodes",
                                index, child, len
                            ));
                        }
                    }
                }
            }
        }
        Ok(())
    }
}

struct SplitCandidate {
    feature: usize,
    threshold: f64,
    gain: f64,
}

struct TreeBuilder<'a> {
    x: &'a [Vec<f64>],
    grad: &'a [f64],
    hess: &'a [f64],
    params: &'a GbmParams,
    nodes: Vec<Node>,
}

impl<'a> TreeBuilder<'a> {
    fn new(x: &'a [Vec<f64>], grad: &'a [f64], hess: &'a [f64], params: &'a GbmParams) -> Self {
        Self {
            x,
            grad,
            hess,
            params,
            nodes: Vec::new(),
        }
    }

    fn build(mut self, rows: &[usize]) -> RegressionTree {
        self.grow(rows, 0);
        RegressionTree { nodes: self.nodes }
    }

    fn leaf_value(&self, g: f64, h: f64) -> f64 {
        -g / (h + self.params.l2_regularization)
    }

    fn grow(&mut self, rows: &[usize], depth: usize) -> usize {
        let g: f64 = rows.iter().map(|&i| self.grad[i]).sum();
        let h: f64 = rows.iter().map(|&i| self.hess[i]).sum();

        let id = self.nodes.len();
        self.nodes.push(Node::Leaf {
            value: self.leaf_value(g, h),
        });

        if depth >= self.params.max_depth || rows.len() < 2 * self.params.min_samples_leaf {
            return id;
        }
        let Some(split) = self.best_split(rows, g, h) else {
            return id;
        };

        let (left_rows, right_rows): (Vec<usize>, Vec<usize>) = rows
            .iter()
            .partition(|&&i| self.x[i][split.feature] <= split.threshold);

        let left = self.grow(&left_rows, depth + 1);
        let right = self.grow(&right_rows, depth + 1);
        self.nodes[id] = Node::Split {
            feature: split.feature,
            threshold: split.threshold,
            left,
            right,
        };
        id
    }

    fn best_split(&self, rows: &[usize], g_total: f64, h_total: f64) -> Option<SplitCandidate> {
        let lambda = self.params.l2_regularization;
        let min_leaf = self.params.min_samples_leaf;
        let min_weight = self.params.min_child_weight;
        let parent_score = g_total * g_total / (h_total + lambda);
        let n_features = self.x[*rows.first()?].len();

        let mut best: Option<SplitCandidate> = None;
        let mut order = rows.to_vec();

        for feature in 0..n_features {
            order.copy_from_slice(rows);
            order.sort_by(|&a, &b| self.x[a][feature].total_cmp(&self.x[b][feature]));

            let mut g_left = 0.0;
            let mut h_left = 0.0;
            for pos in 0..order.len() - 1 {
                let i = order[pos];
                g_left += self.grad[i];
                h_left += self.hess[i];

                let left_count = pos + 1;
                if left_count < min_leaf {
                    continue;
                }
                if order.len() - left_count < min_leaf {
                    break;
                }

                let value = self.x[i][feature];
                let next_value = self.x[order[pos + 1]][feature];
                // Equal values cannot be separated by a threshold
                if next_value <= value {
                    continue;
                }

                let g_right = g_total - g_left;
                let h_right = h_total - h_left;
                if h_left < min_weight || h_right < min_weight {
                    continue;
                }

                let gain = g_left * g_left / (h_left + lambda)
                    + g_right * g_right / (h_right + lambda)
                    - parent_score;
                let best_gain = best.as_ref().map_or(MIN_SPLIT_GAIN, |b| b.gain);
                if gain > best_gain {
                    best = Some(SplitCandidate {
                        feature,
                        threshold: split_point(value, next_value),
                        gain,
                    });
                }
            }
        }

        best
    }
}

/// Midpoint between two sorted distinct values, falling back to the lower one
/// when rounding would push the midpoint out of `[low, high)`.
fn split_point(low: f64, high: f64) -> f64 {
    let mid = low + (high - low) / 2.0;
    if mid >= low && mid < high { mid } else { low }
}

fn sigmoid(margin: f64) -> f64 {
    1.0 / (1.0 + (-margin).exp())
}

/// Fitted boosted ensemble.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GradientBoostedTrees {
    base_score: f64,
    learning_rate: f64,
    n_features: usize,
    trees: Vec<RegressionTree>,
}

impl GradientBoostedTrees {
    /// Fits on row-major `x` with labels in {0, 1}.
    ///
    /// Inputs are expected to be rectangular and finite; the classifier wrapper
    /// checks that before calling.
    pub fn fit(x: &[Vec<f64>], y: &[u8], params: &GbmParams) -> Result<Self, PredictorError> {
        params.validate()?;
        if x.is_empty() {
            return Err(PredictorError::EmptyTrainingSet);
        }
        if x.len() != y.len() {
            return Err(PredictorError::LengthMismatch {
                rows: x.len(),
                labels: y.len(),
            });
        }

        let n = x.len();
        let n_features = x[0].len();
        let positives = y.iter().filter(|&&l| l == 1).count();
        let prior = (positives as f64 / n as f64).clamp(PROB_EPS, 1.0 - PROB_EPS);
        let base_score = (prior / (1.0 - prior)).ln();

        let mut rng = StdRng::seed_from_u64(params.seed);
        let all_rows: Vec<usize> = (0..n).collect();
        let mut margins = vec![base_score; n];
        let mut grad = vec![0.0; n];
        let mut hess = vec![0.0; n];
        let mut trees = Vec::new();

        for _ in 0..params.n_estimators {
            for i in 0..n {
                let p = sigmoid(margins[i]);
                grad[i] = p - f64::from(y[i]);
                hess[i] = (p * (1.0 - p)).max(MIN_HESSIAN);
            }

            let rows = if params.subsample < 1.0 {
                let sampled: Vec<usize> = all_rows
                    .iter()
                    .copied()
                    .filter(|_| rng.random_bool(params.subsample))
                    .collect();
                if sampled.is_empty() {
                    all_rows.clone()
                } else {
                    sampled
                }
            } else {
                all_rows.clone()
            };

            let tree = TreeBuilder::new(x, &grad, &hess, params).build(&rows);
            for (margin, row) in margins.iter_mut().zip(x) {
                *margin += params.learning_rate * tree.predict(row);
            }
            trees.push(tree);
        }

        Ok(Self {
            base_score,
            learning_rate: params.learning_rate,
            n_features,
            trees,
        })
    }

    pub fn predict_margin(&self, row: &[f64]) -> f64 {
        self.base_score
            + self.learning_rate * self.trees.iter().map(|t| t.predict(row)).sum::<f64>()
    }

    /// Probability of class 1.
    pub fn predict_proba(&self, row: &[f64]) -> f64 {
        sigmoid(self.predict_margin(row))
    }

    pub fn n_features(&self) -> usize {
        self.n_features
    }

    pub fn n_trees(&self) -> usize {
        self.trees.len()
    }

    pub fn trees(&self) -> &[RegressionTree] {
        &self.trees
    }

    /// Rejects ensembles `fit` could not have produced, such as restored
    /// snapshots with cyclic or out-of-range node links.
    pub fn check_structure(&self) -> Result<(), PredictorError> {
        let invalid = |reason: String| PredictorError::Snapshot { reason };

        if !self.base_score.is_finite() {
            return Err(invalid(format!("non-finite base score {}", self.base_score)));
        }
        if !(self.learning_rate > 0.0 && self.learning_rate <= 1.0) {
            return Err(invalid(format!(
                "learning rate {} outside (0, 1]",
                self.learning_rate
            )));
        }
        if self.n_features == 0 {
            return Err(invalid("ensemble has no features".to_string()));
        }
        for (index, tree) in self.trees.iter().enumerate() {
            tree.check(self.n_features)
                .map_err(|reason| invalid(format!("tree {}: {}", index, reason)))?;
        }
        Ok(())
    }
}
