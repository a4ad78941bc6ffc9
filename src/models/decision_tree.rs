//! CART decision tree shared by the boosting and forest learners

use crate::error::{Result, TuneError};
use ndarray::{Array1, Array2, ArrayView1};
use rand::seq::index::sample;
use rand::SeedableRng;
use rand_xoshiro::Xoshiro256PlusPlus;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};

/// Node count times feature count above which the split scan runs in parallel
const PARALLEL_SCAN_THRESHOLD: usize = 200_000;

/// Decision tree node
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum TreeNode {
    /// Leaf node with prediction value
    Leaf { value: f64, n_samples: usize },
    /// Internal node with split
    Split {
        feature_idx: usize,
        threshold: f64,
        left: Box<TreeNode>,
        right: Box<TreeNode>,
        n_samples: usize,
        impurity: f64,
    },
}

/// Impurity criterion
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub enum Criterion {
    /// Gini impurity over 0/1 targets; leaves hold the positive fraction
    Gini,
    /// Mean squared error; leaves hold the target mean
    MSE,
}

/// Sufficient statistics of a node's targets
#[derive(Debug, Clone, Copy, Default)]
struct NodeStats {
    count: usize,
    sum: f64,
    sq_sum: f64,
}

impl NodeStats {
    fn push(&mut self, y: f64) {
        self.count += 1;
        self.sum += y;
        self.sq_sum += y * y;
    }

    fn minus(&self, other: &NodeStats) -> NodeStats {
        NodeStats {
            count: self.count - other.count,
            sum: self.sum - other.sum,
            sq_sum: self.sq_sum - other.sq_sum,
        }
    }
}

/// Node of a tree under best-first growth
struct GrowingNode {
    indices: Vec<usize>,
    impurity: f64,
    split: Option<(usize, f64, f64)>,
    children: Option<(usize, usize)>,
}

/// Decision tree model
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DecisionTree {
    root: Option<TreeNode>,
    /// Minimum samples to split
    pub min_samples_split: usize,
    /// Minimum samples in leaf
    pub min_samples_leaf: usize,
    /// Features drawn at random for each split; all when `None`
    pub max_features: Option<usize>,
    pub criterion: Criterion,
    /// Maximum number of splits, grown best-first; unlimited when `None`
    pub max_splits: Option<usize>,
    /// Seed for per-split feature sampling
    pub random_state: Option<u64>,
    n_features: usize,
}

impl Default for DecisionTree {
    fn default() -> Self {
        Self::new_classifier()
    }
}

impl DecisionTree {
    /// Classification tree over 0/1 targets
    pub fn new_classifier() -> Self {
        Self::with_criterion_inner(Criterion::Gini)
    }

    /// Regression tree
    pub fn new_regressor() -> Self {
        Self::with_criterion_inner(Criterion::MSE)
    }

    fn with_criterion_inner(criterion: Criterion) -> Self {
        Self {
            root: None,
            min_samples_split: 2,
            min_samples_leaf: 1,
            max_features: None,
            criterion,
            max_splits: None,
            random_state: None,
            n_features: 0,
        }
    }

    /// Cap the tree at `splits` internal nodes
    pub fn with_max_splits(mut self, splits: usize) -> Self {
        self.max_splits = Some(splits);
        self
    }

    pub fn with_min_samples_split(mut self, min_samples: usize) -> Self {
        self.min_samples_split = min_samples;
        self
    }

    pub fn with_min_samples_leaf(mut self, min_samples: usize) -> Self {
        self.min_samples_leaf = min_samples;
        self
    }

    pub fn with_max_features(mut self, max_features: usize) -> Self {
        self.max_features = Some(max_features);
        self
    }

    pub fn with_random_state(mut self, seed: u64) -> Self {
        self.random_state = Some(seed);
        self
    }

    /// Fit the tree; leaves predict the criterion's natural value
    pub fn fit(&mut self, x: &Array2<f64>, y: &Array1<f64>) -> Result<&mut Self> {
        let leaf_mean = |idx: &[usize]| {
            if idx.is_empty() {
                0.0
            } else {
                idx.iter().map(|&i| y[i]).sum::<f64>() / idx.len() as f64
            }
        };
        self.fit_with_leaf_values(x, y, &leaf_mean)
    }

    /// Fit the tree structure on `y`, then set each leaf to `leaf_value` of
    /// the training rows that reach it.
    ///
    /// Boosting uses this to replace mean residuals with a Newton step.
    pub fn fit_with_leaf_values(
        &mut self,
        x: &Array2<f64>,
        y: &Array1<f64>,
        leaf_value: &(dyn Fn(&[usize]) -> f64 + Sync),
    ) -> Result<&mut Self> {
        let n_samples = x.nrows();
        let n_features = x.ncols();

        if n_samples != y.len() {
            return Err(TuneError::ShapeError {
                expected: format!("y length = {}", n_samples),
                actual: format!("y length = {}", y.len()),
            });
        }
        if n_samples == 0 || n_features == 0 {
            return Err(TuneError::TrainingError(
                "cannot grow a tree on an empty matrix".to_string(),
            ));
        }
        if self.criterion == Criterion::Gini && y.iter().any(|&v| v != 0.0 && v != 1.0) {
            return Err(TuneError::TrainingError(
                "Gini trees need 0/1 targets".to_string(),
            ));
        }

        self.n_features = n_features;
        let mut rng = Xoshiro256PlusPlus::seed_from_u64(self.random_state.unwrap_or(0));

        let indices: Vec<usize> = (0..n_samples).collect();
        let root = match self.max_splits {
            Some(max_splits) => self.build_best_first(x, y, indices, max_splits, &mut rng, leaf_value),
            None => self.build_tree(x, y, indices, &mut rng, leaf_value),
        };
        self.root = Some(root);

        Ok(self)
    }

    /// Impurity of the node and its best split, unless a stopping rule applies
    fn node_split(
        &self,
        x: &Array2<f64>,
        y: &Array1<f64>,
        indices: &[usize],
        rng: &mut Xoshiro256PlusPlus,
    ) -> (f64, Option<(usize, f64, f64)>) {
        let n_samples = indices.len();
        let mut stats = NodeStats::default();
        for &i in indices {
            stats.push(y[i]);
        }
        let parent_impurity = self.impurity(&stats);

        let should_stop = n_samples < self.min_samples_split
            || n_samples < 2 * self.min_samples_leaf
            || parent_impurity <= 1e-12;

        if should_stop {
            (parent_impurity, None)
        } else {
            (parent_impurity, self.find_best_split(x, y, indices, &stats, rng))
        }
    }

    fn build_tree(
        &self,
        x: &Array2<f64>,
        y: &Array1<f64>,
        indices: Vec<usize>,
        rng: &mut Xoshiro256PlusPlus,
        leaf_value: &(dyn Fn(&[usize]) -> f64 + Sync),
    ) -> TreeNode {
        let n_samples = indices.len();
        let (parent_impurity, split) = self.node_split(x, y, &indices, rng);

        match split {
            Some((feature_idx, threshold, _)) => {
                let (left_idx, right_idx): (Vec<usize>, Vec<usize>) = indices
                    .iter()
                    .partition(|&&i| x[[i, feature_idx]] <= threshold);

                let left = Box::new(self.build_tree(x, y, left_idx, rng, leaf_value));
                let right = Box::new(self.build_tree(x, y, right_idx, rng, leaf_value));

                TreeNode::Split {
                    feature_idx,
                    threshold,
                    left,
                    right,
                    n_samples,
                    impurity: parent_impurity,
                }
            }
            None => TreeNode::Leaf {
                value: leaf_value(&indices),
                n_samples,
            },
        }
    }

    /// Grow up to `max_splits` splits, each time splitting the open leaf whose
    /// best split removes the most weighted impurity.
    fn build_best_first(
        &self,
        x: &Array2<f64>,
        y: &Array1<f64>,
        indices: Vec<usize>,
        max_splits: usize,
        rng: &mut Xoshiro256PlusPlus,
        leaf_value: &(dyn Fn(&[usize]) -> f64 + Sync),
    ) -> TreeNode {
        let (impurity, split) = self.node_split(x, y, &indices, rng);
        let mut nodes = vec![GrowingNode {
            indices,
            impurity,
            split,
            children: None,
        }];

        for _ in 0..max_splits {
            // First open leaf wins ties so growth order is stable
            let next = nodes
                .iter()
                .enumerate()
                .filter(|(_, n)| n.children.is_none())
                .filter_map(|(i, n)| n.split.map(|(_, _, gain)| (i, n.indices.len() as f64 * gain)))
                .fold(None, |best: Option<(usize, f64)>, cand| match best {
                    Some(b) if b.1 >= cand.1 => Some(b),
                    _ => Some(cand),
                });
            let Some((target, _)) = next else { break };
            let Some((feature_idx, threshold, _)) = nodes[target].split else { break };

            let (left_idx, right_idx): (Vec<usize>, Vec<usize>) = nodes[target]
                .indices
                .iter()
                .partition(|&&i| x[[i, feature_idx]] <= threshold);

            let child = |idx: Vec<usize>, rng: &mut Xoshiro256PlusPlus| {
                let (impurity, split) = self.node_split(x, y, &idx, rng);
                GrowingNode {
                    indices: idx,
                    impurity,
                    split,
                    children: None,
                }
            };
            let left = child(left_idx, rng);
            let right = child(right_idx, rng);
            nodes.push(left);
            nodes.push(right);
            nodes[target].children = Some((nodes.len() - 2, nodes.len() - 1));
        }

        Self::assemble(&nodes, 0, leaf_value)
    }

    fn assemble(
        nodes: &[GrowingNode],
        at: usize,
        leaf_value: &(dyn Fn(&[usize]) -> f64 + Sync),
    ) -> TreeNode {
        let node = &nodes[at];
        match (node.children, node.split) {
            (Some((left, right)), Some((feature_idx, threshold, _))) => TreeNode::Split {
                feature_idx,
                threshold,
                left: Box::new(Self::assemble(nodes, left, leaf_value)),
                right: Box::new(Self::assemble(nodes, right, leaf_value)),
                n_samples: node.indices.len(),
                impurity: node.impurity,
            },
            _ => TreeNode::Leaf {
                value: leaf_value(&node.indices),
                n_samples: node.indices.len(),
            },
        }
    }

    /// Best (feature, threshold, gain) over the candidate features, if any split helps
    fn find_best_split(
        &self,
        x: &Array2<f64>,
        y: &Array1<f64>,
        indices: &[usize],
        parent: &NodeStats,
        rng: &mut Xoshiro256PlusPlus,
    ) -> Option<(usize, f64, f64)> {
        let n_features = x.ncols();
        let candidates: Vec<usize> = match self.max_features {
            Some(m) if m < n_features => {
                let mut features = sample(rng, n_features, m.max(1)).into_vec();
                features.sort_unstable();
                features
            }
            _ => (0..n_features).collect(),
        };

        let parent_impurity = self.impurity(parent);
        let scan = |&feature_idx: &usize| self.scan_feature(x, y, indices, parent, parent_impurity, feature_idx);

        let results: Vec<Option<(usize, f64, f64)>> = if indices.len() * candidates.len() >= PARALLEL_SCAN_THRESHOLD {
            candidates.par_iter().map(scan).collect()
        } else {
            candidates.iter().map(scan).collect()
        };

        // First feature wins ties so results do not depend on scheduling
        results.into_iter().flatten().fold(None, |best, cand| match best {
            Some(b) if b.2 >= cand.2 => Some(b),
            _ => Some(cand),
        })
    }

    /// Sort the node's rows by one feature and sweep every midpoint threshold
    fn scan_feature(
        &self,
        x: &Array2<f64>,
        y: &Array1<f64>,
        indices: &[usize],
        parent: &NodeStats,
        parent_impurity: f64,
        feature_idx: usize,
    ) -> Option<(usize, f64, f64)> {
        let mut pairs: Vec<(f64, f64)> = indices.iter().map(|&i| (x[[i, feature_idx]], y[i])).collect();
        pairs.sort_by(|a, b| a.0.total_cmp(&b.0));

        let n = pairs.len();
        let min_leaf = self.min_samples_leaf.max(1);
        let mut left = NodeStats::default();
        let mut best_gain = 0.0f64;
        let mut best_threshold = None;

        for k in 0..n - 1 {
            left.push(pairs[k].1);
            if pairs[k].0 == pairs[k + 1].0 {
                continue;
            }
            let n_left = k + 1;
            if n_left < min_leaf || n - n_left < min_leaf {
                continue;
            }
            let right = parent.minus(&left);
            let weighted = (left.count as f64 * self.impurity(&left)
                + right.count as f64 * self.impurity(&right))
                / n as f64;
            let gain = parent_impurity - weighted;
            if gain > best_gain + 1e-12 {
                best_gain = gain;
                let mid = (pairs[k].0 + pairs[k + 1].0) / 2.0;
                // Adjacent floats can round the midpoint up onto the right value
                best_threshold = Some(if mid < pairs[k + 1].0 { mid } else { pairs[k].0 });
            }
        }

        best_threshold.map(|t| (feature_idx, t, best_gain))
    }

    fn impurity(&self, stats: &NodeStats) -> f64 {
        if stats.count == 0 {
            return 0.0;
        }
        let n = stats.count as f64;
        match self.criterion {
            Criterion::Gini => {
                let p = stats.sum / n;
                1.0 - p * p - (1.0 - p) * (1.0 - p)
            }
            Criterion::MSE => (stats.sq_sum / n - (stats.sum / n).powi(2)).max(0.0),
        }
    }

    /// Leaf value for each row
    pub fn predict(&self, x: &Array2<f64>) -> Result<Array1<f64>> {
        let root = self.root.as_ref().ok_or(TuneError::ModelNotFitted)?;
        if x.ncols() != self.n_features {
            return Err(TuneError::ShapeError {
                expected: format!("{} features", self.n_features),
                actual: format!("{} features", x.ncols()),
            });
        }
        Ok(x.rows().into_iter().map(|row| Self::predict_sample(root, row)).collect())
    }

    fn predict_sample(node: &TreeNode, sample: ArrayView1<f64>) -> f64 {
        let mut node = node;
        loop {
            match node {
                TreeNode::Leaf { value, .. } => return *value,
                TreeNode::Split { feature_idx, threshold, left, right, .. } => {
                    node = if sample[*feature_idx] <= *threshold { left } else { right };
                }
            }
        }
    }

    pub fn get_n_leaves(&self) -> usize {
        self.root.as_ref().map_or(0, Self::count_leaves)
    }

    fn count_leaves(node: &TreeNode) -> usize {
        match node {
            TreeNode::Leaf { .. } => 1,
            TreeNode::Split { left, right, .. } => Self::count_leaves(left) + Self::count_leaves(right),
        }
    }
}
