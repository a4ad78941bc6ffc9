//! Gradient boosted trees for two-class problems
//!
//! Bernoulli deviance boosting: each round fits a regression tree to the
//! gradient `y - p` on a row subsample, sets every leaf to a one-step Newton
//! estimate, and adds the shrunken tree to the log-odds.

use super::decision_tree::DecisionTree;
use crate::error::{Result, TuneError};
use ndarray::{Array1, Array2, Axis};
use rand::prelude::*;
use rand_xoshiro::Xoshiro256PlusPlus;
use serde::{Deserialize, Serialize};

/// Gradient boosting configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GradientBoostingConfig {
    /// Number of boosting rounds (trees)
    pub n_trees: usize,
    /// Splits per tree, grown best-first
    pub interaction_depth: usize,
    /// Learning rate applied to every tree
    pub shrinkage: f64,
    /// Minimum training rows in a terminal node
    pub n_minobsinnode: usize,
    /// Fraction of rows drawn (without replacement) for each tree
    pub bag_fraction: f64,
    pub random_state: Option<u64>,
}

impl Default for GradientBoostingConfig {
    fn default() -> Self {
        Self {
            n_trees: 100,
            interaction_depth: 1,
            shrinkage: 0.1,
            n_minobsinnode: 10,
            bag_fraction: 0.5,
            random_state: Some(42),
        }
    }
}

/// Gradient boosting classifier
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GradientBoostingClassifier {
    config: GradientBoostingConfig,
    trees: Vec<DecisionTree>,
    initial_log_odds: f64,
    is_fitted: bool,
}

impl GradientBoostingClassifier {
    pub fn new(config: GradientBoostingConfig) -> Self {
        Self {
            config,
            trees: Vec::new(),
            initial_log_odds: 0.0,
            is_fitted: false,
        }
    }

    pub fn config(&self) -> &GradientBoostingConfig {
        &self.config
    }

    /// Fit on 0/1 targets
    pub fn fit(&mut self, x: &Array2<f64>, y: &Array1<f64>) -> Result<()> {
        let n_samples = x.nrows();

        if n_samples != y.len() {
            return Err(TuneError::ShapeError {
                expected: format!("y length = {}", n_samples),
                actual: format!("y length = {}", y.len()),
            });
        }

        let bag_size = ((n_samples as f64) * self.config.bag_fraction).floor() as usize;
        if bag_size <= 2 * self.config.n_minobsinnode + 1 {
            return Err(TuneError::TrainingError(format!(
                "{} bagged rows cannot hold two terminal nodes of {} rows; \
                 the data set is too small or the subsampling rate is too large",
                bag_size, self.config.n_minobsinnode
            )));
        }

        let p = y.mean().unwrap_or(0.5).clamp(1e-6, 1.0 - 1e-6);
        self.initial_log_odds = (p / (1.0 - p)).ln();

        let mut log_odds = Array1::from_elem(n_samples, self.initial_log_odds);
        let mut rng = match self.config.random_state {
            Some(seed) => Xoshiro256PlusPlus::seed_from_u64(seed),
            None => Xoshiro256PlusPlus::from_entropy(),
        };

        self.trees = Vec::with_capacity(self.config.n_trees);

        for _ in 0..self.config.n_trees {
            let probs = log_odds.mapv(sigmoid);
            let residuals = y - &probs;

            let sample_indices = self.subsample_indices(n_samples, bag_size, &mut rng);
            let x_sub = x.select(Axis(0), &sample_indices);
            let r_sub: Array1<f64> = sample_indices.iter().map(|&i| residuals[i]).collect();
            let w_sub: Array1<f64> = sample_indices.iter().map(|&i| probs[i] * (1.0 - probs[i])).collect();

            // Newton step for the Bernoulli deviance in each terminal node
            let newton = |idx: &[usize]| {
                let num: f64 = idx.iter().map(|&i| r_sub[i]).sum();
                let den: f64 = idx.iter().map(|&i| w_sub[i]).sum();
                if den < 1e-12 {
                    0.0
                } else {
                    num / den
                }
            };

            let mut tree = DecisionTree::new_regressor()
                .with_max_splits(self.config.interaction_depth)
                .with_min_samples_leaf(self.config.n_minobsinnode)
                .with_min_samples_split(2 * self.config.n_minobsinnode);
            tree.fit_with_leaf_values(&x_sub, &r_sub, &newton)?;

            let update = tree.predict(x)?;
            log_odds.scaled_add(self.config.shrinkage, &update);
            self.trees.push(tree);
        }

        if log_odds.iter().any(|v| !v.is_finite()) {
            return Err(TuneError::TrainingError(
                "boosting diverged to non-finite log-odds".to_string(),
            ));
        }

        self.is_fitted = true;
        Ok(())
    }

    /// Log-odds of the positive class
    pub fn decision_function(&self, x: &Array2<f64>) -> Result<Array1<f64>> {
        if !self.is_fitted {
            return Err(TuneError::ModelNotFitted);
        }
        let mut log_odds = Array1::from_elem(x.nrows(), self.initial_log_odds);
        for tree in &self.trees {
            log_odds.scaled_add(self.config.shrinkage, &tree.predict(x)?);
        }
        Ok(log_odds)
    }

    /// Positive-class probabilities
    pub fn predict_proba(&self, x: &Array2<f64>) -> Result<Array1<f64>> {
        Ok(self.decision_function(x)?.mapv(sigmoid))
    }

    pub fn predict(&self, x: &Array2<f64>) -> Result<Array1<f64>> {
        let probs = self.predict_proba(x)?;
        Ok(probs.mapv(|p| if p >= 0.5 { 1.0 } else { 0.0 }))
    }

    pub fn n_trees(&self) -> usize {
        self.trees.len()
    }

    fn subsample_indices(&self, n: usize, size: usize, rng: &mut Xoshiro256PlusPlus) -> Vec<usize> {
        let mut indices: Vec<usize> = (0..n).collect();
        indices.shuffle(rng);
        indices.truncate(size);
        indices.sort_unstable();
        indices
    }
}

fn sigmoid(v: f64) -> f64 {
    1.0 / (1.0 + (-v).exp())
}
