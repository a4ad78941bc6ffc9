//! Classifier families driven by the tuner
//!
//! Each family sits behind [`ModelType`]: it names its hyperparameters,
//! validates a [`ParamSet`] before any fitting, proposes a default grid from a
//! tune length, and builds a [`TrainedModel`] from one configuration.

mod decision_tree;
mod gradient_boosting;
mod platt;
mod random_forest;
mod svm;

pub use decision_tree::{Criterion, DecisionTree, TreeNode};
pub use gradient_boosting::{GradientBoostingClassifier, GradientBoostingConfig};
pub use platt::PlattScaling;
pub use random_forest::{MaxFeatures, RandomForest};
pub use svm::{SVMClassifier, SVMConfig};

use crate::error::{Result, TuneError};
use crate::search_space::{Grid, ParamSet};
use ndarray::{Array1, Array2};
use rand::prelude::*;
use rand_chacha::ChaCha8Rng;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Two-class model capability used by the tuner and evaluator
pub trait Model: Send + Sync {
    /// Fit on 0/1 targets where 1.0 marks the positive class
    fn fit(&mut self, x: &Array2<f64>, y: &Array1<f64>) -> Result<()>;

    /// Probability of the positive class for each row
    fn predict_proba(&self, x: &Array2<f64>) -> Result<Array1<f64>>;
}

/// Model family
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ModelType {
    /// Stochastic gradient boosted trees
    GradientBoosting,
    /// Support vector machine with a radial basis kernel
    Svm,
    RandomForest,
}

impl fmt::Display for ModelType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Settings of a family that are fixed rather than tuned
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelOptions {
    /// Trees grown by the random forest
    pub forest_trees: usize,
    /// Row fraction per boosting round
    pub bag_fraction: f64,
    /// SMO stopping tolerance
    pub svm_tolerance: f64,
    pub svm_max_iter: usize,
    /// Internal folds used to calibrate SVM probabilities
    pub svm_probability_folds: usize,
}

impl Default for ModelOptions {
    fn default() -> Self {
        Self {
            forest_trees: 500,
            bag_fraction: 0.5,
            svm_tolerance: 1e-3,
            svm_max_iter: 1_000_000,
            svm_probability_folds: 3,
        }
    }
}

impl ModelType {
    pub const ALL: [ModelType; 3] = [ModelType::GradientBoosting, ModelType::Svm, ModelType::RandomForest];

    /// Short identifier used in reports and resample tables
    pub fn name(&self) -> &'static str {
        match self {
            ModelType::GradientBoosting => "gbm",
            ModelType::Svm => "svm",
            ModelType::RandomForest => "rf",
        }
    }

    /// Hyperparameters every configuration must set
    pub fn param_names(&self) -> &'static [&'static str] {
        match self {
            ModelType::GradientBoosting => &["interaction_depth", "n_trees", "shrinkage", "n_minobsinnode"],
            ModelType::Svm => &["sigma", "C"],
            ModelType::RandomForest => &["mtry"],
        }
    }

    /// Check one configuration against the family's parameter ranges
    pub fn validate(&self, params: &ParamSet, n_features: usize) -> Result<()> {
        for name in params.names() {
            if !self.param_names().contains(&name) {
                return Err(TuneError::invalid_param(
                    name,
                    params.get(name).map(|v| v.to_string()).unwrap_or_default(),
                    format!("not a parameter of {}", self),
                ));
            }
        }
        match self {
            ModelType::GradientBoosting => {
                let depth = params.usize("interaction_depth")?;
                if depth == 0 {
                    return Err(TuneError::invalid_param("interaction_depth", depth, "must be at least 1"));
                }
                let n_trees = params.usize("n_trees")?;
                if n_trees == 0 {
                    return Err(TuneError::invalid_param("n_trees", n_trees, "must be at least 1"));
                }
                let shrinkage = params.float("shrinkage")?;
                if !(shrinkage > 0.0 && shrinkage <= 1.0) {
                    return Err(TuneError::invalid_param("shrinkage", shrinkage, "must be in (0, 1]"));
                }
                let min_obs = params.usize("n_minobsinnode")?;
                if min_obs == 0 {
                    return Err(TuneError::invalid_param("n_minobsinnode", min_obs, "must be at least 1"));
                }
            }
            ModelType::Svm => {
                let sigma = params.float("sigma")?;
                if !(sigma > 0.0 && sigma.is_finite()) {
                    return Err(TuneError::invalid_param("sigma", sigma, "must be positive"));
                }
                let c = params.float("C")?;
                if !(c > 0.0 && c.is_finite()) {
                    return Err(TuneError::invalid_param("C", c, "must be positive"));
                }
            }
            ModelType::RandomForest => {
                let mtry = params.usize("mtry")?;
                if mtry == 0 || mtry > n_features {
                    return Err(TuneError::invalid_param(
                        "mtry",
                        mtry,
                        format!("must be between 1 and the feature count {}", n_features),
                    ));
                }
            }
        }
        Ok(())
    }

    /// Validate every configuration of a grid before any fitting starts
    pub fn validate_grid(&self, grid: &Grid, n_features: usize) -> Result<Vec<ParamSet>> {
        grid.check()?;
        let configs = grid.expand();
        for config in &configs {
            self.validate(config, n_features)?;
        }
        Ok(configs)
    }

    /// Default grid of `tune_length` values per tuned parameter, simplest first.
    ///
    /// `x` is the (pre-processed) training matrix; the SVM derives its kernel
    /// width from it.
    pub fn default_grid(&self, tune_length: usize, x: &Array2<f64>, seed: u64) -> Result<Grid> {
        if tune_length == 0 {
            return Err(TuneError::invalid_param("tune_length", 0, "must be at least 1"));
        }
        let grid = match self {
            ModelType::GradientBoosting => Grid::new()
                .with("interaction_depth", (1..=tune_length as i64).collect::<Vec<_>>())
                .with("n_trees", (1..=tune_length as i64).map(|k| 50 * k).collect::<Vec<_>>())
                .with("shrinkage", [0.1])
                .with("n_minobsinnode", [10i64]),
            ModelType::Svm => {
                let sigma = estimate_sigma(x, seed)?;
                Grid::new()
                    .with("sigma", [sigma])
                    .with("C", (0..tune_length as i32).map(|k| 2f64.powi(k - 2)).collect::<Vec<_>>())
            }
            ModelType::RandomForest => Grid::new().with("mtry", mtry_sequence(x.ncols(), tune_length)),
        };
        Ok(grid)
    }

    /// Unfitted model for one configuration
    pub fn build(&self, params: &ParamSet, options: &ModelOptions, seed: u64) -> Result<TrainedModel> {
        let model = match self {
            ModelType::GradientBoosting => TrainedModel::GradientBoosting(GradientBoostingClassifier::new(
                GradientBoostingConfig {
                    n_trees: params.usize("n_trees")?,
                    interaction_depth: params.usize("interaction_depth")?,
                    shrinkage: params.float("shrinkage")?,
                    n_minobsinnode: params.usize("n_minobsinnode")?,
                    bag_fraction: options.bag_fraction,
                    random_state: Some(seed),
                },
            )),
            ModelType::Svm => TrainedModel::Svm(SVMClassifier::new(SVMConfig {
                c: params.float("C")?,
                sigma: params.float("sigma")?,
                tol: options.svm_tolerance,
                max_iter: options.svm_max_iter,
                probability_folds: options.svm_probability_folds,
                random_state: Some(seed),
            })),
            ModelType::RandomForest => TrainedModel::RandomForest(
                RandomForest::new(options.forest_trees)
                    .with_max_features(MaxFeatures::Fixed(params.usize("mtry")?))
                    .with_random_state(seed),
            ),
        };
        Ok(model)
    }

    /// Build and fit in one step
    pub fn fit(
        &self,
        params: &ParamSet,
        options: &ModelOptions,
        seed: u64,
        x: &Array2<f64>,
        y: &Array1<f64>,
    ) -> Result<TrainedModel> {
        let mut model = self.build(params, options, seed)?;
        model.fit(x, y)?;
        Ok(model)
    }
}

/// A fitted model of any family
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum TrainedModel {
    GradientBoosting(GradientBoostingClassifier),
    Svm(SVMClassifier),
    RandomForest(RandomForest),
}

impl TrainedModel {
    pub fn model_type(&self) -> ModelType {
        match self {
            TrainedModel::GradientBoosting(_) => ModelType::GradientBoosting,
            TrainedModel::Svm(_) => ModelType::Svm,
            TrainedModel::RandomForest(_) => ModelType::RandomForest,
        }
    }
}

impl Model for TrainedModel {
    fn fit(&mut self, x: &Array2<f64>, y: &Array1<f64>) -> Result<()> {
        match self {
            TrainedModel::GradientBoosting(m) => m.fit(x, y),
            TrainedModel::Svm(m) => m.fit(x, y),
            TrainedModel::RandomForest(m) => m.fit(x, y).map(|_| ()),
        }
    }

    fn predict_proba(&self, x: &Array2<f64>) -> Result<Array1<f64>> {
        match self {
            TrainedModel::GradientBoosting(m) => m.predict_proba(x),
            TrainedModel::Svm(m) => m.predict_proba(x),
            TrainedModel::RandomForest(m) => m.predict_proba(x),
        }
    }
}

/// Kernel width for the radial SVM from the spread of pairwise distances.
///
/// Draws `n / 2` random row pairs, takes the 10% and 90% quantiles of their
/// non-zero squared distances, and returns the mean of the two inverses.
pub fn estimate_sigma(x: &Array2<f64>, seed: u64) -> Result<f64> {
    let n = x.nrows();
    if n < 2 {
        return Err(TuneError::DataError(
            "need at least two rows to estimate the kernel width".to_string(),
        ));
    }
    let mut rng = ChaCha8Rng::seed_from_u64(seed);
    let m = (n / 2).max(1);
    let mut distances: Vec<f64> = (0..m)
        .map(|_| {
            let a = x.row(rng.gen_range(0..n));
            let b = x.row(rng.gen_range(0..n));
            a.iter().zip(b.iter()).map(|(p, q)| (p - q).powi(2)).sum::<f64>()
        })
        .filter(|&d| d > 0.0)
        .collect();

    if distances.is_empty() {
        return Err(TuneError::DataError(
            "all sampled rows coincide; kernel width is undefined".to_string(),
        ));
    }
    distances.sort_by(|a, b| a.total_cmp(b));
    let q10 = quantile_sorted(&distances, 0.1);
    let q90 = quantile_sorted(&distances, 0.9);
    Ok((1.0 / q10 + 1.0 / q90) / 2.0)
}

/// Linear-interpolation quantile of sorted data
pub(crate) fn quantile_sorted(sorted: &[f64], q: f64) -> f64 {
    if sorted.is_empty() {
        return f64::NAN;
    }
    let pos = q.clamp(0.0, 1.0) * (sorted.len() - 1) as f64;
    let lo = pos.floor() as usize;
    let hi = pos.ceil() as usize;
    sorted[lo] + (sorted[hi] - sorted[lo]) * (pos - lo as f64)
}

/// `len` distinct `mtry` values spread from 2 to `n_features`
pub fn mtry_sequence(n_features: usize, len: usize) -> Vec<i64> {
    if n_features <= 1 {
        return vec![1];
    }
    if len <= 1 {
        return vec![((n_features as f64).sqrt().floor() as i64).max(1)];
    }
    let (lo, hi) = (2.0, n_features as f64);
    let mut values: Vec<i64> = (0..len)
        .map(|k| (lo + (hi - lo) * k as f64 / (len - 1) as f64).floor() as i64)
        .collect();
    values.dedup();
    values
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::search_space::int_range;

    fn toy() -> (Array2<f64>, Array1<f64>) {
        let x = Array2::from_shape_fn((60, 3), |(i, j)| {
            let shift = if i % 2 == 0 { 1.0 } else { -1.0 };
            shift * (j as f64 + 1.0) + ((i * 7 + j) % 5) as f64 * 0.2
        });
        let y: Array1<f64> = (0..60).map(|i| if i % 2 == 0 { 1.0 } else { 0.0 }).collect();
        (x, y)
    }

    #[test]
    fn test_default_boosting_grid() {
        let x = Array2::zeros((10, 4));
        let grid = ModelType::GradientBoosting.default_grid(3, &x, 1).unwrap();
        assert_eq!(grid.n_configs(), 9);
        let first = &grid.expand()[0];
        assert_eq!(first.usize("interaction_depth").unwrap(), 1);
        assert_eq!(first.usize("n_trees").unwrap(), 50);
        assert_eq!(first.float("shrinkage").unwrap(), 0.1);
    }

    #[test]
    fn test_default_svm_grid() {
        let (x, _) = toy();
        let grid = ModelType::Svm.default_grid(9, &x, 1).unwrap();
        let c: Vec<f64> = grid.axis("C").unwrap().values.iter().map(|v| v.as_f64()).collect();
        assert_eq!(c, vec![0.25, 0.5, 1.0, 2.0, 4.0, 8.0, 16.0, 32.0, 64.0]);
        let sigma = grid.axis("sigma").unwrap().values[0].as_f64();
        assert!(sigma > 0.0 && sigma.is_finite());
    }

    #[test]
    fn test_mtry_sequence() {
        assert_eq!(mtry_sequence(58, 3), vec![2, 30, 58]);
        assert_eq!(mtry_sequence(58, 1), vec![7]);
        assert_eq!(mtry_sequence(3, 5), vec![2, 3]);
    }

    #[test]
    fn test_validate_rejects_bad_values() {
        let gbm = ParamSet::new()
            .with("interaction_depth", 0i64)
            .with("n_trees", 50i64)
            .with("shrinkage", 0.1)
            .with("n_minobsinnode", 10i64);
        assert!(ModelType::GradientBoosting.validate(&gbm, 5).is_err());

        let svm = ParamSet::new().with("sigma", 0.1).with("C", -1.0);
        assert!(ModelType::Svm.validate(&svm, 5).is_err());

        let rf = ParamSet::new().with("mtry", 9i64);
        assert!(ModelType::RandomForest.validate(&rf, 5).is_err());

        let unknown = ParamSet::new().with("mtry", 2i64).with("depth", 3i64);
        assert!(ModelType::RandomForest.validate(&unknown, 5).is_err());

        let missing = ParamSet::new().with("sigma", 0.1);
        assert!(ModelType::Svm.validate(&missing, 5).is_err());
    }

    #[test]
    fn test_validate_grid_checks_every_combination() {
        let grid = Grid::new()
            .with("interaction_depth", [1i64, 5, 9, 13])
            .with("n_trees", int_range(50, 500, 50))
            .with("shrinkage", [0.1, 0.01])
            .with("n_minobsinnode", [20i64]);
        let configs = ModelType::GradientBoosting.validate_grid(&grid, 58).unwrap();
        assert_eq!(configs.len(), 80);

        let bad = grid.with("shrinkage", [0.1, 0.0]);
        assert!(ModelType::GradientBoosting.validate_grid(&bad, 58).is_err());
    }

    #[test]
    fn test_every_family_fits_and_predicts() {
        let (x, y) = toy();
        let options = ModelOptions {
            forest_trees: 20,
            ..Default::default()
        };
        for model_type in ModelType::ALL {
            let grid = match model_type {
                ModelType::GradientBoosting => Grid::new()
                    .with("interaction_depth", [2i64])
                    .with("n_trees", [30i64])
                    .with("shrinkage", [0.1])
                    .with("n_minobsinnode", [5i64]),
                other => other.default_grid(1, &x, 3).unwrap(),
            };
            let params = &model_type.validate_grid(&grid, x.ncols()).unwrap()[0];
            let model = model_type.fit(params, &options, 7, &x, &y).unwrap();
            assert_eq!(model.model_type(), model_type);

            let probs = model.predict_proba(&x).unwrap();
            assert_eq!(probs.len(), 60);
            let correct = probs
                .iter()
                .zip(y.iter())
                .filter(|(p, t)| (**p >= 0.5) == (**t == 1.0))
                .count();
            assert!(correct >= 54, "{} only got {} right", model_type, correct);
        }
    }

    #[test]
    fn test_quantile_sorted() {
        let v = [1.0, 2.0, 3.0, 4.0, 5.0];
        assert_eq!(quantile_sorted(&v, 0.5), 3.0);
        assert_eq!(quantile_sorted(&v, 0.25), 2.0);
        assert!((quantile_sorted(&v, 0.1) - 1.4).abs() < 1e-12);
    }
}
