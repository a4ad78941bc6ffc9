//! Workflow configuration
//!
//! Defaults reproduce the segmentation tutorial: a 50/50 split, 5 repeats of
//! 10-fold cross-validation ranked by ROC AUC, an 80-configuration boosted
//! tree grid, a radial SVM with tune length 9 and a random forest with tune
//! length 3, all on centered and scaled features.

use crate::error::{Result, TuneError};
use crate::evaluation::PositiveClass;
use crate::models::{ModelOptions, ModelType};
use crate::parallel::ParallelConfig;
use crate::preprocess::Preprocessor;
use crate::resampling::ResamplingPlan;
use crate::search_space::{int_range, Grid};
use crate::tuner::{SearchSpace, SelectionRule, Tuner};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// One model family to tune
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelSpec {
    pub model: ModelType,
    pub search: SearchSpace,
    pub preprocess: Preprocessor,
}

impl ModelSpec {
    pub fn new(model: ModelType, search: SearchSpace) -> Self {
        Self {
            model,
            search,
            preprocess: Preprocessor::center_scale(),
        }
    }

    pub fn with_preprocess(mut self, preprocess: Preprocessor) -> Self {
        self.preprocess = preprocess;
        self
    }
}

/// Boosted tree grid of the tutorial: 4 depths x 10 sizes x 2 rates x 1 = 80
pub fn tutorial_boosting_grid() -> Grid {
    Grid::new()
        .with("interaction_depth", int_range(1, 13, 4))
        .with("n_trees", int_range(50, 500, 50))
        .with("shrinkage", [0.1, 0.01])
        .with("n_minobsinnode", [20i64])
}

/// Complete workflow settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkflowConfig {
    /// Seed of the train/test partition
    pub seed: u64,
    pub train_fraction: f64,
    pub label_column: String,
    /// Columns dropped on load besides the label
    pub ignore_columns: Vec<String>,
    pub positive: PositiveClass,
    /// Shared by every model so the comparison is paired
    pub resampling: ResamplingPlan,
    pub selection: SelectionRule,
    pub options: ModelOptions,
    pub parallel: ParallelConfig,
    /// Probability threshold for class calls on the test subset
    pub threshold: f64,
    pub models: Vec<ModelSpec>,
}

impl Default for WorkflowConfig {
    fn default() -> Self {
        Self {
            seed: 1,
            train_fraction: 0.5,
            label_column: "Class".to_string(),
            ignore_columns: vec!["Cell".to_string(), "Case".to_string()],
            positive: PositiveClass::Minority,
            resampling: ResamplingPlan::repeated_cv(10, 5),
            selection: SelectionRule::Best,
            options: ModelOptions::default(),
            parallel: ParallelConfig::default(),
            threshold: 0.5,
            models: vec![
                ModelSpec::new(ModelType::GradientBoosting, SearchSpace::Grid(tutorial_boosting_grid())),
                ModelSpec::new(ModelType::Svm, SearchSpace::TuneLength(9)),
                ModelSpec::new(ModelType::RandomForest, SearchSpace::TuneLength(3)),
            ],
        }
    }
}

impl WorkflowConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Small grids and a single pass of 3-fold CV, for smoke runs
    pub fn quick() -> Self {
        Self {
            resampling: ResamplingPlan::repeated_cv(3, 1),
            options: ModelOptions {
                forest_trees: 50,
                ..Default::default()
            },
            models: vec![
                ModelSpec::new(
                    ModelType::GradientBoosting,
                    SearchSpace::Grid(
                        Grid::new()
                            .with("interaction_depth", [1i64, 3])
                            .with("n_trees", [50i64, 100])
                            .with("shrinkage", [0.1])
                            .with("n_minobsinnode", [5i64]),
                    ),
                ),
                ModelSpec::new(ModelType::Svm, SearchSpace::TuneLength(3)),
                ModelSpec::new(ModelType::RandomForest, SearchSpace::TuneLength(2)),
            ],
            ..Self::default()
        }
    }

    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = seed;
        self
    }

    pub fn with_threads(mut self, n_threads: usize) -> Self {
        self.parallel = self.parallel.with_threads(n_threads);
        self
    }

    pub fn with_resampling(mut self, plan: ResamplingPlan) -> Self {
        self.resampling = plan;
        self
    }

    pub fn with_models(mut self, models: Vec<ModelSpec>) -> Self {
        self.models = models;
        self
    }

    /// Check settings that do not depend on the data
    pub fn validate(&self) -> Result<()> {
        if !(self.train_fraction > 0.0 && self.train_fraction < 1.0) {
            return Err(TuneError::invalid_param(
                "train_fraction",
                self.train_fraction,
                "must be in (0, 1)",
            ));
        }
        if !(0.0..=1.0).contains(&self.threshold) {
            return Err(TuneError::invalid_param("threshold", self.threshold, "must be in [0, 1]"));
        }
        if self.models.is_empty() {
            return Err(TuneError::ConfigError("no models configured".to_string()));
        }
        for (i, spec) in self.models.iter().enumerate() {
            if self.models[..i].iter().any(|m| m.model == spec.model) {
                return Err(TuneError::ConfigError(format!(
                    "model {} configured more than once",
                    spec.model
                )));
            }
            match &spec.search {
                SearchSpace::Grid(grid) => grid.check()?,
                SearchSpace::TuneLength(0) => {
                    return Err(TuneError::invalid_param("tune_length", 0, "must be at least 1"))
                }
                SearchSpace::TuneLength(_) => {}
            }
        }
        if self.resampling.n_resamples() == 0 {
            return Err(TuneError::ConfigError("resampling plan has no folds".to_string()));
        }
        Ok(())
    }

    /// Tuner for one configured model
    pub fn tuner(&self, spec: &ModelSpec) -> Tuner {
        Tuner::new(spec.model, self.resampling.clone())
            .with_search(spec.search.clone())
            .with_preprocessor(spec.preprocess.clone())
            .with_options(self.options.clone())
            .with_selection(self.selection)
    }

    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let json = serde_json::to_string_pretty(self)?;
        std::fs::write(path, json)?;
        Ok(())
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let json = std::fs::read_to_string(path)?;
        let config: Self = serde_json::from_str(&json)?;
        config.validate()?;
        Ok(config)
    }
}
