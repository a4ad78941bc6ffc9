//! celltune - model selection for two-class tabular data
//!
//! A dataset is split into training and test subsets, each model family is
//! tuned over a hyperparameter grid with repeated cross-validation on shared
//! folds, the selected configurations are evaluated on the test subset, and
//! the families are compared through their paired resampling distributions.
//!
//! # Modules
//!
//! ## Workflow
//! - [`partition`] - Stratified train/test split
//! - [`search_space`] - Hyperparameter grids
//! - [`resampling`] - Repeated k-fold plans and fold generation
//! - [`tuner`] - Cross-validated grid search
//! - [`evaluation`] - Confusion matrix and ROC on the test subset
//! - [`comparison`] - Paired resample distributions
//! - [`workflow`] - End-to-end orchestration
//!
//! ## Building blocks
//! - [`data`] - Datasets, CSV loading, synthetic segmentation data
//! - [`preprocess`] - Centering and scaling
//! - [`models`] - Boosted trees, radial SVM, random forest
//! - [`metrics`] - Two-class performance measures
//! - [`parallel`] - Worker pool construction
//! - [`config`] - Serialisable workflow settings
//! - [`cli`] - Command-line interface

// Core error handling
pub mod error;

// Workflow
pub mod partition;
pub mod search_space;
pub mod resampling;
pub mod tuner;
pub mod evaluation;
pub mod comparison;
pub mod workflow;

// Building blocks
pub mod data;
pub mod preprocess;
pub mod models;
pub mod metrics;
pub mod parallel;
pub mod config;

// Services
pub mod cli;

pub use error::{Result, TuneError};

/// Re-export commonly used types
pub mod prelude {
    // Error handling
    pub use crate::error::{Result, TuneError};

    // Data
    pub use crate::data::{DataLoader, Dataset, SyntheticSegmentation};
    pub use crate::partition::{Partition, Partitioner};

    // Search and resampling
    pub use crate::resampling::{CVStrategy, Resample, ResamplingPlan};
    pub use crate::search_space::{Grid, ParamSet, ParamValue};
    pub use crate::preprocess::{PreprocessStep, Preprocessor};

    // Models
    pub use crate::models::{Model, ModelOptions, ModelType, TrainedModel};

    // Tuning, evaluation, comparison
    pub use crate::tuner::{SearchSpace, SelectionRule, TuneResult, Tuner};
    pub use crate::evaluation::{EvaluationResult, Evaluator, PositiveClass};
    pub use crate::comparison::{Comparison, Resamples};
    pub use crate::metrics::{ConfusionMatrix, Metric, RocCurve, TwoClassSummary};

    // Orchestration
    pub use crate::config::{ModelSpec, WorkflowConfig};
    pub use crate::parallel::ParallelConfig;
    pub use crate::workflow::{Workflow, WorkflowReport};
}
