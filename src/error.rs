//! Error types for the celltune workflow

use thiserror::Error;

/// Result type alias for celltune operations
pub type Result<T> = std::result::Result<T, TuneError>;

/// Main error type for the tuning workflow
#[derive(Error, Debug)]
pub enum TuneError {
    #[error("Data error: {0}")]
    DataError(String),

    #[error("Training error: {0}")]
    TrainingError(String),

    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    SerializationError(String),

    #[error("Invalid shape: expected {expected}, got {actual}")]
    ShapeError { expected: String, actual: String },

    #[error("Feature not found: {0}")]
    FeatureNotFound(String),

    #[error("Model not fitted")]
    ModelNotFitted,

    #[error("Invalid parameter: {name} = {value}, {reason}")]
    InvalidParameter {
        name: String,
        value: String,
        reason: String,
    },

    #[error("Convergence failed after {iterations} iterations")]
    ConvergenceError { iterations: usize },

    #[error("Thread pool error: {0}")]
    ThreadPoolError(String),
}

impl TuneError {
    /// Shorthand for an [`TuneError::InvalidParameter`]
    pub fn invalid_param(
        name: impl Into<String>,
        value: impl ToString,
        reason: impl Into<String>,
    ) -> Self {
        TuneError::InvalidParameter {
            name: name.into(),
            value: value.to_string(),
            reason: reason.into(),
        }
    }

    /// Whether the error came from fitting a model, as opposed to bad input.
    ///
    /// The tuner records these per fold instead of aborting the grid.
    pub fn is_fit_failure(&self) -> bool {
        matches!(
            self,
            TuneError::TrainingError(_) | TuneError::ConvergenceError { .. }
        )
    }
}

impl From<polars::error::PolarsError> for TuneError {
    fn from(err: polars::error::PolarsError) -> Self {
        TuneError::DataError(err.to_string())
    }
}

impl From<serde_json::Error> for TuneError {
    fn from(err: serde_json::Error) -> Self {
        TuneError::SerializationError(err.to_string())
    }
}

impl From<ndarray::ShapeError> for TuneError {
    fn from(err: ndarray::ShapeError) -> Self {
        TuneError::ShapeError {
            expected: "valid shape".to_string(),
            actual: err.to_string(),
        }
    }
}
