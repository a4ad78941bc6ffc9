//! Feature pre-processing fitted on analysis rows only
//!
//! Steps are declared once and re-fitted inside every resample, so holdout
//! rows never influence the centering or scaling applied to them.

use crate::error::{Result, TuneError};
use ndarray::{Array1, Array2, Axis};
use serde::{Deserialize, Serialize};

/// Pre-processing step applied column-wise
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PreprocessStep {
    /// Subtract the column mean
    Center,
    /// Divide by the column standard deviation
    Scale,
}

/// Declared pre-processing, unfitted
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Preprocessor {
    steps: Vec<PreprocessStep>,
}

impl Preprocessor {
    pub fn new(steps: Vec<PreprocessStep>) -> Self {
        Self { steps }
    }

    /// Center then scale
    pub fn center_scale() -> Self {
        Self::new(vec![PreprocessStep::Center, PreprocessStep::Scale])
    }

    pub fn steps(&self) -> &[PreprocessStep] {
        &self.steps
    }

    /// Estimate column statistics from `x`
    pub fn fit(&self, x: &Array2<f64>) -> Result<FittedPreprocessor> {
        let n_features = x.ncols();
        if x.nrows() == 0 {
            return Err(TuneError::DataError(
                "cannot fit pre-processing on zero rows".to_string(),
            ));
        }

        let center = if self.steps.contains(&PreprocessStep::Center) {
            x.mean_axis(Axis(0))
                .ok_or_else(|| TuneError::DataError("empty feature matrix".to_string()))?
        } else {
            Array1::zeros(n_features)
        };

        let scale = if self.steps.contains(&PreprocessStep::Scale) {
            let ddof = if x.nrows() > 1 { 1.0 } else { 0.0 };
            // Constant columns keep their values instead of dividing by zero
            x.std_axis(Axis(0), ddof)
                .mapv(|s| if s > 0.0 && s.is_finite() { s } else { 1.0 })
        } else {
            Array1::ones(n_features)
        };

        Ok(FittedPreprocessor { center, scale })
    }
}

/// Column statistics learned by [`Preprocessor::fit`]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FittedPreprocessor {
    center: Array1<f64>,
    scale: Array1<f64>,
}

impl FittedPreprocessor {
    /// Identity transform over `n_features` columns
    pub fn identity(n_features: usize) -> Self {
        Self {
            center: Array1::zeros(n_features),
            scale: Array1::ones(n_features),
        }
    }

    pub fn center(&self) -> &Array1<f64> {
        &self.center
    }

    pub fn scale(&self) -> &Array1<f64> {
        &self.scale
    }

    pub fn transform(&self, x: &Array2<f64>) -> Result<Array2<f64>> {
        if x.ncols() != self.center.len() {
            return Err(TuneError::ShapeError {
                expected: format!("{} features", self.center.len()),
                actual: format!("{} features", x.ncols()),
            });
        }
        let mut out = x.to_owned();
        for mut row in out.rows_mut() {
            row -= &self.center;
            row /= &self.scale;
        }
        Ok(out)
    }

    pub fn inverse_transform(&self, x: &Array2<f64>) -> Result<Array2<f64>> {
        if x.ncols() != self.center.len() {
            return Err(TuneError::ShapeError {
                expected: format!("{} features", self.center.len()),
                actual: format!("{} features", x.ncols()),
            });
        }
        let mut out = x.to_owned();
        for mut row in out.rows_mut() {
            row *= &self.scale;
            row += &self.center;
        }
        Ok(out)
    }
}
