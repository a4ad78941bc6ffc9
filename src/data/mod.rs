//! Labeled two-class datasets
//!
//! A [`Dataset`] is a dense numeric feature matrix plus one categorical label
//! with exactly two levels. Rows are addressed by index so that partitions and
//! resamples can be expressed as index sets over the same table.

mod loader;
mod synthetic;

pub use loader::DataLoader;
pub use synthetic::{SyntheticSegmentation, SEGMENTATION_FEATURES};

use crate::error::{Result, TuneError};
use ndarray::{Array1, Array2, Axis};
use serde::{Deserialize, Serialize};

/// Feature matrix with a two-level categorical label
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Dataset {
    features: Array2<f64>,
    /// Label of each row as an index into `levels`
    labels: Vec<usize>,
    levels: Vec<String>,
    feature_names: Vec<String>,
}

impl Dataset {
    /// Build a dataset from raw string labels.
    ///
    /// Levels are taken in order of first appearance.
    pub fn new<S: AsRef<str>>(
        features: Array2<f64>,
        labels: &[S],
        feature_names: Vec<String>,
    ) -> Result<Self> {
        let mut levels: Vec<String> = Vec::new();
        let mut codes = Vec::with_capacity(labels.len());
        for label in labels {
            let label = label.as_ref();
            let code = match levels.iter().position(|l| l == label) {
                Some(code) => code,
                None => {
                    levels.push(label.to_string());
                    levels.len() - 1
                }
            };
            codes.push(code);
        }
        Self::from_codes(features, codes, levels, feature_names)
    }

    /// Build a dataset from label codes and an explicit level list
    pub fn from_codes(
        features: Array2<f64>,
        labels: Vec<usize>,
        levels: Vec<String>,
        feature_names: Vec<String>,
    ) -> Result<Self> {
        if features.nrows() != labels.len() {
            return Err(TuneError::ShapeError {
                expected: format!("{} labels", features.nrows()),
                actual: format!("{} labels", labels.len()),
            });
        }
        if features.ncols() != feature_names.len() {
            return Err(TuneError::ShapeError {
                expected: format!("{} feature names", features.ncols()),
                actual: format!("{} feature names", feature_names.len()),
            });
        }
        if levels.len() != 2 {
            return Err(TuneError::DataError(format!(
                "label must have exactly two levels, found {} ({:?})",
                levels.len(),
                levels
            )));
        }
        if let Some(&bad) = labels.iter().find(|&&c| c >= levels.len()) {
            return Err(TuneError::DataError(format!(
                "label code {} out of range for {} levels",
                bad,
                levels.len()
            )));
        }
        if let Some(((row, col), _)) = features.indexed_iter().find(|(_, v)| !v.is_finite()) {
            return Err(TuneError::DataError(format!(
                "non-finite value in row {} column '{}'",
                row, feature_names[col]
            )));
        }

        Ok(Self {
            features,
            labels,
            levels,
            feature_names,
        })
    }

    pub fn n_rows(&self) -> usize {
        self.features.nrows()
    }

    pub fn n_features(&self) -> usize {
        self.features.ncols()
    }

    pub fn features(&self) -> &Array2<f64> {
        &self.features
    }

    /// Label codes, one per row
    pub fn labels(&self) -> &[usize] {
        &self.labels
    }

    pub fn levels(&self) -> &[String] {
        &self.levels
    }

    pub fn feature_names(&self) -> &[String] {
        &self.feature_names
    }

    /// Index of a level by name
    pub fn level_index(&self, name: &str) -> Option<usize> {
        self.levels.iter().position(|l| l == name)
    }

    /// Row count per level, in level order
    pub fn class_counts(&self) -> [usize; 2] {
        let mut counts = [0usize; 2];
        for &code in &self.labels {
            counts[code] += 1;
        }
        counts
    }

    /// Level with the fewest rows (first level on a tie)
    pub fn minority_level(&self) -> usize {
        let counts = self.class_counts();
        if counts[1] < counts[0] {
            1
        } else {
            0
        }
    }

    /// Row indices grouped by level
    pub fn indices_by_class(&self) -> [Vec<usize>; 2] {
        let mut groups: [Vec<usize>; 2] = [Vec::new(), Vec::new()];
        for (idx, &code) in self.labels.iter().enumerate() {
            groups[code].push(idx);
        }
        groups
    }

    /// Copy of the rows at `indices`, keeping level order and feature names
    pub fn subset(&self, indices: &[usize]) -> Result<Self> {
        if let Some(&bad) = indices.iter().find(|&&i| i >= self.n_rows()) {
            return Err(TuneError::DataError(format!(
                "row index {} out of range for {} rows",
                bad,
                self.n_rows()
            )));
        }
        Ok(Self {
            features: self.features.select(Axis(0), indices),
            labels: indices.iter().map(|&i| self.labels[i]).collect(),
            levels: self.levels.clone(),
            feature_names: self.feature_names.clone(),
        })
    }

    /// 0/1 target with `positive` encoded as 1.0
    pub fn binary_target(&self, positive: usize) -> Array1<f64> {
        self.labels
            .iter()
            .map(|&code| if code == positive { 1.0 } else { 0.0 })
            .collect()
    }
}
