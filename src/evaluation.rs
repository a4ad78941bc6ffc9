//! Test-set evaluation of a tuned model

use crate::data::Dataset;
use crate::error::{Result, TuneError};
use crate::metrics::{ConfusionMatrix, RocCurve, RocPoint};
use crate::tuner::TuneResult;
use serde::{Deserialize, Serialize};
use std::fmt;
use tracing::info;

/// Which label level counts as the positive class
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum PositiveClass {
    /// First level of the label
    FirstLevel,
    /// Level with the fewest rows
    #[default]
    Minority,
    /// Level with this name
    Named(String),
}

impl PositiveClass {
    /// Level index in `dataset`
    pub fn resolve(&self, dataset: &Dataset) -> Result<usize> {
        match self {
            PositiveClass::FirstLevel => Ok(0),
            PositiveClass::Minority => Ok(dataset.minority_level()),
            PositiveClass::Named(name) => dataset.level_index(name).ok_or_else(|| {
                TuneError::ConfigError(format!(
                    "positive class '{}' is not one of {:?}",
                    name,
                    dataset.levels()
                ))
            }),
        }
    }
}

/// Class call and probability for one test row
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Prediction {
    pub row: usize,
    pub observed: String,
    pub predicted: String,
    /// Probability of the positive class
    pub probability: f64,
}

/// Performance of one tuned model on the test subset
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EvaluationResult {
    pub model: String,
    pub positive_level: String,
    pub negative_level: String,
    pub threshold: f64,
    pub confusion: ConfusionMatrix,
    pub roc: RocCurve,
    pub auc: f64,
    pub predictions: Vec<Prediction>,
}

impl EvaluationResult {
    pub fn sensitivity(&self) -> f64 {
        self.confusion.sensitivity()
    }

    pub fn specificity(&self) -> f64 {
        self.confusion.specificity()
    }

    pub fn accuracy(&self) -> f64 {
        self.confusion.accuracy()
    }

    pub fn roc_points(&self) -> &[RocPoint] {
        self.roc.points()
    }
}

impl fmt::Display for EvaluationResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let cm = &self.confusion;
        let pos = &self.positive_level;
        let neg = &self.negative_level;
        let width = pos.len().max(neg.len()).max(9);
        writeln!(f, "{:>width$}  {:>width$}", "Reference", "", width = width)?;
        writeln!(f, "{:>width$}  {:>width$}  {:>width$}", "Prediction", pos, neg, width = width)?;
        writeln!(f, "{:>width$}  {:>width$}  {:>width$}", pos, cm.tp, cm.fp, width = width)?;
        writeln!(f, "{:>width$}  {:>width$}  {:>width$}", neg, cm.fn_, cm.tn, width = width)?;
        writeln!(f)?;
        writeln!(f, "         Accuracy : {:.4}", cm.accuracy())?;
        writeln!(f, "            Kappa : {:.4}", cm.kappa())?;
        writeln!(f, "      Sensitivity : {:.4}", cm.sensitivity())?;
        writeln!(f, "      Specificity : {:.4}", cm.specificity())?;
        writeln!(f, "   Pos Pred Value : {:.4}", cm.ppv())?;
        writeln!(f, "   Neg Pred Value : {:.4}", cm.npv())?;
        writeln!(f, "Balanced Accuracy : {:.4}", cm.balanced_accuracy())?;
        write!(f, "              AUC : {:.4}", self.auc)
    }
}

/// Applies a tuned model to held-out rows
#[derive(Debug, Clone)]
pub struct Evaluator {
    threshold: f64,
}

impl Default for Evaluator {
    fn default() -> Self {
        Self { threshold: 0.5 }
    }
}

impl Evaluator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Positive-class probability at or above which a row is called positive
    pub fn with_threshold(mut self, threshold: f64) -> Self {
        self.threshold = threshold;
        self
    }

    /// Evaluate `tuned` on `test`.
    ///
    /// Test levels are matched to the training levels by name, so their order
    /// may differ.
    pub fn evaluate(&self, tuned: &TuneResult, test: &Dataset) -> Result<EvaluationResult> {
        if !(0.0..=1.0).contains(&self.threshold) {
            return Err(TuneError::invalid_param("threshold", self.threshold, "must be in [0, 1]"));
        }
        if test.n_rows() == 0 {
            return Err(TuneError::DataError("test subset is empty".to_string()));
        }
        let positive_name = tuned.levels.get(tuned.positive).ok_or_else(|| {
            TuneError::ConfigError(format!(
                "positive level index {} out of range for training levels {:?}",
                tuned.positive, tuned.levels
            ))
        })?;
        if tuned.levels.iter().any(|l| test.level_index(l).is_none()) {
            return Err(TuneError::DataError(format!(
                "test levels {:?} do not match training levels {:?}",
                test.levels(),
                tuned.levels
            )));
        }
        let positive = test.level_index(positive_name).ok_or_else(|| {
            TuneError::DataError(format!("positive level '{}' missing from test levels", positive_name))
        })?;
        let negative = 1 - positive;

        let probs = tuned.predict_proba(test.features())?.to_vec();
        let truth: Vec<bool> = test.labels().iter().map(|&c| c == positive).collect();

        let confusion = ConfusionMatrix::from_probabilities(&probs, &truth, self.threshold)?;
        let roc = RocCurve::compute(&probs, &truth)?;
        let auc = roc.auc();

        let levels = test.levels();
        let predictions = probs
            .iter()
            .zip(test.labels().iter())
            .enumerate()
            .map(|(row, (&p, &code))| Prediction {
                row,
                observed: levels[code].clone(),
                predicted: if p >= self.threshold {
                    levels[positive].clone()
                } else {
                    levels[negative].clone()
                },
                probability: p,
            })
            .collect();

        info!(
            model = %tuned.model_type,
            auc = auc,
            sensitivity = confusion.sensitivity(),
            specificity = confusion.specificity(),
            "Evaluated on test subset"
        );

        Ok(EvaluationResult {
            model: tuned.model_type.name().to_string(),
            positive_level: levels[positive].clone(),
            negative_level: levels[negative].clone(),
            threshold: self.threshold,
            confusion,
            roc,
            auc,
            predictions,
        })
    }
}
