//! Two-class performance metrics
//!
//! Everything here is computed relative to a positive class: truth and
//! predictions arrive as booleans ("is positive") and scores as
//! positive-class probabilities.

use crate::error::{Result, TuneError};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Metric used to rank configurations and summarise resamples
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Metric {
    /// Area under the ROC curve
    Roc,
    /// Sensitivity (true positive rate)
    Sens,
    /// Specificity (true negative rate)
    Spec,
    Accuracy,
    /// Cohen's kappa
    Kappa,
}

impl Metric {
    /// Metrics reported for every resample, in report order
    pub const SUMMARY: [Metric; 5] = [Metric::Roc, Metric::Sens, Metric::Spec, Metric::Accuracy, Metric::Kappa];

    pub fn name(&self) -> &'static str {
        match self {
            Metric::Roc => "ROC",
            Metric::Sens => "Sens",
            Metric::Spec => "Spec",
            Metric::Accuracy => "Accuracy",
            Metric::Kappa => "Kappa",
        }
    }
}

impl fmt::Display for Metric {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Metric {
    type Err = TuneError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "roc" | "auc" => Ok(Metric::Roc),
            "sens" | "sensitivity" => Ok(Metric::Sens),
            "spec" | "specificity" => Ok(Metric::Spec),
            "accuracy" => Ok(Metric::Accuracy),
            "kappa" => Ok(Metric::Kappa),
            other => Err(TuneError::ConfigError(format!("unknown metric '{}'", other))),
        }
    }
}

/// Confusion matrix for binary classification
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConfusionMatrix {
    pub tp: usize,
    pub tn: usize,
    pub fp: usize,
    pub fn_: usize,
}

impl ConfusionMatrix {
    /// Count outcomes; `predicted[i]` and `truth[i]` say whether row i is positive
    pub fn from_predictions(predicted: &[bool], truth: &[bool]) -> Result<Self> {
        if predicted.len() != truth.len() {
            return Err(TuneError::ShapeError {
                expected: format!("{} predictions", truth.len()),
                actual: format!("{} predictions", predicted.len()),
            });
        }
        let mut matrix = Self::default();
        for (&p, &t) in predicted.iter().zip(truth.iter()) {
            match (p, t) {
                (true, true) => matrix.tp += 1,
                (false, false) => matrix.tn += 1,
                (true, false) => matrix.fp += 1,
                (false, true) => matrix.fn_ += 1,
            }
        }
        Ok(matrix)
    }

    /// Threshold positive-class probabilities (`p >= threshold` is positive)
    pub fn from_probabilities(probs: &[f64], truth: &[bool], threshold: f64) -> Result<Self> {
        let predicted: Vec<bool> = probs.iter().map(|&p| p >= threshold).collect();
        Self::from_predictions(&predicted, truth)
    }

    pub fn total(&self) -> usize {
        self.tp + self.tn + self.fp + self.fn_
    }

    pub fn accuracy(&self) -> f64 {
        ratio(self.tp + self.tn, self.total())
    }

    /// TP / (TP + FN); NaN without positive rows
    pub fn sensitivity(&self) -> f64 {
        ratio(self.tp, self.tp + self.fn_)
    }

    /// TN / (TN + FP); NaN without negative rows
    pub fn specificity(&self) -> f64 {
        ratio(self.tn, self.tn + self.fp)
    }

    /// Positive predictive value
    pub fn ppv(&self) -> f64 {
        ratio(self.tp, self.tp + self.fp)
    }

    /// Negative predictive value
    pub fn npv(&self) -> f64 {
        ratio(self.tn, self.tn + self.fn_)
    }

    pub fn prevalence(&self) -> f64 {
        ratio(self.tp + self.fn_, self.total())
    }

    pub fn balanced_accuracy(&self) -> f64 {
        (self.sensitivity() + self.specificity()) / 2.0
    }

    /// Cohen's kappa: agreement beyond chance
    pub fn kappa(&self) -> f64 {
        let n = self.total() as f64;
        if n == 0.0 {
            return f64::NAN;
        }
        let observed = (self.tp + self.tn) as f64 / n;
        let pred_pos = (self.tp + self.fp) as f64 / n;
        let true_pos = (self.tp + self.fn_) as f64 / n;
        let expected = pred_pos * true_pos + (1.0 - pred_pos) * (1.0 - true_pos);
        if (1.0 - expected).abs() < f64::EPSILON {
            return if (observed - 1.0).abs() < f64::EPSILON { 1.0 } else { 0.0 };
        }
        (observed - expected) / (1.0 - expected)
    }
}

fn ratio(num: usize, den: usize) -> f64 {
    if den == 0 {
        f64::NAN
    } else {
        num as f64 / den as f64
    }
}

/// One operating point of a ROC curve
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RocPoint {
    /// Rows with probability >= threshold are called positive
    pub threshold: f64,
    pub fpr: f64,
    pub tpr: f64,
}

/// ROC curve from most to least restrictive threshold
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RocCurve {
    points: Vec<RocPoint>,
}

impl RocCurve {
    /// Sweep the threshold over the distinct scores, highest first.
    ///
    /// The curve starts at (0, 0) with an infinite threshold and ends at
    /// (1, 1). Tied scores move both rates in a single step.
    pub fn compute(scores: &[f64], truth: &[bool]) -> Result<Self> {
        if scores.len() != truth.len() {
            return Err(TuneError::ShapeError {
                expected: format!("{} scores", truth.len()),
                actual: format!("{} scores", scores.len()),
            });
        }
        if scores.iter().any(|s| s.is_nan()) {
            return Err(TuneError::DataError("ROC scores contain NaN".to_string()));
        }
        let n_pos = truth.iter().filter(|&&t| t).count();
        let n_neg = truth.len() - n_pos;
        if n_pos == 0 || n_neg == 0 {
            return Err(TuneError::DataError(format!(
                "ROC needs both classes, got {} positive and {} negative rows",
                n_pos, n_neg
            )));
        }

        let mut order: Vec<usize> = (0..scores.len()).collect();
        order.sort_by(|&a, &b| scores[b].total_cmp(&scores[a]));

        let mut points = Vec::with_capacity(scores.len() + 1);
        points.push(RocPoint {
            threshold: f64::INFINITY,
            fpr: 0.0,
            tpr: 0.0,
        });

        let (mut tp, mut fp) = (0usize, 0usize);
        let mut k = 0;
        while k < order.len() {
            let threshold = scores[order[k]];
            while k < order.len() && scores[order[k]] == threshold {
                if truth[order[k]] {
                    tp += 1;
                } else {
                    fp += 1;
                }
                k += 1;
            }
            points.push(RocPoint {
                threshold,
                fpr: fp as f64 / n_neg as f64,
                tpr: tp as f64 / n_pos as f64,
            });
        }

        Ok(Self { points })
    }

    pub fn points(&self) -> &[RocPoint] {
        &self.points
    }

    /// Area under the curve by the trapezoid rule
    pub fn auc(&self) -> f64 {
        self.points
            .windows(2)
            .map(|w| (w[1].fpr - w[0].fpr) * (w[1].tpr + w[0].tpr) / 2.0)
            .sum()
    }
}

/// Holdout performance of one fitted model
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TwoClassSummary {
    pub roc: f64,
    pub sens: f64,
    pub spec: f64,
    pub accuracy: f64,
    pub kappa: f64,
}

impl TwoClassSummary {
    /// Score positive-class probabilities against truth.
    ///
    /// Class calls use `p >= threshold`. ROC is NaN when the rows hold a
    /// single class.
    pub fn compute(probs: &[f64], truth: &[bool], threshold: f64) -> Result<Self> {
        let cm = ConfusionMatrix::from_probabilities(probs, truth, threshold)?;
        let roc = match RocCurve::compute(probs, truth) {
            Ok(curve) => curve.auc(),
            Err(TuneError::DataError(_)) => f64::NAN,
            Err(e) => return Err(e),
        };
        Ok(Self {
            roc,
            sens: cm.sensitivity(),
            spec: cm.specificity(),
            accuracy: cm.accuracy(),
            kappa: cm.kappa(),
        })
    }

    pub fn get(&self, metric: Metric) -> f64 {
        match metric {
            Metric::Roc => self.roc,
            Metric::Sens => self.sens,
            Metric::Spec => self.spec,
            Metric::Accuracy => self.accuracy,
            Metric::Kappa => self.kappa,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_confusion_matrix_counts() {
        let predicted = [true, true, false, false, true];
        let truth = [true, false, false, true, true];
        let cm = ConfusionMatrix::from_predictions(&predicted, &truth).unwrap();
        assert_eq!(cm, ConfusionMatrix { tp: 2, tn: 1, fp: 1, fn_: 1 });
        assert_eq!(cm.total(), 5);
        assert!((cm.sensitivity() - 2.0 / 3.0).abs() < 1e-12);
        assert!((cm.specificity() - 0.5).abs() < 1e-12);
        assert!((cm.ppv() - 2.0 / 3.0).abs() < 1e-12);
        assert!((cm.npv() - 0.5).abs() < 1e-12);
        assert!((cm.accuracy() - 0.6).abs() < 1e-12);
    }

    #[test]
    fn test_kappa() {
        let perfect = ConfusionMatrix { tp: 5, tn: 5, fp: 0, fn_: 0 };
        assert!((perfect.kappa() - 1.0).abs() < 1e-12);
        // Predictions independent of truth
        let chance = ConfusionMatrix { tp: 25, tn: 25, fp: 25, fn_: 25 };
        assert!(chance.kappa().abs() < 1e-12);
    }

    #[test]
    fn test_empty_class_rates_are_nan() {
        let cm = ConfusionMatrix { tp: 0, tn: 3, fp: 1, fn_: 0 };
        assert!(cm.sensitivity().is_nan());
        assert!((cm.specificity() - 0.75).abs() < 1e-12);
    }

    #[test]
    fn test_roc_perfect_and_inverted() {
        let truth = [false, false, true, true];
        let perfect = RocCurve::compute(&[0.1, 0.2, 0.8, 0.9], &truth).unwrap();
        assert!((perfect.auc() - 1.0).abs() < 1e-12);
        let inverted = RocCurve::compute(&[0.9, 0.8, 0.2, 0.1], &truth).unwrap();
        assert!(inverted.auc().abs() < 1e-12);
    }

    #[test]
    fn test_roc_constant_scores_is_half() {
        let truth = [false, true, false, true, true];
        let curve = RocCurve::compute(&[0.5; 5], &truth).unwrap();
        assert_eq!(curve.points().len(), 2);
        assert!((curve.auc() - 0.5).abs() < 1e-12);
    }

    #[test]
    fn test_roc_monotone_and_bounded() {
        let scores = [0.9, 0.1, 0.7, 0.4, 0.4, 0.6, 0.3, 0.8];
        let truth = [true, false, true, false, true, false, false, true];
        let curve = RocCurve::compute(&scores, &truth).unwrap();
        let pts = curve.points();
        assert_eq!(pts.first().map(|p| (p.fpr, p.tpr)), Some((0.0, 0.0)));
        assert_eq!(pts.last().map(|p| (p.fpr, p.tpr)), Some((1.0, 1.0)));
        for w in pts.windows(2) {
            assert!(w[1].fpr >= w[0].fpr && w[1].tpr >= w[0].tpr);
            assert!(w[1].threshold < w[0].threshold);
        }
        let auc = curve.auc();
        assert!((0.0..=1.0).contains(&auc));
        // 15 of 16 positive/negative pairs ordered correctly, one tie at 0.4
        assert!((auc - 14.5 / 16.0).abs() < 1e-12, "auc = {}", auc);
    }

    #[test]
    fn test_roc_single_class_is_error() {
        assert!(RocCurve::compute(&[0.1, 0.2], &[true, true]).is_err());
    }

    #[test]
    fn test_summary() {
        let probs = [0.9, 0.2, 0.6, 0.4];
        let truth = [true, false, false, true];
        let s = TwoClassSummary::compute(&probs, &truth, 0.5).unwrap();
        assert_eq!(s.sens, 0.5);
        assert_eq!(s.spec, 0.5);
        assert_eq!(s.get(Metric::Accuracy), 0.5);
        assert!((s.roc - 0.75).abs() < 1e-12);

        let single = TwoClassSummary::compute(&[0.3, 0.7], &[true, true], 0.5).unwrap();
        assert!(single.roc.is_nan());
    }

    #[test]
    fn test_metric_parse() {
        assert_eq!("ROC".parse::<Metric>().unwrap(), Metric::Roc);
        assert_eq!("sens".parse::<Metric>().unwrap(), Metric::Sens);
        assert!("f1".parse::<Metric>().is_err());
    }
}
