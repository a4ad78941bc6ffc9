//! Platt scaling (sigmoid calibration) of decision values

use crate::error::{Result, TuneError};
use ndarray::Array1;
use serde::{Deserialize, Serialize};

/// Fits `P(y=1|f) = 1 / (1 + exp(A*f + B))` to decision values `f`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlattScaling {
    a: Option<f64>,
    b: Option<f64>,
    max_iter: usize,
    tol: f64,
}

impl Default for PlattScaling {
    fn default() -> Self {
        Self::new()
    }
}

impl PlattScaling {
    pub fn new() -> Self {
        Self {
            a: None,
            b: None,
            max_iter: 100,
            tol: 1e-10,
        }
    }

    pub fn with_max_iter(mut self, max_iter: usize) -> Self {
        self.max_iter = max_iter;
        self
    }

    /// Fitted `(A, B)`
    pub fn parameters(&self) -> Option<(f64, f64)> {
        match (self.a, self.b) {
            (Some(a), Some(b)) => Some((a, b)),
            _ => None,
        }
    }

    /// Newton's method with backtracking on the regularised log-loss
    pub fn fit(&mut self, scores: &Array1<f64>, labels: &Array1<f64>) -> Result<()> {
        let n = scores.len();
        if n != labels.len() {
            return Err(TuneError::ShapeError {
                expected: format!("{} labels", n),
                actual: format!("{} labels", labels.len()),
            });
        }
        if n == 0 {
            return Err(TuneError::TrainingError(
                "cannot calibrate on zero decision values".to_string(),
            ));
        }

        // Target values with Platt's adjustment for small datasets
        let n_pos = labels.iter().filter(|&&y| y > 0.5).count() as f64;
        let n_neg = n as f64 - n_pos;
        let target_pos = (n_pos + 1.0) / (n_pos + 2.0);
        let target_neg = 1.0 / (n_neg + 2.0);
        let targets: Vec<f64> = labels
            .iter()
            .map(|&y| if y > 0.5 { target_pos } else { target_neg })
            .collect();

        let mut a = 0.0;
        let mut b = ((n_neg + 1.0) / (n_pos + 1.0)).ln();
        let mut loss = Self::objective(scores, &targets, a, b);

        for _ in 0..self.max_iter {
            let mut grad_a = 0.0;
            let mut grad_b = 0.0;
            let mut hess_aa = 1e-12;
            let mut hess_ab = 0.0;
            let mut hess_bb = 1e-12;

            for (&f, &t) in scores.iter().zip(targets.iter()) {
                let p = Self::probability(f, a, b);
                let d1 = t - p;
                let d2 = p * (1.0 - p);
                grad_a += f * d1;
                grad_b += d1;
                hess_aa += f * f * d2;
                hess_ab += f * d2;
                hess_bb += d2;
            }

            if grad_a.abs() < 1e-5 && grad_b.abs() < 1e-5 {
                break;
            }

            let det = hess_aa * hess_bb - hess_ab * hess_ab;
            if det.abs() < 1e-300 {
                break;
            }
            let delta_a = -(hess_bb * grad_a - hess_ab * grad_b) / det;
            let delta_b = -(-hess_ab * grad_a + hess_aa * grad_b) / det;
            let descent = grad_a * delta_a + grad_b * delta_b;

            let mut step = 1.0;
            let mut improved = false;
            while step >= 1e-10 {
                let new_a = a + step * delta_a;
                let new_b = b + step * delta_b;
                let new_loss = Self::objective(scores, &targets, new_a, new_b);
                if new_loss < loss + 1e-4 * step * descent {
                    a = new_a;
                    b = new_b;
                    loss = new_loss;
                    improved = true;
                    break;
                }
                step /= 2.0;
            }

            if !improved || (step * delta_a).abs().max((step * delta_b).abs()) < self.tol {
                break;
            }
        }

        if !a.is_finite() || !b.is_finite() {
            return Err(TuneError::ConvergenceError {
                iterations: self.max_iter,
            });
        }

        self.a = Some(a);
        self.b = Some(b);
        Ok(())
    }

    /// Calibrated probabilities for decision values
    pub fn transform(&self, scores: &Array1<f64>) -> Result<Array1<f64>> {
        let (a, b) = self.parameters().ok_or(TuneError::ModelNotFitted)?;
        Ok(scores.mapv(|f| Self::probability(f, a, b)))
    }

    fn probability(f: f64, a: f64, b: f64) -> f64 {
        let z = a * f + b;
        // Evaluate on the side that cannot overflow
        if z >= 0.0 {
            (-z).exp() / (1.0 + (-z).exp())
        } else {
            1.0 / (1.0 + z.exp())
        }
    }

    fn objective(scores: &Array1<f64>, targets: &[f64], a: f64, b: f64) -> f64 {
        scores
            .iter()
            .zip(targets.iter())
            .map(|(&f, &t)| {
                let z = a * f + b;
                if z >= 0.0 {
                    t * z + (1.0 + (-z).exp()).ln()
                } else {
                    (t - 1.0) * z + (1.0 + z.exp()).ln()
                }
            })
            .sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    #[test]
    fn test_platt_monotone_in_score() {
        let scores = array![-2.0, -1.5, -0.3, 0.2, -0.1, 1.2, 1.8, 2.5];
        let labels = array![0.0, 0.0, 0.0, 1.0, 1.0, 1.0, 1.0, 1.0];

        let mut calibrator = PlattScaling::new();
        calibrator.fit(&scores, &labels).unwrap();
        let (a, _) = calibrator.parameters().unwrap();
        assert!(a < 0.0, "positive scores should raise the probability");

        let probs = calibrator.transform(&array![-3.0, 0.0, 3.0]).unwrap();
        assert!(probs[0] < probs[1] && probs[1] < probs[2]);
        assert!(probs.iter().all(|&p| (0.0..=1.0).contains(&p)));
    }

    #[test]
    fn test_platt_uninformative_scores() {
        let scores = array![0.0, 0.0, 0.0, 0.0];
        let labels = array![0.0, 1.0, 0.0, 0.0];
        let mut calibrator = PlattScaling::new();
        calibrator.fit(&scores, &labels).unwrap();
        // Probability falls back to the smoothed base rate
        let p = calibrator.transform(&array![0.0]).unwrap()[0];
        assert!((p - 2.0 / 6.0).abs() < 0.05, "p = {}", p);
    }

    #[test]
    fn test_unfitted() {
        let calibrator = PlattScaling::new();
        assert!(calibrator.transform(&array![1.0]).is_err());
    }

    #[test]
    fn test_length_mismatch() {
        let mut calibrator = PlattScaling::new();
        assert!(calibrator.fit(&array![1.0, 2.0], &array![1.0]).is_err());
    }
}
