//! Support vector classifier
//!
//! Binary C-SVM trained with SMO using maximal-violating-pair working set
//! selection over a precomputed kernel matrix. Probabilities come from a
//! Platt sigmoid fitted on cross-validated decision values.

use super::platt::PlattScaling;
use crate::error::{Result, TuneError};
use ndarray::{Array1, Array2, Axis};
use rand::prelude::*;
use rand_xoshiro::Xoshiro256PlusPlus;
use serde::{Deserialize, Serialize};

/// Maximum number of samples for eager kernel matrix computation.
/// Beyond this, training returns an error instead of exhausting memory.
const MAX_KERNEL_MATRIX_SAMPLES: usize = 10_000;

/// SVM configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SVMConfig {
    /// Regularization parameter (C)
    pub c: f64,
    /// Radial kernel width: K(x, y) = exp(-sigma * ||x - y||²)
    pub sigma: f64,
    /// Stopping tolerance on the maximal KKT violation
    pub tol: f64,
    /// Maximum SMO iterations
    pub max_iter: usize,
    /// Internal folds producing decision values for the Platt fit;
    /// below 2 the training decision values are used instead
    pub probability_folds: usize,
    pub random_state: Option<u64>,
}

impl Default for SVMConfig {
    fn default() -> Self {
        Self {
            c: 1.0,
            sigma: 1.0,
            tol: 1e-3,
            max_iter: 1_000_000,
            probability_folds: 3,
            random_state: Some(42),
        }
    }
}

/// Dual solution of one SMO run
#[derive(Debug, Clone, Serialize, Deserialize)]
struct SvmSolution {
    support_vectors: Array2<f64>,
    /// alpha_i * y_i for each support vector
    coefficients: Array1<f64>,
    bias: f64,
}

/// Support vector classifier for 0/1 targets
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SVMClassifier {
    config: SVMConfig,
    solution: Option<SvmSolution>,
    calibration: Option<PlattScaling>,
}

impl SVMClassifier {
    pub fn new(config: SVMConfig) -> Self {
        Self {
            config,
            solution: None,
            calibration: None,
        }
    }

    pub fn config(&self) -> &SVMConfig {
        &self.config
    }

    /// Number of support vectors of the fitted model
    pub fn n_support(&self) -> usize {
        self.solution.as_ref().map_or(0, |s| s.support_vectors.nrows())
    }

    /// Fit on 0/1 targets, then calibrate probabilities
    pub fn fit(&mut self, x: &Array2<f64>, y: &Array1<f64>) -> Result<()> {
        if x.nrows() != y.len() {
            return Err(TuneError::ShapeError {
                expected: format!("y length = {}", x.nrows()),
                actual: format!("y length = {}", y.len()),
            });
        }
        if let Some(v) = y.iter().find(|&&v| v != 0.0 && v != 1.0) {
            return Err(TuneError::TrainingError(format!(
                "SVM classifier requires 0/1 targets, found {}",
                v
            )));
        }

        let solution = self.solve(x, y)?;
        let scores = self.calibration_scores(x, y, &solution)?;

        let mut platt = PlattScaling::new();
        platt.fit(&scores, y)?;

        self.solution = Some(solution);
        self.calibration = Some(platt);
        Ok(())
    }

    /// Decision values for Platt fitting, out-of-fold when possible
    fn calibration_scores(&self, x: &Array2<f64>, y: &Array1<f64>, full: &SvmSolution) -> Result<Array1<f64>> {
        let k = self.config.probability_folds;
        let n_pos = y.iter().filter(|&&v| v == 1.0).count();
        let n_neg = y.len() - n_pos;
        if k < 2 || n_pos < k || n_neg < k {
            return Ok(self.decision_with(full, x));
        }

        // Deal each class round-robin over the folds after a seeded shuffle
        let mut rng = match self.config.random_state {
            Some(seed) => Xoshiro256PlusPlus::seed_from_u64(seed),
            None => Xoshiro256PlusPlus::from_entropy(),
        };
        let mut fold_of = vec![0usize; y.len()];
        for class in [0.0, 1.0] {
            let mut members: Vec<usize> = (0..y.len()).filter(|&i| y[i] == class).collect();
            members.shuffle(&mut rng);
            for (pos, idx) in members.into_iter().enumerate() {
                fold_of[idx] = pos % k;
            }
        }

        let mut scores = Array1::zeros(y.len());
        for fold in 0..k {
            let (holdout, analysis): (Vec<usize>, Vec<usize>) = (0..y.len()).partition(|&i| fold_of[i] == fold);
            let x_fit = x.select(Axis(0), &analysis);
            let y_fit: Array1<f64> = analysis.iter().map(|&i| y[i]).collect();
            let solution = self.solve(&x_fit, &y_fit)?;
            let fold_scores = self.decision_with(&solution, &x.select(Axis(0), &holdout));
            for (&idx, &s) in holdout.iter().zip(fold_scores.iter()) {
                scores[idx] = s;
            }
        }
        Ok(scores)
    }

    /// SMO on the dual with a cached gradient
    fn solve(&self, x: &Array2<f64>, y01: &Array1<f64>) -> Result<SvmSolution> {
        let n = x.nrows();
        if n > MAX_KERNEL_MATRIX_SAMPLES {
            return Err(TuneError::TrainingError(format!(
                "{} samples exceed the {} supported by the dense kernel matrix",
                n, MAX_KERNEL_MATRIX_SAMPLES
            )));
        }
        if !(self.config.c > 0.0) {
            return Err(TuneError::invalid_param("C", self.config.c, "must be positive"));
        }

        let y: Array1<f64> = y01.mapv(|v| if v == 1.0 { 1.0 } else { -1.0 });
        if y.iter().all(|&v| v > 0.0) || y.iter().all(|&v| v < 0.0) {
            return Err(TuneError::TrainingError(
                "SVM requires both classes in the training rows".to_string(),
            ));
        }

        let c = self.config.c;
        let kernel = self.kernel_matrix(x, x);
        let mut alpha = Array1::<f64>::zeros(n);
        // f[t] = sum_s alpha_s y_s K(s, t) - y_t
        let mut f = -&y;

        for _ in 0..self.config.max_iter {
            let mut i_up = None;
            let mut f_min = f64::INFINITY;
            let mut j_low = None;
            let mut f_max = f64::NEG_INFINITY;

            for t in 0..n {
                let can_up = (y[t] > 0.0 && alpha[t] < c) || (y[t] < 0.0 && alpha[t] > 0.0);
                let can_down = (y[t] > 0.0 && alpha[t] > 0.0) || (y[t] < 0.0 && alpha[t] < c);
                if can_up && f[t] < f_min {
                    f_min = f[t];
                    i_up = Some(t);
                }
                if can_down && f[t] > f_max {
                    f_max = f[t];
                    j_low = Some(t);
                }
            }

            let (i, j) = match (i_up, j_low) {
                (Some(i), Some(j)) if f_max - f_min >= self.config.tol => (i, j),
                _ => return Ok(self.finish(x, &y, &alpha, &f, f_min, f_max)),
            };

            let eta = (kernel[[i, i]] + kernel[[j, j]] - 2.0 * kernel[[i, j]]).max(1e-12);
            let s = y[i] * y[j];
            let (lo, hi) = if s < 0.0 {
                ((alpha[j] - alpha[i]).max(0.0), (c + alpha[j] - alpha[i]).min(c))
            } else {
                ((alpha[i] + alpha[j] - c).max(0.0), (alpha[i] + alpha[j]).min(c))
            };

            let alpha_j = (alpha[j] + y[j] * (f[i] - f[j]) / eta).max(lo).min(hi);
            let alpha_i = (alpha[i] + s * (alpha[j] - alpha_j)).max(0.0).min(c);
            let delta_i = (alpha_i - alpha[i]) * y[i];
            let delta_j = (alpha_j - alpha[j]) * y[j];
            alpha[i] = alpha_i;
            alpha[j] = alpha_j;

            let row_i = kernel.row(i);
            let row_j = kernel.row(j);
            for t in 0..n {
                f[t] += delta_i * row_i[t] + delta_j * row_j[t];
            }
        }

        Err(TuneError::ConvergenceError {
            iterations: self.config.max_iter,
        })
    }

    fn finish(
        &self,
        x: &Array2<f64>,
        y: &Array1<f64>,
        alpha: &Array1<f64>,
        f: &Array1<f64>,
        f_min: f64,
        f_max: f64,
    ) -> SvmSolution {
        let c = self.config.c;
        let free: Vec<f64> = (0..alpha.len())
            .filter(|&t| alpha[t] > 1e-12 && alpha[t] < c - 1e-12)
            .map(|t| f[t])
            .collect();
        let bias = if !free.is_empty() {
            -free.iter().sum::<f64>() / free.len() as f64
        } else if f_min.is_finite() && f_max.is_finite() {
            -(f_min + f_max) / 2.0
        } else {
            0.0
        };

        let support: Vec<usize> = (0..alpha.len()).filter(|&t| alpha[t] > 1e-12).collect();
        SvmSolution {
            support_vectors: x.select(Axis(0), &support),
            coefficients: support.iter().map(|&t| alpha[t] * y[t]).collect(),
            bias,
        }
    }

    /// Radial kernel values between every row of `a` and every row of `b`
    fn kernel_matrix(&self, a: &Array2<f64>, b: &Array2<f64>) -> Array2<f64> {
        let sigma = self.config.sigma;
        let norms_a: Array1<f64> = a.rows().into_iter().map(|r| r.dot(&r)).collect();
        let norms_b: Array1<f64> = b.rows().into_iter().map(|r| r.dot(&r)).collect();
        let mut k = a.dot(&b.t());
        for ((i, j), v) in k.indexed_iter_mut() {
            let sq = (norms_a[i] + norms_b[j] - 2.0 * *v).max(0.0);
            *v = (-sigma * sq).exp();
        }
        k
    }

    fn decision_with(&self, solution: &SvmSolution, x: &Array2<f64>) -> Array1<f64> {
        if solution.support_vectors.nrows() == 0 {
            return Array1::from_elem(x.nrows(), solution.bias);
        }
        let k = self.kernel_matrix(x, &solution.support_vectors);
        k.dot(&solution.coefficients) + solution.bias
    }

    /// Signed distance to the margin; positive favours class 1
    pub fn decision_function(&self, x: &Array2<f64>) -> Result<Array1<f64>> {
        let solution = self.solution.as_ref().ok_or(TuneError::ModelNotFitted)?;
        if x.ncols() != solution.support_vectors.ncols() && solution.support_vectors.nrows() > 0 {
            return Err(TuneError::ShapeError {
                expected: format!("{} features", solution.support_vectors.ncols()),
                actual: format!("{} features", x.ncols()),
            });
        }
        Ok(self.decision_with(solution, x))
    }

    /// Calibrated positive-class probabilities
    pub fn predict_proba(&self, x: &Array2<f64>) -> Result<Array1<f64>> {
        let calibration = self.calibration.as_ref().ok_or(TuneError::ModelNotFitted)?;
        calibration.transform(&self.decision_function(x)?)
    }

    /// Class labels from the sign of the decision function
    pub fn predict(&self, x: &Array2<f64>) -> Result<Array1<f64>> {
        Ok(self.decision_function(x)?.mapv(|s| if s >= 0.0 { 1.0 } else { 0.0 }))
    }
}
