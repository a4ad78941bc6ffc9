//! Cross-validation fold generation and the resampling plan
//!
//! [`CrossValidator`] turns a strategy into train/holdout index splits.
//! [`ResamplingPlan`] is the declarative input of the tuner: it fixes the
//! strategy, the seed and the metric used to rank configurations, and
//! materialises the folds once so every model family is scored on the same
//! resamples.

use crate::error::{Result, TuneError};
use crate::metrics::Metric;
use rand::seq::SliceRandom;
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use serde::{Deserialize, Serialize};

/// Cross-validation strategy
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum CVStrategy {
    /// K-Fold cross-validation
    KFold { n_splits: usize, shuffle: bool },
    /// Stratified K-Fold (maintains class distribution)
    StratifiedKFold { n_splits: usize, shuffle: bool },
    /// Repeated K-Fold
    RepeatedKFold { n_splits: usize, n_repeats: usize },
    /// Repeated stratified K-Fold
    RepeatedStratifiedKFold { n_splits: usize, n_repeats: usize },
}

impl Default for CVStrategy {
    fn default() -> Self {
        CVStrategy::RepeatedStratifiedKFold {
            n_splits: 10,
            n_repeats: 5,
        }
    }
}

impl CVStrategy {
    /// Number of splits a single pass produces
    pub fn n_splits(&self) -> usize {
        match self {
            CVStrategy::KFold { n_splits, .. }
            | CVStrategy::StratifiedKFold { n_splits, .. }
            | CVStrategy::RepeatedKFold { n_splits, .. }
            | CVStrategy::RepeatedStratifiedKFold { n_splits, .. } => *n_splits,
        }
    }

    pub fn n_repeats(&self) -> usize {
        match self {
            CVStrategy::RepeatedKFold { n_repeats, .. }
            | CVStrategy::RepeatedStratifiedKFold { n_repeats, .. } => *n_repeats,
            _ => 1,
        }
    }
}

/// A single train/test split
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CVSplit {
    pub train_indices: Vec<usize>,
    pub test_indices: Vec<usize>,
    /// Fold number within its repeat
    pub fold_idx: usize,
    /// Repeat number, 0 for single-pass strategies
    pub repeat_idx: usize,
}

/// Cross-validation splitter
pub struct CrossValidator {
    strategy: CVStrategy,
    random_state: Option<u64>,
}

impl CrossValidator {
    /// Create a new cross-validator
    pub fn new(strategy: CVStrategy) -> Self {
        Self {
            strategy,
            random_state: None,
        }
    }

    /// Set random state for reproducibility
    pub fn with_random_state(mut self, seed: u64) -> Self {
        self.random_state = Some(seed);
        self
    }

    /// Generate train/test splits; stratified strategies need class labels
    pub fn split(&self, n_samples: usize, y: Option<&[usize]>) -> Result<Vec<CVSplit>> {
        match &self.strategy {
            CVStrategy::KFold { n_splits, shuffle } => {
                let mut rng = self.rng(0);
                self.k_fold_split(n_samples, *n_splits, *shuffle, &mut rng, 0)
            }
            CVStrategy::StratifiedKFold { n_splits, shuffle } => {
                let y = Self::require_labels(y, n_samples)?;
                let mut rng = self.rng(0);
                self.stratified_k_fold_split(y, *n_splits, *shuffle, &mut rng, 0)
            }
            CVStrategy::RepeatedKFold { n_splits, n_repeats } => {
                let mut all_splits = Vec::with_capacity(n_splits * n_repeats);
                for repeat in 0..*n_repeats {
                    let mut rng = self.rng(repeat as u64);
                    all_splits.extend(self.k_fold_split(n_samples, *n_splits, true, &mut rng, repeat)?);
                }
                Ok(all_splits)
            }
            CVStrategy::RepeatedStratifiedKFold { n_splits, n_repeats } => {
                let y = Self::require_labels(y, n_samples)?;
                let mut all_splits = Vec::with_capacity(n_splits * n_repeats);
                for repeat in 0..*n_repeats {
                    let mut rng = self.rng(repeat as u64);
                    all_splits.extend(self.stratified_k_fold_split(y, *n_splits, true, &mut rng, repeat)?);
                }
                Ok(all_splits)
            }
        }
    }

    /// Per-repeat generator; unseeded validators draw from entropy
    fn rng(&self, repeat: u64) -> ChaCha8Rng {
        match self.random_state {
            Some(seed) => ChaCha8Rng::seed_from_u64(seed.wrapping_add(repeat)),
            None => ChaCha8Rng::from_entropy(),
        }
    }

    fn require_labels(y: Option<&[usize]>, n_samples: usize) -> Result<&[usize]> {
        let y = y.ok_or_else(|| {
            TuneError::ConfigError("stratified folds require class labels".to_string())
        })?;
        if y.len() != n_samples {
            return Err(TuneError::ShapeError {
                expected: format!("{} labels", n_samples),
                actual: format!("{} labels", y.len()),
            });
        }
        Ok(y)
    }

    fn check_sizes(n_samples: usize, n_splits: usize) -> Result<()> {
        if n_splits < 2 {
            return Err(TuneError::ConfigError(
                "n_splits must be at least 2".to_string(),
            ));
        }
        if n_samples < n_splits {
            return Err(TuneError::DataError(format!(
                "n_samples ({}) must be >= n_splits ({})",
                n_samples, n_splits
            )));
        }
        Ok(())
    }

    fn k_fold_split(
        &self,
        n_samples: usize,
        n_splits: usize,
        shuffle: bool,
        rng: &mut ChaCha8Rng,
        repeat_idx: usize,
    ) -> Result<Vec<CVSplit>> {
        Self::check_sizes(n_samples, n_splits)?;

        let mut indices: Vec<usize> = (0..n_samples).collect();
        if shuffle {
            indices.shuffle(rng);
        }

        let base = n_samples / n_splits;
        let remainder = n_samples % n_splits;
        let mut folds: Vec<Vec<usize>> = Vec::with_capacity(n_splits);
        let mut current = 0;
        for i in 0..n_splits {
            let fold_size = if i < remainder { base + 1 } else { base };
            folds.push(indices[current..current + fold_size].to_vec());
            current += fold_size;
        }

        Ok(Self::splits_from_folds(folds, repeat_idx))
    }

    fn stratified_k_fold_split(
        &self,
        y: &[usize],
        n_splits: usize,
        shuffle: bool,
        rng: &mut ChaCha8Rng,
        repeat_idx: usize,
    ) -> Result<Vec<CVSplit>> {
        Self::check_sizes(y.len(), n_splits)?;

        // Group samples by class, in class order so the result is deterministic
        let n_classes = y.iter().copied().max().map_or(0, |m| m + 1);
        let mut class_indices: Vec<Vec<usize>> = vec![Vec::new(); n_classes];
        for (idx, &class) in y.iter().enumerate() {
            class_indices[class].push(idx);
        }

        if shuffle {
            for indices in class_indices.iter_mut() {
                indices.shuffle(rng);
            }
        }

        // Deal each class round-robin, continuing where the previous class stopped
        // so fold sizes differ by at most one
        let mut folds: Vec<Vec<usize>> = vec![Vec::new(); n_splits];
        let mut next = 0;
        for indices in &class_indices {
            for &idx in indices {
                folds[next % n_splits].push(idx);
                next += 1;
            }
        }

        Ok(Self::splits_from_folds(folds, repeat_idx))
    }

    fn splits_from_folds(folds: Vec<Vec<usize>>, repeat_idx: usize) -> Vec<CVSplit> {
        (0..folds.len())
            .map(|fold_idx| {
                let mut test_indices = folds[fold_idx].clone();
                test_indices.sort_unstable();
                let mut train_indices: Vec<usize> = folds
                    .iter()
                    .enumerate()
                    .filter(|(i, _)| *i != fold_idx)
                    .flat_map(|(_, f)| f.iter().copied())
                    .collect();
                train_indices.sort_unstable();
                CVSplit {
                    train_indices,
                    test_indices,
                    fold_idx,
                    repeat_idx,
                }
            })
            .collect()
    }
}

/// One materialised resample: analysis rows to fit on, holdout rows to score
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Resample {
    /// Stable identifier such as `Fold03.Rep2`
    pub id: String,
    pub analysis: Vec<usize>,
    pub holdout: Vec<usize>,
}

/// Declarative cross-validation plan shared by every tuned model
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResamplingPlan {
    pub strategy: CVStrategy,
    /// Metric used to rank configurations
    pub metric: Metric,
    pub seed: u64,
}

impl Default for ResamplingPlan {
    fn default() -> Self {
        Self {
            strategy: CVStrategy::default(),
            metric: Metric::Roc,
            seed: 42,
        }
    }
}

impl ResamplingPlan {
    /// Repeated stratified k-fold
    pub fn repeated_cv(folds: usize, repeats: usize) -> Self {
        Self {
            strategy: CVStrategy::RepeatedStratifiedKFold {
                n_splits: folds,
                n_repeats: repeats,
            },
            ..Default::default()
        }
    }

    pub fn with_metric(mut self, metric: Metric) -> Self {
        self.metric = metric;
        self
    }

    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = seed;
        self
    }

    /// Total resamples per configuration
    pub fn n_resamples(&self) -> usize {
        self.strategy.n_splits() * self.strategy.n_repeats()
    }

    /// Materialise the folds over `labels` (the training subset's label codes)
    pub fn resamples(&self, labels: &[usize]) -> Result<Vec<Resample>> {
        let splits = CrossValidator::new(self.strategy.clone())
            .with_random_state(self.seed)
            .split(labels.len(), Some(labels))?;

        let n_splits = self.strategy.n_splits();
        let fold_width = n_splits.to_string().len().max(2);
        let repeated = self.strategy.n_repeats() > 1
            || matches!(
                self.strategy,
                CVStrategy::RepeatedKFold { .. } | CVStrategy::RepeatedStratifiedKFold { .. }
            );

        Ok(splits
            .into_iter()
            .map(|split| {
                let id = if repeated {
                    format!(
                        "Fold{:0width$}.Rep{}",
                        split.fold_idx + 1,
                        split.repeat_idx + 1,
                        width = fold_width
                    )
                } else {
                    format!("Fold{:0width$}", split.fold_idx + 1, width = fold_width)
                };
                Resample {
                    id,
                    analysis: split.train_indices,
                    holdout: split.test_indices,
                }
            })
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_k_fold() {
        let cv = CrossValidator::new(CVStrategy::KFold { n_splits: 5, shuffle: false });
        let splits = cv.split(100, None).unwrap();

        assert_eq!(splits.len(), 5);
        for split in &splits {
            assert_eq!(split.test_indices.len(), 20);
            assert_eq!(split.train_indices.len(), 80);
        }

        // All indices should be covered exactly once in test sets
        let mut all_test: Vec<usize> = splits.iter().flat_map(|s| s.test_indices.clone()).collect();
        all_test.sort();
        assert_eq!(all_test, (0..100).collect::<Vec<_>>());
    }

    #[test]
    fn test_stratified_k_fold() {
        let y = vec![0, 0, 0, 0, 0, 1, 1, 1, 1, 1];
        let cv = CrossValidator::new(CVStrategy::StratifiedKFold { n_splits: 5, shuffle: false });
        let splits = cv.split(10, Some(&y)).unwrap();

        assert_eq!(splits.len(), 5);
        for split in &splits {
            assert_eq!(split.test_indices.len(), 2);
            let ones = split.test_indices.iter().filter(|&&i| y[i] == 1).count();
            assert_eq!(ones, 1);
        }
    }

    #[test]
    fn test_stratified_requires_labels() {
        let cv = CrossValidator::new(CVStrategy::StratifiedKFold { n_splits: 3, shuffle: true });
        assert!(cv.split(10, None).is_err());
    }

    #[test]
    fn test_too_few_samples() {
        let cv = CrossValidator::new(CVStrategy::KFold { n_splits: 10, shuffle: true });
        assert!(cv.split(5, None).is_err());
        let cv = CrossValidator::new(CVStrategy::KFold { n_splits: 1, shuffle: true });
        assert!(cv.split(5, None).is_err());
    }

    #[test]
    fn test_repeated_k_fold() {
        let cv = CrossValidator::new(CVStrategy::RepeatedKFold { n_splits: 5, n_repeats: 3 })
            .with_random_state(42);
        let splits = cv.split(100, None).unwrap();

        assert_eq!(splits.len(), 15);
        assert_eq!(splits[14].repeat_idx, 2);
        assert_eq!(splits[14].fold_idx, 4);
    }

    #[test]
    fn test_plan_ids_and_coverage() {
        let labels: Vec<usize> = (0..57).map(|i| usize::from(i % 3 == 0)).collect();
        let plan = ResamplingPlan::repeated_cv(10, 5).with_seed(7);
        let resamples = plan.resamples(&labels).unwrap();

        assert_eq!(resamples.len(), 50);
        assert_eq!(plan.n_resamples(), 50);
        assert_eq!(resamples[0].id, "Fold01.Rep1");
        assert_eq!(resamples[49].id, "Fold10.Rep5");

        for rep in resamples.chunks(10) {
            let mut holdout: Vec<usize> = rep.iter().flat_map(|r| r.holdout.clone()).collect();
            holdout.sort_unstable();
            assert_eq!(holdout, (0..57).collect::<Vec<_>>());
        }
        for r in &resamples {
            assert_eq!(r.analysis.len() + r.holdout.len(), 57);
            assert!(r.holdout.iter().all(|i| r.analysis.binary_search(i).is_err()));
        }
    }

    #[test]
    fn test_plan_deterministic() {
        let labels: Vec<usize> = (0..40).map(|i| i % 2).collect();
        let plan = ResamplingPlan::repeated_cv(5, 2).with_seed(3);
        assert_eq!(plan.resamples(&labels).unwrap(), plan.resamples(&labels).unwrap());

        let other = ResamplingPlan::repeated_cv(5, 2).with_seed(4);
        assert_ne!(plan.resamples(&labels).unwrap(), other.resamples(&labels).unwrap());
    }
}
