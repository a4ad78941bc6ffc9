//! Stratified train/test partitioning

use crate::data::Dataset;
use crate::error::{Result, TuneError};
use rand::seq::SliceRandom;
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use serde::{Deserialize, Serialize};
use tracing::debug;

/// Disjoint training and test row indices covering a dataset
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Partition {
    /// Sorted training row indices
    pub train: Vec<usize>,
    /// Sorted test row indices
    pub test: Vec<usize>,
}

impl Partition {
    pub fn n_train(&self) -> usize {
        self.train.len()
    }

    pub fn n_test(&self) -> usize {
        self.test.len()
    }
}

/// Splits a dataset so each class keeps its share in both subsets
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Partitioner {
    train_fraction: f64,
    seed: u64,
}

impl Partitioner {
    /// `train_fraction` must lie strictly between 0 and 1
    pub fn new(train_fraction: f64, seed: u64) -> Result<Self> {
        if !(train_fraction > 0.0 && train_fraction < 1.0) {
            return Err(TuneError::invalid_param(
                "train_fraction",
                train_fraction,
                "must be in (0, 1)",
            ));
        }
        Ok(Self {
            train_fraction,
            seed,
        })
    }

    pub fn train_fraction(&self) -> f64 {
        self.train_fraction
    }

    /// Split row indices; each class contributes `ceil(p * n_class)` training rows.
    ///
    /// Fails when either subset would miss one of the two levels.
    pub fn split(&self, dataset: &Dataset) -> Result<Partition> {
        let mut rng = ChaCha8Rng::seed_from_u64(self.seed);
        let mut train = Vec::with_capacity(dataset.n_rows());
        let mut test = Vec::with_capacity(dataset.n_rows());

        for (level, mut indices) in dataset.indices_by_class().into_iter().enumerate() {
            indices.shuffle(&mut rng);
            let n_train = ((indices.len() as f64) * self.train_fraction).ceil() as usize;
            let n_train = n_train.min(indices.len());
            debug!(
                level = %dataset.levels()[level],
                total = indices.len(),
                train = n_train,
                "Partitioned class"
            );
            train.extend_from_slice(&indices[..n_train]);
            test.extend_from_slice(&indices[n_train..]);
        }

        train.sort_unstable();
        test.sort_unstable();

        let partition = Partition { train, test };
        Self::check_levels(dataset, &partition.train, "training")?;
        Self::check_levels(dataset, &partition.test, "test")?;
        Ok(partition)
    }

    /// Split and materialise both subsets
    pub fn split_dataset(&self, dataset: &Dataset) -> Result<(Partition, Dataset, Dataset)> {
        let partition = self.split(dataset)?;
        let train = dataset.subset(&partition.train)?;
        let test = dataset.subset(&partition.test)?;
        Ok((partition, train, test))
    }

    fn check_levels(dataset: &Dataset, indices: &[usize], which: &str) -> Result<()> {
        let labels = dataset.labels();
        let mut seen = [false; 2];
        for &idx in indices {
            seen[labels[idx]] = true;
        }
        if seen.iter().all(|&s| s) {
            Ok(())
        } else {
            Err(TuneError::DataError(format!(
                "{} subset has {} rows but does not contain both levels {:?}",
                which,
                indices.len(),
                dataset.levels()
            )))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::SyntheticSegmentation;
    use ndarray::Array2;

    fn small(n_poor: usize, n_well: usize) -> Dataset {
        SyntheticSegmentation::new()
            .with_counts(n_poor, n_well)
            .generate()
            .unwrap()
    }

    #[test]
    fn test_rejects_bad_fraction() {
        for p in [0.0, 1.0, -0.2, 1.5, f64::NAN] {
            assert!(Partitioner::new(p, 1).is_err(), "fraction {} accepted", p);
        }
    }

    #[test]
    fn test_disjoint_and_covering() {
        let ds = small(60, 40);
        for p in [0.1, 0.25, 0.5, 0.8, 0.9] {
            let part = Partitioner::new(p, 3).unwrap().split(&ds).unwrap();
            let mut all: Vec<usize> = part.train.iter().chain(part.test.iter()).copied().collect();
            all.sort_unstable();
            assert_eq!(all, (0..ds.n_rows()).collect::<Vec<_>>(), "p = {}", p);
            assert!(part.train.iter().all(|i| part.test.binary_search(i).is_err()));
        }
    }

    #[test]
    fn test_stratified_proportions() {
        let ds = small(300, 100);
        let part = Partitioner::new(0.7, 11).unwrap().split(&ds).unwrap();
        let frac_ws = |idx: &[usize]| {
            idx.iter().filter(|&&i| ds.labels()[i] == 1).count() as f64 / idx.len() as f64
        };
        assert!((frac_ws(&part.train) - 0.25).abs() < 0.01);
        assert!((frac_ws(&part.test) - 0.25).abs() < 0.02);
    }

    #[test]
    fn test_reference_sizes() {
        let ds = small(1300, 719);
        let part = Partitioner::new(0.5, 975).unwrap().split(&ds).unwrap();
        assert_eq!(part.n_train(), 1010);
        assert_eq!(part.n_test(), 1009);
    }

    #[test]
    fn test_deterministic_under_seed() {
        let ds = small(50, 50);
        let a = Partitioner::new(0.5, 9).unwrap().split(&ds).unwrap();
        let b = Partitioner::new(0.5, 9).unwrap().split(&ds).unwrap();
        let c = Partitioner::new(0.5, 10).unwrap().split(&ds).unwrap();
        assert_eq!(a, b);
        assert_ne!(a, c);
    }

    #[test]
    fn test_level_missing_from_test_subset() {
        // One WS row: ceil(0.5 * 1) = 1 puts it in training, none left for test
        let x = Array2::from_shape_fn((5, 1), |(i, _)| i as f64);
        let ds = Dataset::new(x, &["PS", "PS", "PS", "PS", "WS"], vec!["x".into()]).unwrap();
        let err = Partitioner::new(0.5, 1).unwrap().split(&ds).unwrap_err();
        assert!(matches!(err, TuneError::DataError(_)));
    }
}
