//! Deterministic stand-in for the cell segmentation dataset
//!
//! The reference data (high-content screening of 2019 cells, 58 image
//! measurements, label `Class` = PS/WS) is not redistributed. This generator
//! reproduces its schema and class balance with a log-normal measurement model:
//! a shared "cell size" factor, per-feature noise, and a class shift on a
//! subset of the measurements.

use super::Dataset;
use crate::error::{Result, TuneError};
use ndarray::Array2;
use rand::prelude::*;
use rand_chacha::ChaCha8Rng;
use serde::{Deserialize, Serialize};

/// Measurement columns of the segmentation data, in file order
pub const SEGMENTATION_FEATURES: [&str; 58] = [
    "AngleCh1", "AreaCh1", "AvgIntenCh1", "AvgIntenCh2", "AvgIntenCh3", "AvgIntenCh4",
    "ConvexHullAreaRatioCh1", "ConvexHullPerimRatioCh1", "DiffIntenDensityCh1",
    "DiffIntenDensityCh3", "DiffIntenDensityCh4", "EntropyIntenCh1", "EntropyIntenCh3",
    "EntropyIntenCh4", "EqCircDiamCh1", "EqEllipseLWRCh1", "EqEllipseOblateVolCh1",
    "EqEllipseProlateVolCh1", "EqSphereAreaCh1", "EqSphereVolCh1", "FiberAlign2Ch3",
    "FiberAlign2Ch4", "FiberLengthCh1", "FiberWidthCh1", "IntenCoocASMCh3", "IntenCoocASMCh4",
    "IntenCoocContrastCh3", "IntenCoocContrastCh4", "IntenCoocEntropyCh3", "IntenCoocEntropyCh4",
    "IntenCoocMaxCh3", "IntenCoocMaxCh4", "KurtIntenCh1", "KurtIntenCh3", "KurtIntenCh4",
    "LengthCh1", "NeighborAvgDistCh1", "NeighborMinDistCh1", "NeighborVarDistCh1", "PerimCh1",
    "ShapeBFRCh1", "ShapeLWRCh1", "ShapeP2ACh1", "SkewIntenCh1", "SkewIntenCh3", "SkewIntenCh4",
    "SpotFiberCountCh3", "SpotFiberCountCh4", "TotalIntenCh1", "TotalIntenCh2", "TotalIntenCh3",
    "TotalIntenCh4", "VarIntenCh1", "VarIntenCh3", "VarIntenCh4", "WidthCh1", "XCentroid",
    "YCentroid",
];

/// Shift (in noise standard deviations) applied to well-segmented cells
const CLASS_EFFECTS: [(&str, f64); 12] = [
    ("TotalIntenCh2", 0.75),
    ("FiberWidthCh1", 0.70),
    ("AvgIntenCh2", 0.65),
    ("ShapeP2ACh1", -0.60),
    ("ConvexHullPerimRatioCh1", 0.55),
    ("EntropyIntenCh1", 0.50),
    ("VarIntenCh4", 0.45),
    ("IntenCoocASMCh3", -0.45),
    ("AvgIntenCh1", -0.40),
    ("ConvexHullAreaRatioCh1", -0.40),
    ("KurtIntenCh3", -0.35),
    ("TotalIntenCh1", 0.35),
];

/// Loading of each measurement on the shared size factor
const SIZE_LOADING: f64 = 0.4;

/// Generator for segmentation-shaped data
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SyntheticSegmentation {
    /// Poorly segmented cells (first level, "PS")
    pub n_poor: usize,
    /// Well segmented cells (second level, "WS")
    pub n_well: usize,
    /// Multiplier on the class shifts; 0 makes the classes indistinguishable
    pub separation: f64,
    pub seed: u64,
}

impl Default for SyntheticSegmentation {
    fn default() -> Self {
        Self {
            n_poor: 1300,
            n_well: 719,
            separation: 1.0,
            seed: 42,
        }
    }
}

impl SyntheticSegmentation {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set class sizes
    pub fn with_counts(mut self, n_poor: usize, n_well: usize) -> Self {
        self.n_poor = n_poor;
        self.n_well = n_well;
        self
    }

    pub fn with_separation(mut self, separation: f64) -> Self {
        self.separation = separation;
        self
    }

    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = seed;
        self
    }

    /// Generate the dataset; identical output for identical settings
    pub fn generate(&self) -> Result<Dataset> {
        if self.n_poor == 0 || self.n_well == 0 {
            return Err(TuneError::ConfigError(
                "both classes need at least one row".to_string(),
            ));
        }

        let mut rng = ChaCha8Rng::seed_from_u64(self.seed);
        let n_rows = self.n_poor + self.n_well;
        let n_features = SEGMENTATION_FEATURES.len();

        let mut labels: Vec<usize> = std::iter::repeat(0)
            .take(self.n_poor)
            .chain(std::iter::repeat(1).take(self.n_well))
            .collect();
        labels.shuffle(&mut rng);

        let effects: Vec<f64> = SEGMENTATION_FEATURES
            .iter()
            .map(|name| {
                CLASS_EFFECTS
                    .iter()
                    .find(|(n, _)| n == name)
                    .map(|(_, e)| *e)
                    .unwrap_or(0.0)
            })
            .collect();
        // Per-feature measurement scale, fixed by the seed
        let bases: Vec<f64> = (0..n_features).map(|_| 10f64.powf(rng.gen_range(0.0..3.0))).collect();

        let noise_sd = (1.0 - SIZE_LOADING * SIZE_LOADING).sqrt();
        let mut features = Array2::zeros((n_rows, n_features));
        for (row, &label) in labels.iter().enumerate() {
            let size = standard_normal(&mut rng);
            for col in 0..n_features {
                let shift = if label == 1 { effects[col] * self.separation } else { 0.0 };
                let z = shift + SIZE_LOADING * size + noise_sd * standard_normal(&mut rng);
                features[[row, col]] = bases[col] * (0.25 * z).exp();
            }
        }

        Dataset::from_codes(
            features,
            labels,
            vec!["PS".to_string(), "WS".to_string()],
            SEGMENTATION_FEATURES.iter().map(|s| s.to_string()).collect(),
        )
    }
}

/// Box-Muller standard normal draw
fn standard_normal(rng: &mut impl Rng) -> f64 {
    let u1: f64 = rng.gen_range(f64::EPSILON..1.0);
    let u2: f64 = rng.gen();
    (-2.0 * u1.ln()).sqrt() * (2.0 * std::f64::consts::PI * u2).cos()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_shape_matches_reference() {
        let ds = SyntheticSegmentation::default().generate().unwrap();
        assert_eq!(ds.n_rows(), 2019);
        assert_eq!(ds.n_features(), 58);
        assert_eq!(ds.class_counts(), [1300, 719]);
        assert_eq!(ds.levels(), &["PS".to_string(), "WS".to_string()]);
        assert_eq!(ds.minority_level(), 1);
    }

    #[test]
    fn test_deterministic_under_seed() {
        let a = SyntheticSegmentation::new().with_counts(30, 20).generate().unwrap();
        let b = SyntheticSegmentation::new().with_counts(30, 20).generate().unwrap();
        let c = SyntheticSegmentation::new().with_counts(30, 20).with_seed(7).generate().unwrap();
        assert_eq!(a.features(), b.features());
        assert_eq!(a.labels(), b.labels());
        assert_ne!(a.features(), c.features());
    }

    #[test]
    fn test_values_positive() {
        let ds = SyntheticSegmentation::new().with_counts(50, 50).generate().unwrap();
        assert!(ds.features().iter().all(|&v| v > 0.0 && v.is_finite()));
    }

    #[test]
    fn test_empty_class_rejected() {
        assert!(SyntheticSegmentation::new().with_counts(10, 0).generate().is_err());
    }
}
