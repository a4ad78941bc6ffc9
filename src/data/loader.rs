//! CSV loading into a [`Dataset`]

use super::Dataset;
use crate::error::{Result, TuneError};
use ndarray::Array2;
use polars::prelude::*;
use std::fs::File;
use std::path::Path;
use std::time::Instant;
use tracing::{debug, info};

/// Loads labeled tables from CSV files
pub struct DataLoader {
    label_column: String,
    ignore_columns: Vec<String>,
    levels: Option<Vec<String>>,
    infer_schema_length: usize,
}

impl Default for DataLoader {
    fn default() -> Self {
        Self::new("Class")
    }
}

impl DataLoader {
    /// Create a loader reading the label from `label_column`
    pub fn new(label_column: impl Into<String>) -> Self {
        Self {
            label_column: label_column.into(),
            ignore_columns: Vec::new(),
            levels: None,
            infer_schema_length: 100,
        }
    }

    /// Drop these columns (ids, prior split assignments) before building features
    pub fn with_ignore_columns<S: Into<String>>(mut self, columns: impl IntoIterator<Item = S>) -> Self {
        self.ignore_columns = columns.into_iter().map(Into::into).collect();
        self
    }

    /// Fix the level order instead of using first appearance
    pub fn with_levels(mut self, levels: Vec<String>) -> Self {
        self.levels = Some(levels);
        self
    }

    pub fn label_column(&self) -> &str {
        &self.label_column
    }

    /// Load a CSV file with a header row
    pub fn load_csv(&self, path: impl AsRef<Path>) -> Result<Dataset> {
        let path = path.as_ref();
        let start = Instant::now();
        let file = File::open(path)?;

        let df = CsvReadOptions::default()
            .with_has_header(true)
            .with_infer_schema_length(Some(self.infer_schema_length))
            .into_reader_with_file_handle(file)
            .finish()?;

        let dataset = self.from_dataframe(&df)?;
        info!(
            path = %path.display(),
            rows = dataset.n_rows(),
            features = dataset.n_features(),
            elapsed_ms = start.elapsed().as_millis() as u64,
            "Loaded dataset"
        );
        Ok(dataset)
    }

    /// Convert an in-memory frame
    pub fn from_dataframe(&self, df: &DataFrame) -> Result<Dataset> {
        let labels = self.extract_labels(df)?;

        let feature_cols: Vec<String> = df
            .get_column_names()
            .into_iter()
            .map(|name| name.to_string())
            .filter(|name| name != &self.label_column && !self.ignore_columns.contains(name))
            .collect();
        debug!(n_features = feature_cols.len(), "Selected feature columns");

        let features = Self::columns_to_array2(df, &feature_cols)?;

        match &self.levels {
            Some(levels) => {
                let codes = labels
                    .iter()
                    .map(|label| {
                        levels.iter().position(|l| l == label).ok_or_else(|| {
                            TuneError::DataError(format!(
                                "label '{}' is not one of the declared levels {:?}",
                                label, levels
                            ))
                        })
                    })
                    .collect::<Result<Vec<usize>>>()?;
                Dataset::from_codes(features, codes, levels.clone(), feature_cols)
            }
            None => Dataset::new(features, &labels, feature_cols),
        }
    }

    fn extract_labels(&self, df: &DataFrame) -> Result<Vec<String>> {
        let column = df
            .column(&self.label_column)
            .map_err(|_| TuneError::FeatureNotFound(self.label_column.clone()))?;
        let series = column.as_materialized_series().cast(&DataType::String)?;

        series
            .str()?
            .into_iter()
            .enumerate()
            .map(|(row, value)| {
                value.map(str::to_string).ok_or_else(|| {
                    TuneError::DataError(format!(
                        "missing label in row {} of column '{}'",
                        row, self.label_column
                    ))
                })
            })
            .collect()
    }

    /// Extract named columns into a row-major matrix; missing values are a data error.
    fn columns_to_array2(df: &DataFrame, col_names: &[String]) -> Result<Array2<f64>> {
        let n_rows = df.height();

        let col_data: Vec<Vec<f64>> = col_names
            .iter()
            .map(|col_name| {
                let column = df
                    .column(col_name)
                    .map_err(|_| TuneError::FeatureNotFound(col_name.clone()))?;
                let series = column
                    .as_materialized_series()
                    .cast(&DataType::Float64)
                    .map_err(|e| TuneError::DataError(format!("column '{}': {}", col_name, e)))?;
                series
                    .f64()?
                    .into_iter()
                    .enumerate()
                    .map(|(row, v)| {
                        v.ok_or_else(|| {
                            TuneError::DataError(format!(
                                "missing or non-numeric value in row {} of column '{}'",
                                row, col_name
                            ))
                        })
                    })
                    .collect::<Result<Vec<f64>>>()
            })
            .collect::<Result<Vec<Vec<f64>>>>()?;

        Ok(Array2::from_shape_fn((n_rows, col_names.len()), |(r, c)| col_data[c][r]))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn write_csv(contents: &str) -> tempfile::NamedTempFile {
        let mut file = tempfile::Builder::new().suffix(".csv").tempfile().unwrap();
        file.write_all(contents.as_bytes()).unwrap();
        file.flush().unwrap();
        file
    }

    #[test]
    fn test_load_csv_drops_ignored_columns() {
        let file = write_csv(
            "Cell,Case,Class,AreaCh1,WidthCh1\n\
             1,Train,PS,150,10.5\n\
             2,Test,WS,320,20.1\n\
             3,Train,PS,180,11.0\n",
        );
        let loader = DataLoader::new("Class").with_ignore_columns(["Cell", "Case"]);
        let ds = loader.load_csv(file.path()).unwrap();

        assert_eq!(ds.n_rows(), 3);
        assert_eq!(ds.feature_names(), &["AreaCh1".to_string(), "WidthCh1".to_string()]);
        assert_eq!(ds.levels(), &["PS".to_string(), "WS".to_string()]);
        assert_eq!(ds.features()[[1, 0]], 320.0);
    }

    #[test]
    fn test_declared_levels_fix_order() {
        let file = write_csv("Class,x\nWS,1\nPS,2\n");
        let loader = DataLoader::new("Class").with_levels(vec!["PS".into(), "WS".into()]);
        let ds = loader.load_csv(file.path()).unwrap();
        assert_eq!(ds.labels(), &[1, 0]);
    }

    #[test]
    fn test_missing_label_column() {
        let file = write_csv("x,y\n1,2\n");
        let err = DataLoader::new("Class").load_csv(file.path()).unwrap_err();
        assert!(matches!(err, TuneError::FeatureNotFound(_)));
    }

    #[test]
    fn test_missing_file_is_io_error() {
        let err = DataLoader::default().load_csv("/nonexistent/cells.csv").unwrap_err();
        assert!(matches!(err, TuneError::IoError(_)));
    }
}
