//! End-to-end model selection
//!
//! partition → shared resamples → tune each family → evaluate on the test
//! subset → compare resampling distributions.

use crate::comparison::{Comparison, Resamples};
use crate::config::WorkflowConfig;
use crate::data::Dataset;
use crate::error::Result;
use crate::evaluation::{EvaluationResult, Evaluator};
use crate::metrics::Metric;
use crate::partition::{Partition, Partitioner};
use crate::search_space::ParamSet;
use crate::tuner::{ConfigResult, TuneResult};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Instant;
use tracing::info;

/// Resampled mean and spread of one configuration, for tuning plots
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConfigSummary {
    pub params: ParamSet,
    pub mean: f64,
    pub sd: f64,
    pub n_successful: usize,
    pub n_failed: usize,
}

impl ConfigSummary {
    fn from_result(result: &ConfigResult, metric: Metric) -> Self {
        Self {
            params: result.params.clone(),
            mean: result.mean(metric),
            sd: result.sd(metric),
            n_successful: result.n_successful(),
            n_failed: result.n_failed(),
        }
    }
}

/// Tuning and test-set outcome of one model family
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelReport {
    pub model: String,
    pub best_params: ParamSet,
    /// Resampled mean of the ranking metric for `best_params`
    pub resampled_score: f64,
    pub n_fits: usize,
    pub n_failures: usize,
    pub elapsed_secs: f64,
    pub configs: Vec<ConfigSummary>,
    pub test: EvaluationResult,
}

/// Everything a run produces, in serialisable form
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkflowReport {
    pub n_rows: usize,
    pub n_features: usize,
    pub n_train: usize,
    pub n_test: usize,
    pub levels: Vec<String>,
    pub positive_level: String,
    pub metric: Metric,
    pub n_resamples: usize,
    pub models: Vec<ModelReport>,
    pub comparison: Comparison,
    pub elapsed_secs: f64,
}

impl WorkflowReport {
    pub fn model(&self, name: &str) -> Option<&ModelReport> {
        self.models.iter().find(|m| m.model == name)
    }

    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let json = serde_json::to_string_pretty(self)?;
        std::fs::write(path, json)?;
        Ok(())
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let json = std::fs::read_to_string(path)?;
        Ok(serde_json::from_str(&json)?)
    }
}

/// Report plus the fitted artifacts behind it
#[derive(Debug, Clone)]
pub struct WorkflowRun {
    pub partition: Partition,
    pub tuned: Vec<TuneResult>,
    pub report: WorkflowReport,
}

/// Runs the configured workflow on a dataset
#[derive(Debug, Clone)]
pub struct Workflow {
    config: WorkflowConfig,
}

impl Workflow {
    pub fn new(config: WorkflowConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &WorkflowConfig {
        &self.config
    }

    pub fn run(&self, dataset: &Dataset) -> Result<WorkflowRun> {
        let start = Instant::now();
        let config = &self.config;
        config.validate()?;

        let pool = config.parallel.build_pool()?;
        let (partition, train, test) =
            Partitioner::new(config.train_fraction, config.seed)?.split_dataset(dataset)?;
        let positive = config.positive.resolve(&train)?;
        info!(
            rows = dataset.n_rows(),
            train = train.n_rows(),
            test = test.n_rows(),
            positive = %train.levels()[positive],
            threads = pool.current_num_threads(),
            "Partitioned dataset"
        );

        let resamples = config.resampling.resamples(train.labels())?;
        let evaluator = Evaluator::new().with_threshold(config.threshold);

        let mut tuned = Vec::with_capacity(config.models.len());
        let mut reports = Vec::with_capacity(config.models.len());
        for spec in &config.models {
            let result = config.tuner(spec).tune(&train, positive, &resamples, &pool)?;
            let evaluation = pool.install(|| evaluator.evaluate(&result, &test))?;
            reports.push(ModelReport {
                model: spec.model.name().to_string(),
                best_params: result.best_params().clone(),
                resampled_score: result.best_score(),
                n_fits: result.n_fits,
                n_failures: result.failures.len(),
                elapsed_secs: result.elapsed_secs,
                configs: result
                    .configs
                    .iter()
                    .map(|c| ConfigSummary::from_result(c, result.metric))
                    .collect(),
                test: evaluation,
            });
            tuned.push(result);
        }

        let comparison = Resamples::from_results(&tuned)?.compare();
        if let Some(best) = comparison.best_by_median(config.resampling.metric) {
            info!(model = best, metric = %config.resampling.metric, "Highest median resampled score");
        }

        let report = WorkflowReport {
            n_rows: dataset.n_rows(),
            n_features: dataset.n_features(),
            n_train: partition.n_train(),
            n_test: partition.n_test(),
            levels: dataset.levels().to_vec(),
            positive_level: train.levels()[positive].clone(),
            metric: config.resampling.metric,
            n_resamples: resamples.len(),
            models: reports,
            comparison,
            elapsed_secs: start.elapsed().as_secs_f64(),
        };

        Ok(WorkflowRun {
            partition,
            tuned,
            report,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::SyntheticSegmentation;

    #[test]
    fn test_quick_run_on_small_data() {
        let ds = SyntheticSegmentation::new()
            .with_counts(80, 50)
            .with_seed(3)
            .generate()
            .unwrap();
        let run = Workflow::new(WorkflowConfig::quick().with_threads(2)).run(&ds).unwrap();
        let report = &run.report;

        assert_eq!(report.n_train + report.n_test, 130);
        assert_eq!(report.n_train, 65);
        assert_eq!(report.positive_level, "WS");
        assert_eq!(report.models.len(), 3);
        assert_eq!(report.comparison.models, vec!["gbm", "svm", "rf"]);
        assert_eq!(report.comparison.n_resamples, 3);

        let gbm = report.model("gbm").unwrap();
        assert_eq!(gbm.n_fits, 4 * 3);
        assert_eq!(gbm.configs.len(), 4);
        assert_eq!(gbm.test.confusion.total(), report.n_test);
        for m in &report.models {
            assert!((0.0..=1.0).contains(&m.test.auc));
        }
    }
}
