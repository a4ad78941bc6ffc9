//! Cross-validated grid search
//!
//! Every (configuration, resample) pair is an independent task: the declared
//! pre-processing is fitted on the resample's analysis rows, the model is
//! fitted on the transformed analysis rows and the holdout rows are scored.
//! Tasks run on the supplied rayon pool and share only immutable data.

use crate::data::Dataset;
use crate::error::{Result, TuneError};
use crate::metrics::{Metric, TwoClassSummary};
use crate::models::{Model, ModelOptions, ModelType, TrainedModel};
use crate::preprocess::{FittedPreprocessor, Preprocessor};
use crate::resampling::{Resample, ResamplingPlan};
use crate::search_space::{Grid, ParamSet};
use ndarray::{Array1, Array2, Axis};
use rayon::prelude::*;
use rayon::ThreadPool;
use serde::{Deserialize, Serialize};
use std::time::Instant;
use tracing::{debug, info, warn};

/// Where the candidate configurations come from
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum SearchSpace {
    /// Explicit grid
    Grid(Grid),
    /// Family default grid with this many values per tuned parameter
    TuneLength(usize),
}

impl Default for SearchSpace {
    fn default() -> Self {
        SearchSpace::TuneLength(3)
    }
}

/// How the final configuration is chosen from the resampled means
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum SelectionRule {
    /// Highest mean; ties go to the first configuration in grid order
    #[default]
    Best,
    /// First configuration in grid order within one standard error of the best
    OneStandardError,
}

/// A fold on which a configuration could not be fitted
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FoldFailure {
    pub config_index: usize,
    pub resample_id: String,
    pub message: String,
}

/// Resampled performance of one configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConfigResult {
    pub params: ParamSet,
    /// Holdout summary per resample, `None` where the fit failed
    pub scores: Vec<Option<TwoClassSummary>>,
}

impl ConfigResult {
    /// Values of `metric` over the successful, defined resamples
    pub fn values(&self, metric: Metric) -> Vec<f64> {
        self.scores
            .iter()
            .flatten()
            .map(|s| s.get(metric))
            .filter(|v| !v.is_nan())
            .collect()
    }

    pub fn n_successful(&self) -> usize {
        self.scores.iter().filter(|s| s.is_some()).count()
    }

    pub fn n_failed(&self) -> usize {
        self.scores.len() - self.n_successful()
    }

    /// Mean over resamples; NaN when no resample produced a value
    pub fn mean(&self, metric: Metric) -> f64 {
        let values = self.values(metric);
        if values.is_empty() {
            return f64::NAN;
        }
        values.iter().sum::<f64>() / values.len() as f64
    }

    /// Sample standard deviation over resamples
    pub fn sd(&self, metric: Metric) -> f64 {
        sample_sd(&self.values(metric))
    }

    pub fn std_error(&self, metric: Metric) -> f64 {
        let n = self.values(metric).len();
        if n < 2 {
            return 0.0;
        }
        self.sd(metric) / (n as f64).sqrt()
    }
}

pub(crate) fn sample_sd(values: &[f64]) -> f64 {
    let n = values.len();
    if n < 2 {
        return f64::NAN;
    }
    let mean = values.iter().sum::<f64>() / n as f64;
    let ss: f64 = values.iter().map(|v| (v - mean).powi(2)).sum();
    (ss / (n - 1) as f64).sqrt()
}

/// Metrics of the selected configuration on one resample
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResampleScore {
    pub id: String,
    pub summary: Option<TwoClassSummary>,
}

/// Outcome of tuning one model family
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TuneResult {
    pub model_type: ModelType,
    pub metric: Metric,
    pub selection: SelectionRule,
    /// Label levels of the training subset
    pub levels: Vec<String>,
    /// Level index treated as the positive class
    pub positive: usize,
    pub resample_ids: Vec<String>,
    /// Sorted holdout rows of each resample, in `resample_ids` order
    pub resample_holdouts: Vec<Vec<usize>>,
    /// One entry per configuration, in grid order
    pub configs: Vec<ConfigResult>,
    pub failures: Vec<FoldFailure>,
    pub best_index: usize,
    /// Fold fits attempted, failed ones included
    pub n_fits: usize,
    pub elapsed_secs: f64,
    /// Workers available to the final refit
    pub n_threads: usize,
    pub preprocessor: FittedPreprocessor,
    pub model: TrainedModel,
}

impl TuneResult {
    pub fn best_params(&self) -> &ParamSet {
        &self.configs[self.best_index].params
    }

    pub fn best_config(&self) -> &ConfigResult {
        &self.configs[self.best_index]
    }

    /// Mean of the ranking metric for the selected configuration
    pub fn best_score(&self) -> f64 {
        self.best_config().mean(self.metric)
    }

    /// Per-resample metrics of the selected configuration, paired by id
    pub fn best_resamples(&self) -> Vec<ResampleScore> {
        self.resample_ids
            .iter()
            .zip(self.best_config().scores.iter())
            .map(|(id, summary)| ResampleScore {
                id: id.clone(),
                summary: *summary,
            })
            .collect()
    }

    /// Successful fold fits
    pub fn n_successful_fits(&self) -> usize {
        self.n_fits - self.failures.len()
    }

    /// Positive-class probabilities from the refitted model
    pub fn predict_proba(&self, x: &Array2<f64>) -> Result<Array1<f64>> {
        let x = self.preprocessor.transform(x)?;
        self.model.predict_proba(&x)
    }
}

/// Grid search over one model family with repeated cross-validation
#[derive(Debug, Clone)]
pub struct Tuner {
    model_type: ModelType,
    search: SearchSpace,
    plan: ResamplingPlan,
    preprocessor: Preprocessor,
    options: ModelOptions,
    selection: SelectionRule,
    seed: u64,
}

impl Tuner {
    pub fn new(model_type: ModelType, plan: ResamplingPlan) -> Self {
        Self {
            model_type,
            search: SearchSpace::default(),
            seed: plan.seed,
            plan,
            preprocessor: Preprocessor::default(),
            options: ModelOptions::default(),
            selection: SelectionRule::default(),
        }
    }

    pub fn with_grid(mut self, grid: Grid) -> Self {
        self.search = SearchSpace::Grid(grid);
        self
    }

    pub fn with_tune_length(mut self, tune_length: usize) -> Self {
        self.search = SearchSpace::TuneLength(tune_length);
        self
    }

    pub fn with_search(mut self, search: SearchSpace) -> Self {
        self.search = search;
        self
    }

    pub fn with_preprocessor(mut self, preprocessor: Preprocessor) -> Self {
        self.preprocessor = preprocessor;
        self
    }

    pub fn with_options(mut self, options: ModelOptions) -> Self {
        self.options = options;
        self
    }

    pub fn with_selection(mut self, selection: SelectionRule) -> Self {
        self.selection = selection;
        self
    }

    /// Seed for model-internal randomness
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = seed;
        self
    }

    pub fn model_type(&self) -> ModelType {
        self.model_type
    }

    pub fn plan(&self) -> &ResamplingPlan {
        &self.plan
    }

    /// Configurations that will be evaluated on `train`, validated
    pub fn configurations(&self, train: &Dataset) -> Result<Vec<ParamSet>> {
        let grid = match &self.search {
            SearchSpace::Grid(grid) => grid.clone(),
            SearchSpace::TuneLength(length) => {
                let x = self.preprocessor.fit(train.features())?.transform(train.features())?;
                self.model_type.default_grid(*length, &x, self.seed)?
            }
        };
        self.model_type.validate_grid(&grid, train.n_features())
    }

    /// Fold fits a grid of `n_configs` configurations costs under `plan`
    pub fn planned_fits(n_configs: usize, plan: &ResamplingPlan) -> usize {
        n_configs * plan.n_resamples()
    }

    /// Tune on `train` using the shared `resamples`.
    ///
    /// `resamples` index rows of `train`; passing the same set to every
    /// family keeps the comparison paired.
    pub fn tune(
        &self,
        train: &Dataset,
        positive: usize,
        resamples: &[Resample],
        pool: &ThreadPool,
    ) -> Result<TuneResult> {
        let start = Instant::now();
        if positive >= train.levels().len() {
            return Err(TuneError::ConfigError(format!(
                "positive level index {} out of range",
                positive
            )));
        }
        if resamples.is_empty() {
            return Err(TuneError::ConfigError("no resamples to tune on".to_string()));
        }
        for resample in resamples {
            if let Some(&bad) = resample
                .analysis
                .iter()
                .chain(resample.holdout.iter())
                .find(|&&i| i >= train.n_rows())
            {
                return Err(TuneError::DataError(format!(
                    "resample {} references row {} of a {}-row training set",
                    resample.id,
                    bad,
                    train.n_rows()
                )));
            }
        }

        let configs = self.configurations(train)?;
        let x = train.features();
        let y = train.binary_target(positive);

        info!(
            model = %self.model_type,
            configs = configs.len(),
            resamples = resamples.len(),
            fits = configs.len() * resamples.len(),
            "Tuning"
        );

        let tasks: Vec<(usize, usize)> = (0..configs.len())
            .flat_map(|c| (0..resamples.len()).map(move |r| (c, r)))
            .collect();

        let outcomes: Vec<Result<TwoClassSummary>> = pool.install(|| {
            tasks
                .par_iter()
                .map(|&(c, r)| {
                    let seed = self.seed.wrapping_add(r as u64);
                    self.fit_fold(x, &y, &configs[c], &resamples[r], seed)
                })
                .collect()
        });

        let mut results: Vec<ConfigResult> = configs
            .into_iter()
            .map(|params| ConfigResult {
                params,
                scores: vec![None; resamples.len()],
            })
            .collect();
        let mut failures = Vec::new();

        for (&(c, r), outcome) in tasks.iter().zip(outcomes) {
            match outcome {
                Ok(summary) => results[c].scores[r] = Some(summary),
                Err(e) if e.is_fit_failure() => {
                    warn!(
                        model = %self.model_type,
                        config = %results[c].params,
                        resample = %resamples[r].id,
                        error = %e,
                        "Fold fit failed"
                    );
                    failures.push(FoldFailure {
                        config_index: c,
                        resample_id: resamples[r].id.clone(),
                        message: e.to_string(),
                    });
                }
                Err(e) => return Err(e),
            }
        }

        for result in &results {
            debug!(
                model = %self.model_type,
                config = %result.params,
                mean = result.mean(self.plan.metric),
                sd = result.sd(self.plan.metric),
                failed = result.n_failed(),
                "Configuration resampled"
            );
        }

        let best_index = select(&results, self.plan.metric, self.selection).ok_or_else(|| {
            TuneError::TrainingError(format!(
                "every configuration of {} failed on every resample",
                self.model_type
            ))
        })?;

        info!(
            model = %self.model_type,
            params = %results[best_index].params,
            metric = %self.plan.metric,
            score = results[best_index].mean(self.plan.metric),
            failures = failures.len(),
            "Selected configuration"
        );

        let preprocessor = self.preprocessor.fit(x)?;
        let x_full = preprocessor.transform(x)?;
        let (model, n_threads) = pool.install(|| {
            let model = self.model_type.fit(
                &results[best_index].params,
                &self.options,
                self.seed,
                &x_full,
                &y,
            )?;
            Ok::<_, TuneError>((model, rayon::current_num_threads()))
        })?;

        Ok(TuneResult {
            model_type: self.model_type,
            metric: self.plan.metric,
            selection: self.selection,
            levels: train.levels().to_vec(),
            positive,
            resample_ids: resamples.iter().map(|r| r.id.clone()).collect(),
            resample_holdouts: resamples
                .iter()
                .map(|r| {
                    let mut rows = r.holdout.clone();
                    rows.sort_unstable();
                    rows
                })
                .collect(),
            n_fits: tasks.len(),
            configs: results,
            failures,
            best_index,
            elapsed_secs: start.elapsed().as_secs_f64(),
            n_threads,
            preprocessor,
            model,
        })
    }

    /// Fit on the analysis rows of one resample and score its holdout rows
    fn fit_fold(
        &self,
        x: &Array2<f64>,
        y: &Array1<f64>,
        params: &ParamSet,
        resample: &Resample,
        seed: u64,
    ) -> Result<TwoClassSummary> {
        let x_analysis = x.select(Axis(0), &resample.analysis);
        let y_analysis = y.select(Axis(0), &resample.analysis);
        let x_holdout = x.select(Axis(0), &resample.holdout);

        let preprocessor = self.preprocessor.fit(&x_analysis)?;
        let x_analysis = preprocessor.transform(&x_analysis)?;
        let x_holdout = preprocessor.transform(&x_holdout)?;

        let model = self
            .model_type
            .fit(params, &self.options, seed, &x_analysis, &y_analysis)?;
        let probs = model.predict_proba(&x_holdout)?.to_vec();

        let truth: Vec<bool> = resample.holdout.iter().map(|&i| y[i] > 0.5).collect();
        TwoClassSummary::compute(&probs, &truth, 0.5)
    }
}

/// Index of the selected configuration, `None` when nothing is selectable
pub fn select(results: &[ConfigResult], metric: Metric, rule: SelectionRule) -> Option<usize> {
    let mut best: Option<(usize, f64)> = None;
    for (idx, result) in results.iter().enumerate() {
        let mean = result.mean(metric);
        if mean.is_nan() {
            continue;
        }
        match best {
            Some((_, best_mean)) if mean <= best_mean => {}
            _ => best = Some((idx, mean)),
        }
    }
    let (best_idx, best_mean) = best?;

    match rule {
        SelectionRule::Best => Some(best_idx),
        SelectionRule::OneStandardError => {
            let threshold = best_mean - results[best_idx].std_error(metric);
            results
                .iter()
                .position(|r| {
                    let mean = r.mean(metric);
                    !mean.is_nan() && mean >= threshold
                })
                .or(Some(best_idx))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::SyntheticSegmentation;
    use crate::parallel::ParallelConfig;
    use crate::preprocess::Preprocessor;

    fn summary(roc: f64) -> TwoClassSummary {
        TwoClassSummary {
            roc,
            sens: 0.5,
            spec: 0.5,
            accuracy: 0.5,
            kappa: 0.0,
        }
    }

    fn config(name: i64, rocs: &[Option<f64>]) -> ConfigResult {
        ConfigResult {
            params: ParamSet::new().with("k", name),
            scores: rocs.iter().map(|r| r.map(summary)).collect(),
        }
    }

    #[test]
    fn test_select_best_prefers_first_on_tie() {
        let results = vec![
            config(1, &[Some(0.7), Some(0.8)]),
            config(2, &[Some(0.9), Some(0.8)]),
            config(3, &[Some(0.8), Some(0.9)]),
        ];
        assert_eq!(select(&results, Metric::Roc, SelectionRule::Best), Some(1));
    }

    #[test]
    fn test_failures_are_omitted_not_zero() {
        let results = vec![
            config(1, &[Some(0.80), Some(0.80)]),
            config(2, &[Some(0.90), None]),
        ];
        assert!((results[1].mean(Metric::Roc) - 0.9).abs() < 1e-12);
        assert_eq!(results[1].n_failed(), 1);
        assert_eq!(select(&results, Metric::Roc, SelectionRule::Best), Some(1));
    }

    #[test]
    fn test_config_without_successes_is_not_selectable() {
        let results = vec![config(1, &[None, None]), config(2, &[Some(0.6), Some(0.6)])];
        assert_eq!(select(&results, Metric::Roc, SelectionRule::Best), Some(1));
        let none = vec![config(1, &[None, None])];
        assert_eq!(select(&none, Metric::Roc, SelectionRule::Best), None);
    }

    #[test]
    fn test_one_standard_error_picks_simpler() {
        let results = vec![
            config(1, &[Some(0.84), Some(0.86), Some(0.85)]),
            config(2, &[Some(0.80), Some(0.92), Some(0.86)]),
        ];
        assert_eq!(select(&results, Metric::Roc, SelectionRule::Best), Some(1));
        assert_eq!(select(&results, Metric::Roc, SelectionRule::OneStandardError), Some(0));
    }

    fn small_train() -> Dataset {
        SyntheticSegmentation::new()
            .with_counts(60, 40)
            .with_seed(5)
            .generate()
            .unwrap()
    }

    #[test]
    fn test_tune_counts_fits_and_refits() {
        let train = small_train();
        let plan = ResamplingPlan::repeated_cv(3, 2).with_seed(11);
        let resamples = plan.resamples(train.labels()).unwrap();
        let pool = ParallelConfig::new().with_threads(2).build_pool().unwrap();
        let grid = Grid::new()
            .with("interaction_depth", [1i64, 2])
            .with("n_trees", [20i64])
            .with("shrinkage", [0.1])
            .with("n_minobsinnode", [5i64]);

        let tuner = Tuner::new(ModelType::GradientBoosting, plan.clone())
            .with_grid(grid)
            .with_preprocessor(Preprocessor::center_scale());
        let positive = train.minority_level();
        let result = tuner.tune(&train, positive, &resamples, &pool).unwrap();

        assert_eq!(result.n_fits, Tuner::planned_fits(2, &plan));
        assert_eq!(result.n_fits, 12);
        assert!(result.failures.is_empty());
        assert_eq!(result.configs.len(), 2);
        for c in &result.configs {
            assert_eq!(c.n_successful(), 6);
        }
        let best_mean = result.best_score();
        assert!(result.configs.iter().all(|c| c.mean(Metric::Roc) <= best_mean));
        assert_eq!(result.best_resamples().len(), 6);
        assert_eq!(result.best_resamples()[0].id, "Fold01.Rep1");

        let probs = result.predict_proba(train.features()).unwrap();
        assert_eq!(probs.len(), train.n_rows());
    }

    #[test]
    fn test_tune_is_deterministic() {
        let train = small_train();
        let plan = ResamplingPlan::repeated_cv(3, 1).with_seed(2);
        let resamples = plan.resamples(train.labels()).unwrap();
        let pool = ParallelConfig::new().with_threads(3).build_pool().unwrap();
        let tuner = Tuner::new(ModelType::RandomForest, plan)
            .with_tune_length(2)
            .with_options(ModelOptions {
                forest_trees: 15,
                ..Default::default()
            });
        let a = tuner.tune(&train, 0, &resamples, &pool).unwrap();
        let b = tuner.tune(&train, 0, &resamples, &pool).unwrap();
        assert_eq!(a.best_index, b.best_index);
        for (ca, cb) in a.configs.iter().zip(b.configs.iter()) {
            assert_eq!(ca.scores, cb.scores);
        }
    }

    #[test]
    fn test_refit_runs_on_supplied_pool() {
        let train = small_train();
        let plan = ResamplingPlan::repeated_cv(3, 1).with_seed(6);
        let resamples = plan.resamples(train.labels()).unwrap();
        let pool = ParallelConfig::new().with_threads(3).build_pool().unwrap();
        let result = Tuner::new(ModelType::RandomForest, plan)
            .with_tune_length(1)
            .with_options(ModelOptions {
                forest_trees: 12,
                ..Default::default()
            })
            .tune(&train, 1, &resamples, &pool)
            .unwrap();

        assert_eq!(result.n_threads, 3);
        assert_eq!(result.resample_holdouts.len(), 3);
        let mut held: Vec<usize> = result.resample_holdouts.concat();
        held.sort_unstable();
        assert_eq!(held, (0..train.n_rows()).collect::<Vec<_>>());
    }

    #[test]
    fn test_fit_failures_recorded_per_fold() {
        let train = small_train();
        let plan = ResamplingPlan::repeated_cv(3, 1).with_seed(4);
        let resamples = plan.resamples(train.labels()).unwrap();
        let pool = ParallelConfig::new().with_threads(2).build_pool().unwrap();
        // Bags of about 33 rows cannot hold two leaves of 20
        let grid = Grid::new()
            .with("interaction_depth", [1i64])
            .with("n_trees", [10i64])
            .with("shrinkage", [0.1])
            .with("n_minobsinnode", [2i64, 20]);
        let result = Tuner::new(ModelType::GradientBoosting, plan)
            .with_grid(grid)
            .tune(&train, 1, &resamples, &pool)
            .unwrap();
        assert_eq!(result.failures.len(), 3);
        assert!(result.failures.iter().all(|f| f.config_index == 1));
        assert_eq!(result.configs[1].n_successful(), 0);
        assert_eq!(result.best_index, 0);
        assert_eq!(result.n_successful_fits(), 3);
    }

    #[test]
    fn test_all_failures_is_error() {
        let train = small_train();
        let plan = ResamplingPlan::repeated_cv(3, 1);
        let resamples = plan.resamples(train.labels()).unwrap();
        let pool = ParallelConfig::new().with_threads(1).build_pool().unwrap();
        let grid = Grid::new()
            .with("interaction_depth", [1i64])
            .with("n_trees", [10i64])
            .with("shrinkage", [0.1])
            .with("n_minobsinnode", [40i64]);
        let err = Tuner::new(ModelType::GradientBoosting, plan)
            .with_grid(grid)
            .tune(&train, 1, &resamples, &pool)
            .unwrap_err();
        assert!(matches!(err, TuneError::TrainingError(_)));
    }

    #[test]
    fn test_invalid_grid_rejected_before_fitting() {
        let train = small_train();
        let plan = ResamplingPlan::repeated_cv(3, 1);
        let resamples = plan.resamples(train.labels()).unwrap();
        let pool = ParallelConfig::new().with_threads(1).build_pool().unwrap();
        let grid = Grid::new().with("mtry", [0i64, 2]);
        let err = Tuner::new(ModelType::RandomForest, plan)
            .with_grid(grid)
            .tune(&train, 1, &resamples, &pool)
            .unwrap_err();
        assert!(matches!(err, TuneError::InvalidParameter { .. }));
    }
}
