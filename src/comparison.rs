//! Paired comparison of tuned models over shared resamples
//!
//! Models tuned on the same resamples produce one holdout score per resample
//! id, so their distributions can be compared row by row.

use crate::error::{Result, TuneError};
use crate::metrics::{Metric, TwoClassSummary};
use crate::models::quantile_sorted;
use crate::tuner::{sample_sd, TuneResult};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Per-resample metrics of several models, aligned by resample id
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Resamples {
    ids: Vec<String>,
    models: Vec<String>,
    /// `scores[m][r]` is model `m` on resample `r`
    scores: Vec<Vec<Option<TwoClassSummary>>>,
}

impl Resamples {
    /// Collect the selected configuration's resamples of each named result.
    ///
    /// Every result must carry the same resample ids in the same order, each
    /// holding out the same rows.
    pub fn new(results: &[(&str, &TuneResult)]) -> Result<Self> {
        let (_, first) = results
            .first()
            .ok_or_else(|| TuneError::ConfigError("no models to compare".to_string()))?;
        let ids = first.resample_ids.clone();

        let mut models = Vec::with_capacity(results.len());
        let mut scores = Vec::with_capacity(results.len());
        for (name, result) in results {
            if result.resample_ids != ids || result.resample_holdouts != first.resample_holdouts {
                return Err(TuneError::ConfigError(format!(
                    "model '{}' was resampled on different folds than '{}'",
                    name, results[0].0
                )));
            }
            if models.iter().any(|m: &String| m.as_str() == *name) {
                return Err(TuneError::ConfigError(format!("duplicate model name '{}'", name)));
            }
            models.push(name.to_string());
            scores.push(result.best_resamples().into_iter().map(|r| r.summary).collect());
        }

        Ok(Self { ids, models, scores })
    }

    /// Name each result after its model family
    pub fn from_results(results: &[TuneResult]) -> Result<Self> {
        let named: Vec<(&str, &TuneResult)> = results.iter().map(|r| (r.model_type.name(), r)).collect();
        Self::new(&named)
    }

    pub fn ids(&self) -> &[String] {
        &self.ids
    }

    pub fn models(&self) -> &[String] {
        &self.models
    }

    /// Values of `metric` for `model`, `None` where missing
    pub fn values(&self, model: &str, metric: Metric) -> Option<Vec<Option<f64>>> {
        let m = self.models.iter().position(|name| name == model)?;
        Some(self.column(m, metric))
    }

    fn column(&self, m: usize, metric: Metric) -> Vec<Option<f64>> {
        self.scores[m]
            .iter()
            .map(|s| s.map(|s| s.get(metric)).filter(|v| !v.is_nan()))
            .collect()
    }

    /// Distribution of every metric for every model
    pub fn summary(&self) -> Vec<MetricDistribution> {
        let mut out = Vec::with_capacity(self.models.len() * Metric::SUMMARY.len());
        for metric in Metric::SUMMARY {
            for (m, model) in self.models.iter().enumerate() {
                out.push(MetricDistribution::from_values(model, metric, &self.column(m, metric)));
            }
        }
        out
    }

    /// Paired differences for every model pair and metric.
    ///
    /// P-values are Bonferroni-adjusted over the number of pairs.
    pub fn differences(&self) -> Vec<PairwiseDifference> {
        let n_pairs = self.models.len() * self.models.len().saturating_sub(1) / 2;
        let mut out = Vec::new();
        for metric in Metric::SUMMARY {
            for a in 0..self.models.len() {
                for b in (a + 1)..self.models.len() {
                    out.push(PairwiseDifference::compute(
                        &self.models[a],
                        &self.models[b],
                        metric,
                        &self.column(a, metric),
                        &self.column(b, metric),
                        n_pairs,
                    ));
                }
            }
        }
        out
    }

    pub fn compare(&self) -> Comparison {
        Comparison {
            models: self.models.clone(),
            n_resamples: self.ids.len(),
            summaries: self.summary(),
            differences: self.differences(),
        }
    }
}

/// Five-number summary plus mean and spread of one metric for one model
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetricDistribution {
    pub model: String,
    pub metric: Metric,
    pub min: f64,
    pub q1: f64,
    pub median: f64,
    pub mean: f64,
    pub q3: f64,
    pub max: f64,
    pub sd: f64,
    pub n_missing: usize,
}

impl MetricDistribution {
    pub fn from_values(model: &str, metric: Metric, values: &[Option<f64>]) -> Self {
        let mut present: Vec<f64> = values.iter().flatten().copied().collect();
        present.sort_by(|a, b| a.total_cmp(b));
        let n_missing = values.len() - present.len();
        let mean = if present.is_empty() {
            f64::NAN
        } else {
            present.iter().sum::<f64>() / present.len() as f64
        };
        Self {
            model: model.to_string(),
            metric,
            min: quantile_sorted(&present, 0.0),
            q1: quantile_sorted(&present, 0.25),
            median: quantile_sorted(&present, 0.5),
            mean,
            q3: quantile_sorted(&present, 0.75),
            max: quantile_sorted(&present, 1.0),
            sd: sample_sd(&present),
            n_missing,
        }
    }
}

/// Paired difference `first - second` of one metric over shared resamples
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PairwiseDifference {
    pub first: String,
    pub second: String,
    pub metric: Metric,
    /// Resamples where both models have a value
    pub n: usize,
    pub mean: f64,
    pub sd: f64,
    pub t_statistic: f64,
    /// Resamples where `first` scored higher
    pub wins: usize,
    pub losses: usize,
    /// Exact two-sided sign test, ties dropped
    pub p_value: f64,
    pub p_adjusted: f64,
}

impl PairwiseDifference {
    fn compute(
        first: &str,
        second: &str,
        metric: Metric,
        a: &[Option<f64>],
        b: &[Option<f64>],
        n_pairs: usize,
    ) -> Self {
        let diffs: Vec<f64> = a
            .iter()
            .zip(b.iter())
            .filter_map(|(x, y)| Some((*x)? - (*y)?))
            .collect();
        let n = diffs.len();
        let mean = if n == 0 {
            f64::NAN
        } else {
            diffs.iter().sum::<f64>() / n as f64
        };
        let sd = sample_sd(&diffs);
        let t_statistic = if n >= 2 && sd > 0.0 {
            mean / (sd / (n as f64).sqrt())
        } else {
            f64::NAN
        };
        let wins = diffs.iter().filter(|&&d| d > 0.0).count();
        let losses = diffs.iter().filter(|&&d| d < 0.0).count();
        let p_value = sign_test(wins, losses);
        Self {
            first: first.to_string(),
            second: second.to_string(),
            metric,
            n,
            mean,
            sd,
            t_statistic,
            wins,
            losses,
            p_value,
            p_adjusted: (p_value * n_pairs.max(1) as f64).min(1.0),
        }
    }
}

/// Exact two-sided binomial sign test with p = 1/2
pub fn sign_test(wins: usize, losses: usize) -> f64 {
    let n = wins + losses;
    if n == 0 {
        return 1.0;
    }
    let k = wins.min(losses);
    let ln_half_n = -(n as f64) * std::f64::consts::LN_2;
    let mut ln_choose = 0.0;
    let mut tail = 0.0;
    for i in 0..=k {
        if i > 0 {
            ln_choose += ((n - i + 1) as f64).ln() - (i as f64).ln();
        }
        tail += (ln_choose + ln_half_n).exp();
    }
    (2.0 * tail).min(1.0)
}

/// Distributions and paired differences of several tuned models
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Comparison {
    pub models: Vec<String>,
    pub n_resamples: usize,
    pub summaries: Vec<MetricDistribution>,
    pub differences: Vec<PairwiseDifference>,
}

impl Comparison {
    pub fn distribution(&self, model: &str, metric: Metric) -> Option<&MetricDistribution> {
        self.summaries
            .iter()
            .find(|d| d.model == model && d.metric == metric)
    }

    /// Model with the highest median of `metric`
    pub fn best_by_median(&self, metric: Metric) -> Option<&str> {
        self.summaries
            .iter()
            .filter(|d| d.metric == metric && !d.median.is_nan())
            .fold(None, |best: Option<&MetricDistribution>, d| match best {
                Some(b) if b.median >= d.median => Some(b),
                _ => Some(d),
            })
            .map(|d| d.model.as_str())
    }
}

impl fmt::Display for Comparison {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Models: {}", self.models.join(", "))?;
        writeln!(f, "Number of resamples: {}", self.n_resamples)?;
        let mut current: Option<Metric> = None;
        for d in &self.summaries {
            if current != Some(d.metric) {
                current = Some(d.metric);
                writeln!(f)?;
                writeln!(f, "{}", d.metric)?;
                writeln!(
                    f,
                    "{:>6} {:>8} {:>8} {:>8} {:>8} {:>8} {:>8} {:>4}",
                    "", "Min.", "1st Qu.", "Median", "Mean", "3rd Qu.", "Max.", "NA's"
                )?;
            }
            writeln!(
                f,
                "{:>6} {:>8.4} {:>8.4} {:>8.4} {:>8.4} {:>8.4} {:>8.4} {:>4}",
                d.model, d.min, d.q1, d.median, d.mean, d.q3, d.max, d.n_missing
            )?;
        }
        if !self.differences.is_empty() {
            writeln!(f)?;
            writeln!(f, "Paired differences (first - second), sign test p-values Bonferroni adjusted")?;
            for d in &self.differences {
                writeln!(
                    f,
                    "{:<8} {:>4} - {:<4} mean {:>8.4}  wins {:>3}/{:<3}  p {:.4}",
                    d.metric.name(),
                    d.first,
                    d.second,
                    d.mean,
                    d.wins,
                    d.n,
                    d.p_adjusted
                )?;
            }
        }
        Ok(())
    }
}
