//! celltune CLI
//!
//! `run` executes the model selection workflow and prints a summary;
//! `describe` reports the shape and class balance of a CSV file.

use clap::{Parser, Subcommand};
use colored::*;
use std::path::{Path, PathBuf};
use std::time::Instant;

use crate::comparison::Comparison;
use crate::config::WorkflowConfig;
use crate::data::{DataLoader, Dataset, SyntheticSegmentation};
use crate::metrics::Metric;
use crate::workflow::{Workflow, WorkflowReport};

// ─── Styling helpers ───────────────────────────────────────────────────────────

const W: usize = 58; // box inner width

fn dim(s: &str) -> ColoredString   { s.truecolor(100, 100, 100) }
fn accent(s: &str) -> ColoredString { s.truecolor(120, 170, 255) }
fn muted(s: &str) -> ColoredString  { s.truecolor(140, 140, 140) }
fn ok(s: &str) -> ColoredString     { s.truecolor(100, 210, 120) }

fn line_box_top()    { println!("  {}", dim("┌─────────────────────────────────────────────────────────┐")); }
fn line_box_bottom() { println!("  {}", dim("└─────────────────────────────────────────────────────────┘")); }
fn line_box_sep()    { println!("  {}", dim("├─────────────────────────────────────────────────────────┤")); }

fn line_box(content: &str) {
    let visible_len = strip_ansi(content).chars().count();
    let pad = W.saturating_sub(visible_len);
    println!("  {}  {}{} {}", dim("│"), content, " ".repeat(pad), dim("│"));
}

fn strip_ansi(s: &str) -> String {
    let mut out = String::new();
    let mut in_escape = false;
    for c in s.chars() {
        if c == '\x1b' { in_escape = true; continue; }
        if in_escape { if c == 'm' { in_escape = false; } continue; }
        out.push(c);
    }
    out
}

fn kv(key: &str, val: &str) -> String {
    format!("{} {}", muted(&format!("{:<14}", key)), val.white())
}

fn step_run(msg: &str) {
    print!("  {} {}... ", accent("›"), msg);
}

fn step_done(detail: &str) {
    println!("{} {}", ok("done"), dim(detail));
}

fn section(title: &str) {
    println!();
    println!("  {}", title.white().bold());
    println!("  {}", dim(&"─".repeat(56)));
}

// ─── CLI definition ────────────────────────────────────────────────────────────

#[derive(Parser)]
#[command(name = "celltune")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Repeated cross-validation model selection for two-class tabular data")]
#[command(long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Option<Commands>,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Partition, tune, evaluate and compare the configured models
    Run {
        /// Input CSV; synthetic segmentation data when omitted
        #[arg(short, long)]
        data: Option<PathBuf>,

        /// Workflow configuration (JSON)
        #[arg(short, long)]
        config: Option<PathBuf>,

        /// Write the full report as JSON
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Worker threads (default: all cores)
        #[arg(short, long)]
        threads: Option<usize>,

        /// Seed for the partition and the resamples
        #[arg(short, long)]
        seed: Option<u64>,

        /// Small grids and 3-fold CV instead of the full setup
        #[arg(long)]
        quick: bool,
    },

    /// Show dataset shape and class balance
    Describe {
        /// Input CSV
        #[arg(short, long)]
        data: PathBuf,

        /// Label column
        #[arg(short, long, default_value = "Class")]
        label: String,
    },
}

fn load_dataset(path: Option<&Path>, config: &WorkflowConfig) -> anyhow::Result<Dataset> {
    let dataset = match path {
        Some(path) => DataLoader::new(config.label_column.clone())
            .with_ignore_columns(config.ignore_columns.iter().cloned())
            .load_csv(path)?,
        None => SyntheticSegmentation::new().with_seed(config.seed).generate()?,
    };
    Ok(dataset)
}

// ─── Commands ──────────────────────────────────────────────────────────────────

pub fn cmd_run(
    data_path: Option<&Path>,
    config_path: Option<&Path>,
    output: Option<&Path>,
    threads: Option<usize>,
    seed: Option<u64>,
    quick: bool,
) -> anyhow::Result<()> {
    section("Run");

    let mut config = match (config_path, quick) {
        (Some(path), _) => WorkflowConfig::load(path)?,
        (None, true) => WorkflowConfig::quick(),
        (None, false) => WorkflowConfig::default(),
    };
    if let Some(n) = threads {
        config = config.with_threads(n);
    }
    if let Some(seed) = seed {
        config.seed = seed;
        config.resampling.seed = seed;
    }

    step_run("Loading data");
    let start = Instant::now();
    let dataset = load_dataset(data_path, &config)?;
    step_done(&format!(
        "{} rows × {} features in {:?}",
        dataset.n_rows(),
        dataset.n_features(),
        start.elapsed()
    ));

    step_run(&format!(
        "Tuning {} models over {} resamples",
        config.models.len(),
        config.resampling.n_resamples()
    ));
    let start = Instant::now();
    let run = Workflow::new(config).run(&dataset)?;
    step_done(&format!("{:.1?}", start.elapsed()));

    print_report(&run.report);

    if let Some(path) = output {
        step_run(&format!("Saving → {}", path.display()));
        run.report.save(path)?;
        step_done("");
    }

    println!();
    Ok(())
}

pub fn cmd_describe(data_path: &Path, label: &str) -> anyhow::Result<()> {
    section("Describe");

    let dataset = DataLoader::new(label).load_csv(data_path)?;
    let counts = dataset.class_counts();
    let total = dataset.n_rows().max(1) as f64;

    println!();
    line_box_top();
    line_box(&kv("File", &data_path.display().to_string()));
    line_box(&kv("Rows", &dataset.n_rows().to_string()));
    line_box(&kv("Features", &dataset.n_features().to_string()));
    line_box_sep();
    for (level, &count) in dataset.levels().iter().zip(counts.iter()) {
        line_box(&kv(
            &format!("{} {}", label, level),
            &format!("{:>6}  ({:.1}%)", count, 100.0 * count as f64 / total),
        ));
    }
    line_box_bottom();
    println!();
    Ok(())
}

fn print_report(report: &WorkflowReport) {
    println!();
    line_box_top();
    line_box(&kv("Rows", &format!("{} ({} train / {} test)", report.n_rows, report.n_train, report.n_test)));
    line_box(&kv("Positive", &report.positive_level));
    line_box(&kv("Resamples", &report.n_resamples.to_string()));
    line_box(&kv("Metric", report.metric.name()));
    line_box_bottom();

    section("Tuned models");
    println!(
        "  {:<6} {:>9} {:>8} {:>8} {:>8} {:>7}  {}",
        muted("Model"),
        muted(&format!("CV {}", report.metric)),
        muted("AUC"),
        muted("Sens"),
        muted("Spec"),
        muted("Fails"),
        muted("Selected")
    );
    for m in &report.models {
        let fails = if m.n_failures > 0 {
            m.n_failures.to_string().yellow()
        } else {
            m.n_failures.to_string().normal()
        };
        println!(
            "  {:<6} {:>9.4} {:>8.4} {:>8.4} {:>8.4} {:>7}  {}",
            m.model.white().bold(),
            m.resampled_score,
            m.test.auc,
            m.test.sensitivity(),
            m.test.specificity(),
            fails,
            dim(&m.best_params.to_string())
        );
    }

    print_comparison(&report.comparison, report.metric);
}

fn print_comparison(comparison: &Comparison, metric: Metric) {
    section(&format!("Resampled {} ({} resamples)", metric, comparison.n_resamples));
    println!(
        "  {:<6} {:>8} {:>8} {:>8} {:>8} {:>8} {:>4}",
        muted("Model"),
        muted("Min"),
        muted("Q1"),
        muted("Median"),
        muted("Q3"),
        muted("Max"),
        muted("NA")
    );
    for d in comparison.summaries.iter().filter(|d| d.metric == metric) {
        println!(
            "  {:<6} {:>8.4} {:>8.4} {:>8.4} {:>8.4} {:>8.4} {:>4}",
            d.model, d.min, d.q1, d.median, d.q3, d.max, d.n_missing
        );
    }

    let diffs: Vec<_> = comparison.differences.iter().filter(|d| d.metric == metric).collect();
    if !diffs.is_empty() {
        println!();
        for d in diffs {
            let p = format!("{:.4}", d.p_adjusted);
            let p = if d.p_adjusted < 0.05 { p.green() } else { p.normal() };
            println!(
                "  {:>4} - {:<4} {} {:>8.4}  {} {:>3}/{:<3}  {} {}",
                d.first,
                d.second,
                muted("diff"),
                d.mean,
                muted("wins"),
                d.wins,
                d.n,
                muted("p"),
                p
            );
        }
    }

    if let Some(best) = comparison.best_by_median(metric) {
        println!();
        println!("  {} {} {}", ok("best"), best.white().bold(), muted(&format!("by median {}", metric)));
    }
}
