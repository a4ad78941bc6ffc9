//! Integration test: workflow end-to-end

use celltune::config::{ModelSpec, WorkflowConfig};
use celltune::data::{DataLoader, Dataset, SyntheticSegmentation};
use celltune::evaluation::{Evaluator, PositiveClass};
use celltune::metrics::Metric;
use celltune::models::ModelType;
use celltune::tuner::SearchSpace;
use celltune::workflow::{Workflow, WorkflowReport};
use std::io::Write;

fn dataset() -> Dataset {
    SyntheticSegmentation::new()
        .with_counts(180, 100)
        .with_seed(17)
        .generate()
        .unwrap()
}

fn write_csv(ds: &Dataset) -> tempfile::NamedTempFile {
    let mut file = tempfile::Builder::new().suffix(".csv").tempfile().unwrap();
    let header: Vec<&str> = std::iter::once("Cell")
        .chain(std::iter::once("Class"))
        .chain(ds.feature_names().iter().map(|s| s.as_str()))
        .collect();
    writeln!(file, "{}", header.join(",")).unwrap();
    for (row, features) in ds.features().rows().into_iter().enumerate() {
        let values: Vec<String> = features.iter().map(|v| format!("{:.10}", v)).collect();
        writeln!(
            file,
            "{},{},{}",
            row + 1,
            ds.levels()[ds.labels()[row]],
            values.join(",")
        )
        .unwrap();
    }
    file.flush().unwrap();
    file
}

#[test]
fn test_quick_workflow() {
    let ds = dataset();
    let run = Workflow::new(WorkflowConfig::quick().with_threads(2)).run(&ds).unwrap();
    let report = &run.report;

    assert_eq!(report.n_train + report.n_test, ds.n_rows());
    assert_eq!(run.partition.n_train(), 140);
    assert_eq!(report.positive_level, "WS");
    assert_eq!(report.metric, Metric::Roc);

    for model in &report.models {
        let cm = &model.test.confusion;
        assert_eq!(cm.total(), report.n_test);
        assert!((0.0..=1.0).contains(&model.test.sensitivity()));
        assert!((0.0..=1.0).contains(&model.test.specificity()));
        assert!(model.test.auc > 0.7, "{} test AUC {}", model.model, model.test.auc);

        let points = model.test.roc_points();
        for w in points.windows(2) {
            assert!(w[1].fpr >= w[0].fpr);
            assert!(w[1].tpr >= w[0].tpr);
        }
    }
}

#[test]
fn test_workflow_is_reproducible() {
    let ds = SyntheticSegmentation::new()
        .with_counts(150, 100)
        .with_seed(4)
        .generate()
        .unwrap();
    let config = WorkflowConfig::quick().with_threads(3).with_models(vec![ModelSpec::new(
        ModelType::GradientBoosting,
        SearchSpace::TuneLength(2),
    )]);
    let a = Workflow::new(config.clone()).run(&ds).unwrap();
    let b = Workflow::new(config).run(&ds).unwrap();
    assert_eq!(a.partition, b.partition);
    assert_eq!(a.report.models[0].best_params, b.report.models[0].best_params);
    assert_eq!(a.report.models[0].test.auc, b.report.models[0].test.auc);
    assert_eq!(a.report.comparison.summaries, b.report.comparison.summaries);
}

#[test]
fn test_csv_workflow_and_report_file() {
    let ds = dataset();
    let csv = write_csv(&ds);
    let config = WorkflowConfig::quick().with_threads(2);
    let loaded = DataLoader::new(config.label_column.clone())
        .with_ignore_columns(config.ignore_columns.iter().cloned())
        .load_csv(csv.path())
        .unwrap();
    assert_eq!(loaded.n_rows(), ds.n_rows());
    assert_eq!(loaded.n_features(), 58);

    let config = config.with_models(vec![ModelSpec::new(ModelType::RandomForest, SearchSpace::TuneLength(2))]);
    let run = Workflow::new(config).run(&loaded).unwrap();

    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("report.json");
    run.report.save(&path).unwrap();
    let restored = WorkflowReport::load(&path).unwrap();
    assert_eq!(restored.models.len(), 1);
    assert_eq!(restored.models[0].model, "rf");
    assert_eq!(restored.n_test, run.report.n_test);
}

#[test]
fn test_named_positive_class() {
    let ds = dataset();
    let config = WorkflowConfig {
        positive: PositiveClass::Named("PS".to_string()),
        ..WorkflowConfig::quick().with_threads(1)
    }
    .with_models(vec![ModelSpec::new(ModelType::Svm, SearchSpace::TuneLength(2))]);
    let run = Workflow::new(config).run(&ds).unwrap();
    assert_eq!(run.report.positive_level, "PS");
    assert_eq!(run.tuned[0].positive, 0);

    // PS rows are now the positives
    let test = ds.subset(&run.partition.test).unwrap();
    let eval = Evaluator::new().evaluate(&run.tuned[0], &test).unwrap();
    assert_eq!(eval.positive_level, "PS");
    assert_eq!(eval.confusion.tp + eval.confusion.fn_, test.class_counts()[0]);
}

#[test]
fn test_unknown_positive_class_is_config_error() {
    let ds = dataset();
    let config = WorkflowConfig {
        positive: PositiveClass::Named("XX".to_string()),
        ..WorkflowConfig::quick().with_threads(1)
    };
    assert!(Workflow::new(config).run(&ds).is_err());
}
