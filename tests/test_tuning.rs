//! Integration test: partition, shared resamples, tuning and comparison

use celltune::comparison::Resamples;
use celltune::config::tutorial_boosting_grid;
use celltune::data::SyntheticSegmentation;
use celltune::metrics::Metric;
use celltune::models::{ModelOptions, ModelType};
use celltune::parallel::ParallelConfig;
use celltune::partition::Partitioner;
use celltune::preprocess::Preprocessor;
use celltune::resampling::{Resample, ResamplingPlan};
use celltune::search_space::Grid;
use celltune::tuner::Tuner;
use celltune::TuneError;

#[test]
fn test_reference_partition_sizes() {
    let ds = SyntheticSegmentation::default().generate().unwrap();
    assert_eq!(ds.n_rows(), 2019);

    let (partition, train, test) = Partitioner::new(0.5, 1).unwrap().split_dataset(&ds).unwrap();
    assert_eq!(train.n_rows(), 1010);
    assert_eq!(test.n_rows(), 1009);
    assert_eq!(train.class_counts(), [650, 360]);

    let mut all: Vec<usize> = partition.train.iter().chain(partition.test.iter()).copied().collect();
    all.sort_unstable();
    assert_eq!(all, (0..2019).collect::<Vec<_>>());
}

#[test]
fn test_tutorial_grid_fit_count() {
    let grid = tutorial_boosting_grid();
    let plan = ResamplingPlan::repeated_cv(10, 5);
    ModelType::GradientBoosting.validate_grid(&grid, 58).unwrap();
    assert_eq!(grid.n_configs(), 80);
    assert_eq!(Tuner::planned_fits(grid.n_configs(), &plan), 4000);
}

#[test]
fn test_resamples_shared_across_families() {
    let ds = SyntheticSegmentation::new()
        .with_counts(90, 60)
        .with_seed(21)
        .generate()
        .unwrap();
    let (_, train, _) = Partitioner::new(0.6, 4).unwrap().split_dataset(&ds).unwrap();
    let plan = ResamplingPlan::repeated_cv(4, 2).with_seed(13);
    let resamples = plan.resamples(train.labels()).unwrap();
    assert_eq!(resamples.len(), 8);
    // Same seed, same folds
    assert_eq!(resamples, plan.resamples(train.labels()).unwrap());

    let pool = ParallelConfig::new().with_threads(2).build_pool().unwrap();
    let positive = train.minority_level();
    let options = ModelOptions {
        forest_trees: 40,
        ..Default::default()
    };

    let gbm = Tuner::new(ModelType::GradientBoosting, plan.clone())
        .with_grid(
            Grid::new()
                .with("interaction_depth", [1i64, 2])
                .with("n_trees", [30i64, 60])
                .with("shrinkage", [0.1])
                .with("n_minobsinnode", [5i64]),
        )
        .with_preprocessor(Preprocessor::center_scale())
        .tune(&train, positive, &resamples, &pool)
        .unwrap();
    let svm = Tuner::new(ModelType::Svm, plan.clone())
        .with_tune_length(3)
        .with_preprocessor(Preprocessor::center_scale())
        .tune(&train, positive, &resamples, &pool)
        .unwrap();
    let rf = Tuner::new(ModelType::RandomForest, plan.clone())
        .with_tune_length(2)
        .with_options(options)
        .tune(&train, positive, &resamples, &pool)
        .unwrap();

    assert_eq!(gbm.n_fits, 4 * 8);
    assert_eq!(svm.n_fits, 3 * 8);
    assert_eq!(rf.n_fits, 2 * 8);

    for tuned in [&gbm, &svm, &rf] {
        let best = tuned.best_score();
        for config in &tuned.configs {
            let mean = config.mean(Metric::Roc);
            assert!(mean.is_nan() || mean <= best);
        }
        assert!(best > 0.6, "{} resampled ROC {}", tuned.model_type, best);
    }

    let resampled = Resamples::new(&[("gbm", &gbm), ("svm", &svm), ("rf", &rf)]).unwrap();
    assert_eq!(resampled.ids().len(), 8);
    let comparison = resampled.compare();
    assert_eq!(comparison.summaries.len(), 3 * Metric::SUMMARY.len());
    assert_eq!(comparison.differences.len(), 3 * Metric::SUMMARY.len());
    for d in &comparison.differences {
        assert!((0.0..=1.0).contains(&d.p_adjusted));
        assert!(d.p_adjusted >= d.p_value);
    }
    let roc = comparison.distribution("svm", Metric::Roc).unwrap();
    assert!(roc.min <= roc.median && roc.median <= roc.max);
    assert!(comparison.best_by_median(Metric::Roc).is_some());
}

#[test]
fn test_mismatched_resamples_rejected() {
    let ds = SyntheticSegmentation::new()
        .with_counts(60, 40)
        .with_seed(2)
        .generate()
        .unwrap();
    let pool = ParallelConfig::new().with_threads(1).build_pool().unwrap();
    let options = ModelOptions {
        forest_trees: 10,
        ..Default::default()
    };

    let plan_a = ResamplingPlan::repeated_cv(3, 1);
    let plan_b = ResamplingPlan::repeated_cv(4, 1);
    let a = Tuner::new(ModelType::RandomForest, plan_a.clone())
        .with_tune_length(1)
        .with_options(options.clone())
        .tune(&ds, 1, &plan_a.resamples(ds.labels()).unwrap(), &pool)
        .unwrap();
    let b = Tuner::new(ModelType::RandomForest, plan_b.clone())
        .with_tune_length(1)
        .with_options(options)
        .tune(&ds, 1, &plan_b.resamples(ds.labels()).unwrap(), &pool)
        .unwrap();

    let err = Resamples::new(&[("a", &a), ("b", &b)]).unwrap_err();
    assert!(matches!(err, TuneError::ConfigError(_)));
}

#[test]
fn test_same_ids_on_different_folds_rejected() {
    let ds = SyntheticSegmentation::new()
        .with_counts(60, 40)
        .with_seed(2)
        .generate()
        .unwrap();
    let pool = ParallelConfig::new().with_threads(1).build_pool().unwrap();
    let options = ModelOptions {
        forest_trees: 10,
        ..Default::default()
    };

    let plan_a = ResamplingPlan::repeated_cv(3, 1).with_seed(1);
    let plan_b = ResamplingPlan::repeated_cv(3, 1).with_seed(999);
    let folds_a = plan_a.resamples(ds.labels()).unwrap();
    let folds_b = plan_b.resamples(ds.labels()).unwrap();
    assert_ne!(folds_a, folds_b);

    let tune = |plan: &ResamplingPlan, folds: &[Resample]| {
        Tuner::new(ModelType::RandomForest, plan.clone())
            .with_tune_length(1)
            .with_options(options.clone())
            .tune(&ds, 1, folds, &pool)
            .unwrap()
    };
    let a = tune(&plan_a, &folds_a);
    let b = tune(&plan_b, &folds_b);
    assert_eq!(a.resample_ids, b.resample_ids);

    let err = Resamples::new(&[("a", &a), ("b", &b)]).unwrap_err();
    assert!(matches!(err, TuneError::ConfigError(_)));

    // Same folds pair up
    let again = tune(&plan_a, &folds_a);
    assert!(Resamples::new(&[("a", &a), ("again", &again)]).is_ok());
}
