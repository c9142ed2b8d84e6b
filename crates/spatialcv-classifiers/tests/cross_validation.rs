use std::collections::HashSet;

use anyhow::{bail, Result};
use spatialcv_classifiers::config::{CvConfig, ModelConfig, ModelType};
use spatialcv_classifiers::cross_validation::CrossValidatedTrainer;
use spatialcv_classifiers::error::SpatialCvError;
use spatialcv_classifiers::math::Array2;
use spatialcv_classifiers::metrics::MetricKind;
use spatialcv_classifiers::models::ClassifierModel;
use spatialcv_classifiers::sample_table::{FeatureRow, SampleTable};

// ---------------------------------------------------------------------------
// Mock models
// ---------------------------------------------------------------------------

/// Reads the class from band 1 and refuses to predict any row whose group
/// (band 0) it saw during training.
#[derive(Default)]
struct LeakCheckingModel {
    seen_groups: HashSet<u32>,
    n_features: Option<usize>,
}

impl ClassifierModel for LeakCheckingModel {
    fn fit(&mut self, x: &Array2<f32>, _y: &[usize], _n_classes: usize, _seed: u64) -> Result<()> {
        self.seen_groups = x.rows().map(|r| r[0] as u32).collect();
        self.n_features = Some(x.ncols());
        Ok(())
    }

    fn predict(&self, x: &Array2<f32>) -> Result<Vec<usize>> {
        x.rows()
            .map(|r| {
                if self.seen_groups.contains(&(r[0] as u32)) {
                    bail!("group {} leaked into training", r[0]);
                }
                Ok(r[1] as usize)
            })
            .collect()
    }

    fn n_features(&self) -> Option<usize> {
        self.n_features
    }
}

/// Always predicts class 0.
#[derive(Default)]
struct ConstantModel {
    n_features: Option<usize>,
}

impl ClassifierModel for ConstantModel {
    fn fit(&mut self, x: &Array2<f32>, _y: &[usize], _n_classes: usize, _seed: u64) -> Result<()> {
        self.n_features = Some(x.ncols());
        Ok(())
    }

    fn predict(&self, x: &Array2<f32>) -> Result<Vec<usize>> {
        Ok(vec![0; x.nrows()])
    }

    fn n_features(&self) -> Option<usize> {
        self.n_features
    }
}

/// Maximum likelihood candidates get the constant model, everything else
/// the leak-checking one.
fn mock_builder(config: &ModelConfig) -> Box<dyn ClassifierModel> {
    match config.model_type {
        ModelType::MaximumLikelihood { .. } => Box::new(ConstantModel::default()),
        _ => Box::new(LeakCheckingModel::default()),
    }
}

fn gbdt() -> ModelType {
    ModelType::GBDT {
        learning_rate: 0.1,
        max_depth: 3,
        num_boost_round: 5,
        training_optimization_level: 2,
    }
}

// ---------------------------------------------------------------------------
// Fixtures
// ---------------------------------------------------------------------------

/// 1000 rows over 33 groups and 3 classes (11 groups each).
fn survey_table() -> SampleTable {
    let classes = ["crop", "forest", "water"];
    let mut rows = Vec::new();
    for g in 0..33u32 {
        let class = (g % 3) as usize;
        let n = if g == 0 { 40 } else { 30 };
        for i in 0..n {
            rows.push(FeatureRow {
                values: vec![g as f32, class as f32, (i % 5) as f32],
                group_id: format!("g{:02}", g),
                class_label: classes[class].to_string(),
                cell: Some((g as usize, i)),
            });
        }
    }
    SampleTable::from_rows(vec!["group".into(), "class".into(), "noise".into()], rows).unwrap()
}

fn cv(parallel: bool) -> CvConfig {
    CvConfig {
        n_folds: 5,
        seed: 3,
        parallel,
        ..CvConfig::default()
    }
}

// ---------------------------------------------------------------------------
// Out-of-fold completeness and leakage
// ---------------------------------------------------------------------------

#[test]
fn every_row_is_held_out_exactly_once() {
    let table = survey_table();
    assert_eq!(table.n_rows(), 1000);
    assert_eq!(table.n_groups(), 33);

    let trainer = CrossValidatedTrainer::new(mock_builder, cv(true));
    let assignment = trainer.assign_folds(&table).unwrap();
    let run = trainer
        .cross_validate(&table, &assignment, &ModelConfig::new(1, ModelType::MinimumDistance {}))
        .unwrap();

    assert_eq!(run.folds.len(), 5);
    assert_eq!(run.folds.iter().map(|f| f.n_test_rows).sum::<usize>(), 1000);
    for f in &run.folds {
        assert_eq!(f.n_train_rows + f.n_test_rows, 1000);
        assert_eq!(f.n_train_groups + f.n_test_groups, 33);
    }
    assert_eq!(run.oof_predictions.len(), 1000);
    assert_eq!(run.confusion.total(), 1000);
    for i in 0..table.n_rows() {
        assert_eq!(Some(run.oof_fold[i]), assignment.fold_of(table.group_of(i)));
    }
}

#[test]
fn no_group_is_seen_in_training_and_evaluation() {
    let table = survey_table();
    let trainer = CrossValidatedTrainer::new(mock_builder, cv(true));
    let assignment = trainer.assign_folds(&table).unwrap();
    // The mock fails on any leaked group, so success means no leakage.
    let run = trainer
        .cross_validate(&table, &assignment, &ModelConfig::new(1, ModelType::MinimumDistance {}))
        .unwrap();
    assert_eq!(run.oof_predictions, table.labels());
    assert!((run.mean_score - 1.0).abs() < 1e-12);
}

#[test]
fn folds_are_ordered_by_index_in_either_mode() {
    let table = survey_table();
    let config = ModelConfig::new(1, ModelType::MinimumDistance {});

    let par = CrossValidatedTrainer::new(mock_builder, cv(true));
    let seq = CrossValidatedTrainer::new(mock_builder, cv(false));
    let assignment = par.assign_folds(&table).unwrap();
    let a = par.cross_validate(&table, &assignment, &config).unwrap();
    let b = seq.cross_validate(&table, &assignment, &config).unwrap();

    assert_eq!(a.folds.iter().map(|f| f.fold).collect::<Vec<_>>(), vec![0, 1, 2, 3, 4]);
    assert_eq!(a.oof_predictions, b.oof_predictions);
    assert_eq!(a.oof_fold, b.oof_fold);
    assert_eq!(
        a.folds.iter().map(|f| f.n_test_rows).collect::<Vec<_>>(),
        b.folds.iter().map(|f| f.n_test_rows).collect::<Vec<_>>()
    );
}

// ---------------------------------------------------------------------------
// Hyperparameter sweep and final fit
// ---------------------------------------------------------------------------

#[test]
fn sweep_selects_best_mean_score() {
    let table = survey_table();
    let trainer = CrossValidatedTrainer::new(mock_builder, cv(true));
    let candidates = vec![ModelConfig::default(), ModelConfig::new(1, gbdt())];
    let outcome = trainer.train(&table, &candidates).unwrap();

    assert_eq!(outcome.sweep.best, 1);
    assert_eq!(outcome.selected, candidates[1]);
    assert!(outcome.sweep.runs[0].mean_score < outcome.sweep.runs[1].mean_score);
    assert_eq!(outcome.classifier.feature_names(), &["group", "class", "noise"]);
    assert_eq!(outcome.classifier.class_names(), &["crop", "forest", "water"]);
}

#[test]
fn ties_go_to_the_simpler_candidate() {
    let table = survey_table();
    let trainer = CrossValidatedTrainer::new(mock_builder, cv(false));
    let assignment = trainer.assign_folds(&table).unwrap();
    let candidates = vec![
        ModelConfig::new(1, gbdt()),
        ModelConfig::new(1, ModelType::MinimumDistance {}),
    ];
    let sweep = trainer.sweep(&table, &assignment, &candidates).unwrap();
    assert_eq!(sweep.best, 1);
}

#[test]
fn empty_candidate_list_is_an_error() {
    let table = survey_table();
    let trainer = CrossValidatedTrainer::new(mock_builder, cv(false));
    let err = trainer.train(&table, &[]).unwrap_err();
    assert_eq!(err.downcast_ref::<SpatialCvError>(), Some(&SpatialCvError::NoCandidates));
}

#[test]
fn built_in_models_on_separable_data() {
    // Two classes far apart in both bands; 12 groups each.
    let mut rows = Vec::new();
    for g in 0..24 {
        let class = g % 2;
        let base = if class == 0 { 0.0 } else { 10.0 };
        for i in 0..8 {
            rows.push(FeatureRow {
                values: vec![base + (i as f32) * 0.1, base - (g as f32) * 0.05],
                group_id: format!("g{}", g),
                class_label: if class == 0 { "dark" } else { "bright" }.to_string(),
                cell: None,
            });
        }
    }
    let table = SampleTable::from_rows(vec!["b1".into(), "b2".into()], rows).unwrap();
    let trainer = CrossValidatedTrainer::with_default_models(CvConfig {
        n_folds: 4,
        metric: MetricKind::OverallAccuracy,
        ..CvConfig::default()
    });
    let candidates = vec![
        ModelConfig::new(42, ModelType::MinimumDistance {}),
        ModelConfig::default(),
    ];
    let outcome = trainer.train(&table, &candidates).unwrap();

    for run in &outcome.sweep.runs {
        assert!((run.mean_score - 1.0).abs() < 1e-12);
    }
    // Equal scores: minimum distance is the simpler model.
    assert_eq!(outcome.sweep.best, 0);
    let proba = outcome.sweep.runs[1].oof_proba.as_ref().unwrap();
    assert_eq!(proba.shape(), (table.n_rows(), 2));
}

// ---------------------------------------------------------------------------
// Reproducibility
// ---------------------------------------------------------------------------

/// Three overlapping classes over 24 groups, so fold models disagree.
fn overlapping_table() -> SampleTable {
    let classes = ["crop", "forest", "water"];
    let mut rows = Vec::new();
    for g in 0..24u32 {
        let class = (g % 3) as usize;
        for i in 0..12u32 {
            let jitter = ((g * 7 + i * 13) % 10) as f32 * 0.3;
            rows.push(FeatureRow {
                values: vec![class as f32 + jitter, 2.0 - class as f32 + jitter * 0.5],
                group_id: format!("g{:02}", g),
                class_label: classes[class].to_string(),
                cell: None,
            });
        }
    }
    SampleTable::from_rows(vec!["b1".into(), "b2".into()], rows).unwrap()
}

#[test]
fn same_inputs_and_seeds_reproduce_the_whole_run() {
    let table = overlapping_table();
    let candidates = vec![
        ModelConfig::new(5, ModelType::MaximumLikelihood { variance_floor: 1e-6 }),
        ModelConfig::new(5, gbdt()),
    ];
    let config = CvConfig {
        n_folds: 4,
        seed: 21,
        ..CvConfig::default()
    };
    let first = CrossValidatedTrainer::with_default_models(config.clone())
        .train(&table, &candidates)
        .unwrap();
    let second = CrossValidatedTrainer::with_default_models(config)
        .train(&table, &candidates)
        .unwrap();

    assert_eq!(first.assignment, second.assignment);
    assert_eq!(first.sweep.best, second.sweep.best);
    assert_eq!(first.selected, second.selected);
    for (a, b) in first.sweep.runs.iter().zip(&second.sweep.runs) {
        assert_eq!(a.oof_predictions, b.oof_predictions);
        assert_eq!(a.oof_fold, b.oof_fold);
        assert_eq!(a.oof_proba, b.oof_proba);
        assert_eq!(a.mean_score.to_bits(), b.mean_score.to_bits());
    }
    assert!(first.sweep.runs[0].oof_proba.is_some());

    // Final models agree on a fixed grid of points.
    let mut points = Vec::new();
    for i in 0..10 {
        for j in 0..10 {
            points.extend([i as f32 * 0.4, j as f32 * 0.4 - 1.0]);
        }
    }
    let grid = Array2::from_shape_vec((100, 2), points).unwrap();
    let a = first.classifier.model();
    let b = second.classifier.model();
    assert_eq!(a.predict(&grid).unwrap(), b.predict(&grid).unwrap());
    assert_eq!(a.predict_proba(&grid).unwrap(), b.predict_proba(&grid).unwrap());
}

#[test]
fn final_fit_is_reproducible_for_each_model_type() {
    let table = overlapping_table();
    let trainer = CrossValidatedTrainer::with_default_models(cv(false));
    let grid = Array2::from_shape_vec((4, 2), vec![0.0, 2.0, 1.5, 1.0, 3.0, 0.5, 4.0, -1.0]).unwrap();
    for model_type in [ModelType::MinimumDistance {}, ModelType::default(), gbdt()] {
        let config = ModelConfig::new(9, model_type);
        let a = trainer.fit_final(&table, &config).unwrap();
        let b = trainer.fit_final(&table, &config).unwrap();
        assert_eq!(a.model().predict(&grid).unwrap(), b.model().predict(&grid).unwrap(), "{:?}", config);
    }
}
