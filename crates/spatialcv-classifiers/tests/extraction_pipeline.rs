use spatialcv_classifiers::config::{PipelineConfig, SamplingConfig, CvConfig, ModelType, PredictConfig};
use spatialcv_classifiers::cross_validation::CrossValidatedTrainer;
use spatialcv_classifiers::folds::CoveragePolicy;
use spatialcv_classifiers::predict::GridPredictor;
use spatialcv_classifiers::raster::{FeatureGrid, GeoTransform};
use geo::{LineString, Polygon};
use spatialcv_classifiers::region::Region;
use spatialcv_classifiers::report::CvReport;
use spatialcv_classifiers::sample_table::build_sample_table;

// ---------------------------------------------------------------------------
// Fixtures
// ---------------------------------------------------------------------------

/// 20 x 20 grid: left half dark, right half bright; cell (0, 0) is no-data.
fn two_tone_grid() -> FeatureGrid {
    let (rows, cols) = (20, 20);
    let mut data = Vec::new();
    for r in 0..rows {
        for c in 0..cols {
            let base = if c < 10 { 0.1 } else { 0.9 };
            data.extend([base + (r as f32) * 0.001, base - (c as f32) * 0.001]);
        }
    }
    data[0] = f32::NAN;
    FeatureGrid::new(rows, cols, vec!["b1".to_string(), "b2".to_string()], data).unwrap()
}

/// Six 2x2 square regions per class, each a separate group.
fn square_regions() -> Vec<Region> {
    let mut regions = Vec::new();
    for i in 0..6 {
        let row = i * 3;
        regions.push(Region::from_cells(
            format!("dark-{}", i),
            "dark",
            vec![(row, 0), (row, 1), (row + 1, 0), (row + 1, 1)],
        ));
        regions.push(Region::from_cells(
            format!("bright-{}", i),
            "bright",
            vec![(row, 15), (row, 16), (row + 1, 15), (row + 1, 16)],
        ));
    }
    regions
}

// ---------------------------------------------------------------------------
// Extraction
// ---------------------------------------------------------------------------

#[test]
fn extraction_keeps_group_and_class_with_every_row() {
    let grid = two_tone_grid();
    let extraction = build_sample_table(&grid, &square_regions(), &SamplingConfig::default()).unwrap();
    let table = &extraction.table;

    // 12 regions of 4 cells, one of which is no-data.
    assert_eq!(table.n_rows(), 47);
    assert_eq!(extraction.nodata_cells, 1);
    assert_eq!(table.n_groups(), 12);
    assert_eq!(table.feature_names(), &["b1", "b2"]);
    assert_eq!(table.classes().names(), &["bright", "dark"]);
    for i in 0..table.n_rows() {
        let row = table.row(i);
        assert!(row.group_id.starts_with(row.class_label.as_str()));
        assert!(row.cell.is_some());
    }
}

#[test]
fn polygon_regions_are_rasterized_by_cell_centre() {
    let grid = two_tone_grid();
    // Default transform: cell (r, c) is centred on (c + 0.5, -(r + 0.5)).
    let square = Polygon::new(
        LineString::from(vec![(12.0, -4.0), (15.0, -4.0), (15.0, -7.0), (12.0, -7.0)]),
        vec![],
    );
    let regions = vec![Region::from_polygon("poly", "bright", square)];
    let extraction = build_sample_table(&grid, &regions, &SamplingConfig::default()).unwrap();

    assert_eq!(extraction.table.n_rows(), 9);
    let cells: Vec<_> = (0..9).filter_map(|i| extraction.table.cell_of(i)).collect();
    assert!(cells.iter().all(|&(r, c)| (4..7).contains(&r) && (12..15).contains(&c)));
}

#[test]
fn polygon_regions_follow_the_grid_transform() {
    let grid = two_tone_grid().with_transform(GeoTransform::new(1000.0, 2000.0, 10.0, -10.0));
    // Same 3x3 block of cells as above, in map units of the georeferenced grid.
    let square = Polygon::new(
        LineString::from(vec![(1120.0, 1960.0), (1150.0, 1960.0), (1150.0, 1930.0), (1120.0, 1930.0)]),
        vec![],
    );
    let regions = vec![Region::from_polygon("poly", "bright", square)];
    let extraction = build_sample_table(&grid, &regions, &SamplingConfig::default()).unwrap();

    assert_eq!(extraction.table.n_rows(), 9);
    let cells: Vec<_> = (0..9).filter_map(|i| extraction.table.cell_of(i)).collect();
    assert!(cells.iter().all(|&(r, c)| (4..7).contains(&r) && (12..15).contains(&c)));
}

#[test]
fn regions_without_valid_cells_are_dropped() {
    let grid = two_tone_grid();
    let mut regions = square_regions();
    regions.push(Region::from_cells("outside", "dark", vec![(50, 50)]));
    regions.push(Region::from_cells("nodata", "dark", vec![(0, 0)]));
    let extraction = build_sample_table(&grid, &regions, &SamplingConfig::default()).unwrap();

    assert_eq!(extraction.dropped_regions, vec!["outside".to_string(), "nodata".to_string()]);
    assert_eq!(extraction.table.n_groups(), 12);
}

#[test]
fn sampling_fraction_shrinks_every_group() {
    let grid = two_tone_grid();
    let sampling = SamplingConfig {
        fraction: Some(0.5),
        seed: 9,
    };
    let extraction = build_sample_table(&grid, &square_regions(), &sampling).unwrap();
    for summary in extraction.table.group_summaries() {
        assert!(summary.n_rows == 2, "{:?}", summary);
    }
}

// ---------------------------------------------------------------------------
// Configuration
// ---------------------------------------------------------------------------

#[test]
fn partial_config_falls_back_to_defaults() {
    let json = r#"{
        "cv": { "n_folds": 4, "seed": 11, "coverage_policy": "reduce_folds" },
        "sampling": { "seed": 12 },
        "candidates": [
            { "seed": 7, "MinimumDistance": {} },
            { "seed": 7, "GBDT": { "learning_rate": 0.2, "max_depth": 3, "num_boost_round": 10, "training_optimization_level": 2 } }
        ]
    }"#;
    let config: PipelineConfig = serde_json::from_str(json).unwrap();

    assert_eq!(config.cv.n_folds, 4);
    assert_eq!(config.cv.coverage_policy, CoveragePolicy::ReduceFolds);
    assert_eq!(config.cv.seed, 11);
    assert!(config.cv.parallel);
    assert_eq!(config.sampling, SamplingConfig { fraction: None, seed: 12 });
    assert_eq!(config.predict, PredictConfig::default());
    assert_eq!(config.candidates.len(), 2);
    assert_eq!(config.candidates[0].model_type, ModelType::MinimumDistance {});
    assert!(matches!(config.candidates[1].model_type, ModelType::GBDT { max_depth: 3, .. }));
}

#[test]
fn config_without_seeds_is_rejected() {
    let no_seeds = r#"{ "cv": { "n_folds": 3 }, "sampling": { "fraction": 0.5 } }"#;
    let err = serde_json::from_str::<PipelineConfig>(no_seeds).unwrap_err();
    assert!(err.to_string().contains("seed"), "{}", err);

    let no_sampling_seed = r#"{ "cv": { "n_folds": 3, "seed": 1 }, "sampling": { "fraction": 0.5 } }"#;
    assert!(serde_json::from_str::<PipelineConfig>(no_sampling_seed).is_err());

    let no_cv_section = r#"{ "sampling": { "seed": 1 } }"#;
    assert!(serde_json::from_str::<PipelineConfig>(no_cv_section).is_err());

    let no_candidate_seed = r#"{ "cv": { "seed": 1 }, "sampling": { "seed": 1 },
        "candidates": [ { "MinimumDistance": {} } ] }"#;
    assert!(serde_json::from_str::<PipelineConfig>(no_candidate_seed).is_err());
}

#[test]
fn default_config_survives_json() {
    let config = PipelineConfig::default();
    let json = serde_json::to_string_pretty(&config).unwrap();
    let back: PipelineConfig = serde_json::from_str(&json).unwrap();
    assert_eq!(config, back);
}

// ---------------------------------------------------------------------------
// End to end
// ---------------------------------------------------------------------------

#[test]
fn regions_to_classified_grid() {
    let grid = two_tone_grid();
    let config = PipelineConfig {
        cv: CvConfig {
            n_folds: 3,
            ..CvConfig::default()
        },
        ..PipelineConfig::default()
    };
    let extraction = build_sample_table(&grid, &square_regions(), &config.sampling).unwrap();
    let trainer = CrossValidatedTrainer::with_default_models(config.cv.clone());
    let outcome = trainer.train(&extraction.table, &config.candidates).unwrap();

    let report = CvReport::from_sweep(
        &extraction.table,
        &outcome.assignment,
        &outcome.sweep,
        config.cv.metric.name(),
    )
    .unwrap();
    assert_eq!(report.oof.len(), extraction.table.n_rows());
    assert_eq!(report.sweep.iter().filter(|r| r.selected).count(), 1);

    let dir = tempfile::tempdir().unwrap();
    report.write_to_dir(dir.path()).unwrap();
    for name in ["folds.csv", "sweep.csv", "confusion.csv", "class_accuracy.csv", "oof_predictions.csv", "summary.json"] {
        assert!(dir.path().join(name).exists(), "{} missing", name);
    }

    let predictor = GridPredictor::new(outcome.classifier, config.predict.clone());
    let (classes, summary) = predictor.predict(&grid).unwrap();
    assert_eq!(summary.nodata_cells, 1);
    assert_eq!(classes.get(0, 0), None);
    assert_eq!(classes.label(5, 2), Some("dark"));
    assert_eq!(classes.label(5, 18), Some("bright"));
}
