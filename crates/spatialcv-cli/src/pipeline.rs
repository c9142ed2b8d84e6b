//! Cell-table driven runs of fold assignment, cross-validation and grid
//! classification.
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};

use spatialcv_classifiers::config::PipelineConfig;
use spatialcv_classifiers::cross_validation::{CrossValidatedTrainer, SweepResult};
use spatialcv_classifiers::folds::FoldAssignment;
use spatialcv_classifiers::io::{read_grid_csv, read_regions_csv, write_class_grid_csv, write_fold_assignment_csv};
use spatialcv_classifiers::predict::{GridPredictor, PredictionSummary};
use spatialcv_classifiers::raster::FeatureGrid;
use spatialcv_classifiers::report::CvReport;
use spatialcv_classifiers::sample_table::{build_sample_table, Extraction};

/// Input tables shared by every subcommand.
#[derive(Debug, Clone)]
pub struct PipelineInputs {
    /// `row,col,<band>...` predictor table
    pub grid: PathBuf,
    /// `group,class,row,col` labeled cells
    pub regions: PathBuf,
    pub nodata: Option<f32>,
}

/// Load a pipeline configuration from a JSON file. Missing fields take their defaults.
pub fn load_pipeline_config<P: AsRef<Path>>(path: P) -> Result<PipelineConfig> {
    let content = std::fs::read_to_string(&path)
        .with_context(|| format!("Failed to read config: {}", path.as_ref().display()))?;
    let config: PipelineConfig = serde_json::from_str(&content)
        .with_context(|| format!("Failed to parse config: {}", path.as_ref().display()))?;
    Ok(config)
}

fn load(inputs: &PipelineInputs, config: &PipelineConfig) -> Result<(FeatureGrid, Extraction)> {
    let grid = read_grid_csv(&inputs.grid, inputs.nodata)?;
    let regions = read_regions_csv(&inputs.regions)?;
    let extraction = build_sample_table(&grid, &regions, &config.sampling)?;
    if !extraction.dropped_regions.is_empty() {
        log::warn!(
            "Regions without valid cells: {}",
            extraction.dropped_regions.join(", ")
        );
    }
    Ok((grid, extraction))
}

/// Assign regions to folds and write the `group,fold` table.
pub fn run_folds(inputs: &PipelineInputs, config: &PipelineConfig, output: &Path) -> Result<FoldAssignment> {
    let (_, extraction) = load(inputs, config)?;
    let trainer = CrossValidatedTrainer::with_default_models(config.cv.clone());
    let assignment = trainer.assign_folds(&extraction.table)?;

    for summary in assignment.summaries(&extraction.table.group_summaries()) {
        log::info!(
            "Fold {}: {} groups, {} rows, classes {:?}",
            summary.fold,
            summary.n_groups,
            summary.n_rows,
            summary.class_groups
        );
    }
    write_fold_assignment_csv(&assignment, output)?;
    Ok(assignment)
}

/// Cross-validate every candidate and write the report directory.
pub fn run_crossval(inputs: &PipelineInputs, config: &PipelineConfig, report_dir: &Path) -> Result<SweepResult> {
    let (_, extraction) = load(inputs, config)?;
    let table = &extraction.table;
    table.log_summary();

    let trainer = CrossValidatedTrainer::with_default_models(config.cv.clone());
    let assignment = trainer.assign_folds(table)?;
    let sweep = trainer.sweep(table, &assignment, &config.candidates)?;

    CvReport::from_sweep(table, &assignment, &sweep, config.cv.metric.name())?.write_to_dir(report_dir)?;
    Ok(sweep)
}

/// Select a model by cross-validation, fit it on every row and classify the grid.
///
/// The cross-validation report is written as well when `report_dir` is given.
pub fn run_classify(
    inputs: &PipelineInputs,
    config: &PipelineConfig,
    output: &Path,
    report_dir: Option<&Path>,
) -> Result<PredictionSummary> {
    let (grid, extraction) = load(inputs, config)?;
    let trainer = CrossValidatedTrainer::with_default_models(config.cv.clone());
    let outcome = trainer.train(&extraction.table, &config.candidates)?;

    if let Some(dir) = report_dir {
        CvReport::from_sweep(
            &extraction.table,
            &outcome.assignment,
            &outcome.sweep,
            config.cv.metric.name(),
        )?
        .write_to_dir(dir)?;
    }

    let predictor = GridPredictor::new(outcome.classifier, config.predict.clone());
    let (classes, summary) = predictor.predict(&grid)?;
    write_class_grid_csv(&classes, output)?;
    for (class, n) in &summary.class_counts {
        log::info!("{}: {} cells", class, n);
    }
    Ok(summary)
}
