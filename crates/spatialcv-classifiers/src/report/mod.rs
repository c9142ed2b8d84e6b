//! Tabular cross-validation reports.
//!
//! A [`CvReport`] flattens a sweep into serializable rows; `write_to_dir`
//! puts them next to each other as CSV tables plus a JSON summary.
use std::fs::{self, File};
use std::io::BufWriter;
use std::path::Path;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::cross_validation::{CvRun, SweepResult};
use crate::folds::{FoldAssignment, FoldSummary, FoldWarning};
use crate::sample_table::SampleTable;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FoldRow {
    pub candidate: usize,
    pub fold: usize,
    pub n_train_rows: usize,
    pub n_test_rows: usize,
    pub n_train_groups: usize,
    pub n_test_groups: usize,
    pub score: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SweepRow {
    pub candidate: usize,
    pub model_type: String,
    /// Candidate parameters as JSON
    pub params: String,
    pub complexity: f64,
    pub mean_score: f64,
    pub std_score: f64,
    pub selected: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConfusionRow {
    pub truth: String,
    pub predicted: String,
    pub count: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClassAccuracyRow {
    pub class: String,
    pub producers_accuracy: Option<f64>,
    pub users_accuracy: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OofRow {
    pub row: usize,
    pub group: String,
    pub fold: usize,
    pub truth: String,
    pub predicted: String,
    pub cell_row: Option<usize>,
    pub cell_col: Option<usize>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReportSummary {
    pub metric: String,
    pub n_rows: usize,
    pub n_groups: usize,
    pub classes: Vec<String>,
    pub k: usize,
    pub selected_candidate: usize,
    pub selected_model: String,
    pub mean_score: f64,
    pub std_score: f64,
    pub overall_accuracy: f64,
    pub kappa: f64,
    pub macro_f1: f64,
    pub folds: Vec<FoldSummary>,
    pub warnings: Vec<FoldWarning>,
}

/// Report over every candidate of a sweep; per-row and confusion tables
/// describe the selected candidate.
#[derive(Debug, Clone)]
pub struct CvReport {
    pub summary: ReportSummary,
    pub folds: Vec<FoldRow>,
    pub sweep: Vec<SweepRow>,
    pub confusion: Vec<ConfusionRow>,
    pub class_accuracy: Vec<ClassAccuracyRow>,
    pub oof: Vec<OofRow>,
}

impl CvReport {
    pub fn from_sweep(
        table: &SampleTable,
        assignment: &FoldAssignment,
        sweep: &SweepResult,
        metric: &str,
    ) -> Result<Self> {
        let mut folds = Vec::new();
        let mut sweep_rows = Vec::with_capacity(sweep.runs.len());
        for (candidate, run) in sweep.runs.iter().enumerate() {
            folds.extend(run.folds.iter().map(|f| FoldRow {
                candidate,
                fold: f.fold,
                n_train_rows: f.n_train_rows,
                n_test_rows: f.n_test_rows,
                n_train_groups: f.n_train_groups,
                n_test_groups: f.n_test_groups,
                score: f.score,
            }));
            sweep_rows.push(SweepRow {
                candidate,
                model_type: run.config.model_type.name().to_string(),
                params: serde_json::to_string(&run.config)?,
                complexity: run.config.complexity(),
                mean_score: run.mean_score,
                std_score: run.std_score,
                selected: candidate == sweep.best,
            });
        }

        let best = sweep.best_run();
        let classes = table.classes().names();
        let class_name = |i: usize| classes.get(i).cloned().unwrap_or_default();

        let mut confusion = Vec::new();
        for t in 0..best.confusion.n_classes() {
            for p in 0..best.confusion.n_classes() {
                confusion.push(ConfusionRow {
                    truth: class_name(t),
                    predicted: class_name(p),
                    count: best.confusion.count(t, p),
                });
            }
        }

        let class_accuracy = best
            .confusion
            .producers_accuracy()
            .into_iter()
            .zip(best.confusion.users_accuracy())
            .enumerate()
            .map(|(i, (producers_accuracy, users_accuracy))| ClassAccuracyRow {
                class: class_name(i),
                producers_accuracy,
                users_accuracy,
            })
            .collect();

        let oof = oof_rows(table, best, &class_name);

        let summary = ReportSummary {
            metric: metric.to_string(),
            n_rows: table.n_rows(),
            n_groups: table.n_groups(),
            classes: classes.to_vec(),
            k: assignment.k(),
            selected_candidate: sweep.best,
            selected_model: best.config.model_type.name().to_string(),
            mean_score: best.mean_score,
            std_score: best.std_score,
            overall_accuracy: best.confusion.overall_accuracy(),
            kappa: best.confusion.kappa(),
            macro_f1: best.confusion.macro_f1(),
            folds: assignment.summaries(&table.group_summaries()),
            warnings: assignment.warnings().to_vec(),
        };

        Ok(Self {
            summary,
            folds,
            sweep: sweep_rows,
            confusion,
            class_accuracy,
            oof,
        })
    }

    /// Write `folds.csv`, `sweep.csv`, `confusion.csv`, `class_accuracy.csv`,
    /// `oof_predictions.csv` and `summary.json` into `dir`, creating it if needed.
    pub fn write_to_dir<P: AsRef<Path>>(&self, dir: P) -> Result<()> {
        let dir = dir.as_ref();
        fs::create_dir_all(dir).with_context(|| format!("Failed to create report directory: {}", dir.display()))?;

        write_rows(&dir.join("folds.csv"), &self.folds)?;
        write_rows(&dir.join("sweep.csv"), &self.sweep)?;
        write_rows(&dir.join("confusion.csv"), &self.confusion)?;
        write_rows(&dir.join("class_accuracy.csv"), &self.class_accuracy)?;
        write_rows(&dir.join("oof_predictions.csv"), &self.oof)?;

        let summary_path = dir.join("summary.json");
        let file = File::create(&summary_path)
            .with_context(|| format!("Failed to create {}", summary_path.display()))?;
        serde_json::to_writer_pretty(BufWriter::new(file), &self.summary)?;

        log::info!("Cross-validation report written to {}", dir.display());
        Ok(())
    }
}

fn oof_rows(table: &SampleTable, run: &CvRun, class_name: &dyn Fn(usize) -> String) -> Vec<OofRow> {
    (0..table.n_rows())
        .map(|i| {
            let cell = table.cell_of(i);
            OofRow {
                row: i,
                group: table.group_of(i).to_string(),
                fold: run.oof_fold[i],
                truth: class_name(table.labels()[i]),
                predicted: class_name(run.oof_predictions[i]),
                cell_row: cell.map(|c| c.0),
                cell_col: cell.map(|c| c.1),
            }
        })
        .collect()
}

fn write_rows<T: Serialize>(path: &Path, rows: &[T]) -> Result<()> {
    let file = File::create(path).with_context(|| format!("Failed to create {}", path.display()))?;
    let mut writer = csv::Writer::from_writer(BufWriter::new(file));
    for row in rows {
        writer.serialize(row)?;
    }
    writer.flush()?;
    Ok(())
}
