//! Grouped k-fold cross-validation, hyperparameter sweep and final fit.
//!
//! Every fold cycle trains a fresh model on the rows whose group sits in
//! another fold and predicts the held-out rows. Held-out predictions are
//! written back at their original row index, so the out-of-fold set lines up
//! with the sample table whatever order the folds finish in.
use anyhow::{bail, Result};
use rayon::prelude::*;
use statrs::statistics::Statistics;

use crate::config::{CvConfig, ModelConfig};
use crate::error::SpatialCvError;
use crate::folds::{FoldAssignment, StratifiedGroupFolds};
use crate::math::Array2;
use crate::metrics::ConfusionMatrix;
use crate::models::factory::build_model;
use crate::models::{ClassifierModel, TrainedClassifier};
use crate::sample_table::SampleTable;

/// Outcome of one fold cycle.
#[derive(Debug, Clone)]
pub struct FoldResult {
    pub fold: usize,
    pub n_train_rows: usize,
    pub n_test_rows: usize,
    pub n_train_groups: usize,
    pub n_test_groups: usize,
    pub score: f64,
    pub confusion: ConfusionMatrix,
}

/// Full k-fold run for one hyperparameter candidate.
#[derive(Debug, Clone)]
pub struct CvRun {
    pub config: ModelConfig,
    /// Ordered by fold index
    pub folds: Vec<FoldResult>,
    /// Out-of-fold class index per sample-table row
    pub oof_predictions: Vec<usize>,
    /// Fold that held out each row
    pub oof_fold: Vec<usize>,
    /// Out-of-fold probabilities, when every fold model provides them
    pub oof_proba: Option<Array2<f32>>,
    pub mean_score: f64,
    /// Sample standard deviation of the fold scores (NaN for a single fold)
    pub std_score: f64,
    /// Pooled confusion counts over all held-out rows
    pub confusion: ConfusionMatrix,
}

/// Scores of every candidate and the selected one.
#[derive(Debug, Clone)]
pub struct SweepResult {
    pub runs: Vec<CvRun>,
    pub best: usize,
}

impl SweepResult {
    pub fn best_run(&self) -> &CvRun {
        &self.runs[self.best]
    }
}

/// Everything produced by [`CrossValidatedTrainer::train`].
#[derive(Debug)]
pub struct TrainingOutcome {
    pub classifier: TrainedClassifier,
    pub selected: ModelConfig,
    pub sweep: SweepResult,
    pub assignment: FoldAssignment,
}

struct FoldOutput {
    result: FoldResult,
    test_rows: Vec<usize>,
    predictions: Vec<usize>,
    proba: Option<Array2<f32>>,
}

/// Default builder: the models shipped with this crate.
pub type ModelBuilder = fn(&ModelConfig) -> Box<dyn ClassifierModel>;

/// Runs grouped cross-validation against an opaque model builder.
///
/// The builder must return a fresh, unfitted model for each call.
pub struct CrossValidatedTrainer<F> {
    builder: F,
    cv: CvConfig,
}

impl CrossValidatedTrainer<ModelBuilder> {
    pub fn with_default_models(cv: CvConfig) -> Self {
        Self::new(build_model as ModelBuilder, cv)
    }
}

impl<F> CrossValidatedTrainer<F>
where
    F: Fn(&ModelConfig) -> Box<dyn ClassifierModel> + Sync,
{
    pub fn new(builder: F, cv: CvConfig) -> Self {
        Self { builder, cv }
    }

    pub fn cv_config(&self) -> &CvConfig {
        &self.cv
    }

    /// Assign the table's groups to folds using the configured k, seed and policy.
    pub fn assign_folds(&self, table: &SampleTable) -> Result<FoldAssignment> {
        StratifiedGroupFolds::new(self.cv.n_folds, self.cv.seed)
            .with_policy(self.cv.coverage_policy)
            .assign(&table.group_summaries())
    }

    /// Run every fold cycle for one candidate.
    pub fn cross_validate(
        &self,
        table: &SampleTable,
        assignment: &FoldAssignment,
        config: &ModelConfig,
    ) -> Result<CvRun> {
        let n_rows = table.n_rows();
        if n_rows == 0 {
            return Err(SpatialCvError::EmptySampleTable.into());
        }

        let mut row_fold = Vec::with_capacity(n_rows);
        for i in 0..n_rows {
            let group = table.group_of(i);
            match assignment.fold_of(group) {
                Some(f) => row_fold.push(f),
                None => bail!("Group '{}' has no fold assignment", group),
            }
        }

        let k = assignment.k();
        let outputs: Vec<FoldOutput> = if self.cv.parallel {
            (0..k)
                .into_par_iter()
                .map(|fold| self.run_fold(table, &row_fold, fold, config))
                .collect::<Result<Vec<_>>>()?
        } else {
            (0..k)
                .map(|fold| self.run_fold(table, &row_fold, fold, config))
                .collect::<Result<Vec<_>>>()?
        };

        let n_classes = table.classes().len();
        let mut oof_predictions = vec![0usize; n_rows];
        let mut oof_fold = vec![usize::MAX; n_rows];
        let mut oof_proba = outputs
            .iter()
            .all(|o| o.proba.is_some())
            .then(|| Array2::from_elem((n_rows, n_classes), 0.0f32));
        let mut confusion = ConfusionMatrix::new(n_classes);
        let mut folds = Vec::with_capacity(k);

        for output in outputs {
            for (j, &row) in output.test_rows.iter().enumerate() {
                oof_predictions[row] = output.predictions[j];
                oof_fold[row] = output.result.fold;
            }
            if let (Some(all), Some(fold_proba)) = (oof_proba.as_mut(), output.proba.as_ref()) {
                for (j, &row) in output.test_rows.iter().enumerate() {
                    all.row_slice_mut(row).copy_from_slice(fold_proba.row_slice(j));
                }
            }
            confusion.merge(&output.result.confusion);
            folds.push(output.result);
        }
        debug_assert!(oof_fold.iter().all(|&f| f < k));

        let scores: Vec<f64> = folds.iter().map(|f| f.score).collect();
        let mean_score = scores.iter().mean();
        let std_score = scores.iter().std_dev();

        log::info!(
            "{} (seed {}): mean {} = {:.4} (sd {:.4}) over {} folds",
            config.model_type.name(),
            config.seed,
            self.cv.metric.name(),
            mean_score,
            std_score,
            k
        );

        Ok(CvRun {
            config: config.clone(),
            folds,
            oof_predictions,
            oof_fold,
            oof_proba,
            mean_score,
            std_score,
            confusion,
        })
    }

    fn run_fold(
        &self,
        table: &SampleTable,
        row_fold: &[usize],
        fold: usize,
        config: &ModelConfig,
    ) -> Result<FoldOutput> {
        let (test_rows, train_rows): (Vec<usize>, Vec<usize>) =
            (0..row_fold.len()).partition(|&i| row_fold[i] == fold);
        if test_rows.is_empty() || train_rows.is_empty() {
            bail!(
                "Fold {} has {} training and {} held-out rows; both must be non-empty",
                fold,
                train_rows.len(),
                test_rows.len()
            );
        }

        let labels = table.labels();
        let n_classes = table.classes().len();
        let x_train = table.x().select_rows(&train_rows);
        let y_train: Vec<usize> = train_rows.iter().map(|&i| labels[i]).collect();
        let x_test = table.x().select_rows(&test_rows);
        let y_test: Vec<usize> = test_rows.iter().map(|&i| labels[i]).collect();

        let mut model = (self.builder)(config);
        model.fit(&x_train, &y_train, n_classes, config.seed)?;
        let predictions = model.predict(&x_test)?;
        if predictions.len() != test_rows.len() {
            bail!(
                "Model returned {} predictions for {} held-out rows",
                predictions.len(),
                test_rows.len()
            );
        }
        let proba = model
            .predict_proba(&x_test)?
            .filter(|p| p.shape() == (test_rows.len(), n_classes));

        let confusion = ConfusionMatrix::from_labels(&y_test, &predictions, n_classes)?;
        let score = self.cv.metric.evaluate(&confusion);

        let count_groups = |rows: &[usize]| {
            let mut groups: Vec<&str> = rows.iter().map(|&i| table.group_of(i)).collect();
            groups.sort_unstable();
            groups.dedup();
            groups.len()
        };

        log::debug!(
            "Fold {}: {} training rows, {} held-out rows, {} = {:.4}",
            fold,
            train_rows.len(),
            test_rows.len(),
            self.cv.metric.name(),
            score
        );

        Ok(FoldOutput {
            result: FoldResult {
                fold,
                n_train_rows: train_rows.len(),
                n_test_rows: test_rows.len(),
                n_train_groups: count_groups(&train_rows),
                n_test_groups: count_groups(&test_rows),
                score,
                confusion,
            },
            test_rows,
            predictions,
            proba,
        })
    }

    /// Cross-validate every candidate and pick the best mean score.
    ///
    /// Ties go to the lowest complexity, then to the earliest candidate.
    pub fn sweep(
        &self,
        table: &SampleTable,
        assignment: &FoldAssignment,
        candidates: &[ModelConfig],
    ) -> Result<SweepResult> {
        if candidates.is_empty() {
            return Err(SpatialCvError::NoCandidates.into());
        }
        let runs = candidates
            .iter()
            .map(|config| self.cross_validate(table, assignment, config))
            .collect::<Result<Vec<_>>>()?;
        let best = select_best(&runs);
        log::info!(
            "Selected candidate {} ({}) with mean {} {:.4}",
            best,
            runs[best].config.model_type.name(),
            self.cv.metric.name(),
            runs[best].mean_score
        );
        Ok(SweepResult { runs, best })
    }

    /// Fit one model on the whole table (no holdout).
    pub fn fit_final(&self, table: &SampleTable, config: &ModelConfig) -> Result<TrainedClassifier> {
        if table.n_rows() == 0 {
            return Err(SpatialCvError::EmptySampleTable.into());
        }
        let mut model = (self.builder)(config);
        model.fit(table.x(), table.labels(), table.classes().len(), config.seed)?;
        log::info!(
            "Fitted final {} model on {} rows",
            model.name(),
            table.n_rows()
        );
        TrainedClassifier::new(
            model,
            table.feature_names().to_vec(),
            table.classes().names().to_vec(),
        )
    }

    /// Assign folds, sweep the candidates, and fit the selected one on everything.
    pub fn train(&self, table: &SampleTable, candidates: &[ModelConfig]) -> Result<TrainingOutcome> {
        table.log_summary();
        let assignment = self.assign_folds(table)?;
        let sweep = self.sweep(table, &assignment, candidates)?;
        let selected = sweep.best_run().config.clone();
        let classifier = self.fit_final(table, &selected)?;
        Ok(TrainingOutcome {
            classifier,
            selected,
            sweep,
            assignment,
        })
    }
}

fn select_best(runs: &[CvRun]) -> usize {
    let key = |r: &CvRun| if r.mean_score.is_nan() { f64::NEG_INFINITY } else { r.mean_score };
    let mut best = 0;
    for (i, run) in runs.iter().enumerate().skip(1) {
        let (a, b) = (key(run), key(&runs[best]));
        let better = if (a - b).abs() <= 1e-12 || (a == b) {
            run.config.complexity() < runs[best].config.complexity()
        } else {
            a > b
        };
        if better {
            best = i;
        }
    }
    best
}
