//! Agreement metrics between reference and predicted class labels.
use anyhow::Result;
use serde::{Deserialize, Serialize};

use crate::error::SpatialCvError;

/// Confusion counts: `counts[truth][predicted]`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConfusionMatrix {
    n_classes: usize,
    counts: Vec<Vec<usize>>,
}

impl ConfusionMatrix {
    pub fn new(n_classes: usize) -> Self {
        Self {
            n_classes,
            counts: vec![vec![0; n_classes]; n_classes],
        }
    }

    pub fn from_labels(truth: &[usize], predicted: &[usize], n_classes: usize) -> Result<Self> {
        if truth.len() != predicted.len() {
            return Err(SpatialCvError::ShapeMismatch(format!(
                "{} reference labels vs {} predictions",
                truth.len(),
                predicted.len()
            ))
            .into());
        }
        let mut cm = Self::new(n_classes);
        for (&t, &p) in truth.iter().zip(predicted) {
            cm.add(t, p)?;
        }
        Ok(cm)
    }

    pub fn add(&mut self, truth: usize, predicted: usize) -> Result<()> {
        if truth >= self.n_classes || predicted >= self.n_classes {
            return Err(SpatialCvError::UnknownClass(format!("#{}", truth.max(predicted))).into());
        }
        self.counts[truth][predicted] += 1;
        Ok(())
    }

    /// Add another matrix of the same size.
    pub fn merge(&mut self, other: &ConfusionMatrix) {
        for (row, other_row) in self.counts.iter_mut().zip(&other.counts) {
            for (c, o) in row.iter_mut().zip(other_row) {
                *c += o;
            }
        }
    }

    pub fn n_classes(&self) -> usize {
        self.n_classes
    }

    pub fn count(&self, truth: usize, predicted: usize) -> usize {
        self.counts[truth][predicted]
    }

    pub fn total(&self) -> usize {
        self.counts.iter().flatten().sum()
    }

    fn correct(&self) -> usize {
        (0..self.n_classes).map(|i| self.counts[i][i]).sum()
    }

    fn row_total(&self, class: usize) -> usize {
        self.counts[class].iter().sum()
    }

    fn col_total(&self, class: usize) -> usize {
        self.counts.iter().map(|row| row[class]).sum()
    }

    /// Fraction of rows predicted correctly; 0 for an empty matrix.
    pub fn overall_accuracy(&self) -> f64 {
        let n = self.total();
        if n == 0 {
            return 0.0;
        }
        self.correct() as f64 / n as f64
    }

    /// Cohen's kappa: agreement corrected for chance.
    ///
    /// When expected agreement is already 1 (a single class everywhere) the
    /// result is 1 for perfect agreement and 0 otherwise.
    pub fn kappa(&self) -> f64 {
        let n = self.total();
        if n == 0 {
            return 0.0;
        }
        let n = n as f64;
        let po = self.correct() as f64 / n;
        let pe: f64 = (0..self.n_classes)
            .map(|i| (self.row_total(i) as f64 / n) * (self.col_total(i) as f64 / n))
            .sum();
        if (1.0 - pe).abs() < f64::EPSILON {
            return if (po - 1.0).abs() < f64::EPSILON { 1.0 } else { 0.0 };
        }
        (po - pe) / (1.0 - pe)
    }

    /// Producer's accuracy (recall) per class; `None` for classes absent from the reference.
    pub fn producers_accuracy(&self) -> Vec<Option<f64>> {
        (0..self.n_classes)
            .map(|i| {
                let total = self.row_total(i);
                (total > 0).then(|| self.counts[i][i] as f64 / total as f64)
            })
            .collect()
    }

    /// User's accuracy (precision) per class; `None` for classes never predicted.
    pub fn users_accuracy(&self) -> Vec<Option<f64>> {
        (0..self.n_classes)
            .map(|i| {
                let total = self.col_total(i);
                (total > 0).then(|| self.counts[i][i] as f64 / total as f64)
            })
            .collect()
    }

    /// Unweighted mean F1 over classes present in the reference or the predictions.
    pub fn macro_f1(&self) -> f64 {
        let producers = self.producers_accuracy();
        let users = self.users_accuracy();
        let mut sum = 0.0;
        let mut n = 0usize;
        for (p, u) in producers.into_iter().zip(users) {
            match (p, u) {
                (None, None) => continue,
                (Some(r), Some(pr)) if r + pr > 0.0 => sum += 2.0 * r * pr / (r + pr),
                _ => {}
            }
            n += 1;
        }
        if n == 0 {
            0.0
        } else {
            sum / n as f64
        }
    }
}

/// Scalar agreement score used for fold evaluation and candidate selection.
/// Higher is better for every variant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MetricKind {
    #[default]
    Kappa,
    OverallAccuracy,
    MacroF1,
}

impl MetricKind {
    pub fn evaluate(&self, cm: &ConfusionMatrix) -> f64 {
        match self {
            MetricKind::Kappa => cm.kappa(),
            MetricKind::OverallAccuracy => cm.overall_accuracy(),
            MetricKind::MacroF1 => cm.macro_f1(),
        }
    }

    pub fn score(&self, truth: &[usize], predicted: &[usize], n_classes: usize) -> Result<f64> {
        let cm = ConfusionMatrix::from_labels(truth, predicted, n_classes)?;
        Ok(self.evaluate(&cm))
    }

    pub fn name(&self) -> &'static str {
        match self {
            MetricKind::Kappa => "kappa",
            MetricKind::OverallAccuracy => "overall_accuracy",
            MetricKind::MacroF1 => "macro_f1",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn perfect_agreement() {
        let cm = ConfusionMatrix::from_labels(&[0, 1, 2, 1], &[0, 1, 2, 1], 3).unwrap();
        assert_eq!(cm.overall_accuracy(), 1.0);
        assert!((cm.kappa() - 1.0).abs() < 1e-12);
        assert!((cm.macro_f1() - 1.0).abs() < 1e-12);
    }

    #[test]
    fn kappa_matches_hand_computation() {
        // truth: 0 0 0 1 1 1 ; predicted: 0 0 1 1 1 0
        let cm = ConfusionMatrix::from_labels(&[0, 0, 0, 1, 1, 1], &[0, 0, 1, 1, 1, 0], 2).unwrap();
        // po = 4/6, pe = 0.5 * 0.5 + 0.5 * 0.5 = 0.5
        let expected = (4.0 / 6.0 - 0.5) / 0.5;
        assert!((cm.kappa() - expected).abs() < 1e-12);
    }

    #[test]
    fn constant_predictions_have_zero_kappa() {
        let cm = ConfusionMatrix::from_labels(&[0, 1, 0, 1], &[0, 0, 0, 0], 2).unwrap();
        assert!(cm.kappa().abs() < 1e-12);
        assert_eq!(cm.users_accuracy()[1], None);
        assert_eq!(cm.producers_accuracy()[1], Some(0.0));
    }

    #[test]
    fn out_of_range_label_is_rejected() {
        assert!(ConfusionMatrix::from_labels(&[0, 3], &[0, 1], 2).is_err());
        assert!(ConfusionMatrix::from_labels(&[0], &[0, 1], 2).is_err());
    }

    #[test]
    fn merge_adds_counts() {
        let mut a = ConfusionMatrix::from_labels(&[0, 1], &[0, 1], 2).unwrap();
        let b = ConfusionMatrix::from_labels(&[1], &[0], 2).unwrap();
        a.merge(&b);
        assert_eq!(a.total(), 3);
        assert_eq!(a.count(1, 0), 1);
    }
}
