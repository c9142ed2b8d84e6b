//! Minimum distance (nearest centroid) classifier.
//!
//! Assigns each row to the class whose mean predictor vector is nearest in
//! Euclidean distance. Simple and fast but does not account for class
//! variance.
use anyhow::Result;

use crate::error::SpatialCvError;
use crate::math::Array2;
use crate::models::classifier_trait::ClassifierModel;

#[derive(Debug, Clone, Default)]
pub struct MinimumDistanceClassifier {
    /// Centroid per class; `None` for classes without training rows.
    centroids: Vec<Option<Vec<f32>>>,
    n_features: Option<usize>,
}

impl MinimumDistanceClassifier {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn centroids(&self) -> &[Option<Vec<f32>>] {
        &self.centroids
    }
}

/// Per-class column means; `None` for classes without rows.
pub(crate) fn class_means(x: &Array2<f32>, y: &[usize], n_classes: usize) -> Vec<Option<Vec<f32>>> {
    let n_features = x.ncols();
    let mut sums = vec![vec![0.0f64; n_features]; n_classes];
    let mut counts = vec![0usize; n_classes];
    for (row, &class) in x.rows().zip(y) {
        counts[class] += 1;
        for (s, &v) in sums[class].iter_mut().zip(row) {
            *s += v as f64;
        }
    }
    sums.into_iter()
        .zip(counts)
        .map(|(s, n)| (n > 0).then(|| s.into_iter().map(|v| (v / n as f64) as f32).collect()))
        .collect()
}

pub(crate) fn check_training_input(x: &Array2<f32>, y: &[usize], n_classes: usize) -> Result<()> {
    if x.is_empty() {
        return Err(SpatialCvError::EmptySampleTable.into());
    }
    if x.nrows() != y.len() {
        return Err(SpatialCvError::ShapeMismatch(format!(
            "{} rows vs {} labels",
            x.nrows(),
            y.len()
        ))
        .into());
    }
    if let Some(&bad) = y.iter().find(|&&c| c >= n_classes) {
        return Err(SpatialCvError::UnknownClass(format!("#{}", bad)).into());
    }
    Ok(())
}

pub(crate) fn check_prediction_input(x: &Array2<f32>, n_features: Option<usize>) -> Result<usize> {
    let expected = n_features.ok_or(SpatialCvError::ModelNotFitted)?;
    if x.ncols() != expected {
        return Err(SpatialCvError::DimensionMismatch {
            expected,
            found: x.ncols(),
        }
        .into());
    }
    Ok(expected)
}

impl ClassifierModel for MinimumDistanceClassifier {
    fn fit(&mut self, x: &Array2<f32>, y: &[usize], n_classes: usize, _seed: u64) -> Result<()> {
        check_training_input(x, y, n_classes)?;
        self.centroids = class_means(x, y, n_classes);
        self.n_features = Some(x.ncols());
        Ok(())
    }

    fn predict(&self, x: &Array2<f32>) -> Result<Vec<usize>> {
        check_prediction_input(x, self.n_features)?;
        Ok(x.rows()
            .map(|row| {
                let mut best_dist = f32::INFINITY;
                let mut best_class = 0;
                for (class, centroid) in self.centroids.iter().enumerate() {
                    let Some(centroid) = centroid else { continue };
                    let dist: f32 = row.iter().zip(centroid).map(|(a, b)| (a - b) * (a - b)).sum();
                    if dist < best_dist {
                        best_dist = dist;
                        best_class = class;
                    }
                }
                best_class
            })
            .collect())
    }

    fn n_features(&self) -> Option<usize> {
        self.n_features
    }

    fn name(&self) -> &str {
        "minimum_distance"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_minimum_distance_classifier() {
        let x = Array2::from_shape_vec((4, 2), vec![0.0, 0.0, 0.2, 0.1, 5.0, 5.0, 5.2, 4.9]).unwrap();
        let y = vec![0, 0, 2, 2];

        let mut classifier = MinimumDistanceClassifier::new();
        classifier.fit(&x, &y, 3, 0).unwrap();
        assert!(classifier.centroids()[1].is_none());

        let test = Array2::from_shape_vec((2, 2), vec![0.5, 0.5, 4.0, 4.0]).unwrap();
        assert_eq!(classifier.predict(&test).unwrap(), vec![0, 2]);
    }

    #[test]
    fn predict_before_fit_fails() {
        let classifier = MinimumDistanceClassifier::new();
        let x = Array2::from_shape_vec((1, 1), vec![0.0]).unwrap();
        assert!(classifier.predict(&x).is_err());
    }
}
