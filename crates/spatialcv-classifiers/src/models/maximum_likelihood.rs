//! Gaussian maximum likelihood classifier.
//!
//! Each class is modelled as an independent normal distribution per band
//! (diagonal covariance) with equal priors. A row is assigned to the class
//! with the highest log-likelihood:
//!
//! `ln P(x|c) = Σ_b [ -ln σ_cb - ½ ln 2π - (x_b - μ_cb)² / (2σ_cb²) ]`
use anyhow::Result;

use crate::math::Array2;
use crate::models::classifier_trait::ClassifierModel;
use crate::models::minimum_distance::{check_prediction_input, check_training_input, class_means};

#[derive(Debug, Clone)]
struct ClassSignature {
    mean: Vec<f32>,
    variance: Vec<f32>,
    /// Σ_b (-ln σ_b - ½ ln 2π)
    log_const: f64,
}

#[derive(Debug, Clone)]
pub struct MaximumLikelihoodClassifier {
    variance_floor: f32,
    n_classes: usize,
    signatures: Vec<Option<ClassSignature>>,
    n_features: Option<usize>,
}

impl MaximumLikelihoodClassifier {
    pub fn new(variance_floor: f32) -> Self {
        Self {
            variance_floor: variance_floor.max(f32::MIN_POSITIVE),
            n_classes: 0,
            signatures: Vec::new(),
            n_features: None,
        }
    }

    fn log_likelihoods(&self, row: &[f32]) -> Vec<f64> {
        self.signatures
            .iter()
            .map(|sig| match sig {
                None => f64::NEG_INFINITY,
                Some(sig) => {
                    let mut ll = sig.log_const;
                    for ((&v, &m), &var) in row.iter().zip(&sig.mean).zip(&sig.variance) {
                        let d = (v - m) as f64;
                        ll -= d * d / (2.0 * var as f64);
                    }
                    ll
                }
            })
            .collect()
    }
}

impl ClassifierModel for MaximumLikelihoodClassifier {
    fn fit(&mut self, x: &Array2<f32>, y: &[usize], n_classes: usize, _seed: u64) -> Result<()> {
        check_training_input(x, y, n_classes)?;
        let means = class_means(x, y, n_classes);
        let n_features = x.ncols();

        let mut sq = vec![vec![0.0f64; n_features]; n_classes];
        let mut counts = vec![0usize; n_classes];
        for (row, &class) in x.rows().zip(y) {
            counts[class] += 1;
            if let Some(mean) = &means[class] {
                for ((s, &v), &m) in sq[class].iter_mut().zip(row).zip(mean) {
                    let d = (v - m) as f64;
                    *s += d * d;
                }
            }
        }

        let half_ln_2pi = 0.5 * (2.0 * std::f64::consts::PI).ln();
        self.signatures = means
            .into_iter()
            .zip(sq)
            .zip(counts)
            .map(|((mean, sq), n)| {
                mean.map(|mean| {
                    let variance: Vec<f32> = sq
                        .iter()
                        .map(|s| ((s / n as f64) as f32).max(self.variance_floor))
                        .collect();
                    let log_const = variance
                        .iter()
                        .map(|&var| -0.5 * (var as f64).ln() - half_ln_2pi)
                        .sum();
                    ClassSignature {
                        mean,
                        variance,
                        log_const,
                    }
                })
            })
            .collect();
        self.n_classes = n_classes;
        self.n_features = Some(n_features);
        Ok(())
    }

    fn predict(&self, x: &Array2<f32>) -> Result<Vec<usize>> {
        check_prediction_input(x, self.n_features)?;
        Ok(x.rows()
            .map(|row| {
                let ll = self.log_likelihoods(row);
                let mut best = 0;
                for (i, &v) in ll.iter().enumerate() {
                    if v > ll[best] {
                        best = i;
                    }
                }
                best
            })
            .collect())
    }

    /// Posterior under equal priors (softmax of the log-likelihoods).
    fn predict_proba(&self, x: &Array2<f32>) -> Result<Option<Array2<f32>>> {
        check_prediction_input(x, self.n_features)?;
        let mut out = Array2::from_elem((x.nrows(), self.n_classes), 0.0f32);
        for (i, row) in x.rows().enumerate() {
            let ll = self.log_likelihoods(row);
            let max = ll.iter().copied().fold(f64::NEG_INFINITY, f64::max);
            if !max.is_finite() {
                continue;
            }
            let exp: Vec<f64> = ll.iter().map(|&v| (v - max).exp()).collect();
            let total: f64 = exp.iter().sum();
            for (p, e) in out.row_slice_mut(i).iter_mut().zip(exp) {
                *p = (e / total) as f32;
            }
        }
        Ok(Some(out))
    }

    fn n_features(&self) -> Option<usize> {
        self.n_features
    }

    fn name(&self) -> &str {
        "maximum_likelihood"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_maximum_likelihood_uses_variance() {
        // Class 0 is narrow around 0, class 1 is wide around 3.
        let x = Array2::from_shape_vec(
            (8, 1),
            vec![-0.1, 0.0, 0.1, 0.0, -1.0, 3.0, 7.0, 4.0],
        )
        .unwrap();
        let y = vec![0, 0, 0, 0, 1, 1, 1, 1];
        let mut classifier = MaximumLikelihoodClassifier::new(1e-6);
        classifier.fit(&x, &y, 2, 0).unwrap();

        // 1.0 is closer to class 0's mean but far outside its spread.
        let test = Array2::from_shape_vec((2, 1), vec![0.05, 1.0]).unwrap();
        assert_eq!(classifier.predict(&test).unwrap(), vec![0, 1]);

        let proba = classifier.predict_proba(&test).unwrap().unwrap();
        for row in proba.rows() {
            let s: f32 = row.iter().sum();
            assert!((s - 1.0).abs() < 1e-5);
        }
    }
}
