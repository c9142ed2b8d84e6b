use anyhow::{bail, Result};
use gbdt::config::Config;
use gbdt::decision_tree::{Data, DataVec};
use gbdt::gradient_boost::GBDT;

use crate::config::{ModelConfig, ModelType};
use crate::math::Array2;
use crate::models::classifier_trait::ClassifierModel;
use crate::models::minimum_distance::{check_prediction_input, check_training_input};

/// One binary booster per class, or a constant when the class is absent
/// from (or is the whole of) the training rows.
enum OneVsRest {
    Booster(GBDT),
    Constant(f32),
}

/// Gradient Boosting Decision Tree (GBDT) classifier, one-vs-rest.
///
/// Each class gets a `LogLikelyhood` booster trained on +1 (class) / -1
/// (rest) labels; the predicted class is the one with the highest
/// probability. Row and feature sampling stay at 1.0, so fitting is
/// deterministic.
pub struct GBDTClassifier {
    models: Vec<OneVsRest>,
    params: ModelConfig,
    n_features: Option<usize>,
}

impl GBDTClassifier {
    pub fn new(params: ModelConfig) -> Self {
        GBDTClassifier {
            models: Vec::new(),
            params,
            n_features: None,
        }
    }

    fn config(&self, feature_size: usize) -> Result<Config> {
        match &self.params.model_type {
            ModelType::GBDT {
                learning_rate,
                max_depth,
                num_boost_round,
                training_optimization_level,
            } => {
                if *num_boost_round == 0 || *max_depth == 0 {
                    bail!("GBDT needs num_boost_round >= 1 and max_depth >= 1");
                }
                let mut config = Config::new();
                config.set_feature_size(feature_size);
                config.set_shrinkage(*learning_rate);
                config.set_max_depth(*max_depth);
                config.set_iterations(*num_boost_round as usize);
                config.set_debug(false);
                config.set_training_optimization_level(*training_optimization_level);
                config.set_loss("LogLikelyhood");
                Ok(config)
            }
            other => bail!("Expected ModelType::GBDT params, got {:?}", other),
        }
    }

    fn to_test_data(x: &Array2<f32>) -> DataVec {
        x.rows()
            .map(|row| Data::new_test_data(row.to_vec(), None))
            .collect()
    }

    fn class_probabilities(&self, x: &Array2<f32>) -> Array2<f32> {
        let n_classes = self.models.len();
        let mut out = Array2::from_elem((x.nrows(), n_classes), 0.0f32);
        if x.is_empty() {
            return out;
        }
        let test_x = Self::to_test_data(x);
        for (class, model) in self.models.iter().enumerate() {
            match model {
                OneVsRest::Booster(gbdt) => {
                    for (i, p) in gbdt.predict(&test_x).into_iter().enumerate() {
                        out[(i, class)] = p;
                    }
                }
                OneVsRest::Constant(p) => {
                    for i in 0..x.nrows() {
                        out[(i, class)] = *p;
                    }
                }
            }
        }
        out
    }
}

impl ClassifierModel for GBDTClassifier {
    fn fit(&mut self, x: &Array2<f32>, y: &[usize], n_classes: usize, _seed: u64) -> Result<()> {
        check_training_input(x, y, n_classes)?;
        let config = self.config(x.ncols())?;

        let mut models = Vec::with_capacity(n_classes);
        for class in 0..n_classes {
            let positives = y.iter().filter(|&&c| c == class).count();
            if positives == 0 {
                models.push(OneVsRest::Constant(0.0));
                continue;
            }
            if positives == y.len() {
                models.push(OneVsRest::Constant(1.0));
                continue;
            }

            let mut train_x: DataVec = x
                .rows()
                .zip(y)
                .map(|(row, &c)| {
                    let label = if c == class { 1.0 } else { -1.0 };
                    Data::new_training_data(row.to_vec(), 1.0, label, None)
                })
                .collect();

            let mut gbdt = GBDT::new(&config);
            gbdt.fit(&mut train_x);
            log::trace!("Fitted one-vs-rest booster for class {} ({} positives)", class, positives);
            models.push(OneVsRest::Booster(gbdt));
        }

        self.models = models;
        self.n_features = Some(x.ncols());
        Ok(())
    }

    fn predict(&self, x: &Array2<f32>) -> Result<Vec<usize>> {
        check_prediction_input(x, self.n_features)?;
        Ok(self.class_probabilities(x).argmax_rows())
    }

    /// One-vs-rest probabilities renormalised to sum to one per row.
    fn predict_proba(&self, x: &Array2<f32>) -> Result<Option<Array2<f32>>> {
        check_prediction_input(x, self.n_features)?;
        let mut proba = self.class_probabilities(x);
        for i in 0..proba.nrows() {
            let row = proba.row_slice_mut(i);
            let total: f32 = row.iter().sum();
            if total > 0.0 {
                row.iter_mut().for_each(|p| *p /= total);
            }
        }
        Ok(Some(proba))
    }

    fn n_features(&self) -> Option<usize> {
        self.n_features
    }

    fn name(&self) -> &str {
        "gbdt"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_gbdt_classifier() {
        // Two well separated classes along the first band.
        let x = Array2::from_shape_vec(
            (10, 2),
            vec![
                0.1, 1.0, 0.2, -1.0, 0.3, 1.0, 0.15, -1.0, 0.25, 1.0, //
                2.1, 1.0, 2.2, -1.0, 2.3, 1.0, 2.15, -1.0, 2.25, 1.0,
            ],
        )
        .unwrap();
        let y = vec![0, 0, 0, 0, 0, 1, 1, 1, 1, 1];

        let params = ModelConfig::new(
            1,
            ModelType::GBDT {
                learning_rate: 0.1,
                max_depth: 3,
                num_boost_round: 10,
                training_optimization_level: 2,
            },
        );
        let mut classifier = GBDTClassifier::new(params);
        classifier.fit(&x, &y, 2, 1).unwrap();

        let predictions = classifier.predict(&x).unwrap();
        assert_eq!(predictions, y);
        let proba = classifier.predict_proba(&x).unwrap().unwrap();
        assert_eq!(proba.shape(), (10, 2));
    }

    #[test]
    fn wrong_params_are_rejected() {
        let mut classifier = GBDTClassifier::new(ModelConfig::default());
        let x = Array2::from_shape_vec((2, 1), vec![0.0, 1.0]).unwrap();
        assert!(classifier.fit(&x, &[0, 1], 2, 0).is_err());
    }
}
