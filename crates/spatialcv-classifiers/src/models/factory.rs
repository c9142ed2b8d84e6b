use crate::config::{ModelConfig, ModelType};
use crate::models::classifier_trait::ClassifierModel;
use crate::models::gbdt::GBDTClassifier;
use crate::models::maximum_likelihood::MaximumLikelihoodClassifier;
use crate::models::minimum_distance::MinimumDistanceClassifier;

/// Build an unfitted boxed classifier from a `ModelConfig`.
pub fn build_model(params: &ModelConfig) -> Box<dyn ClassifierModel> {
    match &params.model_type {
        ModelType::MinimumDistance {} => Box::new(MinimumDistanceClassifier::new()),
        ModelType::MaximumLikelihood { variance_floor } => {
            Box::new(MaximumLikelihoodClassifier::new(*variance_floor))
        }
        ModelType::GBDT { .. } => Box::new(GBDTClassifier::new(params.clone())),
    }
}
