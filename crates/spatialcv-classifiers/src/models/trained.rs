use anyhow::Result;

use crate::error::SpatialCvError;
use crate::models::classifier_trait::ClassifierModel;

/// A fitted model together with the band and class names it was trained on.
///
/// This is the deployable artifact handed to the grid predictor.
pub struct TrainedClassifier {
    model: Box<dyn ClassifierModel>,
    feature_names: Vec<String>,
    class_names: Vec<String>,
}

impl TrainedClassifier {
    /// Fails when the model was not fitted on `feature_names.len()` bands.
    pub fn new(model: Box<dyn ClassifierModel>, feature_names: Vec<String>, class_names: Vec<String>) -> Result<Self> {
        let fitted = model.n_features().ok_or(SpatialCvError::ModelNotFitted)?;
        if fitted != feature_names.len() {
            return Err(SpatialCvError::DimensionMismatch {
                expected: feature_names.len(),
                found: fitted,
            }
            .into());
        }
        Ok(Self {
            model,
            feature_names,
            class_names,
        })
    }

    pub fn model(&self) -> &dyn ClassifierModel {
        self.model.as_ref()
    }

    pub fn feature_names(&self) -> &[String] {
        &self.feature_names
    }

    pub fn class_names(&self) -> &[String] {
        &self.class_names
    }

    /// Check a raster's bands against the training bands, by count then by name.
    pub fn check_bands(&self, bands: &[String]) -> Result<()> {
        if bands.len() != self.feature_names.len() {
            return Err(SpatialCvError::DimensionMismatch {
                expected: self.feature_names.len(),
                found: bands.len(),
            }
            .into());
        }
        if bands != self.feature_names.as_slice() {
            return Err(SpatialCvError::BandMismatch {
                expected: self.feature_names.clone(),
                found: bands.to_vec(),
            }
            .into());
        }
        Ok(())
    }
}

impl std::fmt::Debug for TrainedClassifier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TrainedClassifier")
            .field("model", &self.model.name())
            .field("feature_names", &self.feature_names)
            .field("class_names", &self.class_names)
            .finish()
    }
}
