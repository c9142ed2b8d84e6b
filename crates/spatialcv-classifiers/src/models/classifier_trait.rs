use anyhow::Result;

use crate::math::Array2;

/// The opaque learner consumed by cross-validation and grid prediction.
///
/// Rows of `x` are samples, columns predictor bands; labels are dense class
/// indices in `0..n_classes`. Implementations must predict each row
/// independently of the other rows passed in the same call, otherwise tiled
/// prediction would depend on the tile size.
pub trait ClassifierModel: Send + Sync {
    /// Fit the model. Any randomness must be driven by `seed` alone.
    fn fit(&mut self, x: &Array2<f32>, y: &[usize], n_classes: usize, seed: u64) -> Result<()>;

    /// Predict one class index per row.
    fn predict(&self, x: &Array2<f32>) -> Result<Vec<usize>>;

    /// Class probabilities (rows x n_classes) when the model provides them.
    fn predict_proba(&self, _x: &Array2<f32>) -> Result<Option<Array2<f32>>> {
        Ok(None)
    }

    /// Number of predictor bands seen during `fit`; `None` before fitting.
    fn n_features(&self) -> Option<usize>;

    /// Optional human readable name for the model
    fn name(&self) -> &str {
        "classifier"
    }
}
