use std::error::Error;
use std::fmt;

/// Configuration and validation failures raised by the classification pipeline.
///
/// These are wrapped in `anyhow::Error` by the public API; callers that need to
/// branch on the failure can `downcast_ref::<SpatialCvError>()`.
#[derive(Debug, Clone, PartialEq)]
pub enum SpatialCvError {
    /// Predictor channel count differs between two parties (grid vs model, row vs table).
    DimensionMismatch { expected: usize, found: usize },
    /// Fold count below 2.
    InvalidFoldCount { k: usize },
    /// A class has fewer groups than folds and the coverage policy forbids degrading.
    InsufficientGroups { class: String, groups: usize, k: usize },
    /// Fewer groups in total than folds: some folds would be empty.
    TooFewGroups { groups: usize, k: usize },
    /// Band names of a raster differ from the ones the model was trained on.
    BandMismatch { expected: Vec<String>, found: Vec<String> },
    EmptySampleTable,
    /// Rows of one group disagree on their class label.
    InconsistentGroup { group: String },
    UnknownClass(String),
    /// Grid dimensions or buffer length do not line up.
    ShapeMismatch(String),
    /// Subsampling fraction outside (0, 1].
    InvalidFraction(f64),
    ModelNotFitted,
    NoCandidates,
}

impl fmt::Display for SpatialCvError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            SpatialCvError::DimensionMismatch { expected, found } => write!(
                f,
                "Predictor dimensionality mismatch: expected {} channels, found {}",
                expected, found
            ),
            SpatialCvError::InvalidFoldCount { k } => {
                write!(f, "Fold count must be at least 2, got {}", k)
            }
            SpatialCvError::InsufficientGroups { class, groups, k } => write!(
                f,
                "Class '{}' has {} groups, fewer than the {} requested folds",
                class, groups, k
            ),
            SpatialCvError::TooFewGroups { groups, k } => write!(
                f,
                "Only {} groups available for {} folds; every fold needs at least one group",
                groups, k
            ),
            SpatialCvError::BandMismatch { expected, found } => write!(
                f,
                "Band mismatch: model expects [{}], raster provides [{}]",
                expected.join(", "),
                found.join(", ")
            ),
            SpatialCvError::EmptySampleTable => write!(f, "Sample table contains no rows"),
            SpatialCvError::InconsistentGroup { group } => {
                write!(f, "Group '{}' mixes more than one class label", group)
            }
            SpatialCvError::UnknownClass(name) => write!(f, "Unknown class label '{}'", name),
            SpatialCvError::ShapeMismatch(msg) => write!(f, "Shape mismatch: {}", msg),
            SpatialCvError::InvalidFraction(v) => {
                write!(f, "Sampling fraction must be in (0, 1], got {}", v)
            }
            SpatialCvError::ModelNotFitted => write!(f, "Model has not been fitted"),
            SpatialCvError::NoCandidates => {
                write!(f, "At least one hyperparameter candidate is required")
            }
        }
    }
}

impl Error for SpatialCvError {}
