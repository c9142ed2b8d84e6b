use serde::{Deserialize, Serialize};
use std::str::FromStr;

use crate::folds::CoveragePolicy;
use crate::metrics::MetricKind;

/// Hyperparameters of one model candidate plus the seed used to fit it.
#[derive(Deserialize, Serialize, Debug, Clone, PartialEq)]
pub struct ModelConfig {
    pub seed: u64,

    #[serde(flatten)]
    pub model_type: ModelType,
}

/// Supported model types and their hyper-parameters.
#[derive(Deserialize, Serialize, Debug, Clone, PartialEq)]
pub enum ModelType {
    /// Nearest class centroid in predictor space.
    MinimumDistance {},
    /// Diagonal Gaussian per class.
    MaximumLikelihood { variance_floor: f32 },
    /// One-vs-rest gradient boosted trees.
    GBDT {
        learning_rate: f32,
        max_depth: u32,
        num_boost_round: u32,
        training_optimization_level: u8,
    },
}

impl Default for ModelType {
    fn default() -> Self {
        ModelType::MaximumLikelihood {
            variance_floor: 1e-6,
        }
    }
}

impl ModelType {
    /// Ordering key used to break ties between equally scoring candidates;
    /// lower means simpler.
    pub fn complexity(&self) -> f64 {
        match self {
            ModelType::MinimumDistance {} => 0.0,
            ModelType::MaximumLikelihood { .. } => 1.0,
            ModelType::GBDT {
                max_depth,
                num_boost_round,
                ..
            } => 1.0 + (*max_depth as f64) * (*num_boost_round as f64),
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            ModelType::MinimumDistance {} => "minimum_distance",
            ModelType::MaximumLikelihood { .. } => "maximum_likelihood",
            ModelType::GBDT { .. } => "gbdt",
        }
    }
}

impl FromStr for ModelType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().replace('-', "_").as_str() {
            "minimum_distance" | "mindist" => Ok(ModelType::MinimumDistance {}),
            "maximum_likelihood" | "maxlike" => Ok(ModelType::default()),
            "gbdt" => Ok(ModelType::GBDT {
                learning_rate: 0.1,
                max_depth: 4,
                num_boost_round: 20,
                training_optimization_level: 2,
            }),
            _ => Err(format!(
                "Unknown model type: {}. Expected one of minimum_distance, maximum_likelihood, gbdt",
                s
            )),
        }
    }
}

impl ModelConfig {
    pub fn new(seed: u64, model_type: ModelType) -> Self {
        Self { seed, model_type }
    }

    pub fn complexity(&self) -> f64 {
        self.model_type.complexity()
    }
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            seed: 42,
            model_type: ModelType::default(),
        }
    }
}

fn default_n_folds() -> usize {
    5
}

fn default_true() -> bool {
    true
}

/// Cross-validation settings.
///
/// `seed` has no serde default: a config that omits it is rejected.
#[derive(Deserialize, Serialize, Debug, Clone, PartialEq)]
pub struct CvConfig {
    #[serde(default = "default_n_folds")]
    pub n_folds: usize,
    /// Seed for fold assignment
    pub seed: u64,
    #[serde(default)]
    pub coverage_policy: CoveragePolicy,
    #[serde(default)]
    pub metric: MetricKind,
    /// Run fold cycles on the rayon pool
    #[serde(default = "default_true")]
    pub parallel: bool,
}

impl Default for CvConfig {
    fn default() -> Self {
        Self {
            n_folds: default_n_folds(),
            seed: 42,
            coverage_policy: CoveragePolicy::default(),
            metric: MetricKind::default(),
            parallel: true,
        }
    }
}

/// Per-group subsampling of extracted rows. `seed` is required when parsed.
#[derive(Deserialize, Serialize, Debug, Clone, PartialEq)]
pub struct SamplingConfig {
    /// Fraction of each group's rows to keep; `None` keeps everything.
    #[serde(default)]
    pub fraction: Option<f64>,
    pub seed: u64,
}

impl Default for SamplingConfig {
    fn default() -> Self {
        Self {
            fraction: None,
            seed: 42,
        }
    }
}

/// Grid prediction settings.
#[derive(Deserialize, Serialize, Debug, Clone, PartialEq)]
#[serde(default)]
pub struct PredictConfig {
    /// Tile edge length in cells
    pub tile_size: usize,
    /// Predict tiles on the rayon pool
    pub parallel: bool,
}

impl Default for PredictConfig {
    fn default() -> Self {
        Self {
            tile_size: 256,
            parallel: true,
        }
    }
}

/// Everything needed to go from labeled regions to a classified grid.
///
/// `cv` and `sampling` carry seeds and must be present in a parsed config.
#[derive(Deserialize, Serialize, Debug, Clone, PartialEq)]
pub struct PipelineConfig {
    pub cv: CvConfig,
    pub sampling: SamplingConfig,
    #[serde(default)]
    pub predict: PredictConfig,
    /// Hyperparameter candidates compared by cross-validation.
    #[serde(default = "default_candidates")]
    pub candidates: Vec<ModelConfig>,
}

fn default_candidates() -> Vec<ModelConfig> {
    vec![
        ModelConfig::new(42, ModelType::MinimumDistance {}),
        ModelConfig::default(),
    ]
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            cv: CvConfig::default(),
            sampling: SamplingConfig::default(),
            predict: PredictConfig::default(),
            candidates: default_candidates(),
        }
    }
}
