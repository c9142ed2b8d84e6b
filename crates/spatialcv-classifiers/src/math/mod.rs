//! Row-major matrix used for feature tables and class-probability outputs.
//!
//! Rows are samples (or grid cells) and columns are predictor bands (or
//! classes). The type is deliberately small so model implementations only
//! depend on slices.
pub mod matrix;

pub use matrix::{Array2, ShapeError};
