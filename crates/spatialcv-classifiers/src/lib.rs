//! spatialcv-classifiers: supervised land-cover classification with
//! spatially grouped cross-validation.
//!
//! Pixels digitized from the same region are strongly autocorrelated, so
//! they are kept together: folds are assigned per region (group) and
//! stratified by class, hyperparameter candidates are compared on held-out
//! groups only, and the selected model is applied tile by tile to the whole
//! predictor grid.
//!
//! The usual flow is [`sample_table::build_sample_table`] →
//! [`cross_validation::CrossValidatedTrainer::train`] →
//! [`predict::GridPredictor::predict`].
pub mod config;
pub mod cross_validation;
pub mod error;
pub mod folds;
pub mod io;
pub mod math;
pub mod metrics;
pub mod models;
pub mod predict;
pub mod raster;
pub mod region;
pub mod report;
pub mod sample_table;
