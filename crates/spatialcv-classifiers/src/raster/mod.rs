//! Raster containers and the traversal abstraction used by extraction and prediction.
//!
//! `FeatureGrid` is the in-memory multi-band predictor grid, `ClassGrid` the
//! classified output. Anything that can hand out tiles of predictor vectors
//! implements [`RasterSource`], so prediction never needs the whole grid in
//! memory at once.
pub mod geotransform;
pub mod grid;
pub mod tiles;

pub use geotransform::GeoTransform;
pub use grid::{ClassGrid, FeatureGrid, RasterSource, TileBlock};
pub use tiles::{Tile, TileIterator};
