use anyhow::Result;

use crate::error::SpatialCvError;
use crate::math::Array2;
use crate::raster::{GeoTransform, Tile};

/// Predictor vectors for one tile, in row-major cell order.
#[derive(Debug, Clone)]
pub struct TileBlock {
    pub tile: Tile,
    /// `tile.len()` rows by band count; rows of invalid cells hold unspecified values.
    pub values: Array2<f32>,
    /// `false` for no-data cells and cells outside the valid data bounds.
    pub valid: Vec<bool>,
}

impl TileBlock {
    pub fn valid_count(&self) -> usize {
        self.valid.iter().filter(|&&v| v).count()
    }
}

/// A grid of per-cell predictor vectors over a fixed, named set of channels.
///
/// Implementations may read lazily from disk or a remote store; the only
/// requirement is that `read_tile` for the same tile returns the same data.
pub trait RasterSource: Sync {
    /// (rows, cols)
    fn shape(&self) -> (usize, usize);

    fn band_names(&self) -> &[String];

    fn n_bands(&self) -> usize {
        self.band_names().len()
    }

    /// Cell to map coordinate transform; polygon regions are resolved through it.
    fn transform(&self) -> GeoTransform;

    fn read_tile(&self, tile: &Tile) -> Result<TileBlock>;

    /// Predictor vector of a single cell, `None` for a no-data cell.
    fn read_cell(&self, row: usize, col: usize) -> Result<Option<Vec<f32>>> {
        let block = self.read_tile(&Tile::new(0, row, col, 1, 1))?;
        if block.valid[0] {
            Ok(Some(block.values.row_slice(0).to_vec()))
        } else {
            Ok(None)
        }
    }
}

/// In-memory multi-band predictor grid.
///
/// Values are stored cell-major: the `n_bands` values of a cell are contiguous.
/// A cell is missing when any band is NaN, equals the no-data value, or the
/// optional validity mask excludes it.
#[derive(Debug, Clone)]
pub struct FeatureGrid {
    rows: usize,
    cols: usize,
    band_names: Vec<String>,
    data: Vec<f32>,
    nodata: Option<f32>,
    valid_mask: Option<Vec<bool>>,
    transform: GeoTransform,
}

impl FeatureGrid {
    /// Build from a cell-major buffer of length `rows * cols * band_names.len()`.
    pub fn new(rows: usize, cols: usize, band_names: Vec<String>, data: Vec<f32>) -> Result<Self> {
        if band_names.is_empty() {
            return Err(SpatialCvError::ShapeMismatch("a grid needs at least one band".into()).into());
        }
        let expected = rows * cols * band_names.len();
        if data.len() != expected {
            return Err(SpatialCvError::ShapeMismatch(format!(
                "{}x{} grid with {} bands needs {} values, got {}",
                rows,
                cols,
                band_names.len(),
                expected,
                data.len()
            ))
            .into());
        }
        Ok(Self {
            rows,
            cols,
            band_names,
            data,
            nodata: None,
            valid_mask: None,
            transform: GeoTransform::default(),
        })
    }

    /// Build from one row-major buffer per band.
    pub fn from_bands(rows: usize, cols: usize, band_names: Vec<String>, bands: Vec<Vec<f32>>) -> Result<Self> {
        if bands.len() != band_names.len() {
            return Err(SpatialCvError::DimensionMismatch {
                expected: band_names.len(),
                found: bands.len(),
            }
            .into());
        }
        let n_cells = rows * cols;
        if let Some(bad) = bands.iter().find(|b| b.len() != n_cells) {
            return Err(SpatialCvError::ShapeMismatch(format!(
                "band has {} values, expected {}",
                bad.len(),
                n_cells
            ))
            .into());
        }
        let n_bands = bands.len();
        let mut data = vec![0.0f32; n_cells * n_bands];
        for (b, band) in bands.iter().enumerate() {
            for (cell, &v) in band.iter().enumerate() {
                data[cell * n_bands + b] = v;
            }
        }
        Self::new(rows, cols, band_names, data)
    }

    pub fn with_nodata(mut self, nodata: Option<f32>) -> Self {
        self.nodata = nodata;
        self
    }

    /// Restrict the valid data bounds with a row-major cell mask.
    pub fn with_valid_mask(mut self, mask: Vec<bool>) -> Result<Self> {
        if mask.len() != self.rows * self.cols {
            return Err(SpatialCvError::ShapeMismatch(format!(
                "valid mask has {} cells, grid has {}",
                mask.len(),
                self.rows * self.cols
            ))
            .into());
        }
        self.valid_mask = Some(mask);
        Ok(self)
    }

    pub fn with_transform(mut self, transform: GeoTransform) -> Self {
        self.transform = transform;
        self
    }

    pub fn nodata(&self) -> Option<f32> {
        self.nodata
    }

    /// Predictor values of a cell, regardless of validity.
    pub fn cell(&self, row: usize, col: usize) -> &[f32] {
        let n = self.band_names.len();
        let start = (row * self.cols + col) * n;
        &self.data[start..start + n]
    }

    pub fn is_missing(&self, row: usize, col: usize) -> bool {
        if let Some(mask) = &self.valid_mask {
            if !mask[row * self.cols + col] {
                return true;
            }
        }
        self.cell(row, col).iter().any(|&v| self.is_nodata_value(v))
    }

    fn is_nodata_value(&self, v: f32) -> bool {
        !v.is_finite() || self.nodata.is_some_and(|nd| v == nd)
    }

    fn check_tile(&self, tile: &Tile) -> Result<()> {
        if tile.row_offset + tile.rows > self.rows || tile.col_offset + tile.cols > self.cols {
            return Err(SpatialCvError::ShapeMismatch(format!(
                "tile at ({}, {}) of size {}x{} exceeds {}x{} grid",
                tile.row_offset, tile.col_offset, tile.rows, tile.cols, self.rows, self.cols
            ))
            .into());
        }
        Ok(())
    }
}

impl RasterSource for FeatureGrid {
    fn shape(&self) -> (usize, usize) {
        (self.rows, self.cols)
    }

    fn band_names(&self) -> &[String] {
        &self.band_names
    }

    fn transform(&self) -> GeoTransform {
        self.transform
    }

    fn read_tile(&self, tile: &Tile) -> Result<TileBlock> {
        self.check_tile(tile)?;
        let mut values = Array2::with_cols(self.band_names.len());
        let mut valid = Vec::with_capacity(tile.len());
        for (row, col) in tile.cells() {
            values.push_row(self.cell(row, col))?;
            valid.push(!self.is_missing(row, col));
        }
        Ok(TileBlock {
            tile: *tile,
            values,
            valid,
        })
    }

    fn read_cell(&self, row: usize, col: usize) -> Result<Option<Vec<f32>>> {
        self.check_tile(&Tile::new(0, row, col, 1, 1))?;
        if self.is_missing(row, col) {
            Ok(None)
        } else {
            Ok(Some(self.cell(row, col).to_vec()))
        }
    }
}

/// Classified output grid: a class index per cell, `None` for missing cells.
#[derive(Debug, Clone, PartialEq)]
pub struct ClassGrid {
    rows: usize,
    cols: usize,
    cells: Vec<Option<usize>>,
    class_names: Vec<String>,
    transform: GeoTransform,
}

impl ClassGrid {
    /// All cells start missing.
    pub fn new(rows: usize, cols: usize, class_names: Vec<String>, transform: GeoTransform) -> Self {
        Self {
            rows,
            cols,
            cells: vec![None; rows * cols],
            class_names,
            transform,
        }
    }

    pub fn shape(&self) -> (usize, usize) {
        (self.rows, self.cols)
    }

    pub fn transform(&self) -> GeoTransform {
        self.transform
    }

    pub fn class_names(&self) -> &[String] {
        &self.class_names
    }

    pub fn get(&self, row: usize, col: usize) -> Option<usize> {
        self.cells[row * self.cols + col]
    }

    pub fn set(&mut self, row: usize, col: usize, value: Option<usize>) {
        self.cells[row * self.cols + col] = value;
    }

    /// Class name of a cell, `None` for missing cells.
    pub fn label(&self, row: usize, col: usize) -> Option<&str> {
        self.get(row, col)
            .and_then(|idx| self.class_names.get(idx))
            .map(String::as_str)
    }

    /// Row-major cell values.
    pub fn cells(&self) -> &[Option<usize>] {
        &self.cells
    }

    pub fn missing_count(&self) -> usize {
        self.cells.iter().filter(|c| c.is_none()).count()
    }
}
