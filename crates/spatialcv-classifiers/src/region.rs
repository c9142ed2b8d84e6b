//! Labeled ground-truth regions and their resolution to grid cells.
//!
//! A region is one digitized polygon (or an explicit cell list) carrying a
//! class label and a unique group identifier. The group id is the unit that
//! cross-validation keeps together.
use geo::{BoundingRect, Contains, Point, Polygon};
use serde::{Deserialize, Serialize};

use crate::raster::GeoTransform;

/// Grid cells of a `rows x cols` grid whose centre falls strictly inside
/// `polygon` (holes excluded), row-major.
pub fn rasterize_polygon(polygon: &Polygon<f64>, transform: &GeoTransform, rows: usize, cols: usize) -> Vec<(usize, usize)> {
    if rows == 0 || cols == 0 {
        return Vec::new();
    }
    let Some(rect) = polygon.bounding_rect() else {
        return Vec::new();
    };

    // Candidate window from the bounding box corners, clamped to the grid.
    let (r_a, c_a) = transform.geo_to_cell(rect.min().x, rect.min().y);
    let (r_b, c_b) = transform.geo_to_cell(rect.max().x, rect.max().y);
    if !(r_a.is_finite() && r_b.is_finite() && c_a.is_finite() && c_b.is_finite()) {
        return Vec::new();
    }
    let clamp = |v: f64, n: usize| -> usize { v.max(0.0).min(n as f64) as usize };
    let r0 = clamp(r_a.min(r_b).floor(), rows);
    let r1 = clamp(r_a.max(r_b).ceil(), rows);
    let c0 = clamp(c_a.min(c_b).floor(), cols);
    let c1 = clamp(c_a.max(c_b).ceil(), cols);

    let mut cells = Vec::new();
    for row in r0..r1 {
        for col in c0..c1 {
            let (x, y) = transform.cell_center(row, col);
            if polygon.contains(&Point::new(x, y)) {
                cells.push((row, col));
            }
        }
    }
    cells
}

/// Geometry of a region.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RegionShape {
    /// Explicit (row, col) cells.
    Cells(Vec<(usize, usize)>),
    /// Polygon in map coordinates; rings may be open, the closing edge is implied.
    Polygon(Polygon<f64>),
}

/// A labeled region: one group of training pixels.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Region {
    /// Unique group identifier
    pub group_id: String,
    pub class_label: String,
    pub shape: RegionShape,
}

impl Region {
    pub fn from_cells(group_id: impl Into<String>, class_label: impl Into<String>, cells: Vec<(usize, usize)>) -> Self {
        Self {
            group_id: group_id.into(),
            class_label: class_label.into(),
            shape: RegionShape::Cells(cells),
        }
    }

    pub fn from_polygon(group_id: impl Into<String>, class_label: impl Into<String>, polygon: Polygon<f64>) -> Self {
        Self {
            group_id: group_id.into(),
            class_label: class_label.into(),
            shape: RegionShape::Polygon(polygon),
        }
    }

    /// Cells of a `rows x cols` grid covered by this region, deduplicated and
    /// in first-seen order. Cells outside the grid are dropped.
    pub fn resolve_cells(&self, transform: &GeoTransform, rows: usize, cols: usize) -> Vec<(usize, usize)> {
        match &self.shape {
            RegionShape::Cells(cells) => {
                let mut seen = std::collections::HashSet::new();
                cells
                    .iter()
                    .copied()
                    .filter(|&(r, c)| r < rows && c < cols)
                    .filter(|cell| seen.insert(*cell))
                    .collect()
            }
            RegionShape::Polygon(poly) => rasterize_polygon(poly, transform, rows, cols),
        }
    }
}

/// Provider of labeled regions.
pub trait RegionSource {
    fn regions(&self) -> &[Region];
}

impl RegionSource for Vec<Region> {
    fn regions(&self) -> &[Region] {
        self
    }
}

impl RegionSource for [Region] {
    fn regions(&self) -> &[Region] {
        self
    }
}
