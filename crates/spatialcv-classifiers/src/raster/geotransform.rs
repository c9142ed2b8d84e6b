use serde::{Deserialize, Serialize};

/// North-up affine transform between cell indices and map coordinates.
///
/// ```text
/// x = origin_x + col * pixel_width
/// y = origin_y + row * pixel_height
/// ```
///
/// `pixel_height` is usually negative (rows grow southwards).
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GeoTransform {
    /// X coordinate of the upper-left corner
    pub origin_x: f64,
    /// Y coordinate of the upper-left corner
    pub origin_y: f64,
    pub pixel_width: f64,
    pub pixel_height: f64,
}

impl Default for GeoTransform {
    /// Identity-like transform: cell (row, col) covers [col, col+1) x (-(row+1), -row].
    fn default() -> Self {
        Self::new(0.0, 0.0, 1.0, -1.0)
    }
}

impl GeoTransform {
    pub fn new(origin_x: f64, origin_y: f64, pixel_width: f64, pixel_height: f64) -> Self {
        Self {
            origin_x,
            origin_y,
            pixel_width,
            pixel_height,
        }
    }

    /// Map coordinates of the centre of cell (row, col).
    pub fn cell_center(&self, row: usize, col: usize) -> (f64, f64) {
        (
            self.origin_x + (col as f64 + 0.5) * self.pixel_width,
            self.origin_y + (row as f64 + 0.5) * self.pixel_height,
        )
    }

    /// Fractional (row, col) for a map coordinate. NaN for a degenerate transform.
    pub fn geo_to_cell(&self, x: f64, y: f64) -> (f64, f64) {
        if self.pixel_width.abs() < 1e-12 || self.pixel_height.abs() < 1e-12 {
            return (f64::NAN, f64::NAN);
        }
        (
            (y - self.origin_y) / self.pixel_height,
            (x - self.origin_x) / self.pixel_width,
        )
    }
}
