//! Lazy tile traversal for large grids

/// A rectangular window of a grid.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Tile {
    /// Index of this tile in traversal order
    pub index: usize,
    /// Row offset in the source grid
    pub row_offset: usize,
    /// Column offset in the source grid
    pub col_offset: usize,
    /// Number of rows in this tile
    pub rows: usize,
    /// Number of columns in this tile
    pub cols: usize,
}

impl Tile {
    pub fn new(index: usize, row_offset: usize, col_offset: usize, rows: usize, cols: usize) -> Self {
        Self {
            index,
            row_offset,
            col_offset,
            rows,
            cols,
        }
    }

    pub fn len(&self) -> usize {
        self.rows * self.cols
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Convert tile-local coordinates to source grid coordinates
    pub fn to_source_coords(&self, local_row: usize, local_col: usize) -> (usize, usize) {
        (self.row_offset + local_row, self.col_offset + local_col)
    }

    /// Source coordinates of every cell, row-major within the tile.
    pub fn cells(&self) -> impl Iterator<Item = (usize, usize)> + '_ {
        (0..self.rows).flat_map(move |r| (0..self.cols).map(move |c| self.to_source_coords(r, c)))
    }
}

/// Iterator over non-overlapping tiles covering a grid, row-major.
///
/// Edge tiles are clipped to the grid extent, so every cell belongs to
/// exactly one tile.
pub struct TileIterator {
    total_rows: usize,
    total_cols: usize,
    tile_rows: usize,
    tile_cols: usize,
    current_row: usize,
    current_col: usize,
    next_index: usize,
}

impl TileIterator {
    /// Square tiles of `tile_size` cells per side. A size of 0 is treated as 1.
    pub fn new(total_rows: usize, total_cols: usize, tile_size: usize) -> Self {
        Self::with_shape(total_rows, total_cols, tile_size, tile_size)
    }

    pub fn with_shape(total_rows: usize, total_cols: usize, tile_rows: usize, tile_cols: usize) -> Self {
        Self {
            total_rows,
            total_cols,
            tile_rows: tile_rows.max(1),
            tile_cols: tile_cols.max(1),
            current_row: 0,
            current_col: 0,
            next_index: 0,
        }
    }

    /// Number of tiles the iterator yields in total.
    pub fn tile_count(&self) -> usize {
        if self.total_rows == 0 || self.total_cols == 0 {
            return 0;
        }
        self.total_rows.div_ceil(self.tile_rows) * self.total_cols.div_ceil(self.tile_cols)
    }
}

impl Iterator for TileIterator {
    type Item = Tile;

    fn next(&mut self) -> Option<Self::Item> {
        if self.current_row >= self.total_rows || self.total_cols == 0 {
            return None;
        }

        let rows = self.tile_rows.min(self.total_rows - self.current_row);
        let cols = self.tile_cols.min(self.total_cols - self.current_col);
        let tile = Tile::new(self.next_index, self.current_row, self.current_col, rows, cols);
        self.next_index += 1;

        self.current_col += self.tile_cols;
        if self.current_col >= self.total_cols {
            self.current_col = 0;
            self.current_row += self.tile_rows;
        }

        Some(tile)
    }
}
