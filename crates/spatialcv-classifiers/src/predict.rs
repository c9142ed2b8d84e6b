//! Wall-to-wall classification of a predictor grid, tile by tile.
use anyhow::{bail, Result};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};

use crate::config::PredictConfig;
use crate::models::TrainedClassifier;
use crate::raster::{ClassGrid, RasterSource, Tile, TileIterator};

/// Counts gathered while classifying a grid.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PredictionSummary {
    pub rows: usize,
    pub cols: usize,
    pub n_tiles: usize,
    pub predicted_cells: usize,
    pub nodata_cells: usize,
    /// Predicted cells per class, in class order
    pub class_counts: Vec<(String, usize)>,
}

struct TilePrediction {
    tile: Tile,
    /// One entry per tile cell, row-major
    labels: Vec<Option<usize>>,
}

/// Applies a [`TrainedClassifier`] to every cell of a [`RasterSource`].
///
/// The grid is read one batch of tiles at a time, so at most a batch of tiles
/// is held in memory. The output does not depend on the tile size.
pub struct GridPredictor {
    classifier: TrainedClassifier,
    config: PredictConfig,
}

impl GridPredictor {
    pub fn new(classifier: TrainedClassifier, config: PredictConfig) -> Self {
        Self { classifier, config }
    }

    pub fn classifier(&self) -> &TrainedClassifier {
        &self.classifier
    }

    /// Classify the whole grid. No-data cells stay `None`.
    ///
    /// Fails before reading any tile when the grid's bands differ from the
    /// training bands.
    pub fn predict(&self, source: &dyn RasterSource) -> Result<(ClassGrid, PredictionSummary)> {
        self.classifier.check_bands(source.band_names())?;

        let (rows, cols) = source.shape();
        let class_names = self.classifier.class_names().to_vec();
        let mut grid = ClassGrid::new(rows, cols, class_names.clone(), source.transform());

        let tiles = TileIterator::new(rows, cols, self.config.tile_size);
        let n_tiles = tiles.tile_count();
        let batch_size = if self.config.parallel {
            rayon::current_num_threads().max(1)
        } else {
            1
        };
        log::info!(
            "Classifying {}x{} grid in {} tiles of up to {} cells per side",
            rows,
            cols,
            n_tiles,
            self.config.tile_size.max(1)
        );

        let mut counts = vec![0usize; class_names.len()];
        let mut tiles = tiles.peekable();
        let mut batch = Vec::with_capacity(batch_size);
        while tiles.peek().is_some() {
            batch.clear();
            batch.extend(tiles.by_ref().take(batch_size));

            let results: Vec<TilePrediction> = if self.config.parallel {
                batch
                    .par_iter()
                    .map(|tile| self.predict_tile(source, tile))
                    .collect::<Result<Vec<_>>>()?
            } else {
                batch
                    .iter()
                    .map(|tile| self.predict_tile(source, tile))
                    .collect::<Result<Vec<_>>>()?
            };

            for result in results {
                for ((row, col), label) in result.tile.cells().zip(result.labels) {
                    if let Some(class) = label {
                        counts[class] += 1;
                    }
                    grid.set(row, col, label);
                }
                log::trace!("Tile {} written", result.tile.index);
            }
        }

        let nodata_cells = grid.missing_count();
        let summary = PredictionSummary {
            rows,
            cols,
            n_tiles,
            predicted_cells: rows * cols - nodata_cells,
            nodata_cells,
            class_counts: class_names.into_iter().zip(counts).collect(),
        };
        log::info!(
            "Classified {} cells, {} no-data cells left empty",
            summary.predicted_cells,
            summary.nodata_cells
        );
        Ok((grid, summary))
    }

    fn predict_tile(&self, source: &dyn RasterSource, tile: &Tile) -> Result<TilePrediction> {
        let block = source.read_tile(tile)?;
        if block.valid.len() != tile.len() || block.values.nrows() != tile.len() {
            bail!(
                "Tile {} returned {} rows for {} cells",
                tile.index,
                block.values.nrows(),
                tile.len()
            );
        }

        let valid_rows: Vec<usize> = (0..tile.len()).filter(|&i| block.valid[i]).collect();
        let mut labels = vec![None; tile.len()];
        if valid_rows.is_empty() {
            return Ok(TilePrediction { tile: *tile, labels });
        }

        let x = block.values.select_rows(&valid_rows);
        let predicted = self.classifier.model().predict(&x)?;
        if predicted.len() != valid_rows.len() {
            bail!(
                "Model returned {} predictions for {} cells in tile {}",
                predicted.len(),
                valid_rows.len(),
                tile.index
            );
        }
        let n_classes = self.classifier.class_names().len();
        for (&i, class) in valid_rows.iter().zip(predicted) {
            if class >= n_classes {
                bail!("Model predicted class index {} but only {} classes exist", class, n_classes);
            }
            labels[i] = Some(class);
        }
        Ok(TilePrediction { tile: *tile, labels })
    }
}
