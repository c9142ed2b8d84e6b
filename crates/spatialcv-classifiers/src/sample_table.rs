//! Training table built from labeled regions over a predictor grid.
//!
//! This module defines `SampleTable`, the per-pixel training table that carries
//! group identity and class label next to the predictor values, and
//! `build_sample_table`, which extracts it from a [`RasterSource`] and a set of
//! [`Region`](crate::region::Region)s.
use std::collections::HashMap;

use anyhow::Result;
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use serde::{Deserialize, Serialize};

use crate::config::SamplingConfig;
use crate::error::SpatialCvError;
use crate::math::Array2;
use crate::raster::RasterSource;
use crate::region::RegionSource;

/// Sorted class alphabet mapping class names to dense indices.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClassMap {
    names: Vec<String>,
}

impl ClassMap {
    pub fn from_labels<'a, I>(labels: I) -> Self
    where
        I: IntoIterator<Item = &'a str>,
    {
        let mut names: Vec<String> = labels.into_iter().map(str::to_string).collect();
        names.sort();
        names.dedup();
        Self { names }
    }

    pub fn index_of(&self, name: &str) -> Option<usize> {
        self.names.binary_search_by(|n| n.as_str().cmp(name)).ok()
    }

    pub fn name(&self, idx: usize) -> Option<&str> {
        self.names.get(idx).map(String::as_str)
    }

    pub fn names(&self) -> &[String] {
        &self.names
    }

    pub fn len(&self) -> usize {
        self.names.len()
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }
}

/// One extracted pixel.
#[derive(Debug, Clone, PartialEq)]
pub struct FeatureRow {
    pub values: Vec<f32>,
    pub group_id: String,
    pub class_label: String,
    /// Source cell, when the row came from a grid
    pub cell: Option<(usize, usize)>,
}

/// Group identity, class and size; the input of fold assignment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GroupSummary {
    pub group_id: String,
    pub class_label: String,
    pub n_rows: usize,
}

/// Training table: one row per sampled pixel.
#[derive(Debug, Clone)]
pub struct SampleTable {
    feature_names: Vec<String>,
    x: Array2<f32>,
    /// Class index per row
    y: Vec<usize>,
    /// Group index per row (into `group_ids`)
    group_of_row: Vec<usize>,
    cells: Vec<Option<(usize, usize)>>,
    group_ids: Vec<String>,
    group_class: Vec<usize>,
    classes: ClassMap,
}

impl SampleTable {
    /// Build a table from rows, validating dimensionality and group consistency.
    ///
    /// Groups are numbered in first-seen order.
    pub fn from_rows(feature_names: Vec<String>, rows: Vec<FeatureRow>) -> Result<Self> {
        if rows.is_empty() {
            return Err(SpatialCvError::EmptySampleTable.into());
        }
        let classes = ClassMap::from_labels(rows.iter().map(|r| r.class_label.as_str()));
        let n_features = feature_names.len();

        let mut x = Array2::with_cols(n_features);
        let mut y = Vec::with_capacity(rows.len());
        let mut group_of_row = Vec::with_capacity(rows.len());
        let mut cells = Vec::with_capacity(rows.len());
        let mut group_index: HashMap<String, usize> = HashMap::new();
        let mut group_ids = Vec::new();
        let mut group_class = Vec::new();

        for row in rows {
            if row.values.len() != n_features {
                return Err(SpatialCvError::DimensionMismatch {
                    expected: n_features,
                    found: row.values.len(),
                }
                .into());
            }
            let class = classes
                .index_of(&row.class_label)
                .ok_or_else(|| SpatialCvError::UnknownClass(row.class_label.clone()))?;

            let g = match group_index.get(&row.group_id) {
                Some(&g) => {
                    if group_class[g] != class {
                        return Err(SpatialCvError::InconsistentGroup {
                            group: row.group_id.clone(),
                        }
                        .into());
                    }
                    g
                }
                None => {
                    let g = group_ids.len();
                    group_index.insert(row.group_id.clone(), g);
                    group_ids.push(row.group_id.clone());
                    group_class.push(class);
                    g
                }
            };

            x.push_row(&row.values)?;
            y.push(class);
            group_of_row.push(g);
            cells.push(row.cell);
        }

        Ok(Self {
            feature_names,
            x,
            y,
            group_of_row,
            cells,
            group_ids,
            group_class,
            classes,
        })
    }

    pub fn n_rows(&self) -> usize {
        self.y.len()
    }

    pub fn n_features(&self) -> usize {
        self.feature_names.len()
    }

    pub fn n_groups(&self) -> usize {
        self.group_ids.len()
    }

    pub fn feature_names(&self) -> &[String] {
        &self.feature_names
    }

    pub fn x(&self) -> &Array2<f32> {
        &self.x
    }

    /// Class index per row
    pub fn labels(&self) -> &[usize] {
        &self.y
    }

    pub fn classes(&self) -> &ClassMap {
        &self.classes
    }

    pub fn group_ids(&self) -> &[String] {
        &self.group_ids
    }

    /// Group id of row `i`.
    pub fn group_of(&self, i: usize) -> &str {
        &self.group_ids[self.group_of_row[i]]
    }

    pub fn cell_of(&self, i: usize) -> Option<(usize, usize)> {
        self.cells[i]
    }

    /// Row `i` as an owned [`FeatureRow`].
    pub fn row(&self, i: usize) -> FeatureRow {
        FeatureRow {
            values: self.x.row_slice(i).to_vec(),
            group_id: self.group_of(i).to_string(),
            class_label: self.classes.names()[self.y[i]].clone(),
            cell: self.cells[i],
        }
    }

    /// One summary per group, in first-seen order.
    pub fn group_summaries(&self) -> Vec<GroupSummary> {
        let mut counts = vec![0usize; self.group_ids.len()];
        for &g in &self.group_of_row {
            counts[g] += 1;
        }
        self.group_ids
            .iter()
            .zip(self.group_class.iter())
            .zip(counts)
            .map(|((id, &class), n_rows)| GroupSummary {
                group_id: id.clone(),
                class_label: self.classes.names()[class].clone(),
                n_rows,
            })
            .collect()
    }

    /// New table holding only the given rows, in the given order.
    pub fn select(&self, indices: &[usize]) -> Result<SampleTable> {
        let rows = indices.iter().map(|&i| self.row(i)).collect();
        SampleTable::from_rows(self.feature_names.clone(), rows)
    }

    /// Keep a seeded random fraction of each group's rows.
    ///
    /// Every group keeps `max(1, round(n * fraction))` rows, so groups shrink
    /// proportionally instead of disappearing. Kept rows stay in table order.
    pub fn subsample_per_group(&self, fraction: f64, seed: u64) -> Result<SampleTable> {
        if !(fraction > 0.0 && fraction <= 1.0) {
            return Err(SpatialCvError::InvalidFraction(fraction).into());
        }
        let mut rows_by_group: Vec<Vec<usize>> = vec![Vec::new(); self.group_ids.len()];
        for (i, &g) in self.group_of_row.iter().enumerate() {
            rows_by_group[g].push(i);
        }

        let mut rng = ChaCha8Rng::seed_from_u64(seed);
        let mut keep = Vec::new();
        for rows in &rows_by_group {
            let n = rows.len();
            let n_keep = ((n as f64 * fraction).round() as usize).clamp(1, n);
            let picked = rand::seq::index::sample(&mut rng, n, n_keep);
            keep.extend(picked.iter().map(|j| rows[j]));
        }
        keep.sort_unstable();

        log::debug!(
            "Subsampled {} of {} rows ({:.1}% per group)",
            keep.len(),
            self.n_rows(),
            fraction * 100.0
        );
        self.select(&keep)
    }

    pub fn log_summary(&self) {
        log::info!("----- Sample Table Summary -----");
        log::info!(
            "{} rows, {} groups, {} classes, {} predictor bands",
            self.n_rows(),
            self.n_groups(),
            self.classes.len(),
            self.n_features()
        );
        for (idx, name) in self.classes.names().iter().enumerate() {
            let n_rows = self.y.iter().filter(|&&c| c == idx).count();
            let n_groups = self.group_class.iter().filter(|&&c| c == idx).count();
            log::info!("class '{}': {} groups, {} rows", name, n_groups, n_rows);
        }
        log::info!("--------------------------------");
    }
}

/// Result of extracting training rows from a raster.
#[derive(Debug, Clone)]
pub struct Extraction {
    pub table: SampleTable,
    /// Group ids of regions skipped because they covered no valid cell
    pub dropped_regions: Vec<String>,
    /// Region cells skipped because the raster had no data there
    pub nodata_cells: usize,
}

/// Extract one row per valid grid cell inside each region.
///
/// Regions covering no cell, or only no-data cells, are dropped with a
/// warning and reported in [`Extraction::dropped_regions`]. Regions sharing a
/// group id are merged when they agree on the class.
pub fn build_sample_table<R: RegionSource + ?Sized>(
    source: &dyn RasterSource,
    regions: &R,
    sampling: &SamplingConfig,
) -> Result<Extraction> {
    let regions = regions.regions();
    let (rows, cols) = source.shape();
    let transform = source.transform();
    let mut feature_rows = Vec::new();
    let mut dropped_regions = Vec::new();
    let mut nodata_cells = 0usize;

    for region in regions {
        let cells = region.resolve_cells(&transform, rows, cols);
        let mut extracted = 0usize;
        for (row, col) in cells {
            match source.read_cell(row, col)? {
                Some(values) => {
                    feature_rows.push(FeatureRow {
                        values,
                        group_id: region.group_id.clone(),
                        class_label: region.class_label.clone(),
                        cell: Some((row, col)),
                    });
                    extracted += 1;
                }
                None => nodata_cells += 1,
            }
        }
        if extracted == 0 {
            log::warn!(
                "Region '{}' ({}) covers no valid grid cell; dropping it",
                region.group_id,
                region.class_label
            );
            dropped_regions.push(region.group_id.clone());
        } else {
            log::trace!("Region '{}': {} cells extracted", region.group_id, extracted);
        }
    }

    if !dropped_regions.is_empty() {
        log::warn!("Dropped {} of {} regions", dropped_regions.len(), regions.len());
    }

    let mut table = SampleTable::from_rows(source.band_names().to_vec(), feature_rows)?;
    if let Some(fraction) = sampling.fraction {
        table = table.subsample_per_group(fraction, sampling.seed)?;
    }

    Ok(Extraction {
        table,
        dropped_regions,
        nodata_cells,
    })
}
