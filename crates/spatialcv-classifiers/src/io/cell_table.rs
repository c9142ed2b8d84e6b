//! Delimited cell tables: predictor grids, labeled regions, and the
//! classified grid / fold assignment written back out.
//!
//! A `.tsv` extension selects tab as the delimiter, anything else a comma.
use std::collections::HashMap;
use std::fs::File;
use std::io::{BufWriter, Read};
use std::path::Path;

use anyhow::{anyhow, Context, Result};
use csv::StringRecord;

use crate::error::SpatialCvError;
use crate::folds::FoldAssignment;
use crate::raster::{ClassGrid, FeatureGrid};
use crate::region::Region;

const ROW_COLUMN: &str = "row";
const COL_COLUMN: &str = "col";
/// Largest grid (rows x cols) a cell table may describe.
pub const MAX_GRID_CELLS: usize = 1 << 28;

fn delimiter_for(path: &Path) -> u8 {
    match path.extension().and_then(|ext| ext.to_str()) {
        Some("tsv") | Some("txt") => b'\t',
        _ => b',',
    }
}

fn find_column(headers: &StringRecord, name: &str) -> Option<usize> {
    headers
        .iter()
        .position(|h| h.trim().eq_ignore_ascii_case(name))
}

fn find_any_column(headers: &StringRecord, names: &[&str]) -> Option<usize> {
    names.iter().find_map(|name| find_column(headers, name))
}

fn parse_index(record: &StringRecord, idx: usize, what: &str, line: usize) -> Result<usize> {
    let value = record
        .get(idx)
        .ok_or_else(|| anyhow!("Missing {} value at line {}", what, line))?;
    value
        .trim()
        .parse::<usize>()
        .with_context(|| format!("Invalid {} '{}' at line {}", what, value, line))
}

fn parse_value(value: &str) -> Result<f32> {
    let value = value.trim();
    if value.is_empty() || value.eq_ignore_ascii_case("na") || value.eq_ignore_ascii_case("nan") {
        return Ok(f32::NAN);
    }
    value
        .parse::<f32>()
        .map_err(|e| anyhow!("Invalid band value '{}': {}", value, e))
}

/// Read a predictor grid from a `row,col,<band>...` table.
///
/// The grid extent is the largest row and column index plus one. Cells that
/// never appear in the file are masked as missing, as are empty, `NA` and
/// `nan` values and values equal to `nodata`.
pub fn read_grid_csv<P: AsRef<Path>>(path: P, nodata: Option<f32>) -> Result<FeatureGrid> {
    let path = path.as_ref();
    let file = File::open(path).with_context(|| format!("Failed to open grid file: {}", path.display()))?;
    read_grid_csv_from_reader(file, delimiter_for(path), nodata)
        .with_context(|| format!("Failed to read grid file: {}", path.display()))
}

pub fn read_grid_csv_from_reader<R: Read>(reader: R, delimiter: u8, nodata: Option<f32>) -> Result<FeatureGrid> {
    let mut reader = csv::ReaderBuilder::new()
        .delimiter(delimiter)
        .has_headers(true)
        .from_reader(reader);
    let headers = reader.headers().context("Failed to read grid header row")?.clone();

    let row_idx = find_column(&headers, ROW_COLUMN).ok_or_else(|| anyhow!("Missing '{}' column", ROW_COLUMN))?;
    let col_idx = find_column(&headers, COL_COLUMN).ok_or_else(|| anyhow!("Missing '{}' column", COL_COLUMN))?;
    let band_indices: Vec<usize> = (0..headers.len()).filter(|&i| i != row_idx && i != col_idx).collect();
    if band_indices.is_empty() {
        return Err(anyhow!("No band columns found in grid header"));
    }
    let band_names: Vec<String> = band_indices
        .iter()
        .map(|&i| headers.get(i).unwrap_or_default().trim().to_string())
        .collect();

    let mut cells: Vec<((usize, usize), Vec<f32>)> = Vec::new();
    let (mut rows, mut cols) = (0usize, 0usize);
    for (i, result) in reader.records().enumerate() {
        let line = i + 2;
        let record = result.with_context(|| format!("Failed to read line {}", line))?;
        let row = parse_index(&record, row_idx, ROW_COLUMN, line)?;
        let col = parse_index(&record, col_idx, COL_COLUMN, line)?;
        let values = band_indices
            .iter()
            .map(|&b| {
                let raw = record.get(b).unwrap_or_default();
                parse_value(raw).with_context(|| format!("Line {}", line))
            })
            .collect::<Result<Vec<f32>>>()?;
        if row >= MAX_GRID_CELLS || col >= MAX_GRID_CELLS {
            return Err(anyhow!("Cell ({}, {}) at line {} is outside any supported grid extent", row, col, line));
        }
        rows = rows.max(row + 1);
        cols = cols.max(col + 1);
        cells.push(((row, col), values));
    }
    if cells.is_empty() {
        return Err(anyhow!("Grid table has no cells"));
    }

    let n_bands = band_names.len();
    let n_cells = rows
        .checked_mul(cols)
        .filter(|&n| n <= MAX_GRID_CELLS)
        .ok_or_else(|| {
            anyhow!(
                "Grid extent {}x{} from the largest row/col index exceeds {} cells",
                rows,
                cols,
                MAX_GRID_CELLS
            )
        })?;
    let n_values = n_cells
        .checked_mul(n_bands)
        .ok_or_else(|| anyhow!("Grid of {} cells x {} bands overflows", n_cells, n_bands))?;
    let mut data = vec![f32::NAN; n_values];
    let mut present = vec![false; n_cells];
    for ((row, col), values) in cells {
        let cell = row * cols + col;
        if present[cell] {
            return Err(anyhow!("Cell ({}, {}) appears more than once", row, col));
        }
        present[cell] = true;
        data[cell * n_bands..(cell + 1) * n_bands].copy_from_slice(&values);
    }
    let absent = present.iter().filter(|&&p| !p).count();
    if absent > 0 {
        log::debug!("{} of {} grid cells absent from the table; masked as missing", absent, n_cells);
    }
    log::info!("Read {}x{} grid with bands {:?}", rows, cols, band_names);

    FeatureGrid::new(rows, cols, band_names, data)?
        .with_nodata(nodata)
        .with_valid_mask(present)
}

/// Read labeled regions from a `group,class,row,col` table, one line per cell.
///
/// Regions are returned in the order their group first appears.
pub fn read_regions_csv<P: AsRef<Path>>(path: P) -> Result<Vec<Region>> {
    let path = path.as_ref();
    let file = File::open(path).with_context(|| format!("Failed to open regions file: {}", path.display()))?;
    read_regions_csv_from_reader(file, delimiter_for(path))
        .with_context(|| format!("Failed to read regions file: {}", path.display()))
}

pub fn read_regions_csv_from_reader<R: Read>(reader: R, delimiter: u8) -> Result<Vec<Region>> {
    let mut reader = csv::ReaderBuilder::new()
        .delimiter(delimiter)
        .has_headers(true)
        .from_reader(reader);
    let headers = reader.headers().context("Failed to read regions header row")?.clone();

    let group_idx = find_any_column(&headers, &["group", "group_id", "region"])
        .ok_or_else(|| anyhow!("Missing 'group' column"))?;
    let class_idx = find_any_column(&headers, &["class", "class_label", "label"])
        .ok_or_else(|| anyhow!("Missing 'class' column"))?;
    let row_idx = find_column(&headers, ROW_COLUMN).ok_or_else(|| anyhow!("Missing '{}' column", ROW_COLUMN))?;
    let col_idx = find_column(&headers, COL_COLUMN).ok_or_else(|| anyhow!("Missing '{}' column", COL_COLUMN))?;

    let mut order: Vec<String> = Vec::new();
    let mut by_group: HashMap<String, (String, Vec<(usize, usize)>)> = HashMap::new();
    for (i, result) in reader.records().enumerate() {
        let line = i + 2;
        let record = result.with_context(|| format!("Failed to read line {}", line))?;
        let group = record.get(group_idx).unwrap_or_default().trim().to_string();
        let class = record.get(class_idx).unwrap_or_default().trim().to_string();
        if group.is_empty() || class.is_empty() {
            return Err(anyhow!("Empty group or class at line {}", line));
        }
        let cell = (
            parse_index(&record, row_idx, ROW_COLUMN, line)?,
            parse_index(&record, col_idx, COL_COLUMN, line)?,
        );

        match by_group.get_mut(&group) {
            Some((existing, cells)) => {
                if *existing != class {
                    return Err(SpatialCvError::InconsistentGroup { group }.into());
                }
                cells.push(cell);
            }
            None => {
                order.push(group.clone());
                by_group.insert(group, (class, vec![cell]));
            }
        }
    }

    let regions: Vec<Region> = order
        .into_iter()
        .filter_map(|group| {
            by_group
                .remove(&group)
                .map(|(class, cells)| Region::from_cells(group, class, cells))
        })
        .collect();
    log::info!("Read {} labeled regions", regions.len());
    Ok(regions)
}

/// Write a classified grid as `row,col,class`; missing cells get an empty class.
pub fn write_class_grid_csv<P: AsRef<Path>>(grid: &ClassGrid, path: P) -> Result<()> {
    let path = path.as_ref();
    let file = File::create(path).with_context(|| format!("Failed to create output file: {}", path.display()))?;
    let mut writer = csv::WriterBuilder::new()
        .delimiter(delimiter_for(path))
        .from_writer(BufWriter::new(file));

    writer.write_record([ROW_COLUMN, COL_COLUMN, "class"])?;
    let (rows, cols) = grid.shape();
    for row in 0..rows {
        for col in 0..cols {
            writer.write_record([
                row.to_string().as_str(),
                col.to_string().as_str(),
                grid.label(row, col).unwrap_or_default(),
            ])?;
        }
    }
    writer.flush()?;
    Ok(())
}

/// Write `group,fold` pairs sorted by group id.
pub fn write_fold_assignment_csv<P: AsRef<Path>>(assignment: &FoldAssignment, path: P) -> Result<()> {
    let path = path.as_ref();
    let file = File::create(path).with_context(|| format!("Failed to create output file: {}", path.display()))?;
    let mut writer = csv::WriterBuilder::new()
        .delimiter(delimiter_for(path))
        .from_writer(BufWriter::new(file));

    writer.write_record(["group", "fold"])?;
    for (group, fold) in assignment.to_sorted_vec() {
        writer.write_record([group.as_str(), fold.to_string().as_str()])?;
    }
    writer.flush()?;
    Ok(())
}
