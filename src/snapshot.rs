// Parquet snapshot of the cleaned table.
//
// Writing the snapshot once during preprocessing lets every dashboard run
// skip the CSV parse. Known numeric columns are stored as Float64, every
// other column as UTF-8.
use crate::error::{Result, SisserError};
use crate::types::{CleanRecord, CleanTable, Column, DROPPED_COLUMNS};
use once_cell::sync::Lazy;
use polars::prelude::*;
use std::collections::HashMap;
use std::fs::File;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use tracing::{debug, info};

// Loaded snapshots keyed by path, kept for the life of the process.
static SNAPSHOT_CACHE: Lazy<Mutex<HashMap<PathBuf, Arc<CleanTable>>>> =
    Lazy::new(|| Mutex::new(HashMap::new()));

fn to_frame(table: &CleanTable) -> Result<DataFrame> {
    let mut columns: Vec<Series> = Vec::new();
    for col in Column::ALL.into_iter().filter(|c| table.has(*c)) {
        let series = if col.is_numeric() {
            let values: Vec<Option<f64>> = table.records.iter().map(|r| r.numeric(col)).collect();
            Series::new(col.name(), values)
        } else {
            let values: Vec<Option<&str>> = table.records.iter().map(|r| r.text(col)).collect();
            Series::new(col.name(), values)
        };
        columns.push(series);
    }
    for (idx, name) in table.extra_columns.iter().enumerate() {
        let values: Vec<Option<&str>> = table
            .records
            .iter()
            .map(|r| r.extra.get(idx).and_then(|v| v.as_deref()))
            .collect();
        columns.push(Series::new(name, values));
    }
    Ok(DataFrame::new(columns)?)
}

pub fn write_snapshot(table: &CleanTable, path: &Path) -> Result<()> {
    let mut df = to_frame(table)?;
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)?;
    }
    let file = File::create(path).map_err(|source| SisserError::Load {
        path: path.to_path_buf(),
        source,
    })?;
    ParquetWriter::new(file).finish(&mut df)?;
    info!(path = %path.display(), rows = df.height(), columns = df.width(), "snapshot written");
    Ok(())
}

pub fn read_snapshot(path: &Path) -> Result<CleanTable> {
    let file = File::open(path).map_err(|source| SisserError::Load {
        path: path.to_path_buf(),
        source,
    })?;
    let df = ParquetReader::new(file).finish()?;

    let mut table = CleanTable {
        records: vec![CleanRecord::default(); df.height()],
        ..CleanTable::default()
    };
    for series in df.get_columns() {
        let name = series.name();
        if DROPPED_COLUMNS.contains(&name) {
            continue;
        }
        match Column::from_name(name) {
            Some(col) if col.is_numeric() => {
                let casted = series.cast(&DataType::Float64)?;
                for (record, value) in table.records.iter_mut().zip(casted.f64()?.into_iter()) {
                    record.set_numeric(col, value.filter(|v| v.is_finite()));
                }
                table.present.insert(col);
            }
            Some(col) => {
                let casted = series.cast(&DataType::String)?;
                for (record, value) in table.records.iter_mut().zip(casted.str()?.into_iter()) {
                    record.set_text(col, value.map(str::to_string));
                }
                table.present.insert(col);
            }
            None => {
                let casted = series.cast(&DataType::String)?;
                for (record, value) in table.records.iter_mut().zip(casted.str()?.into_iter()) {
                    record.extra.push(value.map(str::to_string));
                }
                table.extra_columns.push(name.to_string());
            }
        }
    }
    debug!(path = %path.display(), rows = table.len(), "snapshot read");
    Ok(table)
}

/// Read a snapshot, reusing an earlier load of the same path.
pub fn load_snapshot_cached(path: &Path) -> Result<Arc<CleanTable>> {
    let mut cache = SNAPSHOT_CACHE.lock().unwrap_or_else(|e| e.into_inner());
    if let Some(table) = cache.get(path) {
        debug!(path = %path.display(), "snapshot cache hit");
        return Ok(Arc::clone(table));
    }
    let table = Arc::new(read_snapshot(path)?);
    cache.insert(path.to_path_buf(), Arc::clone(&table));
    Ok(table)
}
