use crate::error::{Result, SisserError};
use crate::types::{CleanRecord, CleanTable, Column, CORRELATION_FIELDS, DROPPED_COLUMNS};
use crate::util::{clean_text, coerce_decimal_comma, Coerced};
use csv::ReaderBuilder;
use std::collections::BTreeMap;
use std::fs::File;
use std::path::Path;
use tracing::{debug, info, warn};

/// The extract as read from disk: header names and untyped cells.
#[derive(Debug, Clone, Default)]
pub struct RawTable {
    pub headers: Vec<String>,
    pub rows: Vec<Vec<Option<String>>>,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct LoadReport {
    pub total_rows: usize,
    /// Dropped columns that were actually present in the source.
    pub dropped_columns: Vec<String>,
    /// Cells per column that had text but failed numeric coercion.
    pub coercion_failures: BTreeMap<String, usize>,
}

impl LoadReport {
    pub fn total_coercion_failures(&self) -> usize {
        self.coercion_failures.values().sum()
    }
}

/// Read the raw extract. Cells are decoded lossily because the public
/// exports are not always valid UTF-8.
/// UTF-8 when the bytes are valid UTF-8, Latin-1 otherwise.
fn decode_field(bytes: &[u8]) -> String {
    match std::str::from_utf8(bytes) {
        Ok(s) => s.to_string(),
        Err(_) => bytes.iter().map(|&b| char::from(b)).collect(),
    }
}

pub fn load_raw(path: &Path, delimiter: u8) -> Result<RawTable> {
    let file = File::open(path).map_err(|source| SisserError::Load {
        path: path.to_path_buf(),
        source,
    })?;
    let mut rdr = ReaderBuilder::new()
        .delimiter(delimiter)
        .flexible(true)
        .from_reader(file);

    let headers: Vec<String> = rdr
        .byte_headers()?
        .iter()
        .map(|h| decode_field(h).trim_start_matches('\u{feff}').trim().to_string())
        .collect();

    let mut rows = Vec::new();
    for result in rdr.byte_records() {
        let record = result?;
        let mut row: Vec<Option<String>> = record
            .iter()
            .map(|cell| Some(decode_field(cell)))
            .collect();
        row.resize(headers.len(), None);
        rows.push(row);
    }
    debug!(path = %path.display(), rows = rows.len(), "raw extract read");
    Ok(RawTable { headers, rows })
}

enum Slot {
    Drop,
    Known(Column),
    Extra(usize),
}

/// Drop unused columns and coerce numeric text, keeping every row.
pub fn clean(raw: &RawTable) -> (CleanTable, LoadReport) {
    let mut table = CleanTable::default();
    let mut report = LoadReport {
        total_rows: raw.rows.len(),
        ..LoadReport::default()
    };

    let slots: Vec<Slot> = raw
        .headers
        .iter()
        .map(|name| {
            if DROPPED_COLUMNS.contains(&name.as_str()) {
                report.dropped_columns.push(name.clone());
                return Slot::Drop;
            }
            match Column::from_name(name) {
                Some(col) => {
                    if table.present.insert(col) {
                        Slot::Known(col)
                    } else {
                        warn!(column = col.name(), "duplicate column ignored");
                        Slot::Drop
                    }
                }
                None => {
                    table.extra_columns.push(name.clone());
                    Slot::Extra(table.extra_columns.len() - 1)
                }
            }
        })
        .collect();

    for row in &raw.rows {
        let mut record = CleanRecord {
            extra: vec![None; table.extra_columns.len()],
            ..CleanRecord::default()
        };
        for (slot, cell) in slots.iter().zip(row.iter()) {
            match slot {
                Slot::Drop => {}
                Slot::Extra(idx) => record.extra[*idx] = clean_text(cell.as_deref()),
                Slot::Known(col) if col.is_numeric() => {
                    let value = match coerce_decimal_comma(cell.as_deref()) {
                        Coerced::Value(v) => Some(v),
                        Coerced::Empty => None,
                        Coerced::Invalid => {
                            *report
                                .coercion_failures
                                .entry(col.name().to_string())
                                .or_insert(0) += 1;
                            None
                        }
                    };
                    record.set_numeric(*col, value);
                }
                Slot::Known(col) => record.set_text(*col, clean_text(cell.as_deref())),
            }
        }
        table.records.push(record);
    }

    for col in CORRELATION_FIELDS {
        if !table.has(col) {
            debug!(column = col.name(), "numeric column absent from source");
        }
    }
    for (column, count) in &report.coercion_failures {
        warn!(column = %column, count, "values could not be coerced to numbers and were nulled");
    }
    (table, report)
}

/// Read and clean the raw extract in one step.
pub fn load_and_clean(path: &Path, delimiter: u8) -> Result<(CleanTable, LoadReport)> {
    let raw = load_raw(path, delimiter)?;
    let (table, report) = clean(&raw);
    info!(
        rows = report.total_rows,
        dropped = report.dropped_columns.len(),
        nulled = report.total_coercion_failures(),
        "extract cleaned"
    );
    Ok((table, report))
}
