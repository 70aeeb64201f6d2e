use crate::dashboard::Dashboard;
use crate::error::{Result, SisserError};
use crate::types::{Column, CorrelationMatrix, CorrelationRow};
use serde::Serialize;
use std::path::Path;
use tabled::{settings::Style, Table, Tabled};
use tracing::debug;

pub fn write_csv<T: Serialize>(path: &Path, rows: &[T]) -> Result<()> {
    let mut wtr = csv::Writer::from_path(path)?;
    for r in rows {
        wtr.serialize(r)?;
    }
    wtr.flush()?;
    debug!(path = %path.display(), rows = rows.len(), "csv written");
    Ok(())
}

pub fn write_json<T: Serialize>(path: &Path, value: &T) -> Result<()> {
    let s = serde_json::to_string_pretty(value)?;
    std::fs::write(path, s)?;
    Ok(())
}

/// One row per field of the matrix, with a cell for every known
/// correlation field; fields absent from the source stay empty.
pub fn correlation_rows(matrix: &CorrelationMatrix) -> Vec<CorrelationRow> {
    matrix
        .fields
        .iter()
        .map(|field| {
            let cell = |other: Column| matrix.get(*field, other);
            CorrelationRow {
                field: field.name().to_string(),
                area: cell(Column::Area),
                premium: cell(Column::Premium),
                coverage_limit: cell(Column::CoverageLimit),
                estimated_productivity: cell(Column::EstimatedProductivity),
                insured_productivity: cell(Column::InsuredProductivity),
                federal_subsidy: cell(Column::FederalSubsidy),
            }
        })
        .collect()
}

/// Writes the tables exported on every dashboard run into `dir`, whatever
/// the chosen mode. Returns the files that could not be written.
pub fn write_dashboard_tables(dir: &Path, dash: &Dashboard) -> Vec<(&'static str, SisserError)> {
    let correlation = correlation_rows(&dash.correlation);
    let writes: [(&'static str, Result<()>); 4] = [
        ("estado_resumo.csv", write_csv(&dir.join("estado_resumo.csv"), &dash.states)),
        ("razao_social_resumo.csv", write_csv(&dir.join("razao_social_resumo.csv"), &dash.companies)),
        ("razao_social_estado.csv", write_csv(&dir.join("razao_social_estado.csv"), &dash.company_states)),
        ("correlacao.csv", write_csv(&dir.join("correlacao.csv"), &correlation)),
    ];
    writes
        .into_iter()
        .filter_map(|(name, res)| res.err().map(|e| (name, e)))
        .collect()
}

pub fn preview_table<T>(title: &str, note: Option<&str>, rows: &[T], max_rows: usize)
where
    T: Tabled + Clone,
{
    println!("{}", title);
    if let Some(n) = note {
        println!("({})", n);
    }
    println!();
    preview_table_rows(rows, max_rows);
}

pub fn preview_table_rows<T>(rows: &[T], max_rows: usize)
where
    T: Tabled + Clone,
{
    let slice: Vec<T> = rows.iter().take(max_rows).cloned().collect();
    if slice.is_empty() {
        println!("(no rows)\n");
        return;
    }
    let table_str = Table::new(slice).with(Style::markdown()).to_string();
    println!("{}\n", table_str);
}
