use std::path::PathBuf;
use thiserror::Error;

/// Errors produced while loading, cleaning and aggregating SISSER data.
#[derive(Error, Debug)]
pub enum SisserError {
    /// A source file could not be opened or read from disk.
    #[error("Failed to load {path}: {source}")]
    Load {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The raw extract is not valid CSV.
    #[error("Failed to parse CSV: {0}")]
    Csv(#[from] csv::Error),

    /// The columnar snapshot could not be written or read.
    #[error("Parquet snapshot error: {0}")]
    Parquet(#[from] polars::prelude::PolarsError),

    /// The boundary file is not a usable GeoJSON feature collection.
    #[error("Invalid GeoJSON: {0}")]
    GeoJson(String),

    #[error("Failed to serialize JSON: {0}")]
    Json(#[from] serde_json::Error),

    /// A column required by an aggregation is absent after cleaning.
    #[error("Missing column: {0}")]
    MissingColumn(&'static str),

    /// A selector (mode, metric) coming from the command line is not recognised.
    #[error("Invalid selection: {0}")]
    InvalidSelection(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl From<geojson::Error> for SisserError {
    fn from(err: geojson::Error) -> Self {
        SisserError::GeoJson(err.to_string())
    }
}

pub type Result<T> = std::result::Result<T, SisserError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_load_error_mentions_path() {
        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "no such file");
        let err = SisserError::Load {
            path: PathBuf::from("datasets/psr.csv"),
            source: io_err,
        };
        let msg = err.to_string();
        assert!(msg.contains("datasets/psr.csv"));
        assert!(msg.contains("no such file"));
    }

    #[test]
    fn test_missing_column_display() {
        let err = SisserError::MissingColumn("NR_APOLICE");
        assert_eq!(err.to_string(), "Missing column: NR_APOLICE");
    }

    #[test]
    fn test_from_serde_json() {
        let json_err = serde_json::from_str::<serde_json::Value>("{oops}").unwrap_err();
        let err: SisserError = json_err.into();
        assert!(err.to_string().starts_with("Failed to serialize JSON"));
    }
}
