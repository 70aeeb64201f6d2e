//! Cleaning and aggregation of SISSER rural insurance records.
//!
//! [`loader`] turns the raw extract into a typed [`types::CleanTable`] and
//! [`snapshot`] persists it as Parquet. [`aggregate`] and [`dashboard`]
//! derive the state, company and company-per-state tables, and
//! [`boundary`] joins state totals onto the state polygons.
pub mod aggregate;
pub mod boundary;
pub mod dashboard;
pub mod error;
pub mod loader;
pub mod output;
pub mod settings;
pub mod snapshot;
pub mod types;
pub mod util;
