use crate::boundary::DEFAULT_TOLERANCE;
use crate::dashboard::DEFAULT_TOP_N;
use clap::{Args, Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

/// SISSER rural insurance analysis: preprocessing and dashboard tables
#[derive(Parser, Debug, Clone)]
#[command(name = "sisser-report", version)]
pub struct Settings {
    /// Logging level
    #[arg(
        long,
        global = true,
        env = "SISSER_LOG_LEVEL",
        default_value = "INFO",
        value_parser = ["DEBUG", "INFO", "WARNING", "ERROR"]
    )]
    pub log_level: String,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug, Clone)]
pub enum Command {
    /// Clean the raw extract and write the snapshot and simplified boundary
    Preprocess(PreprocessArgs),
    /// Build the dashboard tables from the snapshot
    Dashboard(DashboardArgs),
}

#[derive(Args, Debug, Clone)]
pub struct PreprocessArgs {
    /// Raw extract (CSV)
    #[arg(long, env = "SISSER_DATA", default_value = "datasets/dados_abertos_psr_2025.csv")]
    pub input: PathBuf,

    /// Field delimiter of the raw extract
    #[arg(long, default_value_t = ';')]
    pub delimiter: char,

    /// State boundaries (GeoJSON FeatureCollection with SIGLA_UF)
    #[arg(long, env = "SISSER_BOUNDARY_SOURCE", default_value = "datasets/BR_UF_2024.geojson")]
    pub boundary: PathBuf,

    /// Where to write the cleaned Parquet snapshot
    #[arg(long, env = "SISSER_SNAPSHOT", default_value = "assets/dados_v2.parquet")]
    pub snapshot: PathBuf,

    /// Where to write the enriched, simplified boundary
    #[arg(long, env = "SISSER_BOUNDARY", default_value = "assets/BR_UF_2024_simplificado.geojson")]
    pub boundary_out: PathBuf,

    /// Simplification tolerance in boundary coordinate units
    #[arg(long, default_value_t = DEFAULT_TOLERANCE)]
    pub tolerance: f64,
}

#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
pub enum ModeArg {
    /// By underwriting company
    RazaoSocial,
    /// Drill down into one state
    Estado,
}

#[derive(Args, Debug, Clone)]
pub struct DashboardArgs {
    /// Cleaned Parquet snapshot
    #[arg(long, env = "SISSER_SNAPSHOT", default_value = "assets/dados_v2.parquet")]
    pub snapshot: PathBuf,

    /// Simplified state boundary
    #[arg(long, env = "SISSER_BOUNDARY", default_value = "assets/BR_UF_2024_simplificado.geojson")]
    pub boundary: PathBuf,

    /// Analysis mode; prompts interactively when omitted
    #[arg(long, value_enum)]
    pub mode: Option<ModeArg>,

    /// State code for the by-state mode
    #[arg(long)]
    pub state: Option<String>,

    /// Metric used to rank companies
    #[arg(
        long,
        default_value = "numero_seguros",
        value_parser = ["numero_seguros", "contagem_estados", "area_total", "valor_total"]
    )]
    pub metric: String,

    /// Municipalities listed per top-N ranking
    #[arg(long, default_value_t = DEFAULT_TOP_N)]
    pub top: usize,

    /// Rows shown in each console preview
    #[arg(long, default_value_t = 10)]
    pub preview_rows: usize,

    /// Directory for CSV/JSON/GeoJSON exports
    #[arg(long, env = "SISSER_OUT_DIR", default_value = "relatorios")]
    pub out_dir: PathBuf,
}
