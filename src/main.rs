// Entry point and high-level CLI flow.
//
// - `preprocess` cleans the raw extract, writes the Parquet snapshot and the
//   enriched, simplified state boundary.
// - `dashboard` loads the snapshot, builds the derived tables and shows
//   either the by-company or the by-state view, exporting each table.
//   Without `--mode` the user picks the view from a menu and can go back to
//   it after each run.
use anyhow::{bail, Context, Result};
use clap::Parser;
use sisser_report::dashboard::{self, AnalysisMode, CompanyMetric, Dashboard};
use sisser_report::settings::{Command, DashboardArgs, ModeArg, PreprocessArgs, Settings};
use sisser_report::types::CleanTable;
use sisser_report::{aggregate, boundary, error, loader, output, snapshot, util};
use std::io::{self, Write};
use std::path::Path;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

fn setup_logging(log_level: &str) {
    let normalised = match log_level.to_uppercase().as_str() {
        "DEBUG" => "debug",
        "WARNING" => "warn",
        "ERROR" => "error",
        _ => "info",
    };
    // RUST_LOG wins when set.
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(normalised));
    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_target(false).with_writer(io::stderr))
        .init();
}

/// Read a single line of input after printing the common "Enter choice:" prompt.
///
/// Returns `None` once stdin is closed.
fn read_choice() -> Option<String> {
    print!("Enter choice: ");
    let _ = io::stdout().flush();
    let mut buf = String::new();
    match io::stdin().read_line(&mut buf) {
        Ok(0) | Err(_) => None,
        Ok(_) => Some(buf.trim().to_string()),
    }
}

enum MenuChoice {
    Mode(AnalysisMode),
    Invalid,
    Closed,
}

/// Ask whether to go back to the analysis selection menu.
///
/// Returns `true` if the user chose `Y`, `false` if they chose `N`.
fn prompt_back_to_menu() -> bool {
    loop {
        print!("Back to Analysis Selection (Y/N): ");
        let _ = io::stdout().flush();
        let mut buf = String::new();
        if io::stdin().read_line(&mut buf).unwrap_or(0) == 0 {
            return false;
        }
        match buf.trim().to_uppercase().as_str() {
            "Y" => return true,
            "N" => return false,
            _ => println!("Invalid choice. Please enter Y or N."),
        }
    }
}

fn handle_preprocess(args: &PreprocessArgs) -> Result<()> {
    if !args.delimiter.is_ascii() {
        bail!("delimiter must be a single ASCII character");
    }
    let (table, load_report) = loader::load_and_clean(&args.input, args.delimiter as u8)
        .with_context(|| format!("loading {}", args.input.display()))?;
    println!(
        "Processing dataset... ({} rows loaded, {} columns dropped)",
        util::format_int(load_report.total_rows),
        load_report.dropped_columns.len()
    );
    for (column, count) in &load_report.coercion_failures {
        println!(
            "Note: {} values in {} could not be read as numbers and were left empty.",
            util::format_int(*count),
            column
        );
    }

    snapshot::write_snapshot(&table, &args.snapshot)
        .with_context(|| format!("writing {}", args.snapshot.display()))?;
    println!("Snapshot saved to {}", args.snapshot.display());

    let states = aggregate::aggregate_by_state(&table).unwrap_or_else(|e| {
        tracing::warn!(error = %e, "state totals unavailable; boundary keeps null metrics");
        Vec::new()
    });
    let boundary = boundary::load_boundary(&args.boundary)
        .with_context(|| format!("loading {}", args.boundary.display()))?;
    let enriched = boundary::merge_geo(&boundary, &states);
    let simplified = boundary::simplify_boundary(&enriched, args.tolerance);
    boundary::write_boundary(&simplified, &args.boundary_out)?;
    println!(
        "Boundary saved to {} ({} states)\n",
        args.boundary_out.display(),
        simplified.features.len()
    );
    Ok(())
}

fn select_mode(table: &CleanTable) -> MenuChoice {
    println!("Select analysis type:");
    println!("[1] Razão Social");
    println!("[2] Estado\n");
    let Some(choice) = read_choice() else {
        return MenuChoice::Closed;
    };
    match choice.as_str() {
        "1" => MenuChoice::Mode(AnalysisMode::ByCompany),
        "2" => {
            let states = dashboard::available_states(table);
            println!("Available states: {}", states.join(", "));
            match read_choice() {
                Some(state) => MenuChoice::Mode(AnalysisMode::ByState(state.to_uppercase())),
                None => MenuChoice::Closed,
            }
        }
        _ => {
            println!("Invalid choice. Please enter 1 or 2.\n");
            MenuChoice::Invalid
        }
    }
}

fn export(dir: &Path, name: &str, write: impl FnOnce(&Path) -> error::Result<()>) {
    let path = dir.join(name);
    if let Err(e) = write(&path) {
        eprintln!("Write error: {}", e);
    }
}

fn show_by_company(dash: &Dashboard, args: &DashboardArgs, metric: CompanyMetric) {
    let sorted = dashboard::sort_companies(&dash.companies, metric);
    output::preview_table(
        &format!("{} por Razão Social", metric.label()),
        Some("sorted descending"),
        &sorted,
        args.preview_rows,
    );
    output::preview_table("Métricas", None, &dashboard::metric_cards(&dash.companies), 3);
    output::preview_table(
        "Estados em destaque",
        None,
        &dashboard::state_leaders(&dash.states),
        3,
    );

    let correlation = output::correlation_rows(&dash.correlation);
    output::preview_table("Correlação entre parâmetros", None, &correlation, correlation.len());
    let shares = dashboard::value_share(&dash.companies);
    output::preview_table(
        "Distribuição do Valor Total por Razão Social",
        None,
        &shares,
        args.preview_rows,
    );
    export(&args.out_dir, "participacao_valor.csv", |p| output::write_csv(p, &shares));
    println!("(Full tables exported to {})\n", args.out_dir.display());
}

fn show_by_state(table: &CleanTable, dash: &Dashboard, args: &DashboardArgs, state: &str) {
    let view = dashboard::state_view(table, dash, state, args.top);
    if view.is_empty() {
        println!("No records for state {}.\n", state);
        return;
    }
    let top_note = format!("Top {}", args.top);
    output::preview_table(
        &format!("Municípios com Maior Área em {}", state),
        Some(&top_note),
        &view.top_area,
        args.top,
    );
    output::preview_table(
        &format!("Municípios com Maior Valor Total em {}", state),
        Some(&top_note),
        &view.top_value,
        args.top,
    );
    match view.correlation {
        Some(r) => println!("Correlação Área x Valor: {:.2}\n", r),
        None => println!("Correlação Área x Valor: n/a\n"),
    }
    output::preview_table(
        &format!("Número de seguros em {} por razão social", state),
        None,
        &view.companies,
        args.preview_rows,
    );

    let mut municipalities = view.top_area.clone();
    for m in &view.top_value {
        if !municipalities.iter().any(|x| x.municipality == m.municipality) {
            municipalities.push(m.clone());
        }
    }
    export(&args.out_dir, &format!("municipios_{}.csv", state), |p| {
        output::write_csv(p, &municipalities)
    });
    println!("(Full tables exported to {})\n", args.out_dir.display());
}

fn handle_dashboard(args: &DashboardArgs) -> Result<()> {
    let metric: CompanyMetric = args.metric.parse()?;
    let table = snapshot::load_snapshot_cached(&args.snapshot)
        .with_context(|| format!("loading {} (run `preprocess` first)", args.snapshot.display()))?;
    let dash = Dashboard::build(&table);

    std::fs::create_dir_all(&args.out_dir)
        .with_context(|| format!("creating {}", args.out_dir.display()))?;
    for (name, e) in output::write_dashboard_tables(&args.out_dir, &dash) {
        eprintln!("Write error ({}): {}", name, e);
    }
    let summary = dashboard::generate_summary(&table, &dash);
    export(&args.out_dir, "resumo.json", |p| output::write_json(p, &summary));

    match boundary::load_boundary(&args.boundary) {
        Ok(fc) => {
            let merged = boundary::merge_geo(&fc, &dash.states);
            export(&args.out_dir, "mapa_estados.geojson", |p| {
                boundary::write_boundary(&merged, p)
            });
        }
        Err(e) => eprintln!("Map data skipped: {}", e),
    }

    println!(
        "Dataset: {} rows, {} policies, {} companies, {} states\n",
        util::format_int(summary.total_rows),
        util::format_int(summary.total_policies),
        util::format_int(summary.total_companies),
        util::format_int(summary.total_states)
    );

    let fixed_mode = match (args.mode, &args.state) {
        (Some(ModeArg::RazaoSocial), _) => Some(AnalysisMode::ByCompany),
        (Some(ModeArg::Estado), Some(state)) => Some(AnalysisMode::ByState(state.to_uppercase())),
        (Some(ModeArg::Estado), None) => bail!("--mode estado needs --state"),
        (None, _) => None,
    };

    loop {
        let mode = match &fixed_mode {
            Some(mode) => mode.clone(),
            None => match select_mode(&table) {
                MenuChoice::Mode(mode) => mode,
                MenuChoice::Invalid => continue,
                MenuChoice::Closed => break,
            },
        };
        match &mode {
            AnalysisMode::ByCompany => show_by_company(&dash, args, metric),
            AnalysisMode::ByState(state) => show_by_state(&table, &dash, args, state),
        }
        if fixed_mode.is_some() || !prompt_back_to_menu() {
            break;
        }
    }
    Ok(())
}

fn main() -> Result<()> {
    let settings = Settings::parse();
    setup_logging(&settings.log_level);
    tracing::info!("sisser-report v{} starting", env!("CARGO_PKG_VERSION"));

    match &settings.command {
        Command::Preprocess(args) => handle_preprocess(args),
        Command::Dashboard(args) => handle_dashboard(args),
    }
}
