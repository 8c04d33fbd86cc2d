//! Top-level application orchestration.
//!
//! `src/main.rs` is intentionally tiny; this module is the "real main" that:
//! - loads `.env` and installs logging
//! - parses CLI arguments
//! - runs the reconcile pipeline or a single-source smoothing pass
//! - writes synthetic feeds
//! - prints reports and writes optional exports

use clap::Parser;
use tracing::info;
use tracing_subscriber::EnvFilter;

use crate::cli::{Command, ReconcileArgs, ShowArgs, SimulateArgs, SmoothArgs};
use crate::config::{RunConfig, SourceSpec};
use crate::error::AppError;

pub mod pipeline;

/// Entry point for the `epi` binary.
pub fn run() -> Result<(), AppError> {
    // `.env` may carry EPI_CONFIG / EPI_LOG; a missing file is fine.
    dotenvy::dotenv().ok();

    // We want `epi` and `epi --config x.toml` to behave like `epi reconcile ...`.
    //
    // Clap requires a subcommand name, so we do a small, explicit rewrite of the
    // argv list before parsing.
    let argv = rewrite_args(std::env::args().collect());
    let cli = crate::cli::Cli::parse_from(argv);
    init_tracing(cli.verbose);

    match cli.command {
        Command::Reconcile(args) => handle_reconcile(args),
        Command::Smooth(args) => handle_smooth(args),
        Command::Simulate(args) => handle_simulate(args),
        Command::Show(args) => handle_show(args),
    }
}

/// Log to stderr so stdout only carries reports.
fn init_tracing(verbose: u8) {
    let default_level = match verbose {
        0 => "warn",
        1 => "info",
        _ => "debug",
    };
    let filter = EnvFilter::try_from_env("EPI_LOG").unwrap_or_else(|_| EnvFilter::new(default_level));

    // A second init (e.g. from tests) is not an error worth reporting.
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .try_init();
}

fn handle_reconcile(args: ReconcileArgs) -> Result<(), AppError> {
    let mut config = RunConfig::load(&args.config)?;
    config.apply_overrides(args.engine.overrides())?;

    let run = pipeline::run_reconcile(&config)?;

    println!("{}", crate::report::format_load_report(&run.sources));
    println!("{}", crate::report::format_bundle_summary(&run.bundle));
    if let Some(n) = args.recent {
        println!("{}", crate::report::format_recent(&run.bundle.headline, n));
    }

    // CLI paths win over the config's [output] section.
    if let Some(path) = args.export.as_ref().or(config.output.csv.as_ref()) {
        crate::io::export::write_reconciled_csv(path, &run.reconciled, &run.headline)?;
        info!(path = %path.display(), "wrote reconciled CSV");
    }
    if let Some(path) = args.bundle.as_ref().or(config.output.bundle.as_ref()) {
        crate::io::bundle::write_bundle_json(path, &run.bundle)?;
        info!(path = %path.display(), "wrote chart bundle");
    }

    Ok(())
}

fn handle_smooth(args: SmoothArgs) -> Result<(), AppError> {
    if args.window == 0 {
        return Err(AppError::new(2, "Window must be > 0."));
    }

    let spec = smooth_source_spec(&args);
    let loaded = crate::io::ingest::load_source(&spec)?;
    if loaded.series.is_empty() {
        return Err(AppError::new(3, format!("No usable rows in '{}'.", args.csv.display())));
    }

    let smoothed = crate::series::trim_unreliable_tail(
        &crate::series::smooth(&loaded.series, args.window),
        args.tail_lag_days,
    );
    let metric = crate::io::bundle::MetricSeries::from_smoothed(&spec.key, &loaded.label, args.tail_lag_days, &smoothed);

    println!("{}", crate::report::format_load_report(std::slice::from_ref(&loaded)));
    print!("{}", crate::report::format_metric_line(&metric));

    if let Some(path) = &args.export {
        crate::io::export::write_smoothed_csv(path, &smoothed)?;
        info!(path = %path.display(), "wrote smoothed CSV");
    }
    Ok(())
}

/// Describe an ad-hoc `epi smooth` source the same way a config file would.
fn smooth_source_spec(args: &SmoothArgs) -> SourceSpec {
    let key = args
        .csv
        .file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or("series")
        .to_string();
    SourceSpec {
        key,
        label: Some(args.value_column.clone()),
        path: args.csv.clone(),
        date_column: args.date_column.clone(),
        value_column: args.value_column.clone(),
        cumulative: args.cumulative,
        date_formats: args.date_formats.clone(),
        tail_lag_days: Some(args.tail_lag_days),
        filters: args.filters.iter().cloned().collect(),
    }
}

fn handle_simulate(args: SimulateArgs) -> Result<(), AppError> {
    let config = crate::data::SyntheticConfig::new(args.start, args.days, args.seed, args.lag_days, args.ratio);
    let feeds = crate::data::generate_feeds(&config)?;
    let path = crate::data::write_feeds(&args.out_dir, &feeds, &config)?;

    println!(
        "Wrote {} primary days and {} reference days to '{}'.",
        feeds.primary.len(),
        feeds.reference_cumulative.len(),
        args.out_dir.display()
    );
    println!("Run: epi reconcile --config {}", path.display());
    Ok(())
}

fn handle_show(args: ShowArgs) -> Result<(), AppError> {
    let bundle = crate::io::bundle::read_bundle_json(&args.bundle)?;
    println!("{}", crate::report::format_bundle_summary(&bundle));
    let rows = args.recent.unwrap_or(crate::report::RECENT_ROWS);
    println!("{}", crate::report::format_recent(&bundle.headline, rows));
    Ok(())
}

/// Rewrite argv so `epi` defaults to `epi reconcile`.
///
/// Rules:
/// - `epi`                       -> `epi reconcile`
/// - `epi --config x.toml ...`   -> `epi reconcile --config x.toml ...`
/// - `epi -v smooth ...`         -> unchanged (a subcommand is present)
/// - `epi --help/--version/-h`   -> unchanged (show top-level help/version)
fn rewrite_args(mut argv: Vec<String>) -> Vec<String> {
    let Some(arg1) = argv.get(1).cloned() else {
        argv.push("reconcile".to_string());
        return argv;
    };

    let wants_help_or_version = argv[1..]
        .iter()
        .any(|a| matches!(a.as_str(), "-h" | "--help" | "-V" | "--version" | "help"));
    if wants_help_or_version && arg1.starts_with('-') {
        return argv;
    }

    let has_subcommand = argv[1..]
        .iter()
        .any(|a| matches!(a.as_str(), "reconcile" | "smooth" | "simulate" | "show" | "help"));
    if has_subcommand {
        return argv;
    }

    // If the first token is a flag, treat it as "reconcile flags".
    if arg1.starts_with('-') {
        argv.insert(1, "reconcile".to_string());
        return argv;
    }

    // Otherwise, leave as-is (clap reports the unknown subcommand).
    argv
}
