//! Command-line parsing for the `epi` reconciliation tool.
//!
//! The goal of this module is to keep **argument parsing** and **command dispatch**
//! separate from the series/engine code.

use std::path::PathBuf;

use chrono::NaiveDate;
use clap::{ArgAction, Args, Parser, Subcommand};

use crate::config::EngineOverrides;
use crate::domain::{DEFAULT_TAIL_LAG_DAYS, DEFAULT_WINDOW, RatioMethod};

/// Top-level CLI.
#[derive(Debug, Parser)]
#[command(
    name = "epi",
    version,
    about = "Reconcile a lagged daily feed against a faster reference feed"
)]
pub struct Cli {
    /// Increase log verbosity (-v info, -vv debug). `EPI_LOG` takes precedence.
    #[arg(short = 'v', long, action = ArgAction::Count, global = true)]
    pub verbose: u8,

    #[command(subcommand)]
    pub command: Command,
}

/// CLI subcommands.
#[derive(Debug, Subcommand)]
pub enum Command {
    /// Load all configured sources, reconcile the headline metric, print a summary
    /// and write the configured exports.
    Reconcile(ReconcileArgs),
    /// Smooth a single CSV source (no reconciliation).
    Smooth(SmoothArgs),
    /// Write synthetic primary/reference feeds plus a matching `epi.toml`.
    Simulate(SimulateArgs),
    /// Print the summary of a previously written chart bundle.
    Show(ShowArgs),
}

/// Engine parameters; each one overrides the config file's `[engine]` value.
#[derive(Debug, Args, Clone, Default)]
pub struct EngineArgs {
    /// Trailing average window (rows).
    #[arg(long)]
    pub window: Option<usize>,

    /// Most recent days whose averages are hidden.
    #[arg(long)]
    pub tail_lag_days: Option<u32>,

    /// Minimum overlap (calendar days) required to calibrate the ratio.
    #[arg(long)]
    pub min_overlap_days: Option<u32>,

    /// Estimator for the primary/reference ratio.
    #[arg(long, value_enum)]
    pub ratio_method: Option<RatioMethod>,
}

impl EngineArgs {
    pub fn overrides(&self) -> EngineOverrides {
        EngineOverrides {
            window: self.window,
            tail_lag_days: self.tail_lag_days,
            min_overlap_days: self.min_overlap_days,
            ratio_method: self.ratio_method,
        }
    }
}

#[derive(Debug, Args, Clone)]
pub struct ReconcileArgs {
    /// Run configuration (TOML).
    #[arg(short = 'c', long, env = "EPI_CONFIG", default_value = "epi.toml", value_name = "TOML")]
    pub config: PathBuf,

    #[command(flatten)]
    pub engine: EngineArgs,

    /// Export the reconciled headline series to CSV (overrides `[output] csv`).
    #[arg(long, value_name = "CSV")]
    pub export: Option<PathBuf>,

    /// Write the chart bundle JSON (overrides `[output] bundle`).
    #[arg(long, value_name = "JSON")]
    pub bundle: Option<PathBuf>,

    /// Print the last N headline rows.
    #[arg(long, value_name = "N")]
    pub recent: Option<usize>,
}

#[derive(Debug, Args, Clone)]
pub struct SmoothArgs {
    /// Source CSV file.
    #[arg(long, value_name = "CSV")]
    pub csv: PathBuf,

    #[arg(long)]
    pub date_column: String,

    #[arg(long)]
    pub value_column: String,

    /// Values are running totals; difference them first.
    #[arg(long)]
    pub cumulative: bool,

    /// Keep rows where COLUMN equals VALUE (repeatable).
    #[arg(long = "filter", value_name = "COLUMN=VALUE", value_parser = parse_key_value)]
    pub filters: Vec<(String, String)>,

    /// Date format to try, chrono syntax (repeatable; replaces the defaults).
    #[arg(long = "date-format", value_name = "FMT")]
    pub date_formats: Vec<String>,

    #[arg(long, default_value_t = DEFAULT_WINDOW)]
    pub window: usize,

    #[arg(long, default_value_t = DEFAULT_TAIL_LAG_DAYS)]
    pub tail_lag_days: u32,

    /// Write the smoothed series to CSV.
    #[arg(long, value_name = "CSV")]
    pub export: Option<PathBuf>,
}

#[derive(Debug, Args, Clone)]
pub struct SimulateArgs {
    /// Directory for the generated CSVs and `epi.toml`.
    #[arg(long, value_name = "DIR")]
    pub out_dir: PathBuf,

    #[arg(long, default_value_t = 120)]
    pub days: usize,

    /// First simulated day (YYYY-MM-DD).
    #[arg(long, default_value = "2020-03-01")]
    pub start: NaiveDate,

    #[arg(long, default_value_t = 42)]
    pub seed: u64,

    /// Days the primary feed trails the reference.
    #[arg(long, default_value_t = 5)]
    pub lag_days: u32,

    /// True primary/reference scale factor.
    #[arg(long, default_value_t = 1.6)]
    pub ratio: f64,
}

#[derive(Debug, Args, Clone)]
pub struct ShowArgs {
    /// Chart bundle JSON produced by `epi reconcile --bundle`.
    #[arg(long, value_name = "JSON")]
    pub bundle: PathBuf,

    /// Print the last N headline rows.
    #[arg(long, value_name = "N")]
    pub recent: Option<usize>,
}

fn parse_key_value(s: &str) -> Result<(String, String), String> {
    let (key, value) = s
        .split_once('=')
        .ok_or_else(|| format!("expected COLUMN=VALUE, got `{s}`"))?;
    let key = key.trim();
    if key.is_empty() {
        return Err(format!("empty column name in `{s}`"));
    }
    Ok((key.to_string(), value.trim().to_string()))
}
