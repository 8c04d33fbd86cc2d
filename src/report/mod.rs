//! Reporting utilities: run summaries and tables for the terminal.

pub mod format;

pub use format::{RECENT_ROWS, format_bundle_summary, format_load_report, format_metric_line, format_recent};
