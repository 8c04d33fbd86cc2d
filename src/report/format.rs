//! Formatted terminal output.
//!
//! All printing goes through strings built here so:
//! - the pipeline stays free of presentation concerns
//! - output changes are localized (and easy to assert on in tests)

use crate::io::bundle::{BundlePoint, ChartBundle, HeadlineMetric, MetricSeries};
use crate::io::ingest::LoadedSource;

/// Rows shown in the "recent days" table.
pub const RECENT_ROWS: usize = 10;

/// Summary of a reconcile run (or a bundle read back by `epi show`).
pub fn format_bundle_summary(bundle: &ChartBundle) -> String {
    let mut out = String::new();
    let headline = &bundle.headline;

    out.push_str("=== epi - Reconciled Daily Series ===\n");
    out.push_str(&format!("Generated: {}\n", bundle.generated_on));
    match &bundle.display_range {
        Some(range) => out.push_str(&format!("Display range: {range} ({} days)\n", range.span_days())),
        None => out.push_str("Display range: (no data)\n"),
    }

    out.push_str(&format!("\nHeadline: {} [{}]\n", headline.label, headline.key));
    out.push_str(&format!("- last reported: {}\n", headline.last_reported_date));
    match &headline.calibration {
        Some(cal) => {
            out.push_str(&format!("- reference: {}\n", headline.reference_label));
            out.push_str(&format!(
                "- calibration: ratio={:.4} ({}) over {} ({} days)\n",
                cal.ratio,
                cal.method.display_name(),
                cal.overlap,
                cal.overlap_days
            ));
            out.push_str(&format!("- projected days: {}\n", headline.projected_count()));
        }
        None => out.push_str(&format!(
            "- reference: {} (not ahead of primary, nothing projected)\n",
            headline.reference_label
        )),
    }
    out.push_str(&format!(
        "- {}\n",
        fmt_latest(&headline.points, headline.window, headline.tail_lag_days)
    ));

    if !bundle.metrics.is_empty() {
        out.push_str("\nMetrics:\n");
        for metric in &bundle.metrics {
            out.push_str(&format_metric_line(metric));
        }
    }
    if !bundle.ratios.is_empty() {
        out.push_str("\nRatios:\n");
        for ratio in &bundle.ratios {
            out.push_str(&format_metric_line(ratio));
        }
    }
    out.push('\n');

    out
}

/// One line per smoothed metric: label, rows, latest average.
pub fn format_metric_line(metric: &MetricSeries) -> String {
    format!(
        "  {:<28} n={:<5} {}\n",
        truncate(&format!("{} [{}]", metric.label, metric.key), 28),
        metric.points.len(),
        fmt_latest(&metric.points, metric.window, metric.tail_lag_days)
    )
}

/// Rows read/filtered/dropped per loaded source.
pub fn format_load_report(sources: &[LoadedSource]) -> String {
    let mut out = String::new();
    out.push_str("Sources:\n");
    for s in sources {
        let range = s
            .series
            .range()
            .map(|r| r.to_string())
            .unwrap_or_else(|| "(empty)".to_string());
        out.push_str(&format!(
            "  {:<20} read={:<6} filtered={:<6} dropped={:<4} kept={:<5} {range}{}\n",
            truncate(&s.key, 20),
            s.rows_read,
            s.rows_filtered,
            s.rows_dropped(),
            s.series.len(),
            if s.cumulative { " (differenced)" } else { "" },
        ));
    }
    out
}

/// Table of the last `n` headline rows.
pub fn format_recent(headline: &HeadlineMetric, n: usize) -> String {
    let mut out = String::new();
    out.push_str(format!("{:<12} {:>12} {:>12} {:<10}", "date", "value", "average", "source").trim_end());
    out.push('\n');
    out.push_str(format!("{:-<12} {:-<12} {:-<12} {:-<10}", "", "", "", "").trim_end());
    out.push('\n');

    let start = headline.points.len().saturating_sub(n);
    for p in &headline.points[start..] {
        let average = p.average.map(|a| format!("{a:.2}")).unwrap_or_else(|| "-".to_string());
        let source = p.provenance.map(|p| p.as_str()).unwrap_or("");
        out.push_str(format!("{:<12} {:>12.2} {:>12} {:<10}", p.date.to_string(), p.value, average, source).trim_end());
        out.push('\n');
    }

    out
}

fn fmt_latest(points: &[BundlePoint], window: usize, tail_lag_days: u32) -> String {
    let latest = points
        .iter()
        .rev()
        .find_map(|p| p.average.map(|a| (p.date, a)));
    match latest {
        Some((date, avg)) => format!("{window}-day avg {avg:.2} as of {date} (lag {tail_lag_days}d)"),
        None => format!("{window}-day avg undefined (lag {tail_lag_days}d)"),
    }
}

fn truncate(s: &str, max: usize) -> String {
    if s.chars().count() <= max {
        return s.to_string();
    }
    let mut out: String = s.chars().take(max.saturating_sub(1)).collect();
    out.push('.');
    out
}
