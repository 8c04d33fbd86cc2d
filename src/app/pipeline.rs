//! Shared "reconcile pipeline" logic used by the CLI handlers and tests.
//!
//! Keeping this in one place avoids duplicating the core workflow:
//! load sources -> reconcile headline -> smooth + trim -> metrics -> ratios -> bundle
//!
//! The CLI can then focus on presentation (printing vs exports).

use std::collections::HashMap;

use rayon::prelude::*;
use tracing::{info, warn};

use crate::config::{RunConfig, SourceSpec};
use crate::domain::{DailySeries, ReconciledSeries, SmoothedSeries};
use crate::error::AppError;
use crate::io::bundle::{ChartBundle, HeadlineMetric, MetricSeries, TOOL_NAME};
use crate::io::ingest::{LoadedSource, load_source};
use crate::reconcile::{NamedSeries, ReconciliationEngine};
use crate::series::{DateRange, bounds_of_many, ratio_by_date, smooth, trim_unreliable_tail};

/// All computed outputs of a single `epi reconcile` run.
#[derive(Debug, Clone)]
pub struct RunOutput {
    /// Primary, reference, then metrics in config order.
    pub sources: Vec<LoadedSource>,
    pub reconciled: ReconciledSeries,
    /// Smoothed + trimmed headline (reported and projected values).
    pub headline: SmoothedSeries,
    pub display_range: Option<DateRange>,
    pub bundle: ChartBundle,
}

/// Load every configured source and run the full pipeline.
pub fn run_reconcile(config: &RunConfig) -> Result<RunOutput, AppError> {
    let specs: Vec<&SourceSpec> = std::iter::once(&config.primary)
        .chain(std::iter::once(&config.reference))
        .chain(&config.metrics)
        .collect();

    // Sources are independent files; read them in parallel.
    let loaded: Vec<LoadedSource> = specs
        .par_iter()
        .map(|spec| load_source(spec))
        .collect::<Result<Vec<_>, AppError>>()?;

    let mut loaded = loaded.into_iter();
    let (Some(primary), Some(reference)) = (loaded.next(), loaded.next()) else {
        return Err(AppError::new(4, "Primary and reference sources were not loaded."));
    };

    run_with_sources(config, primary, reference, loaded.collect())
}

/// Execute the pipeline with already loaded sources.
///
/// `metrics` must be in the same order as `config.metrics`.
pub fn run_with_sources(
    config: &RunConfig,
    primary: LoadedSource,
    reference: LoadedSource,
    metrics: Vec<LoadedSource>,
) -> Result<RunOutput, AppError> {
    if metrics.len() != config.metrics.len() {
        return Err(AppError::new(
            4,
            format!("Expected {} metric sources, got {}.", config.metrics.len(), metrics.len()),
        ));
    }

    // 1) Reconcile the headline metric.
    let engine = ReconciliationEngine::new(config.engine)?;
    let reconciled = engine.reconcile(
        &NamedSeries::new(&primary.label, &primary.series),
        &NamedSeries::new(&reference.label, &reference.series),
    )?;

    // 2) Smooth the reconciled values and hide the primary's unreliable tail.
    let window = config.engine.window;
    let headline_lag = config.tail_lag_for(&config.primary);
    let headline = trim_unreliable_tail(&smooth(&reconciled.to_series(), window), headline_lag);

    // 3) Additional metrics, each with its own lag.
    let mut metric_series = Vec::with_capacity(metrics.len());
    for (spec, source) in config.metrics.iter().zip(&metrics) {
        let lag = config.tail_lag_for(spec);
        let smoothed = trim_unreliable_tail(&smooth(&source.series, window), lag);
        metric_series.push(MetricSeries::from_smoothed(&spec.key, &source.label, lag, &smoothed));
    }

    // 4) Derived ratios over reported values only.
    let by_key: HashMap<&str, &DailySeries> = std::iter::once((config.primary.key.as_str(), &primary.series))
        .chain(
            config
                .metrics
                .iter()
                .zip(&metrics)
                .map(|(spec, source)| (spec.key.as_str(), &source.series)),
        )
        .collect();

    let ratio_lag = config.engine.tail_lag_days;
    let mut ratio_series = Vec::with_capacity(config.ratios.len());
    for ratio in &config.ratios {
        let (Some(num), Some(den)) = (
            by_key.get(ratio.numerator.as_str()),
            by_key.get(ratio.denominator.as_str()),
        ) else {
            return Err(AppError::new(
                2,
                format!("Ratio `{}` refers to an unknown series.", ratio.key),
            ));
        };
        let combined = ratio_by_date(num, den);
        if combined.is_empty() {
            warn!(ratio = ratio.key.as_str(), "ratio has no dates in common with a nonzero denominator");
        }
        let smoothed = trim_unreliable_tail(&smooth(&combined, window), ratio_lag);
        ratio_series.push(MetricSeries::from_smoothed(&ratio.key, ratio.display_label(), ratio_lag, &smoothed));
    }

    // 5) Shared display range.
    let display_range = shared_display_range(
        config,
        std::iter::once(headline.range())
            .chain(metric_series.iter().map(|m| points_range(&m.points)))
            .chain(ratio_series.iter().map(|m| points_range(&m.points))),
    );

    info!(
        headline = config.primary.key.as_str(),
        projected = reconciled.projected_count(),
        metrics = metric_series.len(),
        ratios = ratio_series.len(),
        "pipeline finished"
    );

    let bundle = ChartBundle {
        tool: TOOL_NAME.to_string(),
        generated_on: chrono::Local::now().date_naive(),
        display_range,
        headline: HeadlineMetric::new(
            &config.primary.key,
            &primary.label,
            &reference.label,
            &reconciled,
            &headline,
            headline_lag,
        ),
        metrics: metric_series,
        ratios: ratio_series,
    };

    let mut sources = Vec::with_capacity(2 + metrics.len());
    sources.push(primary);
    sources.push(reference);
    sources.extend(metrics);

    Ok(RunOutput {
        sources,
        reconciled,
        headline,
        display_range,
        bundle,
    })
}

fn points_range(points: &[crate::io::bundle::BundlePoint]) -> Option<DateRange> {
    match (points.first(), points.last()) {
        (Some(first), Some(last)) => DateRange::new(first.date, last.date),
        _ => None,
    }
}

/// Union of all ranges, with the configured start applied.
fn shared_display_range<I>(config: &RunConfig, ranges: I) -> Option<DateRange>
where
    I: IntoIterator<Item = Option<DateRange>>,
{
    let range = bounds_of_many(ranges)?;
    let Some(start) = config.display_start else {
        return Some(range);
    };
    match range.starting_at(start) {
        Some(clamped) => Some(clamped),
        None => {
            warn!(%start, %range, "display_start is after the last date; ignoring it");
            Some(range)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;
    use std::path::PathBuf;

    use crate::config::{OutputSpec, RatioSpec};
    use crate::domain::{EngineConfig, Provenance};

    fn d(day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2020, 5, day).unwrap()
    }

    fn spec(key: &str) -> SourceSpec {
        SourceSpec {
            key: key.to_string(),
            label: None,
            path: PathBuf::from(format!("{key}.csv")),
            date_column: "date".to_string(),
            value_column: "value".to_string(),
            cumulative: false,
            date_formats: Vec::new(),
            tail_lag_days: None,
            filters: Default::default(),
        }
    }

    fn config() -> RunConfig {
        RunConfig {
            display_start: None,
            engine: EngineConfig {
                window: 2,
                tail_lag_days: 1,
                min_overlap_days: 3,
                ..EngineConfig::default()
            },
            primary: spec("positives"),
            reference: spec("cases"),
            metrics: vec![spec("tests")],
            ratios: vec![RatioSpec {
                key: "rate".to_string(),
                label: Some("Positive rate".to_string()),
                numerator: "positives".to_string(),
                denominator: "tests".to_string(),
            }],
            output: OutputSpec::default(),
        }
    }

    fn sources() -> (LoadedSource, LoadedSource, Vec<LoadedSource>) {
        let primary = DailySeries::from_pairs([(d(1), 2.0), (d(2), 4.0), (d(3), 6.0)]);
        let reference = DailySeries::from_pairs([(d(1), 1.0), (d(2), 2.0), (d(3), 3.0), (d(4), 5.0), (d(5), 4.0)]);
        let tests = DailySeries::from_pairs([(d(1), 20.0), (d(2), 0.0), (d(3), 30.0), (d(4), 40.0)]);
        (
            LoadedSource::from_series("positives", "Positives", primary),
            LoadedSource::from_series("cases", "Cases", reference),
            vec![LoadedSource::from_series("tests", "Tests", tests)],
        )
    }

    #[test]
    fn reconciles_smooths_and_combines() {
        let (p, r, m) = sources();
        let out = run_with_sources(&config(), p, r, m).unwrap();

        assert_eq!(out.reconciled.last_reported_date(), d(3));
        assert_eq!(out.reconciled.projected_count(), 2);
        assert_eq!(out.reconciled.provenance_at(d(5)), Some(Provenance::Projected));
        assert_eq!(out.reconciled.to_series().values(), vec![2.0, 4.0, 6.0, 10.0, 8.0]);

        // Window 2, lag 1: the last day has no average.
        assert_eq!(out.headline.averages(), vec![None, Some(3.0), Some(5.0), Some(8.0), None]);

        let rate = &out.bundle.ratios[0];
        let dates: Vec<NaiveDate> = rate.points.iter().map(|p| p.date).collect();
        assert_eq!(dates, vec![d(1), d(3)]);
        assert_eq!(rate.label, "Positive rate");

        assert_eq!(out.display_range, DateRange::new(d(1), d(5)));
        assert_eq!(out.sources.len(), 3);
        assert_eq!(out.bundle.headline.reference_label, "Cases");
    }

    #[test]
    fn display_start_replaces_range_start() {
        let mut config = config();
        config.display_start = Some(d(2));
        let (p, r, m) = sources();
        let out = run_with_sources(&config, p, r, m).unwrap();
        assert_eq!(out.display_range, DateRange::new(d(2), d(5)));

        config.display_start = Some(d(20));
        let (p, r, m) = sources();
        let out = run_with_sources(&config, p, r, m).unwrap();
        assert_eq!(out.display_range, DateRange::new(d(1), d(5)));
    }

    #[test]
    fn short_overlap_is_insufficient_data() {
        let mut config = config();
        config.engine.min_overlap_days = 10;
        let (p, r, m) = sources();
        let err = run_with_sources(&config, p, r, m).unwrap_err();
        assert_eq!(err.exit_code(), 3);
    }

    #[test]
    fn empty_primary_names_the_source() {
        let (_, r, m) = sources();
        let p = LoadedSource::from_series("positives", "Positives", DailySeries::empty());
        let err = run_with_sources(&config(), p, r, m).unwrap_err();
        assert_eq!(err.exit_code(), 3);
        assert!(err.message().contains("Positives"));
    }
}
