//! Synthetic feeds for demos and tests.
//!
//! Generates one epidemic wave and reports it twice:
//!
//! - a **primary** (county-style) feed: daily counts scaled by `ratio`, with
//!   reporting noise, missing the most recent `lag_days`
//! - a **reference** (national-style) feed: cumulative totals through the last
//!   day, alongside a decoy county that the config filters out
//!
//! `write_feeds` also writes an `epi.toml` pointing at both files, so
//! `epi simulate --out-dir demo && epi reconcile --config demo/epi.toml` works
//! end to end.

use std::fs::{File, create_dir_all};
use std::io::Write;
use std::path::{Path, PathBuf};

use chrono::{Days, NaiveDate};
use rand::prelude::*;
use rand::rngs::StdRng;
use rand_distr::{Normal, Poisson};

use crate::config::{OutputSpec, RatioSpec, RunConfig, SourceSpec};
use crate::domain::{DailyRecord, DailySeries, EngineConfig};
use crate::error::AppError;

const COUNTY: &str = "Synthetic";
const STATE: &str = "Washington";
const DECOY_COUNTY: &str = "Elsewhere";

/// Baseline daily cases before the wave.
const BASE_LEVEL: f64 = 20.0;
/// Relative std dev of primary reporting noise.
const REPORTING_NOISE: f64 = 0.08;
/// Share of reference cases that get tested in the primary's jurisdiction.
const TESTS_PER_CASE: f64 = 12.0;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SyntheticConfig {
    pub start: NaiveDate,
    pub days: usize,
    pub seed: u64,
    /// Days the primary feed is behind the reference feed.
    pub lag_days: u32,
    /// True primary/reference scale factor.
    pub ratio: f64,
    /// Peak daily reference cases of the wave.
    pub peak: f64,
}

impl SyntheticConfig {
    pub fn new(start: NaiveDate, days: usize, seed: u64, lag_days: u32, ratio: f64) -> Self {
        Self {
            start,
            days,
            seed,
            lag_days,
            ratio,
            peak: 400.0,
        }
    }
}

#[derive(Debug, Clone)]
pub struct SyntheticFeeds {
    /// Lagged primary daily counts.
    pub primary: DailySeries,
    /// Primary-style tests (not lagged), for a ratio metric.
    pub tests: DailySeries,
    /// Reference running totals for the target county (one day longer than
    /// the daily series; differencing drops it).
    pub reference_cumulative: DailySeries,
    /// Running totals for a decoy county sharing the reference file.
    pub decoy_cumulative: DailySeries,
}

pub fn generate_feeds(config: &SyntheticConfig) -> Result<SyntheticFeeds, AppError> {
    if config.days < 2 {
        return Err(AppError::new(2, "Synthetic feeds need at least 2 days."));
    }
    if config.lag_days as usize >= config.days {
        return Err(AppError::new(2, "Lag must be shorter than the simulated period."));
    }
    if !(config.ratio.is_finite() && config.ratio > 0.0) {
        return Err(AppError::new(2, "Ratio must be finite and > 0."));
    }
    if !(config.peak.is_finite() && config.peak > 0.0) {
        return Err(AppError::new(2, "Peak must be finite and > 0."));
    }

    let mut rng = StdRng::seed_from_u64(config.seed);
    let noise = Normal::new(0.0, REPORTING_NOISE)
        .map_err(|e| AppError::new(4, format!("Noise distribution error: {e}")))?;

    let reported_days = config.days - config.lag_days as usize;
    let mut primary = Vec::with_capacity(reported_days);
    let mut tests = Vec::with_capacity(config.days);
    let mut reference_cumulative = Vec::with_capacity(config.days + 1);
    let mut decoy_cumulative = Vec::with_capacity(config.days + 1);

    // Day zero seeds the running totals.
    let day_zero = config
        .start
        .checked_sub_days(Days::new(1))
        .ok_or_else(|| AppError::new(2, "Start date is out of range."))?;
    let mut total = 0.0;
    let mut decoy_total = 0.0;
    reference_cumulative.push(DailyRecord::new(day_zero, total));
    decoy_cumulative.push(DailyRecord::new(day_zero, decoy_total));

    for i in 0..config.days {
        let date = config
            .start
            .checked_add_days(Days::new(i as u64))
            .ok_or_else(|| AppError::new(2, "Simulated period runs past the supported date range."))?;
        let lambda = wave_level(i, config.days, config.peak);

        let cases = sample_count(&mut rng, lambda)?;
        total += cases;
        reference_cumulative.push(DailyRecord::new(date, total));

        decoy_total += sample_count(&mut rng, lambda * 0.5)?;
        decoy_cumulative.push(DailyRecord::new(date, decoy_total));

        if i < reported_days {
            let scale = (1.0 + noise.sample(&mut rng)).max(0.0);
            primary.push(DailyRecord::new(date, (cases * config.ratio * scale).round()));
        }
        tests.push(DailyRecord::new(date, sample_count(&mut rng, lambda * TESTS_PER_CASE)?));
    }

    Ok(SyntheticFeeds {
        primary: DailySeries::from_records(primary),
        tests: DailySeries::from_records(tests),
        reference_cumulative: DailySeries::from_records(reference_cumulative),
        decoy_cumulative: DailySeries::from_records(decoy_cumulative),
    })
}

/// Gaussian bump on top of a baseline, peaking two thirds into the period.
fn wave_level(day: usize, days: usize, peak: f64) -> f64 {
    let center = days as f64 * 2.0 / 3.0;
    let width = (days as f64 / 6.0).max(1.0);
    let z = (day as f64 - center) / width;
    BASE_LEVEL + (peak - BASE_LEVEL).max(0.0) * (-0.5 * z * z).exp()
}

fn sample_count(rng: &mut StdRng, lambda: f64) -> Result<f64, AppError> {
    let poisson = Poisson::new(lambda.max(1e-9))
        .map_err(|e| AppError::new(4, format!("Count distribution error: {e}")))?;
    Ok(poisson.sample(rng))
}

/// Write `primary.csv`, `tests.csv`, `reference.csv` and `epi.toml` into `dir`.
///
/// Returns the path of the written config.
pub fn write_feeds(dir: &Path, feeds: &SyntheticFeeds, config: &SyntheticConfig) -> Result<PathBuf, AppError> {
    create_dir_all(dir)
        .map_err(|e| AppError::new(2, format!("Failed to create '{}': {e}", dir.display())))?;

    // County-style exports: US dates and a trailing "unknown date" row.
    write_daily_csv(&dir.join("primary.csv"), "Result_Date,Positives", &feeds.primary)?;
    write_daily_csv(&dir.join("tests.csv"), "Result_Date,People_Tested", &feeds.tests)?;
    write_reference_csv(&dir.join("reference.csv"), feeds)?;

    let run = RunConfig {
        display_start: Some(config.start),
        engine: EngineConfig {
            tail_lag_days: config.lag_days,
            min_overlap_days: (config.days as u32 - config.lag_days).min(14),
            ..EngineConfig::default()
        },
        primary: SourceSpec {
            key: "positives".to_string(),
            label: Some("Positive results".to_string()),
            path: PathBuf::from("primary.csv"),
            date_column: "Result_Date".to_string(),
            value_column: "Positives".to_string(),
            cumulative: false,
            date_formats: Vec::new(),
            // Projected days come from the timely feed.
            tail_lag_days: Some(0),
            filters: Default::default(),
        },
        reference: SourceSpec {
            key: "new_cases".to_string(),
            label: Some("New cases (reference feed)".to_string()),
            path: PathBuf::from("reference.csv"),
            date_column: "date".to_string(),
            value_column: "cases".to_string(),
            cumulative: true,
            date_formats: Vec::new(),
            tail_lag_days: None,
            filters: [
                ("state".to_string(), STATE.to_string()),
                ("county".to_string(), COUNTY.to_string()),
            ]
            .into_iter()
            .collect(),
        },
        metrics: vec![SourceSpec {
            key: "tests".to_string(),
            label: Some("People tested".to_string()),
            path: PathBuf::from("tests.csv"),
            date_column: "Result_Date".to_string(),
            value_column: "People_Tested".to_string(),
            cumulative: false,
            date_formats: Vec::new(),
            tail_lag_days: None,
            filters: Default::default(),
        }],
        ratios: vec![RatioSpec {
            key: "positive_test_rate".to_string(),
            label: Some("Positive test rate".to_string()),
            numerator: "positives".to_string(),
            denominator: "tests".to_string(),
        }],
        output: OutputSpec {
            csv: Some(PathBuf::from("output/positives.csv")),
            bundle: Some(PathBuf::from("output/bundle.json")),
        },
    };

    let path = dir.join("epi.toml");
    std::fs::write(&path, run.to_toml_string()?)
        .map_err(|e| AppError::new(2, format!("Failed to write '{}': {e}", path.display())))?;
    Ok(path)
}

fn write_daily_csv(path: &Path, header: &str, series: &DailySeries) -> Result<(), AppError> {
    let mut file = File::create(path)
        .map_err(|e| AppError::new(2, format!("Failed to create '{}': {e}", path.display())))?;
    writeln!(file, "{header}").map_err(|e| write_err(path, e))?;
    for r in series {
        writeln!(file, "{},{}", r.date.format("%m/%d/%Y"), r.value).map_err(|e| write_err(path, e))?;
    }
    writeln!(file, ",{}", 3).map_err(|e| write_err(path, e))?;
    Ok(())
}

fn write_reference_csv(path: &Path, feeds: &SyntheticFeeds) -> Result<(), AppError> {
    let mut file = File::create(path)
        .map_err(|e| AppError::new(2, format!("Failed to create '{}': {e}", path.display())))?;
    writeln!(file, "date,county,state,cases").map_err(|e| write_err(path, e))?;
    for (target, decoy) in feeds.reference_cumulative.iter().zip(feeds.decoy_cumulative.iter()) {
        writeln!(file, "{},{COUNTY},{STATE},{}", target.date, target.value).map_err(|e| write_err(path, e))?;
        writeln!(file, "{},{DECOY_COUNTY},{STATE},{}", decoy.date, decoy.value).map_err(|e| write_err(path, e))?;
    }
    Ok(())
}

fn write_err(path: &Path, e: std::io::Error) -> AppError {
    AppError::new(2, format!("Failed to write '{}': {e}", path.display()))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config(seed: u64) -> SyntheticConfig {
        SyntheticConfig::new(NaiveDate::from_ymd_opt(2020, 3, 1).unwrap(), 60, seed, 5, 1.5)
    }

    #[test]
    fn same_seed_same_feeds() {
        let a = generate_feeds(&config(7)).unwrap();
        let b = generate_feeds(&config(7)).unwrap();
        assert_eq!(a.primary, b.primary);
        assert_eq!(a.reference_cumulative, b.reference_cumulative);

        let c = generate_feeds(&config(8)).unwrap();
        assert_ne!(a.reference_cumulative, c.reference_cumulative);
    }

    #[test]
    fn primary_lags_reference_by_lag_days() {
        let feeds = generate_feeds(&config(1)).unwrap();
        assert_eq!(feeds.primary.len(), 55);
        assert_eq!(feeds.reference_cumulative.len(), 61);

        let primary_end = feeds.primary.range().unwrap().max_date();
        let reference_end = feeds.reference_cumulative.range().unwrap().max_date();
        assert_eq!((reference_end - primary_end).num_days(), 5);

        let totals = feeds.reference_cumulative.values();
        assert!(totals.windows(2).all(|w| w[1] >= w[0]));
    }

    #[test]
    fn rejects_lag_longer_than_period() {
        let mut bad = config(1);
        bad.lag_days = 60;
        assert_eq!(generate_feeds(&bad).unwrap_err().exit_code(), 2);
    }

    #[test]
    fn writes_loadable_config() {
        let dir = tempfile::tempdir().unwrap();
        let feeds = generate_feeds(&config(3)).unwrap();
        let path = write_feeds(dir.path(), &feeds, &config(3)).unwrap();

        let run = RunConfig::load(&path).unwrap();
        assert_eq!(run.primary.path, dir.path().join("primary.csv"));
        assert!(run.primary.path.exists());
        assert!(run.reference.cumulative);
        assert_eq!(run.ratios.len(), 1);
    }
}
