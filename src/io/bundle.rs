//! Read/write chart bundle JSON files.
//!
//! The chart bundle is what the rendering side consumes:
//! - the shared display date range
//! - the reconciled headline metric (values, averages, provenance, calibration)
//! - every additional metric and derived ratio, smoothed
//!
//! It is also what `epi show` reads back for a quick summary.

use std::fs::File;
use std::path::Path;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::domain::{Calibration, Provenance, RatioMethod, ReconciledSeries, SmoothedSeries};
use crate::error::AppError;
use crate::series::range::DateRange;

pub const TOOL_NAME: &str = "epi";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChartBundle {
    pub tool: String,
    pub generated_on: NaiveDate,
    /// `None` when every series was empty.
    pub display_range: Option<DateRange>,
    pub headline: HeadlineMetric,
    #[serde(default)]
    pub metrics: Vec<MetricSeries>,
    #[serde(default)]
    pub ratios: Vec<MetricSeries>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HeadlineMetric {
    pub key: String,
    pub label: String,
    pub reference_label: String,
    pub last_reported_date: NaiveDate,
    pub window: usize,
    pub tail_lag_days: u32,
    pub calibration: Option<CalibrationInfo>,
    pub points: Vec<BundlePoint>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CalibrationInfo {
    pub overlap: DateRange,
    pub overlap_days: i64,
    pub ratio: f64,
    pub method: RatioMethod,
}

impl From<&Calibration> for CalibrationInfo {
    fn from(cal: &Calibration) -> Self {
        Self {
            overlap: cal.overlap,
            overlap_days: cal.overlap_days,
            ratio: cal.ratio,
            method: cal.method,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetricSeries {
    pub key: String,
    pub label: String,
    pub window: usize,
    pub tail_lag_days: u32,
    pub points: Vec<BundlePoint>,
}

impl MetricSeries {
    pub fn from_smoothed(key: &str, label: &str, tail_lag_days: u32, smoothed: &SmoothedSeries) -> Self {
        Self {
            key: key.to_string(),
            label: label.to_string(),
            window: smoothed.window,
            tail_lag_days,
            points: smoothed
                .points
                .iter()
                .map(|p| BundlePoint {
                    date: p.date,
                    value: p.value,
                    average: p.average,
                    provenance: None,
                })
                .collect(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BundlePoint {
    pub date: NaiveDate,
    pub value: f64,
    pub average: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub provenance: Option<Provenance>,
}

impl HeadlineMetric {
    pub fn new(
        key: &str,
        label: &str,
        reference_label: &str,
        reconciled: &ReconciledSeries,
        smoothed: &SmoothedSeries,
        tail_lag_days: u32,
    ) -> Self {
        Self {
            key: key.to_string(),
            label: label.to_string(),
            reference_label: reference_label.to_string(),
            last_reported_date: reconciled.last_reported_date(),
            window: smoothed.window,
            tail_lag_days,
            calibration: reconciled.calibration().map(CalibrationInfo::from),
            points: smoothed
                .points
                .iter()
                .map(|p| BundlePoint {
                    date: p.date,
                    value: p.value,
                    average: p.average,
                    provenance: reconciled.provenance_at(p.date),
                })
                .collect(),
        }
    }

    pub fn projected_count(&self) -> usize {
        self.points
            .iter()
            .filter(|p| p.provenance == Some(Provenance::Projected))
            .count()
    }
}

/// Write a chart bundle as pretty JSON.
pub fn write_bundle_json(path: &Path, bundle: &ChartBundle) -> Result<(), AppError> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent).map_err(|e| {
            AppError::new(2, format!("Failed to create bundle directory '{}': {e}", parent.display()))
        })?;
    }
    let file = File::create(path)
        .map_err(|e| AppError::new(2, format!("Failed to create bundle JSON '{}': {e}", path.display())))?;

    serde_json::to_writer_pretty(file, bundle)
        .map_err(|e| AppError::new(2, format!("Failed to write bundle JSON: {e}")))?;

    Ok(())
}

/// Read a chart bundle JSON file.
pub fn read_bundle_json(path: &Path) -> Result<ChartBundle, AppError> {
    let file = File::open(path)
        .map_err(|e| AppError::new(2, format!("Failed to open bundle JSON '{}': {e}", path.display())))?;
    let bundle: ChartBundle =
        serde_json::from_reader(file).map_err(|e| AppError::new(2, format!("Invalid bundle JSON: {e}")))?;
    if bundle.tool != TOOL_NAME {
        return Err(AppError::new(
            2,
            format!("'{}' was not written by {TOOL_NAME} (tool = {:?}).", path.display(), bundle.tool),
        ));
    }
    Ok(bundle)
}
