//! Export series to CSV.
//!
//! The export is meant to be easy to consume in spreadsheets or by the chart
//! renderer: one row per date, blank cells where an average is undefined.

use std::fs::File;
use std::io::Write;
use std::path::Path;

use chrono::NaiveDate;
use serde::Serialize;

use crate::domain::{ReconciledSeries, SmoothedSeries};
use crate::error::AppError;

#[derive(Serialize)]
struct ReconciledRow {
    date: NaiveDate,
    value: f64,
    provenance: &'static str,
    average: Option<f64>,
}

#[derive(Serialize)]
struct SmoothedRow {
    date: NaiveDate,
    value: f64,
    average: Option<f64>,
}

/// Write the reconciled headline series with its trailing averages.
pub fn write_reconciled_csv(
    path: &Path,
    reconciled: &ReconciledSeries,
    smoothed: &SmoothedSeries,
) -> Result<(), AppError> {
    let file = create(path)?;
    write_reconciled(file, reconciled, smoothed)
}

pub fn write_reconciled<W: Write>(
    writer: W,
    reconciled: &ReconciledSeries,
    smoothed: &SmoothedSeries,
) -> Result<(), AppError> {
    let mut out = csv::Writer::from_writer(writer);
    for point in &smoothed.points {
        let provenance = reconciled
            .provenance_at(point.date)
            .map(|p| p.as_str())
            .unwrap_or("");
        out.serialize(ReconciledRow {
            date: point.date,
            value: point.value,
            provenance,
            average: point.average,
        })
        .map_err(|e| AppError::new(2, format!("Failed to write export CSV row: {e}")))?;
    }
    out.flush()
        .map_err(|e| AppError::new(2, format!("Failed to flush export CSV: {e}")))?;
    Ok(())
}

/// Write a single smoothed series.
pub fn write_smoothed_csv(path: &Path, smoothed: &SmoothedSeries) -> Result<(), AppError> {
    let file = create(path)?;
    write_smoothed(file, smoothed)
}

pub fn write_smoothed<W: Write>(writer: W, smoothed: &SmoothedSeries) -> Result<(), AppError> {
    let mut out = csv::Writer::from_writer(writer);
    for point in &smoothed.points {
        out.serialize(SmoothedRow {
            date: point.date,
            value: point.value,
            average: point.average,
        })
        .map_err(|e| AppError::new(2, format!("Failed to write export CSV row: {e}")))?;
    }
    out.flush()
        .map_err(|e| AppError::new(2, format!("Failed to flush export CSV: {e}")))?;
    Ok(())
}

fn create(path: &Path) -> Result<File, AppError> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent).map_err(|e| {
            AppError::new(2, format!("Failed to create export directory '{}': {e}", parent.display()))
        })?;
    }
    File::create(path).map_err(|e| AppError::new(2, format!("Failed to create export CSV '{}': {e}", path.display())))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{DailySeries, EngineConfig};
    use crate::reconcile::reconcile;
    use crate::series::smooth;

    fn d(day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2020, 7, day).unwrap()
    }

    #[test]
    fn reconciled_export_marks_projected_rows() {
        let primary = DailySeries::from_pairs([(d(1), 10.0), (d(2), 20.0)]);
        let reference = DailySeries::from_pairs([(d(1), 5.0), (d(2), 10.0), (d(3), 10.0)]);
        let config = EngineConfig {
            min_overlap_days: 2,
            ..EngineConfig::default()
        };
        let reconciled = reconcile(&primary, &reference, &config).unwrap();
        let smoothed = smooth(&reconciled.to_series(), 2);

        let mut buf = Vec::new();
        write_reconciled(&mut buf, &reconciled, &smoothed).unwrap();
        let text = String::from_utf8(buf).unwrap();

        let expected = concat!(
            "date,value,provenance,average\n",
            "2020-07-01,10.0,reported,\n",
            "2020-07-02,20.0,reported,15.0\n",
            "2020-07-03,20.0,projected,20.0\n",
        );
        assert_eq!(text, expected);
    }

    #[test]
    fn smoothed_export_leaves_undefined_averages_blank() {
        let series = DailySeries::from_pairs([(d(1), 1.0), (d(2), 3.0)]);
        let mut buf = Vec::new();
        write_smoothed(&mut buf, &smooth(&series, 2)).unwrap();
        let text = String::from_utf8(buf).unwrap();
        assert_eq!(text, "date,value,average\n2020-07-01,1.0,\n2020-07-02,3.0,2.0\n");
    }
}
