//! CSV ingest.
//!
//! Turns one source file into a clean `DailySeries`:
//!
//! - **Strict schema** for the configured columns (clear errors + exit code 2)
//! - **Row filters** (e.g. `state = Washington`, `county = King`) applied first
//! - **Row-level tolerance**: malformed rows are dropped and counted, never fatal
//! - **Cumulative feeds** are differenced into daily counts (first row dropped)

use std::collections::HashMap;
use std::fs::File;
use std::io::Read;

use csv::StringRecord;
use tracing::{debug, warn};

use crate::config::SourceSpec;
use crate::domain::DailySeries;
use crate::error::AppError;
use crate::series::normalize::{DroppedRows, RawRow, SeriesNormalizer, difference};

/// A CSV record that could not be read at all.
#[derive(Debug, Clone)]
pub struct RowError {
    pub line: usize,
    pub message: String,
}

/// One source after ingest.
#[derive(Debug, Clone)]
pub struct LoadedSource {
    pub key: String,
    pub label: String,
    pub series: DailySeries,
    pub dropped: DroppedRows,
    pub row_errors: Vec<RowError>,
    /// Data rows in the file (header excluded).
    pub rows_read: usize,
    /// Rows removed by `filters` before normalization.
    pub rows_filtered: usize,
    pub cumulative: bool,
}

impl LoadedSource {
    /// Wrap an in-memory series (no file involved).
    pub fn from_series(key: impl Into<String>, label: impl Into<String>, series: DailySeries) -> Self {
        let rows_read = series.len();
        Self {
            key: key.into(),
            label: label.into(),
            series,
            dropped: DroppedRows::default(),
            row_errors: Vec::new(),
            rows_read,
            rows_filtered: 0,
            cumulative: false,
        }
    }

    /// Rows that made it into the series, relative to rows read.
    pub fn rows_dropped(&self) -> usize {
        self.dropped.total() + self.row_errors.len()
    }
}

/// Open and ingest the file named by `spec.path`.
pub fn load_source(spec: &SourceSpec) -> Result<LoadedSource, AppError> {
    let file = File::open(&spec.path).map_err(|e| {
        AppError::new(
            2,
            format!("Failed to open CSV '{}' for `{}`: {e}", spec.path.display(), spec.key),
        )
    })?;
    read_source(file, spec)
}

/// Ingest CSV data from any reader.
pub fn read_source<R: Read>(reader: R, spec: &SourceSpec) -> Result<LoadedSource, AppError> {
    let mut reader = csv::ReaderBuilder::new()
        .flexible(true)
        .trim(csv::Trim::All)
        .from_reader(reader);

    let headers = reader
        .headers()
        .map_err(|e| AppError::new(2, format!("Failed to read CSV headers for `{}`: {e}", spec.key)))?
        .clone();
    let header_map = build_header_map(&headers);

    let date_idx = require_column(&header_map, &spec.date_column, spec)?;
    let value_idx = require_column(&header_map, &spec.value_column, spec)?;
    let mut filters: Vec<(usize, &str)> = Vec::with_capacity(spec.filters.len());
    for (column, wanted) in &spec.filters {
        filters.push((require_column(&header_map, column, spec)?, wanted.as_str()));
    }

    let mut raw_rows = Vec::new();
    let mut row_errors = Vec::new();
    let mut rows_read = 0usize;
    let mut rows_filtered = 0usize;

    for (idx, result) in reader.records().enumerate() {
        // +2: records() starts after the header and CSV lines are 1-based.
        let line = idx + 2;
        rows_read += 1;

        let record = match result {
            Ok(r) => r,
            Err(e) => {
                row_errors.push(RowError {
                    line,
                    message: format!("CSV parse error: {e}"),
                });
                continue;
            }
        };

        let keep = filters
            .iter()
            .all(|&(col, wanted)| matches_filter(record.get(col), wanted));
        if !keep {
            rows_filtered += 1;
            continue;
        }

        raw_rows.push(RawRow {
            date: get_optional(&record, date_idx).map(str::to_string),
            value: get_optional(&record, value_idx).map(str::to_string),
        });
    }

    let normalizer = SeriesNormalizer::new(spec.date_formats.clone());
    let normalized = normalizer.normalize(raw_rows);
    let series = if spec.cumulative {
        difference(&normalized.series)
    } else {
        normalized.series
    };

    if normalized.dropped.total() > 0 || !row_errors.is_empty() {
        warn!(
            source = spec.key.as_str(),
            missing_date = normalized.dropped.missing_date,
            bad_date = normalized.dropped.bad_date,
            missing_value = normalized.dropped.missing_value,
            unreadable = row_errors.len(),
            "dropped malformed rows"
        );
    }
    debug!(
        source = spec.key.as_str(),
        rows_read,
        rows_filtered,
        kept = series.len(),
        cumulative = spec.cumulative,
        "loaded source"
    );

    Ok(LoadedSource {
        key: spec.key.clone(),
        label: spec.display_label().to_string(),
        series,
        dropped: normalized.dropped,
        row_errors,
        rows_read,
        rows_filtered,
        cumulative: spec.cumulative,
    })
}

fn build_header_map(headers: &StringRecord) -> HashMap<String, usize> {
    headers
        .iter()
        .enumerate()
        .map(|(idx, name)| (normalize_header_name(name), idx))
        .collect()
}

fn normalize_header_name(name: &str) -> String {
    // Spreadsheet exports often prefix the first header with a UTF-8 BOM; left
    // in place it makes the first column look missing.
    let name = name.trim().trim_start_matches('\u{feff}');
    name.to_ascii_lowercase()
}

fn require_column(header_map: &HashMap<String, usize>, name: &str, spec: &SourceSpec) -> Result<usize, AppError> {
    header_map.get(&normalize_header_name(name)).copied().ok_or_else(|| {
        AppError::new(
            2,
            format!(
                "Missing required column `{name}` in '{}' (source `{}`).",
                spec.path.display(),
                spec.key
            ),
        )
    })
}

fn get_optional(record: &StringRecord, idx: usize) -> Option<&str> {
    record.get(idx).map(str::trim).filter(|s| !s.is_empty())
}

fn matches_filter(value: Option<&str>, wanted: &str) -> bool {
    let Some(value) = value else { return false };
    value.trim().eq_ignore_ascii_case(wanted.trim())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;
    use std::collections::BTreeMap;
    use std::path::PathBuf;

    fn spec(date_column: &str, value_column: &str) -> SourceSpec {
        SourceSpec {
            key: "test".to_string(),
            label: None,
            path: PathBuf::from("memory.csv"),
            date_column: date_column.to_string(),
            value_column: value_column.to_string(),
            cumulative: false,
            date_formats: Vec::new(),
            tail_lag_days: None,
            filters: BTreeMap::new(),
        }
    }

    fn d(day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2020, 3, day).unwrap()
    }

    #[test]
    fn reads_bom_header_and_drops_bad_rows() {
        let csv = "\u{feff}Result_Date,Positives\n\
                   03/02/2020,4\n\
                   03/01/2020,2\n\
                   ,9\n\
                   Unknown,1\n\
                   03/03/2020,\n";
        let loaded = read_source(csv.as_bytes(), &spec("result_date", "POSITIVES")).unwrap();

        assert_eq!(loaded.rows_read, 5);
        assert_eq!(loaded.series.values(), vec![2.0, 4.0]);
        assert_eq!(loaded.dropped.missing_date, 1);
        assert_eq!(loaded.dropped.bad_date, 1);
        assert_eq!(loaded.dropped.missing_value, 1);
        assert_eq!(loaded.rows_dropped(), 3);
    }

    #[test]
    fn filters_then_differences_cumulative_totals() {
        let csv = "date,county,state,cases\n\
                   2020-03-01,King,Washington,100\n\
                   2020-03-01,Pierce,Washington,40\n\
                   2020-03-02,King,Washington,100\n\
                   2020-03-02,Pierce,Washington,41\n\
                   2020-03-03,king,Washington,150\n";
        let mut spec = spec("date", "cases");
        spec.cumulative = true;
        spec.filters.insert("county".to_string(), "King".to_string());
        spec.filters.insert("state".to_string(), "Washington".to_string());

        let loaded = read_source(csv.as_bytes(), &spec).unwrap();
        assert_eq!(loaded.rows_filtered, 2);
        let pairs: Vec<(NaiveDate, f64)> = loaded.series.iter().map(|r| (r.date, r.value)).collect();
        assert_eq!(pairs, vec![(d(2), 0.0), (d(3), 50.0)]);
    }

    #[test]
    fn missing_column_is_a_schema_error() {
        let csv = "date,cases\n2020-03-01,1\n";
        let err = read_source(csv.as_bytes(), &spec("date", "deaths")).unwrap_err();
        assert_eq!(err.exit_code(), 2);
        assert!(err.message().contains("deaths"));

        let mut filtered = spec("date", "cases");
        filtered.filters.insert("county".to_string(), "King".to_string());
        assert!(read_source(csv.as_bytes(), &filtered).is_err());
    }

    #[test]
    fn missing_file_is_an_input_error() {
        let mut spec = spec("date", "cases");
        spec.path = PathBuf::from("/definitely/not/here.csv");
        assert_eq!(load_source(&spec).unwrap_err().exit_code(), 2);
    }
}
