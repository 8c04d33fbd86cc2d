//! Raw rows to clean daily series.
//!
//! Source files are messy: blank dates, footer rows, days with no count. None of
//! that should abort a run, so every malformed row is dropped and counted in
//! `DroppedRows` instead of being raised.

use chrono::NaiveDate;
use tracing::debug;

use crate::domain::{DailyRecord, DailySeries};

/// Date formats tried in order when a source does not configure its own.
pub const DEFAULT_DATE_FORMATS: [&str; 3] = ["%Y-%m-%d", "%m/%d/%Y", "%Y/%m/%d"];

/// A raw `(date, value)` pair before any parsing.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct RawRow {
    pub date: Option<String>,
    pub value: Option<String>,
}

impl RawRow {
    pub fn new(date: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            date: Some(date.into()),
            value: Some(value.into()),
        }
    }
}

impl From<&DailyRecord> for RawRow {
    fn from(record: &DailyRecord) -> Self {
        // `f64` Display is the shortest string that parses back to the same value.
        RawRow::new(record.date.format("%Y-%m-%d").to_string(), record.value.to_string())
    }
}

/// Counts of rows the normalizer discarded, by reason.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct DroppedRows {
    pub missing_date: usize,
    pub bad_date: usize,
    pub missing_value: usize,
}

impl DroppedRows {
    pub fn total(&self) -> usize {
        self.missing_date + self.bad_date + self.missing_value
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Normalized {
    pub series: DailySeries,
    pub dropped: DroppedRows,
    pub rows_read: usize,
}

#[derive(Debug, Clone)]
pub struct SeriesNormalizer {
    date_formats: Vec<String>,
}

impl Default for SeriesNormalizer {
    fn default() -> Self {
        Self {
            date_formats: DEFAULT_DATE_FORMATS.iter().map(|f| f.to_string()).collect(),
        }
    }
}

impl SeriesNormalizer {
    /// An empty format list falls back to `DEFAULT_DATE_FORMATS`.
    pub fn new(date_formats: Vec<String>) -> Self {
        if date_formats.is_empty() {
            Self::default()
        } else {
            Self { date_formats }
        }
    }

    pub fn normalize<I>(&self, rows: I) -> Normalized
    where
        I: IntoIterator<Item = RawRow>,
    {
        let mut dropped = DroppedRows::default();
        let mut records = Vec::new();
        let mut rows_read = 0usize;

        for row in rows {
            rows_read += 1;

            let Some(date_str) = row.date.as_deref().map(str::trim).filter(|s| !s.is_empty()) else {
                dropped.missing_date += 1;
                continue;
            };
            let Some(date) = self.parse_date(date_str) else {
                dropped.bad_date += 1;
                continue;
            };
            let Some(value) = row.value.as_deref().and_then(parse_value) else {
                dropped.missing_value += 1;
                continue;
            };

            records.push(DailyRecord::new(date, value));
        }

        let series = DailySeries::from_records(records);
        debug!(
            rows_read,
            kept = series.len(),
            dropped = dropped.total(),
            "normalized raw rows"
        );

        Normalized {
            series,
            dropped,
            rows_read,
        }
    }

    /// Parse a date using the configured formats.
    ///
    /// Date-times (`2020-03-01T00:00:00`, `2020-03-01 00:00:00`) are accepted by
    /// their date part; the time of day is ignored.
    pub fn parse_date(&self, s: &str) -> Option<NaiveDate> {
        let s = s.trim();
        if let Some(date) = self.try_formats(s) {
            return Some(date);
        }
        let date_part = s.split(['T', ' ']).next()?;
        if date_part.len() < s.len() {
            return self.try_formats(date_part);
        }
        None
    }

    fn try_formats(&self, s: &str) -> Option<NaiveDate> {
        self.date_formats
            .iter()
            .find_map(|fmt| NaiveDate::parse_from_str(s, fmt).ok())
    }
}

/// Parse a count. Blank, `NA`, `NaN` and non-finite values are missing.
pub fn parse_value(s: &str) -> Option<f64> {
    let s = s.trim();
    if s.is_empty() || s.eq_ignore_ascii_case("na") || s.eq_ignore_ascii_case("null") {
        return None;
    }
    let v = s.parse::<f64>().ok()?;
    if v.is_finite() { Some(v) } else { None }
}

/// Normalize an already-clean series again (a no-op by construction).
pub fn renormalize(normalizer: &SeriesNormalizer, series: &DailySeries) -> Normalized {
    normalizer.normalize(series.iter().map(RawRow::from))
}

/// Day-over-day differences of a cumulative counter.
///
/// The first row has nothing to diff against and is dropped, so the output is
/// one row shorter than the input (empty for inputs of length 0 or 1).
pub fn difference(series: &DailySeries) -> DailySeries {
    DailySeries::from_records(
        series
            .records()
            .windows(2)
            .map(|w| DailyRecord::new(w[1].date, w[1].value - w[0].value))
            .collect(),
    )
}
