//! Shared domain types.
//!
//! These types are kept small so they can be:
//!
//! - handed between the normalizer, smoother and reconciliation engine
//! - exported to CSV/JSON for the rendering side
//! - rebuilt from scratch on every run (nothing here is persisted)

use chrono::NaiveDate;
use clap::ValueEnum;
use serde::{Deserialize, Serialize};

use crate::error::EngineError;
use crate::series::range::DateRange;

/// One day's value for one series.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct DailyRecord {
    pub date: NaiveDate,
    pub value: f64,
}

impl DailyRecord {
    pub fn new(date: NaiveDate, value: f64) -> Self {
        Self { date, value }
    }
}

/// A clean daily series.
///
/// Invariants (enforced by every constructor):
/// - strictly increasing by date (no duplicates)
/// - every value is finite
#[derive(Debug, Clone, PartialEq, Default)]
pub struct DailySeries {
    records: Vec<DailyRecord>,
}

impl DailySeries {
    pub fn empty() -> Self {
        Self::default()
    }

    /// Build a series from records in any order.
    ///
    /// Non-finite values are dropped, records are sorted by date (stable) and
    /// for duplicate dates the last record seen wins.
    pub fn from_records(records: Vec<DailyRecord>) -> Self {
        let mut records: Vec<DailyRecord> = records.into_iter().filter(|r| r.value.is_finite()).collect();
        records.sort_by_key(|r| r.date);

        let mut out: Vec<DailyRecord> = Vec::with_capacity(records.len());
        for record in records {
            match out.last_mut() {
                Some(prev) if prev.date == record.date => *prev = record,
                _ => out.push(record),
            }
        }

        Self { records: out }
    }

    /// Convenience constructor from `(date, value)` pairs (same rules as `from_records`).
    pub fn from_pairs<I>(pairs: I) -> Self
    where
        I: IntoIterator<Item = (NaiveDate, f64)>,
    {
        Self::from_records(
            pairs
                .into_iter()
                .map(|(date, value)| DailyRecord::new(date, value))
                .collect(),
        )
    }

    pub fn records(&self) -> &[DailyRecord] {
        &self.records
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, DailyRecord> {
        self.records.iter()
    }

    pub fn values(&self) -> Vec<f64> {
        self.records.iter().map(|r| r.value).collect()
    }

    /// Date range covered by the series, `None` when empty.
    pub fn range(&self) -> Option<DateRange> {
        let first = self.records.first()?;
        let last = self.records.last()?;
        DateRange::new(first.date, last.date)
    }

    pub fn value_at(&self, date: NaiveDate) -> Option<f64> {
        self.records
            .binary_search_by_key(&date, |r| r.date)
            .ok()
            .map(|idx| self.records[idx].value)
    }

    /// Records whose date falls inside `range` (inclusive on both ends).
    pub fn in_range(&self, range: &DateRange) -> &[DailyRecord] {
        let start = self.records.partition_point(|r| r.date < range.min_date());
        let end = self.records.partition_point(|r| r.date <= range.max_date());
        &self.records[start..end.max(start)]
    }
}

impl<'a> IntoIterator for &'a DailySeries {
    type Item = &'a DailyRecord;
    type IntoIter = std::slice::Iter<'a, DailyRecord>;

    fn into_iter(self) -> Self::IntoIter {
        self.records.iter()
    }
}

/// A raw value paired with its trailing average.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SmoothedPoint {
    pub date: NaiveDate,
    pub value: f64,
    /// `None` while the window is not yet full, or when the date sits in the
    /// unreliable (under-reported) tail.
    pub average: Option<f64>,
}

/// Output of the trend smoother: one optional average per input row.
#[derive(Debug, Clone, PartialEq)]
pub struct SmoothedSeries {
    pub window: usize,
    pub points: Vec<SmoothedPoint>,
}

impl SmoothedSeries {
    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    pub fn averages(&self) -> Vec<Option<f64>> {
        self.points.iter().map(|p| p.average).collect()
    }

    pub fn range(&self) -> Option<DateRange> {
        let first = self.points.first()?;
        let last = self.points.last()?;
        DateRange::new(first.date, last.date)
    }
}

/// Where a reconciled value came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Provenance {
    /// Reported by the primary source.
    Reported,
    /// Projected from the reference source.
    Projected,
}

impl Provenance {
    pub fn as_str(self) -> &'static str {
        match self {
            Provenance::Reported => "reported",
            Provenance::Projected => "projected",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ReconciledPoint {
    pub date: NaiveDate,
    pub value: f64,
    pub provenance: Provenance,
}

/// How the projection ratio was calibrated.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Calibration {
    pub overlap: DateRange,
    /// Inclusive calendar-day length of `overlap`.
    pub overlap_days: i64,
    pub ratio: f64,
    pub method: RatioMethod,
}

/// Primary values followed by projected values.
///
/// All `Reported` points strictly precede all `Projected` points and
/// `last_reported_date` is the date of the last `Reported` point.
#[derive(Debug, Clone, PartialEq)]
pub struct ReconciledSeries {
    points: Vec<ReconciledPoint>,
    last_reported_date: NaiveDate,
    calibration: Option<Calibration>,
}

impl ReconciledSeries {
    /// Every primary record flagged `Reported`, no projection.
    pub(crate) fn reported_only(primary: &[DailyRecord], last_reported_date: NaiveDate) -> Self {
        Self {
            points: primary
                .iter()
                .map(|r| ReconciledPoint {
                    date: r.date,
                    value: r.value,
                    provenance: Provenance::Reported,
                })
                .collect(),
            last_reported_date,
            calibration: None,
        }
    }

    /// Primary records followed by projections strictly after `last_reported_date`.
    pub(crate) fn with_projection(
        primary: &[DailyRecord],
        projected: Vec<DailyRecord>,
        last_reported_date: NaiveDate,
        calibration: Calibration,
    ) -> Self {
        let mut out = Self::reported_only(primary, last_reported_date);
        out.points.extend(
            projected
                .into_iter()
                .filter(|r| r.date > last_reported_date)
                .map(|r| ReconciledPoint {
                    date: r.date,
                    value: r.value,
                    provenance: Provenance::Projected,
                }),
        );
        out.calibration = Some(calibration);
        out
    }

    pub fn points(&self) -> &[ReconciledPoint] {
        &self.points
    }

    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    pub fn last_reported_date(&self) -> NaiveDate {
        self.last_reported_date
    }

    pub fn calibration(&self) -> Option<&Calibration> {
        self.calibration.as_ref()
    }

    pub fn projected_count(&self) -> usize {
        self.points
            .iter()
            .filter(|p| p.provenance == Provenance::Projected)
            .count()
    }

    pub fn provenance_at(&self, date: NaiveDate) -> Option<Provenance> {
        self.points
            .binary_search_by_key(&date, |p| p.date)
            .ok()
            .map(|idx| self.points[idx].provenance)
    }

    /// Drop provenance and return the values as a plain daily series.
    pub fn to_series(&self) -> DailySeries {
        DailySeries::from_records(
            self.points
                .iter()
                .map(|p| DailyRecord::new(p.date, p.value))
                .collect(),
        )
    }
}

/// Estimator for the primary/reference scaling ratio over the overlap window.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "kebab-case")]
pub enum RatioMethod {
    /// Σprimary / Σreference over the overlap.
    #[default]
    Sum,
    /// Mean of per-day primary/reference ratios (days present in both, reference != 0).
    MeanDaily,
    /// Through-origin least squares `primary ≈ k * reference`.
    LeastSquares,
}

impl RatioMethod {
    pub fn display_name(self) -> &'static str {
        match self {
            RatioMethod::Sum => "summed overlap",
            RatioMethod::MeanDaily => "mean of daily ratios",
            RatioMethod::LeastSquares => "least squares",
        }
    }
}

pub const DEFAULT_WINDOW: usize = 7;
pub const DEFAULT_TAIL_LAG_DAYS: u32 = 7;
pub const DEFAULT_MIN_OVERLAP_DAYS: u32 = 7;

/// Engine parameters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct EngineConfig {
    /// Smoothing window length in rows.
    pub window: usize,
    /// Most-recent days whose averages are hidden.
    pub tail_lag_days: u32,
    /// Minimum overlap (calendar days) required before projecting.
    pub min_overlap_days: u32,
    pub ratio_method: RatioMethod,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            window: DEFAULT_WINDOW,
            tail_lag_days: DEFAULT_TAIL_LAG_DAYS,
            min_overlap_days: DEFAULT_MIN_OVERLAP_DAYS,
            ratio_method: RatioMethod::Sum,
        }
    }
}

impl EngineConfig {
    pub fn validate(&self) -> Result<(), EngineError> {
        if self.window == 0 {
            return Err(EngineError::InvalidConfig("window must be >= 1".to_string()));
        }
        if self.min_overlap_days == 0 {
            return Err(EngineError::InvalidConfig("min_overlap_days must be > 0".to_string()));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn d(day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2020, 1, day).unwrap()
    }

    #[test]
    fn from_records_sorts_and_last_duplicate_wins() {
        let series = DailySeries::from_records(vec![
            DailyRecord::new(d(3), 30.0),
            DailyRecord::new(d(1), 10.0),
            DailyRecord::new(d(3), 33.0),
            DailyRecord::new(d(2), f64::NAN),
        ]);

        let pairs: Vec<(NaiveDate, f64)> = series.iter().map(|r| (r.date, r.value)).collect();
        assert_eq!(pairs, vec![(d(1), 10.0), (d(3), 33.0)]);
    }

    #[test]
    fn in_range_slices_by_date() {
        let series = DailySeries::from_pairs((1..=6).map(|day| (d(day), day as f64)));
        let range = DateRange::new(d(2), d(4)).unwrap();

        let inside: Vec<f64> = series.in_range(&range).iter().map(|r| r.value).collect();
        assert_eq!(inside, vec![2.0, 3.0, 4.0]);

        assert_eq!(series.value_at(d(5)), Some(5.0));
        assert_eq!(series.value_at(d(9)), None);
    }

    #[test]
    fn default_engine_config_is_valid() {
        assert!(EngineConfig::default().validate().is_ok());

        let bad = EngineConfig {
            min_overlap_days: 0,
            ..EngineConfig::default()
        };
        assert!(matches!(bad.validate(), Err(EngineError::InvalidConfig(_))));
    }
}
