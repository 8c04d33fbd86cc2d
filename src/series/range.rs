//! Closed calendar-date intervals.
//!
//! A `DateRange` always satisfies `min_date <= max_date`; "no range" is spelled
//! `Option::None` (or `EngineError::EmptyInput` at the engine boundary), never a
//! sentinel date.

use std::fmt;

use chrono::{Days, NaiveDate};
use serde::{Deserialize, Serialize};

use crate::domain::DailySeries;
use crate::error::EngineError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "RangeRepr")]
pub struct DateRange {
    min_date: NaiveDate,
    max_date: NaiveDate,
}

#[derive(Deserialize)]
struct RangeRepr {
    min_date: NaiveDate,
    max_date: NaiveDate,
}

impl TryFrom<RangeRepr> for DateRange {
    type Error = String;

    fn try_from(repr: RangeRepr) -> Result<Self, Self::Error> {
        DateRange::new(repr.min_date, repr.max_date)
            .ok_or_else(|| format!("min_date {} is after max_date {}", repr.min_date, repr.max_date))
    }
}

impl DateRange {
    /// `None` when `min_date > max_date`.
    pub fn new(min_date: NaiveDate, max_date: NaiveDate) -> Option<Self> {
        (min_date <= max_date).then_some(Self { min_date, max_date })
    }

    pub fn single(date: NaiveDate) -> Self {
        Self {
            min_date: date,
            max_date: date,
        }
    }

    pub fn min_date(&self) -> NaiveDate {
        self.min_date
    }

    pub fn max_date(&self) -> NaiveDate {
        self.max_date
    }

    /// Number of calendar days covered, both ends included.
    pub fn span_days(&self) -> i64 {
        (self.max_date - self.min_date).num_days() + 1
    }

    pub fn contains(&self, date: NaiveDate) -> bool {
        self.min_date <= date && date <= self.max_date
    }

    /// `{max(a.min, b.min), min(a.max, b.max)}`, or `None` when that would be empty.
    pub fn intersect(&self, other: &DateRange) -> Option<DateRange> {
        DateRange::new(
            self.min_date.max(other.min_date),
            self.max_date.min(other.max_date),
        )
    }

    /// Smallest range covering both.
    pub fn union(&self, other: &DateRange) -> DateRange {
        DateRange {
            min_date: self.min_date.min(other.min_date),
            max_date: self.max_date.max(other.max_date),
        }
    }

    /// Replace the start date (e.g. a configured chart start).
    ///
    /// `None` if the new start is after `max_date`.
    pub fn starting_at(&self, min_date: NaiveDate) -> Option<DateRange> {
        DateRange::new(min_date, self.max_date)
    }

    /// `max_date - lag_days`, never earlier than `min_date`.
    pub fn lag_cutoff(&self, lag_days: u32) -> NaiveDate {
        self.max_date
            .checked_sub_days(Days::new(u64::from(lag_days)))
            .map_or(self.min_date, |cutoff| cutoff.max(self.min_date))
    }
}

impl fmt::Display for DateRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}..={}", self.min_date, self.max_date)
    }
}

/// Min and max date of a non-empty series.
pub fn bounds(series: &DailySeries) -> Result<DateRange, EngineError> {
    series.range().ok_or_else(|| EngineError::empty_input("input"))
}

/// Union-bounds of several (possibly empty) ranges.
///
/// Empty inputs are skipped; `None` only when every input is empty.
pub fn bounds_of_many<I>(ranges: I) -> Option<DateRange>
where
    I: IntoIterator<Item = Option<DateRange>>,
{
    ranges
        .into_iter()
        .flatten()
        .reduce(|acc, range| acc.union(&range))
}

/// Latest date whose data is considered complete: `max_date - lag_days`,
/// clamped to the series start.
pub fn lag_cutoff(series: &DailySeries, lag_days: u32) -> Result<NaiveDate, EngineError> {
    Ok(bounds(series)?.lag_cutoff(lag_days))
}
