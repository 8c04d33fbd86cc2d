//! Trailing moving averages.
//!
//! The window counts rows, not calendar days: a source that skips weekends
//! averages over the last `window` filings it actually has.

use crate::domain::{DailySeries, SmoothedPoint, SmoothedSeries};

/// Trailing mean over the last `window` rows.
///
/// The first `window - 1` rows have no average. A zero window yields no
/// averages at all (configuration validation rejects it before we get here).
pub fn smooth(series: &DailySeries, window: usize) -> SmoothedSeries {
    let records = series.records();
    let mut points = Vec::with_capacity(records.len());

    for (i, record) in records.iter().enumerate() {
        let average = if window > 0 && i + 1 >= window {
            let start = i + 1 - window;
            let sum: f64 = records[start..=i].iter().map(|r| r.value).sum();
            Some(sum / window as f64)
        } else {
            None
        };

        points.push(SmoothedPoint {
            date: record.date,
            value: record.value,
            average,
        });
    }

    SmoothedSeries { window, points }
}

/// Hide averages for dates after `max_date - lag_days`.
///
/// Recent counts are under-reported at collection time, so their averages
/// would show a false decline. Raw values are kept as-is.
pub fn trim_unreliable_tail(smoothed: &SmoothedSeries, lag_days: u32) -> SmoothedSeries {
    let Some(range) = smoothed.range() else {
        return smoothed.clone();
    };
    let cutoff = range.lag_cutoff(lag_days);

    SmoothedSeries {
        window: smoothed.window,
        points: smoothed
            .points
            .iter()
            .map(|p| SmoothedPoint {
                average: if p.date > cutoff { None } else { p.average },
                ..*p
            })
            .collect(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn d(day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2020, 4, day).unwrap()
    }

    fn series(values: &[f64]) -> DailySeries {
        DailySeries::from_pairs(values.iter().enumerate().map(|(i, &v)| (d(i as u32 + 1), v)))
    }

    #[test]
    fn length_matches_input_and_warmup_is_undefined() {
        let s = series(&[1.0, 2.0, 3.0, 4.0, 5.0, 6.0, 7.0, 8.0, 9.0]);
        let smoothed = smooth(&s, 7);

        assert_eq!(smoothed.len(), s.len());
        assert!(smoothed.points[..6].iter().all(|p| p.average.is_none()));
        assert_eq!(smoothed.points[6].average, Some(4.0));
        assert_eq!(smoothed.points[8].average, Some(6.0));
    }

    #[test]
    fn short_and_empty_series_keep_length() {
        assert_eq!(smooth(&series(&[1.0, 2.0]), 7).averages(), vec![None, None]);
        assert!(smooth(&DailySeries::empty(), 7).is_empty());
        assert_eq!(smooth(&series(&[3.0]), 0).averages(), vec![None]);
    }

    #[test]
    fn window_counts_rows_not_calendar_days() {
        // Day 3 is missing; the 2-row window ending on day 4 spans days 2 and 4.
        let s = DailySeries::from_pairs([(d(1), 1.0), (d(2), 2.0), (d(4), 4.0)]);
        let smoothed = smooth(&s, 2);
        assert_eq!(smoothed.averages(), vec![None, Some(1.5), Some(3.0)]);
    }

    #[test]
    fn trim_with_zero_lag_is_identity() {
        let smoothed = smooth(&series(&[1.0, 2.0, 3.0, 4.0, 5.0]), 2);
        assert_eq!(trim_unreliable_tail(&smoothed, 0), smoothed);
    }

    #[test]
    fn trim_hides_tail_averages_but_keeps_values() {
        let smoothed = smooth(&series(&[1.0, 2.0, 3.0, 4.0, 5.0, 6.0]), 2);
        let trimmed = trim_unreliable_tail(&smoothed, 2);

        // max = day 6, cutoff = day 4.
        assert_eq!(
            trimmed.averages(),
            vec![None, Some(1.5), Some(2.5), Some(3.5), None, None]
        );
        assert_eq!(trimmed.points[5].value, 6.0);
    }

    #[test]
    fn trim_lag_longer_than_series_keeps_first_day_only() {
        let smoothed = smooth(&series(&[2.0, 4.0, 6.0]), 1);
        let trimmed = trim_unreliable_tail(&smoothed, 100);
        assert_eq!(trimmed.averages(), vec![Some(2.0), None, None]);
    }
}
