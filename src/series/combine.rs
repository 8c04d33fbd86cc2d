//! Date-joined arithmetic between two daily series.

use crate::domain::{DailyRecord, DailySeries};

/// `numerator / denominator` on the dates both series report.
///
/// Dates with a zero denominator are skipped so the output never holds NaN or
/// infinities.
pub fn ratio_by_date(numerator: &DailySeries, denominator: &DailySeries) -> DailySeries {
    let mut out = Vec::with_capacity(numerator.len().min(denominator.len()));
    let mut den = denominator.records().iter().peekable();

    for num in numerator.records() {
        while den.next_if(|r| r.date < num.date).is_some() {}
        let Some(d) = den.peek() else { break };
        if d.date == num.date && d.value != 0.0 {
            out.push(DailyRecord::new(num.date, num.value / d.value));
        }
    }

    DailySeries::from_records(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn d(day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2020, 5, day).unwrap()
    }

    #[test]
    fn inner_join_on_date() {
        let positives = DailySeries::from_pairs([(d(1), 10.0), (d(2), 20.0), (d(4), 5.0)]);
        let tests = DailySeries::from_pairs([(d(2), 100.0), (d(3), 50.0), (d(4), 50.0), (d(5), 10.0)]);

        let rate = ratio_by_date(&positives, &tests);
        let pairs: Vec<(NaiveDate, f64)> = rate.iter().map(|r| (r.date, r.value)).collect();
        assert_eq!(pairs, vec![(d(2), 0.2), (d(4), 0.1)]);
    }

    #[test]
    fn zero_denominator_days_are_skipped() {
        let positives = DailySeries::from_pairs([(d(1), 3.0), (d(2), 0.0)]);
        let tests = DailySeries::from_pairs([(d(1), 0.0), (d(2), 0.0)]);
        assert!(ratio_by_date(&positives, &tests).is_empty());
    }
}
