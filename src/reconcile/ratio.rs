//! Overlap-window ratio estimators.
//!
//! Each estimator answers "how many primary units per reference unit" over the
//! overlap window. `None` means there is nothing to divide by; the engine turns
//! that into `EngineError::DivisionByZero`.
//!
//! The summed ratio is a bias correction, not a statistical model: it assumes the
//! under-reporting factor between the two feeds is roughly stable across the
//! window. The other estimators trade that for per-day pairing.

use nalgebra::DVector;

use crate::domain::{DailyRecord, RatioMethod};

pub fn estimate_ratio(method: RatioMethod, primary: &[DailyRecord], reference: &[DailyRecord]) -> Option<f64> {
    let ratio = match method {
        RatioMethod::Sum => summed_ratio(primary, reference),
        RatioMethod::MeanDaily => mean_daily_ratio(primary, reference),
        RatioMethod::LeastSquares => least_squares_ratio(primary, reference),
    }?;
    ratio.is_finite().then_some(ratio)
}

/// Σprimary / Σreference. Dates need not line up.
pub fn summed_ratio(primary: &[DailyRecord], reference: &[DailyRecord]) -> Option<f64> {
    let num: f64 = primary.iter().map(|r| r.value).sum();
    let den: f64 = reference.iter().map(|r| r.value).sum();
    if den == 0.0 {
        return None;
    }
    Some(num / den)
}

/// Mean of `primary(d) / reference(d)` over shared dates with a non-zero reference.
pub fn mean_daily_ratio(primary: &[DailyRecord], reference: &[DailyRecord]) -> Option<f64> {
    let ratios: Vec<f64> = paired(primary, reference)
        .into_iter()
        .filter(|&(_, r)| r != 0.0)
        .map(|(p, r)| p / r)
        .collect();
    if ratios.is_empty() {
        return None;
    }
    Some(ratios.iter().sum::<f64>() / ratios.len() as f64)
}

/// Through-origin least squares: minimize Σ (p_i - k r_i)^2, so `k = Σ r p / Σ r²`.
pub fn least_squares_ratio(primary: &[DailyRecord], reference: &[DailyRecord]) -> Option<f64> {
    let pairs = paired(primary, reference);
    if pairs.is_empty() {
        return None;
    }
    let y = DVector::from_iterator(pairs.len(), pairs.iter().map(|&(p, _)| p));
    let x = DVector::from_iterator(pairs.len(), pairs.iter().map(|&(_, r)| r));

    let xx = x.dot(&x);
    if xx == 0.0 {
        return None;
    }
    Some(x.dot(&y) / xx)
}

/// `(primary, reference)` values on dates both slices report. Inputs are date-sorted.
fn paired(primary: &[DailyRecord], reference: &[DailyRecord]) -> Vec<(f64, f64)> {
    let mut out = Vec::with_capacity(primary.len().min(reference.len()));
    let (mut i, mut j) = (0, 0);
    while i < primary.len() && j < reference.len() {
        let (p, r) = (&primary[i], &reference[j]);
        match p.date.cmp(&r.date) {
            std::cmp::Ordering::Less => i += 1,
            std::cmp::Ordering::Greater => j += 1,
            std::cmp::Ordering::Equal => {
                out.push((p.value, r.value));
                i += 1;
                j += 1;
            }
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn recs(values: &[(u32, f64)]) -> Vec<DailyRecord> {
        values
            .iter()
            .map(|&(day, v)| DailyRecord::new(NaiveDate::from_ymd_opt(2020, 6, day).unwrap(), v))
            .collect()
    }

    #[test]
    fn summed_ratio_ignores_date_alignment() {
        let primary = recs(&[(1, 10.0), (2, 20.0), (3, 30.0)]);
        let reference = recs(&[(1, 5.0), (3, 25.0)]);
        assert_eq!(summed_ratio(&primary, &reference), Some(2.0));
        assert_eq!(summed_ratio(&primary, &recs(&[(1, 0.0)])), None);
    }

    #[test]
    fn mean_daily_skips_zero_reference_days() {
        let primary = recs(&[(1, 10.0), (2, 9.0), (3, 30.0)]);
        let reference = recs(&[(1, 5.0), (2, 0.0), (3, 10.0), (4, 8.0)]);
        // Days 1 and 3: ratios 2.0 and 3.0.
        assert_eq!(mean_daily_ratio(&primary, &reference), Some(2.5));
        assert_eq!(mean_daily_ratio(&recs(&[(1, 1.0)]), &recs(&[(1, 0.0)])), None);
    }

    #[test]
    fn least_squares_recovers_exact_scale() {
        let primary = recs(&[(1, 3.0), (2, 6.0), (3, 9.0)]);
        let reference = recs(&[(1, 2.0), (2, 4.0), (3, 6.0)]);
        let k = least_squares_ratio(&primary, &reference).unwrap();
        assert!((k - 1.5).abs() < 1e-12);

        assert_eq!(least_squares_ratio(&primary, &recs(&[(9, 1.0)])), None);
    }

    #[test]
    fn estimate_ratio_rejects_non_finite() {
        let primary = recs(&[(1, f64::MAX)]);
        let reference = recs(&[(1, f64::MIN_POSITIVE)]);
        assert_eq!(estimate_ratio(RatioMethod::Sum, &primary, &reference), None);
    }
}
