//! Cross-source reconciliation and projection.
//!
//! The primary source is authoritative but lags; the reference source is
//! faster. When the reference runs past the primary's last date, the missing
//! days are filled with `reference_value * ratio`, where `ratio` is calibrated
//! on the window both sources cover.
//!
//! Workflow:
//! 1. resolve both ranges (empty input is an error)
//! 2. nothing to project → primary unchanged
//! 3. overlap must exist and span at least `min_overlap_days`
//! 4. estimate the ratio over the overlap
//! 5. project every reference day after the primary's last date

use tracing::{debug, info};

use crate::domain::{Calibration, DailyRecord, DailySeries, EngineConfig, ReconciledSeries};
use crate::error::EngineError;
use crate::reconcile::ratio::estimate_ratio;
use crate::series::range::DateRange;

/// Anything that can be reconciled: a named, date-sorted daily source.
pub trait SeriesSource {
    fn name(&self) -> &str;

    /// Covered date range, `None` when the source has no rows.
    fn bounds(&self) -> Option<DateRange>;

    /// Records inside `range`, ascending by date.
    fn values_in_range(&self, range: &DateRange) -> Vec<DailyRecord>;
}

/// A `DailySeries` with a display name.
#[derive(Debug, Clone, Copy)]
pub struct NamedSeries<'a> {
    pub name: &'a str,
    pub series: &'a DailySeries,
}

impl<'a> NamedSeries<'a> {
    pub fn new(name: &'a str, series: &'a DailySeries) -> Self {
        Self { name, series }
    }
}

impl SeriesSource for NamedSeries<'_> {
    fn name(&self) -> &str {
        self.name
    }

    fn bounds(&self) -> Option<DateRange> {
        self.series.range()
    }

    fn values_in_range(&self, range: &DateRange) -> Vec<DailyRecord> {
        self.series.in_range(range).to_vec()
    }
}

#[derive(Debug, Clone)]
pub struct ReconciliationEngine {
    config: EngineConfig,
}

impl ReconciliationEngine {
    pub fn new(config: EngineConfig) -> Result<Self, EngineError> {
        config.validate()?;
        Ok(Self { config })
    }

    pub fn reconcile<P, R>(&self, primary: &P, reference: &R) -> Result<ReconciledSeries, EngineError>
    where
        P: SeriesSource + ?Sized,
        R: SeriesSource + ?Sized,
    {
        let primary_range = primary
            .bounds()
            .ok_or_else(|| EngineError::empty_input(primary.name()))?;
        let reference_range = reference
            .bounds()
            .ok_or_else(|| EngineError::empty_input(reference.name()))?;

        let primary_records = primary.values_in_range(&primary_range);
        let last_reported = primary_range.max_date();

        if reference_range.max_date() <= last_reported {
            debug!(
                primary = %primary_range,
                reference = %reference_range,
                "reference does not extend past primary; nothing to project"
            );
            return Ok(ReconciledSeries::reported_only(&primary_records, last_reported));
        }

        let overlap = primary_range
            .intersect(&reference_range)
            .ok_or(EngineError::EmptyIntersection {
                primary: primary_range,
                reference: reference_range,
            })?;

        let overlap_days = overlap.span_days();
        if overlap_days < i64::from(self.config.min_overlap_days) {
            return Err(EngineError::InsufficientOverlap {
                primary: primary_range,
                reference: reference_range,
                overlap,
                overlap_days,
                required: self.config.min_overlap_days,
            });
        }

        let ratio = estimate_ratio(
            self.config.ratio_method,
            &primary.values_in_range(&overlap),
            &reference.values_in_range(&overlap),
        )
        .ok_or(EngineError::DivisionByZero {
            primary: primary_range,
            reference: reference_range,
            overlap,
        })?;

        // Reference days strictly after the primary's last date.
        let projected: Vec<DailyRecord> = match last_reported.succ_opt() {
            Some(first_missing) => DateRange::new(first_missing, reference_range.max_date())
                .map(|gap| reference.values_in_range(&gap))
                .unwrap_or_default()
                .into_iter()
                .map(|r| DailyRecord::new(r.date, r.value * ratio))
                .collect(),
            None => Vec::new(),
        };

        info!(
            primary = primary.name(),
            reference = reference.name(),
            %overlap,
            ratio,
            method = self.config.ratio_method.display_name(),
            projected = projected.len(),
            "projected primary past its last reported date"
        );

        Ok(ReconciledSeries::with_projection(
            &primary_records,
            projected,
            last_reported,
            Calibration {
                overlap,
                overlap_days,
                ratio,
                method: self.config.ratio_method,
            },
        ))
    }
}

/// Reconcile two plain series with the given config.
pub fn reconcile(
    primary: &DailySeries,
    reference: &DailySeries,
    config: &EngineConfig,
) -> Result<ReconciledSeries, EngineError> {
    ReconciliationEngine::new(*config)?.reconcile(
        &NamedSeries::new("primary", primary),
        &NamedSeries::new("reference", reference),
    )
}
