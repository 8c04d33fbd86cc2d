//! Reconciliation of a lagged primary source against a faster reference.

pub mod engine;
pub mod ratio;

pub use engine::{NamedSeries, ReconciliationEngine, SeriesSource, reconcile};
pub use ratio::estimate_ratio;
