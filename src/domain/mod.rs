//! Domain types used throughout the pipeline.
//!
//! This module defines:
//!
//! - daily records and clean daily series (`DailyRecord`, `DailySeries`)
//! - smoother output (`SmoothedSeries`)
//! - reconciliation output (`ReconciledSeries`, `Provenance`, `Calibration`)
//! - engine parameters (`EngineConfig`, `RatioMethod`)

pub mod types;

pub use types::*;
