//! Input/output helpers.
//!
//! - CSV ingest of one source (`ingest`)
//! - CSV exports of smoothed/reconciled series (`export`)
//! - chart bundle JSON read/write (`bundle`)

pub mod bundle;
pub mod export;
pub mod ingest;

pub use bundle::*;
pub use export::*;
pub use ingest::*;
