//! Series-level building blocks of the engine.
//!
//! - date-range arithmetic (`range`)
//! - raw rows → clean daily series (`normalize`)
//! - trailing averages and tail trimming (`smooth`)
//! - date-joined ratios (`combine`)

pub mod combine;
pub mod normalize;
pub mod range;
pub mod smooth;

pub use combine::ratio_by_date;
pub use normalize::{DroppedRows, Normalized, RawRow, SeriesNormalizer, difference};
pub use range::{DateRange, bounds, bounds_of_many, lag_cutoff};
pub use smooth::{smooth, trim_unreliable_tail};
