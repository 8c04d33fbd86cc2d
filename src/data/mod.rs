//! Data sources that do not come from user files.

pub mod synthetic;

pub use synthetic::{SyntheticConfig, SyntheticFeeds, generate_feeds, write_feeds};
