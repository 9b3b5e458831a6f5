//! Shared utilities.
//!
//! - `compress`: streaming xz/zstd encoders and readers
//! - `fanout`: bounded worker pool for independent partitions
//! - `format`: human-readable sizes and rates
//! - `text`: Unicode normalization of attribute values
//! - `xml`: attribute escaping and tag parsing

pub mod compress;
pub mod fanout;
mod format;
pub mod text;
pub mod xml;

pub use fanout::{FanOut, PartitionOutcome};
pub use format::{format_size, per_second};
