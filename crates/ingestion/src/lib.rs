//! Bar feed plumbing for the sweep-trader system.
//!
//! This crate handles:
//! - Idempotent per-timeframe feed cursors (refetched bars are never re-applied)
//! - Resampling lower-timeframe bars into higher-timeframe buckets
//! - Merging the two timeframes into one lookahead-free schedule

pub mod cursor;
pub mod resampler;
pub mod schedule;

pub use cursor::FeedCursor;
pub use resampler::BarResampler;
pub use schedule::{merge_by_close, ScheduledBar};
