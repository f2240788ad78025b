//! Core data types for the sweep-trader system.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Timestamp in milliseconds since Unix epoch (UTC).
pub type TimestampMs = i64;

/// Whole-contract quantity.
pub type Contracts = u32;

/// Milliseconds in one minute.
pub const MINUTE_MS: i64 = 60_000;

/// Convert a timestamp to the start of its bucket of `period_ms`.
#[inline]
pub fn ts_to_bucket(ts_ms: TimestampMs, period_ms: i64) -> TimestampMs {
    ts_ms.div_euclid(period_ms) * period_ms
}

/// Number of ticks spanned by a price distance.
#[inline]
pub fn to_ticks(distance: f64, tick_size: f64) -> f64 {
    distance / tick_size
}

/// OHLC bar. `ts_ms` is the bar's open time.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Bar {
    /// Bar open timestamp (ms).
    pub ts_ms: TimestampMs,
    /// Open price.
    pub open: f64,
    /// High price.
    pub high: f64,
    /// Low price.
    pub low: f64,
    /// Close price.
    pub close: f64,
    /// Total volume.
    #[serde(default)]
    pub volume: f64,
}

impl Bar {
    /// Create a bar without volume.
    pub fn new(ts_ms: TimestampMs, open: f64, high: f64, low: f64, close: f64) -> Self {
        Self {
            ts_ms,
            open,
            high,
            low,
            close,
            volume: 0.0,
        }
    }

    /// Absolute candle body.
    #[inline]
    pub fn body(&self) -> f64 {
        (self.close - self.open).abs()
    }

    /// High minus low.
    #[inline]
    pub fn range(&self) -> f64 {
        self.high - self.low
    }

    /// Wick above the body.
    #[inline]
    pub fn upper_wick(&self) -> f64 {
        self.high - self.open.max(self.close)
    }

    /// Wick below the body.
    #[inline]
    pub fn lower_wick(&self) -> f64 {
        self.open.min(self.close) - self.low
    }

    /// Timestamp as a UTC datetime.
    pub fn datetime(&self) -> Option<DateTime<Utc>> {
        DateTime::from_timestamp_millis(self.ts_ms)
    }

    /// Basic sanity check on the OHLC relationship.
    pub fn is_well_formed(&self) -> bool {
        self.high >= self.low
            && self.high >= self.open.max(self.close)
            && self.low <= self.open.min(self.close)
            && [self.open, self.high, self.low, self.close]
                .iter()
                .all(|p| p.is_finite())
    }
}

/// Trade direction. A bullish sweep or gap leads to a `Long` trade.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Direction {
    Long,
    Short,
}

impl Direction {
    /// +1.0 for long, -1.0 for short.
    #[inline]
    pub fn sign(self) -> f64 {
        match self {
            Direction::Long => 1.0,
            Direction::Short => -1.0,
        }
    }

    #[inline]
    pub fn is_long(self) -> bool {
        matches!(self, Direction::Long)
    }

    /// Move `price` by `distance` in this direction's favour.
    #[inline]
    pub fn offset(self, price: f64, distance: f64) -> f64 {
        price + self.sign() * distance
    }

    /// True if `candidate` is strictly more favourable than `current` for this direction.
    #[inline]
    pub fn improves(self, candidate: f64, current: f64) -> bool {
        match self {
            Direction::Long => candidate > current,
            Direction::Short => candidate < current,
        }
    }

    /// True if the bar reached a favourable `level` (long: high at or above it).
    #[inline]
    pub fn reached(self, bar: &Bar, level: f64) -> bool {
        match self {
            Direction::Long => bar.high >= level,
            Direction::Short => bar.low <= level,
        }
    }

    /// True if the bar traded through a protective `stop` (long: low at or below it).
    #[inline]
    pub fn stopped(self, bar: &Bar, stop: f64) -> bool {
        match self {
            Direction::Long => bar.low <= stop,
            Direction::Short => bar.high >= stop,
        }
    }
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Direction::Long => write!(f, "LONG"),
            Direction::Short => write!(f, "SHORT"),
        }
    }
}

/// Which of the two fed timeframes a bar belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TimeframeRole {
    /// Setup timeframe: swings, sweeps, gaps.
    Higher,
    /// Confirmation and management timeframe.
    Lower,
}

/// Entry archetypes sharing the setup pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntryArchetype {
    /// Sweep, gap, mitigation and optional structure confirmation.
    SweepReversal,
    /// Entry at the moment a displacement gap forms.
    Creation,
    /// Retrace into a gap formed before the regular session opened.
    PriorSessionRetrace,
    /// Retrace into a gap formed during the regular session.
    SameSessionRetrace,
    /// Retrace into a gap formed just after a structure break.
    StructureBreakRetrace,
}

impl EntryArchetype {
    pub fn as_str(self) -> &'static str {
        match self {
            EntryArchetype::SweepReversal => "sweep_reversal",
            EntryArchetype::Creation => "creation",
            EntryArchetype::PriorSessionRetrace => "prior_session_retrace",
            EntryArchetype::SameSessionRetrace => "same_session_retrace",
            EntryArchetype::StructureBreakRetrace => "structure_break_retrace",
        }
    }
}

impl fmt::Display for EntryArchetype {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Position leg.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Leg {
    /// Fixed-target leg.
    T1,
    /// First trailing leg.
    T2,
    /// Wide trailing leg.
    Runner,
}

/// Reason a position's final quantity was exited.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum CloseReason {
    /// Initial fixed stop.
    Stop,
    /// Breakeven or structure trail.
    Trail,
    /// Forced session-end exit.
    Eod,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn make_bar(open: f64, high: f64, low: f64, close: f64) -> Bar {
        Bar::new(0, open, high, low, close)
    }

    #[test]
    fn test_ts_to_bucket() {
        assert_eq!(ts_to_bucket(0, 5 * MINUTE_MS), 0);
        assert_eq!(ts_to_bucket(299_999, 5 * MINUTE_MS), 0);
        assert_eq!(ts_to_bucket(300_000, 5 * MINUTE_MS), 300_000);
    }

    #[test]
    fn test_bar_anatomy() {
        let bar = make_bar(100.0, 103.0, 99.0, 101.0);
        assert!((bar.body() - 1.0).abs() < 1e-10);
        assert!((bar.range() - 4.0).abs() < 1e-10);
        assert!((bar.upper_wick() - 2.0).abs() < 1e-10);
        assert!((bar.lower_wick() - 1.0).abs() < 1e-10);
        assert!(bar.is_well_formed());
        assert!(!make_bar(100.0, 99.0, 101.0, 100.0).is_well_formed());
    }

    #[test]
    fn test_direction_helpers() {
        assert_eq!(Direction::Long.sign(), 1.0);
        assert!((Direction::Short.offset(100.0, 2.0) - 98.0).abs() < 1e-10);
        assert!(Direction::Long.improves(101.0, 100.0));
        assert!(Direction::Short.improves(99.0, 100.0));

        let bar = make_bar(100.0, 107.0, 97.0, 101.0);
        assert!(Direction::Long.stopped(&bar, 98.0));
        assert!(Direction::Long.reached(&bar, 106.0));
        assert!(!Direction::Short.stopped(&bar, 108.0));
    }

    #[test]
    fn test_close_reason_serializes_uppercase() {
        let json = serde_json::to_string(&CloseReason::Eod).unwrap();
        assert_eq!(json, "\"EOD\"");
    }
}
