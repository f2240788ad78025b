//! Exchange-local time for session decisions.
//!
//! Bars carry UTC millisecond timestamps. Every time-of-day rule (regular session, lunch lull,
//! killzones, the prior-session cutoff) is expressed in the exchange's wall clock, so the engine
//! goes through a [`SessionClock`] instead of reading the system time. Replays are deterministic
//! because the clock only ever converts bar timestamps.

use crate::error::{Error, Result};
use crate::types::TimestampMs;
use chrono::{DateTime, NaiveDate, NaiveDateTime, NaiveTime};
use chrono_tz::Tz;
use serde::{Deserialize, Serialize};

/// Converts bar timestamps to the exchange's wall clock.
pub trait SessionClock: Send + Sync {
    /// Local date-time of a UTC millisecond timestamp.
    fn local(&self, ts_ms: TimestampMs) -> Option<NaiveDateTime>;

    /// Local time of day.
    fn time_of_day(&self, ts_ms: TimestampMs) -> Option<NaiveTime> {
        self.local(ts_ms).map(|dt| dt.time())
    }

    /// Local calendar date, used as the trading-day key.
    fn trading_day(&self, ts_ms: TimestampMs) -> Option<NaiveDate> {
        self.local(ts_ms).map(|dt| dt.date())
    }
}

/// Clock for an IANA time zone (DST aware).
#[derive(Debug, Clone, Copy)]
pub struct ExchangeClock {
    tz: Tz,
}

impl ExchangeClock {
    pub fn new(tz: Tz) -> Self {
        Self { tz }
    }

    /// Parse an IANA name such as "America/New_York".
    pub fn from_name(name: &str) -> Result<Self> {
        let tz: Tz = name
            .parse()
            .map_err(|_| Error::config(format!("unknown time zone: {name}")))?;
        Ok(Self::new(tz))
    }

    pub fn new_york() -> Self {
        Self::new(chrono_tz::America::New_York)
    }

    pub fn tz(&self) -> Tz {
        self.tz
    }
}

impl Default for ExchangeClock {
    fn default() -> Self {
        Self::new_york()
    }
}

impl SessionClock for ExchangeClock {
    fn local(&self, ts_ms: TimestampMs) -> Option<NaiveDateTime> {
        DateTime::from_timestamp_millis(ts_ms).map(|utc| utc.with_timezone(&self.tz).naive_local())
    }
}

/// Half-open time-of-day window `[start, end)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimeWindow {
    pub start: NaiveTime,
    pub end: NaiveTime,
}

impl TimeWindow {
    /// Build from hour/minute pairs. Returns `None` for out-of-range values.
    pub fn from_hm(start: (u32, u32), end: (u32, u32)) -> Option<Self> {
        Some(Self {
            start: NaiveTime::from_hms_opt(start.0, start.1, 0)?,
            end: NaiveTime::from_hms_opt(end.0, end.1, 0)?,
        })
    }

    #[inline]
    pub fn contains(&self, t: NaiveTime) -> bool {
        self.start <= t && t < self.end
    }

    pub fn is_valid(&self) -> bool {
        self.start < self.end
    }
}
