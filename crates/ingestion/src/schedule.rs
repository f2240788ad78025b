//! Interleaving of the two timeframes.
//!
//! Bars are stamped with their open time, so a 5-minute bar opened at 09:30 is only complete at
//! 09:35. Ordering by close time, with the lower timeframe first on ties, means the engine never
//! sees a higher-timeframe bar before the lower-timeframe bars it contains.

use sweep_core::{Bar, TimeframeRole, TimestampMs};

/// A bar tagged with its timeframe and close time.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ScheduledBar {
    pub role: TimeframeRole,
    pub bar: Bar,
    pub close_ts: TimestampMs,
}

/// Merge two ordered series into one processing order.
pub fn merge_by_close(
    higher: &[Bar],
    lower: &[Bar],
    htf_period_ms: i64,
    ltf_period_ms: i64,
) -> Vec<ScheduledBar> {
    let mut merged: Vec<ScheduledBar> = tag(lower, TimeframeRole::Lower, ltf_period_ms)
        .chain(tag(higher, TimeframeRole::Higher, htf_period_ms))
        .collect();

    merged.sort_by_key(|s| {
        let rank = match s.role {
            TimeframeRole::Lower => 0,
            TimeframeRole::Higher => 1,
        };
        (s.close_ts, rank)
    });
    merged
}

fn tag(bars: &[Bar], role: TimeframeRole, period_ms: i64) -> impl Iterator<Item = ScheduledBar> + '_ {
    bars.iter().map(move |bar| ScheduledBar {
        role,
        bar: *bar,
        close_ts: bar.ts_ms + period_ms,
    })
}
