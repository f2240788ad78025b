//! Per-symbol feed cursor.
//!
//! Polling sources return overlapping windows. The cursor remembers the last bar applied for
//! each timeframe so only strictly newer bars reach the engine, however often the same history
//! is refetched.

use serde::{Deserialize, Serialize};
use sweep_core::{Bar, TimeframeRole, TimestampMs};
use tracing::warn;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
struct Mark {
    last_ts: Option<TimestampMs>,
    fed: u64,
}

/// Tracks the last fed bar per timeframe.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FeedCursor {
    higher: Mark,
    lower: Mark,
}

impl FeedCursor {
    pub fn new() -> Self {
        Self::default()
    }

    fn mark(&self, role: TimeframeRole) -> &Mark {
        match role {
            TimeframeRole::Higher => &self.higher,
            TimeframeRole::Lower => &self.lower,
        }
    }

    fn mark_mut(&mut self, role: TimeframeRole) -> &mut Mark {
        match role {
            TimeframeRole::Higher => &mut self.higher,
            TimeframeRole::Lower => &mut self.lower,
        }
    }

    /// Timestamp of the last bar accepted for `role`.
    pub fn last_ts(&self, role: TimeframeRole) -> Option<TimestampMs> {
        self.mark(role).last_ts
    }

    /// Number of bars accepted for `role`.
    pub fn fed_count(&self, role: TimeframeRole) -> u64 {
        self.mark(role).fed
    }

    /// Accept `bar` if it is newer than everything fed so far.
    pub fn admit(&mut self, role: TimeframeRole, bar: &Bar) -> bool {
        let mark = self.mark_mut(role);
        if mark.last_ts.is_some_and(|last| bar.ts_ms <= last) {
            return false;
        }
        mark.last_ts = Some(bar.ts_ms);
        mark.fed += 1;
        true
    }

    /// Bars from a fetched window that have not been fed yet, in order.
    ///
    /// Non-increasing timestamps inside the window are skipped with a warning.
    pub fn fresh(&mut self, role: TimeframeRole, bars: &[Bar]) -> Vec<Bar> {
        let mut out = Vec::new();
        for bar in bars {
            let before = self.last_ts(role);
            if self.admit(role, bar) {
                out.push(*bar);
            } else if !out.is_empty() {
                warn!(
                    ?role,
                    ts_ms = bar.ts_ms,
                    last_ts = ?before,
                    "skipping out-of-order bar"
                );
            }
        }
        out
    }

    /// Forget everything (new session).
    pub fn reset(&mut self) {
        *self = Self::default();
    }
}
