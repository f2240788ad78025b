//! Setup stages.
//!
//! A candidate trade moves forward through distinct types:
//! [`PendingSweep`] (waiting for a gap), [`SetupState`] (waiting for mitigation or structure
//! confirmation), and finally [`TradeSignal`] once every trigger and filter has passed.

use serde::{Deserialize, Serialize};
use sweep_core::{Direction, EntryArchetype, TimestampMs};
use sweep_signals::{Gap, GapId, LockedLevel, StructureBreak, Sweep};
use thiserror::Error;

pub type SetupId = u64;

/// A displaced sweep waiting for a same-direction gap.
#[derive(Debug, Clone, PartialEq)]
pub struct PendingSweep {
    pub sweep: Sweep,
    pub displacement: f64,
    /// Bar index at which the sweep was first seen.
    pub detected_index: usize,
}

impl PendingSweep {
    pub fn direction(&self) -> Direction {
        self.sweep.direction
    }

    /// Bar-index window in which the gap's middle bar must lie.
    pub fn gap_window(&self, max_wait: usize) -> (usize, usize) {
        (self.sweep.index + 1, self.sweep.index + max_wait)
    }
}

/// What started a setup.
#[derive(Debug, Clone, PartialEq)]
pub enum SetupOrigin {
    SweepReversal { sweep: Sweep },
    Creation,
    PriorSession,
    SameSession,
    StructureBreak { brk: StructureBreak },
}

impl SetupOrigin {
    pub fn archetype(&self) -> EntryArchetype {
        match self {
            SetupOrigin::SweepReversal { .. } => EntryArchetype::SweepReversal,
            SetupOrigin::Creation => EntryArchetype::Creation,
            SetupOrigin::PriorSession => EntryArchetype::PriorSessionRetrace,
            SetupOrigin::SameSession => EntryArchetype::SameSessionRetrace,
            SetupOrigin::StructureBreak { .. } => EntryArchetype::StructureBreakRetrace,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum SetupStage {
    AwaitingMitigation,
    /// Level locked on the mitigating bar; `locked_ts` is that bar's open time.
    AwaitingStructureConfirm {
        level: LockedLevel,
        locked_ts: TimestampMs,
    },
    /// Every trigger has fired; only the finalization filters remain.
    Armed,
}

/// A setup attached to a gap.
#[derive(Debug, Clone, PartialEq)]
pub struct SetupState {
    pub id: SetupId,
    pub origin: SetupOrigin,
    /// Snapshot of the gap at attach time. Bounds never change; liveness is checked by id.
    pub gap: Gap,
    pub stage: SetupStage,
    pub created_index: usize,
    pub displacement: f64,
}

impl SetupState {
    #[inline]
    pub fn archetype(&self) -> EntryArchetype {
        self.origin.archetype()
    }

    #[inline]
    pub fn direction(&self) -> Direction {
        self.gap.direction
    }

    #[inline]
    pub fn gap_id(&self) -> GapId {
        self.gap.id
    }

    pub fn age(&self, index: usize) -> usize {
        index.saturating_sub(self.created_index)
    }

    /// True once price has run `multiple` gap heights past the gap in the trade direction.
    pub fn has_run_away(&self, close: f64, multiple: f64) -> bool {
        let distance = multiple * self.gap.height();
        match self.direction() {
            Direction::Long => close > self.gap.top + distance,
            Direction::Short => close < self.gap.bottom - distance,
        }
    }
}

/// A finalized setup, ready to become a position.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TradeSignal {
    pub setup_id: SetupId,
    pub archetype: EntryArchetype,
    pub direction: Direction,
    pub entry: f64,
    pub stop: f64,
    pub gap_id: GapId,
    pub displacement: f64,
    /// Decision time: close time of the bar that finalized the setup.
    pub time: TimestampMs,
}

impl TradeSignal {
    /// Distance from entry to stop.
    #[inline]
    pub fn risk(&self) -> f64 {
        (self.entry - self.stop) * self.direction.sign()
    }
}

/// Why a finalization attempt left the setup pending.
#[derive(Debug, Clone, Copy, PartialEq, Error)]
pub enum FilterRejection {
    #[error("no entry capacity")]
    NoCapacity,
    #[error("outside session entry window")]
    OutsideSession,
    #[error("post-loss cooldown active")]
    Cooldown,
    #[error("trend not aligned")]
    TrendMisaligned,
    #[error("trend strength {0:.1} below {1}")]
    WeakTrend(f64, f64),
    #[error("risk {0:.1} ticks below minimum")]
    RiskTooSmall(f64),
    #[error("risk {0:.1} ticks above maximum")]
    RiskTooLarge(f64),
    #[error("volatility stop buffer not ready")]
    BufferUnavailable,
}
