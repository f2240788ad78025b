//! Shared risk gate.
//!
//! The only state shared between symbols. Every entry goes through one atomic
//! check-and-increment under a mutex, so two symbols can never both take the last slot of the
//! day. Counters reset when the session clock reports a new trading day.

use chrono::NaiveDate;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use sweep_core::config::RiskConfig;
use sweep_core::{SessionClock, TimestampMs};
use thiserror::Error;
use tracing::{info, warn};

/// Why the gate refused an entry.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum RiskRejection {
    #[error("daily trade limit of {0} reached")]
    DailyTrades(u32),
    #[error("daily loss limit of {0} losing trades reached")]
    DailyLosses(u32),
    #[error("{0} consecutive losses")]
    ConsecutiveLosses(u32),
    #[error("daily loss of {0:.2} exceeds limit")]
    DailyLossAmount(f64),
    #[error("trading halted")]
    Halted,
    #[error("timestamp {0} has no local time")]
    UnknownDay(TimestampMs),
}

/// Cross-symbol entry gate.
pub trait RiskGate: Send + Sync {
    /// Check without reserving a slot.
    fn check(&self, symbol: &str, ts_ms: TimestampMs) -> Result<(), RiskRejection>;

    /// Check and reserve one trade slot atomically.
    fn try_acquire(&self, symbol: &str, ts_ms: TimestampMs) -> Result<(), RiskRejection>;

    /// Record the outcome of a closed position.
    fn record_close(&self, symbol: &str, ts_ms: TimestampMs, pnl: f64);
}

/// Per-day counters.
#[derive(Debug, Clone, Default)]
pub struct DailyCounters {
    pub day: Option<NaiveDate>,
    pub trades: u32,
    pub losses: u32,
    pub consecutive_losses: u32,
    pub realized_pnl: f64,
    pub trades_by_symbol: HashMap<String, u32>,
    pub halted: bool,
}

impl DailyCounters {
    fn roll(&mut self, day: NaiveDate) {
        if self.day != Some(day) {
            if self.day.is_some() {
                info!(%day, trades = self.trades, pnl = self.realized_pnl, "risk counters reset");
            }
            *self = DailyCounters {
                day: Some(day),
                ..Default::default()
            };
        }
    }
}

/// Daily limits over all symbols.
pub struct DailyRiskGate {
    limits: RiskConfig,
    clock: Arc<dyn SessionClock>,
    state: Mutex<DailyCounters>,
}

impl DailyRiskGate {
    pub fn new(limits: RiskConfig, clock: Arc<dyn SessionClock>) -> Self {
        Self {
            limits,
            clock,
            state: Mutex::new(DailyCounters::default()),
        }
    }

    fn lock(&self) -> MutexGuard<'_, DailyCounters> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Lock, rolling the counters to the trading day of `ts_ms`.
    fn lock_for(&self, ts_ms: TimestampMs) -> Result<MutexGuard<'_, DailyCounters>, RiskRejection> {
        let day = self
            .clock
            .trading_day(ts_ms)
            .ok_or(RiskRejection::UnknownDay(ts_ms))?;
        let mut state = self.lock();
        state.roll(day);
        Ok(state)
    }

    fn evaluate(&self, state: &DailyCounters) -> Result<(), RiskRejection> {
        if state.halted {
            return Err(RiskRejection::Halted);
        }
        if state.trades >= self.limits.max_daily_trades {
            return Err(RiskRejection::DailyTrades(self.limits.max_daily_trades));
        }
        if state.losses >= self.limits.max_daily_losses {
            return Err(RiskRejection::DailyLosses(self.limits.max_daily_losses));
        }
        if let Some(max) = self.limits.max_consecutive_losses {
            if state.consecutive_losses >= max {
                return Err(RiskRejection::ConsecutiveLosses(state.consecutive_losses));
            }
        }
        if let Some(max) = self.limits.max_daily_loss {
            if -state.realized_pnl >= max {
                return Err(RiskRejection::DailyLossAmount(-state.realized_pnl));
            }
        }
        Ok(())
    }

    /// Refuse every entry until the next trading day.
    pub fn halt(&self) {
        warn!("risk gate halted");
        self.lock().halted = true;
    }

    /// Snapshot of the current counters.
    pub fn counters(&self) -> DailyCounters {
        self.lock().clone()
    }
}

impl RiskGate for DailyRiskGate {
    fn check(&self, _symbol: &str, ts_ms: TimestampMs) -> Result<(), RiskRejection> {
        let state = self.lock_for(ts_ms)?;
        self.evaluate(&state)
    }

    fn try_acquire(&self, symbol: &str, ts_ms: TimestampMs) -> Result<(), RiskRejection> {
        let mut state = self.lock_for(ts_ms)?;
        self.evaluate(&state)?;
        state.trades += 1;
        *state.trades_by_symbol.entry(symbol.to_string()).or_insert(0) += 1;
        Ok(())
    }

    fn record_close(&self, symbol: &str, ts_ms: TimestampMs, pnl: f64) {
        let Ok(mut state) = self.lock_for(ts_ms) else {
            warn!(symbol, ts_ms, "close outside any trading day ignored by risk gate");
            return;
        };
        state.realized_pnl += pnl;
        if pnl < 0.0 {
            state.losses += 1;
            state.consecutive_losses += 1;
        } else {
            state.consecutive_losses = 0;
        }
    }
}
