//! Live polling loop.
//!
//! Each symbol runs in its own task: poll the [`BarSource`], feed whatever is new through the
//! symbol's cursor, and end the session once the wall clock passes the regular close. The
//! [`RiskGate`] is the only state shared between tasks. Shutdown is cooperative: the update in
//! flight completes, then the task returns its engine with positions untouched.

use crate::risk::RiskGate;
use crate::sink::ChannelSink;
use crate::symbol::SymbolEngine;
use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;
use sweep_core::config::TimeframeMode;
use sweep_core::{Bar, Config, EngineEvent, Result, SessionClock, TimeframeRole, TimestampMs};
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{info, warn};

/// Provider of completed bars.
#[async_trait]
pub trait BarSource: Send + Sync {
    /// Recent completed bars for `symbol`, oldest first. Overlap with earlier fetches is fine.
    async fn fetch(&self, symbol: &str, role: TimeframeRole) -> Result<Vec<Bar>>;
}

fn wall_clock_ms() -> TimestampMs {
    chrono::Utc::now().timestamp_millis()
}

/// Spawns and drives one polling task per symbol.
pub struct LiveRunner {
    source: Arc<dyn BarSource>,
    clock: Arc<dyn SessionClock>,
    gate: Arc<dyn RiskGate>,
    poll_interval: Duration,
    now: fn() -> TimestampMs,
}

impl LiveRunner {
    pub fn new(
        source: Arc<dyn BarSource>,
        clock: Arc<dyn SessionClock>,
        gate: Arc<dyn RiskGate>,
        poll_interval: Duration,
    ) -> Self {
        Self {
            source,
            clock,
            gate,
            poll_interval,
            now: wall_clock_ms,
        }
    }

    /// Replace the wall clock used for the session-end check.
    pub fn with_now(mut self, now: fn() -> TimestampMs) -> Self {
        self.now = now;
        self
    }

    /// Start one task per config. Every event from every symbol arrives on the returned receiver.
    pub fn spawn(
        &self,
        configs: Vec<Config>,
        shutdown: watch::Receiver<bool>,
    ) -> Result<(Vec<JoinHandle<SymbolEngine>>, mpsc::UnboundedReceiver<EngineEvent>)> {
        let (sink, rx) = ChannelSink::channel();
        let mut engines = Vec::with_capacity(configs.len());
        for config in configs {
            engines.push(SymbolEngine::new(config, Arc::clone(&self.clock), Arc::clone(&self.gate))?);
        }

        let handles = engines
            .into_iter()
            .map(|engine| {
                let task = SymbolTask {
                    engine,
                    source: Arc::clone(&self.source),
                    sink: sink.clone(),
                    now: self.now,
                };
                tokio::spawn(task.run(self.poll_interval, shutdown.clone()))
            })
            .collect();
        Ok((handles, rx))
    }
}

struct SymbolTask {
    engine: SymbolEngine,
    source: Arc<dyn BarSource>,
    sink: ChannelSink,
    now: fn() -> TimestampMs,
}

impl SymbolTask {
    async fn run(mut self, poll_interval: Duration, mut shutdown: watch::Receiver<bool>) -> SymbolEngine {
        let symbol = self.engine.symbol().to_string();
        info!(%symbol, ?poll_interval, "live task started");

        let mut ticker = tokio::time::interval(poll_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

        loop {
            if *shutdown.borrow() {
                break;
            }
            tokio::select! {
                _ = ticker.tick() => self.poll_once(&symbol).await,
                changed = shutdown.changed() => {
                    if changed.is_err() {
                        break;
                    }
                }
            }
        }

        info!(%symbol, open = self.engine.positions().open_count(), "live task stopped");
        self.engine
    }

    async fn poll_once(&mut self, symbol: &str) {
        let higher = match self.source.fetch(symbol, TimeframeRole::Higher).await {
            Ok(bars) => bars,
            Err(e) => {
                warn!(%symbol, error = %e, "higher timeframe fetch failed");
                return;
            }
        };
        let lower = match self.engine.mode() {
            TimeframeMode::Single => Vec::new(),
            TimeframeMode::Dual => match self.source.fetch(symbol, TimeframeRole::Lower).await {
                Ok(bars) => bars,
                Err(e) => {
                    warn!(%symbol, error = %e, "lower timeframe fetch failed");
                    return;
                }
            },
        };

        self.engine.feed_window(&higher, &lower, &mut self.sink);
        self.engine.check_session_end((self.now)(), &mut self.sink);
    }
}
