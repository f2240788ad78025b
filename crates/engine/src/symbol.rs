//! Per-symbol engine.
//!
//! Owns the setup pipeline, the positions and the feed cursor for one symbol and applies each
//! bar in a fixed order: pipeline first, entries next, then position management. Positions
//! opened on a bar are only managed from the following bar. Sessions roll on the trading day
//! reported by the clock; the first bar at or after the regular close ends the session and
//! flattens everything at the last close.

use crate::pipeline::SetupPipeline;
use crate::position::{ClosedPosition, PositionManager};
use crate::risk::RiskGate;
use crate::setup::TradeSignal;
use chrono::NaiveDate;
use std::sync::Arc;
use sweep_core::config::TimeframeMode;
use sweep_core::{Bar, Config, EventSink, Result, SessionClock, TimeframeRole, TimestampMs};
use sweep_ingestion::{merge_by_close, FeedCursor};
use tracing::{debug, info, warn};

pub struct SymbolEngine {
    config: Config,
    clock: Arc<dyn SessionClock>,
    gate: Arc<dyn RiskGate>,
    pipeline: SetupPipeline,
    positions: PositionManager,
    cursor: FeedCursor,
    session_day: Option<NaiveDate>,
    session_closed: bool,
    /// Close price and close time of the last processed bar.
    last_close: Option<(f64, TimestampMs)>,
}

impl SymbolEngine {
    pub fn new(config: Config, clock: Arc<dyn SessionClock>, gate: Arc<dyn RiskGate>) -> Result<Self> {
        let pipeline = SetupPipeline::new(&config, Arc::clone(&clock))?;
        let positions = PositionManager::new(&config)?;
        Ok(Self {
            config,
            clock,
            gate,
            pipeline,
            positions,
            cursor: FeedCursor::new(),
            session_day: None,
            session_closed: false,
            last_close: None,
        })
    }

    pub fn symbol(&self) -> &str {
        &self.config.instrument.symbol
    }

    /// Feed fetched bars of one timeframe; bars already applied are skipped.
    pub fn feed(&mut self, role: TimeframeRole, bars: &[Bar], sink: &mut dyn EventSink) -> usize {
        let fresh = self.cursor.fresh(role, bars);
        for bar in &fresh {
            self.on_bar(role, bar, sink);
        }
        fresh.len()
    }

    /// Feed fetched windows of both timeframes, interleaved by bar close time.
    pub fn feed_window(&mut self, higher: &[Bar], lower: &[Bar], sink: &mut dyn EventSink) -> usize {
        let higher = self.cursor.fresh(TimeframeRole::Higher, higher);
        let lower = match self.config.engine.mode {
            TimeframeMode::Dual => self.cursor.fresh(TimeframeRole::Lower, lower),
            TimeframeMode::Single => Vec::new(),
        };
        let schedule = merge_by_close(&higher, &lower, self.htf_period_ms(), self.ltf_period_ms());
        for item in &schedule {
            self.on_bar(item.role, &item.bar, sink);
        }
        schedule.len()
    }

    /// Apply one completed bar. Callers feeding directly must keep bars in close-time order.
    pub fn on_bar(&mut self, role: TimeframeRole, bar: &Bar, sink: &mut dyn EventSink) {
        let Some(local) = self.clock.local(bar.ts_ms) else {
            warn!(symbol = %self.symbol(), ts_ms = bar.ts_ms, "bar without local time skipped");
            return;
        };
        let day = local.date();
        if self.session_day != Some(day) {
            if self.session_day.is_some() {
                self.end_session(sink);
            }
            self.start_session(day);
        }
        if self.session_closed {
            return;
        }
        if local.time() >= self.config.session.regular_close {
            self.end_session(sink);
            return;
        }

        let close_ts = match (self.config.engine.mode, role) {
            (TimeframeMode::Dual, TimeframeRole::Higher) => {
                let close_ts = bar.ts_ms + self.htf_period_ms();
                let signals = self.pipeline.on_htf_bar(bar, self.entry_capacity(close_ts));
                self.open_all(signals, sink);
                close_ts
            }
            (TimeframeMode::Dual, TimeframeRole::Lower) => {
                let close_ts = bar.ts_ms + self.ltf_period_ms();
                let signals = self.pipeline.on_ltf_bar(bar, self.entry_capacity(close_ts));
                self.open_all(signals, sink);
                self.manage(bar, close_ts, sink);
                close_ts
            }
            (TimeframeMode::Single, _) => {
                let close_ts = bar.ts_ms + self.htf_period_ms();
                let signals = self.pipeline.on_htf_bar(bar, self.entry_capacity(close_ts));
                self.open_all(signals, sink);
                let signals = self.pipeline.on_ltf_bar(bar, self.entry_capacity(close_ts));
                self.open_all(signals, sink);
                self.manage(bar, close_ts, sink);
                close_ts
            }
        };
        self.record_close(bar.close, close_ts);
    }

    /// Remember the latest close of either timeframe for the session-end flatten.
    fn record_close(&mut self, price: f64, time: TimestampMs) {
        if self.last_close.map_or(true, |(_, last)| time >= last) {
            self.last_close = Some((price, time));
        }
    }

    /// End the session if the wall clock is past the regular close. Returns true if it ended.
    pub fn check_session_end(&mut self, now_ms: TimestampMs, sink: &mut dyn EventSink) -> bool {
        if self.session_closed || self.session_day.is_none() {
            return false;
        }
        let past_close = self
            .clock
            .local(now_ms)
            .is_some_and(|local| {
                Some(local.date()) != self.session_day
                    || local.time() >= self.config.session.regular_close
            });
        if past_close {
            self.end_session(sink);
        }
        past_close
    }

    /// Flatten everything at the last close and stop accepting bars until the next day.
    pub fn end_session(&mut self, sink: &mut dyn EventSink) {
        if self.session_closed {
            return;
        }
        match self.last_close {
            Some((price, time)) => {
                let closed = self.positions.close_all(price, time, sink);
                self.settle(closed);
            }
            None if self.positions.open_count() > 0 => {
                warn!(symbol = %self.symbol(), "open positions at session end without a last close");
            }
            None => {}
        }
        self.session_closed = true;
        info!(symbol = %self.symbol(), day = ?self.session_day, "session ended");
    }

    fn start_session(&mut self, day: NaiveDate) {
        debug!(symbol = %self.symbol(), %day, "session started");
        self.pipeline.reset();
        self.positions.reset();
        self.session_day = Some(day);
        self.session_closed = false;
        self.last_close = None;
    }

    /// Entries the pipeline may produce right now: free position slots, or none if the gate
    /// would refuse.
    fn entry_capacity(&self, time: TimestampMs) -> usize {
        let capacity = self.positions.capacity();
        if capacity == 0 {
            return 0;
        }
        match self.gate.check(self.symbol(), time) {
            Ok(()) => capacity,
            Err(reason) => {
                debug!(symbol = %self.symbol(), %reason, "entries blocked by risk gate");
                0
            }
        }
    }

    fn open_all(&mut self, signals: Vec<TradeSignal>, sink: &mut dyn EventSink) {
        for signal in signals {
            if self.positions.next_size().is_none() {
                warn!(symbol = %self.symbol(), setup_id = signal.setup_id, "signal dropped, no position slot");
                continue;
            }
            if let Err(reason) = self.gate.try_acquire(self.symbol(), signal.time) {
                info!(symbol = %self.symbol(), setup_id = signal.setup_id, %reason, "signal refused by risk gate");
                continue;
            }
            self.positions.open(&signal, sink);
        }
    }

    fn manage(&mut self, bar: &Bar, close_ts: TimestampMs, sink: &mut dyn EventSink) {
        let closed = self.positions.on_bar(bar, close_ts, sink);
        self.settle(closed);
    }

    fn settle(&mut self, closed: Vec<ClosedPosition>) {
        for position in closed {
            self.gate.record_close(self.symbol(), position.time, position.pnl);
            if position.is_loss() {
                self.pipeline.record_loss(position.archetype, position.time);
            }
        }
    }

    pub fn mode(&self) -> TimeframeMode {
        self.config.engine.mode
    }

    pub fn htf_period_ms(&self) -> i64 {
        self.pipeline.htf_period_ms()
    }

    pub fn ltf_period_ms(&self) -> i64 {
        self.pipeline.ltf_period_ms()
    }

    pub fn pipeline(&self) -> &SetupPipeline {
        &self.pipeline
    }

    pub fn positions(&self) -> &PositionManager {
        &self.positions
    }

    pub fn cursor(&self) -> &FeedCursor {
        &self.cursor
    }

    pub fn session_day(&self) -> Option<NaiveDate> {
        self.session_day
    }

    pub fn is_session_closed(&self) -> bool {
        self.session_closed
    }
}
