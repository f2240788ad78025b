//! Historical replay.
//!
//! Bars are grouped by trading day and each day is run as its own session through a
//! [`SymbolEngine`], ending with a forced flatten. Events are forwarded to the caller's sink and
//! tallied into a [`ReplaySummary`].

use crate::symbol::SymbolEngine;
use chrono::NaiveDate;
use serde::Serialize;
use std::collections::{BTreeMap, BTreeSet, HashMap};
use sweep_core::{Bar, CloseReason, EngineEvent, EventSink, SessionClock};
use tracing::{info, warn};

/// Totals over a replay.
#[derive(Debug, Clone, Default, Serialize)]
pub struct ReplaySummary {
    pub sessions: u32,
    pub bars: u64,
    pub entries: u32,
    pub partial_exits: u32,
    pub stop_closes: u32,
    pub trail_closes: u32,
    pub eod_closes: u32,
    pub winning_positions: u32,
    pub losing_positions: u32,
    pub realized_pnl: f64,
    pub largest_win: f64,
    pub largest_loss: f64,
    /// Peak-to-trough drop of cumulative closed-position P&L.
    pub max_drawdown: f64,
    pub max_consecutive_losses: u32,
    #[serde(skip)]
    open_pnl: HashMap<u64, f64>,
    #[serde(skip)]
    peak: f64,
    #[serde(skip)]
    current_losses: u32,
}

impl ReplaySummary {
    pub fn closed_positions(&self) -> u32 {
        self.winning_positions + self.losing_positions
    }

    pub fn win_rate(&self) -> f64 {
        let closed = self.closed_positions();
        if closed > 0 {
            self.winning_positions as f64 / closed as f64
        } else {
            0.0
        }
    }

    fn record(&mut self, event: &EngineEvent) {
        match event {
            EngineEvent::Entry(e) => {
                self.entries += 1;
                self.open_pnl.insert(e.position_id, 0.0);
            }
            EngineEvent::PartialExit(e) => {
                self.partial_exits += 1;
                *self.open_pnl.entry(e.position_id).or_insert(0.0) += e.pnl;
            }
            EngineEvent::Close(e) => {
                match e.reason {
                    CloseReason::Stop => self.stop_closes += 1,
                    CloseReason::Trail => self.trail_closes += 1,
                    CloseReason::Eod => self.eod_closes += 1,
                }
                let pnl = self.open_pnl.remove(&e.position_id).unwrap_or(0.0) + e.pnl;
                self.close_position(pnl);
            }
        }
    }

    fn close_position(&mut self, pnl: f64) {
        self.realized_pnl += pnl;
        if pnl < 0.0 {
            self.losing_positions += 1;
            self.largest_loss = self.largest_loss.min(pnl);
            self.current_losses += 1;
            self.max_consecutive_losses = self.max_consecutive_losses.max(self.current_losses);
        } else {
            self.winning_positions += 1;
            self.largest_win = self.largest_win.max(pnl);
            self.current_losses = 0;
        }
        self.peak = self.peak.max(self.realized_pnl);
        self.max_drawdown = self.max_drawdown.max(self.peak - self.realized_pnl);
    }
}

/// Forwards events while tallying them.
pub struct TallySink<'a> {
    inner: &'a mut dyn EventSink,
    summary: &'a mut ReplaySummary,
}

impl<'a> TallySink<'a> {
    pub fn new(inner: &'a mut dyn EventSink, summary: &'a mut ReplaySummary) -> Self {
        Self { inner, summary }
    }
}

impl EventSink for TallySink<'_> {
    fn emit(&mut self, event: EngineEvent) {
        self.summary.record(&event);
        self.inner.emit(event);
    }
}

/// Bucket bars by the trading day of their open time. Bars without a local time are dropped.
pub fn group_by_day(bars: &[Bar], clock: &dyn SessionClock) -> BTreeMap<NaiveDate, Vec<Bar>> {
    let mut days: BTreeMap<NaiveDate, Vec<Bar>> = BTreeMap::new();
    for bar in bars {
        match clock.trading_day(bar.ts_ms) {
            Some(day) => days.entry(day).or_default().push(*bar),
            None => warn!(ts_ms = bar.ts_ms, "bar without trading day dropped"),
        }
    }
    days
}

/// Replay both timeframes day by day. `lower` is ignored in single-timeframe mode.
pub fn replay(
    engine: &mut SymbolEngine,
    clock: &dyn SessionClock,
    higher: &[Bar],
    lower: &[Bar],
    sink: &mut dyn EventSink,
) -> ReplaySummary {
    let mut summary = ReplaySummary::default();
    let higher = group_by_day(higher, clock);
    let lower = group_by_day(lower, clock);
    let days: BTreeSet<NaiveDate> = higher.keys().chain(lower.keys()).copied().collect();

    for day in days {
        let h = higher.get(&day).map(Vec::as_slice).unwrap_or_default();
        let l = lower.get(&day).map(Vec::as_slice).unwrap_or_default();
        let mut tally = TallySink::new(sink, &mut summary);
        let fed = engine.feed_window(h, l, &mut tally);
        engine.end_session(&mut tally);
        summary.sessions += 1;
        summary.bars += fed as u64;
        info!(symbol = %engine.symbol(), %day, bars = fed, "session replayed");
    }

    info!(
        symbol = %engine.symbol(),
        sessions = summary.sessions,
        entries = summary.entries,
        pnl = summary.realized_pnl,
        "replay finished"
    );
    summary
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use sweep_core::{CloseEvent, EntryEvent, PartialExitEvent};
    use sweep_core::{Direction, EntryArchetype, ExchangeClock, Leg, MINUTE_MS};

    fn make_entry(id: u64) -> EngineEvent {
        EngineEvent::Entry(EntryEvent {
            position_id: id,
            symbol: "ES".to_string(),
            direction: Direction::Long,
            entry_type: EntryArchetype::SweepReversal,
            price: 100.0,
            stop: 98.0,
            target_prices: vec![106.0, 116.0],
            size: 3,
            time: 0,
        })
    }

    fn make_partial(id: u64, pnl: f64) -> EngineEvent {
        EngineEvent::PartialExit(PartialExitEvent {
            position_id: id,
            leg: Leg::T1,
            price: 106.0,
            qty: 1,
            pnl,
            time: 0,
        })
    }

    fn make_close(id: u64, reason: CloseReason, pnl: f64) -> EngineEvent {
        EngineEvent::Close(CloseEvent {
            position_id: id,
            reason,
            price: 100.0,
            qty: 2,
            pnl,
            time: 0,
        })
    }

    #[test]
    fn test_summary_combines_partial_and_close() {
        let mut summary = ReplaySummary::default();
        for event in [
            make_entry(1),
            make_partial(1, 300.0),
            make_close(1, CloseReason::Trail, 0.0),
            make_entry(2),
            make_close(2, CloseReason::Stop, -300.0),
            make_entry(3),
            make_close(3, CloseReason::Stop, -150.0),
        ] {
            summary.record(&event);
        }

        assert_eq!(summary.entries, 3);
        assert_eq!(summary.partial_exits, 1);
        assert_eq!(summary.winning_positions, 1);
        assert_eq!(summary.losing_positions, 2);
        assert_eq!(summary.stop_closes, 2);
        assert_eq!(summary.trail_closes, 1);
        assert_eq!(summary.max_consecutive_losses, 2);
        assert_relative_eq!(summary.realized_pnl, -150.0);
        assert_relative_eq!(summary.max_drawdown, 450.0);
        assert_relative_eq!(summary.largest_loss, -300.0);
        assert_relative_eq!(summary.win_rate(), 1.0 / 3.0);
    }

    #[test]
    fn test_empty_summary() {
        let summary = ReplaySummary::default();
        assert_eq!(summary.closed_positions(), 0);
        assert_eq!(summary.win_rate(), 0.0);
    }

    #[test]
    fn test_tally_sink_forwards() {
        let mut events = Vec::new();
        let mut summary = ReplaySummary::default();
        {
            let mut tally = TallySink::new(&mut events, &mut summary);
            tally.emit(make_entry(1));
            tally.emit(make_close(1, CloseReason::Eod, 25.0));
        }
        assert_eq!(events.len(), 2);
        assert_eq!(summary.eod_closes, 1);
        assert_relative_eq!(summary.realized_pnl, 25.0);
    }

    #[test]
    fn test_group_by_day() {
        let clock = ExchangeClock::new_york();
        // 2024-03-04 09:30 and 15:55 New York, then 2024-03-05 09:30.
        let monday = 1_709_562_600_000;
        let bars = [
            Bar::new(monday, 1.0, 1.0, 1.0, 1.0),
            Bar::new(monday + 385 * MINUTE_MS, 1.0, 1.0, 1.0, 1.0),
            Bar::new(monday + 24 * 60 * MINUTE_MS, 1.0, 1.0, 1.0, 1.0),
        ];
        let days = group_by_day(&bars, &clock);
        assert_eq!(days.len(), 2);
        assert_eq!(days.values().next().map(Vec::len), Some(2));
    }
}
