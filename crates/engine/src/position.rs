//! Position lifecycle.
//!
//! Each position is split into legs (T1, T2, Runner) and moves through three phases:
//!
//! - `Initial`: one fixed stop covers every leg.
//! - `Protected`: after T1 fills, the remaining legs share a breakeven stop.
//! - `Trailing`: after the trail-activation target, each leg trails its own swing-based stop.
//!
//! The stop is always checked before any target on the same bar (worst case assumption), and
//! a stop moved on one bar is first checked on the next.

use crate::ratchet::StopRatchet;
use crate::setup::TradeSignal;
use sweep_core::config::{ExitConfig, SizingConfig};
use sweep_core::{
    Bar, CloseEvent, CloseReason, Config, Contracts, Direction, EngineEvent, EntryArchetype,
    EntryEvent, EventSink, Leg, PartialExitEvent, Result, TimestampMs,
};
use sweep_signals::{SwingDetector, SwingKind, SwingPoint};
use tracing::{debug, info};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Initial,
    Protected,
    Trailing,
}

/// One leg of a position.
#[derive(Debug, Clone)]
pub struct LegState {
    pub leg: Leg,
    pub original_qty: Contracts,
    pub remaining: Contracts,
    pub stop: StopRatchet,
}

impl LegState {
    /// True while any quantity of the leg is still held.
    #[inline]
    pub fn is_open(&self) -> bool {
        self.remaining > 0
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExitKind {
    Target,
    Stop,
    Trail,
    Eod,
}

impl ExitKind {
    fn close_reason(self) -> CloseReason {
        match self {
            ExitKind::Stop => CloseReason::Stop,
            ExitKind::Target | ExitKind::Trail => CloseReason::Trail,
            ExitKind::Eod => CloseReason::Eod,
        }
    }
}

/// Exit ledger entry.
#[derive(Debug, Clone, PartialEq)]
pub struct ExitRecord {
    pub leg: Leg,
    pub kind: ExitKind,
    pub price: f64,
    pub qty: Contracts,
    pub pnl: f64,
    pub time: TimestampMs,
}

/// An open (or just closed) position.
#[derive(Debug, Clone)]
pub struct Position {
    pub id: u64,
    pub archetype: EntryArchetype,
    pub direction: Direction,
    pub entry_price: f64,
    /// Decision time; the position is managed from the first bar opening at or after it.
    pub entry_time: TimestampMs,
    /// Swings used for trailing must form after this management-bar index.
    pub entry_index: usize,
    pub initial_stop: f64,
    pub risk: f64,
    pub t1_price: f64,
    pub activation_price: f64,
    pub size: Contracts,
    pub phase: Phase,
    pub legs: Vec<LegState>,
    pub ledger: Vec<ExitRecord>,
    pub close_reason: Option<CloseReason>,
}

impl Position {
    /// Contracts still held across all legs.
    pub fn remaining(&self) -> Contracts {
        self.legs.iter().map(|l| l.remaining).sum()
    }

    pub fn is_flat(&self) -> bool {
        self.remaining() == 0
    }

    /// Currency P&L of every exit so far.
    pub fn realized_pnl(&self) -> f64 {
        self.ledger.iter().map(|r| r.pnl).sum()
    }

    pub fn exited_qty(&self) -> Contracts {
        self.ledger.iter().map(|r| r.qty).sum()
    }

    /// State of one leg; `None` if the position was opened without it.
    pub fn leg(&self, leg: Leg) -> Option<&LegState> {
        self.legs.iter().find(|l| l.leg == leg)
    }

    fn open_leg_indices(&self) -> Vec<usize> {
        (0..self.legs.len()).filter(|&i| self.legs[i].is_open()).collect()
    }

    /// Exit the full remaining quantity of each listed leg and emit the matching events.
    ///
    /// If the position is flat afterwards a single `Close` covers every leg exited here;
    /// otherwise each leg gets its own `PartialExit`.
    fn exit_legs(
        &mut self,
        indices: &[usize],
        kind: ExitKind,
        price_of: impl Fn(&LegState) -> f64,
        time: TimestampMs,
        point_value: f64,
        sink: &mut dyn EventSink,
    ) {
        let entry = self.entry_price;
        let sign = self.direction.sign();
        let mut fills = Vec::with_capacity(indices.len());

        for &i in indices {
            let state = &mut self.legs[i];
            if !state.is_open() {
                continue;
            }
            let price = price_of(state);
            let qty = state.remaining;
            state.remaining = 0;
            let pnl = (price - entry) * sign * qty as f64 * point_value;
            self.ledger.push(ExitRecord {
                leg: state.leg,
                kind,
                price,
                qty,
                pnl,
                time,
            });
            fills.push((state.leg, price, qty, pnl));
        }

        let Some(&(_, last_price, _, _)) = fills.last() else {
            return;
        };

        if self.is_flat() {
            let reason = kind.close_reason();
            let qty: Contracts = fills.iter().map(|f| f.2).sum();
            let pnl: f64 = fills.iter().map(|f| f.3).sum();
            self.close_reason = Some(reason);
            info!(
                position_id = self.id,
                ?reason,
                price = last_price,
                qty,
                total_pnl = self.realized_pnl(),
                "position closed"
            );
            sink.emit(EngineEvent::Close(CloseEvent {
                position_id: self.id,
                reason,
                price: last_price,
                qty,
                pnl,
                time,
            }));
        } else {
            for (leg, price, qty, pnl) in fills {
                info!(position_id = self.id, ?leg, price, qty, pnl, "partial exit");
                sink.emit(EngineEvent::PartialExit(PartialExitEvent {
                    position_id: self.id,
                    leg,
                    price,
                    qty,
                    pnl,
                    time,
                }));
            }
        }
    }

    /// Ratchet every open leg's stop towards `level`.
    fn ratchet_open_legs(&mut self, level: f64) {
        for state in self.legs.iter_mut().filter(|l| l.is_open()) {
            state.stop.apply(level);
        }
    }

    fn activate_trail(&mut self) {
        let t1 = self.t1_price;
        self.ratchet_open_legs(t1);
        self.phase = Phase::Trailing;
        debug!(position_id = self.id, stop = t1, "trail activated");
    }

    fn step(
        &mut self,
        bar: &Bar,
        time: TimestampMs,
        params: &ExitParams,
        swing: Option<&SwingPoint>,
        sink: &mut dyn EventSink,
    ) {
        let pv = params.point_value;
        match self.phase {
            Phase::Initial => {
                let open = self.open_leg_indices();
                if open.iter().any(|&i| self.legs[i].stop.is_hit(bar)) {
                    self.exit_legs(&open, ExitKind::Stop, |l| l.stop.level(), time, pv, sink);
                    return;
                }
                if !self.direction.reached(bar, self.t1_price) {
                    return;
                }
                let t1 = self.t1_price;
                let t1_legs: Vec<usize> = open
                    .iter()
                    .copied()
                    .filter(|&i| self.legs[i].leg == Leg::T1)
                    .collect();
                self.exit_legs(&t1_legs, ExitKind::Target, |_| t1, time, pv, sink);
                if self.is_flat() {
                    return;
                }
                let entry = self.entry_price;
                self.ratchet_open_legs(entry);
                self.phase = Phase::Protected;
                debug!(position_id = self.id, stop = entry, "stop moved to breakeven");

                if self.direction.reached(bar, self.activation_price) {
                    self.activate_trail();
                }
            }
            Phase::Protected => {
                let open = self.open_leg_indices();
                if open.iter().any(|&i| self.legs[i].stop.is_hit(bar)) {
                    self.exit_legs(&open, ExitKind::Trail, |l| l.stop.level(), time, pv, sink);
                    return;
                }
                if self.direction.reached(bar, self.activation_price) {
                    self.activate_trail();
                }
            }
            Phase::Trailing => {
                for i in self.open_leg_indices() {
                    if self.legs[i].stop.is_hit(bar) {
                        self.exit_legs(&[i], ExitKind::Trail, |l| l.stop.level(), time, pv, sink);
                    }
                }
                if self.is_flat() {
                    return;
                }
                let Some(swing) = swing.filter(|s| s.index > self.entry_index) else {
                    return;
                };
                let direction = self.direction;
                for state in self.legs.iter_mut().filter(|l| l.is_open()) {
                    let buffer = match state.leg {
                        Leg::Runner => params.runner_buffer,
                        _ => params.t2_buffer,
                    };
                    let proposed = direction.offset(swing.price, -buffer);
                    if state.stop.apply(proposed) {
                        debug!(
                            position_id = self.id,
                            leg = ?state.leg,
                            stop = proposed,
                            swing_index = swing.index,
                            "trailing stop moved"
                        );
                    }
                }
            }
        }
    }
}

/// Summary of a position that went flat, for loss accounting.
#[derive(Debug, Clone, PartialEq)]
pub struct ClosedPosition {
    pub id: u64,
    pub archetype: EntryArchetype,
    pub direction: Direction,
    pub pnl: f64,
    pub reason: CloseReason,
    pub time: TimestampMs,
}

impl ClosedPosition {
    #[inline]
    pub fn is_loss(&self) -> bool {
        self.pnl < 0.0
    }
}

#[derive(Debug, Clone, Copy)]
struct ExitParams {
    point_value: f64,
    t2_buffer: f64,
    runner_buffer: f64,
}

/// Owns every open position of one symbol.
pub struct PositionManager {
    symbol: String,
    exits: ExitConfig,
    sizing: SizingConfig,
    params: ExitParams,
    swings: SwingDetector,
    /// Management-timeframe bars of the current session.
    bars: Vec<Bar>,
    positions: Vec<Position>,
    next_id: u64,
}

impl PositionManager {
    /// Create a manager for one symbol. Fails if the config does not validate.
    pub fn new(config: &Config) -> Result<Self> {
        config.validate()?;
        let tick = config.instrument.tick_size;
        Ok(Self {
            symbol: config.instrument.symbol.clone(),
            exits: config.exits.clone(),
            sizing: config.sizing.clone(),
            params: ExitParams {
                point_value: config.instrument.point_value,
                t2_buffer: config.exits.t2_trail_buffer_ticks * tick,
                runner_buffer: config.exits.runner_trail_buffer_ticks * tick,
            },
            swings: SwingDetector::new(config.exits.trail_swing_strength),
            bars: Vec::new(),
            positions: Vec::new(),
            next_id: 1,
        })
    }

    /// Positions that can still be opened.
    pub fn capacity(&self) -> usize {
        self.sizing
            .max_open_positions
            .saturating_sub(self.positions.len())
    }

    /// Size of the next position, or `None` at capacity.
    pub fn next_size(&self) -> Option<Contracts> {
        if self.capacity() == 0 {
            None
        } else if self.positions.is_empty() {
            Some(self.sizing.base_size)
        } else {
            Some(self.sizing.reduced_size)
        }
    }

    fn split_legs(&self, size: Contracts) -> Vec<(Leg, Contracts)> {
        let t1 = self.sizing.t1_qty.min(size);
        let t2 = self.sizing.t2_qty.min(size - t1);
        let runner = size - t1 - t2;
        [(Leg::T1, t1), (Leg::T2, t2), (Leg::Runner, runner)]
            .into_iter()
            .filter(|(_, qty)| *qty > 0)
            .collect()
    }

    /// Open a position for a finalized signal. Returns its id, or `None` at capacity.
    pub fn open(&mut self, signal: &TradeSignal, sink: &mut dyn EventSink) -> Option<u64> {
        let size = self.next_size()?;
        let risk = signal.risk();
        if !risk.is_finite() || risk <= 0.0 {
            return None;
        }

        let id = self.next_id;
        self.next_id += 1;
        let direction = signal.direction;
        let t1_price = direction.offset(signal.entry, self.exits.t1_r_multiple * risk);
        let activation_price = direction.offset(signal.entry, self.exits.trail_r_multiple * risk);
        let legs = self
            .split_legs(size)
            .into_iter()
            .map(|(leg, qty)| LegState {
                leg,
                original_qty: qty,
                remaining: qty,
                stop: StopRatchet::new(direction, signal.stop),
            })
            .collect();

        let position = Position {
            id,
            archetype: signal.archetype,
            direction,
            entry_price: signal.entry,
            entry_time: signal.time,
            entry_index: self.bars.len(),
            initial_stop: signal.stop,
            risk,
            t1_price,
            activation_price,
            size,
            phase: Phase::Initial,
            legs,
            ledger: Vec::new(),
            close_reason: None,
        };

        info!(
            symbol = %self.symbol,
            position_id = id,
            archetype = %signal.archetype,
            %direction,
            entry = signal.entry,
            stop = signal.stop,
            t1 = t1_price,
            size,
            "position opened"
        );
        sink.emit(EngineEvent::Entry(EntryEvent {
            position_id: id,
            symbol: self.symbol.clone(),
            direction,
            entry_type: signal.archetype,
            price: signal.entry,
            stop: signal.stop,
            target_prices: vec![t1_price, activation_price],
            size,
            time: signal.time,
        }));

        self.positions.push(position);
        Some(id)
    }

    /// Manage every position on one management-timeframe bar. `time` is the bar's close time.
    pub fn on_bar(&mut self, bar: &Bar, time: TimestampMs, sink: &mut dyn EventSink) -> Vec<ClosedPosition> {
        self.bars.push(*bar);
        let swing_low = self.swings.newly_confirmed(&self.bars, SwingKind::Low);
        let swing_high = self.swings.newly_confirmed(&self.bars, SwingKind::High);

        for position in &mut self.positions {
            if position.entry_time > bar.ts_ms {
                continue;
            }
            let swing = match position.direction {
                Direction::Long => swing_low.as_ref(),
                Direction::Short => swing_high.as_ref(),
            };
            position.step(bar, time, &self.params, swing, sink);
        }
        self.take_closed(time)
    }

    /// Exit everything at `price` (session end).
    pub fn close_all(&mut self, price: f64, time: TimestampMs, sink: &mut dyn EventSink) -> Vec<ClosedPosition> {
        let pv = self.params.point_value;
        for position in &mut self.positions {
            let open = position.open_leg_indices();
            position.exit_legs(&open, ExitKind::Eod, |_| price, time, pv, sink);
        }
        self.take_closed(time)
    }

    fn take_closed(&mut self, time: TimestampMs) -> Vec<ClosedPosition> {
        let mut closed = Vec::new();
        self.positions.retain(|p| {
            if !p.is_flat() {
                return true;
            }
            closed.push(ClosedPosition {
                id: p.id,
                archetype: p.archetype,
                direction: p.direction,
                pnl: p.realized_pnl(),
                reason: p.close_reason.unwrap_or(CloseReason::Eod),
                time,
            });
            false
        });
        closed
    }

    pub fn positions(&self) -> &[Position] {
        &self.positions
    }

    /// Open position by id. Closed positions are gone.
    pub fn get(&self, id: u64) -> Option<&Position> {
        self.positions.iter().find(|p| p.id == id)
    }

    pub fn open_count(&self) -> usize {
        self.positions.len()
    }

    /// Start a new session. Call after `close_all`; position ids keep counting.
    pub fn reset(&mut self) {
        self.bars.clear();
        self.positions.clear();
    }
}
