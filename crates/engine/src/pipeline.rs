//! Setup pipeline.
//!
//! Drives every entry archetype through one state machine. Per higher-timeframe bar:
//!
//! 1. pending sweeps look for a same-direction gap, or are discarded after the wait window
//! 2. a new displaced sweep is queued (one per direction; repeats are ignored)
//! 3. a freshly formed gap may start creation, retrace or structure-break setups
//! 4. setups whose gap was touched advance: enter now, lock a structure level, or check the
//!    rejection candle, depending on archetype and entry mode
//! 5. setups older than their age limit expire
//!
//! Lower-timeframe bars only serve setups waiting for the locked level to break. Every entry
//! passes the same finalization filters; a rejected setup stays pending.

use crate::setup::{
    FilterRejection, PendingSweep, SetupId, SetupOrigin, SetupStage, SetupState, TradeSignal,
};
use ordered_float::OrderedFloat;
use std::collections::HashSet;
use std::sync::Arc;
use sweep_core::config::{EntryMode, StopBuffer, TimeframeMode};
use sweep_core::{
    to_ticks, Bar, Config, Direction, EntryArchetype, Result, SessionClock, TimestampMs, MINUTE_MS,
};
use sweep_signals::{Gap, GapId, SignalEngine, StructureBreak, Sweep};
use tracing::{debug, info, warn};

type SweepKey = (Direction, usize, OrderedFloat<f64>);

fn sweep_key(sweep: &Sweep) -> SweepKey {
    (sweep.direction, sweep.index, OrderedFloat(sweep.level))
}

/// Long-wick close back outside the gap: the wick into the zone is at least the body.
fn is_rejection(gap: &Gap, bar: &Bar) -> bool {
    let wick = match gap.direction {
        Direction::Long => bar.lower_wick(),
        Direction::Short => bar.upper_wick(),
    };
    gap.rejected_by(bar) && wick >= bar.body()
}

/// What a higher-timeframe bar does to one setup.
enum Trigger {
    Hold,
    Lock,
    Enter { entry: f64, anchor: f64 },
}

/// Setup state machine for one symbol and session.
///
/// Signals returned by [`on_htf_bar`](Self::on_htf_bar) and [`on_ltf_bar`](Self::on_ltf_bar)
/// have passed every filter; the caller still owns sizing and the shared risk gate.
pub struct SetupPipeline {
    config: Config,
    clock: Arc<dyn SessionClock>,
    signals: SignalEngine,
    pending: Vec<PendingSweep>,
    consumed: HashSet<SweepKey>,
    setups: Vec<SetupState>,
    last_bull_break: Option<StructureBreak>,
    last_bear_break: Option<StructureBreak>,
    next_id: SetupId,
    last_loss_time: Option<TimestampMs>,
    structure_break_losses: u32,
    htf_period_ms: i64,
    ltf_period_ms: i64,
}

impl SetupPipeline {
    /// Build a pipeline. Fails if the config does not validate.
    pub fn new(config: &Config, clock: Arc<dyn SessionClock>) -> Result<Self> {
        config.validate()?;
        let htf_period_ms = config.engine.htf_minutes as i64 * MINUTE_MS;
        let ltf_period_ms = match config.engine.mode {
            TimeframeMode::Dual => config.engine.ltf_minutes as i64 * MINUTE_MS,
            TimeframeMode::Single => htf_period_ms,
        };
        Ok(Self {
            config: config.clone(),
            clock,
            signals: SignalEngine::new(config)?,
            pending: Vec::new(),
            consumed: HashSet::new(),
            setups: Vec::new(),
            last_bull_break: None,
            last_bear_break: None,
            next_id: 1,
            last_loss_time: None,
            structure_break_losses: 0,
            htf_period_ms,
            ltf_period_ms,
        })
    }

    /// Process a completed higher-timeframe bar. At most `capacity` signals are returned.
    pub fn on_htf_bar(&mut self, bar: &Bar, capacity: usize) -> Vec<TradeSignal> {
        let consumed = &self.consumed;
        let update = self
            .signals
            .add_bar_excluding(bar, |s| consumed.contains(&sweep_key(s)));
        let index = update.index;
        let time = bar.ts_ms + self.htf_period_ms;

        for brk in &update.breaks {
            debug!(direction = %brk.direction, level = brk.level, index = brk.break_index, "structure break");
            match brk.direction {
                Direction::Long => self.last_bull_break = Some(*brk),
                Direction::Short => self.last_bear_break = Some(*brk),
            }
        }

        self.drop_dead_setups();
        self.attach_pending(index);
        if let Some(sweep) = update.sweep {
            self.on_sweep(sweep, index);
        }
        if let Some(gap_id) = update.gaps.formed {
            self.spawn_from_gap(gap_id, index);
        }

        let signals = self.advance_on_htf(bar, index, time, &update.gaps.touched, capacity);
        self.expire(index);
        signals
    }

    /// Process a completed lower-timeframe bar for setups awaiting structure confirmation.
    pub fn on_ltf_bar(&mut self, bar: &Bar, capacity: usize) -> Vec<TradeSignal> {
        let time = bar.ts_ms + self.ltf_period_ms;
        let abandon = self.config.structure.abandon_gap_multiple;
        let mut capacity = capacity;
        let mut signals = Vec::new();

        let mut i = 0;
        while i < self.setups.len() {
            let setup = &self.setups[i];
            let SetupStage::AwaitingStructureConfirm { level, locked_ts } = setup.stage else {
                i += 1;
                continue;
            };
            if bar.ts_ms <= locked_ts || signals.iter().any(|s: &TradeSignal| s.gap_id == setup.gap_id()) {
                i += 1;
                continue;
            }
            if level.is_broken_by(bar) {
                match self.finalize(setup, bar.close, setup.gap.far_edge(), time, capacity) {
                    Ok(signal) => {
                        capacity = capacity.saturating_sub(1);
                        signals.push(self.take_ready(i, signal));
                        continue;
                    }
                    Err(reason) => debug!(setup_id = setup.id, %reason, "confirmed setup held"),
                }
            } else if abandon.is_some_and(|m| setup.has_run_away(bar.close, m)) {
                debug!(setup_id = setup.id, close = bar.close, "setup abandoned, price ran away");
                self.setups.remove(i);
                continue;
            }
            i += 1;
        }

        self.drop_gap_siblings(&signals);
        signals
    }

    /// Record a losing position for cooldown and the structure-break kill switch.
    pub fn record_loss(&mut self, archetype: EntryArchetype, time: TimestampMs) {
        self.last_loss_time = Some(time);
        if archetype != EntryArchetype::StructureBreakRetrace {
            return;
        }
        self.structure_break_losses += 1;
        if self.structure_break_killed() {
            warn!(
                symbol = %self.config.instrument.symbol,
                losses = self.structure_break_losses,
                "structure-break entries disabled for the session"
            );
        }
    }

    /// True once structure-break losses reached the symbol's daily limit.
    pub fn structure_break_killed(&self) -> bool {
        let sb = &self.config.archetypes.structure_break;
        let limit = sb.loss_limit_for(&self.config.instrument.symbol);
        limit > 0 && self.structure_break_losses >= limit
    }

    fn advance_on_htf(
        &mut self,
        bar: &Bar,
        index: usize,
        time: TimestampMs,
        touched: &[GapId],
        capacity: usize,
    ) -> Vec<TradeSignal> {
        let mut capacity = capacity;
        let mut signals = Vec::new();

        let mut i = 0;
        while i < self.setups.len() {
            let setup = &self.setups[i];
            if signals.iter().any(|s: &TradeSignal| s.gap_id == setup.gap_id()) {
                i += 1;
                continue;
            }
            match self.trigger(setup, bar, index, time, touched) {
                Trigger::Hold => {}
                Trigger::Lock => {
                    let direction = setup.direction();
                    match self.signals.lock_level(direction) {
                        Some(level) => {
                            info!(setup_id = setup.id, level = level.level, "structure level locked");
                            self.setups[i].stage = SetupStage::AwaitingStructureConfirm {
                                level,
                                locked_ts: bar.ts_ms,
                            };
                        }
                        None => debug!(setup_id = setup.id, "no structure level to lock"),
                    }
                }
                Trigger::Enter { entry, anchor } => {
                    match self.finalize(setup, entry, anchor, time, capacity) {
                        Ok(signal) => {
                            capacity = capacity.saturating_sub(1);
                            signals.push(self.take_ready(i, signal));
                            continue;
                        }
                        Err(reason) => debug!(setup_id = setup.id, %reason, "setup held"),
                    }
                }
            }
            i += 1;
        }

        self.drop_gap_siblings(&signals);
        signals
    }

    fn trigger(
        &self,
        setup: &SetupState,
        bar: &Bar,
        index: usize,
        time: TimestampMs,
        touched: &[GapId],
    ) -> Trigger {
        let gap = &setup.gap;
        match setup.stage {
            SetupStage::Armed => {
                return Trigger::Enter {
                    entry: gap.midpoint(),
                    anchor: gap.far_edge(),
                }
            }
            SetupStage::AwaitingStructureConfirm { .. } => return Trigger::Hold,
            SetupStage::AwaitingMitigation if !touched.contains(&gap.id) => return Trigger::Hold,
            SetupStage::AwaitingMitigation => {}
        }

        let rejection_extreme = match gap.direction {
            Direction::Long => bar.low,
            Direction::Short => bar.high,
        };
        let archetypes = &self.config.archetypes;
        match setup.origin {
            SetupOrigin::SweepReversal { .. } => match self.config.entry.mode {
                EntryMode::Immediate => Trigger::Enter {
                    entry: bar.close,
                    anchor: gap.far_edge(),
                },
                EntryMode::Confirm => Trigger::Lock,
            },
            SetupOrigin::StructureBreak { .. } => Trigger::Enter {
                entry: gap.midpoint(),
                anchor: gap.far_edge(),
            },
            SetupOrigin::PriorSession => {
                let ps = &archetypes.prior_session;
                let in_window = self
                    .clock
                    .time_of_day(time)
                    .is_some_and(|t| ps.entry_window.contains(t));
                let strong = self
                    .signals
                    .trend()
                    .strength()
                    .is_some_and(|s| s >= ps.min_trend_strength);
                if in_window && strong && is_rejection(gap, bar) {
                    Trigger::Enter {
                        entry: gap.midpoint(),
                        anchor: rejection_extreme,
                    }
                } else {
                    Trigger::Hold
                }
            }
            SetupOrigin::SameSession => {
                let dwell = gap.age(index) >= archetypes.same_session.min_dwell_bars;
                if dwell && is_rejection(gap, bar) {
                    Trigger::Enter {
                        entry: gap.midpoint(),
                        anchor: rejection_extreme,
                    }
                } else {
                    Trigger::Hold
                }
            }
            SetupOrigin::Creation => Trigger::Hold,
        }
    }

    /// Run the finalization filters. The stop is `anchor` pushed out by the stop buffer.
    fn finalize(
        &self,
        setup: &SetupState,
        entry: f64,
        anchor: f64,
        time: TimestampMs,
        capacity: usize,
    ) -> std::result::Result<TradeSignal, FilterRejection> {
        if capacity == 0 {
            return Err(FilterRejection::NoCapacity);
        }

        let local = self
            .clock
            .time_of_day(time)
            .ok_or(FilterRejection::OutsideSession)?;
        if !self.config.session.allows_entry(local) {
            return Err(FilterRejection::OutsideSession);
        }

        let cooldown = self.config.entry.loss_cooldown_minutes as i64 * MINUTE_MS;
        if let Some(last) = self.last_loss_time {
            if cooldown > 0 && time - last < cooldown {
                return Err(FilterRejection::Cooldown);
            }
        }

        self.check_trend(setup)?;

        let buffer = self.stop_buffer().ok_or(FilterRejection::BufferUnavailable)?;
        let direction = setup.direction();
        let stop = direction.offset(anchor, -buffer);
        let risk_ticks = to_ticks((entry - stop) * direction.sign(), self.config.instrument.tick_size);
        if risk_ticks <= 0.0 || risk_ticks < self.config.entry.min_risk_ticks {
            return Err(FilterRejection::RiskTooSmall(risk_ticks));
        }
        let mut max_ticks = self.config.entry.max_risk_ticks;
        if setup.archetype() == EntryArchetype::StructureBreakRetrace {
            max_ticks = max_ticks.min(self.config.archetypes.structure_break.max_risk_ticks);
        }
        if risk_ticks > max_ticks {
            return Err(FilterRejection::RiskTooLarge(risk_ticks));
        }

        Ok(TradeSignal {
            setup_id: setup.id,
            archetype: setup.archetype(),
            direction,
            entry,
            stop,
            gap_id: setup.gap_id(),
            displacement: setup.displacement,
            time,
        })
    }

    /// Trend alignment, skipped for high-displacement setups, which instead must clear the
    /// strength floor whenever strength is known.
    fn check_trend(&self, setup: &SetupState) -> std::result::Result<(), FilterRejection> {
        let trend_cfg = &self.config.trend;
        if !trend_cfg.enabled {
            return Ok(());
        }
        let trend = self.signals.trend();
        let overrides = self.signals.displacement().overrides_trend(setup.displacement);
        if !overrides && trend.aligned(setup.direction()) == Some(false) {
            return Err(FilterRejection::TrendMisaligned);
        }

        let floor = if overrides {
            self.config.displacement.override_strength_floor
        } else {
            trend_cfg.min_strength
        };
        match trend.strength() {
            Some(strength) if floor > 0.0 && strength < floor => {
                Err(FilterRejection::WeakTrend(strength, floor))
            }
            _ => Ok(()),
        }
    }

    fn stop_buffer(&self) -> Option<f64> {
        match self.config.entry.stop_buffer {
            StopBuffer::Ticks(ticks) => Some(ticks * self.config.instrument.tick_size),
            StopBuffer::Atr { multiplier, .. } => self.signals.trend().atr().map(|atr| atr * multiplier),
        }
    }

    fn take_ready(&mut self, i: usize, signal: TradeSignal) -> TradeSignal {
        let setup = self.setups.remove(i);
        info!(
            symbol = %self.config.instrument.symbol,
            setup_id = setup.id,
            archetype = %signal.archetype,
            direction = %signal.direction,
            entry = signal.entry,
            stop = signal.stop,
            "setup ready"
        );
        signal
    }

    /// A gap feeds at most one position.
    fn drop_gap_siblings(&mut self, signals: &[TradeSignal]) {
        if signals.is_empty() {
            return;
        }
        let used: HashSet<GapId> = signals.iter().map(|s| s.gap_id).collect();
        self.setups.retain(|s| !used.contains(&s.gap_id()));
    }

    fn on_sweep(&mut self, sweep: Sweep, index: usize) {
        if !self.config.archetypes.sweep_reversal.enabled {
            return;
        }
        let key = sweep_key(&sweep);
        if self.consumed.contains(&key) {
            return;
        }
        if self.pending.iter().any(|p| p.direction() == sweep.direction) {
            debug!(direction = %sweep.direction, level = sweep.level, "sweep ignored, one already pending");
            self.consumed.insert(key);
            return;
        }

        let displacement = self.signals.sweep_displacement(&sweep);
        if !self.signals.displacement().displaces(displacement) {
            debug!(direction = %sweep.direction, displacement, "sweep without displacement");
            return;
        }
        self.consumed.insert(key);

        info!(
            symbol = %self.config.instrument.symbol,
            direction = %sweep.direction,
            level = sweep.level,
            depth_ticks = sweep.depth_ticks,
            displacement,
            "sweep detected"
        );
        let pending = PendingSweep {
            sweep,
            displacement,
            detected_index: index,
        };
        if !self.try_attach(&pending, index) {
            self.pending.push(pending);
        }
    }

    fn try_attach(&mut self, pending: &PendingSweep, index: usize) -> bool {
        let (first, last) = pending.gap_window(self.config.sweep.max_gap_wait_bars);
        let Some(gap) = self
            .signals
            .gaps()
            .first_in_range(pending.direction(), first, last)
            .cloned()
        else {
            return false;
        };
        self.push_setup(
            SetupOrigin::SweepReversal {
                sweep: pending.sweep,
            },
            gap,
            SetupStage::AwaitingMitigation,
            index,
            pending.displacement,
        );
        true
    }

    fn attach_pending(&mut self, index: usize) {
        let wait = self.config.sweep.max_gap_wait_bars;
        for pending in std::mem::take(&mut self.pending) {
            if self.try_attach(&pending, index) {
                continue;
            }
            if index.saturating_sub(pending.detected_index) > wait {
                debug!(direction = %pending.direction(), "sweep discarded, no gap formed");
                continue;
            }
            self.pending.push(pending);
        }
    }

    fn spawn_from_gap(&mut self, gap_id: GapId, index: usize) {
        let Some(gap) = self.signals.gaps().get(gap_id).cloned() else {
            return;
        };
        let displacement = self.signals.gap_displacement(&gap);
        let archetypes = self.config.archetypes.clone();

        if archetypes.creation.enabled && displacement >= archetypes.creation.min_displacement {
            self.push_setup(SetupOrigin::Creation, gap.clone(), SetupStage::Armed, index, displacement);
        }

        if let Some(formed_at) = self.clock.time_of_day(gap.created_ts) {
            let origin = if formed_at < self.config.session.regular_open {
                archetypes.prior_session.enabled.then_some(SetupOrigin::PriorSession)
            } else {
                archetypes.same_session.enabled.then_some(SetupOrigin::SameSession)
            };
            if let Some(origin) = origin {
                self.push_setup(origin, gap.clone(), SetupStage::AwaitingMitigation, index, displacement);
            }
        }

        if archetypes.structure_break.enabled && !self.structure_break_killed() {
            let window = archetypes.structure_break.gap_window_bars;
            let recent = match gap.direction {
                Direction::Long => self.last_bull_break,
                Direction::Short => self.last_bear_break,
            }
            .filter(|b| index >= b.break_index && index - b.break_index <= window);
            if let Some(brk) = recent {
                self.push_setup(
                    SetupOrigin::StructureBreak { brk },
                    gap,
                    SetupStage::AwaitingMitigation,
                    index,
                    displacement,
                );
            }
        }
    }

    fn push_setup(
        &mut self,
        origin: SetupOrigin,
        gap: Gap,
        stage: SetupStage,
        index: usize,
        displacement: f64,
    ) {
        let id = self.next_id;
        self.next_id += 1;
        debug!(
            setup_id = id,
            archetype = %origin.archetype(),
            direction = %gap.direction,
            gap_id = gap.id,
            top = gap.top,
            bottom = gap.bottom,
            "setup created"
        );
        self.setups.push(SetupState {
            id,
            origin,
            gap,
            stage,
            created_index: index,
            displacement,
        });
    }

    /// Drop setups whose gap is no longer tracked, and killed structure-break setups.
    fn drop_dead_setups(&mut self) {
        let killed = self.structure_break_killed();
        let gaps = self.signals.gaps();
        self.setups.retain(|s| {
            let alive = gaps.get(s.gap_id()).is_some_and(|g| !g.invalidated);
            if !alive {
                debug!(setup_id = s.id, gap_id = s.gap_id(), "setup dropped, gap gone");
            }
            alive && !(killed && s.archetype() == EntryArchetype::StructureBreakRetrace)
        });
    }

    fn expire(&mut self, index: usize) {
        let gap_limit = self.config.gap.max_fvg_age_bars;
        let creation_limit = self.config.archetypes.creation.max_age_bars;
        self.setups.retain(|s| {
            let limit = match s.origin {
                SetupOrigin::Creation => creation_limit,
                _ => gap_limit,
            };
            if s.age(index) > limit {
                debug!(setup_id = s.id, age = s.age(index), "setup expired");
                return false;
            }
            true
        });
    }

    /// Live setups, oldest first.
    pub fn setups(&self) -> &[SetupState] {
        &self.setups
    }

    /// Displaced sweeps still waiting for a gap, at most one per direction.
    pub fn pending_sweeps(&self) -> &[PendingSweep] {
        &self.pending
    }

    pub fn signals(&self) -> &SignalEngine {
        &self.signals
    }

    pub fn htf_period_ms(&self) -> i64 {
        self.htf_period_ms
    }

    pub fn ltf_period_ms(&self) -> i64 {
        self.ltf_period_ms
    }

    /// Forget everything for a new session.
    pub fn reset(&mut self) {
        self.signals.clear();
        self.pending.clear();
        self.consumed.clear();
        self.setups.clear();
        self.last_bull_break = None;
        self.last_bear_break = None;
        self.last_loss_time = None;
        self.structure_break_losses = 0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sweep_core::ExchangeClock;
    use sweep_signals::LockedLevel;

    /// 2024-03-04 09:30 New York.
    const MONDAY_OPEN: TimestampMs = 1_709_562_600_000;
    const BAR_MS: i64 = 5 * MINUTE_MS;

    fn make_config() -> Config {
        let mut config = Config::default();
        config.displacement.avg_body_lookback = 3;
        config.displacement.multiplier = 1.0;
        config.displacement.override_ratio = 1.0;
        config.swing.strength = 1;
        config.entry.min_risk_ticks = 4.0;
        config.entry.max_risk_ticks = 40.0;
        config
    }

    fn make_pipeline(config: &Config) -> SetupPipeline {
        SetupPipeline::new(config, Arc::new(ExchangeClock::new_york())).unwrap()
    }

    fn make_bar(i: usize, open: f64, high: f64, low: f64, close: f64) -> Bar {
        Bar::new(MONDAY_OPEN + i as i64 * BAR_MS, open, high, low, close)
    }

    fn make_gap(direction: Direction) -> Gap {
        Gap {
            id: 1,
            direction,
            top: 101.0,
            bottom: 100.0,
            created_index: 2,
            created_ts: MONDAY_OPEN,
            size_ticks: 4.0,
            mitigated: false,
            mitigated_index: None,
            invalidated: false,
        }
    }

    fn make_setup(origin: SetupOrigin, direction: Direction) -> SetupState {
        SetupState {
            id: 9,
            origin,
            gap: make_gap(direction),
            stage: SetupStage::AwaitingMitigation,
            created_index: 3,
            displacement: 2.0,
        }
    }

    fn make_sweep(direction: Direction, index: usize, level: f64) -> Sweep {
        Sweep {
            direction,
            sweep_price: level - 0.5,
            level,
            depth_ticks: 2.0,
            index,
            ts_ms: MONDAY_OPEN + index as i64 * BAR_MS,
        }
    }

    /// Bars with equal bodies so every bar displaces at multiplier 1.
    fn warm(pipeline: &mut SetupPipeline, count: usize) {
        for i in 0..count {
            let base = 100.0 + (i % 2) as f64 * 0.25;
            pipeline.on_htf_bar(&make_bar(i, base, base + 1.0, base - 1.0, base + 0.5), 1);
        }
    }

    #[test]
    fn test_rejects_invalid_config() {
        let mut config = make_config();
        config.entry.max_risk_ticks = 1.0;
        assert!(SetupPipeline::new(&config, Arc::new(ExchangeClock::new_york())).is_err());
    }

    #[test]
    fn test_second_same_direction_sweep_ignored() {
        let mut pipeline = make_pipeline(&make_config());
        warm(&mut pipeline, 6);

        pipeline.on_sweep(make_sweep(Direction::Long, 4, 99.0), 5);
        assert_eq!(pipeline.pending_sweeps().len(), 1);

        pipeline.on_sweep(make_sweep(Direction::Long, 5, 98.5), 5);
        assert_eq!(pipeline.pending_sweeps().len(), 1);
        assert_eq!(pipeline.pending_sweeps()[0].sweep.index, 4);

        pipeline.on_sweep(make_sweep(Direction::Short, 5, 102.0), 5);
        assert_eq!(pipeline.pending_sweeps().len(), 2);
    }

    #[test]
    fn test_consumed_sweep_not_requeued() {
        let mut pipeline = make_pipeline(&make_config());
        warm(&mut pipeline, 6);
        let sweep = make_sweep(Direction::Long, 4, 99.0);

        pipeline.on_sweep(sweep, 5);
        pipeline.pending.clear();
        pipeline.on_sweep(sweep, 6);
        assert!(pipeline.pending_sweeps().is_empty());
    }

    #[test]
    fn test_pending_sweep_discarded_after_wait() {
        let mut config = make_config();
        config.sweep.max_gap_wait_bars = 2;
        let mut pipeline = make_pipeline(&config);
        warm(&mut pipeline, 6);

        pipeline.on_sweep(make_sweep(Direction::Long, 5, 99.0), 5);
        assert_eq!(pipeline.pending_sweeps().len(), 1);

        // Overlapping bars never form a gap.
        for i in 6..9 {
            pipeline.on_htf_bar(&make_bar(i, 100.0, 101.0, 99.0, 100.5), 1);
        }
        assert!(pipeline.pending_sweeps().is_empty());
        assert!(pipeline.setups().is_empty());
    }

    #[test]
    fn test_finalize_risk_bounds() {
        let pipeline = make_pipeline(&make_config());
        let setup = make_setup(SetupOrigin::SameSession, Direction::Long);
        let time = MONDAY_OPEN + 30 * MINUTE_MS;

        // Default buffer: 2 ticks = 0.5, stop 99.5.
        let signal = pipeline.finalize(&setup, 100.5, 100.0, time, 1).unwrap();
        assert!((signal.stop - 99.5).abs() < 1e-12);
        assert_eq!(signal.archetype, EntryArchetype::SameSessionRetrace);

        assert_eq!(
            pipeline.finalize(&setup, 99.75, 100.0, time, 1),
            Err(FilterRejection::RiskTooSmall(1.0))
        );
        assert!(matches!(
            pipeline.finalize(&setup, 111.0, 100.0, time, 1),
            Err(FilterRejection::RiskTooLarge(_))
        ));
        assert_eq!(
            pipeline.finalize(&setup, 100.5, 100.0, time, 0),
            Err(FilterRejection::NoCapacity)
        );
    }

    #[test]
    fn test_structure_break_risk_cap() {
        let mut config = make_config();
        config.archetypes.structure_break.max_risk_ticks = 8.0;
        let pipeline = make_pipeline(&config);
        let brk = StructureBreak {
            direction: Direction::Long,
            level: 101.0,
            swing_index: 0,
            break_index: 2,
            ts_ms: MONDAY_OPEN,
        };
        let setup = make_setup(SetupOrigin::StructureBreak { brk }, Direction::Long);
        let time = MONDAY_OPEN + 30 * MINUTE_MS;

        // 12 ticks passes the general cap but not the structure-break cap.
        assert!(matches!(
            pipeline.finalize(&setup, 102.5, 100.0, time, 1),
            Err(FilterRejection::RiskTooLarge(_))
        ));
        assert!(pipeline.finalize(&setup, 101.0, 100.0, time, 1).is_ok());
    }

    #[test]
    fn test_session_filter() {
        let pipeline = make_pipeline(&make_config());
        let setup = make_setup(SetupOrigin::SameSession, Direction::Long);

        let before_open = MONDAY_OPEN - 10 * MINUTE_MS;
        let lunch = MONDAY_OPEN + 150 * MINUTE_MS;
        let after_close = MONDAY_OPEN + 390 * MINUTE_MS;
        for time in [before_open, lunch, after_close] {
            assert_eq!(
                pipeline.finalize(&setup, 100.5, 100.0, time, 1),
                Err(FilterRejection::OutsideSession)
            );
        }
    }

    #[test]
    fn test_loss_cooldown() {
        let mut config = make_config();
        config.entry.loss_cooldown_minutes = 15;
        let mut pipeline = make_pipeline(&config);
        let setup = make_setup(SetupOrigin::SameSession, Direction::Long);
        let loss_time = MONDAY_OPEN + 30 * MINUTE_MS;

        pipeline.record_loss(EntryArchetype::SameSessionRetrace, loss_time);
        assert_eq!(
            pipeline.finalize(&setup, 100.5, 100.0, loss_time + 10 * MINUTE_MS, 1),
            Err(FilterRejection::Cooldown)
        );
        assert!(pipeline
            .finalize(&setup, 100.5, 100.0, loss_time + 15 * MINUTE_MS, 1)
            .is_ok());
    }

    #[test]
    fn test_structure_break_kill_switch() {
        let mut config = make_config();
        config.instrument.symbol = "NQ".to_string();
        config.archetypes.structure_break.enabled = true;
        config.archetypes.structure_break.daily_loss_limit = 1;
        config
            .archetypes
            .structure_break
            .loss_limit_overrides
            .insert("NQ".to_string(), 2);
        let mut pipeline = make_pipeline(&config);

        pipeline.record_loss(EntryArchetype::StructureBreakRetrace, MONDAY_OPEN);
        assert!(!pipeline.structure_break_killed());
        pipeline.record_loss(EntryArchetype::SweepReversal, MONDAY_OPEN);
        assert!(!pipeline.structure_break_killed());
        pipeline.record_loss(EntryArchetype::StructureBreakRetrace, MONDAY_OPEN);
        assert!(pipeline.structure_break_killed());

        pipeline.reset();
        assert!(!pipeline.structure_break_killed());
    }

    #[test]
    fn test_atr_stop_buffer() {
        let mut config = make_config();
        config.entry.stop_buffer = StopBuffer::Atr {
            period: 3,
            multiplier: 0.5,
        };
        let mut pipeline = make_pipeline(&config);
        let setup = make_setup(SetupOrigin::SameSession, Direction::Long);
        let time = MONDAY_OPEN + 30 * MINUTE_MS;

        assert_eq!(
            pipeline.finalize(&setup, 101.0, 100.0, time, 1),
            Err(FilterRejection::BufferUnavailable)
        );

        // Three bars with a true range of 2.0: buffer 1.0, stop 99.0.
        warm(&mut pipeline, 3);
        let signal = pipeline.finalize(&setup, 101.0, 100.0, time, 1).unwrap();
        assert!((signal.stop - 99.0).abs() < 1e-12);
    }

    fn make_locked_setup(level: f64) -> SetupState {
        let mut setup = make_setup(
            SetupOrigin::SweepReversal {
                sweep: make_sweep(Direction::Long, 1, 99.0),
            },
            Direction::Long,
        );
        setup.stage = SetupStage::AwaitingStructureConfirm {
            level: LockedLevel {
                bias: Direction::Long,
                level,
                swing_index: 1,
            },
            locked_ts: MONDAY_OPEN,
        };
        setup
    }

    #[test]
    fn test_confirm_setup_abandoned_when_price_runs_away() {
        let mut pipeline = make_pipeline(&make_config());
        pipeline.setups.push(make_locked_setup(104.0));

        // Gap [100, 101], default multiple 2: a close above 103 without a break abandons.
        let signals = pipeline.on_ltf_bar(&make_bar(6, 102.0, 103.75, 102.0, 103.5), 1);
        assert!(signals.is_empty());
        assert!(pipeline.setups().is_empty());
    }

    #[test]
    fn test_break_wins_over_runaway_on_same_bar() {
        let mut pipeline = make_pipeline(&make_config());
        pipeline.setups.push(make_locked_setup(104.0));

        // 104.5 breaks the level and is also past the abandon distance.
        let signals = pipeline.on_ltf_bar(&make_bar(6, 103.0, 104.75, 103.0, 104.5), 1);
        assert_eq!(signals.len(), 1);
        assert_eq!(signals[0].archetype, EntryArchetype::SweepReversal);
        assert!((signals[0].entry - 104.5).abs() < 1e-12);
        assert!((signals[0].stop - 99.5).abs() < 1e-12);
        assert!(pipeline.setups().is_empty());
    }

    #[test]
    fn test_confirmed_break_enters_at_close() {
        let mut pipeline = make_pipeline(&make_config());
        pipeline.setups.push(make_locked_setup(102.5));

        // Not yet broken, not run away.
        assert!(pipeline
            .on_ltf_bar(&make_bar(6, 101.5, 102.5, 101.25, 102.25), 1)
            .is_empty());
        assert_eq!(pipeline.setups().len(), 1);

        let signals = pipeline.on_ltf_bar(&make_bar(7, 102.25, 103.0, 102.0, 102.75), 1);
        assert_eq!(signals.len(), 1);
        assert!((signals[0].entry - 102.75).abs() < 1e-12);
    }

    fn run(pipeline: &mut SetupPipeline, bars: &[Bar]) -> Vec<TradeSignal> {
        bars.iter().flat_map(|b| pipeline.on_htf_bar(b, 1)).collect()
    }

    /// Bullish gap [100.5, 101.5] with its middle bar at `start + 5m`, then a rejection dip to
    /// 101.25 and a deeper one to 100.75.
    fn retrace_bars(start: TimestampMs) -> Vec<Bar> {
        let at = |i: i64| start + i * BAR_MS;
        vec![
            Bar::new(at(0), 100.0, 100.5, 99.75, 100.25),
            Bar::new(at(1), 100.25, 102.5, 100.25, 102.25),
            Bar::new(at(2), 102.25, 103.0, 101.5, 102.75),
            Bar::new(at(3), 102.5, 102.75, 101.25, 102.0),
            Bar::new(at(4), 102.25, 102.5, 100.75, 102.0),
        ]
    }

    fn retrace_config() -> Config {
        let mut config = make_config();
        config.archetypes.sweep_reversal.enabled = false;
        config.entry.min_risk_ticks = 1.0;
        config
    }

    #[test]
    fn test_same_session_waits_for_dwell_then_enters() {
        let mut config = retrace_config();
        config.archetypes.same_session.enabled = true;
        config.archetypes.same_session.min_dwell_bars = 3;
        let mut pipeline = make_pipeline(&config);
        let bars = retrace_bars(MONDAY_OPEN);

        // The first rejection comes two bars after the middle bar: too early.
        assert!(run(&mut pipeline, &bars[..4]).is_empty());
        assert_eq!(pipeline.setups().len(), 1);
        assert_eq!(pipeline.setups()[0].archetype(), EntryArchetype::SameSessionRetrace);

        let signals = run(&mut pipeline, &bars[4..]);
        assert_eq!(signals.len(), 1);
        let signal = &signals[0];
        assert_eq!(signal.archetype, EntryArchetype::SameSessionRetrace);
        assert_eq!(signal.direction, Direction::Long);
        // Midpoint entry, stop under the rejection low.
        assert!((signal.entry - 101.0).abs() < 1e-12);
        assert!((signal.stop - 100.25).abs() < 1e-12);
        assert_eq!(signal.time, MONDAY_OPEN + 5 * BAR_MS);
        assert!(pipeline.setups().is_empty());
    }

    #[test]
    fn test_expired_gap_drops_its_setup() {
        let mut config = retrace_config();
        config.archetypes.same_session.enabled = true;
        config.archetypes.same_session.min_dwell_bars = 3;
        config.gap.max_fvg_age_bars = 2;
        let mut pipeline = make_pipeline(&config);

        let signals = run(&mut pipeline, &retrace_bars(MONDAY_OPEN));
        assert!(signals.is_empty());
        assert!(pipeline.setups().is_empty());
        assert!(pipeline.signals().gaps().is_empty());
    }

    #[test]
    fn test_prior_session_gap_enters_on_rejection_after_open() {
        let mut config = retrace_config();
        config.archetypes.prior_session.enabled = true;
        config.archetypes.prior_session.min_trend_strength = 0.0;
        config.trend.strength_period = 1;
        let mut pipeline = make_pipeline(&config);

        // Middle bar at 09:20, first dip in the 09:30 bar.
        let bars = retrace_bars(MONDAY_OPEN - 3 * BAR_MS);
        let signals = run(&mut pipeline, &bars[..4]);
        assert_eq!(signals.len(), 1);
        let signal = &signals[0];
        assert_eq!(signal.archetype, EntryArchetype::PriorSessionRetrace);
        assert!((signal.entry - 101.0).abs() < 1e-12);
        assert!((signal.stop - 100.75).abs() < 1e-12);
        assert_eq!(signal.time, MONDAY_OPEN + BAR_MS);
    }

    #[test]
    fn test_prior_session_needs_trend_strength() {
        let mut config = retrace_config();
        config.archetypes.prior_session.enabled = true;
        config.archetypes.prior_session.min_trend_strength = 101.0;
        config.trend.strength_period = 1;
        let mut pipeline = make_pipeline(&config);

        let signals = run(&mut pipeline, &retrace_bars(MONDAY_OPEN - 3 * BAR_MS));
        assert!(signals.is_empty());
        assert_eq!(pipeline.setups().len(), 1);
        assert_eq!(pipeline.setups()[0].archetype(), EntryArchetype::PriorSessionRetrace);
    }

    #[test]
    fn test_structure_break_gap_enters_at_midpoint() {
        let mut config = make_config();
        config.archetypes.sweep_reversal.enabled = false;
        config.archetypes.structure_break.enabled = true;
        let mut pipeline = make_pipeline(&config);

        let bars = [
            make_bar(0, 100.0, 100.5, 99.5, 100.0),
            make_bar(1, 100.0, 101.0, 99.75, 100.5),
            // Swing high 101.5.
            make_bar(2, 100.5, 101.5, 100.0, 101.0),
            make_bar(3, 101.0, 101.25, 100.25, 100.5),
            make_bar(4, 100.5, 101.0, 100.0, 100.75),
            // Closes through 101.5 and is the middle bar of gap [101.0, 102.25].
            make_bar(5, 100.75, 103.5, 100.75, 103.25),
            make_bar(6, 103.25, 104.0, 102.25, 103.75),
        ];
        assert!(run(&mut pipeline, &bars).is_empty());
        assert_eq!(pipeline.setups().len(), 1);
        match &pipeline.setups()[0].origin {
            SetupOrigin::StructureBreak { brk } => {
                assert_eq!(brk.break_index, 5);
                assert!((brk.level - 101.5).abs() < 1e-12);
            }
            other => panic!("unexpected origin {other:?}"),
        }

        let signals = run(&mut pipeline, &[make_bar(7, 103.5, 103.75, 102.0, 103.0)]);
        assert_eq!(signals.len(), 1);
        let signal = &signals[0];
        assert_eq!(signal.archetype, EntryArchetype::StructureBreakRetrace);
        assert!((signal.entry - 101.625).abs() < 1e-12);
        assert!((signal.stop - 100.5).abs() < 1e-12);
    }

    #[test]
    fn test_sweep_reversal_confirm_mode_end_to_end() {
        let mut config = make_config();
        config.sweep.check_bars = 1;
        config.structure.strength = 1;
        let mut pipeline = make_pipeline(&config);

        let bars = [
            make_bar(0, 101.5, 102.0, 101.0, 101.0),
            // Swing low 100.0.
            make_bar(1, 101.0, 101.25, 100.0, 100.5),
            make_bar(2, 100.5, 101.75, 100.25, 101.25),
            // Sweeps 100.0 with a large body.
            make_bar(3, 99.75, 101.5, 99.5, 101.25),
            // Middle bar of gap [101.5, 102.5].
            make_bar(4, 101.25, 103.0, 101.0, 102.75),
            // Swing high 103.5.
            make_bar(5, 102.75, 103.5, 102.5, 103.25),
            make_bar(6, 103.25, 103.25, 102.75, 103.0),
        ];
        assert!(run(&mut pipeline, &bars[..4]).is_empty());
        assert_eq!(pipeline.pending_sweeps().len(), 1);
        assert_eq!(pipeline.pending_sweeps()[0].sweep.index, 3);

        assert!(run(&mut pipeline, &bars[4..]).is_empty());
        assert!(pipeline.pending_sweeps().is_empty());
        assert_eq!(pipeline.setups().len(), 1);
        assert_eq!(pipeline.setups()[0].stage, SetupStage::AwaitingMitigation);

        // The retrace into the gap locks the latest swing high.
        let touch = make_bar(7, 103.0, 103.0, 102.25, 102.5);
        assert!(run(&mut pipeline, &[touch]).is_empty());
        match pipeline.setups()[0].stage {
            SetupStage::AwaitingStructureConfirm { level, locked_ts } => {
                assert!((level.level - 103.5).abs() < 1e-12);
                assert_eq!(locked_ts, touch.ts_ms);
            }
            ref other => panic!("unexpected stage {other:?}"),
        }

        let ltf = |minute: i64, open: f64, high: f64, low: f64, close: f64| {
            Bar::new(touch.ts_ms + minute * MINUTE_MS, open, high, low, close)
        };
        // Bars not after the lock are ignored.
        assert!(pipeline.on_ltf_bar(&ltf(0, 103.0, 104.25, 103.0, 104.0), 1).is_empty());
        assert!(pipeline.on_ltf_bar(&ltf(5, 102.75, 103.25, 102.5, 103.0), 1).is_empty());

        let signals = pipeline.on_ltf_bar(&ltf(6, 103.0, 103.75, 103.0, 103.75), 1);
        assert_eq!(signals.len(), 1);
        let signal = &signals[0];
        assert_eq!(signal.archetype, EntryArchetype::SweepReversal);
        assert!((signal.entry - 103.75).abs() < 1e-12);
        assert!((signal.stop - 101.0).abs() < 1e-12);
        assert_eq!(signal.time, touch.ts_ms + 7 * MINUTE_MS);
        assert!(pipeline.setups().is_empty());
    }

    #[test]
    fn test_rejection_candle() {
        let gap = make_gap(Direction::Long);
        // Dips to 100.5, closes 101.5: wick 0.75 >= body 0.25.
        assert!(is_rejection(&gap, &Bar::new(0, 101.25, 101.75, 100.5, 101.5)));
        // Closes inside the zone.
        assert!(!is_rejection(&gap, &Bar::new(0, 101.25, 101.75, 100.5, 100.75)));
        // Body larger than the wick.
        assert!(!is_rejection(&gap, &Bar::new(0, 100.75, 102.5, 100.5, 102.25)));
    }

    #[test]
    fn test_creation_setup_enters_on_formation() {
        let mut config = make_config();
        config.archetypes.sweep_reversal.enabled = false;
        config.archetypes.creation.enabled = true;
        config.archetypes.creation.min_displacement = 1.5;
        config.gap.min_fvg_ticks = 2.0;
        let mut pipeline = make_pipeline(&config);

        let bars = [
            make_bar(0, 100.0, 100.5, 99.75, 100.25),
            make_bar(1, 100.25, 100.75, 100.0, 100.5),
            make_bar(2, 100.5, 101.0, 100.25, 100.75),
            // Displacement bar between small bodies.
            make_bar(3, 100.75, 103.0, 100.75, 102.75),
            make_bar(4, 102.75, 103.5, 102.5, 103.25),
        ];
        let mut signals = Vec::new();
        for bar in &bars {
            signals.extend(pipeline.on_htf_bar(bar, 1));
        }

        assert_eq!(signals.len(), 1);
        let signal = &signals[0];
        assert_eq!(signal.archetype, EntryArchetype::Creation);
        assert_eq!(signal.direction, Direction::Long);
        // Gap [101.0, 102.5]: midpoint 101.75, stop 101.0 - 0.5.
        assert!((signal.entry - 101.75).abs() < 1e-12);
        assert!((signal.stop - 100.5).abs() < 1e-12);
        assert!(pipeline.setups().is_empty());
    }
}
