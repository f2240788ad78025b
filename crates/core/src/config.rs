//! Configuration structures for the sweep-trader system.
//!
//! Every section has a `Default` matching the reference futures setup (ES-style tick size,
//! New York session). [`Config::validate`] rejects inconsistent settings before any engine is
//! built; constructors that take a `Config` call it.

use crate::clock::{ExchangeClock, TimeWindow};
use crate::error::{Error, Result};
use chrono::NaiveTime;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Main configuration for the trading system.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Instrument configuration.
    pub instrument: InstrumentConfig,
    /// Swing point detection.
    pub swing: SwingConfig,
    /// Liquidity sweep detection.
    pub sweep: SweepConfig,
    /// Displacement (large body) filter.
    pub displacement: DisplacementConfig,
    /// Fair value gap tracking.
    pub gap: GapConfig,
    /// Structure shift confirmation.
    pub structure: StructureConfig,
    /// Entry construction and finalization filters.
    pub entry: EntryConfig,
    /// Trend alignment and strength.
    pub trend: TrendConfig,
    /// Session windows.
    pub session: SessionConfig,
    /// Entry archetype switches and parameters.
    pub archetypes: ArchetypeConfig,
    /// Exit targets and trailing.
    pub exits: ExitConfig,
    /// Position sizing configuration.
    pub sizing: SizingConfig,
    /// Shared daily risk limits.
    pub risk: RiskConfig,
    /// Timeframe wiring.
    pub engine: EngineConfig,
}

impl Config {
    /// Parse a TOML document and validate it.
    pub fn from_toml_str(s: &str) -> Result<Self> {
        let config: Config = toml::from_str(s)?;
        config.validate()?;
        Ok(config)
    }

    /// Price distance of `ticks` ticks.
    #[inline]
    pub fn ticks(&self, ticks: f64) -> f64 {
        ticks * self.instrument.tick_size
    }

    /// Check every cross-field constraint. Fails on the first violation.
    pub fn validate(&self) -> Result<()> {
        let i = &self.instrument;
        ensure(!i.symbol.is_empty(), "instrument.symbol must not be empty")?;
        ensure(
            i.tick_size.is_finite() && i.tick_size > 0.0,
            "instrument.tick_size must be positive",
        )?;
        ensure(
            i.point_value.is_finite() && i.point_value > 0.0,
            "instrument.point_value must be positive",
        )?;
        ExchangeClock::from_name(&i.timezone)?;

        ensure(self.swing.strength >= 1, "swing.strength must be at least 1")?;
        ensure(self.swing.max_swings >= 1, "swing.max_swings must be at least 1")?;

        let s = &self.sweep;
        ensure(s.min_sweep_ticks >= 0.0, "sweep.min_sweep_ticks must be non-negative")?;
        ensure(
            s.max_sweep_ticks >= s.min_sweep_ticks,
            "sweep.max_sweep_ticks must be >= sweep.min_sweep_ticks",
        )?;
        ensure(s.check_bars >= 1, "sweep.check_bars must be at least 1")?;
        ensure(s.max_gap_wait_bars >= 1, "sweep.max_gap_wait_bars must be at least 1")?;

        let d = &self.displacement;
        ensure(d.avg_body_lookback >= 1, "displacement.avg_body_lookback must be at least 1")?;
        ensure(d.multiplier > 0.0, "displacement.multiplier must be positive")?;
        ensure(
            d.override_ratio >= d.multiplier,
            "displacement.override_ratio must be >= displacement.multiplier",
        )?;
        ensure(
            d.override_strength_floor >= 0.0,
            "displacement.override_strength_floor must be non-negative",
        )?;

        self.gap.validate()?;

        ensure(self.structure.lookback >= 1, "structure.lookback must be at least 1")?;
        ensure(self.structure.strength >= 1, "structure.strength must be at least 1")?;
        if let Some(m) = self.structure.abandon_gap_multiple {
            ensure(m > 0.0, "structure.abandon_gap_multiple must be positive")?;
        }

        let e = &self.entry;
        match e.stop_buffer {
            StopBuffer::Ticks(t) => ensure(t >= 0.0, "entry.stop_buffer ticks must be non-negative")?,
            StopBuffer::Atr { period, multiplier } => {
                ensure(period >= 1, "entry.stop_buffer atr period must be at least 1")?;
                ensure(multiplier >= 0.0, "entry.stop_buffer atr multiplier must be non-negative")?;
            }
        }
        ensure(e.min_risk_ticks >= 0.0, "entry.min_risk_ticks must be non-negative")?;
        ensure(
            e.max_risk_ticks >= e.min_risk_ticks,
            "entry.max_risk_ticks must be >= entry.min_risk_ticks",
        )?;

        let t = &self.trend;
        ensure(t.fast_period >= 1, "trend.fast_period must be at least 1")?;
        ensure(
            t.slow_period > t.fast_period,
            "trend.slow_period must be greater than trend.fast_period",
        )?;
        ensure(t.strength_period >= 1, "trend.strength_period must be at least 1")?;
        ensure(t.min_strength >= 0.0, "trend.min_strength must be non-negative")?;

        let ss = &self.session;
        ensure(
            ss.regular_open < ss.regular_close,
            "session.regular_open must be before session.regular_close",
        )?;
        ensure(ss.lunch.is_valid(), "session.lunch start must be before end")?;
        ensure(
            ss.killzones.iter().all(TimeWindow::is_valid),
            "session.killzones must each start before they end",
        )?;
        ensure(
            !ss.require_killzone || !ss.killzones.is_empty(),
            "session.require_killzone needs at least one killzone",
        )?;

        let a = &self.archetypes;
        ensure(
            a.any_enabled(),
            "at least one entry archetype must be enabled",
        )?;
        ensure(
            a.creation.min_displacement > 0.0,
            "archetypes.creation.min_displacement must be positive",
        )?;
        ensure(
            a.prior_session.entry_window.is_valid(),
            "archetypes.prior_session.entry_window start must be before end",
        )?;
        ensure(
            a.structure_break.gap_window_bars >= 1,
            "archetypes.structure_break.gap_window_bars must be at least 1",
        )?;
        ensure(
            a.structure_break.max_risk_ticks >= e.min_risk_ticks,
            "archetypes.structure_break.max_risk_ticks must be >= entry.min_risk_ticks",
        )?;

        let x = &self.exits;
        ensure(x.t1_r_multiple > 0.0, "exits.t1_r_multiple must be positive")?;
        ensure(
            x.trail_r_multiple > x.t1_r_multiple,
            "exits.trail_r_multiple must be greater than exits.t1_r_multiple",
        )?;
        ensure(x.trail_swing_strength >= 1, "exits.trail_swing_strength must be at least 1")?;
        ensure(
            x.t2_trail_buffer_ticks >= 0.0 && x.runner_trail_buffer_ticks >= 0.0,
            "exits trail buffers must be non-negative",
        )?;

        let z = &self.sizing;
        ensure(z.t1_qty >= 1, "sizing.t1_qty must be at least 1")?;
        ensure(
            z.reduced_size > z.t1_qty,
            "sizing.reduced_size must exceed sizing.t1_qty",
        )?;
        ensure(
            z.base_size >= z.reduced_size,
            "sizing.base_size must be >= sizing.reduced_size",
        )?;
        ensure(z.max_open_positions >= 1, "sizing.max_open_positions must be at least 1")?;

        if let Some(amount) = self.risk.max_daily_loss {
            ensure(amount > 0.0, "risk.max_daily_loss must be positive")?;
        }

        let g = &self.engine;
        ensure(g.ltf_minutes >= 1, "engine.ltf_minutes must be at least 1")?;
        ensure(
            g.htf_minutes >= g.ltf_minutes,
            "engine.htf_minutes must be >= engine.ltf_minutes",
        )?;

        Ok(())
    }
}

fn ensure(condition: bool, msg: &str) -> Result<()> {
    if condition {
        Ok(())
    } else {
        Err(Error::config(msg))
    }
}

fn hm(h: u32, m: u32) -> NaiveTime {
    NaiveTime::from_hms_opt(h, m, 0).unwrap_or(NaiveTime::MIN)
}

fn window(start: (u32, u32), end: (u32, u32)) -> TimeWindow {
    TimeWindow {
        start: hm(start.0, start.1),
        end: hm(end.0, end.1),
    }
}

/// Instrument-specific configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct InstrumentConfig {
    /// Trading symbol (e.g., "ES").
    pub symbol: String,
    /// Tick size (minimum price increment).
    pub tick_size: f64,
    /// Currency value of one full point per contract.
    pub point_value: f64,
    /// IANA time zone of the exchange session.
    pub timezone: String,
}

impl Default for InstrumentConfig {
    fn default() -> Self {
        Self {
            symbol: "ES".to_string(),
            tick_size: 0.25,
            point_value: 50.0,
            timezone: "America/New_York".to_string(),
        }
    }
}

/// Swing point detection.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SwingConfig {
    /// Bars required on each side of a swing (k).
    pub strength: usize,
    /// Most recent swings considered per side.
    pub max_swings: usize,
}

impl Default for SwingConfig {
    fn default() -> Self {
        Self {
            strength: 3,
            max_swings: 5,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SweepConfig {
    /// Minimum wick penetration beyond the level, in ticks.
    pub min_sweep_ticks: f64,
    /// Maximum penetration; deeper moves are breakouts.
    pub max_sweep_ticks: f64,
    /// Recent bars scanned for a sweep.
    pub check_bars: usize,
    /// Bars a sweep waits for its gap before it is discarded.
    pub max_gap_wait_bars: usize,
}

impl Default for SweepConfig {
    fn default() -> Self {
        Self {
            min_sweep_ticks: 2.0,
            max_sweep_ticks: 40.0,
            check_bars: 3,
            max_gap_wait_bars: 10,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DisplacementConfig {
    /// Window of the rolling average body.
    pub avg_body_lookback: usize,
    /// Body must be at least this multiple of the average.
    pub multiplier: f64,
    /// Ratio at which the trend alignment filter is bypassed.
    pub override_ratio: f64,
    /// Trend strength still required when the override applies.
    pub override_strength_floor: f64,
}

impl Default for DisplacementConfig {
    fn default() -> Self {
        Self {
            avg_body_lookback: 20,
            multiplier: 2.0,
            override_ratio: 3.0,
            override_strength_floor: 10.0,
        }
    }
}

/// What voids a gap besides aging.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GapInvalidation {
    /// Gaps only age out.
    Never,
    /// A close through the far edge voids the gap.
    CloseThrough,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GapConfig {
    /// Minimum gap height, in ticks.
    pub min_fvg_ticks: f64,
    /// Bars after creation a gap stays tracked.
    pub max_fvg_age_bars: usize,
    pub invalidation: GapInvalidation,
}

impl Default for GapConfig {
    fn default() -> Self {
        Self {
            min_fvg_ticks: 4.0,
            max_fvg_age_bars: 50,
            invalidation: GapInvalidation::CloseThrough,
        }
    }
}

impl GapConfig {
    /// Section checks, also run by [`Config::validate`].
    pub fn validate(&self) -> Result<()> {
        ensure(self.min_fvg_ticks >= 0.0, "gap.min_fvg_ticks must be non-negative")?;
        ensure(self.max_fvg_age_bars >= 1, "gap.max_fvg_age_bars must be at least 1")
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StructureConfig {
    /// Bars searched backward for the break level.
    pub lookback: usize,
    /// Swing strength for the break level.
    pub strength: usize,
    /// Abandon a confirming setup once price runs this many gap heights past the far edge.
    pub abandon_gap_multiple: Option<f64>,
}

impl Default for StructureConfig {
    fn default() -> Self {
        Self {
            lookback: 20,
            strength: 2,
            abandon_gap_multiple: Some(2.0),
        }
    }
}

/// How a mitigated sweep setup is turned into an entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntryMode {
    /// Enter on the mitigating bar's close.
    Immediate,
    /// Wait for a lower-timeframe close through the locked structure level.
    Confirm,
}

/// Distance placed beyond the protective price.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StopBuffer {
    /// Fixed number of ticks.
    Ticks(f64),
    /// Multiple of the higher-timeframe ATR.
    Atr { period: usize, multiplier: f64 },
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EntryConfig {
    pub mode: EntryMode,
    pub stop_buffer: StopBuffer,
    /// Reject entries with less risk than this, in ticks.
    pub min_risk_ticks: f64,
    /// Reject entries with more risk than this, in ticks.
    pub max_risk_ticks: f64,
    /// No new entries within this many minutes of the last loss.
    pub loss_cooldown_minutes: u32,
}

impl Default for EntryConfig {
    fn default() -> Self {
        Self {
            mode: EntryMode::Confirm,
            stop_buffer: StopBuffer::Ticks(2.0),
            min_risk_ticks: 4.0,
            max_risk_ticks: 80.0,
            loss_cooldown_minutes: 0,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TrendConfig {
    /// Require fast/slow EMA ordering in the trade direction.
    pub enabled: bool,
    pub fast_period: usize,
    pub slow_period: usize,
    /// ADX period.
    pub strength_period: usize,
    /// ADX required for every archetype when `enabled` (0 disables).
    pub min_strength: f64,
}

impl Default for TrendConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            fast_period: 20,
            slow_period: 50,
            strength_period: 14,
            min_strength: 0.0,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    pub regular_open: NaiveTime,
    pub regular_close: NaiveTime,
    pub lunch: TimeWindow,
    pub allow_lunch: bool,
    pub killzones: Vec<TimeWindow>,
    pub require_killzone: bool,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            regular_open: hm(9, 30),
            regular_close: hm(16, 0),
            lunch: window((12, 0), (13, 0)),
            allow_lunch: false,
            killzones: vec![window((9, 30), (11, 0)), window((13, 30), (16, 0))],
            require_killzone: false,
        }
    }
}

impl SessionConfig {
    /// True if entries may be opened at local time `t`.
    pub fn allows_entry(&self, t: NaiveTime) -> bool {
        if t < self.regular_open || t >= self.regular_close {
            return false;
        }
        if !self.allow_lunch && self.lunch.contains(t) {
            return false;
        }
        !self.require_killzone || self.killzones.iter().any(|w| w.contains(t))
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ArchetypeConfig {
    pub sweep_reversal: SweepReversalConfig,
    pub creation: CreationConfig,
    pub prior_session: PriorSessionConfig,
    pub same_session: SameSessionConfig,
    pub structure_break: StructureBreakConfig,
}

impl ArchetypeConfig {
    pub fn any_enabled(&self) -> bool {
        self.sweep_reversal.enabled
            || self.creation.enabled
            || self.prior_session.enabled
            || self.same_session.enabled
            || self.structure_break.enabled
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SweepReversalConfig {
    pub enabled: bool,
}

impl Default for SweepReversalConfig {
    fn default() -> Self {
        Self { enabled: true }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CreationConfig {
    pub enabled: bool,
    /// Middle-bar body as a multiple of the average body.
    pub min_displacement: f64,
    /// Bars after formation the entry may still fire.
    pub max_age_bars: usize,
}

impl Default for CreationConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            min_displacement: 1.0,
            max_age_bars: 2,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PriorSessionConfig {
    pub enabled: bool,
    pub entry_window: TimeWindow,
    pub min_trend_strength: f64,
}

impl Default for PriorSessionConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            entry_window: window((9, 30), (12, 0)),
            min_trend_strength: 22.0,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SameSessionConfig {
    pub enabled: bool,
    /// Bars between gap formation and the earliest entry.
    pub min_dwell_bars: usize,
}

impl Default for SameSessionConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            min_dwell_bars: 5,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StructureBreakConfig {
    pub enabled: bool,
    /// Bars after the break in which a gap may complete.
    pub gap_window_bars: usize,
    pub max_risk_ticks: f64,
    /// Losses of this archetype after which it is disabled for the day.
    pub daily_loss_limit: u32,
    /// Per-symbol overrides of `daily_loss_limit`.
    pub loss_limit_overrides: BTreeMap<String, u32>,
}

impl Default for StructureBreakConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            gap_window_bars: 5,
            max_risk_ticks: 32.0,
            daily_loss_limit: 1,
            loss_limit_overrides: BTreeMap::new(),
        }
    }
}

impl StructureBreakConfig {
    pub fn loss_limit_for(&self, symbol: &str) -> u32 {
        self.loss_limit_overrides
            .get(symbol)
            .copied()
            .unwrap_or(self.daily_loss_limit)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ExitConfig {
    /// T1 target as a multiple of initial risk.
    pub t1_r_multiple: f64,
    /// Target that switches the trailing legs to structure trailing.
    pub trail_r_multiple: f64,
    /// Swing strength for trailing.
    pub trail_swing_strength: usize,
    pub t2_trail_buffer_ticks: f64,
    pub runner_trail_buffer_ticks: f64,
}

impl Default for ExitConfig {
    fn default() -> Self {
        Self {
            t1_r_multiple: 4.0,
            trail_r_multiple: 8.0,
            trail_swing_strength: 2,
            t2_trail_buffer_ticks: 4.0,
            runner_trail_buffer_ticks: 6.0,
        }
    }
}

/// Position sizing configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SizingConfig {
    /// Contracts when no other position is open.
    pub base_size: u32,
    /// Contracts while another position is open.
    pub reduced_size: u32,
    pub t1_qty: u32,
    pub t2_qty: u32,
    pub max_open_positions: usize,
}

impl Default for SizingConfig {
    fn default() -> Self {
        Self {
            base_size: 3,
            reduced_size: 2,
            t1_qty: 1,
            t2_qty: 1,
            max_open_positions: 2,
        }
    }
}

/// Risk limits shared by every symbol.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RiskConfig {
    pub max_daily_trades: u32,
    pub max_daily_losses: u32,
    pub max_consecutive_losses: Option<u32>,
    /// Maximum daily loss (absolute currency value).
    pub max_daily_loss: Option<f64>,
}

impl Default for RiskConfig {
    fn default() -> Self {
        Self {
            max_daily_trades: 10,
            max_daily_losses: 2,
            max_consecutive_losses: None,
            max_daily_loss: None,
        }
    }
}

/// How the two bar streams drive the engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TimeframeMode {
    /// Separate higher and lower timeframe feeds.
    Dual,
    /// One feed acts as both.
    Single,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    pub mode: TimeframeMode,
    pub htf_minutes: u32,
    pub ltf_minutes: u32,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            mode: TimeframeMode::Dual,
            htf_minutes: 5,
            ltf_minutes: 1,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.swing.strength, 3);
        assert_eq!(config.gap.max_fvg_age_bars, 50);
        assert_eq!(config.sizing.base_size, 3);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_rejects_inverted_risk_bounds() {
        let mut config = Config::default();
        config.entry.min_risk_ticks = 50.0;
        config.entry.max_risk_ticks = 10.0;
        assert!(matches!(config.validate(), Err(Error::Config(_))));
    }

    #[test]
    fn test_rejects_bad_tick_size_and_timezone() {
        let mut config = Config::default();
        config.instrument.tick_size = 0.0;
        assert!(config.validate().is_err());

        let mut config = Config::default();
        config.instrument.timezone = "Nowhere/Land".to_string();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_rejects_trail_below_t1() {
        let mut config = Config::default();
        config.exits.trail_r_multiple = config.exits.t1_r_multiple;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_rejects_single_contract_sizing() {
        let mut config = Config::default();
        config.sizing.reduced_size = 1;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_rejects_all_archetypes_disabled() {
        let mut config = Config::default();
        config.archetypes.sweep_reversal.enabled = false;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_from_toml_partial() {
        let doc = r#"
            [instrument]
            symbol = "NQ"
            tick_size = 0.25
            point_value = 20.0

            [entry]
            mode = "immediate"
            stop_buffer = { atr = { period = 14, multiplier = 0.5 } }

            [archetypes.structure_break]
            enabled = true
            loss_limit_overrides = { ES = 0 }

            [session]
            regular_open = "09:30:00"
            regular_close = "16:00:00"
        "#;
        let config = Config::from_toml_str(doc).unwrap();
        assert_eq!(config.instrument.symbol, "NQ");
        assert_eq!(config.entry.mode, EntryMode::Immediate);
        assert_eq!(
            config.entry.stop_buffer,
            StopBuffer::Atr {
                period: 14,
                multiplier: 0.5
            }
        );
        assert_eq!(config.archetypes.structure_break.loss_limit_for("ES"), 0);
        assert_eq!(config.archetypes.structure_break.loss_limit_for("NQ"), 1);
        assert_eq!(config.swing.strength, 3);
    }

    #[test]
    fn test_from_toml_rejects_invalid() {
        let doc = r#"
            [sweep]
            min_sweep_ticks = 10.0
            max_sweep_ticks = 5.0
        "#;
        assert!(matches!(Config::from_toml_str(doc), Err(Error::Config(_))));
    }

    #[test]
    fn test_session_allows_entry() {
        let session = SessionConfig::default();
        assert!(session.allows_entry(hm(9, 45)));
        assert!(!session.allows_entry(hm(9, 0)));
        assert!(!session.allows_entry(hm(12, 30)));
        assert!(!session.allows_entry(hm(16, 0)));

        let mut strict = SessionConfig::default();
        strict.require_killzone = true;
        assert!(!strict.allows_entry(hm(11, 30)));
        assert!(strict.allows_entry(hm(14, 0)));
    }
}
