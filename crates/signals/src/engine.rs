//! Higher-timeframe signal engine.
//!
//! Combines all detectors behind one `add_bar` call so that each bar updates every component
//! exactly once and in a fixed order.

use crate::{
    displacement::DisplacementFilter,
    gap::{Gap, GapTracker, GapUpdate},
    structure::{LockedLevel, StructureBreak, StructureShiftDetector},
    sweep::{Sweep, SweepDetector},
    trend::TrendGauge,
};
use sweep_core::config::StopBuffer;
use sweep_core::{Bar, Config, Direction, Result};

/// Bars after a sweep (inclusive of the sweep bar) inspected for displacement.
const SWEEP_DISPLACEMENT_SPAN: usize = 3;

/// Everything one higher-timeframe bar produced.
#[derive(Debug, Clone, Default)]
pub struct SignalUpdate {
    /// Index of the bar just added.
    pub index: usize,
    pub gaps: GapUpdate,
    pub sweep: Option<Sweep>,
    pub breaks: Vec<StructureBreak>,
}

/// Signal computation engine.
pub struct SignalEngine {
    /// Session bar history.
    bars: Vec<Bar>,
    displacement: DisplacementFilter,
    gaps: GapTracker,
    sweeps: SweepDetector,
    structure: StructureShiftDetector,
    trend: TrendGauge,
}

impl SignalEngine {
    /// Create a new signal engine from configuration.
    pub fn new(config: &Config) -> Result<Self> {
        config.validate()?;
        let tick_size = config.instrument.tick_size;
        let atr_period = match config.entry.stop_buffer {
            StopBuffer::Atr { period, .. } => Some(period),
            StopBuffer::Ticks(_) => None,
        };

        Ok(Self {
            bars: Vec::new(),
            displacement: DisplacementFilter::new(&config.displacement),
            gaps: GapTracker::new(&config.gap, tick_size)?,
            sweeps: SweepDetector::new(&config.swing, &config.sweep, tick_size),
            structure: StructureShiftDetector::new(&config.structure),
            trend: TrendGauge::new(&config.trend, atr_period),
        })
    }

    /// Process a completed higher-timeframe bar.
    pub fn add_bar(&mut self, bar: &Bar) -> SignalUpdate {
        self.add_bar_excluding(bar, |_| false)
    }

    /// Process a completed bar, ignoring sweeps for which `skip` returns true.
    pub fn add_bar_excluding(&mut self, bar: &Bar, skip: impl Fn(&Sweep) -> bool) -> SignalUpdate {
        self.bars.push(*bar);
        self.displacement.add_bar(bar);
        self.trend.add_bar(bar);

        let gaps = self.gaps.update(&self.bars);
        let sweep = if self.displacement.is_ready() {
            self.sweeps.detect_excluding(&self.bars, skip)
        } else {
            None
        };
        let breaks = self.structure.update(&self.bars);

        SignalUpdate {
            index: self.bars.len() - 1,
            gaps,
            sweep,
            breaks,
        }
    }

    /// Largest displacement ratio among the sweep bar and the bars after it.
    pub fn sweep_displacement(&self, sweep: &Sweep) -> f64 {
        self.displacement
            .max_ratio(&self.bars, sweep.index, SWEEP_DISPLACEMENT_SPAN)
    }

    /// Displacement ratio of a gap's middle bar.
    pub fn gap_displacement(&self, gap: &Gap) -> f64 {
        self.bars
            .get(gap.created_index)
            .map(|b| self.displacement.ratio(b))
            .unwrap_or(0.0)
    }

    /// Lock the structure level a confirming setup waits on.
    pub fn lock_level(&self, bias: Direction) -> Option<LockedLevel> {
        self.structure.lock(&self.bars, bias)
    }

    pub fn bars(&self) -> &[Bar] {
        &self.bars
    }

    pub fn last_bar(&self) -> Option<&Bar> {
        self.bars.last()
    }

    pub fn gaps(&self) -> &GapTracker {
        &self.gaps
    }

    pub fn displacement(&self) -> &DisplacementFilter {
        &self.displacement
    }

    pub fn trend(&self) -> &TrendGauge {
        &self.trend
    }

    /// Check if enough bars have been seen for sweep detection.
    pub fn is_ready(&self) -> bool {
        self.displacement.is_ready() && self.bars.len() >= self.sweeps.min_bars()
    }

    /// Clear all state.
    pub fn clear(&mut self) {
        self.bars.clear();
        self.displacement.clear();
        self.gaps.clear();
        self.structure.clear();
        self.trend.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn make_config() -> Config {
        let mut config = Config::default();
        config.displacement.avg_body_lookback = 3;
        config.swing.strength = 2;
        config
    }

    fn make_bar(i: usize, open: f64, high: f64, low: f64, close: f64) -> Bar {
        Bar::new(i as i64 * 300_000, open, high, low, close)
    }

    #[test]
    fn test_new_rejects_invalid_config() {
        let mut config = make_config();
        config.gap.max_fvg_age_bars = 0;
        assert!(SignalEngine::new(&config).is_err());

        let mut config = make_config();
        config.swing.strength = 0;
        assert!(SignalEngine::new(&config).is_err());
    }

    #[test]
    fn test_not_ready_until_warm() {
        let mut engine = SignalEngine::new(&make_config()).unwrap();
        for i in 0..5 {
            engine.add_bar(&make_bar(i, 100.0, 100.5, 99.5, 100.25));
        }
        assert!(!engine.is_ready());
        assert_eq!(engine.bars().len(), 5);
    }

    #[test]
    fn test_gap_and_displacement() {
        let mut engine = SignalEngine::new(&make_config()).unwrap();
        engine.add_bar(&make_bar(0, 99.5, 100.0, 99.25, 99.75));
        engine.add_bar(&make_bar(1, 99.75, 101.5, 99.75, 101.25));
        let update = engine.add_bar(&make_bar(2, 101.25, 102.0, 101.25, 101.75));

        assert_eq!(update.index, 2);
        let id = update.gaps.formed.unwrap();
        let gap = engine.gaps().get(id).unwrap().clone();
        assert_eq!(gap.direction, Direction::Long);

        // Bodies 0.25, 1.5, 0.5: average 0.75, middle bar ratio 2.0.
        assert!((engine.gap_displacement(&gap) - 2.0).abs() < 1e-10);
    }

    #[test]
    fn test_clear() {
        let mut engine = SignalEngine::new(&make_config()).unwrap();
        for i in 0..10 {
            engine.add_bar(&make_bar(i, 100.0, 100.5, 99.5, 100.25));
        }
        engine.clear();
        assert!(engine.bars().is_empty());
        assert!(engine.gaps().is_empty());
    }
}
