//! Liquidity sweep detection.
//!
//! A sweep is a wick beyond a confirmed swing level that closes back on the original side.
//! Swing lows are swept bullishly (stops below are taken, then price reclaims the level) and
//! swing highs bearishly. A penetration deeper than the configured maximum is treated as a
//! genuine breakout and does not qualify.

use crate::swing::{SwingDetector, SwingKind, SwingPoint};
use serde::{Deserialize, Serialize};
use sweep_core::config::{SweepConfig, SwingConfig};
use sweep_core::{to_ticks, Bar, Direction, TimestampMs};

/// A detected sweep of a swing level.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Sweep {
    pub direction: Direction,
    /// Wick extreme of the sweeping bar.
    pub sweep_price: f64,
    /// The swept swing level.
    pub level: f64,
    pub depth_ticks: f64,
    /// Index of the sweeping bar.
    pub index: usize,
    pub ts_ms: TimestampMs,
}

#[derive(Debug, Clone)]
pub struct SweepDetector {
    swings: SwingDetector,
    max_swings: usize,
    check_bars: usize,
    min_sweep: f64,
    max_sweep_ticks: f64,
    tick_size: f64,
}

impl SweepDetector {
    pub fn new(swing: &SwingConfig, sweep: &SweepConfig, tick_size: f64) -> Self {
        Self {
            swings: SwingDetector::new(swing.strength),
            max_swings: swing.max_swings,
            check_bars: sweep.check_bars,
            min_sweep: sweep.min_sweep_ticks * tick_size,
            max_sweep_ticks: sweep.max_sweep_ticks,
            tick_size,
        }
    }

    /// Bars needed before any sweep can be reported.
    pub fn min_bars(&self) -> usize {
        self.swings.strength() * 2 + 1 + self.check_bars
    }

    /// Scan the most recent bars for a sweep.
    ///
    /// Swings are taken from the bars before the scan window; the scan itself runs oldest bar
    /// first and tries swing lows before swing highs. The first qualifying candidate wins.
    pub fn detect(&self, bars: &[Bar]) -> Option<Sweep> {
        self.detect_excluding(bars, |_| false)
    }

    /// Like [`detect`](Self::detect), passing over candidates for which `skip` is true, so a
    /// sweep already acted on does not hide a newer one in the same window.
    pub fn detect_excluding(&self, bars: &[Bar], skip: impl Fn(&Sweep) -> bool) -> Option<Sweep> {
        if bars.len() < self.min_bars() {
            return None;
        }
        let window_start = bars.len() - self.check_bars;
        let history = &bars[..window_start];

        let lows: Vec<SwingPoint> = self
            .swings
            .swings(history, SwingKind::Low)
            .take(self.max_swings)
            .collect();
        let highs: Vec<SwingPoint> = self
            .swings
            .swings(history, SwingKind::High)
            .take(self.max_swings)
            .collect();

        (window_start..bars.len()).find_map(|i| {
            let bar = &bars[i];
            let lows = lows.iter().map(|s| (s, Direction::Long));
            let highs = highs.iter().map(|s| (s, Direction::Short));
            lows.chain(highs)
                .filter_map(|(s, direction)| self.check(bar, i, s, direction))
                .find(|sweep| !skip(sweep))
        })
    }

    fn check(&self, bar: &Bar, index: usize, swing: &SwingPoint, direction: Direction) -> Option<Sweep> {
        let (penetration, reclaimed, sweep_price) = match direction {
            Direction::Long => (swing.price - bar.low, bar.close > swing.price, bar.low),
            Direction::Short => (bar.high - swing.price, bar.close < swing.price, bar.high),
        };
        if penetration < self.min_sweep || !reclaimed {
            return None;
        }
        let depth_ticks = to_ticks(penetration, self.tick_size);
        if depth_ticks > self.max_sweep_ticks {
            return None;
        }
        Some(Sweep {
            direction,
            sweep_price,
            level: swing.price,
            depth_ticks,
            index,
            ts_ms: bar.ts_ms,
        })
    }
}
