//! Structure shift (BOS/MSS) detection.
//!
//! For a bullish bias the relevant level is the most recent confirmed swing high; a close
//! above it shifts structure. Bearish is symmetric on swing lows. Setups lock the level once
//! and then only watch closes against it; the free-running [`StructureShiftDetector::update`]
//! reports each swing level the first time it breaks.

use crate::swing::{SwingDetector, SwingKind, SwingPoint};
use serde::{Deserialize, Serialize};
use sweep_core::config::StructureConfig;
use sweep_core::{Bar, Direction, TimestampMs};

/// A break level fixed at the moment a setup started waiting for confirmation.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct LockedLevel {
    pub bias: Direction,
    pub level: f64,
    pub swing_index: usize,
}

impl LockedLevel {
    /// True if the bar closed beyond the level in the bias direction.
    #[inline]
    pub fn is_broken_by(&self, bar: &Bar) -> bool {
        match self.bias {
            Direction::Long => bar.close > self.level,
            Direction::Short => bar.close < self.level,
        }
    }
}

/// A close through a prior swing.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct StructureBreak {
    pub direction: Direction,
    pub level: f64,
    pub swing_index: usize,
    pub break_index: usize,
    pub ts_ms: TimestampMs,
}

pub struct StructureShiftDetector {
    swings: SwingDetector,
    lookback: usize,
    last_broken_high: Option<usize>,
    last_broken_low: Option<usize>,
}

impl StructureShiftDetector {
    pub fn new(config: &StructureConfig) -> Self {
        Self {
            swings: SwingDetector::new(config.strength),
            lookback: config.lookback,
            last_broken_high: None,
            last_broken_low: None,
        }
    }

    /// Most recent swing opposing `bias` among `bars[..end]`, no older than the lookback.
    pub fn find_level(&self, bars: &[Bar], end: usize, bias: Direction) -> Option<SwingPoint> {
        let end = end.min(bars.len());
        let oldest = end.saturating_sub(self.lookback);
        let kind = match bias {
            Direction::Long => SwingKind::High,
            Direction::Short => SwingKind::Low,
        };
        self.swings
            .swings(&bars[..end], kind)
            .take_while(|s| s.index >= oldest)
            .next()
    }

    /// Lock the level a setup will wait on, using bars before the last one.
    pub fn lock(&self, bars: &[Bar], bias: Direction) -> Option<LockedLevel> {
        let swing = self.find_level(bars, bars.len().saturating_sub(1), bias)?;
        Some(LockedLevel {
            bias,
            level: swing.price,
            swing_index: swing.index,
        })
    }

    /// Breaks caused by the last bar of `bars`. Each swing is reported at most once.
    pub fn update(&mut self, bars: &[Bar]) -> Vec<StructureBreak> {
        let Some(bar) = bars.last() else {
            return Vec::new();
        };
        let index = bars.len() - 1;
        let mut breaks = Vec::with_capacity(1);

        for direction in [Direction::Long, Direction::Short] {
            let Some(locked) = self.lock(bars, direction) else {
                continue;
            };
            let last_broken = match direction {
                Direction::Long => &mut self.last_broken_high,
                Direction::Short => &mut self.last_broken_low,
            };
            if *last_broken == Some(locked.swing_index) || !locked.is_broken_by(bar) {
                continue;
            }
            *last_broken = Some(locked.swing_index);
            breaks.push(StructureBreak {
                direction,
                level: locked.level,
                swing_index: locked.swing_index,
                break_index: index,
                ts_ms: bar.ts_ms,
            });
        }
        breaks
    }

    pub fn clear(&mut self) {
        self.last_broken_high = None;
        self.last_broken_low = None;
    }
}
