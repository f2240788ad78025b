//! Swing point detection.
//!
//! Bar `i` is a swing high with strength `k` when its high is strictly greater than the high
//! of every bar in `[i-k, i+k]` other than itself. Equal neighbours disqualify. Swing lows are
//! symmetric on the lows. A swing can only be confirmed once `k` bars have printed after it.

use serde::{Deserialize, Serialize};
use sweep_core::{Bar, TimestampMs};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SwingKind {
    High,
    Low,
}

/// A confirmed swing point.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SwingPoint {
    pub kind: SwingKind,
    pub price: f64,
    /// Index into the bar slice the swing was found in.
    pub index: usize,
    pub ts_ms: TimestampMs,
    /// Confirmation width `k`.
    pub strength: usize,
}

/// True if `bars[i]` is a confirmed swing high of strength `k`.
pub fn is_swing_high(bars: &[Bar], i: usize, k: usize) -> bool {
    is_extreme(bars, i, k, |b| b.high, |candidate, other| candidate > other)
}

/// True if `bars[i]` is a confirmed swing low of strength `k`.
pub fn is_swing_low(bars: &[Bar], i: usize, k: usize) -> bool {
    is_extreme(bars, i, k, |b| b.low, |candidate, other| candidate < other)
}

fn is_extreme(
    bars: &[Bar],
    i: usize,
    k: usize,
    price: impl Fn(&Bar) -> f64,
    beats: impl Fn(f64, f64) -> bool,
) -> bool {
    if i < k || i + k >= bars.len() {
        return false;
    }
    let candidate = price(&bars[i]);
    (i - k..=i + k)
        .filter(|&j| j != i)
        .all(|j| beats(candidate, price(&bars[j])))
}

/// Finds swing points of a fixed strength.
#[derive(Debug, Clone, Copy)]
pub struct SwingDetector {
    strength: usize,
}

impl SwingDetector {
    pub fn new(strength: usize) -> Self {
        Self { strength }
    }

    pub fn strength(&self) -> usize {
        self.strength
    }

    /// Lazily walk confirmed swings of `kind`, most recent first.
    ///
    /// The iterator is `Clone`, so a scan can be restarted from any point.
    pub fn swings<'a>(&self, bars: &'a [Bar], kind: SwingKind) -> Swings<'a> {
        let k = self.strength;
        Swings {
            bars,
            kind,
            k,
            cursor: bars.len().saturating_sub(k),
        }
    }

    pub fn highs<'a>(&self, bars: &'a [Bar]) -> Swings<'a> {
        self.swings(bars, SwingKind::High)
    }

    pub fn lows<'a>(&self, bars: &'a [Bar]) -> Swings<'a> {
        self.swings(bars, SwingKind::Low)
    }

    /// Swing of `kind` at exactly `index`, if confirmed.
    pub fn at(&self, bars: &[Bar], kind: SwingKind, index: usize) -> Option<SwingPoint> {
        let confirmed = match kind {
            SwingKind::High => is_swing_high(bars, index, self.strength),
            SwingKind::Low => is_swing_low(bars, index, self.strength),
        };
        confirmed.then(|| make_point(&bars[index], kind, index, self.strength))
    }

    /// Swing of `kind` confirmed by the last bar of `bars`, if any.
    ///
    /// With strength `k`, the newest bar can only confirm the candidate `k` bars back.
    pub fn newly_confirmed(&self, bars: &[Bar], kind: SwingKind) -> Option<SwingPoint> {
        let index = bars.len().checked_sub(self.strength + 1)?;
        self.at(bars, kind, index)
    }
}

fn make_point(bar: &Bar, kind: SwingKind, index: usize, strength: usize) -> SwingPoint {
    let price = match kind {
        SwingKind::High => bar.high,
        SwingKind::Low => bar.low,
    };
    SwingPoint {
        kind,
        price,
        index,
        ts_ms: bar.ts_ms,
        strength,
    }
}

/// Most-recent-first iterator over confirmed swings.
#[derive(Debug, Clone)]
pub struct Swings<'a> {
    bars: &'a [Bar],
    kind: SwingKind,
    k: usize,
    /// One past the next candidate index.
    cursor: usize,
}

impl Iterator for Swings<'_> {
    type Item = SwingPoint;

    fn next(&mut self) -> Option<SwingPoint> {
        while self.cursor > self.k {
            self.cursor -= 1;
            let i = self.cursor;
            let confirmed = match self.kind {
                SwingKind::High => is_swing_high(self.bars, i, self.k),
                SwingKind::Low => is_swing_low(self.bars, i, self.k),
            };
            if confirmed {
                return Some(make_point(&self.bars[i], self.kind, i, self.k));
            }
        }
        None
    }
}
