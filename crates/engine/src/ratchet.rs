//! Stop ratchet.
//!
//! A protective stop that only ever moves in the trade's favour: up for longs, down for
//! shorts. Proposals that would loosen the stop are ignored.

use sweep_core::{Bar, Direction};

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct StopRatchet {
    direction: Direction,
    level: f64,
}

impl StopRatchet {
    pub fn new(direction: Direction, initial: f64) -> Self {
        Self {
            direction,
            level: initial,
        }
    }

    /// Apply a proposed stop. Returns true if the level moved.
    pub fn apply(&mut self, proposed: f64) -> bool {
        if !proposed.is_finite() || !self.direction.improves(proposed, self.level) {
            return false;
        }
        self.level = proposed;
        true
    }

    #[inline]
    pub fn level(&self) -> f64 {
        self.level
    }

    #[inline]
    pub fn direction(&self) -> Direction {
        self.direction
    }

    /// True if the bar traded through the stop.
    #[inline]
    pub fn is_hit(&self, bar: &Bar) -> bool {
        self.direction.stopped(bar, self.level)
    }
}
