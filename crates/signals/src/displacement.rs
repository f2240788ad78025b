//! Displacement filter.
//!
//! Measures candle bodies against a rolling average body. A bar displaces when its body is at
//! least `multiplier` times the average; a ratio at or above `override_ratio` is strong enough
//! to waive trend alignment.

use statrs::statistics::Statistics;
use std::collections::VecDeque;
use sweep_core::config::DisplacementConfig;
use sweep_core::Bar;

/// Rolling average of absolute candle bodies.
pub struct RollingBody {
    /// Window size in bars.
    window: usize,
    /// Recent bodies.
    bodies: VecDeque<f64>,
}

impl RollingBody {
    /// Create a new rolling body average.
    pub fn new(window: usize) -> Self {
        Self {
            window,
            bodies: VecDeque::with_capacity(window),
        }
    }

    /// Add a bar. Returns the current average if the window is full.
    pub fn add_bar(&mut self, bar: &Bar) -> Option<f64> {
        if self.bodies.len() >= self.window {
            self.bodies.pop_front();
        }
        self.bodies.push_back(bar.body());
        self.average()
    }

    /// Mean body over the window; `None` until the window is full.
    pub fn average(&self) -> Option<f64> {
        if !self.is_ready() {
            return None;
        }
        Some(self.bodies.iter().mean())
    }

    /// Check if the window is full.
    pub fn is_ready(&self) -> bool {
        self.bodies.len() >= self.window
    }

    /// Get the number of observations.
    pub fn count(&self) -> usize {
        self.bodies.len()
    }

    /// Clear all data.
    pub fn clear(&mut self) {
        self.bodies.clear();
    }
}

/// Classifies bars by body size relative to the rolling average.
pub struct DisplacementFilter {
    bodies: RollingBody,
    multiplier: f64,
    override_ratio: f64,
}

impl DisplacementFilter {
    pub fn new(config: &DisplacementConfig) -> Self {
        Self {
            bodies: RollingBody::new(config.avg_body_lookback),
            multiplier: config.multiplier,
            override_ratio: config.override_ratio,
        }
    }

    pub fn add_bar(&mut self, bar: &Bar) {
        self.bodies.add_bar(bar);
    }

    pub fn average_body(&self) -> Option<f64> {
        self.bodies.average()
    }

    /// Body over average body. Zero when no usable average exists.
    pub fn ratio(&self, bar: &Bar) -> f64 {
        match self.bodies.average() {
            Some(avg) if avg > 0.0 => bar.body() / avg,
            _ => 0.0,
        }
    }

    /// Largest ratio among `bars[from..from + span]`, clipped to what exists.
    pub fn max_ratio(&self, bars: &[Bar], from: usize, span: usize) -> f64 {
        let end = (from + span).min(bars.len());
        bars.get(from..end)
            .unwrap_or_default()
            .iter()
            .map(|b| self.ratio(b))
            .fold(0.0, f64::max)
    }

    /// Ratio qualifies as displacement.
    pub fn displaces(&self, ratio: f64) -> bool {
        ratio >= self.multiplier
    }

    /// Ratio is strong enough to waive trend alignment.
    pub fn overrides_trend(&self, ratio: f64) -> bool {
        ratio >= self.override_ratio
    }

    pub fn is_ready(&self) -> bool {
        self.bodies.is_ready()
    }

    pub fn clear(&mut self) {
        self.bodies.clear();
    }
}
