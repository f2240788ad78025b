//! Trend alignment and strength.
//!
//! Incremental indicators over the higher timeframe:
//! - EMA fast/slow, seeded with a simple average, for direction
//! - Wilder ADX for strength
//! - Wilder ATR for volatility-scaled stop buffers

use sweep_core::config::TrendConfig;
use sweep_core::{Bar, Direction};

/// Exponential moving average seeded with the SMA of the first `period` values.
#[derive(Debug, Clone)]
pub struct Ema {
    period: usize,
    alpha: f64,
    seed_sum: f64,
    count: usize,
    value: Option<f64>,
}

impl Ema {
    pub fn new(period: usize) -> Self {
        let period = period.max(1);
        Self {
            period,
            alpha: 2.0 / (period as f64 + 1.0),
            seed_sum: 0.0,
            count: 0,
            value: None,
        }
    }

    pub fn add(&mut self, x: f64) -> Option<f64> {
        self.count += 1;
        match self.value {
            Some(prev) => self.value = Some(prev + self.alpha * (x - prev)),
            None => {
                self.seed_sum += x;
                if self.count == self.period {
                    self.value = Some(self.seed_sum / self.period as f64);
                }
            }
        }
        self.value
    }

    pub fn value(&self) -> Option<f64> {
        self.value
    }

    pub fn clear(&mut self) {
        *self = Self::new(self.period);
    }
}

fn true_range(bar: &Bar, prev_close: Option<f64>) -> f64 {
    match prev_close {
        Some(pc) => bar.range().max((bar.high - pc).abs()).max((bar.low - pc).abs()),
        None => bar.range(),
    }
}

/// Wilder-smoothed average true range.
#[derive(Debug, Clone)]
pub struct WilderAtr {
    period: usize,
    prev_close: Option<f64>,
    seed_sum: f64,
    count: usize,
    value: Option<f64>,
}

impl WilderAtr {
    pub fn new(period: usize) -> Self {
        Self {
            period: period.max(1),
            prev_close: None,
            seed_sum: 0.0,
            count: 0,
            value: None,
        }
    }

    pub fn add_bar(&mut self, bar: &Bar) -> Option<f64> {
        let tr = true_range(bar, self.prev_close);
        self.prev_close = Some(bar.close);
        self.count += 1;
        let p = self.period as f64;
        match self.value {
            Some(atr) => self.value = Some((atr * (p - 1.0) + tr) / p),
            None => {
                self.seed_sum += tr;
                if self.count == self.period {
                    self.value = Some(self.seed_sum / p);
                }
            }
        }
        self.value
    }

    pub fn value(&self) -> Option<f64> {
        self.value
    }

    pub fn clear(&mut self) {
        *self = Self::new(self.period);
    }
}

/// Wilder's average directional index.
#[derive(Debug, Clone)]
pub struct Adx {
    period: usize,
    prev: Option<Bar>,
    samples: usize,
    tr_smooth: f64,
    plus_smooth: f64,
    minus_smooth: f64,
    dx_count: usize,
    dx_sum: f64,
    adx: Option<f64>,
    plus_di: f64,
    minus_di: f64,
}

impl Adx {
    pub fn new(period: usize) -> Self {
        Self {
            period: period.max(1),
            prev: None,
            samples: 0,
            tr_smooth: 0.0,
            plus_smooth: 0.0,
            minus_smooth: 0.0,
            dx_count: 0,
            dx_sum: 0.0,
            adx: None,
            plus_di: 0.0,
            minus_di: 0.0,
        }
    }

    pub fn add_bar(&mut self, bar: &Bar) -> Option<f64> {
        let Some(prev) = self.prev.replace(*bar) else {
            return None;
        };

        let tr = true_range(bar, Some(prev.close));
        let up = bar.high - prev.high;
        let down = prev.low - bar.low;
        let plus_dm = if up > down && up > 0.0 { up } else { 0.0 };
        let minus_dm = if down > up && down > 0.0 { down } else { 0.0 };

        let p = self.period as f64;
        self.samples += 1;
        if self.samples <= self.period {
            self.tr_smooth += tr;
            self.plus_smooth += plus_dm;
            self.minus_smooth += minus_dm;
        } else {
            self.tr_smooth += tr - self.tr_smooth / p;
            self.plus_smooth += plus_dm - self.plus_smooth / p;
            self.minus_smooth += minus_dm - self.minus_smooth / p;
        }
        if self.samples < self.period {
            return None;
        }

        if self.tr_smooth > 0.0 {
            self.plus_di = 100.0 * self.plus_smooth / self.tr_smooth;
            self.minus_di = 100.0 * self.minus_smooth / self.tr_smooth;
        }
        let di_sum = self.plus_di + self.minus_di;
        let dx = if di_sum > 0.0 {
            100.0 * (self.plus_di - self.minus_di).abs() / di_sum
        } else {
            0.0
        };

        self.dx_count += 1;
        match self.adx {
            Some(adx) => self.adx = Some((adx * (p - 1.0) + dx) / p),
            None => {
                self.dx_sum += dx;
                if self.dx_count == self.period {
                    self.adx = Some(self.dx_sum / p);
                }
            }
        }
        self.adx
    }

    pub fn value(&self) -> Option<f64> {
        self.adx
    }

    /// (+DI, -DI) once the smoothing window is full.
    pub fn directional(&self) -> Option<(f64, f64)> {
        (self.samples >= self.period).then_some((self.plus_di, self.minus_di))
    }

    pub fn clear(&mut self) {
        *self = Self::new(self.period);
    }
}

/// Trend direction and strength over one timeframe.
#[derive(Debug, Clone)]
pub struct TrendGauge {
    fast: Ema,
    slow: Ema,
    adx: Adx,
    atr: Option<WilderAtr>,
}

impl TrendGauge {
    pub fn new(config: &TrendConfig, atr_period: Option<usize>) -> Self {
        Self {
            fast: Ema::new(config.fast_period),
            slow: Ema::new(config.slow_period),
            adx: Adx::new(config.strength_period),
            atr: atr_period.map(WilderAtr::new),
        }
    }

    pub fn add_bar(&mut self, bar: &Bar) {
        self.fast.add(bar.close);
        self.slow.add(bar.close);
        self.adx.add_bar(bar);
        if let Some(atr) = self.atr.as_mut() {
            atr.add_bar(bar);
        }
    }

    /// Whether the EMAs are ordered in `direction`'s favour; `None` before both are seeded.
    pub fn aligned(&self, direction: Direction) -> Option<bool> {
        let fast = self.fast.value()?;
        let slow = self.slow.value()?;
        Some(match direction {
            Direction::Long => fast > slow,
            Direction::Short => fast < slow,
        })
    }

    /// ADX, once available.
    pub fn strength(&self) -> Option<f64> {
        self.adx.value()
    }

    pub fn atr(&self) -> Option<f64> {
        self.atr.as_ref().and_then(WilderAtr::value)
    }

    pub fn clear(&mut self) {
        self.fast.clear();
        self.slow.clear();
        self.adx.clear();
        if let Some(atr) = self.atr.as_mut() {
            atr.clear();
        }
    }
}
