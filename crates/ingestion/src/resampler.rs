//! Higher-timeframe bar building from lower-timeframe bars.
//!
//! Aggregates e.g. 1-minute bars into 5-minute buckets keyed by bucket open time.

use std::collections::BTreeMap;
use sweep_core::{ts_to_bucket, Bar, TimestampMs, MINUTE_MS};

/// Builder for higher-timeframe bars.
pub struct BarResampler {
    /// Buckets being built, keyed by bucket open timestamp.
    buckets: BTreeMap<TimestampMs, BucketInProgress>,
    /// Bucket width in milliseconds.
    period_ms: i64,
}

/// A bucket that's currently being built.
#[derive(Debug, Clone)]
struct BucketInProgress {
    ts_ms: TimestampMs,
    open: f64,
    high: f64,
    low: f64,
    close: f64,
    volume: f64,
    last_ts: TimestampMs,
}

impl BucketInProgress {
    fn new(ts_ms: TimestampMs, first: &Bar) -> Self {
        Self {
            ts_ms,
            open: first.open,
            high: first.high,
            low: first.low,
            close: first.close,
            volume: first.volume,
            last_ts: first.ts_ms,
        }
    }

    fn add_bar(&mut self, bar: &Bar) {
        // Out-of-order bars still widen the range but never move open or close backwards.
        if bar.ts_ms >= self.last_ts {
            self.close = bar.close;
            self.last_ts = bar.ts_ms;
        }
        self.high = self.high.max(bar.high);
        self.low = self.low.min(bar.low);
        self.volume += bar.volume;
    }

    fn to_bar(&self) -> Bar {
        Bar {
            ts_ms: self.ts_ms,
            open: self.open,
            high: self.high,
            low: self.low,
            close: self.close,
            volume: self.volume,
        }
    }
}

impl BarResampler {
    /// Create a resampler for buckets of `period_ms`.
    pub fn new(period_ms: i64) -> Self {
        Self {
            buckets: BTreeMap::new(),
            period_ms: period_ms.max(1),
        }
    }

    /// Create a resampler for buckets of `minutes`.
    pub fn minutes(minutes: u32) -> Self {
        Self::new(i64::from(minutes) * MINUTE_MS)
    }

    pub fn period_ms(&self) -> i64 {
        self.period_ms
    }

    /// Add a lower-timeframe bar.
    pub fn add_bar(&mut self, bar: &Bar) {
        let bucket = ts_to_bucket(bar.ts_ms, self.period_ms);
        self.buckets
            .entry(bucket)
            .and_modify(|b| b.add_bar(bar))
            .or_insert_with(|| BucketInProgress::new(bucket, bar));
    }

    /// Add multiple bars.
    pub fn add_bars(&mut self, bars: &[Bar]) {
        for bar in bars {
            self.add_bar(bar);
        }
    }

    /// Finalize and return buckets that ended at or before `current_ts_ms`.
    pub fn finalize_before(&mut self, current_ts_ms: TimestampMs) -> Vec<Bar> {
        let current_bucket = ts_to_bucket(current_ts_ms, self.period_ms);
        let open = self.buckets.split_off(&current_bucket);
        let completed = std::mem::replace(&mut self.buckets, open);
        completed.values().map(BucketInProgress::to_bar).collect()
    }

    /// Finalize everything, including a partially filled last bucket.
    pub fn flush(&mut self) -> Vec<Bar> {
        let completed = std::mem::take(&mut self.buckets);
        completed.values().map(BucketInProgress::to_bar).collect()
    }

    /// Resample a whole ordered series in one call.
    pub fn resample(bars: &[Bar], period_ms: i64) -> Vec<Bar> {
        let mut resampler = Self::new(period_ms);
        resampler.add_bars(bars);
        resampler.flush()
    }

    /// Get the number of buckets currently being built.
    pub fn pending_bar_count(&self) -> usize {
        self.buckets.len()
    }

    /// Clear all state.
    pub fn clear(&mut self) {
        self.buckets.clear();
    }
}
