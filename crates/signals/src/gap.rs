//! Fair value gap (FVG) tracking.
//!
//! A gap is the untraded zone left by a three-bar imbalance. For bars `(a, b, c)`, a bullish
//! gap exists when `c.low > a.high` and spans `[a.high, c.low]`; a bearish gap exists when
//! `c.high < a.low` and spans `[c.high, a.low]`. The gap is stamped with the middle bar.
//!
//! Two policies mutate a tracked gap after it forms:
//! - touch-mitigation: the first later bar whose range re-enters the zone mitigates it
//! - close-invalidation: a later close beyond the far edge voids it
//!
//! Both flags only ever go from false to true.

use serde::{Deserialize, Serialize};
use sweep_core::config::{GapConfig, GapInvalidation};
use sweep_core::{to_ticks, Bar, Direction, Error, Result, TimestampMs};
use tracing::debug;

pub type GapId = u64;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Gap {
    pub id: GapId,
    pub direction: Direction,
    pub top: f64,
    pub bottom: f64,
    /// Index of the middle bar.
    pub created_index: usize,
    pub created_ts: TimestampMs,
    pub size_ticks: f64,
    pub mitigated: bool,
    pub mitigated_index: Option<usize>,
    pub invalidated: bool,
}

impl Gap {
    #[inline]
    pub fn midpoint(&self) -> f64 {
        (self.top + self.bottom) / 2.0
    }

    #[inline]
    pub fn height(&self) -> f64 {
        self.top - self.bottom
    }

    /// Bars elapsed since the middle bar.
    #[inline]
    pub fn age(&self, index: usize) -> usize {
        index.saturating_sub(self.created_index)
    }

    /// Protective edge: bottom of a bullish gap, top of a bearish one.
    #[inline]
    pub fn far_edge(&self) -> f64 {
        match self.direction {
            Direction::Long => self.bottom,
            Direction::Short => self.top,
        }
    }

    /// Edge price meets first on a retrace.
    #[inline]
    pub fn near_edge(&self) -> f64 {
        match self.direction {
            Direction::Long => self.top,
            Direction::Short => self.bottom,
        }
    }

    /// True if the bar's range re-enters the zone.
    #[inline]
    pub fn touched_by(&self, bar: &Bar) -> bool {
        match self.direction {
            Direction::Long => bar.low <= self.top,
            Direction::Short => bar.high >= self.bottom,
        }
    }

    /// True if the bar closed back outside the zone on the gap's side after dipping in.
    pub fn rejected_by(&self, bar: &Bar) -> bool {
        match self.direction {
            Direction::Long => bar.low <= self.top && bar.close > self.top,
            Direction::Short => bar.high >= self.bottom && bar.close < self.bottom,
        }
    }

    /// Touch-mitigation policy. Returns true only on the bar that first mitigates.
    pub fn apply_touch_mitigation(&mut self, bar: &Bar, index: usize) -> bool {
        if self.mitigated || !self.touched_by(bar) {
            return false;
        }
        self.mitigated = true;
        self.mitigated_index = Some(index);
        true
    }

    /// Close-invalidation policy. Returns true only on the bar that first invalidates.
    pub fn apply_close_invalidation(&mut self, bar: &Bar) -> bool {
        if self.invalidated {
            return false;
        }
        let through = match self.direction {
            Direction::Long => bar.close < self.bottom,
            Direction::Short => bar.close > self.top,
        };
        if through {
            self.invalidated = true;
        }
        through
    }
}

/// Direction and bounds of a gap in three consecutive bars, if any.
pub fn find_gap(a: &Bar, c: &Bar) -> Option<(Direction, f64, f64)> {
    if c.low > a.high {
        Some((Direction::Long, c.low, a.high))
    } else if c.high < a.low {
        Some((Direction::Short, a.low, c.high))
    } else {
        None
    }
}

/// What happened to tracked gaps on one bar.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct GapUpdate {
    /// Gap completed by this bar.
    pub formed: Option<GapId>,
    /// Live gaps whose zone this bar entered.
    pub touched: Vec<GapId>,
    /// Gaps mitigated for the first time.
    pub mitigated: Vec<GapId>,
    /// Gaps voided and dropped.
    pub invalidated: Vec<GapId>,
    /// Gaps dropped for age.
    pub expired: Vec<GapId>,
}

/// Tracks live gaps on one timeframe.
pub struct GapTracker {
    gaps: Vec<Gap>,
    next_id: GapId,
    min_size_ticks: f64,
    max_age_bars: usize,
    invalidation: GapInvalidation,
    tick_size: f64,
}

impl GapTracker {
    pub fn new(config: &GapConfig, tick_size: f64) -> Result<Self> {
        config.validate()?;
        if !(tick_size.is_finite() && tick_size > 0.0) {
            return Err(Error::config("gap tracker tick size must be positive"));
        }
        Ok(Self {
            gaps: Vec::new(),
            next_id: 1,
            min_size_ticks: config.min_fvg_ticks,
            max_age_bars: config.max_fvg_age_bars,
            invalidation: config.invalidation,
            tick_size,
        })
    }

    /// Process the last bar of `bars` (index `bars.len() - 1`).
    pub fn update(&mut self, bars: &[Bar]) -> GapUpdate {
        let mut update = GapUpdate::default();
        let Some(bar) = bars.last() else {
            return update;
        };
        let index = bars.len() - 1;

        for gap in &mut self.gaps {
            if self.invalidation == GapInvalidation::CloseThrough && gap.apply_close_invalidation(bar) {
                update.invalidated.push(gap.id);
                continue;
            }
            if gap.touched_by(bar) {
                update.touched.push(gap.id);
            }
            if gap.apply_touch_mitigation(bar, index) {
                update.mitigated.push(gap.id);
            }
        }

        let max_age = self.max_age_bars;
        self.gaps.retain(|gap| {
            if gap.invalidated {
                debug!(gap_id = gap.id, "gap invalidated by close");
                return false;
            }
            if gap.age(index) > max_age {
                update.expired.push(gap.id);
                return false;
            }
            true
        });

        if index >= 2 {
            update.formed = self.try_form(&bars[index - 2], &bars[index - 1], &bars[index], index - 1);
        }
        update
    }

    fn try_form(&mut self, a: &Bar, middle: &Bar, c: &Bar, middle_index: usize) -> Option<GapId> {
        let (direction, top, bottom) = find_gap(a, c)?;
        let size_ticks = to_ticks(top - bottom, self.tick_size);
        if size_ticks < self.min_size_ticks {
            return None;
        }
        let id = self.next_id;
        self.next_id += 1;
        debug!(gap_id = id, %direction, top, bottom, size_ticks, "gap formed");
        self.gaps.push(Gap {
            id,
            direction,
            top,
            bottom,
            created_index: middle_index,
            created_ts: middle.ts_ms,
            size_ticks,
            mitigated: false,
            mitigated_index: None,
            invalidated: false,
        });
        Some(id)
    }

    pub fn get(&self, id: GapId) -> Option<&Gap> {
        self.gaps.iter().find(|g| g.id == id)
    }

    /// Live gaps, oldest first.
    pub fn active(&self) -> &[Gap] {
        &self.gaps
    }

    /// Oldest live gap of `direction` whose middle bar lies in `[first, last]`.
    pub fn first_in_range(&self, direction: Direction, first: usize, last: usize) -> Option<&Gap> {
        self.gaps
            .iter()
            .find(|g| g.direction == direction && (first..=last).contains(&g.created_index))
    }

    pub fn len(&self) -> usize {
        self.gaps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.gaps.is_empty()
    }

    pub fn clear(&mut self) {
        self.gaps.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn make_bar(i: usize, open: f64, high: f64, low: f64, close: f64) -> Bar {
        Bar::new(i as i64 * 300_000, open, high, low, close)
    }

    fn make_tracker(invalidation: GapInvalidation) -> GapTracker {
        GapTracker::new(
            &GapConfig {
                min_fvg_ticks: 2.0,
                max_fvg_age_bars: 50,
                invalidation,
            },
            0.25,
        )
        .unwrap()
    }

    #[test]
    fn test_new_rejects_invalid_config() {
        let config = GapConfig {
            max_fvg_age_bars: 0,
            ..Default::default()
        };
        assert!(GapTracker::new(&config, 0.25).is_err());
        assert!(GapTracker::new(&GapConfig::default(), 0.0).is_err());
    }

    /// Bullish gap [100.00, 100.50] with the middle bar at index 1.
    fn bullish_gap_bars() -> Vec<Bar> {
        vec![
            make_bar(0, 99.5, 100.0, 99.25, 99.75),
            make_bar(1, 99.75, 101.25, 99.75, 101.0),
            make_bar(2, 101.0, 101.5, 100.5, 101.25),
        ]
    }

    fn feed(tracker: &mut GapTracker, bars: &mut Vec<Bar>, bar: Bar) -> GapUpdate {
        bars.push(bar);
        tracker.update(bars)
    }

    #[test]
    fn test_bullish_gap_formation() {
        let mut tracker = make_tracker(GapInvalidation::CloseThrough);
        let bars = bullish_gap_bars();
        tracker.update(&bars[..1]);
        tracker.update(&bars[..2]);
        let update = tracker.update(&bars);

        let id = update.formed.unwrap();
        let gap = tracker.get(id).unwrap();
        assert_eq!(gap.direction, Direction::Long);
        assert_relative_eq!(gap.bottom, 100.0);
        assert_relative_eq!(gap.top, 100.5);
        assert_relative_eq!(gap.midpoint(), 100.25);
        assert_relative_eq!(gap.size_ticks, 2.0);
        assert_eq!(gap.created_index, 1);
        assert_eq!(gap.created_ts, bars[1].ts_ms);
    }

    #[test]
    fn test_bearish_gap_formation() {
        let mut tracker = make_tracker(GapInvalidation::Never);
        let bars = vec![
            make_bar(0, 101.0, 101.25, 100.5, 100.75),
            make_bar(1, 100.75, 100.75, 99.0, 99.25),
            make_bar(2, 99.25, 99.5, 98.75, 99.0),
        ];
        let update = tracker.update(&bars);
        let gap = tracker.get(update.formed.unwrap()).unwrap();
        assert_eq!(gap.direction, Direction::Short);
        assert_relative_eq!(gap.top, 100.5);
        assert_relative_eq!(gap.bottom, 99.5);
    }

    #[test]
    fn test_small_gap_ignored() {
        let mut tracker = make_tracker(GapInvalidation::Never);
        let bars = vec![
            make_bar(0, 99.5, 100.0, 99.25, 99.75),
            make_bar(1, 99.75, 101.0, 99.75, 100.5),
            make_bar(2, 100.5, 100.75, 100.25, 100.5),
        ];
        assert!(tracker.update(&bars).formed.is_none());
    }

    #[test]
    fn test_touch_mitigation_is_monotonic() {
        let mut tracker = make_tracker(GapInvalidation::Never);
        let mut bars = bullish_gap_bars();
        let id = tracker.update(&bars).formed.unwrap();

        let update = feed(&mut tracker, &mut bars, make_bar(3, 101.25, 101.75, 101.0, 101.5));
        assert!(update.mitigated.is_empty());
        assert!(!tracker.get(id).unwrap().mitigated);

        let update = feed(&mut tracker, &mut bars, make_bar(4, 101.5, 101.5, 100.25, 101.0));
        assert_eq!(update.mitigated, vec![id]);
        assert_eq!(update.touched, vec![id]);
        assert_eq!(tracker.get(id).unwrap().mitigated_index, Some(4));

        let update = feed(&mut tracker, &mut bars, make_bar(5, 101.0, 102.0, 100.75, 101.75));
        assert!(update.mitigated.is_empty());
        assert!(tracker.get(id).unwrap().mitigated);

        let update = feed(&mut tracker, &mut bars, make_bar(6, 101.75, 102.0, 100.4, 101.5));
        assert!(update.mitigated.is_empty());
        assert_eq!(update.touched, vec![id]);
        assert!(tracker.get(id).unwrap().mitigated);
    }

    #[test]
    fn test_close_invalidation_policy() {
        let mut tracker = make_tracker(GapInvalidation::CloseThrough);
        let mut bars = bullish_gap_bars();
        let id = tracker.update(&bars).formed.unwrap();

        let update = feed(&mut tracker, &mut bars, make_bar(3, 101.0, 101.0, 99.5, 99.75));
        assert_eq!(update.invalidated, vec![id]);
        assert!(update.touched.is_empty());
        assert!(tracker.get(id).is_none());
    }

    #[test]
    fn test_close_through_kept_without_policy() {
        let mut tracker = make_tracker(GapInvalidation::Never);
        let mut bars = bullish_gap_bars();
        let id = tracker.update(&bars).formed.unwrap();

        let update = feed(&mut tracker, &mut bars, make_bar(3, 101.0, 101.0, 99.5, 99.75));
        assert!(update.invalidated.is_empty());
        assert_eq!(update.mitigated, vec![id]);
        assert!(!tracker.get(id).unwrap().invalidated);
    }

    #[test]
    fn test_gap_expires_after_max_age() {
        let mut tracker = make_tracker(GapInvalidation::CloseThrough);
        let mut bars = bullish_gap_bars();
        let id = tracker.update(&bars).formed.unwrap();
        let created = tracker.get(id).unwrap().created_index;

        while bars.len() <= created + 50 {
            let i = bars.len();
            let update = feed(&mut tracker, &mut bars, make_bar(i, 102.0, 102.5, 101.75, 102.25));
            assert!(update.expired.is_empty());
        }
        assert!(tracker.get(id).is_some());

        let i = bars.len();
        let update = feed(&mut tracker, &mut bars, make_bar(i, 102.0, 102.5, 101.75, 102.25));
        assert_eq!(update.expired, vec![id]);
        assert!(tracker.get(id).is_none());
        assert!(tracker.first_in_range(Direction::Long, created, created).is_none());
    }

    #[test]
    fn test_rejection_candle() {
        let gap = Gap {
            id: 1,
            direction: Direction::Long,
            top: 100.5,
            bottom: 100.0,
            created_index: 0,
            created_ts: 0,
            size_ticks: 2.0,
            mitigated: false,
            mitigated_index: None,
            invalidated: false,
        };
        assert!(gap.rejected_by(&make_bar(0, 100.75, 101.0, 100.25, 100.9)));
        assert!(!gap.rejected_by(&make_bar(0, 100.75, 101.0, 100.25, 100.4)));
        assert!(!gap.rejected_by(&make_bar(0, 100.75, 101.0, 100.6, 100.9)));
        assert_relative_eq!(gap.far_edge(), 100.0);
        assert_relative_eq!(gap.near_edge(), 100.5);
    }
}
