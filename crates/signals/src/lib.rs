//! Signal detection for the sweep-trader system.
//!
//! This crate handles:
//! - Swing point detection
//! - Liquidity sweeps of swing levels
//! - Displacement (large body) measurement
//! - Fair value gap tracking with mitigation and invalidation policies
//! - Structure shift detection
//! - Trend direction, strength and ATR

pub mod displacement;
pub mod engine;
pub mod gap;
pub mod structure;
pub mod sweep;
pub mod swing;
pub mod trend;

pub use displacement::{DisplacementFilter, RollingBody};
pub use engine::{SignalEngine, SignalUpdate};
pub use gap::{Gap, GapId, GapTracker, GapUpdate};
pub use structure::{LockedLevel, StructureBreak, StructureShiftDetector};
pub use sweep::{Sweep, SweepDetector};
pub use swing::{is_swing_high, is_swing_low, SwingDetector, SwingKind, SwingPoint};
pub use trend::{Adx, Ema, TrendGauge, WilderAtr};
