//! Trading engine for the sweep-trader system.
//!
//! This crate provides:
//! - The setup pipeline turning signals into trade signals, per entry archetype
//! - Three-leg position management with ratcheting stops
//! - The cross-symbol daily risk gate
//! - The per-symbol engine and its replay and live drivers
//! - Event sinks

pub mod live;
pub mod pipeline;
pub mod position;
pub mod ratchet;
pub mod replay;
pub mod risk;
pub mod setup;
pub mod sink;
pub mod symbol;

pub use live::{BarSource, LiveRunner};
pub use pipeline::SetupPipeline;
pub use position::{ClosedPosition, ExitKind, Phase, Position, PositionManager};
pub use ratchet::StopRatchet;
pub use replay::{group_by_day, replay, ReplaySummary, TallySink};
pub use risk::{DailyCounters, DailyRiskGate, RiskGate, RiskRejection};
pub use setup::{FilterRejection, PendingSweep, SetupId, SetupOrigin, SetupStage, SetupState, TradeSignal};
pub use sink::{ChannelSink, JsonLinesSink};
pub use symbol::SymbolEngine;
