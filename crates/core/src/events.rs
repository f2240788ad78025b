//! Events emitted by the engine and the sink they are delivered to.

use crate::types::{CloseReason, Contracts, Direction, EntryArchetype, Leg, TimestampMs};
use serde::{Deserialize, Serialize};

/// A new position was opened.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EntryEvent {
    pub position_id: u64,
    pub symbol: String,
    pub direction: Direction,
    pub entry_type: EntryArchetype,
    pub price: f64,
    pub stop: f64,
    /// T1 target followed by the trail-activation target.
    pub target_prices: Vec<f64>,
    pub size: Contracts,
    pub time: TimestampMs,
}

/// Part of a position was exited; quantity remains open.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PartialExitEvent {
    pub position_id: u64,
    pub leg: Leg,
    pub price: f64,
    pub qty: Contracts,
    pub pnl: f64,
    pub time: TimestampMs,
}

/// The last open quantity of a position was exited.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CloseEvent {
    pub position_id: u64,
    pub reason: CloseReason,
    pub price: f64,
    pub qty: Contracts,
    pub pnl: f64,
    pub time: TimestampMs,
}

/// Engine output.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum EngineEvent {
    Entry(EntryEvent),
    PartialExit(PartialExitEvent),
    Close(CloseEvent),
}

impl EngineEvent {
    pub fn position_id(&self) -> u64 {
        match self {
            EngineEvent::Entry(e) => e.position_id,
            EngineEvent::PartialExit(e) => e.position_id,
            EngineEvent::Close(e) => e.position_id,
        }
    }

    pub fn time(&self) -> TimestampMs {
        match self {
            EngineEvent::Entry(e) => e.time,
            EngineEvent::PartialExit(e) => e.time,
            EngineEvent::Close(e) => e.time,
        }
    }
}

/// Receiver of engine events.
pub trait EventSink {
    fn emit(&mut self, event: EngineEvent);
}

impl EventSink for Vec<EngineEvent> {
    fn emit(&mut self, event: EngineEvent) {
        self.push(event);
    }
}
