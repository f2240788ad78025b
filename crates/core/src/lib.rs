//! Core types and configuration for the sweep-trader system.
//!
//! This crate provides shared types used across all other crates:
//! - Market data types (bars, swing points, sweeps, gaps)
//! - Output events emitted by the engine
//! - Configuration structures and their validation
//! - The session clock used for time-of-day decisions
//! - Common error types

pub mod clock;
pub mod config;
pub mod error;
pub mod events;
pub mod types;

pub use clock::{ExchangeClock, SessionClock};
pub use config::Config;
pub use error::{Error, Result};
pub use events::*;
pub use types::*;
