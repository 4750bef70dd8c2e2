//! Pipeline abstraction layer for Playcast
//!
//! This module provides the shared machinery of the streaming pipeline,
//! separating concerns between:
//! - Control/Coordination: the session state machine
//! - Observability: health metrics and recovery signals
//! - Pacing: frame counting and frame-time statistics
//!
//! # Architecture
//!
//! The producer loop, the streaming sink and the reconnect task all share
//! these types:
//! - SessionState validates every lifecycle transition
//! - StreamHealth tracks metrics and exposes them to the control surface
//! - FrameClock provides frame numbering and pacing statistics

pub mod clock;
pub mod health;
pub mod state;

pub use clock::FrameClock;
pub use health::{HealthSummary, StreamHealth};
pub use state::SessionState;
