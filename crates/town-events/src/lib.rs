//! Shared data types and serialization for the agent town simulation.
//!
//! This crate contains pure data structures with no simulation logic.
//! It is a dependency for all other crates in the workspace.

pub mod coord;
pub mod frame;
pub mod timestamp;

#[cfg(any(test, feature = "test-fixtures"))]
pub mod fixtures;

// Re-export timestamp types
pub use timestamp::{
    ParseTimeError, SimTime, SimTimestamp, MINUTES_PER_DAY, SECONDS_PER_DAY, SECONDS_PER_MINUTE,
};

pub use coord::Coord;

// Re-export frame types
pub use frame::{generate_frame_id, AgentFrame, ChatLine, StepFrame};
