//! Output Module
//!
//! Saved sessions.

pub mod snapshot;

pub use snapshot::{AgentSnapshot, SessionSnapshot, SNAPSHOT_FILE, SNAPSHOT_VERSION};
