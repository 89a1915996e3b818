//! Error taxonomy.
//!
//! `ConfigurationError` and `StateCorruptionError` are fatal. `UnreachableError`
//! and `GenerationError` are recovered where they occur and only logged.

use std::path::PathBuf;
use thiserror::Error;
use town_events::Coord;

use crate::components::address::AddressError;
use crate::generation::PromptKind;

/// Invalid input detected while loading the world, agents or configuration.
#[derive(Debug, Error)]
pub enum ConfigurationError {
    #[error("{layer} grid is {found_width}x{found_height}, expected {width}x{height}")]
    DimensionMismatch {
        layer: &'static str,
        width: usize,
        height: usize,
        found_width: usize,
        found_height: usize,
    },

    #[error("{layer} id {id} at {at} has no name mapping")]
    UnmappedId {
        layer: &'static str,
        id: u32,
        at: Coord,
    },

    #[error("tile {at} has a {child} without a {parent}")]
    BrokenNesting {
        at: Coord,
        child: &'static str,
        parent: &'static str,
    },

    #[error("invalid address '{input}': {source}")]
    Address {
        input: String,
        #[source]
        source: AddressError,
    },

    #[error("agent {agent}: {reason}")]
    InvalidAgent { agent: String, reason: String },

    #[error("duplicate agent id {0}")]
    DuplicateAgent(String),

    #[error("invalid setting {field}: {reason}")]
    InvalidSetting { field: &'static str, reason: String },

    #[error("failed to parse config: {0}")]
    Toml(#[from] toml::de::Error),

    #[error("failed to parse {}: {source}", .path.display())]
    Json {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("failed to read {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// A resolved target cannot be reached. Planning falls back to the living area.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum UnreachableError {
    #[error("no path from {from} to {to}")]
    NoPath { from: Coord, to: Coord },

    #[error("no reachable tile among {candidates} candidates from {from}")]
    NoReachableTarget { from: Coord, candidates: usize },

    #[error("unknown location {0}")]
    UnknownLocation(String),
}

/// The generation capability failed. Callers take a deterministic fallback.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum GenerationError {
    #[error("generation timed out after {millis}ms")]
    Timeout { millis: u64 },

    #[error("generator unavailable: {0}")]
    Unavailable(String),

    #[error("malformed {kind:?} output: {output:?}")]
    Malformed { kind: PromptKind, output: String },

    #[error("generation quota exhausted: {0}")]
    Quota(String),
}

impl GenerationError {
    /// Quota exhaustion is not worth retrying within the same call.
    pub fn is_retryable(&self) -> bool {
        !matches!(self, GenerationError::Quota(_))
    }
}

/// An invariant of the simulation state was violated. The simulation halts.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum StateCorruptionError {
    #[error("memory node sequence {found} is not greater than {last}")]
    NonMonotonicSequence { last: u64, found: u64 },

    #[error("agent {agent} references conversation {conversation} it is not part of")]
    ConversationMismatch { agent: String, conversation: u64 },

    #[error("agent {agent} is in more than one conversation")]
    DoubleBooked { agent: String },

    #[error("agent {agent} stands on blocked tile {tile}")]
    BlockedTile { agent: String, tile: Coord },

    #[error("agent {agent} is outside the grid at {tile}")]
    OutOfBounds { agent: String, tile: Coord },
}

/// Top-level error for simulation entry points.
#[derive(Debug, Error)]
pub enum SimError {
    #[error(transparent)]
    Configuration(#[from] ConfigurationError),

    #[error(transparent)]
    Corruption(#[from] StateCorruptionError),

    #[error("unknown agent {0}")]
    UnknownAgent(String),

    #[error("no saved session at {}", .0.display())]
    SessionNotFound(PathBuf),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_messages() {
        let err = UnreachableError::NoPath {
            from: Coord::new(0, 0),
            to: Coord::new(3, 1),
        };
        assert_eq!(err.to_string(), "no path from (0, 0) to (3, 1)");

        let err = ConfigurationError::DimensionMismatch {
            layer: "sector",
            width: 4,
            height: 3,
            found_width: 4,
            found_height: 2,
        };
        assert_eq!(err.to_string(), "sector grid is 4x2, expected 4x3");
    }

    #[test]
    fn test_corruption_converts_to_sim_error() {
        let err: SimError = StateCorruptionError::NonMonotonicSequence { last: 4, found: 2 }.into();
        assert!(matches!(err, SimError::Corruption(_)));
    }

    #[test]
    fn test_quota_is_not_retryable() {
        assert!(!GenerationError::Quota("daily".into()).is_retryable());
        assert!(GenerationError::Timeout { millis: 10 }.is_retryable());
    }
}
