//! Sample data fixtures for testing.
//!
//! This module provides ready-made test data for other crates to use.
//! Enable the `test-fixtures` feature to access these helpers.
//!
//! # Example
//!
//! ```ignore
//! // In your Cargo.toml:
//! // [dev-dependencies]
//! // town-events = { path = "../town-events", features = ["test-fixtures"] }
//!
//! use town_events::fixtures;
//!
//! let frames = fixtures::sample_frames();
//! ```

use crate::StepFrame;

/// Returns sample frames from the fixtures file.
///
/// Contains 4 consecutive steps of two agents:
/// - isabella walks one tile toward the cafe counter
/// - isabella and klaus then exchange one line each
pub fn sample_frames() -> Vec<StepFrame> {
    let jsonl = include_str!("../tests/fixtures/sample_frames.jsonl");
    jsonl
        .lines()
        .filter(|l| !l.trim().is_empty())
        .map(|l| {
            StepFrame::from_json(l).unwrap_or_else(|e| {
                panic!("Failed to parse frame line: {}\nError: {}", l, e)
            })
        })
        .collect()
}

/// Returns a specific frame by step from the sample frames.
pub fn get_frame(step: u64) -> Option<StepFrame> {
    sample_frames().into_iter().find(|f| f.step == step)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Coord;

    #[test]
    fn test_sample_frames_load() {
        let frames = sample_frames();
        assert_eq!(frames.len(), 4, "Should have 4 sample frames");
        assert!(frames.windows(2).all(|w| w[0].step + 1 == w[1].step));
        assert!(frames.windows(2).all(|w| w[0].time < w[1].time));
    }

    #[test]
    fn test_movement_follows_path() {
        let first = get_frame(0).unwrap();
        let second = get_frame(1).unwrap();
        let planned = first.agent("isabella").unwrap().path[0];
        assert_eq!(second.agent("isabella").unwrap().tile, planned);
        assert_eq!(planned, Coord::new(4, 2));
    }

    #[test]
    fn test_chat_lines() {
        let frame = get_frame(2).unwrap();
        assert_eq!(frame.speakers(), vec!["isabella"]);
        let line = &frame.agent("isabella").unwrap().chat.as_ref().unwrap()[0];
        assert_eq!(line.text, "Good morning, Klaus!");
    }
}
