//! Step Frame Types
//!
//! Serialization structs for the per-step movement record.
//!
//! One `StepFrame` is emitted per simulation step. Frames are appended to a
//! JSONL log and consumed by replay and visualization tooling.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::{Coord, SimTime};

/// Generates a frame ID with the given step number.
pub fn generate_frame_id(step: u64) -> String {
    format!("frame_{:08}", step)
}

/// A single spoken line within a conversation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatLine {
    pub speaker: String,
    pub text: String,
}

impl ChatLine {
    pub fn new(speaker: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            speaker: speaker.into(),
            text: text.into(),
        }
    }
}

/// What one agent did during a step.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AgentFrame {
    /// Tile occupied after the step was committed.
    pub tile: Coord,
    /// Public description of the current action.
    pub action: String,
    #[serde(default)]
    pub emoji: String,
    /// Remaining planned path, next tile first.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub path: Vec<Coord>,
    /// Lines spoken this step, when the agent is in a conversation.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub chat: Option<Vec<ChatLine>>,
}

impl AgentFrame {
    pub fn new(tile: Coord, action: impl Into<String>) -> Self {
        Self {
            tile,
            action: action.into(),
            emoji: String::new(),
            path: Vec::new(),
            chat: None,
        }
    }

    pub fn with_emoji(mut self, emoji: impl Into<String>) -> Self {
        self.emoji = emoji.into();
        self
    }

    pub fn with_path(mut self, path: Vec<Coord>) -> Self {
        self.path = path;
        self
    }

    pub fn with_chat(mut self, chat: Vec<ChatLine>) -> Self {
        self.chat = Some(chat);
        self
    }
}

/// The complete movement record for one step.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StepFrame {
    pub step: u64,
    pub time: SimTime,
    /// Keyed by agent id; ordered so serialized frames are stable.
    pub agents: BTreeMap<String, AgentFrame>,
}

impl StepFrame {
    pub fn new(step: u64, time: SimTime) -> Self {
        Self {
            step,
            time,
            agents: BTreeMap::new(),
        }
    }

    pub fn frame_id(&self) -> String {
        generate_frame_id(self.step)
    }

    pub fn agent(&self, agent_id: &str) -> Option<&AgentFrame> {
        self.agents.get(agent_id)
    }

    /// Agents that spoke during this step.
    pub fn speakers(&self) -> Vec<&str> {
        self.agents
            .iter()
            .filter(|(_, frame)| frame.chat.as_ref().is_some_and(|lines| !lines.is_empty()))
            .map(|(id, _)| id.as_str())
            .collect()
    }

    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }

    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }
}
