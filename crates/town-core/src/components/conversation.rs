//! Conversations
//!
//! A conversation is shared by its two participants and lives in the
//! `Conversations` resource; each participant's `Scratch` holds its id.

use bevy_ecs::prelude::*;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use town_events::SimTime;

use super::agent::AgentId;
use super::memory::Filling;

/// Why a conversation is over, or `Open` while it is not.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConversationEnd {
    Open,
    EndedBySpeaker,
    TurnLimit,
    DurationElapsed,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Utterance {
    pub speaker: AgentId,
    pub text: String,
    pub at: SimTime,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConversationState {
    pub id: u64,
    /// Initiator first.
    pub participants: [AgentId; 2],
    pub utterances: Vec<Utterance>,
    pub started: SimTime,
    pub end: ConversationEnd,
}

impl ConversationState {
    pub fn new(id: u64, initiator: AgentId, partner: AgentId, started: SimTime) -> Self {
        Self {
            id,
            participants: [initiator, partner],
            utterances: Vec::new(),
            started,
            end: ConversationEnd::Open,
        }
    }

    pub fn is_open(&self) -> bool {
        self.end == ConversationEnd::Open
    }

    pub fn involves(&self, agent: &AgentId) -> bool {
        self.participants.contains(agent)
    }

    pub fn partner_of(&self, agent: &AgentId) -> Option<&AgentId> {
        match &self.participants {
            [a, b] if a == agent => Some(b),
            [a, b] if b == agent => Some(a),
            _ => None,
        }
    }

    /// Participants alternate, initiator first.
    pub fn next_speaker(&self) -> &AgentId {
        &self.participants[self.utterances.len() % 2]
    }

    /// Transcript lines, "Name: text".
    pub fn transcript(&self, names: &BTreeMap<AgentId, String>) -> Vec<String> {
        self.utterances
            .iter()
            .map(|u| {
                let name = names.get(&u.speaker).map_or(u.speaker.as_str(), |n| n.as_str());
                format!("{}: {}", name, u.text)
            })
            .collect()
    }

    pub fn filling(&self) -> Vec<Filling> {
        self.utterances
            .iter()
            .map(|u| Filling::Utterance {
                speaker: u.speaker.0.clone(),
                text: u.text.clone(),
            })
            .collect()
    }
}

/// Resource: every conversation, keyed by id.
#[derive(Resource, Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Conversations {
    next_id: u64,
    active: BTreeMap<u64, ConversationState>,
}

impl Conversations {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn open(&mut self, initiator: AgentId, partner: AgentId, now: SimTime) -> u64 {
        self.next_id += 1;
        let id = self.next_id;
        self.active
            .insert(id, ConversationState::new(id, initiator, partner, now));
        id
    }

    pub fn get(&self, id: u64) -> Option<&ConversationState> {
        self.active.get(&id)
    }

    pub fn get_mut(&mut self, id: u64) -> Option<&mut ConversationState> {
        self.active.get_mut(&id)
    }

    pub fn remove(&mut self, id: u64) -> Option<ConversationState> {
        self.active.remove(&id)
    }

    pub fn ids(&self) -> Vec<u64> {
        self.active.keys().copied().collect()
    }

    pub fn len(&self) -> usize {
        self.active.len()
    }

    pub fn is_empty(&self) -> bool {
        self.active.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &ConversationState> {
        self.active.values()
    }

    /// Conversations `agent` takes part in.
    pub fn involving(&self, agent: &AgentId) -> Vec<u64> {
        self.active
            .values()
            .filter(|c| c.involves(agent))
            .map(|c| c.id)
            .collect()
    }
}
