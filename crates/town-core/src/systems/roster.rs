//! Agent Roster
//!
//! A start-of-step snapshot of every agent's public state. Other agents read
//! the roster, never each other's live components, so decisions made during a
//! step only become visible on the next one.

use bevy_ecs::prelude::*;
use std::collections::BTreeMap;
use town_events::{Coord, SimTime};

use crate::components::{Address, AgentId, Persona, Scratch};

use super::StepWork;

/// What other agents can see of one agent.
#[derive(Debug, Clone, PartialEq)]
pub struct RosterEntry {
    pub id: AgentId,
    pub entity: Entity,
    pub name: String,
    pub tile: Coord,
    pub activity: String,
    pub place: Option<Address>,
    pub action_end: SimTime,
    pub sleeping: bool,
    pub waiting: bool,
    pub conversation: Option<u64>,
}

impl RosterEntry {
    /// Whether the agent could be asked into a conversation.
    pub fn is_available(&self) -> bool {
        !self.sleeping && !self.waiting && self.conversation.is_none()
    }
}

/// Resource: every agent, sorted by id.
#[derive(Resource, Debug, Default)]
pub struct AgentRoster {
    entries: Vec<RosterEntry>,
}

impl AgentRoster {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn rebuild(&mut self, mut entries: Vec<RosterEntry>) {
        entries.sort_by(|a, b| a.id.cmp(&b.id));
        self.entries = entries;
    }

    pub fn iter(&self) -> impl Iterator<Item = &RosterEntry> {
        self.entries.iter()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn get(&self, id: &str) -> Option<&RosterEntry> {
        self.entries
            .binary_search_by(|e| e.id.as_str().cmp(id))
            .ok()
            .map(|i| &self.entries[i])
    }

    pub fn entity(&self, id: &str) -> Option<Entity> {
        self.get(id).map(|e| e.entity)
    }

    /// Entities in pipeline order.
    pub fn entities(&self) -> Vec<Entity> {
        self.entries.iter().map(|e| e.entity).collect()
    }

    pub fn names(&self) -> BTreeMap<AgentId, String> {
        self.entries
            .iter()
            .map(|e| (e.id.clone(), e.name.clone()))
            .collect()
    }

    pub fn name_of(&self, id: &str) -> String {
        self.get(id).map_or_else(|| id.to_string(), |e| e.name.clone())
    }
}

/// System to snapshot every agent and reset the step buffers.
/// Runs first in the pipeline.
pub fn build_roster(
    mut roster: ResMut<AgentRoster>,
    mut work: ResMut<StepWork>,
    query: Query<(Entity, &AgentId, &Persona, &Scratch)>,
) {
    work.clear();
    let entries = query
        .iter()
        .map(|(entity, id, persona, scratch)| RosterEntry {
            id: id.clone(),
            entity,
            name: persona.name.clone(),
            tile: scratch.tile,
            activity: scratch.action.public_description().to_string(),
            place: scratch.action.place().cloned(),
            action_end: scratch.action.end_time(),
            sleeping: scratch.action.is_sleeping(),
            waiting: scratch.action.is_waiting(),
            conversation: scratch.conversation,
        })
        .collect();
    roster.rebuild(entries);
}
