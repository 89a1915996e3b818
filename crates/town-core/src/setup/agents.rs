//! Agent Spawning
//!
//! Reads agent bootstraps (identity, cognitive parameters, known places,
//! starting memories, spawn point) and spawns one entity per agent.

use bevy_ecs::prelude::*;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::path::Path;
use town_events::{Coord, SimTime};
use tracing::{debug, info};

use crate::components::spatial::WorldTree;
use crate::components::{
    Address, AgentId, AssociativeMemory, CognitiveParams, MemoryKind, NewMemory, Persona, Scratch,
    SpatialMemory, Triple, WorldGrid,
};
use crate::error::ConfigurationError;
use crate::generation::Capabilities;

/// Where an agent starts: a named spawn tile or explicit coordinates.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum SpawnPoint {
    Named(String),
    At(Coord),
}

/// A memory the agent starts with.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SeedMemory {
    pub description: String,
    #[serde(default = "default_seed_kind")]
    pub kind: MemoryKind,
    #[serde(default)]
    pub poignancy: Option<f32>,
    #[serde(default)]
    pub triple: Option<Triple>,
}

fn default_seed_kind() -> MemoryKind {
    MemoryKind::Thought
}

impl SeedMemory {
    pub fn new(description: impl Into<String>) -> Self {
        Self {
            description: description.into(),
            kind: MemoryKind::Thought,
            poignancy: None,
            triple: None,
        }
    }
}

/// Everything needed to create one agent.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AgentBootstrap {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub age: u32,
    #[serde(default)]
    pub innate: String,
    #[serde(default)]
    pub learned: String,
    #[serde(default)]
    pub currently: String,
    #[serde(default)]
    pub lifestyle: String,
    pub living_area: Address,
    #[serde(default)]
    pub params: CognitiveParams,
    /// Places known from the start, beyond the living area.
    #[serde(default)]
    pub spatial: WorldTree,
    #[serde(default)]
    pub memories: Vec<SeedMemory>,
    pub spawn: SpawnPoint,
}

impl AgentBootstrap {
    pub fn persona(&self) -> Persona {
        Persona {
            name: self.name.clone(),
            age: self.age,
            innate: self.innate.clone(),
            learned: self.learned.clone(),
            currently: self.currently.clone(),
            lifestyle: self.lifestyle.clone(),
            living_area: self.living_area.clone(),
        }
    }

    pub fn validate(&self) -> Result<(), ConfigurationError> {
        let invalid = |reason: &str| ConfigurationError::InvalidAgent {
            agent: self.id.clone(),
            reason: reason.to_string(),
        };
        if self.id.trim().is_empty() {
            return Err(invalid("id must not be empty"));
        }
        if self.name.trim().is_empty() {
            return Err(invalid("name must not be empty"));
        }
        if self.living_area.sector().is_none() {
            return Err(invalid("living area must name at least a sector"));
        }
        self.params.validate(&self.id)
    }

    /// Resolves the spawn tile against the grid.
    pub fn spawn_tile(&self, grid: &WorldGrid) -> Result<Coord, ConfigurationError> {
        let tile = match &self.spawn {
            SpawnPoint::Named(name) => grid.spawn_point(name).ok_or_else(|| {
                ConfigurationError::InvalidAgent {
                    agent: self.id.clone(),
                    reason: format!("unknown spawn point {}", name),
                }
            })?,
            SpawnPoint::At(at) => *at,
        };
        if !grid.is_walkable(tile) {
            return Err(ConfigurationError::InvalidAgent {
                agent: self.id.clone(),
                reason: format!("spawn tile {} is not walkable", tile),
            });
        }
        Ok(tile)
    }
}

/// Checks every bootstrap and rejects duplicate ids.
pub fn validate_agents(agents: &[AgentBootstrap]) -> Result<(), ConfigurationError> {
    let mut seen = BTreeSet::new();
    for agent in agents {
        agent.validate()?;
        if !seen.insert(agent.id.as_str()) {
            return Err(ConfigurationError::DuplicateAgent(agent.id.clone()));
        }
    }
    Ok(())
}

/// Builds the starting memory store.
pub fn seed_memory(
    agent: &AgentBootstrap,
    start: SimTime,
    fallback_poignancy: f32,
    caps: &Capabilities,
) -> AssociativeMemory {
    let mut memory = AssociativeMemory::new();
    for seed in &agent.memories {
        let triple = seed
            .triple
            .clone()
            .unwrap_or_else(|| Triple::new(agent.id.as_str(), "is", seed.description.as_str()));
        let poignancy = seed.poignancy.unwrap_or(fallback_poignancy);
        memory.add(
            NewMemory::new(seed.kind, start, triple, seed.description.clone(), poignancy)
                .with_embedding(caps.embed(&seed.description)),
        );
    }
    memory
}

/// Spawns every agent. The grid must already be built.
pub fn spawn_agents(
    world: &mut World,
    grid: &WorldGrid,
    agents: &[AgentBootstrap],
    start: SimTime,
    fallback_poignancy: f32,
    caps: &Capabilities,
) -> Result<Vec<Entity>, ConfigurationError> {
    validate_agents(agents)?;
    let mut entities = Vec::with_capacity(agents.len());
    for agent in agents {
        if grid.tiles_in(&agent.living_area).is_empty() {
            return Err(ConfigurationError::InvalidAgent {
                agent: agent.id.clone(),
                reason: format!("living area {} is not on the map", agent.living_area),
            });
        }
        let tile = agent.spawn_tile(grid)?;
        let mut spatial = SpatialMemory::from_tree(agent.spatial.clone(), &agent.living_area);
        if let Some(here) = grid.tile(tile) {
            spatial.observe(&here.address);
        }
        let memory = seed_memory(agent, start, fallback_poignancy, caps);
        debug!("Spawning {} at {} with {} memories", agent.id, tile, memory.len());

        let entity = world
            .spawn((
                AgentId::new(agent.id.as_str()),
                agent.persona(),
                Scratch::new(agent.params, tile),
                spatial,
                memory,
            ))
            .id();
        entities.push(entity);
    }
    info!("Spawned {} agents", entities.len());
    Ok(entities)
}

/// Reads a JSON list of agent bootstraps.
pub fn load_agents(path: &Path) -> Result<Vec<AgentBootstrap>, ConfigurationError> {
    let content = std::fs::read_to_string(path).map_err(|source| ConfigurationError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    let agents: Vec<AgentBootstrap> =
        serde_json::from_str(&content).map_err(|source| ConfigurationError::Json {
            path: path.to_path_buf(),
            source,
        })?;
    validate_agents(&agents)?;
    Ok(agents)
}
