//! Session Snapshots
//!
//! Everything needed to rebuild a running simulation: the grid, every agent's
//! components, open conversations and the clock.

use bevy_ecs::prelude::*;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

use crate::components::{
    AgentId, AssociativeMemory, Conversations, Persona, Scratch, SpatialMemory, WorldGrid,
};
use crate::config::SimConfig;
use crate::error::{SimError, StateCorruptionError};
use crate::systems::SimClock;

/// Snapshot format version.
pub const SNAPSHOT_VERSION: u32 = 1;

/// File name of a saved session inside its directory.
pub const SNAPSHOT_FILE: &str = "snapshot.json";

/// One agent's persisted components.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AgentSnapshot {
    pub id: AgentId,
    pub persona: Persona,
    pub scratch: Scratch,
    pub spatial: SpatialMemory,
    pub memory: AssociativeMemory,
}

/// A complete saved session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionSnapshot {
    pub version: u32,
    pub seed: u64,
    pub config: SimConfig,
    pub clock: SimClock,
    pub grid: WorldGrid,
    pub conversations: Conversations,
    /// Sorted by agent id.
    pub agents: Vec<AgentSnapshot>,
}

impl SessionSnapshot {
    /// Captures the current state of `world`.
    pub fn capture(world: &mut World, seed: u64) -> Self {
        let mut query = world.query::<(
            &AgentId,
            &Persona,
            &Scratch,
            &SpatialMemory,
            &AssociativeMemory,
        )>();
        let mut agents: Vec<AgentSnapshot> = query
            .iter(world)
            .map(|(id, persona, scratch, spatial, memory)| AgentSnapshot {
                id: id.clone(),
                persona: persona.clone(),
                scratch: scratch.clone(),
                spatial: spatial.clone(),
                memory: memory.clone(),
            })
            .collect();
        agents.sort_by(|a, b| a.id.cmp(&b.id));

        Self {
            version: SNAPSHOT_VERSION,
            seed,
            config: world.resource::<SimConfig>().clone(),
            clock: *world.resource::<SimClock>(),
            grid: world.resource::<WorldGrid>().clone(),
            conversations: world.resource::<Conversations>().clone(),
            agents,
        }
    }

    pub fn agent(&self, id: &str) -> Option<&AgentSnapshot> {
        self.agents.iter().find(|a| a.id.as_str() == id)
    }

    /// Checks memory ordering and that conversations and agents agree.
    pub fn validate(&self) -> Result<(), StateCorruptionError> {
        for agent in &self.agents {
            agent.memory.validate()?;
            if let Some(conversation) = agent.scratch.conversation {
                let joined = self
                    .conversations
                    .get(conversation)
                    .is_some_and(|c| c.involves(&agent.id));
                if !joined {
                    return Err(StateCorruptionError::ConversationMismatch {
                        agent: agent.id.0.clone(),
                        conversation,
                    });
                }
            }
            if self.conversations.involving(&agent.id).len() > 1 {
                return Err(StateCorruptionError::DoubleBooked {
                    agent: agent.id.0.clone(),
                });
            }
        }
        for conversation in self.conversations.iter() {
            for participant in &conversation.participants {
                let consistent = self
                    .agent(participant.as_str())
                    .is_some_and(|a| a.scratch.conversation == Some(conversation.id));
                if !consistent {
                    return Err(StateCorruptionError::ConversationMismatch {
                        agent: participant.0.clone(),
                        conversation: conversation.id,
                    });
                }
            }
        }
        Ok(())
    }

    pub fn path(dir: &Path, name: &str) -> PathBuf {
        dir.join(name).join(SNAPSHOT_FILE)
    }

    /// Writes the snapshot to `<dir>/<name>/snapshot.json`.
    pub fn save(&self, dir: &Path, name: &str) -> Result<PathBuf, SimError> {
        let path = Self::path(dir, name);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        let json = serde_json::to_string_pretty(self)?;
        fs::write(&path, json)?;
        Ok(path)
    }

    /// Reads and validates `<dir>/<name>/snapshot.json`.
    pub fn load(dir: &Path, name: &str) -> Result<Self, SimError> {
        let path = Self::path(dir, name);
        if !path.exists() {
            return Err(SimError::SessionNotFound(path));
        }
        let json = fs::read_to_string(&path)?;
        let snapshot: SessionSnapshot = serde_json::from_str(&json)?;
        snapshot.validate()?;
        Ok(snapshot)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::components::{Address, CognitiveParams, NewMemory, Triple};
    use town_events::{Coord, SimTime};

    fn world() -> World {
        let mut world = World::new();
        let town: Address = "town".parse().unwrap();
        world.insert_resource(SimConfig::default());
        world.insert_resource(SimClock::new(SimTime::new(1, 8, 0), 10));
        world.insert_resource(WorldGrid::new(4, 4, &town));
        world.insert_resource(Conversations::new());
        for (id, x) in [("bo", 1), ("ada", 2)] {
            let home: Address = "town:Home".parse().unwrap();
            let mut memory = AssociativeMemory::new();
            memory.add(NewMemory::observation(
                SimTime::new(1, 8, 0),
                Triple::new(id, "is", "awake"),
                format!("{} is awake", id),
                2.0,
            ));
            world.spawn((
                AgentId::new(id),
                Persona::new(id, home.clone()),
                Scratch::new(CognitiveParams::default(), Coord::new(x, 0)),
                SpatialMemory::new(&home),
                memory,
            ));
        }
        world
    }

    #[test]
    fn test_capture_sorts_agents() {
        let mut world = world();
        let snapshot = SessionSnapshot::capture(&mut world, 7);
        let ids: Vec<&str> = snapshot.agents.iter().map(|a| a.id.as_str()).collect();
        assert_eq!(ids, vec!["ada", "bo"]);
        assert_eq!(snapshot.seed, 7);
        assert_eq!(snapshot.version, SNAPSHOT_VERSION);
        assert!(snapshot.validate().is_ok());
    }

    #[test]
    fn test_save_and_load() {
        let dir = tempfile::tempdir().unwrap();
        let mut world = world();
        let snapshot = SessionSnapshot::capture(&mut world, 7);
        let path = snapshot.save(dir.path(), "morning").unwrap();
        assert!(path.ends_with("morning/snapshot.json"));

        let loaded = SessionSnapshot::load(dir.path(), "morning").unwrap();
        assert_eq!(loaded, snapshot);
    }

    #[test]
    fn test_missing_session() {
        let dir = tempfile::tempdir().unwrap();
        assert!(matches!(
            SessionSnapshot::load(dir.path(), "nope"),
            Err(SimError::SessionNotFound(_))
        ));
    }

    #[test]
    fn test_dangling_conversation_is_corruption() {
        let mut world = world();
        let mut snapshot = SessionSnapshot::capture(&mut world, 7);
        snapshot.agents[0].scratch.conversation = Some(3);
        assert!(matches!(
            snapshot.validate(),
            Err(StateCorruptionError::ConversationMismatch { conversation: 3, .. })
        ));
    }

    #[test]
    fn test_one_sided_conversation_is_corruption() {
        let mut world = world();
        let mut snapshot = SessionSnapshot::capture(&mut world, 7);
        let id = snapshot.conversations.open(
            AgentId::new("ada"),
            AgentId::new("bo"),
            SimTime::new(1, 8, 0),
        );
        snapshot.agents[0].scratch.conversation = Some(id);
        assert!(matches!(
            snapshot.validate(),
            Err(StateCorruptionError::ConversationMismatch { ref agent, .. }) if agent == "bo"
        ));
    }
}
