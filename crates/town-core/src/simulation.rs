//! Simulation Driver
//!
//! Owns the ECS world and the pipeline schedule. Each `step` runs every agent
//! through perceive, retrieve, plan, reflect and act, commits the results to
//! the grid, logs the step's frame and advances the clock.

use bevy_ecs::prelude::*;
use std::path::{Path, PathBuf};
use town_events::{SimTime, StepFrame};
use tracing::{debug, error, info, warn};

use crate::components::{
    AgentId, AssociativeMemory, Conversations, MemoryKind, NewMemory, Persona, Scratch,
    SpatialMemory, Triple, WorldGrid,
};
use crate::config::SimConfig;
use crate::error::{SimError, StateCorruptionError};
use crate::events::FrameLogger;
use crate::generation::{prompts, Capabilities};
use crate::interventions::{Command, CommandOutcome, MemoryBatch};
use crate::output::SessionSnapshot;
use crate::setup::{spawn_agents, AgentBootstrap};
use crate::systems::{
    annotate_agent, build_schedule, stage_agent, AgentRoster, FaultLog, ReflectionPolicy,
    Scoring, SimClock, StepEnv, StepWork,
};
use crate::SimRng;

/// Directory saved sessions go to unless told otherwise.
pub const DEFAULT_SESSIONS_DIR: &str = "sessions";

pub struct Simulation {
    world: World,
    schedule: Schedule,
    seed: u64,
    sessions_dir: PathBuf,
    halted: Option<StateCorruptionError>,
}

/// Resources every session needs, whether fresh or resumed.
fn insert_resources(world: &mut World, config: SimConfig, caps: Capabilities, seed: u64) {
    world.insert_resource(Scoring::new(config.retrieval.strategy));
    world.insert_resource(ReflectionPolicy::from_config(&config.planning));
    world.insert_resource(config);
    world.insert_resource(caps);
    world.insert_resource(AgentRoster::new());
    world.insert_resource(StepWork::default());
    world.insert_resource(FaultLog::default());
    world.insert_resource(SimRng::for_step(seed, 0));
    world.insert_resource(FrameLogger::null());
}

/// Places every agent on the grid as it stands before the first step.
fn annotate_all(world: &mut World) -> Result<(), StateCorruptionError> {
    let mut query = world.query::<(&AgentId, &Persona, &Scratch)>();
    let mut staged: Vec<_> = query
        .iter(world)
        .map(|(id, persona, scratch)| stage_agent(id, persona, scratch))
        .collect();
    staged.sort_by(|a, b| a.id.cmp(&b.id));

    let mut grid = world.resource_mut::<WorldGrid>();
    grid.clear_annotations();
    for agent in &staged {
        annotate_agent(&mut grid, agent)?;
    }
    Ok(())
}

impl Simulation {
    /// Builds a fresh session from a grid and agent bootstraps.
    pub fn new(
        grid: WorldGrid,
        agents: &[AgentBootstrap],
        config: SimConfig,
        caps: Capabilities,
    ) -> Result<Self, SimError> {
        config.validate()?;
        let seed = config.clock.seed;
        let start = config.clock.start_time();
        let mut world = World::new();
        spawn_agents(
            &mut world,
            &grid,
            agents,
            start,
            config.perception.fallback_poignancy,
            &caps,
        )?;
        world.insert_resource(SimClock::new(start, config.clock.seconds_per_step));
        world.insert_resource(grid);
        world.insert_resource(Conversations::new());
        insert_resources(&mut world, config, caps, seed);
        annotate_all(&mut world)?;

        info!("Simulation ready: {} agents, seed {}", agents.len(), seed);
        Ok(Self {
            world,
            schedule: build_schedule(),
            seed,
            sessions_dir: PathBuf::from(DEFAULT_SESSIONS_DIR),
            halted: None,
        })
    }

    /// Rebuilds a session from a snapshot.
    pub fn from_snapshot(snapshot: SessionSnapshot, caps: Capabilities) -> Result<Self, SimError> {
        snapshot.validate()?;
        snapshot.config.validate()?;
        let mut world = World::new();
        for agent in snapshot.agents {
            world.spawn((
                agent.id,
                agent.persona,
                agent.scratch,
                agent.spatial,
                agent.memory,
            ));
        }
        world.insert_resource(snapshot.clock);
        world.insert_resource(snapshot.grid);
        world.insert_resource(snapshot.conversations);
        insert_resources(&mut world, snapshot.config, caps, snapshot.seed);

        info!(
            "Session restored at step {} ({})",
            snapshot.clock.step(),
            snapshot.clock.now()
        );
        Ok(Self {
            world,
            schedule: build_schedule(),
            seed: snapshot.seed,
            sessions_dir: PathBuf::from(DEFAULT_SESSIONS_DIR),
            halted: None,
        })
    }

    pub fn with_frame_logger(mut self, logger: FrameLogger) -> Self {
        self.world.insert_resource(logger);
        self
    }

    pub fn with_sessions_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.sessions_dir = dir.into();
        self
    }

    /// Runs one step and returns its frame. After state corruption the
    /// simulation stays halted and every further step fails.
    pub fn step(&mut self) -> Result<StepFrame, SimError> {
        if let Some(fault) = &self.halted {
            return Err(fault.clone().into());
        }
        let clock = *self.world.resource::<SimClock>();
        self.world
            .insert_resource(SimRng::for_step(self.seed, clock.step()));
        self.schedule.run(&mut self.world);

        if let Some(fault) = self.world.resource_mut::<FaultLog>().take_first() {
            error!("Simulation halted at step {}: {}", clock.step(), fault);
            self.halted = Some(fault.clone());
            return Err(fault.into());
        }

        let frame = self
            .world
            .resource_mut::<StepWork>()
            .frame
            .take()
            .unwrap_or_else(|| StepFrame::new(clock.step(), clock.now()));
        self.world.resource_mut::<FrameLogger>().log(&frame)?;
        self.world.resource_mut::<SimClock>().advance();
        debug!("Step {} done ({})", frame.step, frame.time);
        Ok(frame)
    }

    /// Runs `steps` steps. Returns how many ran.
    pub fn run(&mut self, steps: u64) -> Result<u64, SimError> {
        for done in 0..steps {
            if let Err(err) = self.step() {
                warn!("Run stopped after {} of {} steps", done, steps);
                return Err(err);
            }
        }
        self.world.resource_mut::<FrameLogger>().flush()?;
        Ok(steps)
    }

    pub fn snapshot(&mut self) -> SessionSnapshot {
        SessionSnapshot::capture(&mut self.world, self.seed)
    }

    /// Saves the session under `name` in the sessions directory.
    pub fn save(&mut self, name: &str) -> Result<PathBuf, SimError> {
        self.world.resource_mut::<FrameLogger>().flush()?;
        let path = self.snapshot().save(&self.sessions_dir, name)?;
        info!("Saved session {} to {}", name, path.display());
        Ok(path)
    }

    /// Replaces the running session with the one saved under `name`. The
    /// frame logger and capabilities carry over.
    pub fn resume(&mut self, name: &str) -> Result<u64, SimError> {
        let snapshot = SessionSnapshot::load(&self.sessions_dir, name)?;
        let caps = self.world.resource::<Capabilities>().clone();
        let logger = self.world.remove_resource::<FrameLogger>();
        let mut resumed = Self::from_snapshot(snapshot, caps)?
            .with_sessions_dir(self.sessions_dir.clone());
        if let Some(logger) = logger {
            resumed = resumed.with_frame_logger(logger);
        }
        *self = resumed;
        Ok(self.clock().step())
    }

    /// Applies one control command between steps.
    pub fn apply(&mut self, command: Command) -> Result<CommandOutcome, SimError> {
        match command {
            Command::Advance { steps } => {
                let steps = self.run(steps)?;
                Ok(CommandOutcome::Advanced { steps })
            }
            Command::Save { name } => Ok(CommandOutcome::Saved {
                path: self.save(&name)?,
            }),
            Command::Resume { name } => Ok(CommandOutcome::Resumed {
                step: self.resume(&name)?,
            }),
            Command::InjectMemories { batches } => Ok(CommandOutcome::Injected {
                memories: self.inject(&batches)?,
            }),
            Command::Whisper { agent, text } => Ok(CommandOutcome::Whispered {
                node: self.whisper(&agent, &text)?,
            }),
        }
    }

    fn agent_entity(&mut self, agent: &str) -> Result<Entity, SimError> {
        let mut query = self.world.query::<(Entity, &AgentId)>();
        query
            .iter(&self.world)
            .find(|(_, id)| id.as_str() == agent)
            .map(|(entity, _)| entity)
            .ok_or_else(|| SimError::UnknownAgent(agent.to_string()))
    }

    fn step_env(&self) -> StepEnv<'_> {
        StepEnv {
            caps: self.world.resource::<Capabilities>(),
            config: self.world.resource::<SimConfig>(),
            strategy: self.world.resource::<Scoring>().strategy(),
            now: self.clock().now(),
        }
    }

    /// Stores a memory for the agent behind `entity` and counts it toward
    /// reflection.
    fn remember(&mut self, entity: Entity, memory: NewMemory) -> Result<String, SimError> {
        let poignancy = memory.poignancy;
        let node = self
            .world
            .get_mut::<AssociativeMemory>(entity)
            .map(|mut store| store.add(memory))
            .ok_or_else(|| SimError::UnknownAgent(format!("{:?}", entity)))?;
        if let Some(mut scratch) = self.world.get_mut::<Scratch>(entity) {
            scratch.importance.record(poignancy);
        }
        Ok(node)
    }

    /// Adds memories to agents as of now. Batches for unknown agents fail the
    /// whole command before anything is stored.
    pub fn inject(&mut self, batches: &[MemoryBatch]) -> Result<usize, SimError> {
        let mut targets = Vec::with_capacity(batches.len());
        for batch in batches {
            let entity = self.agent_entity(&batch.agent)?;
            let persona = self
                .world
                .get::<Persona>(entity)
                .cloned()
                .ok_or_else(|| SimError::UnknownAgent(batch.agent.clone()))?;
            targets.push((entity, persona));
        }

        let mut stored = 0;
        for (batch, (entity, persona)) in batches.iter().zip(targets) {
            let memories: Vec<NewMemory> = {
                let env = self.step_env();
                batch
                    .memories
                    .iter()
                    .map(|seed| {
                        let what = match seed.kind {
                            MemoryKind::Observation => "event",
                            MemoryKind::Thought => "thought",
                            MemoryKind::Chat => "chat",
                        };
                        let triple = seed.triple.clone().unwrap_or_else(|| {
                            Triple::new(batch.agent.as_str(), "is", seed.description.as_str())
                        });
                        let poignancy = seed
                            .poignancy
                            .unwrap_or_else(|| env.rate(&persona, what, &seed.description));
                        NewMemory::new(seed.kind, env.now, triple, seed.description.clone(), poignancy)
                            .with_embedding(env.caps.embed(&seed.description))
                    })
                    .collect()
            };
            for memory in memories {
                self.remember(entity, memory)?;
                stored += 1;
            }
        }
        info!("Injected {} memories", stored);
        Ok(stored)
    }

    /// Turns `text` into an inner thought of `agent`. Returns the new node id.
    pub fn whisper(&mut self, agent: &str, text: &str) -> Result<String, SimError> {
        let entity = self.agent_entity(agent)?;
        let persona = self
            .world
            .get::<Persona>(entity)
            .cloned()
            .ok_or_else(|| SimError::UnknownAgent(agent.to_string()))?;
        let id = AgentId::new(agent);

        let memory = {
            let env = self.step_env();
            let thought = env
                .caps
                .ask_text(&prompts::whisper_thought(&persona, text))
                .unwrap_or_else(|err| {
                    warn!("{}: whisper kept verbatim: {}", persona.name, err);
                    text.to_string()
                });
            let triple = env.triple(&id, &persona, &thought);
            let poignancy = env.rate(&persona, "thought", &thought);
            NewMemory::thought(env.now, triple, thought.clone(), poignancy)
                .with_embedding(env.caps.embed(&thought))
                .expires(env.thought_expiration())
        };
        let node = self.remember(entity, memory)?;
        info!("Whispered to {}: {}", persona.name, text);
        Ok(node)
    }

    pub fn world(&self) -> &World {
        &self.world
    }

    pub fn world_mut(&mut self) -> &mut World {
        &mut self.world
    }

    pub fn seed(&self) -> u64 {
        self.seed
    }

    pub fn clock(&self) -> SimClock {
        *self.world.resource::<SimClock>()
    }

    pub fn now(&self) -> SimTime {
        self.clock().now()
    }

    pub fn sessions_dir(&self) -> &Path {
        &self.sessions_dir
    }

    pub fn halted(&self) -> Option<&StateCorruptionError> {
        self.halted.as_ref()
    }

    pub fn grid(&self) -> &WorldGrid {
        self.world.resource::<WorldGrid>()
    }

    pub fn conversations(&self) -> &Conversations {
        self.world.resource::<Conversations>()
    }

    /// Agent ids in ascending order.
    pub fn agent_ids(&self) -> Vec<AgentId> {
        let mut ids: Vec<AgentId> = self
            .world
            .iter_entities()
            .filter_map(|e| e.get::<AgentId>().cloned())
            .collect();
        ids.sort();
        ids
    }

    fn component<T: Component>(&self, agent: &str) -> Option<&T> {
        self.world
            .iter_entities()
            .find(|e| e.get::<AgentId>().is_some_and(|id| id.as_str() == agent))
            .and_then(|e| e.get::<T>())
    }

    pub fn persona(&self, agent: &str) -> Option<&Persona> {
        self.component(agent)
    }

    pub fn scratch(&self, agent: &str) -> Option<&Scratch> {
        self.component(agent)
    }

    pub fn spatial(&self, agent: &str) -> Option<&SpatialMemory> {
        self.component(agent)
    }

    pub fn memory(&self, agent: &str) -> Option<&AssociativeMemory> {
        self.component(agent)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fixtures;
    use crate::setup::SeedMemory;

    fn simulation() -> Simulation {
        Simulation::new(
            fixtures::town_grid(),
            &fixtures::bootstraps(),
            fixtures::test_config(),
            Capabilities::offline(),
        )
        .unwrap()
    }

    #[test]
    fn test_agents_annotated_before_first_step() {
        let sim = simulation();
        let tile = sim.scratch("ada").unwrap().tile;
        assert!(sim.grid().tile(tile).unwrap().occupants.contains_key("ada"));
        assert_eq!(sim.clock().step(), 0);
    }

    #[test]
    fn test_step_advances_clock() {
        let mut sim = simulation();
        let start = sim.now();
        let frame = sim.step().unwrap();
        assert_eq!(frame.step, 0);
        assert_eq!(frame.time, start);
        assert_eq!(frame.agents.len(), 2);
        assert_eq!(sim.clock().step(), 1);
        assert!(sim.now() > start);
    }

    #[test]
    fn test_whisper_stores_thought() {
        let mut sim = simulation();
        let before = sim.scratch("bo").unwrap().importance.curr;
        let node = sim.whisper("bo", "Ada is planning a party").unwrap();

        let memory = sim.memory("bo").unwrap();
        let stored = memory.get(&node).unwrap();
        assert_eq!(stored.kind, MemoryKind::Thought);
        assert_eq!(stored.description, "Ada is planning a party");
        assert_eq!(stored.triple.subject, "bo");
        assert!(stored.expiration.is_some());
        assert!(sim.scratch("bo").unwrap().importance.curr < before);
    }

    #[test]
    fn test_inject_unknown_agent_stores_nothing() {
        let mut sim = simulation();
        let before = sim.memory("ada").unwrap().len();
        let batches = vec![
            MemoryBatch {
                agent: "ada".into(),
                memories: vec![SeedMemory::new("the cafe has a new menu")],
            },
            MemoryBatch {
                agent: "zed".into(),
                memories: vec![SeedMemory::new("nothing")],
            },
        ];
        assert!(matches!(sim.inject(&batches), Err(SimError::UnknownAgent(a)) if a == "zed"));
        assert_eq!(sim.memory("ada").unwrap().len(), before);
    }

    #[test]
    fn test_apply_commands() {
        let dir = tempfile::tempdir().unwrap();
        let mut sim = simulation().with_sessions_dir(dir.path());
        assert_eq!(
            sim.apply(Command::Advance { steps: 2 }).unwrap(),
            CommandOutcome::Advanced { steps: 2 }
        );
        let CommandOutcome::Saved { path } = sim.apply(Command::Save { name: "two".into() }).unwrap() else {
            panic!("expected a save");
        };
        assert!(path.exists());
        sim.run(3).unwrap();
        assert_eq!(
            sim.apply(Command::Resume { name: "two".into() }).unwrap(),
            CommandOutcome::Resumed { step: 2 }
        );
        assert!(matches!(
            sim.apply(Command::Resume { name: "missing".into() }),
            Err(SimError::SessionNotFound(_))
        ));
    }
}
