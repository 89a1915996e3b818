//! ECS Systems
//!
//! The per-step cognitive pipeline. Each system walks the `AgentRoster` in
//! ascending `AgentId` order and hands the components it needs to a plain
//! function, so every stage can also be driven directly in tests.

pub mod act;
pub mod commit;
pub mod converse;
pub mod perceive;
pub mod plan;
pub mod reflect;
pub mod retrieve;
pub mod roster;

use bevy_ecs::prelude::*;
use bevy_ecs::schedule::ExecutorKind;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use town_events::{ChatLine, SimTime, SimTimestamp, StepFrame};

use crate::components::{AgentId, CognitiveParams, Persona, Triple};
use crate::config::SimConfig;
use crate::error::StateCorruptionError;
use crate::generation::{prompts, Capabilities};
use crate::scoring::{RetrievalParams, ScoringStrategy, StrategyKind};

pub use act::{act, advance_agent, stage_agent, StagedAgent};
pub use commit::{agent_frame, annotate_agent, commit};
pub use converse::{advance_conversations, resolve_conversations, ChatRequest};
pub use perceive::{perceive, perceive_agent, Perceived};
pub use plan::plan;
pub use reflect::{
    reflect, Composite, DailyAt, ImportanceThreshold, ReflectionPolicy, ReflectionTrigger,
};
pub use retrieve::{retrieve, retrieve_context, RetrievedContext};
pub use roster::{build_roster, AgentRoster, RosterEntry};

/// Resource: simulated time of the step being run.
#[derive(Resource, Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SimClock {
    pub current: SimTimestamp,
    pub seconds_per_step: u64,
}

impl SimClock {
    pub fn new(start: SimTime, seconds_per_step: u64) -> Self {
        Self {
            current: SimTimestamp::start(start),
            seconds_per_step,
        }
    }

    pub fn now(&self) -> SimTime {
        self.current.time
    }

    pub fn step(&self) -> u64 {
        self.current.step
    }

    pub fn advance(&mut self) {
        self.current.advance(self.seconds_per_step);
    }
}

/// Rates how poignant a memory is, falling back to `fallback` when the
/// generator gives no usable answer.
pub fn rate_poignancy(
    persona: &Persona,
    what: &str,
    description: &str,
    caps: &Capabilities,
    fallback: f32,
) -> f32 {
    let prompt = prompts::poignancy(persona, what, description);
    caps.ask_parsed(&prompt, prompts::parse_poignancy)
        .unwrap_or_else(|err| {
            tracing::warn!("{}: poignancy fallback for {:?}: {}", persona.name, description, err);
            fallback
        })
}

/// Read-only inputs shared by the planning, reflection and conversation stages.
#[derive(Clone, Copy)]
pub struct StepEnv<'a> {
    pub caps: &'a Capabilities,
    pub config: &'a SimConfig,
    pub strategy: &'a dyn ScoringStrategy,
    pub now: SimTime,
}

impl<'a> StepEnv<'a> {
    pub fn retrieval(&self, params: &CognitiveParams) -> RetrievalParams {
        params.retrieval(&self.config.retrieval.global())
    }

    pub fn rate(&self, persona: &Persona, what: &str, description: &str) -> f32 {
        rate_poignancy(
            persona,
            what,
            description,
            self.caps,
            self.config.perception.fallback_poignancy,
        )
    }

    /// Subject / predicate / object for something `agent` did or thought.
    /// The subject is always the agent's id.
    pub fn triple(&self, agent: &AgentId, persona: &Persona, description: &str) -> Triple {
        let prompt = prompts::event_triple(&persona.name, description);
        let mut triple = self
            .caps
            .ask_parsed(&prompt, prompts::parse_triple)
            .unwrap_or_else(|_| Triple::new(agent.as_str(), "is", description));
        triple.subject = agent.0.clone();
        triple
    }

    pub fn thought_expiration(&self) -> SimTime {
        self.now.plus_days(self.config.planning.thought_expiration_days)
    }
}

/// Resource: the scoring strategy used by every retrieval.
#[derive(Resource, Debug)]
pub struct Scoring(pub Box<dyn ScoringStrategy>);

impl Scoring {
    pub fn new(kind: StrategyKind) -> Self {
        Self(kind.build())
    }

    pub fn strategy(&self) -> &dyn ScoringStrategy {
        self.0.as_ref()
    }
}

/// Resource: scratch buffers handed from one pipeline stage to the next.
/// Rebuilt at the start of every step.
#[derive(Resource, Debug, Default)]
pub struct StepWork {
    pub perceived: BTreeMap<AgentId, Vec<Perceived>>,
    pub retrieved: BTreeMap<AgentId, Vec<RetrievedContext>>,
    /// Conversation requests in the order they were made.
    pub chat_requests: Vec<ChatRequest>,
    /// Transcript lines to show in this step's frame.
    pub chat_lines: BTreeMap<AgentId, Vec<ChatLine>>,
    pub staged: Vec<StagedAgent>,
    pub frame: Option<StepFrame>,
}

impl StepWork {
    pub fn clear(&mut self) {
        *self = Self::default();
    }
}

/// Resource: state corruption found while running the schedule.
#[derive(Resource, Debug, Default)]
pub struct FaultLog {
    faults: Vec<StateCorruptionError>,
}

impl FaultLog {
    pub fn push(&mut self, fault: StateCorruptionError) {
        tracing::error!("State corruption: {}", fault);
        self.faults.push(fault);
    }

    pub fn is_empty(&self) -> bool {
        self.faults.is_empty()
    }

    /// Removes and returns the first fault, discarding the rest.
    pub fn take_first(&mut self) -> Option<StateCorruptionError> {
        let first = self.faults.drain(..).next();
        self.faults.clear();
        first
    }
}

/// The pipeline, in order. Runs single-threaded so agent order is fixed.
pub fn build_schedule() -> Schedule {
    let mut schedule = Schedule::default();
    schedule.set_executor_kind(ExecutorKind::SingleThreaded);
    schedule.add_systems(
        (
            build_roster,
            perceive,
            retrieve,
            plan,
            resolve_conversations,
            reflect,
            advance_conversations,
            act,
            commit,
        )
            .chain(),
    );
    schedule
}
