//! Retrieval System
//!
//! Recalls what an agent already knows about each event it just perceived.

use bevy_ecs::prelude::*;
use town_events::SimTime;

use crate::components::{AgentId, AssociativeMemory, MemoryKind, MemoryQuery, Scratch};
use crate::config::SimConfig;
use crate::generation::Capabilities;
use crate::scoring::{RetrievalParams, ScoringStrategy};

use super::{AgentRoster, Perceived, Scoring, SimClock, StepWork};

/// Memories recalled for one perceived event.
#[derive(Debug, Clone, PartialEq)]
pub struct RetrievedContext {
    pub focus: Perceived,
    /// Observation and chat descriptions, best first.
    pub events: Vec<String>,
    /// Thought descriptions, best first.
    pub thoughts: Vec<String>,
}

impl RetrievedContext {
    /// Events then thoughts, for prompts.
    pub fn statements(&self) -> Vec<String> {
        self.events.iter().chain(&self.thoughts).cloned().collect()
    }
}

/// Keyword retrieval on the event's subject, predicate and object.
#[allow(clippy::too_many_arguments)]
pub fn retrieve_context(
    memory: &AssociativeMemory,
    focus: &Perceived,
    embedding: Option<Vec<f32>>,
    now: SimTime,
    event_k: usize,
    thought_k: usize,
    params: &RetrievalParams,
    strategy: &dyn ScoringStrategy,
) -> RetrievedContext {
    let terms = focus.event.triple.query_terms();
    let describe = |kinds: &[MemoryKind], k: usize| -> Vec<String> {
        let query = MemoryQuery::terms(&terms)
            .with_embedding(embedding.clone())
            .of_kinds(kinds);
        memory
            .retrieve(&query, now, k, params, strategy)
            .into_iter()
            .map(|n| n.description.clone())
            .collect()
    };
    RetrievedContext {
        focus: focus.clone(),
        events: describe(&[MemoryKind::Observation, MemoryKind::Chat], event_k),
        thoughts: describe(&[MemoryKind::Thought], thought_k),
    }
}

/// System to build a context bundle for every perceived event.
pub fn retrieve(
    roster: Res<AgentRoster>,
    caps: Res<Capabilities>,
    config: Res<SimConfig>,
    clock: Res<SimClock>,
    scoring: Res<Scoring>,
    mut work: ResMut<StepWork>,
    agents: Query<(&AgentId, &Scratch, &AssociativeMemory)>,
) {
    let global = config.retrieval.global();
    for entry in roster.iter() {
        let Ok((id, scratch, memory)) = agents.get(entry.entity) else {
            continue;
        };
        let Some(perceived) = work.perceived.get(id) else {
            continue;
        };
        let params = scratch.params.retrieval(&global);
        let contexts: Vec<RetrievedContext> = perceived
            .iter()
            .map(|focus| {
                retrieve_context(
                    memory,
                    focus,
                    caps.embed(&focus.event.description),
                    clock.now(),
                    config.retrieval.event_k,
                    config.retrieval.thought_k,
                    &params,
                    scoring.strategy(),
                )
            })
            .collect();
        work.retrieved.insert(id.clone(), contexts);
    }
}
