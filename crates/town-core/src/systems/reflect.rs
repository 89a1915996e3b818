//! Reflection System
//!
//! When its trigger fires, an agent reviews its most salient recent memories
//! and stores the insights it draws from them as thoughts that cite their
//! evidence.

use bevy_ecs::prelude::*;
use std::fmt;
use town_events::SimTime;
use tracing::{info, warn};

use crate::components::{AgentId, AssociativeMemory, Filling, MemoryNode, NewMemory, Persona, Scratch};
use crate::config::{PlanningConfig, SimConfig};
use crate::error::GenerationError;
use crate::generation::{prompts, Capabilities};

use super::{AgentRoster, Scoring, SimClock, StepEnv};

/// Decides when an agent reflects.
pub trait ReflectionTrigger: Send + Sync + fmt::Debug {
    fn name(&self) -> &str;
    fn should_reflect(&self, scratch: &Scratch, now: SimTime) -> bool;
}

/// Fires once enough poignancy has accumulated.
#[derive(Debug, Clone, Copy, Default)]
pub struct ImportanceThreshold;

impl ReflectionTrigger for ImportanceThreshold {
    fn name(&self) -> &str {
        "importance_threshold"
    }

    fn should_reflect(&self, scratch: &Scratch, _now: SimTime) -> bool {
        scratch.importance.is_due()
    }
}

/// Fires once a day, at or after `minute` past midnight.
#[derive(Debug, Clone, Copy)]
pub struct DailyAt {
    pub minute: u32,
}

impl ReflectionTrigger for DailyAt {
    fn name(&self) -> &str {
        "daily"
    }

    fn should_reflect(&self, scratch: &Scratch, now: SimTime) -> bool {
        now.minute_of_day() >= self.minute && scratch.last_daily_reflection != Some(now.day())
    }
}

/// Fires when any of its triggers does.
#[derive(Debug)]
pub struct Composite(pub Vec<Box<dyn ReflectionTrigger>>);

impl ReflectionTrigger for Composite {
    fn name(&self) -> &str {
        "composite"
    }

    fn should_reflect(&self, scratch: &Scratch, now: SimTime) -> bool {
        self.0.iter().any(|t| t.should_reflect(scratch, now))
    }
}

/// Resource: the reflection trigger in use.
#[derive(Resource, Debug)]
pub struct ReflectionPolicy(pub Box<dyn ReflectionTrigger>);

impl ReflectionPolicy {
    pub fn new(trigger: impl ReflectionTrigger + 'static) -> Self {
        Self(Box::new(trigger))
    }

    /// Importance threshold, plus a daily reflection when one is configured.
    pub fn from_config(planning: &PlanningConfig) -> Self {
        match planning.daily_reflection_minute {
            Some(minute) => Self::new(Composite(vec![
                Box::new(ImportanceThreshold),
                Box::new(DailyAt { minute }),
            ])),
            None => Self::new(ImportanceThreshold),
        }
    }

    pub fn should_reflect(&self, scratch: &Scratch, now: SimTime) -> bool {
        self.0.should_reflect(scratch, now)
    }
}

/// The most poignant non-idle memories since the last reflection, oldest
/// first. At least `size` recent memories are considered.
pub fn salient_memories<'m>(memory: &'m AssociativeMemory, scratch: &Scratch, now: SimTime) -> Vec<&'m MemoryNode> {
    let size = scratch.params.daily_reflection_size.max(1);
    let window = (scratch.importance.since_reflection as usize).max(size);
    let mut recent: Vec<&MemoryNode> = memory
        .iter()
        .rev()
        .filter(|n| !n.is_expired(now) && !n.is_idle())
        .take(window)
        .collect();
    recent.sort_by(|a, b| b.poignancy.total_cmp(&a.poignancy).then(b.seq.cmp(&a.seq)));
    recent.truncate(size);
    recent.sort_by_key(|n| n.seq);
    recent
}

/// One reflection. Returns how many insights were stored.
pub fn reflect_agent(
    id: &AgentId,
    persona: &Persona,
    scratch: &Scratch,
    memory: &mut AssociativeMemory,
    env: &StepEnv<'_>,
) -> Result<usize, GenerationError> {
    let evidence: Vec<(String, String)> = salient_memories(memory, scratch, env.now)
        .into_iter()
        .map(|n| (n.id.clone(), n.description.clone()))
        .collect();
    if evidence.is_empty() {
        return Ok(0);
    }
    let statements: Vec<String> = evidence.iter().map(|(_, d)| d.clone()).collect();
    let insights = env.caps.ask_parsed(&prompts::insights(persona, &statements), |out| {
        prompts::parse_insights(out, statements.len())
    })?;

    let count = insights.len();
    for (insight, cited) in insights {
        let triple = env.triple(id, persona, &insight);
        let poignancy = env.rate(persona, "thought", &insight);
        let filling = cited
            .iter()
            .filter_map(|i| evidence.get(*i))
            .map(|(node, _)| Filling::Evidence { node: node.clone() })
            .collect();
        memory.add(
            NewMemory::thought(env.now, triple, insight.clone(), poignancy)
                .with_filling(filling)
                .with_embedding(env.caps.embed(&insight))
                .expires(env.thought_expiration()),
        );
    }
    Ok(count)
}

/// System to run reflection for every agent whose trigger fires.
#[allow(clippy::too_many_arguments)]
pub fn reflect(
    roster: Res<AgentRoster>,
    caps: Res<Capabilities>,
    config: Res<SimConfig>,
    clock: Res<SimClock>,
    scoring: Res<Scoring>,
    policy: Res<ReflectionPolicy>,
    mut agents: Query<(&AgentId, &Persona, &mut Scratch, &mut AssociativeMemory)>,
) {
    let env = StepEnv {
        caps: &caps,
        config: &config,
        strategy: scoring.strategy(),
        now: clock.now(),
    };
    for entry in roster.iter() {
        let Ok((id, persona, mut scratch, mut memory)) = agents.get_mut(entry.entity) else {
            continue;
        };
        if !policy.should_reflect(&scratch, env.now) {
            continue;
        }
        match reflect_agent(id, persona, &scratch, &mut memory, &env) {
            Ok(count) => {
                info!("{} reflected ({} insights, {})", persona.name, count, policy.0.name());
                scratch.importance.reset();
                if config
                    .planning
                    .daily_reflection_minute
                    .is_some_and(|m| env.now.minute_of_day() >= m)
                {
                    scratch.last_daily_reflection = Some(env.now.day());
                }
            }
            Err(err) => warn!("{}: reflection failed, will retry: {}", persona.name, err),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::components::{CognitiveParams, MemoryKind, Triple};
    use crate::generation::scripted::ScriptedGenerator;
    use crate::generation::PromptKind;
    use crate::scoring::LinearWeighted;
    use std::sync::Arc;
    use town_events::Coord;

    fn scratch() -> Scratch {
        let params = CognitiveParams {
            daily_reflection_size: 2,
            ..CognitiveParams::default()
        };
        Scratch::new(params, Coord::new(0, 0))
    }

    fn env<'a>(caps: &'a Capabilities, config: &'a SimConfig, now: SimTime) -> StepEnv<'a> {
        StepEnv {
            caps,
            config,
            strategy: &LinearWeighted,
            now,
        }
    }

    fn observe(memory: &mut AssociativeMemory, scratch: &mut Scratch, what: &str, poignancy: f32) {
        let t = SimTime::new(1, 9, 0);
        memory.add(NewMemory::observation(t, Triple::new("bo", "is", what), format!("Bo Chen is {}", what), poignancy));
        scratch.importance.record(poignancy);
    }

    #[test]
    fn test_threshold_crossing() {
        let mut scratch = scratch();
        let mut memory = AssociativeMemory::new();
        for p in [1.0, 1.0, 1.0] {
            observe(&mut memory, &mut scratch, "reading", p);
        }
        assert!(!ImportanceThreshold.should_reflect(&scratch, SimTime::new(1, 9, 0)));
        observe(&mut memory, &mut scratch, "moving away", 150.0);
        assert!(ImportanceThreshold.should_reflect(&scratch, SimTime::new(1, 9, 0)));
    }

    #[test]
    fn test_daily_trigger_fires_once_per_day() {
        let mut scratch = scratch();
        let trigger = DailyAt { minute: 22 * 60 };
        assert!(!trigger.should_reflect(&scratch, SimTime::new(1, 21, 0)));
        assert!(trigger.should_reflect(&scratch, SimTime::new(1, 22, 0)));
        scratch.last_daily_reflection = Some(1);
        assert!(!trigger.should_reflect(&scratch, SimTime::new(1, 23, 0)));
        assert!(trigger.should_reflect(&scratch, SimTime::new(2, 22, 30)));
    }

    #[test]
    fn test_policy_from_config() {
        let mut planning = PlanningConfig::default();
        assert_eq!(ReflectionPolicy::from_config(&planning).0.name(), "importance_threshold");
        planning.daily_reflection_minute = Some(60);
        let policy = ReflectionPolicy::from_config(&planning);
        assert_eq!(policy.0.name(), "composite");
        assert!(policy.should_reflect(&scratch(), SimTime::new(1, 1, 0)));
    }

    #[test]
    fn test_salient_memories_skip_idle() {
        let mut scratch = scratch();
        let mut memory = AssociativeMemory::new();
        observe(&mut memory, &mut scratch, "painting", 3.0);
        observe(&mut memory, &mut scratch, "idle", 9.0);
        observe(&mut memory, &mut scratch, "crying", 8.0);
        observe(&mut memory, &mut scratch, "reading", 2.0);

        let salient: Vec<&str> = salient_memories(&memory, &scratch, SimTime::new(1, 9, 0))
            .iter()
            .map(|n| n.description.as_str())
            .collect();
        assert_eq!(salient, vec!["Bo Chen is painting", "Bo Chen is crying"]);
    }

    #[test]
    fn test_reflection_stores_cited_insights() {
        let caps = Capabilities::offline();
        let config = SimConfig::default();
        let mut scratch = scratch();
        let mut memory = AssociativeMemory::new();
        observe(&mut memory, &mut scratch, "painting", 3.0);
        observe(&mut memory, &mut scratch, "crying", 8.0);
        let persona = Persona::new("Ada Lin", "town:Home".parse().unwrap());

        let count = reflect_agent(
            &AgentId::new("ada"),
            &persona,
            &scratch,
            &mut memory,
            &env(&caps, &config, SimTime::new(1, 10, 0)),
        )
        .unwrap();

        assert_eq!(count, 1);
        let insight = memory.latest().unwrap();
        assert_eq!(insight.kind, MemoryKind::Thought);
        assert_eq!(insight.triple.subject, "ada");
        assert_eq!(insight.evidence().collect::<Vec<_>>(), vec!["node_1", "node_2"]);
    }

    #[test]
    fn test_failed_reflection_reports_error() {
        let generator = ScriptedGenerator::new();
        generator.fail(PromptKind::Insights);
        let caps = Capabilities::new(Arc::new(generator));
        let config = SimConfig::default();
        let mut scratch = scratch();
        let mut memory = AssociativeMemory::new();
        observe(&mut memory, &mut scratch, "painting", 3.0);
        let before = memory.len();

        let result = reflect_agent(
            &AgentId::new("ada"),
            &Persona::new("Ada Lin", "town:Home".parse().unwrap()),
            &scratch,
            &mut memory,
            &env(&caps, &config, SimTime::new(1, 10, 0)),
        );
        assert!(result.is_err());
        assert_eq!(memory.len(), before);
    }
}
