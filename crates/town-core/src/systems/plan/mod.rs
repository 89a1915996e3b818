//! Planning System
//!
//! Keeps each agent's day planned, turns the active plan step into a concrete
//! action with a destination and a path, and lets the agent react to others
//! it just noticed.

pub mod daily;
pub mod location;
pub mod react;

use bevy_ecs::prelude::*;
use rand::Rng;
use tracing::{debug, warn};

use crate::components::scratch::is_sleep_activity;
use crate::components::{
    ActionTarget, AgentId, AssociativeMemory, CurrentAction, ObjectEvent, Persona, PlanStep,
    Scratch, SpatialMemory, Triple, WorldGrid,
};
use crate::config::SimConfig;
use crate::generation::{prompts, Capabilities};
use crate::SimRng;

use super::{AgentRoster, Scoring, SimClock, StepEnv, StepWork};

pub use daily::{plan_day, revise_identity};
pub use location::{choose_destination, resolve_location, route};
pub use react::{react, Reaction};

fn clock_label(minute: u32) -> String {
    format!("{:02}:{:02}", minute / 60, minute % 60)
}

/// Splits plan step `index` into finer steps. Returns false when the step
/// is left as it is.
pub fn decompose_step(persona: &Persona, scratch: &mut Scratch, index: usize, env: &StepEnv<'_>) -> bool {
    let Some(step) = scratch.plan.steps.get(index) else {
        return false;
    };
    if is_sleep_activity(&step.description)
        || !env.config.planning.should_decompose(step.depth, step.duration_minutes)
    {
        return false;
    }

    let start = clock_label(scratch.plan.start_of(index));
    let prompt = prompts::task_decomposition(persona, &step.description, &start, step.duration_minutes);
    match env.caps.ask_parsed(&prompt, prompts::parse_decomposition) {
        Ok(tasks) => {
            let depth = step.depth + 1;
            let address = step.address.clone();
            let subs = prompts::fit_durations(tasks, step.duration_minutes)
                .into_iter()
                .map(|(description, minutes)| PlanStep {
                    description,
                    duration_minutes: minutes,
                    address: address.clone(),
                    depth,
                })
                .collect();
            scratch.plan.replace_with(index, subs);
            true
        }
        Err(err) => {
            warn!("{}: keeping {:?} whole: {}", persona.name, step.description, err);
            false
        }
    }
}

/// Decomposes the active step down to its finest level, then the next
/// step once.
pub fn decompose_ahead(persona: &Persona, scratch: &mut Scratch, env: &StepEnv<'_>) {
    let minute = env.now.minute_of_day();
    while let Some(index) = scratch.plan.index_at(minute) {
        if !decompose_step(persona, scratch, index, env) {
            break;
        }
    }
    if let Some(index) = scratch.plan.index_at(minute) {
        decompose_step(persona, scratch, index + 1, env);
    }
}

/// Turns the active plan step into the current action.
pub fn plan_action<R: Rng>(
    id: &AgentId,
    persona: &Persona,
    scratch: &mut Scratch,
    spatial: &SpatialMemory,
    grid: &WorldGrid,
    env: &StepEnv<'_>,
    rng: &mut R,
) {
    decompose_ahead(persona, scratch, env);
    let minute = env.now.minute_of_day();
    let Some(index) = scratch.plan.index_at(minute) else {
        return;
    };
    let step = scratch.plan.steps[index].clone();
    let remaining = scratch.plan.end_of(index) - minute;

    let (address, path) = choose_destination(
        persona,
        spatial,
        grid,
        env.caps,
        &step.description,
        step.address.as_ref(),
        scratch.tile,
        rng,
    );
    let emoji = env
        .caps
        .ask_text(&prompts::action_emoji(&step.description))
        .map(|e| e.chars().take(3).collect())
        .unwrap_or_default();
    let event = env.triple(id, persona, &step.description);
    let object_event = address.object().map(|object| ObjectEvent {
        address: address.clone(),
        triple: Triple::new(address.to_string(), "is", "being used"),
        description: format!("{} is being used", object),
    });

    debug!(
        "{} -> {} at {} for {} min ({} tiles)",
        persona.name,
        step.description,
        address,
        remaining,
        path.len()
    );
    scratch.action = CurrentAction {
        target: Some(ActionTarget::Place { address }),
        start: env.now,
        duration_minutes: remaining,
        description: step.description,
        emoji,
        event,
        object_event,
        planned_path: path,
    };
}

/// System to plan days, choose actions and queue conversation requests.
#[allow(clippy::too_many_arguments)]
pub fn plan(
    roster: Res<AgentRoster>,
    grid: Res<WorldGrid>,
    caps: Res<Capabilities>,
    config: Res<SimConfig>,
    clock: Res<SimClock>,
    scoring: Res<Scoring>,
    mut rng: ResMut<SimRng>,
    mut work: ResMut<StepWork>,
    mut agents: Query<(
        &AgentId,
        &mut Persona,
        &mut Scratch,
        &SpatialMemory,
        &mut AssociativeMemory,
    )>,
) {
    let env = StepEnv {
        caps: &caps,
        config: &config,
        strategy: scoring.strategy(),
        now: clock.now(),
    };
    let mut requests = Vec::new();
    for entry in roster.iter() {
        let Ok((id, mut persona, mut scratch, spatial, mut memory)) = agents.get_mut(entry.entity) else {
            continue;
        };
        if scratch.conversation.is_some() {
            continue;
        }
        if scratch.needs_daily_plan(env.now) {
            plan_day(id, &mut persona, &mut scratch, &mut memory, &env);
        }
        if scratch.action.is_finished(env.now) {
            plan_action(id, &persona, &mut scratch, spatial, &grid, &env, &mut rng.0);
        }
        if let Some(contexts) = work.retrieved.get(id) {
            react(id, &persona, &mut scratch, &memory, contexts, &roster, &env, &mut requests);
        }
    }
    work.chat_requests.extend(requests);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::components::{Address, CognitiveParams, DailyPlan};
    use crate::generation::scripted::ScriptedGenerator;
    use crate::generation::PromptKind;
    use crate::scoring::LinearWeighted;
    use rand::rngs::SmallRng;
    use rand::SeedableRng;
    use std::sync::Arc;
    use town_events::{Coord, SimTime};

    fn address(s: &str) -> Address {
        s.parse().unwrap()
    }

    fn env<'a>(caps: &'a Capabilities, config: &'a SimConfig, now: SimTime) -> StepEnv<'a> {
        StepEnv {
            caps,
            config,
            strategy: &LinearWeighted,
            now,
        }
    }

    fn scratch_with(steps: &[(&str, u32)]) -> Scratch {
        let mut scratch = Scratch::new(CognitiveParams::default(), Coord::new(0, 0));
        scratch.plan = DailyPlan::new(steps.iter().map(|(d, m)| PlanStep::new(*d, *m)).collect());
        scratch
    }

    fn persona() -> Persona {
        Persona::new("Ada Lin", address("town:Lin House:bedroom:bed"))
    }

    #[test]
    fn test_decompose_active_and_next_step() {
        let caps = Capabilities::offline();
        let config = SimConfig::default();
        let mut scratch = scratch_with(&[("sleeping", 540), ("painting", 60), ("having lunch", 60)]);

        decompose_ahead(&persona(), &mut scratch, &env(&caps, &config, SimTime::new(1, 9, 0)));

        let active = scratch.plan.step_at(9 * 60).unwrap();
        assert_eq!(active.description, "getting ready for painting");
        assert_eq!(active.depth, 1);
        // the 40 minute middle part went one level deeper
        assert!(scratch.plan.steps.iter().any(|s| s.depth == 2));
        assert!(scratch.plan.steps.iter().any(|s| s.description == "having lunch" && s.depth == 0));
        assert_eq!(scratch.plan.total_minutes(), 24 * 60);
    }

    #[test]
    fn test_sleep_is_never_decomposed() {
        let generator = ScriptedGenerator::new();
        let caps = Capabilities::new(Arc::new(generator.clone()));
        let config = SimConfig::default();
        let mut scratch = scratch_with(&[("sleeping", 480)]);

        decompose_ahead(&persona(), &mut scratch, &env(&caps, &config, SimTime::new(1, 1, 0)));
        assert_eq!(generator.call_count(PromptKind::TaskDecomposition), 0);
        assert_eq!(scratch.plan.steps[0].description, "sleeping");
    }

    #[test]
    fn test_plan_action_marks_object_in_use() {
        let caps = Capabilities::offline();
        let config = SimConfig::default();
        let mut grid = WorldGrid::new(4, 1, &address("town"));
        grid.tile_mut(Coord::new(3, 0)).unwrap().address = address("town:Lin House:bedroom:bed");
        let persona = persona();
        let spatial = SpatialMemory::new(&persona.living_area);
        let mut scratch = scratch_with(&[("sleeping", 480)]);
        let mut rng = SmallRng::seed_from_u64(3);
        let now = SimTime::new(1, 2, 0);

        plan_action(
            &AgentId::new("ada"),
            &persona,
            &mut scratch,
            &spatial,
            &grid,
            &env(&caps, &config, now),
            &mut rng,
        );

        let action = &scratch.action;
        assert_eq!(action.description, "sleeping");
        assert_eq!(action.place(), Some(&persona.living_area));
        assert_eq!(action.duration_minutes, 360);
        assert_eq!(action.event.subject, "ada");
        assert_eq!(action.planned_path, vec![Coord::new(1, 0), Coord::new(2, 0), Coord::new(3, 0)]);
        let object = action.object_event.as_ref().unwrap();
        assert_eq!(object.description, "bed is being used");
        assert_eq!(object.triple.subject, "town:Lin House:bedroom:bed");
    }
}
