//! Daily planning: wake-up hour, requirements and the hourly schedule.

use tracing::{info, warn};

use crate::components::scratch::{is_sleep_activity, SLEEPING};
use crate::components::{AgentId, AssociativeMemory, DailyPlan, NewMemory, Persona, Scratch, Triple};
use crate::generation::prompts;

use crate::systems::StepEnv;

/// Activity used when no schedule can be generated.
const ROUTINE: &str = "going about the usual routine";

/// Schedule used when generation fails: asleep outside waking hours.
pub fn fallback_schedule(wake_hour: u32) -> Vec<String> {
    (0..24)
        .map(|hour| {
            if hour < wake_hour || hour >= 23 {
                SLEEPING.to_string()
            } else {
                ROUTINE.to_string()
            }
        })
        .collect()
}

/// Rewrites `persona.currently` from memories of the previous day.
/// A failed revision keeps the old status.
pub fn revise_identity(persona: &mut Persona, scratch: &Scratch, memory: &AssociativeMemory, env: &StepEnv<'_>) {
    let focal = format!(
        "{}'s plans and the important recent events in {}'s life",
        persona.name,
        persona.first_name()
    );
    let embedding = env.caps.embed(&focal);
    let statements: Vec<String> = memory
        .retrieve_focal(
            embedding.as_deref(),
            env.now,
            env.config.retrieval.focal_k,
            &env.retrieval(&scratch.params),
            env.strategy,
        )
        .into_iter()
        .map(|n| n.description.clone())
        .collect();
    if statements.is_empty() {
        return;
    }
    match env.caps.ask_text(&prompts::identity_revision(persona, &statements)) {
        Ok(currently) => {
            info!("{} revised status: {}", persona.name, currently);
            persona.currently = currently;
        }
        Err(err) => warn!("{}: identity revision failed, keeping status: {}", persona.name, err),
    }
}

/// Makes a fresh plan for the current day and stores it as a thought.
pub fn plan_day(
    id: &AgentId,
    persona: &mut Persona,
    scratch: &mut Scratch,
    memory: &mut AssociativeMemory,
    env: &StepEnv<'_>,
) {
    let day = env.now.day();
    if scratch.plan_day.is_some_and(|d| d != day) {
        revise_identity(persona, scratch, memory, env);
    }

    let fallback_wake = env.config.planning.fallback_wake_hour;
    let wake_hour = env
        .caps
        .ask_parsed(&prompts::wake_up_hour(persona), prompts::parse_hour)
        .unwrap_or_else(|err| {
            warn!("{}: wake-up hour fallback {}: {}", persona.name, fallback_wake, err);
            fallback_wake
        });

    let requirements = env
        .caps
        .ask_parsed(&prompts::daily_requirements(persona, wake_hour, day), |out| {
            let lines = prompts::parse_lines(out);
            (!lines.is_empty()).then_some(lines)
        })
        .unwrap_or_else(|err| {
            warn!("{}: no daily requirements: {}", persona.name, err);
            Vec::new()
        });

    let mut hourly = env
        .caps
        .ask_parsed(
            &prompts::hourly_schedule(persona, &requirements, wake_hour),
            prompts::parse_schedule,
        )
        .unwrap_or_else(|err| {
            warn!("{}: hourly schedule fallback: {}", persona.name, err);
            fallback_schedule(wake_hour)
        });
    hourly.truncate(24);
    for activity in hourly.iter_mut().take(wake_hour as usize) {
        if !is_sleep_activity(activity) {
            *activity = SLEEPING.to_string();
        }
    }

    scratch.wake_hour = Some(wake_hour);
    scratch.plan = DailyPlan::from_hourly_activities(&hourly);
    scratch.plan_day = Some(day);

    let agenda = if requirements.is_empty() {
        ROUTINE.to_string()
    } else {
        requirements.join(", ")
    };
    let description = format!("This is {}'s plan for day {}: {}.", persona.name, day, agenda);
    memory.add(
        NewMemory::thought(env.now, Triple::new(id.as_str(), "plan", format!("day {}", day)), description.clone(), 5.0)
            .with_embedding(env.caps.embed(&description))
            .expires(env.thought_expiration()),
    );
    scratch.daily_requirements = requirements;

    if scratch.action.is_set() {
        scratch.action.finish_at(env.now);
    }
    info!(
        "{} planned day {} waking at {:02}:00 ({} steps)",
        persona.name,
        day,
        wake_hour,
        scratch.plan.steps.len()
    );
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::components::{CognitiveParams, MemoryKind};
    use crate::config::SimConfig;
    use crate::generation::scripted::ScriptedGenerator;
    use crate::generation::{Capabilities, PromptKind};
    use crate::scoring::LinearWeighted;
    use std::sync::Arc;
    use town_events::{Coord, SimTime, MINUTES_PER_DAY};

    fn persona() -> Persona {
        Persona::new("Ada Lin", "town:Home:bedroom:bed".parse().unwrap())
            .with_currently("Ada is preparing an art show")
    }

    fn env<'a>(caps: &'a Capabilities, config: &'a SimConfig, now: SimTime) -> StepEnv<'a> {
        StepEnv {
            caps,
            config,
            strategy: &LinearWeighted,
            now,
        }
    }

    #[test]
    fn test_fallback_schedule_sleeps_until_wake() {
        let schedule = fallback_schedule(7);
        assert_eq!(schedule.len(), 24);
        assert_eq!(schedule[6], SLEEPING);
        assert_eq!(schedule[7], ROUTINE);
        assert_eq!(schedule[23], SLEEPING);
    }

    #[test]
    fn test_plan_day_covers_full_day() {
        let caps = Capabilities::offline();
        let config = SimConfig::default();
        let now = SimTime::new(1, 0, 0);
        let id = AgentId::new("ada");
        let mut persona = persona();
        let mut scratch = Scratch::new(CognitiveParams::default(), Coord::new(0, 0));
        let mut memory = AssociativeMemory::new();

        plan_day(&id, &mut persona, &mut scratch, &mut memory, &env(&caps, &config, now));

        assert_eq!(scratch.plan.total_minutes(), MINUTES_PER_DAY);
        assert_eq!(scratch.plan_day, Some(1));
        assert!(!scratch.needs_daily_plan(now));
        let wake = scratch.wake_hour.unwrap();
        assert!(is_sleep_activity(&scratch.plan.step_at(0).unwrap().description));
        assert!(!is_sleep_activity(&scratch.plan.step_at(wake * 60).unwrap().description));

        let thought = memory.latest().unwrap();
        assert_eq!(thought.kind, MemoryKind::Thought);
        assert_eq!(thought.poignancy, 5.0);
        assert_eq!(thought.expiration, Some(now.plus_days(30)));
    }

    #[test]
    fn test_plan_day_falls_back_when_generation_fails() {
        let generator = ScriptedGenerator::new();
        generator.fail(PromptKind::WakeUpHour).fail(PromptKind::HourlySchedule);
        let caps = Capabilities::new(Arc::new(generator));
        let config = SimConfig::default();
        let mut persona = persona();
        let mut scratch = Scratch::new(CognitiveParams::default(), Coord::new(0, 0));
        let mut memory = AssociativeMemory::new();

        plan_day(
            &AgentId::new("ada"),
            &mut persona,
            &mut scratch,
            &mut memory,
            &env(&caps, &config, SimTime::new(1, 0, 0)),
        );

        assert_eq!(scratch.wake_hour, Some(config.planning.fallback_wake_hour));
        assert_eq!(scratch.plan.steps[0].description, SLEEPING);
        assert_eq!(scratch.plan.steps[0].duration_minutes, 7 * 60);
        assert_eq!(scratch.plan.total_minutes(), MINUTES_PER_DAY);
    }

    #[test]
    fn test_new_day_revises_identity() {
        let generator = ScriptedGenerator::new();
        generator.push(PromptKind::IdentityRevision, "Ada is hanging her paintings at the cafe");
        let caps = Capabilities::new(Arc::new(generator.clone()));
        let config = SimConfig::default();
        let id = AgentId::new("ada");
        let mut persona = persona();
        let mut scratch = Scratch::new(CognitiveParams::default(), Coord::new(0, 0));
        let mut memory = AssociativeMemory::new();

        plan_day(&id, &mut persona, &mut scratch, &mut memory, &env(&caps, &config, SimTime::new(1, 0, 0)));
        assert_eq!(generator.call_count(PromptKind::IdentityRevision), 0);

        plan_day(&id, &mut persona, &mut scratch, &mut memory, &env(&caps, &config, SimTime::new(2, 0, 0)));
        assert_eq!(generator.call_count(PromptKind::IdentityRevision), 1);
        assert_eq!(persona.currently, "Ada is hanging her paintings at the cafe");
        assert_eq!(scratch.plan_day, Some(2));
    }

    #[test]
    fn test_failed_revision_keeps_status() {
        let generator = ScriptedGenerator::new();
        generator.fail(PromptKind::IdentityRevision);
        let caps = Capabilities::new(Arc::new(generator));
        let config = SimConfig::default();
        let id = AgentId::new("ada");
        let mut persona = persona();
        let mut scratch = Scratch::new(CognitiveParams::default(), Coord::new(0, 0));
        let mut memory = AssociativeMemory::new();

        plan_day(&id, &mut persona, &mut scratch, &mut memory, &env(&caps, &config, SimTime::new(1, 0, 0)));
        plan_day(&id, &mut persona, &mut scratch, &mut memory, &env(&caps, &config, SimTime::new(2, 0, 0)));
        assert_eq!(persona.currently, "Ada is preparing an art show");
    }
}
