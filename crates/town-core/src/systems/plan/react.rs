//! Reactions to other agents: start a conversation, wait, or carry on.

use tracing::{debug, info};

use crate::components::{
    ActionTarget, AgentId, AssociativeMemory, CurrentAction, Persona, PlanStep, Scratch, Triple,
};
use crate::generation::prompts;
use crate::systems::{AgentRoster, ChatRequest, RetrievedContext, RosterEntry, StepEnv};

/// Last hour of the day in which a conversation may start.
const LAST_CHAT_HOUR: u32 = 22;

/// What an agent decided about another agent it noticed.
#[derive(Debug, Clone, PartialEq)]
pub enum Reaction {
    Talk(ChatRequest),
    Wait { minutes: u32 },
    Continue,
}

/// The first perceived event whose subject is another agent.
pub fn focus_agent<'r>(
    id: &AgentId,
    contexts: &'r [RetrievedContext],
    roster: &'r AgentRoster,
) -> Option<(&'r RetrievedContext, &'r RosterEntry)> {
    contexts.iter().find_map(|ctx| {
        let subject = ctx.focus.event.triple.subject.as_str();
        if subject == id.as_str() {
            return None;
        }
        roster.get(subject).map(|target| (ctx, target))
    })
}

fn may_talk(scratch: &Scratch, target: &RosterEntry, env: &StepEnv<'_>) -> bool {
    target.is_available()
        && scratch.action.is_set()
        && !scratch.action.is_sleeping()
        && !scratch.chat_blocked_with(target.id.as_str())
        && env.now.minute_of_day() / 60 <= LAST_CHAT_HOUR
}

fn may_wait(scratch: &Scratch, target: &RosterEntry) -> bool {
    let own_place = scratch.action.place();
    !target.sleeping
        && !target.waiting
        && target.conversation.is_none()
        && own_place.is_some()
        && own_place == target.place.as_ref()
        && !scratch.action.planned_path.is_empty()
}

/// Decides how to react to `target`, without changing any state.
pub fn decide(
    id: &AgentId,
    persona: &Persona,
    scratch: &Scratch,
    memory: &AssociativeMemory,
    context: &RetrievedContext,
    target: &RosterEntry,
    env: &StepEnv<'_>,
) -> Reaction {
    let own_activity = scratch.action.public_description();
    if may_talk(scratch, target, env) {
        let mut statements = context.statements();
        if let Some(last) = memory.last_chat_with(target.id.as_str()) {
            statements.push(last.description.clone());
        }
        let prompt = prompts::decide_to_talk(persona, &target.name, &target.activity, own_activity, &statements);
        match env.caps.ask_choice(&prompt) {
            Ok(answer) if answer == "yes" => {
                return Reaction::Talk(ChatRequest {
                    initiator: id.clone(),
                    partner: target.id.clone(),
                });
            }
            Ok(_) => {}
            Err(err) => debug!("{}: talk decision failed: {}", persona.name, err),
        }
    }

    if may_wait(scratch, target) {
        let prompt = prompts::decide_to_react(persona, &target.name, &target.activity, own_activity);
        match env.caps.ask_choice(&prompt) {
            Ok(answer) if answer == "wait" => {
                let minutes = (target.action_end.minutes_since(env.now) as u32).max(1);
                return Reaction::Wait { minutes };
            }
            Ok(_) => {}
            Err(err) => debug!("{}: react decision failed: {}", persona.name, err),
        }
    }
    Reaction::Continue
}

/// Pauses in place until the occupant of the agent's destination is done.
pub fn start_waiting(id: &AgentId, scratch: &mut Scratch, target_name: &str, minutes: u32, env: &StepEnv<'_>) {
    let interrupted = scratch.action.description.clone();
    let description = format!("waiting for {} to finish before {}", target_name, interrupted);
    scratch
        .plan
        .insert_reaction(env.now.minute_of_day(), PlanStep::new(description.clone(), minutes));
    scratch.action = CurrentAction {
        target: Some(ActionTarget::Waiting { tile: scratch.tile }),
        start: env.now,
        duration_minutes: minutes,
        description,
        emoji: "⌛".to_string(),
        event: Triple::new(id.as_str(), "waiting to start", interrupted),
        object_event: None,
        planned_path: Vec::new(),
    };
}

/// Reacts to the most interesting agent perceived this step.
#[allow(clippy::too_many_arguments)]
pub fn react(
    id: &AgentId,
    persona: &Persona,
    scratch: &mut Scratch,
    memory: &AssociativeMemory,
    contexts: &[RetrievedContext],
    roster: &AgentRoster,
    env: &StepEnv<'_>,
    requests: &mut Vec<ChatRequest>,
) {
    if scratch.conversation.is_some() || scratch.action.is_waiting() {
        return;
    }
    let Some((context, target)) = focus_agent(id, contexts, roster) else {
        return;
    };
    match decide(id, persona, scratch, memory, context, target, env) {
        Reaction::Talk(request) => {
            info!("{} wants to talk to {}", persona.name, target.name);
            requests.push(request);
        }
        Reaction::Wait { minutes } => {
            info!("{} waits {} min for {}", persona.name, minutes, target.name);
            start_waiting(id, scratch, &target.name, minutes, env);
        }
        Reaction::Continue => {}
    }
}
