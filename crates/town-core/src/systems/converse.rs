//! Conversation Systems
//!
//! `resolve_conversations` turns this step's chat requests into shared
//! conversations. `advance_conversations` adds utterances, enforces the turn
//! and duration limits, and writes the memories of a finished conversation.

use bevy_ecs::prelude::*;
use tracing::{debug, info, warn};

use crate::components::{
    ActionTarget, AgentId, AssociativeMemory, ConversationEnd, ConversationState, Conversations,
    CurrentAction, Filling, MemoryQuery, NewMemory, Persona, PlanStep, Scratch, Triple, Utterance,
};
use crate::config::SimConfig;
use crate::error::StateCorruptionError;
use crate::generation::{prompts, Capabilities};
use town_events::{ChatLine, SimTime};

use super::{AgentRoster, FaultLog, Scoring, SimClock, StepEnv, StepWork};

/// One agent asking another into a conversation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChatRequest {
    pub initiator: AgentId,
    pub partner: AgentId,
}

/// Switches an agent's action to the conversation.
pub fn begin_conversation(
    own: &AgentId,
    scratch: &mut Scratch,
    conversation: u64,
    partner: &AgentId,
    partner_name: &str,
    max_minutes: u32,
    now: SimTime,
) {
    let description = format!("conversing with {}", partner_name);
    scratch.conversation = Some(conversation);
    scratch
        .plan
        .insert_reaction(now.minute_of_day(), PlanStep::new(description.clone(), max_minutes));
    scratch.action = CurrentAction {
        target: Some(ActionTarget::Conversation {
            partner: partner.clone(),
        }),
        start: now,
        duration_minutes: max_minutes,
        description,
        emoji: "💬".to_string(),
        event: Triple::new(own.as_str(), "chat with", partner.as_str()),
        object_event: None,
        planned_path: Vec::new(),
    };
}

/// System to open conversations for this step's requests, in request order.
///
/// A request answered by the partner's own request in the same step joins the
/// conversation already opened; a request involving an agent that is already
/// talking is dropped.
pub fn resolve_conversations(
    roster: Res<AgentRoster>,
    config: Res<SimConfig>,
    clock: Res<SimClock>,
    mut work: ResMut<StepWork>,
    mut conversations: ResMut<Conversations>,
    mut faults: ResMut<FaultLog>,
    mut agents: Query<(&AgentId, &mut Scratch)>,
) {
    let now = clock.now();
    let max_minutes = config.conversation.max_duration_minutes;
    for request in std::mem::take(&mut work.chat_requests) {
        let (Some(a), Some(b)) = (
            roster.entity(request.initiator.as_str()),
            roster.entity(request.partner.as_str()),
        ) else {
            continue;
        };
        if a == b {
            continue;
        }
        let Ok([(first_id, mut first), (second_id, mut second)]) = agents.get_many_mut([a, b]) else {
            continue;
        };
        match (first.conversation, second.conversation) {
            (None, None) => {}
            (Some(x), Some(y)) if x == y => {
                debug!("{} joins conversation {} with {}", first_id, x, second_id);
                continue;
            }
            _ => {
                debug!("{} cannot talk to {}: busy", first_id, second_id);
                continue;
            }
        }

        let id = conversations.open(first_id.clone(), second_id.clone(), now);
        begin_conversation(
            first_id,
            &mut first,
            id,
            second_id,
            &roster.name_of(second_id.as_str()),
            max_minutes,
            now,
        );
        begin_conversation(
            second_id,
            &mut second,
            id,
            first_id,
            &roster.name_of(first_id.as_str()),
            max_minutes,
            now,
        );
        info!("Conversation {} opened: {} and {}", id, first_id, second_id);
    }

    for entry in roster.iter() {
        if conversations.involving(&entry.id).len() > 1 {
            faults.push(StateCorruptionError::DoubleBooked {
                agent: entry.id.0.clone(),
            });
        }
    }
}

/// Mutable view of one participant.
pub struct Participant<'a> {
    pub id: &'a AgentId,
    pub persona: &'a Persona,
    pub scratch: &'a mut Scratch,
    pub memory: &'a mut AssociativeMemory,
}

/// Next line from `speaker`, or `None` when generation failed.
pub fn speak(
    speaker: &Participant<'_>,
    listener: &Participant<'_>,
    transcript: &[String],
    env: &StepEnv<'_>,
) -> Option<(String, bool)> {
    let partner_name = listener.persona.name.as_str();
    let first_name = listener.persona.first_name().to_lowercase();
    let query = MemoryQuery::terms([listener.id.as_str(), first_name.as_str()])
        .with_embedding(env.caps.embed(partner_name));
    let mut context: Vec<String> = speaker
        .memory
        .retrieve(
            &query,
            env.now,
            speaker.scratch.params.retention,
            &env.retrieval(&speaker.scratch.params),
            env.strategy,
        )
        .into_iter()
        .map(|n| n.description.clone())
        .collect();
    if let Some(last) = speaker.memory.last_chat_with(listener.id.as_str()) {
        if !context.contains(&last.description) {
            context.push(last.description.clone());
        }
    }

    let prompt = prompts::utterance(speaker.persona, partner_name, &context, transcript);
    match env.caps.ask_parsed(&prompt, prompts::parse_utterance) {
        Ok(line) => Some(line),
        Err(err) => {
            warn!("{}: no utterance this step: {}", speaker.persona.name, err);
            None
        }
    }
}

/// Adds up to `utterances_per_step` lines and closes the conversation when a
/// limit is reached.
pub fn advance_conversation(
    state: &mut ConversationState,
    speakers: &mut [Participant<'_>; 2],
    env: &StepEnv<'_>,
) {
    let limits = &env.config.conversation;
    if state.is_open() && env.now.minutes_since(state.started) >= u64::from(limits.max_duration_minutes) {
        state.end = ConversationEnd::DurationElapsed;
    }

    let names = [speakers[0].persona.name.clone(), speakers[1].persona.name.clone()];
    let mut spoken = 0;
    while state.is_open() && spoken < limits.utterances_per_step {
        spoken += 1;
        let turn = state.utterances.len() % 2;
        let transcript: Vec<String> = state
            .utterances
            .iter()
            .map(|u| {
                let who = if &u.speaker == speakers[0].id { &names[0] } else { &names[1] };
                format!("{}: {}", who, u.text)
            })
            .collect();
        let (speaker, listener) = (&speakers[turn], &speakers[1 - turn]);
        let Some((text, ended)) = speak(speaker, listener, &transcript, env) else {
            break;
        };
        if !text.is_empty() {
            state.utterances.push(Utterance {
                speaker: speaker.id.clone(),
                text,
                at: env.now,
            });
        }
        if ended {
            state.end = ConversationEnd::EndedBySpeaker;
        } else if state.utterances.len() >= limits.max_turns {
            state.end = ConversationEnd::TurnLimit;
        }
    }
}

/// Memories and bookkeeping for one participant of a finished conversation.
pub fn conclude(
    me: &mut Participant<'_>,
    partner: &AgentId,
    partner_name: &str,
    state: &ConversationState,
    transcript: &[String],
    env: &StepEnv<'_>,
) {
    let persona = me.persona;
    let summary = env
        .caps
        .ask_text(&prompts::conversation_summary(persona, partner_name, transcript))
        .unwrap_or_else(|err| {
            warn!("{}: conversation summary fallback: {}", persona.name, err);
            format!("{} had a conversation with {}", persona.name, partner_name)
        });
    let poignancy = env.rate(persona, "conversation", &summary);
    let partner_first = partner_name.split_whitespace().next().unwrap_or(partner_name).to_lowercase();
    let chat = me.memory.add(
        NewMemory::chat(env.now, Triple::new(me.id.as_str(), "chat with", partner.as_str()), summary.clone(), poignancy)
            .with_keywords([partner_first])
            .with_filling(state.filling())
            .with_embedding(env.caps.embed(&summary)),
    );
    me.scratch.importance.record(poignancy);

    for (prompt, predicate) in [
        (prompts::planning_thought(persona, partner_name, transcript), "plans after talking with"),
        (prompts::conversation_memo(persona, partner_name, transcript), "remembers talking with"),
    ] {
        match env.caps.ask_text(&prompt) {
            Ok(thought) => {
                let rating = env.rate(persona, "thought", &thought);
                me.memory.add(
                    NewMemory::thought(env.now, Triple::new(me.id.as_str(), predicate, partner.as_str()), thought.clone(), rating)
                        .with_filling(vec![Filling::Evidence { node: chat.clone() }])
                        .with_embedding(env.caps.embed(&thought))
                        .expires(env.thought_expiration()),
                );
                me.scratch.importance.record(rating);
            }
            Err(err) => warn!("{}: skipped {:?} thought: {}", persona.name, prompt.kind, err),
        }
    }

    me.scratch.conversation = None;
    me.scratch
        .start_cooldown(partner.as_str(), env.config.planning.chat_cooldown_steps);
    me.scratch.plan.end_active_at(env.now.minute_of_day());
    me.scratch.action.finish_at(env.now);
}

/// System to advance every open conversation by one step.
#[allow(clippy::too_many_arguments)]
pub fn advance_conversations(
    roster: Res<AgentRoster>,
    caps: Res<Capabilities>,
    config: Res<SimConfig>,
    clock: Res<SimClock>,
    scoring: Res<Scoring>,
    mut work: ResMut<StepWork>,
    mut conversations: ResMut<Conversations>,
    mut faults: ResMut<FaultLog>,
    mut agents: Query<(&AgentId, &Persona, &mut Scratch, &mut AssociativeMemory)>,
) {
    let env = StepEnv {
        caps: &caps,
        config: &config,
        strategy: scoring.strategy(),
        now: clock.now(),
    };
    let names = roster.names();

    for id in conversations.ids() {
        let Some(state) = conversations.get_mut(id) else {
            continue;
        };
        let [a, b] = state.participants.clone();
        let (Some(ea), Some(eb)) = (roster.entity(a.as_str()), roster.entity(b.as_str())) else {
            let missing = if roster.entity(a.as_str()).is_none() { a } else { b };
            faults.push(StateCorruptionError::ConversationMismatch {
                agent: missing.0,
                conversation: id,
            });
            continue;
        };
        let Ok([(id_a, persona_a, mut scratch_a, mut memory_a), (id_b, persona_b, mut scratch_b, mut memory_b)]) =
            agents.get_many_mut([ea, eb])
        else {
            continue;
        };
        for (agent, scratch) in [(id_a, &scratch_a), (id_b, &scratch_b)] {
            if scratch.conversation != Some(id) {
                faults.push(StateCorruptionError::ConversationMismatch {
                    agent: agent.0.clone(),
                    conversation: id,
                });
            }
        }
        if scratch_a.conversation != Some(id) || scratch_b.conversation != Some(id) {
            continue;
        }

        let mut speakers = [
            Participant {
                id: id_a,
                persona: persona_a,
                scratch: &mut scratch_a,
                memory: &mut memory_a,
            },
            Participant {
                id: id_b,
                persona: persona_b,
                scratch: &mut scratch_b,
                memory: &mut memory_b,
            },
        ];
        advance_conversation(state, &mut speakers, &env);

        let lines: Vec<ChatLine> = state
            .utterances
            .iter()
            .map(|u| ChatLine::new(u.speaker.as_str(), u.text.as_str()))
            .collect();
        for agent in [&a, &b] {
            work.chat_lines.insert(agent.clone(), lines.clone());
        }

        if state.is_open() {
            continue;
        }
        let transcript = state.transcript(&names);
        let [first, second] = &mut speakers;
        conclude(first, &b, &persona_b.name, state, &transcript, &env);
        conclude(second, &a, &persona_a.name, state, &transcript, &env);
        info!(
            "Conversation {} between {} and {} ended ({:?}, {} lines)",
            id,
            a,
            b,
            state.end,
            state.utterances.len()
        );
        conversations.remove(id);
    }
}
