//! Action System
//!
//! Moves each agent one tile along its planned path and stages what it shows
//! the world this step.

use bevy_ecs::prelude::*;
use town_events::Coord;

use crate::components::{AgentId, Persona, Scratch, TileEvent, Triple};

use super::{AgentRoster, StepWork};

/// An agent's position and public annotations, ready to be committed.
#[derive(Debug, Clone, PartialEq)]
pub struct StagedAgent {
    pub id: AgentId,
    pub tile: Coord,
    pub activity: String,
    pub emoji: String,
    pub path: Vec<Coord>,
    pub event: TileEvent,
    pub object_event: Option<TileEvent>,
}

/// Steps onto the next planned tile. Agents in a conversation or waiting stay
/// where they are.
pub fn advance_agent(scratch: &mut Scratch) -> Option<Coord> {
    if scratch.conversation.is_some() || scratch.action.is_waiting() || scratch.action.planned_path.is_empty() {
        return None;
    }
    let next = scratch.action.planned_path.remove(0);
    scratch.tile = next;
    Some(next)
}

/// What `id` shows the world from its current tile.
pub fn stage_agent(id: &AgentId, persona: &Persona, scratch: &Scratch) -> StagedAgent {
    let action = &scratch.action;
    let event = if action.is_set() {
        TileEvent::new(action.event.clone(), format!("{} is {}", persona.name, action.description))
    } else {
        TileEvent::new(Triple::new(id.as_str(), "is", "idle"), format!("{} is idle", persona.name))
    };
    let object_event = action
        .object_event
        .as_ref()
        .filter(|_| action.planned_path.is_empty() && scratch.conversation.is_none())
        .map(|o| TileEvent::new(o.triple.clone(), o.description.clone()));

    StagedAgent {
        id: id.clone(),
        tile: scratch.tile,
        activity: action.public_description().to_string(),
        emoji: action.emoji.clone(),
        path: action.planned_path.clone(),
        event,
        object_event,
    }
}

/// System to move every agent and stage its annotations.
pub fn act(
    roster: Res<AgentRoster>,
    mut work: ResMut<StepWork>,
    mut agents: Query<(&AgentId, &Persona, &mut Scratch)>,
) {
    for entry in roster.iter() {
        let Ok((id, persona, mut scratch)) = agents.get_mut(entry.entity) else {
            continue;
        };
        advance_agent(&mut scratch);
        work.staged.push(stage_agent(id, persona, &scratch));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::components::{ActionTarget, CognitiveParams, CurrentAction, ObjectEvent};
    use town_events::SimTime;

    fn walking() -> Scratch {
        let mut scratch = Scratch::new(CognitiveParams::default(), Coord::new(0, 0));
        scratch.action = CurrentAction {
            target: Some(ActionTarget::Place {
                address: "town:Cafe:cafe:counter".parse().unwrap(),
            }),
            start: SimTime::new(1, 9, 0),
            duration_minutes: 30,
            description: "brewing coffee".into(),
            emoji: "☕".into(),
            event: Triple::new("ada", "is", "brewing coffee"),
            object_event: Some(ObjectEvent {
                address: "town:Cafe:cafe:counter".parse().unwrap(),
                triple: Triple::new("town:Cafe:cafe:counter", "is", "being used"),
                description: "counter is being used".into(),
            }),
            planned_path: vec![Coord::new(1, 0), Coord::new(2, 0)],
        };
        scratch
    }

    #[test]
    fn test_one_tile_per_step() {
        let mut scratch = walking();
        assert_eq!(advance_agent(&mut scratch), Some(Coord::new(1, 0)));
        assert_eq!(advance_agent(&mut scratch), Some(Coord::new(2, 0)));
        assert_eq!(advance_agent(&mut scratch), None);
        assert_eq!(scratch.tile, Coord::new(2, 0));
    }

    #[test]
    fn test_conversing_agent_stays_put() {
        let mut scratch = walking();
        scratch.conversation = Some(4);
        assert_eq!(advance_agent(&mut scratch), None);
        assert_eq!(scratch.tile, Coord::new(0, 0));
    }

    #[test]
    fn test_object_event_only_on_arrival() {
        let persona = Persona::new("Ada Lin", "town:Home".parse().unwrap());
        let id = AgentId::new("ada");
        let mut scratch = walking();

        let staged = stage_agent(&id, &persona, &scratch);
        assert_eq!(staged.event.description, "Ada Lin is brewing coffee");
        assert!(staged.object_event.is_none());

        advance_agent(&mut scratch);
        advance_agent(&mut scratch);
        let staged = stage_agent(&id, &persona, &scratch);
        assert_eq!(staged.object_event.unwrap().description, "counter is being used");
    }

    #[test]
    fn test_unplanned_agent_is_idle() {
        let persona = Persona::new("Ada Lin", "town:Home".parse().unwrap());
        let scratch = Scratch::new(CognitiveParams::default(), Coord::new(3, 3));
        let staged = stage_agent(&AgentId::new("ada"), &persona, &scratch);
        assert!(staged.event.is_idle());
        assert_eq!(staged.activity, "idle");
        assert_eq!(staged.tile, Coord::new(3, 3));
    }
}
