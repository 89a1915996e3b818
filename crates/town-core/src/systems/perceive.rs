//! Perception System
//!
//! Agents learn the layout within their vision radius and turn nearby events
//! in their own arena into observation memories.

use bevy_ecs::prelude::*;
use std::cmp::Ordering;
use town_events::{Coord, SimTime};
use tracing::debug;

use crate::components::{
    AddressLevel, AgentId, AssociativeMemory, NewMemory, Persona, Scratch, SpatialMemory,
    TileEvent, WorldGrid,
};
use crate::config::SimConfig;
use crate::generation::Capabilities;

use super::{rate_poignancy, AgentRoster, SimClock, StepWork};

/// An event newly stored as an observation this step.
#[derive(Debug, Clone, PartialEq)]
pub struct Perceived {
    pub node: String,
    pub event: TileEvent,
    pub tile: Coord,
}

/// Shared, read-only inputs of a perception pass.
#[derive(Clone, Copy)]
pub struct Surroundings<'a> {
    pub grid: &'a WorldGrid,
    pub caps: &'a Capabilities,
    pub fallback_poignancy: f32,
    pub now: SimTime,
}

struct Sighting {
    distance: f32,
    last_seen: u64,
    tile: Coord,
    event: TileEvent,
}

/// Rates an event, an idle one always at 1.
pub fn event_poignancy(persona: &Persona, event: &TileEvent, caps: &Capabilities, fallback: f32) -> f32 {
    if event.is_idle() {
        return 1.0;
    }
    rate_poignancy(persona, "event", &event.description, caps, fallback)
}

/// One agent's perception pass. Returns the events stored as new memories,
/// nearest first.
pub fn perceive_agent(
    id: &AgentId,
    persona: &Persona,
    scratch: &mut Scratch,
    spatial: &mut SpatialMemory,
    memory: &mut AssociativeMemory,
    env: &Surroundings<'_>,
) -> Vec<Perceived> {
    let here = scratch.tile;
    let radius = scratch.params.vision_radius;
    let nearby = env.grid.tiles_near(here, radius);

    let learned = nearby
        .clone()
        .filter(|(_, tile)| spatial.observe(&tile.address))
        .count();
    if learned > 0 {
        debug!("{} learned {} new places", id, learned);
    }

    let Some(own_area) = env.grid.tile(here).map(|t| t.address.truncate(AddressLevel::Arena)) else {
        return Vec::new();
    };

    let mut sightings: Vec<Sighting> = Vec::new();
    for (at, tile) in nearby {
        if tile.address.truncate(AddressLevel::Arena) != own_area {
            continue;
        }
        for event in &tile.events {
            if event.triple.subject == id.as_str() {
                continue;
            }
            sightings.push(Sighting {
                distance: here.euclidean(at),
                last_seen: memory
                    .latest_observation_of(&event.triple.subject)
                    .map_or(0, |n| n.seq),
                tile: at,
                event: event.clone(),
            });
        }
    }
    sightings.sort_by(|a, b| {
        a.distance
            .partial_cmp(&b.distance)
            .unwrap_or(Ordering::Equal)
            .then(a.last_seen.cmp(&b.last_seen))
    });
    sightings.truncate(scratch.params.attention_bandwidth);

    let mut perceived = Vec::new();
    for sighting in sightings {
        let event = sighting.event;
        let known = memory
            .latest_observation_of(&event.triple.subject)
            .is_some_and(|n| n.triple == event.triple && n.description == event.description);
        if known {
            continue;
        }

        let poignancy = event_poignancy(persona, &event, env.caps, env.fallback_poignancy);
        let node = memory.add(
            NewMemory::observation(env.now, event.triple.clone(), event.description.clone(), poignancy)
                .with_embedding(env.caps.embed(&event.description)),
        );
        scratch.importance.record(poignancy);
        debug!("{} observed {:?} ({})", id, event.description, node);

        perceived.push(Perceived {
            node,
            event,
            tile: sighting.tile,
        });
    }
    perceived
}

/// System to run perception for every agent.
pub fn perceive(
    roster: Res<AgentRoster>,
    grid: Res<WorldGrid>,
    caps: Res<Capabilities>,
    config: Res<SimConfig>,
    clock: Res<SimClock>,
    mut work: ResMut<StepWork>,
    mut agents: Query<(
        &AgentId,
        &Persona,
        &mut Scratch,
        &mut SpatialMemory,
        &mut AssociativeMemory,
    )>,
) {
    let env = Surroundings {
        grid: &grid,
        caps: &caps,
        fallback_poignancy: config.perception.fallback_poignancy,
        now: clock.now(),
    };
    for entry in roster.iter() {
        let Ok((id, persona, mut scratch, mut spatial, mut memory)) = agents.get_mut(entry.entity) else {
            continue;
        };
        let perceived = perceive_agent(id, persona, &mut scratch, &mut spatial, &mut memory, &env);
        if !perceived.is_empty() {
            work.perceived.insert(id.clone(), perceived);
        }
    }
}
