//! Commit System
//!
//! Writes the staged agents back onto the grid and builds the step's frame.
//! Runs last.

use bevy_ecs::prelude::*;
use town_events::{AgentFrame, StepFrame};

use crate::components::{Scratch, WorldGrid};
use crate::error::StateCorruptionError;

use super::{FaultLog, SimClock, StagedAgent, StepWork};

/// Places one staged agent and its events on the grid.
pub fn annotate_agent(grid: &mut WorldGrid, staged: &StagedAgent) -> Result<(), StateCorruptionError> {
    let agent = staged.id.as_str();
    if !grid.in_bounds(staged.tile) {
        return Err(StateCorruptionError::OutOfBounds {
            agent: agent.to_string(),
            tile: staged.tile,
        });
    }
    if !grid.is_walkable(staged.tile) {
        return Err(StateCorruptionError::BlockedTile {
            agent: agent.to_string(),
            tile: staged.tile,
        });
    }
    grid.place_occupant(staged.tile, agent, &staged.activity);
    grid.add_event(staged.tile, staged.event.clone());
    if let Some(object_event) = &staged.object_event {
        grid.add_event(staged.tile, object_event.clone());
    }
    Ok(())
}

/// Frame entry for one staged agent.
pub fn agent_frame(staged: &StagedAgent) -> AgentFrame {
    AgentFrame::new(staged.tile, staged.activity.clone())
        .with_emoji(staged.emoji.clone())
        .with_path(staged.path.clone())
}

/// System to rebuild grid annotations and record the frame.
pub fn commit(
    clock: Res<SimClock>,
    mut grid: ResMut<WorldGrid>,
    mut work: ResMut<StepWork>,
    mut faults: ResMut<FaultLog>,
    mut agents: Query<&mut Scratch>,
) {
    grid.clear_annotations();
    let mut frame = StepFrame::new(clock.step(), clock.now());
    let staged = std::mem::take(&mut work.staged);
    for agent in &staged {
        if let Err(fault) = annotate_agent(&mut grid, agent) {
            faults.push(fault);
        }
        let mut entry = agent_frame(agent);
        if let Some(lines) = work.chat_lines.get(&agent.id) {
            entry = entry.with_chat(lines.clone());
        }
        frame.agents.insert(agent.id.0.clone(), entry);
    }

    for mut scratch in agents.iter_mut() {
        scratch.tick_cooldowns();
    }
    work.frame = Some(frame);
}
