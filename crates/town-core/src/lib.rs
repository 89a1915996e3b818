//! Agent Town Simulation Library
//!
//! Generative agents on a tile map: each step every agent perceives what is
//! near, recalls related memories, plans, reflects and acts. Text comes from a
//! pluggable generation capability.

use bevy_ecs::prelude::*;
use rand::rngs::SmallRng;
use rand::SeedableRng;

pub mod components;
pub mod config;
pub mod error;
pub mod events;
pub mod generation;
pub mod interventions;
pub mod output;
pub mod scoring;
pub mod setup;
pub mod simulation;
pub mod systems;

#[cfg(any(test, feature = "test-fixtures"))]
pub mod fixtures;

pub use components::*;
pub use config::SimConfig;
pub use error::{ConfigurationError, GenerationError, SimError, StateCorruptionError, UnreachableError};
pub use events::FrameLogger;
pub use generation::Capabilities;
pub use interventions::{Command, CommandOutcome};
pub use output::SessionSnapshot;
pub use simulation::Simulation;

/// Seeded random number generator resource
#[derive(Resource)]
pub struct SimRng(pub SmallRng);

impl SimRng {
    /// The generator for one step. Depends only on the seed and the step
    /// number, so a resumed session draws the same numbers.
    pub fn for_step(seed: u64, step: u64) -> Self {
        Self(SmallRng::seed_from_u64(
            seed ^ step.wrapping_mul(0x9E37_79B9_7F4A_7C15),
        ))
    }
}
