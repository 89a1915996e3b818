//! ECS components and per-session resources.

pub mod address;
pub mod agent;
pub mod conversation;
pub mod memory;
pub mod scratch;
pub mod spatial;
pub mod world;

pub use address::{Address, AddressError, AddressLevel};
pub use agent::{AgentId, CognitiveParams, Persona};
pub use conversation::{ConversationEnd, ConversationState, Conversations, Utterance};
pub use memory::{
    node_id, AssociativeMemory, Filling, MemoryKind, MemoryNode, MemoryQuery, NewMemory, Triple,
};
pub use scratch::{
    ActionTarget, CurrentAction, DailyPlan, ImportanceCounter, ObjectEvent, PlanStep, Scratch,
};
pub use spatial::SpatialMemory;
pub use world::{Tile, TileEvent, TilesNear, WorldGrid};
