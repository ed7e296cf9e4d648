//! Agents: data model, state machine, memory, perception, and the
//! per-tick cognitive update.

pub mod data;
pub mod memory;
pub mod perception;
pub mod state_machine;
pub mod update;

pub use data::{
    AgentRecord, Capability, Goal, Orientation, Personality, Position, Relationship,
    RelationshipKind, Resources,
};
pub use memory::{Episode, EpisodicMemory, LongTermMemory, MemorySystem, WorkingMemory};
pub use perception::{ActionMapper, ObservationEncoder};
pub use state_machine::{StateMachine, Status};
pub use update::{
    build_agent, AgentSpec, AgentTickOutput, CognitiveAgent, PersistedAgent, StateSummary,
};
