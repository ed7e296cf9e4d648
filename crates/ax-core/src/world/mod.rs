//! External collaborator interfaces.
//!
//! The core consumes three narrow interfaces: the world (snapshots,
//! stimuli, action application), the message bus (send and per-tick
//! drain), and the persistence store. In-memory reference
//! implementations live in [`grid`], [`bus`], and [`store`]; anything
//! honoring these traits can replace them.

pub mod bus;
pub mod grid;
pub mod store;

pub use bus::InMemoryBus;
pub use grid::GridWorld;
pub use store::JsonStore;

use serde::{Deserialize, Serialize};

use ax_common::{AgentId, Result};

use crate::agent::data::{Capability, Position};

/// Stimulus kinds an agent can perceive.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StimulusKind {
    Visual,
    Auditory,
    Proximity,
    Social,
    Internal,
}

impl StimulusKind {
    /// All modalities, in observation-vector order.
    pub const ALL: [StimulusKind; 5] = [
        StimulusKind::Visual,
        StimulusKind::Auditory,
        StimulusKind::Proximity,
        StimulusKind::Social,
        StimulusKind::Internal,
    ];
}

/// One perceived stimulus.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Stimulus {
    pub kind: StimulusKind,
    /// Salience in [0, 1]; higher stimuli dominate the observation.
    pub salience: f64,
    /// Sensor confidence in [0, 1].
    pub confidence: f64,
    pub payload: Vec<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub source: Option<AgentId>,
}

/// Immutable view of an entity in a world snapshot.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EntityView {
    pub id: u64,
    pub kind: EntityKind,
    pub position: Position,
}

/// Entity kinds visible in snapshots.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntityKind {
    Agent(AgentId),
    Resource,
    Hazard,
}

/// Immutable world snapshot shared by every agent within one tick.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorldView {
    pub tick: u64,
    pub width: i64,
    pub height: i64,
    pub entities: Vec<EntityView>,
}

/// Primitive actions an agent can emit.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Action {
    /// Do nothing; the zero-cost fallback.
    Wait,
    /// Spend the tick sharpening perception.
    Observe,
    Move {
        dx: i64,
        dy: i64,
    },
    Interact {
        #[serde(skip_serializing_if = "Option::is_none")]
        target: Option<AgentId>,
    },
    /// Consume a resource on the current cell.
    Consume,
    Communicate {
        #[serde(skip_serializing_if = "Option::is_none")]
        to: Option<AgentId>,
        #[serde(rename = "message_kind")]
        kind: MessageKind,
        payload: serde_json::Value,
    },
}

impl Action {
    /// Stable name for traces and logs.
    pub fn name(&self) -> &'static str {
        match self {
            Action::Wait => "wait",
            Action::Observe => "observe",
            Action::Move { .. } => "move",
            Action::Interact { .. } => "interact",
            Action::Consume => "consume",
            Action::Communicate { .. } => "communicate",
        }
    }

    /// Energy required to attempt the action.
    pub fn energy_cost(&self) -> f64 {
        match self {
            Action::Wait => 0.0,
            Action::Observe => 0.5,
            Action::Move { .. } => 2.0,
            Action::Interact { .. } => 3.0,
            Action::Consume => 1.0,
            Action::Communicate { .. } => 1.0,
        }
    }
}

/// Result of applying an action to the world.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActionOutcome {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub new_position: Option<Position>,
    /// Energy change beyond the action's own cost (resource gains,
    /// hazard damage).
    pub delta_energy: f64,
    pub observed_entities: Vec<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub failure_reason: Option<String>,
}

impl ActionOutcome {
    pub fn success() -> Self {
        ActionOutcome {
            success: true,
            new_position: None,
            delta_energy: 0.0,
            observed_entities: Vec::new(),
            failure_reason: None,
        }
    }

    pub fn failure(reason: impl Into<String>) -> Self {
        ActionOutcome {
            success: false,
            new_position: None,
            delta_energy: 0.0,
            observed_entities: Vec::new(),
            failure_reason: Some(reason.into()),
        }
    }
}

/// Message kinds on the bus.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MessageKind {
    Text,
    TradeOffer,
    Knowledge,
    Warning,
}

/// One message between agents.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    pub id: String,
    pub from: AgentId,
    /// None broadcasts to every registered agent.
    pub to: Option<AgentId>,
    pub kind: MessageKind,
    pub payload: serde_json::Value,
    /// Tick the message was sent.
    pub tick: u64,
}

/// World collaborator interface.
///
/// `Sync` so the optional worker pool can share one frozen world
/// within a tick; all mutation goes through `apply_action` and
/// `end_tick`, which the scheduler calls only between agent updates.
pub trait WorldProvider: Send + Sync {
    /// Immutable snapshot for this tick.
    fn snapshot(&self) -> WorldView;

    /// Stimuli visible to an agent at a position.
    fn stimuli_for(
        &self,
        agent: AgentId,
        position: &Position,
        capabilities: &[Capability],
    ) -> Vec<Stimulus>;

    /// Apply one action; invoked only between agent updates.
    fn apply_action(&mut self, agent: AgentId, action: &Action) -> Result<ActionOutcome>;

    /// Register an agent's presence at a position.
    fn register_agent(&mut self, agent: AgentId, position: Position);

    /// Remove a retired agent.
    fn remove_agent(&mut self, agent: AgentId);

    /// Called by the scheduler after action application, before the
    /// next tick's snapshot.
    fn end_tick(&mut self) {}
}

/// Messaging collaborator interface.
pub trait MessageBus: Send {
    /// Queue a message; delivery happens at the start of the next tick.
    fn send(&mut self, message: Message) -> Result<()>;

    /// Deliver this tick's inbox for one recipient.
    fn drain(&mut self, to: AgentId) -> Vec<Message>;

    /// Move queued messages into inboxes; called between ticks.
    fn flush(&mut self, recipients: &[AgentId]);
}

/// Persistence collaborator interface.
pub trait PersistenceStore: Send {
    fn save_agent(&mut self, snapshot: &crate::agent::PersistedAgent) -> Result<()>;
    fn load_agent(&self, id: AgentId) -> Result<crate::agent::PersistedAgent>;
    fn list_agents(&self) -> Result<Vec<AgentId>>;
    fn delete_agent(&mut self, id: AgentId) -> Result<()>;
}
