//! Agent record: identity, embodiment, resources, and social state.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use ax_common::AgentId;

/// 3D position in the environment.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Position {
    pub x: f64,
    pub y: f64,
    pub z: f64,
}

impl Position {
    pub fn new(x: f64, y: f64, z: f64) -> Self {
        Position { x, y, z }
    }

    /// Euclidean distance to another position.
    pub fn distance_to(&self, other: &Position) -> f64 {
        let dx = self.x - other.x;
        let dy = self.y - other.y;
        let dz = self.z - other.z;
        (dx * dx + dy * dy + dz * dz).sqrt()
    }
}

/// Orientation as a unit quaternion.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Orientation {
    pub w: f64,
    pub x: f64,
    pub y: f64,
    pub z: f64,
}

impl Default for Orientation {
    fn default() -> Self {
        Orientation {
            w: 1.0,
            x: 0.0,
            y: 0.0,
            z: 0.0,
        }
    }
}

impl Orientation {
    /// Euler angles (roll, pitch, yaw).
    pub fn to_euler(&self) -> (f64, f64, f64) {
        let roll = (2.0 * (self.w * self.x + self.y * self.z))
            .atan2(1.0 - 2.0 * (self.x * self.x + self.y * self.y));
        let pitch = (2.0 * (self.w * self.y - self.z * self.x)).clamp(-1.0, 1.0).asin();
        let yaw = (2.0 * (self.w * self.z + self.x * self.y))
            .atan2(1.0 - 2.0 * (self.y * self.y + self.z * self.z));
        (roll, pitch, yaw)
    }
}

/// Big Five personality profile, every trait in [0, 1].
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Personality {
    pub openness: f64,
    pub conscientiousness: f64,
    pub extraversion: f64,
    pub agreeableness: f64,
    pub neuroticism: f64,
}

impl Default for Personality {
    fn default() -> Self {
        Personality {
            openness: 0.5,
            conscientiousness: 0.5,
            extraversion: 0.5,
            agreeableness: 0.5,
            neuroticism: 0.5,
        }
    }
}

impl Personality {
    pub fn to_vector(&self) -> [f64; 5] {
        [
            self.openness,
            self.conscientiousness,
            self.extraversion,
            self.agreeableness,
            self.neuroticism,
        ]
    }

    pub fn is_valid(&self) -> bool {
        self.to_vector().iter().all(|t| (0.0..=1.0).contains(t))
    }

    /// Scaling of the epistemic weight: open agents explore more.
    pub fn epistemic_scale(&self) -> f64 {
        0.5 + self.openness
    }

    /// Scaling of the pragmatic weight: conscientious agents pursue
    /// preferences more strictly.
    pub fn pragmatic_scale(&self) -> f64 {
        0.5 + self.conscientiousness
    }
}

/// Agent resource pools.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Resources {
    pub energy: f64,
    pub health: f64,
    pub memory_capacity: f64,
    pub memory_used: f64,
}

impl Default for Resources {
    fn default() -> Self {
        Resources {
            energy: 100.0,
            health: 100.0,
            memory_capacity: 100.0,
            memory_used: 0.0,
        }
    }
}

impl Resources {
    pub fn has_energy(&self, required: f64) -> bool {
        self.energy >= required
    }

    /// Spend energy, saturating at zero.
    pub fn consume_energy(&mut self, amount: f64) {
        self.energy = (self.energy - amount.max(0.0)).max(0.0);
    }

    /// Restore energy, capped at 100.
    pub fn restore_energy(&mut self, amount: f64) {
        self.energy = (self.energy + amount.max(0.0)).min(100.0);
    }
}

/// Capabilities that can be enabled per agent.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Capability {
    Movement,
    Perception,
    Communication,
    Memory,
    Learning,
    Planning,
    ResourceManagement,
    SocialInteraction,
}

/// Relationship kinds between agents.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RelationshipKind {
    Ally,
    Trade,
    Neutral,
    Rival,
}

/// Directed social relationship with trust in [0, 1].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Relationship {
    pub kind: RelationshipKind,
    pub trust: f64,
    pub interactions: u64,
    pub last_tick: u64,
}

impl Relationship {
    pub fn new(kind: RelationshipKind) -> Self {
        Relationship {
            kind,
            trust: 0.5,
            interactions: 0,
            last_tick: 0,
        }
    }

    /// Bounded trust adjustment, recording the interaction.
    pub fn update_trust(&mut self, delta: f64, tick: u64) {
        self.trust = (self.trust + delta).clamp(0.0, 1.0);
        self.interactions += 1;
        self.last_tick = tick;
    }
}

/// A prioritized goal, optionally with a deadline and a target.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Goal {
    pub name: String,
    pub priority: f64,
    pub deadline_tick: Option<u64>,
    pub target: Option<Position>,
}

impl Goal {
    pub fn is_expired(&self, tick: u64) -> bool {
        self.deadline_tick.map(|d| tick > d).unwrap_or(false)
    }
}

/// The agent's non-cognitive state: everything except the generative
/// model, belief, precision, and memories.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AgentRecord {
    pub id: AgentId,
    pub name: String,
    pub position: Position,
    pub orientation: Orientation,
    pub resources: Resources,
    pub personality: Personality,
    pub capabilities: Vec<Capability>,
    pub relationships: BTreeMap<AgentId, Relationship>,
    pub goals: Vec<Goal>,
    pub tick: u64,
}

impl AgentRecord {
    pub fn new(id: AgentId, name: impl Into<String>) -> Self {
        AgentRecord {
            id,
            name: name.into(),
            position: Position::default(),
            orientation: Orientation::default(),
            resources: Resources::default(),
            personality: Personality::default(),
            capabilities: vec![
                Capability::Movement,
                Capability::Perception,
                Capability::Memory,
                Capability::Planning,
            ],
            relationships: BTreeMap::new(),
            goals: Vec::new(),
            tick: 0,
        }
    }

    pub fn has_capability(&self, capability: Capability) -> bool {
        self.capabilities.contains(&capability)
    }

    pub fn add_capability(&mut self, capability: Capability) {
        if !self.has_capability(capability) {
            self.capabilities.push(capability);
            self.capabilities.sort();
        }
    }

    /// Relationship entry for a peer, created neutral on first contact.
    pub fn relationship_mut(&mut self, peer: AgentId) -> &mut Relationship {
        self.relationships
            .entry(peer)
            .or_insert_with(|| Relationship::new(RelationshipKind::Neutral))
    }

    /// Insert a goal keeping the list sorted by priority, descending.
    pub fn add_goal(&mut self, goal: Goal) {
        self.goals.push(goal);
        self.goals.sort_by(|a, b| {
            b.priority
                .partial_cmp(&a.priority)
                .unwrap_or(std::cmp::Ordering::Equal)
        });
    }

    /// Highest-priority unexpired goal.
    pub fn next_goal(&self, tick: u64) -> Option<&Goal> {
        self.goals.iter().find(|g| !g.is_expired(tick))
    }
}
