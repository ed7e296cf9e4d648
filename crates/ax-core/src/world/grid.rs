//! In-memory reference world: a bounded grid with resources and
//! hazards.
//!
//! Cells are seeded from the run's deterministic stream, so the same
//! seed produces the same terrain. The grid stands in for the real
//! environment behind the [`WorldProvider`] interface.

use std::collections::{BTreeMap, BTreeSet};

use ax_common::{AgentId, Result};
use ax_config::WorldSettings;
use ax_math::DetRng;

use crate::agent::data::{Capability, Position};
use crate::world::{
    Action, ActionOutcome, EntityKind, EntityView, Stimulus, StimulusKind, WorldProvider,
    WorldView,
};

/// Perception radius for stimuli.
const PERCEPTION_RADIUS: f64 = 3.0;
/// Interaction range between agents.
const INTERACT_RANGE: f64 = 1.5;
/// Energy restored by consuming one resource.
const RESOURCE_ENERGY: f64 = 20.0;
/// Energy lost when stepping onto a hazard.
const HAZARD_DAMAGE: f64 = 10.0;

/// Bounded grid world.
pub struct GridWorld {
    width: i64,
    height: i64,
    tick: u64,
    resources: BTreeSet<(i64, i64)>,
    hazards: BTreeSet<(i64, i64)>,
    agents: BTreeMap<AgentId, Position>,
}

impl GridWorld {
    /// Seed terrain from the deterministic stream.
    pub fn generate(settings: &WorldSettings, rng: &mut DetRng) -> Self {
        let mut resources = BTreeSet::new();
        let mut hazards = BTreeSet::new();
        for x in 0..settings.width {
            for y in 0..settings.height {
                let roll = rng.uniform01();
                if roll < settings.resource_density {
                    resources.insert((x, y));
                } else if roll < settings.resource_density + settings.danger_density {
                    hazards.insert((x, y));
                }
            }
        }
        GridWorld {
            width: settings.width,
            height: settings.height,
            tick: 0,
            resources,
            hazards,
            agents: BTreeMap::new(),
        }
    }

    pub fn resource_count(&self) -> usize {
        self.resources.len()
    }

    pub fn agent_position(&self, agent: AgentId) -> Option<Position> {
        self.agents.get(&agent).copied()
    }

    fn cell_of(position: &Position) -> (i64, i64) {
        (position.x.round() as i64, position.y.round() as i64)
    }

    fn clamp(&self, x: i64, y: i64) -> (i64, i64) {
        (x.clamp(0, self.width - 1), y.clamp(0, self.height - 1))
    }
}

impl WorldProvider for GridWorld {
    fn snapshot(&self) -> WorldView {
        let mut entities = Vec::new();
        let mut next_id = 0u64;
        for &(x, y) in &self.resources {
            entities.push(EntityView {
                id: next_id,
                kind: EntityKind::Resource,
                position: Position::new(x as f64, y as f64, 0.0),
            });
            next_id += 1;
        }
        for &(x, y) in &self.hazards {
            entities.push(EntityView {
                id: next_id,
                kind: EntityKind::Hazard,
                position: Position::new(x as f64, y as f64, 0.0),
            });
            next_id += 1;
        }
        for (&agent, &position) in &self.agents {
            entities.push(EntityView {
                id: next_id,
                kind: EntityKind::Agent(agent),
                position,
            });
            next_id += 1;
        }
        WorldView {
            tick: self.tick,
            width: self.width,
            height: self.height,
            entities,
        }
    }

    fn stimuli_for(
        &self,
        agent: AgentId,
        position: &Position,
        capabilities: &[Capability],
    ) -> Vec<Stimulus> {
        let mut out = Vec::new();
        if !capabilities.contains(&Capability::Perception) {
            return out;
        }
        for &(x, y) in &self.resources {
            let p = Position::new(x as f64, y as f64, 0.0);
            let dist = position.distance_to(&p);
            if dist <= PERCEPTION_RADIUS {
                out.push(Stimulus {
                    kind: StimulusKind::Visual,
                    salience: 1.0 / (1.0 + dist),
                    confidence: 0.9,
                    payload: vec![p.x - position.x, p.y - position.y, 1.0],
                    source: None,
                });
            }
        }
        for &(x, y) in &self.hazards {
            let p = Position::new(x as f64, y as f64, 0.0);
            let dist = position.distance_to(&p);
            if dist <= PERCEPTION_RADIUS {
                out.push(Stimulus {
                    kind: StimulusKind::Proximity,
                    salience: (1.0 / (1.0 + dist)).max(0.5),
                    confidence: 0.95,
                    payload: vec![p.x - position.x, p.y - position.y, -1.0],
                    source: None,
                });
            }
        }
        for (&other, &p) in &self.agents {
            if other == agent {
                continue;
            }
            let dist = position.distance_to(&p);
            if dist <= PERCEPTION_RADIUS {
                out.push(Stimulus {
                    kind: StimulusKind::Social,
                    salience: 1.0 / (1.0 + dist),
                    confidence: 0.8,
                    payload: vec![p.x - position.x, p.y - position.y, 0.0],
                    source: Some(other),
                });
            }
        }
        // Deterministic order: by kind, then salience descending.
        out.sort_by(|a, b| {
            format!("{:?}", a.kind)
                .cmp(&format!("{:?}", b.kind))
                .then_with(|| {
                    b.salience
                        .partial_cmp(&a.salience)
                        .unwrap_or(std::cmp::Ordering::Equal)
                })
        });
        out
    }

    fn apply_action(&mut self, agent: AgentId, action: &Action) -> Result<ActionOutcome> {
        let Some(position) = self.agents.get(&agent).copied() else {
            return Ok(ActionOutcome::failure(format!(
                "agent {agent} is not registered in the world"
            )));
        };
        let outcome = match action {
            Action::Wait | Action::Observe | Action::Communicate { .. } => {
                ActionOutcome::success()
            }
            Action::Move { dx, dy } => {
                let cell = Self::cell_of(&position);
                let (nx, ny) = self.clamp(cell.0 + dx.signum(), cell.1 + dy.signum());
                let new_position = Position::new(nx as f64, ny as f64, 0.0);
                self.agents.insert(agent, new_position);
                let mut outcome = ActionOutcome::success();
                outcome.new_position = Some(new_position);
                if self.hazards.contains(&(nx, ny)) {
                    outcome.delta_energy = -HAZARD_DAMAGE;
                }
                outcome
            }
            Action::Consume => {
                let cell = Self::cell_of(&position);
                if self.resources.remove(&cell) {
                    let mut outcome = ActionOutcome::success();
                    outcome.delta_energy = RESOURCE_ENERGY;
                    outcome
                } else {
                    ActionOutcome::failure("no resource on this cell")
                }
            }
            Action::Interact { target } => {
                let in_range = self.agents.iter().any(|(&other, &p)| {
                    other != agent
                        && target.map(|t| t == other).unwrap_or(true)
                        && position.distance_to(&p) <= INTERACT_RANGE
                });
                if in_range {
                    ActionOutcome::success()
                } else {
                    ActionOutcome::failure("no interaction partner in range")
                }
            }
        };
        Ok(outcome)
    }

    fn register_agent(&mut self, agent: AgentId, position: Position) {
        let (x, y) = self.clamp(position.x.round() as i64, position.y.round() as i64);
        self.agents
            .insert(agent, Position::new(x as f64, y as f64, 0.0));
    }

    fn remove_agent(&mut self, agent: AgentId) {
        self.agents.remove(&agent);
    }

    fn end_tick(&mut self) {
        self.tick += 1;
    }
}
