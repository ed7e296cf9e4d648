//! The per-agent cognitive update.
//!
//! One tick runs: perceive -> encode observation -> infer -> adapt
//! precision -> score policies -> plan -> gate and select the action
//! -> record the experience -> learn -> consolidate memory. Errors are
//! caught here: degenerate observations, exhausted budgets, and
//! exhausted resources recover locally; invariant violations and
//! invalid transitions force `error` status. The scheduler applies the
//! returned action to the world between updates.

use std::time::Instant;

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use ax_common::{AgentId, Error, Result, SCHEMA_VERSION};
use ax_config::Settings;
use ax_math::{DetRng, Matrix};

use crate::belief::Belief;
use crate::inference::Engine;
use crate::model::{Dimensions, DirichletLearner, DiscreteModel, Experience};
use crate::pipeline::{BeliefUpdater, HierarchicalUpdater, ObservationMap, PipelineUpdate};
use crate::planner::Planner;
use crate::policy::{HabitPrior, PolicySelector};
use crate::precision::{HierarchicalPrecision, ModalityPrecision};
use crate::world::{Action, Message, MessageKind, Stimulus, StimulusKind, WorldProvider};

use super::data::{AgentRecord, Capability, Personality, Position};
use super::memory::{Episode, MemorySystem};
use super::perception::{ActionMapper, ObservationEncoder};
use super::state_machine::{StateMachine, Status};

/// Logit gain mapping modality intensities to soft observations.
const OBS_GAIN: f64 = 4.0;

/// Leading candidates re-scored by the sophisticated refinement pass.
const SOPHISTICATED_TOP_K: usize = 3;

/// Declarative agent specification consumed by the factory.
#[derive(Debug, Clone)]
pub struct AgentSpec {
    pub name: String,
    pub preset: String,
    pub position: Position,
    /// Overrides the preset model when supplied.
    pub model: Option<DiscreteModel>,
}

/// What one update emits back to the scheduler.
#[derive(Debug, Clone)]
pub struct AgentTickOutput {
    pub action: Action,
    pub status: Status,
    /// Recoverable problems encountered during the update.
    pub warnings: Vec<String>,
}

/// Diagnostic summary for `inspect`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StateSummary {
    pub id: AgentId,
    pub name: String,
    pub status: Status,
    pub position: Position,
    pub energy: f64,
    pub tick: u64,
    pub belief_entropy: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_free_energy: Option<f64>,
    pub precision: Vec<f64>,
    pub memory_pressure: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_action: Option<String>,
}

/// Serializable snapshot of everything an agent owns.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PersistedAgent {
    pub schema_version: String,
    pub record: AgentRecord,
    pub state: StateMachine,
    pub model: DiscreteModel,
    pub belief: Belief,
    pub precision: ModalityPrecision,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub precision_hierarchy: Option<HierarchicalPrecision>,
    /// Per-level beliefs of the hierarchical pipeline, bottom first.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub level_beliefs: Vec<Belief>,
    pub memory: MemorySystem,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub learner: Option<DirichletLearner>,
    pub habit: HabitPrior,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_action: Option<usize>,
}

/// A full agent: record plus cognitive machinery.
pub struct CognitiveAgent {
    pub record: AgentRecord,
    state: StateMachine,
    model: DiscreteModel,
    belief: Belief,
    engine: Engine,
    pipeline: BeliefUpdater,
    /// Present when `pipeline.hierarchy_levels > 1`.
    hierarchy: Option<HierarchicalUpdater>,
    /// Per-level beliefs for the hierarchy, bottom first.
    level_beliefs: Vec<Belief>,
    precision: ModalityPrecision,
    /// Present when `precision.levels > 1`.
    precision_hierarchy: Option<HierarchicalPrecision>,
    selector: PolicySelector,
    planner: Planner,
    memory: MemorySystem,
    learner: Option<DirichletLearner>,
    habit: HabitPrior,
    encoder: ObservationEncoder,
    mapper: ActionMapper,
    rng: DetRng,
    confidence_threshold: f64,
    min_action_energy: f64,
    last_action: Option<usize>,
    last_free_energy: Option<f64>,
    /// Set when a wall-budget timeout forced `error` for one tick;
    /// cleared by the automatic reset at the next update.
    timed_out: bool,
}

impl CognitiveAgent {
    pub fn id(&self) -> AgentId {
        self.record.id
    }

    pub fn status(&self) -> Status {
        self.state.status()
    }

    pub fn belief(&self) -> &Belief {
        &self.belief
    }

    pub fn model(&self) -> &DiscreteModel {
        &self.model
    }

    pub fn memory(&self) -> &MemorySystem {
        &self.memory
    }

    /// Force the terminal error state.
    pub fn force_error(&mut self) {
        self.state.force_error();
    }

    /// Reset out of `error`.
    pub fn reset(&mut self) -> Result<()> {
        self.state.reset()
    }

    /// Take the agent offline (valid from `idle` only).
    pub fn go_offline(&mut self) -> Result<()> {
        self.state.transition(Status::Offline)
    }

    /// Restart out of `offline`.
    pub fn restart(&mut self) -> Result<()> {
        self.state.restart()
    }

    pub fn summary(&self) -> StateSummary {
        StateSummary {
            id: self.record.id,
            name: self.record.name.clone(),
            status: self.state.status(),
            position: self.record.position,
            energy: self.record.resources.energy,
            tick: self.record.tick,
            belief_entropy: self.belief.entropy(),
            last_free_energy: self.last_free_energy,
            precision: self.precision.precisions(),
            memory_pressure: self.memory.pressure(),
            last_action: self.last_action.map(|a| self.mapper.action_for(a).name().to_string()),
        }
    }

    /// One cognitive tick. The world reference is read-only; the
    /// returned action is applied by the scheduler afterwards.
    pub fn update(
        &mut self,
        world: &dyn WorldProvider,
        inbox: Vec<Message>,
        tick: u64,
        deadline: Option<Instant>,
    ) -> AgentTickOutput {
        let mut warnings = Vec::new();
        // A timeout parks the agent in `error` for exactly one tick.
        if self.timed_out && self.state.status() == Status::Error {
            self.timed_out = false;
            let _ = self.state.reset();
        }
        // Terminal states do no cognitive work until reset/restart.
        if matches!(self.state.status(), Status::Error | Status::Offline) {
            return AgentTickOutput {
                action: Action::Wait,
                status: self.state.status(),
                warnings,
            };
        }
        match self.update_inner(world, inbox, tick, deadline, &mut warnings) {
            Ok(action) => AgentTickOutput {
                action,
                status: self.state.status(),
                warnings,
            },
            Err(err @ Error::BudgetExceeded { .. }) => {
                // Aborted at a suspension point; skipped for this tick.
                warn!(agent = %self.record.id, error = %err, "update timed out");
                warnings.push(err.to_string());
                self.state.force_error();
                self.timed_out = true;
                AgentTickOutput {
                    action: Action::Wait,
                    status: Status::Error,
                    warnings,
                }
            }
            Err(err) => {
                if err.is_recoverable() {
                    warnings.push(err.to_string());
                    AgentTickOutput {
                        action: Action::Wait,
                        status: self.state.status(),
                        warnings,
                    }
                } else {
                    warn!(agent = %self.record.id, error = %err, "update failed; agent isolated");
                    self.state.force_error();
                    warnings.push(err.to_string());
                    AgentTickOutput {
                        action: Action::Wait,
                        status: Status::Error,
                        warnings,
                    }
                }
            }
        }
    }

    fn update_inner(
        &mut self,
        world: &dyn WorldProvider,
        inbox: Vec<Message>,
        tick: u64,
        deadline: Option<Instant>,
        warnings: &mut Vec<String>,
    ) -> Result<Action> {
        self.record.tick = tick;

        // 1. Perceive: world stimuli plus message- and body-derived ones.
        let mut stimuli = world.stimuli_for(
            self.record.id,
            &self.record.position,
            &self.record.capabilities,
        );
        stimuli.extend(self.message_stimuli(&inbox, tick));
        stimuli.push(self.interoception());

        // Suspension point: perception done.
        check_deadline(deadline, "perception")?;

        // 2-3. Encode, then fuse through the belief-update pipeline.
        let encoded = self.encoder.encode(&stimuli);
        let previous_belief = self.belief.clone();
        let updated = match self.hierarchy.as_mut() {
            Some(hierarchy) => {
                let models: Vec<&DiscreteModel> = vec![&self.model; hierarchy.depth()];
                let mut features = vec![Vec::new(); hierarchy.depth()];
                features[0] = encoded.clone();
                let levels =
                    hierarchy.update(&models, &mut self.engine, &self.level_beliefs, &features)?;
                self.level_beliefs = levels;
                PipelineUpdate {
                    belief: self.level_beliefs[0].clone(),
                    warning: None,
                }
            }
            None => self.pipeline.update(
                &self.model,
                &mut self.engine,
                &previous_belief,
                &encoded,
                self.last_action,
                Some(&previous_belief),
            )?,
        };
        if let Some(warning) = &updated.warning {
            warnings.push(warning.clone());
        }
        self.belief = updated.belief;
        let states = self.model.dims().states;
        let belief_cat = self.belief.to_categorical(states);

        // Free energy and per-modality prediction error.
        let predicted_obs = self.model.predict_obs(&belief_cat)?;
        if let Some(dominant) = self.encoder.dominant(&encoded) {
            self.last_free_energy = Some(crate::inference::discrete_free_energy(
                &belief_cat,
                dominant,
                &self.model,
                &previous_belief.to_categorical(states),
            )?);
        }
        let errors: Vec<f64> = encoded
            .iter()
            .zip(predicted_obs.iter())
            .map(|(o, p)| o - p)
            .collect();
        let uncertainties = vec![self.belief.entropy(); errors.len()];
        self.precision.update(&errors, &uncertainties);
        if let Some(hierarchy) = self.precision_hierarchy.as_mut() {
            // Each level samples the error stream at twice the
            // interval of the one below.
            let mean_error =
                errors.iter().map(|e| e.abs()).sum::<f64>() / errors.len().max(1) as f64;
            let per_level: Vec<f64> = (0..hierarchy.depth())
                .map(|level| {
                    if tick % (1u64 << level.min(16)) == 0 {
                        mean_error
                    } else {
                        f64::NAN
                    }
                })
                .collect();
            hierarchy.update(&per_level);
        }

        // Suspension point: inference done.
        check_deadline(deadline, "inference")?;

        // 4-5. Score policies, refine the leading candidates, then
        // plan under the compute budget.
        self.enter_planning()?;
        let precision_scale = match &self.precision_hierarchy {
            // The bottom level carries the fastest, most local estimate.
            Some(hierarchy) => hierarchy.precisions()[0],
            None => self.precision.mean_precision(),
        };
        let selection = self.selector.select(
            &self.model,
            &belief_cat,
            precision_scale,
            Some(&self.habit),
            &mut self.rng,
            true,
        )?;
        let refined = self.selector.refine_sophisticated(
            &self.model,
            &belief_cat,
            &selection,
            SOPHISTICATED_TOP_K,
        )?;
        let refined_efe = self
            .selector
            .evaluator()
            .evaluate(&self.model, &belief_cat, &refined)?
            .efe;
        let plan = self.planner.plan(&self.model, &belief_cat, &mut self.rng)?;
        if plan.degenerate {
            self.state.force_error();
            return Ok(Action::Wait);
        }
        if plan.budget_exceeded {
            warnings.push("planner budget exhausted; best-effort policy".into());
        }

        // Suspension point: planning done.
        check_deadline(deadline, "planning")?;

        // 6. Gate and select the action: the refined selection wins
        // when the tree search could not beat it.
        let chosen_policy = if refined_efe < plan.efe {
            &refined
        } else {
            &plan.policy
        };
        let mut action_index = chosen_policy.first().unwrap_or(0);
        if selection.confidence < self.confidence_threshold {
            if let Some(observe) = self.mapper.observe_index() {
                debug!(agent = %self.record.id, confidence = selection.confidence,
                    "low policy confidence; observing instead");
                action_index = observe;
            }
        }
        let mut action = self.mapper.action_for(action_index);
        if self.record.resources.energy < self.min_action_energy + action.energy_cost() {
            warnings.push(
                Error::ResourceExhausted {
                    resource: "energy".into(),
                    available: self.record.resources.energy,
                    required: self.min_action_energy + action.energy_cost(),
                }
                .to_string(),
            );
            action_index = 0;
            action = Action::Wait;
        }

        // Goal steering: movement follows the active goal's target.
        if matches!(action, Action::Move { .. }) {
            if let Some(target) = self.record.next_goal(tick).and_then(|g| g.target) {
                let dx = (target.x - self.record.position.x).round() as i64;
                let dy = (target.y - self.record.position.y).round() as i64;
                if dx != 0 || dy != 0 {
                    action = Action::Move {
                        dx: dx.signum(),
                        dy: dy.signum(),
                    };
                }
            }
        }

        // Social side effects of the inbox.
        self.absorb_messages(&inbox, tick);

        // 7. Status follows the action kind; the world effect lands later.
        let next_status = match &action {
            Action::Move { .. } => Status::Moving,
            Action::Interact { .. } | Action::Communicate { .. } | Action::Consume => {
                Status::Interacting
            }
            Action::Wait | Action::Observe => Status::Idle,
        };
        self.state.transition(next_status)?;

        // 8. Learn: record the experience, update parameters.
        self.learn_step(&previous_belief, &encoded, action_index, &belief_cat, tick)?;

        // 9. Consolidate on the configured cadence.
        let consolidated = self.memory.maybe_consolidate(tick);
        if consolidated > 0 {
            debug!(agent = %self.record.id, consolidated, "memory consolidation pass");
        }

        self.habit.record(action_index);
        self.last_action = Some(action_index);
        Ok(action)
    }

    /// Apply the world's verdict on the executed action.
    pub fn apply_outcome(&mut self, action: &Action, outcome: &crate::world::ActionOutcome) {
        self.record.resources.consume_energy(action.energy_cost());
        if outcome.success {
            if let Some(position) = outcome.new_position {
                self.record.position = position;
            }
            if outcome.delta_energy >= 0.0 {
                self.record.resources.restore_energy(outcome.delta_energy);
            } else {
                self.record.resources.consume_energy(-outcome.delta_energy);
            }
        } else if matches!(
            self.state.status(),
            Status::Moving | Status::Interacting
        ) {
            // The world refused the action; settle back to idle.
            let _ = self.state.transition(Status::Idle);
        }
    }

    /// Synthetic stimuli derived from the inbox: warnings raise the
    /// proximity modality, social messages the social one.
    fn message_stimuli(&self, inbox: &[Message], _tick: u64) -> Vec<Stimulus> {
        inbox
            .iter()
            .map(|message| match message.kind {
                MessageKind::Warning => Stimulus {
                    kind: StimulusKind::Proximity,
                    salience: 1.0,
                    confidence: self.trust_in(message.from),
                    payload: vec![],
                    source: Some(message.from),
                },
                _ => Stimulus {
                    kind: StimulusKind::Social,
                    salience: 0.6,
                    confidence: self.trust_in(message.from),
                    payload: vec![],
                    source: Some(message.from),
                },
            })
            .collect()
    }

    /// Internal body signal: hunger grows as energy drains.
    fn interoception(&self) -> Stimulus {
        Stimulus {
            kind: StimulusKind::Internal,
            salience: 1.0 - (self.record.resources.energy / 100.0).clamp(0.0, 1.0),
            confidence: 1.0,
            payload: vec![self.record.resources.energy],
            source: None,
        }
    }

    fn trust_in(&self, peer: AgentId) -> f64 {
        self.record
            .relationships
            .get(&peer)
            .map(|r| r.trust)
            .unwrap_or(0.5)
    }

    /// Trust bookkeeping for received messages.
    fn absorb_messages(&mut self, inbox: &[Message], tick: u64) {
        for message in inbox {
            let delta = match message.kind {
                MessageKind::Knowledge | MessageKind::Warning => 0.05,
                MessageKind::Text => 0.01,
                MessageKind::TradeOffer => 0.0,
            };
            self.record
                .relationship_mut(message.from)
                .update_trust(delta, tick);
        }
    }

    /// Move into planning through idle, wherever the last tick ended.
    fn enter_planning(&mut self) -> Result<()> {
        if matches!(
            self.state.status(),
            Status::Moving | Status::Interacting
        ) {
            self.state.transition(Status::Idle)?;
        }
        self.state.transition(Status::Planning)
    }

    fn learn_step(
        &mut self,
        previous_belief: &Belief,
        encoded: &[f64],
        action_index: usize,
        belief_cat: &[f64],
        tick: u64,
    ) -> Result<()> {
        let states = self.model.dims().states;
        let observation = self.encoder.dominant(encoded).unwrap_or(0);
        let error_magnitude: f64 = self
            .last_free_energy
            .map(|f| (f.abs() / 10.0).clamp(0.0, 1.0))
            .unwrap_or(0.5);
        self.memory.episodic.record(Episode {
            tick,
            state: belief_cat.to_vec(),
            observation,
            action: action_index,
            outcome: String::new(),
            reward: 0.0,
            importance: error_magnitude,
        });
        self.memory
            .working
            .put(format!("belief@{tick}"), belief_cat.to_vec());
        self.record.resources.memory_used =
            self.memory.pressure() * self.record.resources.memory_capacity;

        if let Some(learner) = self.learner.as_mut() {
            let previous = self.state.status();
            self.state.transition(Status::Learning)?;
            learner.record(&Experience {
                prior_belief: previous_belief.to_categorical(states),
                observation,
                action: self.last_action.unwrap_or(action_index),
                posterior_belief: belief_cat.to_vec(),
            })?;
            learner.apply(&mut self.model)?;
            self.state.transition(previous)?;
        }
        Ok(())
    }

    /// Replay episodic memory through one batch EM pass.
    ///
    /// Consecutive episodes pair up into `(b, o, u, b')` experiences;
    /// the Dirichlet learner accumulates the whole batch and refreshes
    /// the model once. Returns how many experiences were replayed.
    pub fn batch_learn(&mut self) -> Result<usize> {
        if self.learner.is_none() {
            return Ok(0);
        }
        let experiences: Vec<Experience> = {
            let mut episodes = self.memory.episodic.recent(usize::MAX);
            episodes.reverse(); // oldest first
            episodes
                .windows(2)
                .map(|pair| Experience {
                    prior_belief: pair[0].state.clone(),
                    observation: pair[1].observation,
                    action: pair[1].action,
                    posterior_belief: pair[1].state.clone(),
                })
                .collect()
        };
        if experiences.is_empty() {
            return Ok(0);
        }
        let learner = self.learner.as_mut().expect("checked above");
        learner.em_update(&mut self.model, &experiences)?;
        Ok(experiences.len())
    }

    /// Snapshot everything the agent owns.
    pub fn persist(&self) -> PersistedAgent {
        PersistedAgent {
            schema_version: SCHEMA_VERSION.to_string(),
            record: self.record.clone(),
            state: self.state.clone(),
            model: self.model.clone(),
            belief: self.belief.clone(),
            precision: self.precision.clone(),
            precision_hierarchy: self.precision_hierarchy.clone(),
            level_beliefs: self.level_beliefs.clone(),
            memory: self.memory.clone(),
            learner: self.learner.clone(),
            habit: self.habit.clone(),
            last_action: self.last_action,
        }
    }

    /// Rebuild an agent from a snapshot plus run settings.
    pub fn restore(snapshot: PersistedAgent, settings: &Settings) -> Result<Self> {
        if !ax_common::schema::is_compatible(&snapshot.schema_version) {
            return Err(Error::SchemaMismatch {
                expected: SCHEMA_VERSION.to_string(),
                actual: snapshot.schema_version,
            });
        }
        snapshot.model.validate()?;
        let dims = snapshot.model.dims();
        let seed = settings.seed;
        let stream = snapshot.record.id.value();

        let hierarchy = build_hierarchy(settings, dims)?;
        let depth = settings.pipeline.hierarchy_levels;
        let level_beliefs = if depth > 1 {
            if snapshot.level_beliefs.len() == depth {
                snapshot.level_beliefs
            } else {
                vec![Belief::uniform(dims.states); depth]
            }
        } else {
            Vec::new()
        };
        let precision_hierarchy = if settings.precision.levels > 1 {
            match snapshot.precision_hierarchy {
                Some(h) if h.depth() == settings.precision.levels => Some(h),
                _ => Some(HierarchicalPrecision::new(
                    settings.precision.levels,
                    &settings.precision,
                )?),
            }
        } else {
            None
        };

        Ok(CognitiveAgent {
            engine: Engine::from_settings(&settings.inference, seed ^ stream),
            pipeline: build_pipeline(settings, dims),
            hierarchy,
            level_beliefs,
            precision_hierarchy,
            selector: personality_selector(&settings.policy, &snapshot.record.personality),
            planner: Planner::new(&settings.planning, &settings.policy),
            encoder: ObservationEncoder::new(dims.observations),
            mapper: ActionMapper::standard(dims.actions),
            rng: DetRng::fork(seed, stream),
            confidence_threshold: settings.policy.confidence_threshold,
            min_action_energy: settings.agents.min_action_energy,
            last_free_energy: None,
            timed_out: false,
            record: snapshot.record,
            state: snapshot.state,
            model: snapshot.model,
            belief: snapshot.belief,
            precision: snapshot.precision,
            memory: snapshot.memory,
            learner: snapshot.learner,
            habit: snapshot.habit,
            last_action: snapshot.last_action,
        })
    }
}

fn check_deadline(deadline: Option<Instant>, phase: &str) -> Result<()> {
    match deadline {
        Some(deadline) if Instant::now() >= deadline => Err(Error::BudgetExceeded {
            phase: phase.to_string(),
            spent: "agent wall budget".into(),
            limit: "agent wall budget".into(),
        }),
        _ => Ok(()),
    }
}

/// Personality-scaled policy selector.
fn personality_selector(
    policy: &ax_config::PolicySettings,
    personality: &Personality,
) -> PolicySelector {
    let evaluator = crate::policy::EfeEvaluator::new(policy).with_scaled_weights(
        personality.epistemic_scale(),
        personality.pragmatic_scale(),
    );
    PolicySelector::new(policy).with_evaluator(evaluator)
}

/// Observation map over the agent's own modality slots: a scaled
/// identity logit map, so stimulus intensities become soft
/// observations directly.
fn identity_observation_map(observations: usize) -> ObservationMap {
    let mut weights = Matrix::zeros(observations, observations);
    for i in 0..observations {
        weights.set(i, i, OBS_GAIN);
    }
    ObservationMap::Linear { weights }
}

fn build_pipeline(settings: &Settings, dims: Dimensions) -> BeliefUpdater {
    BeliefUpdater::new(
        &settings.pipeline,
        identity_observation_map(dims.observations),
    )
}

/// Hierarchical updater when more than one level is configured: same
/// observation map per level, identity coupling between the equal-size
/// levels.
fn build_hierarchy(settings: &Settings, dims: Dimensions) -> Result<Option<HierarchicalUpdater>> {
    let levels = settings.pipeline.hierarchy_levels;
    if levels <= 1 {
        return Ok(None);
    }
    let updaters = (0..levels)
        .map(|_| build_pipeline(settings, dims))
        .collect();
    let mut eye = Matrix::zeros(dims.states, dims.states);
    for s in 0..dims.states {
        eye.set(s, s, 1.0);
    }
    let coupling = vec![eye; levels - 1];
    HierarchicalUpdater::new(updaters, coupling, settings.pipeline.top_down).map(Some)
}

/// Build an agent from a spec: preset personality and capabilities, a
/// preset (or supplied) model, and streams forked from the run seed.
pub fn build_agent(spec: &AgentSpec, settings: &Settings, id: AgentId) -> Result<CognitiveAgent> {
    let seed = settings.seed;
    let mut rng = DetRng::fork(seed, id.value());

    let mut record = AgentRecord::new(id, spec.name.clone());
    record.position = spec.position;
    apply_preset(&mut record, &spec.preset)?;
    record.resources.energy = settings.agents.initial_energy;
    record.resources.health = settings.agents.initial_health;
    record.resources.memory_capacity = settings.agents.memory_capacity;

    let model = match &spec.model {
        Some(model) => {
            model.validate()?;
            model.clone()
        }
        None => preset_model(&spec.preset, settings, &mut rng)?,
    };
    let dims = model.dims();

    let learner = if settings.agents.online_learning {
        Some(DirichletLearner::new(
            dims,
            settings.agents.dirichlet_concentration.unwrap_or(1.0),
            settings.agents.learning_eta,
        )?)
    } else {
        None
    };

    let hierarchy = build_hierarchy(settings, dims)?;
    let level_beliefs = if settings.pipeline.hierarchy_levels > 1 {
        vec![Belief::uniform(dims.states); settings.pipeline.hierarchy_levels]
    } else {
        Vec::new()
    };
    let precision_hierarchy = if settings.precision.levels > 1 {
        Some(HierarchicalPrecision::new(
            settings.precision.levels,
            &settings.precision,
        )?)
    } else {
        None
    };

    Ok(CognitiveAgent {
        belief: Belief::uniform(dims.states),
        engine: Engine::from_settings(&settings.inference, seed ^ id.value()),
        pipeline: build_pipeline(settings, dims),
        hierarchy,
        level_beliefs,
        precision: ModalityPrecision::new(dims.observations, &settings.precision)?,
        precision_hierarchy,
        selector: personality_selector(&settings.policy, &record.personality),
        planner: Planner::new(&settings.planning, &settings.policy),
        memory: MemorySystem::new(&settings.memory),
        learner,
        habit: HabitPrior::new(dims.actions),
        encoder: ObservationEncoder::new(dims.observations),
        mapper: ActionMapper::standard(dims.actions),
        rng,
        confidence_threshold: settings.policy.confidence_threshold,
        min_action_energy: settings.agents.min_action_energy,
        last_action: None,
        last_free_energy: None,
        timed_out: false,
        state: StateMachine::default(),
        model,
        record,
    })
}

fn apply_preset(record: &mut AgentRecord, preset: &str) -> Result<()> {
    match preset {
        "generic" => {}
        "explorer" => {
            record.personality = Personality {
                openness: 0.9,
                conscientiousness: 0.4,
                extraversion: 0.6,
                agreeableness: 0.5,
                neuroticism: 0.3,
            };
            record.add_capability(Capability::Learning);
        }
        "merchant" => {
            record.personality = Personality {
                openness: 0.5,
                conscientiousness: 0.7,
                extraversion: 0.8,
                agreeableness: 0.6,
                neuroticism: 0.4,
            };
            record.add_capability(Capability::Communication);
            record.add_capability(Capability::SocialInteraction);
            record.add_capability(Capability::ResourceManagement);
        }
        "guardian" => {
            record.personality = Personality {
                openness: 0.3,
                conscientiousness: 0.9,
                extraversion: 0.4,
                agreeableness: 0.4,
                neuroticism: 0.6,
            };
            record.add_capability(Capability::Communication);
            // Guardians hold the ground they spawned on.
            record.add_goal(super::data::Goal {
                name: "hold-position".into(),
                priority: 0.8,
                deadline_tick: None,
                target: Some(record.position),
            });
        }
        other => {
            return Err(Error::Config(format!("unknown agent preset `{other}`")));
        }
    }
    Ok(())
}

/// Preset generative model: five observation modalities, six hidden
/// states, six actions, with preferences shaped by the preset.
fn preset_model(preset: &str, settings: &Settings, rng: &mut DetRng) -> Result<DiscreteModel> {
    let dims = Dimensions::new(6, 5, 6)?;
    let horizon = settings.policy.horizon.max(1);
    let mut model = match settings.agents.dirichlet_concentration {
        Some(alpha) => DiscreteModel::dirichlet_init(dims, horizon, alpha, rng)?,
        None => DiscreteModel::dirichlet_init(dims, horizon, 4.0, rng)?,
    };

    // Preferences: which modality the preset wants to see.
    let preferred_row = match preset {
        "explorer" => 0,  // visual: resources
        "merchant" => 3,  // social: other agents
        "guardian" => 2,  // proximity: hazards worth watching
        _ => 4,           // internal: homeostasis
    };
    let mut c = Matrix::zeros(dims.observations, horizon);
    for t in 0..horizon {
        c.set(preferred_row, t, 1.0);
        // Hunger is always mildly aversive.
        if preferred_row != 4 {
            c.set(4, t, -0.5);
        }
    }
    model.update_params(move |_, _, model_c, _| *model_c = c)?;
    Ok(model)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::world::{GridWorld, InMemoryBus, MessageBus};
    use ax_config::WorldSettings;

    fn settings() -> Settings {
        let mut s = Settings::default();
        s.seed = 17;
        s.planning.num_simulations = 20;
        s.planning.wall_budget_ms = 500;
        s.inference.num_particles = 50;
        s
    }

    fn world(settings: &Settings) -> GridWorld {
        let mut rng = DetRng::fork(settings.seed, 0x770);
        GridWorld::generate(&settings.world, &mut rng)
    }

    fn spec(name: &str, preset: &str) -> AgentSpec {
        AgentSpec {
            name: name.into(),
            preset: preset.into(),
            position: Position::new(4.0, 4.0, 0.0),
            model: None,
        }
    }

    #[test]
    fn factory_builds_every_preset() {
        let settings = settings();
        for preset in ["generic", "explorer", "merchant", "guardian"] {
            let agent = build_agent(&spec("a", preset), &settings, AgentId(1)).unwrap();
            assert_eq!(agent.status(), Status::Idle);
            assert!(agent.model().validate().is_ok());
        }
    }

    #[test]
    fn unknown_preset_is_a_config_error() {
        let settings = settings();
        assert!(build_agent(&spec("a", "wizard"), &settings, AgentId(1)).is_err());
    }

    #[test]
    fn update_produces_an_action_and_keeps_invariants() {
        let settings = settings();
        let mut w = world(&settings);
        let mut agent = build_agent(&spec("a", "explorer"), &settings, AgentId(1)).unwrap();
        crate::world::WorldProvider::register_agent(&mut w, agent.id(), agent.record.position);

        for tick in 1..=5 {
            let out = agent.update(&w, Vec::new(), tick, None);
            assert_ne!(out.status, Status::Error, "warnings: {:?}", out.warnings);
            assert!(agent.belief().is_normalized(1e-6));
        }
        assert!(agent.memory().episodic.len() >= 5);
    }

    #[test]
    fn two_runs_with_same_seed_match() {
        let settings = settings();
        let mut actions_a = Vec::new();
        let mut actions_b = Vec::new();
        for target in [&mut actions_a, &mut actions_b] {
            let mut w = world(&settings);
            let mut agent = build_agent(&spec("a", "generic"), &settings, AgentId(1)).unwrap();
            crate::world::WorldProvider::register_agent(&mut w, agent.id(), agent.record.position);
            for tick in 1..=6 {
                let out = agent.update(&w, Vec::new(), tick, None);
                target.push(format!("{:?}", out.action));
            }
        }
        assert_eq!(actions_a, actions_b);
    }

    #[test]
    fn depleted_energy_forces_wait() {
        let settings = settings();
        let w = world(&settings);
        let mut agent = build_agent(&spec("a", "generic"), &settings, AgentId(1)).unwrap();
        agent.record.resources.energy = 0.5;
        let out = agent.update(&w, Vec::new(), 1, None);
        assert_eq!(out.action, Action::Wait);
        assert!(out
            .warnings
            .iter()
            .any(|w| w.contains("resource exhausted")));
    }

    #[test]
    fn warning_message_updates_trust() {
        let settings = settings();
        let w = world(&settings);
        let mut agent = build_agent(&spec("a", "generic"), &settings, AgentId(2)).unwrap();
        let mut bus = InMemoryBus::new();
        bus.send(Message {
            id: "m1".into(),
            from: AgentId(1),
            to: Some(AgentId(2)),
            kind: MessageKind::Warning,
            payload: serde_json::json!({"danger": true}),
            tick: 1,
        })
        .unwrap();
        bus.flush(&[AgentId(2)]);
        let inbox = bus.drain(AgentId(2));
        agent.update(&w, inbox, 2, None);
        let trust = agent.record.relationships.get(&AgentId(1)).unwrap().trust;
        assert!(trust > 0.5);
    }

    #[test]
    fn exhausted_deadline_errors_for_one_tick_only() {
        let settings = settings();
        let w = world(&settings);
        let mut agent = build_agent(&spec("a", "generic"), &settings, AgentId(1)).unwrap();
        let deadline = Instant::now() - std::time::Duration::from_millis(1);
        let out = agent.update(&w, Vec::new(), 1, Some(deadline));
        assert_eq!(out.action, Action::Wait);
        assert_eq!(out.status, Status::Error);
        assert!(!out.warnings.is_empty());
        // The next unconstrained tick recovers automatically.
        let out = agent.update(&w, Vec::new(), 2, None);
        assert_ne!(out.status, Status::Error);
    }

    #[test]
    fn hierarchical_levels_run_and_round_trip() {
        let mut settings = settings();
        settings.pipeline.hierarchy_levels = 2;
        settings.precision.levels = 2;
        let w = world(&settings);
        let mut agent = build_agent(&spec("h", "generic"), &settings, AgentId(4)).unwrap();
        for tick in 1..=6 {
            let out = agent.update(&w, Vec::new(), tick, None);
            assert_ne!(out.status, Status::Error, "warnings: {:?}", out.warnings);
            assert!(agent.belief().is_normalized(1e-6));
            for level in &agent.level_beliefs {
                assert!(level.is_normalized(1e-6));
            }
        }
        let snapshot = agent.persist();
        assert_eq!(snapshot.level_beliefs.len(), 2);
        assert!(snapshot.precision_hierarchy.is_some());
        let restored = CognitiveAgent::restore(snapshot, &settings).unwrap();
        assert_eq!(restored.level_beliefs.len(), 2);
        assert!(restored.precision_hierarchy.is_some());
    }

    #[test]
    fn batch_learn_replays_the_episodic_record() {
        let settings = settings();
        let w = world(&settings);
        let mut agent = build_agent(&spec("a", "generic"), &settings, AgentId(1)).unwrap();
        for tick in 1..=6 {
            agent.update(&w, Vec::new(), tick, None);
        }
        let replayed = agent.batch_learn().unwrap();
        // Six episodes pair into five experiences.
        assert_eq!(replayed, 5);
        assert!(agent.model().validate().is_ok());
    }

    #[test]
    fn batch_learn_without_a_learner_is_a_no_op() {
        let mut settings = settings();
        settings.agents.online_learning = false;
        let w = world(&settings);
        let mut agent = build_agent(&spec("a", "generic"), &settings, AgentId(1)).unwrap();
        agent.update(&w, Vec::new(), 1, None);
        assert_eq!(agent.batch_learn().unwrap(), 0);
    }

    #[test]
    fn persist_restore_round_trips() {
        let settings = settings();
        let w = world(&settings);
        let mut agent = build_agent(&spec("a", "merchant"), &settings, AgentId(3)).unwrap();
        for tick in 1..=3 {
            agent.update(&w, Vec::new(), tick, None);
        }
        let snapshot = agent.persist();
        let json = serde_json::to_string(&snapshot).unwrap();
        let back: PersistedAgent = serde_json::from_str(&json).unwrap();
        let restored = CognitiveAgent::restore(back, &settings).unwrap();
        assert_eq!(restored.record, agent.record);
        assert_eq!(restored.belief(), agent.belief());
    }

    #[test]
    fn restore_rejects_wrong_schema() {
        let settings = settings();
        let agent = build_agent(&spec("a", "generic"), &settings, AgentId(1)).unwrap();
        let mut snapshot = agent.persist();
        snapshot.schema_version = "9.0.0".into();
        assert!(matches!(
            CognitiveAgent::restore(snapshot, &settings),
            Err(Error::SchemaMismatch { .. })
        ));
    }
}
