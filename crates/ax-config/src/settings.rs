//! Typed settings for every tunable in the platform.
//!
//! All fields have serde defaults so partial TOML files work; the
//! documented defaults are the values used when a section is omitted
//! entirely.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Inference algorithm selection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InferenceKind {
    /// Iterative variational message passing (discrete).
    #[default]
    Vmp,
    /// VMP composed with the transition model (temporal).
    BeliefPropagation,
    /// Reparameterized gradient VI. Continuous-state only; rejected by
    /// settings validation for the discrete runtime.
    GradientVi,
    /// Fisher-preconditioned gradient VI. Continuous-state only;
    /// rejected by settings validation for the discrete runtime.
    NaturalGradientVi,
    /// Sequential Monte Carlo.
    ParticleFilter,
}

/// Temporal planner selection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PlannerKind {
    #[default]
    Mcts,
    Beam,
    AStar,
    TrajectorySampling,
}

/// Belief-update pipeline mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PipelineMode {
    #[default]
    Bayesian,
    Gradient,
    Hybrid,
}

/// Scheduler and tick-loop settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SchedulerSettings {
    /// Wall-clock tick interval in milliseconds.
    pub tick_ms: u64,
    /// Worker threads for the parallel mode; 0 means sequential.
    pub num_workers: usize,
    /// Per-agent wall-time budget per tick, milliseconds.
    pub agent_budget_ms: u64,
    /// Grace period for draining updates on stop, milliseconds.
    pub grace_period_ms: u64,
}

impl Default for SchedulerSettings {
    fn default() -> Self {
        SchedulerSettings {
            tick_ms: 100,
            num_workers: 0,
            agent_budget_ms: 50,
            grace_period_ms: 500,
        }
    }
}

/// Inference engine settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct InferenceSettings {
    pub algorithm: InferenceKind,
    /// Convergence threshold on max componentwise belief change.
    pub convergence_threshold: f64,
    /// Iteration cap for fixed-point and gradient loops.
    pub max_iterations: usize,
    /// Step size for gradient VI.
    pub learning_rate: f64,
    /// L2 gradient clip for gradient VI.
    pub gradient_clip: f64,
    /// Damping for the natural-gradient preconditioner.
    pub damping: f64,
    /// Particle count for SMC.
    pub num_particles: usize,
}

impl Default for InferenceSettings {
    fn default() -> Self {
        InferenceSettings {
            algorithm: InferenceKind::Vmp,
            convergence_threshold: 1e-4,
            max_iterations: 16,
            learning_rate: 0.1,
            gradient_clip: 10.0,
            damping: 0.1,
            num_particles: 100,
        }
    }
}

/// Policy scoring (expected free energy) settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PolicySettings {
    /// Planning horizon T.
    pub horizon: usize,
    /// Weight on the epistemic (information-gain) term.
    pub epistemic_weight: f64,
    /// Weight on the pragmatic (preference) term.
    pub pragmatic_weight: f64,
    /// Weight on the habit prior.
    pub habit_weight: f64,
    /// Inverse temperature for the policy posterior softmax.
    pub policy_precision: f64,
    /// Policies with posterior mass below this are pruned.
    pub prune_threshold: f64,
    /// Below this posterior confidence the chosen action is replaced
    /// with `observe`. The default only fires on a near-flat posterior
    /// over the candidate set.
    pub confidence_threshold: f64,
    /// Enumerate policies exhaustively only while U^T stays at or
    /// below this; otherwise sample.
    pub enumeration_limit: usize,
    /// Sampled policy count when enumeration is off.
    pub num_samples: usize,
    /// Monte-Carlo rollouts per policy for the continuous variant.
    pub mc_rollouts: usize,
}

impl Default for PolicySettings {
    fn default() -> Self {
        PolicySettings {
            horizon: 5,
            epistemic_weight: 1.0,
            pragmatic_weight: 1.0,
            habit_weight: 0.0,
            policy_precision: 1.0,
            prune_threshold: 0.01,
            confidence_threshold: 0.005,
            enumeration_limit: 1024,
            num_samples: 100,
            mc_rollouts: 16,
        }
    }
}

/// Temporal planner settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PlanningSettings {
    pub strategy: PlannerKind,
    /// UCB1 exploration constant.
    pub exploration_constant: f64,
    /// Simulation budget for MCTS.
    pub num_simulations: usize,
    /// Node cap for MCTS and A*.
    pub max_nodes: usize,
    /// Beam width K.
    pub beam_width: usize,
    /// Trajectory count for trajectory sampling.
    pub num_trajectories: usize,
    /// Wall budget per plan() call, milliseconds.
    pub wall_budget_ms: u64,
    /// Enables the adaptive-horizon wrapper.
    pub adaptive_horizon: bool,
    /// Horizon bounds for the adaptive wrapper.
    pub min_horizon: usize,
    pub max_horizon: usize,
    /// Per-step discount on accumulated expected free energy.
    pub discount: f64,
}

impl Default for PlanningSettings {
    fn default() -> Self {
        PlanningSettings {
            strategy: PlannerKind::Mcts,
            exploration_constant: 1.0,
            num_simulations: 100,
            max_nodes: 10_000,
            beam_width: 10,
            num_trajectories: 50,
            wall_budget_ms: 20,
            adaptive_horizon: false,
            min_horizon: 2,
            max_horizon: 10,
            discount: 0.95,
        }
    }
}

/// Precision controller settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PrecisionSettings {
    /// Lower precision bound.
    pub min: f64,
    /// Upper precision bound.
    pub max: f64,
    /// Gain k in the target law `pi* = k / (volatility + eps)`.
    pub gain: f64,
    /// Step size moving log-precision toward its target.
    pub learning_rate: f64,
    /// Momentum on the log-precision step; 0 disables it.
    pub momentum: f64,
    /// Sliding-window length for volatility estimation.
    pub window: usize,
    /// Hierarchical coupling weight c in [0, 1].
    pub hierarchy_coupling: f64,
    /// Precision-controller levels; 1 keeps the flat per-modality
    /// controller, higher values stack the hierarchical variant with
    /// each level sampling errors at twice the interval of the one
    /// below.
    pub levels: usize,
}

impl Default for PrecisionSettings {
    fn default() -> Self {
        PrecisionSettings {
            min: 0.1,
            max: 10.0,
            gain: 1.0,
            learning_rate: 0.1,
            momentum: 0.0,
            window: 20,
            hierarchy_coupling: 0.5,
            levels: 1,
        }
    }
}

/// Memory subsystem settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MemorySettings {
    /// Working-memory capacity (LRU bound).
    pub working_capacity: usize,
    /// Episodic ring-buffer capacity.
    pub episodic_capacity: usize,
    /// Long-term append-only capacity.
    pub longterm_capacity: usize,
    /// Consolidation runs every this many ticks.
    pub consolidation_interval: u64,
    /// Top-importance episodic items copied per consolidation pass.
    pub consolidation_top_k: usize,
}

impl Default for MemorySettings {
    fn default() -> Self {
        MemorySettings {
            working_capacity: 16,
            episodic_capacity: 256,
            longterm_capacity: 1024,
            consolidation_interval: 10,
            consolidation_top_k: 8,
        }
    }
}

/// Belief-update pipeline settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineSettings {
    pub mode: PipelineMode,
    /// Convex weight on the Bayesian branch in hybrid mode.
    pub hybrid_alpha: f64,
    /// Temporal smoothing sigma toward the previous belief.
    pub temporal_smoothing: f64,
    /// Step size for the gradient branch.
    pub gradient_rate: f64,
    /// Enables the attention layer over historical features.
    pub attention: bool,
    /// Historical features retained for attention.
    pub history_window: usize,
    /// Belief-updater levels; 1 keeps the flat updater, higher values
    /// stack the hierarchical variant (bottom-up evidence, top-down
    /// prior adjustment).
    pub hierarchy_levels: usize,
    /// Top-down prior-adjustment weight for the hierarchy, in [0, 1].
    pub top_down: f64,
}

impl Default for PipelineSettings {
    fn default() -> Self {
        PipelineSettings {
            mode: PipelineMode::Bayesian,
            hybrid_alpha: 0.5,
            temporal_smoothing: 0.7,
            gradient_rate: 0.1,
            attention: false,
            history_window: 8,
            hierarchy_levels: 1,
            top_down: 0.5,
        }
    }
}

/// Defaults for freshly created agents.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AgentDefaults {
    pub initial_energy: f64,
    pub initial_health: f64,
    pub memory_capacity: f64,
    /// Actions costing more than the remaining energy are replaced with
    /// `wait` when energy falls below this floor plus the action cost.
    pub min_action_energy: f64,
    /// Dirichlet concentration for Bayesian model initialization;
    /// None means uniform initialization.
    pub dirichlet_concentration: Option<f64>,
    /// Online parameter learning toggle.
    pub online_learning: bool,
    /// Tempering factor for Dirichlet count updates.
    pub learning_eta: f64,
}

impl Default for AgentDefaults {
    fn default() -> Self {
        AgentDefaults {
            initial_energy: 100.0,
            initial_health: 100.0,
            memory_capacity: 100.0,
            min_action_energy: 5.0,
            dirichlet_concentration: None,
            online_learning: true,
            learning_eta: 0.5,
        }
    }
}

/// One population entry: how many agents of which preset to create.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PopulationEntry {
    /// Preset name: `generic`, `explorer`, `merchant`, or `guardian`.
    pub preset: String,
    /// Number of agents to create from this entry.
    #[serde(default = "default_count")]
    pub count: usize,
    /// Optional model-definition file overriding the preset's model.
    #[serde(default)]
    pub model_file: Option<PathBuf>,
}

fn default_count() -> usize {
    1
}

/// In-memory reference world settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct WorldSettings {
    pub width: i64,
    pub height: i64,
    /// Fraction of cells seeded with a resource.
    pub resource_density: f64,
    /// Fraction of cells seeded as hazardous.
    pub danger_density: f64,
}

impl Default for WorldSettings {
    fn default() -> Self {
        WorldSettings {
            width: 16,
            height: 16,
            resource_density: 0.1,
            danger_density: 0.05,
        }
    }
}

/// Root settings document.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    /// Master seed; every agent stream forks from it.
    pub seed: u64,
    pub scheduler: SchedulerSettings,
    pub inference: InferenceSettings,
    pub policy: PolicySettings,
    pub planning: PlanningSettings,
    pub precision: PrecisionSettings,
    pub memory: MemorySettings,
    pub pipeline: PipelineSettings,
    pub agents: AgentDefaults,
    pub world: WorldSettings,
    /// Agent population to create at startup.
    pub population: Vec<PopulationEntry>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_parse_from_empty_toml() {
        let s: Settings = toml::from_str("").unwrap();
        assert_eq!(s, Settings::default());
        assert_eq!(s.memory.working_capacity, 16);
        assert_eq!(s.policy.horizon, 5);
    }

    #[test]
    fn partial_section_keeps_other_defaults() {
        let s: Settings = toml::from_str(
            r#"
            seed = 42

            [planning]
            strategy = "beam"
            beam_width = 4
            "#,
        )
        .unwrap();
        assert_eq!(s.seed, 42);
        assert_eq!(s.planning.strategy, PlannerKind::Beam);
        assert_eq!(s.planning.beam_width, 4);
        assert_eq!(s.planning.num_simulations, 100);
        assert_eq!(s.inference.algorithm, InferenceKind::Vmp);
    }

    #[test]
    fn population_entries_parse() {
        let s: Settings = toml::from_str(
            r#"
            [[population]]
            preset = "explorer"
            count = 3

            [[population]]
            preset = "merchant"
            "#,
        )
        .unwrap();
        assert_eq!(s.population.len(), 2);
        assert_eq!(s.population[0].count, 3);
        assert_eq!(s.population[1].count, 1);
    }

    #[test]
    fn settings_round_trip_through_toml() {
        let s = Settings {
            seed: 7,
            ..Settings::default()
        };
        let text = toml::to_string(&s).unwrap();
        let back: Settings = toml::from_str(&text).unwrap();
        assert_eq!(s, back);
    }
}
