//! Temporal planning: policy search under a compute budget.
//!
//! Four strategies sit behind one `plan` operation: Monte-Carlo tree
//! search, beam search, A* over belief space, and trajectory sampling.
//! Every strategy returns the best policy found when the wall budget
//! or node budget runs out, and a degenerate belief (zero mass) yields
//! the all-`wait` policy with the degenerate flag set so the agent can
//! move to `error` status.
//!
//! The adaptive-horizon wrapper rescales the planning horizon inside
//! `[min_horizon, max_horizon]` by the belief's normalized entropy:
//! uncertain beliefs plan deeper.

pub mod astar;
pub mod beam;
pub mod mcts;
pub mod trajectory;

use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};

use ax_common::Result;
use ax_config::{PlannerKind, PlanningSettings, PolicySettings};
use ax_math::{normalized_entropy, DetRng};

use crate::model::DiscreteModel;
use crate::policy::{EfeEvaluator, Policy};

/// Wall-clock and node budget for one `plan` call.
#[derive(Debug, Clone)]
pub struct PlanBudget {
    deadline: Option<Instant>,
    max_nodes: usize,
}

impl PlanBudget {
    pub fn new(wall: Option<Duration>, max_nodes: usize) -> Self {
        PlanBudget {
            deadline: wall.map(|d| Instant::now() + d),
            max_nodes: max_nodes.max(1),
        }
    }

    pub fn from_settings(settings: &PlanningSettings) -> Self {
        let wall = (settings.wall_budget_ms > 0)
            .then(|| Duration::from_millis(settings.wall_budget_ms));
        PlanBudget::new(wall, settings.max_nodes)
    }

    /// True once the wall deadline has passed.
    pub fn wall_exhausted(&self) -> bool {
        self.deadline.map(|d| Instant::now() >= d).unwrap_or(false)
    }

    pub fn max_nodes(&self) -> usize {
        self.max_nodes
    }
}

/// Result of one planning call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlanOutcome {
    pub policy: Policy,
    /// Cumulative expected free energy of the returned policy.
    pub efe: f64,
    /// True when a budget ran out and the result is best-effort.
    pub budget_exceeded: bool,
    /// True when the input belief was degenerate; the policy is the
    /// `wait` fallback and the agent should enter `error` status.
    pub degenerate: bool,
    /// Nodes expanded or simulations run, for diagnostics.
    pub work: usize,
}

impl PlanOutcome {
    fn wait(horizon: usize) -> Self {
        PlanOutcome {
            policy: Policy::wait(horizon),
            efe: 0.0,
            budget_exceeded: false,
            degenerate: true,
            work: 0,
        }
    }
}

/// Tagged planner: one variant per search strategy.
#[derive(Debug, Clone)]
pub struct Planner {
    kind: PlannerKind,
    settings: PlanningSettings,
    evaluator: EfeEvaluator,
    horizon: usize,
    adaptive: bool,
}

impl Planner {
    pub fn new(planning: &PlanningSettings, policy: &PolicySettings) -> Self {
        Planner {
            kind: planning.strategy,
            settings: planning.clone(),
            evaluator: EfeEvaluator::new(policy),
            horizon: policy.horizon.max(1),
            adaptive: planning.adaptive_horizon,
        }
    }

    pub fn kind(&self) -> PlannerKind {
        self.kind
    }

    /// Select a policy from the current categorical belief.
    pub fn plan(
        &self,
        model: &DiscreteModel,
        belief: &[f64],
        rng: &mut DetRng,
    ) -> Result<PlanOutcome> {
        let horizon = self.effective_horizon(belief);
        if is_degenerate(belief) {
            return Ok(PlanOutcome::wait(horizon));
        }
        let budget = PlanBudget::from_settings(&self.settings);
        match self.kind {
            PlannerKind::Mcts => mcts::plan(
                model,
                belief,
                horizon,
                &self.settings,
                &self.evaluator,
                &budget,
                rng,
            ),
            PlannerKind::Beam => beam::plan(
                model,
                belief,
                horizon,
                &self.settings,
                &self.evaluator,
                &budget,
            ),
            PlannerKind::AStar => astar::plan(
                model,
                belief,
                horizon,
                &self.settings,
                &self.evaluator,
                &budget,
            ),
            PlannerKind::TrajectorySampling => trajectory::plan(
                model,
                belief,
                horizon,
                &self.settings,
                &self.evaluator,
                &budget,
                rng,
            ),
        }
    }

    /// Adaptive horizon: scale inside the configured bounds by the
    /// belief's normalized entropy.
    fn effective_horizon(&self, belief: &[f64]) -> usize {
        if !self.adaptive {
            return self.horizon;
        }
        let spread = normalized_entropy(belief);
        let lo = self.settings.min_horizon.max(1);
        let hi = self.settings.max_horizon.max(lo);
        lo + ((hi - lo) as f64 * spread).round() as usize
    }
}

/// All-zero or non-finite mass counts as degenerate.
fn is_degenerate(belief: &[f64]) -> bool {
    belief.is_empty()
        || belief.iter().any(|b| !b.is_finite() || *b < 0.0)
        || belief.iter().sum::<f64>() <= 0.0
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::discrete::fixtures::corridor;
    use ax_math::uniform;

    fn planner(kind: PlannerKind) -> Planner {
        let planning = PlanningSettings {
            strategy: kind,
            num_simulations: 50,
            wall_budget_ms: 200,
            ..PlanningSettings::default()
        };
        let policy = PolicySettings {
            horizon: 4,
            ..PolicySettings::default()
        };
        Planner::new(&planning, &policy)
    }

    #[test]
    fn every_strategy_returns_a_nonempty_policy() {
        let model = corridor();
        let belief = uniform(4);
        for kind in [
            PlannerKind::Mcts,
            PlannerKind::Beam,
            PlannerKind::AStar,
            PlannerKind::TrajectorySampling,
        ] {
            let mut rng = DetRng::from_seed(3);
            let out = planner(kind).plan(&model, &belief, &mut rng).unwrap();
            assert!(!out.policy.is_empty(), "{kind:?} returned an empty policy");
            assert!(!out.degenerate);
        }
    }

    #[test]
    fn degenerate_belief_yields_wait_policy() {
        let model = corridor();
        let mut rng = DetRng::from_seed(3);
        let out = planner(PlannerKind::Mcts)
            .plan(&model, &[0.0, 0.0, 0.0, 0.0], &mut rng)
            .unwrap();
        assert!(out.degenerate);
        assert!(out.policy.actions().iter().all(|&a| a == 0));
    }

    #[test]
    fn adaptive_horizon_widens_with_entropy() {
        let planning = PlanningSettings {
            adaptive_horizon: true,
            min_horizon: 2,
            max_horizon: 8,
            ..PlanningSettings::default()
        };
        let policy = PolicySettings::default();
        let p = Planner::new(&planning, &policy);
        let sharp = p.effective_horizon(&[1.0, 0.0, 0.0, 0.0]);
        let flat = p.effective_horizon(&uniform(4));
        assert_eq!(sharp, 2);
        assert_eq!(flat, 8);
    }

    #[test]
    fn seeded_planning_is_reproducible() {
        let model = corridor();
        let belief = uniform(4);
        let p = planner(PlannerKind::Mcts);
        let mut rng_a = DetRng::from_seed(77);
        let mut rng_b = DetRng::from_seed(77);
        let a = p.plan(&model, &belief, &mut rng_a).unwrap();
        let b = p.plan(&model, &belief, &mut rng_b).unwrap();
        assert_eq!(a.policy, b.policy);
    }
}
