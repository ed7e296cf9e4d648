//! Monte-Carlo tree search over belief space.
//!
//! Nodes live in an arena and hold the belief reached by their action
//! prefix. Selection walks UCB1, expansion tries actions in index
//! order, simulation scores a random rollout with the EFE evaluator,
//! and backup sums negative-G along the path. The search stops at the
//! simulation budget, the node cap, or the wall deadline, whichever
//! comes first.

use ax_common::Result;
use ax_config::PlanningSettings;
use ax_math::DetRng;

use crate::model::DiscreteModel;
use crate::planner::{PlanBudget, PlanOutcome};
use crate::policy::{EfeEvaluator, Policy};

struct Node {
    belief: Vec<f64>,
    parent: Option<usize>,
    action_from_parent: usize,
    depth: usize,
    visits: u32,
    value_sum: f64,
    /// Untried actions in reverse order so `pop` expands action 0 first.
    untried: Vec<usize>,
    children: Vec<usize>,
}

impl Node {
    fn new(belief: Vec<f64>, parent: Option<usize>, action: usize, depth: usize, actions: usize) -> Self {
        Node {
            belief,
            parent,
            action_from_parent: action,
            depth,
            visits: 0,
            value_sum: 0.0,
            untried: (0..actions).rev().collect(),
            children: Vec::new(),
        }
    }

    fn mean_value(&self) -> f64 {
        if self.visits == 0 {
            0.0
        } else {
            self.value_sum / self.visits as f64
        }
    }
}

pub(crate) fn plan(
    model: &DiscreteModel,
    belief: &[f64],
    horizon: usize,
    settings: &PlanningSettings,
    evaluator: &EfeEvaluator,
    budget: &PlanBudget,
    rng: &mut DetRng,
) -> Result<PlanOutcome> {
    let actions = model.dims().actions;
    let mut arena = vec![Node::new(belief.to_vec(), None, 0, 0, actions)];
    let mut simulations = 0;
    let mut budget_exceeded = false;

    while simulations < settings.num_simulations {
        if budget.wall_exhausted() || arena.len() >= budget.max_nodes() {
            budget_exceeded = true;
            break;
        }

        // Selection: UCB1 down to a node with untried actions.
        let mut current = 0usize;
        loop {
            let node = &arena[current];
            if !node.untried.is_empty() || node.children.is_empty() || node.depth >= horizon {
                break;
            }
            let parent_visits = node.visits.max(1) as f64;
            let c = settings.exploration_constant;
            current = *node
                .children
                .iter()
                .max_by(|&&a, &&b| {
                    let ucb = |idx: usize| {
                        let child = &arena[idx];
                        let visits = child.visits.max(1) as f64;
                        child.mean_value() + c * (parent_visits.ln() / visits).sqrt()
                    };
                    ucb(a)
                        .partial_cmp(&ucb(b))
                        .unwrap_or(std::cmp::Ordering::Equal)
                })
                .expect("children non-empty");
        }

        // Expansion: one untried action, belief stepped through B.
        let expanded = if arena[current].depth < horizon {
            match arena[current].untried.pop() {
                Some(action) => {
                    let next_belief = model.predict_next(&arena[current].belief, action)?;
                    let depth = arena[current].depth + 1;
                    let idx = arena.len();
                    arena.push(Node::new(next_belief, Some(current), action, depth, actions));
                    arena[current].children.push(idx);
                    idx
                }
                None => current,
            }
        } else {
            current
        };

        // Simulation: random rollout to the horizon, scored by EFE.
        let rollout_len = horizon - arena[expanded].depth;
        let rollout =
            Policy::new((0..rollout_len).map(|_| rng.below(actions)).collect());
        let eval = evaluator.evaluate(model, &arena[expanded].belief, &rollout)?;
        let value = -eval.efe;

        // Backup.
        let mut walk = Some(expanded);
        while let Some(idx) = walk {
            arena[idx].visits += 1;
            arena[idx].value_sum += value;
            walk = arena[idx].parent;
        }
        simulations += 1;
    }

    // Extraction: follow the most-visited child from the root.
    let mut policy_actions = Vec::new();
    let mut current = 0usize;
    while policy_actions.len() < horizon {
        let node = &arena[current];
        let best_child = node
            .children
            .iter()
            .max_by_key(|&&idx| arena[idx].visits)
            .copied();
        match best_child {
            Some(idx) => {
                policy_actions.push(arena[idx].action_from_parent);
                current = idx;
            }
            None => break,
        }
    }
    if policy_actions.is_empty() {
        // Budget too small to expand anything; fall back to wait.
        return Ok(PlanOutcome {
            policy: Policy::wait(horizon),
            efe: 0.0,
            budget_exceeded: true,
            degenerate: false,
            work: simulations,
        });
    }

    // A policy shorter than the horizon means the budget stopped the
    // search before the tree reached full depth.
    let policy = Policy::new(policy_actions);
    let budget_exceeded = budget_exceeded || policy.len() < horizon;
    let efe = evaluator.evaluate(model, belief, &policy)?.efe;
    Ok(PlanOutcome {
        policy,
        efe,
        budget_exceeded,
        degenerate: false,
        work: simulations,
    })
}
