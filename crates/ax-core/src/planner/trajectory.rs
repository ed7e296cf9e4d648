//! Trajectory sampling: draw full-length policies from a behavior
//! policy and keep the best.
//!
//! The behavior policy is the one-step EFE softmax (uniform when every
//! action scores the same), so sampling concentrates on promising
//! branches without committing to them.

use ax_common::Result;
use ax_config::PlanningSettings;
use ax_math::{softmax, DetRng};

use crate::model::DiscreteModel;
use crate::planner::{PlanBudget, PlanOutcome};
use crate::policy::{EfeEvaluator, Policy};

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

    // One-step behavior distribution from the root belief.
    let mut one_step = Vec::with_capacity(actions);
    for action in 0..actions {
        let g = evaluator
            .evaluate(model, belief, &Policy::new(vec![action]))?
            .efe;
        one_step.push(-g);
    }
    let behavior = softmax(&one_step);

    let mut best: Option<(f64, Policy)> = None;
    let mut sampled = 0;
    let mut budget_exceeded = false;

    for _ in 0..settings.num_trajectories.max(1) {
        if budget.wall_exhausted() || sampled >= budget.max_nodes() {
            budget_exceeded = true;
            break;
        }
        let seq: Vec<usize> = (0..horizon)
            .map(|_| rng.sample_categorical(&behavior))
            .collect();
        let policy = Policy::new(seq);
        let g = evaluator.evaluate(model, belief, &policy)?.efe;
        sampled += 1;

        let better = match &best {
            Some((best_g, best_policy)) => {
                g < *best_g || (g == *best_g && policy < *best_policy)
            }
            None => true,
        };
        if better {
            best = Some((g, policy));
        }
    }

    match best {
        Some((efe, policy)) => Ok(PlanOutcome {
            policy,
            efe,
            budget_exceeded,
            degenerate: false,
            work: sampled,
        }),
        None => Ok(PlanOutcome {
            policy: Policy::wait(horizon),
            efe: 0.0,
            budget_exceeded: true,
            degenerate: false,
            work: 0,
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::discrete::fixtures::corridor;
    use ax_config::PolicySettings;
    use ax_math::uniform;

    #[test]
    fn returns_full_length_policies() {
        let model = corridor();
        let settings = PlanningSettings {
            num_trajectories: 30,
            wall_budget_ms: 0,
            ..PlanningSettings::default()
        };
        let evaluator = EfeEvaluator::new(&PolicySettings::default());
        let budget = PlanBudget::from_settings(&settings);
        let mut rng = DetRng::from_seed(12);
        let out = plan(&model, &uniform(4), 5, &settings, &evaluator, &budget, &mut rng).unwrap();
        assert_eq!(out.policy.len(), 5);
        assert_eq!(out.work, 30);
    }

    #[test]
    fn more_samples_never_hurt() {
        let model = corridor();
        let evaluator = EfeEvaluator::new(&PolicySettings::default());
        let belief = vec![0.0, 1.0, 0.0, 0.0];
        let mut g_few = f64::INFINITY;
        let mut g_many = f64::INFINITY;
        for (n, target) in [(3usize, &mut g_few), (60usize, &mut g_many)] {
            let settings = PlanningSettings {
                num_trajectories: n,
                wall_budget_ms: 0,
                ..PlanningSettings::default()
            };
            let budget = PlanBudget::from_settings(&settings);
            let mut rng = DetRng::from_seed(21);
            let out =
                plan(&model, &belief, 4, &settings, &evaluator, &budget, &mut rng).unwrap();
            *target = out.efe;
        }
        assert!(g_many <= g_few + 1e-12);
    }
}
