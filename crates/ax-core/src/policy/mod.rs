//! Policies and expected-free-energy policy selection.
//!
//! A policy is an ordered action sequence of length at most the
//! planning horizon. The selector enumerates candidates when the
//! action space is small (`U^T` under the enumeration limit) and
//! samples them otherwise, scores each with [`efe::EfeEvaluator`],
//! forms the posterior `q(pi) ∝ exp(-beta * G)`, prunes low-mass
//! policies, and picks by argmax or posterior sampling.
//!
//! Ties resolve deterministically: lower `G` wins, then a stronger
//! habit prior, then lexicographic action order.

pub mod efe;

pub use efe::{ContinuousEfe, EfeEvaluator, PolicyEvaluation};

use serde::{Deserialize, Serialize};

use ax_common::{Error, Result};
use ax_config::PolicySettings;
use ax_math::{floor_and_renormalize, softmax, DetRng};

use crate::model::DiscreteModel;

/// Ordered action sequence.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Policy {
    actions: Vec<usize>,
}

impl Policy {
    pub fn new(actions: Vec<usize>) -> Self {
        Policy { actions }
    }

    /// The all-`wait` fallback policy (action index 0 by convention).
    pub fn wait(len: usize) -> Self {
        Policy {
            actions: vec![0; len.max(1)],
        }
    }

    pub fn actions(&self) -> &[usize] {
        &self.actions
    }

    pub fn len(&self) -> usize {
        self.actions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.actions.is_empty()
    }

    /// First action of the policy.
    pub fn first(&self) -> Option<usize> {
        self.actions.first().copied()
    }
}

/// Habit prior: a slowly accumulated preference for frequently chosen
/// first actions.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HabitPrior {
    counts: Vec<f64>,
}

impl HabitPrior {
    pub fn new(actions: usize) -> Self {
        HabitPrior {
            counts: vec![1.0; actions.max(1)],
        }
    }

    /// Record a chosen action.
    pub fn record(&mut self, action: usize) {
        if let Some(c) = self.counts.get_mut(action) {
            *c += 1.0;
        }
    }

    /// Habit strength of a policy: relative frequency of its first
    /// action, in [0, 1].
    pub fn strength(&self, policy: &Policy) -> f64 {
        let total: f64 = self.counts.iter().sum();
        match policy.first() {
            Some(a) if a < self.counts.len() => self.counts[a] / total,
            _ => 0.0,
        }
    }
}

/// Outcome of a selection pass.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PolicySelection {
    pub policy: Policy,
    pub efe: f64,
    /// Posterior mass of the selected policy after pruning.
    pub confidence: f64,
    /// Survivors of the pruning pass, ordered by the tie-break rule.
    pub candidates: Vec<PolicyEvaluation>,
}

/// Expected-free-energy policy selector.
#[derive(Debug, Clone)]
pub struct PolicySelector {
    settings: PolicySettings,
    evaluator: EfeEvaluator,
}

impl PolicySelector {
    pub fn new(settings: &PolicySettings) -> Self {
        PolicySelector {
            settings: settings.clone(),
            evaluator: EfeEvaluator::new(settings),
        }
    }

    /// Replace the evaluator, e.g. with personality-scaled weights.
    pub fn with_evaluator(mut self, evaluator: EfeEvaluator) -> Self {
        self.evaluator = evaluator;
        self
    }

    pub fn evaluator(&self) -> &EfeEvaluator {
        &self.evaluator
    }

    /// Candidate policies for the current model: exhaustive when
    /// `U^horizon` fits the enumeration limit, sampled otherwise.
    pub fn candidates(&self, model: &DiscreteModel, rng: &mut DetRng) -> Vec<Policy> {
        let actions = model.dims().actions;
        let horizon = self.settings.horizon.max(1);
        let space: Option<usize> = actions.checked_pow(horizon as u32);
        match space {
            Some(total) if total <= self.settings.enumeration_limit => {
                let mut out = Vec::with_capacity(total);
                for mut index in 0..total {
                    let mut seq = vec![0usize; horizon];
                    for slot in seq.iter_mut().rev() {
                        *slot = index % actions;
                        index /= actions;
                    }
                    out.push(Policy::new(seq));
                }
                out
            }
            _ => {
                let mut out = Vec::with_capacity(self.settings.num_samples);
                for _ in 0..self.settings.num_samples {
                    let seq = (0..horizon).map(|_| rng.below(actions)).collect();
                    out.push(Policy::new(seq));
                }
                out.sort();
                out.dedup();
                out
            }
        }
    }

    /// Score candidates, form the posterior, prune, and select.
    ///
    /// `precision_scale` multiplies the configured policy precision
    /// (the agent passes its current mean precision). With
    /// `deterministic` the argmax policy is returned; otherwise the
    /// policy is sampled from the pruned posterior.
    pub fn select(
        &self,
        model: &DiscreteModel,
        belief: &[f64],
        precision_scale: f64,
        habit: Option<&HabitPrior>,
        rng: &mut DetRng,
        deterministic: bool,
    ) -> Result<PolicySelection> {
        let candidates = self.candidates(model, rng);
        if candidates.is_empty() {
            return Err(Error::NoCandidatePolicies);
        }

        let mut evaluations = Vec::with_capacity(candidates.len());
        for policy in &candidates {
            let mut eval = self.evaluator.evaluate(model, belief, policy)?;
            if let Some(habit) = habit {
                eval.efe -= self.settings.habit_weight * habit.strength(policy);
            }
            evaluations.push(eval);
        }

        // Deterministic order: lower G, stronger habit, lexicographic.
        evaluations.sort_by(|a, b| {
            a.efe
                .partial_cmp(&b.efe)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| {
                    let ha = habit.map(|h| h.strength(&a.policy)).unwrap_or(0.0);
                    let hb = habit.map(|h| h.strength(&b.policy)).unwrap_or(0.0);
                    hb.partial_cmp(&ha).unwrap_or(std::cmp::Ordering::Equal)
                })
                .then_with(|| a.policy.cmp(&b.policy))
        });

        let beta = self.settings.policy_precision * precision_scale.max(1e-6);
        let logits: Vec<f64> = evaluations.iter().map(|e| -beta * e.efe).collect();
        let mut posterior = softmax(&logits);

        // Prune low-mass policies; the best policy always survives.
        let keep: Vec<bool> = posterior
            .iter()
            .enumerate()
            .map(|(i, &q)| i == 0 || q >= self.settings.prune_threshold)
            .collect();
        let mut pruned_evals = Vec::new();
        let mut pruned_posterior = Vec::new();
        for (i, eval) in evaluations.into_iter().enumerate() {
            if keep[i] {
                pruned_evals.push(eval);
                pruned_posterior.push(posterior[i]);
            }
        }
        posterior = pruned_posterior;
        if !floor_and_renormalize(&mut posterior) {
            return Err(Error::NumericalInstability(
                "policy posterior collapsed to zero mass".into(),
            ));
        }

        let choice = if deterministic {
            0
        } else {
            rng.sample_categorical(&posterior)
        };

        Ok(PolicySelection {
            policy: pruned_evals[choice].policy.clone(),
            efe: pruned_evals[choice].efe,
            confidence: posterior[choice],
            candidates: pruned_evals,
        })
    }

    /// One-step lookahead refinement of the leading candidates.
    ///
    /// Each of the top `k` policies is re-scored from the posterior
    /// belief reached by its first action and the observation that
    /// belief most strongly predicts; the best refined policy wins.
    pub fn refine_sophisticated(
        &self,
        model: &DiscreteModel,
        belief: &[f64],
        selection: &PolicySelection,
        k: usize,
    ) -> Result<Policy> {
        let mut best: Option<(f64, &Policy)> = None;
        for eval in selection.candidates.iter().take(k.max(1)) {
            let Some(first) = eval.policy.first() else {
                continue;
            };
            let predicted = model.predict_next(belief, first)?;
            let o_pred = model.predict_obs(&predicted)?;
            let likely_obs = o_pred
                .iter()
                .enumerate()
                .max_by(|a, b| a.1.partial_cmp(b.1).unwrap_or(std::cmp::Ordering::Equal))
                .map(|(o, _)| o)
                .unwrap_or(0);
            let mut posterior: Vec<f64> = predicted
                .iter()
                .zip(model.likelihood(likely_obs)?.iter())
                .map(|(p, l)| p * l)
                .collect();
            if !floor_and_renormalize(&mut posterior) {
                continue;
            }
            let tail = Policy::new(eval.policy.actions()[1..].to_vec());
            let tail_eval = self.evaluator.evaluate(model, &posterior, &tail)?;
            let first_step =
                self.evaluator
                    .evaluate_prefix(model, belief, &eval.policy, 1)?;
            let refined = first_step.efe + tail_eval.efe;
            if best
                .as_ref()
                .map(|(g, _)| refined < *g)
                .unwrap_or(true)
            {
                best = Some((refined, &eval.policy));
            }
        }
        Ok(best
            .map(|(_, p)| p.clone())
            .unwrap_or_else(|| selection.policy.clone()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::discrete::fixtures::corridor;
    use ax_math::uniform;

    fn selector() -> PolicySelector {
        PolicySelector::new(&PolicySettings {
            horizon: 3,
            ..PolicySettings::default()
        })
    }

    #[test]
    fn enumeration_covers_the_whole_space() {
        let model = corridor();
        let mut rng = DetRng::from_seed(1);
        let candidates = selector().candidates(&model, &mut rng);
        // 2 actions, horizon 3.
        assert_eq!(candidates.len(), 8);
    }

    #[test]
    fn large_spaces_fall_back_to_sampling() {
        let model = corridor();
        let mut rng = DetRng::from_seed(1);
        let sel = PolicySelector::new(&PolicySettings {
            horizon: 3,
            enumeration_limit: 4,
            num_samples: 20,
            ..PolicySettings::default()
        });
        let candidates = sel.candidates(&model, &mut rng);
        assert!(!candidates.is_empty());
        assert!(candidates.len() <= 20);
    }

    #[test]
    fn selection_is_deterministic_given_seed() {
        let model = corridor();
        let belief = uniform(4);
        let sel = selector();
        let mut rng_a = DetRng::from_seed(9);
        let mut rng_b = DetRng::from_seed(9);
        let a = sel
            .select(&model, &belief, 1.0, None, &mut rng_a, false)
            .unwrap();
        let b = sel
            .select(&model, &belief, 1.0, None, &mut rng_b, false)
            .unwrap();
        assert_eq!(a.policy, b.policy);
    }

    #[test]
    fn argmax_selects_the_lowest_g() {
        let model = corridor();
        let belief = vec![1.0, 0.0, 0.0, 0.0];
        let mut rng = DetRng::from_seed(2);
        let out = selector()
            .select(&model, &belief, 1.0, None, &mut rng, true)
            .unwrap();
        let min_g = out
            .candidates
            .iter()
            .map(|e| e.efe)
            .fold(f64::INFINITY, f64::min);
        assert!((out.efe - min_g).abs() < 1e-12);
    }

    #[test]
    fn pruning_keeps_posterior_normalized() {
        let model = corridor();
        let mut rng = DetRng::from_seed(4);
        let sel = PolicySelector::new(&PolicySettings {
            horizon: 3,
            prune_threshold: 0.05,
            policy_precision: 5.0,
            ..PolicySettings::default()
        });
        let out = sel
            .select(&model, &uniform(4), 1.0, None, &mut rng, true)
            .unwrap();
        assert!(out.confidence > 0.0);
        assert!(!out.candidates.is_empty());
    }

    #[test]
    fn habit_prior_breaks_exact_ties() {
        // A uniform model makes every policy score identically; the
        // habit prior then decides.
        let model = DiscreteModel::uniform(crate::model::Dimensions::new(3, 3, 2).unwrap(), 2);
        let sel = PolicySelector::new(&PolicySettings {
            horizon: 2,
            habit_weight: 0.0,
            ..PolicySettings::default()
        });
        let mut habit = HabitPrior::new(2);
        for _ in 0..10 {
            habit.record(1);
        }
        let mut rng = DetRng::from_seed(6);
        let out = sel
            .select(&model, &uniform(3), 1.0, Some(&habit), &mut rng, true)
            .unwrap();
        assert_eq!(out.policy.first(), Some(1));
    }

    #[test]
    fn lexicographic_order_is_the_final_tiebreak() {
        let model = DiscreteModel::uniform(crate::model::Dimensions::new(3, 3, 2).unwrap(), 2);
        let sel = PolicySelector::new(&PolicySettings {
            horizon: 2,
            ..PolicySettings::default()
        });
        let mut rng = DetRng::from_seed(6);
        let out = sel
            .select(&model, &uniform(3), 1.0, None, &mut rng, true)
            .unwrap();
        assert_eq!(out.policy, Policy::new(vec![0, 0]));
    }

    #[test]
    fn sophisticated_refinement_returns_a_candidate() {
        let model = corridor();
        let belief = uniform(4);
        let sel = selector();
        let mut rng = DetRng::from_seed(8);
        let selection = sel
            .select(&model, &belief, 1.0, None, &mut rng, true)
            .unwrap();
        let refined = sel
            .refine_sophisticated(&model, &belief, &selection, 3)
            .unwrap();
        assert!(selection
            .candidates
            .iter()
            .any(|e| e.policy == refined));
    }
}
