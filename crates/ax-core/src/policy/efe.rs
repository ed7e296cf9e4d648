//! Expected free energy of a policy.
//!
//! For a policy `pi = (u_0 .. u_{T-1})` and belief `b_0`:
//!
//! ```text
//! b_{t+1}     = B[:,:,u_t] * b_t
//! o_pred_t    = A * b_{t+1}
//! epistemic_t = H(o_pred_t) - sum_s b_{t+1}[s] * H(A[:,s])
//! pragmatic_t = -<o_pred_t, C[:,t]>
//! G(pi)       = sum_t (w_e * epistemic_t + w_p * pragmatic_t)
//! ```
//!
//! The unweighted epistemic and pragmatic sums are kept alongside `G`
//! so the decomposition can be audited exactly.

use serde::{Deserialize, Serialize};

use ax_common::Result;
use ax_config::PolicySettings;
use ax_math::{dot, entropy, DetRng};

use crate::belief::Belief;
use crate::model::{ContinuousModel, DiscreteModel};
use crate::policy::Policy;

/// Scored policy.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PolicyEvaluation {
    pub policy: Policy,
    /// Weighted total `G`.
    pub efe: f64,
    /// Unweighted epistemic sum.
    pub epistemic: f64,
    /// Unweighted pragmatic sum.
    pub pragmatic: f64,
}

/// Discrete expected-free-energy evaluator.
#[derive(Debug, Clone)]
pub struct EfeEvaluator {
    epistemic_weight: f64,
    pragmatic_weight: f64,
}

impl EfeEvaluator {
    pub fn new(settings: &PolicySettings) -> Self {
        EfeEvaluator {
            epistemic_weight: settings.epistemic_weight,
            pragmatic_weight: settings.pragmatic_weight,
        }
    }

    /// Scale the weights, keeping them non-negative. Personality
    /// modulation enters here.
    pub fn with_scaled_weights(mut self, epistemic_scale: f64, pragmatic_scale: f64) -> Self {
        self.epistemic_weight *= epistemic_scale.max(0.0);
        self.pragmatic_weight *= pragmatic_scale.max(0.0);
        self
    }

    /// Score one policy from a categorical belief.
    pub fn evaluate(
        &self,
        model: &DiscreteModel,
        belief: &[f64],
        policy: &Policy,
    ) -> Result<PolicyEvaluation> {
        let states = model.dims().states;
        // Per-state observation entropy H(A[:, s]) is reused across steps.
        let state_obs_entropy: Vec<f64> =
            (0..states).map(|s| entropy(&model.a().col(s))).collect();

        let mut b = belief.to_vec();
        let mut epistemic = 0.0;
        let mut pragmatic = 0.0;
        for (t, &action) in policy.actions().iter().enumerate() {
            b = model.predict_next(&b, action)?;
            let o_pred = model.predict_obs(&b)?;

            let ambiguity: f64 = b
                .iter()
                .zip(state_obs_entropy.iter())
                .map(|(bs, h)| bs * h)
                .sum();
            epistemic += entropy(&o_pred) - ambiguity;
            pragmatic += -dot(&o_pred, &model.preference_column(t));
        }

        Ok(PolicyEvaluation {
            policy: policy.clone(),
            efe: self.epistemic_weight * epistemic + self.pragmatic_weight * pragmatic,
            epistemic,
            pragmatic,
        })
    }

    /// Score just the first `steps` actions of a policy; used by the
    /// planners for partial-policy frontier scoring.
    pub fn evaluate_prefix(
        &self,
        model: &DiscreteModel,
        belief: &[f64],
        policy: &Policy,
        steps: usize,
    ) -> Result<PolicyEvaluation> {
        let prefix = Policy::new(
            policy.actions().iter().take(steps).copied().collect(),
        );
        self.evaluate(model, belief, &prefix)
    }
}

/// Monte-Carlo expected free energy for the continuous model.
///
/// Rollouts sample states from the belief, propagate them through the
/// dynamics, and score predicted observations against a preferred
/// observation point: squared distance stands in for the pragmatic
/// term and predicted observation spread for the epistemic term.
#[derive(Debug, Clone)]
pub struct ContinuousEfe {
    epistemic_weight: f64,
    pragmatic_weight: f64,
    rollouts: usize,
    pub preferred_obs: Vec<f64>,
}

impl ContinuousEfe {
    pub fn new(settings: &PolicySettings, preferred_obs: Vec<f64>) -> Self {
        ContinuousEfe {
            epistemic_weight: settings.epistemic_weight,
            pragmatic_weight: settings.pragmatic_weight,
            rollouts: settings.mc_rollouts.max(1),
            preferred_obs,
        }
    }

    pub fn evaluate(
        &self,
        model: &ContinuousModel,
        belief: &Belief,
        policy: &Policy,
        rng: &mut DetRng,
    ) -> Result<PolicyEvaluation> {
        let mut epistemic = 0.0;
        let mut pragmatic = 0.0;
        for _ in 0..self.rollouts {
            let mut state = model.sample(belief, rng)?;
            for &action in policy.actions() {
                let (next_mean, next_log_var) = {
                    let b = Belief::gaussian(state.clone(), vec![-6.0; state.len()])?;
                    match model.predict_next(&b, action)? {
                        Belief::Gaussian { mean, log_var } => (mean, log_var),
                        _ => unreachable!("predict_next returns gaussian"),
                    }
                };
                state = next_mean
                    .iter()
                    .zip(next_log_var.iter())
                    .map(|(m, lv)| m + (0.5 * lv).exp() * rng.normal())
                    .collect();
                let (obs_mean, obs_log_var) = model.predict_obs(&state);
                epistemic += obs_log_var.iter().sum::<f64>() / obs_log_var.len() as f64;
                let dist: f64 = obs_mean
                    .iter()
                    .zip(self.preferred_obs.iter())
                    .map(|(o, p)| (o - p) * (o - p))
                    .sum();
                pragmatic += dist;
            }
        }
        let scale = self.rollouts as f64;
        let epistemic = epistemic / scale;
        let pragmatic = pragmatic / scale;
        Ok(PolicyEvaluation {
            policy: policy.clone(),
            efe: self.epistemic_weight * epistemic + self.pragmatic_weight * pragmatic,
            epistemic,
            pragmatic,
        })
    }
}
