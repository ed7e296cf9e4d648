//! Variational message passing over categorical beliefs.
//!
//! The update multiplies the observation likelihood into the prior and
//! relaxes the belief toward that product with a damped fixed-point
//! iteration. Damping keeps the free energy non-increasing across
//! iterations.
//!
//! With temporal context `(previous_belief, action)` the prior is the
//! one-step prediction `B[:,:,u] * b_prev`, which is the belief
//! propagation composition.

use ax_common::Result;
use ax_config::InferenceSettings;
use ax_math::{floor_and_renormalize, max_abs_diff, uniform};

use crate::belief::Belief;
use crate::inference::{Inferred, InferenceContext, Observation};
use crate::model::DiscreteModel;

/// Fixed-point damping for the iterative update.
const UPDATE_RATE: f64 = 0.5;

/// Variational message passing engine.
#[derive(Debug, Clone)]
pub struct Vmp {
    threshold: f64,
    max_iterations: usize,
    update_rate: f64,
}

impl Vmp {
    pub fn new(settings: &InferenceSettings) -> Self {
        Vmp {
            threshold: settings.convergence_threshold,
            max_iterations: settings.max_iterations.max(1),
            update_rate: UPDATE_RATE,
        }
    }

    pub fn infer(
        &mut self,
        model: &DiscreteModel,
        observation: &Observation,
        prior: Option<&Belief>,
        ctx: InferenceContext<'_>,
    ) -> Result<Inferred> {
        let states = model.dims().states;

        let likelihood = match self.likelihood_vector(model, observation) {
            Ok(l) => l,
            Err(reason) => return Ok(Inferred::degenerate(states, &reason)),
        };

        let prior_vec = match self.prior_vector(model, prior, ctx) {
            Ok(p) => p,
            Err(reason) => return Ok(Inferred::degenerate(states, &reason)),
        };

        // Exact posterior target: prior masked by the likelihood.
        let mut target: Vec<f64> = prior_vec
            .iter()
            .zip(likelihood.iter())
            .map(|(p, l)| p * l)
            .collect();
        if !floor_and_renormalize(&mut target) {
            return Ok(Inferred::degenerate(states, "zero-probability event"));
        }

        let mut belief = prior_vec;
        let mut iterations = 0;
        let mut converged = false;
        while iterations < self.max_iterations {
            let next: Vec<f64> = belief
                .iter()
                .zip(target.iter())
                .map(|(b, t)| (1.0 - self.update_rate) * b + self.update_rate * t)
                .collect();
            let delta = max_abs_diff(&belief, &next);
            belief = next;
            iterations += 1;
            if delta < self.threshold {
                converged = true;
                break;
            }
        }
        let _ = floor_and_renormalize(&mut belief);

        Ok(Inferred {
            belief: Belief::Categorical { probs: belief },
            iterations,
            converged,
            warning: None,
        })
    }

    /// Likelihood over states for the given observation, or a
    /// degeneracy reason.
    fn likelihood_vector(
        &self,
        model: &DiscreteModel,
        observation: &Observation,
    ) -> std::result::Result<Vec<f64>, String> {
        let dims = model.dims();
        match observation {
            Observation::Index(o) => match model.likelihood(*o) {
                Ok(row) => Ok(row.to_vec()),
                Err(_) => Err(format!(
                    "observation {o} outside {} classes",
                    dims.observations
                )),
            },
            Observation::Distribution(dist) => {
                if dist.len() != dims.observations {
                    return Err(format!(
                        "soft observation has {} classes, model has {}",
                        dist.len(),
                        dims.observations
                    ));
                }
                if dist.iter().any(|p| !p.is_finite() || *p < 0.0) {
                    return Err("soft observation is non-finite or negative".into());
                }
                let total: f64 = dist.iter().sum();
                if total <= 0.0 {
                    return Err("soft observation has zero mass".into());
                }
                // Expected likelihood under the soft observation.
                let mut l = vec![0.0; dims.states];
                for (o, &w) in dist.iter().enumerate() {
                    if w > 0.0 {
                        for (s, li) in model.likelihood(o).expect("index in range").iter().enumerate()
                        {
                            l[s] += w / total * li;
                        }
                    }
                }
                Ok(l)
            }
            Observation::Continuous(_) => {
                Err("continuous observation against a discrete model".into())
            }
        }
    }

    /// Prior over states: temporal prediction when context is present,
    /// otherwise the supplied prior, otherwise the model prior `D`.
    fn prior_vector(
        &self,
        model: &DiscreteModel,
        prior: Option<&Belief>,
        ctx: InferenceContext<'_>,
    ) -> std::result::Result<Vec<f64>, String> {
        let states = model.dims().states;
        if let (Some(prev), Some(action)) = (ctx.previous_belief, ctx.action) {
            let prev_cat = prev.to_categorical(states);
            return match model.predict_next(&prev_cat, action) {
                Ok(predicted) => Ok(predicted),
                Err(e) => Err(format!("temporal prediction failed: {e}")),
            };
        }
        if let Some(prior) = prior {
            let mut p = prior.to_categorical(states);
            if !floor_and_renormalize(&mut p) {
                return Err("supplied prior has zero mass".into());
            }
            return Ok(p);
        }
        let mut d = model.d().to_vec();
        if !floor_and_renormalize(&mut d) {
            return Ok(uniform(states));
        }
        Ok(d)
    }
}
