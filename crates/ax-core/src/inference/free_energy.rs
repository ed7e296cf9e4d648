//! Variational free energy, computed on demand.
//!
//! Discrete: `F = -H(b) - E_b[log p(o|s)] - E_b[log p(s)]`.
//! Continuous: analytic `KL(q || prior)` plus the observation NLL at
//! the posterior mean.

use ax_common::{Error, Result};
use ax_math::{entropy, gaussian_nll, kl_diag_gaussians, EPS};

use crate::belief::Belief;
use crate::model::{ContinuousModel, DiscreteModel};

/// Discrete variational free energy for a categorical belief, observed
/// class, and prior.
pub fn discrete_free_energy(
    belief: &[f64],
    observation: usize,
    model: &DiscreteModel,
    prior: &[f64],
) -> Result<f64> {
    let likelihood = model.likelihood(observation)?;
    if belief.len() != likelihood.len() || belief.len() != prior.len() {
        return Err(Error::DimensionMismatch {
            expected: format!("belief and prior of length {}", likelihood.len()),
            actual: format!("belief {}, prior {}", belief.len(), prior.len()),
        });
    }
    let expected_log_likelihood: f64 = belief
        .iter()
        .zip(likelihood.iter())
        .map(|(b, l)| b * l.max(EPS).ln())
        .sum();
    let expected_log_prior: f64 = belief
        .iter()
        .zip(prior.iter())
        .map(|(b, p)| b * p.max(EPS).ln())
        .sum();
    Ok(-entropy(belief) - expected_log_likelihood - expected_log_prior)
}

/// Continuous variational free energy for a Gaussian posterior.
pub fn continuous_free_energy(
    posterior: &Belief,
    observation: &[f64],
    model: &ContinuousModel,
) -> Result<f64> {
    let (mu_q, lv_q) = match posterior {
        Belief::Gaussian { mean, log_var } => (mean, log_var),
        _ => {
            return Err(Error::DimensionMismatch {
                expected: "gaussian posterior".into(),
                actual: "non-gaussian posterior".into(),
            })
        }
    };
    let (mu_p, lv_p) = model.prior();
    let kl = kl_diag_gaussians(mu_q, lv_q, mu_p, lv_p);
    let (obs_mean, obs_log_var) = model.predict_obs(mu_q);
    if obs_mean.len() != observation.len() {
        return Err(Error::DimensionMismatch {
            expected: format!("observation of length {}", obs_mean.len()),
            actual: format!("length {}", observation.len()),
        });
    }
    let nll = gaussian_nll(observation, &obs_mean, &obs_log_var);
    Ok(kl + nll)
}
