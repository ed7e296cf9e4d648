//! Online and batch parameter learning.
//!
//! Discrete models learn by Dirichlet count updates: each experience
//! contributes soft counts (belief-weighted co-occurrences) to the
//! concentration parameters behind `A` and `B`; the model factors are
//! refreshed from the posterior means and committed through the
//! shadow-validate path. Continuous models learn by moving the prior
//! toward the posterior with an analytic KL gradient step.

use serde::{Deserialize, Serialize};

use ax_common::{Error, Result};
use ax_math::clamp_log_var;

use super::continuous::ContinuousModel;
use super::discrete::{Dimensions, DiscreteModel};
use crate::belief::Belief;

/// One learning experience: `(b, o, u, b')`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Experience {
    pub prior_belief: Vec<f64>,
    pub observation: usize,
    pub action: usize,
    pub posterior_belief: Vec<f64>,
}

/// Dirichlet count learner for the discrete factors.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DirichletLearner {
    dims: Dimensions,
    /// Tempering factor applied to soft counts.
    eta: f64,
    /// Concentrations behind `A`, laid out `O x S` row-major.
    a_alpha: Vec<f64>,
    /// Concentrations behind `B`, laid out `U` blocks of `S x S`.
    b_alpha: Vec<f64>,
    /// Concentrations behind `D`.
    d_alpha: Vec<f64>,
    experiences_seen: u64,
}

impl DirichletLearner {
    /// Start from a symmetric prior with the given concentration.
    pub fn new(dims: Dimensions, prior_concentration: f64, eta: f64) -> Result<Self> {
        if !(prior_concentration > 0.0) {
            return Err(Error::InvariantViolation {
                tensor: "A".into(),
                reason: format!("concentration {prior_concentration} must be positive"),
            });
        }
        if !(eta > 0.0 && eta <= 1.0) {
            return Err(Error::Config(format!(
                "learning eta {eta} must be in (0, 1]"
            )));
        }
        Ok(DirichletLearner {
            dims,
            eta,
            a_alpha: vec![prior_concentration; dims.observations * dims.states],
            b_alpha: vec![prior_concentration; dims.actions * dims.states * dims.states],
            d_alpha: vec![prior_concentration; dims.states],
            experiences_seen: 0,
        })
    }

    pub fn experiences_seen(&self) -> u64 {
        self.experiences_seen
    }

    /// Accumulate one experience into the concentrations.
    ///
    /// `A` counts: `alpha[o, s] += eta * b'[s]` for the observed `o`.
    /// `B` counts: `alpha[s', s, u] += eta * b'[s'] * b[s]`.
    pub fn record(&mut self, exp: &Experience) -> Result<()> {
        let dims = self.dims;
        if exp.prior_belief.len() != dims.states || exp.posterior_belief.len() != dims.states {
            return Err(Error::DimensionMismatch {
                expected: format!("beliefs of length {}", dims.states),
                actual: format!(
                    "prior {}, posterior {}",
                    exp.prior_belief.len(),
                    exp.posterior_belief.len()
                ),
            });
        }
        if exp.observation >= dims.observations || exp.action >= dims.actions {
            return Err(Error::DimensionMismatch {
                expected: format!("o < {}, u < {}", dims.observations, dims.actions),
                actual: format!("o = {}, u = {}", exp.observation, exp.action),
            });
        }
        for s in 0..dims.states {
            self.a_alpha[exp.observation * dims.states + s] +=
                self.eta * exp.posterior_belief[s];
        }
        let block = dims.states * dims.states;
        for s_next in 0..dims.states {
            for s in 0..dims.states {
                self.b_alpha[exp.action * block + s_next * dims.states + s] +=
                    self.eta * exp.posterior_belief[s_next] * exp.prior_belief[s];
            }
        }
        for s in 0..dims.states {
            self.d_alpha[s] += self.eta * exp.posterior_belief[s];
        }
        self.experiences_seen += 1;
        Ok(())
    }

    /// Refresh the model factors from the posterior means.
    ///
    /// Goes through the model's shadow-validate path, so a numerically
    /// broken refresh cannot corrupt the committed factors.
    pub fn apply(&self, model: &mut DiscreteModel) -> Result<()> {
        let dims = self.dims;
        let a_alpha = self.a_alpha.clone();
        let b_alpha = self.b_alpha.clone();
        let d_alpha = self.d_alpha.clone();
        model.update_params(move |a, b, _c, d| {
            for s in 0..dims.states {
                let col_sum: f64 = (0..dims.observations)
                    .map(|o| a_alpha[o * dims.states + s])
                    .sum();
                for o in 0..dims.observations {
                    a.set(o, s, a_alpha[o * dims.states + s] / col_sum);
                }
            }
            let block = dims.states * dims.states;
            for u in 0..dims.actions {
                for s in 0..dims.states {
                    let col_sum: f64 = (0..dims.states)
                        .map(|s_next| b_alpha[u * block + s_next * dims.states + s])
                        .sum();
                    for s_next in 0..dims.states {
                        b.slice_mut(u).set(
                            s_next,
                            s,
                            b_alpha[u * block + s_next * dims.states + s] / col_sum,
                        );
                    }
                }
            }
            let d_sum: f64 = d_alpha.iter().sum();
            for s in 0..dims.states {
                d[s] = d_alpha[s] / d_sum;
            }
        })
    }

    /// Batch expectation-maximization: accumulate a whole episode of
    /// experiences, then refresh the model once.
    pub fn em_update(&mut self, model: &mut DiscreteModel, episode: &[Experience]) -> Result<()> {
        for exp in episode {
            self.record(exp)?;
        }
        self.apply(model)
    }
}

/// Continuous prior learner: one analytic KL gradient step per tick.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContinuousLearner {
    /// Step size toward the posterior.
    pub rate: f64,
}

impl ContinuousLearner {
    pub fn new(rate: f64) -> Result<Self> {
        if !(rate > 0.0 && rate <= 1.0) {
            return Err(Error::Config(format!("learning rate {rate} must be in (0, 1]")));
        }
        Ok(ContinuousLearner { rate })
    }

    /// Move the model prior toward the posterior belief.
    ///
    /// The KL(q || p) gradient with respect to the prior mean is
    /// `(mu_p - mu_q) / sigma_p^2`; stepping down that gradient is an
    /// interpolation toward the posterior mean. Log-variances
    /// interpolate directly.
    pub fn step(&self, model: &mut ContinuousModel, posterior: &Belief) -> Result<()> {
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
        if mu_q.len() != mu_p.len() {
            return Err(Error::DimensionMismatch {
                expected: format!("posterior of length {}", mu_p.len()),
                actual: format!("length {}", mu_q.len()),
            });
        }
        let new_mean: Vec<f64> = mu_p
            .iter()
            .zip(mu_q.iter())
            .map(|(p, q)| p + self.rate * (q - p))
            .collect();
        let new_log_var: Vec<f64> = lv_p
            .iter()
            .zip(lv_q.iter())
            .map(|(p, q)| clamp_log_var(p + self.rate * (q - p)))
            .collect();
        model.set_prior(new_mean, new_log_var)
    }
}
