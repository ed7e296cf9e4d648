//! Continuous generative model.
//!
//! Observation and transition structure comes from a user-supplied
//! [`ContinuousDynamics`] implementation; the model composes means and
//! variances through it and keeps log-variances clamped into the
//! stable range.

use ax_common::{Error, Result};
use ax_math::{clamp_log_var, DetRng};

use crate::belief::Belief;

/// User-supplied differentiable structure for the continuous model.
pub trait ContinuousDynamics: Send {
    /// State dimensionality.
    fn state_dim(&self) -> usize;

    /// Observation dimensionality.
    fn obs_dim(&self) -> usize;

    /// Number of primitive actions.
    fn action_dim(&self) -> usize;

    /// Observation function: `obs_fn(s) -> (mu_o, log sigma_o^2)`.
    fn observe(&self, state: &[f64]) -> (Vec<f64>, Vec<f64>);

    /// Transition function: `trans_fn(s, u) -> (mu_s', log sigma_s'^2)`.
    fn transition(&self, state: &[f64], action: usize) -> (Vec<f64>, Vec<f64>);
}

/// Linear-Gaussian dynamics: observation `o = W s`, transition
/// `s' = s + drift[u]`, both with fixed noise.
///
/// The reference dynamics used by tests and the in-memory world.
#[derive(Debug, Clone)]
pub struct LinearDynamics {
    /// Row-major `obs_dim x state_dim` observation weights.
    pub weights: Vec<Vec<f64>>,
    /// Per-action state drift vectors.
    pub drifts: Vec<Vec<f64>>,
    /// Log observation noise variance, shared across components.
    pub obs_log_var: f64,
    /// Log transition noise variance, shared across components.
    pub trans_log_var: f64,
}

impl ContinuousDynamics for LinearDynamics {
    fn state_dim(&self) -> usize {
        self.weights.first().map(|r| r.len()).unwrap_or(0)
    }

    fn obs_dim(&self) -> usize {
        self.weights.len()
    }

    fn action_dim(&self) -> usize {
        self.drifts.len()
    }

    fn observe(&self, state: &[f64]) -> (Vec<f64>, Vec<f64>) {
        let mean = self
            .weights
            .iter()
            .map(|row| row.iter().zip(state.iter()).map(|(w, s)| w * s).sum())
            .collect();
        (mean, vec![clamp_log_var(self.obs_log_var); self.obs_dim()])
    }

    fn transition(&self, state: &[f64], action: usize) -> (Vec<f64>, Vec<f64>) {
        let drift = &self.drifts[action.min(self.drifts.len().saturating_sub(1))];
        let mean = state
            .iter()
            .zip(drift.iter())
            .map(|(s, d)| s + d)
            .collect();
        (
            mean,
            vec![clamp_log_var(self.trans_log_var); self.state_dim()],
        )
    }
}

/// Continuous generative model: dynamics plus a Gaussian prior.
pub struct ContinuousModel {
    dynamics: Box<dyn ContinuousDynamics>,
    prior_mean: Vec<f64>,
    prior_log_var: Vec<f64>,
}

impl ContinuousModel {
    pub fn new(
        dynamics: Box<dyn ContinuousDynamics>,
        prior_mean: Vec<f64>,
        prior_log_var: Vec<f64>,
    ) -> Result<Self> {
        if prior_mean.len() != dynamics.state_dim() || prior_log_var.len() != prior_mean.len() {
            return Err(Error::DimensionMismatch {
                expected: format!("prior of length {}", dynamics.state_dim()),
                actual: format!(
                    "mean {}, log_var {}",
                    prior_mean.len(),
                    prior_log_var.len()
                ),
            });
        }
        Ok(ContinuousModel {
            dynamics,
            prior_mean,
            prior_log_var: prior_log_var.into_iter().map(clamp_log_var).collect(),
        })
    }

    pub fn state_dim(&self) -> usize {
        self.dynamics.state_dim()
    }

    pub fn obs_dim(&self) -> usize {
        self.dynamics.obs_dim()
    }

    pub fn action_dim(&self) -> usize {
        self.dynamics.action_dim()
    }

    pub fn prior(&self) -> (&[f64], &[f64]) {
        (&self.prior_mean, &self.prior_log_var)
    }

    /// Replace the prior; used by the continuous learner.
    pub fn set_prior(&mut self, mean: Vec<f64>, log_var: Vec<f64>) -> Result<()> {
        if mean.len() != self.state_dim() || log_var.len() != mean.len() {
            return Err(Error::DimensionMismatch {
                expected: format!("prior of length {}", self.state_dim()),
                actual: format!("mean {}, log_var {}", mean.len(), log_var.len()),
            });
        }
        if mean.iter().any(|m| !m.is_finite()) {
            return Err(Error::NumericalInstability(
                "prior mean is non-finite".into(),
            ));
        }
        self.prior_mean = mean;
        self.prior_log_var = log_var.into_iter().map(clamp_log_var).collect();
        Ok(())
    }

    /// Predicted observation distribution from a state point.
    pub fn predict_obs(&self, state: &[f64]) -> (Vec<f64>, Vec<f64>) {
        let (mean, log_var) = self.dynamics.observe(state);
        (mean, log_var.into_iter().map(clamp_log_var).collect())
    }

    /// Propagate a Gaussian belief through the transition function.
    ///
    /// Means compose through the dynamics; variances add the process
    /// noise, staying in log space.
    pub fn predict_next(&self, belief: &Belief, action: usize) -> Result<Belief> {
        let (mean, log_var) = match belief {
            Belief::Gaussian { mean, log_var } => (mean, log_var),
            _ => {
                return Err(Error::DimensionMismatch {
                    expected: "gaussian belief".into(),
                    actual: "non-gaussian belief".into(),
                })
            }
        };
        if action >= self.action_dim() {
            return Err(Error::DimensionMismatch {
                expected: format!("action below {}", self.action_dim()),
                actual: format!("action {action}"),
            });
        }
        let (next_mean, noise_log_var) = self.dynamics.transition(mean, action);
        let next_log_var: Vec<f64> = log_var
            .iter()
            .zip(noise_log_var.iter())
            .map(|(lv, nv)| clamp_log_var((lv.exp() + nv.exp()).ln()))
            .collect();
        Belief::gaussian(next_mean, next_log_var)
    }

    /// Sample a state from a Gaussian belief.
    pub fn sample(&self, belief: &Belief, rng: &mut DetRng) -> Result<Vec<f64>> {
        match belief {
            Belief::Gaussian { mean, log_var } => Ok(mean
                .iter()
                .zip(log_var.iter())
                .map(|(m, lv)| m + (0.5 * lv).exp() * rng.normal())
                .collect()),
            _ => Err(Error::DimensionMismatch {
                expected: "gaussian belief".into(),
                actual: "non-gaussian belief".into(),
            }),
        }
    }
}

#[cfg(test)]
pub(crate) mod tests_helpers {
    use super::*;

    /// Two-dimensional identity-observation model whose actions drift
    /// the first state component by +/-1.
    pub(crate) fn drift_model() -> ContinuousModel {
        let dynamics = LinearDynamics {
            weights: vec![vec![1.0, 0.0], vec![0.0, 1.0]],
            drifts: vec![vec![1.0, 0.0], vec![-1.0, 0.0]],
            obs_log_var: -2.0,
            trans_log_var: -4.0,
        };
        ContinuousModel::new(Box::new(dynamics), vec![0.0, 0.0], vec![0.0, 0.0]).unwrap()
    }
}

#[cfg(test)]
mod tests {
    use super::tests_helpers::drift_model;
    use super::*;

    #[test]
    fn prior_shape_is_checked() {
        let dynamics = LinearDynamics {
            weights: vec![vec![1.0, 0.0]],
            drifts: vec![vec![0.0, 0.0]],
            obs_log_var: 0.0,
            trans_log_var: 0.0,
        };
        assert!(ContinuousModel::new(Box::new(dynamics), vec![0.0], vec![0.0]).is_err());
    }

    #[test]
    fn predict_next_moves_mean_and_grows_variance() {
        let m = drift_model();
        let b = Belief::gaussian(vec![0.0, 0.0], vec![-4.0, -4.0]).unwrap();
        let next = m.predict_next(&b, 0).unwrap();
        match next {
            Belief::Gaussian { mean, log_var } => {
                assert!((mean[0] - 1.0).abs() < 1e-12);
                assert!(log_var[0] > -4.0);
            }
            _ => unreachable!(),
        }
    }

    #[test]
    fn predict_next_rejects_categorical() {
        let m = drift_model();
        assert!(m.predict_next(&Belief::uniform(3), 0).is_err());
    }

    #[test]
    fn observation_is_linear_in_state() {
        let m = drift_model();
        let (mean, _) = m.predict_obs(&[2.0, -1.0]);
        assert_eq!(mean, vec![2.0, -1.0]);
    }
}
