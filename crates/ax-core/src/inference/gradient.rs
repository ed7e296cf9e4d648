//! Gradient and natural-gradient variational inference for the
//! continuous model.
//!
//! The posterior `q = N(mu, diag(exp(log_var)))` descends the
//! variational free energy with Adam-style updates. The KL gradient is
//! analytic; the observation NLL gradient goes through the dynamics by
//! central finite differences, so any [`ContinuousDynamics`]
//! implementation works without exposing derivatives. The natural
//! variant preconditions the mean gradient with the inverse Fisher
//! information, which for a diagonal Gaussian is the posterior
//! variance, damped by `lambda`.

use ax_common::Result;
use ax_config::InferenceSettings;
use ax_math::{clamp_log_var, clip_grad_norm, gaussian_nll, max_abs_diff};

use crate::belief::Belief;
use crate::inference::Inferred;
use crate::model::ContinuousModel;

const ADAM_BETA1: f64 = 0.9;
const ADAM_BETA2: f64 = 0.999;
const ADAM_EPS: f64 = 1e-8;
const FD_STEP: f64 = 1e-5;

/// Gradient VI engine.
#[derive(Debug, Clone)]
pub struct GradientVi {
    natural: bool,
    learning_rate: f64,
    gradient_clip: f64,
    threshold: f64,
    max_iterations: usize,
    damping: f64,
}

impl GradientVi {
    pub fn new(settings: &InferenceSettings, natural: bool) -> Self {
        GradientVi {
            natural,
            learning_rate: settings.learning_rate,
            gradient_clip: settings.gradient_clip,
            threshold: settings.convergence_threshold,
            max_iterations: settings.max_iterations.max(1),
            damping: settings.damping,
        }
    }

    /// Minimize the VFE for one continuous observation.
    pub fn infer_continuous(
        &mut self,
        model: &ContinuousModel,
        observation: &[f64],
        prior: Option<&Belief>,
    ) -> Result<Inferred> {
        let (prior_mean, prior_log_var) = match prior {
            Some(Belief::Gaussian { mean, log_var }) => (mean.clone(), log_var.clone()),
            _ => {
                let (m, lv) = model.prior();
                (m.to_vec(), lv.to_vec())
            }
        };
        let dim = prior_mean.len();
        if observation.len() != model.obs_dim()
            || observation.iter().any(|o| !o.is_finite())
        {
            return Ok(degenerate_gaussian(
                prior_mean,
                prior_log_var,
                "continuous observation is malformed",
            ));
        }

        let mut mean = prior_mean.clone();
        let mut log_var = prior_log_var.clone();
        let mut adam_m = vec![0.0; dim];
        let mut adam_v = vec![0.0; dim];

        let mut iterations = 0;
        let mut converged = false;
        for step in 1..=self.max_iterations {
            iterations = step;

            let mut grad_mean = self.mean_gradient(
                model,
                observation,
                &mean,
                &prior_mean,
                &prior_log_var,
            );
            clip_grad_norm(&mut grad_mean, self.gradient_clip);

            if self.natural {
                // F^-1 grad = Sigma grad for a diagonal Gaussian.
                for (g, lv) in grad_mean.iter_mut().zip(log_var.iter()) {
                    let var = lv.exp();
                    *g *= var / (1.0 + self.damping * var);
                }
            }

            let previous_mean = mean.clone();
            for i in 0..dim {
                adam_m[i] = ADAM_BETA1 * adam_m[i] + (1.0 - ADAM_BETA1) * grad_mean[i];
                adam_v[i] = ADAM_BETA2 * adam_v[i] + (1.0 - ADAM_BETA2) * grad_mean[i] * grad_mean[i];
                let m_hat = adam_m[i] / (1.0 - ADAM_BETA1.powi(step as i32));
                let v_hat = adam_v[i] / (1.0 - ADAM_BETA2.powi(step as i32));
                mean[i] -= self.learning_rate * m_hat / (v_hat.sqrt() + ADAM_EPS);
            }
            if mean.iter().any(|m| !m.is_finite()) {
                return Ok(degenerate_gaussian(
                    prior_mean,
                    prior_log_var,
                    "posterior mean diverged",
                ));
            }

            // Analytic KL gradient on the log-variances: the NLL term
            // is evaluated at the mean and does not contribute.
            for i in 0..dim {
                let grad_lv = 0.5 * ((log_var[i] - prior_log_var[i]).exp() - 1.0);
                log_var[i] = clamp_log_var(log_var[i] - self.learning_rate * grad_lv);
            }

            if max_abs_diff(&previous_mean, &mean) < self.threshold {
                converged = true;
                break;
            }
        }

        Ok(Inferred {
            belief: Belief::gaussian(mean, log_var)?,
            iterations,
            converged,
            warning: None,
        })
    }

    /// `d/d mu [ KL(q || p) + NLL(o | mu) ]`, NLL part by central
    /// finite differences through the dynamics.
    fn mean_gradient(
        &self,
        model: &ContinuousModel,
        observation: &[f64],
        mean: &[f64],
        prior_mean: &[f64],
        prior_log_var: &[f64],
    ) -> Vec<f64> {
        let dim = mean.len();
        let mut grad = vec![0.0; dim];
        for i in 0..dim {
            grad[i] = (mean[i] - prior_mean[i]) / prior_log_var[i].exp();

            let mut plus = mean.to_vec();
            let mut minus = mean.to_vec();
            plus[i] += FD_STEP;
            minus[i] -= FD_STEP;
            let nll_plus = obs_nll(model, observation, &plus);
            let nll_minus = obs_nll(model, observation, &minus);
            grad[i] += (nll_plus - nll_minus) / (2.0 * FD_STEP);
        }
        grad
    }
}

fn obs_nll(model: &ContinuousModel, observation: &[f64], state: &[f64]) -> f64 {
    let (obs_mean, obs_log_var) = model.predict_obs(state);
    gaussian_nll(observation, &obs_mean, &obs_log_var)
}

fn degenerate_gaussian(mean: Vec<f64>, log_var: Vec<f64>, reason: &str) -> Inferred {
    Inferred {
        belief: Belief::Gaussian { mean, log_var },
        iterations: 0,
        converged: false,
        warning: Some(format!("degenerate-observation: {reason}")),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::inference::continuous_free_energy;
    use crate::model::continuous::tests_helpers::drift_model;

    fn engine(natural: bool) -> GradientVi {
        let mut settings = InferenceSettings::default();
        settings.max_iterations = 200;
        settings.learning_rate = 0.1;
        GradientVi::new(&settings, natural)
    }

    #[test]
    fn posterior_mean_moves_toward_observation() {
        let model = drift_model();
        let mut vi = engine(false);
        let out = vi.infer_continuous(&model, &[3.0, -1.0], None).unwrap();
        match out.belief {
            Belief::Gaussian { ref mean, .. } => {
                assert!(mean[0] > 1.0, "mean[0] = {}", mean[0]);
                assert!(mean[1] < -0.3, "mean[1] = {}", mean[1]);
            }
            _ => unreachable!(),
        }
    }

    #[test]
    fn inference_lowers_free_energy() {
        let model = drift_model();
        let mut vi = engine(false);
        let obs = vec![2.0, 2.0];
        let (pm, plv) = model.prior();
        let prior_belief = Belief::gaussian(pm.to_vec(), plv.to_vec()).unwrap();
        let f_prior = continuous_free_energy(&prior_belief, &obs, &model).unwrap();
        let out = vi.infer_continuous(&model, &obs, None).unwrap();
        let f_post = continuous_free_energy(&out.belief, &obs, &model).unwrap();
        assert!(f_post < f_prior);
    }

    #[test]
    fn natural_gradient_also_converges() {
        let model = drift_model();
        let mut vi = engine(true);
        let out = vi.infer_continuous(&model, &[2.0, 0.0], None).unwrap();
        match out.belief {
            Belief::Gaussian { ref mean, .. } => assert!(mean[0] > 0.5),
            _ => unreachable!(),
        }
    }

    #[test]
    fn malformed_observation_falls_back_to_prior() {
        let model = drift_model();
        let mut vi = engine(false);
        let out = vi
            .infer_continuous(&model, &[f64::NAN, 0.0], None)
            .unwrap();
        assert!(out.warning.is_some());
        match out.belief {
            Belief::Gaussian { ref mean, .. } => assert_eq!(mean, &vec![0.0, 0.0]),
            _ => unreachable!(),
        }
    }

    #[test]
    fn wrong_arity_observation_is_degenerate() {
        let model = drift_model();
        let mut vi = engine(false);
        let out = vi.infer_continuous(&model, &[1.0], None).unwrap();
        assert!(out.warning.is_some());
    }
}
