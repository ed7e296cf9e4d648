//! Belief-state representations.
//!
//! A belief is a distribution over hidden states in one of three
//! parameterizations: a categorical vector (discrete engines), a
//! diagonal Gaussian (continuous engines), or a weighted particle set
//! (sequential Monte Carlo). All three normalize, floor at the
//! numerical EPS, and expose a categorical projection for the planners.

use serde::{Deserialize, Serialize};

use ax_common::{Error, Result};
use ax_math::{clamp_log_var, entropy, floor_and_renormalize, uniform, EPS};

/// Distribution over hidden states.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "repr", rename_all = "snake_case")]
pub enum Belief {
    /// Categorical distribution over `S` discrete states.
    Categorical { probs: Vec<f64> },
    /// Diagonal Gaussian over a continuous state space.
    Gaussian { mean: Vec<f64>, log_var: Vec<f64> },
    /// Weighted particles over discrete states.
    Particles { states: Vec<usize>, weights: Vec<f64> },
}

impl Belief {
    /// Uniform categorical belief over `states` states.
    pub fn uniform(states: usize) -> Self {
        Belief::Categorical {
            probs: uniform(states),
        }
    }

    /// Categorical belief from raw (non-negative) mass.
    ///
    /// Degenerate input falls back to uniform and reports the
    /// degeneracy to the caller.
    pub fn categorical(mut probs: Vec<f64>) -> Result<Self> {
        if !floor_and_renormalize(&mut probs) {
            return Err(Error::DegenerateObservation(
                "belief mass is zero or non-finite".into(),
            ));
        }
        Ok(Belief::Categorical { probs })
    }

    /// Gaussian belief with clamped log-variances.
    pub fn gaussian(mean: Vec<f64>, log_var: Vec<f64>) -> Result<Self> {
        if mean.len() != log_var.len() || mean.is_empty() {
            return Err(Error::DimensionMismatch {
                expected: format!("log_var of length {}", mean.len().max(1)),
                actual: format!("length {}", log_var.len()),
            });
        }
        if mean.iter().any(|m| !m.is_finite()) {
            return Err(Error::NumericalInstability(
                "gaussian belief mean is non-finite".into(),
            ));
        }
        Ok(Belief::Gaussian {
            mean,
            log_var: log_var.into_iter().map(clamp_log_var).collect(),
        })
    }

    /// Particle belief with normalized weights.
    pub fn particles(states: Vec<usize>, mut weights: Vec<f64>) -> Result<Self> {
        if states.len() != weights.len() || states.is_empty() {
            return Err(Error::DimensionMismatch {
                expected: format!("weights of length {}", states.len().max(1)),
                actual: format!("length {}", weights.len()),
            });
        }
        if !floor_and_renormalize(&mut weights) {
            return Err(Error::DegenerateObservation(
                "particle weights are zero or non-finite".into(),
            ));
        }
        Ok(Belief::Particles { states, weights })
    }

    /// Number of hidden states represented (particle beliefs report the
    /// largest state index plus one).
    pub fn dimension(&self) -> usize {
        match self {
            Belief::Categorical { probs } => probs.len(),
            Belief::Gaussian { mean, .. } => mean.len(),
            Belief::Particles { states, .. } => {
                states.iter().max().map(|s| s + 1).unwrap_or(0)
            }
        }
    }

    /// Project onto a categorical vector over `states` states.
    ///
    /// Gaussian beliefs project by binning the mean's first component,
    /// which is only used for diagnostics; planners operate on
    /// categorical and particle beliefs.
    pub fn to_categorical(&self, states: usize) -> Vec<f64> {
        match self {
            Belief::Categorical { probs } => {
                let mut out = probs.clone();
                out.resize(states, EPS);
                let _ = floor_and_renormalize(&mut out);
                out
            }
            Belief::Particles {
                states: particles,
                weights,
            } => {
                let mut out = vec![0.0; states];
                for (&s, &w) in particles.iter().zip(weights.iter()) {
                    if s < states {
                        out[s] += w;
                    }
                }
                if !floor_and_renormalize(&mut out) {
                    return uniform(states);
                }
                out
            }
            Belief::Gaussian { mean, .. } => {
                let mut out = vec![EPS; states];
                let first = mean.first().copied().unwrap_or(0.0);
                let idx = (first.round().max(0.0) as usize).min(states.saturating_sub(1));
                out[idx] = 1.0;
                let _ = floor_and_renormalize(&mut out);
                out
            }
        }
    }

    /// Shannon entropy in nats (categorical projection for particles;
    /// differential entropy for Gaussians).
    pub fn entropy(&self) -> f64 {
        match self {
            Belief::Categorical { probs } => entropy(probs),
            Belief::Particles { .. } => {
                let dim = self.dimension().max(1);
                entropy(&self.to_categorical(dim))
            }
            Belief::Gaussian { log_var, .. } => {
                // 0.5 * sum(1 + ln(2*pi*var))
                log_var
                    .iter()
                    .map(|lv| 0.5 * (1.0 + (2.0 * std::f64::consts::PI).ln() + lv))
                    .sum()
            }
        }
    }

    /// Whether the belief satisfies its normalization invariant.
    pub fn is_normalized(&self, tol: f64) -> bool {
        match self {
            Belief::Categorical { probs } => {
                let sum: f64 = probs.iter().sum();
                probs.iter().all(|p| p.is_finite() && *p >= 0.0) && (sum - 1.0).abs() <= tol
            }
            Belief::Particles { weights, .. } => {
                let sum: f64 = weights.iter().sum();
                weights.iter().all(|w| w.is_finite() && *w >= 0.0) && (sum - 1.0).abs() <= tol
            }
            Belief::Gaussian { mean, log_var } => {
                mean.iter().all(|m| m.is_finite()) && log_var.iter().all(|v| v.is_finite())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn uniform_is_normalized() {
        let b = Belief::uniform(4);
        assert!(b.is_normalized(1e-9));
        assert!((b.entropy() - 4.0f64.ln()).abs() < 1e-9);
    }

    #[test]
    fn categorical_rejects_zero_mass() {
        assert!(Belief::categorical(vec![0.0, 0.0]).is_err());
    }

    #[test]
    fn particles_project_to_histogram() {
        let b = Belief::particles(vec![0, 1, 1, 2], vec![0.25; 4]).unwrap();
        let cat = b.to_categorical(3);
        assert!((cat[1] - 0.5).abs() < 1e-9);
        assert!(b.is_normalized(1e-9));
    }

    #[test]
    fn gaussian_clamps_log_var() {
        let b = Belief::gaussian(vec![0.0], vec![99.0]).unwrap();
        match b {
            Belief::Gaussian { log_var, .. } => assert_eq!(log_var[0], 10.0),
            _ => unreachable!(),
        }
    }

    #[test]
    fn gaussian_rejects_shape_mismatch() {
        assert!(Belief::gaussian(vec![0.0, 1.0], vec![0.0]).is_err());
    }
}
