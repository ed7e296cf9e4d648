//! Discrete generative model: the A/B/C/D factors.
//!
//! - `A`: `O x S` observation likelihood, column stochastic
//! - `B`: `S x S` transition matrix per action, column stochastic
//! - `C`: `O x T` log-preferences over observations per horizon step
//! - `D`: length-`S` prior over the initial state
//!
//! Invariants are enforced on every write: parameter updates land on a
//! shadow copy, are validated, and only then committed. A rejected
//! update leaves the model untouched and fails with
//! `InvariantViolation`.

use serde::{Deserialize, Serialize};

use ax_common::{Error, Result};
use ax_math::{floor_and_renormalize, uniform, DetRng, Matrix, Tensor3, STOCHASTIC_TOL};

/// Model dimensions, fixed at construction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Dimensions {
    /// Hidden states S.
    pub states: usize,
    /// Observation classes O.
    pub observations: usize,
    /// Primitive actions U.
    pub actions: usize,
}

impl Dimensions {
    pub fn new(states: usize, observations: usize, actions: usize) -> Result<Self> {
        if states == 0 || observations == 0 || actions == 0 {
            return Err(Error::DimensionMismatch {
                expected: "all dimensions at least 1".into(),
                actual: format!("S={states}, O={observations}, U={actions}"),
            });
        }
        Ok(Dimensions {
            states,
            observations,
            actions,
        })
    }
}

/// Discrete generative model.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DiscreteModel {
    dims: Dimensions,
    horizon: usize,
    a: Matrix,
    b: Tensor3,
    c: Matrix,
    d: Vec<f64>,
}

impl DiscreteModel {
    /// Uniform model: uniform likelihood and transitions, zero
    /// preferences, uniform prior.
    pub fn uniform(dims: Dimensions, horizon: usize) -> Self {
        DiscreteModel {
            dims,
            horizon: horizon.max(1),
            a: Matrix::uniform_stochastic(dims.observations, dims.states),
            b: Tensor3::uniform_stochastic(dims.states, dims.actions),
            c: Matrix::zeros(dims.observations, horizon.max(1)),
            d: uniform(dims.states),
        }
    }

    /// Bayesian initialization: every stochastic column drawn from a
    /// symmetric Dirichlet with the given concentration.
    pub fn dirichlet_init(
        dims: Dimensions,
        horizon: usize,
        concentration: f64,
        rng: &mut DetRng,
    ) -> Result<Self> {
        if !(concentration > 0.0) {
            return Err(Error::InvariantViolation {
                tensor: "A".into(),
                reason: format!("dirichlet concentration {concentration} must be positive"),
            });
        }
        let mut model = DiscreteModel::uniform(dims, horizon);
        let alpha_obs = vec![concentration; dims.observations];
        for s in 0..dims.states {
            let col = rng.dirichlet(&alpha_obs);
            for o in 0..dims.observations {
                model.a.set(o, s, col[o]);
            }
        }
        let alpha_states = vec![concentration; dims.states];
        for u in 0..dims.actions {
            for s in 0..dims.states {
                let col = rng.dirichlet(&alpha_states);
                for s_next in 0..dims.states {
                    model.b.slice_mut(u).set(s_next, s, col[s_next]);
                }
            }
        }
        model.d = rng.dirichlet(&vec![concentration; dims.states]);
        model.validate()?;
        Ok(model)
    }

    /// Build from explicit factors, enforcing every invariant.
    pub fn from_parts(
        dims: Dimensions,
        a: Matrix,
        b: Tensor3,
        c: Matrix,
        d: Vec<f64>,
    ) -> Result<Self> {
        let horizon = c.cols();
        let model = DiscreteModel {
            dims,
            horizon,
            a,
            b,
            c,
            d,
        };
        model.validate()?;
        Ok(model)
    }

    /// Validate all invariants: shapes, stochasticity, finiteness.
    pub fn validate(&self) -> Result<()> {
        let dims = self.dims;
        if self.a.rows() != dims.observations || self.a.cols() != dims.states {
            return Err(Error::DimensionMismatch {
                expected: format!("A of shape {}x{}", dims.observations, dims.states),
                actual: format!("{}x{}", self.a.rows(), self.a.cols()),
            });
        }
        if self.b.states() != dims.states || self.b.actions() != dims.actions {
            return Err(Error::DimensionMismatch {
                expected: format!("B of shape {0}x{0}x{1}", dims.states, dims.actions),
                actual: format!("{0}x{0}x{1}", self.b.states(), self.b.actions()),
            });
        }
        if self.c.rows() != dims.observations {
            return Err(Error::DimensionMismatch {
                expected: format!("C with {} rows", dims.observations),
                actual: format!("{} rows", self.c.rows()),
            });
        }
        if self.d.len() != dims.states {
            return Err(Error::DimensionMismatch {
                expected: format!("D of length {}", dims.states),
                actual: format!("length {}", self.d.len()),
            });
        }
        if let Some((col, sum)) = self.a.first_bad_column(STOCHASTIC_TOL) {
            return Err(Error::InvariantViolation {
                tensor: "A".into(),
                reason: format!("column {col} sums to {sum}"),
            });
        }
        if let Some((u, col, sum)) = self.b.first_bad_column(STOCHASTIC_TOL) {
            return Err(Error::InvariantViolation {
                tensor: format!("B[:,:,{u}]"),
                reason: format!("column {col} sums to {sum}"),
            });
        }
        if self.c.as_slice().iter().any(|x| !x.is_finite()) {
            return Err(Error::InvariantViolation {
                tensor: "C".into(),
                reason: "non-finite preference entry".into(),
            });
        }
        let d_sum: f64 = self.d.iter().sum();
        if self.d.iter().any(|x| !x.is_finite() || *x < 0.0)
            || (d_sum - 1.0).abs() > STOCHASTIC_TOL
        {
            return Err(Error::InvariantViolation {
                tensor: "D".into(),
                reason: format!("prior sums to {d_sum}"),
            });
        }
        Ok(())
    }

    pub fn dims(&self) -> Dimensions {
        self.dims
    }

    pub fn horizon(&self) -> usize {
        self.horizon
    }

    pub fn a(&self) -> &Matrix {
        &self.a
    }

    pub fn b(&self) -> &Tensor3 {
        &self.b
    }

    pub fn c(&self) -> &Matrix {
        &self.c
    }

    pub fn d(&self) -> &[f64] {
        &self.d
    }

    /// Observation distribution predicted from a state distribution:
    /// `o = A * b`.
    pub fn predict_obs(&self, belief: &[f64]) -> Result<Vec<f64>> {
        self.a.matvec(belief).ok_or_else(|| Error::DimensionMismatch {
            expected: format!("belief of length {}", self.dims.states),
            actual: format!("length {}", belief.len()),
        })
    }

    /// One-step belief propagation under action `u`: `b' = B[:,:,u] * b`.
    pub fn predict_next(&self, belief: &[f64], action: usize) -> Result<Vec<f64>> {
        if action >= self.dims.actions {
            return Err(Error::DimensionMismatch {
                expected: format!("action below {}", self.dims.actions),
                actual: format!("action {action}"),
            });
        }
        let mut next = self
            .b
            .propagate(action, belief)
            .ok_or_else(|| Error::DimensionMismatch {
                expected: format!("belief of length {}", self.dims.states),
                actual: format!("length {}", belief.len()),
            })?;
        if !floor_and_renormalize(&mut next) {
            return Err(Error::DegenerateObservation(
                "transition produced zero belief mass".into(),
            ));
        }
        Ok(next)
    }

    /// Likelihood of observation `o` across states: the row `A[o, :]`.
    pub fn likelihood(&self, observation: usize) -> Result<&[f64]> {
        if observation >= self.dims.observations {
            return Err(Error::DegenerateObservation(format!(
                "observation {observation} outside {} classes",
                self.dims.observations
            )));
        }
        Ok(self.a.row(observation))
    }

    /// Log-preference for observation `o` at horizon step `t` (steps
    /// beyond the stored horizon repeat the last column).
    pub fn preference(&self, observation: usize, t: usize) -> f64 {
        let t = t.min(self.horizon - 1);
        self.c.get(observation, t)
    }

    /// Preference column for horizon step `t`.
    pub fn preference_column(&self, t: usize) -> Vec<f64> {
        let t = t.min(self.horizon - 1);
        self.c.col(t)
    }

    /// Sample a hidden state from a belief.
    pub fn sample(&self, belief: &[f64], rng: &mut DetRng) -> usize {
        rng.sample_categorical(belief)
    }

    /// Sample an observation from a hidden state.
    pub fn sample_obs(&self, state: usize, rng: &mut DetRng) -> usize {
        let col = self.a.col(state.min(self.dims.states - 1));
        rng.sample_categorical(&col)
    }

    /// Apply a parameter update through a shadow copy.
    ///
    /// The mutation runs against a clone; the clone is validated and
    /// committed only when every invariant still holds. Replacement of
    /// `C` (preferences) is unconstrained beyond finiteness.
    pub fn update_params<F>(&mut self, mutate: F) -> Result<()>
    where
        F: FnOnce(&mut Matrix, &mut Tensor3, &mut Matrix, &mut Vec<f64>),
    {
        let mut shadow = self.clone();
        mutate(
            &mut shadow.a,
            &mut shadow.b,
            &mut shadow.c,
            &mut shadow.d,
        );
        shadow.horizon = shadow.c.cols().max(1);
        shadow.validate()?;
        *self = shadow;
        Ok(())
    }
}

#[cfg(test)]
pub(crate) mod fixtures {
    use super::*;

    /// 4-state corridor with 3 observation classes; the last state is
    /// weakly observable through every class. Action 0 shifts right,
    /// action 1 shifts left, both clamped at the ends.
    pub(crate) fn corridor() -> DiscreteModel {
        let dims = Dimensions::new(4, 3, 2).unwrap();
        let third = 1.0 / 3.0;
        let a = Matrix::from_rows(&[
            vec![0.9, 0.1, 0.0, third],
            vec![0.1, 0.8, 0.1, third],
            vec![0.0, 0.1, 0.9, third],
        ])
        .unwrap();
        let mut right = Matrix::zeros(4, 4);
        let mut left = Matrix::zeros(4, 4);
        for s in 0..4 {
            right.set((s + 1).min(3), s, 1.0);
            left.set(s.saturating_sub(1), s, 1.0);
        }
        let b = Tensor3::from_slices(vec![right, left]).unwrap();
        let c = Matrix::from_rows(&[vec![0.8; 5], vec![0.1; 5], vec![0.1; 5]]).unwrap();
        DiscreteModel::from_parts(dims, a, b, c, uniform(4)).unwrap()
    }
}

#[cfg(test)]
mod tests {
    use super::fixtures::corridor;
    use super::*;

    #[test]
    fn uniform_model_is_valid() {
        let m = DiscreteModel::uniform(Dimensions::new(4, 3, 2).unwrap(), 5);
        assert!(m.validate().is_ok());
    }

    #[test]
    fn corridor_predicts_shifted_belief() {
        let m = corridor();
        let next = m.predict_next(&[1.0, 0.0, 0.0, 0.0], 0).unwrap();
        assert!(next[1] > 0.99);
    }

    #[test]
    fn predict_obs_matches_matvec() {
        let m = corridor();
        let obs = m.predict_obs(&[0.0, 1.0, 0.0, 0.0]).unwrap();
        assert!((obs[1] - 0.8).abs() < 1e-12);
    }

    #[test]
    fn invalid_action_is_rejected() {
        let m = corridor();
        assert!(m.predict_next(&[0.25; 4], 9).is_err());
    }

    #[test]
    fn update_params_rejects_broken_column() {
        let mut m = corridor();
        let before = m.clone();
        let result = m.update_params(|a, _, _, _| a.set(0, 0, 5.0));
        assert!(matches!(result, Err(Error::InvariantViolation { .. })));
        assert_eq!(m, before);
    }

    #[test]
    fn update_params_commits_valid_change() {
        let mut m = corridor();
        m.update_params(|_, _, c, _| c.set(0, 0, 2.5)).unwrap();
        assert_eq!(m.preference(0, 0), 2.5);
    }

    #[test]
    fn dirichlet_init_is_stochastic() {
        let mut rng = DetRng::from_seed(3);
        let m = DiscreteModel::dirichlet_init(Dimensions::new(5, 4, 3).unwrap(), 4, 1.0, &mut rng)
            .unwrap();
        assert!(m.validate().is_ok());
    }

    #[test]
    fn preference_clamps_horizon() {
        let m = corridor();
        assert_eq!(m.preference(0, 999), m.preference(0, 4));
    }
}
