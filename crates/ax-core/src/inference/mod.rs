//! Variational inference engines.
//!
//! Five interchangeable algorithms sit behind one `infer` operation:
//! variational message passing, temporal belief propagation, gradient
//! VI, natural-gradient VI, and a particle filter. The contract shared
//! by every variant:
//!
//! - the input belief/prior is read-only; the returned belief is fresh
//!   and normalized
//! - degenerate inputs never panic: the engine falls back to a uniform
//!   belief and records a `degenerate-observation` warning

pub mod free_energy;
pub mod gradient;
pub mod particle;
pub mod vmp;

pub use free_energy::{continuous_free_energy, discrete_free_energy};
pub use gradient::GradientVi;
pub use particle::ParticleFilter;
pub use vmp::Vmp;

use ax_common::{Error, Result};
use ax_config::{InferenceKind, InferenceSettings};

use crate::belief::Belief;
use crate::model::DiscreteModel;

/// Observation input to an inference step.
#[derive(Debug, Clone, PartialEq)]
pub enum Observation {
    /// A single observed class index.
    Index(usize),
    /// A soft observation: a distribution over classes.
    Distribution(Vec<f64>),
    /// A continuous observation vector.
    Continuous(Vec<f64>),
}

/// Temporal context: the previous belief and the action that led here.
#[derive(Debug, Clone, Copy, Default)]
pub struct InferenceContext<'a> {
    pub previous_belief: Option<&'a Belief>,
    pub action: Option<usize>,
}

/// Result of one inference step.
#[derive(Debug, Clone, PartialEq)]
pub struct Inferred {
    pub belief: Belief,
    pub iterations: usize,
    pub converged: bool,
    /// Set when the engine recovered from a degenerate input.
    pub warning: Option<String>,
}

impl Inferred {
    pub(crate) fn degenerate(states: usize, reason: &str) -> Self {
        Inferred {
            belief: Belief::uniform(states),
            iterations: 0,
            converged: false,
            warning: Some(format!("degenerate-observation: {reason}")),
        }
    }
}

/// Tagged engine: one variant per inference algorithm.
#[derive(Debug, Clone)]
pub enum Engine {
    Vmp(Vmp),
    /// VMP composed with the transition model when temporal context is
    /// available.
    BeliefPropagation(Vmp),
    GradientVi(GradientVi),
    NaturalGradientVi(GradientVi),
    ParticleFilter(ParticleFilter),
}

impl Engine {
    /// Build the engine selected by the settings.
    pub fn from_settings(settings: &InferenceSettings, seed: u64) -> Engine {
        match settings.algorithm {
            InferenceKind::Vmp => Engine::Vmp(Vmp::new(settings)),
            InferenceKind::BeliefPropagation => Engine::BeliefPropagation(Vmp::new(settings)),
            InferenceKind::GradientVi => Engine::GradientVi(GradientVi::new(settings, false)),
            InferenceKind::NaturalGradientVi => {
                Engine::NaturalGradientVi(GradientVi::new(settings, true))
            }
            InferenceKind::ParticleFilter => {
                Engine::ParticleFilter(ParticleFilter::new(settings, seed))
            }
        }
    }

    /// Update a discrete belief from an observation.
    ///
    /// `prior` overrides the model prior `D`; the context routes the
    /// temporal composition for belief propagation and supplies the
    /// previous particle set for SMC.
    pub fn infer(
        &mut self,
        model: &DiscreteModel,
        observation: &Observation,
        prior: Option<&Belief>,
        ctx: InferenceContext<'_>,
    ) -> Result<Inferred> {
        match self {
            // Plain VMP ignores the transition model but still chains
            // from the previous belief when no explicit prior is given.
            Engine::Vmp(vmp) => {
                let prior = prior.or(ctx.previous_belief);
                vmp.infer(model, observation, prior, InferenceContext::default())
            }
            Engine::BeliefPropagation(vmp) => vmp.infer(model, observation, prior, ctx),
            // The gradient engines are continuous-state; settings
            // validation rejects them for discrete runs, so reaching
            // this arm is a caller error, never a silent alias.
            Engine::GradientVi(_) | Engine::NaturalGradientVi(_) => Err(Error::DimensionMismatch {
                expected: "continuous model for gradient engines".into(),
                actual: "discrete model".into(),
            }),
            Engine::ParticleFilter(pf) => pf.infer(model, observation, prior, ctx),
        }
    }

    /// Update a Gaussian belief from a continuous observation.
    ///
    /// Only the gradient engines operate on continuous models; the
    /// discrete variants fall back to plain gradient VI here.
    pub fn infer_continuous(
        &mut self,
        model: &crate::model::ContinuousModel,
        observation: &[f64],
        prior: Option<&Belief>,
    ) -> Result<Inferred> {
        match self {
            Engine::GradientVi(vi) | Engine::NaturalGradientVi(vi) => {
                vi.infer_continuous(model, observation, prior)
            }
            _ => {
                let settings = ax_config::InferenceSettings::default();
                GradientVi::new(&settings, false).infer_continuous(model, observation, prior)
            }
        }
    }
}
