//! Generative models.
//!
//! The discrete model stores the A/B/C/D factors and enforces their
//! stochasticity invariants on every write; the continuous model
//! composes user-supplied observation and transition functions through
//! diagonal Gaussians. Model definitions load from the text format in
//! [`spec_file`], and [`learning`] provides the online and batch
//! parameter updates.

pub mod continuous;
pub mod discrete;
pub mod learning;
pub mod spec_file;

pub use continuous::{ContinuousDynamics, ContinuousModel, LinearDynamics};
pub use discrete::{Dimensions, DiscreteModel};
pub use learning::{ContinuousLearner, DirichletLearner, Experience};
pub use spec_file::{load_model_file, parse_model_file, ModelDefinition};
