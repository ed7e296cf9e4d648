//! Axon math utilities.

pub mod math;

pub use math::dirichlet::*;
pub use math::gaussian::*;
pub use math::rng::*;
pub use math::stable::*;
pub use math::tensor::*;
