//! Numerical primitives for Markov jump and reward statistics.

pub mod math;

pub use math::eigen::{DefaultEigenSystem, EigenDecomposition, EigenError, EigenSystem};
pub use math::expm::uniformized_exponential;
pub use math::gamma::{gamma_log_pdf, gamma_pdf};
pub use math::matrix::*;
pub use math::poisson::*;
pub use math::stable::*;
