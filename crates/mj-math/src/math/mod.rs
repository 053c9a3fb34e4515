//! Core math modules.

pub mod eigen;
pub mod expm;
pub mod gamma;
pub mod matrix;
pub mod poisson;
pub mod stable;
