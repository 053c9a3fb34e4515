//! Markov jump and reward statistics on finite-state CTMCs.
//!
//! This library provides:
//! - Expected labeled-transition counts and rewards (`jumps`)
//! - Sericola series densities and distributions of accumulated reward (`reward`)
//! - Uniformized endpoint-conditioned path simulation (`uniformization`)
//! - Error taxonomy, logging setup and CLI exit codes
//!
//! The binary entry point is in `main.rs`.

pub mod error;
pub mod exit_codes;
pub mod jumps;
pub mod logging;
pub mod reward;
pub mod uniformization;

pub use error::{ErrorCategory, MarkovError, Result};
pub use jumps::MarkovJumpsCore;
pub use reward::{
    MarkovReward, Restorable, SericolaModelMarkovReward, SericolaSeriesMarkovReward,
    TwoStateOccupancyMarkovReward,
};
pub use uniformization::{StateChange, StateHistory, SubordinatedProcess, UniformizedSimulator};
