//! Uniformization-based path simulation.
//!
//! - [`SubordinatedProcess`]: Poisson(λ) clock driving the DTMC `I + Q/λ`
//! - [`StateHistory`]: a realized path and its sufficient statistics
//! - [`UniformizedSimulator`]: endpoint-conditioned simulation (Hobolth and
//!   Stone, algorithm 5) plus plain forward simulation

mod history;
mod simulate;
mod subordinated;

pub use history::{StateChange, StateHistory};
pub use simulate::{
    simulate_conditional_on_ending_state, simulate_unconditional_on_ending_state,
    UniformizedSimulator,
};
pub use subordinated::SubordinatedProcess;
