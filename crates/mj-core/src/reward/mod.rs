//! Reward (occupation-time) distributions for finite-state CTMCs.
//!
//! For a chain with generator `Q` and per-state reward rates `r`, the
//! accumulated reward over `[0, t]` is `X(t) = ∫ r(S(s)) ds`. The engines
//! here return the joint density and distribution of `X(t)` and the end
//! state, one `dim x dim` block per query:
//!
//! - [`SericolaSeriesMarkovReward`]: fixed `(Q, r)` snapshot
//! - [`SericolaModelMarkovReward`]: tracks upstream parameter providers and
//!   recomputes lazily when they change
//! - [`TwoStateOccupancyMarkovReward`]: closed-form series for 2-state chains

mod model;
mod ordering;
mod provider;
mod scratch;
mod series;
mod sericola;
mod tensor;
mod two_state;

pub use model::SericolaModelMarkovReward;
pub use ordering::RewardOrdering;
pub use provider::{GeneratorProvider, RewardRateProvider, SharedParameter};
pub use sericola::SericolaSeriesMarkovReward;
pub use tensor::RewardTensor;
pub use two_state::TwoStateOccupancyMarkovReward;

use crate::error::{MarkovError, Result};

/// Evaluation times for a batch of reward queries.
#[derive(Debug, Clone, Copy)]
pub enum Times<'a> {
    /// Every query uses the same time.
    Shared(f64),
    /// One time per query.
    PerQuery(&'a [f64]),
}

impl Times<'_> {
    pub fn at(&self, query: usize) -> f64 {
        match self {
            Times::Shared(t) => *t,
            Times::PerQuery(ts) => ts[query],
        }
    }

    pub(crate) fn check(&self, count: usize) -> Result<()> {
        match self {
            Times::Shared(_) => Ok(()),
            Times::PerQuery(ts) if ts.len() == count => Ok(()),
            Times::PerQuery(ts) => Err(MarkovError::ShapeMismatch {
                what: "times",
                expected: count,
                actual: ts.len(),
            }),
        }
    }

    pub(crate) fn max(&self, count: usize) -> f64 {
        match self {
            Times::Shared(t) => *t,
            Times::PerQuery(ts) => ts[..count].iter().copied().fold(f64::MIN, f64::max),
        }
    }

    /// Whether at least two queries carry different times.
    pub fn varies(&self) -> bool {
        match self {
            Times::Shared(_) => false,
            Times::PerQuery(ts) => ts.windows(2).any(|w| w[0] != w[1]),
        }
    }
}

/// Per-entry access shared by all reward engines.
pub trait MarkovReward {
    fn dim(&self) -> usize;

    /// Joint density of reward `x` and ending in `j`, starting in `i`.
    fn compute_pdf_entry(&mut self, reward: f64, time: f64, i: usize, j: usize) -> Result<f64>;

    /// `P(X(t) ≤ reward, S(t) = j | S(0) = i)`.
    fn compute_cdf_entry(&mut self, reward: f64, time: f64, i: usize, j: usize) -> Result<f64>;

    /// `P(S(t) = j | S(0) = i)`.
    fn compute_conditional_probability(&mut self, time: f64, i: usize, j: usize) -> Result<f64>;
}

/// Snapshot/rollback hooks for samplers that propose parameter moves.
pub trait Restorable {
    fn store_state(&mut self);
    fn restore_state(&mut self);
    fn accept_state(&mut self) {}
}
