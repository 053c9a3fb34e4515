//! Occupancy density for two-state chains.
//!
//! With `Q = [[-a, a], [b, -b]]` and reward 1 in state 1 (0 in state 0),
//! a path that starts and ends in state 0 with `n` visits to state 1 spends
//! `Gamma(n, b)` time there and `Gamma(n + 1, a)` time in state 0, the last
//! sojourn censored at `t`:
//!
//! ```text
//! f_00(x, t) = Σ_{n≥1} Gamma(n, b).pdf(x) · Gamma(n + 1, a).pdf(t − x) / a
//! ```
//!
//! Only the `(0, 0)` entry is provided.

use std::fmt;

use mj_config::TwoStateConfig;
use mj_math::{gamma_log_pdf, log_sum_exp, validate_generator};
use tracing::trace;

use super::MarkovReward;
use crate::error::{check_state, check_time, MarkovError, Result};
use crate::logging::targets;

#[derive(Debug, Clone)]
pub struct TwoStateOccupancyMarkovReward {
    /// Rate 0 → 1.
    a: f64,
    /// Rate 1 → 0.
    b: f64,
    config: TwoStateConfig,
}

impl TwoStateOccupancyMarkovReward {
    /// `q` is the row-major 2x2 generator.
    pub fn new(q: &[f64]) -> Result<Self> {
        Self::with_config(q, &TwoStateConfig::default())
    }

    pub fn with_config(q: &[f64], config: &TwoStateConfig) -> Result<Self> {
        if q.len() != 4 {
            return Err(MarkovError::NotTwoState);
        }
        mj_config::validate::validate_two_state(config)?;
        validate_generator(q, 2, 1e-8)?;
        let (a, b) = (q[1], q[2]);
        if !(a > 0.0 && b > 0.0) {
            return Err(MarkovError::NotTwoState);
        }
        Ok(Self {
            a,
            b,
            config: config.clone(),
        })
    }

    pub fn rates(&self) -> (f64, f64) {
        (self.a, self.b)
    }

    /// Density of spending `x` of `[0, t]` in state 1, jointly with ending
    /// in state 0, given a start in state 0.
    pub fn occupancy_density(&self, x: f64, time: f64) -> Result<f64> {
        check_time(time)?;
        if !(0.0..=time).contains(&x) {
            return Err(MarkovError::RewardOutOfRange {
                reward: x,
                lower: 0.0,
                upper: time,
            });
        }
        if x == time {
            return Ok(0.0);
        }

        let rest = time - x;
        let ln_a = self.a.ln();
        let mut acc = f64::NEG_INFINITY;
        let mut previous = f64::NEG_INFINITY;
        for n in 1..=self.config.max_terms {
            let n_f = n as f64;
            let term = gamma_log_pdf(x, n_f, self.b) + gamma_log_pdf(rest, n_f + 1.0, self.a) - ln_a;
            acc = log_sum_exp(&[acc, term]);
            if term < previous && (term - acc).exp() < self.config.relative_tolerance {
                trace!(target: targets::REWARD, terms = n, "two-state series converged");
                return Ok(acc.exp());
            }
            previous = term;
        }
        Err(MarkovError::SeriesLimit {
            terms: self.config.max_terms,
            x,
            time,
        })
    }

    /// Closed-form `exp(Q t)`, row-major.
    pub fn transition_probabilities(&self, time: f64) -> [f64; 4] {
        let total = self.a + self.b;
        let decay = (-total * time).exp();
        let (pa, pb) = (self.a / total, self.b / total);
        [
            pb + pa * decay,
            pa * (1.0 - decay),
            pb * (1.0 - decay),
            pa + pb * decay,
        ]
    }
}

impl MarkovReward for TwoStateOccupancyMarkovReward {
    fn dim(&self) -> usize {
        2
    }

    fn compute_pdf_entry(&mut self, reward: f64, time: f64, i: usize, j: usize) -> Result<f64> {
        check_state(i, 2)?;
        check_state(j, 2)?;
        if (i, j) != (0, 0) {
            return Err(MarkovError::UnsupportedStates { from: i, to: j });
        }
        self.occupancy_density(reward, time)
    }

    fn compute_cdf_entry(&mut self, _reward: f64, _time: f64, i: usize, j: usize) -> Result<f64> {
        check_state(i, 2)?;
        check_state(j, 2)?;
        Err(MarkovError::UnsupportedQuery {
            engine: "two-state occupancy",
            query: "distribution entries",
        })
    }

    fn compute_conditional_probability(&mut self, time: f64, i: usize, j: usize) -> Result<f64> {
        check_time(time)?;
        check_state(i, 2)?;
        check_state(j, 2)?;
        Ok(self.transition_probabilities(time)[i * 2 + j])
    }
}

impl fmt::Display for TwoStateOccupancyMarkovReward {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "TwoStateOccupancy(a={}, b={})", self.a, self.b)
    }
}
