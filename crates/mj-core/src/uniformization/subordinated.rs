//! Poisson-subordinated DTMC behind uniformization.

use mj_config::SimulationConfig;
use mj_math::{
    fill_identity, matrix_multiply, poisson_pmf, uniformization_rate, uniformized_kernel,
    validate_generator,
};
use rand::Rng;
use tracing::{trace, warn};

use crate::error::{check_state, check_time, MarkovError, Result};
use crate::logging::targets;

const GENERATOR_TOLERANCE: f64 = 1e-8;

/// `X(t) = Y(N(t))` with `N` Poisson(λ) and `Y` the DTMC `R = I + Q/λ`.
///
/// Powers `R^n` are cached as they are requested and never dropped.
#[derive(Debug, Clone)]
pub struct SubordinatedProcess {
    dim: usize,
    lambda: f64,
    powers: Vec<Vec<f64>>,
    weights: Vec<f64>,
    max_tries: usize,
}

impl SubordinatedProcess {
    pub fn new(q: &[f64], dim: usize) -> Result<Self> {
        Self::with_config(q, dim, &SimulationConfig::default())
    }

    pub fn with_config(q: &[f64], dim: usize, config: &SimulationConfig) -> Result<Self> {
        if dim == 0 {
            return Err(MarkovError::InvalidDimension(dim));
        }
        mj_config::validate::validate_simulation(config)?;
        validate_generator(q, dim, GENERATOR_TOLERANCE)?;
        let lambda = uniformization_rate(q, dim);
        let mut kernel = vec![0.0; dim * dim];
        uniformized_kernel(q, dim, lambda, &mut kernel)?;
        let mut identity = vec![0.0; dim * dim];
        fill_identity(&mut identity, dim);

        Ok(Self {
            dim,
            lambda,
            powers: vec![identity, kernel],
            weights: vec![0.0; dim],
            max_tries: config.max_tries,
        })
    }

    pub fn dim(&self) -> usize {
        self.dim
    }

    /// Poisson rate `λ = max_i(-Q_ii)`.
    pub fn lambda(&self) -> f64 {
        self.lambda
    }

    /// Number of cached powers, `R^0` included.
    pub fn cached_powers(&self) -> usize {
        self.powers.len()
    }

    /// `R^n`, extending the cache by repeated multiplication.
    pub fn power(&mut self, n: usize) -> &[f64] {
        while self.powers.len() <= n {
            let mut next = vec![0.0; self.dim * self.dim];
            let last = &self.powers[self.powers.len() - 1];
            matrix_multiply(last, &self.powers[1], self.dim, &mut next);
            self.powers.push(next);
        }
        &self.powers[n]
    }

    /// `P(Y_n = to | Y_0 = from)`.
    pub fn dtmc_probability(&mut self, steps: usize, from: usize, to: usize) -> f64 {
        let dim = self.dim;
        self.power(steps)[from * dim + to]
    }

    /// Draws `N(t)` given `X(0) = start` and `X(t) = end`.
    ///
    /// `ctmc_probability` is `P(X(t) = end | X(0) = start)` as known to the
    /// caller. The series is cut at `max_tries` terms; hitting the cap means
    /// that probability disagrees with the process.
    pub fn draw_number_of_changes(
        &mut self,
        start: usize,
        end: usize,
        time: f64,
        ctmc_probability: f64,
        rng: &mut impl Rng,
    ) -> Result<usize> {
        check_state(start, self.dim)?;
        check_state(end, self.dim)?;
        check_time(time)?;
        if !(ctmc_probability > 0.0) {
            return Err(MarkovError::ImpossibleEndpoint {
                start,
                end,
                probability: ctmc_probability,
            });
        }

        let cutoff: f64 = rng.random();
        let mean = self.lambda * time;
        let mut cdf = 0.0;
        for n in 0..self.max_tries {
            cdf += poisson_pmf(n as u64, mean) * self.dtmc_probability(n, start, end) / ctmc_probability;
            if cdf > cutoff {
                trace!(target: targets::SIMULATION, changes = n, "jump count drawn");
                return Ok(n);
            }
        }
        warn!(
            target: targets::SIMULATION,
            start,
            end,
            time,
            ctmc_probability,
            cdf,
            "jump-count series exhausted"
        );
        Err(MarkovError::IterationLimit {
            tries: self.max_tries,
            start,
            end,
            time,
        })
    }

    /// Draws `Y_{k+1}` given `Y_k = current` and `remaining` steps left to
    /// reach `end`.
    ///
    /// Weights `R[current, s] · R^{remaining-1}[s, end]` are used without
    /// normalizing.
    pub fn draw_next_state(
        &mut self,
        current: usize,
        end: usize,
        remaining: usize,
        rng: &mut impl Rng,
    ) -> Result<usize> {
        check_state(current, self.dim)?;
        check_state(end, self.dim)?;
        let dim = self.dim;
        let steps = remaining.saturating_sub(1);
        self.power(steps);

        let kernel = &self.powers[1];
        let rest = &self.powers[steps];
        let mut total = 0.0;
        for (s, w) in self.weights.iter_mut().enumerate() {
            *w = kernel[current * dim + s] * rest[s * dim + end];
            total += *w;
        }
        if !(total > 0.0) {
            return Err(MarkovError::ImpossibleEndpoint {
                start: current,
                end,
                probability: total,
            });
        }
        Ok(sample_unnormalized(&self.weights, total, rng))
    }
}

/// Index drawn with probability `weights[i] / total`.
pub(crate) fn sample_unnormalized(weights: &[f64], total: f64, rng: &mut impl Rng) -> usize {
    let u = rng.random::<f64>() * total;
    let mut acc = 0.0;
    let mut last_positive = 0;
    for (i, &w) in weights.iter().enumerate() {
        if w > 0.0 {
            acc += w;
            last_positive = i;
            if u < acc {
                return i;
            }
        }
    }
    // Roundoff can leave `acc` just under `u`.
    last_positive
}
