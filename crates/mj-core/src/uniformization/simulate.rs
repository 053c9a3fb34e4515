//! Path simulation, with and without a fixed ending state.

use mj_config::SimulationConfig;
use mj_math::{uniformized_exponential, validate_generator, TruncationRule};
use rand::Rng;
use tracing::debug;

use super::history::StateHistory;
use super::subordinated::{sample_unnormalized, SubordinatedProcess};
use crate::error::{check_len, check_state, check_time, Result};
use crate::logging::targets;

/// Endpoint-conditioned simulator for one generator.
///
/// Keeps its [`SubordinatedProcess`] (and so its cached DTMC powers)
/// across draws.
#[derive(Debug, Clone)]
pub struct UniformizedSimulator {
    q: Vec<f64>,
    process: SubordinatedProcess,
    rule: TruncationRule,
    transition: Vec<f64>,
}

impl UniformizedSimulator {
    pub fn new(q: &[f64], dim: usize) -> Result<Self> {
        Self::with_config(q, dim, &SimulationConfig::default())
    }

    pub fn with_config(q: &[f64], dim: usize, config: &SimulationConfig) -> Result<Self> {
        let process = SubordinatedProcess::with_config(q, dim, config)?;
        Ok(Self {
            q: q.to_vec(),
            process,
            rule: TruncationRule::new(1e-14),
            transition: vec![0.0; dim * dim],
        })
    }

    pub fn dim(&self) -> usize {
        self.process.dim()
    }

    pub fn process(&self) -> &SubordinatedProcess {
        &self.process
    }

    /// Path from `start_state` at `start_time` to `end_state` at `end_time`.
    ///
    /// `transition_probability` is `P(X(T) = end | X(0) = start)` for
    /// `T = end_time − start_time`.
    pub fn simulate_conditional(
        &mut self,
        start_time: f64,
        start_state: usize,
        end_time: f64,
        end_state: usize,
        transition_probability: f64,
        rng: &mut impl Rng,
    ) -> Result<StateHistory> {
        let dim = self.process.dim();
        check_state(start_state, dim)?;
        check_state(end_state, dim)?;
        let length = end_time - start_time;
        check_time(length)?;

        let n = self.process.draw_number_of_changes(
            start_state,
            end_state,
            length,
            transition_probability,
            rng,
        )?;

        let mut history = StateHistory::new(start_time, start_state, dim)?;
        match n {
            0 => {}
            1 => {
                if start_state != end_state {
                    let t = start_time + rng.random::<f64>() * length;
                    history.add_change(t, end_state)?;
                }
            }
            _ => {
                let mut times: Vec<f64> = (0..n)
                    .map(|_| start_time + rng.random::<f64>() * length)
                    .collect();
                times.sort_by(f64::total_cmp);

                let mut current = start_state;
                for (i, &t) in times[..n - 1].iter().enumerate() {
                    let next = self.process.draw_next_state(current, end_state, n - i, rng)?;
                    history.add_change(t, next)?;
                    current = next;
                }
                history.add_change(times[n - 1], end_state)?;
            }
        }
        history.finalize(end_time)?;
        Ok(history)
    }

    /// As [`simulate_conditional`](Self::simulate_conditional), computing
    /// the endpoint probability by uniformization.
    pub fn simulate(
        &mut self,
        start_time: f64,
        start_state: usize,
        end_time: f64,
        end_state: usize,
        rng: &mut impl Rng,
    ) -> Result<StateHistory> {
        let dim = self.process.dim();
        check_state(start_state, dim)?;
        check_state(end_state, dim)?;
        let length = end_time - start_time;
        check_time(length)?;
        uniformized_exponential(&self.q, dim, length, &self.rule, &mut self.transition)?;
        let p = self.transition[start_state * dim + end_state];
        self.simulate_conditional(start_time, start_state, end_time, end_state, p, rng)
    }
}

/// One-shot endpoint-conditioned simulation.
///
/// Builds a fresh subordinated process from `q`; use
/// [`UniformizedSimulator`] to amortize its power cache over many draws.
#[allow(clippy::too_many_arguments)]
pub fn simulate_conditional_on_ending_state(
    start_time: f64,
    start_state: usize,
    end_time: f64,
    end_state: usize,
    transition_probability: f64,
    q: &[f64],
    dim: usize,
    rng: &mut impl Rng,
) -> Result<StateHistory> {
    let mut simulator = UniformizedSimulator::new(q, dim)?;
    simulator.simulate_conditional(
        start_time,
        start_state,
        end_time,
        end_state,
        transition_probability,
        rng,
    )
}

/// Forward simulation with exponential waiting times.
pub fn simulate_unconditional_on_ending_state(
    start_time: f64,
    start_state: usize,
    end_time: f64,
    q: &[f64],
    dim: usize,
    rng: &mut impl Rng,
) -> Result<StateHistory> {
    check_len("generator", dim * dim, q.len())?;
    validate_generator(q, dim, 1e-8)?;
    check_time(end_time - start_time)?;

    let mut history = StateHistory::new(start_time, start_state, dim)?;
    let mut weights = vec![0.0; dim];
    let mut time = start_time;
    let mut state = start_state;
    loop {
        let exit = -q[state * dim + state];
        if exit <= 0.0 {
            break;
        }
        let u: f64 = rng.random();
        time += -(1.0 - u).ln() / exit;
        if time >= end_time {
            break;
        }
        for (j, w) in weights.iter_mut().enumerate() {
            *w = if j == state { 0.0 } else { q[state * dim + j] };
        }
        state = sample_unnormalized(&weights, exit, rng);
        history.add_change(time, state)?;
    }
    history.finalize(end_time)?;
    debug!(
        target: targets::SIMULATION,
        jumps = history.changes().len(),
        "unconditional path simulated"
    );
    Ok(history)
}
