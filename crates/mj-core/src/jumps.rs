//! Expected labeled-jump counts and rewards over a CTMC branch.
//!
//! For a generator `Q = V Λ V⁻¹` and a rate register `A` (either `Q ∘ R` for
//! a 0/1 registration `R`, or `diag(r)` for a reward), the joint expectation
//! `E[N · 1{X_t = j} | X_0 = i] = ∫₀ᵗ P(s) A P(t − s) ds` is
//!
//! ```text
//! V · [(V⁻¹ A V) ∘ I(t)] · V⁻¹
//! I_ij(t) = (e^{λ_i t} − e^{λ_j t}) / (λ_i − λ_j)     λ_i ≠ λ_j
//!         = t · e^{λ_i t}                               |λ_i − λ_j| < 1e-7
//! ```
//!
//! Dividing entrywise by `P(t)` gives the endpoint-conditioned expectation.

use mj_math::{hadamard, matrix_multiply, EigenDecomposition};
use tracing::trace;

use crate::error::{check_len, check_state, check_time, MarkovError, Result};
use crate::logging::targets;

pub use mj_math::{swap_cols, swap_rows};

/// Eigenvalue gap below which the divided difference is replaced by its limit.
const EIGENVALUE_TIE: f64 = 1e-7;

/// Integral evaluator with member-owned scratch.
#[derive(Debug, Clone)]
pub struct MarkovJumpsCore {
    dim: usize,
    aux_int: Vec<f64>,
    exp_eval: Vec<f64>,
    tmp1: Vec<f64>,
    tmp2: Vec<f64>,
}

impl MarkovJumpsCore {
    pub fn new(dim: usize) -> Result<Self> {
        if dim == 0 {
            return Err(MarkovError::InvalidDimension(dim));
        }
        let dim2 = dim * dim;
        Ok(Self {
            dim,
            aux_int: vec![0.0; dim2],
            exp_eval: vec![0.0; dim],
            tmp1: vec![0.0; dim2],
            tmp2: vec![0.0; dim2],
        })
    }

    pub fn dim(&self) -> usize {
        self.dim
    }

    /// The `I(t)` matrix from the current call, row-major.
    pub fn aux_int(&self) -> &[f64] {
        &self.aux_int
    }

    pub fn populate_aux_int(&mut self, eigenvalues: &[f64], time: f64) -> Result<()> {
        check_len("eigenvalues", self.dim, eigenvalues.len())?;
        let dim = self.dim;
        for (e, l) in self.exp_eval.iter_mut().zip(eigenvalues) {
            *e = (l * time).exp();
        }
        for i in 0..dim {
            for j in 0..dim {
                let diff = eigenvalues[i] - eigenvalues[j];
                self.aux_int[i * dim + j] = if diff.abs() < EIGENVALUE_TIE {
                    time * self.exp_eval[i]
                } else {
                    (self.exp_eval[i] - self.exp_eval[j]) / diff
                };
            }
        }
        Ok(())
    }

    /// Joint expectation matrix into `out`.
    pub fn compute_joint_stat_markov_jumps(
        &mut self,
        eigen: &EigenDecomposition,
        rate_register: &[f64],
        time: f64,
        out: &mut [f64],
    ) -> Result<()> {
        check_time(time)?;
        let dim = self.dim;
        check_len("eigen-decomposition", dim, eigen.dim())?;
        check_len("rate register", dim * dim, rate_register.len())?;
        check_len("output buffer", dim * dim, out.len())?;

        self.populate_aux_int(eigen.eigenvalues(), time)?;

        let evec = eigen.eigenvectors();
        let ievc = eigen.inverse_eigenvectors();
        matrix_multiply(ievc, rate_register, dim, &mut self.tmp1);
        matrix_multiply(&self.tmp1, evec, dim, &mut self.tmp2);
        hadamard(&self.tmp2, &self.aux_int, &mut self.tmp1);
        matrix_multiply(evec, &self.tmp1, dim, &mut self.tmp2);
        matrix_multiply(&self.tmp2, ievc, dim, out);
        Ok(())
    }

    /// Endpoint-conditioned expectation: the joint matrix divided entrywise
    /// by `transition_probabilities`. Impossible endpoints yield 0.
    pub fn compute_cond_stat_markov_jumps(
        &mut self,
        eigen: &EigenDecomposition,
        rate_register: &[f64],
        transition_probabilities: &[f64],
        time: f64,
        out: &mut [f64],
    ) -> Result<()> {
        check_len(
            "transition probabilities",
            self.dim * self.dim,
            transition_probabilities.len(),
        )?;
        self.compute_joint_stat_markov_jumps(eigen, rate_register, time, out)?;
        let mut impossible = 0usize;
        for (o, p) in out.iter_mut().zip(transition_probabilities) {
            if *p > 0.0 {
                *o /= p;
            } else {
                *o = 0.0;
                impossible += 1;
            }
        }
        if impossible > 0 {
            trace!(target: targets::JUMPS, impossible, "zero-probability endpoints");
        }
        Ok(())
    }

    /// Conditional expectation using `eigen` for `P(t)` as well.
    pub fn compute_cond_stat_markov_jumps_eigen(
        &mut self,
        eigen: &EigenDecomposition,
        rate_register: &[f64],
        time: f64,
        out: &mut [f64],
    ) -> Result<()> {
        let p = eigen.exponential(time);
        self.compute_cond_stat_markov_jumps(eigen, rate_register, &p, time, out)
    }
}

/// Marks every off-diagonal transition.
pub fn fill_registration_matrix(register: &mut [f64], dim: usize) {
    for i in 0..dim {
        for j in 0..dim {
            register[i * dim + j] = if i == j { 0.0 } else { 1.0 };
        }
    }
}

/// Marks only `from → to`.
pub fn fill_single_transition(register: &mut [f64], dim: usize, from: usize, to: usize) -> Result<()> {
    check_state(from, dim)?;
    check_state(to, dim)?;
    register.fill(0.0);
    register[from * dim + to] = 1.0;
    Ok(())
}

/// `diag(rates)`: the register for expected accumulated reward.
pub fn fill_reward_register(register: &mut [f64], dim: usize, rates: &[f64]) -> Result<()> {
    check_len("reward rates", dim, rates.len())?;
    register.fill(0.0);
    for (i, r) in rates.iter().enumerate() {
        register[i * dim + i] = *r;
    }
    Ok(())
}

/// `Q ∘ R`: per-transition rates of the registered jumps.
pub fn make_rate_register(q: &[f64], register: &[f64], out: &mut [f64]) -> Result<()> {
    check_len("registration", q.len(), register.len())?;
    check_len("output buffer", q.len(), out.len())?;
    hadamard(q, register, out);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use mj_math::{DefaultEigenSystem, EigenSystem};

    fn symmetric_two_state() -> EigenDecomposition {
        DefaultEigenSystem::default()
            .decompose(&[-1.0, 1.0, 1.0, -1.0], 2)
            .unwrap()
    }

    #[test]
    fn aux_int_handles_ties() {
        let mut core = MarkovJumpsCore::new(3).unwrap();
        core.populate_aux_int(&[0.0, -1.0, -1.0 + 5e-8], 2.0).unwrap();
        let a = core.aux_int();
        assert!((a[0] - 2.0).abs() < 1e-15);
        let e = (-2.0f64).exp();
        assert!((a[1] - (1.0 - e)).abs() < 1e-15);
        // tie within 1e-7 uses the limit t·e^{λ_i t}
        assert_eq!(a[5], 2.0 * ((-1.0f64) * 2.0).exp());
    }

    #[test]
    fn total_jumps_two_state() {
        // Symmetric chain: E[N(t)] from either start is t.
        let eigen = symmetric_two_state();
        let q = [-1.0, 1.0, 1.0, -1.0];
        let mut reg = [0.0; 4];
        fill_registration_matrix(&mut reg, 2);
        let mut rate = [0.0; 4];
        make_rate_register(&q, &reg, &mut rate).unwrap();

        let mut core = MarkovJumpsCore::new(2).unwrap();
        let mut joint = [0.0; 4];
        core.compute_joint_stat_markov_jumps(&eigen, &rate, 1.5, &mut joint)
            .unwrap();
        assert!((joint[0] + joint[1] - 1.5).abs() < 1e-12);
        assert!((joint[2] + joint[3] - 1.5).abs() < 1e-12);
    }

    #[test]
    fn expected_reward_is_occupancy() {
        // E[time in state 1 | start 0] for the symmetric chain is
        // t/2 - (1 - e^{-2t})/4.
        let eigen = symmetric_two_state();
        let mut reg = [0.0; 4];
        fill_reward_register(&mut reg, 2, &[0.0, 1.0]).unwrap();
        let mut core = MarkovJumpsCore::new(2).unwrap();
        let mut joint = [0.0; 4];
        let t = 1.0;
        core.compute_joint_stat_markov_jumps(&eigen, &reg, t, &mut joint)
            .unwrap();
        let expected = t / 2.0 - (1.0 - (-2.0 * t).exp()) / 4.0;
        assert!((joint[0] + joint[1] - expected).abs() < 1e-12);
    }

    #[test]
    fn conditional_divides_by_transition_probability() {
        let eigen = symmetric_two_state();
        let mut reg = [0.0; 4];
        fill_single_transition(&mut reg, 2, 0, 1).unwrap();
        let mut rate = [0.0; 4];
        make_rate_register(&[-1.0, 1.0, 1.0, -1.0], &reg, &mut rate).unwrap();

        let mut core = MarkovJumpsCore::new(2).unwrap();
        let mut joint = [0.0; 4];
        let mut cond = [0.0; 4];
        core.compute_joint_stat_markov_jumps(&eigen, &rate, 0.7, &mut joint)
            .unwrap();
        core.compute_cond_stat_markov_jumps_eigen(&eigen, &rate, 0.7, &mut cond)
            .unwrap();
        let p = eigen.exponential(0.7);
        for k in 0..4 {
            assert!((cond[k] * p[k] - joint[k]).abs() < 1e-12);
        }
        // 0 → 1 must happen at least once when starting in 0 and ending in 1.
        assert!(cond[1] >= 1.0);
    }

    #[test]
    fn zero_probability_endpoint_is_zero() {
        let eigen = symmetric_two_state();
        let mut core = MarkovJumpsCore::new(2).unwrap();
        let mut out = [0.0; 4];
        let rate = [0.0, 1.0, 1.0, 0.0];
        core.compute_cond_stat_markov_jumps(&eigen, &rate, &[1.0, 0.0, 0.0, 1.0], 1.0, &mut out)
            .unwrap();
        assert_eq!(out[1], 0.0);
        assert_eq!(out[2], 0.0);
    }

    #[test]
    fn registration_builders() {
        let mut reg = [9.0; 9];
        fill_registration_matrix(&mut reg, 3);
        assert_eq!(reg, [0.0, 1.0, 1.0, 1.0, 0.0, 1.0, 1.0, 1.0, 0.0]);
        fill_single_transition(&mut reg, 3, 2, 0).unwrap();
        assert_eq!(reg.iter().sum::<f64>(), 1.0);
        assert_eq!(reg[6], 1.0);
        assert!(fill_single_transition(&mut reg, 3, 3, 0).is_err());
    }

    #[test]
    fn swaps_reconcile_orderings() {
        let mut m = [1.0, 2.0, 3.0, 4.0];
        swap_rows(&mut m, 2, 0, 1);
        assert_eq!(m, [3.0, 4.0, 1.0, 2.0]);
        swap_cols(&mut m, 2, 0, 1);
        assert_eq!(m, [4.0, 3.0, 2.0, 1.0]);
    }

    #[test]
    fn shape_checks() {
        let eigen = symmetric_two_state();
        let mut core = MarkovJumpsCore::new(3).unwrap();
        let mut out = [0.0; 9];
        assert!(matches!(
            core.compute_joint_stat_markov_jumps(&eigen, &[0.0; 9], 1.0, &mut out),
            Err(MarkovError::ShapeMismatch { .. })
        ));
        assert!(MarkovJumpsCore::new(0).is_err());
    }
}
