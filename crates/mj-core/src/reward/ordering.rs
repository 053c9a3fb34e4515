//! Sorted-reward state ordering.
//!
//! The series recursion needs `r_0 < r_1 < … < r_φ`. Callers index states in
//! their own order, so the engines keep a permutation `perm[sorted] =
//! original`, its inverse, and a write-back map from sorted block index
//! `su·dim + sv` to original block index `perm[su]·dim + perm[sv]`.

use mj_math::{invert_permutation, permute_square, unpermute_square};

use crate::error::{MarkovError, Result};

#[derive(Debug, Clone, PartialEq)]
pub struct RewardOrdering {
    dim: usize,
    perm: Vec<usize>,
    inverse: Vec<usize>,
    out_index: Vec<usize>,
    identity: bool,
}

impl RewardOrdering {
    /// Stable ascending order of `rates`.
    pub fn from_rates(rates: &[f64]) -> Result<Self> {
        if let Some(state) = rates.iter().position(|r| !r.is_finite()) {
            return Err(MarkovError::NonFiniteReward { state });
        }
        let dim = rates.len();
        let mut perm: Vec<usize> = (0..dim).collect();
        perm.sort_by(|&a, &b| rates[a].total_cmp(&rates[b]));
        let inverse = invert_permutation(&perm)?;

        let mut out_index = vec![0; dim * dim];
        for (su, &pu) in perm.iter().enumerate() {
            for (sv, &pv) in perm.iter().enumerate() {
                out_index[su * dim + sv] = pu * dim + pv;
            }
        }
        let identity = perm.iter().enumerate().all(|(s, &o)| s == o);

        Ok(Self {
            dim,
            perm,
            inverse,
            out_index,
            identity,
        })
    }

    pub fn dim(&self) -> usize {
        self.dim
    }

    pub fn is_identity(&self) -> bool {
        self.identity
    }

    /// Sorted position → original state.
    pub fn permutation(&self) -> &[usize] {
        &self.perm
    }

    pub fn to_sorted(&self, original: usize) -> usize {
        self.inverse[original]
    }

    pub fn to_original(&self, sorted: usize) -> usize {
        self.perm[sorted]
    }

    /// Write-back map for result blocks; `None` when no reordering is needed.
    pub fn out_index(&self) -> Option<&[usize]> {
        if self.identity {
            None
        } else {
            Some(&self.out_index)
        }
    }

    pub fn sort_rates(&self, rates: &[f64], out: &mut [f64]) {
        for (o, &p) in out.iter_mut().zip(&self.perm) {
            *o = rates[p];
        }
    }

    /// `out[i, j] = q[perm i, perm j]`.
    pub fn sort_square(&self, q: &[f64], out: &mut [f64]) {
        permute_square(q, self.dim, &self.perm, out);
    }

    /// Inverse of [`sort_square`](Self::sort_square).
    pub fn unsort_square(&self, m: &[f64], out: &mut [f64]) {
        unpermute_square(m, self.dim, &self.perm, out);
    }
}
