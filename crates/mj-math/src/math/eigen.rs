//! Eigen-decomposition service for CTMC generators.
//!
//! A decomposition `Q = V · diag(λ) · V⁻¹` gives `exp(Qt)` at any `t` for the
//! cost of one `O(dim³)` contraction, and is the input to the Markov-jumps
//! integral. Storage is row-major: column `k` of `eigenvectors` pairs with
//! `eigenvalues[k]` and row `k` of `inverse_eigenvectors`.
//!
//! [`DefaultEigenSystem`] detects time-reversible generators (detailed
//! balance against the stationary distribution) and decomposes their
//! symmetrized form, which is well conditioned. Everything else goes through
//! a real Schur form. Complex spectra are reported, not approximated.

use nalgebra::{DMatrix, DVector, SymmetricEigen};
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq)]
pub enum EigenError {
    #[error("matrix buffer length {actual} does not match dim*dim = {expected}")]
    LengthMismatch { expected: usize, actual: usize },

    #[error("matrix contains non-finite entries")]
    NonFinite,

    #[error("generator has a complex eigenvalue pair at index {index} (coupling {coupling:e})")]
    ComplexSpectrum { index: usize, coupling: f64 },

    #[error("eigenvector matrix is singular; generator is not diagonalizable")]
    SingularEigenvectors,

    #[error("Schur iteration did not converge")]
    NoConvergence,
}

/// Eigenvectors, inverse eigenvectors and eigenvalues of a square matrix.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EigenDecomposition {
    dim: usize,
    eigenvectors: Vec<f64>,
    inverse_eigenvectors: Vec<f64>,
    eigenvalues: Vec<f64>,
}

impl EigenDecomposition {
    /// Wraps a decomposition produced elsewhere.
    pub fn new(
        dim: usize,
        eigenvectors: Vec<f64>,
        inverse_eigenvectors: Vec<f64>,
        eigenvalues: Vec<f64>,
    ) -> Result<Self, EigenError> {
        for len in [eigenvectors.len(), inverse_eigenvectors.len()] {
            if len != dim * dim {
                return Err(EigenError::LengthMismatch {
                    expected: dim * dim,
                    actual: len,
                });
            }
        }
        if eigenvalues.len() != dim {
            return Err(EigenError::LengthMismatch {
                expected: dim,
                actual: eigenvalues.len(),
            });
        }
        Ok(Self {
            dim,
            eigenvectors,
            inverse_eigenvectors,
            eigenvalues,
        })
    }

    pub fn dim(&self) -> usize {
        self.dim
    }

    pub fn eigenvectors(&self) -> &[f64] {
        &self.eigenvectors
    }

    pub fn inverse_eigenvectors(&self) -> &[f64] {
        &self.inverse_eigenvectors
    }

    pub fn eigenvalues(&self) -> &[f64] {
        &self.eigenvalues
    }

    /// Writes `exp(Q·t)` into `out` (length `dim*dim`).
    pub fn exponential_into(&self, t: f64, out: &mut [f64]) {
        let dim = self.dim;
        let scale: Vec<f64> = self.eigenvalues.iter().map(|l| (l * t).exp()).collect();
        for i in 0..dim {
            for j in 0..dim {
                let mut sum = 0.0;
                for (k, s) in scale.iter().enumerate() {
                    sum += self.eigenvectors[i * dim + k] * s * self.inverse_eigenvectors[k * dim + j];
                }
                out[i * dim + j] = sum;
            }
        }
    }

    pub fn exponential(&self, t: f64) -> Vec<f64> {
        let mut out = vec![0.0; self.dim * self.dim];
        self.exponential_into(t, &mut out);
        out
    }
}

/// Anything able to decompose a generator.
pub trait EigenSystem {
    fn decompose(&self, q: &[f64], dim: usize) -> Result<EigenDecomposition, EigenError>;
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DefaultEigenSystem {
    /// Relative tolerance on `|π_i q_ij - π_j q_ji|` for the reversible path.
    pub reversibility_tolerance: f64,
    /// Relative size of a Schur subdiagonal entry treated as a complex block.
    pub complex_tolerance: f64,
    pub max_schur_iterations: usize,
}

impl Default for DefaultEigenSystem {
    fn default() -> Self {
        Self {
            reversibility_tolerance: 1e-10,
            complex_tolerance: 1e-10,
            max_schur_iterations: 10_000,
        }
    }
}

impl EigenSystem for DefaultEigenSystem {
    fn decompose(&self, q: &[f64], dim: usize) -> Result<EigenDecomposition, EigenError> {
        if q.len() != dim * dim {
            return Err(EigenError::LengthMismatch {
                expected: dim * dim,
                actual: q.len(),
            });
        }
        if q.iter().any(|v| !v.is_finite()) {
            return Err(EigenError::NonFinite);
        }
        let m = DMatrix::from_row_slice(dim, dim, q);
        match self.stationary_if_reversible(&m) {
            Some(pi) => Ok(decompose_reversible(&m, &pi)),
            None => self.decompose_general(m),
        }
    }
}

impl DefaultEigenSystem {
    /// Stationary distribution when it is strictly positive and satisfies
    /// detailed balance; `None` sends the caller down the general path.
    fn stationary_if_reversible(&self, q: &DMatrix<f64>) -> Option<DVector<f64>> {
        let n = q.nrows();
        let mut a = q.transpose();
        for j in 0..n {
            a[(n - 1, j)] = 1.0;
        }
        let mut b = DVector::zeros(n);
        b[n - 1] = 1.0;
        let pi = a.lu().solve(&b)?;
        if pi.iter().any(|p| !(p.is_finite() && *p > 0.0)) {
            return None;
        }

        let mut scale = 0.0_f64;
        for i in 0..n {
            for j in 0..n {
                scale = scale.max((pi[i] * q[(i, j)]).abs());
            }
        }
        let bound = self.reversibility_tolerance * scale.max(f64::MIN_POSITIVE);
        for i in 0..n {
            for j in (i + 1)..n {
                if (pi[i] * q[(i, j)] - pi[j] * q[(j, i)]).abs() > bound {
                    return None;
                }
            }
        }
        Some(pi)
    }

    fn decompose_general(&self, m: DMatrix<f64>) -> Result<EigenDecomposition, EigenError> {
        let n = m.nrows();
        let (z, t) = m
            .try_schur(f64::EPSILON, self.max_schur_iterations)
            .ok_or(EigenError::NoConvergence)?
            .unpack();

        let norm = t.iter().fold(0.0_f64, |acc, v| acc.max(v.abs())).max(f64::MIN_POSITIVE);
        for i in 0..n.saturating_sub(1) {
            let coupling = t[(i + 1, i)].abs();
            if coupling > self.complex_tolerance * norm {
                return Err(EigenError::ComplexSpectrum { index: i, coupling });
            }
        }

        // Eigenvectors of the triangular factor by back-substitution; nearly
        // equal diagonal entries are nudged apart so the system stays solvable.
        let small = f64::EPSILON * norm;
        let mut y = DMatrix::<f64>::zeros(n, n);
        for k in 0..n {
            y[(k, k)] = 1.0;
            for i in (0..k).rev() {
                let mut s = 0.0;
                for j in (i + 1)..=k {
                    s += t[(i, j)] * y[(j, k)];
                }
                let mut d = t[(i, i)] - t[(k, k)];
                if d.abs() < small {
                    d = if d < 0.0 { -small } else { small };
                }
                y[(i, k)] = -s / d;
            }
        }

        let mut v = &z * y;
        for k in 0..n {
            let col_norm = v.column(k).norm();
            if col_norm > 0.0 {
                v.column_mut(k).unscale_mut(col_norm);
            }
        }
        let inverse = v.clone().try_inverse().ok_or(EigenError::SingularEigenvectors)?;
        if inverse.iter().any(|x| !x.is_finite()) {
            return Err(EigenError::SingularEigenvectors);
        }

        let eigenvalues = (0..n).map(|i| t[(i, i)]).collect();
        Ok(EigenDecomposition {
            dim: n,
            eigenvectors: row_major(&v),
            inverse_eigenvectors: row_major(&inverse),
            eigenvalues,
        })
    }
}

/// `Π^{1/2} Q Π^{-1/2}` is symmetric for a reversible chain; its orthonormal
/// eigenbasis maps back through the diagonal similarity.
fn decompose_reversible(q: &DMatrix<f64>, pi: &DVector<f64>) -> EigenDecomposition {
    let n = q.nrows();
    let root: Vec<f64> = pi.iter().map(|p| p.sqrt()).collect();
    let s = DMatrix::from_fn(n, n, |i, j| {
        let a = root[i] * q[(i, j)] / root[j];
        let b = root[j] * q[(j, i)] / root[i];
        0.5 * (a + b)
    });
    let eigen = SymmetricEigen::new(s);
    let basis = &eigen.eigenvectors;

    let evec = DMatrix::from_fn(n, n, |i, k| basis[(i, k)] / root[i]);
    let ievc = DMatrix::from_fn(n, n, |k, j| basis[(j, k)] * root[j]);

    EigenDecomposition {
        dim: n,
        eigenvectors: row_major(&evec),
        inverse_eigenvectors: row_major(&ievc),
        eigenvalues: eigen.eigenvalues.iter().copied().collect(),
    }
}

fn row_major(m: &DMatrix<f64>) -> Vec<f64> {
    let (rows, cols) = m.shape();
    let mut out = Vec::with_capacity(rows * cols);
    for i in 0..rows {
        for j in 0..cols {
            out.push(m[(i, j)]);
        }
    }
    out
}
