//! Row-major square matrix kernels over flat `f64` buffers.
//!
//! Every matrix is a `dim * dim` slice; entry `(i, j)` lives at `i * dim + j`.
//! Kernels write into caller-owned buffers so hot loops never allocate.

use thiserror::Error;

/// Shape and generator validation failures.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum MatrixError {
    #[error("dimension must be at least {min}, got {dim}")]
    DimensionTooSmall { dim: usize, min: usize },

    #[error("buffer length {actual} does not match dim*dim = {expected}")]
    LengthMismatch { expected: usize, actual: usize },

    #[error("non-finite entry at ({row}, {col})")]
    NonFinite { row: usize, col: usize },

    #[error("negative off-diagonal rate {value} at ({row}, {col})")]
    NegativeRate { row: usize, col: usize, value: f64 },

    #[error("row {row} sums to {sum}, expected 0")]
    RowSum { row: usize, sum: f64 },

    #[error("uniformization rate must be positive and finite, got {0}")]
    DegenerateRate(f64),

    #[error("permutation of length {len} is not a bijection on 0..{len}")]
    InvalidPermutation { len: usize },
}

/// Flat index of `(i, j)`.
#[inline]
pub fn idx(i: usize, j: usize, dim: usize) -> usize {
    i * dim + j
}

pub fn check_square(m: &[f64], dim: usize) -> Result<(), MatrixError> {
    if m.len() != dim * dim {
        return Err(MatrixError::LengthMismatch {
            expected: dim * dim,
            actual: m.len(),
        });
    }
    Ok(())
}

/// Allocates a `dim x dim` identity.
pub fn identity(dim: usize) -> Vec<f64> {
    let mut m = vec![0.0; dim * dim];
    fill_identity(&mut m, dim);
    m
}

pub fn fill_identity(m: &mut [f64], dim: usize) {
    m.fill(0.0);
    for i in 0..dim {
        m[idx(i, i, dim)] = 1.0;
    }
}

/// `out = a · b`. `out` must not alias either operand.
pub fn matrix_multiply(a: &[f64], b: &[f64], dim: usize, out: &mut [f64]) {
    out.fill(0.0);
    for i in 0..dim {
        let row = &mut out[i * dim..(i + 1) * dim];
        for k in 0..dim {
            let aik = a[idx(i, k, dim)];
            if aik == 0.0 {
                continue;
            }
            let b_row = &b[k * dim..(k + 1) * dim];
            for (o, bkj) in row.iter_mut().zip(b_row) {
                *o += aik * bkj;
            }
        }
    }
}

/// Hadamard (entrywise) product `out = a ∘ b`.
pub fn hadamard(a: &[f64], b: &[f64], out: &mut [f64]) {
    for ((o, x), y) in out.iter_mut().zip(a).zip(b) {
        *o = x * y;
    }
}

pub fn swap_rows(m: &mut [f64], dim: usize, a: usize, b: usize) {
    if a == b {
        return;
    }
    for j in 0..dim {
        m.swap(idx(a, j, dim), idx(b, j, dim));
    }
}

pub fn swap_cols(m: &mut [f64], dim: usize, a: usize, b: usize) {
    if a == b {
        return;
    }
    for i in 0..dim {
        m.swap(idx(i, a, dim), idx(i, b, dim));
    }
}

/// Reorders a square matrix: `out[i, j] = m[perm[i], perm[j]]`.
///
/// With `perm` mapping internal (sorted) positions to external indices this
/// pulls an external matrix into internal ordering.
pub fn permute_square(m: &[f64], dim: usize, perm: &[usize], out: &mut [f64]) {
    for (i, &pi) in perm.iter().enumerate() {
        for (j, &pj) in perm.iter().enumerate() {
            out[idx(i, j, dim)] = m[idx(pi, pj, dim)];
        }
    }
}

/// Inverse of [`permute_square`]: `out[perm[i], perm[j]] = m[i, j]`.
pub fn unpermute_square(m: &[f64], dim: usize, perm: &[usize], out: &mut [f64]) {
    for (i, &pi) in perm.iter().enumerate() {
        for (j, &pj) in perm.iter().enumerate() {
            out[idx(pi, pj, dim)] = m[idx(i, j, dim)];
        }
    }
}

/// Inverts a permutation, rejecting non-bijections.
pub fn invert_permutation(perm: &[usize]) -> Result<Vec<usize>, MatrixError> {
    let len = perm.len();
    let mut inverse = vec![usize::MAX; len];
    for (i, &p) in perm.iter().enumerate() {
        if p >= len || inverse[p] != usize::MAX {
            return Err(MatrixError::InvalidPermutation { len });
        }
        inverse[p] = i;
    }
    Ok(inverse)
}

/// Checks that `q` is a CTMC generator: finite, non-negative off-diagonal,
/// rows summing to zero within `tolerance` relative to the largest rate.
pub fn validate_generator(q: &[f64], dim: usize, tolerance: f64) -> Result<(), MatrixError> {
    if dim < 1 {
        return Err(MatrixError::DimensionTooSmall { dim, min: 1 });
    }
    check_square(q, dim)?;

    let mut scale = 0.0_f64;
    for i in 0..dim {
        for j in 0..dim {
            let v = q[idx(i, j, dim)];
            if !v.is_finite() {
                return Err(MatrixError::NonFinite { row: i, col: j });
            }
            if i != j && v < 0.0 {
                return Err(MatrixError::NegativeRate {
                    row: i,
                    col: j,
                    value: v,
                });
            }
            scale = scale.max(v.abs());
        }
    }
    let bound = tolerance * scale.max(1.0);
    for i in 0..dim {
        let sum: f64 = q[i * dim..(i + 1) * dim].iter().sum();
        if sum.abs() > bound {
            return Err(MatrixError::RowSum { row: i, sum });
        }
    }
    Ok(())
}

/// Uniformization rate `λ = max_i(-q_ii)`.
pub fn uniformization_rate(q: &[f64], dim: usize) -> f64 {
    (0..dim)
        .map(|i| -q[idx(i, i, dim)])
        .fold(f64::NEG_INFINITY, f64::max)
}

/// Embedded DTMC `out = I + q / λ`.
pub fn uniformized_kernel(
    q: &[f64],
    dim: usize,
    lambda: f64,
    out: &mut [f64],
) -> Result<(), MatrixError> {
    if !(lambda > 0.0 && lambda.is_finite()) {
        return Err(MatrixError::DegenerateRate(lambda));
    }
    for (o, v) in out.iter_mut().zip(q) {
        *o = v / lambda;
    }
    for i in 0..dim {
        out[idx(i, i, dim)] += 1.0;
    }
    Ok(())
}
