//! Matrix exponential of a generator by uniformization.
//!
//! `exp(Qt) = Σ_n Poisson(λt)(n) · Pⁿ` with `P = I + Q/λ`. All terms are
//! non-negative, so unlike the eigen route this never produces negative
//! probabilities and works for generators with complex spectra.

use super::matrix::{
    check_square, fill_identity, matrix_multiply, uniformization_rate, uniformized_kernel,
    MatrixError,
};
use super::poisson::{poisson_pmf, Truncation, TruncationRule};

/// Writes `exp(q·t)` into `out` and reports the truncation depth used.
pub fn uniformized_exponential(
    q: &[f64],
    dim: usize,
    t: f64,
    rule: &TruncationRule,
    out: &mut [f64],
) -> Result<Truncation, MatrixError> {
    check_square(q, dim)?;
    check_square(out, dim)?;

    let lambda = uniformization_rate(q, dim);
    if lambda <= 0.0 || t == 0.0 {
        fill_identity(out, dim);
        return Ok(Truncation {
            depth: 0,
            capped: false,
        });
    }

    let mut p = vec![0.0; dim * dim];
    uniformized_kernel(q, dim, lambda, &mut p)?;

    let mean = lambda * t;
    let truncation = rule.depth(mean);

    let mut power = vec![0.0; dim * dim];
    let mut next = vec![0.0; dim * dim];
    fill_identity(&mut power, dim);
    out.fill(0.0);

    for n in 0..=truncation.depth {
        if n > 0 {
            matrix_multiply(&power, &p, dim, &mut next);
            std::mem::swap(&mut power, &mut next);
        }
        let w = poisson_pmf(n as u64, mean);
        for (o, v) in out.iter_mut().zip(&power) {
            *o += w * v;
        }
    }
    Ok(truncation)
}
