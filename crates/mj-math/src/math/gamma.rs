//! Gamma densities in rate parameterization.
//!
//! `f(x | α, β) = β^α / Γ(α) · x^(α-1) · e^(-βx)` for `x ≥ 0`.
//!
//! The two-state occupancy series is a sum of products of these densities
//! (sojourn totals in each state are Erlang distributed), so the log form is
//! what callers usually want.

use super::stable::log_gamma;

/// Log density of `Gamma(shape, rate)` at `x`.
///
/// Invalid parameters give NaN; `x < 0` gives `-inf`. At `x = 0` the
/// density is infinite, `β`, or zero depending on whether the shape is
/// below, at, or above one.
pub fn gamma_log_pdf(x: f64, shape: f64, rate: f64) -> f64 {
    if x.is_nan() || shape.is_nan() || rate.is_nan() || shape <= 0.0 || rate <= 0.0 {
        return f64::NAN;
    }
    if x < 0.0 {
        return f64::NEG_INFINITY;
    }
    if x == 0.0 {
        return if shape < 1.0 {
            f64::INFINITY
        } else if shape == 1.0 {
            rate.ln()
        } else {
            f64::NEG_INFINITY
        };
    }
    shape * rate.ln() - log_gamma(shape) + (shape - 1.0) * x.ln() - rate * x
}

/// Density of `Gamma(shape, rate)` at `x`.
pub fn gamma_pdf(x: f64, shape: f64, rate: f64) -> f64 {
    let log_pdf = gamma_log_pdf(x, shape, rate);
    if log_pdf.is_nan() {
        return f64::NAN;
    }
    log_pdf.exp()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn exponential_special_case() {
        let rate: f64 = 2.5;
        for x in [0.0, 0.1, 1.0, 3.7] {
            let expected = rate * (-rate * x).exp();
            assert!((gamma_pdf(x, 1.0, rate) - expected).abs() < 1e-12);
        }
    }

    #[test]
    fn erlang_two() {
        // Gamma(2, 1) density is x e^{-x}
        let x = 1.3_f64;
        assert!((gamma_pdf(x, 2.0, 1.0) - x * (-x).exp()).abs() < 1e-12);
    }

    #[test]
    fn boundaries() {
        assert_eq!(gamma_log_pdf(-1.0, 2.0, 1.0), f64::NEG_INFINITY);
        assert_eq!(gamma_pdf(0.0, 3.0, 1.0), 0.0);
        assert!(gamma_log_pdf(1.0, 0.0, 1.0).is_nan());
        assert!(gamma_log_pdf(1.0, 1.0, -1.0).is_nan());
    }
}
