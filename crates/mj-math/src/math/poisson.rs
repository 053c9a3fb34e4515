//! Poisson weights and truncation of uniformization series.
//!
//! A uniformized chain with rate `λ` makes `N(t) ~ Poisson(λt)` virtual
//! jumps on `[0, t]`. Every series in this workspace is summed up to the
//! smallest depth whose Poisson tail mass is below `ε`.

use serde::{Deserialize, Serialize};

use super::stable::log_factorial;

/// ln P(N = n) for `N ~ Poisson(mean)`.
pub fn poisson_log_pmf(n: u64, mean: f64) -> f64 {
    if mean < 0.0 || mean.is_nan() {
        return f64::NAN;
    }
    if mean == 0.0 {
        return if n == 0 { 0.0 } else { f64::NEG_INFINITY };
    }
    -mean + n as f64 * mean.ln() - log_factorial(n)
}

/// P(N = n) for `N ~ Poisson(mean)`.
pub fn poisson_pmf(n: u64, mean: f64) -> f64 {
    poisson_log_pmf(n, mean).exp()
}

/// Truncation rule for uniformization series.
///
/// The hard cap `max(floor, λt + k·√(λt + 1))` is an empirical guard against
/// runaway depth at pathological `λt`, not an accuracy guarantee.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TruncationRule {
    pub epsilon: f64,
    pub hard_cap_floor: usize,
    pub hard_cap_sd_multiplier: f64,
}

impl Default for TruncationRule {
    fn default() -> Self {
        Self {
            epsilon: 1e-10,
            hard_cap_floor: 5000,
            hard_cap_sd_multiplier: 10.0,
        }
    }
}

/// Result of a truncation search.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Truncation {
    pub depth: usize,
    /// True when the search stopped at the hard cap before reaching `1 - ε`.
    pub capped: bool,
}

impl TruncationRule {
    pub fn new(epsilon: f64) -> Self {
        Self {
            epsilon,
            ..Self::default()
        }
    }

    pub fn hard_cap(&self, mean: f64) -> usize {
        let spread = mean + self.hard_cap_sd_multiplier * (mean + 1.0).sqrt();
        self.hard_cap_floor.max(spread as usize)
    }

    /// Smallest `i` with `Σ_{k≤i} Poisson(mean)(k) ≥ 1 - ε`, bounded by the hard cap.
    ///
    /// Sums upper tails from the mode outwards, anchored on
    /// [`poisson_log_pmf`], so `e^{-mean}` never has to be representable.
    pub fn depth(&self, mean: f64) -> Truncation {
        if mean.is_nan() || mean <= 0.0 {
            return Truncation {
                depth: 0,
                capped: false,
            };
        }
        let cap = self.hard_cap(mean);
        let capped = Truncation {
            depth: cap,
            capped: true,
        };
        if mean.is_infinite() {
            return capped;
        }
        let mode = mean.floor() as usize;

        // weights[i] = P(N = mode + i), until the rest is negligible or past the cap
        let mut weights = Vec::new();
        let mut w = poisson_log_pmf(mode as u64, mean).exp();
        let mut k = mode;
        let remainder = loop {
            weights.push(w);
            let ratio = mean / (k + 1) as f64;
            // geometric bound on the mass above k
            let bound = if ratio < 1.0 {
                w * ratio / (1.0 - ratio)
            } else {
                f64::INFINITY
            };
            if k > cap || bound < self.epsilon * 1e-6 {
                break bound;
            }
            w *= ratio;
            k += 1;
        };

        // tail is the mass above the candidate
        let mut tail = remainder;
        let mut depth = None;
        for (i, &w) in weights.iter().enumerate().rev() {
            if tail > self.epsilon {
                break;
            }
            depth = Some(mode + i);
            tail += w;
        }
        let mut depth = match depth {
            Some(d) if d <= cap => d,
            _ => return capped,
        };

        if depth == mode {
            // tail is now the mass above mode - 1
            let mut w = weights[0];
            while depth > 0 && tail <= self.epsilon {
                w *= depth as f64 / mean;
                depth -= 1;
                tail += w;
            }
        }
        Truncation {
            depth,
            capped: false,
        }
    }
}
