//! Uniformized Sericola series shared by the reward engines.
//!
//! Works entirely in sorted-reward order. For a query `(x, t)` with
//! `r_{h-1}·t ≤ x ≤ r_h·t` and local position `xh ∈ [0, 1]`:
//!
//! ```text
//! pdf(x, t) = Σ_n Poisson(λt)(n) · λ/(r_h − r_{h−1}) · Σ_k B_{n,k}(xh) · [C(h,n+1,k+1) − C(h,n+1,k)]
//! cdf(x, t) = Σ_n Poisson(λt)(n) · Σ_k B_{n,k}(xh) · C(h,n,k)
//! ```
//!
//! with Bernstein weights `B_{n,k}`. The PDF sums `n < capacity`, the CDF
//! `n ≤ capacity`, so both read only computed blocks.

use std::fmt::Write as _;

use mj_config::EngineConfig;
use mj_math::{
    log_binomial, poisson_pmf, uniformization_rate, uniformized_exponential, uniformized_kernel,
    validate_generator, DefaultEigenSystem, EigenDecomposition, EigenError, EigenSystem,
    TruncationRule,
};
use tracing::{debug, error};

use super::scratch::{with_scratch, Scratch};
use super::tensor::RewardTensor;
use super::Times;
use crate::error::{check_len, check_time, MarkovError, Result};
use crate::logging::targets;

fn truncation_rule(config: &EngineConfig) -> TruncationRule {
    TruncationRule {
        epsilon: config.epsilon,
        hard_cap_floor: config.hard_cap_floor,
        hard_cap_sd_multiplier: config.hard_cap_sd_multiplier,
    }
}

/// How `exp(Qt)` is evaluated for conditional probabilities.
#[derive(Debug, Clone)]
enum Exponentiator {
    Eigen(EigenDecomposition),
    /// Complex spectrum: sum the uniformized series instead.
    Uniformized,
}

#[derive(Debug, Clone)]
pub(crate) struct SeriesCore {
    dim: usize,
    dim2: usize,
    phi: usize,
    config: EngineConfig,
    rule: TruncationRule,
    q: Vec<f64>,
    rates: Vec<f64>,
    inv_reward_diff: Vec<f64>,
    lambda: f64,
    kernel: Vec<f64>,
    tensor: RewardTensor,
    exponentiator: Option<Exponentiator>,
    max_time: f64,
}

impl SeriesCore {
    pub fn new(dim: usize, config: EngineConfig) -> Result<Self> {
        if dim < 2 {
            return Err(MarkovError::InvalidDimension(dim));
        }
        if !(config.epsilon > 0.0 && config.epsilon < 1.0) {
            return Err(MarkovError::InvalidEpsilon(config.epsilon));
        }
        mj_config::validate::validate_engine(&config)?;
        Ok(Self {
            dim,
            dim2: dim * dim,
            phi: dim - 1,
            rule: truncation_rule(&config),
            config,
            q: vec![0.0; dim * dim],
            rates: vec![0.0; dim],
            inv_reward_diff: vec![0.0; dim],
            lambda: 0.0,
            kernel: vec![0.0; dim * dim],
            tensor: RewardTensor::new(dim),
            exponentiator: None,
            max_time: 0.0,
        })
    }

    /// Installs a new sorted generator and reward vector.
    ///
    /// Derived scalars are rebuilt and the tensor's validity extent dropped;
    /// its allocation survives for the next recomputation.
    pub fn load(&mut self, q_sorted: &[f64], rates_sorted: &[f64]) -> Result<()> {
        check_len("generator", self.dim2, q_sorted.len())?;
        if rates_sorted.len() != self.dim {
            return Err(MarkovError::RewardLength {
                expected: self.dim,
                actual: rates_sorted.len(),
            });
        }
        validate_generator(q_sorted, self.dim, self.config.generator_tolerance)?;

        for h in 1..self.dim {
            let gap = rates_sorted[h] - rates_sorted[h - 1];
            if !(gap > 0.0) {
                return Err(MarkovError::RewardTie {
                    position: h,
                    rate: rates_sorted[h],
                });
            }
            self.inv_reward_diff[h] = 1.0 / gap;
        }

        let lambda = uniformization_rate(q_sorted, self.dim);
        uniformized_kernel(q_sorted, self.dim, lambda, &mut self.kernel)?;

        self.lambda = lambda;
        self.q.copy_from_slice(q_sorted);
        self.rates.copy_from_slice(rates_sorted);
        self.tensor.invalidate();
        self.exponentiator = None;
        self.max_time = 0.0;
        debug!(target: targets::SERIES, lambda, dim = self.dim, "series numerics refreshed");
        Ok(())
    }

    pub fn dim(&self) -> usize {
        self.dim
    }

    pub fn lambda(&self) -> f64 {
        self.lambda
    }

    pub fn rates(&self) -> &[f64] {
        &self.rates
    }

    pub fn max_time(&self) -> f64 {
        self.max_time
    }

    pub fn capacity(&self) -> Option<usize> {
        self.tensor.capacity()
    }

    pub fn tensor(&self) -> &RewardTensor {
        &self.tensor
    }

    /// Saved by store/restore cycles.
    pub fn extent(&self) -> (Option<usize>, f64) {
        (self.tensor.capacity(), self.max_time)
    }

    pub fn restore_extent(&mut self, extent: (Option<usize>, f64)) {
        self.tensor.restore_extent(extent.0);
        self.max_time = extent.1;
    }

    pub fn invalidate(&mut self) {
        self.tensor.invalidate();
        self.exponentiator = None;
    }

    /// Poisson truncation depth for `time`; hitting the hard cap is fatal.
    pub fn steps(&self, time: f64) -> Result<usize> {
        let lambda_t = self.lambda * time;
        let truncation = self.rule.depth(lambda_t);
        if truncation.capped {
            let diagnostics = self.diagnostics();
            error!(
                target: targets::SERIES,
                lambda_t,
                cap = truncation.depth,
                "Poisson truncation hit its hard cap"
            );
            return Err(MarkovError::TruncationDepthExceeded {
                cap: truncation.depth,
                lambda_t,
                diagnostics,
            });
        }
        Ok(truncation.depth)
    }

    /// Grows the tensor so queries up to `time` can be answered; `extra` is
    /// one for the PDF, which reads step `n + 1`.
    pub fn ensure_for_time(&mut self, time: f64, extra: usize) -> Result<()> {
        check_time(time)?;
        if time > self.max_time {
            self.max_time = time;
        }
        let required = self.steps(time)? + extra;
        let before = self.tensor.allocated_capacity();
        let grew = self
            .tensor
            .ensure(
                required,
                self.config.growth_factor,
                self.config.max_tensor_len,
                &self.kernel,
                &self.rates,
            )
            .map_err(|overflow| {
                let diagnostics = self.diagnostics();
                error!(
                    target: targets::SERIES,
                    capacity = overflow.capacity,
                    doubles = %overflow.doubles,
                    "recursion tensor exceeds allocation limit"
                );
                MarkovError::TensorTooLarge {
                    required: overflow.doubles,
                    limit: self.config.max_tensor_len,
                    diagnostics,
                }
            })?;
        if grew {
            debug!(
                target: targets::TENSOR,
                required,
                capacity = self.tensor.capacity().unwrap_or(0),
                previous = ?before,
                doubles = self.tensor.allocated_len(),
                "recursion tensor recomputed"
            );
        }
        Ok(())
    }

    /// Reward bracket `h ∈ [1, φ]` containing `x / t`.
    pub fn bracket(&self, x: f64, time: f64) -> Result<usize> {
        let lower = self.rates[0] * time;
        let upper = self.rates[self.phi] * time;
        if !(x >= lower && x <= upper) {
            return Err(MarkovError::RewardOutOfRange {
                reward: x,
                lower,
                upper,
            });
        }
        let rate = x / time;
        let h = self.rates.partition_point(|r| *r < rate);
        Ok(h.clamp(1, self.phi))
    }

    fn require_capacity(&self, required: usize) -> Result<usize> {
        match self.tensor.capacity() {
            Some(capacity) if capacity >= required => Ok(capacity),
            capacity => Err(MarkovError::CacheNotPrepared {
                required,
                capacity: capacity.unwrap_or(0),
            }),
        }
    }

    fn local_position(&self, x: f64, time: f64, h: usize) -> f64 {
        let xh = (x - self.rates[h - 1] * time) * self.inv_reward_diff[h] / time;
        xh.clamp(0.0, 1.0)
    }

    /// Single PDF entry at sorted block index `uv`. Needs a prepared tensor.
    pub fn pdf_entry(&self, x: f64, time: f64, uv: usize) -> Result<f64> {
        check_time(time)?;
        let h = self.bracket(x, time)?;
        let depth = self.require_capacity(self.steps(time)? + 1)? - 1;

        let xh = self.local_position(x, time, h);
        let factor = self.lambda * self.inv_reward_diff[h];
        let lambda_t = self.lambda * time;
        let mut acc = 0.0;

        with_scratch(|s| {
            for n in 0..=depth {
                bernstein_into(n, xh, &mut s.weights);
                let mut sum = 0.0;
                for (k, &w) in s.weights.iter().enumerate() {
                    if w != 0.0 {
                        sum += w
                            * (self.tensor.block(h, n + 1, k + 1)[uv]
                                - self.tensor.block(h, n + 1, k)[uv]);
                    }
                }
                acc += factor * poisson_pmf(n as u64, lambda_t) * sum;
            }
        });
        Ok(acc)
    }

    /// Batched PDF with overwrite semantics.
    ///
    /// `out` holds one `dim²` block per query. With `out_index`, results land
    /// in the caller's original state order. `parsimonious` truncates each
    /// query at its own depth when times vary.
    pub fn pdf_batch(
        &self,
        xs: &[f64],
        times: Times<'_>,
        parsimonious: bool,
        out: &mut [f64],
        out_index: Option<&[usize]>,
    ) -> Result<()> {
        let count = xs.len();
        times.check(count)?;
        check_len("output buffer", count * self.dim2, out.len())?;
        out.fill(0.0);
        if count == 0 {
            return Ok(());
        }

        let max_time = times.max(count);
        let depth = self.require_capacity(self.steps(max_time)? + 1)? - 1;

        with_scratch(|s| -> Result<()> {
            s.prepare(count, self.dim2);
            for (q, &x) in xs.iter().enumerate() {
                let t = times.at(q);
                check_time(t)?;
                s.brackets[q] = self.bracket(x, t)?;
                s.lambda_t[q] = self.lambda * t;
                s.depth[q] = if parsimonious && times.varies() {
                    self.steps(t)?
                } else {
                    usize::MAX
                };
            }

            for n in 0..=depth {
                for (q, row) in out.chunks_exact_mut(self.dim2).enumerate() {
                    if s.depth[q] < n {
                        continue;
                    }
                    s.premult[q] = poisson_pmf(n as u64, s.lambda_t[q]);
                    self.accumulate_pdf(xs[q], times.at(q), n, q, s, row, out_index);
                }
            }
            Ok(())
        })
    }

    #[allow(clippy::too_many_arguments)]
    fn accumulate_pdf(
        &self,
        x: f64,
        time: f64,
        n: usize,
        q: usize,
        s: &mut Scratch,
        row: &mut [f64],
        out_index: Option<&[usize]>,
    ) {
        let h = s.brackets[q];
        let xh = self.local_position(x, time, h);
        let temp = self.lambda * self.inv_reward_diff[h] * s.premult[q];
        bernstein_into(n, xh, &mut s.weights);
        let inc = &mut s.inc;
        inc.fill(0.0);
        for (k, &w) in s.weights.iter().enumerate() {
            if w == 0.0 {
                continue;
            }
            let a = self.tensor.block(h, n + 1, k + 1);
            let b = self.tensor.block(h, n + 1, k);
            for ((i, x), y) in inc.iter_mut().zip(a).zip(b) {
                *i += w * (x - y);
            }
        }
        add_block(row, inc, temp, out_index);
    }

    /// Batched CDF at a shared time, overwrite semantics.
    pub fn cdf_batch(
        &self,
        xs: &[f64],
        time: f64,
        out: &mut [f64],
        out_index: Option<&[usize]>,
    ) -> Result<()> {
        check_time(time)?;
        check_len("output buffer", xs.len() * self.dim2, out.len())?;
        out.fill(0.0);
        if xs.is_empty() {
            return Ok(());
        }
        let depth = self.require_capacity(self.steps(time)?)?;
        let lambda_t = self.lambda * time;

        with_scratch(|s| -> Result<()> {
            s.prepare(xs.len(), self.dim2);
            for (q, &x) in xs.iter().enumerate() {
                s.brackets[q] = self.bracket(x, time)?;
            }
            for n in 0..=depth {
                let premult = poisson_pmf(n as u64, lambda_t);
                for (q, row) in out.chunks_exact_mut(self.dim2).enumerate() {
                    let h = s.brackets[q];
                    let xh = self.local_position(xs[q], time, h);
                    bernstein_into(n, xh, &mut s.weights);
                    let inc = &mut s.inc;
                    inc.fill(0.0);
                    for (k, &w) in s.weights.iter().enumerate() {
                        if w == 0.0 {
                            continue;
                        }
                        for (i, c) in inc.iter_mut().zip(self.tensor.block(h, n, k)) {
                            *i += w * c;
                        }
                    }
                    add_block(row, inc, premult, out_index);
                }
            }
            Ok(())
        })
    }

    /// `exp(Q t)` in sorted order, eigen route with uniformization fallback.
    pub fn transition_probabilities(&mut self, time: f64, out: &mut [f64]) -> Result<()> {
        check_len("output buffer", self.dim2, out.len())?;
        if self.exponentiator.is_none() {
            self.exponentiator = Some(match DefaultEigenSystem::default().decompose(&self.q, self.dim) {
                Ok(eig) => Exponentiator::Eigen(eig),
                Err(EigenError::ComplexSpectrum { index, coupling }) => {
                    debug!(
                        target: targets::SERIES,
                        index,
                        coupling,
                        "complex spectrum; conditional probabilities via uniformization"
                    );
                    Exponentiator::Uniformized
                }
                Err(e) => return Err(e.into()),
            });
        }
        match &self.exponentiator {
            Some(Exponentiator::Eigen(eig)) => eig.exponential_into(time, out),
            _ => {
                let truncation = uniformized_exponential(&self.q, self.dim, time, &self.rule, out)?;
                if truncation.capped {
                    return Err(MarkovError::TruncationDepthExceeded {
                        cap: truncation.depth,
                        lambda_t: self.lambda * time,
                        diagnostics: self.diagnostics(),
                    });
                }
            }
        }
        Ok(())
    }

    /// Engine state for capacity diagnostics.
    pub fn diagnostics(&self) -> String {
        let mut s = String::new();
        let _ = writeln!(s, "dim: {}", self.dim);
        let _ = writeln!(s, "rates (sorted): {:?}", self.rates);
        let _ = writeln!(s, "lambda: {}", self.lambda);
        let _ = writeln!(s, "capacity: {:?}", self.tensor.capacity());
        let _ = writeln!(s, "allocated doubles: {}", self.tensor.allocated_len());
        let _ = writeln!(s, "max time: {}", self.max_time);
        let _ = write!(s, "lambda * max time: {}", self.lambda * self.max_time);
        s
    }
}

/// Bernstein weights `C(n,k) xh^k (1−xh)^{n−k}` for `k = 0..=n`.
///
/// Starts at the mode in log space and recurs outwards, so deep terms do not
/// underflow the way `(1−xh)^n` would.
fn bernstein_into(n: usize, xh: f64, out: &mut Vec<f64>) {
    out.clear();
    out.resize(n + 1, 0.0);
    if xh <= 0.0 {
        out[0] = 1.0;
        return;
    }
    if xh >= 1.0 {
        out[n] = 1.0;
        return;
    }
    let mode = ((n as f64 * xh) as usize).min(n);
    out[mode] = (log_binomial(n as u64, mode as u64)
        + mode as f64 * xh.ln()
        + (n - mode) as f64 * (-xh).ln_1p())
    .exp();
    let ratio = xh / (1.0 - xh);
    for k in mode..n {
        out[k + 1] = out[k] * (n - k) as f64 / (k + 1) as f64 * ratio;
    }
    for k in (1..=mode).rev() {
        out[k - 1] = out[k] * k as f64 / ((n - k + 1) as f64 * ratio);
    }
}

fn add_block(row: &mut [f64], inc: &[f64], scale: f64, out_index: Option<&[usize]>) {
    match out_index {
        None => {
            for (o, v) in row.iter_mut().zip(inc) {
                *o += scale * v;
            }
        }
        Some(index) => {
            for (&target, v) in index.iter().zip(inc) {
                row[target] += scale * v;
            }
        }
    }
}
