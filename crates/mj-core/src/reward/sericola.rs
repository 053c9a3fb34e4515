//! Reward distributions for a fixed generator and reward vector.

use std::fmt;

use mj_config::EngineConfig;
use tracing::{debug, instrument};

use super::ordering::RewardOrdering;
use super::series::SeriesCore;
use super::{MarkovReward, Restorable, Times};
use crate::error::{check_len, check_state, check_time, MarkovError, Result};
use crate::logging::targets;

/// Sericola series engine over one `(Q, r)` snapshot.
///
/// States are reordered internally so reward rates increase; every result
/// is reported in the caller's state order. Densities exclude the point
/// masses at `x = r_min·t` and `x = r_max·t`.
///
/// ```ignore
/// let mut engine = SericolaSeriesMarkovReward::new(&q, &[0.0, 1.0], 2)?;
/// engine.prepare(2.0)?;
/// let pdf = engine.compute_pdf(0.3, 1.0)?; // 2x2 block, row-major
/// ```
#[derive(Debug, Clone)]
pub struct SericolaSeriesMarkovReward {
    ordering: RewardOrdering,
    core: SeriesCore,
    rates: Vec<f64>,
    stored: Option<(Option<usize>, f64)>,
    sorted_buf: Vec<f64>,
}

impl SericolaSeriesMarkovReward {
    /// Engine with default settings. `q` is row-major `dim x dim`.
    pub fn new(q: &[f64], rates: &[f64], dim: usize) -> Result<Self> {
        Self::with_config(q, rates, dim, &EngineConfig::default())
    }

    pub fn with_config(q: &[f64], rates: &[f64], dim: usize, config: &EngineConfig) -> Result<Self> {
        let mut core = SeriesCore::new(dim, config.clone())?;
        check_len("generator", dim * dim, q.len())?;
        if rates.len() != dim {
            return Err(MarkovError::RewardLength {
                expected: dim,
                actual: rates.len(),
            });
        }
        let ordering = RewardOrdering::from_rates(rates)?;

        let mut q_sorted = vec![0.0; dim * dim];
        let mut r_sorted = vec![0.0; dim];
        ordering.sort_square(q, &mut q_sorted);
        ordering.sort_rates(rates, &mut r_sorted);
        core.load(&q_sorted, &r_sorted)?;

        debug!(
            target: targets::REWARD,
            dim,
            lambda = core.lambda(),
            reordered = !ordering.is_identity(),
            "series reward engine built"
        );

        Ok(Self {
            ordering,
            core,
            rates: rates.to_vec(),
            stored: None,
            sorted_buf: vec![0.0; dim * dim],
        })
    }

    pub fn dim(&self) -> usize {
        self.core.dim()
    }

    /// Reward rates in caller order.
    pub fn rates(&self) -> &[f64] {
        &self.rates
    }

    pub fn ordering(&self) -> &RewardOrdering {
        &self.ordering
    }

    pub fn lambda(&self) -> f64 {
        self.core.lambda()
    }

    /// Largest time the cache has been sized for.
    pub fn max_time(&self) -> f64 {
        self.core.max_time()
    }

    pub fn capacity(&self) -> Option<usize> {
        self.core.capacity()
    }

    pub fn growth_events(&self) -> u64 {
        self.core.tensor().growth_events()
    }

    pub fn recompute_events(&self) -> u64 {
        self.core.tensor().recompute_events()
    }

    /// Sizes the recursion cache for PDF and CDF queries up to `max_time`.
    #[instrument(level = "debug", skip(self), fields(engine = "series"))]
    pub fn prepare(&mut self, max_time: f64) -> Result<()> {
        self.core.ensure_for_time(max_time, 1)
    }

    /// Joint density block at reward `x`, time `t`.
    pub fn compute_pdf(&mut self, x: f64, time: f64) -> Result<Vec<f64>> {
        let mut out = vec![0.0; self.core.dim() * self.core.dim()];
        self.compute_pdf_into(x, time, &mut out)?;
        Ok(out)
    }

    pub fn compute_pdf_into(&mut self, x: f64, time: f64, out: &mut [f64]) -> Result<()> {
        self.prepare(time)?;
        self.pdf_batch_into(&[x], Times::Shared(time), false, out)
    }

    /// All densities for `xs`, growing the cache to the largest time first.
    pub fn compute_pdf_batch(
        &mut self,
        xs: &[f64],
        times: Times<'_>,
        parsimonious: bool,
    ) -> Result<Vec<f64>> {
        times.check(xs.len())?;
        if !xs.is_empty() {
            self.prepare(times.max(xs.len()))?;
        }
        let mut out = vec![0.0; xs.len() * self.core.dim() * self.core.dim()];
        self.pdf_batch_into(xs, times, parsimonious, &mut out)?;
        Ok(out)
    }

    /// Read-only batch; fails with `CacheNotPrepared` if the cache is too
    /// shallow. Safe to call from several threads once prepared.
    pub fn pdf_batch_into(
        &self,
        xs: &[f64],
        times: Times<'_>,
        parsimonious: bool,
        out: &mut [f64],
    ) -> Result<()> {
        self.core
            .pdf_batch(xs, times, parsimonious, out, self.ordering.out_index())
    }

    /// Joint distribution block `P(X(t) ≤ x, S(t) = j | S(0) = i)`.
    pub fn compute_cdf(&mut self, x: f64, time: f64) -> Result<Vec<f64>> {
        self.compute_cdf_batch(&[x], time)
    }

    pub fn compute_cdf_batch(&mut self, xs: &[f64], time: f64) -> Result<Vec<f64>> {
        self.core.ensure_for_time(time, 0)?;
        let mut out = vec![0.0; xs.len() * self.core.dim() * self.core.dim()];
        self.cdf_batch_into(xs, time, &mut out)?;
        Ok(out)
    }

    pub fn cdf_batch_into(&self, xs: &[f64], time: f64, out: &mut [f64]) -> Result<()> {
        self.core.cdf_batch(xs, time, out, self.ordering.out_index())
    }

    /// `exp(Q t)` in caller order.
    pub fn compute_conditional_probabilities(&mut self, time: f64) -> Result<Vec<f64>> {
        check_time(time)?;
        let mut out = vec![0.0; self.core.dim() * self.core.dim()];
        self.core
            .transition_probabilities(time, &mut self.sorted_buf)?;
        self.ordering.unsort_square(&self.sorted_buf, &mut out);
        Ok(out)
    }

    /// Capacity report attached to capacity errors.
    pub fn diagnostics(&self) -> String {
        self.core.diagnostics()
    }
}

impl MarkovReward for SericolaSeriesMarkovReward {
    fn dim(&self) -> usize {
        self.core.dim()
    }

    fn compute_pdf_entry(&mut self, reward: f64, time: f64, i: usize, j: usize) -> Result<f64> {
        let dim = self.core.dim();
        check_state(i, dim)?;
        check_state(j, dim)?;
        self.prepare(time)?;
        let uv = self.ordering.to_sorted(i) * dim + self.ordering.to_sorted(j);
        self.core.pdf_entry(reward, time, uv)
    }

    fn compute_cdf_entry(&mut self, reward: f64, time: f64, i: usize, j: usize) -> Result<f64> {
        let dim = self.core.dim();
        check_state(i, dim)?;
        check_state(j, dim)?;
        let block = self.compute_cdf(reward, time)?;
        Ok(block[i * dim + j])
    }

    fn compute_conditional_probability(&mut self, time: f64, i: usize, j: usize) -> Result<f64> {
        let dim = self.core.dim();
        check_state(i, dim)?;
        check_state(j, dim)?;
        let p = self.compute_conditional_probabilities(time)?;
        Ok(p[i * dim + j])
    }
}

impl Restorable for SericolaSeriesMarkovReward {
    fn store_state(&mut self) {
        self.stored = Some(self.core.extent());
    }

    fn restore_state(&mut self) {
        if let Some(extent) = self.stored {
            self.core.restore_extent(extent);
        }
    }
}

impl fmt::Display for SericolaSeriesMarkovReward {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "SericolaSeries(dim={}, lambda={:.6}, capacity={}, max_time={})",
            self.core.dim(),
            self.core.lambda(),
            self.core
                .capacity()
                .map_or_else(|| "none".to_string(), |c| c.to_string()),
            self.core.max_time()
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn symmetric() -> SericolaSeriesMarkovReward {
        SericolaSeriesMarkovReward::new(&[-1.0, 1.0, 1.0, -1.0], &[0.0, 1.0], 2).unwrap()
    }

    fn close(a: f64, b: f64, tol: f64) -> bool {
        (a - b).abs() <= tol
    }

    #[test]
    fn two_state_pdf_reference() {
        let mut e = symmetric();
        let pdf = e.compute_pdf(0.3, 1.0).unwrap();
        assert!(close(pdf[0], 0.285518, 1e-5));
        assert!(close(pdf[1], 0.449286, 1e-5));
        assert!(close(pdf[2], 0.449286, 1e-5));
        assert!(close(pdf[3], 0.122365, 1e-5));
    }

    #[test]
    fn two_state_cdf_reference() {
        let mut e = symmetric();
        let half = e.compute_cdf(0.5, 1.0).unwrap();
        assert!(close(half[0], 0.516714, 1e-5));
        assert!(close(half[1], 0.216166, 1e-5));
        assert!(close(half[3], 0.050954, 1e-5));

        let full = e.compute_cdf(1.0, 1.0).unwrap();
        let p00 = 0.5 * (1.0 + (-2.0f64).exp());
        assert!(close(full[0], p00, 1e-8));
        assert!(close(full[1], 1.0 - p00, 1e-8));
    }

    #[test]
    fn reversed_rates_report_caller_order() {
        // Same chain with the reward assignment flipped: state 1 earns nothing.
        let mut flipped =
            SericolaSeriesMarkovReward::new(&[-1.0, 1.0, 1.0, -1.0], &[1.0, 0.0], 2).unwrap();
        assert!(!flipped.ordering().is_identity());
        let mut plain = symmetric();
        let a = flipped.compute_pdf(0.7, 1.0).unwrap();
        let b = plain.compute_pdf(0.3, 1.0).unwrap();
        // Occupancy of state 0 is 0.7 iff occupancy of state 1 is 0.3.
        assert!(close(a[0], b[0], 1e-8));
        assert!(close(a[3], b[3], 1e-8));
        assert!(close(a[1], b[1], 1e-8));
    }

    #[test]
    fn reversed_rates_cdf_entries_use_caller_order() {
        let mut flipped =
            SericolaSeriesMarkovReward::new(&[-1.0, 1.0, 1.0, -1.0], &[1.0, 0.0], 2).unwrap();
        let block = flipped.compute_cdf(0.6, 1.0).unwrap();
        for i in 0..2 {
            for j in 0..2 {
                let v = flipped.compute_cdf_entry(0.6, 1.0, i, j).unwrap();
                assert!(close(v, block[i * 2 + j], 1e-15), "({i},{j})");
            }
        }
        // relabelling the states maps one chain onto the other
        let mut plain = symmetric();
        let p = plain.compute_cdf_entry(0.4, 1.0, 1, 1).unwrap();
        assert!(close(flipped.compute_cdf_entry(0.4, 1.0, 0, 0).unwrap(), p, 1e-8));
        assert!(flipped.compute_cdf_entry(0.4, 1.0, 0, 2).is_err());
    }

    #[test]
    fn large_uniformized_mean_stays_finite() {
        // λt = 800, where e^{-λt} underflows
        let q = [-400.0, 400.0, 400.0, -400.0];
        let mut e = SericolaSeriesMarkovReward::new(&q, &[0.0, 1.0], 2).unwrap();
        let full = e.compute_cdf(2.0, 2.0).unwrap();
        assert!(close(full[0], 0.5, 1e-8));
        assert!(close(full[1], 0.5, 1e-8));
        let pdf = e.compute_pdf(1.0, 2.0).unwrap();
        assert!(pdf.iter().all(|v| v.is_finite() && *v > 0.0));
    }

    #[test]
    fn conditional_probabilities_sum_to_one() {
        let q = [-1.0, 1.0, 0.0, 2.0, -3.0, 1.0, 0.0, 0.5, -0.5];
        let mut e = SericolaSeriesMarkovReward::new(&q, &[2.0, 0.0, 1.0], 3).unwrap();
        let p = e.compute_conditional_probabilities(0.8).unwrap();
        for i in 0..3 {
            let row: f64 = p[i * 3..i * 3 + 3].iter().sum();
            assert!(close(row, 1.0, 1e-10));
        }
        let single = e.compute_conditional_probability(0.8, 2, 1).unwrap();
        assert!(close(single, p[7], 1e-15));
    }

    #[test]
    fn entry_access_matches_block() {
        let q = [-1.0, 1.0, 0.0, 2.0, -3.0, 1.0, 0.0, 0.5, -0.5];
        let mut e = SericolaSeriesMarkovReward::new(&q, &[2.0, 0.0, 1.0], 3).unwrap();
        let block = e.compute_pdf(1.1, 1.0).unwrap();
        for i in 0..3 {
            for j in 0..3 {
                let v = e.compute_pdf_entry(1.1, 1.0, i, j).unwrap();
                assert!(close(v, block[i * 3 + j], 1e-12), "({i},{j})");
            }
        }
    }

    #[test]
    fn prepared_cache_is_reused() {
        let mut e = symmetric();
        e.prepare(5.0).unwrap();
        let cap = e.capacity();
        e.compute_pdf(0.5, 2.0).unwrap();
        e.compute_cdf(0.5, 1.0).unwrap();
        assert_eq!(e.capacity(), cap);
        assert_eq!(e.growth_events(), 1);
    }

    #[test]
    fn read_only_batch_needs_prepare() {
        let e = symmetric();
        let mut out = vec![0.0; 4];
        let err = e
            .pdf_batch_into(&[0.5], Times::Shared(1.0), false, &mut out)
            .unwrap_err();
        assert_eq!(err.code(), 24);
    }

    #[test]
    fn rejects_bad_inputs() {
        assert!(matches!(
            SericolaSeriesMarkovReward::new(&[0.0], &[0.0], 1),
            Err(MarkovError::InvalidDimension(1))
        ));
        assert!(matches!(
            SericolaSeriesMarkovReward::new(&[-1.0, 1.0, 1.0, -1.0], &[0.0], 2),
            Err(MarkovError::RewardLength { .. })
        ));
        let mut e = symmetric();
        assert!(matches!(
            e.compute_pdf(1.5, 1.0),
            Err(MarkovError::RewardOutOfRange { .. })
        ));
        assert!(matches!(
            e.compute_pdf(0.5, 0.0),
            Err(MarkovError::NonPositiveTime(_))
        ));
        assert!(e.compute_pdf_entry(0.5, 1.0, 2, 0).is_err());
    }

    #[test]
    fn display_reports_capacity() {
        let mut e = symmetric();
        assert!(e.to_string().contains("capacity=none"));
        e.prepare(1.0).unwrap();
        assert!(!e.to_string().contains("capacity=none"));
    }
}
