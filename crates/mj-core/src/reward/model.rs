//! Reward distributions that follow upstream model parameters.

use std::fmt;

use mj_config::EngineConfig;
use tracing::{debug, instrument, trace};

use super::ordering::RewardOrdering;
use super::provider::{GeneratorProvider, RewardRateProvider};
use super::series::SeriesCore;
use super::{MarkovReward, Restorable, Times};
use crate::error::{check_state, check_time, MarkovError, Result};
use crate::logging::targets;

/// Sericola engine bound to a generator and a reward-rate provider.
///
/// `&mut self` methods call [`refresh`](Self::refresh) first, which pulls
/// changed parameters, re-sorts states when the reward order moved and
/// drops the recursion cache. The `&self` batch methods never refresh; they
/// fail with `StaleModel` if a provider changed since the last refresh.
pub struct SericolaModelMarkovReward<G, R> {
    generator: G,
    rewards: R,
    dim: usize,
    core: SeriesCore,
    ordering: RewardOrdering,
    /// Generations of (generator, rewards) the numerics were built from.
    seen: Option<(u64, u64)>,
    dirty: bool,
    q: Vec<f64>,
    rates: Vec<f64>,
    q_sorted: Vec<f64>,
    rates_sorted: Vec<f64>,
    sorted_buf: Vec<f64>,
}

impl<G: GeneratorProvider, R: RewardRateProvider> SericolaModelMarkovReward<G, R> {
    pub fn new(generator: G, rewards: R) -> Result<Self> {
        Self::with_config(generator, rewards, &EngineConfig::default())
    }

    pub fn with_config(generator: G, rewards: R, config: &EngineConfig) -> Result<Self> {
        let dim = generator.dim();
        if rewards.dim() != dim {
            return Err(MarkovError::RewardLength {
                expected: dim,
                actual: rewards.dim(),
            });
        }
        let core = SeriesCore::new(dim, config.clone())?;
        let identity: Vec<f64> = (0..dim).map(|i| i as f64).collect();
        let mut engine = Self {
            generator,
            rewards,
            dim,
            core,
            ordering: RewardOrdering::from_rates(&identity)?,
            seen: None,
            dirty: true,
            q: vec![0.0; dim * dim],
            rates: vec![0.0; dim],
            q_sorted: vec![0.0; dim * dim],
            rates_sorted: vec![0.0; dim],
            sorted_buf: vec![0.0; dim * dim],
        };
        engine.refresh()?;
        Ok(engine)
    }

    fn generations(&self) -> (u64, u64) {
        (self.generator.generation(), self.rewards.generation())
    }

    fn is_fresh(&self) -> bool {
        !self.dirty && self.seen == Some(self.generations())
    }

    /// Pulls parameters that changed since the last refresh.
    ///
    /// Returns whether anything was recomputed. A failed refresh leaves the
    /// engine stale.
    pub fn refresh(&mut self) -> Result<bool> {
        let current = self.generations();
        if !self.dirty && self.seen == Some(current) {
            return Ok(false);
        }
        self.dirty = true;
        let rates_changed = self.seen.map(|(_, r)| r) != Some(current.1);

        if rates_changed || self.seen.is_none() {
            self.rewards.fill_rates(&mut self.rates);
            let ordering = RewardOrdering::from_rates(&self.rates)?;
            if ordering != self.ordering {
                trace!(
                    target: targets::REWARD,
                    permutation = ?ordering.permutation(),
                    "reward order changed"
                );
                self.ordering = ordering;
            }
        }
        self.generator.fill_generator(&mut self.q);
        self.ordering.sort_square(&self.q, &mut self.q_sorted);
        self.ordering.sort_rates(&self.rates, &mut self.rates_sorted);
        self.core.load(&self.q_sorted, &self.rates_sorted)?;

        debug!(
            target: targets::REWARD,
            generator_generation = current.0,
            rewards_generation = current.1,
            lambda = self.core.lambda(),
            "model reward engine refreshed"
        );
        self.seen = Some(current);
        self.dirty = false;
        Ok(true)
    }

    fn require_fresh(&self) -> Result<()> {
        if self.is_fresh() {
            Ok(())
        } else {
            Err(MarkovError::StaleModel)
        }
    }

    pub fn dim(&self) -> usize {
        self.dim
    }

    pub fn generator(&self) -> &G {
        &self.generator
    }

    pub fn rewards(&self) -> &R {
        &self.rewards
    }

    /// Reward rates in caller order, as of the last refresh.
    pub fn rates(&self) -> &[f64] {
        &self.rates
    }

    pub fn ordering(&self) -> &RewardOrdering {
        &self.ordering
    }

    pub fn lambda(&self) -> f64 {
        self.core.lambda()
    }

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

    #[instrument(level = "debug", skip(self), fields(engine = "model"))]
    pub fn prepare(&mut self, max_time: f64) -> Result<()> {
        self.refresh()?;
        self.core.ensure_for_time(max_time, 1)
    }

    pub fn compute_pdf(&mut self, x: f64, time: f64) -> Result<Vec<f64>> {
        self.compute_pdf_batch(&[x], Times::Shared(time), false)
    }

    pub fn compute_pdf_batch(
        &mut self,
        xs: &[f64],
        times: Times<'_>,
        parsimonious: bool,
    ) -> Result<Vec<f64>> {
        times.check(xs.len())?;
        self.refresh()?;
        if !xs.is_empty() {
            self.core.ensure_for_time(times.max(xs.len()), 1)?;
        }
        let mut out = vec![0.0; xs.len() * self.dim * self.dim];
        self.pdf_batch_into(xs, times, parsimonious, &mut out)?;
        Ok(out)
    }

    /// Read-only batch against the last refresh.
    pub fn pdf_batch_into(
        &self,
        xs: &[f64],
        times: Times<'_>,
        parsimonious: bool,
        out: &mut [f64],
    ) -> Result<()> {
        self.require_fresh()?;
        self.core
            .pdf_batch(xs, times, parsimonious, out, self.ordering.out_index())
    }

    pub fn compute_cdf(&mut self, x: f64, time: f64) -> Result<Vec<f64>> {
        self.compute_cdf_batch(&[x], time)
    }

    pub fn compute_cdf_batch(&mut self, xs: &[f64], time: f64) -> Result<Vec<f64>> {
        self.refresh()?;
        self.core.ensure_for_time(time, 0)?;
        let mut out = vec![0.0; xs.len() * self.dim * self.dim];
        self.cdf_batch_into(xs, time, &mut out)?;
        Ok(out)
    }

    pub fn cdf_batch_into(&self, xs: &[f64], time: f64, out: &mut [f64]) -> Result<()> {
        self.require_fresh()?;
        self.core.cdf_batch(xs, time, out, self.ordering.out_index())
    }

    /// `exp(Q t)` for the current generator, in caller order.
    pub fn compute_conditional_probabilities(&mut self, time: f64) -> Result<Vec<f64>> {
        check_time(time)?;
        self.refresh()?;
        self.core
            .transition_probabilities(time, &mut self.sorted_buf)?;
        let mut out = vec![0.0; self.dim * self.dim];
        self.ordering.unsort_square(&self.sorted_buf, &mut out);
        Ok(out)
    }

    pub fn diagnostics(&self) -> String {
        self.core.diagnostics()
    }
}

impl<G: GeneratorProvider, R: RewardRateProvider> MarkovReward for SericolaModelMarkovReward<G, R> {
    fn dim(&self) -> usize {
        self.dim
    }

    fn compute_pdf_entry(&mut self, reward: f64, time: f64, i: usize, j: usize) -> Result<f64> {
        check_state(i, self.dim)?;
        check_state(j, self.dim)?;
        self.prepare(time)?;
        let uv = self.ordering.to_sorted(i) * self.dim + self.ordering.to_sorted(j);
        self.core.pdf_entry(reward, time, uv)
    }

    fn compute_cdf_entry(&mut self, reward: f64, time: f64, i: usize, j: usize) -> Result<f64> {
        check_state(i, self.dim)?;
        check_state(j, self.dim)?;
        let block = self.compute_cdf(reward, time)?;
        Ok(block[i * self.dim + j])
    }

    fn compute_conditional_probability(&mut self, time: f64, i: usize, j: usize) -> Result<f64> {
        check_state(i, self.dim)?;
        check_state(j, self.dim)?;
        let p = self.compute_conditional_probabilities(time)?;
        Ok(p[i * self.dim + j])
    }
}

/// Parameters are owned by the providers, so a rollback cannot restore the
/// cache contents: it marks everything dirty and the next call rebuilds
/// from whatever the providers hold then. The tensor allocation is kept.
impl<G: GeneratorProvider, R: RewardRateProvider> Restorable for SericolaModelMarkovReward<G, R> {
    fn store_state(&mut self) {}

    fn restore_state(&mut self) {
        self.dirty = true;
        self.core.invalidate();
        trace!(target: targets::REWARD, "model reward engine restored; cache dropped");
    }
}

impl<G, R> fmt::Display for SericolaModelMarkovReward<G, R> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "SericolaModel(dim={}, lambda={:.6}, capacity={}, stale={})",
            self.dim,
            self.core.lambda(),
            self.core
                .capacity()
                .map_or_else(|| "none".to_string(), |c| c.to_string()),
            self.dirty
        )
    }
}
