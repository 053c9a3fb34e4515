//! Upstream parameter sources for the model-tracking reward engine.
//!
//! A provider exposes a generation counter that increases whenever its
//! values change. The engine remembers the generations it last saw and
//! recomputes only what a changed provider feeds.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, PoisonError, RwLock};

/// Source of a row-major `dim x dim` generator matrix.
pub trait GeneratorProvider: Send + Sync {
    fn dim(&self) -> usize;
    fn generation(&self) -> u64;
    fn fill_generator(&self, out: &mut [f64]);
}

/// Source of per-state reward rates.
pub trait RewardRateProvider: Send + Sync {
    fn dim(&self) -> usize;
    fn generation(&self) -> u64;
    fn fill_rates(&self, out: &mut [f64]);
}

/// Shared, mutable parameter vector with a change counter.
///
/// Clones share storage, so a sampler can hold one handle and the engine
/// another.
#[derive(Debug, Clone)]
pub struct SharedParameter {
    dim: usize,
    values: Arc<RwLock<Vec<f64>>>,
    generation: Arc<AtomicU64>,
}

impl SharedParameter {
    /// Generator parameter; `q` is row-major `dim x dim`.
    pub fn generator(q: Vec<f64>, dim: usize) -> Self {
        Self::from_parts(q, dim)
    }

    pub fn rates(rates: Vec<f64>) -> Self {
        let dim = rates.len();
        Self::from_parts(rates, dim)
    }

    fn from_parts(values: Vec<f64>, dim: usize) -> Self {
        Self {
            dim,
            values: Arc::new(RwLock::new(values)),
            generation: Arc::new(AtomicU64::new(0)),
        }
    }

    /// Replaces the values and bumps the generation.
    pub fn set(&self, values: &[f64]) {
        self.update(|v| {
            v.clear();
            v.extend_from_slice(values);
        });
    }

    pub fn update(&self, f: impl FnOnce(&mut Vec<f64>)) {
        let mut guard = self.values.write().unwrap_or_else(PoisonError::into_inner);
        f(&mut guard);
        self.generation.fetch_add(1, Ordering::Release);
    }

    pub fn snapshot(&self) -> Vec<f64> {
        self.values
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn generation(&self) -> u64 {
        self.generation.load(Ordering::Acquire)
    }

    fn copy_into(&self, out: &mut [f64]) {
        let guard = self.values.read().unwrap_or_else(PoisonError::into_inner);
        let n = out.len().min(guard.len());
        out[..n].copy_from_slice(&guard[..n]);
    }
}

impl GeneratorProvider for SharedParameter {
    fn dim(&self) -> usize {
        self.dim
    }

    fn generation(&self) -> u64 {
        SharedParameter::generation(self)
    }

    fn fill_generator(&self, out: &mut [f64]) {
        self.copy_into(out);
    }
}

impl RewardRateProvider for SharedParameter {
    fn dim(&self) -> usize {
        self.dim
    }

    fn generation(&self) -> u64 {
        SharedParameter::generation(self)
    }

    fn fill_rates(&self, out: &mut [f64]) {
        self.copy_into(out);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn clones_share_values_and_generation() {
        let a = SharedParameter::rates(vec![0.0, 1.0]);
        let b = a.clone();
        assert_eq!(a.generation(), 0);
        b.set(&[0.5, 2.0]);
        assert_eq!(a.generation(), 1);
        assert_eq!(a.snapshot(), vec![0.5, 2.0]);

        let mut out = [0.0; 2];
        RewardRateProvider::fill_rates(&a, &mut out);
        assert_eq!(out, [0.5, 2.0]);
    }

    #[test]
    fn generator_dim_is_state_count() {
        let q = SharedParameter::generator(vec![-1.0, 1.0, 1.0, -1.0], 2);
        assert_eq!(GeneratorProvider::dim(&q), 2);
        assert_eq!(q.snapshot().len(), 4);
        q.update(|v| v[1] = 2.0);
        let mut out = [0.0; 4];
        q.fill_generator(&mut out);
        assert_eq!(out[1], 2.0);
        assert_eq!(GeneratorProvider::generation(&q), 1);
    }
}
