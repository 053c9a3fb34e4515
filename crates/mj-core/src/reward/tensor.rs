//! Flat storage for the Sericola recursion tensor `C(h, n, k)`.
//!
//! Each cell is a `dim x dim` block; block `(h, n, k)` starts at
//! `((h·N1 + n)·N1 + k)·dim²` with `N1 = capacity + 1`. Only `k ≤ n ≤ capacity`
//! is ever written. Growth reallocates and recomputes everything; an
//! invalidated tensor keeps its allocation and is recomputed in place.

use mj_math::{fill_identity, matrix_multiply};

/// Requested capacity would exceed the allocation limit.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TensorOverflow {
    pub capacity: usize,
    pub doubles: u128,
}

#[derive(Debug, Clone)]
pub struct RewardTensor {
    dim: usize,
    dim2: usize,
    phi: usize,
    /// Depth of the allocation (`N1 - 1`), `None` before the first build.
    allocated: Option<usize>,
    /// Depth the current contents are valid for.
    computed: Option<usize>,
    n1: usize,
    data: Vec<f64>,
    power: Vec<f64>,
    product: Vec<f64>,
    growth_events: u64,
    recompute_events: u64,
}

impl RewardTensor {
    pub fn new(dim: usize) -> Self {
        Self {
            dim,
            dim2: dim * dim,
            phi: dim.saturating_sub(1),
            allocated: None,
            computed: None,
            n1: 0,
            data: Vec::new(),
            power: vec![0.0; dim * dim],
            product: vec![0.0; dim * dim],
            growth_events: 0,
            recompute_events: 0,
        }
    }

    /// Valid depth `N`, if any.
    pub fn capacity(&self) -> Option<usize> {
        self.computed
    }

    pub fn allocated_capacity(&self) -> Option<usize> {
        self.allocated
    }

    pub fn allocated_len(&self) -> usize {
        self.data.len()
    }

    pub fn growth_events(&self) -> u64 {
        self.growth_events
    }

    pub fn recompute_events(&self) -> u64 {
        self.recompute_events
    }

    /// Drops the validity extent; the allocation is kept.
    pub fn invalidate(&mut self) {
        self.computed = None;
    }

    pub fn restore_extent(&mut self, extent: Option<usize>) {
        self.computed = match (extent, self.allocated) {
            (Some(e), Some(a)) if e <= a => Some(e),
            _ => None,
        };
    }

    #[inline]
    pub fn offset(&self, h: usize, n: usize, k: usize) -> usize {
        ((h * self.n1 + n) * self.n1 + k) * self.dim2
    }

    #[inline]
    pub fn block(&self, h: usize, n: usize, k: usize) -> &[f64] {
        let off = self.offset(h, n, k);
        &self.data[off..off + self.dim2]
    }

    /// Doubles needed for depth `capacity`.
    pub fn required_len(dim: usize, capacity: usize) -> u128 {
        let n1 = capacity as u128 + 1;
        let dim = dim as u128;
        dim * n1 * n1 * dim * dim
    }

    /// Makes the tensor valid to at least `required`, growing geometrically.
    ///
    /// Returns whether a recomputation happened. `p` is the uniformized
    /// kernel and `rates` the sorted reward rates, both in sorted order.
    pub fn ensure(
        &mut self,
        required: usize,
        growth_factor: f64,
        max_len: usize,
        p: &[f64],
        rates: &[f64],
    ) -> Result<bool, TensorOverflow> {
        if matches!(self.computed, Some(c) if c >= required) {
            return Ok(false);
        }

        let target = match self.allocated {
            None => required,
            Some(current) => {
                let mut cap = current;
                while cap < required {
                    cap = required.max((cap as f64 * growth_factor) as usize + 1);
                }
                cap
            }
        };

        let doubles = Self::required_len(self.dim, target);
        if doubles > max_len as u128 {
            return Err(TensorOverflow {
                capacity: target,
                doubles,
            });
        }

        if self.allocated == Some(target) {
            self.data.fill(0.0);
        } else {
            self.data = vec![0.0; doubles as usize];
            self.allocated = Some(target);
            self.n1 = target + 1;
            self.growth_events += 1;
        }
        self.compute(target, p, rates);
        self.computed = Some(target);
        self.recompute_events += 1;
        Ok(true)
    }

    /// Two coupled sweeps per step `n`: forward over increasing `h` fills rows
    /// with `r_u ≥ r_h`, backward over decreasing `h` fills rows with `r_u < r_h`.
    fn compute(&mut self, depth: usize, p: &[f64], r: &[f64]) {
        let dim = self.dim;
        let phi = self.phi;

        fill_identity(&mut self.power, dim);

        for h in 1..=phi {
            let off = self.offset(h, 0, 0);
            for u in 0..h {
                self.data[off + u * dim + u] = 1.0;
            }
        }

        for n in 1..=depth {
            for h in 1..=phi {
                for k in 1..=n {
                    let cur = self.offset(h, n, k);
                    let left = self.offset(h, n, k - 1);
                    let prev = self.offset(h, n - 1, k - 1);
                    for u in h..=phi {
                        let denom = r[u] - r[h - 1];
                        let c = (r[u] - r[h]) / denom;
                        let d = (r[h] - r[h - 1]) / denom;
                        self.interpolate_row(u, cur, left, prev, c, d, p);
                    }
                }
                if h < phi {
                    let src = self.offset(h, n, n);
                    let dst = self.offset(h + 1, n, 0);
                    for u in (h + 1)..=phi {
                        self.data
                            .copy_within(src + u * dim..src + (u + 1) * dim, dst + u * dim);
                    }
                }
            }

            matrix_multiply(&self.power, p, dim, &mut self.product);
            std::mem::swap(&mut self.power, &mut self.product);
            let top = self.offset(phi, n, n);
            let rows = phi * dim;
            self.data[top..top + rows].copy_from_slice(&self.power[..rows]);

            for h in (1..=phi).rev() {
                for k in (0..n).rev() {
                    let cur = self.offset(h, n, k);
                    let right = self.offset(h, n, k + 1);
                    let prev = self.offset(h, n - 1, k);
                    for u in 0..h {
                        let denom = r[h] - r[u];
                        let c = (r[h - 1] - r[u]) / denom;
                        let d = (r[h] - r[h - 1]) / denom;
                        self.interpolate_row(u, cur, right, prev, c, d, p);
                    }
                }
                if h >= 2 {
                    let src = self.offset(h, n, 0);
                    let dst = self.offset(h - 1, n, n);
                    let rows = (h - 1) * dim;
                    self.data.copy_within(src..src + rows, dst);
                }
            }
        }
    }

    /// Row `u` of block `cur` = `c · row u of neighbor + d · (P · prev)[u, ·]`.
    #[allow(clippy::too_many_arguments)]
    #[inline]
    fn interpolate_row(
        &mut self,
        u: usize,
        cur: usize,
        neighbor: usize,
        prev: usize,
        c: f64,
        d: f64,
        p: &[f64],
    ) {
        let dim = self.dim;
        let p_row = &p[u * dim..(u + 1) * dim];
        for v in 0..dim {
            let mut acc = 0.0;
            for (w, pw) in p_row.iter().enumerate() {
                acc += pw * self.data[prev + w * dim + v];
            }
            let idx = u * dim + v;
            self.data[cur + idx] = c * self.data[neighbor + idx] + d * acc;
        }
    }
}
