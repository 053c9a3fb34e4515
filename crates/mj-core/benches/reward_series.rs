//! Criterion benchmarks for the reward series engines.
//!
//! `prepare` measures the recursion-tensor build; the batch benchmarks run
//! read-only against an already prepared cache.

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use mj_core::jumps::{fill_registration_matrix, make_rate_register};
use mj_core::reward::Times;
use mj_core::{MarkovJumpsCore, SericolaSeriesMarkovReward, TwoStateOccupancyMarkovReward};
use mj_math::{DefaultEigenSystem, EigenSystem};

/// Birth-death generator with rewards `0, 1/(dim-1), ..., 1`.
fn chain(dim: usize) -> (Vec<f64>, Vec<f64>) {
    let mut q = vec![0.0; dim * dim];
    for i in 0..dim {
        if i + 1 < dim {
            q[i * dim + i + 1] = 1.0;
            q[(i + 1) * dim + i] = 0.7;
        }
    }
    for i in 0..dim {
        let off: f64 = (0..dim).filter(|&j| j != i).map(|j| q[i * dim + j]).sum();
        q[i * dim + i] = -off;
    }
    let rates = (0..dim).map(|i| i as f64 / (dim - 1) as f64).collect();
    (q, rates)
}

fn bench_tensor_build(c: &mut Criterion) {
    let mut group = c.benchmark_group("tensor");
    group.sample_size(20);

    for dim in [2usize, 4, 8] {
        let (q, rates) = chain(dim);
        group.bench_with_input(BenchmarkId::new("prepare", dim), &dim, |b, &d| {
            b.iter(|| {
                let mut engine = SericolaSeriesMarkovReward::new(&q, &rates, d)
                    .expect("valid chain");
                engine.prepare(black_box(2.0)).expect("fits in memory");
                black_box(engine.capacity());
            })
        });
    }

    group.finish();
}

fn bench_queries(c: &mut Criterion) {
    let mut group = c.benchmark_group("queries");

    for dim in [2usize, 4, 8] {
        let (q, rates) = chain(dim);
        let mut engine = SericolaSeriesMarkovReward::new(&q, &rates, dim).expect("valid chain");
        engine.prepare(2.0).expect("fits in memory");
        let xs: Vec<f64> = (1..50).map(|k| k as f64 * 0.02 * 2.0).collect();
        let mut out = vec![0.0; xs.len() * dim * dim];

        group.bench_with_input(BenchmarkId::new("pdf_batch", dim), &dim, |b, _| {
            b.iter(|| {
                engine
                    .pdf_batch_into(black_box(&xs), Times::Shared(2.0), false, &mut out)
                    .expect("prepared");
                black_box(out[0]);
            })
        });

        group.bench_with_input(BenchmarkId::new("cdf_batch", dim), &dim, |b, _| {
            b.iter(|| {
                engine
                    .cdf_batch_into(black_box(&xs), 2.0, &mut out)
                    .expect("prepared");
                black_box(out[0]);
            })
        });
    }

    let q2 = [-1.0, 1.0, 0.5, -0.5];
    let closed = TwoStateOccupancyMarkovReward::new(&q2).expect("two states");
    group.bench_function("two_state_density", |b| {
        b.iter(|| black_box(closed.occupancy_density(black_box(0.8), 2.0)))
    });

    group.finish();
}

fn bench_jumps(c: &mut Criterion) {
    let mut group = c.benchmark_group("jumps");

    for dim in [4usize, 20] {
        let (q, _) = chain(dim);
        let mut register = vec![0.0; dim * dim];
        fill_registration_matrix(&mut register, dim);
        let mut rate = vec![0.0; dim * dim];
        make_rate_register(&q, &register, &mut rate).expect("shapes match");
        let eigen = DefaultEigenSystem::default()
            .decompose(&q, dim)
            .expect("real spectrum");
        let mut core = MarkovJumpsCore::new(dim).expect("positive dim");
        let mut out = vec![0.0; dim * dim];

        group.bench_with_input(BenchmarkId::new("conditional", dim), &dim, |b, _| {
            b.iter(|| {
                core.compute_cond_stat_markov_jumps_eigen(&eigen, &rate, black_box(1.0), &mut out)
                    .expect("finite");
                black_box(out[0]);
            })
        });
    }

    group.finish();
}

criterion_group!(benches, bench_tensor_build, bench_queries, bench_jumps);
criterion_main!(benches);
