//! Model-tracking reward engine: refresh, staleness and MCMC hooks.

use std::sync::Arc;
use std::thread;

use mj_core::reward::{Restorable, SharedParameter, Times};
use mj_core::{MarkovError, SericolaModelMarkovReward, SericolaSeriesMarkovReward};

const Q3: [f64; 9] = [-1.0, 1.0, 0.0, 2.0, -3.0, 1.0, 0.0, 0.5, -0.5];

fn model(
    q: &[f64],
    rates: &[f64],
) -> (
    SericolaModelMarkovReward<SharedParameter, SharedParameter>,
    SharedParameter,
    SharedParameter,
) {
    let generator = SharedParameter::generator(q.to_vec(), 3);
    let rewards = SharedParameter::rates(rates.to_vec());
    let engine = SericolaModelMarkovReward::new(generator.clone(), rewards.clone()).unwrap();
    (engine, generator, rewards)
}

fn assert_close(a: &[f64], b: &[f64], tol: f64) {
    assert_eq!(a.len(), b.len());
    for (x, y) in a.iter().zip(b) {
        assert!((x - y).abs() <= tol, "{x} vs {y}");
    }
}

#[test]
fn model_matches_fixed_engine() {
    let rates = [1.0, 0.0, 2.0];
    let (mut model, _, _) = model(&Q3, &rates);
    let mut fixed = SericolaSeriesMarkovReward::new(&Q3, &rates, 3).unwrap();
    for (x, t) in [(0.3, 0.5), (1.2, 1.0), (2.9, 2.0)] {
        assert_eq!(model.compute_pdf(x, t).unwrap(), fixed.compute_pdf(x, t).unwrap());
        assert_eq!(model.compute_cdf(x, t).unwrap(), fixed.compute_cdf(x, t).unwrap());
    }
    assert_close(
        &model.compute_conditional_probabilities(1.0).unwrap(),
        &fixed.compute_conditional_probabilities(1.0).unwrap(),
        1e-14,
    );
}

#[test]
fn upstream_change_is_picked_up() {
    let (mut model, generator, rewards) = model(&Q3, &[0.0, 0.5, 2.0]);
    let before = model.compute_pdf(0.7, 1.0).unwrap();
    assert!(!model.refresh().unwrap());

    let q_new = [-2.0, 2.0, 0.0, 1.0, -2.0, 1.0, 0.0, 3.0, -3.0];
    generator.set(&q_new);
    let after = model.compute_pdf(0.7, 1.0).unwrap();
    assert_ne!(before, after);
    let mut fresh = SericolaSeriesMarkovReward::new(&q_new, &[0.0, 0.5, 2.0], 3).unwrap();
    assert_close(&after, &fresh.compute_pdf(0.7, 1.0).unwrap(), 1e-9);

    // reordering rewards moves the internal permutation
    rewards.set(&[2.0, 0.5, 0.0]);
    assert!(model.refresh().unwrap());
    assert_eq!(model.ordering().permutation(), &[2, 1, 0]);
    let mut reordered = SericolaSeriesMarkovReward::new(&q_new, &[2.0, 0.5, 0.0], 3).unwrap();
    assert_close(
        &model.compute_cdf(1.1, 1.0).unwrap(),
        &reordered.compute_cdf(1.1, 1.0).unwrap(),
        1e-9,
    );
}

#[test]
fn read_only_paths_refuse_stale_numerics() {
    let (mut model, _, rewards) = model(&Q3, &[0.0, 0.5, 2.0]);
    model.prepare(2.0).unwrap();
    let mut out = vec![0.0; 9];
    model
        .pdf_batch_into(&[0.4], Times::Shared(1.0), false, &mut out)
        .unwrap();

    rewards.update(|r| r[2] = 3.0);
    let err = model
        .pdf_batch_into(&[0.4], Times::Shared(1.0), false, &mut out)
        .unwrap_err();
    assert!(matches!(err, MarkovError::StaleModel));
    assert!(model.cdf_batch_into(&[0.4], 1.0, &mut out).is_err());

    model.prepare(2.0).unwrap();
    model
        .cdf_batch_into(&[0.4], 1.0, &mut out)
        .unwrap();
}

#[test]
fn tie_introduced_upstream_is_reported() {
    let (mut model, _, rewards) = model(&Q3, &[0.0, 0.5, 2.0]);
    rewards.set(&[0.0, 2.0, 2.0]);
    assert!(matches!(
        model.compute_pdf(0.5, 1.0),
        Err(MarkovError::RewardTie { .. })
    ));
    rewards.set(&[0.0, 1.0, 2.0]);
    assert!(model.compute_pdf(0.5, 1.0).is_ok());
}

#[test]
fn cache_never_shrinks_across_refreshes() {
    let (mut model, generator, _) = model(&Q3, &[0.0, 0.5, 2.0]);
    model.prepare(4.0).unwrap();
    let capacity = model.capacity().unwrap();

    generator.update(|q| {
        q[0] = -0.5;
        q[1] = 0.5;
    });
    model.compute_pdf(0.1, 0.2).unwrap();
    assert!(model.capacity().unwrap() >= capacity);
}

#[test]
fn reject_then_restore_rebuilds() {
    let (mut model, generator, _) = model(&Q3, &[0.0, 0.5, 2.0]);
    let base = model.compute_pdf(0.9, 1.0).unwrap();

    model.store_state();
    let saved = generator.snapshot();
    generator.update(|q| {
        q[3] = 4.0;
        q[4] = -5.0;
    });
    let proposed = model.compute_pdf(0.9, 1.0).unwrap();
    assert_ne!(base, proposed);

    // rejected: sampler puts its values back, engine drops derived state
    generator.set(&saved);
    model.restore_state();
    let restored = model.compute_pdf(0.9, 1.0).unwrap();
    // the cache keeps the deeper capacity of the proposal
    assert_close(&restored, &base, 1e-9);

    model.store_state();
    model.accept_state();
    assert_eq!(model.compute_pdf(0.9, 1.0).unwrap(), restored);
}

#[test]
fn prepared_engine_is_shareable_across_threads() {
    let (mut model, _, _) = model(&Q3, &[0.0, 0.5, 2.0]);
    model.prepare(2.0).unwrap();
    let expected = model.compute_pdf(1.3, 2.0).unwrap();
    let shared = Arc::new(model);

    let handles: Vec<_> = (0..4)
        .map(|_| {
            let engine = Arc::clone(&shared);
            thread::spawn(move || {
                let mut out = vec![0.0; 9];
                engine
                    .pdf_batch_into(&[1.3], Times::Shared(2.0), false, &mut out)
                    .unwrap();
                out
            })
        })
        .collect();
    for handle in handles {
        assert_eq!(handle.join().unwrap(), expected);
    }
}
