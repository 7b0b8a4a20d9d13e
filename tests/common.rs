//! Common test utilities for the actinf test suite.
//!
//! Random model tensors are drawn column by column from a symmetric
//! Dirichlet via normalised Gamma samples.

#![allow(dead_code)]

use actinf::Beliefs;
use ndarray::{Array, ArrayD, Axis, IxDyn, array};
use rand::{SeedableRng, rngs::StdRng};
use rand_distr::{Distribution, Gamma};

pub fn rng(seed: u64) -> StdRng {
    StdRng::seed_from_u64(seed)
}

/// Tensor of `shape` whose lanes along axis 0 are Dir(`concentration`) draws.
pub fn random_conditional(shape: &[usize], concentration: f64, rng: &mut StdRng) -> ArrayD<f64> {
    let gamma = Gamma::new(concentration, 1.0).expect("gamma parameters valid");
    let mut tensor = Array::from_shape_simple_fn(IxDyn(shape), || gamma.sample(&mut *rng));
    for mut lane in tensor.lanes_mut(Axis(0)) {
        let total = lane.sum();
        lane.mapv_inplace(|x| x / total);
    }
    tensor
}

/// Random likelihood `(num_obs, num_states[d]…)` over the given dependencies.
pub fn random_likelihood(
    num_obs: usize,
    num_states: &[usize],
    dependencies: &[usize],
    rng: &mut StdRng,
) -> ArrayD<f64> {
    let mut shape = vec![num_obs];
    shape.extend(dependencies.iter().map(|&d| num_states[d]));
    random_conditional(&shape, 1.0, rng)
}

/// Random self-dependent transition tensor `(ns, ns, nu)`.
pub fn random_transition(num_states: usize, num_controls: usize, rng: &mut StdRng) -> ArrayD<f64> {
    random_conditional(&[num_states, num_states, num_controls], 1.0, rng)
}

/// Identity likelihood over one factor.
pub fn identity_likelihood(n: usize) -> ArrayD<f64> {
    Array::from_shape_fn(IxDyn(&[n, n]), |idx| if idx[0] == idx[1] { 1.0 } else { 0.0 })
}

/// Two states, actions "stay" (0) and "swap" (1).
pub fn swap_transition() -> ArrayD<f64> {
    array![[[1.0, 0.0], [0.0, 1.0]], [[0.0, 1.0], [1.0, 0.0]]].into_dyn()
}

/// Deterministic transitions where action `u` moves to state `u`.
pub fn goto_transition(n: usize) -> ArrayD<f64> {
    Array::from_shape_fn(IxDyn(&[n, n, n]), |idx| if idx[0] == idx[2] { 1.0 } else { 0.0 })
}

pub fn assert_normalized(beliefs: &Beliefs) {
    assert!(
        beliefs.is_normalized(1e-9),
        "every belief row should sum to one: {beliefs:?}"
    );
}
