//! Dirichlet pseudo-count helpers.
//!
//! Conditional categorical tensors (`A`, `B`) are stored alongside Dirichlet
//! counts (`pA`, `pB`) whose normalised value along the outcome axis gives the
//! expected tensor. The novelty weights feed the parameter information gain
//! term of expected free energy.

use ndarray::{ArrayD, ArrayViewD, Axis};

use crate::utils::{MIN_PROB, normalize_or_uniform};

/// Expected value of a tensor of Dirichlet counts, normalising every lane
/// along `axis`. Lanes with no mass become uniform.
///
/// # Examples
///
/// ```
/// use actinf::dirichlet::dirichlet_expected_value;
/// use ndarray::{array, Axis};
///
/// let counts = array![[1.0, 0.0], [3.0, 0.0]].into_dyn();
/// let expected = dirichlet_expected_value(counts.view(), Axis(0));
/// assert_eq!(expected, array![[0.25, 0.5], [0.75, 0.5]].into_dyn());
/// ```
pub fn dirichlet_expected_value(counts: ArrayViewD<f64>, axis: Axis) -> ArrayD<f64> {
    let mut out = counts.to_owned();
    for mut lane in out.lanes_mut(axis) {
        let normalized = normalize_or_uniform(lane.iter().copied());
        for (slot, value) in lane.iter_mut().zip(normalized) {
            *slot = value;
        }
    }
    out
}

/// Novelty weights `1/Σα − 1/α` for every positive count, zero elsewhere,
/// computed along `axis`.
///
/// The weights are non-positive; their magnitude shrinks as counts grow, so
/// well-explored parameters contribute little information gain.
pub fn novelty_weights(counts: ArrayViewD<f64>, axis: Axis) -> ArrayD<f64> {
    let mut out = counts.to_owned();
    for mut lane in out.lanes_mut(axis) {
        let total: f64 = lane.iter().map(|&a| a.max(MIN_PROB)).sum();
        for value in lane.iter_mut() {
            *value = if *value > 0.0 {
                1.0 / total - 1.0 / value.max(MIN_PROB)
            } else {
                0.0
            };
        }
    }
    out
}
