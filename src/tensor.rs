//! Dependency-structured tensor contraction.
//!
//! Likelihood and transition tensors only carry axes for the hidden-state
//! factors they declare as dependencies. The helpers here contract those
//! axes against per-factor belief (or one-hot) vectors, so no operation ever
//! materialises the joint state space. All functions work on a single batch
//! element; batching happens one level up.

use ndarray::{Array1, ArrayD, ArrayView1, ArrayViewD, Axis, IxDyn};

/// Sum `tensor` along `axis`, weighting slice `k` by `weights[k]`.
pub fn contract_axis(
    tensor: ArrayViewD<f64>,
    axis: usize,
    weights: ArrayView1<f64>,
) -> ArrayD<f64> {
    debug_assert_eq!(tensor.len_of(Axis(axis)), weights.len());
    let mut shape = tensor.shape().to_vec();
    shape.remove(axis);
    let mut out = ArrayD::zeros(IxDyn(&shape));
    for (slice, &w) in tensor.axis_iter(Axis(axis)).zip(weights.iter()) {
        if w != 0.0 {
            out.scaled_add(w, &slice);
        }
    }
    out
}

/// Contract the trailing `factors.len()` axes of `tensor` against `factors`,
/// in order. Leading axes (observation or next-state axes) are kept.
///
/// An empty factor list is the identity.
///
/// # Examples
///
/// ```
/// use actinf::tensor::factor_dot;
/// use ndarray::{array, ArrayD};
///
/// let a: ArrayD<f64> = array![[0.9, 0.2], [0.1, 0.8]].into_dyn();
/// let q = array![1.0, 0.0];
/// let qo = factor_dot(a.view(), &[q.view()]);
/// assert_eq!(qo, array![0.9, 0.1].into_dyn());
/// ```
pub fn factor_dot(tensor: ArrayViewD<f64>, factors: &[ArrayView1<f64>]) -> ArrayD<f64> {
    debug_assert!(tensor.ndim() >= factors.len());
    let keep = tensor.ndim() - factors.len();
    let mut out = tensor.to_owned();
    for (offset, q) in factors.iter().enumerate().rev() {
        out = contract_axis(out.view(), keep + offset, *q);
    }
    out
}

/// Expected value of `tensor` under the product of `factors`, one per axis.
pub fn expectation(tensor: ArrayViewD<f64>, factors: &[ArrayView1<f64>]) -> f64 {
    debug_assert_eq!(tensor.ndim(), factors.len());
    factor_dot(tensor, factors).sum()
}

/// Contract every axis of `tensor` except `keep` against the matching
/// entry of `factors`, leaving a vector along axis `keep`.
pub fn marginalize_onto(
    tensor: ArrayViewD<f64>,
    factors: &[ArrayView1<f64>],
    keep: usize,
) -> Array1<f64> {
    debug_assert_eq!(tensor.ndim(), factors.len());
    let mut out = tensor.to_owned();
    // Highest axis first so lower axis indices stay valid.
    for axis in (0..factors.len()).rev() {
        if axis == keep {
            continue;
        }
        out = contract_axis(out.view(), axis, factors[axis]);
    }
    out.iter().copied().collect()
}

/// Multidimensional outer product `v0 ⊗ v1 ⊗ …`.
///
/// An empty list yields the zero-dimensional tensor `1.0`.
pub fn outer(vectors: &[ArrayView1<f64>]) -> ArrayD<f64> {
    let dims: Vec<usize> = vectors.iter().map(|v| v.len()).collect();
    ArrayD::from_shape_fn(IxDyn(&dims), |idx| {
        vectors
            .iter()
            .enumerate()
            .map(|(k, v)| v[idx[k]])
            .product::<f64>()
    })
}
