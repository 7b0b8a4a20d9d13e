//! Distribution utilities shared by inference, planning and learning

use ndarray::{Array1, ArrayView1};
use rand::{
    Rng,
    distr::{Distribution, StandardUniform},
};

/// Floor applied to probabilities before taking logarithms.
pub const MIN_PROB: f64 = 1e-16;

/// Natural log with the argument clamped to [`MIN_PROB`].
///
/// # Examples
///
/// ```
/// use actinf::utils::log_stable;
///
/// assert!(log_stable(0.0).is_finite());
/// assert_eq!(log_stable(1.0), 0.0);
/// ```
pub fn log_stable(p: f64) -> f64 {
    p.max(MIN_PROB).ln()
}

/// Element-wise [`log_stable`].
pub fn log_stable_vec(p: ArrayView1<f64>) -> Array1<f64> {
    p.mapv(log_stable)
}

/// Numerically stable softmax (max-subtracted).
///
/// Falls back to a uniform vector when every logit is `-inf` or the input
/// is otherwise degenerate.
///
/// # Examples
///
/// ```
/// use actinf::utils::softmax;
/// use ndarray::array;
///
/// let p = softmax(array![1000.0, 1000.0].view());
/// assert!((p[0] - 0.5).abs() < 1e-12);
/// ```
pub fn softmax(logits: ArrayView1<f64>) -> Array1<f64> {
    let n = logits.len();
    let max = logits.fold(f64::NEG_INFINITY, |acc, &x| acc.max(x));
    if !max.is_finite() {
        return Array1::from_elem(n, 1.0 / n as f64);
    }
    let exp = logits.mapv(|x| (x - max).exp());
    let total = exp.sum();
    if !total.is_finite() || total <= 0.0 {
        return Array1::from_elem(n, 1.0 / n as f64);
    }
    exp / total
}

/// Calculate Shannon entropy from a probability distribution.
///
/// The Shannon entropy is calculated as: H = -Σ(p * ln(p)) for p > 0
///
/// # Examples
///
/// ```
/// use actinf::utils::shannon_entropy;
///
/// let entropy = shannon_entropy(vec![0.5, 0.5]);
/// assert!((entropy - std::f64::consts::LN_2).abs() < 0.001);
///
/// let entropy = shannon_entropy(vec![1.0, 0.0, 0.0]);
/// assert!(entropy.abs() < 0.001);
/// ```
pub fn shannon_entropy<I>(probabilities: I) -> f64
where
    I: IntoIterator<Item = f64>,
{
    probabilities
        .into_iter()
        .filter(|&p| p > 0.0)
        .map(|p| -p * p.ln())
        .sum()
}

/// Index of the largest entry; ties resolve to the first occurrence.
pub fn argmax(values: ArrayView1<f64>) -> usize {
    let mut best = 0;
    let mut best_value = f64::NEG_INFINITY;
    for (idx, &value) in values.iter().enumerate() {
        if value > best_value {
            best = idx;
            best_value = value;
        }
    }
    best
}

/// One-hot vector of length `n` with a one at `index`.
pub fn one_hot(index: usize, n: usize) -> Array1<f64> {
    let mut vector = Array1::zeros(n);
    if index < n {
        vector[index] = 1.0;
    }
    vector
}

/// Normalise non-negative weights to sum to one.
///
/// A zero or non-finite total yields the uniform distribution.
///
/// # Examples
///
/// ```
/// use actinf::utils::normalize_or_uniform;
///
/// assert_eq!(normalize_or_uniform([1.0, 2.0, 1.0]), vec![0.25, 0.5, 0.25]);
/// assert_eq!(normalize_or_uniform([0.0, 0.0]), vec![0.5, 0.5]);
/// ```
pub fn normalize_or_uniform<I>(weights: I) -> Vec<f64>
where
    I: IntoIterator<Item = f64>,
{
    let weights: Vec<f64> = weights.into_iter().collect();
    let sum: f64 = weights.iter().sum();
    if !sum.is_finite() || sum <= 0.0 {
        let uniform = 1.0 / weights.len().max(1) as f64;
        return vec![uniform; weights.len()];
    }
    weights.iter().map(|&w| w / sum).collect()
}

/// Draw an index with probability proportional to `weights`.
///
/// Non-positive total weight falls back to a uniform draw. The last index is
/// returned if rounding leaves the threshold uncrossed.
///
/// # Examples
///
/// ```
/// use rand::rngs::StdRng;
/// use rand::SeedableRng;
/// use actinf::utils::sample_categorical;
/// use ndarray::array;
///
/// let mut rng = StdRng::seed_from_u64(42);
/// let idx = sample_categorical(&mut rng, array![0.0, 1.0, 0.0].view());
/// assert_eq!(idx, 1);
/// ```
pub fn sample_categorical<R>(rng: &mut R, weights: ArrayView1<f64>) -> usize
where
    R: Rng + ?Sized,
{
    let n = weights.len();
    if n == 0 {
        return 0;
    }
    let total: f64 = weights.iter().filter(|w| w.is_finite()).sum();
    let ticket: f64 = StandardUniform.sample(rng);

    if total <= 0.0 {
        return ((ticket * n as f64) as usize).min(n - 1);
    }

    let mut threshold = ticket * total;
    for (idx, &weight) in weights.iter().enumerate() {
        if threshold < weight {
            return idx;
        }
        threshold -= weight;
    }
    n - 1
}

/// Mixed-radix (row-major) index of `values` within a grid of `dims`.
///
/// # Examples
///
/// ```
/// use actinf::utils::combination_index;
///
/// assert_eq!(combination_index(&[1, 2], &[3, 4]), 6);
/// ```
pub fn combination_index(values: &[usize], dims: &[usize]) -> usize {
    debug_assert_eq!(values.len(), dims.len());
    let mut index = 0;
    let mut product = 1;
    for (&value, &dim) in values.iter().zip(dims).rev() {
        index += value * product;
        product *= dim;
    }
    index
}

/// Inverse of [`combination_index`].
///
/// # Examples
///
/// ```
/// use actinf::utils::index_to_combination;
///
/// assert_eq!(index_to_combination(6, &[3, 4]), vec![1, 2]);
/// ```
pub fn index_to_combination(index: usize, dims: &[usize]) -> Vec<usize> {
    let mut remainder = index;
    let mut values = vec![0; dims.len()];
    for (slot, &base) in values.iter_mut().zip(dims).rev() {
        *slot = remainder % base;
        remainder /= base;
    }
    values
}
