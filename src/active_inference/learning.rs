//! Dirichlet learning of likelihood and transition tensors.
//!
//! Counts accumulate outer products of one-hot outcomes (or actions) with
//! the posterior beliefs over each tensor's dependency factors. The updated
//! tensors are the normalised expected values of the new counts.

use ndarray::{ArrayD, ArrayView1, ArrayViewD};

use crate::{tensor::outer, utils::one_hot};

/// `pA_m + lr · Σ_t onehot(o_t) ⊗ q_{deps,t}` for one batch element.
///
/// `beliefs[t][f]` is the posterior over factor `f` at time `t`.
pub(crate) fn update_likelihood_counts(
    pa: ArrayViewD<f64>,
    outcomes: ArrayView1<usize>,
    beliefs: &[Vec<ArrayView1<f64>>],
    dependencies: &[usize],
    lr: f64,
) -> ArrayD<f64> {
    let num_obs = pa.shape()[0];
    let mut updated = pa.to_owned();
    for (&outcome, qs) in outcomes.iter().zip(beliefs) {
        let observed = one_hot(outcome, num_obs);
        let mut vectors = vec![observed.view()];
        vectors.extend(dependencies.iter().map(|&f| qs[f].view()));
        updated.scaled_add(lr, &outer(&vectors));
    }
    updated
}

/// `pB_f + lr · Σ_{t≥1} q_{f,t} ⊗ q_{deps,t−1} ⊗ onehot(a_{f,t−1})` for one
/// batch element. `actions[t]` is the action taken on this factor between
/// `t` and `t + 1`.
pub(crate) fn update_transition_counts(
    pb: ArrayViewD<f64>,
    factor: usize,
    actions: ArrayView1<usize>,
    beliefs: &[Vec<ArrayView1<f64>>],
    dependencies: &[usize],
    lr: f64,
) -> ArrayD<f64> {
    let num_controls = pb.shape()[pb.ndim() - 1];
    let mut updated = pb.to_owned();
    for (t, &action) in actions.iter().enumerate() {
        let (Some(previous), Some(current)) = (beliefs.get(t), beliefs.get(t + 1)) else {
            break;
        };
        let taken = one_hot(action, num_controls);
        let mut vectors = vec![current[factor].view()];
        vectors.extend(dependencies.iter().map(|&d| previous[d].view()));
        vectors.push(taken.view());
        updated.scaled_add(lr, &outer(&vectors));
    }
    updated
}
