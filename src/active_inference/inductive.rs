//! Inductive planning: backward reachability of goal states.
//!
//! `I[k, s] = 1` when a goal state is reachable from `s` in `k` steps under
//! some action. The inductive term of expected free energy penalises policies
//! whose predicted next state falls outside the set one step closer to the
//! goal than the current most likely state.

use ndarray::{Array1, Array2, Array3, ArrayD, ArrayView1, ArrayView2, ArrayViewD, Axis};
use rayon::prelude::*;

use crate::utils::{argmax, log_stable};

/// Reachability rows above this value count as reachable.
const REACH_CUTOFF: f64 = 0.1;

/// Backward reachability matrix of one factor, shape `(depth + 1, num_states)`.
///
/// `b` is one batch element of the factor's transition tensor
/// `(num_states, deps…, num_controls)`; `self_position` is the position of the
/// factor inside its own dependency list, if present. Transitions are
/// collapsed over actions and clipped at one before thresholding.
pub fn generate_i_matrix(
    h: ArrayView1<f64>,
    b: ArrayViewD<f64>,
    self_position: Option<usize>,
    threshold: f64,
    depth: usize,
) -> Array2<f64> {
    let ns = h.len();
    let action_axis = b.ndim() - 1;
    let collapsed = b.sum_axis(Axis(action_axis)).mapv(|x| x.min(1.0));

    // reach[next, prev]
    let mut reach = Array2::<f64>::zeros((ns, ns));
    for (idx, &value) in collapsed.indexed_iter() {
        if value <= threshold {
            continue;
        }
        let next = idx[0];
        match self_position {
            Some(position) => reach[[next, idx[1 + position]]] = 1.0,
            None => reach.row_mut(next).fill(1.0),
        }
    }

    let mut rows: Vec<Array1<f64>> = vec![h.to_owned()];
    for _ in 0..depth {
        let Some(previous) = rows.last() else {
            break;
        };
        let next = Array1::from_shape_fn(ns, |s| {
            let total: f64 = (0..ns).map(|k| reach[[k, s]] * previous[k]).sum();
            if total > REACH_CUTOFF { 1.0 } else { 0.0 }
        });
        rows.push(next);
    }

    Array2::from_shape_fn((rows.len(), ns), |(k, s)| rows[k][s])
}

/// Reachability matrices for every factor and batch element, shape
/// `(batch, depth + 1, num_states[f])` per factor.
pub(crate) fn batched_i_matrices(
    h: &[Array2<f64>],
    b: &[ArrayD<f64>],
    b_dependencies: &[Vec<usize>],
    threshold: &Array1<f64>,
    depth: usize,
) -> Vec<Array3<f64>> {
    h.iter()
        .zip(b)
        .zip(b_dependencies)
        .enumerate()
        .map(|(f, ((h_f, b_f), deps))| {
            let self_position = deps.iter().position(|&d| d == f);
            let rows: Vec<Array2<f64>> = (0..h_f.nrows())
                .into_par_iter()
                .map(|batch| {
                    generate_i_matrix(
                        h_f.row(batch),
                        b_f.index_axis(Axis(0), batch),
                        self_position,
                        threshold[batch],
                        depth,
                    )
                })
                .collect();
            Array3::from_shape_fn((rows.len(), depth + 1, h_f.ncols()), |(batch, k, s)| {
                rows[batch][[k, s]]
            })
        })
        .collect()
}

/// Inductive value of moving from beliefs `qs_current` to `qs_next`.
///
/// Factors whose most likely current state has no path to a goal contribute
/// nothing.
pub(crate) fn inductive_value(
    qs_current: &[Array1<f64>],
    qs_next: &[Array1<f64>],
    i: &[ArrayView2<f64>],
    epsilon: f64,
) -> f64 {
    let log_eps = log_stable(epsilon);
    let mut value = 0.0;
    for ((current, next), i_f) in qs_current.iter().zip(qs_next).zip(i) {
        let idx = argmax(current.view());
        let column = i_f.column(idx);
        let Some(first) = column.iter().position(|&x| x > 0.5) else {
            continue;
        };
        let steps = first.saturating_sub(1);
        value += i_f
            .row(steps)
            .iter()
            .zip(next)
            .map(|(&reachable, &q)| (1.0 - reachable) * log_eps * q)
            .sum::<f64>();
    }
    value
}
