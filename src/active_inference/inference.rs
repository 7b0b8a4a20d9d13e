//! Fixed-point mean-field state inference and one-step state prediction.
//!
//! Functions here operate on one batch element. The agent fans them out
//! across the batch and stacks the results.

use ndarray::{Array1, Array2, ArrayD, ArrayView1, ArrayViewD, Axis};
use tracing::trace;

use crate::{
    app::FpiParams,
    tensor::{contract_axis, expectation, factor_dot, marginalize_onto},
    utils::{log_stable, log_stable_vec, one_hot, softmax},
};

/// One observation per modality, for every batch element.
#[derive(Debug, Clone, PartialEq)]
pub enum Observation {
    /// Outcome index of each batch element
    Indices(Vec<usize>),
    /// `(batch, num_obs)` distribution over outcomes
    Distribution(Array2<f64>),
}

impl Observation {
    /// Outcome vector of batch element `batch` with `num_obs` outcomes.
    pub(crate) fn vector(&self, batch: usize, num_obs: usize) -> Array1<f64> {
        match self {
            Observation::Indices(indices) => one_hot(indices[batch], num_obs),
            Observation::Distribution(dist) => dist.row(batch).to_owned(),
        }
    }
}

/// Result of one fixed-point run.
#[derive(Debug, Clone)]
pub(crate) struct FpiOutcome {
    pub posterior: Vec<Array1<f64>>,
    /// Free energy after every iteration, frozen once converged
    pub free_energy: Vec<f64>,
    /// Iteration at which the change in free energy first fell below tolerance
    pub converged_at: Option<usize>,
}

/// Blend a likelihood tensor and its observation with the uniform
/// distribution: `w·x + (1 − w)/num_obs`.
pub(crate) fn apply_mask(
    a: ArrayViewD<f64>,
    obs: &Array1<f64>,
    weight: f64,
) -> (ArrayD<f64>, Array1<f64>) {
    let num_obs = obs.len() as f64;
    let floor = (1.0 - weight) / num_obs;
    (a.mapv(|x| weight * x + floor), obs.mapv(|x| weight * x + floor))
}

/// `ln(A · o)`: log-likelihood of the observation over the modality's
/// dependency factors.
pub(crate) fn log_likelihood(a: ArrayViewD<f64>, obs: ArrayView1<f64>) -> ArrayD<f64> {
    contract_axis(a, 0, obs).mapv(log_stable)
}

/// Variational free energy of the factorised posterior `qs`.
pub(crate) fn variational_free_energy(
    qs: &[Array1<f64>],
    log_prior: &[Array1<f64>],
    log_likelihoods: &[ArrayD<f64>],
    a_dependencies: &[Vec<usize>],
) -> f64 {
    let complexity: f64 = qs
        .iter()
        .zip(log_prior)
        .map(|(q, ln_p)| {
            q.iter()
                .zip(ln_p)
                .map(|(&q, &ln_p)| q * (log_stable(q) - ln_p))
                .sum::<f64>()
        })
        .sum();
    let accuracy: f64 = log_likelihoods
        .iter()
        .zip(a_dependencies)
        .map(|(ll, deps)| {
            let factors: Vec<ArrayView1<f64>> = deps.iter().map(|&f| qs[f].view()).collect();
            expectation(ll.view(), &factors)
        })
        .sum();
    complexity - accuracy
}

/// Fixed-point iteration of the factorised posterior.
///
/// Every factor is updated in parallel from the previous iterate:
/// `ln q_f = ln prior_f + Σ_m E_{q \ f}[ln A_m · o_m]`. With early stopping on,
/// iterations after the free-energy change drops below `df_tol` leave the
/// posterior untouched; the iteration count itself never changes.
pub(crate) fn run_factorized_fpi(
    log_likelihoods: &[ArrayD<f64>],
    prior: &[ArrayView1<f64>],
    a_dependencies: &[Vec<usize>],
    params: &FpiParams,
) -> FpiOutcome {
    let log_prior: Vec<Array1<f64>> = prior.iter().map(|p| log_stable_vec(*p)).collect();
    let mut qs: Vec<Array1<f64>> = log_prior.iter().map(|ln_p| softmax(ln_p.view())).collect();
    let mut previous = variational_free_energy(&qs, &log_prior, log_likelihoods, a_dependencies);
    let mut df = params.df;
    let mut free_energy = Vec::with_capacity(params.num_iter);
    let mut converged_at = None;

    for iteration in 0..params.num_iter {
        if params.early_stopping && df < params.df_tol {
            free_energy.push(previous);
            continue;
        }

        let mut accumulated = log_prior.clone();
        for (ll, deps) in log_likelihoods.iter().zip(a_dependencies) {
            let factors: Vec<ArrayView1<f64>> = deps.iter().map(|&f| qs[f].view()).collect();
            for (position, &f) in deps.iter().enumerate() {
                accumulated[f] += &marginalize_onto(ll.view(), &factors, position);
            }
        }
        qs = accumulated.iter().map(|x| softmax(x.view())).collect();

        let current = variational_free_energy(&qs, &log_prior, log_likelihoods, a_dependencies);
        df = (previous - current).abs();
        previous = current;
        free_energy.push(current);
        trace!(iteration, free_energy = current, df, "fixed-point iteration");
        if df < params.df_tol && converged_at.is_none() {
            converged_at = Some(iteration);
        }
    }

    FpiOutcome {
        posterior: qs,
        free_energy,
        converged_at,
    }
}

/// Predicted next-state beliefs under one action per factor.
///
/// Each factor's transition slice for its action is contracted with the
/// beliefs over its dependency factors. Exact only for fully factorised
/// transitions.
pub(crate) fn compute_expected_state(
    qs: &[ArrayView1<f64>],
    b: &[ArrayViewD<f64>],
    action: &[usize],
    b_dependencies: &[Vec<usize>],
) -> Vec<Array1<f64>> {
    b.iter()
        .zip(b_dependencies)
        .enumerate()
        .map(|(f, (b_f, deps))| {
            let last = b_f.ndim() - 1;
            let slice = b_f.index_axis(Axis(last), action[f]);
            let factors: Vec<ArrayView1<f64>> = deps.iter().map(|&d| qs[d]).collect();
            factor_dot(slice, &factors).iter().copied().collect()
        })
        .collect()
}

/// Predicted outcome distributions under state beliefs `qs`.
pub(crate) fn compute_expected_obs(
    qs: &[Array1<f64>],
    a: &[ArrayViewD<f64>],
    a_dependencies: &[Vec<usize>],
) -> Vec<Array1<f64>> {
    a.iter()
        .zip(a_dependencies)
        .map(|(a_m, deps)| {
            let factors: Vec<ArrayView1<f64>> = deps.iter().map(|&f| qs[f].view()).collect();
            factor_dot(a_m.clone(), &factors).iter().copied().collect()
        })
        .collect()
}
