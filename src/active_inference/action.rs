//! Action selection from the policy posterior.

use ndarray::{Array1, Array2, Array3, ArrayView1};
use rand::RngCore;

use super::types::{ActionSelection, SamplingMode};
use crate::{
    Error, Result,
    utils::{argmax, log_stable_vec, sample_categorical, softmax},
};

/// Actions chosen for every batch element.
#[derive(Debug, Clone, PartialEq)]
pub struct ActionSample {
    /// `(batch, num_factors)` flat action indices
    pub action: Array2<usize>,
    /// Per factor, `(batch, num_controls[f])` probabilities the action was read from
    pub probabilities: Vec<Array2<f64>>,
}

/// Per-factor marginals of the first-step action under `q_pi`.
pub(crate) fn action_marginals(
    q_pi: ArrayView1<f64>,
    policies: &Array3<usize>,
    num_controls: &[usize],
) -> Vec<Array1<f64>> {
    let mut marginals: Vec<Array1<f64>> = num_controls.iter().map(|&n| Array1::zeros(n)).collect();
    for (p, &weight) in q_pi.iter().enumerate() {
        for (f, marginal) in marginals.iter_mut().enumerate() {
            marginal[policies[[p, 0, f]]] += weight;
        }
    }
    marginals
}

/// `softmax(alpha · ln p)`
fn temper(p: ArrayView1<f64>, alpha: f64) -> Array1<f64> {
    softmax((log_stable_vec(p) * alpha).view())
}

/// Select one action per factor for a single batch element.
///
/// Returns the action and the per-factor distributions it was read from.
pub(crate) fn select_action(
    q_pi: ArrayView1<f64>,
    policies: &Array3<usize>,
    num_controls: &[usize],
    selection: ActionSelection,
    mode: SamplingMode,
    alpha: f64,
    rng: Option<&mut dyn RngCore>,
) -> Result<(Vec<usize>, Vec<Array1<f64>>)> {
    match mode {
        SamplingMode::Marginal => {
            let marginals = action_marginals(q_pi, policies, num_controls);
            match selection {
                ActionSelection::Deterministic => {
                    let action = marginals.iter().map(|m| argmax(m.view())).collect();
                    Ok((action, marginals))
                }
                ActionSelection::Stochastic => {
                    let rng = rng.ok_or(Error::MissingRandomSource)?;
                    let tempered: Vec<Array1<f64>> =
                        marginals.iter().map(|m| temper(m.view(), alpha)).collect();
                    let action = tempered
                        .iter()
                        .map(|p| sample_categorical(&mut *rng, p.view()))
                        .collect();
                    Ok((action, tempered))
                }
            }
        }
        SamplingMode::Full => {
            let (policy, distribution) = match selection {
                ActionSelection::Deterministic => (argmax(q_pi), q_pi.to_owned()),
                ActionSelection::Stochastic => {
                    let rng = rng.ok_or(Error::MissingRandomSource)?;
                    let tempered = temper(q_pi, alpha);
                    (sample_categorical(rng, tempered.view()), tempered)
                }
            };
            let action = (0..num_controls.len())
                .map(|f| policies[[policy, 0, f]])
                .collect();
            let marginals = action_marginals(distribution.view(), policies, num_controls);
            Ok((action, marginals))
        }
    }
}

/// Stack per-batch selections into an [`ActionSample`].
pub(crate) fn stack_selections(
    selections: Vec<(Vec<usize>, Vec<Array1<f64>>)>,
    num_controls: &[usize],
) -> ActionSample {
    let batch = selections.len();
    let num_factors = num_controls.len();
    let action = Array2::from_shape_fn((batch, num_factors), |(b, f)| selections[b].0[f]);
    let probabilities = num_controls
        .iter()
        .enumerate()
        .map(|(f, &n)| Array2::from_shape_fn((batch, n), |(b, u)| selections[b].1[f][u]))
        .collect();
    ActionSample {
        action,
        probabilities,
    }
}

/// Joint probability of every flat first-step action combination.
///
/// In marginal mode the per-factor marginals are treated as independent; in
/// full mode the joint is accumulated directly from the policies.
pub(crate) fn joint_action_probabilities(
    q_pi: ArrayView1<f64>,
    policies: &Array3<usize>,
    num_controls: &[usize],
    mode: SamplingMode,
) -> Array1<f64> {
    let total: usize = num_controls.iter().product();
    let mut joint = Array1::zeros(total);
    match mode {
        SamplingMode::Marginal => {
            let marginals = action_marginals(q_pi, policies, num_controls);
            for (index, slot) in joint.iter_mut().enumerate() {
                let combo = crate::utils::index_to_combination(index, num_controls);
                *slot = combo
                    .iter()
                    .zip(&marginals)
                    .map(|(&u, m)| m[u])
                    .product::<f64>();
            }
        }
        SamplingMode::Full => {
            for (p, &weight) in q_pi.iter().enumerate() {
                let combo: Vec<usize> = (0..num_controls.len())
                    .map(|f| policies[[p, 0, f]])
                    .collect();
                joint[crate::utils::combination_index(&combo, num_controls)] += weight;
            }
        }
    }
    joint
}

#[cfg(test)]
mod tests {
    use ndarray::array;
    use rand::{SeedableRng, rngs::StdRng};

    use super::*;
    use crate::active_inference::policies::construct_policies;

    #[test]
    fn marginals_sum_policy_mass_per_action() {
        let policies = construct_policies(&[2, 3], 1, &[0, 1]);
        let q_pi = array![0.1, 0.1, 0.1, 0.2, 0.2, 0.3];
        let marginals = action_marginals(q_pi.view(), &policies, &[2, 3]);
        assert!((marginals[0][0] - 0.3).abs() < 1e-12);
        assert!((marginals[0][1] - 0.7).abs() < 1e-12);
        assert!((marginals[1][2] - 0.4).abs() < 1e-12);
    }

    #[test]
    fn deterministic_full_mode_takes_first_step_of_best_policy() {
        let policies = construct_policies(&[3], 2, &[0]);
        let mut q_pi = Array1::from_elem(9, 0.05);
        q_pi[7] = 0.6;
        let (action, _) = select_action(
            q_pi.view(),
            &policies,
            &[3],
            ActionSelection::Deterministic,
            SamplingMode::Full,
            16.0,
            None,
        )
        .expect("deterministic selection needs no rng");
        assert_eq!(action, vec![policies[[7, 0, 0]]]);
    }

    #[test]
    fn stochastic_selection_without_rng_fails() {
        let policies = construct_policies(&[2], 1, &[0]);
        let result = select_action(
            array![0.5, 0.5].view(),
            &policies,
            &[2],
            ActionSelection::Stochastic,
            SamplingMode::Marginal,
            1.0,
            None,
        );
        assert!(matches!(result, Err(Error::MissingRandomSource)));
    }

    #[test]
    fn stochastic_selection_follows_the_posterior() {
        let policies = construct_policies(&[2], 1, &[0]);
        let mut rng = StdRng::seed_from_u64(7);
        let mut counts = [0usize; 2];
        for _ in 0..500 {
            let (action, probabilities) = select_action(
                array![0.8, 0.2].view(),
                &policies,
                &[2],
                ActionSelection::Stochastic,
                SamplingMode::Marginal,
                1.0,
                Some(&mut rng),
            )
            .expect("rng supplied");
            assert!((probabilities[0][0] - 0.8).abs() < 1e-9);
            counts[action[0]] += 1;
        }
        assert!(counts[0] > counts[1]);
    }

    #[test]
    fn joint_probabilities_agree_across_modes_for_independent_posterior() {
        let policies = construct_policies(&[2, 2], 1, &[0, 1]);
        // Product of [0.25, 0.75] and [0.4, 0.6]
        let q_pi = array![0.1, 0.15, 0.3, 0.45];
        let marginal =
            joint_action_probabilities(q_pi.view(), &policies, &[2, 2], SamplingMode::Marginal);
        let full = joint_action_probabilities(q_pi.view(), &policies, &[2, 2], SamplingMode::Full);
        for (m, f) in marginal.iter().zip(full.iter()) {
            assert!((m - f).abs() < 1e-12);
        }
    }
}
