//! Expected free energy of policies.
//!
//! Every policy is rolled forward from the current beliefs for its full
//! horizon. At each step the predicted states and outcomes are scored by
//! utility, state information gain, parameter information gain (novelty) and
//! the inductive term; `G(π)` is the negated sum over steps, so lower is
//! better. The policy posterior is `softmax(−γ·G + ln E)`.

use ndarray::{Array1, Array2, ArrayD, ArrayView1, ArrayView2, Axis};
use rayon::prelude::*;
use tracing::debug;

use super::{
    Agent,
    generative_model::{ModelSlice, ModelStructure},
    inductive::inductive_value,
    inference::{compute_expected_obs, compute_expected_state},
};
use crate::{
    Result,
    app::{AgentConfig, SearchBudget},
    beliefs::Beliefs,
    dirichlet::novelty_weights,
    ports::{PolicyPosterior, PolicySearch},
    tensor::{expectation, factor_dot},
    utils::{log_stable, shannon_entropy, softmax},
};

/// Closed-form expected free energy over the enumerated policy set.
#[derive(Debug, Clone, Copy, Default)]
pub struct ExpectedFreeEnergy;

impl PolicySearch for ExpectedFreeEnergy {
    fn evaluate(
        &self,
        agent: &Agent,
        beliefs: &Beliefs,
        _budget: &SearchBudget,
    ) -> Result<PolicyPosterior> {
        agent.check_beliefs(beliefs)?;
        let model = agent.model();
        let structure = agent.structure();
        let batch = structure.batch_size;
        debug!(
            batch,
            num_policies = structure.num_policies(),
            policy_len = structure.policy_len(),
            "evaluating policies"
        );

        let rows: Vec<(Array1<f64>, Array1<f64>)> = (0..batch)
            .into_par_iter()
            .map(|b| {
                let qs: Vec<Array1<f64>> =
                    beliefs.slice(b).into_iter().map(|q| q.to_owned()).collect();
                PolicyEvaluator::new(model.slice(b), structure).posterior(&qs)
            })
            .collect();

        let num_policies = structure.num_policies();
        let q_pi = Array2::from_shape_fn((batch, num_policies), |(b, p)| rows[b].0[p]);
        let efe = Array2::from_shape_fn((batch, num_policies), |(b, p)| rows[b].1[p]);
        Ok(PolicyPosterior { q_pi, efe })
    }

    fn name(&self) -> &str {
        "expected-free-energy"
    }
}

/// Scores policies for one batch element.
///
/// Entropies of the likelihood columns and novelty weights do not depend on
/// the policy, so they are computed once up front.
pub(crate) struct PolicyEvaluator<'a> {
    slice: ModelSlice<'a>,
    structure: &'a ModelStructure,
    /// `H(A_m(·|s))` over the dependency states of modality `m`
    ambiguity: Vec<ArrayD<f64>>,
    pa_novelty: Option<Vec<ArrayD<f64>>>,
    pb_novelty: Option<Vec<ArrayD<f64>>>,
}

impl<'a> PolicyEvaluator<'a> {
    pub(crate) fn new(slice: ModelSlice<'a>, structure: &'a ModelStructure) -> Self {
        let config = &structure.config;
        let ambiguity = if config.use_states_info_gain {
            slice
                .a
                .iter()
                .map(|a| a.map_axis(Axis(0), |column| shannon_entropy(column.iter().copied())))
                .collect()
        } else {
            Vec::new()
        };
        let (pa_novelty, pb_novelty) = if config.use_param_info_gain {
            (
                slice.pa.as_ref().map(|pa| {
                    pa.iter()
                        .map(|p| novelty_weights(p.view(), Axis(0)))
                        .collect()
                }),
                slice.pb.as_ref().map(|pb| {
                    pb.iter()
                        .map(|p| novelty_weights(p.view(), Axis(0)))
                        .collect()
                }),
            )
        } else {
            (None, None)
        };

        Self {
            slice,
            structure,
            ambiguity,
            pa_novelty,
            pb_novelty,
        }
    }

    fn config(&self) -> &AgentConfig {
        &self.structure.config
    }

    /// Policy posterior and expected free energy of every policy.
    pub(crate) fn posterior(&self, qs: &[Array1<f64>]) -> (Array1<f64>, Array1<f64>) {
        let policies = &self.structure.policies;
        let efe: Array1<f64> = policies
            .outer_iter()
            .map(|policy| self.expected_free_energy(policy, qs))
            .collect();
        let logits = Array1::from_shape_fn(efe.len(), |p| {
            -self.slice.gamma * efe[p] + log_stable(self.slice.e[p])
        });
        (softmax(logits.view()), efe)
    }

    /// `G(π)` of a single `(policy_len, num_factors)` policy.
    pub(crate) fn expected_free_energy(&self, policy: ArrayView2<usize>, qs: &[Array1<f64>]) -> f64 {
        let structure = self.structure;
        let config = self.config();
        let mut value = 0.0;
        let mut current = qs.to_vec();

        for step in policy.outer_iter() {
            let action: Vec<usize> = step.to_vec();
            let views: Vec<ArrayView1<f64>> = current.iter().map(|q| q.view()).collect();
            let next =
                compute_expected_state(&views, &self.slice.b, &action, &structure.b_dependencies);
            let qo = compute_expected_obs(&next, &self.slice.a, &structure.a_dependencies);

            if config.use_utility {
                value += self.utility(&qo);
            }
            if config.use_states_info_gain {
                value += self.state_info_gain(&next, &qo);
            }
            if config.use_param_info_gain {
                value += self.pa_info_gain(&next, &qo);
                value += self.pb_info_gain(&next, &current, &action);
            }
            if config.use_inductive {
                value += inductive_value(qs, &next, &self.slice.i, self.slice.inductive_epsilon);
            }

            current = next;
        }

        -value
    }

    fn utility(&self, qo: &[Array1<f64>]) -> f64 {
        qo.iter().zip(&self.slice.c).map(|(qo, c)| qo.dot(c)).sum()
    }

    fn state_info_gain(&self, qs: &[Array1<f64>], qo: &[Array1<f64>]) -> f64 {
        qo.iter()
            .zip(&self.ambiguity)
            .zip(&self.structure.a_dependencies)
            .map(|((qo, ambiguity), deps)| {
                let factors: Vec<ArrayView1<f64>> = deps.iter().map(|&f| qs[f].view()).collect();
                shannon_entropy(qo.iter().copied()) - expectation(ambiguity.view(), &factors)
            })
            .sum()
    }

    fn pa_info_gain(&self, qs: &[Array1<f64>], qo: &[Array1<f64>]) -> f64 {
        let Some(novelty) = &self.pa_novelty else {
            return 0.0;
        };
        novelty
            .iter()
            .zip(qo)
            .zip(&self.structure.a_dependencies)
            .map(|((w, qo), deps)| {
                let factors: Vec<ArrayView1<f64>> = deps.iter().map(|&f| qs[f].view()).collect();
                let expected = factor_dot(w.view(), &factors);
                -qo.iter().zip(expected.iter()).map(|(q, w)| q * w).sum::<f64>()
            })
            .sum()
    }

    fn pb_info_gain(&self, next: &[Array1<f64>], previous: &[Array1<f64>], action: &[usize]) -> f64 {
        let Some(novelty) = &self.pb_novelty else {
            return 0.0;
        };
        novelty
            .iter()
            .enumerate()
            .zip(&self.structure.b_dependencies)
            .map(|((f, w), deps)| {
                let last = w.ndim() - 1;
                let w_u = w.index_axis(Axis(last), action[f]);
                let factors: Vec<ArrayView1<f64>> =
                    deps.iter().map(|&d| previous[d].view()).collect();
                let expected = factor_dot(w_u, &factors);
                -next[f]
                    .iter()
                    .zip(expected.iter())
                    .map(|(q, w)| q * w)
                    .sum::<f64>()
            })
            .sum()
    }
}
