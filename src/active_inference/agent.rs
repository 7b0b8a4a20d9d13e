//! The batched active inference agent.
//!
//! An [`Agent`] is an immutable value: inference, planning and action
//! selection read it, and learning returns a new agent that shares the same
//! [`ModelStructure`].

use std::sync::Arc;

use ndarray::{Array1, Array2, Array3, ArrayD, ArrayView1, ArrayView2, Axis, stack};
use rand::RngCore;
use rayon::prelude::*;
use tracing::debug;

use super::{
    action::{ActionSample, joint_action_probabilities, select_action, stack_selections},
    builder::AgentBuilder,
    generative_model::{GenerativeModel, ModelStructure},
    inductive::batched_i_matrices,
    inference::{
        FpiOutcome, Observation, apply_mask, compute_expected_state, log_likelihood,
        run_factorized_fpi,
    },
    learning::{update_likelihood_counts, update_transition_counts},
};
use crate::{
    Error, Result,
    app::AgentConfig,
    beliefs::Beliefs,
    dirichlet::dirichlet_expected_value,
    ports::{PolicyPosterior, PolicySearch},
    utils::{combination_index, index_to_combination},
};

/// Posterior beliefs together with the free energy of every iteration.
#[derive(Debug, Clone, PartialEq)]
pub struct InferenceResult {
    pub posterior: Beliefs,
    /// `(batch, num_iter)`
    pub free_energy: Array2<f64>,
}

#[derive(Debug, Clone)]
pub struct Agent {
    model: GenerativeModel,
    structure: Arc<ModelStructure>,
    policy_search: Arc<dyn PolicySearch>,
}

impl Agent {
    /// Start building an agent from likelihood and transition tensors.
    pub fn builder(a: Vec<ArrayD<f64>>, b: Vec<ArrayD<f64>>) -> AgentBuilder {
        AgentBuilder::new(a, b)
    }

    pub(crate) fn from_parts(
        model: GenerativeModel,
        structure: Arc<ModelStructure>,
        policy_search: Arc<dyn PolicySearch>,
    ) -> Self {
        Self {
            model,
            structure,
            policy_search,
        }
    }

    pub fn model(&self) -> &GenerativeModel {
        &self.model
    }

    pub fn structure(&self) -> &ModelStructure {
        &self.structure
    }

    /// Shared handle to the static structure.
    pub fn structure_handle(&self) -> Arc<ModelStructure> {
        Arc::clone(&self.structure)
    }

    pub fn config(&self) -> &AgentConfig {
        &self.structure.config
    }

    pub fn batch_size(&self) -> usize {
        self.structure.batch_size
    }

    pub fn policies(&self) -> &Array3<usize> {
        &self.structure.policies
    }

    /// Initial-state priors `D` as beliefs.
    pub fn initial_prior(&self) -> Beliefs {
        Beliefs::from_matrices(self.model.d.clone())
    }

    /// Posterior over hidden states given one observation per modality.
    ///
    /// `mask` holds one weight in `[0, 1]` per modality; weight zero makes the
    /// modality uninformative.
    ///
    /// # Errors
    ///
    /// Returns an error if observations, prior or mask do not match the model.
    pub fn infer_states(
        &self,
        observations: &[Observation],
        empirical_prior: &Beliefs,
        mask: Option<&[f64]>,
    ) -> Result<Beliefs> {
        Ok(self
            .infer_states_with_trace(observations, empirical_prior, mask)?
            .posterior)
    }

    /// [`infer_states`](Self::infer_states) that also returns the free-energy trace.
    pub fn infer_states_with_trace(
        &self,
        observations: &[Observation],
        empirical_prior: &Beliefs,
        mask: Option<&[f64]>,
    ) -> Result<InferenceResult> {
        self.check_observations(observations)?;
        self.check_beliefs(empirical_prior)?;
        if let Some(weights) = mask {
            if weights.len() != self.structure.num_modalities() {
                return Err(Error::LengthMismatch {
                    what: "mask weights".to_string(),
                    expected: self.structure.num_modalities(),
                    got: weights.len(),
                });
            }
            if let Some(&w) = weights.iter().find(|w| !(0.0..=1.0).contains(*w)) {
                return Err(Error::config(format!("mask weight {w} is outside [0, 1]")));
            }
        }

        let structure = &*self.structure;
        let params = &structure.config.inference;
        let outcomes: Vec<FpiOutcome> = (0..structure.batch_size)
            .into_par_iter()
            .map(|b| {
                let log_likelihoods: Vec<ArrayD<f64>> = self
                    .model
                    .a
                    .iter()
                    .zip(observations)
                    .enumerate()
                    .map(|(m, (a_m, obs))| {
                        let a_m = a_m.index_axis(Axis(0), b);
                        let o = obs.vector(b, structure.num_obs[m]);
                        match mask {
                            Some(weights) => {
                                let (a_masked, o_masked) = apply_mask(a_m, &o, weights[m]);
                                log_likelihood(a_masked.view(), o_masked.view())
                            }
                            None => log_likelihood(a_m, o.view()),
                        }
                    })
                    .collect();
                run_factorized_fpi(
                    &log_likelihoods,
                    &empirical_prior.slice(b),
                    &structure.a_dependencies,
                    params,
                )
            })
            .collect();

        let converged = outcomes.iter().filter(|o| o.converged_at.is_some()).count();
        debug!(
            batch = structure.batch_size,
            num_iter = params.num_iter,
            converged,
            "inferred hidden states"
        );

        let posterior: Vec<Vec<Array1<f64>>> =
            outcomes.iter().map(|o| o.posterior.clone()).collect();
        let num_iter = params.num_iter;
        let free_energy = Array2::from_shape_fn((outcomes.len(), num_iter), |(b, k)| {
            outcomes[b].free_energy[k]
        });
        Ok(InferenceResult {
            posterior: Beliefs::from_batch_slices(&posterior),
            free_energy,
        })
    }

    /// Predicted beliefs after taking `action` (`(batch, num_factors)`) from `qs`.
    pub fn infer_empirical_prior(&self, action: &Array2<usize>, qs: &Beliefs) -> Result<Beliefs> {
        self.check_beliefs(qs)?;
        self.check_actions(action.view(), &self.structure.num_controls, "action")?;

        let structure = &*self.structure;
        let predicted: Vec<Vec<Array1<f64>>> = (0..structure.batch_size)
            .into_par_iter()
            .map(|b| {
                let b_slices: Vec<_> = self
                    .model
                    .b
                    .iter()
                    .map(|b_f| b_f.index_axis(Axis(0), b))
                    .collect();
                let step: Vec<usize> = action.row(b).to_vec();
                compute_expected_state(&qs.slice(b), &b_slices, &step, &structure.b_dependencies)
            })
            .collect();
        Ok(Beliefs::from_batch_slices(&predicted))
    }

    /// Posterior over policies from the configured backend.
    pub fn infer_policies(&self, qs: &Beliefs) -> Result<PolicyPosterior> {
        self.policy_search
            .evaluate(self, qs, &self.structure.config.search_budget)
    }

    /// Select an action for every batch element.
    ///
    /// # Errors
    ///
    /// Returns [`Error::MissingRandomSource`] when selection is stochastic and
    /// `rng` is `None`.
    pub fn sample_action(
        &self,
        q_pi: &Array2<f64>,
        mut rng: Option<&mut dyn RngCore>,
    ) -> Result<ActionSample> {
        self.check_policy_posterior(q_pi)?;
        let structure = &*self.structure;
        let config = &structure.config;

        let mut selections = Vec::with_capacity(structure.batch_size);
        for (b, row) in q_pi.outer_iter().enumerate() {
            let rng_b = rng.as_mut().map(|r| &mut **r as &mut dyn RngCore);
            selections.push(select_action(
                row,
                &structure.policies,
                &structure.num_controls,
                config.action_selection,
                config.sampling_mode,
                self.model.alpha[b],
                rng_b,
            )?);
        }
        Ok(stack_selections(selections, &structure.num_controls))
    }

    /// Every joint first-step action over the multi-action factors, in
    /// mixed-radix order.
    pub fn unique_multiactions(&self) -> Vec<Vec<usize>> {
        let dims = &self.structure.num_controls_multi;
        let total: usize = dims.iter().product();
        (0..total)
            .map(|index| index_to_combination(index, dims))
            .collect()
    }

    /// `(batch, len(unique_multiactions))` probability of each joint action.
    pub fn multiaction_probabilities(&self, q_pi: &Array2<f64>) -> Result<Array2<f64>> {
        self.check_policy_posterior(q_pi)?;
        let structure = &*self.structure;
        let rows: Vec<Array1<f64>> = q_pi
            .outer_iter()
            .map(|row| match &structure.action_maps {
                Some(_) => self.multiaction_joint(row),
                None => joint_action_probabilities(
                    row,
                    &structure.policies,
                    &structure.num_controls,
                    structure.config.sampling_mode,
                ),
            })
            .collect();
        let width = rows.first().map(Array1::len).unwrap_or(0);
        Ok(Array2::from_shape_fn((rows.len(), width), |(b, k)| rows[b][k]))
    }

    fn multiaction_joint(&self, q_pi: ArrayView1<f64>) -> Array1<f64> {
        let structure = &*self.structure;
        let dims = &structure.num_controls_multi;
        let mut joint = Array1::zeros(dims.iter().product::<usize>());
        for (p, &weight) in q_pi.iter().enumerate() {
            let flat: Vec<usize> = structure
                .policies
                .index_axis(Axis(0), p)
                .row(0)
                .to_vec();
            joint[combination_index(&self.decode_one(&flat), dims)] += weight;
        }
        joint
    }

    /// Translate `(batch, num_multi_factors)` multi-actions into flat actions.
    pub fn encode_multi_actions(&self, multi: &Array2<usize>) -> Result<Array2<usize>> {
        let Some(maps) = &self.structure.action_maps else {
            return Ok(multi.clone());
        };
        self.check_actions(multi.view(), &self.structure.num_controls_multi, "multi-action")?;
        Ok(Array2::from_shape_fn(
            (multi.nrows(), maps.len()),
            |(b, f)| {
                let row: Vec<usize> = multi.row(b).to_vec();
                maps[f].encode(&row)
            },
        ))
    }

    /// Inverse of [`encode_multi_actions`](Self::encode_multi_actions).
    pub fn decode_multi_actions(&self, flat: &Array2<usize>) -> Result<Array2<usize>> {
        if self.structure.action_maps.is_none() {
            return Ok(flat.clone());
        }
        self.check_actions(flat.view(), &self.structure.num_controls, "action")?;
        let rows: Vec<Vec<usize>> = flat
            .outer_iter()
            .map(|row| self.decode_one(&row.to_vec()))
            .collect();
        let width = self.structure.num_controls_multi.len();
        Ok(Array2::from_shape_fn((rows.len(), width), |(b, k)| {
            rows[b][k]
        }))
    }

    fn decode_one(&self, flat: &[usize]) -> Vec<usize> {
        let mut multi = vec![0; self.structure.num_controls_multi.len()];
        if let Some(maps) = &self.structure.action_maps {
            for (map, &value) in maps.iter().zip(flat) {
                map.decode(value, &mut multi);
            }
        }
        multi
    }

    /// Learn `pA` and `pB` from a history and return the updated agent.
    ///
    /// * `beliefs_a[t]`: posteriors used for likelihood learning at time `t`.
    /// * `outcomes[m]`: `(batch, T)` observed outcome indices of modality `m`.
    /// * `actions`: `(batch, T_b − 1, num_factors)` flat actions between steps.
    /// * `beliefs_b`: posteriors for transition learning; defaults to `beliefs_a`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidConfiguration`] when learning is enabled for a
    /// tensor without Dirichlet counts, and length or range errors for
    /// inconsistent histories.
    pub fn infer_parameters(
        &self,
        beliefs_a: &[Beliefs],
        outcomes: &[Array2<usize>],
        actions: &Array3<usize>,
        beliefs_b: Option<&[Beliefs]>,
        lr_pa: f64,
        lr_pb: f64,
    ) -> Result<Agent> {
        let structure = &*self.structure;
        let config = &structure.config;
        let batch = structure.batch_size;

        let learn_a = config.learn_a;
        let learn_b = config.learn_b;
        if learn_a && self.model.pa.is_none() {
            return Err(Error::config("learning A requires Dirichlet counts pA"));
        }
        if learn_b && self.model.pb.is_none() {
            return Err(Error::config("learning B requires Dirichlet counts pB"));
        }
        for beliefs in beliefs_a {
            self.check_beliefs(beliefs)?;
        }
        let beliefs_b = beliefs_b.unwrap_or(beliefs_a);
        for beliefs in beliefs_b {
            self.check_beliefs(beliefs)?;
        }

        if learn_a {
            self.check_outcomes(outcomes, beliefs_a.len())?;
        }
        if learn_b {
            let steps = beliefs_b.len().saturating_sub(1);
            let expected = [batch, steps, structure.num_factors()];
            if actions.shape() != expected {
                return Err(Error::TensorShapeMismatch {
                    tensor: "actions".to_string(),
                    expected: expected.to_vec(),
                    got: actions.shape().to_vec(),
                });
            }
            for ((_, _, f), &action) in actions.indexed_iter() {
                if action >= structure.num_controls[f] {
                    return Err(Error::ActionOutOfRange {
                        factor: f,
                        action,
                        num_controls: structure.num_controls[f],
                    });
                }
            }
        }

        let mut model = self.model.clone();

        if let (true, Some(pa)) = (learn_a, &self.model.pa) {
            let per_batch: Vec<Vec<ArrayD<f64>>> = (0..batch)
                .into_par_iter()
                .map(|b| {
                    let history: Vec<Vec<ArrayView1<f64>>> =
                        beliefs_a.iter().map(|q| q.slice(b)).collect();
                    pa.iter()
                        .enumerate()
                        .map(|(m, pa_m)| {
                            update_likelihood_counts(
                                pa_m.index_axis(Axis(0), b),
                                outcomes[m].row(b),
                                &history,
                                &structure.a_dependencies[m],
                                lr_pa,
                            )
                        })
                        .collect()
                })
                .collect();
            let updated = stack_per_tensor(&per_batch, pa.len())?;
            model.a = updated
                .iter()
                .map(|p| dirichlet_expected_value(p.view(), Axis(1)))
                .collect();
            model.pa = Some(updated);
        }

        if let (true, Some(pb)) = (learn_b, &self.model.pb) {
            let per_batch: Vec<Vec<ArrayD<f64>>> = (0..batch)
                .into_par_iter()
                .map(|b| {
                    let history: Vec<Vec<ArrayView1<f64>>> =
                        beliefs_b.iter().map(|q| q.slice(b)).collect();
                    let taken = actions.index_axis(Axis(0), b);
                    pb.iter()
                        .enumerate()
                        .map(|(f, pb_f)| {
                            update_transition_counts(
                                pb_f.index_axis(Axis(0), b),
                                f,
                                taken.column(f),
                                &history,
                                &structure.b_dependencies[f],
                                lr_pb,
                            )
                        })
                        .collect()
                })
                .collect();
            let updated = stack_per_tensor(&per_batch, pb.len())?;
            model.b = updated
                .iter()
                .map(|p| dirichlet_expected_value(p.view(), Axis(1)))
                .collect();
            model.pb = Some(updated);

            if let (true, Some(h)) = (config.use_inductive, &model.h) {
                model.i = batched_i_matrices(
                    h,
                    &model.b,
                    &structure.b_dependencies,
                    &model.inductive_threshold,
                    config.inductive_depth,
                );
            }
        }

        for (enabled, name) in [
            (config.learn_c, "C"),
            (config.learn_d, "D"),
            (config.learn_e, "E"),
        ] {
            if enabled {
                debug!(tensor = name, "no update rule for this tensor; left unchanged");
            }
        }
        debug!(
            learned_a = learn_a,
            learned_b = learn_b,
            lr_pa,
            lr_pb,
            "updated model parameters"
        );

        Ok(Agent {
            model,
            structure: Arc::clone(&self.structure),
            policy_search: Arc::clone(&self.policy_search),
        })
    }

    /// Reject beliefs whose factors, state counts or batch size disagree with the model.
    pub(crate) fn check_beliefs(&self, beliefs: &Beliefs) -> Result<()> {
        let structure = &*self.structure;
        if beliefs.num_factors() != structure.num_factors() {
            return Err(Error::LengthMismatch {
                what: "belief factors".to_string(),
                expected: structure.num_factors(),
                got: beliefs.num_factors(),
            });
        }
        for (f, q) in beliefs.factors().iter().enumerate() {
            let expected = [structure.batch_size, structure.num_states[f]];
            if q.shape() != expected {
                return Err(Error::TensorShapeMismatch {
                    tensor: format!("beliefs[{f}]"),
                    expected: expected.to_vec(),
                    got: q.shape().to_vec(),
                });
            }
        }
        Ok(())
    }

    fn check_observations(&self, observations: &[Observation]) -> Result<()> {
        let structure = &*self.structure;
        if observations.len() != structure.num_modalities() {
            return Err(Error::LengthMismatch {
                what: "observation modalities".to_string(),
                expected: structure.num_modalities(),
                got: observations.len(),
            });
        }
        for (m, obs) in observations.iter().enumerate() {
            let num_obs = structure.num_obs[m];
            match obs {
                Observation::Indices(indices) => {
                    if indices.len() != structure.batch_size {
                        return Err(Error::LengthMismatch {
                            what: format!("observations of modality {m}"),
                            expected: structure.batch_size,
                            got: indices.len(),
                        });
                    }
                    if let Some(&observation) = indices.iter().find(|&&o| o >= num_obs) {
                        return Err(Error::ObservationOutOfRange {
                            modality: m,
                            observation,
                            num_obs,
                        });
                    }
                }
                Observation::Distribution(dist) => {
                    let expected = [structure.batch_size, num_obs];
                    if dist.shape() != expected {
                        return Err(Error::TensorShapeMismatch {
                            tensor: format!("observation[{m}]"),
                            expected: expected.to_vec(),
                            got: dist.shape().to_vec(),
                        });
                    }
                }
            }
        }
        Ok(())
    }

    fn check_outcomes(&self, outcomes: &[Array2<usize>], steps: usize) -> Result<()> {
        let structure = &*self.structure;
        if outcomes.len() != structure.num_modalities() {
            return Err(Error::LengthMismatch {
                what: "outcome modalities".to_string(),
                expected: structure.num_modalities(),
                got: outcomes.len(),
            });
        }
        for (m, o) in outcomes.iter().enumerate() {
            let expected = [structure.batch_size, steps];
            if o.shape() != expected {
                return Err(Error::TensorShapeMismatch {
                    tensor: format!("outcomes[{m}]"),
                    expected: expected.to_vec(),
                    got: o.shape().to_vec(),
                });
            }
            if let Some(&observation) = o.iter().find(|&&x| x >= structure.num_obs[m]) {
                return Err(Error::ObservationOutOfRange {
                    modality: m,
                    observation,
                    num_obs: structure.num_obs[m],
                });
            }
        }
        Ok(())
    }

    fn check_actions(
        &self,
        actions: ArrayView2<usize>,
        limits: &[usize],
        what: &str,
    ) -> Result<()> {
        let expected = [self.structure.batch_size, limits.len()];
        if actions.shape() != expected {
            return Err(Error::TensorShapeMismatch {
                tensor: what.to_string(),
                expected: expected.to_vec(),
                got: actions.shape().to_vec(),
            });
        }
        for ((_, f), &action) in actions.indexed_iter() {
            if action >= limits[f] {
                return Err(Error::ActionOutOfRange {
                    factor: f,
                    action,
                    num_controls: limits[f],
                });
            }
        }
        Ok(())
    }

    fn check_policy_posterior(&self, q_pi: &Array2<f64>) -> Result<()> {
        let expected = [self.structure.batch_size, self.structure.num_policies()];
        if q_pi.shape() != expected {
            return Err(Error::TensorShapeMismatch {
                tensor: "q_pi".to_string(),
                expected: expected.to_vec(),
                got: q_pi.shape().to_vec(),
            });
        }
        Ok(())
    }
}

/// Stack `per_batch[b][k]` into one batched tensor per `k`.
fn stack_per_tensor(per_batch: &[Vec<ArrayD<f64>>], count: usize) -> Result<Vec<ArrayD<f64>>> {
    (0..count)
        .map(|k| {
            let views: Vec<_> = per_batch.iter().map(|tensors| tensors[k].view()).collect();
            Ok(stack(Axis(0), &views)?)
        })
        .collect()
}
