//! Builder for [`Agent`] construction
//!
//! Tensors are supplied without a batch axis and broadcast to `batch_size`,
//! or already batched via [`AgentBuilder::pre_batched`]. Everything that is
//! not supplied takes its default: uniform `C`, `D` and `E`, full likelihood
//! dependencies, self-only transition dependencies, and the policy set
//! enumerated over every factor with more than one action.

use std::sync::Arc;

use ndarray::{Array1, Array2, Array3, ArrayD, Axis, Ix2, Ix3, IxDyn};
use tracing::debug;

use super::{
    Agent,
    evaluation::ExpectedFreeEnergy,
    generative_model::{GenerativeModel, ModelStructure, validate, validate_inductive},
    inductive::batched_i_matrices,
    policies::{ActionMap, construct_policies, flatten_action_axes, flatten_policies},
    types::{ControlAlgo, SamplingMode},
};
use crate::{Error, Result, app::AgentConfig, ports::PolicySearch};

/// Builder for constructing [`Agent`] instances.
///
/// # Examples
///
/// ```
/// use actinf::{Agent, app::AgentConfig};
/// use ndarray::array;
///
/// // One factor, two states, two actions (stay, swap), identity observation.
/// let a = array![[1.0, 0.0], [0.0, 1.0]].into_dyn();
/// let b = array![[[1.0, 0.0], [0.0, 1.0]], [[0.0, 1.0], [1.0, 0.0]]].into_dyn();
///
/// let agent = Agent::builder(vec![a], vec![b])
///     .c(vec![array![2.0, 0.0].into_dyn()])
///     .batch_size(4)
///     .config(AgentConfig::default().with_policy_len(2))
///     .build()?;
/// assert_eq!(agent.structure().num_policies(), 4);
/// assert_eq!(agent.batch_size(), 4);
/// # Ok::<(), actinf::Error>(())
/// ```
#[derive(Debug)]
pub struct AgentBuilder {
    a: Vec<ArrayD<f64>>,
    b: Vec<ArrayD<f64>>,
    c: Option<Vec<ArrayD<f64>>>,
    d: Option<Vec<ArrayD<f64>>>,
    e: Option<ArrayD<f64>>,
    pa: Option<Vec<ArrayD<f64>>>,
    pb: Option<Vec<ArrayD<f64>>>,
    h: Option<Vec<ArrayD<f64>>>,
    i: Option<Vec<ArrayD<f64>>>,
    a_dependencies: Option<Vec<Vec<usize>>>,
    b_dependencies: Option<Vec<Vec<usize>>>,
    b_action_dependencies: Option<Vec<Vec<usize>>>,
    num_controls: Option<Vec<usize>>,
    control_fac_idx: Option<Vec<usize>>,
    policies: Option<Array3<usize>>,
    config: AgentConfig,
    batch_size: usize,
    pre_batched: bool,
    policy_search: Option<Arc<dyn PolicySearch>>,
}

impl AgentBuilder {
    /// Start from likelihood tensors `a` and transition tensors `b`.
    pub fn new(a: Vec<ArrayD<f64>>, b: Vec<ArrayD<f64>>) -> Self {
        Self {
            a,
            b,
            c: None,
            d: None,
            e: None,
            pa: None,
            pb: None,
            h: None,
            i: None,
            a_dependencies: None,
            b_dependencies: None,
            b_action_dependencies: None,
            num_controls: None,
            control_fac_idx: None,
            policies: None,
            config: AgentConfig::default(),
            batch_size: 1,
            pre_batched: false,
            policy_search: None,
        }
    }

    /// Log-preferences over outcomes, one vector per modality.
    pub fn c(mut self, c: Vec<ArrayD<f64>>) -> Self {
        self.c = Some(c);
        self
    }

    /// Initial-state priors, one vector per factor.
    pub fn d(mut self, d: Vec<ArrayD<f64>>) -> Self {
        self.d = Some(d);
        self
    }

    /// Prior over policies.
    pub fn e(mut self, e: ArrayD<f64>) -> Self {
        self.e = Some(e);
        self
    }

    /// Dirichlet counts over the likelihood tensors.
    pub fn pa(mut self, pa: Vec<ArrayD<f64>>) -> Self {
        self.pa = Some(pa);
        self
    }

    /// Dirichlet counts over the transition tensors.
    pub fn pb(mut self, pb: Vec<ArrayD<f64>>) -> Self {
        self.pb = Some(pb);
        self
    }

    /// Goal-state indicators; reachability matrices are derived from them
    /// when inductive inference is enabled.
    pub fn h(mut self, h: Vec<ArrayD<f64>>) -> Self {
        self.h = Some(h);
        self
    }

    /// Precomputed reachability matrices, used when no goals are given.
    pub fn i(mut self, i: Vec<ArrayD<f64>>) -> Self {
        self.i = Some(i);
        self
    }

    pub fn a_dependencies(mut self, dependencies: Vec<Vec<usize>>) -> Self {
        self.a_dependencies = Some(dependencies);
        self
    }

    pub fn b_dependencies(mut self, dependencies: Vec<Vec<usize>>) -> Self {
        self.b_dependencies = Some(dependencies);
        self
    }

    /// Multi-action factors driving each transition tensor. Requires
    /// [`num_controls`](Self::num_controls) for the multi-action factors.
    pub fn b_action_dependencies(mut self, dependencies: Vec<Vec<usize>>) -> Self {
        self.b_action_dependencies = Some(dependencies);
        self
    }

    /// Action counts. With action dependencies these are the counts of the
    /// multi-action factors; otherwise they must match the transition tensors.
    pub fn num_controls(mut self, num_controls: Vec<usize>) -> Self {
        self.num_controls = Some(num_controls);
        self
    }

    /// Factors the agent can act on.
    pub fn control_factors(mut self, control_fac_idx: Vec<usize>) -> Self {
        self.control_fac_idx = Some(control_fac_idx);
        self
    }

    /// Explicit `(num_policies, policy_len, num_factors)` policy set.
    pub fn policies(mut self, policies: Array3<usize>) -> Self {
        self.policies = Some(policies);
        self
    }

    pub fn config(mut self, config: AgentConfig) -> Self {
        self.config = config;
        self
    }

    /// Number of independent agents evaluated together.
    pub fn batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size;
        self
    }

    /// Treat every supplied tensor as already carrying a leading batch axis.
    pub fn pre_batched(mut self) -> Self {
        self.pre_batched = true;
        self
    }

    /// Replace the closed-form expected free energy backend.
    pub fn policy_search<P: PolicySearch + 'static>(mut self, backend: P) -> Self {
        self.policy_search = Some(Arc::new(backend));
        self
    }

    /// Assemble and validate the agent.
    ///
    /// # Errors
    ///
    /// Returns a structural error when a tensor disagrees with the declared
    /// dependencies or counts, and [`Error::InvalidConfiguration`] for
    /// inconsistent settings.
    pub fn build(self) -> Result<Agent> {
        if self.a.is_empty() || self.b.is_empty() {
            return Err(Error::config(
                "an agent needs at least one modality and one factor",
            ));
        }
        if self.b_action_dependencies.is_some() && self.num_controls.is_none() {
            return Err(Error::config(
                "action dependencies require explicit num_controls",
            ));
        }
        if self.config.control == ControlAlgo::Simulation && self.policy_search.is_none() {
            return Err(Error::config(
                "simulation control requires a policy search backend",
            ));
        }

        let batch = if self.pre_batched {
            self.a[0].shape().first().copied().unwrap_or(0)
        } else {
            self.batch_size
        };
        if batch == 0 {
            return Err(Error::config("batch size must be positive"));
        }

        let mut config = self.config.clone();
        let num_modalities = self.a.len();
        let num_factors = self.b.len();

        let a = self.batch_all(&self.a, "A", batch)?;
        let mut b = self.batch_all(&self.b, "B", batch)?;
        let mut pb = self
            .pb
            .as_ref()
            .map(|pb| self.batch_all(pb, "pB", batch))
            .transpose()?;

        let action_maps = match &self.b_action_dependencies {
            Some(action_deps) => {
                let num_controls_multi = self.num_controls.clone().unwrap_or_default();
                let maps = action_maps(action_deps, &num_controls_multi, num_factors)?;
                b = b
                    .into_iter()
                    .zip(&maps)
                    .enumerate()
                    .map(|(f, (b_f, map))| flatten_action_axes(b_f, map, f))
                    .collect::<Result<_>>()?;
                if let Some(counts) = pb.take() {
                    pb = Some(
                        counts
                            .into_iter()
                            .zip(&maps)
                            .enumerate()
                            .map(|(f, (pb_f, map))| flatten_action_axes(pb_f, map, f))
                            .collect::<Result<_>>()?,
                    );
                }
                if config.sampling_mode != SamplingMode::Full {
                    debug!("multi-action model: forcing full sampling mode");
                    config.sampling_mode = SamplingMode::Full;
                }
                Some(maps)
            }
            None => None,
        };

        for (f, b_f) in b.iter().enumerate() {
            if b_f.ndim() < 3 {
                return Err(Error::TransitionShapeMismatch {
                    tensor: "B",
                    factor: f,
                    expected: vec![batch, 0, 0],
                    got: b_f.shape().to_vec(),
                });
            }
        }
        for (m, a_m) in a.iter().enumerate() {
            if a_m.ndim() < 2 {
                return Err(Error::LikelihoodShapeMismatch {
                    tensor: "A",
                    modality: m,
                    expected: vec![batch, 0],
                    got: a_m.shape().to_vec(),
                });
            }
        }

        let num_obs: Vec<usize> = a.iter().map(|a_m| a_m.shape()[1]).collect();
        let num_states: Vec<usize> = b.iter().map(|b_f| b_f.shape()[1]).collect();
        let num_controls: Vec<usize> = b
            .iter()
            .map(|b_f| b_f.shape()[b_f.ndim() - 1])
            .collect();

        let num_controls_multi = match (&action_maps, &self.num_controls) {
            (Some(_), Some(multi)) => multi.clone(),
            (None, Some(given)) if given != &num_controls => {
                return Err(Error::TensorShapeMismatch {
                    tensor: "num_controls".to_string(),
                    expected: num_controls,
                    got: given.clone(),
                });
            }
            _ => num_controls.clone(),
        };

        let policy_len = config.effective_policy_len();
        if policy_len == 0 {
            return Err(Error::config("policy_len must be positive"));
        }
        let (control_fac_idx, policies) = match &action_maps {
            Some(maps) => {
                let multi_control = self.control_fac_idx.clone().unwrap_or_else(|| {
                    controllable(&num_controls_multi)
                });
                for &k in &multi_control {
                    match num_controls_multi.get(k) {
                        None => {
                            return Err(Error::DependencyOutOfRange {
                                kind: "control",
                                entry: k,
                                index: k,
                                num_factors: num_controls_multi.len(),
                            });
                        }
                        Some(&n) if n <= 1 => {
                            return Err(Error::DegenerateControlFactor {
                                factor: k,
                                num_controls: n,
                            });
                        }
                        Some(_) => {}
                    }
                }
                let policies_multi = self.policies.clone().unwrap_or_else(|| {
                    construct_policies(&num_controls_multi, policy_len, &multi_control)
                });
                if policies_multi.len_of(Axis(2)) != num_controls_multi.len() {
                    return Err(Error::TensorShapeMismatch {
                        tensor: "policies".to_string(),
                        expected: vec![
                            policies_multi.len_of(Axis(0)),
                            policies_multi.len_of(Axis(1)),
                            num_controls_multi.len(),
                        ],
                        got: policies_multi.shape().to_vec(),
                    });
                }
                (controllable(&num_controls), flatten_policies(&policies_multi, maps))
            }
            None => {
                let control = self
                    .control_fac_idx
                    .clone()
                    .unwrap_or_else(|| controllable(&num_controls));
                let policies = self
                    .policies
                    .clone()
                    .unwrap_or_else(|| construct_policies(&num_controls, policy_len, &control));
                (control, policies)
            }
        };
        let num_policies = policies.len_of(Axis(0));
        if num_policies == 0 || policies.len_of(Axis(1)) == 0 {
            return Err(Error::config("policies must hold at least one step"));
        }

        let structure = ModelStructure {
            a_dependencies: self
                .a_dependencies
                .clone()
                .unwrap_or_else(|| vec![(0..num_factors).collect::<Vec<_>>(); num_modalities]),
            b_dependencies: self
                .b_dependencies
                .clone()
                .unwrap_or_else(|| (0..num_factors).map(|f| vec![f]).collect()),
            action_maps,
            batch_size: batch,
            num_obs,
            num_states,
            num_controls,
            num_controls_multi,
            control_fac_idx,
            policies,
            config,
        };

        let c = match &self.c {
            Some(c) => self.batch_matrices(c, "C", batch)?,
            None => structure
                .num_obs
                .iter()
                .map(|&n| Array2::from_elem((batch, n), 1.0 / n as f64))
                .collect(),
        };
        let d = match &self.d {
            Some(d) => self.batch_matrices(d, "D", batch)?,
            None => structure
                .num_states
                .iter()
                .map(|&n| Array2::from_elem((batch, n), 1.0 / n as f64))
                .collect(),
        };
        let e = match &self.e {
            Some(e) => into_matrix(self.batch_one(e.clone(), "E", batch)?, "E")?,
            None => Array2::from_elem((batch, num_policies), 1.0 / num_policies as f64),
        };
        let pa = self
            .pa
            .as_ref()
            .map(|pa| self.batch_all(pa, "pA", batch))
            .transpose()?;
        let h = self
            .h
            .as_ref()
            .map(|h| self.batch_matrices(h, "H", batch))
            .transpose()?;

        let scalar = |value: f64| Array1::from_elem(batch, value);
        let mut model = GenerativeModel {
            a,
            b,
            c,
            d,
            e,
            pa,
            pb,
            h,
            i: Vec::new(),
            gamma: scalar(structure.config.gamma),
            alpha: scalar(structure.config.alpha),
            inductive_threshold: scalar(structure.config.inductive_threshold),
            inductive_epsilon: scalar(structure.config.inductive_epsilon),
        };
        validate(&model, &structure)?;

        model.i = match (&model.h, &self.i) {
            (Some(h), _) if structure.config.use_inductive => batched_i_matrices(
                h,
                &model.b,
                &structure.b_dependencies,
                &model.inductive_threshold,
                structure.config.inductive_depth,
            ),
            (_, Some(i)) => i
                .iter()
                .map(|i_f| {
                    let batched = self.batch_one(i_f.clone(), "I", batch)?;
                    into_cube(batched, "I")
                })
                .collect::<Result<_>>()?,
            _ => structure
                .num_states
                .iter()
                .map(|&n| Array3::zeros((batch, 1, n)))
                .collect(),
        };
        validate_inductive(&model.i, &structure)?;

        let policy_search: Arc<dyn PolicySearch> = match self.policy_search {
            Some(backend) => backend,
            None => Arc::new(ExpectedFreeEnergy),
        };
        debug!(
            batch,
            num_modalities = structure.num_modalities(),
            num_factors = structure.num_factors(),
            num_policies = structure.num_policies(),
            backend = policy_search.name(),
            "built active inference agent"
        );

        Ok(Agent::from_parts(model, Arc::new(structure), policy_search))
    }

    fn batch_one(&self, tensor: ArrayD<f64>, name: &str, batch: usize) -> Result<ArrayD<f64>> {
        if self.pre_batched {
            if tensor.shape().first() != Some(&batch) {
                return Err(Error::TensorShapeMismatch {
                    tensor: name.to_string(),
                    expected: vec![batch],
                    got: tensor.shape().to_vec(),
                });
            }
            return Ok(tensor);
        }
        let mut shape = vec![batch];
        shape.extend_from_slice(tensor.shape());
        let single = tensor.insert_axis(Axis(0));
        let broadcast = single
            .broadcast(IxDyn(&shape))
            .ok_or_else(|| Error::TensorShapeMismatch {
                tensor: name.to_string(),
                expected: shape.clone(),
                got: single.shape().to_vec(),
            })?;
        Ok(broadcast.to_owned())
    }

    fn batch_all(
        &self,
        tensors: &[ArrayD<f64>],
        name: &str,
        batch: usize,
    ) -> Result<Vec<ArrayD<f64>>> {
        tensors
            .iter()
            .enumerate()
            .map(|(k, t)| self.batch_one(t.clone(), &format!("{name}[{k}]"), batch))
            .collect()
    }

    fn batch_matrices(
        &self,
        tensors: &[ArrayD<f64>],
        name: &str,
        batch: usize,
    ) -> Result<Vec<Array2<f64>>> {
        self.batch_all(tensors, name, batch)?
            .into_iter()
            .enumerate()
            .map(|(k, t)| into_matrix(t, &format!("{name}[{k}]")))
            .collect()
    }
}

/// Factors with more than one action.
fn controllable(num_controls: &[usize]) -> Vec<usize> {
    num_controls
        .iter()
        .enumerate()
        .filter(|&(_, &n)| n > 1)
        .map(|(f, _)| f)
        .collect()
}

fn action_maps(
    action_dependencies: &[Vec<usize>],
    num_controls_multi: &[usize],
    num_factors: usize,
) -> Result<Vec<ActionMap>> {
    if action_dependencies.len() != num_factors {
        return Err(Error::LengthMismatch {
            what: "B action dependency lists".to_string(),
            expected: num_factors,
            got: action_dependencies.len(),
        });
    }
    action_dependencies
        .iter()
        .enumerate()
        .map(|(entry, deps)| {
            if let Some(&index) = deps.iter().find(|&&k| k >= num_controls_multi.len()) {
                return Err(Error::DependencyOutOfRange {
                    kind: "B action",
                    entry,
                    index,
                    num_factors: num_controls_multi.len(),
                });
            }
            Ok(ActionMap::new(deps.clone(), num_controls_multi))
        })
        .collect()
}

fn into_matrix(tensor: ArrayD<f64>, name: &str) -> Result<Array2<f64>> {
    if tensor.ndim() != 2 {
        return Err(Error::TensorShapeMismatch {
            tensor: name.to_string(),
            expected: vec![tensor.shape().first().copied().unwrap_or(0), 0],
            got: tensor.shape().to_vec(),
        });
    }
    Ok(tensor.into_dimensionality::<Ix2>()?)
}

fn into_cube(tensor: ArrayD<f64>, name: &str) -> Result<Array3<f64>> {
    if tensor.ndim() != 3 {
        return Err(Error::TensorShapeMismatch {
            tensor: name.to_string(),
            expected: vec![tensor.shape().first().copied().unwrap_or(0), 0, 0],
            got: tensor.shape().to_vec(),
        });
    }
    Ok(tensor.into_dimensionality::<Ix3>()?)
}
