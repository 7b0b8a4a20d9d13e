//! Generative model tensors and the static structure describing them.
//!
//! Numeric leaves live in [`GenerativeModel`]; every tensor carries a leading
//! batch axis. Dependency lists, counts, the policy set and the agent
//! configuration live in [`ModelStructure`], which never changes and is
//! shared between an agent and the agents learning derives from it.

use ndarray::{Array1, Array2, Array3, ArrayD, ArrayView1, ArrayView2, ArrayViewD, Axis};

use super::policies::ActionMap;
use crate::{Error, Result, app::AgentConfig};

/// Batched model tensors.
///
/// | leaf | shape |
/// |------|-------|
/// | `a[m]` | `(batch, num_obs[m], num_states[d] for d in a_dependencies[m])` |
/// | `b[f]` | `(batch, num_states[f], num_states[d] for d in b_dependencies[f], num_controls[f])` |
/// | `c[m]` | `(batch, num_obs[m])` |
/// | `d[f]` | `(batch, num_states[f])` |
/// | `e` | `(batch, num_policies)` |
/// | `h[f]` | `(batch, num_states[f])` |
/// | `i[f]` | `(batch, inductive_depth + 1, num_states[f])` |
#[derive(Debug, Clone)]
pub struct GenerativeModel {
    pub a: Vec<ArrayD<f64>>,
    pub b: Vec<ArrayD<f64>>,
    /// Log-preferences over outcomes
    pub c: Vec<Array2<f64>>,
    /// Initial-state priors
    pub d: Vec<Array2<f64>>,
    /// Policy prior
    pub e: Array2<f64>,
    /// Dirichlet counts over `a`
    pub pa: Option<Vec<ArrayD<f64>>>,
    /// Dirichlet counts over `b`
    pub pb: Option<Vec<ArrayD<f64>>>,
    /// Goal-state indicators for inductive planning
    pub h: Option<Vec<Array2<f64>>>,
    /// Backward reachability of the goal states
    pub i: Vec<Array3<f64>>,
    pub gamma: Array1<f64>,
    pub alpha: Array1<f64>,
    pub inductive_threshold: Array1<f64>,
    pub inductive_epsilon: Array1<f64>,
}

/// Static metadata of a model. Never changes over an agent's lifetime.
#[derive(Debug, Clone)]
pub struct ModelStructure {
    pub a_dependencies: Vec<Vec<usize>>,
    pub b_dependencies: Vec<Vec<usize>>,
    /// Present when transition tensors are driven by groups of multi-action factors
    pub action_maps: Option<Vec<ActionMap>>,
    pub batch_size: usize,
    pub num_obs: Vec<usize>,
    pub num_states: Vec<usize>,
    /// Flat action counts, one per hidden-state factor
    pub num_controls: Vec<usize>,
    /// Action counts of the multi-action factors (equal to `num_controls` without action maps)
    pub num_controls_multi: Vec<usize>,
    pub control_fac_idx: Vec<usize>,
    /// `(num_policies, policy_len, num_factors)` over flat actions
    pub policies: Array3<usize>,
    pub config: AgentConfig,
}

impl ModelStructure {
    pub fn num_modalities(&self) -> usize {
        self.num_obs.len()
    }

    pub fn num_factors(&self) -> usize {
        self.num_states.len()
    }

    pub fn num_policies(&self) -> usize {
        self.policies.len_of(Axis(0))
    }

    pub fn policy_len(&self) -> usize {
        self.policies.len_of(Axis(1))
    }
}

/// Borrowed view of one batch element of a [`GenerativeModel`].
#[derive(Debug)]
pub(crate) struct ModelSlice<'a> {
    pub a: Vec<ArrayViewD<'a, f64>>,
    pub b: Vec<ArrayViewD<'a, f64>>,
    pub c: Vec<ArrayView1<'a, f64>>,
    pub e: ArrayView1<'a, f64>,
    pub pa: Option<Vec<ArrayViewD<'a, f64>>>,
    pub pb: Option<Vec<ArrayViewD<'a, f64>>>,
    pub i: Vec<ArrayView2<'a, f64>>,
    pub gamma: f64,
    pub inductive_epsilon: f64,
}

impl GenerativeModel {
    pub(crate) fn slice(&self, batch: usize) -> ModelSlice<'_> {
        ModelSlice {
            a: batch_rows(&self.a, batch),
            b: batch_rows(&self.b, batch),
            c: self.c.iter().map(|c| c.row(batch)).collect(),
            e: self.e.row(batch),
            pa: self.pa.as_ref().map(|pa| batch_rows(pa, batch)),
            pb: self.pb.as_ref().map(|pb| batch_rows(pb, batch)),
            i: self.i.iter().map(|i| i.index_axis(Axis(0), batch)).collect(),
            gamma: self.gamma[batch],
            inductive_epsilon: self.inductive_epsilon[batch],
        }
    }
}

fn batch_rows(tensors: &[ArrayD<f64>], batch: usize) -> Vec<ArrayViewD<'_, f64>> {
    tensors
        .iter()
        .map(|t| t.index_axis(Axis(0), batch))
        .collect()
}

/// Check every tensor of `model` against the dependency lists and counts of
/// `structure`. The inductive matrices are checked separately by
/// [`validate_inductive`] because they may be derived from `b` after this
/// check passes.
pub(crate) fn validate(model: &GenerativeModel, structure: &ModelStructure) -> Result<()> {
    let num_factors = structure.num_factors();
    let batch = structure.batch_size;

    check_dependency_ranges("A", &structure.a_dependencies, num_factors)?;
    check_dependency_ranges("B", &structure.b_dependencies, num_factors)?;

    if structure.a_dependencies.len() != model.a.len() {
        return Err(Error::LengthMismatch {
            what: "A dependency lists".to_string(),
            expected: model.a.len(),
            got: structure.a_dependencies.len(),
        });
    }
    if structure.b_dependencies.len() != model.b.len() {
        return Err(Error::LengthMismatch {
            what: "B dependency lists".to_string(),
            expected: model.b.len(),
            got: structure.b_dependencies.len(),
        });
    }

    for (m, a) in model.a.iter().enumerate() {
        check_likelihood("A", m, a, structure)?;
    }
    if let Some(pa) = &model.pa {
        check_count("pA", pa.len(), model.a.len())?;
        for (m, pa) in pa.iter().enumerate() {
            check_likelihood("pA", m, pa, structure)?;
        }
    }

    for (f, b) in model.b.iter().enumerate() {
        check_transition("B", f, b, structure)?;
    }
    if let Some(pb) = &model.pb {
        check_count("pB", pb.len(), model.b.len())?;
        for (f, pb) in pb.iter().enumerate() {
            check_transition("pB", f, pb, structure)?;
        }
    }

    for &f in &structure.control_fac_idx {
        if f >= num_factors {
            return Err(Error::DependencyOutOfRange {
                kind: "control",
                entry: f,
                index: f,
                num_factors,
            });
        }
        if structure.num_controls[f] <= 1 {
            return Err(Error::DegenerateControlFactor {
                factor: f,
                num_controls: structure.num_controls[f],
            });
        }
    }

    let (_, _, policy_factors) = structure.policies.dim();
    if policy_factors != num_factors {
        return Err(Error::TensorShapeMismatch {
            tensor: "policies".to_string(),
            expected: vec![structure.num_policies(), structure.policy_len(), num_factors],
            got: structure.policies.shape().to_vec(),
        });
    }
    for ((_, _, f), &action) in structure.policies.indexed_iter() {
        if action >= structure.num_controls[f] {
            return Err(Error::ActionOutOfRange {
                factor: f,
                action,
                num_controls: structure.num_controls[f],
            });
        }
    }

    check_count("C", model.c.len(), model.a.len())?;
    for (m, c) in model.c.iter().enumerate() {
        check_matrix(&format!("C[{m}]"), c, [batch, structure.num_obs[m]])?;
    }
    check_count("D", model.d.len(), num_factors)?;
    for (f, d) in model.d.iter().enumerate() {
        check_matrix(&format!("D[{f}]"), d, [batch, structure.num_states[f]])?;
    }
    check_matrix("E", &model.e, [batch, structure.num_policies()])?;
    if let Some(h) = &model.h {
        check_count("H", h.len(), num_factors)?;
        for (f, h) in h.iter().enumerate() {
            check_matrix(&format!("H[{f}]"), h, [batch, structure.num_states[f]])?;
        }
    }

    for (name, values) in [
        ("gamma", &model.gamma),
        ("alpha", &model.alpha),
        ("inductive_threshold", &model.inductive_threshold),
        ("inductive_epsilon", &model.inductive_epsilon),
    ] {
        if values.len() != batch {
            return Err(Error::TensorShapeMismatch {
                tensor: name.to_string(),
                expected: vec![batch],
                got: vec![values.len()],
            });
        }
    }

    Ok(())
}

/// Check the inductive matrices: one `(batch, depth, num_states[f])` tensor per factor.
pub(crate) fn validate_inductive(i: &[Array3<f64>], structure: &ModelStructure) -> Result<()> {
    check_count("I", i.len(), structure.num_factors())?;
    for (f, i) in i.iter().enumerate() {
        let (batch, depth, ns) = i.dim();
        if batch != structure.batch_size || ns != structure.num_states[f] || depth == 0 {
            return Err(Error::TensorShapeMismatch {
                tensor: format!("I[{f}]"),
                expected: vec![structure.batch_size, depth.max(1), structure.num_states[f]],
                got: i.shape().to_vec(),
            });
        }
    }
    Ok(())
}

fn check_dependency_ranges(
    kind: &'static str,
    dependencies: &[Vec<usize>],
    num_factors: usize,
) -> Result<()> {
    for (entry, deps) in dependencies.iter().enumerate() {
        if let Some(&index) = deps.iter().find(|&&d| d >= num_factors) {
            return Err(Error::DependencyOutOfRange {
                kind,
                entry,
                index,
                num_factors,
            });
        }
    }
    Ok(())
}

fn dependency_shape(deps: &[usize], num_states: &[usize]) -> Vec<usize> {
    deps.iter().map(|&d| num_states[d]).collect()
}

fn check_likelihood(
    tensor: &'static str,
    modality: usize,
    a: &ArrayD<f64>,
    structure: &ModelStructure,
) -> Result<()> {
    let expected = dependency_shape(&structure.a_dependencies[modality], &structure.num_states);
    let shape = a.shape();
    if shape.len() < 2 {
        return Err(Error::LikelihoodShapeMismatch {
            tensor,
            modality,
            expected,
            got: shape.to_vec(),
        });
    }
    if shape[0] != structure.batch_size || shape[1] != structure.num_obs[modality] {
        return Err(Error::TensorShapeMismatch {
            tensor: format!("{tensor}[{modality}]"),
            expected: vec![structure.batch_size, structure.num_obs[modality]],
            got: shape[..2].to_vec(),
        });
    }
    if shape[2..] != expected[..] {
        return Err(Error::LikelihoodShapeMismatch {
            tensor,
            modality,
            expected,
            got: shape[2..].to_vec(),
        });
    }
    Ok(())
}

fn check_transition(
    tensor: &'static str,
    factor: usize,
    b: &ArrayD<f64>,
    structure: &ModelStructure,
) -> Result<()> {
    let expected = dependency_shape(&structure.b_dependencies[factor], &structure.num_states);
    let shape = b.shape();
    if shape.len() < 3 {
        return Err(Error::TransitionShapeMismatch {
            tensor,
            factor,
            expected,
            got: shape.to_vec(),
        });
    }
    let ndim = shape.len();
    if shape[0] != structure.batch_size
        || shape[1] != structure.num_states[factor]
        || shape[ndim - 1] != structure.num_controls[factor]
    {
        return Err(Error::TensorShapeMismatch {
            tensor: format!("{tensor}[{factor}]"),
            expected: vec![
                structure.batch_size,
                structure.num_states[factor],
                structure.num_controls[factor],
            ],
            got: vec![shape[0], shape[1], shape[ndim - 1]],
        });
    }
    if shape[2..ndim - 1] != expected[..] {
        return Err(Error::TransitionShapeMismatch {
            tensor,
            factor,
            expected,
            got: shape[2..ndim - 1].to_vec(),
        });
    }
    Ok(())
}

fn check_count(what: &str, got: usize, expected: usize) -> Result<()> {
    if got != expected {
        return Err(Error::LengthMismatch {
            what: format!("{what} tensors"),
            expected,
            got,
        });
    }
    Ok(())
}

fn check_matrix(tensor: &str, matrix: &Array2<f64>, expected: [usize; 2]) -> Result<()> {
    if matrix.shape() != expected {
        return Err(Error::TensorShapeMismatch {
            tensor: tensor.to_string(),
            expected: expected.to_vec(),
            got: matrix.shape().to_vec(),
        });
    }
    Ok(())
}
