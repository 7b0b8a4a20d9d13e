//! Policy search port - how a posterior over policies is produced
//!
//! The closed-form expected free energy evaluator is the default backend.
//! Simulation-based planners plug in through the same trait and are
//! supplied by the caller when the agent is built.

use std::fmt::Debug;

use ndarray::Array2;

use crate::{Result, active_inference::Agent, app::SearchBudget, beliefs::Beliefs};

/// Posterior over the agent's policy set for every batch element.
#[derive(Debug, Clone, PartialEq)]
pub struct PolicyPosterior {
    /// `(batch, num_policies)`, rows sum to one
    pub q_pi: Array2<f64>,
    /// `(batch, num_policies)` expected free energy `G`; lower is better
    pub efe: Array2<f64>,
}

/// Backend that scores the agent's policies given current beliefs.
///
/// Implementations must be pure with respect to the agent: they read its
/// model and structure and return a fresh posterior.
///
/// # Examples
///
/// ```
/// use actinf::{
///     Agent, Beliefs, PolicyPosterior, PolicySearch, Result,
///     app::SearchBudget,
/// };
/// use ndarray::Array2;
///
/// /// Ignores the model and prefers the first policy.
/// #[derive(Debug)]
/// struct FirstPolicy;
///
/// impl PolicySearch for FirstPolicy {
///     fn evaluate(
///         &self,
///         agent: &Agent,
///         beliefs: &Beliefs,
///         _budget: &SearchBudget,
///     ) -> Result<PolicyPosterior> {
///         let shape = (beliefs.batch_size(), agent.structure().num_policies());
///         let mut q_pi = Array2::zeros(shape);
///         q_pi.column_mut(0).fill(1.0);
///         Ok(PolicyPosterior { q_pi, efe: Array2::zeros(shape) })
///     }
///
///     fn name(&self) -> &str {
///         "first-policy"
///     }
/// }
/// ```
pub trait PolicySearch: Debug + Send + Sync {
    /// Posterior over policies under `beliefs`.
    ///
    /// # Errors
    ///
    /// Returns an error if `beliefs` do not match the agent's factors or
    /// batch size.
    fn evaluate(
        &self,
        agent: &Agent,
        beliefs: &Beliefs,
        budget: &SearchBudget,
    ) -> Result<PolicyPosterior>;

    /// Short backend name used in logs.
    fn name(&self) -> &str;
}
