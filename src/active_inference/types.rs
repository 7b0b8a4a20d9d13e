//! Core enums for the active inference agent

use serde::{Deserialize, Serialize};

/// How an action is read off the policy posterior
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActionSelection {
    /// Take the mode; consumes no randomness
    #[default]
    Deterministic,
    /// Sample from the `alpha`-tempered distribution; needs a random source
    Stochastic,
}

/// Which distribution actions are drawn from
///
/// **Marginal**: collapse `q(π)` onto independent per-factor marginals of the
/// first-step action and select each factor separately.
///
/// **Full**: select a whole policy from `q(π)` and return its first step.
/// Required when control factors are coupled through flattened multi-action
/// transition tensors.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SamplingMode {
    Marginal,
    #[default]
    Full,
}

/// Policy evaluation backend
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ControlAlgo {
    /// Closed-form expected free energy over the enumerated policy set
    #[default]
    Vanilla,
    /// Caller-supplied simulation-based search; planning horizon is one step
    Simulation,
}
