//! Configuration types for agent creation.

use serde::{Deserialize, Serialize};

use crate::{
    Result,
    active_inference::types::{ActionSelection, ControlAlgo, SamplingMode},
};

/// Parameters of the fixed-point state inference loop.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FpiParams {
    /// Static number of iterations; batched execution always runs all of them
    pub num_iter: usize,
    /// Initial value of the free-energy change statistic
    pub df: f64,
    /// Change in free energy below which later iterations become no-ops
    pub df_tol: f64,
    /// Freeze the posterior once the change drops below `df_tol`
    pub early_stopping: bool,
}

impl Default for FpiParams {
    fn default() -> Self {
        Self {
            num_iter: 16,
            df: 1.0,
            df_tol: 0.001,
            early_stopping: true,
        }
    }
}

/// Budget handed to a simulation-based policy search backend.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SearchBudget {
    pub max_depth: usize,
    pub num_simulations: usize,
    pub seed: u64,
}

impl Default for SearchBudget {
    fn default() -> Self {
        Self {
            max_depth: 5,
            num_simulations: 32,
            seed: 0,
        }
    }
}

/// Static settings of an active inference agent.
///
/// These never change over the agent's lifetime and are shared between an
/// agent and every agent derived from it by learning.
///
/// # Examples
///
/// ```
/// use actinf::app::AgentConfig;
/// use actinf::active_inference::{ActionSelection, SamplingMode};
///
/// let config = AgentConfig::default()
///     .with_policy_len(2)
///     .with_gamma(8.0)
///     .with_action_selection(ActionSelection::Stochastic)
///     .with_sampling_mode(SamplingMode::Marginal);
/// assert_eq!(config.policy_len, 2);
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AgentConfig {
    /// Planning horizon of every enumerated policy
    pub policy_len: usize,
    /// Policy precision
    pub gamma: f64,
    /// Action precision
    pub alpha: f64,
    /// Number of backward reachability steps in the inductive `I` matrices
    pub inductive_depth: usize,
    /// Transition probability below which a transition counts as unreachable
    pub inductive_threshold: f64,
    /// Weight of the inductive term
    pub inductive_epsilon: f64,
    pub use_utility: bool,
    pub use_states_info_gain: bool,
    pub use_param_info_gain: bool,
    pub use_inductive: bool,
    pub action_selection: ActionSelection,
    pub sampling_mode: SamplingMode,
    pub inference: FpiParams,
    pub control: ControlAlgo,
    pub search_budget: SearchBudget,
    pub learn_a: bool,
    pub learn_b: bool,
    /// Preference learning hook; no update rule is implemented
    pub learn_c: bool,
    /// Initial-state prior learning hook; no update rule is implemented
    pub learn_d: bool,
    /// Policy prior learning hook; no update rule is implemented
    pub learn_e: bool,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            policy_len: 1,
            gamma: 16.0,
            alpha: 16.0,
            inductive_depth: 1,
            inductive_threshold: 0.1,
            inductive_epsilon: 1e-3,
            use_utility: true,
            use_states_info_gain: true,
            use_param_info_gain: false,
            use_inductive: false,
            action_selection: ActionSelection::default(),
            sampling_mode: SamplingMode::default(),
            inference: FpiParams::default(),
            control: ControlAlgo::default(),
            search_budget: SearchBudget::default(),
            learn_a: true,
            learn_b: true,
            learn_c: false,
            learn_d: true,
            learn_e: false,
        }
    }
}

impl AgentConfig {
    /// Parse a configuration from JSON. Missing fields take their defaults.
    pub fn from_json_str(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }

    /// Serialise the configuration to pretty-printed JSON.
    pub fn to_json_string(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    pub fn with_policy_len(mut self, policy_len: usize) -> Self {
        self.policy_len = policy_len;
        self
    }

    pub fn with_gamma(mut self, gamma: f64) -> Self {
        self.gamma = gamma;
        self
    }

    pub fn with_alpha(mut self, alpha: f64) -> Self {
        self.alpha = alpha;
        self
    }

    /// Enable inductive inference with the given depth, threshold and weight.
    pub fn with_inductive(mut self, depth: usize, threshold: f64, epsilon: f64) -> Self {
        self.use_inductive = true;
        self.inductive_depth = depth;
        self.inductive_threshold = threshold;
        self.inductive_epsilon = epsilon;
        self
    }

    /// Select which expected free energy terms are included.
    pub fn with_efe_terms(
        mut self,
        utility: bool,
        states_info_gain: bool,
        param_info_gain: bool,
    ) -> Self {
        self.use_utility = utility;
        self.use_states_info_gain = states_info_gain;
        self.use_param_info_gain = param_info_gain;
        self
    }

    pub fn with_action_selection(mut self, selection: ActionSelection) -> Self {
        self.action_selection = selection;
        self
    }

    pub fn with_sampling_mode(mut self, mode: SamplingMode) -> Self {
        self.sampling_mode = mode;
        self
    }

    pub fn with_inference(mut self, params: FpiParams) -> Self {
        self.inference = params;
        self
    }

    /// Use a simulation-based backend with the given budget.
    pub fn with_simulation(mut self, budget: SearchBudget) -> Self {
        self.control = ControlAlgo::Simulation;
        self.search_budget = budget;
        self
    }

    /// Choose which model tensors `infer_parameters` updates.
    pub fn with_learning(mut self, learn_a: bool, learn_b: bool) -> Self {
        self.learn_a = learn_a;
        self.learn_b = learn_b;
        self
    }

    /// Horizon actually used for policy construction.
    pub(crate) fn effective_policy_len(&self) -> usize {
        match self.control {
            ControlAlgo::Vanilla => self.policy_len,
            ControlAlgo::Simulation => 1,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn partial_json_uses_defaults() {
        let config = AgentConfig::from_json_str(
            r#"{"policy_len": 3, "action_selection": "stochastic", "inference": {"num_iter": 4}}"#,
        )
        .expect("valid json");
        assert_eq!(config.policy_len, 3);
        assert_eq!(config.action_selection, ActionSelection::Stochastic);
        assert_eq!(config.inference.num_iter, 4);
        assert_eq!(config.inference.df_tol, 0.001);
        assert_eq!(config.gamma, 16.0);
    }

    #[test]
    fn json_round_trip_preserves_config() {
        let config = AgentConfig::default()
            .with_inductive(3, 0.2, 1e-2)
            .with_sampling_mode(SamplingMode::Marginal);
        let json = config.to_json_string().expect("serialise");
        let parsed = AgentConfig::from_json_str(&json).expect("parse");
        assert_eq!(parsed, config);
    }

    #[test]
    fn simulation_control_forces_single_step_policies() {
        let config = AgentConfig::default()
            .with_policy_len(4)
            .with_simulation(SearchBudget::default());
        assert_eq!(config.effective_policy_len(), 1);
    }

    #[test]
    fn malformed_json_is_a_serialization_error() {
        let err = AgentConfig::from_json_str("{not json").unwrap_err();
        assert!(matches!(err, crate::Error::Serialization(_)));
    }
}
