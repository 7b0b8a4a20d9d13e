//! Batched discrete active inference
//!
//! This crate provides:
//! - Dependency-structured tensor contraction over factorised beliefs
//! - Fixed-point variational state inference with free-energy tracking
//! - Expected free energy policy evaluation (utility, state and parameter
//!   information gain, inductive planning)
//! - Marginal and full action selection, including multi-action factors
//! - Dirichlet learning of likelihood and transition tensors
//!
//! Every tensor carries a leading batch axis; batch elements are evaluated
//! in parallel and never interact.

pub mod active_inference;
pub mod app;
pub mod beliefs;
pub mod dirichlet;
pub mod error;
pub mod ports;
pub mod tensor;
pub mod utils;

pub use active_inference::{
    ActionMap, ActionSample, ActionSelection, Agent, AgentBuilder, ControlAlgo,
    ExpectedFreeEnergy, GenerativeModel, InferenceResult, ModelStructure, Observation,
    SamplingMode,
};
pub use app::{AgentConfig, FpiParams, SearchBudget};
pub use beliefs::Beliefs;
pub use error::{Error, Result};
pub use ports::{PolicyPosterior, PolicySearch};
