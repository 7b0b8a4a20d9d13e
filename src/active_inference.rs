//! Batched discrete active inference
//!
//! An agent keeps factorised categorical beliefs over hidden states, infers
//! them from observations, scores a fixed policy set by expected free energy,
//! selects actions and learns its likelihood and transition tensors.
//!
//! ## Module Structure
//!
//! - [`types`]: Configuration enums
//! - [`generative_model`]: Model tensors, static structure and validation
//! - [`policies`]: Policy enumeration and multi-action flattening
//! - [`inference`]: Fixed-point state inference and state prediction
//! - [`inductive`]: Goal reachability for inductive planning
//! - [`evaluation`]: Expected free energy and the policy posterior
//! - [`action`]: Action selection
//! - [`learning`]: Dirichlet parameter updates
//! - [`agent`] / [`builder`]: The agent and its builder

pub mod action;
pub mod agent;
pub mod builder;
pub mod evaluation;
pub mod generative_model;
pub mod inductive;
pub mod inference;
pub mod learning;
pub mod policies;
pub mod types;

// Public re-exports
pub use action::ActionSample;
pub use agent::{Agent, InferenceResult};
pub use builder::AgentBuilder;
pub use evaluation::ExpectedFreeEnergy;
pub use generative_model::{GenerativeModel, ModelStructure};
pub use inductive::generate_i_matrix;
pub use inference::Observation;
pub use policies::{ActionMap, construct_policies};
pub use types::{ActionSelection, ControlAlgo, SamplingMode};
