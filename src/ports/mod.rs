//! Ports (trait boundaries) for pluggable collaborators.
//!
//! The agent owns these interfaces; backends implement them.

pub mod policy_search;

pub use policy_search::{PolicyPosterior, PolicySearch};
