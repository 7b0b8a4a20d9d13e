//! Application layer: static agent configuration.
//!
//! # Usage
//!
//! ```
//! use actinf::app::AgentConfig;
//!
//! let config = AgentConfig::from_json_str(r#"{"policy_len": 2, "gamma": 8.0}"#)?;
//! assert_eq!(config.policy_len, 2);
//! assert!(config.inference.early_stopping);
//! # Ok::<(), actinf::Error>(())
//! ```

pub mod config;

pub use config::{AgentConfig, FpiParams, SearchBudget};
