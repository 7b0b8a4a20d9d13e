//! Error types for the actinf crate

use thiserror::Error;

/// Main error type for the actinf crate
#[derive(Error, Debug)]
#[non_exhaustive]
pub enum Error {
    #[error(
        "{tensor}[{modality}] has trailing shape {got:?} but its dependency list implies {expected:?}"
    )]
    LikelihoodShapeMismatch {
        tensor: &'static str,
        modality: usize,
        expected: Vec<usize>,
        got: Vec<usize>,
    },

    #[error(
        "{tensor}[{factor}] has dependency shape {got:?} but its dependency list implies {expected:?}"
    )]
    TransitionShapeMismatch {
        tensor: &'static str,
        factor: usize,
        expected: Vec<usize>,
        got: Vec<usize>,
    },

    #[error("{kind} dependency {index} of entry {entry} is out of range for {num_factors} factor(s)")]
    DependencyOutOfRange {
        kind: &'static str,
        entry: usize,
        index: usize,
        num_factors: usize,
    },

    #[error("control factor {factor} has {num_controls} action(s); control factors need more than one")]
    DegenerateControlFactor { factor: usize, num_controls: usize },

    #[error("{tensor} has shape {got:?}, expected {expected:?}")]
    TensorShapeMismatch {
        tensor: String,
        expected: Vec<usize>,
        got: Vec<usize>,
    },

    #[error("expected {expected} {what}, got {got}")]
    LengthMismatch {
        what: String,
        expected: usize,
        got: usize,
    },

    #[error("invalid configuration: {message}")]
    InvalidConfiguration { message: String },

    #[error("stochastic action selection requires a random source")]
    MissingRandomSource,

    #[error("observation {observation} is out of range for modality {modality} ({num_obs} outcomes)")]
    ObservationOutOfRange {
        modality: usize,
        observation: usize,
        num_obs: usize,
    },

    #[error("action {action} is out of range for factor {factor} ({num_controls} actions)")]
    ActionOutOfRange {
        factor: usize,
        action: usize,
        num_controls: usize,
    },

    #[error("tensor shape error: {0}")]
    Shape(#[from] ndarray::ShapeError),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl Error {
    /// True for errors raised because model tensors disagree with the declared structure.
    pub fn is_structural_mismatch(&self) -> bool {
        matches!(
            self,
            Error::LikelihoodShapeMismatch { .. }
                | Error::TransitionShapeMismatch { .. }
                | Error::DependencyOutOfRange { .. }
                | Error::DegenerateControlFactor { .. }
                | Error::TensorShapeMismatch { .. }
        )
    }

    pub(crate) fn config(message: impl Into<String>) -> Self {
        Error::InvalidConfiguration {
            message: message.into(),
        }
    }
}

/// Convenience type alias for Results using the crate's Error type
pub type Result<T> = std::result::Result<T, Error>;
