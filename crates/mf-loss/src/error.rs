//! Error types for the mf-loss crate.

use thiserror::Error;

use mf_layers::LayerError;

/// Error type for loss computation and loss registration.
#[derive(Debug, Error)]
pub enum LossError {
    /// Two loss inputs disagree on a dimension.
    #[error("Shape mismatch for {what}: expected {expected}, got {actual}")]
    ShapeMismatch {
        /// Name of the offending input
        what: &'static str,
        /// The expected size
        expected: usize,
        /// The size that was provided
        actual: usize,
    },

    /// A loss input holds a value outside its domain.
    #[error("Invalid loss input: {message}")]
    InvalidInput {
        /// Description of the problem
        message: String,
    },

    /// A loss name that is not part of the registered family.
    #[error("Unknown loss '{name}', expected one of: {known}")]
    UnknownLoss {
        /// The requested name
        name: String,
        /// Comma-separated registered names
        known: String,
    },

    /// Invalid loss hyperparameters.
    #[error("Invalid loss config: {message}")]
    InvalidConfig {
        /// Description of the problem
        message: String,
    },

    /// Error from an embedding operation.
    #[error(transparent)]
    Layer(#[from] LayerError),
}

/// Result type alias for loss operations.
pub type LossResult<T> = Result<T, LossError>;
