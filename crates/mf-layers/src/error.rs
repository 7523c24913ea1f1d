//! Error types for the mf-layers crate.
//!
//! This module defines error types for embedding and tensor operations,
//! including shape mismatches, out-of-range feature hashes and
//! initialization failures.

use thiserror::Error;

/// Error type for layer operations.
#[derive(Debug, Error)]
pub enum LayerError {
    /// Shape mismatch between expected and actual tensor shapes.
    #[error("Shape mismatch: expected {expected:?}, got {actual:?}")]
    ShapeMismatch {
        /// The expected shape
        expected: Vec<usize>,
        /// The actual shape that was provided
        actual: Vec<usize>,
    },

    /// Invalid input dimension for the layer.
    #[error("Invalid input dimension: expected {expected}, got {actual}")]
    InvalidInputDimension {
        /// The expected input dimension
        expected: usize,
        /// The actual input dimension
        actual: usize,
    },

    /// A feature hash does not address a row of the embedding table.
    #[error("Hash {hash} out of range for table with {num_buckets} buckets")]
    HashOutOfRange {
        /// The offending hash value
        hash: i64,
        /// Number of rows in the table
        num_buckets: usize,
    },

    /// Error during weight initialization.
    #[error("Initialization error: {message}")]
    InitializationError {
        /// Description of the initialization error
        message: String,
    },

    /// Error during backward pass computation.
    #[error("Backward pass error: {message}")]
    BackwardError {
        /// Description of the backward pass error
        message: String,
    },

    /// Configuration error for the layer.
    #[error("Configuration error: {message}")]
    ConfigError {
        /// Description of the configuration error
        message: String,
    },
}

/// Result type alias for layer operations.
pub type LayerResult<T> = Result<T, LayerError>;
