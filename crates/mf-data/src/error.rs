//! Error types for batch parsing and validation.

use std::io;

use mf_layers::LayerError;
use thiserror::Error;

/// Errors that can occur when reading or validating batches.
#[derive(Error, Debug)]
pub enum DataError {
    /// A required batch key is absent.
    #[error("Missing required field: {0}")]
    MissingField(&'static str),

    /// Batch keys are present but inconsistent with each other.
    #[error("Schema error: {0}")]
    Schema(String),

    /// An I/O error occurred.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// A line could not be parsed as JSON.
    #[error("JSON error on line {line}: {source}")]
    Json {
        /// 1-based line number
        line: usize,
        /// The parse error
        #[source]
        source: serde_json::Error,
    },

    /// Feature hashes and weights could not form a feature bag.
    #[error(transparent)]
    Layer(#[from] LayerError),
}

/// Result type for data operations.
pub type DataResult<T> = std::result::Result<T, DataError>;
