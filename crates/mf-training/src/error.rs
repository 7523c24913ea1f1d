//! Error types for the training crate.

use std::io;

use mf_data::DataError;
use mf_layers::LayerError;
use mf_loss::LossError;
use mf_optimizer::OptimizerError;
use thiserror::Error;

/// Errors raised while building or training a model.
#[derive(Error, Debug)]
pub enum TrainingError {
    /// Hyperparameters are invalid.
    #[error("Configuration error: {0}")]
    Config(String),

    /// Metric inputs were not aligned.
    #[error("Metric error: {0}")]
    Metric(String),

    /// Embedding, pooling or scoring failed.
    #[error("Layer error: {0}")]
    Layer(#[from] LayerError),

    /// A loss could not be evaluated.
    #[error("Loss error: {0}")]
    Loss(#[from] LossError),

    /// The optimizer could not be built.
    #[error("Optimizer error: {0}")]
    Optimizer(#[from] OptimizerError),

    /// A batch was invalid.
    #[error("Data error: {0}")]
    Data(#[from] DataError),

    /// Reading a config file failed.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// A config file was not valid JSON.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Result type for training operations.
pub type TrainingResult<T> = std::result::Result<T, TrainingError>;
