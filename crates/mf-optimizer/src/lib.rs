//! Embedding-table optimizers.
//!
//! Optimizers update one table row ("slot") at a time and keep any per-row
//! state keyed by the slot index. Each optimizer implements the [`Optimizer`]
//! trait.
//!
//! # Available Optimizers
//!
//! - [`Sgd`] - Stochastic Gradient Descent (sparse)
//! - [`SparseAdam`] - Adam with lazily created per-row moments (sparse)
//! - [`AdamW`] - Adam with decoupled weight decay (dense)
//!
//! Sparse optimizers only see rows that received a gradient in the current
//! step. Dense optimizers expect every row, with a zero gradient for rows the
//! batch did not touch.
//!
//! # Example
//!
//! ```
//! use mf_optimizer::{Optimizer, Sgd, OptimizerConfig};
//!
//! let config = OptimizerConfig::Sgd { learning_rate: 0.01 };
//! let mut optimizer = Sgd::new(config).unwrap();
//!
//! let mut embedding = vec![1.0, 2.0, 3.0];
//! let gradients = vec![0.1, 0.2, 0.3];
//!
//! optimizer.begin_step();
//! optimizer.apply_gradients(7, &mut embedding, &gradients);
//! ```

use serde::{Deserialize, Serialize};
use thiserror::Error;

mod adam;
mod adamw;
mod sgd;

pub use adam::SparseAdam;
pub use adamw::AdamW;
pub use sgd::Sgd;

/// Errors that can occur when working with optimizers.
#[derive(Debug, Error)]
pub enum OptimizerError {
    /// Configuration type does not match the optimizer type.
    #[error("Config mismatch: expected {expected}, got {got}")]
    ConfigMismatch {
        /// The optimizer that was being built
        expected: String,
        /// The config variant that was supplied
        got: String,
    },

    /// Invalid configuration parameter.
    #[error("Invalid parameter: {0}")]
    InvalidParameter(String),
}

/// Configuration for the supported optimizer types.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum OptimizerConfig {
    /// Stochastic Gradient Descent configuration.
    Sgd {
        /// Learning rate for gradient updates.
        learning_rate: f32,
    },

    /// Sparse Adam configuration.
    SparseAdam {
        /// Learning rate for gradient updates.
        learning_rate: f32,
        /// Exponential decay rate for first moment estimates.
        beta1: f32,
        /// Exponential decay rate for second moment estimates.
        beta2: f32,
        /// Small constant for numerical stability.
        epsilon: f32,
    },

    /// AdamW configuration.
    AdamW {
        /// Learning rate for gradient updates.
        learning_rate: f32,
        /// Exponential decay rate for first moment estimates.
        beta1: f32,
        /// Exponential decay rate for second moment estimates.
        beta2: f32,
        /// Small constant for numerical stability.
        epsilon: f32,
        /// Decoupled weight decay coefficient.
        weight_decay: f32,
    },
}

impl OptimizerConfig {
    /// Sparse Adam with the usual defaults.
    pub fn sparse_adam(learning_rate: f32) -> Self {
        OptimizerConfig::SparseAdam {
            learning_rate,
            beta1: 0.9,
            beta2: 0.999,
            epsilon: 1e-8,
        }
    }

    /// AdamW with the usual defaults.
    pub fn adamw(learning_rate: f32) -> Self {
        OptimizerConfig::AdamW {
            learning_rate,
            beta1: 0.9,
            beta2: 0.999,
            epsilon: 1e-8,
            weight_decay: 0.01,
        }
    }

    /// Returns the name of the optimizer type.
    pub fn name(&self) -> &'static str {
        match self {
            OptimizerConfig::Sgd { .. } => "Sgd",
            OptimizerConfig::SparseAdam { .. } => "SparseAdam",
            OptimizerConfig::AdamW { .. } => "AdamW",
        }
    }

    /// Returns the learning rate for the optimizer.
    pub fn learning_rate(&self) -> f32 {
        match self {
            OptimizerConfig::Sgd { learning_rate } => *learning_rate,
            OptimizerConfig::SparseAdam { learning_rate, .. } => *learning_rate,
            OptimizerConfig::AdamW { learning_rate, .. } => *learning_rate,
        }
    }

    /// Returns true if the optimizer only updates rows with gradients.
    pub fn is_sparse(&self) -> bool {
        !matches!(self, OptimizerConfig::AdamW { .. })
    }

    /// Checks parameter ranges.
    pub fn validate(&self) -> Result<(), OptimizerError> {
        let learning_rate = self.learning_rate();
        if !(learning_rate.is_finite() && learning_rate > 0.0) {
            return Err(OptimizerError::InvalidParameter(format!(
                "learning_rate must be positive, got {learning_rate}"
            )));
        }
        match *self {
            OptimizerConfig::Sgd { .. } => Ok(()),
            OptimizerConfig::SparseAdam {
                beta1,
                beta2,
                epsilon,
                ..
            } => validate_adam(beta1, beta2, epsilon),
            OptimizerConfig::AdamW {
                beta1,
                beta2,
                epsilon,
                weight_decay,
                ..
            } => {
                validate_adam(beta1, beta2, epsilon)?;
                if !(weight_decay.is_finite() && weight_decay >= 0.0) {
                    return Err(OptimizerError::InvalidParameter(format!(
                        "weight_decay must be non-negative, got {weight_decay}"
                    )));
                }
                Ok(())
            }
        }
    }
}

fn validate_adam(beta1: f32, beta2: f32, epsilon: f32) -> Result<(), OptimizerError> {
    for (name, beta) in [("beta1", beta1), ("beta2", beta2)] {
        if !(0.0..1.0).contains(&beta) {
            return Err(OptimizerError::InvalidParameter(format!(
                "{name} must be in [0, 1), got {beta}"
            )));
        }
    }
    if !(epsilon.is_finite() && epsilon > 0.0) {
        return Err(OptimizerError::InvalidParameter(format!(
            "epsilon must be positive, got {epsilon}"
        )));
    }
    Ok(())
}

/// Trait for embedding-table optimizers.
///
/// A training step calls [`Optimizer::begin_step`] once, then
/// [`Optimizer::apply_gradients`] for each row to update.
pub trait Optimizer: Sized {
    /// Creates a new optimizer from the given configuration.
    ///
    /// # Errors
    ///
    /// Returns [`OptimizerError::ConfigMismatch`] if the configuration type
    /// does not match the optimizer type, and
    /// [`OptimizerError::InvalidParameter`] for out-of-range parameters.
    fn new(config: OptimizerConfig) -> Result<Self, OptimizerError>;

    /// Advances the step counter shared by all rows.
    fn begin_step(&mut self) {}

    /// Applies gradients to the row stored in `slot`.
    ///
    /// # Panics
    ///
    /// May panic if `embedding` and `gradients` have different lengths.
    fn apply_gradients(&mut self, slot: u64, embedding: &mut [f32], gradients: &[f32]);

    /// Returns a reference to the optimizer's configuration.
    fn config(&self) -> &OptimizerConfig;

    /// Returns true if only rows with gradients need to be visited.
    fn is_sparse(&self) -> bool {
        self.config().is_sparse()
    }
}

/// Creates an optimizer from the given configuration.
///
/// # Example
///
/// ```
/// use mf_optimizer::{create_optimizer, OptimizerConfig};
///
/// let optimizer = create_optimizer(OptimizerConfig::sparse_adam(0.1)).unwrap();
/// assert!(optimizer.is_sparse());
/// ```
pub fn create_optimizer(config: OptimizerConfig) -> Result<Box<dyn OptimizerDyn>, OptimizerError> {
    Ok(match &config {
        OptimizerConfig::Sgd { .. } => Box::new(Sgd::new(config)?),
        OptimizerConfig::SparseAdam { .. } => Box::new(SparseAdam::new(config)?),
        OptimizerConfig::AdamW { .. } => Box::new(AdamW::new(config)?),
    })
}

/// Dynamic dispatch version of the Optimizer trait.
pub trait OptimizerDyn: Send + std::fmt::Debug {
    /// Advances the step counter shared by all rows.
    fn begin_step(&mut self);

    /// Applies gradients to the row stored in `slot`.
    fn apply_gradients(&mut self, slot: u64, embedding: &mut [f32], gradients: &[f32]);

    /// Returns a reference to the optimizer's configuration.
    fn config(&self) -> &OptimizerConfig;

    /// Returns true if only rows with gradients need to be visited.
    fn is_sparse(&self) -> bool;
}

impl<T: Optimizer + Send + std::fmt::Debug> OptimizerDyn for T {
    fn begin_step(&mut self) {
        Optimizer::begin_step(self)
    }

    fn apply_gradients(&mut self, slot: u64, embedding: &mut [f32], gradients: &[f32]) {
        Optimizer::apply_gradients(self, slot, embedding, gradients)
    }

    fn config(&self) -> &OptimizerConfig {
        Optimizer::config(self)
    }

    fn is_sparse(&self) -> bool {
        Optimizer::is_sparse(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_optimizer_config_name() {
        assert_eq!(OptimizerConfig::Sgd { learning_rate: 0.01 }.name(), "Sgd");
        assert_eq!(OptimizerConfig::sparse_adam(0.1).name(), "SparseAdam");
        assert_eq!(OptimizerConfig::adamw(0.1).name(), "AdamW");
    }

    #[test]
    fn test_optimizer_config_learning_rate() {
        let sgd = OptimizerConfig::Sgd { learning_rate: 0.01 };
        assert!((sgd.learning_rate() - 0.01).abs() < 1e-6);
        assert!((OptimizerConfig::adamw(0.05).learning_rate() - 0.05).abs() < 1e-6);
    }

    #[test]
    fn test_sparsity() {
        assert!(OptimizerConfig::Sgd { learning_rate: 0.1 }.is_sparse());
        assert!(OptimizerConfig::sparse_adam(0.1).is_sparse());
        assert!(!OptimizerConfig::adamw(0.1).is_sparse());
    }

    #[test]
    fn test_validate() {
        assert!(OptimizerConfig::Sgd { learning_rate: 0.0 }.validate().is_err());
        assert!(OptimizerConfig::SparseAdam {
            learning_rate: 0.1,
            beta1: 1.0,
            beta2: 0.999,
            epsilon: 1e-8,
        }
        .validate()
        .is_err());
        assert!(OptimizerConfig::AdamW {
            learning_rate: 0.1,
            beta1: 0.9,
            beta2: 0.999,
            epsilon: 1e-8,
            weight_decay: -0.1,
        }
        .validate()
        .is_err());
        assert!(OptimizerConfig::adamw(0.1).validate().is_ok());
    }

    #[test]
    fn test_create_optimizer() {
        let mut optimizer = create_optimizer(OptimizerConfig::Sgd { learning_rate: 0.01 }).unwrap();

        let mut embedding = vec![1.0, 2.0];
        optimizer.begin_step();
        optimizer.apply_gradients(0, &mut embedding, &[1.0, 1.0]);

        assert!(embedding[0] < 1.0);
        assert!(embedding[1] < 2.0);
    }

    #[test]
    fn test_create_all_optimizer_types() {
        let configs = vec![
            OptimizerConfig::Sgd { learning_rate: 0.01 },
            OptimizerConfig::sparse_adam(0.001),
            OptimizerConfig::adamw(0.001),
        ];
        for config in configs {
            let optimizer = create_optimizer(config.clone()).unwrap();
            assert_eq!(optimizer.config().name(), config.name());
        }
    }

    #[test]
    fn test_create_optimizer_rejects_invalid_params() {
        assert!(matches!(
            create_optimizer(OptimizerConfig::Sgd { learning_rate: -1.0 }),
            Err(OptimizerError::InvalidParameter(_))
        ));
    }

    #[test]
    fn test_optimizer_config_serialization() {
        let config = OptimizerConfig::sparse_adam(0.001);
        let serialized = serde_json::to_string(&config).unwrap();
        let deserialized: OptimizerConfig = serde_json::from_str(&serialized).unwrap();
        assert_eq!(config, deserialized);
    }
}
