//! Plain gradient descent on table rows.
//!
//! Stateless, so it only ever needs the rows a batch touched.
//!
//! # Example
//!
//! ```
//! use mf_optimizer::{Optimizer, OptimizerConfig, Sgd};
//!
//! let mut sgd = Sgd::new(OptimizerConfig::Sgd { learning_rate: 0.5 }).unwrap();
//! let mut row = vec![1.0, -1.0];
//! sgd.apply_gradients(0, &mut row, &[2.0, 2.0]);
//! assert_eq!(row, vec![0.0, -2.0]);
//! ```

use crate::{Optimizer, OptimizerConfig, OptimizerError};
use serde::{Deserialize, Serialize};

/// `row -= learning_rate * gradient`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Sgd {
    learning_rate: f32,
    config: OptimizerConfig,
}

impl Optimizer for Sgd {
    fn new(config: OptimizerConfig) -> Result<Self, OptimizerError> {
        let OptimizerConfig::Sgd { learning_rate } = config else {
            return Err(OptimizerError::ConfigMismatch {
                expected: "Sgd".to_string(),
                got: config.name().to_string(),
            });
        };
        config.validate()?;
        Ok(Self {
            learning_rate,
            config,
        })
    }

    fn apply_gradients(&mut self, _slot: u64, embedding: &mut [f32], gradients: &[f32]) {
        let lr = self.learning_rate;
        embedding
            .iter_mut()
            .zip(gradients)
            .for_each(|(e, g)| *e -= lr * g);
    }

    fn config(&self) -> &OptimizerConfig {
        &self.config
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_step_ignores_slot() {
        let mut sgd = Sgd::new(OptimizerConfig::Sgd { learning_rate: 0.1 }).unwrap();
        let mut a = vec![1.0, 2.0];
        let mut b = vec![1.0, 2.0];
        sgd.apply_gradients(3, &mut a, &[1.0, -1.0]);
        sgd.apply_gradients(99, &mut b, &[1.0, -1.0]);
        assert_eq!(a, b);
        assert!((a[0] - 0.9).abs() < 1e-6);
        assert!((a[1] - 2.1).abs() < 1e-6);
    }

    #[test]
    fn test_rejects_other_configs() {
        assert!(matches!(
            Sgd::new(OptimizerConfig::sparse_adam(0.001)),
            Err(OptimizerError::ConfigMismatch { .. })
        ));
        assert!(matches!(
            Sgd::new(OptimizerConfig::Sgd { learning_rate: 0.0 }),
            Err(OptimizerError::InvalidParameter(_))
        ));
    }
}
