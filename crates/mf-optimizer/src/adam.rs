//! Sparse Adam optimizer.
//!
//! Adam (Adaptive Moment Estimation) keeps exponential moving averages of
//! the gradients (first moment) and squared gradients (second moment). The
//! sparse variant stores these moments per table row, creates them the first
//! time a row receives a gradient, and only updates rows that appear in the
//! current step. Bias correction uses the global step count.
//!
//! # Example
//!
//! ```
//! use mf_optimizer::{Optimizer, SparseAdam, OptimizerConfig};
//!
//! let mut adam = SparseAdam::new(OptimizerConfig::sparse_adam(0.001)).unwrap();
//! let mut embedding = vec![1.0, 2.0, 3.0];
//! adam.begin_step();
//! adam.apply_gradients(5, &mut embedding, &[0.1, 0.2, 0.3]);
//! assert_eq!(adam.num_slots(), 1);
//! ```

use std::collections::HashMap;

use crate::{Optimizer, OptimizerConfig, OptimizerError};
use serde::{Deserialize, Serialize};

/// Moment estimates of one row.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub(crate) struct Moments {
    /// First moment estimates (mean of gradients).
    pub m: Vec<f32>,
    /// Second moment estimates (mean of squared gradients).
    pub v: Vec<f32>,
}

impl Moments {
    pub(crate) fn zeros(dim: usize) -> Self {
        Self {
            m: vec![0.0; dim],
            v: vec![0.0; dim],
        }
    }
}

/// Adam with lazily created per-row moments.
///
/// Updates each row with a gradient using the formula:
/// ```text
/// m = beta1 * m + (1 - beta1) * gradient
/// v = beta2 * v + (1 - beta2) * gradient^2
/// m_hat = m / (1 - beta1^t)
/// v_hat = v / (1 - beta2^t)
/// embedding = embedding - learning_rate * m_hat / (sqrt(v_hat) + epsilon)
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SparseAdam {
    learning_rate: f32,
    beta1: f32,
    beta2: f32,
    epsilon: f32,
    /// Per-row moments, keyed by slot.
    state: HashMap<u64, Moments>,
    /// Current timestep for bias correction.
    t: u64,
    config: OptimizerConfig,
}

impl SparseAdam {
    /// Returns the current timestep.
    pub fn timestep(&self) -> u64 {
        self.t
    }

    /// Returns the number of rows with optimizer state.
    pub fn num_slots(&self) -> usize {
        self.state.len()
    }

    /// Returns the first moment of `slot`, if it has been updated.
    pub fn first_moment(&self, slot: u64) -> Option<&[f32]> {
        self.state.get(&slot).map(|s| s.m.as_slice())
    }

    /// Returns the second moment of `slot`, if it has been updated.
    pub fn second_moment(&self, slot: u64) -> Option<&[f32]> {
        self.state.get(&slot).map(|s| s.v.as_slice())
    }

    /// Resets the optimizer state.
    pub fn reset_state(&mut self) {
        self.state.clear();
        self.t = 0;
    }
}

/// One Adam update of `embedding` using `moments` at timestep `t`.
pub(crate) fn adam_update(
    moments: &mut Moments,
    embedding: &mut [f32],
    gradients: &[f32],
    (learning_rate, beta1, beta2, epsilon): (f32, f32, f32, f32),
    t: u64,
) {
    let t = t.max(1) as i32;
    let bias_correction1 = 1.0 - beta1.powi(t);
    let bias_correction2 = 1.0 - beta2.powi(t);

    for (i, (e, g)) in embedding.iter_mut().zip(gradients.iter()).enumerate() {
        moments.m[i] = beta1 * moments.m[i] + (1.0 - beta1) * g;
        moments.v[i] = beta2 * moments.v[i] + (1.0 - beta2) * g * g;

        let m_hat = moments.m[i] / bias_correction1;
        let v_hat = moments.v[i] / bias_correction2;

        *e -= learning_rate * m_hat / (v_hat.sqrt() + epsilon);
    }
}

impl Optimizer for SparseAdam {
    fn new(config: OptimizerConfig) -> Result<Self, OptimizerError> {
        match config {
            OptimizerConfig::SparseAdam {
                learning_rate,
                beta1,
                beta2,
                epsilon,
            } => {
                config.validate()?;
                Ok(Self {
                    learning_rate,
                    beta1,
                    beta2,
                    epsilon,
                    state: HashMap::new(),
                    t: 0,
                    config,
                })
            }
            _ => Err(OptimizerError::ConfigMismatch {
                expected: "SparseAdam".to_string(),
                got: config.name().to_string(),
            }),
        }
    }

    fn begin_step(&mut self) {
        self.t += 1;
    }

    fn apply_gradients(&mut self, slot: u64, embedding: &mut [f32], gradients: &[f32]) {
        let moments = self
            .state
            .entry(slot)
            .or_insert_with(|| Moments::zeros(embedding.len()));
        adam_update(
            moments,
            embedding,
            gradients,
            (self.learning_rate, self.beta1, self.beta2, self.epsilon),
            self.t,
        );
    }

    fn config(&self) -> &OptimizerConfig {
        &self.config
    }
}
