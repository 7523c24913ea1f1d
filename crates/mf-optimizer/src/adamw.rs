//! AdamW optimizer.
//!
//! Adam with decoupled weight decay: each update first shrinks the weights by
//! `1 - learning_rate * weight_decay`, then applies the Adam step. AdamW is a
//! dense optimizer: every row is visited each step, with a zero gradient for
//! rows the batch did not touch, so moments and decay keep evolving.

use std::collections::HashMap;

use crate::adam::{adam_update, Moments};
use crate::{Optimizer, OptimizerConfig, OptimizerError};
use serde::{Deserialize, Serialize};

/// Adam with decoupled weight decay.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AdamW {
    learning_rate: f32,
    beta1: f32,
    beta2: f32,
    epsilon: f32,
    weight_decay: f32,
    state: HashMap<u64, Moments>,
    t: u64,
    config: OptimizerConfig,
}

impl AdamW {
    /// Returns the current timestep.
    pub fn timestep(&self) -> u64 {
        self.t
    }

    /// Returns the number of rows with optimizer state.
    pub fn num_slots(&self) -> usize {
        self.state.len()
    }
}

impl Optimizer for AdamW {
    fn new(config: OptimizerConfig) -> Result<Self, OptimizerError> {
        match config {
            OptimizerConfig::AdamW {
                learning_rate,
                beta1,
                beta2,
                epsilon,
                weight_decay,
            } => {
                config.validate()?;
                Ok(Self {
                    learning_rate,
                    beta1,
                    beta2,
                    epsilon,
                    weight_decay,
                    state: HashMap::new(),
                    t: 0,
                    config,
                })
            }
            _ => Err(OptimizerError::ConfigMismatch {
                expected: "AdamW".to_string(),
                got: config.name().to_string(),
            }),
        }
    }

    fn begin_step(&mut self) {
        self.t += 1;
    }

    fn apply_gradients(&mut self, slot: u64, embedding: &mut [f32], gradients: &[f32]) {
        let decay = 1.0 - self.learning_rate * self.weight_decay;
        embedding.iter_mut().for_each(|e| *e *= decay);

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
