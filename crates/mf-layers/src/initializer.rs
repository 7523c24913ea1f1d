//! Weight initialization for embedding tables.

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rand_distr::{Distribution, Normal};
use serde::{Deserialize, Serialize};

use crate::error::{LayerError, LayerResult};
use crate::tensor::Tensor;

/// Initialization strategy for a `[num_buckets, dim]` table.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum Initializer {
    /// Samples from `N(mean, std^2)`. The default is the standard normal.
    Normal { mean: f32, std: f32 },
    /// Samples uniformly from `[low, high)`.
    Uniform { low: f32, high: f32 },
    /// All zeros.
    Zeros,
    /// Constant value.
    Constant(f32),
    /// Ones on the diagonal (`W[i][i] = 1` for `i < min(rows, dim)`), zeros elsewhere.
    Identity,
}

impl Default for Initializer {
    fn default() -> Self {
        Initializer::Normal {
            mean: 0.0,
            std: 1.0,
        }
    }
}

impl Initializer {
    /// Creates a tensor of the given shape.
    ///
    /// With `seed` set the result is reproducible; otherwise the generator is
    /// seeded from the OS.
    pub fn initialize(&self, shape: &[usize], seed: Option<u64>) -> LayerResult<Tensor> {
        let numel: usize = shape.iter().product();
        let mut rng = match seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };
        let data = match *self {
            Initializer::Normal { mean, std } => {
                let normal = Normal::new(mean, std).map_err(|e| {
                    LayerError::InitializationError {
                        message: format!("invalid normal distribution: {e}"),
                    }
                })?;
                (0..numel).map(|_| normal.sample(&mut rng)).collect()
            }
            Initializer::Uniform { low, high } => {
                if low.partial_cmp(&high) != Some(std::cmp::Ordering::Less) {
                    return Err(LayerError::InitializationError {
                        message: format!("uniform bounds must satisfy low < high, got [{low}, {high})"),
                    });
                }
                (0..numel).map(|_| rng.gen_range(low..high)).collect()
            }
            Initializer::Zeros => vec![0.0; numel],
            Initializer::Constant(value) => vec![value; numel],
            Initializer::Identity => {
                let mut data = vec![0.0; numel];
                if shape.len() == 2 {
                    let (rows, cols) = (shape[0], shape[1]);
                    for i in 0..rows.min(cols) {
                        data[i * cols + i] = 1.0;
                    }
                }
                data
            }
        };
        Ok(Tensor::from_data(shape, data))
    }

    /// Name used in logs.
    pub fn name(&self) -> &'static str {
        match self {
            Initializer::Normal { .. } => "normal",
            Initializer::Uniform { .. } => "uniform",
            Initializer::Zeros => "zeros",
            Initializer::Constant(_) => "constant",
            Initializer::Identity => "identity",
        }
    }
}
