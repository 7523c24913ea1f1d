//! Uniformity loss: spreads item embeddings over the unit sphere.

use crate::base::{EmbeddingLoss, GradientBuilder, LossInput, LossOutput};
use crate::config::LossConfig;
use crate::error::LossResult;
use mf_layers::tensor::squared_distance;

/// Largest squared distance between two unit vectors.
const MAX_SQUARED_DISTANCE: f32 = 4.0;

/// Log of the mean Gaussian potential `exp(-t |v_j - v_k|^2)` over all item
/// pairs `j < k` of the batch.
///
/// On the unit sphere `|v_j - v_k|^2 <= 4`, so the raw estimate is at least
/// `-4t`. That bound is added as a constant offset: collapsed items report
/// `4t` and perfectly spread items approach zero. Values below zero, which
/// only unnormalized items can reach, are clamped. The loss is a batch
/// statistic over items: labels and sample weights do not enter it, and
/// fewer than two items give zero.
#[derive(Debug, Clone)]
pub struct UniformityLoss {
    temperature: f32,
}

impl UniformityLoss {
    /// Creates the loss from the shared config.
    pub fn new(config: &LossConfig) -> Self {
        Self {
            temperature: config.uniformity_temperature,
        }
    }

    /// The constant offset `4t`.
    pub fn offset(&self) -> f32 {
        MAX_SQUARED_DISTANCE * self.temperature
    }
}

impl Default for UniformityLoss {
    fn default() -> Self {
        Self::new(&LossConfig::default())
    }
}

fn pairwise_distances<'a>(
    input: &'a LossInput<'a>,
) -> impl Iterator<Item = (usize, usize, f32)> + 'a {
    let items = input.item_embed;
    (0..items.rows()).flat_map(move |j| {
        (j + 1..items.rows()).map(move |k| (j, k, squared_distance(items.row(j), items.row(k))))
    })
}

impl EmbeddingLoss for UniformityLoss {
    fn name(&self) -> &'static str {
        "UniformityLoss"
    }

    fn forward_backward(&self, input: &LossInput<'_>) -> LossResult<LossOutput> {
        input.validate()?;
        if input.num_items() < 2 {
            return Ok(LossOutput::zero(input));
        }
        let t = self.temperature;
        let pairs: Vec<(usize, usize, f32)> = pairwise_distances(input).collect();
        let max_logit = pairs
            .iter()
            .map(|&(_, _, d)| -t * d)
            .fold(f32::NEG_INFINITY, f32::max);
        let exps: Vec<f32> = pairs.iter().map(|&(_, _, d)| (-t * d - max_logit).exp()).collect();
        let total: f32 = exps.iter().sum();
        let log_mean = max_logit + total.ln() - (pairs.len() as f32).ln();
        let value = (log_mean + self.offset()).max(0.0);

        let mut grads = GradientBuilder::new(input);
        for (&(j, k, _), &e) in pairs.iter().zip(&exps) {
            grads.item_item_distance(j, k, -t * e / total);
        }
        Ok(grads.finish(value))
    }
}
