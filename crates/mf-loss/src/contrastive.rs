//! Contrastive loss: pushes users away from non-matching items.

use crate::base::{EmbeddingLoss, GradientBuilder, LossInput, LossOutput, Reduction};
use crate::config::LossConfig;
use crate::error::LossResult;
use crate::negatives::NegativePools;
use mf_layers::tensor::squared_distance;

/// Per user, the mean over its negative pool of `max(0, m - |u_i - v_j|^2)`.
///
/// Users with an empty pool contribute zero.
#[derive(Debug, Clone)]
pub struct ContrastiveLoss {
    margin: f32,
    hard_negatives_ratio: Option<f32>,
    reduction: Reduction,
}

impl ContrastiveLoss {
    /// Creates the loss from the shared config.
    pub fn new(config: &LossConfig) -> Self {
        Self {
            margin: config.contrastive_margin,
            hard_negatives_ratio: config.hard_negatives_ratio,
            reduction: config.reduction,
        }
    }
}

impl Default for ContrastiveLoss {
    fn default() -> Self {
        Self::new(&LossConfig::default())
    }
}

impl EmbeddingLoss for ContrastiveLoss {
    fn name(&self) -> &'static str {
        "ContrastiveLoss"
    }

    fn forward_backward(&self, input: &LossInput<'_>) -> LossResult<LossOutput> {
        input.validate()?;
        let scores = input.scores()?;
        let pools = NegativePools::build(input.item_idx, &scores, self.hard_negatives_ratio);
        let coefficients = self.reduction.coefficients(input.sample_weight);
        let mut grads = GradientBuilder::new(input);
        let mut value = 0.0;
        for (i, pool) in pools.iter() {
            if pool.is_empty() {
                continue;
            }
            let scale = coefficients[i] / pool.len() as f32;
            for &j in pool {
                let gap =
                    self.margin - squared_distance(input.user_embed.row(i), input.item_embed.row(j));
                if gap > 0.0 {
                    value += scale * gap;
                    grads.user_item_distance(i, j, -scale);
                }
            }
        }
        Ok(grads.finish(value))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{check_gradients, Fixture};
    use mf_layers::Tensor;

    #[test]
    fn test_far_negatives_cost_nothing() {
        let users = Tensor::from_data(&[2, 1], vec![0.0, 5.0]);
        let items = Tensor::from_data(&[2, 1], vec![0.0, 5.0]);
        let input = LossInput::new(&users, &items, &[1.0, 1.0], &[1.0, 1.0], &[0, 1], &[0, 1]);
        assert_eq!(ContrastiveLoss::default().forward(&input).unwrap(), 0.0);
    }

    #[test]
    fn test_close_negative_is_penalized() {
        // user 0 sits 0.5 from item 1: margin 1 - 0.25
        let users = Tensor::from_data(&[2, 1], vec![0.0, 10.0]);
        let items = Tensor::from_data(&[2, 1], vec![0.0, 0.5]);
        let input = LossInput::new(&users, &items, &[1.0, 1.0], &[1.0, 1.0], &[0, 1], &[0, 1]);
        let value = ContrastiveLoss::default().forward(&input).unwrap();
        assert!((value - 0.75 / 2.0).abs() < 1e-6);
    }

    #[test]
    fn test_empty_pools_give_zero() {
        let embed = Tensor::from_data(&[2, 2], vec![0.1, 0.2, 0.3, 0.4]);
        let input = LossInput::new(&embed, &embed, &[1.0, 1.0], &[1.0, 1.0], &[0, 1], &[9, 9]);
        let out = ContrastiveLoss::default().forward_backward(&input).unwrap();
        assert_eq!(out.value, 0.0);
        assert!(out.value.is_finite());
    }

    #[test]
    fn test_gradients() {
        let fixture = Fixture::random(4, 2, 3, 11).normalized();
        check_gradients(&ContrastiveLoss::default(), &fixture);
    }
}
