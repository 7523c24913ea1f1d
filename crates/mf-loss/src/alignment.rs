//! Alignment loss: pulls users toward their positive items.

use crate::base::{EmbeddingLoss, GradientBuilder, LossInput, LossOutput, Reduction};
use crate::config::LossConfig;
use crate::error::LossResult;
use mf_layers::tensor::squared_distance;

/// Weighted mean of `|u_i - v_i|^2` over the positive pairs.
///
/// Meaningful for unit-normalized embeddings, where it equals `2 - 2 s_ii`.
/// The loss is zero exactly when every user matches its positive item.
#[derive(Debug, Clone, Default)]
pub struct AlignmentLoss {
    reduction: Reduction,
}

impl AlignmentLoss {
    /// Creates the loss from the shared config.
    pub fn new(config: &LossConfig) -> Self {
        Self {
            reduction: config.reduction,
        }
    }
}

impl EmbeddingLoss for AlignmentLoss {
    fn name(&self) -> &'static str {
        "AlignmentLoss"
    }

    fn forward_backward(&self, input: &LossInput<'_>) -> LossResult<LossOutput> {
        input.validate()?;
        let coefficients = self.reduction.coefficients(input.sample_weight);
        let mut grads = GradientBuilder::new(input);
        let mut value = 0.0;
        for (i, &c) in coefficients.iter().enumerate() {
            value += c * squared_distance(input.user_embed.row(i), input.item_embed.row(i));
            grads.user_item_distance(i, i, c);
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
    fn test_zero_for_identical_pairs() {
        let embed = Tensor::from_data(&[2, 2], vec![1.0, 0.0, 0.0, 1.0]);
        let input = LossInput::new(&embed, &embed, &[1.0, 1.0], &[1.0, 1.0], &[0, 1], &[0, 1]);
        let out = AlignmentLoss::default().forward_backward(&input).unwrap();
        assert_eq!(out.value, 0.0);
        assert!(out.user_grad.data().iter().all(|&g| g == 0.0));
    }

    #[test]
    fn test_weighted_mean() {
        let users = Tensor::from_data(&[2, 1], vec![0.0, 0.0]);
        let items = Tensor::from_data(&[2, 1], vec![1.0, 2.0]);
        let input = LossInput::new(&users, &items, &[1.0, 1.0], &[3.0, 1.0], &[0, 1], &[0, 1]);
        let value = AlignmentLoss::default().forward(&input).unwrap();
        assert!((value - (3.0 * 1.0 + 1.0 * 4.0) / 4.0).abs() < 1e-6);
    }

    #[test]
    fn test_gradients() {
        let fixture = Fixture::random(4, 2, 3, 5);
        check_gradients(&AlignmentLoss::default(), &fixture);
    }
}
