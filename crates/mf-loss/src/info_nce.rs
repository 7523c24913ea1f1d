//! Information noise-contrastive estimation.

use crate::base::{EmbeddingLoss, GradientBuilder, LossInput, LossOutput, Reduction};
use crate::config::LossConfig;
use crate::error::LossResult;
use crate::negatives::NegativePools;

/// Softmax cross-entropy that classifies the positive item of each user
/// against its negative pool, with logits `s_ij / tau`.
///
/// Per user: `logsumexp_{j in {i} + pool} (s_ij / tau) - s_ii / tau`.
/// A user with an empty pool has a single candidate and contributes zero.
#[derive(Debug, Clone)]
pub struct InformationNoiseContrastiveEstimationLoss {
    temperature: f32,
    hard_negatives_ratio: Option<f32>,
    reduction: Reduction,
}

impl InformationNoiseContrastiveEstimationLoss {
    /// Creates the loss from the shared config.
    pub fn new(config: &LossConfig) -> Self {
        Self {
            temperature: config.info_nce_temperature,
            hard_negatives_ratio: config.hard_negatives_ratio,
            reduction: config.reduction,
        }
    }
}

impl Default for InformationNoiseContrastiveEstimationLoss {
    fn default() -> Self {
        Self::new(&LossConfig::default())
    }
}

impl EmbeddingLoss for InformationNoiseContrastiveEstimationLoss {
    fn name(&self) -> &'static str {
        "InformationNoiseContrastiveEstimationLoss"
    }

    fn forward_backward(&self, input: &LossInput<'_>) -> LossResult<LossOutput> {
        input.validate()?;
        let scores = input.scores()?;
        let pools = NegativePools::build(input.item_idx, &scores, self.hard_negatives_ratio);
        let coefficients = self.reduction.coefficients(input.sample_weight);
        let inv_tau = 1.0 / self.temperature;
        let mut grads = GradientBuilder::new(input);
        let mut value = 0.0;

        for (i, pool) in pools.iter() {
            if pool.is_empty() {
                continue;
            }
            let row = scores.row(i);
            let positive = row[i] * inv_tau;
            let max_logit = pool
                .iter()
                .map(|&j| row[j] * inv_tau)
                .fold(positive, f32::max);
            let pos_exp = (positive - max_logit).exp();
            let neg_exps: Vec<f32> = pool
                .iter()
                .map(|&j| (row[j] * inv_tau - max_logit).exp())
                .collect();
            let total = pos_exp + neg_exps.iter().sum::<f32>();
            let loss_i = (max_logit + total.ln() - positive).max(0.0);
            value += coefficients[i] * loss_i;

            let c = coefficients[i] * inv_tau;
            grads.score(i, i, c * (pos_exp / total - 1.0));
            for (&j, &e) in pool.iter().zip(&neg_exps) {
                grads.score(i, j, c * e / total);
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
    fn test_two_candidates() {
        // s_00 = 1, s_01 = 0 with tau = 1: ln(e + 1) - 1
        let users = Tensor::from_data(&[2, 2], vec![1.0, 0.0, 0.0, 1.0]);
        let items = Tensor::from_data(&[2, 2], vec![1.0, 0.0, 0.0, 1.0]);
        let input = LossInput::new(&users, &items, &[1.0, 1.0], &[1.0, 1.0], &[0, 1], &[0, 1]);
        let loss =
            InformationNoiseContrastiveEstimationLoss::new(&LossConfig::default().with_info_nce_temperature(1.0));
        let expected = (1.0f32.exp() + 1.0).ln() - 1.0;
        assert!((loss.forward(&input).unwrap() - expected).abs() < 1e-6);
    }

    #[test]
    fn test_sharp_temperature_stays_finite() {
        let users = Tensor::from_data(&[2, 1], vec![50.0, -50.0]);
        let items = Tensor::from_data(&[2, 1], vec![-50.0, 50.0]);
        let input = LossInput::new(&users, &items, &[1.0, 1.0], &[1.0, 1.0], &[0, 1], &[0, 1]);
        let out = InformationNoiseContrastiveEstimationLoss::default()
            .forward_backward(&input)
            .unwrap();
        assert!(out.value.is_finite() && out.value > 0.0);
        assert!(out.user_grad.is_finite() && out.item_grad.is_finite());
    }

    #[test]
    fn test_empty_pools_give_zero() {
        let embed = Tensor::from_data(&[2, 1], vec![1.0, 2.0]);
        let input = LossInput::new(&embed, &embed, &[1.0, 1.0], &[1.0, 1.0], &[0, 1], &[4, 4]);
        let out = InformationNoiseContrastiveEstimationLoss::default()
            .forward_backward(&input)
            .unwrap();
        assert_eq!(out.value, 0.0);
    }

    #[test]
    fn test_gradients() {
        let fixture = Fixture::random(3, 2, 3, 17).normalized();
        check_gradients(&InformationNoiseContrastiveEstimationLoss::default(), &fixture);
    }
}
