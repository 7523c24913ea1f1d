//! Pairwise ranking losses over (positive, negative) item pairs.

use crate::base::{sigmoid, softplus, EmbeddingLoss, GradientBuilder, LossInput, LossOutput, Reduction};
use crate::config::LossConfig;
use crate::error::LossResult;
use crate::negatives::NegativePools;

/// Penalty applied to the margin violation `x = s_ij - s_ii + m`.
trait PairPenalty {
    fn value(x: f32) -> f32;
    fn derivative(x: f32) -> f32;
}

struct Hinge;

impl PairPenalty for Hinge {
    fn value(x: f32) -> f32 {
        x.max(0.0)
    }

    fn derivative(x: f32) -> f32 {
        if x > 0.0 {
            1.0
        } else {
            0.0
        }
    }
}

struct Logistic;

impl PairPenalty for Logistic {
    fn value(x: f32) -> f32 {
        softplus(x)
    }

    fn derivative(x: f32) -> f32 {
        sigmoid(x)
    }
}

/// Per user, the mean penalty over its negative pool.
fn pairwise<P: PairPenalty>(
    input: &LossInput<'_>,
    margin: f32,
    hard_negatives_ratio: Option<f32>,
    reduction: Reduction,
) -> LossResult<LossOutput> {
    input.validate()?;
    let scores = input.scores()?;
    let pools = NegativePools::build(input.item_idx, &scores, hard_negatives_ratio);
    let coefficients = reduction.coefficients(input.sample_weight);
    let mut grads = GradientBuilder::new(input);
    let mut value = 0.0;
    for (i, pool) in pools.iter() {
        if pool.is_empty() {
            continue;
        }
        let scale = coefficients[i] / pool.len() as f32;
        let row = scores.row(i);
        let mut positive_grad = 0.0;
        for &j in pool {
            let x = row[j] - row[i] + margin;
            value += scale * P::value(x);
            let g = scale * P::derivative(x);
            grads.score(i, j, g);
            positive_grad -= g;
        }
        grads.score(i, i, positive_grad);
    }
    Ok(grads.finish(value))
}

/// `max(0, s_ij - s_ii + m)` averaged over each user's negatives.
#[derive(Debug, Clone)]
pub struct PairwiseHingeLoss {
    margin: f32,
    hard_negatives_ratio: Option<f32>,
    reduction: Reduction,
}

impl PairwiseHingeLoss {
    /// Creates the loss from the shared config.
    pub fn new(config: &LossConfig) -> Self {
        Self {
            margin: config.hinge_margin,
            hard_negatives_ratio: config.hard_negatives_ratio,
            reduction: config.reduction,
        }
    }
}

impl Default for PairwiseHingeLoss {
    fn default() -> Self {
        Self::new(&LossConfig::default())
    }
}

impl EmbeddingLoss for PairwiseHingeLoss {
    fn name(&self) -> &'static str {
        "PairwiseHingeLoss"
    }

    fn forward_backward(&self, input: &LossInput<'_>) -> LossResult<LossOutput> {
        pairwise::<Hinge>(input, self.margin, self.hard_negatives_ratio, self.reduction)
    }
}

/// `ln(1 + exp(s_ij - s_ii + m))` averaged over each user's negatives.
#[derive(Debug, Clone)]
pub struct PairwiseLogisticLoss {
    margin: f32,
    hard_negatives_ratio: Option<f32>,
    reduction: Reduction,
}

impl PairwiseLogisticLoss {
    /// Creates the loss from the shared config.
    pub fn new(config: &LossConfig) -> Self {
        Self {
            margin: config.logistic_margin,
            hard_negatives_ratio: config.hard_negatives_ratio,
            reduction: config.reduction,
        }
    }
}

impl Default for PairwiseLogisticLoss {
    fn default() -> Self {
        Self::new(&LossConfig::default())
    }
}

impl EmbeddingLoss for PairwiseLogisticLoss {
    fn name(&self) -> &'static str {
        "PairwiseLogisticLoss"
    }

    fn forward_backward(&self, input: &LossInput<'_>) -> LossResult<LossOutput> {
        pairwise::<Logistic>(input, self.margin, self.hard_negatives_ratio, self.reduction)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{check_gradients, Fixture};
    use mf_layers::Tensor;

    fn two_by_two() -> (Tensor, Tensor) {
        // s = [[1, 0.5], [0, 1]]
        (
            Tensor::from_data(&[2, 2], vec![1.0, 0.5, 0.0, 1.0]),
            Tensor::from_data(&[2, 2], vec![1.0, 0.0, 0.0, 1.0]),
        )
    }

    #[test]
    fn test_hinge_value() {
        let (users, items) = two_by_two();
        let input = LossInput::new(&users, &items, &[1.0, 1.0], &[1.0, 1.0], &[0, 1], &[0, 1]);
        // user 0: max(0, 0.5 - 1 + 1) = 0.5, user 1: max(0, 0 - 1 + 1) = 0
        let value = PairwiseHingeLoss::default().forward(&input).unwrap();
        assert!((value - 0.25).abs() < 1e-6);
    }

    #[test]
    fn test_logistic_value() {
        let (users, items) = two_by_two();
        let input = LossInput::new(&users, &items, &[1.0, 1.0], &[1.0, 1.0], &[0, 1], &[0, 1]);
        let expected = ((1.0 + (-0.5f32).exp()).ln() + (1.0 + (-1.0f32).exp()).ln()) / 2.0;
        let value = PairwiseLogisticLoss::default().forward(&input).unwrap();
        assert!((value - expected).abs() < 1e-6);
    }

    #[test]
    fn test_sum_reduction_scales_with_weights() {
        let fixture = Fixture::random(4, 2, 3, 3);
        let doubled = fixture.with_weight(fixture.weight.iter().map(|w| 2.0 * w).collect());
        let sum = LossConfig::default().with_reduction(Reduction::Sum);
        let hinge = PairwiseHingeLoss::new(&sum);
        let a = hinge.forward(&fixture.input()).unwrap();
        let b = hinge.forward(&doubled.input()).unwrap();
        assert!(a > 0.0);
        assert!((b - 2.0 * a).abs() < 1e-4);

        let mean = PairwiseHingeLoss::default();
        let a = mean.forward(&fixture.input()).unwrap();
        let b = mean.forward(&doubled.input()).unwrap();
        assert!((a - b).abs() < 1e-5);
    }

    #[test]
    fn test_hard_negatives_focus_on_highest_scores() {
        // user 0 scores its negatives 3, 0, -3; keeping a third leaves the 3
        let users = Tensor::from_data(&[1, 1], vec![1.0]);
        let items = Tensor::from_data(&[4, 1], vec![0.0, 3.0, 0.0, -3.0]);
        let input = LossInput::new(&users, &items, &[1.0], &[1.0], &[0], &[0, 1, 2, 3]);
        let all = PairwiseHingeLoss::default().forward(&input).unwrap();
        let hard = PairwiseHingeLoss::new(&LossConfig::default().with_hard_negatives_ratio(Some(0.3)))
            .forward(&input)
            .unwrap();
        assert!((all - (4.0 + 1.0 + 0.0) / 3.0).abs() < 1e-6);
        assert!((hard - 4.0).abs() < 1e-6);
    }

    #[test]
    fn test_gradients() {
        let fixture = Fixture::random(4, 2, 3, 31);
        check_gradients(&PairwiseHingeLoss::default(), &fixture);
        check_gradients(&PairwiseLogisticLoss::default(), &fixture);
    }
}
