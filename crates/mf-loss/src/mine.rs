//! Mutual information neural estimation.

use crate::base::{EmbeddingLoss, GradientBuilder, LossInput, LossOutput};
use crate::config::LossConfig;
use crate::error::LossResult;
use crate::negatives::NegativePools;

/// Largest gap between two dot products of unit vectors.
const MAX_SCORE_GAP: f32 = 2.0;

/// Donsker-Varadhan bound on the mutual information between users and items,
/// negated so that minimizing the loss maximizes the bound:
///
/// ```text
/// ln( sum_ij w_ij e^{s_ij} / sum_ij w_ij ) - sum_i w_i s_ii / sum_i w_i
/// ```
///
/// where `(i, j)` ranges over users and their negative pools and user `i`
/// spreads its weight evenly as `w_ij = w_i / |pool_i|`. With unit-norm
/// embeddings every score lies in `[-1, 1]`, so the bound is at least `-2`.
/// The constant offset `2` keeps the value non-negative while preserving
/// its order: aligned pairs approach zero, inverted pairs approach `4`.
/// Unnormalized embeddings can go below the bound and are clamped at zero.
/// The estimator is a batch statistic and always reduces by weighted mean.
#[derive(Debug, Clone)]
pub struct MutualInformationNeuralEstimationLoss {
    hard_negatives_ratio: Option<f32>,
}

impl MutualInformationNeuralEstimationLoss {
    /// Creates the loss from the shared config.
    pub fn new(config: &LossConfig) -> Self {
        Self {
            hard_negatives_ratio: config.hard_negatives_ratio,
        }
    }

    /// The constant offset added to the negated bound.
    pub fn offset(&self) -> f32 {
        MAX_SCORE_GAP
    }
}

impl Default for MutualInformationNeuralEstimationLoss {
    fn default() -> Self {
        Self::new(&LossConfig::default())
    }
}

impl EmbeddingLoss for MutualInformationNeuralEstimationLoss {
    fn name(&self) -> &'static str {
        "MutualInformationNeuralEstimationLoss"
    }

    fn forward_backward(&self, input: &LossInput<'_>) -> LossResult<LossOutput> {
        input.validate()?;
        let scores = input.scores()?;
        let pools = NegativePools::build(input.item_idx, &scores, self.hard_negatives_ratio);
        let weight_total: f32 = input.sample_weight.iter().sum();
        let negative_weight: f32 = pools
            .iter()
            .filter(|(_, pool)| !pool.is_empty())
            .map(|(i, _)| input.sample_weight[i])
            .sum();
        if pools.num_pairs() == 0 || weight_total <= 0.0 || negative_weight <= 0.0 {
            return Ok(LossOutput::zero(input));
        }

        let max_negative = pools
            .iter()
            .flat_map(|(i, pool)| pool.iter().map(move |&j| (i, j)))
            .map(|(i, j)| scores.row(i)[j])
            .fold(f32::NEG_INFINITY, f32::max);
        let mut terms = Vec::with_capacity(pools.num_pairs());
        let mut exp_total = 0.0;
        for (i, pool) in pools.iter() {
            let pair_weight = input.sample_weight[i] / pool.len().max(1) as f32;
            for &j in pool {
                let term = pair_weight * (scores.row(i)[j] - max_negative).exp();
                exp_total += term;
                terms.push((i, j, term));
            }
        }

        let mut grads = GradientBuilder::new(input);
        let negative_term = if exp_total > 0.0 {
            for &(i, j, term) in &terms {
                grads.score(i, j, term / exp_total);
            }
            max_negative + exp_total.ln() - negative_weight.ln()
        } else {
            max_negative
        };

        let mut positive_term = 0.0;
        for (i, &w) in input.sample_weight.iter().enumerate() {
            let c = w / weight_total;
            positive_term += c * scores.row(i)[i];
            grads.score(i, i, -c);
        }

        let value = (negative_term - positive_term + self.offset()).max(0.0);
        Ok(grads.finish(value))
    }
}
