//! Alignment combined with a repulsive term.

use crate::alignment::AlignmentLoss;
use crate::base::{EmbeddingLoss, LossInput, LossOutput};
use crate::config::LossConfig;
use crate::contrastive::ContrastiveLoss;
use crate::error::LossResult;
use crate::uniformity::UniformityLoss;

/// `alignment + weight * contrastive`.
#[derive(Debug, Clone)]
pub struct AlignmentContrastiveLoss {
    alignment: AlignmentLoss,
    contrastive: ContrastiveLoss,
    weight: f32,
}

impl AlignmentContrastiveLoss {
    /// Creates the loss from the shared config.
    pub fn new(config: &LossConfig) -> Self {
        Self {
            alignment: AlignmentLoss::new(config),
            contrastive: ContrastiveLoss::new(config),
            weight: config.contrastive_weight,
        }
    }
}

impl EmbeddingLoss for AlignmentContrastiveLoss {
    fn name(&self) -> &'static str {
        "AlignmentContrastiveLoss"
    }

    fn forward_backward(&self, input: &LossInput<'_>) -> LossResult<LossOutput> {
        let alignment = self.alignment.forward_backward(input)?;
        let contrastive = self.contrastive.forward_backward(input)?;
        alignment.combine(&contrastive, self.weight)
    }
}

/// `alignment + weight * uniformity`.
#[derive(Debug, Clone)]
pub struct AlignmentUniformityLoss {
    alignment: AlignmentLoss,
    uniformity: UniformityLoss,
    weight: f32,
}

impl AlignmentUniformityLoss {
    /// Creates the loss from the shared config.
    pub fn new(config: &LossConfig) -> Self {
        Self {
            alignment: AlignmentLoss::new(config),
            uniformity: UniformityLoss::new(config),
            weight: config.uniformity_weight,
        }
    }

    /// Gradient-free part of the value, inherited from the uniformity term.
    pub fn offset(&self) -> f32 {
        self.weight * self.uniformity.offset()
    }
}

impl EmbeddingLoss for AlignmentUniformityLoss {
    fn name(&self) -> &'static str {
        "AlignmentUniformityLoss"
    }

    fn forward_backward(&self, input: &LossInput<'_>) -> LossResult<LossOutput> {
        let alignment = self.alignment.forward_backward(input)?;
        let uniformity = self.uniformity.forward_backward(input)?;
        alignment.combine(&uniformity, self.weight)
    }
}
