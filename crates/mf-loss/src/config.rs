//! Hyperparameters shared by the loss family.

use serde::{Deserialize, Serialize};

use crate::base::Reduction;
use crate::error::{LossError, LossResult};

/// Configuration for every loss in the family.
///
/// # Example
///
/// ```
/// use mf_loss::LossConfig;
///
/// let config = LossConfig::default().with_hard_negatives_ratio(Some(0.5));
/// assert!(config.validate().is_ok());
/// assert_eq!(config.info_nce_temperature, 0.05);
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LossConfig {
    /// Fraction of each negative pool to keep, hardest first. `None` keeps all.
    pub hard_negatives_ratio: Option<f32>,
    /// Reduction for per-example losses (default: weighted mean).
    pub reduction: Reduction,
    /// Margin on squared distance for the contrastive loss (default: 1.0).
    pub contrastive_margin: f32,
    /// Gaussian potential scale `t` of the uniformity loss (default: 2.0).
    pub uniformity_temperature: f32,
    /// Weight of the contrastive term in alignment + contrastive (default: 1.0).
    pub contrastive_weight: f32,
    /// Weight of the uniformity term in alignment + uniformity (default: 1.0).
    pub uniformity_weight: f32,
    /// Softmax temperature for InfoNCE (default: 0.05).
    pub info_nce_temperature: f32,
    /// Margin for the pairwise hinge loss (default: 1.0).
    pub hinge_margin: f32,
    /// Margin for the pairwise logistic loss (default: 0.0).
    pub logistic_margin: f32,
}

impl Default for LossConfig {
    fn default() -> Self {
        Self {
            hard_negatives_ratio: None,
            reduction: Reduction::Mean,
            contrastive_margin: 1.0,
            uniformity_temperature: 2.0,
            contrastive_weight: 1.0,
            uniformity_weight: 1.0,
            info_nce_temperature: 0.05,
            hinge_margin: 1.0,
            logistic_margin: 0.0,
        }
    }
}

impl LossConfig {
    /// Sets the hard negatives ratio.
    pub fn with_hard_negatives_ratio(mut self, ratio: Option<f32>) -> Self {
        self.hard_negatives_ratio = ratio;
        self
    }

    /// Sets the reduction for per-example losses.
    pub fn with_reduction(mut self, reduction: Reduction) -> Self {
        self.reduction = reduction;
        self
    }

    /// Sets the InfoNCE temperature.
    pub fn with_info_nce_temperature(mut self, temperature: f32) -> Self {
        self.info_nce_temperature = temperature;
        self
    }

    /// Sets the pairwise hinge margin.
    pub fn with_hinge_margin(mut self, margin: f32) -> Self {
        self.hinge_margin = margin;
        self
    }

    /// Checks that every constant is usable.
    pub fn validate(&self) -> LossResult<()> {
        if let Some(ratio) = self.hard_negatives_ratio {
            if !(ratio > 0.0 && ratio <= 1.0) {
                return Err(LossError::InvalidConfig {
                    message: format!("hard_negatives_ratio must be in (0, 1], got {ratio}"),
                });
            }
        }
        let positive = [
            ("uniformity_temperature", self.uniformity_temperature),
            ("info_nce_temperature", self.info_nce_temperature),
        ];
        for (name, value) in positive {
            if !(value.is_finite() && value > 0.0) {
                return Err(LossError::InvalidConfig {
                    message: format!("{name} must be positive, got {value}"),
                });
            }
        }
        let non_negative = [
            ("contrastive_margin", self.contrastive_margin),
            ("contrastive_weight", self.contrastive_weight),
            ("uniformity_weight", self.uniformity_weight),
            ("hinge_margin", self.hinge_margin),
        ];
        for (name, value) in non_negative {
            if !(value.is_finite() && value >= 0.0) {
                return Err(LossError::InvalidConfig {
                    message: format!("{name} must be non-negative, got {value}"),
                });
            }
        }
        if !self.logistic_margin.is_finite() {
            return Err(LossError::InvalidConfig {
                message: format!("logistic_margin must be finite, got {}", self.logistic_margin),
            });
        }
        Ok(())
    }
}
