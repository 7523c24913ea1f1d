//! Static registry of the loss family.

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::alignment::AlignmentLoss;
use crate::base::{EmbeddingLoss, LossInput, LossOutput};
use crate::combined::{AlignmentContrastiveLoss, AlignmentUniformityLoss};
use crate::config::LossConfig;
use crate::contrastive::ContrastiveLoss;
use crate::error::{LossError, LossResult};
use crate::info_nce::InformationNoiseContrastiveEstimationLoss;
use crate::mine::MutualInformationNeuralEstimationLoss;
use crate::pairwise::{PairwiseHingeLoss, PairwiseLogisticLoss};
use crate::uniformity::UniformityLoss;

/// Identifies one member of the loss family.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum LossKind {
    /// [`AlignmentLoss`]
    Alignment,
    /// [`ContrastiveLoss`]
    Contrastive,
    /// [`AlignmentContrastiveLoss`]
    AlignmentContrastive,
    /// [`UniformityLoss`]
    Uniformity,
    /// [`AlignmentUniformityLoss`]
    AlignmentUniformity,
    /// [`InformationNoiseContrastiveEstimationLoss`]
    InformationNoiseContrastiveEstimation,
    /// [`MutualInformationNeuralEstimationLoss`]
    MutualInformationNeuralEstimation,
    /// [`PairwiseHingeLoss`]
    PairwiseHinge,
    /// [`PairwiseLogisticLoss`]
    PairwiseLogistic,
}

impl LossKind {
    /// Every registered loss, in logging order.
    pub const ALL: [LossKind; 9] = [
        LossKind::Alignment,
        LossKind::Contrastive,
        LossKind::AlignmentContrastive,
        LossKind::Uniformity,
        LossKind::AlignmentUniformity,
        LossKind::InformationNoiseContrastiveEstimation,
        LossKind::MutualInformationNeuralEstimation,
        LossKind::PairwiseHinge,
        LossKind::PairwiseLogistic,
    ];

    /// Registered name of the loss.
    pub fn name(self) -> &'static str {
        match self {
            LossKind::Alignment => "AlignmentLoss",
            LossKind::Contrastive => "ContrastiveLoss",
            LossKind::AlignmentContrastive => "AlignmentContrastiveLoss",
            LossKind::Uniformity => "UniformityLoss",
            LossKind::AlignmentUniformity => "AlignmentUniformityLoss",
            LossKind::InformationNoiseContrastiveEstimation => {
                "InformationNoiseContrastiveEstimationLoss"
            }
            LossKind::MutualInformationNeuralEstimation => "MutualInformationNeuralEstimationLoss",
            LossKind::PairwiseHinge => "PairwiseHingeLoss",
            LossKind::PairwiseLogistic => "PairwiseLogisticLoss",
        }
    }

    /// Looks a loss up by registered name.
    ///
    /// The misspelled `InfomationNoiseContrastiveEstimationLoss` found in
    /// older configs resolves to InfoNCE.
    pub fn from_name(name: &str) -> LossResult<Self> {
        if name == "InfomationNoiseContrastiveEstimationLoss" {
            return Ok(LossKind::InformationNoiseContrastiveEstimation);
        }
        Self::ALL
            .into_iter()
            .find(|kind| kind.name() == name)
            .ok_or_else(|| LossError::UnknownLoss {
                name: name.to_string(),
                known: Self::ALL.map(LossKind::name).join(", "),
            })
    }

    /// Instantiates the loss.
    pub fn build(self, config: &LossConfig) -> Box<dyn EmbeddingLoss> {
        match self {
            LossKind::Alignment => Box::new(AlignmentLoss::new(config)),
            LossKind::Contrastive => Box::new(ContrastiveLoss::new(config)),
            LossKind::AlignmentContrastive => Box::new(AlignmentContrastiveLoss::new(config)),
            LossKind::Uniformity => Box::new(UniformityLoss::new(config)),
            LossKind::AlignmentUniformity => Box::new(AlignmentUniformityLoss::new(config)),
            LossKind::InformationNoiseContrastiveEstimation => {
                Box::new(InformationNoiseContrastiveEstimationLoss::new(config))
            }
            LossKind::MutualInformationNeuralEstimation => {
                Box::new(MutualInformationNeuralEstimationLoss::new(config))
            }
            LossKind::PairwiseHinge => Box::new(PairwiseHingeLoss::new(config)),
            LossKind::PairwiseLogistic => Box::new(PairwiseLogisticLoss::new(config)),
        }
    }
}

impl fmt::Display for LossKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for LossKind {
    type Err = LossError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::from_name(s)
    }
}

/// All nine losses, built once from a shared config.
///
/// # Example
///
/// ```
/// use mf_layers::Tensor;
/// use mf_loss::{LossConfig, LossFamily, LossInput};
///
/// let family = LossFamily::new(LossConfig::default()).unwrap();
/// let users = Tensor::from_data(&[2, 2], vec![1.0, 0.0, 0.0, 1.0]);
/// let items = users.clone();
/// let input = LossInput::new(&users, &items, &[1.0, 1.0], &[1.0, 1.0], &[0, 1], &[0, 1]);
///
/// let losses = family.compute_all(&input, "train").unwrap();
/// assert_eq!(losses.len(), 9);
/// assert_eq!(losses["train/AlignmentLoss"], 0.0);
/// ```
#[derive(Debug)]
pub struct LossFamily {
    config: LossConfig,
    losses: Vec<(LossKind, Box<dyn EmbeddingLoss>)>,
}

impl LossFamily {
    /// Validates the config and builds every loss.
    pub fn new(config: LossConfig) -> LossResult<Self> {
        config.validate()?;
        let losses = LossKind::ALL
            .into_iter()
            .map(|kind| (kind, kind.build(&config)))
            .collect();
        Ok(Self { config, losses })
    }

    /// Returns the shared config.
    pub fn config(&self) -> &LossConfig {
        &self.config
    }

    /// Returns the loss for `kind`.
    pub fn get(&self, kind: LossKind) -> &dyn EmbeddingLoss {
        // ALL and `losses` share their order
        self.losses[kind as usize].1.as_ref()
    }

    /// Iterates over the registered losses.
    pub fn iter(&self) -> impl Iterator<Item = (LossKind, &dyn EmbeddingLoss)> {
        self.losses.iter().map(|(kind, loss)| (*kind, loss.as_ref()))
    }

    /// Evaluates every loss, keyed `"{prefix}/{name}"`.
    pub fn compute_all(&self, input: &LossInput<'_>, prefix: &str) -> LossResult<BTreeMap<String, f32>> {
        input.validate()?;
        let mut values = BTreeMap::new();
        for (kind, loss) in self.iter() {
            let value = loss.forward(input)?;
            debug!(loss = kind.name(), value, "computed loss");
            values.insert(format!("{prefix}/{}", kind.name()), value);
        }
        Ok(values)
    }

    /// Evaluates one loss with gradients.
    pub fn forward_backward(&self, kind: LossKind, input: &LossInput<'_>) -> LossResult<LossOutput> {
        self.get(kind).forward_backward(input)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_names_round_trip() {
        for kind in LossKind::ALL {
            assert_eq!(LossKind::from_name(kind.name()).unwrap(), kind);
            assert_eq!(kind.to_string().parse::<LossKind>().unwrap(), kind);
        }
    }

    #[test]
    fn test_misspelled_info_nce_alias() {
        assert_eq!(
            LossKind::from_name("InfomationNoiseContrastiveEstimationLoss").unwrap(),
            LossKind::InformationNoiseContrastiveEstimation
        );
        // the corrected spelling is what gets logged
        assert_eq!(
            LossKind::InformationNoiseContrastiveEstimation.name(),
            "InformationNoiseContrastiveEstimationLoss"
        );
    }

    #[test]
    fn test_unknown_loss() {
        let err = LossKind::from_name("FocalLoss").unwrap_err();
        assert!(matches!(err, LossError::UnknownLoss { .. }));
        assert!(err.to_string().contains("PairwiseHingeLoss"));
    }

    #[test]
    fn test_family_order_matches_kinds() {
        let family = LossFamily::new(LossConfig::default()).unwrap();
        for kind in LossKind::ALL {
            assert_eq!(family.get(kind).name(), kind.name());
        }
    }

    #[test]
    fn test_family_rejects_invalid_config() {
        let config = LossConfig::default().with_hard_negatives_ratio(Some(2.0));
        assert!(matches!(
            LossFamily::new(config),
            Err(LossError::InvalidConfig { .. })
        ));
    }
}
