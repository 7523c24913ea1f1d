//! Representation-learning losses for matrix-factorization retrieval.
//!
//! Every loss implements [`EmbeddingLoss`]: it consumes pooled user
//! embeddings, augmented item embeddings, labels, sample weights and the
//! user/item ids, and returns a non-negative scalar with analytic gradients.
//!
//! The family:
//!
//! - **Alignment**: squared distance between users and their positives
//! - **Contrastive**: hinge on squared distance to non-matching items
//! - **Uniformity**: log mean Gaussian potential over item pairs
//! - **Alignment + Contrastive** and **Alignment + Uniformity**
//! - **InfoNCE**: softmax cross-entropy of the positive against its pool
//! - **MINE**: Donsker-Varadhan mutual information bound
//! - **Pairwise Hinge** and **Pairwise Logistic** ranking losses
//!
//! Negatives for user `i` are the augmented item rows whose id differs from
//! the id of its positive. An optional hard negatives ratio keeps only the
//! highest-scoring part of each pool. Empty pools contribute zero.
//!
//! # Example
//!
//! ```
//! use mf_layers::Tensor;
//! use mf_loss::prelude::*;
//!
//! let users = Tensor::from_data(&[2, 2], vec![1.0, 0.0, 0.0, 1.0]);
//! let items = Tensor::from_data(&[2, 2], vec![0.0, 1.0, 1.0, 0.0]);
//! let input = LossInput::new(&users, &items, &[1.0, 1.0], &[1.0, 1.0], &[0, 1], &[10, 11]);
//!
//! let loss = LossKind::from_name("PairwiseHingeLoss").unwrap().build(&LossConfig::default());
//! let output = loss.forward_backward(&input).unwrap();
//! assert!((output.value - 2.0).abs() < 1e-6);
//! ```

#![warn(missing_docs)]

pub mod alignment;
pub mod base;
pub mod combined;
pub mod config;
pub mod contrastive;
pub mod error;
pub mod info_nce;
pub mod mine;
pub mod negatives;
pub mod pairwise;
pub mod registry;
pub mod uniformity;

#[cfg(test)]
mod testing;

pub use alignment::AlignmentLoss;
pub use base::{EmbeddingLoss, LossInput, LossOutput, Reduction};
pub use combined::{AlignmentContrastiveLoss, AlignmentUniformityLoss};
pub use config::LossConfig;
pub use contrastive::ContrastiveLoss;
pub use error::{LossError, LossResult};
pub use info_nce::InformationNoiseContrastiveEstimationLoss;
pub use mine::MutualInformationNeuralEstimationLoss;
pub use negatives::NegativePools;
pub use pairwise::{PairwiseHingeLoss, PairwiseLogisticLoss};
pub use registry::{LossFamily, LossKind};
pub use uniformity::UniformityLoss;

/// Prelude module for convenient imports.
pub mod prelude {
    pub use crate::base::{EmbeddingLoss, LossInput, LossOutput, Reduction};
    pub use crate::config::LossConfig;
    pub use crate::error::{LossError, LossResult};
    pub use crate::registry::{LossFamily, LossKind};
}
