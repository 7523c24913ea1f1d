//! Hyperparameters of a matrix-factorization training run.

use std::fs;
use std::path::Path;

use mf_layers::{EmbeddingBagConfig, Initializer};
use mf_loss::{LossConfig, LossKind};
use mf_optimizer::OptimizerConfig;
use serde::{Deserialize, Serialize};

use crate::error::{TrainingError, TrainingResult};

/// Default bucket count, `2^16 + 1`.
pub const DEFAULT_NUM_EMBEDDINGS: usize = (1 << 16) + 1;

/// Configuration for [`MatrixFactorizationTask`](crate::task::MatrixFactorizationTask).
///
/// # Example
///
/// ```
/// use mf_training::MatrixFactorizationConfig;
///
/// let config = MatrixFactorizationConfig::default()
///     .with_embedding_dim(16)
///     .with_train_loss("InformationNoiseContrastiveEstimationLoss")
///     .with_hard_negatives_ratio(Some(0.5));
/// assert!(config.validate().is_ok());
/// assert_eq!(config.num_embeddings, 65537);
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MatrixFactorizationConfig {
    /// Number of table rows (hash buckets).
    pub num_embeddings: usize,
    /// Embedding dimension.
    pub embedding_dim: usize,
    /// Registered name of the loss that drives the optimizer.
    pub train_loss: String,
    /// Optional L2 bound on pooled embeddings.
    pub max_norm: Option<f32>,
    /// Sparse gradients with `SparseAdam` when true, dense `AdamW` otherwise.
    pub sparse: bool,
    /// Project pooled embeddings onto the unit sphere.
    pub normalize: bool,
    /// Fraction of each negative pool kept, hardest first.
    pub hard_negatives_ratio: Option<f32>,
    /// Optimizer learning rate.
    pub learning_rate: f32,
    /// Cutoff of the retrieval metrics.
    pub top_k: usize,
    /// Seed for table initialization.
    pub seed: Option<u64>,
    /// Table initializer.
    pub initializer: Initializer,
    /// Loss constants. `hard_negatives_ratio` above takes precedence.
    pub loss: LossConfig,
}

impl Default for MatrixFactorizationConfig {
    fn default() -> Self {
        Self {
            num_embeddings: DEFAULT_NUM_EMBEDDINGS,
            embedding_dim: 32,
            train_loss: LossKind::PairwiseHinge.name().to_string(),
            max_norm: None,
            sparse: true,
            normalize: true,
            hard_negatives_ratio: None,
            learning_rate: 0.1,
            top_k: 20,
            seed: None,
            initializer: Initializer::default(),
            loss: LossConfig::default(),
        }
    }
}

impl MatrixFactorizationConfig {
    /// Reads a JSON config. Missing keys take their defaults.
    pub fn from_json_file<P: AsRef<Path>>(path: P) -> TrainingResult<Self> {
        let text = fs::read_to_string(path)?;
        let config: Self = serde_json::from_str(&text)?;
        config.validate()?;
        Ok(config)
    }

    /// Sets the number of table rows.
    pub fn with_num_embeddings(mut self, num_embeddings: usize) -> Self {
        self.num_embeddings = num_embeddings;
        self
    }

    /// Sets the embedding dimension.
    pub fn with_embedding_dim(mut self, embedding_dim: usize) -> Self {
        self.embedding_dim = embedding_dim;
        self
    }

    /// Sets the training loss by registered name.
    pub fn with_train_loss(mut self, train_loss: impl Into<String>) -> Self {
        self.train_loss = train_loss.into();
        self
    }

    /// Sets the max-norm bound.
    pub fn with_max_norm(mut self, max_norm: Option<f32>) -> Self {
        self.max_norm = max_norm;
        self
    }

    /// Chooses between sparse and dense updates.
    pub fn with_sparse(mut self, sparse: bool) -> Self {
        self.sparse = sparse;
        self
    }

    /// Enables or disables normalization.
    pub fn with_normalize(mut self, normalize: bool) -> Self {
        self.normalize = normalize;
        self
    }

    /// Sets the hard negatives ratio.
    pub fn with_hard_negatives_ratio(mut self, ratio: Option<f32>) -> Self {
        self.hard_negatives_ratio = ratio;
        self
    }

    /// Sets the learning rate.
    pub fn with_learning_rate(mut self, learning_rate: f32) -> Self {
        self.learning_rate = learning_rate;
        self
    }

    /// Sets the metrics cutoff.
    pub fn with_top_k(mut self, top_k: usize) -> Self {
        self.top_k = top_k;
        self
    }

    /// Sets the initialization seed.
    pub fn with_seed(mut self, seed: Option<u64>) -> Self {
        self.seed = seed;
        self
    }

    /// Sets the table initializer.
    pub fn with_initializer(mut self, initializer: Initializer) -> Self {
        self.initializer = initializer;
        self
    }

    /// Sets the loss constants.
    pub fn with_loss_config(mut self, loss: LossConfig) -> Self {
        self.loss = loss;
        self
    }

    /// Resolves the training loss.
    pub fn train_loss_kind(&self) -> TrainingResult<LossKind> {
        Ok(LossKind::from_name(&self.train_loss)?)
    }

    /// Loss constants with the run's hard negatives ratio applied.
    pub fn loss_config(&self) -> LossConfig {
        self.loss.with_hard_negatives_ratio(self.hard_negatives_ratio)
    }

    /// Pooler configuration.
    pub fn pooler_config(&self) -> EmbeddingBagConfig {
        EmbeddingBagConfig::new()
            .with_max_norm(self.max_norm)
            .with_normalize(self.normalize)
    }

    /// `SparseAdam` for sparse runs, `AdamW` otherwise.
    pub fn optimizer_config(&self) -> OptimizerConfig {
        if self.sparse {
            OptimizerConfig::sparse_adam(self.learning_rate)
        } else {
            OptimizerConfig::adamw(self.learning_rate)
        }
    }

    /// Checks every hyperparameter.
    pub fn validate(&self) -> TrainingResult<()> {
        if self.num_embeddings == 0 {
            return Err(TrainingError::Config(
                "num_embeddings must be positive".to_string(),
            ));
        }
        if self.embedding_dim == 0 {
            return Err(TrainingError::Config(
                "embedding_dim must be positive".to_string(),
            ));
        }
        if let Some(max_norm) = self.max_norm {
            if !(max_norm.is_finite() && max_norm > 0.0) {
                return Err(TrainingError::Config(format!(
                    "max_norm must be positive and finite, got {max_norm}"
                )));
            }
        }
        if let Some(ratio) = self.hard_negatives_ratio {
            if !(ratio > 0.0 && ratio <= 1.0) {
                return Err(TrainingError::Config(format!(
                    "hard_negatives_ratio must be in (0, 1], got {ratio}"
                )));
            }
        }
        if !(self.learning_rate.is_finite() && self.learning_rate > 0.0) {
            return Err(TrainingError::Config(format!(
                "learning_rate must be positive, got {}",
                self.learning_rate
            )));
        }
        if self.top_k == 0 {
            return Err(TrainingError::Config("top_k must be positive".to_string()));
        }
        self.train_loss_kind()?;
        self.loss_config().validate()?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_defaults() {
        let config = MatrixFactorizationConfig::default();
        assert_eq!(config.num_embeddings, 65537);
        assert_eq!(config.embedding_dim, 32);
        assert_eq!(config.train_loss, "PairwiseHingeLoss");
        assert!(config.sparse);
        assert!(config.normalize);
        assert_eq!(config.top_k, 20);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_validate_rejects_bad_values() {
        let base = MatrixFactorizationConfig::default();
        let bad = [
            base.clone().with_num_embeddings(0),
            base.clone().with_embedding_dim(0),
            base.clone().with_max_norm(Some(0.0)),
            base.clone().with_hard_negatives_ratio(Some(1.5)),
            base.clone().with_learning_rate(-1.0),
            base.clone().with_top_k(0),
        ];
        for config in bad {
            assert!(matches!(config.validate(), Err(TrainingError::Config(_))));
        }
    }

    #[test]
    fn test_unknown_train_loss() {
        let config = MatrixFactorizationConfig::default().with_train_loss("FocalLoss");
        assert!(matches!(config.validate(), Err(TrainingError::Loss(_))));
    }

    #[test]
    fn test_optimizer_follows_sparsity() {
        let config = MatrixFactorizationConfig::default();
        assert_eq!(config.optimizer_config().name(), "SparseAdam");
        assert_eq!(config.with_sparse(false).optimizer_config().name(), "AdamW");
    }

    #[test]
    fn test_hard_negatives_ratio_reaches_losses() {
        let config = MatrixFactorizationConfig::default().with_hard_negatives_ratio(Some(0.25));
        assert_eq!(config.loss_config().hard_negatives_ratio, Some(0.25));
    }

    #[test]
    fn test_from_json_file_fills_defaults() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, r#"{{"embedding_dim": 8, "train_loss": "AlignmentLoss"}}"#).unwrap();
        let config = MatrixFactorizationConfig::from_json_file(file.path()).unwrap();
        assert_eq!(config.embedding_dim, 8);
        assert_eq!(config.train_loss, "AlignmentLoss");
        assert_eq!(config.learning_rate, 0.1);
    }

    #[test]
    fn test_from_json_file_validates() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, r#"{{"train_loss": "NoSuchLoss"}}"#).unwrap();
        assert!(MatrixFactorizationConfig::from_json_file(file.path()).is_err());
    }
}
