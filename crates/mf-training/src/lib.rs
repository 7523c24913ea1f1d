//! Matrix-factorization training over hashed features.
//!
//! - [`model`] - [`MatrixFactorization`]: table, pooler, scorer and the
//!   backward pass into row-sparse gradients
//! - [`task`] - [`MatrixFactorizationTask`]: loss computation, training,
//!   validation, test and predict steps
//! - [`metrics`] - retrieval metrics grouped by user and loss averaging
//! - [`config`] - [`MatrixFactorizationConfig`] hyperparameters
//!
//! # Example
//!
//! ```
//! use mf_data::Batch;
//! use mf_training::{MatrixFactorizationConfig, MatrixFactorizationTask, Phase};
//!
//! let config = MatrixFactorizationConfig::default()
//!     .with_num_embeddings(9)
//!     .with_embedding_dim(4)
//!     .with_seed(Some(1));
//! let task = MatrixFactorizationTask::new(config).unwrap();
//!
//! let batch = Batch::from_json(r#"{
//!     "user_idx": [0], "item_idx": [1],
//!     "user_feature_hashes": [[2]], "item_feature_hashes": [[3]],
//!     "label": [1.0], "weight": [1.0]
//! }"#).unwrap();
//! let losses = task.compute_losses(&batch, Phase::Val).unwrap();
//! assert!(losses.contains_key("val/PairwiseHingeLoss"));
//! ```

pub mod config;
pub mod error;
pub mod metrics;
pub mod model;
pub mod task;

pub use config::{MatrixFactorizationConfig, DEFAULT_NUM_EMBEDDINGS};
pub use error::{TrainingError, TrainingResult};
pub use metrics::{
    EmptyTargetAction, LossRecorder, RankingMetricSink, RetrievalMetrics, RETRIEVAL_METRICS,
};
pub use model::{ForwardPass, MatrixFactorization};
pub use task::{MatrixFactorizationTask, Phase, StepOutput};
