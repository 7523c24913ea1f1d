//! Training task: losses, optimizer and metrics around a
//! [`MatrixFactorization`] model.
//!
//! Every step computes all nine losses. Only the configured training loss is
//! back-propagated; the others are reported for observation.

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use mf_data::{Batch, PredictionRecord};
use mf_loss::{LossFamily, LossKind};
use mf_optimizer::{create_optimizer, OptimizerDyn};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::config::MatrixFactorizationConfig;
use crate::error::{TrainingError, TrainingResult};
use crate::metrics::{RankingMetricSink, RetrievalMetrics};
use crate::model::{ForwardPass, MatrixFactorization};

/// Stage of the training lifecycle, used as the key prefix of logged values.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Phase {
    Train,
    Val,
    Test,
    Predict,
}

impl Phase {
    /// Lower-case name, e.g. `"val"`.
    pub fn as_str(self) -> &'static str {
        match self {
            Phase::Train => "train",
            Phase::Val => "val",
            Phase::Test => "test",
            Phase::Predict => "predict",
        }
    }
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Phase {
    type Err = TrainingError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "train" => Ok(Phase::Train),
            "val" => Ok(Phase::Val),
            "test" => Ok(Phase::Test),
            "predict" => Ok(Phase::Predict),
            other => Err(TrainingError::Config(format!("unknown phase: {other}"))),
        }
    }
}

/// Result of one training step.
#[derive(Debug, Clone, PartialEq)]
pub struct StepOutput {
    /// Every loss, keyed `"train/{LossName}"`
    pub losses: BTreeMap<String, f32>,
    /// Value of the loss that drove the update
    pub loss: f32,
    /// Global step after the update
    pub step: u64,
    /// Table rows the optimizer visited
    pub rows_updated: usize,
}

/// Matrix-factorization training task.
///
/// # Example
///
/// ```
/// use mf_data::Batch;
/// use mf_training::{MatrixFactorizationConfig, MatrixFactorizationTask};
///
/// let config = MatrixFactorizationConfig::default()
///     .with_num_embeddings(17)
///     .with_embedding_dim(4)
///     .with_seed(Some(0));
/// let mut task = MatrixFactorizationTask::new(config).unwrap();
///
/// let batch = Batch::from_json(r#"{
///     "user_idx": [0, 1], "item_idx": [10, 11],
///     "user_feature_hashes": [[1], [2]], "item_feature_hashes": [[3], [4]],
///     "label": [1.0, 1.0], "weight": [1.0, 1.0]
/// }"#).unwrap();
/// let out = task.training_step(&batch).unwrap();
/// assert_eq!(out.losses.len(), 9);
/// assert_eq!(out.step, 1);
/// ```
#[derive(Debug)]
pub struct MatrixFactorizationTask {
    config: MatrixFactorizationConfig,
    model: MatrixFactorization,
    losses: LossFamily,
    train_loss: LossKind,
    optimizer: Box<dyn OptimizerDyn>,
    val_metrics: RetrievalMetrics,
    test_metrics: RetrievalMetrics,
    global_step: u64,
}

impl MatrixFactorizationTask {
    /// Builds the model, loss family, optimizer and metrics.
    ///
    /// Fails on invalid hyperparameters or an unknown training loss.
    pub fn new(config: MatrixFactorizationConfig) -> TrainingResult<Self> {
        let model = MatrixFactorization::new(&config)?;
        Self::with_model(config, model)
    }

    /// Builds a task around an existing model.
    pub fn with_model(
        config: MatrixFactorizationConfig,
        model: MatrixFactorization,
    ) -> TrainingResult<Self> {
        config.validate()?;
        let train_loss = config.train_loss_kind()?;
        let losses = LossFamily::new(config.loss_config())?;
        let optimizer = create_optimizer(config.optimizer_config())?;
        info!(
            train_loss = train_loss.name(),
            optimizer = optimizer.config().name(),
            learning_rate = config.learning_rate,
            hard_negatives_ratio = ?config.hard_negatives_ratio,
            "built training task"
        );
        Ok(Self {
            val_metrics: RetrievalMetrics::new(Phase::Val.as_str(), config.top_k),
            test_metrics: RetrievalMetrics::new(Phase::Test.as_str(), config.top_k),
            config,
            model,
            losses,
            train_loss,
            optimizer,
            global_step: 0,
        })
    }

    /// The hyperparameters.
    pub fn config(&self) -> &MatrixFactorizationConfig {
        &self.config
    }

    /// The model.
    pub fn model(&self) -> &MatrixFactorization {
        &self.model
    }

    /// The loss that drives the optimizer.
    pub fn train_loss(&self) -> LossKind {
        self.train_loss
    }

    /// Number of optimizer steps taken.
    pub fn global_step(&self) -> u64 {
        self.global_step
    }

    /// Scores each user against its positive item.
    pub fn score(&self, batch: &Batch) -> TrainingResult<Vec<f32>> {
        Ok(self.model.score(batch)?.into_data())
    }

    /// Evaluates every loss on `batch`, keyed `"{phase}/{LossName}"`.
    pub fn compute_losses(
        &self,
        batch: &Batch,
        phase: Phase,
    ) -> TrainingResult<BTreeMap<String, f32>> {
        let pass = self.model.forward(batch)?;
        self.losses_for(&pass, batch, phase)
    }

    fn losses_for(
        &self,
        pass: &ForwardPass,
        batch: &Batch,
        phase: Phase,
    ) -> TrainingResult<BTreeMap<String, f32>> {
        Ok(self
            .losses
            .compute_all(&pass.loss_input(batch), phase.as_str())?)
    }

    /// Computes all losses, back-propagates the training loss and updates
    /// the table.
    pub fn training_step(&mut self, batch: &Batch) -> TrainingResult<StepOutput> {
        let pass = self.model.forward(batch)?;
        let input = pass.loss_input(batch);
        let losses = self.losses_for(&pass, batch, Phase::Train)?;
        let output = self.losses.forward_backward(self.train_loss, &input)?;
        let grads = self
            .model
            .backward(&pass, &output.user_grad, &output.item_grad)?;
        let rows_updated = self
            .model
            .apply_gradients(self.optimizer.as_mut(), &grads)?;
        self.global_step += 1;
        debug!(
            step = self.global_step,
            loss = output.value,
            rows_updated,
            "training step"
        );
        Ok(StepOutput {
            losses,
            loss: output.value,
            step: self.global_step,
            rows_updated,
        })
    }

    fn evaluation_step(
        &mut self,
        batch: &Batch,
        phase: Phase,
    ) -> TrainingResult<BTreeMap<String, f32>> {
        let losses = self.compute_losses(batch, phase)?;
        let scores = self.score(batch)?;
        let metrics = match phase {
            Phase::Test => &mut self.test_metrics,
            _ => &mut self.val_metrics,
        };
        metrics.update(&scores, &batch.label, &batch.user_idx)?;
        Ok(losses)
    }

    /// Computes `val/` losses and updates the validation metrics.
    pub fn validation_step(&mut self, batch: &Batch) -> TrainingResult<BTreeMap<String, f32>> {
        self.evaluation_step(batch, Phase::Val)
    }

    /// Computes `test/` losses and updates the test metrics.
    pub fn test_step(&mut self, batch: &Batch) -> TrainingResult<BTreeMap<String, f32>> {
        self.evaluation_step(batch, Phase::Test)
    }

    /// Scores a batch, one record per row.
    pub fn predict_step(&self, batch: &Batch) -> TrainingResult<Vec<PredictionRecord>> {
        let scores = self.score(batch)?;
        Ok(scores
            .into_iter()
            .enumerate()
            .map(|(i, score)| PredictionRecord {
                user_idx: batch.user_idx[i],
                item_idx: batch.item_idx[i],
                score,
                label: batch.label[i],
            })
            .collect())
    }

    /// Retrieval metrics of `phase`, `None` for phases without metrics.
    pub fn metrics(&self, phase: Phase) -> Option<&RetrievalMetrics> {
        match phase {
            Phase::Val => Some(&self.val_metrics),
            Phase::Test => Some(&self.test_metrics),
            Phase::Train | Phase::Predict => None,
        }
    }

    /// Computes the metrics of `phase` and clears them.
    pub fn finish_epoch(&mut self, phase: Phase) -> BTreeMap<String, f32> {
        let metrics = match phase {
            Phase::Val => &mut self.val_metrics,
            Phase::Test => &mut self.test_metrics,
            Phase::Train | Phase::Predict => return BTreeMap::new(),
        };
        let values = metrics.compute();
        metrics.reset();
        values
    }
}
