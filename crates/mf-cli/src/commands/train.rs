//! Train command implementation.
//!
//! Runs epochs over a JSON-lines batch file, optionally validating after
//! each epoch and writing validation scores once training ends.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::Args;
use mf_data::{Batch, JsonlBatchReader, PredictionWriter};
use mf_training::{LossRecorder, MatrixFactorizationConfig, MatrixFactorizationTask, Phase};
use tracing::{debug, info};

/// Train a model on JSON-lines batches
///
/// # Example
///
/// ```bash
/// mf train \
///     --train-data train.jsonl \
///     --val-data val.jsonl \
///     --config config.json \
///     --epochs 3 \
///     --predictions val_scores.jsonl
/// ```
#[derive(Args, Debug, Clone)]
pub struct TrainCommand {
    /// JSON-lines file with one training batch per line
    #[arg(long, env = "MF_TRAIN_DATA")]
    pub train_data: PathBuf,

    /// JSON-lines file with validation batches
    #[arg(long, env = "MF_VAL_DATA")]
    pub val_data: Option<PathBuf>,

    /// Hyperparameters (JSON); missing keys take their defaults
    #[arg(long, short = 'c', env = "MF_CONFIG_PATH")]
    pub config: Option<PathBuf>,

    /// Number of passes over the training data
    #[arg(long, short = 'e', default_value = "1")]
    pub epochs: usize,

    /// Loss that drives the optimizer (overrides the config)
    #[arg(long)]
    pub train_loss: Option<String>,

    /// Learning rate (overrides the config)
    #[arg(long)]
    pub learning_rate: Option<f32>,

    /// Seed for table initialization (overrides the config)
    #[arg(long)]
    pub seed: Option<u64>,

    /// Write validation scores here after training
    #[arg(long, requires = "val_data")]
    pub predictions: Option<PathBuf>,
}

/// What a training run produced.
#[derive(Debug, Clone, Default)]
pub struct TrainSummary {
    pub epochs: usize,
    pub global_step: u64,
    /// Per-loss averages over the last training epoch
    pub train_losses: BTreeMap<String, f32>,
    /// Loss averages and retrieval metrics of the last validation pass
    pub val_metrics: BTreeMap<String, f32>,
    /// Number of prediction records written
    pub predictions_written: usize,
}

fn read_batches(path: &Path) -> Result<impl Iterator<Item = Result<Batch>>> {
    let reader = JsonlBatchReader::open(path)
        .with_context(|| format!("Failed to open batches at {}", path.display()))?;
    let path = path.to_path_buf();
    Ok(reader.map(move |batch| {
        batch.with_context(|| format!("Invalid batch in {}", path.display()))
    }))
}

impl TrainCommand {
    /// Resolves the hyperparameters from the config file and overrides.
    pub fn load_config(&self) -> Result<MatrixFactorizationConfig> {
        let mut config = match &self.config {
            Some(path) => {
                info!(path = %path.display(), "loading config");
                MatrixFactorizationConfig::from_json_file(path)
                    .with_context(|| format!("Failed to load config from {}", path.display()))?
            }
            None => MatrixFactorizationConfig::default(),
        };
        if let Some(train_loss) = &self.train_loss {
            config = config.with_train_loss(train_loss.clone());
        }
        if let Some(learning_rate) = self.learning_rate {
            config = config.with_learning_rate(learning_rate);
        }
        if self.seed.is_some() {
            config = config.with_seed(self.seed);
        }
        config.validate().context("Invalid training configuration")?;
        Ok(config)
    }

    /// Executes the train command.
    pub fn run(&self) -> Result<TrainSummary> {
        let config = self.load_config()?;
        debug!(config = %serde_json::to_string(&config)?, "resolved config");
        let mut task =
            MatrixFactorizationTask::new(config).context("Failed to build training task")?;
        let mut summary = TrainSummary::default();

        for epoch in 1..=self.epochs {
            let mut recorder = LossRecorder::new();
            for batch in read_batches(&self.train_data)? {
                let out = task.training_step(&batch?)?;
                debug!(epoch, step = out.step, loss = out.loss, "step");
                recorder.record(&out.losses);
            }
            summary.train_losses = recorder.averages();
            for (name, value) in &summary.train_losses {
                info!(epoch, loss = %name, value, "epoch average");
            }

            if let Some(val_data) = &self.val_data {
                summary.val_metrics = self.validate(&mut task, val_data)?;
                for (name, value) in &summary.val_metrics {
                    info!(epoch, metric = %name, value, "validation");
                }
            }
            summary.epochs = epoch;
            summary.global_step = task.global_step();
        }

        if let (Some(path), Some(val_data)) = (&self.predictions, &self.val_data) {
            summary.predictions_written = write_predictions(&task, val_data, path)?;
            info!(
                path = %path.display(),
                records = summary.predictions_written,
                "wrote predictions"
            );
        }
        Ok(summary)
    }

    fn validate(
        &self,
        task: &mut MatrixFactorizationTask,
        val_data: &Path,
    ) -> Result<BTreeMap<String, f32>> {
        let mut recorder = LossRecorder::new();
        for batch in read_batches(val_data)? {
            recorder.record(&task.validation_step(&batch?)?);
        }
        let mut values = recorder.averages();
        values.extend(task.finish_epoch(Phase::Val));
        Ok(values)
    }
}

fn write_predictions(task: &MatrixFactorizationTask, data: &Path, out: &Path) -> Result<usize> {
    let mut writer = PredictionWriter::create(out)
        .with_context(|| format!("Failed to create {}", out.display()))?;
    for batch in read_batches(data)? {
        writer.write_all(&task.predict_step(&batch?)?)?;
    }
    let written = writer.written();
    writer.finish()?;
    Ok(written)
}
