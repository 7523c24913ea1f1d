//! mf CLI library
//!
//! - **train**: run epochs over JSON-lines batches, with optional validation
//! - **losses**: list the registered losses
//!
//! # Example
//!
//! ```bash
//! mf train --train-data train.jsonl --val-data val.jsonl --epochs 5 \
//!     --train-loss InformationNoiseContrastiveEstimationLoss
//!
//! mf losses
//! ```

pub mod commands;

use clap::{Parser, Subcommand};

pub use commands::{LossesCommand, TrainCommand, TrainSummary};

/// Matrix-factorization retrieval over hashed features
#[derive(Parser, Debug)]
#[command(name = "mf")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// The subcommand to execute
    #[command(subcommand)]
    pub command: Commands,
}

/// Available CLI commands
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Train a model on JSON-lines batches
    Train(TrainCommand),

    /// Print the registered loss names
    Losses(LossesCommand),
}
