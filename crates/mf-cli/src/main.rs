//! mf - train matrix-factorization retrieval models from the command line.

use anyhow::Result;
use clap::Parser;
use tracing::info;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use mf_cli::{Cli, Commands};

fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(fmt::layer())
        .with(EnvFilter::from_default_env().add_directive("mf=info".parse()?))
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Train(cmd) => {
            let summary = cmd.run()?;
            info!(
                steps = summary.global_step,
                epochs = summary.epochs,
                "training finished"
            );
        }
        Commands::Losses(cmd) => cmd.run()?,
    }
    Ok(())
}
