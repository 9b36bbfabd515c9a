//! Training entry point: fit the classification pipeline against the
//! cleaned table and write the model artifact.

use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::Result;
use clap::Parser;
use tracing::error;

use triage_worker::config::Config;
use triage_worker::{observability, training};

#[derive(Debug, Parser)]
#[command(
    name = "train_classifier",
    about = "Train the message category classifier from the cleaned table"
)]
struct Args {
    /// SQLite database file produced by process_data.
    database: PathBuf,
    /// Output path for the serialized model artifact.
    model: PathBuf,
}

#[tokio::main]
async fn main() -> ExitCode {
    let args = Args::parse();
    if let Err(error) = observability::init() {
        eprintln!("failed to initialize tracing: {error:#}");
        return ExitCode::FAILURE;
    }

    match run(&args).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(error) => {
            error!(error = ?error, "training job failed");
            ExitCode::FAILURE
        }
    }
}

async fn run(args: &Args) -> Result<()> {
    let config = Config::from_env()?;
    training::run_training(&args.database, &args.model, &config).await
}
