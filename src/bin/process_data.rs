//! ETL entry point: merge the raw CSVs, clean them, and replace the
//! persisted `Messages` table.

use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::Result;
use clap::Parser;
use tracing::error;

use triage_worker::config::Config;
use triage_worker::{etl, observability};

#[derive(Debug, Parser)]
#[command(name = "process_data", about = "Clean the raw message CSVs into SQLite")]
struct Args {
    /// Path to the raw messages CSV.
    messages_csv: PathBuf,
    /// Path to the raw categories CSV.
    categories_csv: PathBuf,
    /// SQLite database file to (re)create the Messages table in.
    database: PathBuf,
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
            error!(error = ?error, "ETL job failed");
            ExitCode::FAILURE
        }
    }
}

async fn run(args: &Args) -> Result<()> {
    let config = Config::from_env()?;
    let summary = etl::run(
        &args.messages_csv,
        &args.categories_csv,
        &args.database,
        &config,
    )
    .await?;
    println!(
        "wrote {} rows ({} duplicates dropped, {} categories) to {}",
        summary.rows_written,
        summary.duplicates_dropped,
        summary.categories,
        args.database.display()
    );
    Ok(())
}
