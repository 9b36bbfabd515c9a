//! ETL job: read the raw messages/categories CSVs, merge and clean them,
//! and replace the persisted `Messages` table.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use thiserror::Error;
use tracing::info;

use crate::config::Config;
use crate::store::MessageStore;

pub mod clean;
pub mod load;

/// ETLステージで発生するエラー。
#[derive(Debug, Error)]
pub enum EtlError {
    #[error("failed to open {path}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse {path}")]
    Csv {
        path: PathBuf,
        #[source]
        source: csv::Error,
    },
    #[error("{path} is missing required column '{column}'")]
    MissingColumn { path: PathBuf, column: &'static str },
    #[error("malformed category token '{token}' in row id {id}: expected 'name-value'")]
    CategoryToken { id: i64, token: String },
    #[error("category value in token '{token}' (row id {id}) is not a single digit")]
    CategoryValue { id: i64, token: String },
    #[error(
        "category schema mismatch at row id {id}: expected column '{expected}', found '{found}'"
    )]
    SchemaMismatch {
        id: i64,
        expected: String,
        found: String,
    },
    #[error("category schema mismatch at row id {id}: expected {expected} columns, found {found}")]
    SchemaArity {
        id: i64,
        expected: usize,
        found: usize,
    },
}

/// ETL実行結果のサマリ。
#[derive(Debug, Clone, Copy)]
pub struct EtlSummary {
    pub rows_merged: usize,
    pub rows_written: usize,
    pub duplicates_dropped: usize,
    pub categories: usize,
}

/// Runs the full ETL job: load → merge → clean → persist.
///
/// Strictly linear; the first failing stage aborts the run.
///
/// # Errors
/// Returns an error if either input is unreadable or malformed, if the
/// category schema is inconsistent across rows, or if the database write
/// fails.
pub async fn run(
    messages_csv: &Path,
    categories_csv: &Path,
    database: &Path,
    config: &Config,
) -> Result<EtlSummary> {
    let messages = load::read_messages(messages_csv)
        .with_context(|| format!("loading messages from {}", messages_csv.display()))?;
    let categories = load::read_categories(categories_csv)
        .with_context(|| format!("loading categories from {}", categories_csv.display()))?;
    info!(
        messages = messages.len(),
        categories = categories.len(),
        "loaded raw inputs"
    );

    let merged = load::merge(messages, categories);
    let rows_merged = merged.len();
    info!(rows_merged, "merged messages and categories on id");

    let cleaned = clean::clean(&merged)?;
    let rows_written = cleaned.rows.len();
    let summary = EtlSummary {
        rows_merged,
        rows_written,
        duplicates_dropped: rows_merged - rows_written,
        categories: cleaned.category_names.len(),
    };
    info!(
        rows_written,
        duplicates_dropped = summary.duplicates_dropped,
        categories = summary.categories,
        "cleaned merged table"
    );

    let store = MessageStore::connect(database, config.db_max_connections())
        .await
        .with_context(|| format!("opening database {}", database.display()))?;
    store
        .replace_messages(&cleaned)
        .await
        .context("replacing persisted Messages table")?;
    info!(database = %database.display(), "persisted cleaned table");

    Ok(summary)
}
