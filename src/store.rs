//! SQLite persistence for the cleaned table.
//!
//! The ETL job destructively replaces the fixed `Messages` table together
//! with a `messages_schema` manifest listing the category columns in order.
//! The trainer reads targets back by NAME through that manifest, so a shift
//! in the persisted column layout cannot silently change what is trained on.

use std::path::Path;

use regex::Regex;
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode};
use sqlx::{QueryBuilder, Row, Sqlite, SqlitePool};
use thiserror::Error;
use tracing::info;

use crate::etl::clean::CleanedTable;

/// 永続テーブル名（固定）。
const TABLE_NAME: &str = "Messages";
const SCHEMA_TABLE: &str = "messages_schema";

/// SQLiteのバインド変数上限に収まるよう、1バッチあたりのパラメータ数を絞る。
const MAX_PARAMS_PER_BATCH: usize = 8000;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error(transparent)]
    Sqlx(#[from] sqlx::Error),
    #[error("category name '{name}' is not usable as a column identifier")]
    InvalidColumnName { name: String },
    #[error("schema manifest '{SCHEMA_TABLE}' is empty or missing; run the ETL job first")]
    MissingManifest,
}

/// Table contents as read back for training: message text plus the named
/// category columns from the manifest.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredTable {
    pub category_names: Vec<String>,
    pub messages: Vec<String>,
    /// One row per message, aligned with `category_names`.
    pub labels: Vec<Vec<i64>>,
}

#[derive(Debug, Clone)]
pub struct MessageStore {
    pool: SqlitePool,
}

impl MessageStore {
    /// Opens (or creates) the database file.
    ///
    /// # Errors
    /// Returns [`StoreError`] if the file cannot be opened or created.
    pub async fn connect(path: &Path, max_connections: u32) -> Result<Self, StoreError> {
        let options = SqliteConnectOptions::new()
            .filename(path)
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal);
        let pool = sqlx::pool::PoolOptions::<Sqlite>::new()
            .max_connections(max_connections)
            .connect_with(options)
            .await?;
        Ok(Self { pool })
    }

    /// Destructively replaces `Messages` and its schema manifest with the
    /// cleaned table, inside one transaction. No merge/append semantics.
    ///
    /// # Errors
    /// Returns [`StoreError`] if a category name is not a usable column
    /// identifier or if any statement fails.
    pub async fn replace_messages(&self, table: &CleanedTable) -> Result<(), StoreError> {
        for name in &table.category_names {
            validate_column_name(name)?;
        }

        let category_columns = table
            .category_names
            .iter()
            .map(|name| format!("\"{name}\" INTEGER NOT NULL"))
            .collect::<Vec<_>>()
            .join(", ");
        let create_messages = if category_columns.is_empty() {
            format!(
                "CREATE TABLE \"{TABLE_NAME}\" (\
                 \"id\" INTEGER NOT NULL, \
                 \"message\" TEXT NOT NULL, \
                 \"original\" TEXT, \
                 \"genre\" TEXT)"
            )
        } else {
            format!(
                "CREATE TABLE \"{TABLE_NAME}\" (\
                 \"id\" INTEGER NOT NULL, \
                 \"message\" TEXT NOT NULL, \
                 \"original\" TEXT, \
                 \"genre\" TEXT, {category_columns})"
            )
        };

        let mut tx = self.pool.begin().await?;
        sqlx::query(&format!("DROP TABLE IF EXISTS \"{TABLE_NAME}\""))
            .execute(&mut *tx)
            .await?;
        sqlx::query(&format!("DROP TABLE IF EXISTS \"{SCHEMA_TABLE}\""))
            .execute(&mut *tx)
            .await?;
        sqlx::query(&create_messages).execute(&mut *tx).await?;
        sqlx::query(&format!(
            "CREATE TABLE \"{SCHEMA_TABLE}\" (\
             \"position\" INTEGER NOT NULL, \
             \"column_name\" TEXT NOT NULL)"
        ))
        .execute(&mut *tx)
        .await?;

        for (position, name) in table.category_names.iter().enumerate() {
            sqlx::query(&format!(
                "INSERT INTO \"{SCHEMA_TABLE}\" (\"position\", \"column_name\") VALUES (?, ?)"
            ))
            .bind(position as i64)
            .bind(name)
            .execute(&mut *tx)
            .await?;
        }

        if !table.rows.is_empty() {
            let column_list = std::iter::once("\"id\", \"message\", \"original\", \"genre\"".to_string())
                .chain(
                    table
                        .category_names
                        .iter()
                        .map(|name| format!("\"{name}\"")),
                )
                .collect::<Vec<_>>()
                .join(", ");
            let params_per_row = 4 + table.category_names.len();
            let batch_size = (MAX_PARAMS_PER_BATCH / params_per_row).max(1);

            for chunk in table.rows.chunks(batch_size) {
                let mut builder = QueryBuilder::<Sqlite>::new(format!(
                    "INSERT INTO \"{TABLE_NAME}\" ({column_list}) "
                ));
                builder.push_values(chunk, |mut b, row| {
                    b.push_bind(row.id);
                    b.push_bind(row.message.clone());
                    b.push_bind(row.original.clone());
                    b.push_bind(row.genre.clone());
                    for value in &row.values {
                        b.push_bind(*value);
                    }
                });
                builder.build().execute(&mut *tx).await?;
            }
        }

        tx.commit().await?;
        info!(
            rows = table.rows.len(),
            categories = table.category_names.len(),
            table = TABLE_NAME,
            "replaced persisted table"
        );
        Ok(())
    }

    /// Reads back the message text and the manifest-named category columns.
    ///
    /// # Errors
    /// Returns [`StoreError::MissingManifest`] if the ETL job has not run
    /// against this database, or [`StoreError::Sqlx`] for read failures.
    pub async fn load_dataset(&self) -> Result<StoredTable, StoreError> {
        let manifest_rows = sqlx::query(&format!(
            "SELECT \"column_name\" FROM \"{SCHEMA_TABLE}\" ORDER BY \"position\""
        ))
        .fetch_all(&self.pool)
        .await
        .map_err(|error| match error {
            sqlx::Error::Database(_) => StoreError::MissingManifest,
            other => StoreError::Sqlx(other),
        })?;
        let category_names: Vec<String> = manifest_rows
            .iter()
            .map(|row| row.try_get::<String, _>(0))
            .collect::<Result<_, _>>()?;
        if category_names.is_empty() {
            return Err(StoreError::MissingManifest);
        }

        let select_columns = std::iter::once("\"message\"".to_string())
            .chain(category_names.iter().map(|name| format!("\"{name}\"")))
            .collect::<Vec<_>>()
            .join(", ");
        let rows = sqlx::query(&format!(
            "SELECT {select_columns} FROM \"{TABLE_NAME}\""
        ))
        .fetch_all(&self.pool)
        .await?;

        let mut messages = Vec::with_capacity(rows.len());
        let mut labels = Vec::with_capacity(rows.len());
        for row in &rows {
            messages.push(row.try_get::<String, _>(0)?);
            let mut values = Vec::with_capacity(category_names.len());
            for index in 0..category_names.len() {
                values.push(row.try_get::<i64, _>(index + 1)?);
            }
            labels.push(values);
        }

        Ok(StoredTable {
            category_names,
            messages,
            labels,
        })
    }
}

fn validate_column_name(name: &str) -> Result<(), StoreError> {
    // カテゴリ名はデータ由来なので、識別子として安全な文字だけを許可する
    let pattern = Regex::new(r"^[A-Za-z_][A-Za-z0-9_-]*$").expect("compile identifier pattern");
    if pattern.is_match(name) {
        Ok(())
    } else {
        Err(StoreError::InvalidColumnName {
            name: name.to_string(),
        })
    }
}

#[cfg(test)]
mod tests {
    use tempfile::TempDir;

    use crate::etl::clean::CleanedRow;

    use super::*;

    fn sample_table() -> CleanedTable {
        CleanedTable {
            category_names: vec!["related".to_string(), "request".to_string()],
            rows: vec![
                CleanedRow {
                    id: 1,
                    message: "Food and water needed".to_string(),
                    original: None,
                    genre: Some("direct".to_string()),
                    values: vec![1, 1],
                },
                CleanedRow {
                    id: 2,
                    message: "Roads are blocked".to_string(),
                    original: Some("Wout yo bloke".to_string()),
                    genre: Some("news".to_string()),
                    values: vec![1, 0],
                },
            ],
        }
    }

    async fn open_store(dir: &TempDir) -> MessageStore {
        let path = dir.path().join("triage.db");
        MessageStore::connect(&path, 1).await.expect("connect")
    }

    #[tokio::test]
    async fn replace_then_load_round_trips_by_name() {
        let dir = TempDir::new().expect("tempdir");
        let store = open_store(&dir).await;

        store
            .replace_messages(&sample_table())
            .await
            .expect("replace");
        let stored = store.load_dataset().await.expect("load");

        assert_eq!(stored.category_names, vec!["related", "request"]);
        assert_eq!(stored.messages.len(), 2);
        assert_eq!(stored.messages[0], "Food and water needed");
        assert_eq!(stored.labels, vec![vec![1, 1], vec![1, 0]]);
    }

    #[tokio::test]
    async fn replace_is_destructive_not_append() {
        let dir = TempDir::new().expect("tempdir");
        let store = open_store(&dir).await;

        store
            .replace_messages(&sample_table())
            .await
            .expect("first replace");

        let mut smaller = sample_table();
        smaller.rows.truncate(1);
        store
            .replace_messages(&smaller)
            .await
            .expect("second replace");

        let stored = store.load_dataset().await.expect("load");
        assert_eq!(stored.messages.len(), 1);
    }

    #[tokio::test]
    async fn fresh_database_reports_missing_manifest() {
        let dir = TempDir::new().expect("tempdir");
        let store = open_store(&dir).await;

        let error = store.load_dataset().await.expect_err("must fail");
        assert!(matches!(error, StoreError::MissingManifest));
    }

    #[tokio::test]
    async fn hostile_category_name_is_rejected() {
        let dir = TempDir::new().expect("tempdir");
        let store = open_store(&dir).await;

        let mut table = sample_table();
        table.category_names[0] = "related\"; DROP TABLE x; --".to_string();

        let error = store.replace_messages(&table).await.expect_err("must fail");
        assert!(matches!(error, StoreError::InvalidColumnName { .. }));
    }
}
