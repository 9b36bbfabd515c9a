//! Raw input readers and the id-join of the two CSV files.

use std::fs::File;
use std::path::Path;

use rustc_hash::FxHashMap;
use serde::Deserialize;

use super::EtlError;

/// 生メッセージレコード。`original` と `genre` は入力に無い場合がある。
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct MessageRecord {
    pub id: i64,
    pub message: String,
    #[serde(default)]
    pub original: Option<String>,
    #[serde(default)]
    pub genre: Option<String>,
}

/// パック済みカテゴリレコード。`categories` は `name-value;...` 形式。
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct CategoryRecord {
    pub id: i64,
    pub categories: String,
}

/// 結合済みレコード（メッセージ列 + パック済みカテゴリ列）。
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MergedRecord {
    pub id: i64,
    pub message: String,
    pub original: Option<String>,
    pub genre: Option<String>,
    pub categories: String,
}

/// Reads the messages CSV.
///
/// # Errors
/// Fails if the file is unreadable, malformed, or missing `id`/`message`.
pub fn read_messages(path: &Path) -> Result<Vec<MessageRecord>, EtlError> {
    let mut reader = open_csv(path, &["id", "message"])?;
    let mut records = Vec::new();
    for row in reader.deserialize() {
        let record: MessageRecord = row.map_err(|source| EtlError::Csv {
            path: path.to_path_buf(),
            source,
        })?;
        records.push(record);
    }
    Ok(records)
}

/// Reads the categories CSV.
///
/// # Errors
/// Fails if the file is unreadable, malformed, or missing `id`/`categories`.
pub fn read_categories(path: &Path) -> Result<Vec<CategoryRecord>, EtlError> {
    let mut reader = open_csv(path, &["id", "categories"])?;
    let mut records = Vec::new();
    for row in reader.deserialize() {
        let record: CategoryRecord = row.map_err(|source| EtlError::Csv {
            path: path.to_path_buf(),
            source,
        })?;
        records.push(record);
    }
    Ok(records)
}

/// Inner join on `id`.
///
/// Rows whose id appears in only one input are dropped silently; output
/// preserves the messages-file row order. When an id repeats in the
/// categories file, the first packed string wins.
#[must_use]
pub fn merge(messages: Vec<MessageRecord>, categories: Vec<CategoryRecord>) -> Vec<MergedRecord> {
    let mut packed_by_id: FxHashMap<i64, String> = FxHashMap::default();
    for record in categories {
        packed_by_id.entry(record.id).or_insert(record.categories);
    }

    messages
        .into_iter()
        .filter_map(|message| {
            packed_by_id.get(&message.id).map(|packed| MergedRecord {
                id: message.id,
                message: message.message,
                original: message.original,
                genre: message.genre,
                categories: packed.clone(),
            })
        })
        .collect()
}

fn open_csv(
    path: &Path,
    required: &[&'static str],
) -> Result<csv::Reader<File>, EtlError> {
    let file = File::open(path).map_err(|source| EtlError::Read {
        path: path.to_path_buf(),
        source,
    })?;
    let mut reader = csv::ReaderBuilder::new().has_headers(true).from_reader(file);

    let headers = reader
        .headers()
        .map_err(|source| EtlError::Csv {
            path: path.to_path_buf(),
            source,
        })?
        .clone();
    for column in required {
        if !headers.iter().any(|header| header == *column) {
            return Err(EtlError::MissingColumn {
                path: path.to_path_buf(),
                column,
            });
        }
    }
    Ok(reader)
}
