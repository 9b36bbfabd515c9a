//! Unpacks the packed category column into discrete integer columns and
//! removes exact-duplicate rows.

use rustc_hash::FxHashSet;

use super::EtlError;
use super::load::MergedRecord;

/// クリーニング済みテーブル。列順はメッセージ列 → カテゴリ列。
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CleanedTable {
    /// Category column names, in first-row token order.
    pub category_names: Vec<String>,
    pub rows: Vec<CleanedRow>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CleanedRow {
    pub id: i64,
    pub message: String,
    pub original: Option<String>,
    pub genre: Option<String>,
    /// One integer per category, aligned with `CleanedTable::category_names`.
    pub values: Vec<i64>,
}

/// Cleans the merged table.
///
/// The category schema is derived from the first row and validated against
/// every subsequent row; any disagreement fails fast instead of silently
/// trusting row 0. Values outside {0,1} (a `2` has been observed in
/// `related`) pass through unchanged.
///
/// # Errors
/// Returns [`EtlError`] for malformed tokens, non-digit values, or a
/// category schema that differs between rows.
pub fn clean(records: &[MergedRecord]) -> Result<CleanedTable, EtlError> {
    let Some(first) = records.first() else {
        return Ok(CleanedTable {
            category_names: Vec::new(),
            rows: Vec::new(),
        });
    };

    let category_names: Vec<String> = parse_packed(first.id, &first.categories)?
        .into_iter()
        .map(|(name, _)| name.to_string())
        .collect();

    let mut seen = FxHashSet::default();
    let mut rows = Vec::with_capacity(records.len());
    for record in records {
        let tokens = parse_packed(record.id, &record.categories)?;
        if tokens.len() != category_names.len() {
            return Err(EtlError::SchemaArity {
                id: record.id,
                expected: category_names.len(),
                found: tokens.len(),
            });
        }

        let mut values = Vec::with_capacity(tokens.len());
        for ((name, value), expected) in tokens.into_iter().zip(&category_names) {
            if name != expected {
                return Err(EtlError::SchemaMismatch {
                    id: record.id,
                    expected: expected.clone(),
                    found: name.to_string(),
                });
            }
            values.push(value);
        }

        let row = CleanedRow {
            id: record.id,
            message: record.message.clone(),
            original: record.original.clone(),
            genre: record.genre.clone(),
            values,
        };
        // 全列一致の完全重複のみ落とす（先勝ち）
        if seen.insert(fingerprint(&row)) {
            rows.push(row);
        }
    }

    Ok(CleanedTable {
        category_names,
        rows,
    })
}

/// Splits a packed string into `(name, value)` pairs.
///
/// The name is everything before the LAST `-`; the value is the trailing
/// character of the token coerced to an integer.
fn parse_packed(id: i64, packed: &str) -> Result<Vec<(&str, i64)>, EtlError> {
    packed
        .split(';')
        .map(|token| {
            let (name, _) = token.rsplit_once('-').ok_or_else(|| EtlError::CategoryToken {
                id,
                token: token.to_string(),
            })?;
            let value = token
                .chars()
                .last()
                .and_then(|c| c.to_digit(10))
                .ok_or_else(|| EtlError::CategoryValue {
                    id,
                    token: token.to_string(),
                })?;
            Ok((name, i64::from(value)))
        })
        .collect()
}

fn fingerprint(row: &CleanedRow) -> String {
    let values = row
        .values
        .iter()
        .map(i64::to_string)
        .collect::<Vec<_>>()
        .join(",");
    format!(
        "{}\u{1f}{}\u{1f}{}\u{1f}{}\u{1f}{}",
        row.id,
        row.message,
        row.original.as_deref().unwrap_or(""),
        row.genre.as_deref().unwrap_or(""),
        values
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    const DATASET_CATEGORIES: [&str; 36] = [
        "related",
        "request",
        "offer",
        "aid_related",
        "medical_help",
        "medical_products",
        "search_and_rescue",
        "security",
        "military",
        "child_alone",
        "water",
        "food",
        "shelter",
        "clothing",
        "money",
        "missing_people",
        "refugees",
        "death",
        "other_aid",
        "infrastructure_related",
        "transport",
        "buildings",
        "electricity",
        "tools",
        "hospitals",
        "shops",
        "aid_centers",
        "other_infrastructure",
        "weather_related",
        "floods",
        "storm",
        "fire",
        "earthquake",
        "cold",
        "other_weather",
        "direct_report",
    ];

    fn merged(id: i64, message: &str, packed: &str) -> MergedRecord {
        MergedRecord {
            id,
            message: message.to_string(),
            original: None,
            genre: None,
            categories: packed.to_string(),
        }
    }

    fn repack(names: &[String], values: &[i64]) -> String {
        names
            .iter()
            .zip(values)
            .map(|(name, value)| format!("{name}-{value}"))
            .collect::<Vec<_>>()
            .join(";")
    }

    #[test]
    fn unpack_then_repack_reproduces_the_packed_string() {
        let packed = DATASET_CATEGORIES
            .iter()
            .enumerate()
            .map(|(idx, name)| format!("{name}-{}", i64::from(idx % 2 == 0)))
            .collect::<Vec<_>>()
            .join(";");

        let table = clean(&[merged(1, "Need food", &packed)]).expect("clean");

        assert_eq!(table.category_names.len(), 36);
        assert_eq!(
            repack(&table.category_names, &table.rows[0].values),
            packed
        );
    }

    #[test]
    fn end_to_end_scenario_from_single_row() {
        let table = clean(&[merged(
            1,
            "Food and water needed",
            "related-1;request-1;offer-0",
        )])
        .expect("clean");

        assert_eq!(table.category_names, vec!["related", "request", "offer"]);
        let row = &table.rows[0];
        assert_eq!(row.id, 1);
        assert_eq!(row.message, "Food and water needed");
        assert_eq!(row.values, vec![1, 1, 0]);
    }

    #[test]
    fn exact_duplicate_rows_collapse_to_one() {
        let record = merged(1, "Need shelter", "related-1;request-0");
        let table = clean(&[record.clone(), record]).expect("clean");
        assert_eq!(table.rows.len(), 1);
    }

    #[test]
    fn rows_differing_only_in_values_are_both_kept() {
        let table = clean(&[
            merged(1, "Need shelter", "related-1;request-0"),
            merged(1, "Need shelter", "related-0;request-0"),
        ])
        .expect("clean");
        assert_eq!(table.rows.len(), 2);
    }

    #[test]
    fn cleaning_is_idempotent() {
        let records = vec![
            merged(1, "Need water", "related-1;request-1"),
            merged(1, "Need water", "related-1;request-1"),
            merged(2, "Roads blocked", "related-1;request-0"),
        ];
        let once = clean(&records).expect("first pass");

        let repacked: Vec<MergedRecord> = once
            .rows
            .iter()
            .map(|row| MergedRecord {
                id: row.id,
                message: row.message.clone(),
                original: row.original.clone(),
                genre: row.genre.clone(),
                categories: repack(&once.category_names, &row.values),
            })
            .collect();
        let twice = clean(&repacked).expect("second pass");

        assert_eq!(once, twice);
    }

    #[test]
    fn observed_value_two_passes_through_unchanged() {
        let table = clean(&[merged(1, "m", "related-2;request-0")]).expect("clean");
        assert_eq!(table.rows[0].values, vec![2, 0]);
    }

    #[test]
    fn well_formed_values_land_in_zero_or_one() {
        let table = clean(&[merged(1, "m", "related-1;request-0;offer-1")]).expect("clean");
        assert!(table.rows[0].values.iter().all(|v| *v == 0 || *v == 1));
    }

    #[test]
    fn category_name_keeps_hyphens_before_the_last_one() {
        let table = clean(&[merged(1, "m", "aid-related-1;request-0")]).expect("clean");
        assert_eq!(table.category_names[0], "aid-related");
    }

    #[test]
    fn schema_mismatch_between_rows_fails_fast() {
        let error = clean(&[
            merged(1, "a", "related-1;request-0"),
            merged(2, "b", "related-1;offer-0"),
        ])
        .expect_err("must fail");
        assert!(matches!(
            error,
            EtlError::SchemaMismatch { id: 2, .. }
        ));
    }

    #[test]
    fn arity_mismatch_between_rows_fails_fast() {
        let error = clean(&[
            merged(1, "a", "related-1;request-0"),
            merged(2, "b", "related-1"),
        ])
        .expect_err("must fail");
        assert!(matches!(
            error,
            EtlError::SchemaArity {
                id: 2,
                expected: 2,
                found: 1
            }
        ));
    }

    #[test]
    fn token_without_separator_is_rejected() {
        let error = clean(&[merged(7, "m", "related1")]).expect_err("must fail");
        assert!(matches!(error, EtlError::CategoryToken { id: 7, .. }));
    }

    #[test]
    fn non_digit_value_is_rejected() {
        let error = clean(&[merged(7, "m", "related-x")]).expect_err("must fail");
        assert!(matches!(error, EtlError::CategoryValue { id: 7, .. }));
    }

    #[test]
    fn empty_input_produces_empty_table() {
        let table = clean(&[]).expect("clean");
        assert!(table.category_names.is_empty());
        assert!(table.rows.is_empty());
    }
}
