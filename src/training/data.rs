//! Training dataset assembly: label matrix construction, fingerprinting,
//! and the seeded train/test split.

use ndarray::Array2;
use rand::SeedableRng;
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use tracing::warn;
use xxhash_rust::xxh3::Xxh3;

use crate::store::StoredTable;

/// In-memory training view of the persisted table.
#[derive(Debug, Clone, PartialEq)]
pub struct Dataset {
    pub texts: Vec<String>,
    /// {0,1} targets, one row per text and one column per category.
    pub labels: Array2<f32>,
    pub category_names: Vec<String>,
}

impl Dataset {
    /// Builds the dataset from the stored table. Label values outside {0,1}
    /// (the raw data carries an occasional `2`) are clamped into range and
    /// the clamp count is logged.
    #[must_use]
    pub fn from_stored(table: StoredTable) -> Self {
        let n_rows = table.messages.len();
        let n_categories = table.category_names.len();

        let mut clamped = 0usize;
        let mut labels = Array2::<f32>::zeros((n_rows, n_categories));
        for (row, values) in table.labels.iter().enumerate() {
            for (column, &value) in values.iter().enumerate() {
                let bounded = value.clamp(0, 1);
                if bounded != value {
                    clamped += 1;
                }
                labels[[row, column]] = bounded as f32;
            }
        }
        if clamped > 0 {
            warn!(clamped, "clamped out-of-range label values into {{0,1}}");
        }

        Self {
            texts: table.messages,
            labels,
            category_names: table.category_names,
        }
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.texts.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.texts.is_empty()
    }

    /// xxh3 digest over texts and labels, recorded in the artifact metadata
    /// so a model can be traced back to the exact table it was trained on.
    #[must_use]
    pub fn fingerprint(&self) -> String {
        let mut hasher = Xxh3::new();
        for (row, text) in self.texts.iter().enumerate() {
            hasher.update(text.as_bytes());
            hasher.update(&[0x1f]);
            for column in 0..self.labels.ncols() {
                hasher.update(&[self.labels[[row, column]] as u8]);
            }
            hasher.update(&[0x1e]);
        }
        format!("{:016x}", hasher.digest())
    }
}

/// Splits the dataset into train/test partitions after one seeded shuffle.
/// Both partitions are non-empty for any dataset with at least two rows.
#[must_use]
pub fn train_test_split(dataset: &Dataset, test_ratio: f64, seed: u64) -> (Dataset, Dataset) {
    let n = dataset.len();
    let mut order: Vec<usize> = (0..n).collect();
    order.shuffle(&mut StdRng::seed_from_u64(seed));

    let n_test = ((n as f64 * test_ratio).round() as usize).clamp(1, n.saturating_sub(1).max(1));
    let (test_rows, train_rows) = order.split_at(n_test.min(n));

    (
        subset(dataset, train_rows),
        subset(dataset, test_rows),
    )
}

fn subset(dataset: &Dataset, rows: &[usize]) -> Dataset {
    let texts = rows.iter().map(|&row| dataset.texts[row].clone()).collect();
    let labels = Array2::from_shape_fn((rows.len(), dataset.labels.ncols()), |(i, column)| {
        dataset.labels[[rows[i], column]]
    });
    Dataset {
        texts,
        labels,
        category_names: dataset.category_names.clone(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn stored(n: usize) -> StoredTable {
        StoredTable {
            category_names: vec!["related".to_string(), "request".to_string()],
            messages: (0..n).map(|i| format!("message {i}")).collect(),
            labels: (0..n).map(|i| vec![i as i64 % 2, 0]).collect(),
        }
    }

    #[test]
    fn labels_become_a_float_matrix() {
        let dataset = Dataset::from_stored(stored(4));
        assert_eq!(dataset.labels.dim(), (4, 2));
        assert_eq!(dataset.labels[[1, 0]], 1.0);
        assert_eq!(dataset.labels[[2, 0]], 0.0);
    }

    #[test]
    fn out_of_range_values_are_clamped() {
        let mut table = stored(2);
        table.labels[0][0] = 2;
        table.labels[1][1] = -1;
        let dataset = Dataset::from_stored(table);
        assert_eq!(dataset.labels[[0, 0]], 1.0);
        assert_eq!(dataset.labels[[1, 1]], 0.0);
    }

    #[test]
    fn fingerprint_is_stable_and_content_sensitive() {
        let a = Dataset::from_stored(stored(5));
        let b = Dataset::from_stored(stored(5));
        assert_eq!(a.fingerprint(), b.fingerprint());

        let mut table = stored(5);
        table.messages[0].push_str(" changed");
        let c = Dataset::from_stored(table);
        assert_ne!(a.fingerprint(), c.fingerprint());
    }

    #[test]
    fn split_is_seeded_and_partitions_every_row() {
        let dataset = Dataset::from_stored(stored(10));
        let (train_a, test_a) = train_test_split(&dataset, 0.2, 42);
        let (train_b, test_b) = train_test_split(&dataset, 0.2, 42);

        assert_eq!(train_a, train_b);
        assert_eq!(test_a, test_b);
        assert_eq!(train_a.len() + test_a.len(), 10);
        assert_eq!(test_a.len(), 2);

        let mut all: Vec<&String> = train_a.texts.iter().chain(test_a.texts.iter()).collect();
        all.sort();
        all.dedup();
        assert_eq!(all.len(), 10);
    }

    #[test]
    fn split_never_leaves_a_partition_empty() {
        let dataset = Dataset::from_stored(stored(2));
        let (train, test) = train_test_split(&dataset, 0.01, 42);
        assert_eq!(train.len(), 1);
        assert_eq!(test.len(), 1);
    }
}
