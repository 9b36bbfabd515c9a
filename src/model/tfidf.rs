//! TF-IDF weighting over the sparse count matrix.
//!
//! IDF follows the smoothed form `ln((1 + n) / (1 + df)) + 1`, and each
//! weighted row is L2-normalized. The output is a dense `ndarray` matrix
//! ready for the tree ensemble.

use ndarray::Array2;
use serde::{Deserialize, Serialize};
use sprs::CsMat;

/// Fitted IDF weights, serialized into the model artifact.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TfidfTransform {
    idf: Vec<f32>,
}

impl TfidfTransform {
    /// Learns IDF weights from a training count matrix (df = number of
    /// documents with a nonzero count per column).
    #[must_use]
    pub fn fit(counts: &CsMat<f32>) -> Self {
        let n_docs = counts.rows() as f32;
        let mut doc_freq = vec![0u32; counts.cols()];
        for row in counts.outer_iterator() {
            for (column, &count) in row.iter() {
                if count > 0.0 {
                    doc_freq[column] += 1;
                }
            }
        }
        let idf = doc_freq
            .into_iter()
            .map(|df| ((1.0 + n_docs) / (1.0 + df as f32)).ln() + 1.0)
            .collect();
        Self { idf }
    }

    #[must_use]
    pub fn n_features(&self) -> usize {
        self.idf.len()
    }

    /// Applies the IDF weights and L2-normalizes each document row,
    /// densifying into an `Array2` in the process.
    #[must_use]
    pub fn transform(&self, counts: &CsMat<f32>) -> Array2<f32> {
        let mut dense = Array2::<f32>::zeros((counts.rows(), self.idf.len()));
        for (doc, row) in counts.outer_iterator().enumerate() {
            let mut norm_sq = 0.0f32;
            for (column, &count) in row.iter() {
                let weighted = count * self.idf[column];
                dense[[doc, column]] = weighted;
                norm_sq += weighted * weighted;
            }
            if norm_sq > 0.0 {
                let inv_norm = norm_sq.sqrt().recip();
                for (column, _) in row.iter() {
                    dense[[doc, column]] *= inv_norm;
                }
            }
        }
        dense
    }
}
