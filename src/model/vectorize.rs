//! Count vectorization over tokenized messages.
//!
//! The vocabulary is built from the training corpus only: document
//! frequency is counted per term, and the top `max_features` terms (by DF,
//! ties broken lexicographically for determinism) become the columns of the
//! sparse count matrix.

use rustc_hash::{FxHashMap, FxHashSet};
use serde::{Deserialize, Serialize};
use sprs::{CsMat, TriMat};

/// n-gram展開の範囲。グリッドサーチの探索対象。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum NgramRange {
    /// Unigrams only — (1, 1).
    Unigram,
    /// Unigrams and space-joined bigrams — (1, 2).
    UnigramBigram,
}

impl std::fmt::Display for NgramRange {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Unigram => write!(f, "(1, 1)"),
            Self::UnigramBigram => write!(f, "(1, 2)"),
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct CountVectorizer {
    pub ngram: NgramRange,
    pub max_features: usize,
}

/// Fitted vocabulary state, serialized into the model artifact.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FittedVectorizer {
    ngram: NgramRange,
    vocabulary: Vec<String>,
    index: FxHashMap<String, usize>,
}

impl CountVectorizer {
    /// Builds the vocabulary from a tokenized training corpus.
    #[must_use]
    pub fn fit(&self, corpus: &[Vec<String>]) -> FittedVectorizer {
        let mut doc_freq: FxHashMap<String, usize> = FxHashMap::default();
        for tokens in corpus {
            let unique: FxHashSet<String> = expand_ngrams(tokens, self.ngram).collect();
            for term in unique {
                *doc_freq.entry(term).or_insert(0) += 1;
            }
        }

        let mut ranked: Vec<(String, usize)> = doc_freq.into_iter().collect();
        ranked.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(&b.0)));
        ranked.truncate(self.max_features);

        let vocabulary: Vec<String> = ranked.into_iter().map(|(term, _)| term).collect();
        let index = vocabulary
            .iter()
            .enumerate()
            .map(|(position, term)| (term.clone(), position))
            .collect();
        FittedVectorizer {
            ngram: self.ngram,
            vocabulary,
            index,
        }
    }
}

impl FittedVectorizer {
    #[must_use]
    pub fn vocab_len(&self) -> usize {
        self.vocabulary.len()
    }

    #[must_use]
    pub fn ngram(&self) -> NgramRange {
        self.ngram
    }

    /// Transforms tokenized documents into a sparse doc-term count matrix
    /// (rows = documents, columns = vocabulary terms, values = raw counts).
    #[must_use]
    pub fn transform(&self, corpus: &[Vec<String>]) -> CsMat<f32> {
        let mut triplets = TriMat::new((corpus.len(), self.vocabulary.len()));
        let mut counts: FxHashMap<usize, f32> = FxHashMap::default();
        for (row, tokens) in corpus.iter().enumerate() {
            counts.clear();
            for term in expand_ngrams(tokens, self.ngram) {
                if let Some(&column) = self.index.get(&term) {
                    *counts.entry(column).or_insert(0.0) += 1.0;
                }
            }
            for (&column, &count) in &counts {
                triplets.add_triplet(row, column, count);
            }
        }
        triplets.to_csr()
    }
}

/// Yields the document's terms under the given n-gram range: unigrams, plus
/// space-joined bigrams for (1, 2).
fn expand_ngrams(tokens: &[String], ngram: NgramRange) -> impl Iterator<Item = String> + '_ {
    let unigrams = tokens.iter().cloned();
    let bigrams = tokens
        .windows(2)
        .map(|pair| format!("{} {}", pair[0], pair[1]));
    let include_bigrams = matches!(ngram, NgramRange::UnigramBigram);
    unigrams.chain(bigrams.filter(move |_| include_bigrams))
}
