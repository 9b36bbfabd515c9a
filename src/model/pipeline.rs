//! End-to-end fit/predict pipeline and its versioned on-disk artifact.
//!
//! A fitted pipeline owns the tokenizer settings, fitted vocabulary, IDF
//! weights, and tree ensemble, so `load` + `predict` needs nothing but the
//! artifact file.

use std::fs::File;
use std::io::{BufReader, BufWriter};
use std::path::Path;

use anyhow::{Context, Result, bail};
use chrono::{DateTime, Utc};
use ndarray::{Array2, ArrayView2};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::gbdt::{GbdtConfig, MultiOutputGbdt};
use super::search::CvResult;
use super::tfidf::TfidfTransform;
use super::tokenize::{Tokenizer, TokenizerConfig};
use super::vectorize::{CountVectorizer, FittedVectorizer, NgramRange};

/// 現行アーティファクト形式。互換性を壊す変更で上げる。
pub const ARTIFACT_FORMAT_VERSION: u32 = 1;

/// One point in hyperparameter space: everything needed to fit a pipeline.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PipelineParams {
    pub ngram: NgramRange,
    pub vocab_size: usize,
    pub gbdt: GbdtConfig,
    pub tokenizer: TokenizerConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FittedPipeline {
    params: PipelineParams,
    vectorizer: FittedVectorizer,
    tfidf: TfidfTransform,
    classifier: MultiOutputGbdt,
    category_names: Vec<String>,
}

impl FittedPipeline {
    /// Fits tokenizer → vectorizer → TF-IDF → multi-output booster on the
    /// given training texts and label matrix.
    ///
    /// # Errors
    /// Fails if the booster cannot be fit (empty data, shape mismatch).
    pub fn fit(
        texts: &[String],
        labels: ArrayView2<'_, f32>,
        category_names: &[String],
        params: &PipelineParams,
    ) -> Result<Self> {
        let tokenizer = Tokenizer::new(&params.tokenizer);
        let corpus: Vec<Vec<String>> = texts
            .par_iter()
            .map(|text| tokenizer.tokenize(text))
            .collect();

        let vectorizer = CountVectorizer {
            ngram: params.ngram,
            max_features: params.vocab_size,
        }
        .fit(&corpus);
        let counts = vectorizer.transform(&corpus);
        let tfidf = TfidfTransform::fit(&counts);
        let features = tfidf.transform(&counts);

        let classifier = MultiOutputGbdt::fit(features.view(), labels, &params.gbdt)
            .context("fit multi-output booster")?;

        Ok(Self {
            params: params.clone(),
            vectorizer,
            tfidf,
            classifier,
            category_names: category_names.to_vec(),
        })
    }

    /// Predicts hard {0,1} labels for raw message texts, one column per
    /// category in [`Self::category_names`] order.
    #[must_use]
    pub fn predict(&self, texts: &[String]) -> Array2<i64> {
        let tokenizer = Tokenizer::new(&self.params.tokenizer);
        let corpus: Vec<Vec<String>> = texts
            .par_iter()
            .map(|text| tokenizer.tokenize(text))
            .collect();
        let counts = self.vectorizer.transform(&corpus);
        let features = self.tfidf.transform(&counts);
        self.classifier.predict(features.view())
    }

    #[must_use]
    pub fn category_names(&self) -> &[String] {
        &self.category_names
    }

    #[must_use]
    pub fn params(&self) -> &PipelineParams {
        &self.params
    }
}

/// Provenance recorded alongside the fitted pipeline.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ArtifactMetadata {
    pub run_id: Uuid,
    pub trained_at: DateTime<Utc>,
    pub seed: u64,
    /// xxh3 hex digest of the training table contents.
    pub data_fingerprint: String,
    pub n_train: usize,
    pub n_test: usize,
    pub cv_results: Vec<CvResult>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelArtifact {
    pub format_version: u32,
    pub metadata: ArtifactMetadata,
    pub pipeline: FittedPipeline,
}

impl ModelArtifact {
    #[must_use]
    pub fn new(metadata: ArtifactMetadata, pipeline: FittedPipeline) -> Self {
        Self {
            format_version: ARTIFACT_FORMAT_VERSION,
            metadata,
            pipeline,
        }
    }

    /// Serializes the artifact as JSON.
    ///
    /// # Errors
    /// Fails on file creation or serialization errors.
    pub fn save(&self, path: &Path) -> Result<()> {
        let file = File::create(path)
            .with_context(|| format!("create model artifact at {}", path.display()))?;
        serde_json::to_writer(BufWriter::new(file), self)
            .with_context(|| format!("serialize model artifact to {}", path.display()))?;
        Ok(())
    }

    /// Loads and validates an artifact.
    ///
    /// # Errors
    /// Fails on read/parse errors or an unsupported `format_version`.
    pub fn load(path: &Path) -> Result<Self> {
        let file = File::open(path)
            .with_context(|| format!("open model artifact at {}", path.display()))?;
        let artifact: Self = serde_json::from_reader(BufReader::new(file))
            .with_context(|| format!("parse model artifact at {}", path.display()))?;
        if artifact.format_version != ARTIFACT_FORMAT_VERSION {
            bail!(
                "unsupported artifact format version {} (this build reads {})",
                artifact.format_version,
                ARTIFACT_FORMAT_VERSION
            );
        }
        Ok(artifact)
    }
}

#[cfg(test)]
mod tests {
    use tempfile::TempDir;

    use super::*;

    fn tiny_params() -> PipelineParams {
        PipelineParams {
            ngram: NgramRange::Unigram,
            vocab_size: 50,
            gbdt: GbdtConfig {
                n_trees: 20,
                ..GbdtConfig::default()
            },
            tokenizer: TokenizerConfig::default(),
        }
    }

    fn tiny_dataset() -> (Vec<String>, Array2<f32>, Vec<String>) {
        let texts: Vec<String> = [
            "we need water urgently",
            "please send water bottles",
            "water shortage in the village",
            "clean water required now",
            "the earthquake destroyed buildings",
            "buildings collapsed after earthquake",
            "earthquake damage to buildings everywhere",
            "strong earthquake shook the buildings",
        ]
        .iter()
        .map(ToString::to_string)
        .collect();
        // column 0 = water, column 1 = earthquake
        let labels = Array2::from_shape_fn((8, 2), |(row, column)| {
            let is_water = row < 4;
            if (column == 0) == is_water { 1.0 } else { 0.0 }
        });
        let names = vec!["water".to_string(), "earthquake".to_string()];
        (texts, labels, names)
    }

    fn metadata() -> ArtifactMetadata {
        ArtifactMetadata {
            run_id: Uuid::new_v4(),
            trained_at: Utc::now(),
            seed: 42,
            data_fingerprint: "deadbeef".to_string(),
            n_train: 8,
            n_test: 0,
            cv_results: Vec::new(),
        }
    }

    #[test]
    fn fit_then_predict_separates_tiny_corpus() {
        let (texts, labels, names) = tiny_dataset();
        let pipeline =
            FittedPipeline::fit(&texts, labels.view(), &names, &tiny_params()).expect("fit");
        let predictions = pipeline.predict(&texts);

        assert_eq!(predictions.dim(), (8, 2));
        for row in 0..8 {
            assert_eq!(predictions[[row, 0]] as f32, labels[[row, 0]]);
            assert_eq!(predictions[[row, 1]] as f32, labels[[row, 1]]);
        }
    }

    #[test]
    fn artifact_round_trips_through_disk() {
        let (texts, labels, names) = tiny_dataset();
        let pipeline =
            FittedPipeline::fit(&texts, labels.view(), &names, &tiny_params()).expect("fit");
        let before = pipeline.predict(&texts);

        let dir = TempDir::new().expect("tempdir");
        let path = dir.path().join("classifier.json");
        ModelArtifact::new(metadata(), pipeline).save(&path).expect("save");

        let loaded = ModelArtifact::load(&path).expect("load");
        assert_eq!(loaded.format_version, ARTIFACT_FORMAT_VERSION);
        assert_eq!(loaded.pipeline.category_names(), &["water", "earthquake"]);
        assert_eq!(loaded.pipeline.predict(&texts), before);
    }

    #[test]
    fn unsupported_format_version_is_rejected() {
        let (texts, labels, names) = tiny_dataset();
        let pipeline =
            FittedPipeline::fit(&texts, labels.view(), &names, &tiny_params()).expect("fit");

        let dir = TempDir::new().expect("tempdir");
        let path = dir.path().join("classifier.json");
        let mut artifact = ModelArtifact::new(metadata(), pipeline);
        artifact.format_version = ARTIFACT_FORMAT_VERSION + 1;
        artifact.save(&path).expect("save");

        let error = ModelArtifact::load(&path).expect_err("must reject");
        assert!(error.to_string().contains("format version"));
    }
}
