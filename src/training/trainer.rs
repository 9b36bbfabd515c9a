//! Orchestrates one training run end to end.

use std::path::Path;

use anyhow::{Context, Result, bail};
use chrono::Utc;
use tracing::info;
use uuid::Uuid;

use crate::config::Config;
use crate::model::gbdt::GbdtConfig;
use crate::model::pipeline::{ArtifactMetadata, ModelArtifact, PipelineParams};
use crate::model::search::grid_search;
use crate::model::tokenize::TokenizerConfig;
use crate::model::vectorize::NgramRange;
use crate::store::MessageStore;

use super::data::{Dataset, train_test_split};
use super::metrics::evaluate;

/// Runs the training job: load the cleaned table, grid-search the pipeline,
/// report held-out metrics, and write the versioned model artifact.
///
/// # Errors
/// Fails if the database has not been populated by the ETL job, if the
/// table is too small to split and cross-validate, or on any fit or I/O
/// failure.
pub async fn run_training(database: &Path, model_path: &Path, config: &Config) -> Result<()> {
    let store = MessageStore::connect(database, config.db_max_connections())
        .await
        .with_context(|| format!("opening database {}", database.display()))?;
    let table = store
        .load_dataset()
        .await
        .context("reading cleaned table")?;
    let dataset = Dataset::from_stored(table);
    if dataset.len() < 2 * config.cv_folds() {
        bail!(
            "table has {} rows; need at least {} for a split with {} folds",
            dataset.len(),
            2 * config.cv_folds(),
            config.cv_folds()
        );
    }

    let run_id = Uuid::new_v4();
    let data_fingerprint = dataset.fingerprint();
    // 乱数シードは必ずログに残す。再現にはこの値だけあればよい。
    info!(
        %run_id,
        seed = config.seed(),
        rows = dataset.len(),
        categories = dataset.category_names.len(),
        fingerprint = %data_fingerprint,
        "starting training run"
    );

    let (train, test) = train_test_split(&dataset, config.test_ratio(), config.seed());
    info!(n_train = train.len(), n_test = test.len(), "split dataset");

    let base = PipelineParams {
        ngram: NgramRange::Unigram,
        vocab_size: config.vocab_size(),
        gbdt: GbdtConfig {
            n_trees: config.gbdt_trees(),
            learning_rate: config.gbdt_learning_rate(),
            max_depth: config.gbdt_max_depth(),
            min_samples_leaf: config.gbdt_min_samples_leaf(),
            seed: config.seed(),
        },
        tokenizer: TokenizerConfig::default(),
    };

    let (pipeline, cv_results) = grid_search(
        &train.texts,
        train.labels.view(),
        &train.category_names,
        &base,
        config.cv_folds(),
        config.seed(),
    )
    .context("grid search over pipeline candidates")?;

    let predictions = pipeline.predict(&test.texts);
    let report = evaluate(test.labels.view(), predictions.view(), &test.category_names);
    info!(
        macro_f1 = report.macro_f1,
        subset_accuracy = report.subset_accuracy,
        "held-out evaluation finished"
    );
    println!("{report}");

    let metadata = ArtifactMetadata {
        run_id,
        trained_at: Utc::now(),
        seed: config.seed(),
        data_fingerprint,
        n_train: train.len(),
        n_test: test.len(),
        cv_results,
    };
    ModelArtifact::new(metadata, pipeline)
        .save(model_path)
        .with_context(|| format!("writing model artifact to {}", model_path.display()))?;
    info!(model = %model_path.display(), "saved model artifact");

    Ok(())
}
