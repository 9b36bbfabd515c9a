//! Hyperparameter grid search with k-fold cross-validation.
//!
//! The grid spans the n-gram range (unigram vs unigram+bigram). Folds come
//! from one seeded shuffle, every (candidate, fold) cell trains in parallel,
//! and the score is subset accuracy: a row counts only when every category
//! matches. Ties keep the earlier grid entry.

use anyhow::{Context, Result, bail};
use ndarray::{ArrayView2, Axis};
use rand::SeedableRng;
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use tracing::info;

use super::pipeline::{FittedPipeline, PipelineParams};
use super::vectorize::NgramRange;

const GRID: [NgramRange; 2] = [NgramRange::Unigram, NgramRange::UnigramBigram];

/// Cross-validation outcome for one grid candidate, recorded in the
/// artifact metadata.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CvResult {
    pub ngram: NgramRange,
    pub mean_score: f32,
    pub fold_scores: Vec<f32>,
}

/// Runs the grid search and refits the winning candidate on the full
/// training split.
///
/// # Errors
/// Fails when there are fewer samples than folds or when any candidate
/// pipeline fails to fit.
pub fn grid_search(
    texts: &[String],
    labels: ArrayView2<'_, f32>,
    category_names: &[String],
    base: &PipelineParams,
    folds: usize,
    seed: u64,
) -> Result<(FittedPipeline, Vec<CvResult>)> {
    if folds < 2 {
        bail!("cross-validation needs at least 2 folds, got {folds}");
    }
    if texts.len() < folds {
        bail!(
            "cannot split {} samples into {folds} folds",
            texts.len()
        );
    }

    let fold_indices = assign_folds(texts.len(), folds, seed);
    let cells: Vec<(usize, usize)> = (0..GRID.len())
        .flat_map(|candidate| (0..folds).map(move |fold| (candidate, fold)))
        .collect();

    let scores: Vec<((usize, usize), f32)> = cells
        .into_par_iter()
        .map(|(candidate, fold)| {
            let params = with_ngram(base, GRID[candidate]);
            let score = evaluate_fold(texts, labels, category_names, &params, &fold_indices, fold)
                .with_context(|| format!("evaluate {} on fold {fold}", GRID[candidate]))?;
            Ok(((candidate, fold), score))
        })
        .collect::<Result<_>>()?;

    let mut cv_results: Vec<CvResult> = GRID
        .iter()
        .map(|&ngram| CvResult {
            ngram,
            mean_score: 0.0,
            fold_scores: vec![0.0; folds],
        })
        .collect();
    for ((candidate, fold), score) in scores {
        cv_results[candidate].fold_scores[fold] = score;
    }
    for result in &mut cv_results {
        result.mean_score =
            result.fold_scores.iter().sum::<f32>() / result.fold_scores.len() as f32;
        info!(
            ngram = %result.ngram,
            mean_score = result.mean_score,
            fold_scores = ?result.fold_scores,
            "cross-validated candidate"
        );
    }

    // 同点は先勝ち（グリッド順）
    let mut winner = 0;
    for (candidate, result) in cv_results.iter().enumerate().skip(1) {
        if result.mean_score > cv_results[winner].mean_score {
            winner = candidate;
        }
    }
    let winning_params = with_ngram(base, GRID[winner]);
    info!(ngram = %GRID[winner], "refitting winning candidate on full training split");

    let pipeline = FittedPipeline::fit(texts, labels, category_names, &winning_params)
        .context("refit winning candidate")?;
    Ok((pipeline, cv_results))
}

fn with_ngram(base: &PipelineParams, ngram: NgramRange) -> PipelineParams {
    PipelineParams {
        ngram,
        ..base.clone()
    }
}

/// Assigns each sample index to a fold after one seeded shuffle.
fn assign_folds(n_samples: usize, folds: usize, seed: u64) -> Vec<usize> {
    let mut order: Vec<usize> = (0..n_samples).collect();
    order.shuffle(&mut StdRng::seed_from_u64(seed));

    let mut assignment = vec![0usize; n_samples];
    for (position, &sample) in order.iter().enumerate() {
        assignment[sample] = position % folds;
    }
    assignment
}

fn evaluate_fold(
    texts: &[String],
    labels: ArrayView2<'_, f32>,
    category_names: &[String],
    params: &PipelineParams,
    fold_indices: &[usize],
    fold: usize,
) -> Result<f32> {
    let mut train_rows = Vec::new();
    let mut held_out = Vec::new();
    for (row, &assigned) in fold_indices.iter().enumerate() {
        if assigned == fold {
            held_out.push(row);
        } else {
            train_rows.push(row);
        }
    }

    let train_texts: Vec<String> = train_rows.iter().map(|&row| texts[row].clone()).collect();
    let train_labels = labels.select(Axis(0), &train_rows);
    let pipeline = FittedPipeline::fit(&train_texts, train_labels.view(), category_names, params)?;

    let held_texts: Vec<String> = held_out.iter().map(|&row| texts[row].clone()).collect();
    let predictions = pipeline.predict(&held_texts);

    let mut exact = 0usize;
    for (out_row, &row) in held_out.iter().enumerate() {
        let matches = (0..labels.ncols())
            .all(|column| predictions[[out_row, column]] as f32 == labels[[row, column]]);
        if matches {
            exact += 1;
        }
    }
    Ok(exact as f32 / held_out.len().max(1) as f32)
}
