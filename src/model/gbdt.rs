//! Gradient-boosted decision trees with logistic loss.
//!
//! One binary booster per category, wrapped in a multi-output ensemble that
//! trains its columns in parallel. Trees use second-order (Newton) leaf
//! values and gain, exact splits over midpoints of sorted feature values,
//! and per-tree sqrt feature subsampling driven by a seeded RNG.

use anyhow::{Result, bail};
use ndarray::{Array2, ArrayView1, ArrayView2};
use rand::SeedableRng;
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use tracing::debug;

/// L2 regularization on leaf weights.
const LAMBDA: f32 = 1.0;
/// Minimum gain for a split to be kept.
const MIN_GAIN: f32 = 1e-6;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GbdtConfig {
    pub n_trees: usize,
    pub learning_rate: f32,
    pub max_depth: usize,
    pub min_samples_leaf: usize,
    pub seed: u64,
}

impl Default for GbdtConfig {
    fn default() -> Self {
        Self {
            n_trees: 50,
            learning_rate: 0.1,
            max_depth: 3,
            min_samples_leaf: 1,
            seed: 42,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
enum Node {
    Leaf {
        value: f32,
    },
    Split {
        feature: usize,
        threshold: f32,
        left: Box<Node>,
        right: Box<Node>,
    },
}

impl Node {
    fn score(&self, sample: ArrayView1<'_, f32>) -> f32 {
        match self {
            Self::Leaf { value } => *value,
            Self::Split {
                feature,
                threshold,
                left,
                right,
            } => {
                if sample[*feature] <= *threshold {
                    left.score(sample)
                } else {
                    right.score(sample)
                }
            }
        }
    }
}

/// 単一ラベルのブースター。fit済み状態はそのままシリアライズされる。
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GbdtClassifier {
    base_score: f32,
    trees: Vec<Node>,
    config: GbdtConfig,
}

impl GbdtClassifier {
    /// Fits one binary booster against {0,1} targets.
    ///
    /// # Errors
    /// Fails on an empty training set or a row/target length mismatch.
    pub fn fit(features: ArrayView2<'_, f32>, targets: &[f32], config: &GbdtConfig) -> Result<Self> {
        let n_samples = features.nrows();
        if n_samples == 0 {
            bail!("cannot fit a booster on an empty training set");
        }
        if targets.len() != n_samples {
            bail!(
                "feature rows ({n_samples}) and targets ({}) disagree",
                targets.len()
            );
        }

        if features.ncols() == 0 {
            bail!("cannot fit a booster with zero features");
        }

        let positives: f32 = targets.iter().sum();
        let prior = (positives / n_samples as f32).clamp(1e-4, 1.0 - 1e-4);
        let base_score = (prior / (1.0 - prior)).ln();

        let n_features = features.ncols();
        let subsample = ((n_features as f64).sqrt().ceil() as usize).clamp(1, n_features.max(1));
        let mut rng = StdRng::seed_from_u64(config.seed);
        let mut feature_pool: Vec<usize> = (0..n_features).collect();

        let mut raw_scores = vec![base_score; n_samples];
        let mut trees = Vec::with_capacity(config.n_trees);
        let all_rows: Vec<usize> = (0..n_samples).collect();

        for round in 0..config.n_trees {
            let mut residuals = Vec::with_capacity(n_samples);
            let mut hessians = Vec::with_capacity(n_samples);
            for (i, &target) in targets.iter().enumerate() {
                let p = sigmoid(raw_scores[i]);
                residuals.push(target - p);
                hessians.push((p * (1.0 - p)).max(1e-12));
            }

            feature_pool.shuffle(&mut rng);
            let candidates = &feature_pool[..subsample];

            let tree = grow_tree(
                features,
                &residuals,
                &hessians,
                &all_rows,
                candidates,
                config.max_depth,
                config.min_samples_leaf,
            );
            for (i, score) in raw_scores.iter_mut().enumerate() {
                *score += config.learning_rate * tree.score(features.row(i));
            }
            if round == 0 {
                debug!(
                    n_samples,
                    n_features, subsample, "boosting round state initialized"
                );
            }
            trees.push(tree);
        }

        Ok(Self {
            base_score,
            trees,
            config: *config,
        })
    }

    #[must_use]
    pub fn predict_proba(&self, sample: ArrayView1<'_, f32>) -> f32 {
        let mut raw = self.base_score;
        for tree in &self.trees {
            raw += self.config.learning_rate * tree.score(sample);
        }
        sigmoid(raw)
    }

    #[must_use]
    pub fn predict(&self, sample: ArrayView1<'_, f32>) -> i64 {
        i64::from(self.predict_proba(sample) >= 0.5)
    }
}

/// One booster per output column, trained in parallel.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MultiOutputGbdt {
    estimators: Vec<GbdtClassifier>,
}

impl MultiOutputGbdt {
    /// Fits one booster per label column. Each column gets a seed derived
    /// from the configured one so the whole ensemble is reproducible while
    /// the columns still subsample differently.
    ///
    /// # Errors
    /// Fails if any column's booster fails to fit.
    pub fn fit(
        features: ArrayView2<'_, f32>,
        labels: ArrayView2<'_, f32>,
        config: &GbdtConfig,
    ) -> Result<Self> {
        if features.nrows() != labels.nrows() {
            bail!(
                "feature rows ({}) and label rows ({}) disagree",
                features.nrows(),
                labels.nrows()
            );
        }
        let estimators = (0..labels.ncols())
            .into_par_iter()
            .map(|column| {
                let targets: Vec<f32> = labels.column(column).iter().copied().collect();
                let column_config = GbdtConfig {
                    seed: config.seed.wrapping_add(column as u64),
                    ..*config
                };
                GbdtClassifier::fit(features, &targets, &column_config)
            })
            .collect::<Result<Vec<_>>>()?;
        Ok(Self { estimators })
    }

    #[must_use]
    pub fn n_outputs(&self) -> usize {
        self.estimators.len()
    }

    /// Predicts hard {0,1} labels, one row per input row and one column per
    /// estimator.
    #[must_use]
    pub fn predict(&self, features: ArrayView2<'_, f32>) -> Array2<i64> {
        let mut out = Array2::<i64>::zeros((features.nrows(), self.estimators.len()));
        for (row, sample) in features.outer_iter().enumerate() {
            for (column, estimator) in self.estimators.iter().enumerate() {
                out[[row, column]] = estimator.predict(sample);
            }
        }
        out
    }
}

fn sigmoid(x: f32) -> f32 {
    1.0 / (1.0 + (-x).exp())
}

struct SplitChoice {
    feature: usize,
    threshold: f32,
    gain: f32,
    left: Vec<usize>,
    right: Vec<usize>,
}

fn grow_tree(
    features: ArrayView2<'_, f32>,
    residuals: &[f32],
    hessians: &[f32],
    rows: &[usize],
    candidates: &[usize],
    depth_left: usize,
    min_samples_leaf: usize,
) -> Node {
    if depth_left == 0 || rows.len() < 2 * min_samples_leaf.max(1) {
        return leaf(residuals, hessians, rows);
    }
    let Some(split) = best_split(features, residuals, hessians, rows, candidates, min_samples_leaf)
    else {
        return leaf(residuals, hessians, rows);
    };

    let left = grow_tree(
        features,
        residuals,
        hessians,
        &split.left,
        candidates,
        depth_left - 1,
        min_samples_leaf,
    );
    let right = grow_tree(
        features,
        residuals,
        hessians,
        &split.right,
        candidates,
        depth_left - 1,
        min_samples_leaf,
    );
    Node::Split {
        feature: split.feature,
        threshold: split.threshold,
        left: Box::new(left),
        right: Box::new(right),
    }
}

fn leaf(residuals: &[f32], hessians: &[f32], rows: &[usize]) -> Node {
    let sum_r: f32 = rows.iter().map(|&i| residuals[i]).sum();
    let sum_h: f32 = rows.iter().map(|&i| hessians[i]).sum();
    Node::Leaf {
        value: sum_r / (sum_h + LAMBDA),
    }
}

/// Exact greedy split search over midpoints of sorted distinct values, using
/// the second-order gain `GL²/(HL+λ) + GR²/(HR+λ) − G²/(H+λ)`.
fn best_split(
    features: ArrayView2<'_, f32>,
    residuals: &[f32],
    hessians: &[f32],
    rows: &[usize],
    candidates: &[usize],
    min_samples_leaf: usize,
) -> Option<SplitChoice> {
    let total_r: f32 = rows.iter().map(|&i| residuals[i]).sum();
    let total_h: f32 = rows.iter().map(|&i| hessians[i]).sum();
    let parent_score = total_r * total_r / (total_h + LAMBDA);
    let min_leaf = min_samples_leaf.max(1);

    let mut best: Option<SplitChoice> = None;
    let mut ordered: Vec<(f32, usize)> = Vec::with_capacity(rows.len());
    for &feature in candidates {
        ordered.clear();
        ordered.extend(rows.iter().map(|&i| (features[[i, feature]], i)));
        ordered.sort_by(|a, b| a.0.total_cmp(&b.0));

        let mut left_r = 0.0f32;
        let mut left_h = 0.0f32;
        for cut in 1..ordered.len() {
            let (prev_value, prev_row) = ordered[cut - 1];
            left_r += residuals[prev_row];
            left_h += hessians[prev_row];

            let value = ordered[cut].0;
            if value <= prev_value {
                continue;
            }
            if cut < min_leaf || ordered.len() - cut < min_leaf {
                continue;
            }

            let right_r = total_r - left_r;
            let right_h = total_h - left_h;
            let gain = left_r * left_r / (left_h + LAMBDA)
                + right_r * right_r / (right_h + LAMBDA)
                - parent_score;
            if gain <= MIN_GAIN {
                continue;
            }
            if best.as_ref().is_none_or(|b| gain > b.gain) {
                let threshold = (prev_value + value) / 2.0;
                // ordered is sorted by value, so the cut index is the partition
                let left: Vec<usize> = ordered[..cut].iter().map(|&(_, i)| i).collect();
                let right: Vec<usize> = ordered[cut..].iter().map(|&(_, i)| i).collect();
                best = Some(SplitChoice {
                    feature,
                    threshold,
                    gain,
                    left,
                    right,
                });
            }
        }
    }
    best
}
