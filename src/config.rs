use std::env;

use thiserror::Error;

/// Runtime configuration for both batch jobs, loaded from the environment.
///
/// Every value has a default so the jobs run with no environment at all;
/// the seed is surfaced explicitly (and logged) so training runs are
/// reproducible.
#[derive(Debug, Clone, PartialEq)]
pub struct Config {
    seed: u64,
    test_ratio: f64,
    vocab_size: usize,
    cv_folds: usize,
    gbdt_trees: usize,
    gbdt_learning_rate: f32,
    gbdt_max_depth: usize,
    gbdt_min_samples_leaf: usize,
    db_max_connections: u32,
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid value for {name}: {source}")]
    Invalid {
        name: &'static str,
        #[source]
        source: anyhow::Error,
    },
    #[error("value for {name} out of range: {detail}")]
    OutOfRange {
        name: &'static str,
        detail: String,
    },
}

impl Config {
    /// 環境変数から設定値を読み込み、検証する。
    ///
    /// # Errors
    /// 数値のパースに失敗した場合、または比率・フォールド数が許容範囲外の
    /// 場合は [`ConfigError`] を返す。
    pub fn from_env() -> Result<Self, ConfigError> {
        let seed = parse_u64("TRIAGE_SEED", 42)?;
        let test_ratio = parse_f64("TRIAGE_TEST_RATIO", 0.2)?;
        let vocab_size = parse_usize("TRIAGE_VOCAB_SIZE", 5000)?;
        let cv_folds = parse_usize("TRIAGE_CV_FOLDS", 2)?;
        let gbdt_trees = parse_usize("TRIAGE_GBDT_TREES", 50)?;
        let gbdt_learning_rate = parse_f64("TRIAGE_GBDT_LEARNING_RATE", 0.1)? as f32;
        let gbdt_max_depth = parse_usize("TRIAGE_GBDT_MAX_DEPTH", 3)?;
        let gbdt_min_samples_leaf = parse_usize("TRIAGE_GBDT_MIN_SAMPLES_LEAF", 1)?;
        let db_max_connections = parse_u32("TRIAGE_DB_MAX_CONNECTIONS", 5)?;

        if !(0.0..1.0).contains(&test_ratio) || test_ratio == 0.0 {
            return Err(ConfigError::OutOfRange {
                name: "TRIAGE_TEST_RATIO",
                detail: format!("expected a ratio in (0, 1), got {test_ratio}"),
            });
        }
        if cv_folds < 2 {
            return Err(ConfigError::OutOfRange {
                name: "TRIAGE_CV_FOLDS",
                detail: format!("cross-validation needs at least 2 folds, got {cv_folds}"),
            });
        }

        Ok(Self {
            seed,
            test_ratio,
            vocab_size,
            cv_folds,
            gbdt_trees,
            gbdt_learning_rate,
            gbdt_max_depth,
            gbdt_min_samples_leaf,
            db_max_connections,
        })
    }

    #[must_use]
    pub fn seed(&self) -> u64 {
        self.seed
    }

    #[must_use]
    pub fn test_ratio(&self) -> f64 {
        self.test_ratio
    }

    #[must_use]
    pub fn vocab_size(&self) -> usize {
        self.vocab_size
    }

    #[must_use]
    pub fn cv_folds(&self) -> usize {
        self.cv_folds
    }

    #[must_use]
    pub fn gbdt_trees(&self) -> usize {
        self.gbdt_trees
    }

    #[must_use]
    pub fn gbdt_learning_rate(&self) -> f32 {
        self.gbdt_learning_rate
    }

    #[must_use]
    pub fn gbdt_max_depth(&self) -> usize {
        self.gbdt_max_depth
    }

    #[must_use]
    pub fn gbdt_min_samples_leaf(&self) -> usize {
        self.gbdt_min_samples_leaf
    }

    #[must_use]
    pub fn db_max_connections(&self) -> u32 {
        self.db_max_connections
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            seed: 42,
            test_ratio: 0.2,
            vocab_size: 5000,
            cv_folds: 2,
            gbdt_trees: 50,
            gbdt_learning_rate: 0.1,
            gbdt_max_depth: 3,
            gbdt_min_samples_leaf: 1,
            db_max_connections: 5,
        }
    }
}

fn parse_u64(name: &'static str, default: u64) -> Result<u64, ConfigError> {
    match env::var(name) {
        Ok(raw) => raw.parse().map_err(|e| ConfigError::Invalid {
            name,
            source: anyhow::Error::new(e),
        }),
        Err(_) => Ok(default),
    }
}

fn parse_u32(name: &'static str, default: u32) -> Result<u32, ConfigError> {
    match env::var(name) {
        Ok(raw) => raw.parse().map_err(|e| ConfigError::Invalid {
            name,
            source: anyhow::Error::new(e),
        }),
        Err(_) => Ok(default),
    }
}

fn parse_usize(name: &'static str, default: usize) -> Result<usize, ConfigError> {
    match env::var(name) {
        Ok(raw) => raw.parse().map_err(|e| ConfigError::Invalid {
            name,
            source: anyhow::Error::new(e),
        }),
        Err(_) => Ok(default),
    }
}

fn parse_f64(name: &'static str, default: f64) -> Result<f64, ConfigError> {
    match env::var(name) {
        Ok(raw) => raw.parse().map_err(|e| ConfigError::Invalid {
            name,
            source: anyhow::Error::new(e),
        }),
        Err(_) => Ok(default),
    }
}
