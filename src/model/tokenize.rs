//! Message tokenization and normalization.
//!
//! The sequence is deterministic and restartable: the same text always
//! yields the identical token sequence. Lemmatization runs BEFORE stemming
//! on purpose — inflection is normalized first, then remaining suffixes are
//! stripped.

use regex::Regex;
use rust_stemmers::{Algorithm, Stemmer};
use rustc_hash::FxHashSet;
use serde::{Deserialize, Serialize};
use stop_words::{LANGUAGE, get};

/// Tokenizer settings carried inside the model artifact so a reloaded
/// pipeline rebuilds the exact same tokenizer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenizerConfig {
    pub language: String,
}

impl Default for TokenizerConfig {
    fn default() -> Self {
        Self {
            language: "english".to_string(),
        }
    }
}

pub struct Tokenizer {
    strip_re: Regex,
    stopwords: FxHashSet<String>,
    stemmer: Stemmer,
}

impl Tokenizer {
    #[must_use]
    pub fn new(config: &TokenizerConfig) -> Self {
        // 言語は現状 English のみ。未知の言語名も English にフォールバックする。
        let _ = &config.language;
        let stopwords: FxHashSet<String> = get(LANGUAGE::English)
            .into_iter()
            .map(|word| word.to_lowercase())
            .collect();
        Self {
            strip_re: Regex::new("[^a-zA-Z0-9]+").expect("compile strip pattern"),
            stopwords,
            stemmer: Stemmer::create(Algorithm::English),
        }
    }

    /// Tokenizes one message: strip non-alphanumerics to spaces, split on
    /// whitespace, drop English stopwords (case-insensitive), lowercase and
    /// trim, lemmatize, then stem.
    #[must_use]
    pub fn tokenize(&self, text: &str) -> Vec<String> {
        let stripped = self.strip_re.replace_all(text, " ");
        stripped
            .split_whitespace()
            .filter_map(|raw| {
                let lowered = raw.trim().to_lowercase();
                if lowered.is_empty() || self.stopwords.contains(&lowered) {
                    return None;
                }
                let lemma = lemmatize(&lowered);
                Some(self.stemmer.stem(&lemma).into_owned())
            })
            .collect()
    }
}

impl std::fmt::Debug for Tokenizer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Tokenizer")
            .field("stopwords", &self.stopwords.len())
            .finish()
    }
}

/// English inflection normalization applied before stemming.
///
/// A short irregular-noun table plus plural suffix rules; anything more
/// elaborate is the stemmer's job.
fn lemmatize(token: &str) -> String {
    const IRREGULAR: [(&str, &str); 8] = [
        ("children", "child"),
        ("people", "person"),
        ("men", "man"),
        ("women", "woman"),
        ("feet", "foot"),
        ("teeth", "tooth"),
        ("mice", "mouse"),
        ("geese", "goose"),
    ];
    for (plural, singular) in IRREGULAR {
        if token == plural {
            return singular.to_string();
        }
    }

    if let Some(stem) = token.strip_suffix("ies")
        && stem.len() > 1
    {
        return format!("{stem}y");
    }
    for suffix in ["ches", "shes", "sses", "xes", "zes"] {
        if let Some(stem) = token.strip_suffix("es")
            && token.ends_with(suffix)
        {
            return stem.to_string();
        }
    }
    if let Some(stem) = token.strip_suffix('s')
        && stem.len() > 2
        && !stem.ends_with('s')
        && !stem.ends_with('u')
        && !stem.ends_with('i')
    {
        return stem.to_string();
    }
    token.to_string()
}

#[cfg(test)]
mod tests {
    use rstest::rstest;

    use super::*;

    fn tokenizer() -> Tokenizer {
        Tokenizer::new(&TokenizerConfig::default())
    }

    #[test]
    fn tokenization_is_deterministic_and_restartable() {
        let t = tokenizer();
        let text = "We urgently need food, water and medical supplies!!";
        let first = t.tokenize(text);
        let second = t.tokenize(text);
        assert_eq!(first, second);
        assert!(!first.is_empty());
    }

    #[test]
    fn punctuation_is_stripped_to_spaces() {
        let t = tokenizer();
        let tokens = t.tokenize("water;food-needed");
        assert_eq!(tokens, t.tokenize("water food needed"));
    }

    #[test]
    fn stopwords_are_dropped_case_insensitively() {
        let t = tokenizer();
        let tokens = t.tokenize("The AND the water");
        assert_eq!(tokens, vec!["water"]);
    }

    #[test]
    fn tokens_are_lowercased() {
        let t = tokenizer();
        let tokens = t.tokenize("WATER Earthquake");
        assert!(tokens.iter().all(|tok| tok.chars().all(|c| !c.is_uppercase())));
    }

    #[rstest]
    #[case("children", "child")]
    #[case("people", "person")]
    #[case("supplies", "supply")]
    #[case("churches", "church")]
    #[case("roads", "road")]
    // 短すぎる語・非複数形は触らない
    #[case("gas", "gas")]
    #[case("glass", "glass")]
    fn plurals_are_lemmatized(#[case] token: &str, #[case] lemma: &str) {
        assert_eq!(lemmatize(token), lemma);
    }

    #[test]
    fn lemmatize_runs_before_stem() {
        let t = tokenizer();
        // "supplies" → lemma "supply" → stem; equal to tokenizing "supply"
        assert_eq!(t.tokenize("supplies"), t.tokenize("supply"));
    }
}
