//! Content scoring contract.
//!
//! Platform scanners call a [`ContentScorer`] on each post they extract to
//! obtain a promotion score and the red flags behind it. The phrase lexicon is
//! supplied by the caller; [`KeywordScorer::default`] carries only a small
//! starter set.

use crate::types::clamp_score;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::sync::OnceLock;

/// Score and flags for a piece of text. `score` is always within `0..=100`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContentScore {
    /// Clamped promotion score
    pub score: u8,
    /// Human-readable reasons
    pub flags: Vec<String>,
}

/// Scores text for promotional (pump) language.
pub trait ContentScorer: Send + Sync {
    /// Score `text`.
    fn score_content(&self, text: &str) -> ContentScore;
}

/// Phrase-weight scorer with cashtag detection.
#[derive(Debug, Clone)]
pub struct KeywordScorer {
    phrases: Vec<(String, i64)>,
    cashtag_weight: i64,
}

/// More cashtags than this in one post counts as ticker stacking.
const CASHTAG_STACK_LIMIT: usize = 3;

impl KeywordScorer {
    /// Create a scorer from `(phrase, weight)` pairs. Phrases match case-insensitively.
    #[must_use]
    pub fn new(phrases: impl IntoIterator<Item = (String, i64)>) -> Self {
        Self {
            phrases: phrases
                .into_iter()
                .map(|(phrase, weight)| (phrase.to_lowercase(), weight))
                .collect(),
            cashtag_weight: 15,
        }
    }

    /// Override the weight added when a post stacks many cashtags.
    #[must_use]
    pub fn with_cashtag_weight(mut self, weight: i64) -> Self {
        self.cashtag_weight = weight;
        self
    }

    fn cashtags(text: &str) -> usize {
        static CASHTAG: OnceLock<Regex> = OnceLock::new();
        let regex = CASHTAG.get_or_init(|| Regex::new(r"\$[A-Z]{1,5}\b").expect("valid regex"));
        regex.find_iter(text).count()
    }
}

impl Default for KeywordScorer {
    fn default() -> Self {
        let starter = [
            ("to the moon", 25),
            ("guaranteed", 30),
            ("get in now", 25),
            ("next big thing", 20),
            ("huge gains", 20),
            ("penny stock pick", 25),
            ("breakout alert", 20),
            ("1000%", 30),
        ];
        Self::new(starter.iter().map(|(p, w)| ((*p).to_string(), *w)))
    }
}

impl ContentScorer for KeywordScorer {
    fn score_content(&self, text: &str) -> ContentScore {
        let lowered = text.to_lowercase();
        let mut raw = 0i64;
        let mut flags = Vec::new();

        for (phrase, weight) in &self.phrases {
            if lowered.contains(phrase.as_str()) {
                raw += weight;
                flags.push(format!("promotional phrase: {phrase}"));
            }
        }

        let cashtags = Self::cashtags(text);
        if cashtags > CASHTAG_STACK_LIMIT {
            raw += self.cashtag_weight;
            flags.push(format!("ticker stacking: {cashtags} cashtags"));
        }

        ContentScore {
            score: clamp_score(raw),
            flags,
        }
    }
}
