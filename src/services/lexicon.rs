// src/services/lexicon.rs

//! Word-list scorer used when no model service is wired in.
//!
//! Sentiment comes from counting lexicon hits. Topic descriptors are the
//! top terms of each text, weighted by how many texts in the batch share
//! them, so texts with common vocabulary land in the same topic.

use std::collections::{HashMap, HashSet};

use async_trait::async_trait;
use regex::Regex;

use crate::error::{AppError, Result};

use super::{Scorer, Sentiment};

const POSITIVE: &[&str] = &[
    "gain", "gains", "rally", "rallies", "surge", "surges", "soar", "soars", "beat", "beats",
    "bullish", "strong", "growth", "record", "up", "upgrade", "profit", "profits", "rise",
    "rises", "boom", "optimistic", "win", "wins", "recovery", "higher", "good", "great",
];

const NEGATIVE: &[&str] = &[
    "loss", "losses", "drop", "drops", "fall", "falls", "crash", "crashes", "plunge",
    "plunges", "miss", "misses", "bearish", "weak", "recession", "down", "downgrade", "fear",
    "fears", "sell-off", "selloff", "lower", "bad", "worst", "slump", "slumps", "layoffs",
    "default", "panic",
];

const STOPWORDS: &[&str] = &[
    "a", "about", "after", "again", "all", "am", "an", "and", "any", "are", "as", "at", "be",
    "been", "before", "being", "but", "by", "can", "could", "did", "do", "does", "for", "from",
    "had", "has", "have", "he", "her", "here", "his", "how", "i", "if", "in", "into", "is",
    "it", "its", "just", "me", "more", "most", "my", "no", "not", "now", "of", "on", "or",
    "our", "out", "over", "she", "so", "some", "than", "that", "the", "their", "them", "then",
    "there", "these", "they", "this", "to", "today", "too", "was", "we", "were", "what",
    "when", "which", "who", "why", "will", "with", "would", "you", "your", "rt", "amp", "https",
    "http", "co",
];

/// Number of top terms joined into a topic descriptor.
const DESCRIPTOR_TERMS: usize = 3;

/// Deterministic lexicon-based scorer.
pub struct LexiconScorer {
    token: Regex,
    positive: HashSet<&'static str>,
    negative: HashSet<&'static str>,
    stopwords: HashSet<&'static str>,
}

impl LexiconScorer {
    pub fn new() -> Self {
        Self {
            token: Regex::new(r"[a-z0-9][a-z0-9&'\-]*").expect("static token pattern"),
            positive: POSITIVE.iter().copied().collect(),
            negative: NEGATIVE.iter().copied().collect(),
            stopwords: STOPWORDS.iter().copied().collect(),
        }
    }

    fn tokens(&self, text: &str) -> Vec<String> {
        let lowered = text.to_lowercase();
        self.token
            .find_iter(&lowered)
            .map(|m| m.as_str().trim_matches(|c| c == '\'' || c == '-').to_string())
            .filter(|t| !t.is_empty())
            .collect()
    }

    /// Classify one text as `LABEL_0` (negative), `LABEL_1` or `LABEL_2`.
    pub fn classify(&self, text: &str) -> Sentiment {
        let tokens = self.tokens(text);
        let pos = tokens.iter().filter(|t| self.positive.contains(t.as_str())).count();
        let neg = tokens.iter().filter(|t| self.negative.contains(t.as_str())).count();
        let hits = pos + neg;
        if hits == 0 {
            return Sentiment::new("LABEL_1", 0.9);
        }
        let confidence = 0.5 + 0.5 * (pos.abs_diff(neg) as f64 / hits as f64);
        match pos.cmp(&neg) {
            std::cmp::Ordering::Greater => Sentiment::new("LABEL_2", confidence),
            std::cmp::Ordering::Less => Sentiment::new("LABEL_0", confidence),
            std::cmp::Ordering::Equal => Sentiment::new("LABEL_1", 0.5),
        }
    }

    fn content_terms(&self, text: &str) -> Vec<String> {
        self.tokens(text)
            .into_iter()
            .filter(|t| t.len() > 1 && !self.stopwords.contains(t.as_str()))
            .filter(|t| !t.chars().all(|c| c.is_ascii_digit()))
            .collect()
    }
}

impl Default for LexiconScorer {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Scorer for LexiconScorer {
    async fn score(&self, texts: &[String]) -> Result<Vec<Sentiment>> {
        Ok(texts.iter().map(|t| self.classify(t)).collect())
    }

    async fn infer_topics(&self, texts: &[String]) -> Result<Vec<String>> {
        if texts.is_empty() {
            return Err(AppError::scorer("topic inference needs at least one text"));
        }
        let per_text: Vec<Vec<String>> = texts.iter().map(|t| self.content_terms(t)).collect();

        let mut document_frequency: HashMap<&str, usize> = HashMap::new();
        for terms in &per_text {
            let unique: HashSet<&str> = terms.iter().map(String::as_str).collect();
            for term in unique {
                *document_frequency.entry(term).or_default() += 1;
            }
        }

        let descriptors = per_text
            .iter()
            .map(|terms| {
                let mut weights: Vec<(&str, usize, usize)> = Vec::new();
                for (position, term) in terms.iter().enumerate() {
                    let term = term.as_str();
                    let df = document_frequency[term];
                    match weights.iter().position(|(t, _, _)| *t == term) {
                        Some(i) => weights[i].1 += df,
                        None => weights.push((term, df, position)),
                    }
                }
                // Heaviest first; earlier occurrence breaks ties.
                weights.sort_by(|a, b| b.1.cmp(&a.1).then(a.2.cmp(&b.2)));
                weights
                    .iter()
                    .take(DESCRIPTOR_TERMS)
                    .map(|(t, _, _)| *t)
                    .collect::<Vec<_>>()
                    .join(" ")
            })
            .collect();
        Ok(descriptors)
    }
}
