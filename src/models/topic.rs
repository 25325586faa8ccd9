//! Topic catalog and per-batch topic summaries.

use serde::{Deserialize, Serialize};

/// Summary of one topic within the most recent batch.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TopicSummary {
    pub topic_key: String,
    pub count: usize,
    pub sample_summary: String,
}

/// One catalog entry: a human-readable label and the keywords that select it.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct TopicEntry {
    pub label: String,
    pub keywords: Vec<String>,
}

impl TopicEntry {
    pub fn new(label: &str, keywords: &[&str]) -> Self {
        Self {
            label: label.to_string(),
            keywords: keywords.iter().map(|k| k.to_string()).collect(),
        }
    }
}

/// Ordered keyword catalog mapping cluster descriptors to topic labels.
///
/// Entries are scanned in order and the first keyword contained in the
/// descriptor (case-insensitive) wins.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct TopicCatalog {
    pub entries: Vec<TopicEntry>,
    pub fallback: String,
}

impl TopicCatalog {
    pub fn label_for<'a>(&'a self, descriptor: &str) -> &'a str {
        let lowered = descriptor.to_lowercase();
        if lowered.trim().is_empty() {
            return &self.fallback;
        }
        self.entries
            .iter()
            .find(|entry| {
                entry
                    .keywords
                    .iter()
                    .any(|kw| !kw.is_empty() && lowered.contains(&kw.to_lowercase()))
            })
            .map(|entry| entry.label.as_str())
            .unwrap_or(&self.fallback)
    }
}
