// src/services/scorer.rs

//! Contract for the sentiment/topic collaborator.

use async_trait::async_trait;

use crate::error::Result;

/// Raw classifier output for one text.
#[derive(Debug, Clone, PartialEq)]
pub struct Sentiment {
    /// Label as the model reports it (`LABEL_0`, `positive`, ...)
    pub label: String,
    /// Model confidence in `[0, 1]`
    pub score: f64,
}

impl Sentiment {
    pub fn new(label: impl Into<String>, score: f64) -> Self {
        Self {
            label: label.into(),
            score,
        }
    }
}

/// Sentiment and topic inference over batches of text.
///
/// An `Err` from `score` or `infer_topics` fails the whole batch; the
/// pipeline logs it and moves on to the next cycle.
#[async_trait]
pub trait Scorer: Send + Sync {
    /// One sentiment per input text, in input order.
    async fn score(&self, texts: &[String]) -> Result<Vec<Sentiment>>;

    /// One cluster descriptor per input text, in input order.
    ///
    /// Descriptors are free text (representative terms of the cluster) and
    /// are mapped onto the topic catalog by keyword containment.
    async fn infer_topics(&self, texts: &[String]) -> Result<Vec<String>>;

    /// Digest of a block of text, or `None` when summarization is unavailable.
    async fn summarize(&self, _text: &str) -> Option<String> {
        None
    }
}
