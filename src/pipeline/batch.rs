// src/pipeline/batch.rs

//! Per-batch scoring and topic labeling.

use std::collections::BTreeMap;
use std::sync::Arc;

use futures::stream::{self, StreamExt};

use crate::error::{AppError, Result};
use crate::models::{
    PipelineConfig, RawRecord, ScoredRecord, SentimentLabel, TopicCatalog, TopicSummary,
};
use crate::services::{Scorer, Sentiment};
use crate::utils::{normalize_whitespace, truncate_with_ellipsis};

use super::aggregate::{AggregatePoint, AggregateStore};

/// Topic key used when a batch holds a single record.
pub const SINGLE_TOPIC_KEY: &str = "0";

/// Concurrent summarize calls per batch.
const SUMMARY_CONCURRENCY: usize = 4;

/// Summary of one processed batch.
#[derive(Debug, Default)]
pub struct BatchOutcome {
    pub records: Vec<ScoredRecord>,
    pub topics: BTreeMap<String, TopicSummary>,
    /// Records excluded for empty text or an unusable score
    pub dropped: usize,
}

/// Turns raw records into scored records and topic summaries.
pub struct BatchProcessor {
    scorer: Arc<dyn Scorer>,
    catalog: TopicCatalog,
    summary_max_chars: usize,
    summary_sample_size: usize,
}

impl BatchProcessor {
    pub fn new(scorer: Arc<dyn Scorer>, catalog: TopicCatalog, config: &PipelineConfig) -> Self {
        Self {
            scorer,
            catalog,
            summary_max_chars: config.summary_max_chars,
            summary_sample_size: config.summary_sample_size.max(1),
        }
    }

    /// Score a batch and fold its points into `store`.
    ///
    /// A scorer failure yields an empty outcome; nothing is appended.
    pub async fn process(&self, batch: Vec<RawRecord>, store: &AggregateStore) -> BatchOutcome {
        let total = batch.len();
        let valid: Vec<RawRecord> = batch
            .into_iter()
            .filter(|r| {
                let keep = !r.text.trim().is_empty();
                if !keep {
                    log::debug!("Dropping record {} with empty text", r.id);
                }
                keep
            })
            .collect();
        let mut dropped = total - valid.len();

        if valid.is_empty() {
            return BatchOutcome {
                dropped,
                ..BatchOutcome::default()
            };
        }

        let texts: Vec<String> = valid.iter().map(|r| r.text.trim().to_string()).collect();
        let (sentiments, topic_keys) = match self.infer(&texts).await {
            Ok(inferred) => inferred,
            Err(e) => {
                log::warn!("Scoring failed for batch of {}: {}", texts.len(), e);
                return BatchOutcome {
                    dropped: total,
                    ..BatchOutcome::default()
                };
            }
        };
        if sentiments.len() != valid.len() {
            log::warn!(
                "Scorer returned {} results for {} texts",
                sentiments.len(),
                valid.len()
            );
        }

        let mut records = Vec::with_capacity(valid.len());
        let mut sentiments = sentiments.into_iter();
        for (index, record) in valid.into_iter().enumerate() {
            let Some(sentiment) = sentiments.next() else {
                dropped += 1;
                continue;
            };
            let Some(label) = SentimentLabel::from_raw(&sentiment.label) else {
                log::debug!(
                    "Dropping record {}: unknown label '{}'",
                    record.id,
                    sentiment.label
                );
                dropped += 1;
                continue;
            };
            let topic = topic_keys
                .get(index)
                .cloned()
                .unwrap_or_else(|| SINGLE_TOPIC_KEY.to_string());
            records.push(ScoredRecord {
                sentiment_score: label.signed(sentiment.score),
                sentiment_label: label,
                topic,
                record,
            });
        }

        store.extend(records.iter().map(|r| AggregatePoint {
            timestamp: r.record.created_at,
            sentiment_score: r.sentiment_score,
        }));

        let topics = self.summarize_topics(&records).await;
        BatchOutcome {
            records,
            topics,
            dropped,
        }
    }

    /// Batched sentiment plus a topic key per text.
    async fn infer(&self, texts: &[String]) -> Result<(Vec<Sentiment>, Vec<String>)> {
        let sentiments = self.scorer.score(texts).await?;
        if texts.len() == 1 {
            return Ok((sentiments, vec![SINGLE_TOPIC_KEY.to_string()]));
        }

        let descriptors = self.scorer.infer_topics(texts).await?;
        if descriptors.is_empty() {
            return Err(AppError::scorer("topic inference returned no clusters"));
        }
        let keys = descriptors
            .iter()
            .map(|d| self.catalog.label_for(d).to_string())
            .collect();
        Ok((sentiments, keys))
    }

    /// One summary per topic, in order of first appearance.
    async fn summarize_topics(&self, records: &[ScoredRecord]) -> BTreeMap<String, TopicSummary> {
        let mut groups: Vec<(String, Vec<String>)> = Vec::new();
        for record in records {
            let text = record.record.text.clone();
            match groups.iter().position(|(topic, _)| *topic == record.topic) {
                Some(pos) => groups[pos].1.push(text),
                None => groups.push((record.topic.clone(), vec![text])),
            }
        }

        stream::iter(groups)
            .map(|(topic, texts)| async move {
                let joined = texts
                    .iter()
                    .take(self.summary_sample_size)
                    .map(|t| normalize_whitespace(t))
                    .collect::<Vec<_>>()
                    .join(" ");
                let sample_summary = match self.scorer.summarize(&joined).await {
                    Some(summary) if !summary.trim().is_empty() => summary,
                    _ => truncate_with_ellipsis(&joined, self.summary_max_chars),
                };
                TopicSummary {
                    topic_key: topic.to_string(),
                    count: texts.len(),
                    sample_summary,
                }
            })
            .buffered(SUMMARY_CONCURRENCY)
            .map(|summary| (summary.topic_key.clone(), summary))
            .collect()
            .await
    }
}
