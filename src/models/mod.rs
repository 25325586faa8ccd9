// src/models/mod.rs

//! Domain models for the streamer.
//!
//! Plain data only: records on their way through the pipeline, the topic
//! catalog, reader-facing views and configuration.

mod config;
mod record;
mod state;
mod topic;

// Re-export all public types
pub use config::{BEARER_TOKEN_ENV, Config, PipelineConfig, ReplayConfig, SourceConfig};
pub use record::{
    PublicMetrics, RawRecord, ScoredRecord, SentimentLabel, WirePost, parse_timestamp,
};
pub use state::{AggregateSnapshot, Mode, Status, Updates};
pub use topic::{TopicCatalog, TopicEntry, TopicSummary};
