// src/services/replay.rs

//! Fixture replay source.
//!
//! Serves a fixed sequence of posts in order and wraps around forever.

use std::path::Path;
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use serde_json::Value;

use crate::error::{AppError, Result};
use crate::models::{RawRecord, WirePost};

use super::RecordSource;

/// Posts decoded from a fixture document.
#[derive(Debug, Default)]
pub struct FixtureContents {
    pub posts: Vec<WirePost>,
    /// Entries that were not post-shaped objects
    pub skipped: usize,
}

/// Decode a fixture: a top-level array, an object with a `data` array, or a
/// single post object.
pub fn decode_fixture(bytes: &[u8]) -> Result<FixtureContents> {
    let document: Value = serde_json::from_slice(bytes)?;
    let entries = match document {
        Value::Array(items) => items,
        Value::Object(mut map) => match map.remove("data") {
            Some(Value::Array(items)) => items,
            Some(other) => vec![other],
            None => vec![Value::Object(map)],
        },
        other => {
            return Err(AppError::validation(format!(
                "fixture must be an array or object, got {}",
                json_kind(&other)
            )));
        }
    };

    let mut contents = FixtureContents::default();
    for entry in entries {
        if !entry.is_object() {
            contents.skipped += 1;
            continue;
        }
        match serde_json::from_value::<WirePost>(entry) {
            Ok(post) => contents.posts.push(post),
            Err(_) => contents.skipped += 1,
        }
    }
    Ok(contents)
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}

/// Replays fixture posts in order, pausing and wrapping when exhausted.
pub struct ReplaySource {
    posts: Vec<WirePost>,
    cursor: usize,
    wrap_pause: Duration,
}

impl ReplaySource {
    pub fn new(posts: Vec<WirePost>, wrap_pause: Duration) -> Self {
        Self {
            posts,
            cursor: 0,
            wrap_pause,
        }
    }

    /// Load a fixture file.
    pub async fn load(path: &Path, wrap_pause: Duration) -> Result<Self> {
        let bytes = tokio::fs::read(path)
            .await
            .map_err(|e| AppError::fixture(path.display().to_string(), e))?;
        let contents = decode_fixture(&bytes)
            .map_err(|e| AppError::fixture(path.display().to_string(), e))?;
        if contents.skipped > 0 {
            log::warn!(
                "Skipped {} malformed entries in fixture {}",
                contents.skipped,
                path.display()
            );
        }
        log::info!(
            "Loaded {} replay posts from {}",
            contents.posts.len(),
            path.display()
        );
        Ok(Self::new(contents.posts, wrap_pause))
    }

    /// Load a fixture file, degrading to an empty source on failure.
    pub async fn load_or_empty(path: &Path, wrap_pause: Duration) -> Self {
        Self::load(path, wrap_pause).await.unwrap_or_else(|e| {
            log::error!("{}. Replay source will be empty.", e);
            Self::new(Vec::new(), wrap_pause)
        })
    }

    pub fn len(&self) -> usize {
        self.posts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.posts.is_empty()
    }
}

#[async_trait]
impl RecordSource for ReplaySource {
    async fn next_batch(&mut self, max_size: usize) -> Vec<RawRecord> {
        if self.posts.is_empty() || max_size == 0 {
            tokio::time::sleep(self.wrap_pause).await;
            return Vec::new();
        }
        if self.cursor >= self.posts.len() {
            log::info!("Reached end of replay fixture, restarting from the beginning");
            tokio::time::sleep(self.wrap_pause).await;
            self.cursor = 0;
        }

        let start = self.cursor;
        let end = (start + max_size).min(self.posts.len());
        self.cursor = end;

        let ingested_at = Utc::now();
        let origin = self.origin();
        self.posts[start..end]
            .iter()
            .enumerate()
            .filter_map(|(offset, post)| {
                let index = start + offset;
                let record = RawRecord::from_wire(post.clone(), origin, index, ingested_at);
                if record.is_none() {
                    log::debug!("Dropping replay post {} with unreadable timestamp", index);
                }
                record
            })
            .collect()
    }

    fn origin(&self) -> &'static str {
        "replay"
    }
}
