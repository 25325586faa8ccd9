//! Time-windowed sentiment aggregate.
//!
//! The store is an append-only series of `(timestamp, score)` points. Points
//! arrive in ingestion order, but their timestamps come from the source and
//! may be out of order, so windows always filter on the timestamp.

use std::sync::{PoisonError, RwLock};

use chrono::{DateTime, Duration, Utc};

use crate::models::AggregateSnapshot;

/// Default trailing window for snapshots.
pub const DEFAULT_WINDOW_MINUTES: i64 = 15;

/// One scored observation.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AggregatePoint {
    pub timestamp: DateTime<Utc>,
    pub sentiment_score: f64,
}

/// Append-only series, readable while the producer appends.
#[derive(Debug, Default)]
pub struct AggregateStore {
    points: RwLock<Vec<AggregatePoint>>,
}

impl AggregateStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn append(&self, timestamp: DateTime<Utc>, sentiment_score: f64) {
        self.extend([AggregatePoint {
            timestamp,
            sentiment_score,
        }]);
    }

    /// Append several points under a single write lock.
    pub fn extend(&self, points: impl IntoIterator<Item = AggregatePoint>) {
        let mut guard = self.points.write().unwrap_or_else(PoisonError::into_inner);
        guard.extend(points);
    }

    pub fn len(&self) -> usize {
        self.points.read().unwrap_or_else(PoisonError::into_inner).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Snapshot over the trailing `window` ending now.
    pub fn window_snapshot(&self, window: Duration) -> AggregateSnapshot {
        self.window_snapshot_at(Utc::now(), window)
    }

    /// Snapshot over points with `timestamp >= now - window`.
    ///
    /// An empty store and an empty window each have their own fixed answer;
    /// see [`AggregateSnapshot::EMPTY_STORE`] and
    /// [`AggregateSnapshot::NOTHING_IN_WINDOW`].
    pub fn window_snapshot_at(&self, now: DateTime<Utc>, window: Duration) -> AggregateSnapshot {
        let points = self.points.read().unwrap_or_else(PoisonError::into_inner);
        if points.is_empty() {
            return AggregateSnapshot::EMPTY_STORE;
        }

        let cutoff = now - window;
        let (count, sum) = points
            .iter()
            .filter(|p| p.timestamp >= cutoff)
            .fold((0usize, 0.0f64), |(n, s), p| (n + 1, s + p.sentiment_score));

        if count == 0 {
            return AggregateSnapshot::NOTHING_IN_WINDOW;
        }
        AggregateSnapshot {
            count,
            avg_sentiment: sum / count as f64,
        }
    }
}
