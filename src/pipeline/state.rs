//! Published state shared between the producer and polling readers.

use std::collections::BTreeMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use crate::models::{AggregateSnapshot, ScoredRecord, TopicSummary, Updates};

/// The latest batch and aggregate, as readers see them.
#[derive(Debug, Clone, Default)]
pub struct PublishedState {
    pub pending_records: Vec<ScoredRecord>,
    pub topics: BTreeMap<String, TopicSummary>,
    pub aggregate_snapshot: AggregateSnapshot,
}

/// Handle to the published state. Cloning shares the same slot.
///
/// Every operation takes the lock once, so a reader never sees records from
/// one batch next to topics from another.
#[derive(Debug, Clone, Default)]
pub struct SharedState {
    inner: Arc<Mutex<PublishedState>>,
}

impl SharedState {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, PublishedState> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Clear everything back to the pre-run state.
    pub fn reset(&self) {
        *self.lock() = PublishedState::default();
    }

    /// Swap in a finished batch together with a fresh aggregate.
    pub fn publish_batch(
        &self,
        records: Vec<ScoredRecord>,
        topics: BTreeMap<String, TopicSummary>,
        aggregate: AggregateSnapshot,
    ) {
        let mut state = self.lock();
        state.pending_records = records;
        state.topics = topics;
        state.aggregate_snapshot = aggregate;
    }

    /// Refresh only the aggregate, leaving records and topics in place.
    pub fn publish_aggregate(&self, aggregate: AggregateSnapshot) {
        self.lock().aggregate_snapshot = aggregate;
    }

    /// Remove and return every pending record.
    ///
    /// `last_seen_id` is the cursor the reader got from its previous drain.
    /// It never filters: a replayed batch may reuse ids the reader has seen.
    /// It is handed back unchanged when nothing is pending.
    pub fn drain(&self, last_seen_id: Option<&str>) -> Updates {
        let mut state = self.lock();
        let records = std::mem::take(&mut state.pending_records);
        let topics = state.topics.clone();
        let aggregate = state.aggregate_snapshot;
        drop(state);

        let last_seen_id = records
            .last()
            .map(|r| r.id().to_string())
            .or_else(|| last_seen_id.map(str::to_string));

        Updates {
            records,
            topics,
            aggregate,
            last_seen_id,
        }
    }

    /// Copy of the current state without draining it.
    pub fn snapshot(&self) -> PublishedState {
        self.lock().clone()
    }
}
