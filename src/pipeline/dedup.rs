//! Run-scoped record deduplication.

use std::collections::HashSet;

use crate::models::RawRecord;

/// Remembers every record id admitted during one run.
///
/// The set only grows; a new run starts with a fresh deduplicator.
#[derive(Debug, Default)]
pub struct Deduplicator {
    seen: HashSet<String>,
}

impl Deduplicator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns true the first time `id` is offered, and marks it as seen.
    pub fn is_new(&mut self, id: &str) -> bool {
        if self.seen.contains(id) {
            return false;
        }
        self.seen.insert(id.to_string())
    }

    /// Keep only records whose ids have not been admitted before.
    pub fn retain_new(&mut self, batch: Vec<RawRecord>) -> Vec<RawRecord> {
        batch.into_iter().filter(|r| self.is_new(&r.id)).collect()
    }

    pub fn len(&self) -> usize {
        self.seen.len()
    }

    pub fn is_empty(&self) -> bool {
        self.seen.is_empty()
    }
}
