//! Service layer for the streamer.
//!
//! This module contains the collaborators the producer loop drives:
//! - Record sources (`ReplaySource`, `SearchSource`) behind `RecordSource`
//! - The scoring contract (`Scorer`) and a built-in `LexiconScorer`

mod lexicon;
mod replay;
mod scorer;
mod search;

use async_trait::async_trait;

use crate::models::RawRecord;

pub use lexicon::LexiconScorer;
pub use replay::{FixtureContents, ReplaySource, decode_fixture};
pub use scorer::{Scorer, Sentiment};
pub use search::{SearchPage, SearchSource};

/// Anything the producer loop can pull batches of records from.
///
/// `next_batch` never fails: sources absorb their own errors by waiting and
/// retrying, or by yielding an empty batch.
#[async_trait]
pub trait RecordSource: Send {
    /// Return up to `max_size` records, waiting as long as needed.
    async fn next_batch(&mut self, max_size: usize) -> Vec<RawRecord>;

    /// Short label used in logs and synthesized ids.
    fn origin(&self) -> &'static str;
}
