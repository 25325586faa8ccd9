//! Producer pipeline.
//!
//! - `Controller`: starts, stops, and reports on the producer task
//! - `BatchProcessor`: scores and labels one batch
//! - `AggregateStore`: windowed sentiment over every scored record of a run
//! - `SharedState`: the latest batch, topics, and aggregate for readers

pub mod aggregate;
pub mod batch;
pub mod controller;
pub mod dedup;
pub mod state;

pub use aggregate::{AggregatePoint, AggregateStore};
pub use batch::{BatchOutcome, BatchProcessor};
pub use controller::Controller;
pub use dedup::Deduplicator;
pub use state::{PublishedState, SharedState};
