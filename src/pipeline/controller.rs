// src/pipeline/controller.rs

//! Producer lifecycle.
//!
//! At most one producer task exists at a time. `start` stops and joins the
//! previous task before launching a new one, and `stop` only returns after
//! the task has exited, so nothing is published once `stop` has returned.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{Mutex, watch};
use tokio::task::JoinHandle;

use crate::models::{Config, Mode, RawRecord, Status, Updates};
use crate::services::{RecordSource, ReplaySource, Scorer, SearchSource};
use crate::utils::http;

use super::aggregate::AggregateStore;
use super::batch::BatchProcessor;
use super::dedup::Deduplicator;
use super::state::SharedState;

/// A running producer task and what it owns.
struct RunHandle {
    shutdown: watch::Sender<bool>,
    task: JoinHandle<()>,
    store: Arc<AggregateStore>,
}

impl RunHandle {
    async fn shutdown_and_join(self) {
        // The receiver may already be gone if the task ended on its own.
        let _ = self.shutdown.send(true);
        if let Err(e) = self.task.await {
            log::error!("Producer task ended abnormally: {}", e);
        }
    }
}

struct Lifecycle {
    run: Option<RunHandle>,
    mode: Mode,
}

/// Owns the producer task and the state it publishes.
pub struct Controller {
    config: Arc<Config>,
    scorer: Arc<dyn Scorer>,
    state: SharedState,
    lifecycle: Mutex<Lifecycle>,
}

impl Controller {
    pub fn new(config: Arc<Config>, scorer: Arc<dyn Scorer>) -> Self {
        Self::with_state(config, scorer, SharedState::new())
    }

    /// Build a controller publishing into an existing state slot.
    pub fn with_state(config: Arc<Config>, scorer: Arc<dyn Scorer>, state: SharedState) -> Self {
        let mode = config.pipeline.mode;
        Self {
            config,
            scorer,
            state,
            lifecycle: Mutex::new(Lifecycle { run: None, mode }),
        }
    }

    /// Handle readers can keep and drain from other tasks.
    pub fn shared_state(&self) -> SharedState {
        self.state.clone()
    }

    /// Start producing for `query` (or the configured query) in `mode`.
    ///
    /// A run already in progress is stopped and joined first.
    pub async fn start(&self, query: Option<&str>, mode: Mode) {
        let mut lifecycle = self.lifecycle.lock().await;
        self.halt(&mut lifecycle).await;
        let source = self.build_source(query, mode).await;
        self.launch(&mut lifecycle, source, mode);
    }

    /// Start producing from a caller-supplied source.
    pub async fn start_with_source(&self, source: Box<dyn RecordSource>, mode: Mode) {
        let mut lifecycle = self.lifecycle.lock().await;
        self.halt(&mut lifecycle).await;
        self.launch(&mut lifecycle, source, mode);
    }

    /// Stop the producer, wait for it to exit, and clear the published state.
    ///
    /// Safe to call when nothing is running.
    pub async fn stop(&self) {
        let mut lifecycle = self.lifecycle.lock().await;
        let was_running = lifecycle.run.is_some();
        self.halt(&mut lifecycle).await;
        if was_running {
            log::info!("Streamer stopped");
        }
    }

    pub async fn status(&self) -> Status {
        let lifecycle = self.lifecycle.lock().await;
        Status {
            running: lifecycle
                .run
                .as_ref()
                .is_some_and(|run| !run.task.is_finished()),
            mode: lifecycle.mode,
        }
    }

    /// Remove and return the records published since the last drain.
    pub fn drain_updates(&self, last_seen_id: Option<&str>) -> Updates {
        self.state.drain(last_seen_id)
    }

    /// Aggregate store of the current run, if one is active.
    pub async fn current_store(&self) -> Option<Arc<AggregateStore>> {
        let lifecycle = self.lifecycle.lock().await;
        lifecycle.run.as_ref().map(|run| Arc::clone(&run.store))
    }

    /// Stop any current run and clear the published state.
    async fn halt(&self, lifecycle: &mut Lifecycle) {
        if let Some(run) = lifecycle.run.take() {
            run.shutdown_and_join().await;
        }
        self.state.reset();
    }

    async fn build_source(&self, query: Option<&str>, mode: Mode) -> Box<dyn RecordSource> {
        match mode {
            Mode::Replay => {
                let replay = &self.config.replay;
                Box::new(ReplaySource::load_or_empty(&replay.fixture, replay.wrap_pause()).await)
            }
            Mode::Live => {
                let source = &self.config.source;
                let query = query
                    .map(str::trim)
                    .filter(|q| !q.is_empty())
                    .unwrap_or(&source.query)
                    .to_string();
                let token = source.resolve_bearer_token().unwrap_or_else(|| {
                    log::error!("No bearer token configured; live requests will be rejected");
                    String::new()
                });
                let client = http::create_async_client(source).unwrap_or_else(|e| {
                    log::warn!("HTTP client setup failed ({}), using defaults", e);
                    reqwest::Client::new()
                });
                log::info!("Initialized search source with query: {}", query);
                Box::new(SearchSource::new(client, source, token, query))
            }
        }
    }

    fn launch(&self, lifecycle: &mut Lifecycle, source: Box<dyn RecordSource>, mode: Mode) {
        let store = Arc::new(AggregateStore::new());
        let (shutdown, shutdown_rx) = watch::channel(false);

        let producer = Producer {
            source,
            processor: BatchProcessor::new(
                Arc::clone(&self.scorer),
                self.config.topics.clone(),
                &self.config.pipeline,
            ),
            dedup: Deduplicator::new(),
            dedup_enabled: mode == Mode::Live || self.config.pipeline.dedup_replay,
            store: Arc::clone(&store),
            state: self.state.clone(),
            batch_size: match mode {
                Mode::Replay => self.config.replay.batch_size,
                Mode::Live => self.config.source.max_results,
            },
            pause: match mode {
                Mode::Replay => self.config.replay.interval(),
                Mode::Live => self.config.pipeline.poll_interval(),
            },
            window: self.config.pipeline.window(),
        };

        log::info!("Starting in {} mode", mode);
        let task = tokio::spawn(producer.run(shutdown_rx));
        lifecycle.run = Some(RunHandle {
            shutdown,
            task,
            store,
        });
        lifecycle.mode = mode;
    }
}

/// Everything one producer task owns.
struct Producer {
    source: Box<dyn RecordSource>,
    processor: BatchProcessor,
    dedup: Deduplicator,
    dedup_enabled: bool,
    store: Arc<AggregateStore>,
    state: SharedState,
    batch_size: usize,
    pause: Duration,
    window: chrono::Duration,
}

impl Producer {
    async fn run(mut self, mut shutdown: watch::Receiver<bool>) {
        let mut cycle: u64 = 0;
        loop {
            if *shutdown.borrow() {
                break;
            }

            let batch = tokio::select! {
                _ = shutdown.changed() => break,
                batch = self.source.next_batch(self.batch_size) => batch,
            };
            cycle += 1;
            self.cycle(cycle, batch).await;

            tokio::select! {
                _ = shutdown.changed() => break,
                _ = tokio::time::sleep(self.pause) => {}
            }
        }
        log::debug!("Producer exited after {} cycles", cycle);
    }

    /// Process one batch and publish the result as a unit.
    async fn cycle(&mut self, cycle: u64, batch: Vec<RawRecord>) {
        let fetched = batch.len();
        let batch = if self.dedup_enabled {
            self.dedup.retain_new(batch)
        } else {
            batch
        };
        let admitted = batch.len();

        let outcome = self.processor.process(batch, &self.store).await;
        let aggregate = self.store.window_snapshot(self.window);

        log::info!(
            "Cycle {} ({}): fetched {}, new {}, scored {}, dropped {}, topics {}, window count {} avg {:.4}",
            cycle,
            self.source.origin(),
            fetched,
            admitted,
            outcome.records.len(),
            outcome.dropped,
            outcome.topics.len(),
            aggregate.count,
            aggregate.avg_sentiment
        );

        if outcome.records.is_empty() {
            self.state.publish_aggregate(aggregate);
        } else {
            self.state.publish_batch(outcome.records, outcome.topics, aggregate);
        }
    }
}

#[cfg(test)]
mod tests {
    use std::io::Write;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use async_trait::async_trait;
    use chrono::Utc;

    use super::*;
    use crate::models::AggregateSnapshot;
    use crate::services::LexiconScorer;

    /// Serves the same batch forever and counts calls.
    struct RepeatingSource {
        batch: Vec<RawRecord>,
        calls: Arc<AtomicUsize>,
    }

    #[async_trait]
    impl RecordSource for RepeatingSource {
        async fn next_batch(&mut self, _max_size: usize) -> Vec<RawRecord> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            tokio::time::sleep(Duration::from_millis(5)).await;
            self.batch.clone()
        }

        fn origin(&self) -> &'static str {
            "test"
        }
    }

    fn fast_config(fixture: &std::path::Path) -> Config {
        let mut config = Config::default();
        config.replay.fixture = fixture.to_path_buf();
        config.replay.batch_size = 2;
        config.replay.interval_ms = 5;
        config.replay.wrap_pause_ms = 5;
        config.pipeline.poll_interval_secs = 0;
        config
    }

    fn fixture() -> tempfile::NamedTempFile {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(
            file,
            r#"[
                {{"id": "1", "text": "Bitcoin surges to record"}},
                {{"id": "2", "text": "Oil prices slump"}},
                {{"id": "3", "text": "Fed holds rates steady"}},
                {{"id": "4", "text": ""}},
                {{"id": "5", "text": "Gold rallies on weak dollar"}}
            ]"#
        )
        .unwrap();
        file
    }

    fn controller(config: Config) -> Controller {
        Controller::new(Arc::new(config), Arc::new(LexiconScorer::new()))
    }

    async fn wait_until<F: Fn() -> bool>(condition: F) {
        for _ in 0..400 {
            if condition() {
                return;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        panic!("condition not reached in time");
    }

    #[tokio::test]
    async fn test_status_before_and_after_start() {
        let file = fixture();
        let controller = controller(fast_config(file.path()));
        assert_eq!(
            controller.status().await,
            Status {
                running: false,
                mode: Mode::Replay
            }
        );

        controller.start(None, Mode::Replay).await;
        assert!(controller.status().await.running);

        controller.stop().await;
        assert!(!controller.status().await.running);
        assert!(controller.current_store().await.is_none());
    }

    #[tokio::test]
    async fn test_stop_when_stopped_is_noop() {
        let file = fixture();
        let controller = controller(fast_config(file.path()));
        controller.stop().await;
        controller.stop().await;
        assert!(!controller.status().await.running);
    }

    #[tokio::test]
    async fn test_stop_when_stopped_still_clears_state() {
        let file = fixture();
        let controller = controller(fast_config(file.path()));
        let state = controller.shared_state();
        state.publish_aggregate(AggregateSnapshot::NOTHING_IN_WINDOW);

        controller.stop().await;
        assert_eq!(state.snapshot().aggregate_snapshot, AggregateSnapshot::RESET);
    }

    #[tokio::test]
    async fn test_empty_cycle_refreshes_aggregate_only() {
        /// Serves one batch, then plants a stale aggregate and serves nothing.
        struct OneShotSource {
            batch: Vec<RawRecord>,
            state: SharedState,
            calls: Arc<AtomicUsize>,
        }

        const STALE: AggregateSnapshot = AggregateSnapshot {
            count: 9_999,
            avg_sentiment: -0.5,
        };

        #[async_trait]
        impl RecordSource for OneShotSource {
            async fn next_batch(&mut self, _max_size: usize) -> Vec<RawRecord> {
                let call = self.calls.fetch_add(1, Ordering::SeqCst);
                tokio::time::sleep(Duration::from_millis(5)).await;
                match call {
                    0 => std::mem::take(&mut self.batch),
                    1 => {
                        self.state.publish_aggregate(STALE);
                        Vec::new()
                    }
                    _ => Vec::new(),
                }
            }

            fn origin(&self) -> &'static str {
                "test"
            }
        }

        let file = fixture();
        let controller = controller(fast_config(file.path()));
        let state = controller.shared_state();
        let calls = Arc::new(AtomicUsize::new(0));
        let now = Utc::now();
        let source = OneShotSource {
            batch: vec![
                RawRecord::new("a", "bitcoin surges", now),
                RawRecord::new("b", "oil slumps", now),
            ],
            state: state.clone(),
            calls: Arc::clone(&calls),
        };

        controller
            .start_with_source(Box::new(source), Mode::Live)
            .await;
        // A third call means the empty second cycle has been published.
        wait_until(|| calls.load(Ordering::SeqCst) >= 3).await;
        let snapshot = state.snapshot();
        controller.stop().await;

        assert_eq!(snapshot.aggregate_snapshot.count, 2);
        assert_ne!(snapshot.aggregate_snapshot, STALE);
        let ids: Vec<_> = snapshot.pending_records.iter().map(|r| r.id()).collect();
        assert_eq!(ids, ["a", "b"]);
        assert!(!snapshot.topics.is_empty());
    }

    #[tokio::test]
    async fn test_replay_publishes_and_drains() {
        let file = fixture();
        let controller = controller(fast_config(file.path()));
        controller.start(None, Mode::Replay).await;
        let store = controller.current_store().await.unwrap();
        wait_until(|| store.len() >= 4).await;
        controller.stop().await;

        // State is cleared on stop.
        let after_stop = controller.drain_updates(None);
        assert!(after_stop.records.is_empty());
        assert_eq!(after_stop.aggregate, AggregateSnapshot::RESET);
    }

    #[tokio::test]
    async fn test_drain_twice_without_new_batch() {
        let file = fixture();
        let controller = controller(fast_config(file.path()));
        let state = controller.shared_state();
        controller.start(None, Mode::Replay).await;
        wait_until(|| !state.snapshot().pending_records.is_empty()).await;
        controller.stop().await;

        // Publish a batch by hand so no producer can interfere.
        let record = RawRecord::new("x", "gold rallies", Utc::now());
        let store = AggregateStore::new();
        let processor = BatchProcessor::new(
            Arc::new(LexiconScorer::new()),
            Default::default(),
            &Default::default(),
        );
        let outcome = processor.process(vec![record], &store).await;
        state.publish_batch(
            outcome.records,
            outcome.topics,
            store.window_snapshot(chrono::Duration::minutes(15)),
        );

        let first = controller.drain_updates(None);
        assert_eq!(first.records.len(), 1);
        let second = controller.drain_updates(first.last_seen_id.as_deref());
        assert!(second.records.is_empty());
        assert_eq!(second.aggregate.count, 1);
    }

    #[tokio::test]
    async fn test_restart_joins_previous_run() {
        let file = fixture();
        let controller = controller(fast_config(file.path()));

        controller.start(None, Mode::Replay).await;
        let first_store = controller.current_store().await.unwrap();
        wait_until(|| first_store.len() >= 2).await;

        controller.start(None, Mode::Replay).await;
        let frozen = first_store.len();
        let second_store = controller.current_store().await.unwrap();
        assert!(!Arc::ptr_eq(&first_store, &second_store));

        wait_until(|| second_store.len() >= 4).await;
        assert_eq!(first_store.len(), frozen);
        // The joined producer released its handle.
        assert_eq!(Arc::strong_count(&first_store), 1);

        controller.stop().await;
        let final_len = second_store.len();
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(second_store.len(), final_len);
    }

    #[tokio::test]
    async fn test_live_mode_dedups_repeated_ids() {
        let file = fixture();
        let controller = controller(fast_config(file.path()));
        let calls = Arc::new(AtomicUsize::new(0));
        let now = Utc::now();
        let source = RepeatingSource {
            batch: vec![
                RawRecord::new("a", "bitcoin surges", now),
                RawRecord::new("b", "oil slumps", now),
            ],
            calls: Arc::clone(&calls),
        };

        controller
            .start_with_source(Box::new(source), Mode::Live)
            .await;
        let store = controller.current_store().await.unwrap();
        wait_until(|| calls.load(Ordering::SeqCst) >= 4).await;
        controller.stop().await;

        assert_eq!(store.len(), 2);
    }

    #[tokio::test]
    async fn test_replay_without_dedup_keeps_cycling() {
        let file = fixture();
        let controller = controller(fast_config(file.path()));
        controller.start(None, Mode::Replay).await;
        let store = controller.current_store().await.unwrap();
        // Four valid records per pass; more than that means a second pass landed.
        wait_until(|| store.len() > 4).await;
        controller.stop().await;
    }

    #[tokio::test]
    async fn test_missing_fixture_runs_empty() {
        let controller = controller(fast_config(std::path::Path::new("/nonexistent.json")));
        controller.start(None, Mode::Replay).await;
        tokio::time::sleep(Duration::from_millis(100)).await;
        assert!(controller.status().await.running);
        let store = controller.current_store().await.unwrap();
        assert!(store.is_empty());
        let updates = controller.drain_updates(None);
        assert_eq!(updates.aggregate, AggregateSnapshot::EMPTY_STORE);
        controller.stop().await;
    }

    #[tokio::test]
    async fn test_stop_interrupts_blocking_source() {
        struct StuckSource;

        #[async_trait]
        impl RecordSource for StuckSource {
            async fn next_batch(&mut self, _max_size: usize) -> Vec<RawRecord> {
                tokio::time::sleep(Duration::from_secs(3_600)).await;
                Vec::new()
            }

            fn origin(&self) -> &'static str {
                "stuck"
            }
        }

        let file = fixture();
        let controller = controller(fast_config(file.path()));
        controller
            .start_with_source(Box::new(StuckSource), Mode::Live)
            .await;
        let stopped = tokio::time::timeout(Duration::from_secs(2), controller.stop()).await;
        assert!(stopped.is_ok());
        assert!(!controller.status().await.running);
    }
}
