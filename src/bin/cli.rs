//! Streamer CLI
//!
//! Local execution entry point. Runs the producer with the built-in lexicon
//! scorer and prints what a polling reader would see.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use clap::{Parser, Subcommand};
use streamer::{
    error::Result,
    models::{Config, Mode, Updates, parse_timestamp},
    pipeline::Controller,
    services::{LexiconScorer, ReplaySource, decode_fixture},
};

/// Streamer - post sentiment and topic streaming
#[derive(Parser, Debug)]
#[command(
    name = "streamer",
    version,
    about = "Streams posts, scores sentiment and topics, and tracks a rolling aggregate"
)]
struct Cli {
    /// Path to the configuration file
    #[arg(short, long, default_value = "data/config.toml")]
    config: PathBuf,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Start the producer and poll for updates until interrupted
    Run {
        /// Source mode (replay or live); defaults to pipeline.mode
        #[arg(long)]
        mode: Option<Mode>,

        /// Search query for live mode; defaults to source.query
        #[arg(long)]
        query: Option<String>,

        /// Stop after this many seconds instead of waiting for Ctrl-C
        #[arg(long)]
        duration_secs: Option<u64>,

        /// How often the reader drains updates, in milliseconds
        #[arg(long, default_value_t = 1000)]
        poll_ms: u64,
    },

    /// Validate the configuration file
    Validate,

    /// Decode a fixture and report what replay would serve
    ReplayCheck {
        /// Fixture path (default: replay.fixture from config)
        #[arg(long)]
        fixture: Option<PathBuf>,
    },
}

/// Initialize logging based on verbosity flag.
fn init_logging(verbose: bool) {
    let level = if verbose { "debug" } else { "info" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(level))
        .format_timestamp_secs()
        .init();
}

/// Log one drained update the way a dashboard would render it.
fn report(updates: &Updates) {
    for record in &updates.records {
        log::info!(
            "[{}] {:+.3} {:<8} {}",
            record.topic,
            record.sentiment_score,
            record.sentiment_label.as_str(),
            record.record.text
        );
    }
    if !updates.records.is_empty() {
        for summary in updates.topics.values() {
            log::info!(
                "Topic {} ({}): {}",
                summary.topic_key,
                summary.count,
                summary.sample_summary
            );
        }
    }
    log::info!(
        "Window: {} records, avg sentiment {:.4}",
        updates.aggregate.count,
        updates.aggregate.avg_sentiment
    );
}

/// Main entry point for the CLI application.
#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    log::info!("Streamer starting...");

    let config = Config::load_or_default(&cli.config);
    log::info!("Loaded configuration from {}", cli.config.display());

    match cli.command {
        Command::Run {
            mode,
            query,
            duration_secs,
            poll_ms,
        } => {
            let mode = mode.unwrap_or(config.pipeline.mode);
            let controller = Controller::new(Arc::new(config), Arc::new(LexiconScorer::new()));
            controller.start(query.as_deref(), mode).await;

            let deadline = async {
                match duration_secs {
                    Some(secs) => tokio::time::sleep(Duration::from_secs(secs)).await,
                    None => std::future::pending::<()>().await,
                }
            };
            tokio::pin!(deadline);

            let mut ticker = tokio::time::interval(Duration::from_millis(poll_ms.max(1)));
            let mut last_seen: Option<String> = None;
            loop {
                tokio::select! {
                    _ = tokio::signal::ctrl_c() => {
                        log::info!("Interrupted, stopping...");
                        break;
                    }
                    _ = &mut deadline => {
                        log::info!("Run duration elapsed, stopping...");
                        break;
                    }
                    _ = ticker.tick() => {
                        let updates = controller.drain_updates(last_seen.as_deref());
                        if !updates.records.is_empty() {
                            report(&updates);
                        }
                        last_seen = updates.last_seen_id;
                    }
                }
            }

            controller.stop().await;
            let status = controller.status().await;
            log::info!("Stopped (mode: {}, running: {})", status.mode, status.running);
        }

        Command::Validate => {
            log::info!("Validating configuration...");

            if let Err(e) = config.validate() {
                log::error!("Config validation failed: {}", e);
                return Err(e);
            }
            log::info!(
                "✓ Config OK ({} topic categories, mode {})",
                config.topics.entries.len(),
                config.pipeline.mode
            );
            if config.source.resolve_bearer_token().is_none() {
                log::warn!("No bearer token set; live mode requests will be rejected");
            }

            log::info!("All validations passed!");
        }

        Command::ReplayCheck { fixture } => {
            let path = fixture.unwrap_or_else(|| config.replay.fixture.clone());
            let bytes = tokio::fs::read(&path).await?;
            let contents = decode_fixture(&bytes)?;
            let missing_id = contents.posts.iter().filter(|p| p.id.is_none()).count();
            let missing_time = contents
                .posts
                .iter()
                .filter(|p| p.created_at.is_none())
                .count();
            let bad_time = contents
                .posts
                .iter()
                .filter_map(|p| p.created_at.as_deref())
                .filter(|t| parse_timestamp(t).is_none())
                .count();
            let empty_text = contents
                .posts
                .iter()
                .filter(|p| p.text.as_deref().is_none_or(|t| t.trim().is_empty()))
                .count();

            log::info!("Fixture: {}", path.display());
            log::info!(
                "{} posts ({} skipped entries, {} without id, {} without created_at)",
                contents.posts.len(),
                contents.skipped,
                missing_id,
                missing_time
            );
            if bad_time + empty_text > 0 {
                log::warn!(
                    "{} posts would be dropped ({} unreadable timestamps, {} empty texts)",
                    bad_time + empty_text,
                    bad_time,
                    empty_text
                );
            }

            let source = ReplaySource::new(contents.posts, config.replay.wrap_pause());
            let batches = source.len().div_ceil(config.replay.batch_size.max(1));
            log::info!(
                "Replay serves {} batches of up to {} per pass",
                batches,
                config.replay.batch_size
            );
        }
    }

    log::info!("Done!");

    Ok(())
}
