//! Application configuration structures.

use std::fs;
use std::ops::RangeInclusive;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{AppError, Result};

use super::{Mode, TopicCatalog, TopicEntry};

/// Environment variable that overrides `source.bearer_token`.
pub const BEARER_TOKEN_ENV: &str = "SEARCH_BEARER_TOKEN";

/// Page sizes the recent-search endpoint accepts.
pub const SEARCH_PAGE_SIZES: RangeInclusive<usize> = 10..=100;

/// Root application configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// Remote search API settings
    #[serde(default)]
    pub source: SourceConfig,

    /// Fixture replay settings
    #[serde(default)]
    pub replay: ReplayConfig,

    /// Producer loop and aggregation settings
    #[serde(default)]
    pub pipeline: PipelineConfig,

    /// Keyword catalog used to label topic clusters
    #[serde(default)]
    pub topics: TopicCatalog,
}

impl Config {
    /// Load configuration from a TOML file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let content = fs::read_to_string(path)?;
        Ok(toml::from_str(&content)?)
    }

    /// Load configuration or return default if loading fails.
    pub fn load_or_default(path: impl AsRef<Path>) -> Self {
        Self::load(&path).unwrap_or_else(|e| {
            log::warn!(
                "Config load failed from {:?}: {}. Using defaults.",
                path.as_ref(),
                e
            );
            Self::default()
        })
    }

    /// Validate configuration values for basic sanity.
    pub fn validate(&self) -> Result<()> {
        if self.source.endpoint.trim().is_empty() {
            return Err(AppError::validation("source.endpoint is empty"));
        }
        url::Url::parse(&self.source.endpoint)?;
        if self.source.query.trim().is_empty() {
            return Err(AppError::validation("source.query is empty"));
        }
        if !SEARCH_PAGE_SIZES.contains(&self.source.max_results) {
            return Err(AppError::validation(format!(
                "source.max_results must be between {} and {}, got {}",
                SEARCH_PAGE_SIZES.start(),
                SEARCH_PAGE_SIZES.end(),
                self.source.max_results
            )));
        }
        if self.source.timeout_secs == 0 {
            return Err(AppError::validation("source.timeout_secs must be > 0"));
        }
        if self.replay.batch_size == 0 {
            return Err(AppError::validation("replay.batch_size must be > 0"));
        }
        if self.pipeline.window_minutes == 0 {
            return Err(AppError::validation("pipeline.window_minutes must be > 0"));
        }
        if self.pipeline.summary_sample_size == 0 {
            return Err(AppError::validation(
                "pipeline.summary_sample_size must be > 0",
            ));
        }
        if self.topics.entries.is_empty() {
            return Err(AppError::validation("No topic entries defined"));
        }
        if self.topics.fallback.trim().is_empty() {
            return Err(AppError::validation("topics.fallback is empty"));
        }
        if let Some(entry) = self.topics.entries.iter().find(|e| e.keywords.is_empty()) {
            return Err(AppError::validation(format!(
                "Topic '{}' has no keywords",
                entry.label
            )));
        }
        Ok(())
    }
}

/// Remote search API settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SourceConfig {
    /// Recent-search endpoint URL
    #[serde(default = "defaults::endpoint")]
    pub endpoint: String,

    /// Default search query when a run does not supply one
    #[serde(default = "defaults::query")]
    pub query: String,

    /// Page size requested from the API
    #[serde(default = "defaults::max_results")]
    pub max_results: usize,

    /// Extra fields requested for each post
    #[serde(default = "defaults::tweet_fields")]
    pub tweet_fields: String,

    /// User-Agent header for HTTP requests
    #[serde(default = "defaults::user_agent")]
    pub user_agent: String,

    /// Request timeout in seconds
    #[serde(default = "defaults::timeout")]
    pub timeout_secs: u64,

    /// Sleep after a transport error or non-200 response
    #[serde(default = "defaults::error_backoff")]
    pub error_backoff_secs: u64,

    /// Sleep used when a 429 carries no reset header
    #[serde(default = "defaults::rate_limit_fallback")]
    pub rate_limit_fallback_secs: u64,

    /// Lower bound on any rate-limit sleep
    #[serde(default = "defaults::min_rate_limit_sleep")]
    pub min_rate_limit_sleep_secs: u64,

    /// API bearer token (prefer the environment variable)
    #[serde(default)]
    pub bearer_token: Option<String>,
}

impl SourceConfig {
    /// Bearer token from the environment, falling back to the file value.
    pub fn resolve_bearer_token(&self) -> Option<String> {
        std::env::var(BEARER_TOKEN_ENV)
            .ok()
            .filter(|t| !t.trim().is_empty())
            .or_else(|| self.bearer_token.clone())
    }

    pub fn error_backoff(&self) -> Duration {
        Duration::from_secs(self.error_backoff_secs)
    }
}

impl Default for SourceConfig {
    fn default() -> Self {
        Self {
            endpoint: defaults::endpoint(),
            query: defaults::query(),
            max_results: defaults::max_results(),
            tweet_fields: defaults::tweet_fields(),
            user_agent: defaults::user_agent(),
            timeout_secs: defaults::timeout(),
            error_backoff_secs: defaults::error_backoff(),
            rate_limit_fallback_secs: defaults::rate_limit_fallback(),
            min_rate_limit_sleep_secs: defaults::min_rate_limit_sleep(),
            bearer_token: None,
        }
    }
}

/// Fixture replay settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReplayConfig {
    /// JSON fixture file
    #[serde(default = "defaults::fixture")]
    pub fixture: PathBuf,

    /// Records pulled per cycle
    #[serde(default = "defaults::replay_batch_size")]
    pub batch_size: usize,

    /// Pause between cycles in milliseconds
    #[serde(default = "defaults::replay_interval")]
    pub interval_ms: u64,

    /// Pause before wrapping back to the first record
    #[serde(default = "defaults::wrap_pause")]
    pub wrap_pause_ms: u64,
}

impl ReplayConfig {
    pub fn interval(&self) -> Duration {
        Duration::from_millis(self.interval_ms)
    }

    pub fn wrap_pause(&self) -> Duration {
        Duration::from_millis(self.wrap_pause_ms)
    }
}

impl Default for ReplayConfig {
    fn default() -> Self {
        Self {
            fixture: defaults::fixture(),
            batch_size: defaults::replay_batch_size(),
            interval_ms: defaults::replay_interval(),
            wrap_pause_ms: defaults::wrap_pause(),
        }
    }
}

/// Producer loop and aggregation settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineConfig {
    /// Mode used when a run does not specify one
    #[serde(default)]
    pub mode: Mode,

    /// Pause between live fetches in seconds
    #[serde(default = "defaults::poll_interval")]
    pub poll_interval_secs: u64,

    /// Trailing window for the aggregate snapshot
    #[serde(default = "defaults::window_minutes")]
    pub window_minutes: u64,

    /// Character budget of the truncated topic digest
    #[serde(default = "defaults::summary_max_chars")]
    pub summary_max_chars: usize,

    /// Texts per topic fed into the digest
    #[serde(default = "defaults::summary_sample_size")]
    pub summary_sample_size: usize,

    /// Also deduplicate replayed records
    #[serde(default)]
    pub dedup_replay: bool,
}

impl PipelineConfig {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.poll_interval_secs)
    }

    pub fn window(&self) -> chrono::Duration {
        chrono::Duration::minutes(self.window_minutes as i64)
    }
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            mode: Mode::default(),
            poll_interval_secs: defaults::poll_interval(),
            window_minutes: defaults::window_minutes(),
            summary_max_chars: defaults::summary_max_chars(),
            summary_sample_size: defaults::summary_sample_size(),
            dedup_replay: false,
        }
    }
}

impl Default for TopicCatalog {
    fn default() -> Self {
        Self {
            entries: defaults::topic_entries(),
            fallback: defaults::topic_fallback(),
        }
    }
}

mod defaults {
    use std::path::PathBuf;

    use super::TopicEntry;

    // Source defaults
    pub fn endpoint() -> String {
        "https://api.x.com/2/tweets/search/recent".into()
    }
    pub fn query() -> String {
        "(stock OR market OR finance OR crypto OR bitcoin OR ethereum OR forex OR \
         \"interest rate\" OR fed OR earnings) lang:en -is:retweet"
            .into()
    }
    pub fn max_results() -> usize {
        10
    }
    pub fn tweet_fields() -> String {
        "created_at,lang,public_metrics,author_id".into()
    }
    pub fn user_agent() -> String {
        "Mozilla/5.0 (compatible; streamer/0.1)".into()
    }
    pub fn timeout() -> u64 {
        10
    }
    pub fn error_backoff() -> u64 {
        5
    }
    pub fn rate_limit_fallback() -> u64 {
        60
    }
    pub fn min_rate_limit_sleep() -> u64 {
        1
    }

    // Replay defaults
    pub fn fixture() -> PathBuf {
        PathBuf::from("data/synthetic_posts.json")
    }
    pub fn replay_batch_size() -> usize {
        50
    }
    pub fn replay_interval() -> u64 {
        2_000
    }
    pub fn wrap_pause() -> u64 {
        2_000
    }

    // Pipeline defaults
    pub fn poll_interval() -> u64 {
        20
    }
    pub fn window_minutes() -> u64 {
        15
    }
    pub fn summary_max_chars() -> usize {
        160
    }
    pub fn summary_sample_size() -> usize {
        10
    }

    // Topic defaults
    pub fn topic_fallback() -> String {
        "Miscellaneous".into()
    }
    pub fn topic_entries() -> Vec<TopicEntry> {
        vec![
            TopicEntry::new(
                "Interest Rates",
                &["fed", "interest rate", "treasury", "yield", "monetary policy", "rate hike", "federal reserve"],
            ),
            TopicEntry::new(
                "Inflation",
                &["inflation", "cpi", "consumer prices", "cost of living", "price index", "inflation expectations"],
            ),
            TopicEntry::new(
                "Stock Market",
                &["stocks", "market", "equities", "s&p 500", "nasdaq", "dow jones", "bullish", "bearish"],
            ),
            TopicEntry::new(
                "Earnings Reports",
                &["earnings", "eps", "revenue", "quarterly report", "guidance", "profit", "loss"],
            ),
            TopicEntry::new(
                "Cryptocurrency",
                &["bitcoin", "ethereum", "crypto", "blockchain", "altcoins", "defi", "nft"],
            ),
            TopicEntry::new(
                "Commodities",
                &["gold", "oil", "silver", "copper", "commodities", "crude", "wti", "natural gas"],
            ),
            TopicEntry::new(
                "Forex",
                &["forex", "usd", "eur", "jpy", "currency", "exchange rate", "fx market"],
            ),
            TopicEntry::new(
                "Mergers and Acquisitions",
                &["m&a", "acquisition", "merger", "deal", "takeover", "buyout", "corporate"],
            ),
            TopicEntry::new(
                "Government Policy",
                &["regulation", "policy", "fiscal", "tax", "budget", "stimulus", "legislation"],
            ),
            TopicEntry::new(
                "Banking & Finance",
                &["bank", "lending", "loan", "interest", "credit", "financial institution", "capital"],
            ),
            TopicEntry::new(
                "Tech Stocks",
                &["tech", "apple", "microsoft", "google", "ai", "semiconductors", "software"],
            ),
            TopicEntry::new(
                "Consumer Sector",
                &["retail", "consumer", "spending", "demand", "sales", "products", "brands"],
            ),
            TopicEntry::new(
                "Energy Market",
                &["energy", "oil", "gas", "renewable", "coal", "electricity", "supply", "demand"],
            ),
            TopicEntry::new(
                "Housing Market",
                &["real estate", "housing", "mortgage", "home prices", "construction", "property"],
            ),
            TopicEntry::new(
                "Miscellaneous",
                &["other", "misc", "various", "news", "update", "trending", "market"],
            ),
        ]
    }
}
