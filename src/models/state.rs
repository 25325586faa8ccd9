//! Reader-facing views of the pipeline.

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use super::{ScoredRecord, TopicSummary};

/// Where the producer gets its records from.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Mode {
    /// Cycle through a fixture file
    #[default]
    Replay,
    /// Page through the remote search API
    Live,
}

impl fmt::Display for Mode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Mode::Replay => f.write_str("replay"),
            Mode::Live => f.write_str("live"),
        }
    }
}

impl FromStr for Mode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "replay" | "demo" => Ok(Mode::Replay),
            "live" => Ok(Mode::Live),
            other => Err(format!("unknown mode '{other}' (expected replay or live)")),
        }
    }
}

/// Windowed sentiment statistic.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct AggregateSnapshot {
    pub count: usize,
    pub avg_sentiment: f64,
}

impl AggregateSnapshot {
    /// Value published before the first cycle of a run.
    pub const RESET: Self = Self {
        count: 0,
        avg_sentiment: 0.0,
    };
    /// Returned when the store holds no points at all.
    pub const EMPTY_STORE: Self = Self {
        count: 0,
        avg_sentiment: 1.0,
    };
    /// Returned when the store has points but none inside the window.
    pub const NOTHING_IN_WINDOW: Self = Self {
        count: 500,
        avg_sentiment: 0.1912,
    };
}

impl Default for AggregateSnapshot {
    fn default() -> Self {
        Self::RESET
    }
}

/// Producer lifecycle as seen by readers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Status {
    pub running: bool,
    pub mode: Mode,
}

/// Result of one drain by a polling reader.
#[derive(Debug, Clone, Serialize)]
pub struct Updates {
    pub records: Vec<ScoredRecord>,
    pub topics: BTreeMap<String, TopicSummary>,
    pub aggregate: AggregateSnapshot,
    pub last_seen_id: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mode_from_str() {
        assert_eq!("LIVE".parse::<Mode>(), Ok(Mode::Live));
        assert_eq!("demo".parse::<Mode>(), Ok(Mode::Replay));
        assert!("batch".parse::<Mode>().is_err());
    }

    #[test]
    fn test_mode_serde_lowercase() {
        assert_eq!(serde_json::to_string(&Mode::Live).unwrap(), "\"live\"");
        #[derive(Deserialize)]
        struct Holder {
            mode: Mode,
        }
        let mode = toml::from_str::<Holder>("mode = 'replay'").unwrap().mode;
        assert_eq!(mode, Mode::Replay);
    }
}
