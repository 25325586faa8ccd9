//! Record types flowing through the pipeline.

use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};

/// Engagement counters attached to a post by the search API.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct PublicMetrics {
    #[serde(default)]
    pub retweet_count: u64,
    #[serde(default)]
    pub reply_count: u64,
    #[serde(default)]
    pub like_count: u64,
    #[serde(default)]
    pub quote_count: u64,
}

/// A post as it appears on the wire, in a search page or a replay fixture.
///
/// Every field is optional; gaps are filled in by [`RawRecord::from_wire`].
#[derive(Debug, Clone, Default, Deserialize)]
pub struct WirePost {
    #[serde(default, deserialize_with = "string_or_number")]
    pub id: Option<String>,
    #[serde(default)]
    pub text: Option<String>,
    #[serde(default)]
    pub created_at: Option<String>,
    #[serde(default)]
    pub lang: Option<String>,
    #[serde(default, deserialize_with = "string_or_number")]
    pub author_id: Option<String>,
    #[serde(default)]
    pub public_metrics: Option<PublicMetrics>,
}

/// A record admitted into the pipeline.
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct RawRecord {
    pub id: String,
    pub text: String,
    pub created_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub lang: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub author_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub public_metrics: Option<PublicMetrics>,
}

impl RawRecord {
    /// Build a record with only the required fields.
    pub fn new(id: impl Into<String>, text: impl Into<String>, created_at: DateTime<Utc>) -> Self {
        Self {
            id: id.into(),
            text: text.into(),
            created_at,
            lang: None,
            author_id: None,
            public_metrics: None,
        }
    }

    /// Convert a wire post into a record.
    ///
    /// A missing id becomes `{origin}-{index}-{ingest epoch millis}` and a
    /// missing timestamp becomes `ingested_at`. A timestamp that is present
    /// but unparsable makes the post malformed and yields `None`.
    pub fn from_wire(
        post: WirePost,
        origin: &str,
        index: usize,
        ingested_at: DateTime<Utc>,
    ) -> Option<Self> {
        let created_at = match post.created_at.as_deref() {
            Some(raw) => parse_timestamp(raw)?,
            None => ingested_at,
        };
        let id = post
            .id
            .filter(|id| !id.trim().is_empty())
            .unwrap_or_else(|| {
                format!("{}-{}-{}", origin, index, ingested_at.timestamp_millis())
            });

        Some(Self {
            id,
            text: post.text.unwrap_or_default(),
            created_at,
            lang: post.lang,
            author_id: post.author_id,
            public_metrics: post.public_metrics,
        })
    }
}

/// Parse a source timestamp into UTC.
///
/// Zone-aware values are converted; naive values are taken as UTC.
pub fn parse_timestamp(raw: &str) -> Option<DateTime<Utc>> {
    let raw = raw.trim();
    if raw.is_empty() {
        return None;
    }
    if let Ok(aware) = DateTime::parse_from_rfc3339(raw) {
        return Some(aware.with_timezone(&Utc));
    }
    if let Ok(aware) = DateTime::parse_from_str(raw, "%Y-%m-%d %H:%M:%S%.f%:z") {
        return Some(aware.with_timezone(&Utc));
    }
    for format in ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S%.f"] {
        if let Ok(naive) = NaiveDateTime::parse_from_str(raw, format) {
            return Some(naive.and_utc());
        }
    }
    NaiveDate::parse_from_str(raw, "%Y-%m-%d")
        .ok()
        .and_then(|date| date.and_hms_opt(0, 0, 0))
        .map(|naive| naive.and_utc())
}

/// Three-way sentiment label.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SentimentLabel {
    Negative,
    Neutral,
    Positive,
}

impl SentimentLabel {
    /// Normalize a raw classifier label.
    ///
    /// Accepts the positional `LABEL_0..2` form and the plain names, in any case.
    pub fn from_raw(raw: &str) -> Option<Self> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "label_0" | "negative" | "neg" => Some(Self::Negative),
            "label_1" | "neutral" | "neu" => Some(Self::Neutral),
            "label_2" | "positive" | "pos" => Some(Self::Positive),
            _ => None,
        }
    }

    /// Signed score for a classifier confidence: `+c`, `-c` or `0`.
    pub fn signed(self, confidence: f64) -> f64 {
        let magnitude = if confidence.is_finite() {
            confidence.abs().min(1.0)
        } else {
            0.0
        };
        match self {
            Self::Positive => magnitude,
            Self::Negative => -magnitude,
            Self::Neutral => 0.0,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Negative => "negative",
            Self::Neutral => "neutral",
            Self::Positive => "positive",
        }
    }
}

/// A record after scoring and topic assignment.
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct ScoredRecord {
    #[serde(flatten)]
    pub record: RawRecord,
    pub sentiment_label: SentimentLabel,
    pub sentiment_score: f64,
    pub topic: String,
}

impl ScoredRecord {
    pub fn id(&self) -> &str {
        &self.record.id
    }
}

fn string_or_number<'de, D>(deserializer: D) -> std::result::Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<serde_json::Value>::deserialize(deserializer)?;
    Ok(match value {
        Some(serde_json::Value::String(s)) => Some(s),
        Some(serde_json::Value::Number(n)) => Some(n.to_string()),
        _ => None,
    })
}
