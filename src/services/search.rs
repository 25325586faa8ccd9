// src/services/search.rs

//! Live source backed by a paginated recent-search API.
//!
//! Transient failures never escape: a 429 sleeps until the advertised reset
//! time, any other failure sleeps a fixed backoff, and the same request is
//! tried again.

use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use reqwest::{Client, StatusCode};
use serde::Deserialize;
use serde_json::Value;

use crate::error::AppError;
use crate::models::{RawRecord, SourceConfig, WirePost};

use super::RecordSource;

/// Header carrying the epoch second at which the rate-limit window resets.
pub const RATE_LIMIT_RESET_HEADER: &str = "x-rate-limit-reset";

/// Body of a successful search response.
#[derive(Debug, Default, Deserialize)]
pub struct SearchPage {
    #[serde(default)]
    pub data: Vec<Value>,
    #[serde(default)]
    pub meta: Option<SearchMeta>,
}

#[derive(Debug, Default, Deserialize)]
pub struct SearchMeta {
    #[serde(default)]
    pub next_token: Option<String>,
}

/// What a single request attempt produced.
enum Attempt {
    Page(SearchPage),
    RateLimited(Duration),
    Failed(AppError),
}

/// Pages through the recent-search endpoint for one query.
pub struct SearchSource {
    client: Client,
    endpoint: String,
    bearer_token: String,
    query: String,
    tweet_fields: String,
    next_token: Option<String>,
    error_backoff: Duration,
    rate_limit_fallback_secs: u64,
    min_rate_limit_sleep_secs: u64,
}

impl SearchSource {
    pub fn new(client: Client, config: &SourceConfig, bearer_token: String, query: String) -> Self {
        Self {
            client,
            endpoint: config.endpoint.clone(),
            bearer_token,
            query,
            tweet_fields: config.tweet_fields.clone(),
            next_token: None,
            error_backoff: config.error_backoff(),
            rate_limit_fallback_secs: config.rate_limit_fallback_secs,
            min_rate_limit_sleep_secs: config.min_rate_limit_sleep_secs.max(1),
        }
    }

    pub fn next_token(&self) -> Option<&str> {
        self.next_token.as_deref()
    }

    fn build_params(&self, max_results: usize) -> Vec<(&'static str, String)> {
        let mut params = vec![
            ("query", self.query.clone()),
            ("tweet.fields", self.tweet_fields.clone()),
            ("max_results", max_results.to_string()),
        ];
        if let Some(token) = &self.next_token {
            params.push(("next_token", token.clone()));
        }
        params
    }

    async fn attempt(&self, max_results: usize) -> Attempt {
        let response = match self
            .client
            .get(&self.endpoint)
            .bearer_auth(&self.bearer_token)
            .query(&self.build_params(max_results))
            .send()
            .await
        {
            Ok(response) => response,
            Err(e) => return Attempt::Failed(e.into()),
        };

        let status = response.status();
        if status == StatusCode::TOO_MANY_REQUESTS {
            let reset = response
                .headers()
                .get(RATE_LIMIT_RESET_HEADER)
                .and_then(|v| v.to_str().ok())
                .and_then(|v| v.trim().parse::<i64>().ok());
            return Attempt::RateLimited(self.rate_limit_sleep(reset, Utc::now().timestamp()));
        }
        if status != StatusCode::OK {
            let body = response.text().await.unwrap_or_default();
            return Attempt::Failed(AppError::remote(
                format!("search status {}", status.as_u16()),
                body,
            ));
        }

        match response.json::<SearchPage>().await {
            Ok(page) => Attempt::Page(page),
            Err(e) => Attempt::Failed(e.into()),
        }
    }

    /// Sleep for a 429: until `reset` (epoch seconds), never below the floor.
    fn rate_limit_sleep(&self, reset: Option<i64>, now: i64) -> Duration {
        let reset = reset.unwrap_or(now + self.rate_limit_fallback_secs as i64);
        let secs = (reset - now).max(self.min_rate_limit_sleep_secs as i64);
        Duration::from_secs(secs as u64)
    }

    /// Fetch the next non-empty page.
    ///
    /// Retries until the API answers with 200 and at least one usable post.
    /// An empty page still moves the cursor before the wait.
    pub async fn fetch_page(&mut self, max_results: usize) -> Vec<RawRecord> {
        loop {
            match self.attempt(max_results).await {
                Attempt::Page(page) => {
                    self.next_token = page.meta.and_then(|m| m.next_token);
                    let records = self.decode_posts(page.data);
                    if !records.is_empty() {
                        return records;
                    }
                    log::debug!(
                        "Search page had no usable posts. Retrying in {}s",
                        self.error_backoff.as_secs()
                    );
                    tokio::time::sleep(self.error_backoff).await;
                }
                Attempt::RateLimited(wait) => {
                    log::warn!("Rate limit hit. Sleeping for {} seconds...", wait.as_secs());
                    tokio::time::sleep(wait).await;
                }
                Attempt::Failed(e) => {
                    log::warn!(
                        "Search request failed: {}. Retrying in {}s",
                        e,
                        self.error_backoff.as_secs()
                    );
                    tokio::time::sleep(self.error_backoff).await;
                }
            }
        }
    }

    fn decode_posts(&self, data: Vec<Value>) -> Vec<RawRecord> {
        let ingested_at = Utc::now();
        data.into_iter()
            .enumerate()
            .filter_map(|(index, value)| {
                let post = match serde_json::from_value::<WirePost>(value) {
                    Ok(post) => post,
                    Err(e) => {
                        log::debug!("Dropping undecodable post {}: {}", index, e);
                        return None;
                    }
                };
                RawRecord::from_wire(post, self.origin(), index, ingested_at)
            })
            .collect()
    }
}

#[async_trait]
impl RecordSource for SearchSource {
    async fn next_batch(&mut self, max_size: usize) -> Vec<RawRecord> {
        self.fetch_page(max_size).await
    }

    fn origin(&self) -> &'static str {
        "live"
    }
}

#[cfg(test)]
mod tests {
    use std::sync::{Arc, Mutex};
    use std::time::Instant;

    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;

    use super::*;

    /// Serve canned HTTP responses in order, recording each request head.
    async fn stub_server(responses: Vec<String>) -> (String, Arc<Mutex<Vec<String>>>) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let requests = Arc::new(Mutex::new(Vec::new()));
        let seen = Arc::clone(&requests);

        tokio::spawn(async move {
            for response in responses {
                let (mut socket, _) = listener.accept().await.unwrap();
                let mut buf = Vec::new();
                let mut chunk = [0u8; 1024];
                while !buf.windows(4).any(|w| w == b"\r\n\r\n") {
                    let n = socket.read(&mut chunk).await.unwrap();
                    if n == 0 {
                        break;
                    }
                    buf.extend_from_slice(&chunk[..n]);
                }
                seen.lock().unwrap().push(String::from_utf8_lossy(&buf).to_string());
                socket.write_all(response.as_bytes()).await.unwrap();
                socket.shutdown().await.ok();
            }
        });

        (format!("http://{}/2/tweets/search/recent", addr), requests)
    }

    fn http_response(status: &str, headers: &[(&str, String)], body: &str) -> String {
        let mut out = format!("HTTP/1.1 {status}\r\nContent-Type: application/json\r\n");
        for (name, value) in headers {
            out.push_str(&format!("{name}: {value}\r\n"));
        }
        out.push_str(&format!(
            "Content-Length: {}\r\nConnection: close\r\n\r\n{}",
            body.len(),
            body
        ));
        out
    }

    fn source_for(endpoint: String, backoff_secs: u64) -> SearchSource {
        let config = SourceConfig {
            endpoint,
            error_backoff_secs: backoff_secs,
            ..SourceConfig::default()
        };
        let client = crate::utils::http::create_async_client(&config).unwrap();
        SearchSource::new(client, &config, "token-123".into(), "fed OR gold".into())
    }

    const PAGE_ONE: &str = r#"{"data": [
        {"id": "11", "text": "Fed holds rates", "created_at": "2025-03-01T12:00:00.000Z"},
        {"id": "12", "text": "Gold rallies"}
    ], "meta": {"next_token": "page-2"}}"#;

    #[test]
    fn test_rate_limit_sleep_floor_and_fallback() {
        let source = source_for("http://localhost/".into(), 5);
        assert_eq!(source.rate_limit_sleep(Some(1_003), 1_000), Duration::from_secs(3));
        assert_eq!(source.rate_limit_sleep(Some(900), 1_000), Duration::from_secs(1));
        assert_eq!(source.rate_limit_sleep(None, 1_000), Duration::from_secs(60));
    }

    #[tokio::test]
    async fn test_page_decodes_and_advances_token() {
        let (endpoint, requests) = stub_server(vec![
            http_response("200 OK", &[], PAGE_ONE),
            http_response("200 OK", &[], PAGE_ONE.replace("page-2", "page-3").as_str()),
        ])
        .await;
        let mut source = source_for(endpoint, 0);

        let batch = source.next_batch(10).await;
        assert_eq!(batch.len(), 2);
        assert_eq!(batch[0].id, "11");
        assert_eq!(source.next_token(), Some("page-2"));

        source.next_batch(10).await;
        assert_eq!(source.next_token(), Some("page-3"));

        let requests = requests.lock().unwrap();
        let first = requests[0].to_lowercase();
        assert!(first.contains("authorization: bearer token-123"));
        assert!(first.contains("max_results=10"));
        assert!(!first.contains("next_token"));
        assert!(requests[1].contains("next_token=page-2"));
    }

    #[tokio::test]
    async fn test_empty_page_waits_and_fetches_again() {
        let (endpoint, requests) = stub_server(vec![
            http_response("200 OK", &[], PAGE_ONE),
            http_response("200 OK", &[], r#"{"meta": {"result_count": 0}}"#),
            http_response("200 OK", &[], r#"{"data": [], "meta": {}}"#),
            http_response("200 OK", &[], PAGE_ONE),
        ])
        .await;
        let mut source = source_for(endpoint, 0);

        assert_eq!(source.next_batch(10).await.len(), 2);
        let batch = source.next_batch(10).await;
        assert_eq!(batch.len(), 2);
        assert_eq!(source.next_token(), Some("page-2"));

        let requests = requests.lock().unwrap();
        assert_eq!(requests.len(), 4);
        assert!(requests[1].contains("next_token=page-2"));
        // The empty page carried no token, so the query restarts from the top.
        assert!(!requests[2].contains("next_token"));
        assert!(!requests[3].contains("next_token"));
    }

    #[tokio::test]
    async fn test_server_error_is_retried() {
        let (endpoint, requests) = stub_server(vec![
            http_response("503 Service Unavailable", &[], r#"{"title": "busy"}"#),
            http_response("200 OK", &[], PAGE_ONE),
        ])
        .await;
        let mut source = source_for(endpoint, 0);

        let batch = source.next_batch(10).await;
        assert_eq!(batch.len(), 2);
        assert_eq!(requests.lock().unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_rate_limit_blocks_until_reset_then_retries() {
        let reset = Utc::now().timestamp() + 3;
        let (endpoint, requests) = stub_server(vec![
            http_response(
                "429 Too Many Requests",
                &[(RATE_LIMIT_RESET_HEADER, reset.to_string())],
                r#"{"title": "Too Many Requests"}"#,
            ),
            http_response("200 OK", &[], PAGE_ONE),
        ])
        .await;
        let mut source = source_for(endpoint, 0);

        let started = Instant::now();
        let batch = source.next_batch(10).await;
        let waited = started.elapsed();

        assert_eq!(batch.len(), 2);
        assert!(waited >= Duration::from_millis(1_900), "waited {waited:?}");
        assert!(waited < Duration::from_secs(6), "waited {waited:?}");
        // Both attempts carried the same request.
        let requests = requests.lock().unwrap();
        assert_eq!(requests.len(), 2);
        assert_eq!(requests[0].lines().next(), requests[1].lines().next());
    }
}
