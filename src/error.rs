// src/error.rs

//! Unified error handling for the streamer.
//!
//! Most of these errors never reach a caller of the controller: the pipeline
//! logs them and degrades (empty batch, empty replay source, retry later).

use std::fmt;

use thiserror::Error;

/// Result type alias for streamer operations.
pub type Result<T> = std::result::Result<T, AppError>;

/// Unified application error type.
#[derive(Error, Debug)]
pub enum AppError {
    /// I/O operation failed
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// HTTP request failed
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// JSON serialization/deserialization failed
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// TOML parsing failed
    #[error("TOML parse error: {0}")]
    Toml(#[from] toml::de::Error),

    /// URL parsing failed
    #[error("URL parse error: {0}")]
    Url(#[from] url::ParseError),

    /// Data validation error
    #[error("Validation error: {0}")]
    Validation(String),

    /// Replay fixture could not be read or decoded
    #[error("Fixture error for {path}: {message}")]
    Fixture { path: String, message: String },

    /// Scorer collaborator failed for a whole batch
    #[error("Scorer error: {0}")]
    Scorer(String),

    /// Remote source returned something unusable
    #[error("Source error for {context}: {message}")]
    Source { context: String, message: String },
}

impl AppError {
    /// Create a validation error.
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation(message.into())
    }

    /// Create a fixture error for the given path.
    pub fn fixture(path: impl Into<String>, message: impl fmt::Display) -> Self {
        Self::Fixture {
            path: path.into(),
            message: message.to_string(),
        }
    }

    /// Create a scorer error.
    pub fn scorer(message: impl fmt::Display) -> Self {
        Self::Scorer(message.to_string())
    }

    /// Create a remote source error with context.
    pub fn remote(context: impl Into<String>, message: impl fmt::Display) -> Self {
        Self::Source {
            context: context.into(),
            message: message.to_string(),
        }
    }
}
