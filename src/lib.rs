// src/lib.rs

//! Streamer Library
//!
//! Pulls short posts from a replayed fixture or a live search API, scores
//! them, groups them by topic, and keeps a rolling sentiment aggregate that
//! polling readers can drain.

pub mod error;
pub mod models;
pub mod pipeline;
pub mod services;
pub mod utils;
