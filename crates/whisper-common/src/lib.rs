//! # whisper-common
//!
//! Shared types, configuration, error handling, and crypto helpers used
//! across all relay crates. This is the foundation layer — no business
//! logic, just primitives and contracts.

pub mod config;
pub mod crypto;
pub mod error;
pub mod metrics;
pub mod models;
pub mod protocol;
pub mod ratelimit;
pub mod whisper_id;

/// Milliseconds since the Unix epoch — the wire clock.
pub fn now_ms() -> i64 {
    chrono::Utc::now().timestamp_millis()
}
