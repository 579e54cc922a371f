//! Error types for ingestion and parsing
//!
//! This module defines the domain-specific error types used by the fetcher,
//! the source adapters, and the HTML/feed parsers.

use thiserror::Error;

/// Errors that can occur during policy-governed HTTP fetching
#[derive(Error, Debug)]
pub enum FetchError {
    /// Circuit breaker is open; no network attempt was made
    #[error("circuit breaker is open")]
    CircuitOpen,

    /// Request timed out
    #[error("request timeout")]
    Timeout,

    /// Connection-level failure (DNS, refused, reset)
    #[error("connection error: {0}")]
    Connect(String),

    /// Any other client-side request failure
    #[error("fetch error: {0}")]
    Request(String),

    /// Terminal HTTP error status after retries were exhausted or skipped
    #[error("HTTP {0}")]
    HttpStatus(u16),
}

impl FetchError {
    /// Histogram key for this error kind, matching the per-run diagnostics
    pub fn kind(&self) -> &'static str {
        match self {
            Self::CircuitOpen => "circuit_open",
            Self::Timeout => "timeout",
            Self::Connect(_) => "connection_error",
            Self::Request(_) => "fetch_error",
            Self::HttpStatus(_) => "http_error",
        }
    }

    /// Whether a fresh attempt against the same source could succeed
    pub fn is_transient(&self) -> bool {
        match self {
            Self::Timeout | Self::Connect(_) => true,
            Self::HttpStatus(status) => *status == 429 || (500..600).contains(status),
            Self::CircuitOpen | Self::Request(_) => false,
        }
    }
}

/// Errors that can occur while extracting article fields
#[derive(Error, Debug)]
pub enum ParseError {
    /// No usable title in the page
    #[error("title not found in article")]
    TitleNotFound,

    /// No usable body text in the page
    #[error("body not found in article")]
    BodyNotFound,
}
