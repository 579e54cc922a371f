//! Shared utilities
//!
//! - `error`: fetch and parse error types used across ingestion
//! - `retry`: bounded retry with exponential backoff for storage conflicts

pub mod error;
pub mod retry;

pub use error::{FetchError, ParseError};
pub use retry::{retry_on_conflict, RetryConfig};
