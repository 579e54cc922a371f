//! gale - Multi-source news ingestion and story ranking
//!
//! A news pipeline that crawls many publishers in parallel, deduplicates
//! near-identical coverage into stories, and ranks them for display.
//!
//! # Architecture
//!
//! The library is organized into several modules:
//!
//! - [`config`] - Configuration management and settings
//! - [`ingest`] - Publisher registry, fetch policy, adapters, orchestrator
//! - [`parser`] - HTML field extraction for article pages
//! - [`models`] - Core data structures and types
//! - [`storage`] - SQLite article store and run diagnostics
//! - [`embedding`] - Article embedding for similarity search
//! - [`dedup`] - Near-duplicate clustering
//! - [`ranking`] - Composite scores, story assembly, MMR diversification
//! - [`scheduler`] - Periodic crawl/enrich/dedup cycles
//! - [`utils`] - Common utilities and helpers
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use gale::config::Config;
//! use gale::ingest::Ingestor;
//! use gale::storage::ArticleStore;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let config = Config::from_env()?;
//!     let store = Arc::new(ArticleStore::new(&config.database.sqlite_path)?);
//!     let ingestor = Ingestor::new(store, &config.fetch)?;
//!     let result = ingestor
//!         .crawl_once(&["cnn".to_string()], 25, None, 4, "manual")
//!         .await?;
//!     println!("inserted {} articles", result.total_inserted);
//!     Ok(())
//! }
//! ```

pub mod config;
pub mod dedup;
pub mod embedding;
pub mod error;
pub mod ingest;
pub mod metrics;
pub mod models;
pub mod parser;
pub mod ranking;
pub mod scheduler;
pub mod storage;
pub mod utils;

/// Re-export commonly used types
pub mod prelude {
    pub use crate::config::Config;
    pub use crate::error::{Error, ErrorCategory, Result};
    pub use crate::ingest::{Ingestor, SourceConfig};
    pub use crate::models::{Article, ArticleCandidate, CrawlRunResult, RunStatus};
    pub use crate::ranking::story::{RankedStory, StoryPage};
    pub use crate::storage::ArticleStore;
}

// Direct re-exports for convenience
pub use models::{Article, ArticleCandidate, CrawlRunResult, RunStatus};
