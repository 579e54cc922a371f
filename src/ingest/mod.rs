//! Multi-source article ingestion
//!
//! - `registry`: publisher token resolution into source configs
//! - `policy`: per-source rate limiting and circuit breaking
//! - `fetcher`: policy-governed HTTP with retry, backoff, and diagnostics
//! - `adapters`: per-publisher crawl strategies producing candidates
//! - `pipeline`: the orchestrator tying it all together into crawl runs

pub mod adapters;
pub mod fetcher;
pub mod pipeline;
pub mod policy;
pub mod registry;

pub use adapters::{AdapterOutput, CollectionCrawler, CrawlRecord, SourceAdapter};
pub use fetcher::{FetchSuccess, Fetcher};
pub use pipeline::Ingestor;
pub use policy::{CircuitBreaker, FetchPolicy, PolicyState};
pub use registry::{resolve_token, resolve_tokens, SourceConfig};
