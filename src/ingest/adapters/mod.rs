//! Source adapters
//!
//! Each adapter turns policy-governed fetches for one publisher into a
//! list of [`ArticleCandidate`]s plus diagnostic counts. Adapters never
//! touch storage; the orchestrator owns insertion.

pub mod generic;
pub mod licensed_feed;
pub mod official_api;
pub mod rss;

use std::sync::Arc;

use async_trait::async_trait;

use crate::ingest::fetcher::Fetcher;
use crate::ingest::policy::{FetchPolicy, PolicyState};
use crate::ingest::registry::SourceConfig;
use crate::models::{AdapterKind, ArticleCandidate, SourceOutcome, StatusHistogram};

pub use generic::{CollectionCrawler, CollectionError, CrawlRecord, GenericCrawlerAdapter};
pub use licensed_feed::LicensedFeedAdapter;
pub use official_api::OfficialApiAdapter;
pub use rss::RssAdapter;

/// Everything one adapter invocation may touch. The policy state and
/// histogram are exclusive to the worker running this source.
pub struct CrawlContext<'a> {
    pub config: &'a SourceConfig,
    pub max_articles: usize,
    pub language: Option<&'a str>,
    pub policy: &'a FetchPolicy,
    pub fetcher: &'a Fetcher,
    pub state: &'a mut PolicyState,
    pub histogram: &'a mut StatusHistogram,
}

/// What one adapter run produced
#[derive(Debug)]
pub struct AdapterOutput {
    pub candidates: Vec<ArticleCandidate>,
    pub outcome: SourceOutcome,
    pub skip_reason: Option<String>,
    pub error_message: Option<String>,
    pub crawled_count: u64,
    pub skipped_count: u64,
}

impl Default for AdapterOutput {
    fn default() -> Self {
        Self {
            candidates: Vec::new(),
            outcome: SourceOutcome::Success,
            skip_reason: None,
            error_message: None,
            crawled_count: 0,
            skipped_count: 0,
        }
    }
}

impl AdapterOutput {
    pub fn skipped(reason: impl Into<String>) -> Self {
        Self {
            outcome: SourceOutcome::Skipped,
            skip_reason: Some(reason.into()),
            ..Self::default()
        }
    }

    pub fn failed(message: impl Into<String>) -> Self {
        Self {
            outcome: SourceOutcome::Failed,
            error_message: Some(message.into()),
            ..Self::default()
        }
    }
}

/// Common adapter contract; per-article failures are counted and skipped,
/// never propagated
#[async_trait]
pub trait SourceAdapter: Send + Sync {
    async fn crawl(&self, ctx: &mut CrawlContext<'_>) -> AdapterOutput;
}

/// Instantiate the adapter for a source's configured kind
pub fn adapter_for(
    kind: AdapterKind,
    crawler: &Arc<dyn CollectionCrawler>,
) -> Box<dyn SourceAdapter> {
    match kind {
        AdapterKind::GenericCrawler => Box::new(GenericCrawlerAdapter::new(Arc::clone(crawler))),
        AdapterKind::Rss => Box::new(RssAdapter),
        AdapterKind::OfficialApi => Box::new(OfficialApiAdapter),
        AdapterKind::LicensedFeed => Box::new(LicensedFeedAdapter),
    }
}
