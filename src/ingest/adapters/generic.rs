//! Generic crawler adapter
//!
//! Delegates collection crawling to an injected [`CollectionCrawler`]
//! implementation (the external crawling library in production, a fake in
//! tests) and applies the shared candidate rules: language filtering,
//! skipping records without url/title/body, and the `max_articles` cap.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use thiserror::Error;

use crate::ingest::adapters::{AdapterOutput, CrawlContext, SourceAdapter};
use crate::models::{bump, ArticleCandidate};

/// One raw record yielded by a collection crawl, before validation
#[derive(Debug, Clone, Default)]
pub struct CrawlRecord {
    pub url: Option<String>,
    pub title: Option<String>,
    pub body: Option<String>,
    pub publisher: Option<String>,
    pub language: Option<String>,
    pub publishing_date: Option<DateTime<Utc>>,
    pub cover_image_url: Option<String>,
    pub authors: Vec<String>,
    pub topics: Vec<String>,
}

#[derive(Debug, Error)]
pub enum CollectionError {
    #[error("unknown collection: {0}")]
    UnknownCollection(String),

    #[error("collection crawl failed: {0}")]
    Failure(String),
}

/// Seam for the external crawling library
pub trait CollectionCrawler: Send + Sync {
    /// Crawl a named collection, yielding at most `max_articles` records
    fn collect(
        &self,
        collection: &str,
        max_articles: usize,
    ) -> Result<Vec<CrawlRecord>, CollectionError>;
}

pub struct GenericCrawlerAdapter {
    crawler: Arc<dyn CollectionCrawler>,
}

impl GenericCrawlerAdapter {
    pub fn new(crawler: Arc<dyn CollectionCrawler>) -> Self {
        Self { crawler }
    }
}

#[async_trait]
impl SourceAdapter for GenericCrawlerAdapter {
    async fn crawl(&self, ctx: &mut CrawlContext<'_>) -> AdapterOutput {
        let collection = match &ctx.config.collection {
            Some(collection) => collection.as_str(),
            None => return AdapterOutput::failed("crawler collection is not configured"),
        };

        let records = match self.crawler.collect(collection, ctx.max_articles) {
            Ok(records) => records,
            Err(err @ CollectionError::UnknownCollection(_)) => {
                return AdapterOutput::failed(err.to_string());
            }
            Err(CollectionError::Failure(message)) => {
                return AdapterOutput::failed(message);
            }
        };

        let mut output = AdapterOutput::default();

        for record in records {
            if output.candidates.len() >= ctx.max_articles {
                break;
            }

            if let (Some(language), Some(record_language)) = (ctx.language, &record.language) {
                if record_language != language {
                    output.skipped_count += 1;
                    continue;
                }
            }

            let (url, title, body) = match (&record.url, &record.title, &record.body) {
                (Some(url), Some(title), Some(body))
                    if !url.is_empty() && !title.is_empty() && !body.is_empty() =>
                {
                    (url.clone(), title.clone(), body.clone())
                }
                _ => {
                    bump(ctx.histogram, "parse_error");
                    output.skipped_count += 1;
                    continue;
                }
            };

            output.crawled_count += 1;
            output.candidates.push(ArticleCandidate {
                url,
                title,
                body,
                authors: record.authors,
                topics: record.topics,
                publisher: record
                    .publisher
                    .unwrap_or_else(|| ctx.config.display_name.clone()),
                language: record.language.or_else(|| {
                    ctx.language
                        .map(str::to_string)
                        .or_else(|| ctx.config.default_language.clone())
                }),
                publishing_date: record.publishing_date,
                cover_image_url: record.cover_image_url,
            });
        }

        output
    }
}
