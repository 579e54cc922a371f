//! Integration tests for the ingestion orchestrator: token resolution,
//! idempotent inserts, and derived run status, using a fake collection
//! crawler so no network is involved.

use std::sync::Arc;

use gale::config::Config;
use gale::ingest::adapters::{CollectionCrawler, CollectionError, CrawlRecord};
use gale::ingest::Ingestor;
use gale::models::{RunStatus, SourceOutcome};
use gale::storage::ArticleStore;

struct FixedCrawler {
    records: Vec<CrawlRecord>,
}

impl CollectionCrawler for FixedCrawler {
    fn collect(
        &self,
        _collection: &str,
        _max_articles: usize,
    ) -> Result<Vec<CrawlRecord>, CollectionError> {
        Ok(self.records.clone())
    }
}

struct BrokenCrawler;

impl CollectionCrawler for BrokenCrawler {
    fn collect(
        &self,
        collection: &str,
        _max_articles: usize,
    ) -> Result<Vec<CrawlRecord>, CollectionError> {
        Err(CollectionError::Failure(format!(
            "backend down for '{collection}'"
        )))
    }
}

fn record(url: &str) -> CrawlRecord {
    CrawlRecord {
        url: Some(url.to_string()),
        title: Some("A headline".to_string()),
        body: Some("A body long enough to matter".to_string()),
        publisher: Some("United States".to_string()),
        language: Some("en".to_string()),
        ..CrawlRecord::default()
    }
}

fn ingestor(store: &Arc<ArticleStore>, crawler: Arc<dyn CollectionCrawler>) -> Ingestor {
    Ingestor::new(Arc::clone(store), &Config::default().fetch)
        .unwrap()
        .with_crawler(crawler)
}

#[tokio::test]
async fn crawl_is_idempotent_across_runs() {
    let store = Arc::new(ArticleStore::in_memory().unwrap());
    let crawler = Arc::new(FixedCrawler {
        records: vec![record("https://news.example/a"), record("https://news.example/b")],
    });
    let ingestor = ingestor(&store, crawler);
    let tokens = vec!["us".to_string()];

    let first = ingestor.crawl_once(&tokens, 10, None, 2, "test").await.unwrap();
    assert_eq!(first.status, RunStatus::Success);
    assert_eq!(first.total_inserted, 2);
    assert_eq!(first.inserted_ids().len(), 2);

    // Same records again: every insert is a no-op
    let second = ingestor.crawl_once(&tokens, 10, None, 2, "test").await.unwrap();
    assert_eq!(second.status, RunStatus::Success);
    assert_eq!(second.total_inserted, 0);
    assert!(second.inserted_ids().is_empty());

    assert_eq!(store.count_articles().unwrap(), 2);
}

#[tokio::test]
async fn mixed_outcomes_derive_partial_success() {
    let store = Arc::new(ArticleStore::in_memory().unwrap());
    let crawler = Arc::new(FixedCrawler {
        records: vec![record("https://news.example/a")],
    });
    let ingestor = ingestor(&store, crawler);

    // us succeeds, reuters is credential-gated (skipped), bogus is unknown
    let tokens = vec!["us".to_string(), "reuters".to_string(), "bogus".to_string()];
    let result = ingestor.crawl_once(&tokens, 10, None, 4, "test").await.unwrap();

    assert_eq!(result.status, RunStatus::PartialSuccess);
    assert_eq!(result.total, 3);
    assert_eq!(result.succeeded, 1);
    assert_eq!(result.skipped, 1);
    assert_eq!(result.failed, 1);

    let by_id = |id: &str| {
        result
            .sources
            .iter()
            .find(|s| s.publisher_id == id)
            .unwrap()
    };
    assert_eq!(by_id("us").outcome, SourceOutcome::Success);
    assert_eq!(by_id("reuters").outcome, SourceOutcome::Skipped);
    assert_eq!(
        by_id("reuters").skip_reason.as_deref(),
        Some("missing_contract_or_feed")
    );
    assert_eq!(by_id("bogus").outcome, SourceOutcome::Failed);
    assert!(by_id("bogus").error_message.as_deref().unwrap().contains("bogus"));

    assert_eq!(
        store.run_status(result.run_id).unwrap().as_deref(),
        Some("partial_success")
    );
}

#[tokio::test]
async fn all_sources_failing_derives_failed() {
    let store = Arc::new(ArticleStore::in_memory().unwrap());
    let ingestor = ingestor(&store, Arc::new(BrokenCrawler));

    let tokens = vec!["us".to_string(), "uk".to_string()];
    let result = ingestor.crawl_once(&tokens, 10, None, 2, "test").await.unwrap();

    assert_eq!(result.status, RunStatus::Failed);
    assert_eq!(result.failed, 2);
    assert!(result
        .sources
        .iter()
        .all(|s| s.outcome == SourceOutcome::Failed));
    assert_eq!(
        store.run_status(result.run_id).unwrap().as_deref(),
        Some("failed")
    );
}

#[tokio::test]
async fn max_articles_caps_each_source() {
    let store = Arc::new(ArticleStore::in_memory().unwrap());
    let records = (0..20)
        .map(|i| record(&format!("https://news.example/{i}")))
        .collect();
    let ingestor = ingestor(&store, Arc::new(FixedCrawler { records }));

    let result = ingestor
        .crawl_once(&["us".to_string()], 5, None, 1, "test")
        .await
        .unwrap();

    assert_eq!(result.total_inserted, 5);
}
