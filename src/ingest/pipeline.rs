//! Ingestion orchestrator
//!
//! `Ingestor::crawl_once` resolves publisher tokens, fans the resolved
//! sources out across tokio tasks (capped by a semaphore), inserts the
//! candidates each adapter returns with insert-or-skip-on-duplicate-url
//! semantics, and persists a `CrawlRun` audit row with per-source
//! diagnostics and a derived status.
//!
//! - Unknown tokens become failed diagnostics, never silent drops.
//! - Each task owns a private `PolicyState`; breaker and limiter state is
//!   never shared across sources or workers.
//! - A panicking task is converted into a failed diagnostic.

use std::sync::Arc;

use tokio::sync::Semaphore;
use tracing::{info, warn};

use crate::config::FetchConfig;
use crate::error::Result;
use crate::ingest::adapters::{
    adapter_for, AdapterOutput, CollectionCrawler, CollectionError, CrawlContext, CrawlRecord,
};
use crate::ingest::fetcher::Fetcher;
use crate::ingest::policy::{FetchPolicy, PolicyState};
use crate::ingest::registry::{self, SourceConfig};
use crate::metrics;
use crate::models::{
    CrawlRunResult, RunStatus, SourceDiagnostics, SourceOutcome, StatusHistogram,
};
use crate::storage::{ArticleStore, StorageError};
use crate::utils::retry::{retry_on_conflict, RetryConfig};

/// Placeholder crawler backend used until a real one is injected with
/// [`Ingestor::with_crawler`]; every collection crawl fails with a clear
/// message so generic-crawler sources surface as failed diagnostics.
struct UnavailableCrawler;

impl CollectionCrawler for UnavailableCrawler {
    fn collect(
        &self,
        collection: &str,
        _max_articles: usize,
    ) -> std::result::Result<Vec<CrawlRecord>, CollectionError> {
        Err(CollectionError::Failure(format!(
            "no collection crawler backend configured (collection '{collection}')"
        )))
    }
}

pub struct Ingestor {
    store: Arc<ArticleStore>,
    policy: FetchPolicy,
    fetcher: Fetcher,
    crawler: Arc<dyn CollectionCrawler>,
}

impl Ingestor {
    pub fn new(store: Arc<ArticleStore>, config: &FetchConfig) -> Result<Self> {
        let policy = FetchPolicy::from(config);
        let fetcher = Fetcher::new(&policy, &config.user_agent)?;
        Ok(Self {
            store,
            policy,
            fetcher,
            crawler: Arc::new(UnavailableCrawler),
        })
    }

    /// Inject the collection crawler backend for generic-crawler sources
    pub fn with_crawler(mut self, crawler: Arc<dyn CollectionCrawler>) -> Self {
        self.crawler = crawler;
        self
    }

    /// Run one crawl over the given publisher tokens.
    ///
    /// `workers` caps how many sources crawl concurrently. The result
    /// carries per-source diagnostics including newly inserted article
    /// ids, so downstream stages can scope their work to new rows.
    pub async fn crawl_once(
        &self,
        tokens: &[String],
        max_articles: usize,
        language: Option<&str>,
        workers: usize,
        run_label: &str,
    ) -> Result<CrawlRunResult> {
        let (configs, warnings, unknown) = registry::resolve_tokens(tokens);
        for warning in &warnings {
            warn!(run_label, "{warning}");
        }

        let run_id = self.store.create_run(Some(run_label), tokens)?;
        let resolved: Vec<String> = configs.iter().map(|c| c.publisher_id.clone()).collect();

        let mut sources: Vec<SourceDiagnostics> = unknown
            .iter()
            .map(|token| {
                SourceDiagnostics::failed(
                    token.clone(),
                    "unknown",
                    format!("unknown publisher token: {token}"),
                )
            })
            .collect();

        let semaphore = Arc::new(Semaphore::new(workers.max(1)));
        let language_owned = language.map(str::to_string);

        let mut handles = Vec::with_capacity(configs.len());
        for config in configs {
            let store = Arc::clone(&self.store);
            let fetcher = self.fetcher.clone();
            let policy = self.policy.clone();
            let crawler = Arc::clone(&self.crawler);
            let semaphore = Arc::clone(&semaphore);
            let language = language_owned.clone();
            let publisher_id = config.publisher_id.clone();

            let handle = tokio::spawn(async move {
                let _permit = match semaphore.acquire_owned().await {
                    Ok(permit) => permit,
                    Err(_) => {
                        return SourceDiagnostics::failed(
                            config.publisher_id.clone(),
                            config.adapter.as_str(),
                            "worker semaphore closed",
                        );
                    }
                };
                crawl_source(&store, &config, &fetcher, &policy, &crawler, max_articles, language.as_deref()).await
            });
            handles.push((publisher_id, handle));
        }

        let joined = futures::future::join_all(
            handles
                .into_iter()
                .map(|(publisher_id, handle)| async move { (publisher_id, handle.await) }),
        )
        .await;

        for (publisher_id, result) in joined {
            match result {
                Ok(diagnostics) => sources.push(diagnostics),
                Err(join_error) => {
                    warn!(publisher = %publisher_id, error = %join_error, "source task aborted");
                    sources.push(SourceDiagnostics::failed(
                        publisher_id,
                        "unknown",
                        format!("source task aborted: {join_error}"),
                    ));
                }
            }
        }

        let status = RunStatus::derive(&sources);
        let succeeded = count_outcome(&sources, SourceOutcome::Success);
        let skipped = count_outcome(&sources, SourceOutcome::Skipped);
        let failed = count_outcome(&sources, SourceOutcome::Failed);
        let total_inserted: u64 = sources.iter().map(|s| s.inserted_count).sum();

        self.store.finalize_run(
            run_id,
            status,
            &resolved,
            succeeded,
            skipped,
            failed,
            total_inserted,
            &sources,
        )?;

        info!(
            run_id,
            run_label,
            status = %status,
            total = sources.len(),
            succeeded,
            skipped,
            failed,
            total_inserted,
            "crawl run finished"
        );

        Ok(CrawlRunResult {
            run_id,
            requested_publishers: tokens.to_vec(),
            resolved_publishers: resolved,
            status,
            total: sources.len() as u64,
            succeeded,
            skipped,
            failed,
            total_inserted,
            sources,
        })
    }
}

fn count_outcome(sources: &[SourceDiagnostics], outcome: SourceOutcome) -> u64 {
    sources.iter().filter(|s| s.outcome == outcome).count() as u64
}

/// Crawl one source and persist its candidates; never propagates, all
/// failures fold into the returned diagnostics
async fn crawl_source(
    store: &ArticleStore,
    config: &SourceConfig,
    fetcher: &Fetcher,
    policy: &FetchPolicy,
    crawler: &Arc<dyn CollectionCrawler>,
    max_articles: usize,
    language: Option<&str>,
) -> SourceDiagnostics {
    let _timer = metrics::start_crawl_timer(&config.publisher_id);
    let mut state = PolicyState::new(policy);
    let mut histogram = StatusHistogram::new();

    let adapter = adapter_for(config.adapter, crawler);
    let mut ctx = CrawlContext {
        config,
        max_articles,
        language,
        policy,
        fetcher,
        state: &mut state,
        histogram: &mut histogram,
    };
    let output = adapter.crawl(&mut ctx).await;

    let (inserted_ids, insert_error) = match output.outcome {
        SourceOutcome::Success => match insert_candidates(store, &output) {
            Ok(ids) => (ids, None),
            Err(err) => (Vec::new(), Some(err.to_string())),
        },
        _ => (Vec::new(), None),
    };

    let diagnostics = SourceDiagnostics {
        publisher_id: config.publisher_id.clone(),
        adapter: config.adapter.as_str().to_string(),
        outcome: if insert_error.is_some() {
            SourceOutcome::Failed
        } else {
            output.outcome
        },
        inserted_count: inserted_ids.len() as u64,
        crawled_count: output.crawled_count,
        skipped_count: output.skipped_count,
        status_histogram: histogram,
        skip_reason: output.skip_reason,
        error_message: insert_error.or(output.error_message),
        inserted_ids,
    };

    for (key, count) in &diagnostics.status_histogram {
        metrics::record_fetch_outcomes(&diagnostics.publisher_id, key, *count);
    }
    metrics::record_source_outcome(&diagnostics.publisher_id, diagnostics.outcome.as_str());
    metrics::record_articles_inserted(&diagnostics.publisher_id, diagnostics.inserted_count);

    info!(
        publisher = %diagnostics.publisher_id,
        adapter = %diagnostics.adapter,
        outcome = %diagnostics.outcome,
        inserted = diagnostics.inserted_count,
        crawled = diagnostics.crawled_count,
        skipped = diagnostics.skipped_count,
        skip_reason = diagnostics.skip_reason.as_deref().unwrap_or(""),
        "source crawl finished"
    );

    diagnostics
}

/// Insert candidates with insert-or-skip-on-duplicate-url semantics;
/// transient write conflicts are retried per candidate
fn insert_candidates(
    store: &ArticleStore,
    output: &AdapterOutput,
) -> std::result::Result<Vec<i64>, StorageError> {
    let retry = RetryConfig::default();
    let mut inserted = Vec::new();

    for candidate in &output.candidates {
        if let Some(id) = retry_on_conflict(&retry, || store.insert_if_absent(candidate))? {
            inserted.push(id);
        }
    }
    Ok(inserted)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use crate::models::ArticleCandidate;

    fn candidate(url: &str) -> ArticleCandidate {
        ArticleCandidate {
            url: url.to_string(),
            title: "Title".to_string(),
            body: "Body".to_string(),
            publisher: "CNN".to_string(),
            ..ArticleCandidate::default()
        }
    }

    #[test]
    fn test_insert_candidates_skips_duplicates() {
        let store = ArticleStore::in_memory().unwrap();
        let output = AdapterOutput {
            candidates: vec![
                candidate("https://a.example/1"),
                candidate("https://a.example/1"),
                candidate("https://a.example/2"),
            ],
            ..AdapterOutput::default()
        };

        let inserted = insert_candidates(&store, &output).unwrap();
        assert_eq!(inserted.len(), 2);
    }

    #[tokio::test]
    async fn test_unknown_tokens_become_failed_diagnostics() {
        let store = Arc::new(ArticleStore::in_memory().unwrap());
        let ingestor = Ingestor::new(store, &Config::default().fetch).unwrap();

        let result = ingestor
            .crawl_once(&["bogus".to_string()], 5, None, 2, "test")
            .await
            .unwrap();

        assert_eq!(result.status, RunStatus::Failed);
        assert_eq!(result.sources.len(), 1);
        assert_eq!(result.sources[0].outcome, SourceOutcome::Failed);
        assert!(result.sources[0]
            .error_message
            .as_deref()
            .unwrap()
            .contains("bogus"));
    }

    #[tokio::test]
    async fn test_skipped_sources_do_not_fail_run() {
        let store = Arc::new(ArticleStore::in_memory().unwrap());
        let ingestor = Ingestor::new(Arc::clone(&store), &Config::default().fetch).unwrap();

        // reuters is credential-gated; without the env var it is skipped
        let result = ingestor
            .crawl_once(&["reuters".to_string()], 5, None, 2, "test")
            .await
            .unwrap();

        assert_eq!(result.status, RunStatus::Success);
        assert_eq!(result.skipped, 1);
        assert_eq!(
            store.run_status(result.run_id).unwrap().as_deref(),
            Some("success")
        );
    }
}
