//! Scheduled pipeline cycles
//!
//! One cycle runs the full pipeline over whatever a crawl brought in:
//! crawl → translate missing titles → categorize → embed (batched) →
//! incremental dedup, each stage scoped to the cycle's newly inserted
//! article ids. The `schedule` command runs cycles on an interval or once.

use std::sync::Arc;

use serde::Serialize;
use thiserror::Error;
use tokio::time::sleep;
use tracing::{info, warn};

use crate::config::Config;
use crate::dedup;
use crate::embedding::{Embedder, HashEmbedder};
use crate::error::Error;
use crate::ingest::Ingestor;
use crate::models::Article;
use crate::storage::ArticleStore;

#[derive(Debug, Error)]
pub enum SchedulerError {
    #[error("{stage} stage failed: {source}")]
    Stage {
        stage: &'static str,
        #[source]
        source: Error,
    },
}

impl SchedulerError {
    fn stage(stage: &'static str, source: impl Into<Error>) -> Self {
        Self::Stage {
            stage,
            source: source.into(),
        }
    }
}

/// Title translation seam. The default implementation translates nothing;
/// a real backend is injected where one is available.
pub trait Translator: Send + Sync {
    /// Translate to English; `None` means no translation is available
    fn translate_to_english(&self, text: &str, source_language: Option<&str>) -> Option<String>;
}

/// Default translator backend: leaves `title_en` unset
pub struct NoopTranslator;

impl Translator for NoopTranslator {
    fn translate_to_english(&self, _text: &str, _source_language: Option<&str>) -> Option<String> {
        None
    }
}

/// Category assignment seam
pub trait Categorizer: Send + Sync {
    fn categorize(&self, article: &Article) -> String;
}

/// Keyword-based categorizer: first category whose keyword list matches
/// the article's topics or title wins; everything else is "General".
/// Category order doubles as tie-break priority.
pub struct KeywordCategorizer;

const CATEGORY_KEYWORDS: &[(&str, &[&str])] = &[
    (
        "US",
        &["congress", "senate", "white house", "supreme court", "washington"],
    ),
    (
        "Global",
        &["nato", "united nations", "diplomat", "sanctions", "foreign minister"],
    ),
    (
        "Business",
        &["economy", "market", "stocks", "inflation", "earnings", "interest rate"],
    ),
    (
        "Technology",
        &["tech", "software", "chip", "cybersecurity", "startup", "artificial intelligence"],
    ),
    (
        "Arts",
        &["museum", "exhibition", "novel", "orchestra", "theater"],
    ),
    (
        "Sports",
        &["league", "playoff", "olympic", "tournament", "world cup"],
    ),
    (
        "Entertainment",
        &["film", "movie", "album", "streaming", "celebrity", "box office"],
    ),
];

impl Categorizer for KeywordCategorizer {
    fn categorize(&self, article: &Article) -> String {
        let haystack = format!(
            "{} {}",
            article.title_en.as_deref().unwrap_or(&article.title),
            article.topics.join(" ")
        )
        .to_lowercase();

        for (category, keywords) in CATEGORY_KEYWORDS {
            if keywords.iter().any(|keyword| haystack.contains(keyword)) {
                return (*category).to_string();
            }
        }
        "General".to_string()
    }
}

/// Per-stage counts for one completed cycle
#[derive(Debug, Clone, Serialize)]
pub struct CycleReport {
    pub run_id: i64,
    pub inserted: u64,
    pub translated: usize,
    pub categorized: usize,
    pub embedded: usize,
    pub cluster_changes: usize,
}

pub struct Scheduler {
    store: Arc<ArticleStore>,
    config: Config,
    ingestor: Ingestor,
    embedder: Arc<dyn Embedder>,
    translator: Arc<dyn Translator>,
    categorizer: Arc<dyn Categorizer>,
}

impl Scheduler {
    pub fn new(store: Arc<ArticleStore>, config: Config) -> crate::error::Result<Self> {
        let ingestor = Ingestor::new(Arc::clone(&store), &config.fetch)?;
        Ok(Self {
            store,
            config,
            ingestor,
            embedder: Arc::new(HashEmbedder::default()),
            translator: Arc::new(NoopTranslator),
            categorizer: Arc::new(KeywordCategorizer),
        })
    }

    pub fn with_embedder(mut self, embedder: Arc<dyn Embedder>) -> Self {
        self.embedder = embedder;
        self
    }

    pub fn with_translator(mut self, translator: Arc<dyn Translator>) -> Self {
        self.translator = translator;
        self
    }

    pub fn with_categorizer(mut self, categorizer: Arc<dyn Categorizer>) -> Self {
        self.categorizer = categorizer;
        self
    }

    pub fn ingestor_mut(&mut self) -> &mut Ingestor {
        &mut self.ingestor
    }

    /// Run one full pipeline cycle over the given publisher tokens
    pub async fn run_cycle(
        &self,
        tokens: &[String],
        language: Option<&str>,
    ) -> Result<CycleReport, SchedulerError> {
        let crawl = self
            .ingestor
            .crawl_once(
                tokens,
                self.config.scheduler.max_articles,
                language,
                self.config.fetch.workers,
                "schedule",
            )
            .await
            .map_err(|e| SchedulerError::stage("crawl", e))?;

        let new_ids = crawl.inserted_ids();

        let translated = self
            .translate_missing(&new_ids)
            .map_err(|e| SchedulerError::stage("translate", e))?;
        let categorized = self
            .categorize_missing(&new_ids)
            .map_err(|e| SchedulerError::stage("categorize", e))?;
        let embedded = self
            .embed_missing(&new_ids)
            .map_err(|e| SchedulerError::stage("embed", e))?;
        let cluster_changes = dedup::run_dedup(&self.store, &new_ids, &self.config.dedup)
            .map_err(|e| SchedulerError::stage("dedup", e))?;

        let report = CycleReport {
            run_id: crawl.run_id,
            inserted: crawl.total_inserted,
            translated,
            categorized,
            embedded,
            cluster_changes,
        };
        info!(
            run_id = report.run_id,
            inserted = report.inserted,
            translated = report.translated,
            categorized = report.categorized,
            embedded = report.embedded,
            cluster_changes = report.cluster_changes,
            "cycle complete"
        );
        Ok(report)
    }

    /// Run cycles forever, sleeping `scheduler.interval_secs` between them.
    /// A failed cycle is logged and the loop continues.
    pub async fn run_loop(&self, tokens: &[String], language: Option<&str>) {
        let interval = self.config.scheduler_interval();
        loop {
            if let Err(err) = self.run_cycle(tokens, language).await {
                warn!(error = %err, "cycle failed");
            }
            sleep(interval).await;
        }
    }

    fn translate_missing(&self, ids: &[i64]) -> crate::error::Result<usize> {
        let mut translated = 0;
        for article in self.store.missing_translation(ids)? {
            let title_en = self
                .translator
                .translate_to_english(&article.title, article.language.as_deref());
            if let Some(title_en) = title_en {
                self.store.set_title_en(article.id, &title_en)?;
                translated += 1;
            }
        }
        Ok(translated)
    }

    fn categorize_missing(&self, ids: &[i64]) -> crate::error::Result<usize> {
        let mut categorized = 0;
        for article in self.store.missing_category(ids)? {
            let category = self.categorizer.categorize(&article);
            self.store.set_category(article.id, &category)?;
            categorized += 1;
        }
        Ok(categorized)
    }

    fn embed_missing(&self, ids: &[i64]) -> crate::error::Result<usize> {
        let pending = self.store.missing_embedding(ids)?;
        let batch_size = self.config.scheduler.embed_batch_size.max(1);
        let mut embedded = 0;

        for batch in pending.chunks(batch_size) {
            let texts: Vec<String> = batch.iter().map(Article::embedding_text).collect();
            let vectors = self.embedder.embed_batch(&texts);
            let rows: Vec<(i64, Vec<f32>)> = batch
                .iter()
                .zip(vectors)
                .map(|(article, vector)| (article.id, vector))
                .collect();
            self.store.set_embeddings(&rows)?;
            embedded += rows.len();
        }
        Ok(embedded)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn article(title: &str, topics: &[&str]) -> Article {
        Article {
            title: title.to_string(),
            topics: topics.iter().map(|t| t.to_string()).collect(),
            ..Article::default()
        }
    }

    #[test]
    fn test_keyword_categorizer_matches_title() {
        let c = KeywordCategorizer;
        assert_eq!(c.categorize(&article("Stocks rally as inflation cools", &[])), "Business");
        assert_eq!(c.categorize(&article("Olympic finals tonight", &[])), "Sports");
    }

    #[test]
    fn test_keyword_categorizer_matches_topics() {
        let c = KeywordCategorizer;
        assert_eq!(
            c.categorize(&article("Quiet day", &["cybersecurity"])),
            "Technology"
        );
    }

    #[test]
    fn test_keyword_categorizer_priority_order() {
        // Matches both US and Business keywords; US comes first
        let c = KeywordCategorizer;
        assert_eq!(
            c.categorize(&article("Congress debates inflation bill", &[])),
            "US"
        );
    }

    #[test]
    fn test_keyword_categorizer_fallback() {
        let c = KeywordCategorizer;
        assert_eq!(c.categorize(&article("Local bake sale", &[])), "General");
    }

    #[test]
    fn test_keyword_categorizer_prefers_english_title() {
        let c = KeywordCategorizer;
        let mut a = article("Börse im Aufwind", &[]);
        a.title_en = Some("Stock market rallies".to_string());
        assert_eq!(c.categorize(&a), "Business");
    }
}
