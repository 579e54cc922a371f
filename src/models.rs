// Core data structures for the gale ingestion and ranking pipeline

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Adapter variant used to ingest a publisher
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AdapterKind {
    GenericCrawler,
    Rss,
    OfficialApi,
    LicensedFeed,
}

impl AdapterKind {
    /// String form used in storage rows and diagnostics
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::GenericCrawler => "generic_crawler",
            Self::Rss => "rss",
            Self::OfficialApi => "official_api",
            Self::LicensedFeed => "licensed_feed",
        }
    }
}

impl std::fmt::Display for AdapterKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Unpersisted article record produced by an adapter, pending the
/// URL-uniqueness check at insert time.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct ArticleCandidate {
    pub url: String,
    pub title: String,
    pub body: String,
    pub authors: Vec<String>,
    pub topics: Vec<String>,
    pub publisher: String,
    pub language: Option<String>,
    pub publishing_date: Option<DateTime<Utc>>,
    pub cover_image_url: Option<String>,
}

/// Persisted article row
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Article {
    pub id: i64,
    pub url: String,
    pub title: String,
    pub body: String,
    pub authors: Vec<String>,
    pub topics: Vec<String>,
    pub publisher: String,
    pub language: Option<String>,
    pub publishing_date: Option<DateTime<Utc>>,
    pub cover_image_url: Option<String>,
    pub title_en: Option<String>,
    pub category: Option<String>,
    pub view_count: i64,
    /// Unit-norm embedding vector, absent until the embed stage runs
    pub embedding: Option<Vec<f32>>,
    /// Shared by all articles judged near-duplicate; NULL for singletons
    pub dedup_cluster_id: Option<i64>,
    pub fetched_at: DateTime<Utc>,
}

impl Article {
    /// Text fed to the embedder: English title when available, else the
    /// original title, followed by the first 400 characters of the body.
    pub fn embedding_text(&self) -> String {
        make_embedding_text(&self.title, &self.body, self.title_en.as_deref())
    }
}

/// Build the canonical embedding input for an article.
pub fn make_embedding_text(title: &str, body: &str, title_en: Option<&str>) -> String {
    let title = match title_en {
        Some(t) if !t.trim().is_empty() => t,
        _ => title,
    };
    let snippet: String = body.chars().take(400).collect();
    if snippet.is_empty() {
        title.to_string()
    } else {
        format!("{title} {snippet}")
    }
}

/// Per-run histogram of fetch outcomes, keyed by status code or error kind
/// ("timeout", "connection_error", "circuit_open", "5xx", ...).
///
/// BTreeMap keeps JSON output deterministic.
pub type StatusHistogram = BTreeMap<String, u64>;

/// Increment a histogram key by one.
pub fn bump(histogram: &mut StatusHistogram, key: impl Into<String>) {
    *histogram.entry(key.into()).or_insert(0) += 1;
}

/// Per-source outcome of one crawl run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SourceOutcome {
    Success,
    Skipped,
    Failed,
}

impl SourceOutcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Success => "success",
            Self::Skipped => "skipped",
            Self::Failed => "failed",
        }
    }
}

impl std::fmt::Display for SourceOutcome {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Derived status of one crawl run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    Running,
    Success,
    PartialSuccess,
    Failed,
}

impl RunStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Running => "running",
            Self::Success => "success",
            Self::PartialSuccess => "partial_success",
            Self::Failed => "failed",
        }
    }

    /// Derive the run status from per-source outcomes: `failed` iff all
    /// sources failed, `partial_success` iff some failed, else `success`.
    pub fn derive(sources: &[SourceDiagnostics]) -> Self {
        let failed = sources
            .iter()
            .filter(|s| s.outcome == SourceOutcome::Failed)
            .count();
        if !sources.is_empty() && failed == sources.len() {
            Self::Failed
        } else if failed > 0 {
            Self::PartialSuccess
        } else {
            Self::Success
        }
    }
}

impl std::fmt::Display for RunStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Per-source diagnostic record for one crawl run
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SourceDiagnostics {
    pub publisher_id: String,
    pub adapter: String,
    pub outcome: SourceOutcome,
    pub inserted_count: u64,
    pub crawled_count: u64,
    pub skipped_count: u64,
    pub status_histogram: StatusHistogram,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub skip_reason: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
    /// Ids of articles newly inserted by this source, used to scope
    /// downstream translate/embed/dedup work to new rows only.
    #[serde(skip)]
    pub inserted_ids: Vec<i64>,
}

impl SourceDiagnostics {
    pub fn failed(publisher_id: impl Into<String>, adapter: &str, message: impl Into<String>) -> Self {
        Self {
            publisher_id: publisher_id.into(),
            adapter: adapter.to_string(),
            outcome: SourceOutcome::Failed,
            inserted_count: 0,
            crawled_count: 0,
            skipped_count: 0,
            status_histogram: StatusHistogram::new(),
            skip_reason: None,
            error_message: Some(message.into()),
            inserted_ids: Vec::new(),
        }
    }
}

/// Result of one orchestrated crawl run
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CrawlRunResult {
    pub run_id: i64,
    pub requested_publishers: Vec<String>,
    pub resolved_publishers: Vec<String>,
    pub status: RunStatus,
    pub total: u64,
    pub succeeded: u64,
    pub skipped: u64,
    pub failed: u64,
    pub total_inserted: u64,
    pub sources: Vec<SourceDiagnostics>,
}

impl CrawlRunResult {
    /// All newly inserted article ids across sources.
    pub fn inserted_ids(&self) -> Vec<i64> {
        self.sources
            .iter()
            .flat_map(|s| s.inserted_ids.iter().copied())
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn diag(outcome: SourceOutcome) -> SourceDiagnostics {
        SourceDiagnostics {
            publisher_id: "pub".into(),
            adapter: "rss".into(),
            outcome,
            inserted_count: 0,
            crawled_count: 0,
            skipped_count: 0,
            status_histogram: StatusHistogram::new(),
            skip_reason: None,
            error_message: None,
            inserted_ids: Vec::new(),
        }
    }

    #[test]
    fn test_run_status_all_failed() {
        let sources = vec![diag(SourceOutcome::Failed), diag(SourceOutcome::Failed)];
        assert_eq!(RunStatus::derive(&sources), RunStatus::Failed);
    }

    #[test]
    fn test_run_status_partial() {
        let sources = vec![diag(SourceOutcome::Success), diag(SourceOutcome::Failed)];
        assert_eq!(RunStatus::derive(&sources), RunStatus::PartialSuccess);
    }

    #[test]
    fn test_run_status_skipped_is_not_failure() {
        let sources = vec![diag(SourceOutcome::Success), diag(SourceOutcome::Skipped)];
        assert_eq!(RunStatus::derive(&sources), RunStatus::Success);
    }

    #[test]
    fn test_run_status_empty() {
        assert_eq!(RunStatus::derive(&[]), RunStatus::Success);
    }

    #[test]
    fn test_embedding_text_prefers_english_title() {
        let text = make_embedding_text("원제", "body text", Some("Translated"));
        assert!(text.starts_with("Translated"));
        assert!(text.contains("body text"));
    }

    #[test]
    fn test_embedding_text_truncates_body() {
        let body = "x".repeat(1000);
        let text = make_embedding_text("title", &body, None);
        assert_eq!(text.chars().count(), "title ".chars().count() + 400);
    }

    #[test]
    fn test_embedding_text_blank_translation_falls_back() {
        let text = make_embedding_text("Original", "body", Some("  "));
        assert!(text.starts_with("Original"));
    }

    #[test]
    fn test_histogram_bump() {
        let mut h = StatusHistogram::new();
        bump(&mut h, "200");
        bump(&mut h, "200");
        bump(&mut h, "timeout");
        assert_eq!(h.get("200"), Some(&2));
        assert_eq!(h.get("timeout"), Some(&1));
    }

    #[test]
    fn test_adapter_kind_serde_form() {
        assert_eq!(AdapterKind::GenericCrawler.as_str(), "generic_crawler");
        let json = serde_json::to_string(&AdapterKind::OfficialApi).unwrap();
        assert_eq!(json, "\"official_api\"");
    }

    #[test]
    fn test_diagnostics_json_omits_empty_optionals() {
        let d = diag(SourceOutcome::Success);
        let json = serde_json::to_string(&d).unwrap();
        assert!(!json.contains("skip_reason"));
        assert!(!json.contains("error_message"));
    }
}
