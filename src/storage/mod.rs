//! SQLite-backed article and run storage
//!
//! `ArticleStore` owns the schema and every query the pipeline needs:
//! - idempotent insert-by-url for ingestion
//! - embedding/category/translation updates scoped to id sets
//! - atomic batch cluster reassignment with write-conflict mapping
//! - append-only crawl run / per-source diagnostic tables
//! - candidate and cluster queries for the ranking engine
//!
//! Uses a `Mutex<Connection>` for thread-safety; WAL mode keeps readers
//! unblocked during run finalization.

use std::collections::HashMap;
use std::path::Path;
use std::sync::Mutex;

use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, ErrorCode, OptionalExtension};
use thiserror::Error;
use tracing::info;

use crate::models::{Article, ArticleCandidate, RunStatus, SourceDiagnostics};

/// Storage-level errors
#[derive(Error, Debug)]
pub enum StorageError {
    /// Transient write contention (SQLITE_BUSY / SQLITE_LOCKED); callers
    /// retry these with bounded backoff
    #[error("write conflict: {0}")]
    WriteConflict(String),

    /// Schema creation or migration failure
    #[error("schema error: {0}")]
    Schema(String),

    /// Any other database error
    #[error("database error: {0}")]
    Database(rusqlite::Error),

    /// JSON column (authors, topics, histograms) failed to round-trip
    #[error("column serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl From<rusqlite::Error> for StorageError {
    fn from(err: rusqlite::Error) -> Self {
        if let rusqlite::Error::SqliteFailure(e, ref msg) = err {
            if matches!(e.code, ErrorCode::DatabaseBusy | ErrorCode::DatabaseLocked) {
                return Self::WriteConflict(msg.clone().unwrap_or_else(|| format!("{:?}", e.code)));
            }
        }
        Self::Database(err)
    }
}

pub type StorageResult<T> = Result<T, StorageError>;

/// Encode an embedding as little-endian f32 bytes
fn vec_to_blob(vector: &[f32]) -> Vec<u8> {
    let mut blob = Vec::with_capacity(vector.len() * 4);
    for v in vector {
        blob.extend_from_slice(&v.to_le_bytes());
    }
    blob
}

fn blob_to_vec(blob: &[u8]) -> Vec<f32> {
    blob.chunks_exact(4)
        .map(|c| f32::from_le_bytes([c[0], c[1], c[2], c[3]]))
        .collect()
}

fn parse_datetime(raw: Option<String>) -> Option<DateTime<Utc>> {
    raw.and_then(|s| {
        DateTime::parse_from_rfc3339(&s)
            .ok()
            .map(|dt| dt.with_timezone(&Utc))
    })
}

/// SQLite article store
pub struct ArticleStore {
    conn: Mutex<Connection>,
}

impl ArticleStore {
    /// Open (or create) a store at the given path
    pub fn new(path: impl AsRef<Path>) -> StorageResult<Self> {
        let path = path.as_ref();

        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .map_err(|e| StorageError::Schema(format!("create data dir: {e}")))?;
        }

        let conn = Connection::open(path)?;

        // WAL mode for better concurrency
        conn.execute_batch("PRAGMA journal_mode=WAL; PRAGMA synchronous=NORMAL;")?;
        conn.busy_timeout(std::time::Duration::from_millis(250))?;

        let store = Self {
            conn: Mutex::new(conn),
        };
        store.create_schema()?;

        info!(path = %path.display(), "article store initialized");
        Ok(store)
    }

    /// Create an in-memory store (for testing)
    pub fn in_memory() -> StorageResult<Self> {
        let conn = Connection::open_in_memory()?;
        let store = Self {
            conn: Mutex::new(conn),
        };
        store.create_schema()?;
        Ok(store)
    }

    fn create_schema(&self) -> StorageResult<()> {
        let conn = self.conn.lock().unwrap();
        conn.execute_batch(
            r#"
            CREATE TABLE IF NOT EXISTS articles (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                url TEXT NOT NULL UNIQUE,
                title TEXT NOT NULL,
                body TEXT NOT NULL,
                authors TEXT NOT NULL DEFAULT '[]',
                topics TEXT NOT NULL DEFAULT '[]',
                publisher TEXT NOT NULL,
                language TEXT,
                publishing_date TEXT,
                cover_image_url TEXT,
                title_en TEXT,
                category TEXT,
                view_count INTEGER NOT NULL DEFAULT 0,
                embedding BLOB,
                dedup_cluster_id INTEGER,
                fetched_at TEXT NOT NULL
            );

            CREATE INDEX IF NOT EXISTS idx_articles_cluster
                ON articles(dedup_cluster_id);

            CREATE INDEX IF NOT EXISTS idx_articles_publishing_date
                ON articles(publishing_date);

            CREATE TABLE IF NOT EXISTS crawl_runs (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                label TEXT,
                status TEXT NOT NULL,
                requested_publishers TEXT NOT NULL DEFAULT '[]',
                resolved_publishers TEXT NOT NULL DEFAULT '[]',
                total INTEGER NOT NULL DEFAULT 0,
                succeeded INTEGER NOT NULL DEFAULT 0,
                skipped INTEGER NOT NULL DEFAULT 0,
                failed INTEGER NOT NULL DEFAULT 0,
                total_inserted INTEGER NOT NULL DEFAULT 0,
                started_at TEXT NOT NULL,
                finished_at TEXT
            );

            CREATE TABLE IF NOT EXISTS crawl_run_sources (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                run_id INTEGER NOT NULL REFERENCES crawl_runs(id),
                publisher_id TEXT NOT NULL,
                adapter TEXT NOT NULL,
                outcome TEXT NOT NULL,
                inserted_count INTEGER NOT NULL DEFAULT 0,
                crawled_count INTEGER NOT NULL DEFAULT 0,
                skipped_count INTEGER NOT NULL DEFAULT 0,
                status_histogram TEXT NOT NULL DEFAULT '{}',
                skip_reason TEXT,
                error_message TEXT
            );
            "#,
        )
        .map_err(|e| StorageError::Schema(e.to_string()))?;

        Ok(())
    }

    // ------------------------------------------------------------------
    // Articles
    // ------------------------------------------------------------------

    /// Insert a candidate unless its URL already exists.
    ///
    /// Returns the new article id, or `None` when the URL collided (the
    /// collision is swallowed, not an error).
    pub fn insert_if_absent(&self, candidate: &ArticleCandidate) -> StorageResult<Option<i64>> {
        let conn = self.conn.lock().unwrap();
        let authors = serde_json::to_string(&candidate.authors)?;
        let topics = serde_json::to_string(&candidate.topics)?;
        let now = Utc::now().to_rfc3339();

        let changed = conn.execute(
            r#"
            INSERT OR IGNORE INTO articles
                (url, title, body, authors, topics, publisher, language,
                 publishing_date, cover_image_url, fetched_at)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)
            "#,
            params![
                candidate.url,
                candidate.title,
                candidate.body,
                authors,
                topics,
                candidate.publisher,
                candidate.language,
                candidate.publishing_date.map(|d| d.to_rfc3339()),
                candidate.cover_image_url,
                now,
            ],
        )?;

        if changed == 0 {
            return Ok(None);
        }
        Ok(Some(conn.last_insert_rowid()))
    }

    fn row_to_article(row: &rusqlite::Row<'_>) -> rusqlite::Result<Article> {
        let authors: String = row.get(4)?;
        let topics: String = row.get(5)?;
        let embedding: Option<Vec<u8>> = row.get(13)?;
        Ok(Article {
            id: row.get(0)?,
            url: row.get(1)?,
            title: row.get(2)?,
            body: row.get(3)?,
            authors: serde_json::from_str(&authors).unwrap_or_default(),
            topics: serde_json::from_str(&topics).unwrap_or_default(),
            publisher: row.get(6)?,
            language: row.get(7)?,
            publishing_date: parse_datetime(row.get(8)?),
            cover_image_url: row.get(9)?,
            title_en: row.get(10)?,
            category: row.get(11)?,
            view_count: row.get(12)?,
            embedding: embedding.map(|b| blob_to_vec(&b)),
            dedup_cluster_id: row.get(14)?,
            fetched_at: parse_datetime(row.get(15)?).unwrap_or_else(Utc::now),
        })
    }

    const ARTICLE_COLUMNS: &'static str = "id, url, title, body, authors, topics, publisher, \
         language, publishing_date, cover_image_url, title_en, category, view_count, \
         embedding, dedup_cluster_id, fetched_at";

    pub fn get_article(&self, id: i64) -> StorageResult<Option<Article>> {
        let conn = self.conn.lock().unwrap();
        let query = format!(
            "SELECT {} FROM articles WHERE id = ?1",
            Self::ARTICLE_COLUMNS
        );
        let article = conn
            .query_row(&query, params![id], Self::row_to_article)
            .optional()?;
        Ok(article)
    }

    pub fn get_by_url(&self, url: &str) -> StorageResult<Option<Article>> {
        let conn = self.conn.lock().unwrap();
        let query = format!(
            "SELECT {} FROM articles WHERE url = ?1",
            Self::ARTICLE_COLUMNS
        );
        let article = conn
            .query_row(&query, params![url], Self::row_to_article)
            .optional()?;
        Ok(article)
    }

    pub fn articles_by_ids(&self, ids: &[i64]) -> StorageResult<Vec<Article>> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }
        let conn = self.conn.lock().unwrap();
        let placeholders: String = ids.iter().map(|_| "?").collect::<Vec<_>>().join(",");
        let query = format!(
            "SELECT {} FROM articles WHERE id IN ({placeholders}) ORDER BY id",
            Self::ARTICLE_COLUMNS
        );
        let mut stmt = conn.prepare(&query)?;
        let params_vec: Vec<&dyn rusqlite::ToSql> =
            ids.iter().map(|id| id as &dyn rusqlite::ToSql).collect();
        let rows = stmt.query_map(params_vec.as_slice(), Self::row_to_article)?;
        Ok(rows.collect::<Result<Vec<_>, _>>()?)
    }

    pub fn count_articles(&self) -> StorageResult<usize> {
        let conn = self.conn.lock().unwrap();
        let count: i64 = conn.query_row("SELECT COUNT(*) FROM articles", [], |row| row.get(0))?;
        Ok(count as usize)
    }

    /// Most recently published articles, for the ranked-feed candidate pool
    pub fn recent_articles(&self, limit: usize) -> StorageResult<Vec<Article>> {
        let conn = self.conn.lock().unwrap();
        let query = format!(
            "SELECT {} FROM articles \
             ORDER BY publishing_date IS NULL, publishing_date DESC, id DESC LIMIT ?1",
            Self::ARTICLE_COLUMNS
        );
        let mut stmt = conn.prepare(&query)?;
        let rows = stmt.query_map(params![limit as i64], Self::row_to_article)?;
        Ok(rows.collect::<Result<Vec<_>, _>>()?)
    }

    /// One representative (newest member) per cluster with at least
    /// `min_size` and at most `max_size` members, largest clusters first.
    ///
    /// Lets big stories surface in the feed even when their members fall
    /// outside the recency window.
    pub fn cluster_representatives(
        &self,
        min_size: usize,
        max_size: usize,
        limit: usize,
    ) -> StorageResult<Vec<Article>> {
        let conn = self.conn.lock().unwrap();
        let query = format!(
            "SELECT {} FROM articles WHERE id IN (
                 SELECT (SELECT a.id FROM articles a
                         WHERE a.dedup_cluster_id = c.dedup_cluster_id
                         ORDER BY a.publishing_date IS NULL, a.publishing_date DESC, a.id DESC
                         LIMIT 1)
                 FROM (SELECT dedup_cluster_id, COUNT(*) AS n FROM articles
                       WHERE dedup_cluster_id IS NOT NULL
                       GROUP BY dedup_cluster_id
                       HAVING n >= ?1 AND n <= ?2
                       ORDER BY n DESC LIMIT ?3) c
             )",
            Self::ARTICLE_COLUMNS
        );
        let mut stmt = conn.prepare(&query)?;
        let rows = stmt.query_map(
            params![min_size as i64, max_size as i64, limit as i64],
            Self::row_to_article,
        )?;
        Ok(rows.collect::<Result<Vec<_>, _>>()?)
    }

    // ------------------------------------------------------------------
    // Enrichment updates (translate / categorize / embed)
    // ------------------------------------------------------------------

    pub fn set_title_en(&self, id: i64, title_en: &str) -> StorageResult<()> {
        let conn = self.conn.lock().unwrap();
        conn.execute(
            "UPDATE articles SET title_en = ?2 WHERE id = ?1",
            params![id, title_en],
        )?;
        Ok(())
    }

    pub fn set_category(&self, id: i64, category: &str) -> StorageResult<()> {
        let conn = self.conn.lock().unwrap();
        conn.execute(
            "UPDATE articles SET category = ?2 WHERE id = ?1",
            params![id, category],
        )?;
        Ok(())
    }

    pub fn set_view_count(&self, id: i64, views: i64) -> StorageResult<()> {
        let conn = self.conn.lock().unwrap();
        conn.execute(
            "UPDATE articles SET view_count = ?2 WHERE id = ?1",
            params![id, views],
        )?;
        Ok(())
    }

    /// Atomic batch embedding update
    pub fn set_embeddings(&self, embeddings: &[(i64, Vec<f32>)]) -> StorageResult<()> {
        let mut conn = self.conn.lock().unwrap();
        let tx = conn.transaction()?;
        for (id, vector) in embeddings {
            tx.execute(
                "UPDATE articles SET embedding = ?2 WHERE id = ?1",
                params![id, vec_to_blob(vector)],
            )?;
        }
        tx.commit()?;
        Ok(())
    }

    /// Articles among `ids` still missing an embedding
    pub fn missing_embedding(&self, ids: &[i64]) -> StorageResult<Vec<Article>> {
        Ok(self
            .articles_by_ids(ids)?
            .into_iter()
            .filter(|a| a.embedding.is_none())
            .collect())
    }

    /// Articles among `ids` without an English title and not already English
    pub fn missing_translation(&self, ids: &[i64]) -> StorageResult<Vec<Article>> {
        Ok(self
            .articles_by_ids(ids)?
            .into_iter()
            .filter(|a| a.title_en.is_none() && a.language.as_deref() != Some("en"))
            .collect())
    }

    /// Articles among `ids` without a category
    pub fn missing_category(&self, ids: &[i64]) -> StorageResult<Vec<Article>> {
        Ok(self
            .articles_by_ids(ids)?
            .into_iter()
            .filter(|a| a.category.is_none())
            .collect())
    }

    // ------------------------------------------------------------------
    // Clusters
    // ------------------------------------------------------------------

    /// Every article carrying an embedding: (id, embedding, cluster id)
    pub fn embedded_articles(&self) -> StorageResult<Vec<(i64, Vec<f32>, Option<i64>)>> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare(
            "SELECT id, embedding, dedup_cluster_id FROM articles \
             WHERE embedding IS NOT NULL ORDER BY id",
        )?;
        let rows = stmt.query_map([], |row| {
            let blob: Vec<u8> = row.get(1)?;
            Ok((row.get::<_, i64>(0)?, blob_to_vec(&blob), row.get(2)?))
        })?;
        Ok(rows.collect::<Result<Vec<_>, _>>()?)
    }

    /// Cluster membership counts over the whole corpus
    pub fn cluster_sizes(&self) -> StorageResult<HashMap<i64, usize>> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare(
            "SELECT dedup_cluster_id, COUNT(*) FROM articles \
             WHERE dedup_cluster_id IS NOT NULL GROUP BY dedup_cluster_id",
        )?;
        let rows = stmt.query_map([], |row| {
            Ok((row.get::<_, i64>(0)?, row.get::<_, i64>(1)? as usize))
        })?;
        Ok(rows.collect::<Result<HashMap<_, _>, _>>()?)
    }

    /// Largest cluster size, 1 when nothing is clustered
    pub fn max_cluster_size(&self) -> StorageResult<usize> {
        Ok(self.cluster_sizes()?.values().copied().max().unwrap_or(1))
    }

    /// Largest view count in the corpus
    pub fn max_view_count(&self) -> StorageResult<i64> {
        let conn = self.conn.lock().unwrap();
        let max: Option<i64> =
            conn.query_row("SELECT MAX(view_count) FROM articles", [], |row| row.get(0))?;
        Ok(max.unwrap_or(0))
    }

    /// Full membership of one cluster
    pub fn cluster_members(&self, cluster_id: i64) -> StorageResult<Vec<Article>> {
        let conn = self.conn.lock().unwrap();
        let query = format!(
            "SELECT {} FROM articles WHERE dedup_cluster_id = ?1 ORDER BY id",
            Self::ARTICLE_COLUMNS
        );
        let mut stmt = conn.prepare(&query)?;
        let rows = stmt.query_map(params![cluster_id], Self::row_to_article)?;
        Ok(rows.collect::<Result<Vec<_>, _>>()?)
    }

    /// Atomic batch cluster assignment
    pub fn set_cluster_ids(&self, assignments: &[(i64, Option<i64>)]) -> StorageResult<()> {
        let mut conn = self.conn.lock().unwrap();
        let tx = conn.transaction()?;
        for (article_id, cluster_id) in assignments {
            tx.execute(
                "UPDATE articles SET dedup_cluster_id = ?2 WHERE id = ?1",
                params![article_id, cluster_id],
            )?;
        }
        tx.commit()?;
        Ok(())
    }

    /// Wholesale reassignment of every article carrying `old` to `new`.
    /// Returns how many rows moved.
    pub fn reassign_cluster(&self, old: i64, new: i64) -> StorageResult<usize> {
        let conn = self.conn.lock().unwrap();
        let changed = conn.execute(
            "UPDATE articles SET dedup_cluster_id = ?2 WHERE dedup_cluster_id = ?1",
            params![old, new],
        )?;
        Ok(changed)
    }

    /// Clear every assignment (full-recompute entry point)
    pub fn clear_cluster_ids(&self) -> StorageResult<()> {
        let conn = self.conn.lock().unwrap();
        conn.execute("UPDATE articles SET dedup_cluster_id = NULL", [])?;
        Ok(())
    }

    // ------------------------------------------------------------------
    // Crawl runs
    // ------------------------------------------------------------------

    /// Create a run row in `running` state; returns its id
    pub fn create_run(&self, label: Option<&str>, requested: &[String]) -> StorageResult<i64> {
        let conn = self.conn.lock().unwrap();
        conn.execute(
            "INSERT INTO crawl_runs (label, status, requested_publishers, started_at) \
             VALUES (?1, ?2, ?3, ?4)",
            params![
                label,
                RunStatus::Running.as_str(),
                serde_json::to_string(requested)?,
                Utc::now().to_rfc3339(),
            ],
        )?;
        Ok(conn.last_insert_rowid())
    }

    /// Finalize a run row with aggregate counts and derived status, and
    /// append the per-source diagnostic rows.
    #[allow(clippy::too_many_arguments)]
    pub fn finalize_run(
        &self,
        run_id: i64,
        status: RunStatus,
        resolved: &[String],
        succeeded: u64,
        skipped: u64,
        failed: u64,
        total_inserted: u64,
        sources: &[SourceDiagnostics],
    ) -> StorageResult<()> {
        let mut conn = self.conn.lock().unwrap();
        let tx = conn.transaction()?;

        tx.execute(
            "UPDATE crawl_runs SET status = ?2, resolved_publishers = ?3, total = ?4, \
             succeeded = ?5, skipped = ?6, failed = ?7, total_inserted = ?8, finished_at = ?9 \
             WHERE id = ?1",
            params![
                run_id,
                status.as_str(),
                serde_json::to_string(resolved)?,
                sources.len() as i64,
                succeeded as i64,
                skipped as i64,
                failed as i64,
                total_inserted as i64,
                Utc::now().to_rfc3339(),
            ],
        )?;

        for source in sources {
            tx.execute(
                "INSERT INTO crawl_run_sources \
                 (run_id, publisher_id, adapter, outcome, inserted_count, crawled_count, \
                  skipped_count, status_histogram, skip_reason, error_message) \
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)",
                params![
                    run_id,
                    source.publisher_id,
                    source.adapter,
                    source.outcome.as_str(),
                    source.inserted_count as i64,
                    source.crawled_count as i64,
                    source.skipped_count as i64,
                    serde_json::to_string(&source.status_histogram)?,
                    source.skip_reason,
                    source.error_message,
                ],
            )?;
        }

        tx.commit()?;
        Ok(())
    }

    /// Status of a run row (diagnostics and tests)
    pub fn run_status(&self, run_id: i64) -> StorageResult<Option<String>> {
        let conn = self.conn.lock().unwrap();
        let status = conn
            .query_row(
                "SELECT status FROM crawl_runs WHERE id = ?1",
                params![run_id],
                |row| row.get(0),
            )
            .optional()?;
        Ok(status)
    }
}
