//! Configuration management for the gale pipeline
//!
//! This module handles loading and validating configuration from environment
//! variables and TOML files.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

fn env_parse<T: std::str::FromStr>(name: &str, default: T) -> T {
    std::env::var(name)
        .ok()
        .and_then(|v| v.parse::<T>().ok())
        .unwrap_or(default)
}

/// Main configuration structure
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Fetch policy configuration (rate limit, retry, circuit breaker)
    pub fetch: FetchConfig,

    /// Database configuration
    pub database: DatabaseConfig,

    /// Deduplication configuration
    pub dedup: DedupConfig,

    /// Ranking weights and parameters
    pub ranking: RankingConfig,

    /// Scheduler configuration
    pub scheduler: SchedulerConfig,

    /// Logging configuration
    pub logging: LoggingConfig,
}

/// Fetch policy applied to every source worker. Read-only during a run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FetchConfig {
    /// Request timeout in seconds
    pub timeout_secs: u64,

    /// Retry attempts beyond the first try
    pub max_retries: u32,

    /// Base backoff delay in milliseconds
    pub backoff_base_ms: u64,

    /// Token bucket refill rate (requests per minute, burst = rate)
    pub rate_limit_per_minute: u32,

    /// Consecutive failures before the circuit breaker opens
    pub breaker_threshold: u32,

    /// Circuit breaker cooldown in seconds
    pub breaker_cooldown_secs: u64,

    /// Maximum concurrent source workers
    pub workers: usize,

    /// User agent string
    pub user_agent: String,
}

/// Database configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    /// SQLite database path
    pub sqlite_path: PathBuf,
}

/// Deduplication configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DedupConfig {
    /// Cosine similarity threshold for near-duplicate grouping
    pub threshold: f32,

    /// Clusters at this size are frozen; merges that would exceed it are
    /// rejected entirely
    pub max_cluster_size: usize,
}

/// Ranking weights and parameters
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RankingConfig {
    pub weight_freshness: f64,
    pub weight_prominence: f64,
    pub weight_authority: f64,
    pub weight_engagement: f64,

    /// Freshness half-life in hours
    pub half_life_hours: f64,

    /// Story score weights
    pub weight_popularity: f64,
    pub weight_coverage: f64,
    pub weight_reputation: f64,

    /// MMR trade-off between relevance and diversity
    pub mmr_lambda: f64,

    /// Recency-bounded candidate pool size for ranked feeds
    pub candidate_limit: usize,
}

/// Scheduler configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SchedulerConfig {
    /// Seconds between cycles when looping
    pub interval_secs: u64,

    /// Per-source article cap for scheduled crawls
    pub max_articles: usize,

    /// Embedding batch size
    pub embed_batch_size: usize,
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    pub level: String,

    /// Log format (text, json)
    pub format: String,
}

impl Config {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self> {
        let mut config = Self::default();

        config.fetch.timeout_secs = env_parse("GALE_FETCH_TIMEOUT", config.fetch.timeout_secs);
        config.fetch.max_retries = env_parse("GALE_MAX_RETRIES", config.fetch.max_retries);
        config.fetch.backoff_base_ms =
            env_parse("GALE_BACKOFF_BASE_MS", config.fetch.backoff_base_ms);
        config.fetch.rate_limit_per_minute =
            env_parse("GALE_RATE_LIMIT_PER_MINUTE", config.fetch.rate_limit_per_minute);
        config.fetch.breaker_threshold =
            env_parse("GALE_BREAKER_THRESHOLD", config.fetch.breaker_threshold);
        config.fetch.breaker_cooldown_secs =
            env_parse("GALE_BREAKER_COOLDOWN", config.fetch.breaker_cooldown_secs);
        config.fetch.workers = env_parse("GALE_WORKERS", config.fetch.workers);
        if let Ok(ua) = std::env::var("GALE_USER_AGENT") {
            config.fetch.user_agent = ua;
        }

        if let Ok(path) = std::env::var("GALE_SQLITE_PATH") {
            config.database.sqlite_path = path.into();
        }

        config.dedup.threshold = env_parse("GALE_DEDUP_THRESHOLD", config.dedup.threshold);
        config.dedup.max_cluster_size =
            env_parse("GALE_MAX_CLUSTER_SIZE", config.dedup.max_cluster_size);

        config.ranking.half_life_hours =
            env_parse("GALE_HALF_LIFE_HOURS", config.ranking.half_life_hours);
        config.ranking.mmr_lambda = env_parse("GALE_MMR_LAMBDA", config.ranking.mmr_lambda);
        config.ranking.candidate_limit =
            env_parse("GALE_CANDIDATE_LIMIT", config.ranking.candidate_limit);

        config.scheduler.interval_secs =
            env_parse("GALE_SCHEDULE_INTERVAL", config.scheduler.interval_secs);
        config.scheduler.max_articles =
            env_parse("GALE_MAX_ARTICLES", config.scheduler.max_articles);

        config.logging.level =
            std::env::var("GALE_LOG_LEVEL").unwrap_or_else(|_| config.logging.level.clone());
        config.logging.format =
            std::env::var("GALE_LOG_FORMAT").unwrap_or_else(|_| config.logging.format.clone());

        Ok(config)
    }

    /// Load configuration from a TOML file
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        let config: Self = toml::from_str(&content)
            .with_context(|| format!("Failed to parse TOML config file: {}", path.display()))?;

        Ok(config)
    }

    /// Validate configuration values
    pub fn validate(&self) -> Result<()> {
        if self.fetch.workers == 0 {
            anyhow::bail!("workers must be greater than 0");
        }

        if self.fetch.rate_limit_per_minute == 0 {
            anyhow::bail!("rate_limit_per_minute must be greater than 0");
        }

        if self.fetch.breaker_threshold == 0 {
            anyhow::bail!("breaker_threshold must be greater than 0");
        }

        if !(0.0..=1.0).contains(&self.dedup.threshold) {
            anyhow::bail!("dedup threshold must be within [0, 1]");
        }

        if self.dedup.max_cluster_size < 2 {
            anyhow::bail!("max_cluster_size must be at least 2");
        }

        if !(0.0..=1.0).contains(&self.ranking.mmr_lambda) {
            anyhow::bail!("mmr_lambda must be within [0, 1]");
        }

        if self.ranking.half_life_hours <= 0.0 {
            anyhow::bail!("half_life_hours must be positive");
        }

        Ok(())
    }

    /// Get request timeout as Duration
    #[must_use]
    pub fn fetch_timeout(&self) -> Duration {
        Duration::from_secs(self.fetch.timeout_secs)
    }

    /// Get backoff base as Duration
    #[must_use]
    pub fn backoff_base(&self) -> Duration {
        Duration::from_millis(self.fetch.backoff_base_ms)
    }

    /// Get breaker cooldown as Duration
    #[must_use]
    pub fn breaker_cooldown(&self) -> Duration {
        Duration::from_secs(self.fetch.breaker_cooldown_secs)
    }

    /// Get scheduler cycle interval as Duration
    #[must_use]
    pub fn scheduler_interval(&self) -> Duration {
        Duration::from_secs(self.scheduler.interval_secs)
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            fetch: FetchConfig {
                timeout_secs: 20,
                max_retries: 2,
                backoff_base_ms: 500,
                rate_limit_per_minute: 30,
                breaker_threshold: 5,
                breaker_cooldown_secs: 120,
                workers: 4,
                user_agent: format!("gale/{}", env!("CARGO_PKG_VERSION")),
            },
            database: DatabaseConfig {
                sqlite_path: PathBuf::from("data/gale.db"),
            },
            dedup: DedupConfig {
                threshold: 0.50,
                max_cluster_size: 200,
            },
            ranking: RankingConfig {
                weight_freshness: 0.4,
                weight_prominence: 0.35,
                weight_authority: 0.2,
                weight_engagement: 0.05,
                half_life_hours: 48.0,
                weight_popularity: 0.45,
                weight_coverage: 0.35,
                weight_reputation: 0.20,
                mmr_lambda: 0.3,
                candidate_limit: 200,
            },
            scheduler: SchedulerConfig {
                interval_secs: 900,
                max_articles: 25,
                embed_batch_size: 64,
            },
            logging: LoggingConfig {
                level: String::from("info"),
                format: String::from("text"),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        let config = Config::default();
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_invalid_workers() {
        let mut config = Config::default();
        config.fetch.workers = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_invalid_dedup_threshold() {
        let mut config = Config::default();
        config.dedup.threshold = 1.5;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_invalid_mmr_lambda() {
        let mut config = Config::default();
        config.ranking.mmr_lambda = -0.1;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_duration_conversions() {
        let config = Config::default();
        assert_eq!(config.fetch_timeout(), Duration::from_secs(20));
        assert_eq!(config.backoff_base(), Duration::from_millis(500));
        assert_eq!(config.breaker_cooldown(), Duration::from_secs(120));
    }

    #[test]
    fn test_toml_round_trip() {
        let config = Config::default();
        let toml_str = toml::to_string(&config).unwrap();
        let restored: Config = toml::from_str(&toml_str).unwrap();
        assert_eq!(restored.dedup.max_cluster_size, 200);
        assert_eq!(restored.ranking.candidate_limit, 200);
    }
}
