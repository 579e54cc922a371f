//! Composite relevance scoring
//!
//! Per-article score = weighted sum of freshness (exponential decay with a
//! configurable half-life), prominence (log-scaled cluster size), publisher
//! authority, and engagement (log-scaled view count). All factors land in
//! [0, 1] before weighting.

pub mod authority;
pub mod mmr;
pub mod story;

use std::collections::HashMap;

use chrono::{DateTime, Utc};

use crate::config::RankingConfig;
use crate::models::Article;
use crate::ranking::authority::authority_score;

/// Weights and parameters for composite scoring
#[derive(Debug, Clone)]
pub struct RankingWeights {
    pub freshness: f64,
    pub prominence: f64,
    pub authority: f64,
    pub engagement: f64,
    pub half_life_hours: f64,
}

impl Default for RankingWeights {
    fn default() -> Self {
        Self {
            freshness: 0.4,
            prominence: 0.35,
            authority: 0.2,
            engagement: 0.05,
            half_life_hours: 48.0,
        }
    }
}

impl From<&RankingConfig> for RankingWeights {
    fn from(cfg: &RankingConfig) -> Self {
        Self {
            freshness: cfg.weight_freshness,
            prominence: cfg.weight_prominence,
            authority: cfg.weight_authority,
            engagement: cfg.weight_engagement,
            half_life_hours: cfg.half_life_hours,
        }
    }
}

/// Exponential recency decay; undated articles score 0
pub fn freshness_score(
    publishing_date: Option<DateTime<Utc>>,
    now: DateTime<Utc>,
    half_life_hours: f64,
) -> f64 {
    let Some(date) = publishing_date else {
        return 0.0;
    };
    let age_hours = ((now - date).num_seconds() as f64 / 3600.0).max(0.0);
    let decay_rate = std::f64::consts::LN_2 / half_life_hours;
    (-decay_rate * age_hours).exp()
}

/// Log-scaled view count relative to the corpus maximum
pub fn engagement_score(view_count: i64, max_views: i64) -> f64 {
    if max_views <= 0 {
        return 0.0;
    }
    (1.0 + view_count.max(0) as f64).ln() / (1.0 + max_views as f64).ln()
}

/// Log-scaled cluster size relative to the largest cluster in scope
pub fn prominence_score(cluster_size: usize, max_cluster_size: usize) -> f64 {
    if max_cluster_size <= 1 {
        return 0.0;
    }
    (1.0 + cluster_size as f64).ln() / (1.0 + max_cluster_size as f64).ln()
}

/// Composite scores for a candidate set.
///
/// Cluster sizes and the view-count maximum are taken from the candidate
/// set itself, so scores are relative within one ranking invocation.
pub fn composite_scores(
    articles: &[Article],
    weights: &RankingWeights,
    now: DateTime<Utc>,
) -> Vec<f64> {
    let max_views = articles.iter().map(|a| a.view_count).max().unwrap_or(0);

    // Cluster sizes within the candidate set
    let mut cluster_size_map: HashMap<i64, usize> = HashMap::new();
    for article in articles {
        if let Some(cid) = article.dedup_cluster_id {
            *cluster_size_map.entry(cid).or_insert(0) += 1;
        }
    }
    let max_cluster = cluster_size_map.values().copied().max().unwrap_or(1);

    articles
        .iter()
        .map(|article| {
            let cluster_size = article
                .dedup_cluster_id
                .and_then(|cid| cluster_size_map.get(&cid).copied())
                .unwrap_or(1);
            let f = freshness_score(article.publishing_date, now, weights.half_life_hours);
            let p = prominence_score(cluster_size, max_cluster);
            let a = authority_score(&article.publisher);
            let e = engagement_score(article.view_count, max_views);
            weights.freshness * f
                + weights.prominence * p
                + weights.authority * a
                + weights.engagement * e
        })
        .collect()
}

/// Composite scores keyed by article id
pub fn popularity_by_id(
    articles: &[Article],
    weights: &RankingWeights,
    now: DateTime<Utc>,
) -> HashMap<i64, f64> {
    let scores = composite_scores(articles, weights, now);
    articles
        .iter()
        .zip(scores)
        .map(|(article, score)| (article.id, score))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn article(id: i64, publisher: &str, hours_old: i64) -> Article {
        Article {
            id,
            publisher: publisher.into(),
            publishing_date: Some(Utc::now() - Duration::hours(hours_old)),
            ..Default::default()
        }
    }

    #[test]
    fn test_freshness_half_life() {
        let now = Utc::now();
        let fresh = freshness_score(Some(now), now, 48.0);
        assert!((fresh - 1.0).abs() < 1e-9);

        let half = freshness_score(Some(now - Duration::hours(48)), now, 48.0);
        assert!((half - 0.5).abs() < 1e-6);

        assert_eq!(freshness_score(None, now, 48.0), 0.0);
    }

    #[test]
    fn test_freshness_future_dates_are_clamped() {
        let now = Utc::now();
        let score = freshness_score(Some(now + Duration::hours(6)), now, 48.0);
        assert!((score - 1.0).abs() < 1e-9);
    }

    #[test]
    fn test_engagement_bounds() {
        assert_eq!(engagement_score(10, 0), 0.0);
        assert_eq!(engagement_score(0, 100), 0.0);
        assert!((engagement_score(100, 100) - 1.0).abs() < 1e-9);
        let mid = engagement_score(10, 100);
        assert!(mid > 0.0 && mid < 1.0);
    }

    #[test]
    fn test_prominence_bounds() {
        assert_eq!(prominence_score(1, 1), 0.0);
        assert!((prominence_score(12, 12) - 1.0).abs() < 1e-9);
        assert!(prominence_score(3, 12) < prominence_score(6, 12));
    }

    #[test]
    fn test_composite_fresher_scores_higher() {
        let weights = RankingWeights::default();
        let articles = vec![
            article(1, "Unknown Gazette", 1),
            article(2, "Unknown Gazette", 72),
        ];
        let scores = composite_scores(&articles, &weights, Utc::now());
        assert!(scores[0] > scores[1]);
    }

    #[test]
    fn test_composite_authority_breaks_ties() {
        let weights = RankingWeights::default();
        let articles = vec![
            article(1, "The Guardian", 10),
            article(2, "Unknown Gazette", 10),
        ];
        let scores = composite_scores(&articles, &weights, Utc::now());
        assert!(scores[0] > scores[1]);
    }

    #[test]
    fn test_cluster_size_drives_prominence() {
        let weights = RankingWeights::default();
        let mut clustered_a = article(1, "Unknown Gazette", 10);
        clustered_a.dedup_cluster_id = Some(1);
        let mut clustered_b = article(2, "Unknown Gazette", 10);
        clustered_b.dedup_cluster_id = Some(1);
        let singleton = article(3, "Unknown Gazette", 10);

        let articles = vec![clustered_a, clustered_b, singleton];
        let scores = composite_scores(&articles, &weights, Utc::now());
        assert!(scores[0] > scores[2]);
    }

    #[test]
    fn test_popularity_by_id_alignment() {
        let weights = RankingWeights::default();
        let articles = vec![article(7, "The Guardian", 1), article(9, "Unknown", 1)];
        let map = popularity_by_id(&articles, &weights, Utc::now());
        assert_eq!(map.len(), 2);
        assert!(map[&7] > map[&9]);
    }
}
