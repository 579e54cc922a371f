//! Tier-anchored story assembly and ordering
//!
//! A story is the ranking-time projection of a dedup cluster (or a
//! singleton article) into a lead article plus ordered supporters. Stories
//! are ordered by a composite story score; pagination slices the ordered
//! story-key list before the expensive full expansion of cluster
//! membership, so only the requested page is expanded.

use std::collections::{HashMap, HashSet};

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::config::{DedupConfig, RankingConfig};
use crate::models::Article;
use crate::ranking::authority::{authority_score, publisher_tier};
use crate::ranking::{popularity_by_id, RankingWeights};
use crate::storage::{ArticleStore, StorageResult};

/// Weights for the story-level score
#[derive(Debug, Clone)]
pub struct StoryWeights {
    pub popularity: f64,
    pub coverage: f64,
    pub reputation: f64,
}

impl Default for StoryWeights {
    fn default() -> Self {
        Self {
            popularity: 0.45,
            coverage: 0.35,
            reputation: 0.20,
        }
    }
}

impl From<&RankingConfig> for StoryWeights {
    fn from(cfg: &RankingConfig) -> Self {
        Self {
            popularity: cfg.weight_popularity,
            coverage: cfg.weight_coverage,
            reputation: cfg.weight_reputation,
        }
    }
}

/// One assembled story: lead first, supporters ordered by tier then recency
#[derive(Debug, Clone, Serialize)]
pub struct RankedStory {
    pub story_key: String,
    pub dedup_cluster_id: Option<i64>,
    pub lead_article: Article,
    pub articles: Vec<Article>,
    pub source_count: usize,
    pub final_score: f64,
}

/// A page of ranked stories; `total` counts all eligible stories
#[derive(Debug, Clone, Serialize)]
pub struct StoryPage {
    pub stories: Vec<RankedStory>,
    pub total: usize,
}

/// Story identity: shared cluster when present, otherwise the article itself
pub fn story_key(article: &Article) -> String {
    match article.dedup_cluster_id {
        Some(cid) => format!("cluster:{cid}"),
        None => format!("article:{}", article.id),
    }
}

/// Coverage in [0, 1]: zero for single-source stories, saturating at ten
pub fn coverage_score(source_count: usize) -> f64 {
    if source_count <= 1 {
        return 0.0;
    }
    ((1.0 + source_count as f64).ln() / (1.0 + 10.0_f64).ln()).min(1.0)
}

fn dedupe_by_id(articles: Vec<Article>) -> Vec<Article> {
    let mut seen = HashSet::new();
    articles
        .into_iter()
        .filter(|a| seen.insert(a.id))
        .collect()
}

/// Millisecond timestamp for ordering; undated sorts last
fn timestamp_key(date: Option<DateTime<Utc>>) -> i64 {
    date.map(|d| d.timestamp_millis()).unwrap_or(i64::MIN)
}

/// Lead preference within the eligible pool: popularity, then recency,
/// then id (deterministic final tie-break)
fn lead_priority(article: &Article, popularity: &HashMap<i64, f64>) -> (f64, i64, i64) {
    (
        popularity
            .get(&article.id)
            .copied()
            .unwrap_or(f64::NEG_INFINITY),
        timestamp_key(article.publishing_date),
        article.id,
    )
}

fn cmp_lead(a: (f64, i64, i64), b: (f64, i64, i64)) -> std::cmp::Ordering {
    a.0.partial_cmp(&b.0)
        .unwrap_or(std::cmp::Ordering::Equal)
        .then(a.1.cmp(&b.1))
        .then(a.2.cmp(&b.2))
}

/// Lead article first, then supporters grouped by tier (1, 2, 3), each
/// tier ordered by publishing date then id, both descending
fn order_story_articles(lead: &Article, members: Vec<Article>) -> Vec<Article> {
    let mut buckets: [Vec<Article>; 3] = [Vec::new(), Vec::new(), Vec::new()];
    for article in dedupe_by_id(members) {
        if article.id == lead.id {
            continue;
        }
        let tier = publisher_tier(&article.publisher) as usize;
        buckets[tier - 1].push(article);
    }
    for bucket in &mut buckets {
        bucket.sort_by_key(|a| (-timestamp_key(a.publishing_date), -a.id));
    }

    let mut ordered = Vec::with_capacity(1 + buckets.iter().map(Vec::len).sum::<usize>());
    ordered.push(lead.clone());
    for bucket in buckets {
        ordered.extend(bucket);
    }
    ordered
}

struct EligibleStory {
    story_key: String,
    lead: Article,
    source_count: usize,
    final_score: f64,
}

/// Build the ordered story-key list from a candidate article set.
///
/// For each story key the *full* current cluster membership is fetched
/// (not just the candidate subset); clusters above `max_cluster_size` are
/// excluded entirely. Returns stories ordered by
/// `(final_score, source_count, lead timestamp, lead id)`, all descending.
fn build_story_ranking(
    store: &ArticleStore,
    candidates: &[Article],
    popularity: &HashMap<i64, f64>,
    story_weights: &StoryWeights,
    max_cluster_size: usize,
) -> StorageResult<Vec<EligibleStory>> {
    let mut candidates_by_key: HashMap<String, Vec<&Article>> = HashMap::new();
    // Insertion order of keys, for deterministic iteration
    let mut key_order: Vec<String> = Vec::new();

    for article in candidates {
        let key = story_key(article);
        if !candidates_by_key.contains_key(&key) {
            key_order.push(key.clone());
        }
        candidates_by_key.entry(key).or_default().push(article);
    }

    let mut stories = Vec::new();

    for key in key_order {
        let story_candidates = &candidates_by_key[&key];
        let cluster_id = story_candidates[0].dedup_cluster_id;

        let members: Vec<Article> = match cluster_id {
            Some(cid) => dedupe_by_id(store.cluster_members(cid)?),
            None => story_candidates.iter().map(|a| (*a).clone()).collect(),
        };
        if members.is_empty() {
            continue;
        }

        // Runaway transitive-chain clusters are excluded, not demoted
        if members.len() > max_cluster_size {
            continue;
        }

        // Lead pool: Tier 1 if any, else Tier 2, else anyone
        let tier_of = |a: &Article| publisher_tier(&a.publisher);
        let tier1: Vec<&Article> = members.iter().filter(|a| tier_of(a) == 1).collect();
        let tier2: Vec<&Article> = members.iter().filter(|a| tier_of(a) == 2).collect();
        let pool: Vec<&Article> = if !tier1.is_empty() {
            tier1
        } else if !tier2.is_empty() {
            tier2
        } else {
            members.iter().collect()
        };

        let lead = pool
            .into_iter()
            .max_by(|a, b| cmp_lead(lead_priority(a, popularity), lead_priority(b, popularity)))
            .cloned();
        let Some(lead) = lead else { continue };

        // Popularity fallback: lead's own score, else the best score among
        // the candidate-set members of this story, else 0.0
        let lead_popularity = popularity
            .get(&lead.id)
            .copied()
            .or_else(|| {
                story_candidates
                    .iter()
                    .filter_map(|a| popularity.get(&a.id).copied())
                    .max_by(|x, y| x.partial_cmp(y).unwrap_or(std::cmp::Ordering::Equal))
            })
            .unwrap_or(0.0);

        let source_count = members.len();
        let final_score = story_weights.popularity * lead_popularity
            + story_weights.coverage * coverage_score(source_count)
            + story_weights.reputation * authority_score(&lead.publisher);

        stories.push(EligibleStory {
            story_key: key,
            lead,
            source_count,
            final_score,
        });
    }

    stories.sort_by(|a, b| {
        b.final_score
            .partial_cmp(&a.final_score)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then(b.source_count.cmp(&a.source_count))
            .then(
                timestamp_key(b.lead.publishing_date)
                    .cmp(&timestamp_key(a.lead.publishing_date)),
            )
            .then(b.lead.id.cmp(&a.lead.id))
    });

    Ok(stories)
}

/// Expand the selected story keys into full stories (lead + supporters)
fn expand_stories(
    store: &ArticleStore,
    selected: Vec<EligibleStory>,
) -> StorageResult<Vec<RankedStory>> {
    let mut stories = Vec::with_capacity(selected.len());

    for eligible in selected {
        let cluster_id = eligible.lead.dedup_cluster_id;
        let articles = match cluster_id {
            Some(cid) => {
                let members = store.cluster_members(cid)?;
                if members.is_empty() {
                    vec![eligible.lead.clone()]
                } else {
                    order_story_articles(&eligible.lead, members)
                }
            }
            None => vec![eligible.lead.clone()],
        };

        stories.push(RankedStory {
            story_key: eligible.story_key,
            dedup_cluster_id: cluster_id,
            lead_article: eligible.lead,
            articles,
            source_count: eligible.source_count,
            final_score: eligible.final_score,
        });
    }

    Ok(stories)
}

/// Ranked, paginated story feed.
///
/// Candidate selection is recency-bounded (`candidate_limit` most recent
/// articles) plus one representative per large cluster, so big stories
/// surface regardless of recency. When a category filter is active,
/// stories whose lead mismatches it are dropped after assembly (cluster
/// expansion can pull in cross-category leads).
pub fn ranked_stories(
    store: &ArticleStore,
    ranking: &RankingConfig,
    dedup: &DedupConfig,
    page: usize,
    page_size: usize,
    category: Option<&str>,
) -> StorageResult<StoryPage> {
    let page = page.max(1);

    let mut candidates = store.recent_articles(ranking.candidate_limit)?;
    candidates.extend(store.cluster_representatives(3, dedup.max_cluster_size, 50)?);
    let candidates = dedupe_by_id(candidates);

    if candidates.is_empty() {
        return Ok(StoryPage {
            stories: Vec::new(),
            total: 0,
        });
    }

    let weights = RankingWeights::from(ranking);
    let popularity = popularity_by_id(&candidates, &weights, Utc::now());
    let story_weights = StoryWeights::from(ranking);

    let mut ordered = build_story_ranking(
        store,
        &candidates,
        &popularity,
        &story_weights,
        dedup.max_cluster_size,
    )?;

    if let Some(category) = category {
        ordered.retain(|s| s.lead.category.as_deref() == Some(category));
    }

    let total = ordered.len();
    let offset = (page - 1) * page_size;
    let window: Vec<EligibleStory> = ordered
        .into_iter()
        .skip(offset)
        .take(page_size)
        .collect();

    let stories = expand_stories(store, window)?;
    Ok(StoryPage { stories, total })
}

/// Ranked, diversified flat article feed.
///
/// Composite-scores the recency-bounded candidate pool, then applies MMR
/// over embeddings with the same-cluster exemption. Returns the requested
/// page and the candidate pool size.
pub fn ranked_articles(
    store: &ArticleStore,
    ranking: &RankingConfig,
    page: usize,
    page_size: usize,
) -> StorageResult<(Vec<Article>, usize)> {
    let page = page.max(1);

    let candidates: Vec<Article> = store
        .recent_articles(ranking.candidate_limit)?
        .into_iter()
        .filter(|a| a.embedding.is_some())
        .collect();
    if candidates.is_empty() {
        return Ok((Vec::new(), 0));
    }

    let weights = RankingWeights::from(ranking);
    let scores = super::composite_scores(&candidates, &weights, Utc::now());
    let embeddings: Vec<Vec<f32>> = candidates
        .iter()
        .map(|a| a.embedding.clone().unwrap_or_default())
        .collect();
    let cluster_ids: Vec<Option<i64>> = candidates.iter().map(|a| a.dedup_cluster_id).collect();

    let offset = (page - 1) * page_size;
    let order = super::mmr::mmr_rerank(
        &scores,
        &embeddings,
        &cluster_ids,
        page_size,
        offset,
        ranking.mmr_lambda,
    );

    let total = candidates.len();
    let picked = order.into_iter().map(|i| candidates[i].clone()).collect();
    Ok((picked, total))
}
