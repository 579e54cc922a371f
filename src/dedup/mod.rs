//! Near-duplicate clustering over article embeddings
//!
//! Two entry points:
//! - [`run_dedup`]: incremental pass over newly embedded articles. Each new
//!   article is compared against the full corpus (an N_new x N_total matrix,
//!   not N_total^2) and merged into the clusters of its neighbors.
//! - [`run_full_dedup`]: full recompute via connected components of the
//!   similarity graph; clears all prior assignments first and is idempotent.
//!
//! Cluster invariants:
//! - cluster id = minimum article id ever assigned to the cluster (the
//!   anchor is stable under merges)
//! - singletons carry a NULL cluster id
//! - no cluster exceeds `max_cluster_size`; oversized clusters are frozen
//!   and a merge that would exceed the cap is rejected entirely

use std::collections::{HashMap, HashSet};

use tracing::{debug, info, warn};

use crate::config::DedupConfig;
use crate::embedding::cosine_similarity;
use crate::metrics;
use crate::storage::{ArticleStore, StorageError, StorageResult};
use crate::utils::retry::{retry_on_conflict, RetryConfig};

/// In-memory view of the embedded corpus, rebuilt per invocation
struct CorpusView {
    /// (article id, embedding) ordered by id
    entries: Vec<(i64, Vec<f32>)>,
    /// article id -> current cluster id
    cluster_of: HashMap<i64, i64>,
    /// cluster id -> member ids
    members_of: HashMap<i64, Vec<i64>>,
}

impl CorpusView {
    fn load(store: &ArticleStore) -> StorageResult<Self> {
        let rows = store.embedded_articles()?;
        let mut entries = Vec::with_capacity(rows.len());
        let mut cluster_of = HashMap::new();
        let mut members_of: HashMap<i64, Vec<i64>> = HashMap::new();

        for (id, embedding, cluster_id) in rows {
            entries.push((id, embedding));
            if let Some(cid) = cluster_id {
                cluster_of.insert(id, cid);
                members_of.entry(cid).or_default().push(id);
            }
        }

        Ok(Self {
            entries,
            cluster_of,
            members_of,
        })
    }

    fn cluster_size(&self, cluster_id: i64) -> usize {
        self.members_of.get(&cluster_id).map_or(0, Vec::len)
    }

    fn assign(&mut self, article_id: i64, cluster_id: i64) {
        if let Some(old) = self.cluster_of.insert(article_id, cluster_id) {
            if let Some(members) = self.members_of.get_mut(&old) {
                members.retain(|id| *id != article_id);
            }
        }
        self.members_of.entry(cluster_id).or_default().push(article_id);
    }

    fn merge(&mut self, old: i64, new: i64) -> Vec<i64> {
        let moved = self.members_of.remove(&old).unwrap_or_default();
        for id in &moved {
            self.cluster_of.insert(*id, new);
        }
        self.members_of.entry(new).or_default().extend(moved.iter().copied());
        moved
    }
}

/// Incremental dedup over newly embedded articles.
///
/// Returns the number of articles whose cluster assignment changed.
/// Write conflicts are retried with bounded backoff, then propagated.
pub fn run_dedup(
    store: &ArticleStore,
    new_ids: &[i64],
    cfg: &DedupConfig,
) -> StorageResult<usize> {
    let mut corpus = CorpusView::load(store)?;
    let embedding_of: HashMap<i64, usize> = corpus
        .entries
        .iter()
        .enumerate()
        .map(|(idx, (id, _))| (*id, idx))
        .collect();

    // Ascending id order keeps reruns deterministic
    let mut pending: Vec<i64> = new_ids
        .iter()
        .copied()
        .filter(|id| embedding_of.contains_key(id))
        .collect();
    pending.sort_unstable();
    pending.dedup();

    let retry = RetryConfig::default();
    let mut changed: HashSet<i64> = HashSet::new();
    let mut merges = 0u64;

    for article_id in pending {
        let idx = embedding_of[&article_id];

        // Neighbors at or above the threshold, ties included
        let mut neighbors = Vec::new();
        for (other_id, other_vec) in &corpus.entries {
            if *other_id == article_id {
                continue;
            }
            let sim = cosine_similarity(&corpus.entries[idx].1, other_vec);
            if sim >= cfg.threshold {
                neighbors.push(*other_id);
            }
        }

        // Oversized clusters are transitive-chain artifacts; freeze them
        neighbors.retain(|id| match corpus.cluster_of.get(id) {
            Some(cid) => corpus.cluster_size(*cid) < cfg.max_cluster_size,
            None => true,
        });

        if neighbors.is_empty() {
            continue;
        }

        let mut group: Vec<i64> = neighbors.clone();
        group.push(article_id);

        // Existing clusters touched by the group
        let touched: HashSet<i64> = group
            .iter()
            .filter_map(|id| corpus.cluster_of.get(id).copied())
            .collect();

        // Whole-group cap check: combined membership of touched clusters
        // plus ungrouped members must fit under the cap
        let ungrouped: Vec<i64> = group
            .iter()
            .copied()
            .filter(|id| !corpus.cluster_of.contains_key(id))
            .collect();
        let combined: usize = touched
            .iter()
            .map(|cid| corpus.cluster_size(*cid))
            .sum::<usize>()
            + ungrouped.len();
        if combined > cfg.max_cluster_size {
            debug!(article_id, combined, "merge rejected, would exceed cluster cap");
            continue;
        }

        // Stable anchor: lowest touched cluster id, else lowest article id
        let target = touched
            .iter()
            .copied()
            .min()
            .unwrap_or_else(|| group.iter().copied().min().unwrap_or(article_id));

        // Assign ungrouped members, then merge the other clusters wholesale
        let assignments: Vec<(i64, Option<i64>)> =
            ungrouped.iter().map(|id| (*id, Some(target))).collect();
        let absorbed: Vec<i64> = touched.into_iter().filter(|cid| *cid != target).collect();

        retry_on_conflict(&retry, || {
            store.set_cluster_ids(&assignments)?;
            for old in &absorbed {
                store.reassign_cluster(*old, target)?;
            }
            Ok(())
        })?;

        for (id, _) in &assignments {
            corpus.assign(*id, target);
            changed.insert(*id);
        }
        for old in &absorbed {
            let moved = corpus.merge(*old, target);
            changed.extend(moved);
            merges += 1;
        }
    }

    info!(changed = changed.len(), merges, "incremental dedup finished");
    metrics::record_dedup_results(changed.len() as u64, merges);
    Ok(changed.len())
}

/// Full recompute: connected components of the similarity graph.
///
/// Clears all prior assignments first; components of size >= 2 get the
/// minimum member id as their cluster id, singletons stay NULL. Idempotent.
pub fn run_full_dedup(store: &ArticleStore, cfg: &DedupConfig) -> StorageResult<usize> {
    let before: HashMap<i64, Option<i64>> = store
        .embedded_articles()?
        .into_iter()
        .map(|(id, _, cid)| (id, cid))
        .collect();

    let retry = RetryConfig::default();
    retry_on_conflict(&retry, || store.clear_cluster_ids())?;

    let entries: Vec<(i64, Vec<f32>)> = store
        .embedded_articles()?
        .into_iter()
        .map(|(id, v, _)| (id, v))
        .collect();
    let n = entries.len();

    // Adjacency at the threshold
    let mut adjacent: Vec<Vec<usize>> = vec![Vec::new(); n];
    for i in 0..n {
        for j in (i + 1)..n {
            if cosine_similarity(&entries[i].1, &entries[j].1) >= cfg.threshold {
                adjacent[i].push(j);
                adjacent[j].push(i);
            }
        }
    }

    // Depth-first component traversal
    let mut visited = vec![false; n];
    let mut assignments: Vec<(i64, Option<i64>)> = Vec::new();
    let mut clusters = 0usize;

    for start in 0..n {
        if visited[start] {
            continue;
        }
        let mut component = Vec::new();
        let mut stack = vec![start];
        visited[start] = true;
        while let Some(node) = stack.pop() {
            component.push(node);
            for &next in &adjacent[node] {
                if !visited[next] {
                    visited[next] = true;
                    stack.push(next);
                }
            }
        }

        if component.len() < 2 {
            continue;
        }
        clusters += 1;
        let anchor = component
            .iter()
            .map(|&idx| entries[idx].0)
            .min()
            .unwrap_or(entries[component[0]].0);
        if component.len() > cfg.max_cluster_size {
            warn!(
                anchor,
                size = component.len(),
                "component exceeds cluster cap"
            );
        }
        for &idx in &component {
            assignments.push((entries[idx].0, Some(anchor)));
        }
    }

    retry_on_conflict(&retry, || store.set_cluster_ids(&assignments))?;

    let after: HashMap<i64, Option<i64>> = {
        let mut map: HashMap<i64, Option<i64>> =
            entries.iter().map(|(id, _)| (*id, None)).collect();
        for (id, cid) in &assignments {
            map.insert(*id, *cid);
        }
        map
    };
    let changed = after
        .iter()
        .filter(|(id, cid)| before.get(*id) != Some(cid))
        .count();

    info!(clusters, changed, "full dedup recompute finished");
    metrics::record_dedup_results(changed as u64, 0);
    Ok(changed)
}

/// Convenience: run the incremental pass over every embedded article,
/// used by operators bootstrapping a corpus.
pub fn run_dedup_all(store: &ArticleStore, cfg: &DedupConfig) -> Result<usize, StorageError> {
    let ids: Vec<i64> = store
        .embedded_articles()?
        .into_iter()
        .map(|(id, _, _)| id)
        .collect();
    run_dedup(store, &ids, cfg)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::embedding::normalize;
    use crate::models::ArticleCandidate;

    fn store_with_embeddings(vectors: &[Vec<f32>]) -> (ArticleStore, Vec<i64>) {
        let store = ArticleStore::in_memory().unwrap();
        let mut ids = Vec::new();
        for (i, v) in vectors.iter().enumerate() {
            let id = store
                .insert_if_absent(&ArticleCandidate {
                    url: format!("https://e.com/{i}"),
                    title: format!("Article {i}"),
                    body: "body".into(),
                    publisher: "ap_news".into(),
                    ..Default::default()
                })
                .unwrap()
                .unwrap();
            let mut vector = v.clone();
            normalize(&mut vector);
            store.set_embeddings(&[(id, vector)]).unwrap();
            ids.push(id);
        }
        (store, ids)
    }

    fn cfg(threshold: f32) -> DedupConfig {
        DedupConfig {
            threshold,
            max_cluster_size: 200,
        }
    }

    #[test]
    fn test_transitive_cluster_formation() {
        // Pairwise sims: (a,b)=0.80, (b,c)=0.80, (a,c)=0.269. At threshold
        // 0.75 the chain still forms one 3-member cluster transitively.
        let (store, ids) = store_with_embeddings(&[
            vec![1.0, 0.0],
            vec![0.8, 0.6],
            vec![0.28, 0.96],
        ]);

        let changed = run_dedup(&store, &ids, &cfg(0.75)).unwrap();
        assert_eq!(changed, 3);

        let clusters: Vec<Option<i64>> = ids
            .iter()
            .map(|id| store.get_article(*id).unwrap().unwrap().dedup_cluster_id)
            .collect();
        assert_eq!(clusters[0], Some(ids[0]));
        assert_eq!(clusters[1], Some(ids[0]));
        assert_eq!(clusters[2], Some(ids[0]));
    }

    #[test]
    fn test_below_threshold_stays_singleton() {
        let (store, ids) = store_with_embeddings(&[vec![1.0, 0.0], vec![0.0, 1.0]]);
        let changed = run_dedup(&store, &ids, &cfg(0.5)).unwrap();
        assert_eq!(changed, 0);
        for id in &ids {
            assert!(store.get_article(*id).unwrap().unwrap().dedup_cluster_id.is_none());
        }
    }

    #[test]
    fn test_anchor_is_min_id_under_merge() {
        // Two existing clusters bridged by a new article: the surviving id
        // must be the minimum across both clusters.
        let (store, ids) = store_with_embeddings(&[
            vec![1.0, 0.0],
            vec![1.0, 0.05],
            vec![0.0, 1.0],
            vec![0.05, 1.0],
            vec![0.7, 0.7],
        ]);

        // Seed two clusters by hand
        store
            .set_cluster_ids(&[
                (ids[0], Some(ids[0])),
                (ids[1], Some(ids[0])),
                (ids[2], Some(ids[2])),
                (ids[3], Some(ids[2])),
            ])
            .unwrap();

        // The bridge article is similar to members of both clusters
        let changed = run_dedup(&store, &[ids[4]], &cfg(0.65)).unwrap();
        assert!(changed >= 3);

        for id in &ids {
            assert_eq!(
                store.get_article(*id).unwrap().unwrap().dedup_cluster_id,
                Some(ids[0])
            );
        }
    }

    #[test]
    fn test_cluster_cap_rejects_whole_merge() {
        let (store, ids) = store_with_embeddings(&[
            vec![1.0, 0.0],
            vec![1.0, 0.01],
            vec![1.0, 0.02],
        ]);

        let small = DedupConfig {
            threshold: 0.9,
            max_cluster_size: 2,
        };

        // First pass clusters two; seed that state directly for clarity
        store
            .set_cluster_ids(&[(ids[0], Some(ids[0])), (ids[1], Some(ids[0]))])
            .unwrap();

        // Third article matches both members, but their cluster already sits
        // at the cap and is frozen. Nothing changes.
        let changed = run_dedup(&store, &[ids[2]], &small).unwrap();
        assert_eq!(changed, 0);
        assert!(store.get_article(ids[2]).unwrap().unwrap().dedup_cluster_id.is_none());
        assert_eq!(store.cluster_members(ids[0]).unwrap().len(), 2);
    }

    #[test]
    fn test_whole_group_cap_check_rejects_merge() {
        // Three mutually similar singletons with cap 2: the combined group
        // of 3 exceeds the cap, so the merge is rejected entirely, not
        // partially applied.
        let (store, ids) = store_with_embeddings(&[
            vec![1.0, 0.0],
            vec![1.0, 0.01],
            vec![1.0, 0.02],
        ]);

        let small = DedupConfig {
            threshold: 0.9,
            max_cluster_size: 2,
        };

        let changed = run_dedup(&store, &[ids[2]], &small).unwrap();
        assert_eq!(changed, 0);
        for id in &ids {
            assert!(store.get_article(*id).unwrap().unwrap().dedup_cluster_id.is_none());
        }
    }

    #[test]
    fn test_incremental_rerun_is_stable() {
        let (store, ids) = store_with_embeddings(&[vec![1.0, 0.0], vec![0.99, 0.1]]);
        run_dedup(&store, &ids, &cfg(0.8)).unwrap();
        let changed_again = run_dedup(&store, &ids, &cfg(0.8)).unwrap();
        assert_eq!(changed_again, 0);
    }

    #[test]
    fn test_full_recompute_matches_example() {
        let (store, ids) = store_with_embeddings(&[
            vec![1.0, 0.0],
            vec![0.8, 0.6],
            vec![0.28, 0.96],
            vec![-1.0, 0.0],
        ]);

        let changed = run_full_dedup(&store, &cfg(0.75)).unwrap();
        assert_eq!(changed, 3);

        assert_eq!(
            store.get_article(ids[0]).unwrap().unwrap().dedup_cluster_id,
            Some(ids[0])
        );
        assert!(store.get_article(ids[3]).unwrap().unwrap().dedup_cluster_id.is_none());

        // Idempotent on re-run
        let changed_again = run_full_dedup(&store, &cfg(0.75)).unwrap();
        assert_eq!(changed_again, 0);
    }

    #[test]
    fn test_articles_without_embeddings_are_ignored() {
        let store = ArticleStore::in_memory().unwrap();
        let id = store
            .insert_if_absent(&ArticleCandidate {
                url: "https://e.com/raw".into(),
                title: "No embedding yet".into(),
                body: "body".into(),
                publisher: "ap_news".into(),
                ..Default::default()
            })
            .unwrap()
            .unwrap();

        let changed = run_dedup(&store, &[id], &cfg(0.5)).unwrap();
        assert_eq!(changed, 0);
    }
}
