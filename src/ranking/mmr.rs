//! Maximal-marginal-relevance diversification
//!
//! Greedy re-ranking that balances relevance against redundancy for flat
//! article lists. Similarity between two articles sharing a dedup cluster
//! is zeroed: same-story coverage from different publishers is signal, not
//! redundancy.
//!
//! The O(n^2) similarity matrix is recomputed per call; n is bounded by the
//! upstream candidate limit.

use crate::embedding::cosine_similarity;

/// Greedily select `offset + page_size` indices maximizing
/// `lambda * score - (1 - lambda) * max_similarity_to_selected`,
/// then return the slice starting at `offset`.
///
/// `scores`, `embeddings`, and `cluster_ids` are parallel arrays.
pub fn mmr_rerank(
    scores: &[f64],
    embeddings: &[Vec<f32>],
    cluster_ids: &[Option<i64>],
    page_size: usize,
    offset: usize,
    lambda: f64,
) -> Vec<usize> {
    let n = scores.len();
    if n == 0 {
        return Vec::new();
    }
    debug_assert_eq!(embeddings.len(), n);
    debug_assert_eq!(cluster_ids.len(), n);

    let k = (offset + page_size).min(n);

    // Pairwise similarity with the same-cluster exemption
    let mut sim = vec![vec![0.0f64; n]; n];
    for i in 0..n {
        for j in (i + 1)..n {
            let same_cluster = match (cluster_ids[i], cluster_ids[j]) {
                (Some(a), Some(b)) => a == b,
                _ => false,
            };
            let value = if same_cluster {
                0.0
            } else {
                cosine_similarity(&embeddings[i], &embeddings[j]) as f64
            };
            sim[i][j] = value;
            sim[j][i] = value;
        }
    }

    // Normalize relevance scores to [0, 1]
    let score_min = scores.iter().copied().fold(f64::INFINITY, f64::min);
    let score_max = scores.iter().copied().fold(f64::NEG_INFINITY, f64::max);
    let norm_scores: Vec<f64> = if score_max > score_min {
        scores
            .iter()
            .map(|s| (s - score_min) / (score_max - score_min))
            .collect()
    } else {
        vec![1.0; n]
    };

    let mut selected: Vec<usize> = Vec::with_capacity(k);
    let mut remaining: Vec<bool> = vec![true; n];
    let mut max_sim_to_selected = vec![f64::NEG_INFINITY; n];

    for _ in 0..k {
        let mut best_idx = None;
        let mut best_val = f64::NEG_INFINITY;

        for idx in 0..n {
            if !remaining[idx] {
                continue;
            }
            let penalty = if selected.is_empty() {
                0.0
            } else {
                max_sim_to_selected[idx].max(0.0)
            };
            let val = lambda * norm_scores[idx] - (1.0 - lambda) * penalty;
            if val > best_val {
                best_val = val;
                best_idx = Some(idx);
            }
        }

        let Some(idx) = best_idx else { break };
        selected.push(idx);
        remaining[idx] = false;

        for other in 0..n {
            if sim[idx][other] > max_sim_to_selected[other] {
                max_sim_to_selected[other] = sim[idx][other];
            }
        }
    }

    selected.split_off(offset.min(selected.len()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_input() {
        assert!(mmr_rerank(&[], &[], &[], 10, 0, 0.3).is_empty());
    }

    #[test]
    fn test_highest_score_selected_first() {
        let scores = vec![0.2, 0.9, 0.5];
        let embeddings = vec![vec![1.0, 0.0], vec![0.0, 1.0], vec![0.7, 0.7]];
        let clusters = vec![None, None, None];

        let order = mmr_rerank(&scores, &embeddings, &clusters, 3, 0, 0.5);
        assert_eq!(order[0], 1);
    }

    #[test]
    fn test_redundant_item_demoted() {
        // Items 0 and 1 are near-identical; item 2 is orthogonal with a
        // lower score. Diversification should interleave 2 before 1.
        let scores = vec![1.0, 0.95, 0.5];
        let embeddings = vec![vec![1.0, 0.0], vec![0.999, 0.045], vec![0.0, 1.0]];
        let clusters = vec![None, None, None];

        let order = mmr_rerank(&scores, &embeddings, &clusters, 3, 0, 0.5);
        assert_eq!(order, vec![0, 2, 1]);
    }

    #[test]
    fn test_same_cluster_exemption() {
        // Identical embeddings, but shared cluster id: no redundancy
        // penalty, so pure score order wins.
        let scores = vec![1.0, 0.95, 0.5];
        let embeddings = vec![vec![1.0, 0.0], vec![1.0, 0.0], vec![0.0, 1.0]];
        let clusters = vec![Some(1), Some(1), None];

        let order = mmr_rerank(&scores, &embeddings, &clusters, 3, 0, 0.5);
        assert_eq!(order, vec![0, 1, 2]);
    }

    #[test]
    fn test_offset_slice() {
        let scores = vec![0.9, 0.6, 0.3];
        let embeddings = vec![vec![1.0, 0.0], vec![0.0, 1.0], vec![0.5, 0.5]];
        let clusters = vec![None, None, None];

        let full = mmr_rerank(&scores, &embeddings, &clusters, 3, 0, 1.0);
        let tail = mmr_rerank(&scores, &embeddings, &clusters, 2, 1, 1.0);
        assert_eq!(tail, full[1..].to_vec());
    }

    #[test]
    fn test_uniform_scores_normalize_to_one() {
        let scores = vec![0.4, 0.4];
        let embeddings = vec![vec![1.0, 0.0], vec![0.0, 1.0]];
        let clusters = vec![None, None];

        let order = mmr_rerank(&scores, &embeddings, &clusters, 2, 0, 0.3);
        assert_eq!(order.len(), 2);
    }
}
