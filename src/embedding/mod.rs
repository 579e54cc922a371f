//! Text embedding for near-duplicate detection
//!
//! The dedup engine only requires an opaque `text -> unit-norm vector`
//! collaborator, expressed here as the [`Embedder`] trait. [`HashEmbedder`]
//! is the default local implementation: hashed character n-grams projected
//! into a fixed-dimension space and L2-normalized. It is deterministic and
//! needs no model service, which keeps scheduled cycles and tests hermetic.
//! A model-backed embedder can be injected anywhere an `Embedder` is taken.

use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};

/// Opaque embedding collaborator: `text -> unit-norm vector[dim]`
pub trait Embedder: Send + Sync {
    /// Output dimension of every vector this embedder produces
    fn dim(&self) -> usize;

    /// Embed one text into a unit-norm vector
    fn embed(&self, text: &str) -> Vec<f32>;

    /// Embed a batch of texts; default implementation maps `embed`
    fn embed_batch(&self, texts: &[String]) -> Vec<Vec<f32>> {
        texts.iter().map(|t| self.embed(t)).collect()
    }
}

/// Deterministic hashed character n-gram embedder
#[derive(Debug, Clone)]
pub struct HashEmbedder {
    dim: usize,
    ngram: usize,
}

impl HashEmbedder {
    pub fn new(dim: usize) -> Self {
        Self { dim, ngram: 3 }
    }
}

impl Default for HashEmbedder {
    fn default() -> Self {
        Self::new(256)
    }
}

impl Embedder for HashEmbedder {
    fn dim(&self) -> usize {
        self.dim
    }

    fn embed(&self, text: &str) -> Vec<f32> {
        let mut vector = vec![0.0f32; self.dim];

        let chars: Vec<char> = text
            .to_lowercase()
            .chars()
            .filter(|c| c.is_alphanumeric() || c.is_whitespace())
            .collect();

        if chars.len() >= self.ngram {
            for window in chars.windows(self.ngram) {
                let mut hasher = DefaultHasher::new();
                window.hash(&mut hasher);
                let h = hasher.finish();
                let bucket = (h % self.dim as u64) as usize;
                // Sign bit decorrelates buckets that collide
                let sign = if (h >> 63) == 0 { 1.0 } else { -1.0 };
                vector[bucket] += sign;
            }
        }

        normalize(&mut vector);
        vector
    }
}

/// L2-normalize in place; zero vectors stay zero
pub fn normalize(vector: &mut [f32]) {
    let norm: f32 = vector.iter().map(|v| v * v).sum::<f32>().sqrt();
    if norm > f32::EPSILON {
        for v in vector.iter_mut() {
            *v /= norm;
        }
    }
}

/// Dot product; equals cosine similarity for unit-norm inputs
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    debug_assert_eq!(a.len(), b.len());
    a.iter().zip(b.iter()).map(|(x, y)| x * y).sum()
}
