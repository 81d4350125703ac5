//! In-memory similarity index over evidence.
//!
//! Uses a hash-bucketed bag-of-words embedding rather than an external
//! embedding model: each word is hashed to a dimension, term frequency is
//! accumulated, and the vector is L2-normalised. Good enough for
//! near-duplicate retrieval; swap in a real index behind the same trait
//! for anything heavier.

use async_trait::async_trait;
use std::collections::HashMap;
use tokio::sync::RwLock;

use crate::error::ProviderError;
use crate::providers::SimilarityIndex;
use crate::research::evidence::Evidence;

/// A minimal bag-of-words embedder using term frequency.
#[derive(Debug, Clone)]
pub struct SimpleEmbedder {
    dimensions: usize,
}

impl SimpleEmbedder {
    pub fn new(dimensions: usize) -> Self {
        Self { dimensions }
    }

    /// Generate an L2-normalised embedding from text.
    pub fn embed(&self, text: &str) -> Vec<f32> {
        let mut vector = vec![0.0f32; self.dimensions];

        let lowered = text.to_lowercase();
        let words: Vec<&str> = lowered
            .split(|c: char| !c.is_alphanumeric())
            .filter(|w| !w.is_empty())
            .collect();
        if words.is_empty() {
            return vector;
        }

        let mut tf: HashMap<&str, usize> = HashMap::new();
        for word in &words {
            *tf.entry(word).or_insert(0) += 1;
        }
        for (term, count) in &tf {
            let idx = simple_hash(term) % self.dimensions;
            vector[idx] += *count as f32;
        }

        let norm: f32 = vector.iter().map(|x| x * x).sum::<f32>().sqrt();
        if norm > 0.0 {
            for v in &mut vector {
                *v /= norm;
            }
        }
        vector
    }
}

/// FNV-1a over the term bytes.
fn simple_hash(term: &str) -> usize {
    let mut hash: u64 = 0xcbf29ce484222325;
    for byte in term.bytes() {
        hash ^= byte as u64;
        hash = hash.wrapping_mul(0x100000001b3);
    }
    hash as usize
}

fn cosine(a: &[f32], b: &[f32]) -> f32 {
    // Vectors are already normalised, so the dot product is the cosine.
    a.iter().zip(b.iter()).map(|(x, y)| x * y).sum()
}

/// In-memory cosine-similarity index implementing [`SimilarityIndex`].
pub struct InMemoryIndex {
    embedder: SimpleEmbedder,
    entries: RwLock<Vec<(Vec<f32>, Evidence)>>,
}

impl InMemoryIndex {
    pub fn new(dimensions: usize) -> Self {
        Self {
            embedder: SimpleEmbedder::new(dimensions),
            entries: RwLock::new(Vec::new()),
        }
    }

    pub async fn len(&self) -> usize {
        self.entries.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.entries.read().await.is_empty()
    }
}

impl Default for InMemoryIndex {
    fn default() -> Self {
        Self::new(128)
    }
}

#[async_trait]
impl SimilarityIndex for InMemoryIndex {
    async fn upsert(&self, evidence: &Evidence) -> Result<(), ProviderError> {
        let vector = self.embedder.embed(&evidence.excerpt);
        let mut entries = self.entries.write().await;
        if let Some(entry) = entries
            .iter_mut()
            .find(|(_, e)| e.content_hash == evidence.content_hash)
        {
            entry.1 = evidence.clone();
        } else {
            entries.push((vector, evidence.clone()));
        }
        Ok(())
    }

    async fn query(&self, text: &str, limit: usize) -> Result<Vec<Evidence>, ProviderError> {
        let probe = self.embedder.embed(text);
        let entries = self.entries.read().await;

        let mut scored: Vec<(f32, &Evidence)> = entries
            .iter()
            .map(|(vector, evidence)| (cosine(&probe, vector), evidence))
            .collect();
        scored.sort_by(|a, b| b.0.partial_cmp(&a.0).unwrap_or(std::cmp::Ordering::Equal));

        Ok(scored
            .into_iter()
            .take(limit)
            .map(|(_, e)| e.clone())
            .collect())
    }
}
