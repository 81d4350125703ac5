//! Evidence collection with content-hash de-duplication.
//!
//! Each session owns one `EvidenceStore`. The store computes the dedup key
//! (a SHA-256 digest of the excerpt) itself; callers never supply it.
//! Accepted items are optionally mirrored to a similarity index without
//! blocking the caller.

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::warn;
use uuid::Uuid;

use crate::providers::SimilarityIndex;

/// One de-duplicated fact unit with source attribution.
///
/// Immutable after creation; duplicates collapse to the first-written item.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Evidence {
    /// Unique identifier.
    pub id: Uuid,
    /// URL the excerpt came from.
    pub source_url: String,
    /// Title of the source document.
    pub source_title: String,
    /// The extracted text.
    pub excerpt: String,
    /// SHA-256 hex digest of the excerpt — the dedup key.
    pub content_hash: String,
    /// The query that produced this evidence.
    pub origin_query: String,
    /// The iteration the evidence was collected in.
    pub origin_iteration: usize,
}

/// A not-yet-deduplicated evidence candidate.
#[derive(Debug, Clone)]
pub struct EvidenceCandidate {
    pub source_url: String,
    pub source_title: String,
    pub excerpt: String,
    pub origin_query: String,
    pub origin_iteration: usize,
}

/// SHA-256 hex digest of an excerpt, after trimming surrounding whitespace.
pub fn content_hash(excerpt: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(excerpt.trim().as_bytes());
    hex_encode(&hasher.finalize())
}

fn hex_encode(bytes: &[u8]) -> String {
    bytes.iter().map(|b| format!("{b:02x}")).collect()
}

/// Per-session evidence set, unique by content hash.
pub struct EvidenceStore {
    items: Vec<Evidence>,
    by_hash: HashMap<String, usize>,
    index: Option<Arc<dyn SimilarityIndex>>,
}

impl EvidenceStore {
    pub fn new() -> Self {
        Self {
            items: Vec::new(),
            by_hash: HashMap::new(),
            index: None,
        }
    }

    /// A store that mirrors accepted items to a similarity index.
    pub fn with_index(index: Arc<dyn SimilarityIndex>) -> Self {
        Self {
            items: Vec::new(),
            by_hash: HashMap::new(),
            index: Some(index),
        }
    }

    /// Insert a candidate, de-duplicating on the excerpt digest.
    ///
    /// Returns `(true, evidence)` for a newly stored item, or
    /// `(false, existing)` when a matching hash already exists; rejection
    /// is not an error. Accepted items are mirrored to the similarity index
    /// in a spawned task; mirror failures are logged and never affect the
    /// returned value.
    pub fn add(&mut self, candidate: EvidenceCandidate) -> (bool, Evidence) {
        let hash = content_hash(&candidate.excerpt);
        if let Some(&idx) = self.by_hash.get(&hash) {
            return (false, self.items[idx].clone());
        }

        let evidence = Evidence {
            id: Uuid::new_v4(),
            source_url: candidate.source_url,
            source_title: candidate.source_title,
            excerpt: candidate.excerpt,
            content_hash: hash.clone(),
            origin_query: candidate.origin_query,
            origin_iteration: candidate.origin_iteration,
        };
        self.by_hash.insert(hash, self.items.len());
        self.items.push(evidence.clone());
        self.persist_async(&evidence);
        (true, evidence)
    }

    /// All stored evidence, in insertion order.
    pub fn all(&self) -> &[Evidence] {
        &self.items
    }

    /// Number of unique items.
    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Whether an excerpt with this content is already stored.
    pub fn contains_excerpt(&self, excerpt: &str) -> bool {
        self.by_hash.contains_key(&content_hash(excerpt))
    }

    /// Mirror one accepted item to the similarity index without blocking.
    fn persist_async(&self, evidence: &Evidence) {
        let Some(index) = self.index.clone() else {
            return;
        };
        let evidence = evidence.clone();
        tokio::spawn(async move {
            if let Err(e) = index.upsert(&evidence).await {
                warn!(
                    evidence_id = %evidence.id,
                    error = %e,
                    "Failed to mirror evidence to similarity index"
                );
            }
        });
    }
}

impl Default for EvidenceStore {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn candidate(url: &str, excerpt: &str) -> EvidenceCandidate {
        EvidenceCandidate {
            source_url: url.to_string(),
            source_title: "Test Source".to_string(),
            excerpt: excerpt.to_string(),
            origin_query: "test query".to_string(),
            origin_iteration: 1,
        }
    }

    #[test]
    fn test_add_computes_hash() {
        let mut store = EvidenceStore::new();
        let (accepted, evidence) = store.add(candidate("https://a.example", "X"));
        assert!(accepted);
        assert_eq!(evidence.content_hash, content_hash("X"));
        assert_eq!(store.len(), 1);
        assert!(store.contains_excerpt("X"));
    }

    #[test]
    fn test_identical_excerpt_from_different_urls_collapses() {
        let mut store = EvidenceStore::new();
        let (first_accepted, first) = store.add(candidate("https://a.example", "X"));
        let (second_accepted, second) = store.add(candidate("https://b.example", "X"));

        assert!(first_accepted);
        assert!(!second_accepted);
        // Duplicates collapse to the first-written item.
        assert_eq!(second.id, first.id);
        assert_eq!(second.source_url, "https://a.example");
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn test_readd_does_not_change_len() {
        let mut store = EvidenceStore::new();
        store.add(candidate("https://a.example", "finding one"));
        let before = store.len();
        store.add(candidate("https://a.example", "finding one"));
        assert_eq!(store.len(), before);
    }

    #[test]
    fn test_whitespace_differences_still_collapse() {
        let mut store = EvidenceStore::new();
        store.add(candidate("https://a.example", "  finding  "));
        store.add(candidate("https://b.example", "finding"));
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn test_order_independent_dedup() {
        let mut forward = EvidenceStore::new();
        forward.add(candidate("https://a.example", "alpha"));
        forward.add(candidate("https://b.example", "beta"));

        let mut reverse = EvidenceStore::new();
        reverse.add(candidate("https://b.example", "beta"));
        reverse.add(candidate("https://a.example", "alpha"));

        assert_eq!(forward.len(), reverse.len());
    }

    #[test]
    fn test_insertion_order_preserved() {
        let mut store = EvidenceStore::new();
        store.add(candidate("https://a.example", "first"));
        store.add(candidate("https://b.example", "second"));
        let excerpts: Vec<&str> = store.all().iter().map(|e| e.excerpt.as_str()).collect();
        assert_eq!(excerpts, vec!["first", "second"]);
    }
}
