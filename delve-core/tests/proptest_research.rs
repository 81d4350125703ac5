//! Property tests for the research data model.

use proptest::prelude::*;

use delve_core::CompletionLevel;
use delve_core::research::evidence::{EvidenceCandidate, EvidenceStore, content_hash};

fn candidate(url: &str, excerpt: &str) -> EvidenceCandidate {
    EvidenceCandidate {
        source_url: url.to_string(),
        source_title: "t".to_string(),
        excerpt: excerpt.to_string(),
        origin_query: "q".to_string(),
        origin_iteration: 1,
    }
}

proptest! {
    /// Re-deriving the level from any score matches the threshold table.
    #[test]
    fn level_matches_thresholds(score in 0.0f64..=1.0) {
        let level = CompletionLevel::from_score(score);
        let expected = if score >= 0.85 {
            CompletionLevel::Comprehensive
        } else if score >= 0.70 {
            CompletionLevel::Adequate
        } else if score >= 0.40 {
            CompletionLevel::Partial
        } else {
            CompletionLevel::Insufficient
        };
        prop_assert_eq!(level, expected);
    }

    /// Hashing the same excerpt is deterministic and trim-insensitive.
    #[test]
    fn content_hash_is_deterministic(excerpt in ".{0,200}") {
        prop_assert_eq!(content_hash(&excerpt), content_hash(&excerpt));
        prop_assert_eq!(content_hash(&excerpt), content_hash(excerpt.trim()));
    }

    /// Re-adding an already-stored excerpt never grows the store.
    #[test]
    fn store_readd_never_grows(excerpts in proptest::collection::vec(".{1,80}", 1..20)) {
        let mut store = EvidenceStore::new();
        for (i, excerpt) in excerpts.iter().enumerate() {
            store.add(candidate(&format!("https://s{i}.example"), excerpt));
        }
        let len = store.len();
        for excerpt in &excerpts {
            let (accepted, _) = store.add(candidate("https://other.example", excerpt));
            prop_assert!(!accepted);
        }
        prop_assert_eq!(store.len(), len);
    }

    /// The store holds exactly one item per distinct trimmed excerpt.
    #[test]
    fn store_len_counts_unique_excerpts(excerpts in proptest::collection::vec(".{1,80}", 1..20)) {
        let mut store = EvidenceStore::new();
        for excerpt in &excerpts {
            store.add(candidate("https://a.example", excerpt));
        }
        let unique: std::collections::HashSet<String> =
            excerpts.iter().map(|e| content_hash(e)).collect();
        prop_assert_eq!(store.len(), unique.len());
    }
}
