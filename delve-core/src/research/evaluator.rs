//! Completion scoring and gap analysis.
//!
//! The evaluator judges how fully the accumulated evidence answers the
//! original query, names what is missing, and turns the gaps into follow-up
//! queries. It sits behind a trait so a rule-based implementation and a
//! model-backed one (see `generative.rs`) are interchangeable; the
//! orchestrator is tested against the deterministic one.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::collections::HashSet;

use super::evidence::Evidence;
use crate::providers::SourceCategory;

/// Banded reading of an overall score. Always derived from the score via
/// [`CompletionLevel::from_score`], never stored independently.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CompletionLevel {
    /// overall < 0.40
    Insufficient,
    /// 0.40 <= overall < 0.70
    Partial,
    /// 0.70 <= overall < 0.85
    Adequate,
    /// overall >= 0.85
    Comprehensive,
}

impl CompletionLevel {
    pub fn from_score(overall: f64) -> Self {
        if overall >= 0.85 {
            Self::Comprehensive
        } else if overall >= 0.70 {
            Self::Adequate
        } else if overall >= 0.40 {
            Self::Partial
        } else {
            Self::Insufficient
        }
    }
}

/// The evaluator's verdict on accumulated evidence.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CompletionScore {
    /// How fully the evidence answers the query, in [0, 1].
    pub overall_score: f64,
    /// Per-area coverage. Every configured area is present, 0.0 if untouched.
    pub coverage_by_area: BTreeMap<String, f64>,
    /// The evaluator's confidence in its own verdict, in [0, 1].
    pub confidence: f64,
    /// Free-text rationale.
    pub reasoning: String,
}

impl CompletionScore {
    /// The banded reading of `overall_score`.
    pub fn level(&self) -> CompletionLevel {
        CompletionLevel::from_score(self.overall_score)
    }

    /// A score with the given overall value and every area zeroed.
    pub fn with_overall(overall: f64, areas: &[String]) -> Self {
        Self {
            overall_score: overall.clamp(0.0, 1.0),
            coverage_by_area: areas.iter().map(|a| (a.clone(), 0.0)).collect(),
            confidence: 1.0,
            reasoning: String::new(),
        }
    }
}

/// Kind of deficiency a gap names. The ordering is the deterministic
/// tie-break for equal priorities.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(rename_all = "snake_case")]
pub enum GapType {
    /// Nothing has been collected at all.
    NoEvidence,
    /// A configured coverage area is untouched or thin.
    MissingTopic,
    /// Too little evidence overall for a grounded answer.
    InsufficientDepth,
    /// Too few distinct source domains.
    SourceDiversity,
}

/// A named, prioritized deficiency in evidence coverage.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InformationGap {
    pub gap_type: GapType,
    pub description: String,
    /// 1..=5, 5 highest.
    pub priority: u8,
    /// A query that would address this gap.
    pub suggested_query: String,
}

/// A follow-up query targeting one gap.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RefinementQuery {
    pub query: String,
    /// Description of the gap this query addresses.
    pub gap_addressed: String,
    /// Inherited from the gap.
    pub priority: u8,
    /// Provider categories to direct this query at.
    pub expected_sources: Vec<SourceCategory>,
}

/// Sort gaps priority-descending, ties broken by gap type.
pub(crate) fn sort_gaps(gaps: &mut [InformationGap]) {
    gaps.sort_by(|a, b| {
        b.priority
            .cmp(&a.priority)
            .then_with(|| a.gap_type.cmp(&b.gap_type))
    });
}

/// Scores evidence against a query, names coverage gaps, and derives
/// follow-up queries.
#[async_trait]
pub trait CompletionEvaluator: Send + Sync {
    /// Score accumulated evidence. Every configured coverage area must be
    /// present in the result; empty evidence scores 0.0.
    async fn score(&self, query: &str, evidence: &[Evidence]) -> CompletionScore;

    /// Identify coverage gaps, priority-descending with a deterministic
    /// tie-break. Empty evidence yields at least one gap so the loop can
    /// retry instead of stalling.
    async fn identify_gaps(&self, query: &str, evidence: &[Evidence]) -> Vec<InformationGap>;

    /// Derive at most one refinement query per gap, preserving gap order.
    async fn refine(&self, gaps: &[InformationGap], query: &str) -> Vec<RefinementQuery>;
}

// ---------------------------------------------------------------------------
// HeuristicEvaluator
// ---------------------------------------------------------------------------

/// Deterministic rule-based evaluator.
///
/// Coverage per area is keyword overlap between the area name and the
/// evidence text; the overall score blends area breadth, evidence volume,
/// and source-domain diversity.
pub struct HeuristicEvaluator {
    areas: Vec<String>,
}

impl HeuristicEvaluator {
    /// Evidence items per area considered full coverage.
    const AREA_SATURATION: usize = 2;
    /// Evidence items considered full volume.
    const VOLUME_SATURATION: usize = 8;
    /// Distinct domains considered full diversity.
    const DIVERSITY_SATURATION: usize = 3;

    pub fn new(areas: Vec<String>) -> Self {
        Self { areas }
    }

    fn area_coverage(area: &str, evidence: &[Evidence]) -> f64 {
        let keywords: Vec<String> = area
            .split_whitespace()
            .map(|w| w.to_lowercase())
            .filter(|w| w.len() > 2)
            .collect();
        if keywords.is_empty() {
            return 0.0;
        }
        let matching = evidence
            .iter()
            .filter(|e| {
                let text = format!("{} {}", e.source_title, e.excerpt).to_lowercase();
                keywords.iter().any(|k| text.contains(k))
            })
            .count();
        (matching as f64 / Self::AREA_SATURATION as f64).min(1.0)
    }

    fn domain_count(evidence: &[Evidence]) -> usize {
        evidence
            .iter()
            .filter_map(|e| url::Url::parse(&e.source_url).ok())
            .filter_map(|u| u.host_str().map(|h| h.to_string()))
            .collect::<HashSet<_>>()
            .len()
    }
}

#[async_trait]
impl CompletionEvaluator for HeuristicEvaluator {
    async fn score(&self, query: &str, evidence: &[Evidence]) -> CompletionScore {
        let coverage_by_area: BTreeMap<String, f64> = self
            .areas
            .iter()
            .map(|a| (a.clone(), Self::area_coverage(a, evidence)))
            .collect();

        if evidence.is_empty() {
            return CompletionScore {
                overall_score: 0.0,
                coverage_by_area,
                confidence: 1.0,
                reasoning: format!("No evidence collected yet for \"{query}\""),
            };
        }

        let breadth = if coverage_by_area.is_empty() {
            0.0
        } else {
            coverage_by_area.values().sum::<f64>() / coverage_by_area.len() as f64
        };
        let volume = (evidence.len() as f64 / Self::VOLUME_SATURATION as f64).min(1.0);
        let diversity =
            (Self::domain_count(evidence) as f64 / Self::DIVERSITY_SATURATION as f64).min(1.0);

        let overall = (0.4 * breadth + 0.4 * volume + 0.2 * diversity).clamp(0.0, 1.0);
        // The heuristic is most sure of itself when the evidence base is broad.
        let confidence = (0.5 + 0.5 * volume).clamp(0.0, 1.0);

        CompletionScore {
            overall_score: overall,
            coverage_by_area,
            confidence,
            reasoning: format!(
                "{} evidence items across {} domains; mean area coverage {:.2}",
                evidence.len(),
                Self::domain_count(evidence),
                breadth
            ),
        }
    }

    async fn identify_gaps(&self, query: &str, evidence: &[Evidence]) -> Vec<InformationGap> {
        if evidence.is_empty() {
            return vec![InformationGap {
                gap_type: GapType::NoEvidence,
                description: "No evidence collected yet".to_string(),
                priority: 5,
                suggested_query: query.to_string(),
            }];
        }

        let mut gaps = Vec::new();

        for area in &self.areas {
            if Self::area_coverage(area, evidence) < 0.5 {
                gaps.push(InformationGap {
                    gap_type: GapType::MissingTopic,
                    description: format!("Area \"{area}\" is not yet covered"),
                    priority: 4,
                    suggested_query: format!("{query} {area}"),
                });
            }
        }

        if evidence.len() < Self::VOLUME_SATURATION / 2 {
            gaps.push(InformationGap {
                gap_type: GapType::InsufficientDepth,
                description: format!("Only {} evidence items collected", evidence.len()),
                priority: 3,
                suggested_query: format!("{query} in depth"),
            });
        }

        if Self::domain_count(evidence) < Self::DIVERSITY_SATURATION {
            gaps.push(InformationGap {
                gap_type: GapType::SourceDiversity,
                description: "Fewer than three distinct source domains".to_string(),
                priority: 3,
                suggested_query: format!("additional perspectives on {query}"),
            });
        }

        sort_gaps(&mut gaps);
        gaps
    }

    async fn refine(&self, gaps: &[InformationGap], _query: &str) -> Vec<RefinementQuery> {
        let mut seen = HashSet::new();
        gaps.iter()
            .filter(|gap| seen.insert(gap.suggested_query.clone()))
            .map(|gap| RefinementQuery {
                query: gap.suggested_query.clone(),
                gap_addressed: gap.description.clone(),
                priority: gap.priority,
                expected_sources: match gap.gap_type {
                    GapType::SourceDiversity => vec![SourceCategory::Web, SourceCategory::News],
                    _ => vec![SourceCategory::Web],
                },
            })
            .collect()
    }
}

// ---------------------------------------------------------------------------
// ScriptedEvaluator
// ---------------------------------------------------------------------------

/// Test stub returning a scripted sequence of overall scores.
///
/// Gaps and refinements are fixed single entries so loop control can be
/// exercised deterministically.
pub struct ScriptedEvaluator {
    scores: std::sync::Mutex<std::collections::VecDeque<f64>>,
    areas: Vec<String>,
}

impl ScriptedEvaluator {
    pub fn new(scores: impl IntoIterator<Item = f64>) -> Self {
        Self {
            scores: std::sync::Mutex::new(scores.into_iter().collect()),
            areas: vec!["overview".to_string()],
        }
    }
}

#[async_trait]
impl CompletionEvaluator for ScriptedEvaluator {
    async fn score(&self, query: &str, _evidence: &[Evidence]) -> CompletionScore {
        let overall = self
            .scores
            .lock()
            .expect("scripted scores poisoned")
            .pop_front()
            .unwrap_or(0.0);
        let mut score = CompletionScore::with_overall(overall, &self.areas);
        score.reasoning = format!("scripted score for \"{query}\"");
        score
    }

    async fn identify_gaps(&self, query: &str, _evidence: &[Evidence]) -> Vec<InformationGap> {
        vec![InformationGap {
            gap_type: GapType::MissingTopic,
            description: "scripted gap".to_string(),
            priority: 4,
            suggested_query: format!("{query} follow-up"),
        }]
    }

    async fn refine(&self, gaps: &[InformationGap], _query: &str) -> Vec<RefinementQuery> {
        gaps.iter()
            .map(|gap| RefinementQuery {
                query: gap.suggested_query.clone(),
                gap_addressed: gap.description.clone(),
                priority: gap.priority,
                expected_sources: vec![SourceCategory::Web],
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::research::evidence::content_hash;
    use uuid::Uuid;

    fn evidence(url: &str, title: &str, excerpt: &str) -> Evidence {
        Evidence {
            id: Uuid::new_v4(),
            source_url: url.to_string(),
            source_title: title.to_string(),
            excerpt: excerpt.to_string(),
            content_hash: content_hash(excerpt),
            origin_query: "q".to_string(),
            origin_iteration: 1,
        }
    }

    fn areas() -> Vec<String> {
        vec!["overview".to_string(), "data and statistics".to_string()]
    }

    #[test]
    fn test_level_thresholds() {
        assert_eq!(CompletionLevel::from_score(0.0), CompletionLevel::Insufficient);
        assert_eq!(CompletionLevel::from_score(0.39), CompletionLevel::Insufficient);
        assert_eq!(CompletionLevel::from_score(0.40), CompletionLevel::Partial);
        assert_eq!(CompletionLevel::from_score(0.69), CompletionLevel::Partial);
        assert_eq!(CompletionLevel::from_score(0.70), CompletionLevel::Adequate);
        assert_eq!(CompletionLevel::from_score(0.84), CompletionLevel::Adequate);
        assert_eq!(CompletionLevel::from_score(0.85), CompletionLevel::Comprehensive);
        assert_eq!(CompletionLevel::from_score(1.0), CompletionLevel::Comprehensive);
    }

    #[tokio::test]
    async fn test_empty_evidence_scores_zero() {
        let evaluator = HeuristicEvaluator::new(areas());
        let score = evaluator.score("test query", &[]).await;
        assert_eq!(score.overall_score, 0.0);
        assert_eq!(score.level(), CompletionLevel::Insufficient);
        // Every configured area must still be present.
        assert_eq!(score.coverage_by_area.len(), 2);
        assert!(score.coverage_by_area.values().all(|&v| v == 0.0));
    }

    #[tokio::test]
    async fn test_score_grows_with_evidence() {
        let evaluator = HeuristicEvaluator::new(areas());
        let small = vec![evidence(
            "https://a.example/1",
            "Overview of the topic",
            "an overview of the field",
        )];
        let mut large = small.clone();
        for i in 0..7 {
            large.push(evidence(
                &format!("https://site{i}.example/p"),
                "Statistics report",
                &format!("data and statistics item {i}"),
            ));
        }

        let s1 = evaluator.score("topic", &small).await;
        let s2 = evaluator.score("topic", &large).await;
        assert!(s2.overall_score > s1.overall_score);
        assert!(s2.overall_score <= 1.0);
    }

    #[tokio::test]
    async fn test_untouched_area_reported_as_zero() {
        let evaluator = HeuristicEvaluator::new(areas());
        let ev = vec![evidence(
            "https://a.example/1",
            "Overview",
            "a broad overview with no numbers",
        )];
        let score = evaluator.score("topic", &ev).await;
        assert_eq!(score.coverage_by_area["data and statistics"], 0.0);
        assert!(score.coverage_by_area["overview"] > 0.0);
    }

    #[tokio::test]
    async fn test_empty_evidence_yields_no_evidence_gap() {
        let evaluator = HeuristicEvaluator::new(areas());
        let gaps = evaluator.identify_gaps("test query", &[]).await;
        assert_eq!(gaps.len(), 1);
        assert_eq!(gaps[0].gap_type, GapType::NoEvidence);
        assert_eq!(gaps[0].priority, 5);
        assert_eq!(gaps[0].suggested_query, "test query");
    }

    #[tokio::test]
    async fn test_gap_ordering_is_priority_desc_then_type() {
        let evaluator = HeuristicEvaluator::new(areas());
        let ev = vec![evidence("https://a.example/1", "t", "unrelated text")];
        let gaps = evaluator.identify_gaps("topic", &ev).await;
        assert!(gaps.len() >= 2);
        for pair in gaps.windows(2) {
            assert!(
                pair[0].priority > pair[1].priority
                    || (pair[0].priority == pair[1].priority
                        && pair[0].gap_type <= pair[1].gap_type)
            );
        }
    }

    #[tokio::test]
    async fn test_refine_one_query_per_gap() {
        let evaluator = HeuristicEvaluator::new(areas());
        let gaps = vec![
            InformationGap {
                gap_type: GapType::MissingTopic,
                description: "gap a".into(),
                priority: 4,
                suggested_query: "q a".into(),
            },
            InformationGap {
                gap_type: GapType::SourceDiversity,
                description: "gap b".into(),
                priority: 3,
                suggested_query: "q b".into(),
            },
        ];
        let refinements = evaluator.refine(&gaps, "topic").await;
        assert_eq!(refinements.len(), 2);
        assert_eq!(refinements[0].priority, 4);
        assert_eq!(refinements[0].expected_sources, vec![SourceCategory::Web]);
        assert!(
            refinements[1]
                .expected_sources
                .contains(&SourceCategory::News)
        );
    }

    #[tokio::test]
    async fn test_refine_dedupes_identical_suggestions() {
        let evaluator = HeuristicEvaluator::new(areas());
        let gap = InformationGap {
            gap_type: GapType::MissingTopic,
            description: "gap".into(),
            priority: 4,
            suggested_query: "same query".into(),
        };
        let refinements = evaluator.refine(&[gap.clone(), gap], "topic").await;
        assert_eq!(refinements.len(), 1);
    }

    #[tokio::test]
    async fn test_scripted_evaluator_pops_in_order() {
        let evaluator = ScriptedEvaluator::new([0.5, 0.8]);
        assert!((evaluator.score("q", &[]).await.overall_score - 0.5).abs() < f64::EPSILON);
        assert!((evaluator.score("q", &[]).await.overall_score - 0.8).abs() < f64::EPSILON);
        // Exhausted script falls back to zero.
        assert_eq!(evaluator.score("q", &[]).await.overall_score, 0.0);
    }
}
