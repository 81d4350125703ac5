//! Model-backed completion evaluation.
//!
//! Delegates scoring and gap analysis to a generative model behind the
//! same `CompletionEvaluator` trait as the heuristic. Model calls go
//! through the model's circuit breaker; a failed call, an open breaker,
//! or a malformed payload degrades to the heuristic evaluator, so the
//! orchestrator never sees an error from here. Retrying a call may give
//! a different but equally valid verdict; the contract is idempotence,
//! not determinism.

use async_trait::async_trait;
use serde::Deserialize;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, warn};

use super::evaluator::{
    CompletionEvaluator, CompletionScore, GapType, HeuristicEvaluator, InformationGap,
    RefinementQuery, sort_gaps,
};
use super::evidence::Evidence;
use crate::providers::{CircuitBreaker, GenerativeModel, SourceCategory};

/// JSON payload expected from a scoring prompt.
#[derive(Debug, Deserialize)]
struct ScorePayload {
    overall_score: f64,
    #[serde(default)]
    coverage_by_area: HashMap<String, f64>,
    #[serde(default = "default_confidence")]
    confidence: f64,
    #[serde(default)]
    reasoning: String,
}

fn default_confidence() -> f64 {
    0.5
}

/// JSON payload expected from a gap-analysis prompt.
#[derive(Debug, Deserialize)]
struct GapsPayload {
    gaps: Vec<GapPayload>,
}

#[derive(Debug, Deserialize)]
struct GapPayload {
    gap_type: GapType,
    description: String,
    priority: u8,
    suggested_query: String,
}

/// Evaluator that asks a generative model to score evidence and name gaps.
pub struct GenerativeEvaluator {
    model: Arc<dyn GenerativeModel>,
    breaker: Arc<CircuitBreaker>,
    fallback: HeuristicEvaluator,
    areas: Vec<String>,
}

impl GenerativeEvaluator {
    pub fn new(
        model: Arc<dyn GenerativeModel>,
        breaker: Arc<CircuitBreaker>,
        areas: Vec<String>,
    ) -> Self {
        Self {
            model,
            breaker,
            fallback: HeuristicEvaluator::new(areas.clone()),
            areas,
        }
    }

    fn score_prompt(&self, query: &str, evidence: &[Evidence]) -> String {
        let mut prompt = format!(
            "Score how completely the evidence below answers the research question.\n\
             Question: {query}\n\nEvidence:\n"
        );
        for (i, e) in evidence.iter().enumerate() {
            prompt.push_str(&format!(
                "{}. [{}] {}\n",
                i + 1,
                e.source_title,
                e.excerpt
            ));
        }
        prompt.push_str(&format!(
            "\nCoverage areas: {}\n\
             Respond with JSON only: {{\"overall_score\": 0.0-1.0, \
             \"coverage_by_area\": {{area: 0.0-1.0}}, \"confidence\": 0.0-1.0, \
             \"reasoning\": \"...\"}}",
            self.areas.join(", ")
        ));
        prompt
    }

    fn gaps_prompt(&self, query: &str, evidence: &[Evidence]) -> String {
        let mut prompt = format!(
            "List the most important gaps in the evidence below for the research question.\n\
             Question: {query}\n\nEvidence:\n"
        );
        for e in evidence {
            prompt.push_str(&format!("- {}\n", e.excerpt));
        }
        prompt.push_str(
            "\nRespond with JSON only: {\"gaps\": [{\"gap_type\": \
             \"missing_topic|insufficient_depth|source_diversity|no_evidence\", \
             \"description\": \"...\", \"priority\": 1-5, \"suggested_query\": \"...\"}]}",
        );
        prompt
    }

    async fn generate(&self, prompt: String) -> Option<String> {
        let model = self.model.clone();
        match self
            .breaker
            .call(move || async move { model.generate(&prompt).await })
            .await
        {
            Ok(text) => Some(text),
            Err(e) => {
                warn!(
                    provider = self.model.name(),
                    error = %e,
                    "Model-backed evaluation failed, using heuristic"
                );
                None
            }
        }
    }
}

/// Pull the outermost JSON object out of a model response that may wrap it
/// in code fences or prose.
fn extract_json(text: &str) -> Option<&str> {
    let start = text.find('{')?;
    let end = text.rfind('}')?;
    (end > start).then(|| &text[start..=end])
}

#[async_trait]
impl CompletionEvaluator for GenerativeEvaluator {
    async fn score(&self, query: &str, evidence: &[Evidence]) -> CompletionScore {
        // The empty case needs no model round-trip.
        if evidence.is_empty() {
            return self.fallback.score(query, evidence).await;
        }

        let Some(raw) = self.generate(self.score_prompt(query, evidence)).await else {
            return self.fallback.score(query, evidence).await;
        };

        let parsed = extract_json(&raw)
            .and_then(|json| serde_json::from_str::<ScorePayload>(json).ok());
        let Some(payload) = parsed else {
            warn!(
                provider = self.model.name(),
                raw_payload = %raw,
                "Malformed score payload, using heuristic"
            );
            return self.fallback.score(query, evidence).await;
        };

        // Every configured area must be present, 0.0 where the model was silent.
        let coverage_by_area = self
            .areas
            .iter()
            .map(|a| {
                let v = payload
                    .coverage_by_area
                    .get(a)
                    .copied()
                    .unwrap_or(0.0)
                    .clamp(0.0, 1.0);
                (a.clone(), v)
            })
            .collect();

        debug!(
            overall = payload.overall_score,
            "Model-backed completion score"
        );
        CompletionScore {
            overall_score: payload.overall_score.clamp(0.0, 1.0),
            coverage_by_area,
            confidence: payload.confidence.clamp(0.0, 1.0),
            reasoning: payload.reasoning,
        }
    }

    async fn identify_gaps(&self, query: &str, evidence: &[Evidence]) -> Vec<InformationGap> {
        if evidence.is_empty() {
            return self.fallback.identify_gaps(query, evidence).await;
        }

        let Some(raw) = self.generate(self.gaps_prompt(query, evidence)).await else {
            return self.fallback.identify_gaps(query, evidence).await;
        };

        let parsed = extract_json(&raw)
            .and_then(|json| serde_json::from_str::<GapsPayload>(json).ok());
        let Some(payload) = parsed else {
            warn!(
                provider = self.model.name(),
                raw_payload = %raw,
                "Malformed gaps payload, using heuristic"
            );
            return self.fallback.identify_gaps(query, evidence).await;
        };

        let mut gaps: Vec<InformationGap> = payload
            .gaps
            .into_iter()
            .map(|g| InformationGap {
                gap_type: g.gap_type,
                description: g.description,
                priority: g.priority.clamp(1, 5),
                suggested_query: g.suggested_query,
            })
            .collect();
        sort_gaps(&mut gaps);
        gaps
    }

    async fn refine(&self, gaps: &[InformationGap], _query: &str) -> Vec<RefinementQuery> {
        // One query per gap, derived directly; no model round-trip needed.
        let mut seen = std::collections::HashSet::new();
        gaps.iter()
            .filter(|gap| seen.insert(gap.suggested_query.clone()))
            .map(|gap| RefinementQuery {
                query: gap.suggested_query.clone(),
                gap_addressed: gap.description.clone(),
                priority: gap.priority,
                expected_sources: vec![SourceCategory::Web],
            })
            .collect()
    }
}
