//! Research session state.
//!
//! One `ResearchSession` exists per `run` invocation, exclusively owned by
//! it and discarded by the caller after the outcome is returned. Sessions
//! are not persisted across restarts.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::evaluator::{CompletionLevel, CompletionScore, InformationGap, RefinementQuery};
use super::evidence::{Evidence, EvidenceStore};

/// Terminal status of a research session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionStatus {
    /// The loop is still running.
    Running,
    /// The completion score reached the configured threshold.
    Completed,
    /// The iteration or call budget ran out before the threshold was met.
    BudgetExhausted,
}

/// One pass of the research loop.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Iteration {
    /// 1-based, strictly increasing within a session.
    pub iteration_number: usize,
    /// Queries executed this pass.
    pub queries_executed: Vec<String>,
    /// IDs of evidence newly collected this pass (subset of the session set).
    pub evidence_collected: Vec<Uuid>,
    /// The evaluator's verdict on the accumulated evidence.
    pub completion_score: CompletionScore,
    /// Gaps identified after scoring. Empty on a terminating iteration.
    pub gaps_identified: Vec<InformationGap>,
    /// Follow-up queries derived from the gaps. Empty on a terminating
    /// iteration.
    pub refinement_queries: Vec<RefinementQuery>,
    /// When this pass finished.
    pub timestamp: DateTime<Utc>,
}

/// One research run: the loop's exclusive working state.
pub struct ResearchSession {
    pub id: Uuid,
    pub original_query: String,
    pub status: SessionStatus,
    pub iterations: Vec<Iteration>,
    pub evidence: EvidenceStore,
    pub final_report: Option<String>,
    pub created_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
}

impl ResearchSession {
    pub fn new(query: impl Into<String>, evidence: EvidenceStore) -> Self {
        Self {
            id: Uuid::new_v4(),
            original_query: query.into(),
            status: SessionStatus::Running,
            iterations: Vec::new(),
            evidence,
            final_report: None,
            created_at: Utc::now(),
            completed_at: None,
        }
    }

    /// Append a finished iteration. Numbers must be contiguous from 1.
    pub fn push_iteration(&mut self, iteration: Iteration) {
        debug_assert_eq!(
            iteration.iteration_number,
            self.iterations.len() + 1,
            "iteration numbers must be contiguous from 1"
        );
        self.iterations.push(iteration);
    }

    /// Move the session out of `Running` exactly once and attach the report.
    ///
    /// A second call is ignored: the first terminal transition wins.
    pub fn finish(&mut self, status: SessionStatus, report: String) {
        if self.status != SessionStatus::Running {
            return;
        }
        debug_assert_ne!(status, SessionStatus::Running);
        self.status = status;
        self.final_report = Some(report);
        self.completed_at = Some(Utc::now());
    }

    /// The most recent completion score, if any iteration has run.
    pub fn latest_score(&self) -> Option<&CompletionScore> {
        self.iterations.last().map(|i| &i.completion_score)
    }

    /// Consume the session into the caller-facing outcome.
    pub fn into_outcome(self, execution_time_seconds: f64) -> ResearchOutcome {
        let quality_score = self
            .iterations
            .last()
            .map(|i| i.completion_score.overall_score)
            .unwrap_or(0.0);
        ResearchOutcome {
            original_query: self.original_query,
            status: self.status,
            iterations: self.iterations,
            total_evidence_count: self.evidence.len(),
            evidence: self.evidence.all().to_vec(),
            final_report: self.final_report.unwrap_or_default(),
            completion_level: CompletionLevel::from_score(quality_score),
            quality_score,
            execution_time_seconds,
        }
    }
}

/// The result returned to the caller of a research run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResearchOutcome {
    pub original_query: String,
    pub status: SessionStatus,
    pub iterations: Vec<Iteration>,
    pub evidence: Vec<Evidence>,
    pub final_report: String,
    pub total_evidence_count: usize,
    pub completion_level: CompletionLevel,
    pub quality_score: f64,
    pub execution_time_seconds: f64,
}
