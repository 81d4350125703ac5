//! The research loop.
//!
//! One orchestrator drives one session at a time: plan, then iterate.
//! Each pass fans its queries out against the breaker-guarded search path,
//! fans in, dedups into the store, scores, and either stops or refines.
//! Every external-call failure is degraded at its call site; a session
//! always ends with a report.
//!
//! Iteration N+1's queries are derived only from iteration N's evidence
//! snapshot, so iterations never overlap within a session. The only state
//! shared across concurrent sessions is the breaker registry.

use chrono::Utc;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Instant;
use tokio::sync::Semaphore;
use tracing::{debug, info, warn};

use super::evaluator::{CompletionEvaluator, HeuristicEvaluator};
use super::evidence::{EvidenceCandidate, EvidenceStore};
use super::planner::HeuristicPlanner;
use super::session::{Iteration, ResearchSession, ResearchOutcome, SessionStatus};
use super::writer::{EvidenceReportWriter, render_evidence_report};
use crate::config::{DelveConfig, ResearchConfig};
use crate::error::DelveError;
use crate::providers::{
    BreakerRegistry, DuckDuckGoSearch, Planner, ReportWriter, SearchHit, SearchProvider,
    SimilarityIndex,
};

/// Per-run knobs. Defaults mirror `ResearchConfig`.
#[derive(Debug, Clone)]
pub struct RunOptions {
    /// Maximum loop passes.
    pub max_iterations: usize,
    /// Completion score at which the session stops successfully.
    pub min_completion_score: f64,
    /// Maximum external calls (planner + every search + writer).
    pub call_budget: usize,
}

impl Default for RunOptions {
    fn default() -> Self {
        Self {
            max_iterations: 3,
            min_completion_score: 0.75,
            call_budget: 100,
        }
    }
}

impl RunOptions {
    pub fn from_config(config: &ResearchConfig) -> Self {
        Self {
            max_iterations: config.max_iterations,
            min_completion_score: config.min_completion_score,
            call_budget: config.call_budget,
        }
    }
}

/// Counts external calls against the session's hard ceiling.
struct CallBudget {
    limit: usize,
    used: AtomicUsize,
}

impl CallBudget {
    fn new(limit: usize) -> Self {
        Self {
            limit,
            used: AtomicUsize::new(0),
        }
    }

    /// Reserve one call slot. False once the ceiling is reached.
    fn try_acquire(&self) -> bool {
        self.used
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |used| {
                (used < self.limit).then_some(used + 1)
            })
            .is_ok()
    }

    fn is_exhausted(&self) -> bool {
        self.used.load(Ordering::SeqCst) >= self.limit
    }

    fn used(&self) -> usize {
        self.used.load(Ordering::SeqCst)
    }
}

/// Owns the per-session research loop.
pub struct ResearchOrchestrator {
    planner: Arc<dyn Planner>,
    search: Arc<dyn SearchProvider>,
    writer: Arc<dyn ReportWriter>,
    evaluator: Arc<dyn CompletionEvaluator>,
    breakers: Arc<BreakerRegistry>,
    index: Option<Arc<dyn SimilarityIndex>>,
    config: ResearchConfig,
}

impl ResearchOrchestrator {
    pub fn new(
        planner: Arc<dyn Planner>,
        search: Arc<dyn SearchProvider>,
        writer: Arc<dyn ReportWriter>,
        evaluator: Arc<dyn CompletionEvaluator>,
        breakers: Arc<BreakerRegistry>,
        config: ResearchConfig,
    ) -> Self {
        Self {
            planner,
            search,
            writer,
            evaluator,
            breakers,
            index: None,
            config,
        }
    }

    /// Mirror accepted evidence to a similarity index. Optional; its
    /// presence or failure never changes loop behavior.
    pub fn with_index(mut self, index: Arc<dyn SimilarityIndex>) -> Self {
        self.index = Some(index);
        self
    }

    /// Run one research session to completion.
    ///
    /// Always yields a final report, even on total provider failure or
    /// budget exhaustion. The only fail-fast path is a contract violation
    /// (empty query), checked before any external call.
    pub async fn run(
        &self,
        query: &str,
        options: RunOptions,
    ) -> Result<ResearchOutcome, DelveError> {
        let query = query.trim();
        if query.is_empty() {
            return Err(DelveError::EmptyQuery);
        }
        let started = Instant::now();
        let max_iterations = options.max_iterations.max(1);
        let budget = Arc::new(CallBudget::new(options.call_budget));

        let store = match &self.index {
            Some(index) => EvidenceStore::with_index(index.clone()),
            None => EvidenceStore::new(),
        };
        let mut session = ResearchSession::new(query, store);
        info!(session_id = %session.id, query, "Starting research session");

        let mut queries = self.initial_queries(query, &budget).await;
        let mut status = SessionStatus::BudgetExhausted;

        for iteration_number in 1..=max_iterations {
            let results = self.execute_queries(&queries, &budget).await;

            let mut collected = Vec::new();
            for (origin_query, hits) in &results {
                for hit in hits {
                    let (accepted, evidence) = session.evidence.add(EvidenceCandidate {
                        source_url: hit.url.clone(),
                        source_title: hit.title.clone(),
                        excerpt: hit.content.clone(),
                        origin_query: origin_query.clone(),
                        origin_iteration: iteration_number,
                    });
                    if accepted {
                        collected.push(evidence.id);
                    }
                }
            }

            let score = self.evaluator.score(query, session.evidence.all()).await;
            debug!(
                iteration = iteration_number,
                overall = score.overall_score,
                evidence = session.evidence.len(),
                "Iteration scored"
            );

            let mut iteration = Iteration {
                iteration_number,
                queries_executed: queries.clone(),
                evidence_collected: collected,
                completion_score: score,
                gaps_identified: Vec::new(),
                refinement_queries: Vec::new(),
                timestamp: Utc::now(),
            };

            if iteration.completion_score.overall_score >= options.min_completion_score {
                session.push_iteration(iteration);
                status = SessionStatus::Completed;
                break;
            }
            if iteration_number == max_iterations {
                session.push_iteration(iteration);
                status = SessionStatus::BudgetExhausted;
                break;
            }
            if budget.is_exhausted() {
                info!(
                    calls_used = budget.used(),
                    "Call budget exhausted mid-session, skipping refinement"
                );
                session.push_iteration(iteration);
                status = SessionStatus::BudgetExhausted;
                break;
            }

            let gaps = self
                .evaluator
                .identify_gaps(query, session.evidence.all())
                .await;
            let refinements = self.evaluator.refine(&gaps, query).await;
            if refinements.is_empty() {
                // Below threshold with nothing to refine: re-running an
                // identical pass cannot make progress, so stop here.
                info!("No refinement queries produced below threshold, terminating");
                session.push_iteration(iteration);
                status = SessionStatus::BudgetExhausted;
                break;
            }

            queries = refinements.iter().map(|r| r.query.clone()).collect();
            iteration.gaps_identified = gaps;
            iteration.refinement_queries = refinements;
            session.push_iteration(iteration);
        }

        let report = self.write_report(query, &session, &budget).await;
        session.finish(status, report);
        info!(
            session_id = %session.id,
            status = ?session.status,
            evidence = session.evidence.len(),
            calls_used = budget.used(),
            "Research session finished"
        );

        Ok(session.into_outcome(started.elapsed().as_secs_f64()))
    }

    /// Obtain the first pass's query set from the planner, degrading to a
    /// single original-query task on any failure or malformed output.
    async fn initial_queries(&self, query: &str, budget: &CallBudget) -> Vec<String> {
        let fallback = vec![query.to_string()];
        if !budget.try_acquire() {
            warn!("Call budget too small for planning, using the original query");
            return fallback;
        }

        let breaker = self.breakers.breaker(self.planner.name());
        let planner = self.planner.clone();
        let owned_query = query.to_string();
        let planned = breaker
            .call(move || async move { planner.plan(&owned_query).await })
            .await;

        match planned {
            Ok(tasks) => {
                let queries: Vec<String> = tasks
                    .into_iter()
                    .map(|t| t.query)
                    .filter(|q| !q.trim().is_empty())
                    .collect();
                if queries.is_empty() {
                    warn!("Planner returned no usable tasks, using the original query");
                    fallback
                } else {
                    queries
                }
            }
            Err(e) => {
                warn!(error = %e, "Planner failed, using the original query");
                fallback
            }
        }
    }

    /// Fan the pass's queries out to a bounded worker pool and fan in,
    /// waiting for all of them to settle. A failed query contributes zero
    /// results and never aborts the iteration.
    async fn execute_queries(
        &self,
        queries: &[String],
        budget: &Arc<CallBudget>,
    ) -> Vec<(String, Vec<SearchHit>)> {
        let semaphore = Arc::new(Semaphore::new(self.config.max_concurrent_queries));
        let mut handles = Vec::new();

        for query in queries {
            let sem = semaphore.clone();
            let budget = budget.clone();
            let search = self.search.clone();
            let breaker = self.breakers.breaker(self.search.name());
            let query = query.clone();

            handles.push(tokio::spawn(async move {
                let _permit = sem.acquire().await.expect("semaphore closed");
                if !budget.try_acquire() {
                    debug!(query = %query, "Call budget exhausted, skipping query");
                    return (query, Vec::new());
                }

                let owned_query = query.clone();
                match breaker
                    .call(move || async move { search.search(&owned_query).await })
                    .await
                {
                    Ok(hits) => (query, hits),
                    Err(e) => {
                        warn!(query = %query, error = %e, "Search failed, continuing without results");
                        (query, Vec::new())
                    }
                }
            }));
        }

        let mut results = Vec::new();
        for joined in futures::future::join_all(handles).await {
            match joined {
                Ok(result) => results.push(result),
                Err(e) => warn!(error = %e, "Search task panicked"),
            }
        }
        results
    }

    /// Produce the final report: the external writer when budget and
    /// provider allow, the built-in evidence listing otherwise.
    async fn write_report(
        &self,
        query: &str,
        session: &ResearchSession,
        budget: &CallBudget,
    ) -> String {
        let evidence = session.evidence.all();
        if budget.try_acquire() {
            let breaker = self.breakers.breaker(self.writer.name());
            let writer = self.writer.clone();
            let owned_query = query.to_string();
            let owned_evidence = evidence.to_vec();
            match breaker
                .call(move || async move { writer.write(&owned_query, &owned_evidence).await })
                .await
            {
                Ok(report) => return report,
                Err(e) => {
                    warn!(error = %e, "Writer failed, assembling report from evidence");
                }
            }
        } else {
            debug!("Call budget exhausted, assembling report from evidence");
        }
        render_evidence_report(query, evidence)
    }
}

/// Run one research session against the default provider stack: heuristic
/// planner, DuckDuckGo search, heuristic evaluator, built-in report writer.
pub async fn run_deep_research(
    query: &str,
    options: RunOptions,
) -> Result<ResearchOutcome, DelveError> {
    let config = DelveConfig::default();
    let orchestrator = ResearchOrchestrator::new(
        Arc::new(HeuristicPlanner::new()),
        Arc::new(DuckDuckGoSearch::new(config.search.clone())?),
        Arc::new(EvidenceReportWriter::new()),
        Arc::new(HeuristicEvaluator::new(
            config.research.coverage_areas.clone(),
        )),
        Arc::new(BreakerRegistry::new(config.breaker.clone())),
        config.research,
    );
    orchestrator.run(query, options).await
}
