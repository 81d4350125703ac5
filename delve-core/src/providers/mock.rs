//! Mock providers for tests.
//!
//! Public so integration tests and downstream crates can script provider
//! behavior: queued or generated responses, scripted failures, and call
//! counters.

use async_trait::async_trait;
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};

use super::{
    GenerativeModel, PlannedTask, Planner, ReportWriter, SearchHit, SearchProvider,
    SimilarityIndex,
};
use crate::error::ProviderError;
use crate::research::evidence::Evidence;

fn connection_error(provider: &str) -> ProviderError {
    ProviderError::Connection {
        provider: provider.to_string(),
        message: "mock failure".to_string(),
    }
}

// ---------------------------------------------------------------------------
// MockPlanner
// ---------------------------------------------------------------------------

/// Planner returning a fixed task list, or failing on every call.
pub struct MockPlanner {
    tasks: Vec<PlannedTask>,
    fail: bool,
    calls: AtomicUsize,
}

impl MockPlanner {
    /// A planner producing one web task per given query string.
    pub fn with_queries(queries: &[&str]) -> Self {
        Self {
            tasks: queries.iter().map(|q| PlannedTask::web(*q)).collect(),
            fail: false,
            calls: AtomicUsize::new(0),
        }
    }

    /// A planner that fails every call.
    pub fn failing() -> Self {
        Self {
            tasks: Vec::new(),
            fail: true,
            calls: AtomicUsize::new(0),
        }
    }

    /// A planner that succeeds but returns no tasks (malformed output).
    pub fn empty() -> Self {
        Self {
            tasks: Vec::new(),
            fail: false,
            calls: AtomicUsize::new(0),
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Planner for MockPlanner {
    fn name(&self) -> &str {
        "mock_planner"
    }

    async fn plan(&self, _query: &str) -> Result<Vec<PlannedTask>, ProviderError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.fail {
            return Err(connection_error(self.name()));
        }
        Ok(self.tasks.clone())
    }
}

// ---------------------------------------------------------------------------
// MockSearch
// ---------------------------------------------------------------------------

enum SearchBehavior {
    /// Generate `n` hits per call, content unique per query.
    PerQuery(usize),
    /// Return the same hits on every call.
    Fixed(Vec<SearchHit>),
    /// Fail every call.
    Failing,
}

/// Search provider with scripted behavior and a call counter.
pub struct MockSearch {
    behavior: SearchBehavior,
    calls: AtomicUsize,
}

impl MockSearch {
    /// Each call returns `n` hits whose content is unique to the query.
    pub fn with_results_per_query(n: usize) -> Self {
        Self {
            behavior: SearchBehavior::PerQuery(n),
            calls: AtomicUsize::new(0),
        }
    }

    /// Every call returns exactly these hits.
    pub fn with_fixed_hits(hits: Vec<SearchHit>) -> Self {
        Self {
            behavior: SearchBehavior::Fixed(hits),
            calls: AtomicUsize::new(0),
        }
    }

    /// Every call fails.
    pub fn failing() -> Self {
        Self {
            behavior: SearchBehavior::Failing,
            calls: AtomicUsize::new(0),
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl SearchProvider for MockSearch {
    fn name(&self) -> &str {
        "mock_search"
    }

    async fn search(&self, query: &str) -> Result<Vec<SearchHit>, ProviderError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        match &self.behavior {
            SearchBehavior::PerQuery(n) => Ok((0..*n)
                .map(|i| SearchHit {
                    url: format!("https://source{i}.example/{}", urlencoding::encode(query)),
                    title: format!("Result {} for {}", i + 1, query),
                    content: format!("Finding {} about {}", i + 1, query),
                })
                .collect()),
            SearchBehavior::Fixed(hits) => Ok(hits.clone()),
            SearchBehavior::Failing => Err(connection_error(self.name())),
        }
    }
}

// ---------------------------------------------------------------------------
// MockWriter
// ---------------------------------------------------------------------------

/// Writer returning a fixed report, or failing on every call.
pub struct MockWriter {
    report: String,
    fail: bool,
    calls: AtomicUsize,
}

impl MockWriter {
    pub fn with_report(report: impl Into<String>) -> Self {
        Self {
            report: report.into(),
            fail: false,
            calls: AtomicUsize::new(0),
        }
    }

    pub fn failing() -> Self {
        Self {
            report: String::new(),
            fail: true,
            calls: AtomicUsize::new(0),
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ReportWriter for MockWriter {
    fn name(&self) -> &str {
        "mock_writer"
    }

    async fn write(&self, _query: &str, _evidence: &[Evidence]) -> Result<String, ProviderError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.fail {
            return Err(connection_error(self.name()));
        }
        Ok(self.report.clone())
    }
}

// ---------------------------------------------------------------------------
// MockModel
// ---------------------------------------------------------------------------

/// Generative model returning a fixed completion, or failing on every call.
pub struct MockModel {
    response: String,
    fail: bool,
    calls: AtomicUsize,
}

impl MockModel {
    pub fn with_response(response: impl Into<String>) -> Self {
        Self {
            response: response.into(),
            fail: false,
            calls: AtomicUsize::new(0),
        }
    }

    pub fn failing() -> Self {
        Self {
            response: String::new(),
            fail: true,
            calls: AtomicUsize::new(0),
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl GenerativeModel for MockModel {
    fn name(&self) -> &str {
        "mock_model"
    }

    async fn generate(&self, _prompt: &str) -> Result<String, ProviderError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.fail {
            return Err(connection_error(self.name()));
        }
        Ok(self.response.clone())
    }
}

// ---------------------------------------------------------------------------
// MockIndex
// ---------------------------------------------------------------------------

/// Similarity index recording upserts, optionally failing every call.
pub struct MockIndex {
    upserted: Mutex<Vec<Evidence>>,
    fail: bool,
}

impl MockIndex {
    pub fn new() -> Self {
        Self {
            upserted: Mutex::new(Vec::new()),
            fail: false,
        }
    }

    pub fn failing() -> Self {
        Self {
            upserted: Mutex::new(Vec::new()),
            fail: true,
        }
    }

    /// Number of successfully recorded upserts.
    pub fn upserted_count(&self) -> usize {
        self.upserted.lock().expect("mock index poisoned").len()
    }
}

impl Default for MockIndex {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl SimilarityIndex for MockIndex {
    async fn upsert(&self, evidence: &Evidence) -> Result<(), ProviderError> {
        if self.fail {
            return Err(connection_error("mock_index"));
        }
        self.upserted
            .lock()
            .expect("mock index poisoned")
            .push(evidence.clone());
        Ok(())
    }

    async fn query(&self, _text: &str, limit: usize) -> Result<Vec<Evidence>, ProviderError> {
        if self.fail {
            return Err(connection_error("mock_index"));
        }
        let upserted = self.upserted.lock().expect("mock index poisoned");
        Ok(upserted.iter().take(limit).cloned().collect())
    }
}
