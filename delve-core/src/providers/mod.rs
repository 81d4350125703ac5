//! External provider interfaces.
//!
//! Defines the async traits the research engine consumes:
//! - `Planner` — turns a research query into initial sub-tasks
//! - `SearchProvider` — executes one query against an external search backend
//! - `ReportWriter` — turns accumulated evidence into a narrative report
//! - `GenerativeModel` — free-form generation, used by the model-backed evaluator
//! - `SimilarityIndex` — optional evidence mirror for similarity retrieval
//!
//! Every outbound call to these providers goes through a [`CircuitBreaker`]
//! keyed by the provider's `name()`.

pub mod breaker;
pub mod mock;
pub mod web;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::ProviderError;
use crate::research::evidence::Evidence;

pub use breaker::{BreakerRegistry, CircuitBreaker, CircuitState};
pub use mock::{MockIndex, MockModel, MockPlanner, MockSearch, MockWriter};
pub use web::DuckDuckGoSearch;

/// Provider categories a query can be directed at.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SourceCategory {
    /// General web search.
    Web,
    /// News outlets.
    News,
    /// Academic papers and preprints.
    Academic,
    /// Official documentation and references.
    Documentation,
}

impl Default for SourceCategory {
    fn default() -> Self {
        Self::Web
    }
}

/// One sub-task produced by the planner.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlannedTask {
    /// Unique identifier.
    pub id: Uuid,
    /// The query to execute.
    pub query: String,
    /// Provider categories to direct this query at.
    pub sources: Vec<SourceCategory>,
}

impl PlannedTask {
    /// A web-directed task for the given query.
    pub fn web(query: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            query: query.into(),
            sources: vec![SourceCategory::Web],
        }
    }
}

/// One raw result returned by a search provider.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchHit {
    /// Source URL.
    pub url: String,
    /// Source title.
    pub title: String,
    /// Extracted text content.
    pub content: String,
}

/// Produces the initial sub-task breakdown for a research query.
#[async_trait]
pub trait Planner: Send + Sync {
    /// Provider name, used to key the circuit breaker.
    fn name(&self) -> &str;

    /// Break a research query into independently executable sub-tasks.
    async fn plan(&self, query: &str) -> Result<Vec<PlannedTask>, ProviderError>;
}

/// Executes a single query against an external search backend.
#[async_trait]
pub trait SearchProvider: Send + Sync {
    /// Provider name, used to key the circuit breaker.
    fn name(&self) -> &str;

    /// Execute one query. An empty result list is valid, not an error.
    async fn search(&self, query: &str) -> Result<Vec<SearchHit>, ProviderError>;
}

/// Produces the final narrative report from accumulated evidence.
#[async_trait]
pub trait ReportWriter: Send + Sync {
    /// Provider name, used to key the circuit breaker.
    fn name(&self) -> &str;

    /// Write a report for the query from the given evidence. Implementations
    /// must handle empty evidence by stating that none was found.
    async fn write(&self, query: &str, evidence: &[Evidence]) -> Result<String, ProviderError>;
}

/// Free-form text generation, used by the model-backed evaluator.
#[async_trait]
pub trait GenerativeModel: Send + Sync {
    /// Provider name, used to key the circuit breaker.
    fn name(&self) -> &str;

    /// Generate a completion for the prompt.
    async fn generate(&self, prompt: &str) -> Result<String, ProviderError>;
}

/// Optional similarity index the evidence store mirrors accepted items into.
///
/// Its absence, and any failure of it, must not change engine behavior.
#[async_trait]
pub trait SimilarityIndex: Send + Sync {
    /// Insert or update one evidence item.
    async fn upsert(&self, evidence: &Evidence) -> Result<(), ProviderError>;

    /// Retrieve up to `limit` evidence items ranked by similarity to `text`.
    async fn query(&self, text: &str, limit: usize) -> Result<Vec<Evidence>, ProviderError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_planned_task_defaults_to_web() {
        let task = PlannedTask::web("quantum error correction");
        assert_eq!(task.sources, vec![SourceCategory::Web]);
        assert_eq!(task.query, "quantum error correction");
    }

    #[test]
    fn test_source_category_default() {
        assert_eq!(SourceCategory::default(), SourceCategory::Web);
    }
}
