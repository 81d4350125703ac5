//! Heuristic query planning.
//!
//! Breaks a research query into independently executable sub-tasks using
//! structural analysis: comparative questions split into their parts,
//! "how to" questions gain a practical-steps task, and academic-sounding
//! queries are directed at academic sources.

use async_trait::async_trait;
use uuid::Uuid;

use crate::error::ProviderError;
use crate::providers::{PlannedTask, Planner, SourceCategory};

/// Rule-based planner; the default when no external planner is wired.
#[derive(Default)]
pub struct HeuristicPlanner;

impl HeuristicPlanner {
    pub fn new() -> Self {
        Self
    }

    fn suggest_sources(query: &str) -> Vec<SourceCategory> {
        let lower = query.to_lowercase();
        let mut sources = vec![SourceCategory::Web];
        if lower.contains("paper") || lower.contains("research") || lower.contains("study") {
            sources.push(SourceCategory::Academic);
        }
        if lower.contains("news") || lower.contains("recent") || lower.contains("latest") {
            sources.push(SourceCategory::News);
        }
        sources
    }

    /// Split a comparative question into its constituent parts.
    fn split_comparative(query: &str) -> Vec<String> {
        let separators = [" vs ", " versus ", " compared to "];
        for sep in &separators {
            if query.contains(sep) {
                return query
                    .split(sep)
                    .map(|s| s.trim().to_string())
                    .filter(|s| !s.is_empty())
                    .collect();
            }
        }
        Vec::new()
    }
}

#[async_trait]
impl Planner for HeuristicPlanner {
    fn name(&self) -> &str {
        "heuristic_planner"
    }

    async fn plan(&self, query: &str) -> Result<Vec<PlannedTask>, ProviderError> {
        let mut tasks = vec![PlannedTask {
            id: Uuid::new_v4(),
            query: query.to_string(),
            sources: Self::suggest_sources(query),
        }];

        for part in Self::split_comparative(query) {
            tasks.push(PlannedTask {
                id: Uuid::new_v4(),
                query: part.clone(),
                sources: Self::suggest_sources(&part),
            });
        }

        if query.to_lowercase().starts_with("how") {
            tasks.push(PlannedTask {
                id: Uuid::new_v4(),
                query: format!("practical steps for {query}"),
                sources: vec![SourceCategory::Web, SourceCategory::Documentation],
            });
        }

        Ok(tasks)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_simple_query_yields_one_task() {
        let planner = HeuristicPlanner::new();
        let tasks = planner.plan("What is prompt caching?").await.unwrap();
        assert_eq!(tasks.len(), 1);
        assert_eq!(tasks[0].query, "What is prompt caching?");
        assert!(tasks[0].sources.contains(&SourceCategory::Web));
    }

    #[tokio::test]
    async fn test_comparative_query_splits() {
        let planner = HeuristicPlanner::new();
        let tasks = planner.plan("Redis vs Memcached for caching").await.unwrap();
        assert_eq!(tasks.len(), 3);
        assert_eq!(tasks[1].query, "Redis");
        assert_eq!(tasks[2].query, "Memcached for caching");
    }

    #[tokio::test]
    async fn test_how_to_query_adds_steps_task() {
        let planner = HeuristicPlanner::new();
        let tasks = planner.plan("How to deploy a Rust service").await.unwrap();
        assert_eq!(tasks.len(), 2);
        assert!(tasks[1].query.starts_with("practical steps"));
    }

    #[tokio::test]
    async fn test_academic_queries_target_academic_sources() {
        let planner = HeuristicPlanner::new();
        let tasks = planner
            .plan("research papers on attention mechanisms")
            .await
            .unwrap();
        assert!(tasks[0].sources.contains(&SourceCategory::Academic));
    }
}
