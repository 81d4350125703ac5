//! Report assembly from collected evidence.
//!
//! `EvidenceReportWriter` renders a deterministic markdown report directly
//! from the evidence list. It is the default writer and also the fallback
//! the orchestrator uses when an external writer fails or the call budget
//! is spent, so a session always ends with a report.

use async_trait::async_trait;

use super::evidence::Evidence;
use crate::error::ProviderError;
use crate::providers::ReportWriter;

/// Render a report straight from the evidence list, with no narrative
/// synthesis. States explicitly when no evidence was found.
pub fn render_evidence_report(query: &str, evidence: &[Evidence]) -> String {
    let mut out = format!("# Research Report: {query}\n\n");

    if evidence.is_empty() {
        out.push_str(
            "No evidence was found for this query. External sources were \
             unavailable or returned no usable results.\n",
        );
        return out;
    }

    out.push_str("## Findings\n\n");
    for (i, item) in evidence.iter().enumerate() {
        out.push_str(&format!(
            "{}. {}\n   — {} ({})\n",
            i + 1,
            item.excerpt,
            item.source_title,
            item.source_url,
        ));
    }

    out.push_str(&format!(
        "\n## Sources\n\n{} evidence items collected.\n",
        evidence.len()
    ));
    out
}

/// The built-in writer: deterministic evidence listing.
#[derive(Default)]
pub struct EvidenceReportWriter;

impl EvidenceReportWriter {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl ReportWriter for EvidenceReportWriter {
    fn name(&self) -> &str {
        "evidence_writer"
    }

    async fn write(&self, query: &str, evidence: &[Evidence]) -> Result<String, ProviderError> {
        Ok(render_evidence_report(query, evidence))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::research::evidence::content_hash;
    use uuid::Uuid;

    fn evidence(excerpt: &str) -> Evidence {
        Evidence {
            id: Uuid::new_v4(),
            source_url: "https://a.example/1".into(),
            source_title: "Example Source".into(),
            excerpt: excerpt.into(),
            content_hash: content_hash(excerpt),
            origin_query: "q".into(),
            origin_iteration: 1,
        }
    }

    #[test]
    fn test_empty_evidence_states_none_found() {
        let report = render_evidence_report("test query", &[]);
        assert!(report.contains("No evidence was found"));
        assert!(report.contains("test query"));
    }

    #[test]
    fn test_report_lists_evidence_with_attribution() {
        let report =
            render_evidence_report("q", &[evidence("first fact"), evidence("second fact")]);
        assert!(report.contains("first fact"));
        assert!(report.contains("second fact"));
        assert!(report.contains("Example Source"));
        assert!(report.contains("2 evidence items"));
    }

    #[tokio::test]
    async fn test_writer_trait_impl() {
        let writer = EvidenceReportWriter::new();
        let report = writer.write("q", &[]).await.unwrap();
        assert!(report.contains("No evidence was found"));
    }
}
