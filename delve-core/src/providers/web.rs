//! Built-in web search via the DuckDuckGo instant answer API.
//!
//! Keyless and privacy-first: queries go directly to DuckDuckGo. The
//! transport timeout lives on the HTTP client; a timed-out request
//! surfaces as a provider error and counts as a breaker failure.

use async_trait::async_trait;
use std::time::Duration;
use tracing::debug;

use super::{SearchHit, SearchProvider};
use crate::config::SearchConfig;
use crate::error::ProviderError;

const PROVIDER_NAME: &str = "duckduckgo";

/// Search provider backed by the DuckDuckGo instant answer API.
pub struct DuckDuckGoSearch {
    client: reqwest::Client,
    max_results: usize,
    timeout_secs: u64,
}

impl DuckDuckGoSearch {
    pub fn new(config: SearchConfig) -> Result<Self, ProviderError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .user_agent(config.user_agent.clone())
            .build()
            .map_err(|e| ProviderError::Connection {
                provider: PROVIDER_NAME.to_string(),
                message: format!("Failed to build HTTP client: {e}"),
            })?;
        Ok(Self {
            client,
            max_results: config.max_results,
            timeout_secs: config.timeout_secs,
        })
    }

    fn map_transport_error(&self, e: reqwest::Error) -> ProviderError {
        if e.is_timeout() {
            ProviderError::Timeout {
                provider: PROVIDER_NAME.to_string(),
                timeout_secs: self.timeout_secs,
            }
        } else if e.is_connect() {
            ProviderError::Connection {
                provider: PROVIDER_NAME.to_string(),
                message: e.to_string(),
            }
        } else {
            ProviderError::Http {
                provider: PROVIDER_NAME.to_string(),
                message: e.to_string(),
            }
        }
    }

    /// Extract hits from an instant answer payload: the abstract first,
    /// then related topics.
    fn parse_hits(&self, body: &serde_json::Value) -> Vec<SearchHit> {
        let mut hits = Vec::new();

        if let Some(abstract_text) = body.get("AbstractText").and_then(|v| v.as_str()) {
            if !abstract_text.is_empty() {
                hits.push(SearchHit {
                    url: body
                        .get("AbstractURL")
                        .and_then(|v| v.as_str())
                        .unwrap_or("")
                        .to_string(),
                    title: body
                        .get("Heading")
                        .and_then(|v| v.as_str())
                        .unwrap_or("Abstract")
                        .to_string(),
                    content: abstract_text.to_string(),
                });
            }
        }

        if let Some(topics) = body.get("RelatedTopics").and_then(|v| v.as_array()) {
            for topic in topics {
                if hits.len() >= self.max_results {
                    break;
                }
                if let Some(text) = topic.get("Text").and_then(|v| v.as_str()) {
                    if text.is_empty() {
                        continue;
                    }
                    let url = topic
                        .get("FirstURL")
                        .and_then(|v| v.as_str())
                        .unwrap_or("")
                        .to_string();
                    // Topic titles are the first clause of the text.
                    let title = text.split(" - ").next().unwrap_or(text).to_string();
                    hits.push(SearchHit {
                        url,
                        title,
                        content: text.to_string(),
                    });
                }
            }
        }

        hits.truncate(self.max_results);
        hits
    }
}

#[async_trait]
impl SearchProvider for DuckDuckGoSearch {
    fn name(&self) -> &str {
        PROVIDER_NAME
    }

    async fn search(&self, query: &str) -> Result<Vec<SearchHit>, ProviderError> {
        let url = format!(
            "https://api.duckduckgo.com/?q={}&format=json&no_html=1&skip_disambig=1",
            urlencoding::encode(query)
        );

        let response = self
            .client
            .get(&url)
            .send()
            .await
            .map_err(|e| self.map_transport_error(e))?;

        let body: serde_json::Value = response
            .json()
            .await
            .map_err(|e| ProviderError::MalformedPayload {
                provider: PROVIDER_NAME.to_string(),
                message: format!("Failed to parse search response: {e}"),
            })?;

        let hits = self.parse_hits(&body);
        debug!(query, hits = hits.len(), "Search completed");
        // An empty hit list is a valid result, not an error.
        Ok(hits)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn provider() -> DuckDuckGoSearch {
        DuckDuckGoSearch::new(SearchConfig::default()).unwrap()
    }

    #[test]
    fn test_parse_abstract_and_topics() {
        let body = json!({
            "AbstractText": "A summary of the topic.",
            "AbstractURL": "https://en.wikipedia.org/wiki/Topic",
            "Heading": "Topic",
            "RelatedTopics": [
                {"Text": "Aspect one - details", "FirstURL": "https://a.example/1"},
                {"Text": "Aspect two - details", "FirstURL": "https://a.example/2"}
            ]
        });

        let hits = provider().parse_hits(&body);
        assert_eq!(hits.len(), 3);
        assert_eq!(hits[0].content, "A summary of the topic.");
        assert_eq!(hits[1].title, "Aspect one");
    }

    #[test]
    fn test_parse_empty_payload_yields_no_hits() {
        let hits = provider().parse_hits(&json!({}));
        assert!(hits.is_empty());
    }

    #[test]
    fn test_parse_respects_max_results() {
        let topics: Vec<_> = (0..20)
            .map(|i| json!({"Text": format!("Topic {i}"), "FirstURL": "https://a.example"}))
            .collect();
        let body = json!({"RelatedTopics": topics});
        let hits = provider().parse_hits(&body);
        assert_eq!(hits.len(), SearchConfig::default().max_results);
    }

    #[test]
    fn test_empty_abstract_is_skipped() {
        let body = json!({"AbstractText": "", "RelatedTopics": []});
        let hits = provider().parse_hits(&body);
        assert!(hits.is_empty());
    }
}
