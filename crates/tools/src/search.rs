//! Web search tool backed by the DuckDuckGo Instant Answer API.
//!
//! The API needs no key. Results come from the abstract (when the query
//! names a well-known topic) followed by related topics, flattened out of
//! their category groups.

use async_trait::async_trait;
use convoy_core::error::ToolError;
use convoy_core::tool::{Tool, ToolResult};
use serde::{Deserialize, Serialize};
use std::time::Duration;

pub const DEFAULT_ENDPOINT: &str = "https://api.duckduckgo.com/";
const DEFAULT_MAX_RESULTS: u64 = 5;
const MAX_RESULTS_CAP: u64 = 10;

pub struct SearchWebTool {
    client: reqwest::Client,
    endpoint: String,
}

impl SearchWebTool {
    pub fn new(endpoint: impl Into<String>, user_agent: &str) -> Self {
        let client = reqwest::Client::builder()
            .user_agent(user_agent)
            .timeout(Duration::from_secs(10))
            .build()
            .unwrap_or_default();
        Self {
            client,
            endpoint: endpoint.into(),
        }
    }
}

impl Default for SearchWebTool {
    fn default() -> Self {
        Self::new(DEFAULT_ENDPOINT, concat!("convoy/", env!("CARGO_PKG_VERSION")))
    }
}

#[async_trait]
impl Tool for SearchWebTool {
    fn name(&self) -> &str {
        "search_web"
    }

    fn description(&self) -> &str {
        "Search the web for current information. Returns titles, URLs and snippets."
    }

    fn parameters_schema(&self) -> serde_json::Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "query": {
                    "type": "string",
                    "description": "Search query to find information on the web"
                },
                "max_results": {
                    "type": "integer",
                    "description": "Maximum number of results to return",
                    "default": DEFAULT_MAX_RESULTS
                }
            },
            "required": ["query"]
        })
    }

    async fn execute(&self, arguments: serde_json::Value) -> Result<ToolResult, ToolError> {
        let query = arguments["query"]
            .as_str()
            .map(str::trim)
            .filter(|q| !q.is_empty())
            .ok_or_else(|| ToolError::InvalidArguments("Missing 'query' argument".into()))?;
        let max_results = arguments["max_results"]
            .as_u64()
            .unwrap_or(DEFAULT_MAX_RESULTS)
            .clamp(1, MAX_RESULTS_CAP) as usize;

        let failed = |reason: String| ToolError::ExecutionFailed {
            tool_name: "search_web".into(),
            reason,
        };

        tracing::debug!(query, max_results, "Searching the web");

        let response = self
            .client
            .get(&self.endpoint)
            .query(&[
                ("q", query),
                ("format", "json"),
                ("no_html", "1"),
                ("skip_disambig", "1"),
            ])
            .send()
            .await
            .map_err(|e| failed(format!("Search request failed: {e}")))?;

        if !response.status().is_success() {
            return Err(failed(format!(
                "Search endpoint returned HTTP {}",
                response.status().as_u16()
            )));
        }

        let body: InstantAnswer = response
            .json()
            .await
            .map_err(|e| failed(format!("Unreadable search response: {e}")))?;

        let results = body.into_results(max_results);
        let output = if results.is_empty() {
            format!("No results found for '{query}'")
        } else {
            serde_json::to_string_pretty(&results).map_err(|e| failed(e.to_string()))?
        };

        let data = serde_json::to_value(&results)
            .map_err(|e| failed(format!("Failed to encode results: {e}")))?;
        Ok(ToolResult::text(output).with_data(data))
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SearchResult {
    pub title: String,
    pub url: String,
    pub snippet: String,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "PascalCase", default)]
struct InstantAnswer {
    heading: String,
    abstract_text: String,
    #[serde(rename = "AbstractURL")]
    abstract_url: String,
    related_topics: Vec<RelatedTopic>,
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum RelatedTopic {
    Entry {
        #[serde(rename = "Text")]
        text: String,
        #[serde(rename = "FirstURL")]
        first_url: String,
    },
    Group {
        #[serde(rename = "Topics")]
        topics: Vec<RelatedTopic>,
    },
}

impl InstantAnswer {
    fn into_results(self, limit: usize) -> Vec<SearchResult> {
        let mut results = Vec::new();
        if !self.abstract_text.is_empty() {
            results.push(SearchResult {
                title: if self.heading.is_empty() {
                    "Summary".into()
                } else {
                    self.heading
                },
                url: self.abstract_url,
                snippet: self.abstract_text,
            });
        }
        flatten_topics(self.related_topics, &mut results);
        results.truncate(limit);
        results
    }
}

fn flatten_topics(topics: Vec<RelatedTopic>, out: &mut Vec<SearchResult>) {
    for topic in topics {
        match topic {
            RelatedTopic::Entry { text, first_url } => {
                // Topic text reads "Title - description"; split on the first dash.
                let (title, snippet) = match text.split_once(" - ") {
                    Some((t, s)) => (t.to_string(), s.to_string()),
                    None => (text.clone(), text),
                };
                out.push(SearchResult {
                    title,
                    url: first_url,
                    snippet,
                });
            }
            RelatedTopic::Group { topics } => flatten_topics(topics, out),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = r#"{
        "Heading": "Rust (programming language)",
        "AbstractText": "Rust is a general-purpose programming language.",
        "AbstractURL": "https://en.wikipedia.org/wiki/Rust_(programming_language)",
        "RelatedTopics": [
            {"Text": "Cargo - Rust package manager", "FirstURL": "https://duckduckgo.com/Cargo"},
            {"Name": "Tools", "Topics": [
                {"Text": "Clippy - A collection of lints", "FirstURL": "https://duckduckgo.com/Clippy"},
                {"Text": "rustfmt", "FirstURL": "https://duckduckgo.com/rustfmt"}
            ]}
        ]
    }"#;

    #[test]
    fn abstract_comes_first_then_flattened_topics() {
        let answer: InstantAnswer = serde_json::from_str(SAMPLE).unwrap();
        let results = answer.into_results(10);

        assert_eq!(results.len(), 4);
        assert_eq!(results[0].title, "Rust (programming language)");
        assert_eq!(results[1].title, "Cargo");
        assert_eq!(results[1].snippet, "Rust package manager");
        assert_eq!(results[2].title, "Clippy");
        assert_eq!(results[3].title, "rustfmt");
        assert_eq!(results[3].snippet, "rustfmt");
    }

    #[test]
    fn limit_truncates_results() {
        let answer: InstantAnswer = serde_json::from_str(SAMPLE).unwrap();
        assert_eq!(answer.into_results(2).len(), 2);
    }

    #[test]
    fn empty_answer_yields_no_results() {
        let answer: InstantAnswer = serde_json::from_str("{}").unwrap();
        assert!(answer.into_results(5).is_empty());
    }

    #[tokio::test]
    async fn blank_query_is_rejected_before_any_request() {
        let tool = SearchWebTool::new("http://127.0.0.1:9/", "test");
        let err = tool
            .execute(serde_json::json!({"query": "   "}))
            .await
            .unwrap_err();
        assert!(matches!(err, ToolError::InvalidArguments(_)));
    }

    #[tokio::test]
    async fn unreachable_endpoint_is_an_execution_failure() {
        let tool = SearchWebTool::new("http://127.0.0.1:9/", "test");
        let err = tool
            .execute(serde_json::json!({"query": "rust"}))
            .await
            .unwrap_err();
        assert!(matches!(err, ToolError::ExecutionFailed { .. }));
    }

    #[test]
    fn tool_definition() {
        let def = SearchWebTool::default().to_definition();
        assert_eq!(def.name, "search_web");
        assert_eq!(def.parameters["required"][0], "query");
    }
}
