//! Web search tool: stub that returns mock search results.
//!
//! Results are deterministic and offline so plans can be run end-to-end
//! without network access. The output is a JSON array of
//! `{title, url, snippet}` objects.

use async_trait::async_trait;
use serde::Serialize;
use stepforge_core::error::ToolError;
use stepforge_core::tool::{Tool, ToolOutput};

use crate::args::primary_text;

/// Results returned when no limit is configured.
pub const DEFAULT_RESULT_LIMIT: usize = 3;

pub struct WebSearchTool {
    result_limit: usize,
}

impl WebSearchTool {
    pub fn new(result_limit: usize) -> Self {
        Self {
            result_limit: result_limit.max(1),
        }
    }

    /// Run a search without going through the tool interface.
    pub fn search(&self, query: &str) -> Vec<SearchResult> {
        generate_mock_results(query, self.result_limit)
    }
}

impl Default for WebSearchTool {
    fn default() -> Self {
        Self::new(DEFAULT_RESULT_LIMIT)
    }
}

#[async_trait]
impl Tool for WebSearchTool {
    fn name(&self) -> &str {
        "web_search"
    }

    fn description(&self) -> &str {
        "Search the web for information. Takes a query string and returns a list of relevant results with titles, URLs, and snippets."
    }

    async fn invoke(&self, args: &str) -> Result<ToolOutput, ToolError> {
        let query = primary_text(args);
        if query.trim().is_empty() {
            return Err(ToolError::InvalidArguments("Missing query".into()));
        }

        let results = self.search(&query);
        tracing::debug!(query = %query, results = results.len(), "Mock web search");
        ToolOutput::from_serialize(&results).map_err(|e| ToolError::ExecutionFailed {
            tool_name: self.name().to_string(),
            reason: e.to_string(),
        })
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct SearchResult {
    pub title: String,
    pub url: String,
    pub snippet: String,
}

fn generate_mock_results(query: &str, count: usize) -> Vec<SearchResult> {
    let q = query.to_lowercase();

    // Context-aware results for a few common topics.
    let templates: Vec<(&str, Vec<SearchResult>)> = vec![
        ("population", vec![
            SearchResult {
                title: "World Population Review".into(),
                url: "https://worldpopulationreview.com/".into(),
                snippet: "Population figures for cities and countries, updated yearly from census estimates.".into(),
            },
            SearchResult {
                title: "City population statistics".into(),
                url: "https://www.citypopulation.de/".into(),
                snippet: "Population statistics for cities, agglomerations and administrative divisions of all countries.".into(),
            },
        ]),
        ("rust", vec![
            SearchResult {
                title: "The Rust Programming Language".into(),
                url: "https://doc.rust-lang.org/book/".into(),
                snippet: "Rust is a systems programming language focused on safety, speed, and concurrency.".into(),
            },
            SearchResult {
                title: "crates.io: Rust Package Registry".into(),
                url: "https://crates.io/".into(),
                snippet: "The Rust community's crate registry for sharing and discovering Rust libraries.".into(),
            },
        ]),
    ];

    for (keyword, results) in templates {
        if q.contains(keyword) {
            return results.into_iter().take(count).collect();
        }
    }

    // Generic fallback.
    (0..count)
        .map(|i| SearchResult {
            title: format!("Result {} for: {}", i + 1, query),
            url: format!("https://example.com/search?q={}&p={}", query.replace(' ', "+"), i + 1),
            snippet: format!("Mock search result for the query '{}'.", query),
        })
        .collect()
}
