//! Summarized search: runs a web search and asks the responder to condense
//! the results into a single sentence (or a bare number when the query asks
//! for one).

use std::sync::Arc;

use async_trait::async_trait;
use stepforge_core::error::ToolError;
use stepforge_core::message::Message;
use stepforge_core::responder::Responder;
use stepforge_core::tool::{Tool, ToolOutput};

use crate::args::primary_text;
use crate::web_search::{SearchResult, WebSearchTool};

/// Default size of the context window handed to the responder, in chars.
pub const DEFAULT_CONTEXT_CHARS: usize = 8000;

const SYSTEM_PROMPT: &str = "You are an insight researcher. Summarize the search results \
for the user's query in one sentence, as simply as possible. If the query asks for a \
specific numerical value, reply with the number only.";

pub struct SummarizedSearchTool {
    search: WebSearchTool,
    responder: Arc<dyn Responder>,
    context_chars: usize,
}

impl SummarizedSearchTool {
    pub fn new(search: WebSearchTool, responder: Arc<dyn Responder>) -> Self {
        Self {
            search,
            responder,
            context_chars: DEFAULT_CONTEXT_CHARS,
        }
    }

    /// Cap the number of characters of search context sent to the responder.
    pub fn with_context_chars(mut self, context_chars: usize) -> Self {
        self.context_chars = context_chars;
        self
    }
}

/// Concatenate result snippets, stopping once `limit` chars are used.
/// The snippet that crosses the limit is cut to fit.
pub fn build_context(results: &[SearchResult], limit: usize) -> String {
    let mut context = String::new();
    let mut used = 0usize;

    for result in results {
        if used >= limit {
            break;
        }
        let page = format!("{}\n{}", result.title, result.snippet);
        let len = page.chars().count();
        if used + len > limit {
            let remaining = limit - used;
            let cut: String = page.chars().take(remaining).collect();
            context.push_str(cut.trim());
            context.push_str("\n\n");
            break;
        }
        used += len;
        context.push_str(&page);
        context.push_str("\n\n");
    }

    context
}

#[async_trait]
impl Tool for SummarizedSearchTool {
    fn name(&self) -> &str {
        "search"
    }

    fn description(&self) -> &str {
        "Search the web and return a one-sentence summary of what was found. For numeric questions only the number is returned."
    }

    async fn invoke(&self, args: &str) -> Result<ToolOutput, ToolError> {
        let query = primary_text(args);
        if query.trim().is_empty() {
            return Err(ToolError::InvalidArguments("Missing query".into()));
        }

        let results = self.search.search(&query);
        let context = build_context(&results, self.context_chars);
        tracing::debug!(
            query = %query,
            results = results.len(),
            context_chars = context.chars().count(),
            responder = self.responder.name(),
            "Summarizing search results"
        );

        let messages = vec![
            Message::system(SYSTEM_PROMPT),
            Message::user(format!(
                "The search query: {query}\nThe search results:\n{context}"
            )),
        ];

        let answer = self
            .responder
            .respond(&messages)
            .await
            .map_err(|e| ToolError::from_provider(self.name(), e))?;

        Ok(ToolOutput::from(answer.trim().to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_helpers::CapturingResponder;

    fn result(title: &str, snippet: &str) -> SearchResult {
        SearchResult {
            title: title.into(),
            url: "https://example.com".into(),
            snippet: snippet.into(),
        }
    }

    #[test]
    fn context_truncated_at_limit() {
        let results = vec![result("T1", "aaaa"), result("T2", "bbbb")];
        // "T1\naaaa" is 7 chars; the second page gets 3 chars.
        let context = build_context(&results, 10);
        assert_eq!(context, "T1\naaaa\n\nT2\n\n");
    }

    #[test]
    fn context_unbounded_when_large_limit() {
        let results = vec![result("T1", "aaaa"), result("T2", "bbbb")];
        let context = build_context(&results, 1000);
        assert!(context.contains("aaaa"));
        assert!(context.contains("bbbb"));
    }

    #[tokio::test]
    async fn asks_responder_with_query_and_results() {
        let responder = Arc::new(CapturingResponder::new(" 100 "));
        let tool = SummarizedSearchTool::new(WebSearchTool::default(), responder.clone());

        let out = tool.invoke("'population of city A'").await.unwrap();
        assert_eq!(out.render(), "100");

        let seen = responder.last_messages();
        assert_eq!(seen.len(), 2);
        assert!(seen[1].content.contains("population of city A"));
        assert!(seen[1].content.contains("World Population Review"));
    }

    #[tokio::test]
    async fn responder_failure_becomes_tool_failure() {
        let responder = Arc::new(CapturingResponder::failing());
        let tool = SummarizedSearchTool::new(WebSearchTool::default(), responder);
        let err = tool.invoke("'anything'").await.unwrap_err();
        assert!(matches!(err, ToolError::ExecutionFailed { .. }));
    }
}
