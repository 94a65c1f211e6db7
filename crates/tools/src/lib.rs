//! Built-in tool implementations for StepForge.
//!
//! Tools are what plan steps invoke: arithmetic, an offline web search,
//! responder-backed summarisation and word-problem solving, and a few
//! deterministic helpers. All of them take the step's argument text and
//! parse it with [`args::parse_arguments`].

pub mod abs_difference;
pub mod args;
pub mod calculator;
pub mod echo;
pub mod llm_math;
pub mod search_summary;
pub mod web_search;

#[cfg(test)]
pub(crate) mod test_helpers;

use std::sync::Arc;

use stepforge_config::ToolsConfig;
use stepforge_core::responder::Responder;
use stepforge_core::tool::{ToolOutput, ToolRegistry};

/// Numeric output: integral values become JSON integers so they substitute
/// as `20` rather than `20.0`.
pub(crate) fn number_output(value: f64) -> ToolOutput {
    if value.fract() == 0.0 && value.abs() < 1e15 {
        ToolOutput::from(value as i64)
    } else {
        ToolOutput::from(value)
    }
}

/// Create a tool registry with every built-in tool that needs no responder.
pub fn default_registry() -> ToolRegistry {
    registry_from_config(&ToolsConfig::default(), None)
}

/// Default registry plus the responder-backed tools (`search`, `math_llm`).
pub fn registry_with_responder(responder: Arc<dyn Responder>) -> ToolRegistry {
    registry_from_config(&ToolsConfig::default(), Some(responder))
}

/// Build a registry from the `[tools]` config section.
pub fn registry_from_config(
    config: &ToolsConfig,
    responder: Option<Arc<dyn Responder>>,
) -> ToolRegistry {
    let mut registry = ToolRegistry::new()
        .with(calculator::CalculatorTool)
        .with(web_search::WebSearchTool::new(config.search_result_limit))
        .with(abs_difference::AbsDifferenceTool::new())
        .with(abs_difference::AbsDifferenceTool::named("math_code"))
        .with(echo::EchoTool);

    if let Some(responder) = responder {
        let search = web_search::WebSearchTool::new(config.search_result_limit);
        registry.register(Box::new(
            search_summary::SummarizedSearchTool::new(search, responder.clone())
                .with_context_chars(config.search_context_chars),
        ));
        registry.register(Box::new(llm_math::LlmMathTool::new(responder)));
    }

    tracing::debug!(tools = registry.len(), "Built-in tool registry ready");
    registry
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_helpers::CapturingResponder;

    #[test]
    fn default_registry_has_offline_tools() {
        let registry = default_registry();
        assert_eq!(
            registry.names(),
            vec!["abs_difference", "calculator", "echo", "math_code", "web_search"]
        );
    }

    #[test]
    fn responder_adds_llm_tools() {
        let registry = registry_with_responder(Arc::new(CapturingResponder::new("ok")));
        assert!(registry.contains("search"));
        assert!(registry.contains("math_llm"));
        assert_eq!(registry.len(), 7);
    }

    #[tokio::test]
    async fn math_code_runs_abs_difference() {
        let registry = default_registry();
        let out = registry
            .invoke("math_code", "'population difference', ['8,336,817', '2,794,356']")
            .await
            .unwrap();
        assert_eq!(out.render(), "5542461");
    }

    #[tokio::test]
    async fn config_limits_search_results() {
        let config = ToolsConfig {
            search_result_limit: 1,
            ..ToolsConfig::default()
        };
        let registry = registry_from_config(&config, None);
        let out = registry.invoke("web_search", "'anything'").await.unwrap();
        assert_eq!(out.value().as_array().unwrap().len(), 1);
    }

    #[test]
    fn integral_numbers_render_without_fraction() {
        assert_eq!(number_output(20.0).render(), "20");
        assert_eq!(number_output(-3.0).render(), "-3");
        assert_eq!(number_output(2.5).render(), "2.5");
    }
}
