//! Language-model calculator: forwards a word problem to the responder.
//!
//! Less precise than [`crate::calculator`] or [`crate::abs_difference`], but
//! handles questions whose numbers are buried in prose
//! (`'half of Mount Everest height in meters?', ['8849 m']`).

use std::sync::Arc;

use async_trait::async_trait;
use stepforge_core::error::ToolError;
use stepforge_core::message::Message;
use stepforge_core::responder::Responder;
use stepforge_core::tool::{Tool, ToolOutput};

use crate::args::parse_arguments;

const SYSTEM_PROMPT: &str = "You are a calculation assistant.";

pub struct LlmMathTool {
    responder: Arc<dyn Responder>,
}

impl LlmMathTool {
    pub fn new(responder: Arc<dyn Responder>) -> Self {
        Self { responder }
    }
}

/// Build the question text: the first argument, followed by any further
/// arguments as context.
fn question_text(args: &str) -> String {
    match parse_arguments(args) {
        Ok(items) if !items.is_empty() => {
            let question = items[0].as_text();
            let context: Vec<String> = items[1..].iter().map(|v| v.as_text()).collect();
            if context.is_empty() {
                question
            } else {
                format!("{question}\nContext: {}", context.join("; "))
            }
        }
        _ => args.trim().to_string(),
    }
}

#[async_trait]
impl Tool for LlmMathTool {
    fn name(&self) -> &str {
        "math_llm"
    }

    fn description(&self) -> &str {
        "Answer a calculation question using the language model. Takes a question and optional context values."
    }

    async fn invoke(&self, args: &str) -> Result<ToolOutput, ToolError> {
        let question = question_text(args);
        if question.is_empty() {
            return Err(ToolError::InvalidArguments("Missing question".into()));
        }

        let messages = vec![
            Message::system(SYSTEM_PROMPT),
            Message::user(format!(
                "Answer the question. Differences are absolute values. \
                 Reply with the number only, in the units asked.\n\nQuestion: {question}"
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
