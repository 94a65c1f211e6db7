//! Answer synthesis from an execution log.

use std::sync::Arc;

use stepforge_core::error::ProviderError;
use stepforge_core::message::Message;
use stepforge_core::responder::Responder;
use tracing::info;

use crate::executor::{ExecutionLog, StepStatus};

const SYSTEM_PROMPT: &str =
    "You are an assistant that analyses the results of executed steps and answers questions.";

/// Asks a responder to answer a question from the observations of a run.
pub struct Synthesizer {
    responder: Arc<dyn Responder>,
}

impl Synthesizer {
    pub fn new(responder: Arc<dyn Responder>) -> Self {
        Self { responder }
    }

    /// `[system, user]` messages carrying the question and one line per step.
    pub fn messages(&self, question: &str, log: &ExecutionLog) -> Vec<Message> {
        let results: String = log
            .entries
            .iter()
            .map(|entry| {
                let outcome = match (&entry.observation, &entry.error) {
                    (Some(observation), _) => observation.render(),
                    (None, Some(error)) => format!("[failed] {error}"),
                    (None, None) if entry.status == StepStatus::Skipped => "[skipped]".into(),
                    (None, None) => format!("[{}]", entry.status),
                };
                format!("{}. {}({}) => {}", entry.index, entry.tool, entry.raw_args, outcome)
            })
            .collect::<Vec<_>>()
            .join("\n");

        let user = format!(
            "Based on the execution results and the original question below, give a concise answer.\n\n\
            Original question: {question}\n\n\
            Execution results:\n{results}\n\n\
            Combine the information and answer the original question."
        );

        vec![Message::system(SYSTEM_PROMPT), Message::user(user)]
    }

    pub async fn synthesize(
        &self,
        question: &str,
        log: &ExecutionLog,
    ) -> Result<String, ProviderError> {
        info!(responder = self.responder.name(), steps = log.entries.len(), "Synthesizing answer");
        self.responder.respond(&self.messages(question, log)).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::executor::StepRecord;
    use crate::test_helpers::SequentialMockResponder;
    use stepforge_core::tool::ToolOutput;

    fn record(index: usize, status: StepStatus, observation: Option<&str>) -> StepRecord {
        StepRecord {
            index,
            tool: "search".into(),
            line: index,
            raw_args: format!("'q{index}'"),
            resolved_args: None,
            status,
            observation: observation.map(ToolOutput::from),
            error: (status == StepStatus::Failed).then(|| "boom".to_string()),
            unresolved: vec![],
            attempts: 1,
            duration_ms: 0,
        }
    }

    #[test]
    fn messages_list_every_step() {
        let log = ExecutionLog {
            entries: vec![
                record(1, StepStatus::Done, Some("100")),
                record(2, StepStatus::Failed, None),
                record(3, StepStatus::Skipped, None),
            ],
            ..Default::default()
        };
        let synthesizer = Synthesizer::new(Arc::new(SequentialMockResponder::new(vec![])));
        let messages = synthesizer.messages("What is it?", &log);

        assert_eq!(messages.len(), 2);
        let user = &messages[1].content;
        assert!(user.contains("Original question: What is it?"));
        assert!(user.contains("1. search('q1') => 100"));
        assert!(user.contains("2. search('q2') => [failed] boom"));
        assert!(user.contains("3. search('q3') => [skipped]"));
    }

    #[tokio::test]
    async fn synthesize_returns_reply() {
        let responder = Arc::new(SequentialMockResponder::new(vec!["The answer is 20."]));
        let answer = Synthesizer::new(responder.clone())
            .synthesize("q", &ExecutionLog::default())
            .await
            .unwrap();
        assert_eq!(answer, "The answer is 20.");
        assert_eq!(responder.requests().len(), 1);
    }
}
