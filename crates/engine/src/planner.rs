//! Plan generation.
//!
//! The planner asks a responder for a numbered plan. Its system message lists
//! every registered tool as `N. name: description` followed by the line
//! format and a few worked examples; the user message is the question. The
//! reply is returned untouched so the caller can parse it (and keep the raw
//! text for diagnostics).

use std::sync::Arc;

use stepforge_core::error::ProviderError;
use stepforge_core::message::Message;
use stepforge_core::responder::Responder;
use stepforge_core::tool::ToolRegistry;
use tracing::{debug, info};

const INSTRUCTIONS: &str = "\
Let's first understand the problem and devise a plan to solve it.
Output the plan under the heading \"Plan:\" followed by a numbered list of steps.
Use the fewest steps that complete the task.
Each step is one line of the form `N. tool_name(arguments)` and may use one of
the following tools:
";

const FORMAT_NOTES: &str = "\
Refer to the output of an earlier step with $N or ${N}, where N is that step's
number. A step may only refer to steps with a smaller number.
";

const EXAMPLES: &str = "\
Question: If the cheetah were 1.3 times slower and the greyhound 1.5 times faster, what is the ratio of the faster to the slower speed?
1. search(\"cheetah top speed\")
2. math_llm(\"What is the speed in km/h if the cheetah were 1.3 times slower?\", [\"$1\"])
3. search(\"greyhound top speed\")
4. math_llm(\"What is the speed in km/h if the greyhound were 1.5 times faster?\", [\"$3\"])
5. calculator(\"max($2, $4) / min($2, $4)\")
Thought: I can answer the question now.
###

Question: What is the difference in height between Mount Everest and Kilimanjaro?
1. search(\"Mount Everest height\")
2. search(\"Kilimanjaro height\")
3. abs_difference(\"height difference in meters\", [\"$1\", \"$2\"])
Thought: I can answer the question now.
###
";

/// Generates plan text for a question.
pub struct Planner {
    responder: Arc<dyn Responder>,
    tools: Arc<ToolRegistry>,
    examples: bool,
}

impl Planner {
    pub fn new(responder: Arc<dyn Responder>, tools: Arc<ToolRegistry>) -> Self {
        Self {
            responder,
            tools,
            examples: true,
        }
    }

    /// Leave the worked examples out of the system message.
    pub fn without_examples(mut self) -> Self {
        self.examples = false;
        self
    }

    /// The system prompt: instructions, the tool list, the line format.
    pub fn system_prompt(&self) -> String {
        let mut prompt = String::from(INSTRUCTIONS);
        for (i, tool) in self.tools.descriptors().iter().enumerate() {
            prompt.push_str(&format!("{}. {}: {}\n", i + 1, tool.name, tool.description));
        }
        prompt.push('\n');
        prompt.push_str(FORMAT_NOTES);
        if self.examples {
            prompt.push('\n');
            prompt.push_str(EXAMPLES);
        }
        prompt
    }

    /// `[system, user]` messages for `question`.
    pub fn messages(&self, question: &str) -> Vec<Message> {
        vec![Message::system(self.system_prompt()), Message::user(question)]
    }

    /// Ask the responder for a plan.
    pub async fn plan(&self, question: &str) -> Result<String, ProviderError> {
        info!(responder = self.responder.name(), tools = self.tools.len(), "Generating plan");
        let text = self.responder.respond(&self.messages(question)).await?;
        debug!(chars = text.len(), "Plan text received");
        Ok(text)
    }
}
