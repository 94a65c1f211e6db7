//! Echo tool: returns its first argument unchanged. Handy for checking what
//! a step receives after substitution.

use async_trait::async_trait;
use stepforge_core::error::ToolError;
use stepforge_core::tool::{Tool, ToolOutput};

use crate::args::primary_text;

pub struct EchoTool;

#[async_trait]
impl Tool for EchoTool {
    fn name(&self) -> &str {
        "echo"
    }

    fn description(&self) -> &str {
        "Return the given text unchanged."
    }

    async fn invoke(&self, args: &str) -> Result<ToolOutput, ToolError> {
        Ok(ToolOutput::from(primary_text(args)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn echoes_first_argument() {
        let out = EchoTool.invoke("'hello world', 'ignored'").await.unwrap();
        assert_eq!(out.render(), "hello world");
    }

    #[tokio::test]
    async fn echoes_raw_text() {
        let out = EchoTool.invoke("value is 42").await.unwrap();
        assert_eq!(out.render(), "value is 42");
    }
}
