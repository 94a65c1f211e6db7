//! Tool trait: the abstraction over capabilities a plan can invoke.
//!
//! A plan step names a tool and hands it raw argument text. The tool returns
//! any serializable value; the engine substitutes that value's string form
//! into later steps that reference it.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use crate::error::ToolError;

/// The value produced by a tool invocation.
///
/// Wraps any JSON-serializable value. The [`Display`](std::fmt::Display)
/// implementation is the *string form* used for substitution: strings render
/// without quotes, every other value renders as compact JSON.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ToolOutput(pub serde_json::Value);

impl ToolOutput {
    /// Create an output from anything serializable.
    pub fn from_serialize<T: Serialize>(value: &T) -> Result<Self, serde_json::Error> {
        serde_json::to_value(value).map(Self)
    }

    /// The underlying JSON value.
    pub fn value(&self) -> &serde_json::Value {
        &self.0
    }

    /// The string form used for substitution.
    pub fn render(&self) -> String {
        self.to_string()
    }
}

impl std::fmt::Display for ToolOutput {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match &self.0 {
            serde_json::Value::String(s) => f.write_str(s),
            other => write!(f, "{other}"),
        }
    }
}

impl From<String> for ToolOutput {
    fn from(s: String) -> Self {
        Self(serde_json::Value::String(s))
    }
}

impl From<&str> for ToolOutput {
    fn from(s: &str) -> Self {
        Self(serde_json::Value::String(s.to_string()))
    }
}

impl From<f64> for ToolOutput {
    fn from(n: f64) -> Self {
        Self(serde_json::json!(n))
    }
}

impl From<i64> for ToolOutput {
    fn from(n: i64) -> Self {
        Self(serde_json::json!(n))
    }
}

impl From<serde_json::Value> for ToolOutput {
    fn from(v: serde_json::Value) -> Self {
        Self(v)
    }
}

/// Name and description of a registered tool, as shown to a planner.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ToolDescriptor {
    /// The tool name
    pub name: String,

    /// Description of what the tool does
    pub description: String,
}

/// The core Tool trait.
///
/// Tools are registered in the [`ToolRegistry`] and dispatched by name when a
/// plan step runs.
#[async_trait]
pub trait Tool: Send + Sync {
    /// The unique name of this tool (e.g., "search", "calculator").
    fn name(&self) -> &str;

    /// A description of what this tool does (used in plan-generation prompts).
    fn description(&self) -> &str;

    /// Invoke the tool with the step's (substituted) argument text.
    async fn invoke(&self, args: &str) -> std::result::Result<ToolOutput, ToolError>;

    /// Convert this tool into a descriptor for plan generation.
    fn to_descriptor(&self) -> ToolDescriptor {
        ToolDescriptor {
            name: self.name().to_string(),
            description: self.description().to_string(),
        }
    }
}

/// A registry of available tools.
///
/// The engine uses this to:
/// 1. Check tool existence while parsing a plan
/// 2. Describe the tools to a planner
/// 3. Dispatch step invocations by name
pub struct ToolRegistry {
    tools: HashMap<String, Box<dyn Tool>>,
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self {
            tools: HashMap::new(),
        }
    }

    /// Register a tool. Replaces any existing tool with the same name.
    pub fn register(&mut self, tool: Box<dyn Tool>) {
        let name = tool.name().to_string();
        if self.tools.insert(name.clone(), tool).is_some() {
            tracing::debug!(tool = %name, "Replaced previously registered tool");
        }
    }

    /// Builder-style registration.
    pub fn with(mut self, tool: impl Tool + 'static) -> Self {
        self.register(Box::new(tool));
        self
    }

    /// Get a tool by name.
    pub fn get(&self, name: &str) -> Option<&dyn Tool> {
        self.tools.get(name).map(|t| t.as_ref())
    }

    /// Whether a tool with this name is registered.
    pub fn contains(&self, name: &str) -> bool {
        self.tools.contains_key(name)
    }

    /// Descriptors of all tools, sorted by name.
    pub fn descriptors(&self) -> Vec<ToolDescriptor> {
        let mut defs: Vec<ToolDescriptor> = self.tools.values().map(|t| t.to_descriptor()).collect();
        defs.sort_by(|a, b| a.name.cmp(&b.name));
        defs
    }

    /// Invoke a tool by name.
    ///
    /// Fails with [`ToolError::NotFound`] when no tool has that name.
    pub async fn invoke(&self, name: &str, args: &str) -> std::result::Result<ToolOutput, ToolError> {
        let tool = self
            .tools
            .get(name)
            .ok_or_else(|| ToolError::NotFound(name.to_string()))?;
        tool.invoke(args).await
    }

    /// List all registered tool names, sorted.
    pub fn names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.tools.keys().map(|s| s.as_str()).collect();
        names.sort_unstable();
        names
    }

    pub fn len(&self) -> usize {
        self.tools.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }
}

impl Default for ToolRegistry {
    fn default() -> Self {
        Self::new()
    }
}
