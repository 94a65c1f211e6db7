//! Shared test utilities for engine tests.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicU32, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use stepforge_core::error::{ProviderError, ToolError};
use stepforge_core::message::Message;
use stepforge_core::responder::Responder;
use stepforge_core::tool::{Tool, ToolOutput, ToolRegistry};

use crate::cancel::CancellationToken;

/// Argument texts a tool received, in call order.
pub type CallLog = Arc<Mutex<Vec<String>>>;

/// A registry of [`RecordingTool`]s with the given names.
pub fn registry_of(names: &[&str]) -> ToolRegistry {
    let mut registry = ToolRegistry::new();
    for name in names {
        registry.register(Box::new(RecordingTool::new(name)));
    }
    registry
}

/// Returns its argument text verbatim and records it.
pub struct RecordingTool {
    name: String,
    calls: CallLog,
}

impl RecordingTool {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.into(),
            calls: CallLog::default(),
        }
    }

    /// Record into a log shared with other tools.
    pub fn sharing(name: &str, calls: CallLog) -> Self {
        Self {
            name: name.into(),
            calls,
        }
    }

    pub fn calls(&self) -> CallLog {
        self.calls.clone()
    }
}

#[async_trait]
impl Tool for RecordingTool {
    fn name(&self) -> &str {
        &self.name
    }

    fn description(&self) -> &str {
        "Returns its arguments"
    }

    async fn invoke(&self, args: &str) -> Result<ToolOutput, ToolError> {
        self.calls.lock().unwrap().push(args.to_string());
        Ok(ToolOutput::from(args))
    }
}

/// Returns canned outputs chosen by substring match on the arguments.
pub struct ScriptedTool {
    name: String,
    rules: Vec<(String, ToolOutput)>,
    fallback: Option<ToolOutput>,
    calls: CallLog,
}

impl ScriptedTool {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.into(),
            rules: Vec::new(),
            fallback: None,
            calls: CallLog::default(),
        }
    }

    /// Reply with `output` when the arguments contain `pattern`.
    pub fn on(mut self, pattern: &str, output: impl Into<ToolOutput>) -> Self {
        self.rules.push((pattern.into(), output.into()));
        self
    }

    /// Reply with `output` when no rule matches.
    pub fn otherwise(mut self, output: impl Into<ToolOutput>) -> Self {
        self.fallback = Some(output.into());
        self
    }

    pub fn calls(&self) -> CallLog {
        self.calls.clone()
    }
}

#[async_trait]
impl Tool for ScriptedTool {
    fn name(&self) -> &str {
        &self.name
    }

    fn description(&self) -> &str {
        "Scripted test tool"
    }

    async fn invoke(&self, args: &str) -> Result<ToolOutput, ToolError> {
        self.calls.lock().unwrap().push(args.to_string());
        self.rules
            .iter()
            .find(|(pattern, _)| args.contains(pattern.as_str()))
            .map(|(_, output)| output.clone())
            .or_else(|| self.fallback.clone())
            .ok_or_else(|| ToolError::ExecutionFailed {
                tool_name: self.name.clone(),
                reason: format!("no scripted reply for {args}"),
            })
    }
}

/// Fails a set number of times, then returns "recovered".
pub struct FailingTool {
    name: String,
    failures: u32,
    attempts: Arc<AtomicU32>,
}

impl FailingTool {
    pub fn always(name: &str) -> Self {
        Self::times(name, u32::MAX)
    }

    pub fn times(name: &str, failures: u32) -> Self {
        Self {
            name: name.into(),
            failures,
            attempts: Arc::new(AtomicU32::new(0)),
        }
    }

    pub fn attempts(&self) -> Arc<AtomicU32> {
        self.attempts.clone()
    }
}

#[async_trait]
impl Tool for FailingTool {
    fn name(&self) -> &str {
        &self.name
    }

    fn description(&self) -> &str {
        "Fails on purpose"
    }

    async fn invoke(&self, _args: &str) -> Result<ToolOutput, ToolError> {
        let attempt = self.attempts.fetch_add(1, Ordering::SeqCst) + 1;
        if attempt <= self.failures {
            Err(ToolError::ExecutionFailed {
                tool_name: self.name.clone(),
                reason: format!("failure #{attempt}"),
            })
        } else {
            Ok(ToolOutput::from("recovered"))
        }
    }
}

/// Sleeps before echoing its arguments; tracks peak concurrency.
pub struct SlowTool {
    name: String,
    delay: Duration,
    in_flight: Arc<AtomicUsize>,
    peak: Arc<AtomicUsize>,
}

impl SlowTool {
    pub fn new(name: &str, delay: Duration) -> Self {
        Self {
            name: name.into(),
            delay,
            in_flight: Arc::new(AtomicUsize::new(0)),
            peak: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Highest number of simultaneous invocations seen.
    pub fn peak(&self) -> Arc<AtomicUsize> {
        self.peak.clone()
    }
}

#[async_trait]
impl Tool for SlowTool {
    fn name(&self) -> &str {
        &self.name
    }

    fn description(&self) -> &str {
        "Sleeps, then returns its arguments"
    }

    async fn invoke(&self, args: &str) -> Result<ToolOutput, ToolError> {
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak.fetch_max(now, Ordering::SeqCst);
        tokio::time::sleep(self.delay).await;
        self.in_flight.fetch_sub(1, Ordering::SeqCst);
        Ok(ToolOutput::from(args))
    }
}

/// Cancels the run it belongs to, then completes normally.
pub struct CancellingTool {
    name: String,
    token: CancellationToken,
}

impl CancellingTool {
    pub fn new(name: &str, token: CancellationToken) -> Self {
        Self {
            name: name.into(),
            token,
        }
    }
}

#[async_trait]
impl Tool for CancellingTool {
    fn name(&self) -> &str {
        &self.name
    }

    fn description(&self) -> &str {
        "Requests cancellation and returns"
    }

    async fn invoke(&self, _args: &str) -> Result<ToolOutput, ToolError> {
        self.token.cancel();
        Ok(ToolOutput::from("stopping"))
    }
}

/// A mock responder that returns pre-configured replies in order.
pub struct SequentialMockResponder {
    responses: Mutex<VecDeque<String>>,
    requests: Mutex<Vec<Vec<Message>>>,
}

impl SequentialMockResponder {
    pub fn new(responses: Vec<&str>) -> Self {
        Self {
            responses: Mutex::new(responses.into_iter().map(String::from).collect()),
            requests: Mutex::new(Vec::new()),
        }
    }

    /// Every message list received, in call order.
    pub fn requests(&self) -> Vec<Vec<Message>> {
        self.requests.lock().unwrap().clone()
    }
}

#[async_trait]
impl Responder for SequentialMockResponder {
    fn name(&self) -> &str {
        "sequential_mock"
    }

    async fn respond(&self, messages: &[Message]) -> Result<String, ProviderError> {
        self.requests.lock().unwrap().push(messages.to_vec());
        self.responses
            .lock()
            .unwrap()
            .pop_front()
            .ok_or_else(|| ProviderError::ApiError {
                status_code: 500,
                message: "No more mock responses".into(),
            })
    }
}
