//! Step executor: runs a parsed plan against a tool registry.
//!
//! Each step moves through `Pending → Substituting → Invoking → Done` (or
//! `Failed`). Substitution happens just before invocation, against the
//! observations of steps that have already finished, so a step only ever
//! sees results of lower-indexed steps.
//!
//! Scheduling is sequential by default. In parallel mode every step whose
//! dependencies have finished is eligible; eligible steps start in
//! `(index, position)` order, bounded by `max_concurrency`. In-flight
//! invocations are polled from this task through `FuturesUnordered`, and
//! the scheduling loop is the only writer of the observation store.
//!
//! Either way the returned [`ExecutionLog`] lists steps in ascending index
//! order.

use std::cmp::Reverse;
use std::collections::BinaryHeap;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use futures::stream::{FuturesUnordered, StreamExt};
use serde::{Deserialize, Serialize};
use stepforge_config::{EngineConfig, FailurePolicyKind, SchedulingKind};
use stepforge_core::error::ToolError;
use stepforge_core::event::{DomainEvent, EventBus};
use stepforge_core::tool::{ToolOutput, ToolRegistry};
use stepforge_telemetry::engine::TelemetryEngine;
use stepforge_telemetry::model::{Span, SpanKind};
use thiserror::Error;
use tokio::time::Instant;
use tracing::{debug, info, trace, warn};

use crate::cancel::CancellationToken;
use crate::graph::DependencyGraph;
use crate::plan::{Plan, PlanError, Step, validate_references};
use crate::store::ObservationStore;
use crate::substitute::{Substitution, substitute};

/// Characters of an observation carried in `StepCompleted` events.
const PREVIEW_CHARS: usize = 120;

// ── Options ───────────────────────────────────────────────────────────────

/// How steps are scheduled.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "mode")]
pub enum Scheduling {
    /// One step at a time in ascending index order.
    #[default]
    Sequential,
    /// Steps with satisfied dependencies run concurrently.
    Parallel { max_concurrency: usize },
}

/// What happens when a step's tool fails.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "policy")]
pub enum FailurePolicy {
    /// Stop at the first failure.
    #[default]
    FailFast,
    /// Record the failure and run the remaining steps. References to the
    /// failed step reach later tools literally.
    Continue,
    /// Retry retryable failures with linear backoff, then stop.
    Retry { max_attempts: u32, backoff_ms: u64 },
}

impl FailurePolicy {
    fn max_attempts(&self) -> u32 {
        match self {
            Self::Retry { max_attempts, .. } => (*max_attempts).max(1),
            _ => 1,
        }
    }

    fn backoff(&self, attempt: u32) -> Duration {
        match self {
            Self::Retry { backoff_ms, .. } => {
                Duration::from_millis(backoff_ms.saturating_mul(u64::from(attempt)))
            }
            _ => Duration::ZERO,
        }
    }

    fn halts(&self) -> bool {
        !matches!(self, Self::Continue)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExecutorOptions {
    pub scheduling: Scheduling,
    pub failure_policy: FailurePolicy,
    /// Deadline for a single tool invocation.
    pub step_timeout: Option<Duration>,
    /// Refuse plans with back-references that can never be substituted.
    pub strict_references: bool,
}

impl ExecutorOptions {
    pub fn from_config(config: &EngineConfig) -> Self {
        let scheduling = match config.scheduling {
            SchedulingKind::Sequential => Scheduling::Sequential,
            SchedulingKind::Parallel => Scheduling::Parallel {
                max_concurrency: config.max_concurrency,
            },
        };
        let failure_policy = match config.failure_policy {
            FailurePolicyKind::FailFast => FailurePolicy::FailFast,
            FailurePolicyKind::Continue => FailurePolicy::Continue,
            FailurePolicyKind::Retry => FailurePolicy::Retry {
                max_attempts: config.retry_max_attempts,
                backoff_ms: config.retry_backoff_ms,
            },
        };

        Self {
            scheduling,
            failure_policy,
            step_timeout: config.step_timeout_secs.map(Duration::from_secs),
            strict_references: config.strict_references,
        }
    }
}

// ── Execution log ─────────────────────────────────────────────────────────

/// Lifecycle state of a step.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StepStatus {
    Pending,
    Substituting,
    Invoking,
    Done,
    Failed,
    /// Never started: an earlier failure or a cancellation stopped the run.
    Skipped,
}

impl std::fmt::Display for StepStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Pending => "pending",
            Self::Substituting => "substituting",
            Self::Invoking => "invoking",
            Self::Done => "done",
            Self::Failed => "failed",
            Self::Skipped => "skipped",
        };
        f.write_str(s)
    }
}

/// What happened to one step.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StepRecord {
    pub index: usize,
    pub tool: String,
    pub line: usize,
    /// Argument text as written in the plan.
    pub raw_args: String,
    /// Argument text the tool received.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub resolved_args: Option<String>,
    pub status: StepStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub observation: Option<ToolOutput>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// Back-reference tokens passed through literally.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub unresolved: Vec<String>,
    pub attempts: u32,
    pub duration_ms: u64,
}

impl StepRecord {
    fn skipped(step: &Step) -> Self {
        Self {
            index: step.index,
            tool: step.tool.clone(),
            line: step.line,
            raw_args: step.args.clone(),
            resolved_args: None,
            status: StepStatus::Skipped,
            observation: None,
            error: None,
            unresolved: Vec::new(),
            attempts: 0,
            duration_ms: 0,
        }
    }
}

/// Ordered record of a plan execution.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ExecutionLog {
    pub entries: Vec<StepRecord>,
    pub duration_ms: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub trace_id: Option<String>,
}

impl ExecutionLog {
    /// Observations of completed steps, in index order.
    pub fn observations(&self) -> Vec<&ToolOutput> {
        self.entries
            .iter()
            .filter_map(|e| e.observation.as_ref())
            .collect()
    }

    /// Observation of the last completed step.
    pub fn final_observation(&self) -> Option<&ToolOutput> {
        self.entries.iter().rev().find_map(|e| e.observation.as_ref())
    }

    /// Record of the first step carrying `index`.
    pub fn get(&self, index: usize) -> Option<&StepRecord> {
        self.entries.iter().find(|e| e.index == index)
    }

    pub fn count(&self, status: StepStatus) -> usize {
        self.entries.iter().filter(|e| e.status == status).count()
    }

    pub fn succeeded(&self) -> usize {
        self.count(StepStatus::Done)
    }

    pub fn failed(&self) -> usize {
        self.count(StepStatus::Failed)
    }

    /// Every step completed.
    pub fn is_success(&self) -> bool {
        self.entries.iter().all(|e| e.status == StepStatus::Done)
    }
}

/// Why an execution pass stopped early.
#[derive(Debug, Error)]
pub enum ExecutionError {
    #[error("Step {index} ({tool}) failed: {source}")]
    StepFailed {
        index: usize,
        tool: String,
        source: ToolError,
        log: Box<ExecutionLog>,
    },

    #[error("Execution cancelled after {} completed step(s)", .log.succeeded())]
    Cancelled { log: Box<ExecutionLog> },

    #[error(transparent)]
    Plan(#[from] PlanError),
}

impl ExecutionError {
    /// The partial log, when any step ran.
    pub fn log(&self) -> Option<&ExecutionLog> {
        match self {
            Self::StepFailed { log, .. } | Self::Cancelled { log } => Some(log),
            Self::Plan(_) => None,
        }
    }
}

// ── Executor ──────────────────────────────────────────────────────────────

struct Invocation {
    result: Result<ToolOutput, ToolError>,
    attempts: u32,
    duration: Duration,
}

enum Outcome {
    Completed,
    Halted {
        index: usize,
        tool: String,
        error: ToolError,
    },
    Cancelled,
}

struct RunState {
    store: ObservationStore,
    /// Whether the step at each position is the first carrying its index.
    /// Only those feed the store, whatever order steps finish in.
    producers: Vec<bool>,
    records: Vec<Option<StepRecord>>,
    trace_id: Option<String>,
}

/// Executes plans against a tool registry.
pub struct Executor {
    tools: Arc<ToolRegistry>,
    options: ExecutorOptions,
    event_bus: Option<Arc<EventBus>>,
    telemetry: Option<Arc<TelemetryEngine>>,
    cancel: CancellationToken,
}

impl Executor {
    pub fn new(tools: Arc<ToolRegistry>) -> Self {
        Self {
            tools,
            options: ExecutorOptions::default(),
            event_bus: None,
            telemetry: None,
            cancel: CancellationToken::new(),
        }
    }

    pub fn with_options(mut self, options: ExecutorOptions) -> Self {
        self.options = options;
        self
    }

    /// Publish step events on this bus.
    pub fn with_event_bus(mut self, bus: Arc<EventBus>) -> Self {
        self.event_bus = Some(bus);
        self
    }

    /// Record a trace of step spans for every execution.
    pub fn with_telemetry(mut self, telemetry: Arc<TelemetryEngine>) -> Self {
        self.telemetry = Some(telemetry);
        self
    }

    /// Use an externally owned cancellation token.
    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancel = token;
        self
    }

    pub fn options(&self) -> &ExecutorOptions {
        &self.options
    }

    pub fn tools(&self) -> &Arc<ToolRegistry> {
        &self.tools
    }

    /// A handle that cancels executions run by this executor.
    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Execute every step of `plan` once.
    pub async fn execute(&self, plan: &Plan) -> Result<ExecutionLog, ExecutionError> {
        let trace_id = self
            .telemetry
            .as_ref()
            .map(|t| t.start_trace(format!("plan ({} steps)", plan.len())));

        let result = self.run(plan, trace_id.clone()).await;

        if let (Some(telemetry), Some(id)) = (&self.telemetry, &trace_id) {
            telemetry.end_trace(id);
        }
        result
    }

    /// Execute inside a trace the caller started (and will end).
    pub async fn execute_in_trace(
        &self,
        plan: &Plan,
        trace_id: &str,
    ) -> Result<ExecutionLog, ExecutionError> {
        self.run(plan, Some(trace_id.to_string())).await
    }

    async fn run(
        &self,
        plan: &Plan,
        trace_id: Option<String>,
    ) -> Result<ExecutionLog, ExecutionError> {
        if self.options.strict_references {
            validate_references(plan)?;
        }

        let graph = DependencyGraph::build(plan);
        let order = graph.order()?;
        let started = Instant::now();

        info!(
            steps = plan.len(),
            scheduling = ?self.options.scheduling,
            policy = ?self.options.failure_policy,
            "Executing plan"
        );

        let mut state = RunState {
            store: ObservationStore::new(),
            producers: (0..plan.len())
                .map(|pos| plan.position_of(plan.steps[pos].index) == Some(pos))
                .collect(),
            records: vec![None; plan.len()],
            trace_id,
        };

        let outcome = match self.options.scheduling {
            Scheduling::Sequential => self.run_sequential(plan, &order, &mut state).await,
            Scheduling::Parallel { max_concurrency } => {
                self.run_parallel(plan, &graph, max_concurrency.max(1), &mut state)
                    .await
            }
        };

        let log = ExecutionLog {
            entries: order
                .iter()
                .map(|&pos| {
                    state.records[pos]
                        .take()
                        .unwrap_or_else(|| StepRecord::skipped(&plan.steps[pos]))
                })
                .collect(),
            duration_ms: started.elapsed().as_millis() as u64,
            trace_id: state.trace_id,
        };

        info!(
            succeeded = log.succeeded(),
            failed = log.failed(),
            skipped = log.count(StepStatus::Skipped),
            duration_ms = log.duration_ms,
            "Plan execution finished"
        );
        self.publish(DomainEvent::PlanCompleted {
            succeeded: log.succeeded(),
            failed: log.failed(),
            duration_ms: log.duration_ms,
            timestamp: Utc::now(),
        });

        match outcome {
            Outcome::Completed => Ok(log),
            Outcome::Halted { index, tool, error } => Err(ExecutionError::StepFailed {
                index,
                tool,
                source: error,
                log: Box::new(log),
            }),
            Outcome::Cancelled => Err(ExecutionError::Cancelled { log: Box::new(log) }),
        }
    }

    async fn run_sequential(&self, plan: &Plan, order: &[usize], state: &mut RunState) -> Outcome {
        for &pos in order {
            if self.cancel.is_cancelled() {
                info!("Execution cancelled between steps");
                return Outcome::Cancelled;
            }

            let step = &plan.steps[pos];
            let sub = self.prepare(step, &state.store);
            let invocation = self.invoke(step, &sub.text).await;
            if let Some(stop) = self.finish(step, pos, sub, invocation, state) {
                return stop;
            }
        }
        Outcome::Completed
    }

    async fn run_parallel(
        &self,
        plan: &Plan,
        graph: &DependencyGraph,
        max_concurrency: usize,
        state: &mut RunState,
    ) -> Outcome {
        let mut waiting: Vec<usize> = (0..graph.len()).map(|pos| graph.upstream(pos).len()).collect();
        let mut ready: BinaryHeap<Reverse<(usize, usize)>> = (0..graph.len())
            .filter(|&pos| waiting[pos] == 0)
            .map(|pos| Reverse(graph.priority(pos)))
            .collect();
        let mut in_flight = FuturesUnordered::new();
        let mut stop: Option<Outcome> = None;

        loop {
            while stop.is_none() && in_flight.len() < max_concurrency && !self.cancel.is_cancelled() {
                let Some(Reverse((_, pos))) = ready.pop() else {
                    break;
                };
                let step = &plan.steps[pos];
                let sub = self.prepare(step, &state.store);
                in_flight.push(async move {
                    let invocation = self.invoke(step, &sub.text).await;
                    (pos, sub, invocation)
                });
            }

            let Some((pos, sub, invocation)) = in_flight.next().await else {
                break;
            };

            let step = &plan.steps[pos];
            if let Some(halt) = self.finish(step, pos, sub, invocation, state) {
                // Keep the first reason; in-flight steps still drain.
                stop.get_or_insert(halt);
            }
            if stop.is_none() {
                for &next in graph.downstream(pos) {
                    waiting[next] -= 1;
                    if waiting[next] == 0 {
                        ready.push(Reverse(graph.priority(next)));
                    }
                }
            }
        }

        match stop {
            Some(outcome) => outcome,
            None if self.cancel.is_cancelled() && !ready.is_empty() => Outcome::Cancelled,
            None => Outcome::Completed,
        }
    }

    /// Substituting: compute the argument text from finished observations.
    fn prepare(&self, step: &Step, store: &ObservationStore) -> Substitution {
        trace!(index = step.index, state = %StepStatus::Substituting);
        let sub = substitute(&step.args, &step.dependencies, store);

        for token in &sub.unresolved {
            warn!(index = step.index, token = %token, "Back-reference passed through unresolved");
            self.publish(DomainEvent::UnresolvedReference {
                index: step.index,
                token: token.clone(),
                timestamp: Utc::now(),
            });
        }

        self.publish(DomainEvent::StepStarted {
            index: step.index,
            tool: step.tool.clone(),
            arguments: sub.text.clone(),
            timestamp: Utc::now(),
        });
        sub
    }

    /// Invoking: call the tool, applying timeout, cancellation and retries.
    async fn invoke(&self, step: &Step, args: &str) -> Invocation {
        let started = Instant::now();
        let max_attempts = self.options.failure_policy.max_attempts();
        let mut attempt = 0;

        loop {
            attempt += 1;
            debug!(index = step.index, tool = %step.tool, attempt, state = %StepStatus::Invoking, "Invoking tool");

            let result = tokio::select! {
                biased;
                _ = self.cancel.cancelled() => Err(self.cancelled_error(step)),
                result = self.call(step, args) => result,
            };

            match result {
                Err(e) if attempt < max_attempts && e.is_retryable() => {
                    let delay = self.options.failure_policy.backoff(attempt);
                    warn!(
                        index = step.index,
                        tool = %step.tool,
                        attempt,
                        error = %e,
                        delay_ms = delay.as_millis() as u64,
                        "Step failed, retrying"
                    );
                    tokio::select! {
                        biased;
                        _ = self.cancel.cancelled() => {
                            return Invocation {
                                result: Err(self.cancelled_error(step)),
                                attempts: attempt,
                                duration: started.elapsed(),
                            };
                        }
                        _ = tokio::time::sleep(delay) => {}
                    }
                }
                result => {
                    return Invocation {
                        result,
                        attempts: attempt,
                        duration: started.elapsed(),
                    };
                }
            }
        }
    }

    async fn call(&self, step: &Step, args: &str) -> Result<ToolOutput, ToolError> {
        let call = self.tools.invoke(&step.tool, args);
        match self.options.step_timeout {
            Some(limit) => tokio::time::timeout(limit, call).await.unwrap_or_else(|_| {
                Err(ToolError::Timeout {
                    tool_name: step.tool.clone(),
                    timeout_ms: limit.as_millis() as u64,
                })
            }),
            None => call.await,
        }
    }

    fn cancelled_error(&self, step: &Step) -> ToolError {
        ToolError::Cancelled(format!("step {} ({})", step.index, step.tool))
    }

    /// Done / Failed: record the outcome; returns why the run must stop, if
    /// it must.
    fn finish(
        &self,
        step: &Step,
        pos: usize,
        sub: Substitution,
        invocation: Invocation,
        state: &mut RunState,
    ) -> Option<Outcome> {
        let duration_ms = invocation.duration.as_millis() as u64;
        let mut record = StepRecord {
            index: step.index,
            tool: step.tool.clone(),
            line: step.line,
            raw_args: step.args.clone(),
            resolved_args: Some(sub.text),
            status: StepStatus::Done,
            observation: None,
            error: None,
            unresolved: sub.unresolved,
            attempts: invocation.attempts,
            duration_ms,
        };

        let stop = match invocation.result {
            Ok(output) => {
                info!(
                    index = step.index,
                    tool = %step.tool,
                    duration_ms,
                    attempts = invocation.attempts,
                    "Step completed"
                );
                self.publish(DomainEvent::StepCompleted {
                    index: step.index,
                    tool: step.tool.clone(),
                    observation_preview: preview(&output),
                    duration_ms,
                    timestamp: Utc::now(),
                });
                if state.producers[pos] {
                    state.store.record(step.index, output.clone());
                }
                record.observation = Some(output);
                None
            }
            Err(error) => {
                warn!(
                    index = step.index,
                    tool = %step.tool,
                    attempts = invocation.attempts,
                    error = %error,
                    "Step failed"
                );
                self.publish(DomainEvent::StepFailed {
                    index: step.index,
                    tool: step.tool.clone(),
                    error_message: error.to_string(),
                    attempts: invocation.attempts,
                    timestamp: Utc::now(),
                });
                record.status = StepStatus::Failed;
                record.error = Some(error.to_string());

                if matches!(error, ToolError::Cancelled(_)) {
                    Some(Outcome::Cancelled)
                } else if self.options.failure_policy.halts() {
                    Some(Outcome::Halted {
                        index: step.index,
                        tool: step.tool.clone(),
                        error,
                    })
                } else {
                    None
                }
            }
        };

        self.record_span(&record, state.trace_id.as_deref());
        trace!(index = step.index, state = %record.status);
        state.records[pos] = Some(record);
        stop
    }

    fn record_span(&self, record: &StepRecord, trace_id: Option<&str>) {
        let (Some(telemetry), Some(trace_id)) = (&self.telemetry, trace_id) else {
            return;
        };

        let mut span = Span::new(
            SpanKind::StepExecution,
            format!("step {}: {}", record.index, record.tool),
        )
        .with_metadata("step_index", record.index as u64)
        .with_metadata("tool", record.tool.clone())
        .with_metadata("attempts", record.attempts);
        if let Some(error) = &record.error {
            span = span.with_metadata("error", error.clone());
        }
        span.end(record.status == StepStatus::Done);
        span.duration_ms = Some(record.duration_ms);

        if let Err(e) = telemetry.record_span(trace_id, span) {
            warn!(error = %e, "Failed to record step span");
        }
    }

    fn publish(&self, event: DomainEvent) {
        if let Some(bus) = &self.event_bus {
            bus.publish(event);
        }
    }
}

fn preview(output: &ToolOutput) -> String {
    let text = output.render();
    if text.chars().count() <= PREVIEW_CHARS {
        text
    } else {
        let cut: String = text.chars().take(PREVIEW_CHARS).collect();
        format!("{cut}…")
    }
}
