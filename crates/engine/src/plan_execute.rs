//! Plan-and-execute driver.
//!
//! ```text
//! question ──▶ Planner ──▶ plan text ──▶ parse_plan ──▶ Executor ──▶ log
//!                                                                     │
//!                            answer ◀── Synthesizer (or last observation)
//! ```
//!
//! Every stage is optional to observe: events go to the bus, and with
//! telemetry attached a single trace holds the LLM call, parse, step and
//! synthesis spans of one run.

use std::sync::Arc;

use chrono::Utc;
use stepforge_config::EngineConfig;
use stepforge_core::error::ProviderError;
use stepforge_core::event::{DomainEvent, EventBus};
use stepforge_core::responder::Responder;
use stepforge_core::tool::ToolRegistry;
use stepforge_telemetry::engine::TelemetryEngine;
use stepforge_telemetry::model::{Span, SpanKind};
use thiserror::Error;
use tokio::time::Instant;
use tracing::{info, warn};

use crate::cancel::CancellationToken;
use crate::executor::{ExecutionError, ExecutionLog, Executor, ExecutorOptions};
use crate::plan::{ParseMode, Plan, PlanError, parse_plan};
use crate::planner::Planner;
use crate::synthesizer::Synthesizer;

#[derive(Debug, Error)]
pub enum RunError {
    #[error("Plan generation failed: {0}")]
    Planning(#[source] ProviderError),

    #[error("Answer synthesis failed: {0}")]
    Synthesis(#[source] ProviderError),

    #[error(transparent)]
    Plan(#[from] PlanError),

    #[error(transparent)]
    Execution(#[from] ExecutionError),
}

/// Everything one run produced.
#[derive(Debug, Clone)]
pub struct RunOutcome {
    pub question: String,
    pub plan_text: String,
    pub plan: Plan,
    pub log: ExecutionLog,
    pub answer: String,
    /// Whether `answer` came from the synthesizer rather than the last
    /// observation.
    pub synthesized: bool,
}

/// Plans with a responder, executes the plan, and answers the question.
pub struct PlanAndExecute {
    responder: Arc<dyn Responder>,
    tools: Arc<ToolRegistry>,
    parse_mode: ParseMode,
    synthesize: bool,
    options: ExecutorOptions,
    event_bus: Option<Arc<EventBus>>,
    telemetry: Option<Arc<TelemetryEngine>>,
    cancel: CancellationToken,
}

impl PlanAndExecute {
    pub fn new(responder: Arc<dyn Responder>, tools: Arc<ToolRegistry>) -> Self {
        Self {
            responder,
            tools,
            parse_mode: ParseMode::default(),
            synthesize: true,
            options: ExecutorOptions::default(),
            event_bus: None,
            telemetry: None,
            cancel: CancellationToken::new(),
        }
    }

    /// Parse mode, executor options and synthesis taken from configuration.
    pub fn from_config(
        responder: Arc<dyn Responder>,
        tools: Arc<ToolRegistry>,
        config: &EngineConfig,
    ) -> Self {
        Self::new(responder, tools)
            .with_parse_mode(config.parse_mode)
            .with_synthesis(config.synthesize)
            .with_executor_options(ExecutorOptions::from_config(config))
    }

    pub fn with_event_bus(mut self, bus: Arc<EventBus>) -> Self {
        self.event_bus = Some(bus);
        self
    }

    pub fn with_telemetry(mut self, telemetry: Arc<TelemetryEngine>) -> Self {
        self.telemetry = Some(telemetry);
        self
    }

    pub fn with_parse_mode(mut self, mode: ParseMode) -> Self {
        self.parse_mode = mode;
        self
    }

    /// When disabled, the answer is the final observation's string form.
    pub fn with_synthesis(mut self, synthesize: bool) -> Self {
        self.synthesize = synthesize;
        self
    }

    pub fn with_executor_options(mut self, options: ExecutorOptions) -> Self {
        self.options = options;
        self
    }

    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancel = token;
        self
    }

    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Generate a plan for `question`, execute it and answer.
    pub async fn run(&self, question: &str) -> Result<RunOutcome, RunError> {
        let trace_id = self.start_trace(question);
        let result = self.plan_then_execute(question, trace_id.as_deref()).await;
        self.end_trace(trace_id.as_deref());
        result
    }

    /// Execute a preset plan for `question`, skipping plan generation.
    pub async fn run_plan(&self, question: &str, plan_text: &str) -> Result<RunOutcome, RunError> {
        let trace_id = self.start_trace(question);
        let result = self
            .execute_text(question, plan_text.to_string(), trace_id.as_deref())
            .await;
        self.end_trace(trace_id.as_deref());
        result
    }

    async fn plan_then_execute(
        &self,
        question: &str,
        trace_id: Option<&str>,
    ) -> Result<RunOutcome, RunError> {
        let started = Instant::now();
        let planned = Planner::new(self.responder.clone(), self.tools.clone())
            .plan(question)
            .await;
        self.span(trace_id, SpanKind::LlmCall, "plan generation", started, planned.is_ok());
        let plan_text = planned.map_err(RunError::Planning)?;
        self.execute_text(question, plan_text, trace_id).await
    }

    async fn execute_text(
        &self,
        question: &str,
        plan_text: String,
        trace_id: Option<&str>,
    ) -> Result<RunOutcome, RunError> {
        let started = Instant::now();
        let parsed = parse_plan(&plan_text, &self.tools, self.parse_mode);
        self.span(trace_id, SpanKind::PlanParse, "parse plan", started, parsed.is_ok());
        let plan = parsed?;

        self.publish(DomainEvent::PlanParsed {
            steps: plan.len(),
            diagnostics: plan.diagnostics.len(),
            timestamp: Utc::now(),
        });
        for diagnostic in &plan.diagnostics {
            warn!(%diagnostic, "Plan diagnostic");
        }
        plan.require_steps()?;

        let mut executor = Executor::new(self.tools.clone())
            .with_options(self.options.clone())
            .with_cancellation(self.cancel.clone());
        if let Some(bus) = &self.event_bus {
            executor = executor.with_event_bus(bus.clone());
        }
        if let Some(telemetry) = &self.telemetry {
            executor = executor.with_telemetry(telemetry.clone());
        }
        let log = match trace_id {
            Some(id) => executor.execute_in_trace(&plan, id).await?,
            None => executor.execute(&plan).await?,
        };

        let answer = if self.synthesize {
            let started = Instant::now();
            let synthesized = Synthesizer::new(self.responder.clone())
                .synthesize(question, &log)
                .await;
            self.span(
                trace_id,
                SpanKind::Synthesis,
                "synthesize answer",
                started,
                synthesized.is_ok(),
            );
            synthesized.map_err(RunError::Synthesis)?
        } else {
            log.final_observation()
                .map(|o| o.render())
                .unwrap_or_default()
        };

        info!(steps = plan.len(), synthesized = self.synthesize, "Run complete");
        Ok(RunOutcome {
            question: question.to_string(),
            plan_text,
            plan,
            log,
            answer,
            synthesized: self.synthesize,
        })
    }

    fn start_trace(&self, question: &str) -> Option<String> {
        self.telemetry.as_ref().map(|t| t.start_trace(question))
    }

    fn end_trace(&self, trace_id: Option<&str>) {
        if let (Some(telemetry), Some(id)) = (&self.telemetry, trace_id) {
            telemetry.end_trace(id);
        }
    }

    fn span(&self, trace_id: Option<&str>, kind: SpanKind, label: &str, started: Instant, ok: bool) {
        let (Some(telemetry), Some(id)) = (&self.telemetry, trace_id) else {
            return;
        };
        let mut span = Span::new(kind, label);
        span.end(ok);
        span.duration_ms = Some(started.elapsed().as_millis() as u64);
        if let Err(e) = telemetry.record_span(id, span) {
            warn!(error = %e, "Failed to record span");
        }
    }

    fn publish(&self, event: DomainEvent) {
        if let Some(bus) = &self.event_bus {
            bus.publish(event);
        }
    }
}
