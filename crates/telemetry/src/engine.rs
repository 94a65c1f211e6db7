//! Thread-safe telemetry engine: collects traces and spans for plan runs
//! and serves run statistics.

use crate::TelemetryError;
use crate::model::*;
use std::sync::RwLock;

/// Default cap on retained traces.
pub const DEFAULT_MAX_TRACES: usize = 5_000;

/// The core telemetry engine.
///
/// Thread-safe via `RwLock`. Shared as `Arc<TelemetryEngine>` between the
/// executor, planner and synthesizer of a run.
pub struct TelemetryEngine {
    /// All recorded traces (most recent last).
    traces: RwLock<Vec<Trace>>,
    /// Running totals.
    totals: RwLock<RunSummary>,
    /// Retention cap.
    max_traces: usize,
}

impl TelemetryEngine {
    /// Create a new telemetry engine with the default retention cap.
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_MAX_TRACES)
    }

    /// Create a telemetry engine retaining at most `max_traces` traces.
    pub fn with_capacity(max_traces: usize) -> Self {
        Self {
            traces: RwLock::new(Vec::new()),
            totals: RwLock::new(RunSummary::default()),
            max_traces: max_traces.max(1),
        }
    }

    // ── Trace management ──────────────────────────────────────────────

    /// Start a new trace for a plan run.
    pub fn start_trace(&self, run_label: impl Into<String>) -> String {
        let trace = Trace::new(run_label);
        let id = trace.id.clone();
        let mut traces = self.traces.write().unwrap();

        // Auto-prune completed traces if too many accumulate
        if traces.len() >= self.max_traces {
            let drain_count = (self.max_traces / 10).max(1);
            let mut removed = 0;
            traces.retain(|t| {
                if removed >= drain_count {
                    return true;
                }
                if t.ended_at.is_some() {
                    removed += 1;
                    return false;
                }
                true
            });
        }

        traces.push(trace);
        self.totals.write().unwrap().runs += 1;
        id
    }

    /// End a trace.
    pub fn end_trace(&self, trace_id: &str) {
        let mut traces = self.traces.write().unwrap();
        if let Some(trace) = traces.iter_mut().find(|t| t.id == trace_id) {
            trace.end();
        }
    }

    /// Record a completed span in a trace and update running totals.
    pub fn record_span(&self, trace_id: &str, span: Span) -> Result<(), TelemetryError> {
        let mut traces = self.traces.write().unwrap();
        let trace = traces
            .iter_mut()
            .find(|t| t.id == trace_id)
            .ok_or_else(|| TelemetryError::UnknownTrace(trace_id.to_string()))?;

        {
            let mut totals = self.totals.write().unwrap();
            match span.kind {
                SpanKind::StepExecution => {
                    if span.success == Some(false) {
                        totals.steps_failed += 1;
                    } else {
                        totals.steps_succeeded += 1;
                    }
                    totals.step_time_ms += span.duration_ms.unwrap_or(0);
                }
                SpanKind::LlmCall => totals.llm_calls += 1,
                _ => {}
            }
        }

        tracing::trace!(trace_id, kind = %span.kind, label = %span.label, "Span recorded");
        trace.add_span(span);
        Ok(())
    }

    // ── Queries ───────────────────────────────────────────────────────

    /// Get a specific trace by ID.
    pub fn get_trace(&self, trace_id: &str) -> Option<Trace> {
        let traces = self.traces.read().unwrap();
        traces.iter().find(|t| t.id == trace_id).cloned()
    }

    /// List recent traces (most recent first).
    pub fn recent_traces(&self, limit: usize) -> Vec<Trace> {
        let traces = self.traces.read().unwrap();
        traces.iter().rev().take(limit).cloned().collect()
    }

    /// Aggregate statistics since engine creation.
    pub fn summary(&self) -> RunSummary {
        self.totals.read().unwrap().clone()
    }
}

impl Default for TelemetryEngine {
    fn default() -> Self {
        Self::new()
    }
}
