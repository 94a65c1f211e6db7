//! Data model for execution traces, spans, and run summaries.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

// ── Span ──────────────────────────────────────────────────────────────────

/// The kind of work a span represents.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum SpanKind {
    /// Turning plan text into steps.
    PlanParse,
    /// One step: substitution plus tool invocation.
    StepExecution,
    /// A language-model call (plan generation, synthesis).
    LlmCall,
    /// Final answer synthesis.
    Synthesis,
}

impl std::fmt::Display for SpanKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::PlanParse => write!(f, "plan_parse"),
            Self::StepExecution => write!(f, "step_execution"),
            Self::LlmCall => write!(f, "llm_call"),
            Self::Synthesis => write!(f, "synthesis"),
        }
    }
}

/// A single traced execution unit.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Span {
    /// Unique identifier.
    pub id: String,
    /// What kind of work this represents.
    pub kind: SpanKind,
    /// Human-readable label (e.g. "step 3: search").
    pub label: String,
    /// When the span started.
    pub started_at: DateTime<Utc>,
    /// When the span ended (None if still running).
    pub ended_at: Option<DateTime<Utc>>,
    /// Duration in milliseconds (computed on end).
    pub duration_ms: Option<u64>,
    /// Whether the operation succeeded.
    pub success: Option<bool>,
    /// Arbitrary metadata (step index, tool name, attempts, error...).
    pub metadata: serde_json::Map<String, serde_json::Value>,
}

impl Span {
    /// Create a new span with the given kind and label.
    pub fn new(kind: SpanKind, label: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            kind,
            label: label.into(),
            started_at: Utc::now(),
            ended_at: None,
            duration_ms: None,
            success: None,
            metadata: serde_json::Map::new(),
        }
    }

    /// Attach a metadata entry.
    pub fn with_metadata(mut self, key: &str, value: impl Into<serde_json::Value>) -> Self {
        self.metadata.insert(key.to_string(), value.into());
        self
    }

    /// Mark the span as ended with the given success status.
    pub fn end(&mut self, success: bool) {
        let now = Utc::now();
        self.ended_at = Some(now);
        self.duration_ms = Some(
            now.signed_duration_since(self.started_at)
                .num_milliseconds()
                .max(0) as u64,
        );
        self.success = Some(success);
    }

    /// The step index recorded on a step span, if any.
    pub fn step_index(&self) -> Option<u64> {
        self.metadata.get("step_index").and_then(|v| v.as_u64())
    }
}

// ── Trace ─────────────────────────────────────────────────────────────────

/// A collection of spans representing one plan run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Trace {
    /// Unique trace id.
    pub id: String,
    /// Caller-supplied run label (question, plan file name...).
    pub run_label: String,
    /// All spans in this trace.
    pub spans: Vec<Span>,
    /// When the trace started.
    pub started_at: DateTime<Utc>,
    /// When the trace ended.
    pub ended_at: Option<DateTime<Utc>>,
}

impl Trace {
    /// Create a new trace for a run.
    pub fn new(run_label: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            run_label: run_label.into(),
            spans: Vec::new(),
            started_at: Utc::now(),
            ended_at: None,
        }
    }

    /// Add a span to this trace.
    pub fn add_span(&mut self, span: Span) {
        self.spans.push(span);
    }

    /// Mark the trace as complete.
    pub fn end(&mut self) {
        self.ended_at = Some(Utc::now());
    }

    /// Total duration in milliseconds across all spans.
    pub fn total_duration_ms(&self) -> u64 {
        self.spans.iter().filter_map(|s| s.duration_ms).sum()
    }

    /// Number of step spans in this trace.
    pub fn step_count(&self) -> usize {
        self.spans
            .iter()
            .filter(|s| s.kind == SpanKind::StepExecution)
            .count()
    }

    /// Number of language-model calls in this trace.
    pub fn llm_call_count(&self) -> usize {
        self.spans
            .iter()
            .filter(|s| s.kind == SpanKind::LlmCall)
            .count()
    }
}

// ── Aggregated views ──────────────────────────────────────────────────────

/// Aggregate statistics over all recorded runs.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RunSummary {
    /// Number of traces started.
    pub runs: u64,
    /// Step spans that succeeded.
    pub steps_succeeded: u64,
    /// Step spans that failed.
    pub steps_failed: u64,
    /// Language-model calls.
    pub llm_calls: u64,
    /// Sum of step durations in milliseconds.
    pub step_time_ms: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn span_lifecycle() {
        let mut span = Span::new(SpanKind::StepExecution, "step 1: search")
            .with_metadata("step_index", 1)
            .with_metadata("tool", "search");
        assert!(span.ended_at.is_none());
        span.end(true);
        assert_eq!(span.success, Some(true));
        assert!(span.duration_ms.is_some());
        assert_eq!(span.step_index(), Some(1));
    }

    #[test]
    fn trace_counts_steps() {
        let mut trace = Trace::new("plan.txt");
        let mut ok = Span::new(SpanKind::StepExecution, "step 1");
        ok.end(true);
        let mut bad = Span::new(SpanKind::StepExecution, "step 2");
        bad.end(false);
        let mut llm = Span::new(SpanKind::LlmCall, "planner");
        llm.end(true);
        trace.add_span(ok);
        trace.add_span(bad);
        trace.add_span(llm);

        assert_eq!(trace.step_count(), 2);
        assert_eq!(trace.llm_call_count(), 1);
    }

    #[test]
    fn span_kind_serializes_snake_case() {
        let json = serde_json::to_string(&SpanKind::StepExecution).unwrap();
        assert_eq!(json, r#""step_execution""#);
        assert_eq!(SpanKind::PlanParse.to_string(), "plan_parse");
    }
}
