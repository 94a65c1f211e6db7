//! Execution tracing for StepForge.
//!
//! Every plan run opens a [`Trace`]; parsing, each step execution, and any
//! language-model calls made by the planner or synthesizer are recorded as
//! [`Span`]s. The [`TelemetryEngine`] keeps recent traces in memory and
//! serves aggregate run statistics.

pub mod engine;
pub mod model;

pub use engine::TelemetryEngine;
pub use model::{RunSummary, Span, SpanKind, Trace};

/// Errors from the telemetry subsystem.
#[derive(Debug, thiserror::Error)]
pub enum TelemetryError {
    #[error("unknown trace id: {0}")]
    UnknownTrace(String),
}
