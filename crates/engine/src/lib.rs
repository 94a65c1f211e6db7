//! # StepForge Engine
//!
//! Turns plan text into observations:
//!
//! - [`plan`]: line parser, back-reference scanner and dependency resolver
//! - [`graph`]: topological order and parallel waves over the steps
//! - [`substitute`] / [`store`]: `$N` replacement from recorded observations
//! - [`executor`]: sequential or bounded-parallel step execution with
//!   fail-fast, continue and retry policies
//! - [`planner`], [`synthesizer`], [`plan_execute`]: the responder-driven
//!   plan → execute → answer loop

pub mod cancel;
pub mod executor;
pub mod graph;
pub mod plan;
pub mod plan_execute;
pub mod planner;
pub mod store;
pub mod substitute;
pub mod synthesizer;

#[cfg(test)]
pub(crate) mod test_helpers;

pub use cancel::CancellationToken;
pub use executor::{
    ExecutionError, ExecutionLog, Executor, ExecutorOptions, FailurePolicy, Scheduling,
    StepRecord, StepStatus,
};
pub use graph::DependencyGraph;
pub use plan::{Diagnostic, DiagnosticKind, ParseMode, Plan, PlanError, Step, parse_plan};
pub use plan_execute::{PlanAndExecute, RunError, RunOutcome};
pub use planner::Planner;
pub use store::ObservationStore;
pub use substitute::{Substitution, substitute};
pub use synthesizer::Synthesizer;
