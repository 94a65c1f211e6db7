//! Plan model: steps parsed from plan text, their diagnostics, and the
//! errors a plan can be rejected with.
//!
//! A plan is a numbered list of tool invocations:
//!
//! ```text
//! Plan:
//! 1. search('population of city A')
//! 2. search('population of city B')
//! 3. abs_difference('difference', ['$1', '$2'])  # compare
//! ```
//!
//! [`parser`] turns the text into a [`Plan`], [`references`] finds the
//! `$N` / `${N}` back-references in argument text, and [`resolver`] derives
//! each step's dependency set from them.

pub mod parser;
pub mod references;
pub mod resolver;

use std::collections::BTreeSet;
use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;

pub use parser::parse_plan;
pub use references::{Reference, scan_references};
pub use resolver::{dependencies, resolve, unresolved_references, validate_references};
pub use stepforge_config::ParseMode;

/// One parsed step of a plan.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Step {
    /// Step number exactly as written in the plan.
    pub index: usize,
    /// Tool name.
    pub tool: String,
    /// Whether the registry knew the tool when the plan was parsed.
    pub tool_known: bool,
    /// Raw argument text, back-reference tokens included. Never rewritten.
    pub args: String,
    /// Indices of earlier steps referenced by `args`.
    pub dependencies: BTreeSet<usize>,
    /// 1-based source line.
    pub line: usize,
    /// Trailing `# comment`, if any.
    pub comment: Option<String>,
}

impl Step {
    /// Create a step with no dependencies yet.
    pub fn new(index: usize, tool: impl Into<String>, args: impl Into<String>) -> Self {
        Self {
            index,
            tool: tool.into(),
            tool_known: true,
            args: args.into(),
            dependencies: BTreeSet::new(),
            line: 0,
            comment: None,
        }
    }
}

impl fmt::Display for Step {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}. {}({})", self.index, self.tool, self.args)
    }
}

/// What was wrong with a line that looked like a step.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DiagnosticKind {
    /// `N.` not followed by an identifier.
    MissingToolName,
    /// Tool name not followed by `(`.
    MissingOpenParen,
    /// No `)` closes the call.
    UnclosedCall,
    /// Index is zero or does not fit in a `usize`.
    InvalidIndex,
    /// Non-comment text after the closing `)`.
    TrailingText,
    /// Index already used by an earlier step. Informational only.
    DuplicateIndex,
}

impl DiagnosticKind {
    /// Whether the line was dropped from the plan.
    pub fn is_fatal(self) -> bool {
        !matches!(self, Self::DuplicateIndex)
    }
}

impl fmt::Display for DiagnosticKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::MissingToolName => "missing tool name",
            Self::MissingOpenParen => "missing '('",
            Self::UnclosedCall => "unclosed call",
            Self::InvalidIndex => "invalid step index",
            Self::TrailingText => "unexpected text after ')'",
            Self::DuplicateIndex => "duplicate step index",
        };
        f.write_str(s)
    }
}

/// A located report about a plan line.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Diagnostic {
    /// 1-based line number.
    pub line: usize,
    /// Byte offset within the line where the problem starts.
    pub start: usize,
    /// Byte offset within the line where the problem ends (exclusive).
    pub end: usize,
    pub kind: DiagnosticKind,
    /// The offending line.
    pub text: String,
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "line {}:{}: {}: {}",
            self.line,
            self.start + 1,
            self.kind,
            self.text.trim()
        )
    }
}

/// Why a back-reference cannot be satisfied.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UnresolvedReason {
    /// Refers to a later step.
    Forward,
    /// Refers to the step itself.
    SelfReference,
    /// `$0`; steps are numbered from 1.
    Zero,
    /// No step with that index exists.
    UnknownStep,
}

impl fmt::Display for UnresolvedReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Forward => "refers to a later step",
            Self::SelfReference => "refers to its own step",
            Self::Zero => "step 0 does not exist",
            Self::UnknownStep => "no such step",
        };
        f.write_str(s)
    }
}

/// A back-reference that will be passed to its tool literally.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UnresolvedReference {
    /// Index of the step containing the token.
    pub step: usize,
    /// Index the token names.
    pub referenced: usize,
    /// The token as written (`$3`, `${3}`).
    pub token: String,
    pub reason: UnresolvedReason,
}

impl fmt::Display for UnresolvedReference {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "step {}: {} {}", self.step, self.token, self.reason)
    }
}

/// Errors that reject a plan before any step runs.
#[derive(Debug, Clone, Error)]
pub enum PlanError {
    #[error("Plan has {} malformed line(s); first: {}", .diagnostics.len(), first_diagnostic(.diagnostics))]
    Malformed { diagnostics: Vec<Diagnostic> },

    #[error("Plan has {} unresolved reference(s); first: {}", .references.len(), first_reference(.references))]
    UnresolvedReferences { references: Vec<UnresolvedReference> },

    #[error("Dependency cycle among steps {indices:?}")]
    DependencyCycle { indices: Vec<usize> },

    #[error("Plan contains no steps")]
    Empty,
}

fn first_diagnostic(diagnostics: &[Diagnostic]) -> String {
    diagnostics.first().map(|d| d.to_string()).unwrap_or_default()
}

fn first_reference(references: &[UnresolvedReference]) -> String {
    references.first().map(|r| r.to_string()).unwrap_or_default()
}

/// A parsed plan: steps in textual order plus parse diagnostics.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Plan {
    pub steps: Vec<Step>,
    pub diagnostics: Vec<Diagnostic>,
}

impl Plan {
    /// Build a plan from already-constructed steps and resolve their
    /// dependencies.
    pub fn from_steps(steps: Vec<Step>) -> Self {
        let mut plan = Self {
            steps,
            diagnostics: Vec::new(),
        };
        resolve(&mut plan);
        plan
    }

    pub fn len(&self) -> usize {
        self.steps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }

    /// The first step carrying `index`.
    pub fn get(&self, index: usize) -> Option<&Step> {
        self.steps.iter().find(|s| s.index == index)
    }

    /// Position (in `steps`) of the first step carrying `index`.
    pub fn position_of(&self, index: usize) -> Option<usize> {
        self.steps.iter().position(|s| s.index == index)
    }

    /// Diagnostics for lines that were dropped.
    pub fn errors(&self) -> impl Iterator<Item = &Diagnostic> {
        self.diagnostics.iter().filter(|d| d.kind.is_fatal())
    }

    /// Whether any line was dropped.
    pub fn has_errors(&self) -> bool {
        self.errors().next().is_some()
    }

    /// Steps whose tool was not in the registry.
    pub fn unknown_tools(&self) -> Vec<&Step> {
        self.steps.iter().filter(|s| !s.tool_known).collect()
    }

    /// Fail with [`PlanError::Empty`] when there is nothing to run.
    pub fn require_steps(&self) -> Result<(), PlanError> {
        if self.is_empty() {
            Err(PlanError::Empty)
        } else {
            Ok(())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn step_display_matches_plan_syntax() {
        let step = Step::new(2, "search", "'city B'");
        assert_eq!(step.to_string(), "2. search('city B')");
    }

    #[test]
    fn from_steps_resolves_dependencies() {
        let plan = Plan::from_steps(vec![
            Step::new(1, "search", "'a'"),
            Step::new(2, "calculator", "$1 + $3"),
        ]);
        assert_eq!(plan.steps[1].dependencies, BTreeSet::from([1]));
    }

    #[test]
    fn duplicate_index_is_not_fatal() {
        assert!(!DiagnosticKind::DuplicateIndex.is_fatal());
        assert!(DiagnosticKind::UnclosedCall.is_fatal());
    }

    #[test]
    fn get_returns_first_duplicate() {
        let plan = Plan::from_steps(vec![
            Step::new(1, "a", ""),
            Step::new(1, "b", ""),
        ]);
        assert_eq!(plan.get(1).unwrap().tool, "a");
        assert_eq!(plan.position_of(1), Some(0));
    }

    #[test]
    fn empty_plan_rejected_on_request() {
        assert!(matches!(Plan::default().require_steps(), Err(PlanError::Empty)));
    }

    #[test]
    fn malformed_error_names_first_line() {
        let err = PlanError::Malformed {
            diagnostics: vec![Diagnostic {
                line: 3,
                start: 3,
                end: 4,
                kind: DiagnosticKind::MissingToolName,
                text: "3. (oops)".into(),
            }],
        };
        let msg = err.to_string();
        assert!(msg.contains("1 malformed"));
        assert!(msg.contains("line 3:4: missing tool name"));
    }
}
