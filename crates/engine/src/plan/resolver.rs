//! Dependency resolution from back-references.
//!
//! `deps(i)` is the set of indices `j` with `1 <= j < i` that appear as a
//! back-reference in step `i`'s arguments. Tokens naming the step itself, a
//! later step, or `$0` never become dependencies; they are reported by
//! [`unresolved_references`] and reach the tool literally.

use std::collections::{BTreeSet, HashSet};

use tracing::debug;

use super::references::scan_references;
use super::{Plan, PlanError, UnresolvedReason, UnresolvedReference};

/// Dependency set of a step with the given index and argument text.
pub fn dependencies(index: usize, args: &str) -> BTreeSet<usize> {
    scan_references(args)
        .into_iter()
        .map(|r| r.index)
        .filter(|&j| j >= 1 && j < index)
        .collect()
}

/// Annotate every step of the plan with its dependency set.
pub fn resolve(plan: &mut Plan) {
    for step in &mut plan.steps {
        step.dependencies = dependencies(step.index, &step.args);
        if !step.dependencies.is_empty() {
            debug!(index = step.index, deps = ?step.dependencies, "Step dependencies resolved");
        }
    }
}

/// Every back-reference in the plan that can never be substituted.
pub fn unresolved_references(plan: &Plan) -> Vec<UnresolvedReference> {
    let known: HashSet<usize> = plan.steps.iter().map(|s| s.index).collect();
    let mut unresolved = Vec::new();

    for step in &plan.steps {
        for reference in scan_references(&step.args) {
            let reason = if reference.index == 0 {
                UnresolvedReason::Zero
            } else if reference.index == step.index {
                UnresolvedReason::SelfReference
            } else if reference.index > step.index {
                UnresolvedReason::Forward
            } else if !known.contains(&reference.index) {
                UnresolvedReason::UnknownStep
            } else {
                continue;
            };

            unresolved.push(UnresolvedReference {
                step: step.index,
                referenced: reference.index,
                token: reference.token(&step.args).to_string(),
                reason,
            });
        }
    }

    unresolved
}

/// Reject plans containing unresolved references.
pub fn validate_references(plan: &Plan) -> Result<(), PlanError> {
    let references = unresolved_references(plan);
    if references.is_empty() {
        Ok(())
    } else {
        Err(PlanError::UnresolvedReferences { references })
    }
}
