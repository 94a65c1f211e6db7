//! Argument substitution.
//!
//! A single left-to-right pass over the back-reference tokens of the raw
//! argument text. Each token naming a dependency with a recorded
//! observation is replaced by the observation's string form; everything
//! else is copied through unchanged. Replacement text is never rescanned,
//! so an observation that itself contains `$1` stays as written.

use std::collections::BTreeSet;

use crate::plan::scan_references;
use crate::store::ObservationStore;

/// Result of substituting one step's arguments.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Substitution {
    /// Argument text handed to the tool.
    pub text: String,
    /// Indices substituted, one entry per replaced token.
    pub replaced: Vec<usize>,
    /// Tokens passed through literally.
    pub unresolved: Vec<String>,
}

impl Substitution {
    pub fn is_complete(&self) -> bool {
        self.unresolved.is_empty()
    }
}

/// Substitute observations of `dependencies` into `args`.
pub fn substitute(
    args: &str,
    dependencies: &BTreeSet<usize>,
    store: &ObservationStore,
) -> Substitution {
    let mut text = String::with_capacity(args.len());
    let mut replaced = Vec::new();
    let mut unresolved = Vec::new();
    let mut last = 0;

    for reference in scan_references(args) {
        text.push_str(&args[last..reference.start]);
        let observation = dependencies
            .contains(&reference.index)
            .then(|| store.get(reference.index))
            .flatten();

        match observation {
            Some(output) => {
                text.push_str(&output.render());
                replaced.push(reference.index);
            }
            None => {
                let token = reference.token(args);
                text.push_str(token);
                unresolved.push(token.to_string());
            }
        }
        last = reference.end;
    }
    text.push_str(&args[last..]);

    Substitution {
        text,
        replaced,
        unresolved,
    }
}
