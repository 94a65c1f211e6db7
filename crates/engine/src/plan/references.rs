//! Back-reference tokens: `$N` and `${N}`.
//!
//! The digit run of a bare token is maximal, so `$10` always names step 10
//! and never step 1 followed by a literal `0`. The braced form needs its
//! closing brace; `${1` is plain text.

use serde::{Deserialize, Serialize};

/// A back-reference found in argument text.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Reference {
    /// Step index named by the token.
    pub index: usize,
    /// Byte offset of the `$`.
    pub start: usize,
    /// Byte offset one past the token.
    pub end: usize,
    /// Written as `${N}`.
    pub braced: bool,
}

impl Reference {
    /// The token text within `source`.
    pub fn token<'a>(&self, source: &'a str) -> &'a str {
        &source[self.start..self.end]
    }
}

/// Find every back-reference token in `text`, left to right.
pub fn scan_references(text: &str) -> Vec<Reference> {
    let bytes = text.as_bytes();
    let mut refs = Vec::new();
    let mut i = 0;

    while i < bytes.len() {
        if bytes[i] != b'$' {
            i += 1;
            continue;
        }

        let braced = bytes.get(i + 1) == Some(&b'{');
        let digits_start = if braced { i + 2 } else { i + 1 };
        let digits_end = digits_start
            + bytes[digits_start.min(bytes.len())..]
                .iter()
                .take_while(|b| b.is_ascii_digit())
                .count();

        if digits_end == digits_start {
            i += 1;
            continue;
        }

        let end = if braced {
            if bytes.get(digits_end) != Some(&b'}') {
                i += 1;
                continue;
            }
            digits_end + 1
        } else {
            digits_end
        };

        // Too many digits for a usize is not a reference to anything.
        match text[digits_start..digits_end].parse::<usize>() {
            Ok(index) => {
                refs.push(Reference {
                    index,
                    start: i,
                    end,
                    braced,
                });
                i = end;
            }
            Err(_) => i = end,
        }
    }

    refs
}
