//! Absolute difference tool: computes `|a - b|` deterministically.
//!
//! Takes a label and a two-item list, e.g.
//! `'difference between cities', ['$1', '$3']`. Each item may be a bare
//! number or prose containing one ("about 8,849 m"); the first number found
//! in each item is used.
//!
//! Older plans call this tool `math_code`; the default registry carries it
//! under both names.

use async_trait::async_trait;
use stepforge_core::error::ToolError;
use stepforge_core::tool::{Tool, ToolOutput};

use crate::args::{ArgValue, parse_arguments};
use crate::number_output;

pub struct AbsDifferenceTool {
    name: String,
}

impl AbsDifferenceTool {
    pub fn new() -> Self {
        Self::named("abs_difference")
    }

    /// The same tool registered under another name.
    pub fn named(name: impl Into<String>) -> Self {
        Self { name: name.into() }
    }
}

impl Default for AbsDifferenceTool {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Tool for AbsDifferenceTool {
    fn name(&self) -> &str {
        &self.name
    }

    fn description(&self) -> &str {
        "Calculate the absolute difference between two values given as a list, e.g. ('label', ['a', 'b']). More accurate than math_llm."
    }

    async fn invoke(&self, args: &str) -> Result<ToolOutput, ToolError> {
        let items = parse_arguments(args)?;
        let (a, b) = operands(&items)?;
        Ok(number_output((a - b).abs()))
    }
}

/// Locate the two operands: the first list argument with two items, or
/// failing that, the last two top-level arguments.
fn operands(items: &[ArgValue]) -> Result<(f64, f64), ToolError> {
    let pair: Vec<&ArgValue> = match items.iter().find_map(ArgValue::as_list) {
        Some(list) => list.iter().collect(),
        None => items.iter().skip(items.len().saturating_sub(2)).collect(),
    };

    if pair.len() < 2 {
        return Err(ToolError::InvalidArguments(
            "expected two values to compare".into(),
        ));
    }

    let a = number_in(pair[0])?;
    let b = number_in(pair[1])?;
    Ok((a, b))
}

fn number_in(value: &ArgValue) -> Result<f64, ToolError> {
    match value {
        ArgValue::Num(n) => Ok(*n),
        other => {
            let text = other.as_text();
            first_number(&text).ok_or_else(|| {
                ToolError::InvalidArguments(format!("no number found in '{text}'"))
            })
        }
    }
}

/// Extract the first number in free text. Commas between digits are read
/// as thousands separators.
pub fn first_number(text: &str) -> Option<f64> {
    let chars: Vec<char> = text.chars().collect();
    let start = chars.iter().position(|c| c.is_ascii_digit())?;

    let negative = start > 0 && chars[start - 1] == '-';
    let mut digits = String::new();
    let mut seen_dot = false;
    let mut i = start;

    while i < chars.len() {
        let c = chars[i];
        let next_is_digit = chars.get(i + 1).is_some_and(|n| n.is_ascii_digit());
        match c {
            d if d.is_ascii_digit() => digits.push(d),
            ',' if next_is_digit && !seen_dot => {}
            '.' if next_is_digit && !seen_dot => {
                seen_dot = true;
                digits.push('.');
            }
            _ => break,
        }
        i += 1;
    }

    let value: f64 = digits.parse().ok()?;
    Some(if negative { -value } else { value })
}
