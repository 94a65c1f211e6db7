//! Literal parser for plan-step argument text.
//!
//! Plan steps carry Python-like argument lists such as
//! `'difference between cities', ['100', '80']`. Tools receive that text
//! verbatim (after substitution) and use [`parse_arguments`] to pull out
//! the values they need.
//!
//! Grammar (informal):
//! ```text
//! args  = (item ("," item)*)?
//! item  = STRING | list | bare
//! list  = "[" (item ("," item)*)? ","? "]"
//! bare  = any text up to a top-level "," (parentheses and brackets nest)
//! ```
//! A bare item that parses as a number becomes [`ArgValue::Num`].

use std::iter::Peekable;
use std::str::Chars;

use stepforge_core::error::ToolError;

/// A single parsed argument.
#[derive(Debug, Clone, PartialEq)]
pub enum ArgValue {
    /// A quoted string literal (quotes removed, escapes applied).
    Str(String),
    /// A bare numeric literal.
    Num(f64),
    /// A bracketed list.
    List(Vec<ArgValue>),
    /// Any other unquoted text, trimmed.
    Bare(String),
}

impl ArgValue {
    /// Text form of the value. Lists join their items with ", ".
    pub fn as_text(&self) -> String {
        match self {
            ArgValue::Str(s) | ArgValue::Bare(s) => s.clone(),
            ArgValue::Num(n) => format_number(*n),
            ArgValue::List(items) => items
                .iter()
                .map(ArgValue::as_text)
                .collect::<Vec<_>>()
                .join(", "),
        }
    }

    /// The items of a list value.
    pub fn as_list(&self) -> Option<&[ArgValue]> {
        match self {
            ArgValue::List(items) => Some(items),
            _ => None,
        }
    }
}

/// Format a number without a trailing `.0` for integral values.
pub fn format_number(value: f64) -> String {
    if value.fract() == 0.0 && value.abs() < 1e15 {
        format!("{}", value as i64)
    } else {
        format!("{}", value)
    }
}

/// Parse argument text into a list of values.
pub fn parse_arguments(text: &str) -> Result<Vec<ArgValue>, ToolError> {
    let mut chars = text.chars().peekable();
    let mut items = Vec::new();

    skip_ws(&mut chars);
    if chars.peek().is_none() {
        return Ok(items);
    }

    loop {
        items.push(parse_item(&mut chars)?);
        skip_ws(&mut chars);
        match chars.next() {
            None => break,
            Some(',') => {
                skip_ws(&mut chars);
                // Trailing comma
                if chars.peek().is_none() {
                    break;
                }
            }
            Some(c) => {
                return Err(ToolError::InvalidArguments(format!(
                    "unexpected '{c}' after argument"
                )));
            }
        }
    }

    Ok(items)
}

/// The first argument's text, or the whole text with outer quotes stripped
/// when it does not parse as a literal list.
pub fn primary_text(text: &str) -> String {
    match parse_arguments(text) {
        Ok(items) if !items.is_empty() => items[0].as_text(),
        _ => strip_quotes(text.trim()).to_string(),
    }
}

fn strip_quotes(s: &str) -> &str {
    for q in ['\'', '"'] {
        if s.len() >= 2 && s.starts_with(q) && s.ends_with(q) {
            return &s[1..s.len() - 1];
        }
    }
    s
}

fn skip_ws(chars: &mut Peekable<Chars<'_>>) {
    while chars.peek().is_some_and(|c| c.is_whitespace()) {
        chars.next();
    }
}

fn parse_item(chars: &mut Peekable<Chars<'_>>) -> Result<ArgValue, ToolError> {
    skip_ws(chars);
    match chars.peek() {
        Some(&q) if q == '\'' || q == '"' => {
            chars.next();
            parse_string(chars, q).map(ArgValue::Str)
        }
        Some('[') => {
            chars.next();
            parse_list(chars)
        }
        Some(_) => Ok(parse_bare(chars)),
        None => Err(ToolError::InvalidArguments("expected an argument".into())),
    }
}

fn parse_string(chars: &mut Peekable<Chars<'_>>, quote: char) -> Result<String, ToolError> {
    let mut s = String::new();
    loop {
        match chars.next() {
            Some('\\') => {
                if let Some(escaped) = chars.next() {
                    s.push(match escaped {
                        'n' => '\n',
                        't' => '\t',
                        other => other,
                    });
                }
            }
            Some(ch) if ch == quote => return Ok(s),
            Some(ch) => s.push(ch),
            None => {
                return Err(ToolError::InvalidArguments(
                    "unterminated string literal".into(),
                ));
            }
        }
    }
}

fn parse_list(chars: &mut Peekable<Chars<'_>>) -> Result<ArgValue, ToolError> {
    let mut items = Vec::new();
    loop {
        skip_ws(chars);
        match chars.peek() {
            Some(']') => {
                chars.next();
                return Ok(ArgValue::List(items));
            }
            None => return Err(ToolError::InvalidArguments("unterminated list".into())),
            _ => {}
        }
        items.push(parse_item(chars)?);
        skip_ws(chars);
        match chars.next() {
            Some(',') => continue,
            Some(']') => return Ok(ArgValue::List(items)),
            Some(c) => {
                return Err(ToolError::InvalidArguments(format!(
                    "unexpected '{c}' in list"
                )));
            }
            None => return Err(ToolError::InvalidArguments("unterminated list".into())),
        }
    }
}

fn parse_bare(chars: &mut Peekable<Chars<'_>>) -> ArgValue {
    let mut s = String::new();
    let mut depth = 0usize;
    while let Some(&c) = chars.peek() {
        match c {
            '(' | '[' => depth += 1,
            ')' | ']' if depth > 0 => depth -= 1,
            ']' | ',' if depth == 0 => break,
            _ => {}
        }
        s.push(c);
        chars.next();
    }
    let s = s.trim().to_string();
    match s.parse::<f64>() {
        Ok(n) => ArgValue::Num(n),
        Err(_) => ArgValue::Bare(s),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn single_quoted_string() {
        let args = parse_arguments("'population of city A'").unwrap();
        assert_eq!(args, vec![ArgValue::Str("population of city A".into())]);
    }

    #[test]
    fn string_and_list() {
        let args = parse_arguments("'difference between cities', ['100', '80']").unwrap();
        assert_eq!(args.len(), 2);
        assert_eq!(args[0], ArgValue::Str("difference between cities".into()));
        let list = args[1].as_list().unwrap();
        assert_eq!(list, &[ArgValue::Str("100".into()), ArgValue::Str("80".into())]);
    }

    #[test]
    fn double_quotes_and_escapes() {
        let args = parse_arguments(r#""say \"hi\"""#).unwrap();
        assert_eq!(args[0].as_text(), r#"say "hi""#);
    }

    #[test]
    fn bare_expression_keeps_nested_commas() {
        let args = parse_arguments("max(3, 4) / min(1, 2)").unwrap();
        assert_eq!(args, vec![ArgValue::Bare("max(3, 4) / min(1, 2)".into())]);
    }

    #[test]
    fn bare_numbers() {
        let args = parse_arguments("42, -1.5").unwrap();
        assert_eq!(args, vec![ArgValue::Num(42.0), ArgValue::Num(-1.5)]);
        assert_eq!(args[0].as_text(), "42");
    }

    #[test]
    fn empty_text_has_no_arguments() {
        assert!(parse_arguments("   ").unwrap().is_empty());
    }

    #[test]
    fn trailing_comma_tolerated() {
        assert_eq!(parse_arguments("'a', ").unwrap().len(), 1);
        assert_eq!(parse_arguments("['a', 'b',]").unwrap()[0].as_list().unwrap().len(), 2);
    }

    #[test]
    fn unterminated_string_is_error() {
        assert!(parse_arguments("'open").is_err());
        assert!(parse_arguments("['a'").is_err());
    }

    #[test]
    fn primary_text_falls_back_to_raw() {
        assert_eq!(primary_text("'Toronto population'"), "Toronto population");
        assert_eq!(primary_text("'it's broken'"), "it's broken");
        assert_eq!(primary_text("plain words"), "plain words");
    }

    #[test]
    fn list_text_joins_items() {
        let args = parse_arguments("['100', 80]").unwrap();
        assert_eq!(args[0].as_text(), "100, 80");
    }
}
