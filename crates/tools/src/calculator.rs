//! Calculator tool: evaluates mathematical expressions.
//!
//! Supports basic arithmetic: `+`, `-`, `*`, `/`, parentheses, unary
//! negation, and the functions `abs`, `min`, and `max`, which planners use
//! to combine earlier observations (`max($2, $4) / min($2, $4)`). Uses a
//! precedence-climbing parser.

use async_trait::async_trait;
use stepforge_core::error::ToolError;
use stepforge_core::tool::{Tool, ToolOutput};

use crate::args::primary_text;
use crate::number_output;

pub struct CalculatorTool;

#[async_trait]
impl Tool for CalculatorTool {
    fn name(&self) -> &str {
        "calculator"
    }

    fn description(&self) -> &str {
        "Evaluate a mathematical expression. Supports +, -, *, /, parentheses, decimal numbers, abs(x), min(a, b, ...) and max(a, b, ...)."
    }

    async fn invoke(&self, args: &str) -> Result<ToolOutput, ToolError> {
        let expr = primary_text(args);
        if expr.trim().is_empty() {
            return Err(ToolError::InvalidArguments("Missing expression".into()));
        }

        evaluate(&expr)
            .map(number_output)
            .map_err(|e| ToolError::ExecutionFailed {
                tool_name: self.name().to_string(),
                reason: e,
            })
    }
}

// ── Expression evaluator ──────────────────────────────────────────────────
//
// expr    = unary (op unary)*          precedence climbing over + - * /
// unary   = '-' unary | primary
// primary = NUMBER | NAME '(' expr (',' expr)* ')' | '(' expr ')'

/// Evaluate a mathematical expression string.
pub fn evaluate(expr: &str) -> Result<f64, String> {
    let mut eval = Evaluator {
        tokens: lex(expr)?,
        pos: 0,
    };
    let value = eval.expr(0)?;
    match eval.tokens.get(eval.pos) {
        None => Ok(value),
        Some(tok) => Err(format!("Unexpected {tok:?} after complete expression")),
    }
}

#[derive(Debug, Clone, PartialEq)]
enum Tok {
    Num(f64),
    Name(String),
    Op(char),
    Comma,
    Open,
    Close,
}

fn lex(input: &str) -> Result<Vec<Tok>, String> {
    let mut out = Vec::new();
    let mut chars = input.chars().peekable();

    while let Some(&c) = chars.peek() {
        if c.is_whitespace() {
            chars.next();
            continue;
        }
        if c.is_ascii_digit() || c == '.' {
            let mut text = String::new();
            while let Some(&d) = chars.peek().filter(|d| d.is_ascii_digit() || **d == '.') {
                text.push(d);
                chars.next();
            }
            let n = text.parse().map_err(|_| format!("Invalid number: {text}"))?;
            out.push(Tok::Num(n));
            continue;
        }
        if c.is_ascii_alphabetic() {
            let mut name = String::new();
            while let Some(&d) = chars.peek().filter(|d| d.is_ascii_alphanumeric() || **d == '_') {
                name.push(d);
                chars.next();
            }
            out.push(Tok::Name(name));
            continue;
        }

        out.push(match c {
            '+' | '-' | '*' | '/' => Tok::Op(c),
            ',' => Tok::Comma,
            '(' => Tok::Open,
            ')' => Tok::Close,
            other => return Err(format!("Unexpected character: '{other}'")),
        });
        chars.next();
    }

    Ok(out)
}

/// Binding power of a binary operator.
fn precedence(op: char) -> u8 {
    match op {
        '*' | '/' => 2,
        _ => 1,
    }
}

struct Evaluator {
    tokens: Vec<Tok>,
    pos: usize,
}

impl Evaluator {
    fn next(&mut self) -> Option<Tok> {
        let tok = self.tokens.get(self.pos).cloned();
        self.pos += usize::from(tok.is_some());
        tok
    }

    fn expr(&mut self, min_prec: u8) -> Result<f64, String> {
        let mut lhs = self.unary()?;

        while let Some(&Tok::Op(op)) = self.tokens.get(self.pos) {
            let prec = precedence(op);
            if prec <= min_prec {
                break;
            }
            self.pos += 1;
            let rhs = self.expr(prec)?;
            lhs = match op {
                '+' => lhs + rhs,
                '-' => lhs - rhs,
                '*' => lhs * rhs,
                _ if rhs == 0.0 => return Err("Division by zero".into()),
                _ => lhs / rhs,
            };
        }

        Ok(lhs)
    }

    fn unary(&mut self) -> Result<f64, String> {
        if self.tokens.get(self.pos) == Some(&Tok::Op('-')) {
            self.pos += 1;
            return Ok(-self.unary()?);
        }
        self.primary()
    }

    fn primary(&mut self) -> Result<f64, String> {
        match self.next() {
            Some(Tok::Num(n)) => Ok(n),
            Some(Tok::Open) => {
                let value = self.expr(0)?;
                match self.next() {
                    Some(Tok::Close) => Ok(value),
                    _ => Err("Expected closing parenthesis".into()),
                }
            }
            Some(Tok::Name(name)) => self.call(&name),
            Some(tok) => Err(format!("Unexpected token: {tok:?}")),
            None => Err("Unexpected end of expression".into()),
        }
    }

    fn call(&mut self, name: &str) -> Result<f64, String> {
        if self.next() != Some(Tok::Open) {
            return Err(format!("Expected '(' after function '{name}'"));
        }
        let mut args = vec![self.expr(0)?];
        loop {
            match self.next() {
                Some(Tok::Comma) => args.push(self.expr(0)?),
                Some(Tok::Close) => break,
                _ => return Err(format!("Expected ',' or ')' in call to '{name}'")),
            }
        }

        match name.to_ascii_lowercase().as_str() {
            "abs" if args.len() == 1 => Ok(args[0].abs()),
            "abs" => Err("abs() takes exactly one argument".into()),
            "min" => Ok(args.into_iter().fold(f64::INFINITY, f64::min)),
            "max" => Ok(args.into_iter().fold(f64::NEG_INFINITY, f64::max)),
            other => Err(format!("Unknown function: {other}")),
        }
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn simple_addition() {
        assert_eq!(evaluate("2 + 3").unwrap(), 5.0);
    }

    #[test]
    fn operator_precedence() {
        assert_eq!(evaluate("2 + 3 * 4").unwrap(), 14.0);
    }

    #[test]
    fn parentheses() {
        assert_eq!(evaluate("(2 + 3) * 4").unwrap(), 20.0);
    }

    #[test]
    fn division_by_zero() {
        assert!(evaluate("1 / 0").is_err());
    }

    #[test]
    fn unary_negation() {
        assert_eq!(evaluate("-5 + 3").unwrap(), -2.0);
        assert_eq!(evaluate("2 * -(1 + 2)").unwrap(), -6.0);
    }

    #[test]
    fn left_associative() {
        assert_eq!(evaluate("10 - 4 - 3").unwrap(), 3.0);
        assert_eq!(evaluate("24 / 4 / 2").unwrap(), 3.0);
        assert_eq!(evaluate("2 * 3 - 8 / 4").unwrap(), 4.0);
    }

    #[test]
    fn functions() {
        assert_eq!(evaluate("abs(3 - 10)").unwrap(), 7.0);
        assert_eq!(evaluate("max(2, 9, 4) / min(2, 9, 4)").unwrap(), 4.5);
    }

    #[test]
    fn unknown_function() {
        let err = evaluate("sqrt(4)").unwrap_err();
        assert!(err.contains("sqrt"));
    }

    #[test]
    fn abs_arity() {
        assert!(evaluate("abs(1, 2)").is_err());
    }

    #[test]
    fn invalid_expression() {
        assert!(evaluate("2 +").is_err());
        assert!(evaluate("").is_err());
    }

    #[tokio::test]
    async fn tool_accepts_quoted_expression() {
        let out = CalculatorTool.invoke("'10 / 2'").await.unwrap();
        assert_eq!(out.render(), "5");
    }

    #[tokio::test]
    async fn tool_accepts_bare_expression_with_calls() {
        let out = CalculatorTool.invoke("max(100, 80) - min(100, 80)").await.unwrap();
        assert_eq!(out.render(), "20");
    }

    #[tokio::test]
    async fn tool_formats_decimals() {
        let out = CalculatorTool.invoke("\"10 / 3\"").await.unwrap();
        assert!(out.render().starts_with("3.333"));
    }

    #[tokio::test]
    async fn tool_reports_evaluation_failure() {
        let err = CalculatorTool.invoke("'1 / 0'").await.unwrap_err();
        assert!(matches!(err, ToolError::ExecutionFailed { .. }));
    }

    #[tokio::test]
    async fn tool_missing_expression() {
        let err = CalculatorTool.invoke("").await.unwrap_err();
        assert!(matches!(err, ToolError::InvalidArguments(_)));
    }

    #[test]
    fn tool_descriptor() {
        let def = CalculatorTool.to_descriptor();
        assert_eq!(def.name, "calculator");
    }
}
