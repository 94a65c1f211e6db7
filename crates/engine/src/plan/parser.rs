//! Plan text parser.
//!
//! Each line is parsed on its own with a small recursive-descent cursor:
//!
//! ```text
//! step    = ws* INDEX "." ws* IDENT ws* "(" body ")" ws* comment? ws*
//! INDEX   = DIGIT+
//! IDENT   = (ALPHA | "_") (ALNUM | "_")*
//! comment = "#" any*
//! ```
//!
//! The body is quote-aware: parentheses inside `'...'` or `"..."` do not
//! count. The call closes at the `)` that balances the opening `(`. When that
//! close is followed by something other than a comment, or no balanced close
//! exists (an apostrophe in prose opens a quote that never ends), the last
//! `)` on the line closes the call instead.
//!
//! Lines that do not start with `INDEX "."` are not steps and are skipped
//! without a diagnostic (`Plan:`, `Thought: ...`, `###`, blank lines).

use std::collections::HashMap;

use stepforge_core::tool::ToolRegistry;
use tracing::{debug, warn};

use super::{Diagnostic, DiagnosticKind, ParseMode, Plan, PlanError, Step, resolver};

/// Parse plan text into a [`Plan`] with resolved dependencies.
///
/// Tool names are checked against `registry` but unknown tools are kept
/// (`tool_known = false`); invoking them fails at execution time.
///
/// In [`ParseMode::Strict`] any dropped line fails the whole plan.
/// Duplicate indices are only ever reported.
pub fn parse_plan(
    text: &str,
    registry: &ToolRegistry,
    mode: ParseMode,
) -> Result<Plan, PlanError> {
    let mut plan = Plan::default();
    let mut first_line_of: HashMap<usize, usize> = HashMap::new();

    for (i, raw) in text.split('\n').enumerate() {
        let line_no = i + 1;
        let line = raw.strip_suffix('\r').unwrap_or(raw);

        match parse_line(line) {
            LineOutcome::NotAStep => {}
            LineOutcome::Malformed { kind, start, end } => {
                warn!(line = line_no, kind = %kind, "Malformed plan line skipped");
                plan.diagnostics.push(Diagnostic {
                    line: line_no,
                    start,
                    end,
                    kind,
                    text: line.to_string(),
                });
            }
            LineOutcome::Step(parsed) => {
                if let Some(&earlier) = first_line_of.get(&parsed.index) {
                    warn!(
                        index = parsed.index,
                        line = line_no,
                        first_line = earlier,
                        "Duplicate step index"
                    );
                    plan.diagnostics.push(Diagnostic {
                        line: line_no,
                        start: parsed.index_span.0,
                        end: parsed.index_span.1,
                        kind: DiagnosticKind::DuplicateIndex,
                        text: line.to_string(),
                    });
                } else {
                    first_line_of.insert(parsed.index, line_no);
                }

                let tool_known = registry.contains(parsed.tool);
                if !tool_known {
                    debug!(index = parsed.index, tool = parsed.tool, "Step names an unregistered tool");
                }

                plan.steps.push(Step {
                    index: parsed.index,
                    tool: parsed.tool.to_string(),
                    tool_known,
                    args: parsed.args.to_string(),
                    dependencies: Default::default(),
                    line: line_no,
                    comment: parsed.comment.map(str::to_string),
                });
            }
        }
    }

    if mode == ParseMode::Strict && plan.has_errors() {
        let diagnostics = plan.errors().cloned().collect();
        return Err(PlanError::Malformed { diagnostics });
    }

    resolver::resolve(&mut plan);

    debug!(
        steps = plan.steps.len(),
        diagnostics = plan.diagnostics.len(),
        unknown_tools = plan.unknown_tools().len(),
        "Plan parsed"
    );

    Ok(plan)
}

// ── Line grammar ──────────────────────────────────────────────────────────

#[derive(Debug, PartialEq)]
struct ParsedLine<'a> {
    index: usize,
    index_span: (usize, usize),
    tool: &'a str,
    args: &'a str,
    comment: Option<&'a str>,
}

#[derive(Debug, PartialEq)]
enum LineOutcome<'a> {
    NotAStep,
    Malformed {
        kind: DiagnosticKind,
        start: usize,
        end: usize,
    },
    Step(ParsedLine<'a>),
}

fn parse_line(line: &str) -> LineOutcome<'_> {
    let mut cursor = Cursor::new(line);
    cursor.skip_ws();

    // INDEX "."
    let index_start = cursor.pos;
    cursor.take_while(|b| b.is_ascii_digit());
    let index_end = cursor.pos;
    if index_end == index_start || cursor.peek() != Some(b'.') {
        return LineOutcome::NotAStep;
    }
    cursor.bump();
    // "3.14 is ..." is a number, not a step
    if cursor.peek().is_some_and(|b| b.is_ascii_digit()) {
        return LineOutcome::NotAStep;
    }

    let index = match line[index_start..index_end].parse::<usize>() {
        Ok(0) | Err(_) => return cursor.malformed(DiagnosticKind::InvalidIndex, index_start, index_end),
        Ok(n) => n,
    };

    // IDENT
    cursor.skip_ws();
    let tool_start = cursor.pos;
    if !cursor.peek().is_some_and(|b| b.is_ascii_alphabetic() || b == b'_') {
        return cursor.malformed(DiagnosticKind::MissingToolName, tool_start, line.len());
    }
    cursor.take_while(|b| b.is_ascii_alphanumeric() || b == b'_');
    let tool = &line[tool_start..cursor.pos];

    // "("
    cursor.skip_ws();
    if cursor.peek() != Some(b'(') {
        let at = cursor.pos;
        return cursor.malformed(DiagnosticKind::MissingOpenParen, at, line.len());
    }
    let open = cursor.pos;
    cursor.bump();

    // body ")"
    let close = match cursor.find_close(open) {
        Ok(close) => close,
        Err(outcome) => return outcome,
    };

    let args = &line[open + 1..close];
    let comment = trailing_comment(&line[close + 1..]).flatten();

    LineOutcome::Step(ParsedLine {
        index,
        index_span: (index_start, index_end),
        tool,
        args,
        comment,
    })
}

/// Classify what follows the closing paren.
///
/// `None` means non-comment text; `Some(None)` means nothing (or an empty
/// comment); `Some(Some(c))` is a comment body.
fn trailing_comment(rest: &str) -> Option<Option<&str>> {
    let rest = rest.trim();
    if rest.is_empty() {
        return Some(None);
    }
    let body = rest.strip_prefix('#')?.trim();
    Some(if body.is_empty() { None } else { Some(body) })
}

struct Cursor<'a> {
    line: &'a str,
    bytes: &'a [u8],
    pos: usize,
}

impl<'a> Cursor<'a> {
    fn new(line: &'a str) -> Self {
        Self {
            line,
            bytes: line.as_bytes(),
            pos: 0,
        }
    }

    fn peek(&self) -> Option<u8> {
        self.bytes.get(self.pos).copied()
    }

    fn bump(&mut self) {
        self.pos += 1;
    }

    fn skip_ws(&mut self) {
        self.take_while(|b| b == b' ' || b == b'\t');
    }

    fn take_while(&mut self, pred: impl Fn(u8) -> bool) {
        while self.peek().is_some_and(&pred) {
            self.pos += 1;
        }
    }

    fn malformed(&self, kind: DiagnosticKind, start: usize, end: usize) -> LineOutcome<'a> {
        LineOutcome::Malformed {
            kind,
            start,
            end: end.max(start).min(self.line.len()),
        }
    }

    /// Locate the `)` that closes the call opened at `open`.
    fn find_close(&mut self, open: usize) -> Result<usize, LineOutcome<'a>> {
        let balanced = self.balanced_close();
        let last = self.line[open + 1..].rfind(')').map(|p| p + open + 1);

        if let Some(close) = balanced
            && trailing_comment(&self.line[close + 1..]).is_some()
        {
            return Ok(close);
        }

        match last {
            Some(close) if trailing_comment(&self.line[close + 1..]).is_some() => Ok(close),
            Some(close) => {
                let start = close + 1 + leading_ws(&self.line[close + 1..]);
                Err(self.malformed(DiagnosticKind::TrailingText, start, self.line.len()))
            }
            None => Err(self.malformed(DiagnosticKind::UnclosedCall, open, self.line.len())),
        }
    }

    /// Scan the body from the current position, tracking nesting and quotes.
    fn balanced_close(&mut self) -> Option<usize> {
        let mut depth = 1usize;
        let mut quote: Option<u8> = None;

        while let Some(b) = self.peek() {
            match quote {
                Some(q) => {
                    if b == b'\\' {
                        self.bump();
                    } else if b == q {
                        quote = None;
                    }
                }
                None => match b {
                    b'\'' | b'"' => quote = Some(b),
                    b'(' => depth += 1,
                    b')' => {
                        depth -= 1;
                        if depth == 0 {
                            return Some(self.pos);
                        }
                    }
                    _ => {}
                },
            }
            self.bump();
        }

        None
    }
}

fn leading_ws(s: &str) -> usize {
    s.len() - s.trim_start().len()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_helpers::registry_of;

    fn registry() -> ToolRegistry {
        registry_of(&["search", "math", "abs_difference", "calculator"])
    }

    fn lenient(text: &str) -> Plan {
        parse_plan(text, &registry(), ParseMode::Lenient).unwrap()
    }

    fn step_line(line: &str) -> ParsedLine<'_> {
        match parse_line(line) {
            LineOutcome::Step(parsed) => parsed,
            other => panic!("expected a step, got {other:?}"),
        }
    }

    fn malformed_kind(line: &str) -> DiagnosticKind {
        match parse_line(line) {
            LineOutcome::Malformed { kind, .. } => kind,
            other => panic!("expected malformed, got {other:?}"),
        }
    }

    #[test]
    fn scenario_plan_parses_three_steps() {
        let plan = lenient(
            "Plan:\n\
             1. search('population of city A')\n\
             2. search('population of city B')\n\
             3. math('difference', ['$1', '$2'])\n\
             Thought: I can answer now.\n",
        );
        assert_eq!(plan.len(), 3);
        assert!(plan.diagnostics.is_empty());
        assert_eq!(plan.steps[0].args, "'population of city A'");
        assert_eq!(plan.steps[2].tool, "math");
        assert_eq!(plan.steps[2].line, 4);
        assert_eq!(plan.steps[2].dependencies.iter().copied().collect::<Vec<_>>(), vec![1, 2]);
    }

    #[test]
    fn last_line_without_newline() {
        let plan = lenient("1. search('a')\n2. search('b')");
        assert_eq!(plan.len(), 2);
        assert_eq!(plan.steps[1].args, "'b'");
    }

    #[test]
    fn crlf_line_endings() {
        let plan = lenient("1. search('a')\r\n2. search('b')\r\n");
        assert_eq!(plan.len(), 2);
        assert_eq!(plan.steps[0].args, "'a'");
    }

    #[test]
    fn step_count_matches_grammar_lines_in_order() {
        let text = "intro\n3. search('c')\n\n1. search('a')\n###\n2. math($1)\n";
        let plan = lenient(text);
        let indices: Vec<usize> = plan.steps.iter().map(|s| s.index).collect();
        assert_eq!(indices, vec![3, 1, 2]);
    }

    #[test]
    fn parens_inside_quotes_ignored() {
        let parsed = step_line("1. search('f(x) = (a')");
        assert_eq!(parsed.args, "'f(x) = (a'");
    }

    #[test]
    fn nested_calls_in_args() {
        let parsed = step_line("7. math(max($2, $4) / min($2, $4))");
        assert_eq!(parsed.args, "max($2, $4) / min($2, $4)");
    }

    #[test]
    fn apostrophe_falls_back_to_last_paren() {
        let parsed = step_line("2. search(what's the population (2020))");
        assert_eq!(parsed.args, "what's the population (2020)");
    }

    #[test]
    fn comment_after_call() {
        let parsed = step_line("1. search('a')   # first lookup");
        assert_eq!(parsed.comment, Some("first lookup"));
        assert_eq!(parsed.args, "'a'");
    }

    #[test]
    fn hash_inside_args_is_not_a_comment() {
        let parsed = step_line("1. search('C# tutorials')");
        assert_eq!(parsed.args, "'C# tutorials'");
        assert_eq!(parsed.comment, None);
    }

    #[test]
    fn balanced_close_followed_by_text_uses_last_paren() {
        let parsed = step_line("1. math(2) + (3)");
        assert_eq!(parsed.args, "2) + (3");
    }

    #[test]
    fn leading_whitespace_and_space_before_paren() {
        let parsed = step_line("   4.search ('x')");
        assert_eq!(parsed.index, 4);
        assert_eq!(parsed.tool, "search");
    }

    #[test]
    fn non_step_lines_ignored() {
        for line in ["Plan:", "", "###", "Thought: done", "3.14 is pi", "1) search('a')", "step 1. search('a')"] {
            assert_eq!(parse_line(line), LineOutcome::NotAStep, "{line:?}");
        }
    }

    #[test]
    fn malformed_kinds() {
        assert_eq!(malformed_kind("1. (x)"), DiagnosticKind::MissingToolName);
        assert_eq!(malformed_kind("2."), DiagnosticKind::MissingToolName);
        assert_eq!(malformed_kind("2. search 'x'"), DiagnosticKind::MissingOpenParen);
        assert_eq!(malformed_kind("3. search('x'"), DiagnosticKind::UnclosedCall);
        assert_eq!(malformed_kind("0. search('x')"), DiagnosticKind::InvalidIndex);
        assert_eq!(
            malformed_kind("99999999999999999999999. search('x')"),
            DiagnosticKind::InvalidIndex
        );
        assert_eq!(malformed_kind("4. search('x') then more"), DiagnosticKind::TrailingText);
    }

    #[test]
    fn diagnostic_spans_point_at_problem() {
        let plan = lenient("1. search('a')\n2. search 'b'\n3. search('c') extra");
        assert_eq!(plan.len(), 1);
        assert_eq!(plan.diagnostics.len(), 2);

        let missing = &plan.diagnostics[0];
        assert_eq!(missing.line, 2);
        assert_eq!(missing.kind, DiagnosticKind::MissingOpenParen);
        assert_eq!(&missing.text[missing.start..], "'b'");

        let trailing = &plan.diagnostics[1];
        assert_eq!(trailing.kind, DiagnosticKind::TrailingText);
        assert_eq!(&trailing.text[trailing.start..trailing.end], "extra");
    }

    #[test]
    fn strict_mode_rejects_malformed_lines() {
        let err = parse_plan("1. search('a')\n2. search('b'", &registry(), ParseMode::Strict)
            .unwrap_err();
        match err {
            PlanError::Malformed { diagnostics } => {
                assert_eq!(diagnostics.len(), 1);
                assert_eq!(diagnostics[0].kind, DiagnosticKind::UnclosedCall);
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn strict_mode_accepts_duplicates() {
        let plan = parse_plan("1. search('a')\n1. search('b')", &registry(), ParseMode::Strict)
            .unwrap();
        assert_eq!(plan.len(), 2);
        assert_eq!(plan.diagnostics.len(), 1);
        assert_eq!(plan.diagnostics[0].kind, DiagnosticKind::DuplicateIndex);
        assert_eq!(plan.diagnostics[0].line, 2);
    }

    #[test]
    fn unknown_tool_kept_and_flagged() {
        let plan = lenient("1. search('a')\n2. unknown_tool($1)");
        assert_eq!(plan.len(), 2);
        assert!(plan.steps[0].tool_known);
        assert!(!plan.steps[1].tool_known);
        assert_eq!(plan.unknown_tools().len(), 1);
    }

    #[test]
    fn args_kept_verbatim() {
        let parsed = step_line("2. math(  ${1}  *  2  )");
        assert_eq!(parsed.args, "  ${1}  *  2  ");
    }

    #[test]
    fn empty_args() {
        let parsed = step_line("5. search()");
        assert_eq!(parsed.args, "");
    }

    #[test]
    fn empty_text_is_empty_plan() {
        let plan = lenient("");
        assert!(plan.is_empty());
        assert!(plan.diagnostics.is_empty());
    }
}
