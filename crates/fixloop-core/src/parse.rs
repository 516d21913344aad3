//! Proposer output parsing.
//!
//! Every parse is two steps: a tagged result (`Parsed` / `Malformed`) and a
//! total function that maps `Malformed` to a safe default. The tagged step
//! is what the audit log records; the loop only ever sees the default.

use serde_json::Value;

use crate::domain::RawIssue;
use crate::python;
use crate::tools::TestSuite;

/// Object keys under which a plan array may be nested.
const PLAN_KEYS: [&str; 3] = ["refactoring_plan", "issues", "plan"];

/// Balanced blocks tried as JSON, longest first, before giving up.
const MAX_JSON_CANDIDATES: usize = 32;

/// Leading prose a proposer tends to put before code.
const PROSE_PREFIXES: [&str; 6] = ["here", "fixed", "output", "result", "sure", "below"];

/// Result of parsing an `analyze` / `analyze-failure` response.
#[derive(Debug, Clone, PartialEq)]
pub enum ParsedPlan {
    Parsed(Vec<RawIssue>),
    Malformed { reason: String },
}

/// Parse a plan out of free text.
pub fn parse_plan(text: &str) -> ParsedPlan {
    let Some(value) = extract_json(text) else {
        return ParsedPlan::Malformed {
            reason: "no JSON value found in response".to_string(),
        };
    };

    let entries = match &value {
        Value::Array(items) => items,
        Value::Object(obj) => match PLAN_KEYS
            .iter()
            .find_map(|key| obj.get(*key).and_then(Value::as_array))
        {
            Some(items) => items,
            None => {
                return ParsedPlan::Malformed {
                    reason: "JSON object has no plan array".to_string(),
                }
            }
        },
        _ => {
            return ParsedPlan::Malformed {
                reason: "JSON value is neither an array nor an object".to_string(),
            }
        }
    };

    ParsedPlan::Parsed(entries.iter().filter_map(RawIssue::from_value).collect())
}

/// Total mapping: a malformed plan is an empty plan.
pub fn plan_or_empty(parsed: ParsedPlan) -> Vec<RawIssue> {
    match parsed {
        ParsedPlan::Parsed(issues) => issues,
        ParsedPlan::Malformed { reason } => {
            tracing::warn!(reason = %reason, "malformed plan, substituting empty plan");
            Vec::new()
        }
    }
}

/// Find the JSON value in `text`.
///
/// Tries, in order: the whole text, the first fenced block, then the
/// longest balanced `{...}` / `[...]` block that parses, among the
/// [`MAX_JSON_CANDIDATES`] longest.
pub fn extract_json(text: &str) -> Option<Value> {
    let trimmed = text.trim();
    if let Ok(value) = serde_json::from_str(trimmed) {
        return Some(value);
    }
    if let Some(block) = fenced_block(trimmed) {
        if let Ok(value) = serde_json::from_str(block.trim()) {
            return Some(value);
        }
    }

    let mut blocks = balanced_blocks(trimmed);
    blocks.sort_by_key(|block| std::cmp::Reverse(block.len()));
    blocks
        .into_iter()
        .take(MAX_JSON_CANDIDATES)
        .find_map(|block| serde_json::from_str(block).ok())
}

/// Every balanced bracket block in `text`, string-literal aware.
///
/// One pass with a stack of open brackets; each block is recorded when its
/// closer arrives. A mismatched closer discards everything still open.
fn balanced_blocks(text: &str) -> Vec<&str> {
    let mut blocks = Vec::new();
    let mut open: Vec<(u8, usize)> = Vec::new();
    let mut in_string = false;
    let mut escaped = false;

    for (i, &b) in text.as_bytes().iter().enumerate() {
        if in_string {
            match b {
                _ if escaped => escaped = false,
                b'\\' => escaped = true,
                b'"' => in_string = false,
                _ => {}
            }
            continue;
        }
        match b {
            // Quotes in surrounding prose are not strings.
            b'"' if !open.is_empty() => in_string = true,
            b'{' | b'[' => open.push((b, i)),
            b'}' | b']' => {
                let expected = if b == b'}' { b'{' } else { b'[' };
                match open.pop() {
                    Some((opener, start)) if opener == expected => blocks.push(&text[start..=i]),
                    Some(_) => open.clear(),
                    None => {}
                }
            }
            _ => {}
        }
    }
    blocks
}

/// Body of the first ``` fenced block; an unterminated fence runs to the end.
fn fenced_block(text: &str) -> Option<&str> {
    let open = text.find("```")?;
    let after_fence = &text[open + 3..];
    // Skip the info string (`python`, `json`, ...).
    let body_start = after_fence.find('\n').map_or(after_fence.len(), |i| i + 1);
    let body = &after_fence[body_start..];
    Some(match body.find("```") {
        Some(close) => &body[..close],
        None => body,
    })
}

/// Strip markdown fences and leading prose from a `fix` response.
pub fn clean_code_output(text: &str) -> String {
    let body = fenced_block(text).unwrap_or(text);

    let lines: Vec<&str> = body.lines().collect();
    let first_code = lines
        .iter()
        .position(|line| !line.trim().is_empty() && !is_prose(line))
        .unwrap_or(lines.len());

    let cleaned = lines[first_code..].join("\n");
    let cleaned = cleaned.trim_end();
    if cleaned.is_empty() {
        String::new()
    } else {
        format!("{cleaned}\n")
    }
}

// `result = compute()` is code, `Result:` is prose.
fn is_prose(line: &str) -> bool {
    let lower = line.trim().to_ascii_lowercase();
    PROSE_PREFIXES.iter().any(|p| lower.starts_with(p))
        && (lower.ends_with(':') || lower.ends_with('.') || lower.ends_with('!'))
}

/// Result of parsing a `generate-tests` response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ParsedTests {
    Parsed(String),
    Malformed { reason: String },
}

/// Parse generated test code: it must parse and define at least one test.
pub fn parse_tests(text: &str) -> ParsedTests {
    let code = clean_code_output(text);
    if !code.contains("def test_") {
        return ParsedTests::Malformed {
            reason: "no test functions in response".to_string(),
        };
    }
    match python::syntax_error(&code) {
        Ok(None) => ParsedTests::Parsed(code),
        Ok(Some(line)) => ParsedTests::Malformed {
            reason: format!("syntax error at line {line}"),
        },
        Err(err) => ParsedTests::Malformed {
            reason: err.to_string(),
        },
    }
}

/// Total mapping: malformed tests become the always-pass placeholder suite.
pub fn tests_or_placeholder(parsed: ParsedTests, module: &str) -> TestSuite {
    match parsed {
        ParsedTests::Parsed(code) => TestSuite::synthesized(module, code),
        ParsedTests::Malformed { reason } => {
            tracing::warn!(module = %module, reason = %reason, "generated tests unusable, using placeholder");
            TestSuite::placeholder(module)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tools::TestOrigin;

    #[test]
    fn test_bare_array() {
        let parsed = parse_plan(r#"[{"description": "d", "suggestion": "s"}]"#);
        match parsed {
            ParsedPlan::Parsed(issues) => assert_eq!(issues.len(), 1),
            other => panic!("expected Parsed, got {other:?}"),
        }
    }

    #[test]
    fn test_fenced_object_with_plan_key() {
        let text = "Analysis below.\n```json\n{\"refactoring_plan\": [{\"description\": \"d\", \"suggestion\": \"s\"}, {\"description\": \"e\", \"suggestion\": \"t\"}]}\n```\nDone.";
        assert_eq!(plan_or_empty(parse_plan(text)).len(), 2);
    }

    #[test]
    fn test_json_embedded_in_prose() {
        let text = "I found {one} thing: {\"issues\": [{\"issue\": \"x {y}\", \"suggestion\": \"z\"}]} hope it helps";
        let issues = plan_or_empty(parse_plan(text));
        assert_eq!(issues.len(), 1);
        assert_eq!(issues[0].description.as_deref(), Some("x {y}"));
    }

    #[test]
    fn test_non_json_is_malformed_and_maps_to_empty() {
        let parsed = parse_plan("The code looks fine to me.");
        assert!(matches!(parsed, ParsedPlan::Malformed { .. }));
        assert!(plan_or_empty(parsed).is_empty());
    }

    #[test]
    fn test_object_without_plan_is_malformed() {
        assert!(matches!(
            parse_plan(r#"{"summary": "ok"}"#),
            ParsedPlan::Malformed { .. }
        ));
    }

    #[test]
    fn test_unbalanced_flood_is_linear() {
        let started = std::time::Instant::now();
        let parsed = parse_plan(&"[".repeat(200_000));
        assert!(matches!(parsed, ParsedPlan::Malformed { .. }));
        let parsed = parse_plan(&"{[".repeat(100_000));
        assert!(matches!(parsed, ParsedPlan::Malformed { .. }));
        assert!(started.elapsed() < std::time::Duration::from_secs(5));
    }

    #[test]
    fn test_plan_after_unclosed_brackets_is_found() {
        let text = format!(
            "{} notes ] then {{\"issues\": [{{\"description\": \"d\", \"suggestion\": \"s\"}}]}}",
            "[".repeat(10_000)
        );
        assert_eq!(plan_or_empty(parse_plan(&text)).len(), 1);
    }

    #[test]
    fn test_balanced_blocks_records_nested_once() {
        let blocks = balanced_blocks(r#"x [1, {"a": "]"}] y ] {"#);
        assert_eq!(blocks, vec![r#"{"a": "]"}"#, r#"[1, {"a": "]"}]"#]);
    }

    #[test]
    fn test_clean_code_strips_fence() {
        let text = "Here is the fixed code:\n```python\ndef add(a, b):\n    return a + b\n```\n";
        assert_eq!(clean_code_output(text), "def add(a, b):\n    return a + b\n");
    }

    #[test]
    fn test_clean_code_strips_prose_without_fence() {
        let text = "Fixed version:\n\ndef add(a, b):\n    return a + b";
        assert_eq!(clean_code_output(text), "def add(a, b):\n    return a + b\n");
    }

    #[test]
    fn test_clean_code_keeps_code_that_looks_like_prose() {
        let text = "result = compute()\nprint(result)\n";
        assert_eq!(clean_code_output(text), text);
    }

    #[test]
    fn test_generated_tests_accepted() {
        let text = "```python\nfrom calc import add\n\ndef test_add():\n    assert add(1, 2) == 3\n```";
        let suite = tests_or_placeholder(parse_tests(text), "calc");
        assert_eq!(suite.origin, TestOrigin::Synthesized);
        assert_eq!(suite.file_name, "test_calc.py");
    }

    #[test]
    fn test_generated_tests_without_tests_fall_back() {
        let suite = tests_or_placeholder(parse_tests("I cannot write tests."), "calc");
        assert_eq!(suite.origin, TestOrigin::Placeholder);
    }

    #[test]
    fn test_generated_tests_with_syntax_error_fall_back() {
        let suite = tests_or_placeholder(parse_tests("def test_x(:\n    assert True\n"), "calc");
        assert_eq!(suite.origin, TestOrigin::Placeholder);
    }
}
