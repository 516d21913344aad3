//! Prompt rendering, one template per [`PromptKind`].
//!
//! Analysis prompts are bounded by `max_chars`: the numbered listing is
//! trimmed keeping its head and tail, so line numbers stay true. Fix
//! prompts are never trimmed since the proposer must return the whole file.
//!
//! [`PromptKind`]: crate::proposer::PromptKind

use std::borrow::Cow;
use std::fmt::Write as _;

use crate::domain::{FailureReport, RefactoringPlan, RegressionFailure};

const PLAN_SCHEMA: &str = r#"Respond with JSON only, in this shape:
{"refactoring_plan": [
  {"priority": "CRITICAL|HIGH|MEDIUM|LOW",
   "category": "bug|style|performance|security|...",
   "description": "what is wrong",
   "line": 12,
   "code_snippet": "exact text of the offending line, without the line number",
   "suggestion": "how to fix it",
   "requires_structural_change": false}
]}
Use an empty list if there is nothing to fix."#;

const FIX_RULES: &str = "Rules:
- Return the complete corrected file and nothing else.
- Keep every function and method: same names, same parameters, same order.
- Do not add new functions.
- Do not use eval, exec, subprocess, os.system or file deletion.
- Keep the file roughly the same size.";

/// Renders prompts under a character budget.
#[derive(Debug, Clone)]
pub struct PromptBuilder {
    max_chars: usize,
}

impl PromptBuilder {
    pub fn new(max_chars: usize) -> Self {
        Self { max_chars }
    }

    /// Initial defect analysis.
    pub fn analyze(&self, unit: &str, source: &str) -> String {
        let header = format!(
            "You are reviewing the Python file `{unit}`. Find bugs, errors and quality problems.\n\n{PLAN_SCHEMA}\n\nSource (line numbers on the left):\n"
        );
        let listing = numbered(source);
        let body = self.fit(&listing, header.len());
        format!("{header}{body}")
    }

    /// Re-analysis after the previous fixes were rejected by the regression checks.
    pub fn analyze_after_rejection(
        &self,
        unit: &str,
        source: &str,
        failures: &[RegressionFailure],
    ) -> String {
        let base = self.analyze(unit, source);
        format!("{base}{}", rejection_notes(failures))
    }

    /// Failure-focused analysis: one plan entry per failing test and per lint finding.
    pub fn analyze_failure(&self, unit: &str, source: &str, report: &FailureReport) -> String {
        let mut header = format!(
            "The Python file `{unit}` failed verification. Produce exactly one plan entry for each failing test and each lint finding below ({} entries).\n\n{PLAN_SCHEMA}\n\n",
            report.actionable_items()
        );
        if !report.failing_tests.is_empty() {
            header.push_str("Failing tests:\n");
            for failure in &report.failing_tests {
                let _ = writeln!(header, "- {}: {}", failure.test_id, failure.message);
            }
        }
        if let Some(summary) = &report.lint_summary {
            let _ = writeln!(header, "Lint: {summary}");
        }
        if !report.lint_findings.is_empty() {
            header.push_str("Lint findings:\n");
            for finding in &report.lint_findings {
                let line = finding.line.map_or_else(|| "?".to_string(), |l| l.to_string());
                let _ = writeln!(header, "- line {line} [{}] {}", finding.code, finding.message);
            }
        }
        header.push_str("\nSource (line numbers on the left):\n");

        let listing = numbered(source);
        let body = self.fit(&listing, header.len());
        format!("{header}{body}")
    }

    /// Apply a validated plan. Never trimmed.
    pub fn fix(&self, unit: &str, source: &str, plan: &RefactoringPlan) -> String {
        let mut out = format!("Fix the following issues in the Python file `{unit}`.\n\nIssues:\n");
        for (idx, issue) in plan.iter().enumerate() {
            let line = issue.line.map_or_else(String::new, |l| format!(" (line {l})"));
            let _ = writeln!(
                out,
                "{}. [{}] {}{line}\n   Fix: {}",
                idx + 1,
                issue.priority,
                issue.description,
                issue.suggestion
            );
        }
        let _ = write!(out, "\n{FIX_RULES}\n\nSource:\n```python\n{source}\n```\n");
        out
    }

    /// Minimal pytest suite for a unit with no tests.
    pub fn generate_tests(&self, unit: &str, module: &str, source: &str) -> String {
        let header = format!(
            "Write a short pytest test file for the Python module `{module}` (file `{unit}`).\n\
             Import from `{module}` directly. Test only the behaviour the code clearly intends.\n\
             Return only Python code.\n\nSource:\n"
        );
        let body = self.fit(source, header.len());
        format!("{header}{body}")
    }

    fn fit<'a>(&self, source: &'a str, overhead: usize) -> Cow<'a, str> {
        trim_source(source, self.max_chars.saturating_sub(overhead))
    }
}

/// Why the previous fix was thrown away, appended to analysis prompts.
pub fn rejection_notes(failures: &[RegressionFailure]) -> String {
    let mut notes = String::from("\nThe previous fix was rejected:\n");
    for failure in failures {
        let _ = writeln!(notes, "- {failure}");
    }
    notes.push_str("Propose smaller changes that keep every function signature intact.\n");
    notes
}

/// Keep `source` within `budget` chars by dropping middle lines.
///
/// Head and tail get half the budget each, whole lines only; the dropped
/// range is replaced by a marker comment.
pub fn trim_source(source: &str, budget: usize) -> Cow<'_, str> {
    if source.len() <= budget {
        return Cow::Borrowed(source);
    }

    let lines: Vec<&str> = source.lines().collect();
    let half = budget / 2;

    let mut head_len = 0;
    let mut head = 0;
    while head < lines.len() && head_len + lines[head].len() + 1 <= half {
        head_len += lines[head].len() + 1;
        head += 1;
    }

    let mut tail_len = 0;
    let mut tail = lines.len();
    while tail > head && tail_len + lines[tail - 1].len() + 1 <= half {
        tail_len += lines[tail - 1].len() + 1;
        tail -= 1;
    }

    let mut out = lines[..head].join("\n");
    if !out.is_empty() {
        out.push('\n');
    }
    let _ = writeln!(out, "# ... [{} lines trimmed] ...", tail - head);
    out.push_str(&lines[tail..].join("\n"));
    Cow::Owned(out)
}

fn numbered(source: &str) -> String {
    let mut out = String::with_capacity(source.len() + source.len() / 8);
    for (idx, line) in source.lines().enumerate() {
        let _ = writeln!(out, "{:>4} | {line}", idx + 1);
    }
    out
}
