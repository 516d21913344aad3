//! Quality gate: tests plus lint, reduced to one verdict.
//!
//! Both tools run concurrently against the same snapshot under their own
//! timeouts. Any tool failure fails closed: `tests_passed = false` or
//! `lint_score = None`. Nothing here returns an error.

use std::sync::Arc;
use std::time::Duration;

use crate::config::RepairConfig;
use crate::domain::{FailureReport, LintFinding, TestFailure, Verdict};
use crate::metrics::METRICS;
use crate::parse::{parse_tests, tests_or_placeholder};
use crate::prompts::PromptBuilder;
use crate::proposer::{propose_with_timeout, PromptKind, ProposalRequest, Proposer};
use crate::tools::{LintRun, Linter, TestRun, TestRunner, TestSuite, ToolError};

/// Test suite produced for a unit that had none.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SynthesizedTests {
    pub suite: TestSuite,
    /// Proposer text as received; `None` if the call itself failed.
    pub raw: Option<String>,
}

/// Runs the verification tools and derives the verdict.
pub struct QualityGate {
    test_runner: Arc<dyn TestRunner>,
    linter: Arc<dyn Linter>,
    proposer: Arc<dyn Proposer>,
    prompts: PromptBuilder,
    threshold: f64,
    test_timeout: Duration,
    lint_timeout: Duration,
    proposer_timeout: Duration,
    max_message_chars: usize,
}

impl QualityGate {
    pub fn new(
        config: &RepairConfig,
        test_runner: Arc<dyn TestRunner>,
        linter: Arc<dyn Linter>,
        proposer: Arc<dyn Proposer>,
    ) -> Self {
        Self {
            test_runner,
            linter,
            proposer,
            prompts: PromptBuilder::new(config.prompt_max_chars),
            threshold: config.quality_threshold,
            test_timeout: config.test_timeout(),
            lint_timeout: config.lint_timeout(),
            proposer_timeout: config.proposer_timeout(),
            max_message_chars: config.max_failure_message_chars,
        }
    }

    /// Generate a minimal test suite with one proposer call.
    ///
    /// Any failure degrades to the always-pass placeholder so the loop can
    /// still terminate.
    pub async fn synthesize_tests(&self, unit_file: &str, module: &str, source: &str) -> SynthesizedTests {
        let request = ProposalRequest::new(
            PromptKind::GenerateTests,
            unit_file,
            self.prompts.generate_tests(unit_file, module, source),
        );
        match propose_with_timeout(self.proposer.as_ref(), &request, self.proposer_timeout).await {
            Ok(raw) => SynthesizedTests {
                suite: tests_or_placeholder(parse_tests(&raw), module),
                raw: Some(raw),
            },
            Err(err) => {
                tracing::warn!(unit = %unit_file, error = %err, "test synthesis failed, using placeholder");
                SynthesizedTests {
                    suite: TestSuite::placeholder(module),
                    raw: None,
                }
            }
        }
    }

    /// Evaluate `source` against `suite`.
    pub async fn evaluate(&self, unit_file: &str, source: &str, suite: &TestSuite) -> Verdict {
        let tests = tokio::time::timeout(
            self.test_timeout,
            self.test_runner.run_tests(unit_file, source, suite),
        );
        let lint = tokio::time::timeout(self.lint_timeout, self.linter.lint(unit_file, source));
        let (tests, lint) = tokio::join!(tests, lint);

        let tests = settle(self.test_runner.name(), self.test_timeout, tests);
        let lint = settle(self.linter.name(), self.lint_timeout, lint);
        derive_verdict(tests.as_ref(), lint.as_ref(), self.threshold, self.max_message_chars)
    }
}

/// Collapse timeout and tool errors into `None`, counting timeouts.
fn settle<T>(
    tool: &str,
    limit: Duration,
    result: Result<Result<T, ToolError>, tokio::time::error::Elapsed>,
) -> Option<T> {
    match result {
        Ok(Ok(run)) => Some(run),
        Ok(Err(err)) => {
            if matches!(err, ToolError::Timeout { .. }) {
                METRICS.inc_tool_timeouts();
            }
            tracing::warn!(tool = %tool, error = %err, "tool failed, failing closed");
            None
        }
        Err(_) => {
            METRICS.inc_tool_timeouts();
            tracing::warn!(tool = %tool, timeout_secs = limit.as_secs(), "tool timed out, failing closed");
            None
        }
    }
}

/// Reduce raw tool results to a verdict. `None` means the tool produced nothing.
pub fn derive_verdict(
    tests: Option<&TestRun>,
    lint: Option<&LintRun>,
    threshold: f64,
    max_message_chars: usize,
) -> Verdict {
    let tests_passed = tests.is_some_and(|run| run.passed);
    let lint_score = lint
        .and_then(|run| run.score)
        .filter(|score| score.is_finite())
        .map(|score| score.clamp(0.0, 10.0));

    let mut report = FailureReport::default();

    if !tests_passed {
        report.failing_tests = match tests {
            Some(run) => {
                let parsed = parse_test_failures(&run.report, max_message_chars);
                if parsed.is_empty() {
                    vec![TestFailure {
                        test_id: "<suite>".to_string(),
                        message: truncate(first_meaningful_line(&run.report), max_message_chars),
                    }]
                } else {
                    parsed
                }
            }
            None => vec![TestFailure {
                test_id: "<suite>".to_string(),
                message: "test run produced no result".to_string(),
            }],
        };
    }

    let below = lint_score.map_or(true, |score| score < threshold);
    if below {
        report.lint_summary = Some(match lint_score {
            Some(score) => format!("score {score:.2}/10 below threshold {threshold:.2}"),
            None => "no lint score produced".to_string(),
        });
        if let Some(run) = lint {
            report.lint_findings = parse_lint_findings(&run.report, max_message_chars);
        }
    }

    Verdict::new(tests_passed, lint_score, threshold, report)
}

/// pytest short summary lines: `FAILED path::test - message` / `ERROR path - message`.
pub fn parse_test_failures(report: &str, max_message_chars: usize) -> Vec<TestFailure> {
    report
        .lines()
        .filter_map(|line| {
            let rest = line
                .strip_prefix("FAILED ")
                .or_else(|| line.strip_prefix("ERROR "))?;
            let (test_id, message) = match rest.split_once(" - ") {
                Some((id, msg)) => (id.trim(), msg.trim()),
                None => (rest.trim(), ""),
            };
            if test_id.is_empty() {
                return None;
            }
            Some(TestFailure {
                test_id: test_id.to_string(),
                message: truncate(message, max_message_chars),
            })
        })
        .collect()
}

/// pylint text findings: `path:line:col: C0116: message (symbol)`.
pub fn parse_lint_findings(report: &str, max_message_chars: usize) -> Vec<LintFinding> {
    report
        .lines()
        .filter_map(|line| {
            let mut parts = line.splitn(4, ':');
            let _path = parts.next()?;
            let line_no = parts.next()?.trim().parse::<u32>().ok()?;
            let _col = parts.next()?.trim().parse::<u32>().ok()?;
            let (code, message) = parts.next()?.trim().split_once(':')?;
            let code = code.trim();
            let is_code = code.len() == 5
                && code.starts_with(|c: char| c.is_ascii_uppercase())
                && code[1..].chars().all(|c| c.is_ascii_digit());
            if !is_code {
                return None;
            }
            Some(LintFinding {
                line: Some(line_no),
                code: code.to_string(),
                message: truncate(message.trim(), max_message_chars),
            })
        })
        .collect()
}

fn first_meaningful_line(report: &str) -> &str {
    report
        .lines()
        .map(str::trim)
        .find(|line| !line.is_empty())
        .unwrap_or("tests failed")
}

/// Cut to `max_chars` characters, marking the cut with `...`.
fn truncate(text: &str, max_chars: usize) -> String {
    match text.char_indices().nth(max_chars) {
        Some((idx, _)) => format!("{}...", &text[..idx]),
        None => text.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const PYTEST_REPORT: &str = "\
============================= short test summary info ==============================
PASSED test_calc.py::test_mul
FAILED test_calc.py::test_add - assert -1 == 3
ERROR test_calc.py::test_div - ZeroDivisionError: division by zero
========================= 1 failed, 1 passed, 1 error in 0.03s =========================
";

    const PYLINT_REPORT: &str = "\
************* Module calc
calc.py:1:0: C0114: Missing module docstring (missing-module-docstring)
calc.py:4:0: C0116: Missing function or method docstring (missing-function-docstring)

------------------------------------------------------------------
Your code has been rated at 5.00/10
";

    fn passing_tests() -> TestRun {
        TestRun {
            passed: true,
            report: "2 passed".to_string(),
        }
    }

    fn lint(score: Option<f64>) -> LintRun {
        LintRun {
            score,
            report: PYLINT_REPORT.to_string(),
        }
    }

    #[test]
    fn test_parse_pytest_summary() {
        let failures = parse_test_failures(PYTEST_REPORT, 200);
        assert_eq!(failures.len(), 2);
        assert_eq!(failures[0].test_id, "test_calc.py::test_add");
        assert_eq!(failures[0].message, "assert -1 == 3");
        assert_eq!(failures[1].test_id, "test_calc.py::test_div");
    }

    #[test]
    fn test_failure_message_bounded() {
        let report = format!("FAILED t.py::test_x - {}", "x".repeat(500));
        let failures = parse_test_failures(&report, 20);
        assert_eq!(failures[0].message.chars().count(), 23);
        assert!(failures[0].message.ends_with("..."));
    }

    #[test]
    fn test_parse_pylint_findings() {
        let findings = parse_lint_findings(PYLINT_REPORT, 200);
        assert_eq!(findings.len(), 2);
        assert_eq!(findings[1].line, Some(4));
        assert_eq!(findings[1].code, "C0116");
        assert!(findings[1].message.starts_with("Missing function"));
    }

    #[test]
    fn test_threshold_is_inclusive() {
        let verdict = derive_verdict(Some(&passing_tests()), Some(&lint(Some(7.0))), 7.0, 200);
        assert!(verdict.passed);
        assert!(verdict.failure_report.is_none());
    }

    #[test]
    fn test_low_score_lists_findings_only() {
        let verdict = derive_verdict(Some(&passing_tests()), Some(&lint(Some(5.0))), 7.0, 200);
        assert!(!verdict.passed);
        let report = verdict.failure_report.expect("report");
        assert!(report.failing_tests.is_empty());
        assert_eq!(report.lint_findings.len(), 2);
        assert_eq!(
            report.lint_summary.as_deref(),
            Some("score 5.00/10 below threshold 7.00")
        );
    }

    #[test]
    fn test_passing_score_omits_findings_on_test_failure() {
        let failing = TestRun {
            passed: false,
            report: PYTEST_REPORT.to_string(),
        };
        let verdict = derive_verdict(Some(&failing), Some(&lint(Some(9.0))), 7.0, 200);
        let report = verdict.failure_report.expect("report");
        assert_eq!(report.failing_tests.len(), 2);
        assert!(report.lint_findings.is_empty());
        assert!(report.lint_summary.is_none());
    }

    #[test]
    fn test_missing_tools_fail_closed() {
        let verdict = derive_verdict(None, None, 7.0, 200);
        assert!(!verdict.tests_passed);
        assert_eq!(verdict.lint_score, None);
        assert!(!verdict.passed);
        let report = verdict.failure_report.expect("report");
        assert_eq!(report.failing_tests[0].test_id, "<suite>");
        assert_eq!(report.lint_summary.as_deref(), Some("no lint score produced"));
    }

    #[test]
    fn test_unparsed_failure_gets_synthetic_entry() {
        let failing = TestRun {
            passed: false,
            report: "\nImportError while importing test module\n".to_string(),
        };
        let verdict = derive_verdict(Some(&failing), Some(&lint(Some(9.0))), 7.0, 200);
        let report = verdict.failure_report.expect("report");
        assert_eq!(report.failing_tests.len(), 1);
        assert_eq!(report.failing_tests[0].message, "ImportError while importing test module");
    }

    #[test]
    fn test_score_clamped() {
        let verdict = derive_verdict(Some(&passing_tests()), Some(&lint(Some(12.0))), 7.0, 200);
        assert_eq!(verdict.lint_score, Some(10.0));
        let verdict = derive_verdict(Some(&passing_tests()), Some(&lint(Some(f64::NAN))), 7.0, 200);
        assert_eq!(verdict.lint_score, None);
    }
}
