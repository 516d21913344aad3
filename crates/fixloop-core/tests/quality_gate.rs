//! Quality gate verdicts over fake tools, including timeouts and the
//! inclusive threshold boundary.

use std::sync::Arc;
use std::time::Duration;

use fixloop_core::fakes::{FakeLinter, FakeTestRunner, ScriptedProposer};
use fixloop_core::{
    LintRun, PromptKind, QualityGate, RepairConfig, TestOrigin, TestRun, TestSuite, ToolError,
};

const SOURCE: &str = "def double(x):\n    return x * 2\n";

fn gate(runner: FakeTestRunner, linter: FakeLinter, proposer: ScriptedProposer) -> QualityGate {
    QualityGate::new(
        &RepairConfig::default(),
        Arc::new(runner),
        Arc::new(linter),
        Arc::new(proposer),
    )
}

fn suite() -> TestSuite {
    TestSuite::placeholder("double")
}

#[tokio::test]
async fn score_exactly_at_threshold_passes() {
    let gate = gate(FakeTestRunner::passing(), FakeLinter::scoring(7.0), ScriptedProposer::default());

    let verdict = gate.evaluate("double.py", SOURCE, &suite()).await;

    assert!(verdict.tests_passed);
    assert_eq!(verdict.lint_score, Some(7.0));
    assert!(verdict.passed);
    assert!(verdict.failure_report.is_none());
}

#[tokio::test]
async fn failing_tests_and_low_score_are_both_reported() {
    let runner = FakeTestRunner::failing(
        "FAILED test_double.py::test_neg - assert -4 == 4\nFAILED test_double.py::test_zero\n1 passed, 2 failed",
    );
    let linter = FakeLinter::with_default(Ok(LintRun {
        score: Some(4.5),
        report: "double.py:1:0: C0116: Missing function or method docstring (missing-function-docstring)\n\
                 Your code has been rated at 4.50/10"
            .to_string(),
    }));
    let gate = gate(runner, linter, ScriptedProposer::default());

    let verdict = gate.evaluate("double.py", SOURCE, &suite()).await;

    assert!(!verdict.passed);
    let report = verdict.failure_report.expect("failure report");
    assert_eq!(report.failing_tests.len(), 2);
    assert_eq!(report.failing_tests[0].test_id, "test_double.py::test_neg");
    assert_eq!(report.failing_tests[0].message, "assert -4 == 4");
    assert_eq!(report.lint_findings.len(), 1);
    assert_eq!(report.lint_findings[0].code, "C0116");
    assert_eq!(report.actionable_items(), 3);
}

#[tokio::test]
async fn same_source_gets_the_same_verdict() {
    for (runner, score) in [
        (FakeTestRunner::passing(), 8.0),
        (FakeTestRunner::passing(), 6.5),
        (FakeTestRunner::failing("FAILED test_double.py::test_neg - assert -4 == 4"), 9.0),
    ] {
        let gate = gate(runner, FakeLinter::scoring(score), ScriptedProposer::default());

        let first = gate.evaluate("double.py", SOURCE, &suite()).await;
        let second = gate.evaluate("double.py", SOURCE, &suite()).await;

        assert_eq!(first.passed, second.passed);
        assert_eq!(first, second);
    }
}

#[tokio::test(start_paused = true)]
async fn hung_tools_fail_closed() {
    let runner = FakeTestRunner::passing().with_delay(Duration::from_secs(3_600));
    let linter = FakeLinter::scoring(10.0).with_delay(Duration::from_secs(3_600));
    let gate = gate(runner, linter, ScriptedProposer::default());

    let verdict = gate.evaluate("double.py", SOURCE, &suite()).await;

    assert!(!verdict.tests_passed);
    assert_eq!(verdict.lint_score, None);
    assert!(!verdict.passed);
}

#[tokio::test]
async fn missing_linter_fails_closed() {
    let linter = FakeLinter::with_default(Err(ToolError::Unavailable {
        tool: "pylint".to_string(),
        reason: "not installed".to_string(),
    }));
    let gate = gate(FakeTestRunner::passing(), linter, ScriptedProposer::default());

    let verdict = gate.evaluate("double.py", SOURCE, &suite()).await;

    assert!(verdict.tests_passed);
    assert!(!verdict.passed);
    let report = verdict.failure_report.expect("failure report");
    assert_eq!(report.lint_summary.as_deref(), Some("no lint score produced"));
}

#[tokio::test]
async fn test_crash_without_summary_lines_still_reports_a_failure() {
    let runner = FakeTestRunner::with_default(Ok(TestRun {
        passed: false,
        report: "\nImportError while importing test module\n".to_string(),
    }));
    let gate = gate(runner, FakeLinter::scoring(9.0), ScriptedProposer::default());

    let verdict = gate.evaluate("double.py", SOURCE, &suite()).await;

    let report = verdict.failure_report.expect("failure report");
    assert_eq!(report.failing_tests.len(), 1);
    assert_eq!(report.failing_tests[0].test_id, "<suite>");
    assert!(report.failing_tests[0].message.starts_with("ImportError"));
}

#[tokio::test]
async fn synthesized_tests_are_parsed() {
    let proposer = ScriptedProposer::new("m").push(
        PromptKind::GenerateTests,
        "```python\nfrom double import double\n\ndef test_double():\n    assert double(2) == 4\n```",
    );
    let gate = gate(FakeTestRunner::passing(), FakeLinter::scoring(9.0), proposer);

    let synthesized = gate.synthesize_tests("double.py", "double", SOURCE).await;

    assert_eq!(synthesized.suite.origin, TestOrigin::Synthesized);
    assert_eq!(synthesized.suite.file_name, "test_double.py");
    assert!(synthesized.suite.code.contains("def test_double"));
}

#[tokio::test]
async fn garbage_synthesis_degrades_to_placeholder() {
    let proposer = ScriptedProposer::new("m").push(PromptKind::GenerateTests, "I cannot help with that.");
    let gate = gate(FakeTestRunner::passing(), FakeLinter::scoring(9.0), proposer);

    let synthesized = gate.synthesize_tests("double.py", "double", SOURCE).await;

    assert_eq!(synthesized.suite.origin, TestOrigin::Placeholder);
    assert_eq!(synthesized.suite.code, TestSuite::PLACEHOLDER_CODE);
    assert!(synthesized.raw.is_some());
}
