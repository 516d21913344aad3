//! Quality gate verdict types.

use serde::{Deserialize, Serialize};

/// One failing test with a length-bounded message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TestFailure {
    pub test_id: String,
    pub message: String,
}

/// One static-analysis finding.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LintFinding {
    pub line: Option<u32>,
    pub code: String,
    pub message: String,
}

/// Machine-actionable description of why a candidate failed the gate.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FailureReport {
    /// Failing tests, one entry each.
    pub failing_tests: Vec<TestFailure>,
    /// Lint findings, listed only when the score is below threshold or absent.
    pub lint_findings: Vec<LintFinding>,
    /// Lint score context, e.g. "score 5.20/10 below threshold 7.00".
    pub lint_summary: Option<String>,
}

impl FailureReport {
    /// Number of plan entries a failure-focused analysis should produce.
    pub fn actionable_items(&self) -> usize {
        self.failing_tests.len() + self.lint_findings.len()
    }
}

/// Outcome of one quality gate evaluation.
///
/// `passed == tests_passed && lint_score.is_some() && lint_score >= threshold`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Verdict {
    pub tests_passed: bool,
    pub lint_score: Option<f64>,
    pub passed: bool,
    pub quality_threshold: f64,
    /// Present only when `passed == false`.
    pub failure_report: Option<FailureReport>,
}

impl Verdict {
    /// The single pass rule. The threshold is inclusive.
    pub fn derive_passed(tests_passed: bool, lint_score: Option<f64>, threshold: f64) -> bool {
        tests_passed && lint_score.is_some_and(|score| score >= threshold)
    }

    /// Build a verdict, dropping the failure report when the candidate passed.
    pub fn new(
        tests_passed: bool,
        lint_score: Option<f64>,
        quality_threshold: f64,
        failure_report: FailureReport,
    ) -> Self {
        let passed = Self::derive_passed(tests_passed, lint_score, quality_threshold);
        Self {
            tests_passed,
            lint_score,
            passed,
            quality_threshold,
            failure_report: if passed { None } else { Some(failure_report) },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_boundary_is_inclusive() {
        assert!(Verdict::derive_passed(true, Some(7.0), 7.0));
        assert!(!Verdict::derive_passed(true, Some(6.99), 7.0));
    }

    #[test]
    fn test_missing_score_fails_closed() {
        assert!(!Verdict::derive_passed(true, None, 7.0));
    }

    #[test]
    fn test_failed_tests_fail_regardless_of_score() {
        assert!(!Verdict::derive_passed(false, Some(10.0), 7.0));
    }

    #[test]
    fn test_report_dropped_on_pass() {
        let report = FailureReport {
            lint_summary: Some("noise".to_string()),
            ..Default::default()
        };
        let verdict = Verdict::new(true, Some(9.0), 7.0, report);
        assert!(verdict.passed);
        assert!(verdict.failure_report.is_none());
    }

    #[test]
    fn test_report_kept_on_fail() {
        let report = FailureReport {
            failing_tests: vec![TestFailure {
                test_id: "test_add".to_string(),
                message: "assert 3 == 4".to_string(),
            }],
            ..Default::default()
        };
        let verdict = Verdict::new(false, Some(9.0), 7.0, report);
        assert!(!verdict.passed);
        assert_eq!(
            verdict.failure_report.as_ref().map(FailureReport::actionable_items),
            Some(1)
        );
    }
}
