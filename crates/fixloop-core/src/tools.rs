//! Verification tool capabilities: test runner, linter and syntax checker.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// Where a unit's test suite came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TestOrigin {
    /// Found next to the unit on disk.
    Existing,
    /// Generated by the proposer.
    Synthesized,
    /// Trivial always-pass suite used when synthesis failed.
    Placeholder,
}

/// Test code for one unit.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TestSuite {
    /// File name the runner writes the code to, e.g. `test_calc.py`.
    pub file_name: String,
    pub code: String,
    pub origin: TestOrigin,
}

impl TestSuite {
    pub const PLACEHOLDER_CODE: &'static str = "def test_placeholder():\n    assert True\n";

    pub fn placeholder(module: &str) -> Self {
        Self {
            file_name: format!("test_{module}.py"),
            code: Self::PLACEHOLDER_CODE.to_string(),
            origin: TestOrigin::Placeholder,
        }
    }

    pub fn synthesized(module: &str, code: impl Into<String>) -> Self {
        Self {
            file_name: format!("test_{module}.py"),
            code: code.into(),
            origin: TestOrigin::Synthesized,
        }
    }
}

/// Raw result of one test run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TestRun {
    pub passed: bool,
    pub report: String,
}

/// Raw result of one lint run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LintRun {
    /// 0-10, or `None` if the tool produced no score.
    pub score: Option<f64>,
    pub report: String,
}

/// Raw result of compiling a candidate.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyntaxRun {
    pub valid: bool,
    /// Compiler message when invalid, e.g. `line 3: SyntaxError: ...`.
    pub report: String,
}

impl SyntaxRun {
    pub fn valid() -> Self {
        Self {
            valid: true,
            report: String::new(),
        }
    }

    pub fn invalid(report: impl Into<String>) -> Self {
        Self {
            valid: false,
            report: report.into(),
        }
    }
}

/// Tool failures. The quality gate and the fix applicator fail closed on
/// every variant.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ToolError {
    #[error("{tool} is unavailable: {reason}")]
    Unavailable { tool: String, reason: String },

    #[error("{tool} timed out after {secs}s")]
    Timeout { tool: String, secs: u64 },

    #[error("{tool} failed: {reason}")]
    Failed { tool: String, reason: String },
}

/// Runs a unit's tests against a candidate source.
#[async_trait]
pub trait TestRunner: Send + Sync {
    fn name(&self) -> &str;

    async fn run_tests(
        &self,
        unit_file: &str,
        source: &str,
        suite: &TestSuite,
    ) -> Result<TestRun, ToolError>;
}

/// Scores a candidate source on a 0-10 scale.
#[async_trait]
pub trait Linter: Send + Sync {
    fn name(&self) -> &str;

    async fn lint(&self, unit_file: &str, source: &str) -> Result<LintRun, ToolError>;
}

/// Compiles a candidate with the target language's own compiler.
#[async_trait]
pub trait SyntaxChecker: Send + Sync {
    fn name(&self) -> &str;

    async fn check_syntax(&self, unit_file: &str, source: &str) -> Result<SyntaxRun, ToolError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_placeholder_suite_naming() {
        let suite = TestSuite::placeholder("calc");
        assert_eq!(suite.file_name, "test_calc.py");
        assert_eq!(suite.origin, TestOrigin::Placeholder);
        assert!(suite.code.contains("def test_placeholder"));
    }

    #[test]
    fn test_tool_error_display() {
        let err = ToolError::Timeout {
            tool: "pytest".to_string(),
            secs: 30,
        };
        assert_eq!(err.to_string(), "pytest timed out after 30s");
    }
}
