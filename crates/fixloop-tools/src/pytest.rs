//! `pytest`-backed [`TestRunner`].

use async_trait::async_trait;
use fixloop_core::{TestRun, TestRunner, TestSuite, ToolError};

use crate::command::{CommandOutput, CommandRunner};
use crate::python_tool::{missing_module, tool_error, PythonTool, Scratch};

/// pytest exit code for "no tests were collected".
const NO_TESTS_COLLECTED: i32 = 5;

/// Runs a unit's suite with `<interpreter> -m pytest` in a scratch directory
/// holding only the candidate and its test file.
#[derive(Debug, Clone)]
pub struct PytestRunner {
    interpreter: String,
    timeout_secs: u64,
}

impl PytestRunner {
    pub fn new(interpreter: impl Into<String>, timeout_secs: u64) -> Self {
        Self {
            interpreter: interpreter.into(),
            timeout_secs,
        }
    }
}

#[async_trait]
impl TestRunner for PytestRunner {
    fn name(&self) -> &str {
        PythonTool::Pytest.name()
    }

    async fn run_tests(
        &self,
        unit_file: &str,
        source: &str,
        suite: &TestSuite,
    ) -> Result<TestRun, ToolError> {
        let scratch = Scratch::new()?;
        scratch.write(unit_file, source).await?;
        let test_path = scratch.write(&suite.file_name, &suite.code).await?;
        let target = test_path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| suite.file_name.clone());

        let spec = PythonTool::Pytest.command(&self.interpreter, &target, scratch.path(), self.timeout_secs);
        let output = CommandRunner::execute(&spec)
            .await
            .map_err(|e| tool_error(self.name(), e))?;
        interpret(output)
    }
}

fn interpret(output: CommandOutput) -> Result<TestRun, ToolError> {
    if missing_module(&output) && output.stdout.trim().is_empty() {
        return Err(ToolError::Unavailable {
            tool: PythonTool::Pytest.name().to_string(),
            reason: output.stderr.trim().to_string(),
        });
    }
    if output.exit_code == NO_TESTS_COLLECTED {
        tracing::warn!("pytest collected no tests");
    }
    Ok(TestRun {
        passed: output.success(),
        report: output.combined(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn output(exit_code: i32, stdout: &str, stderr: &str) -> CommandOutput {
        CommandOutput {
            name: "pytest".to_string(),
            exit_code,
            stdout: stdout.to_string(),
            stderr: stderr.to_string(),
            duration_ms: 10,
        }
    }

    #[test]
    fn test_exit_zero_passes() {
        let run = interpret(output(0, "1 passed in 0.01s", "")).expect("run");
        assert!(run.passed);
    }

    #[test]
    fn test_failures_keep_summary_lines() {
        let run = interpret(output(
            1,
            "FAILED test_calc.py::test_add - assert -1 == 3\n1 failed in 0.02s",
            "",
        ))
        .expect("run");
        assert!(!run.passed);
        assert!(run.report.contains("FAILED test_calc.py::test_add"));
    }

    #[test]
    fn test_no_tests_collected_fails() {
        let run = interpret(output(5, "no tests ran in 0.01s", "")).expect("run");
        assert!(!run.passed);
    }

    #[test]
    fn test_missing_pytest_is_unavailable() {
        let err = interpret(output(1, "", "/usr/bin/python3: No module named pytest")).unwrap_err();
        assert!(matches!(err, ToolError::Unavailable { .. }));
    }
}
