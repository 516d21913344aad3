//! `pylint`-backed [`Linter`].

use std::sync::OnceLock;

use async_trait::async_trait;
use fixloop_core::{LintRun, Linter, ToolError};
use regex::Regex;

use crate::command::{CommandOutput, CommandRunner};
use crate::python_tool::{missing_module, tool_error, PythonTool, Scratch};

#[derive(Debug, Clone)]
pub struct PylintLinter {
    interpreter: String,
    timeout_secs: u64,
}

impl PylintLinter {
    pub fn new(interpreter: impl Into<String>, timeout_secs: u64) -> Self {
        Self {
            interpreter: interpreter.into(),
            timeout_secs,
        }
    }
}

#[async_trait]
impl Linter for PylintLinter {
    fn name(&self) -> &str {
        PythonTool::Pylint.name()
    }

    async fn lint(&self, unit_file: &str, source: &str) -> Result<LintRun, ToolError> {
        let scratch = Scratch::new()?;
        let path = scratch.write(unit_file, source).await?;
        let target = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| unit_file.to_string());

        let spec = PythonTool::Pylint.command(&self.interpreter, &target, scratch.path(), self.timeout_secs);
        let output = CommandRunner::execute(&spec)
            .await
            .map_err(|e| tool_error(self.name(), e))?;
        interpret(output)
    }
}

fn interpret(output: CommandOutput) -> Result<LintRun, ToolError> {
    if missing_module(&output) && output.stdout.trim().is_empty() {
        return Err(ToolError::Unavailable {
            tool: PythonTool::Pylint.name().to_string(),
            reason: output.stderr.trim().to_string(),
        });
    }
    let report = output.combined();
    let score = parse_score(&report);
    if score.is_none() && !output.success() {
        return Err(ToolError::Failed {
            tool: PythonTool::Pylint.name().to_string(),
            reason: format!("exit code {} without a score", output.exit_code),
        });
    }
    Ok(LintRun { score, report })
}

/// Score from pylint's `Your code has been rated at X/10` line.
pub fn parse_score(report: &str) -> Option<f64> {
    static RATED: OnceLock<Option<Regex>> = OnceLock::new();
    let rated = RATED
        .get_or_init(|| Regex::new(r"rated at (-?\d+(?:\.\d+)?)/10").ok())
        .as_ref()?;
    rated
        .captures(report)
        .and_then(|caps| caps[1].parse::<f64>().ok())
}
