//! `py_compile`-backed [`SyntaxChecker`].

use std::sync::OnceLock;

use async_trait::async_trait;
use fixloop_core::{SyntaxChecker, SyntaxRun, ToolError};
use regex::Regex;

use crate::command::{CommandOutput, CommandRunner};
use crate::python_tool::{missing_module, tool_error, PythonTool, Scratch};

/// Compiles a candidate with `<interpreter> -m py_compile` in a scratch
/// directory, so the check uses the interpreter's own grammar.
#[derive(Debug, Clone)]
pub struct PyCompileChecker {
    interpreter: String,
    timeout_secs: u64,
}

impl PyCompileChecker {
    pub fn new(interpreter: impl Into<String>, timeout_secs: u64) -> Self {
        Self {
            interpreter: interpreter.into(),
            timeout_secs,
        }
    }
}

#[async_trait]
impl SyntaxChecker for PyCompileChecker {
    fn name(&self) -> &str {
        PythonTool::PyCompile.name()
    }

    async fn check_syntax(&self, unit_file: &str, source: &str) -> Result<SyntaxRun, ToolError> {
        let scratch = Scratch::new()?;
        let path = scratch.write(unit_file, source).await?;
        let target = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| unit_file.to_string());

        let spec = PythonTool::PyCompile.command(&self.interpreter, &target, scratch.path(), self.timeout_secs);
        let output = CommandRunner::execute(&spec)
            .await
            .map_err(|e| tool_error(self.name(), e))?;
        interpret(output)
    }
}

fn interpret(output: CommandOutput) -> Result<SyntaxRun, ToolError> {
    if missing_module(&output) {
        return Err(ToolError::Unavailable {
            tool: PythonTool::PyCompile.name().to_string(),
            reason: output.stderr.trim().to_string(),
        });
    }
    if output.success() {
        return Ok(SyntaxRun::valid());
    }
    Ok(SyntaxRun::invalid(summarize(&output.combined())))
}

/// `line N: <ErrorType>: <message>` from a compiler traceback.
pub fn summarize(report: &str) -> String {
    static LINE: OnceLock<Option<Regex>> = OnceLock::new();
    let line = LINE
        .get_or_init(|| Regex::new(r#"File "[^"]*", line (\d+)"#).ok())
        .as_ref()
        .and_then(|re| re.captures(report))
        .map(|caps| caps[1].to_string());
    let message = report
        .lines()
        .rev()
        .map(str::trim)
        .find(|l| l.contains("Error:") || l.ends_with("Error"))
        .unwrap_or_else(|| report.lines().map(str::trim).find(|l| !l.is_empty()).unwrap_or("compile failed"));

    match line {
        Some(line) => format!("line {line}: {message}"),
        None => message.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn output(exit_code: i32, stderr: &str) -> CommandOutput {
        CommandOutput {
            name: "py_compile".to_string(),
            exit_code,
            stdout: String::new(),
            stderr: stderr.to_string(),
            duration_ms: 5,
        }
    }

    #[test]
    fn test_clean_compile_is_valid() {
        let run = interpret(output(0, "")).expect("run");
        assert!(run.valid);
    }

    #[test]
    fn test_syntax_error_is_summarized() {
        let stderr = "  File \"calc.py\", line 2\n    print 'hi'\n    ^^^^^^^^^^\n\
                      SyntaxError: Missing parentheses in call to 'print'. Did you mean print(...)?\n";
        let run = interpret(output(1, stderr)).expect("run");
        assert!(!run.valid);
        assert_eq!(
            run.report,
            "line 2: SyntaxError: Missing parentheses in call to 'print'. Did you mean print(...)?"
        );
    }

    #[test]
    fn test_unrecognized_failure_keeps_first_line() {
        assert_eq!(summarize("something odd\nmore"), "something odd");
        assert_eq!(summarize(""), "compile failed");
    }

    #[test]
    fn test_missing_module_is_unavailable() {
        let err = interpret(output(1, "No module named py_compile")).unwrap_err();
        assert!(matches!(err, ToolError::Unavailable { .. }));
    }
}
