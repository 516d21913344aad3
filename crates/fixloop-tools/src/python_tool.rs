//! Python tool definitions and the scratch directory they run in.

use std::path::{Path, PathBuf};

use fixloop_core::ToolError;
use serde::{Deserialize, Serialize};
use tempfile::TempDir;

use crate::command::{CommandError, CommandOutput, CommandRunner, CommandSpec};

/// Python tools run as `<interpreter> -m <module>`.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum PythonTool {
    /// python -m pytest -q -rA --tb=short --disable-warnings -p no:cacheprovider
    Pytest,

    /// python -m pylint --exit-zero --score=y --output-format=text --persistent=n
    Pylint,

    /// python -m py_compile
    PyCompile,
}

impl PythonTool {
    pub fn name(&self) -> &'static str {
        match self {
            PythonTool::Pytest => "pytest",
            PythonTool::Pylint => "pylint",
            PythonTool::PyCompile => "py_compile",
        }
    }

    /// Arguments after the interpreter, ending with `target`.
    pub fn args(&self, target: &str) -> Vec<String> {
        let fixed: &[&str] = match self {
            PythonTool::Pytest => &[
                "-m",
                "pytest",
                "-q",
                "-rA",
                "--tb=short",
                "--disable-warnings",
                "-p",
                "no:cacheprovider",
            ],
            PythonTool::Pylint => &[
                "-m",
                "pylint",
                "--exit-zero",
                "--score=y",
                "--output-format=text",
                "--persistent=n",
            ],
            PythonTool::PyCompile => &["-m", "py_compile"],
        };
        fixed
            .iter()
            .map(|a| (*a).to_string())
            .chain(std::iter::once(target.to_string()))
            .collect()
    }

    pub fn command(&self, interpreter: &str, target: &str, cwd: &Path, timeout_secs: u64) -> CommandSpec {
        CommandSpec::new(self.name(), interpreter, timeout_secs)
            .args(self.args(target))
            .cwd(cwd)
    }

    /// Check the tool is importable; returns its `--version` line.
    ///
    /// `py_compile` ships with the interpreter, so its probe is the
    /// interpreter's own `--version`.
    pub async fn probe(&self, interpreter: &str) -> Result<String, ToolError> {
        let args: Vec<&str> = match self {
            PythonTool::PyCompile => vec!["--version"],
            _ => vec!["-m", self.name(), "--version"],
        };
        let spec = CommandSpec::new(self.name(), interpreter, 30).args(args);
        let output = CommandRunner::execute(&spec).await.map_err(|e| tool_error(self.name(), e))?;
        if !output.success() || missing_module(&output) {
            return Err(ToolError::Unavailable {
                tool: self.name().to_string(),
                reason: first_line(&output.combined()).to_string(),
            });
        }
        Ok(first_line(&output.stdout).to_string())
    }
}

/// Throwaway directory holding the unit and its tests for one tool run.
///
/// Tools never see the user's tree, so candidate sources are checked without
/// touching it.
pub struct Scratch {
    dir: TempDir,
}

impl Scratch {
    pub fn new() -> Result<Self, ToolError> {
        let dir = tempfile::Builder::new()
            .prefix("fixloop-")
            .tempdir()
            .map_err(|e| ToolError::Failed {
                tool: "scratch".to_string(),
                reason: e.to_string(),
            })?;
        Ok(Self { dir })
    }

    pub fn path(&self) -> &Path {
        self.dir.path()
    }

    /// Write `contents` under the bare file name of `name`.
    pub async fn write(&self, name: &str, contents: &str) -> Result<PathBuf, ToolError> {
        let file_name = Path::new(name)
            .file_name()
            .ok_or_else(|| ToolError::Failed {
                tool: "scratch".to_string(),
                reason: format!("invalid file name {name:?}"),
            })?;
        let path = self.dir.path().join(file_name);
        tokio::fs::write(&path, contents)
            .await
            .map_err(|e| ToolError::Failed {
                tool: "scratch".to_string(),
                reason: format!("{}: {e}", path.display()),
            })?;
        Ok(path)
    }
}

pub(crate) fn tool_error(tool: &str, err: CommandError) -> ToolError {
    match err {
        CommandError::Spawn { source, .. } => ToolError::Unavailable {
            tool: tool.to_string(),
            reason: source.to_string(),
        },
        CommandError::Timeout { secs, .. } => ToolError::Timeout {
            tool: tool.to_string(),
            secs,
        },
        CommandError::Io { source, .. } => ToolError::Failed {
            tool: tool.to_string(),
            reason: source.to_string(),
        },
    }
}

/// `python -m <tool>` with the tool not installed.
pub(crate) fn missing_module(output: &CommandOutput) -> bool {
    output.stderr.contains("No module named")
}

fn first_line(text: &str) -> &str {
    text.lines().map(str::trim).find(|l| !l.is_empty()).unwrap_or("")
}
