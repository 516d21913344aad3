//! Subprocess execution with a hard timeout.

use std::path::PathBuf;
use std::process::Stdio;
use std::time::{Duration, Instant};

use tokio::process::Command;

/// A command to run.
#[derive(Debug, Clone)]
pub struct CommandSpec {
    /// Short label for logs and errors, e.g. `pytest`.
    pub name: String,

    /// Executable.
    pub program: String,

    pub args: Vec<String>,

    /// Working directory; inherits the caller's when `None`.
    pub cwd: Option<PathBuf>,

    /// Timeout in seconds; 0 waits forever.
    pub timeout_secs: u64,
}

impl CommandSpec {
    pub fn new(name: impl Into<String>, program: impl Into<String>, timeout_secs: u64) -> Self {
        Self {
            name: name.into(),
            program: program.into(),
            args: Vec::new(),
            cwd: None,
            timeout_secs,
        }
    }

    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    pub fn cwd(mut self, dir: impl Into<PathBuf>) -> Self {
        self.cwd = Some(dir.into());
        self
    }
}

/// Captured result of a finished command.
#[derive(Debug, Clone)]
pub struct CommandOutput {
    pub name: String,

    /// Exit code; -1 when killed by a signal.
    pub exit_code: i32,

    pub stdout: String,

    pub stderr: String,

    pub duration_ms: u64,
}

impl CommandOutput {
    pub fn success(&self) -> bool {
        self.exit_code == 0
    }

    /// stdout followed by stderr, for parsers that do not care which stream.
    pub fn combined(&self) -> String {
        if self.stderr.trim().is_empty() {
            self.stdout.clone()
        } else {
            format!("{}\n{}", self.stdout, self.stderr)
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum CommandError {
    #[error("{name}: failed to spawn {program}: {source}")]
    Spawn {
        name: String,
        program: String,
        #[source]
        source: std::io::Error,
    },

    #[error("{name} timed out after {secs}s")]
    Timeout { name: String, secs: u64 },

    #[error("{name}: {source}")]
    Io {
        name: String,
        #[source]
        source: std::io::Error,
    },
}

pub struct CommandRunner;

impl CommandRunner {
    /// Run `spec` to completion, capturing both streams.
    ///
    /// On timeout the child is killed (it is spawned with `kill_on_drop`).
    pub async fn execute(spec: &CommandSpec) -> Result<CommandOutput, CommandError> {
        let start = Instant::now();

        let mut command = Command::new(&spec.program);
        command
            .args(&spec.args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        if let Some(cwd) = &spec.cwd {
            command.current_dir(cwd);
        }

        let child = command.spawn().map_err(|source| CommandError::Spawn {
            name: spec.name.clone(),
            program: spec.program.clone(),
            source,
        })?;

        let waited = if spec.timeout_secs > 0 {
            tokio::time::timeout(Duration::from_secs(spec.timeout_secs), child.wait_with_output())
                .await
                .map_err(|_| CommandError::Timeout {
                    name: spec.name.clone(),
                    secs: spec.timeout_secs,
                })?
        } else {
            child.wait_with_output().await
        };
        let output = waited.map_err(|source| CommandError::Io {
            name: spec.name.clone(),
            source,
        })?;

        let result = CommandOutput {
            name: spec.name.clone(),
            exit_code: output.status.code().unwrap_or(-1),
            stdout: String::from_utf8_lossy(&output.stdout).to_string(),
            stderr: String::from_utf8_lossy(&output.stderr).to_string(),
            duration_ms: start.elapsed().as_millis() as u64,
        };
        tracing::debug!(
            command = %result.name,
            exit_code = result.exit_code,
            duration_ms = result.duration_ms,
            "command finished"
        );
        Ok(result)
    }
}
