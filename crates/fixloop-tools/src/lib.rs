//! fixloop tools
//!
//! Real collaborators for the repair loop: pytest, pylint and py_compile
//! run as subprocesses in scratch directories, and a chat-completions
//! proposer.

pub mod command;
pub mod http_proposer;
pub mod py_compile;
pub mod pylint;
pub mod pytest;
pub mod python_tool;

pub use command::{CommandError, CommandOutput, CommandRunner, CommandSpec};
pub use http_proposer::{ChatCompletionsProposer, DEFAULT_API_BASE, DEFAULT_MODEL};
pub use py_compile::PyCompileChecker;
pub use pylint::{parse_score, PylintLinter};
pub use pytest::PytestRunner;
pub use python_tool::{PythonTool, Scratch};
