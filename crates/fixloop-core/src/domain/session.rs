//! Per-unit session state and its terminal report.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::fix::RegressionFailure;
use super::verdict::Verdict;
use crate::tools::TestSuite;

/// Orchestrator phases. `Done` and `Aborted` are terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Phase {
    Analyzing,
    Fixing,
    Verifying,
    Retrying,
    Done,
    Aborted,
}

impl Phase {
    pub fn as_str(self) -> &'static str {
        match self {
            Phase::Analyzing => "analyzing",
            Phase::Fixing => "fixing",
            Phase::Verifying => "verifying",
            Phase::Retrying => "retrying",
            Phase::Done => "done",
            Phase::Aborted => "aborted",
        }
    }
}

impl std::fmt::Display for Phase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Terminal status of a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SessionStatus {
    Done,
    Aborted,
}

/// One independently repaired source artifact.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceUnit {
    /// Stable identifier, typically the path relative to the target dir.
    pub id: String,
    /// File name the tools see, e.g. `calc.py`.
    pub file_name: String,
    pub source: String,
    /// Existing tests for this unit, if any were discovered.
    pub tests: Option<TestSuite>,
}

impl SourceUnit {
    pub fn new(id: impl Into<String>, file_name: impl Into<String>, source: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            file_name: file_name.into(),
            source: source.into(),
            tests: None,
        }
    }

    pub fn with_tests(mut self, tests: TestSuite) -> Self {
        self.tests = Some(tests);
        self
    }

    /// Python module name the test suite imports, e.g. `calc` for `calc.py`.
    pub fn module_name(&self) -> &str {
        module_name(&self.file_name)
    }
}

fn module_name(file_name: &str) -> &str {
    file_name.strip_suffix(".py").unwrap_or(file_name)
}

/// A recorded state machine transition.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Transition {
    pub iteration: u32,
    pub from: Phase,
    pub to: Phase,
}

/// State of one unit across the whole loop. Owned by a single orchestrator run.
#[derive(Debug, Clone)]
pub struct RepairSession {
    pub session_id: Uuid,
    pub unit_id: String,
    pub file_name: String,
    pub original_source: String,
    pub current_source: String,
    /// 0-based; never exceeds `max_iterations - 1`.
    pub iteration: u32,
    pub max_iterations: u32,
    pub phase: Phase,
    pub tests: Option<TestSuite>,
    pub terminal_verdict: Option<Verdict>,
    pub last_verdict: Option<Verdict>,
    pub last_rejection: Option<Vec<RegressionFailure>>,
    pub transitions: Vec<Transition>,
}

impl RepairSession {
    pub fn new(unit: SourceUnit, max_iterations: u32) -> Self {
        Self {
            session_id: Uuid::new_v4(),
            unit_id: unit.id,
            file_name: unit.file_name,
            original_source: unit.source.clone(),
            current_source: unit.source,
            iteration: 0,
            max_iterations,
            phase: Phase::Analyzing,
            tests: unit.tests,
            terminal_verdict: None,
            last_verdict: None,
            last_rejection: None,
            transitions: Vec::new(),
        }
    }

    /// Move to `to`, recording the transition. Returns the previous phase.
    pub fn transition(&mut self, to: Phase) -> Phase {
        let from = self.phase;
        self.transitions.push(Transition {
            iteration: self.iteration,
            from,
            to,
        });
        self.phase = to;
        from
    }

    /// Whether another iteration fits in the budget.
    pub fn has_budget(&self) -> bool {
        self.iteration + 1 < self.max_iterations
    }

    /// Module name the synthesized suite imports.
    pub fn module_name(&self) -> &str {
        module_name(&self.file_name)
    }

    /// Freeze the session into its report. Call only once terminal.
    pub fn into_report(self) -> SessionReport {
        let status = if self.phase == Phase::Done {
            SessionStatus::Done
        } else {
            SessionStatus::Aborted
        };
        let changed = self.current_source != self.original_source;
        SessionReport {
            session_id: self.session_id,
            unit: self.unit_id,
            file_name: self.file_name,
            status,
            iterations: self.iteration + 1,
            final_verdict: self.terminal_verdict.or(self.last_verdict),
            last_rejection: self.last_rejection,
            final_source: self.current_source,
            changed,
            transitions: self.transitions,
        }
    }
}

/// What the caller gets back for every unit, whether `DONE` or `ABORTED`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionReport {
    pub session_id: Uuid,
    pub unit: String,
    pub file_name: String,
    pub status: SessionStatus,
    /// Iterations used, counting the first one.
    pub iterations: u32,
    /// Last verdict produced; `None` only when every iteration was rejected.
    pub final_verdict: Option<Verdict>,
    /// Failed checks of the most recent rejected fix, kept for diagnostics.
    pub last_rejection: Option<Vec<RegressionFailure>>,
    pub final_source: String,
    pub changed: bool,
    pub transitions: Vec<Transition>,
}

impl SessionReport {
    pub fn is_done(&self) -> bool {
        self.status == SessionStatus::Done
    }

    /// Number of `VERIFYING` phases entered.
    pub fn verifications(&self) -> usize {
        self.transitions
            .iter()
            .filter(|t| t.to == Phase::Verifying)
            .count()
    }

    /// Number of `RETRYING` phases entered.
    pub fn retries(&self) -> usize {
        self.transitions
            .iter()
            .filter(|t| t.to == Phase::Retrying)
            .count()
    }
}
