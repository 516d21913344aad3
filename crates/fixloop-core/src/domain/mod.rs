//! Data model for the repair loop.

pub mod fix;
pub mod issue;
pub mod session;
pub mod verdict;

pub use fix::{ApplyOutcome, RegressionCheck, RegressionFailure};
pub use issue::{Issue, Priority, RawIssue, RefactoringPlan};
pub use session::{Phase, RepairSession, SessionReport, SessionStatus, SourceUnit, Transition};
pub use verdict::{FailureReport, LintFinding, TestFailure, Verdict};

/// Number of lines in `source`; an empty source has zero lines.
pub fn line_count(source: &str) -> usize {
    source.lines().count()
}
