//! Fix application outcomes.

use serde::{Deserialize, Serialize};

/// Regression checks a candidate must pass before it is accepted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RegressionCheck {
    /// Candidate grew beyond the allowed line-count ratio.
    Size,
    /// Callable signatures were added, removed, renamed or reordered.
    Signatures,
    /// Candidate does not parse.
    Syntax,
    /// Candidate introduces a denylisted import or call.
    BannedImport,
    /// The proposer produced no usable candidate.
    Generation,
}

impl RegressionCheck {
    pub fn as_str(self) -> &'static str {
        match self {
            RegressionCheck::Size => "size",
            RegressionCheck::Signatures => "signatures",
            RegressionCheck::Syntax => "syntax",
            RegressionCheck::BannedImport => "banned_import",
            RegressionCheck::Generation => "generation",
        }
    }
}

impl std::fmt::Display for RegressionCheck {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One failed regression check with a human-readable detail.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegressionFailure {
    pub check: RegressionCheck,
    pub detail: String,
}

impl RegressionFailure {
    pub fn new(check: RegressionCheck, detail: impl Into<String>) -> Self {
        Self {
            check,
            detail: detail.into(),
        }
    }
}

impl std::fmt::Display for RegressionFailure {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.check, self.detail)
    }
}

/// Result of one fix application.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum ApplyOutcome {
    /// All checks passed; the candidate replaces the current source.
    Accepted,
    /// Empty plan; nothing was asked of the proposer.
    Skipped,
    /// At least one check failed; the current source is unchanged.
    Rejected { failures: Vec<RegressionFailure> },
}

impl ApplyOutcome {
    pub fn is_accepted(&self) -> bool {
        matches!(self, ApplyOutcome::Accepted)
    }

    pub fn is_rejected(&self) -> bool {
        matches!(self, ApplyOutcome::Rejected { .. })
    }

    pub fn failures(&self) -> &[RegressionFailure] {
        match self {
            ApplyOutcome::Rejected { failures } => failures,
            _ => &[],
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            ApplyOutcome::Accepted => "accepted",
            ApplyOutcome::Skipped => "skipped",
            ApplyOutcome::Rejected { .. } => "rejected",
        }
    }
}
