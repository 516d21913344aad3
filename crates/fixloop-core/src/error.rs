//! Error taxonomy for fixloop.
//!
//! Collaborator failures (proposer, test runner, linter) have their own
//! error types in [`crate::proposer`] and [`crate::tools`]; the loop turns
//! those into state transitions. `RepairError` covers what is left:
//! configuration, artifacts, and I/O at the edges.

/// fixloop domain errors.
#[derive(Debug, thiserror::Error)]
pub enum RepairError {
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("failed to parse configuration: {0}")]
    ConfigParse(#[from] toml::de::Error),

    #[error("source analysis failed: {0}")]
    SourceAnalysis(String),

    #[error("invalid denylist pattern: {0}")]
    Denylist(#[from] regex::Error),

    #[error("digest mismatch: expected {expected}, got {actual}")]
    DigestMismatch { expected: String, actual: String },

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type for fixloop domain operations.
pub type Result<T> = std::result::Result<T, RepairError>;
