//! Proposer capability.
//!
//! The proposer turns a rendered prompt into free text. It may be wrong,
//! slow, or return garbage; callers always go through
//! [`propose_with_timeout`] and map every error to a safe default.

use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// What a proposer call is asked to produce.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum PromptKind {
    Analyze,
    Fix,
    GenerateTests,
    AnalyzeFailure,
}

impl PromptKind {
    pub fn as_str(self) -> &'static str {
        match self {
            PromptKind::Analyze => "analyze",
            PromptKind::Fix => "fix",
            PromptKind::GenerateTests => "generate-tests",
            PromptKind::AnalyzeFailure => "analyze-failure",
        }
    }
}

impl std::fmt::Display for PromptKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One proposer call.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProposalRequest {
    pub kind: PromptKind,
    /// Unit the request is about, for logging and fakes.
    pub unit: String,
    pub prompt: String,
}

impl ProposalRequest {
    pub fn new(kind: PromptKind, unit: impl Into<String>, prompt: impl Into<String>) -> Self {
        Self {
            kind,
            unit: unit.into(),
            prompt: prompt.into(),
        }
    }
}

/// Proposer failures. None of these is fatal to a session.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ProposerError {
    #[error("proposer request failed: {0}")]
    Request(String),

    #[error("proposer timed out after {0}s")]
    Timeout(u64),

    #[error("proposer returned an empty response")]
    Empty,
}

/// Text generation capability injected into the orchestrator.
#[async_trait]
pub trait Proposer: Send + Sync {
    /// Model identifier recorded in the audit log.
    fn model(&self) -> &str;

    async fn propose(&self, request: &ProposalRequest) -> Result<String, ProposerError>;
}

/// Call `proposer` under `timeout`. Whitespace-only output is `Empty`.
pub async fn propose_with_timeout(
    proposer: &dyn Proposer,
    request: &ProposalRequest,
    timeout: Duration,
) -> Result<String, ProposerError> {
    let text = tokio::time::timeout(timeout, proposer.propose(request))
        .await
        .map_err(|_| ProposerError::Timeout(timeout.as_secs()))??;
    if text.trim().is_empty() {
        return Err(ProposerError::Empty);
    }
    Ok(text)
}
