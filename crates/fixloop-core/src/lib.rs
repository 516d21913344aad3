//! fixloop core library
//!
//! Bounded verify-fix convergence loop: analyze a source unit, validate the
//! proposed plan, apply it under regression checks, verify with tests and
//! lint, and retry on failure until the unit passes or the budget runs out.

pub mod audit;
pub mod config;
pub mod denylist;
pub mod domain;
pub mod error;
pub mod fakes;
pub mod fix_applicator;
pub mod metrics;
pub mod obs;
pub mod orchestrator;
pub mod parse;
pub mod plan_validator;
pub mod prompts;
pub mod proposer;
pub mod python;
pub mod quality_gate;
pub mod reporting;
pub mod telemetry;
pub mod tools;

pub use audit::{spawn_jsonl_writer, AuditAction, AuditLog, AuditRecord, AuditStatus};
pub use config::RepairConfig;
pub use denylist::Denylist;
pub use domain::{
    ApplyOutcome, FailureReport, Issue, Phase, Priority, RawIssue, RefactoringPlan,
    RegressionCheck, RegressionFailure, SessionReport, SessionStatus, SourceUnit, Verdict,
};
pub use error::{RepairError, Result};
pub use fix_applicator::{check_regressions, FixApplicator, FixResult};
pub use metrics::METRICS;
pub use orchestrator::{Collaborators, RepairOrchestrator};
pub use plan_validator::{DropReason, PlanValidator, ValidationOutcome};
pub use proposer::{PromptKind, ProposalRequest, Proposer, ProposerError};
pub use quality_gate::{derive_verdict, QualityGate};
pub use reporting::{read_run_report, write_run_report, ContentDigest, RunReport};
pub use telemetry::init_tracing;
pub use tools::{
    LintRun, Linter, SyntaxChecker, SyntaxRun, TestOrigin, TestRun, TestRunner, TestSuite,
    ToolError,
};
