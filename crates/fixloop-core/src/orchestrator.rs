//! Repair orchestrator: the per-unit state machine.
//!
//! ```text
//! ANALYZING -> FIXING -> VERIFYING -> DONE
//!                 |           |
//!                 |           +-> RETRYING -> ANALYZING   (budget left)
//!                 |           +-> ABORTED                 (budget spent)
//!                 +-> RETRYING / ABORTED                  (fix rejected)
//! ```
//!
//! Every iteration ends in `DONE`, `ABORTED` or `RETRYING`, and `RETRYING`
//! increments `iteration`, so a session always terminates within
//! `max_iterations`. Collaborator failures become transitions, never errors.

use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::Utc;
use serde_json::{json, Value};

use crate::audit::{AuditAction, AuditDetails, AuditLog, AuditRecord, AuditStatus};
use crate::config::RepairConfig;
use crate::domain::{
    ApplyOutcome, FailureReport, Phase, RefactoringPlan, RegressionFailure, RepairSession,
    SessionReport, SessionStatus, SourceUnit, Verdict,
};
use crate::error::Result;
use crate::fix_applicator::FixApplicator;
use crate::metrics::METRICS;
use crate::obs::{self, SessionSpan};
use crate::parse::{parse_plan, plan_or_empty, ParsedPlan};
use crate::plan_validator::{PlanValidator, ValidationOutcome};
use crate::prompts::{rejection_notes, PromptBuilder};
use crate::proposer::{propose_with_timeout, PromptKind, ProposalRequest, Proposer};
use crate::quality_gate::QualityGate;
use crate::reporting::ContentDigest;
use crate::tools::{Linter, SyntaxChecker, TestRunner};

/// External capabilities a session needs.
#[derive(Clone)]
pub struct Collaborators {
    pub proposer: Arc<dyn Proposer>,
    pub test_runner: Arc<dyn TestRunner>,
    pub linter: Arc<dyn Linter>,
    pub syntax_checker: Arc<dyn SyntaxChecker>,
}

/// What the next analysis is based on.
enum RetryContext {
    /// First iteration.
    Fresh,
    /// Last verification failed; `rejection` is set when a fix was rejected since.
    Failed {
        report: FailureReport,
        rejection: Option<Vec<RegressionFailure>>,
    },
    /// Only rejections so far; no verdict to work from.
    Rejected(Vec<RegressionFailure>),
}

/// Sequences validation, fixing and verification for one unit at a time.
///
/// Holds no per-session state; one orchestrator can drive many sessions
/// concurrently.
pub struct RepairOrchestrator {
    proposer: Arc<dyn Proposer>,
    prompts: PromptBuilder,
    validator: PlanValidator,
    applicator: FixApplicator,
    gate: QualityGate,
    audit: AuditLog,
    max_iterations: u32,
    proposer_timeout: Duration,
}

impl RepairOrchestrator {
    pub fn new(config: &RepairConfig, collaborators: Collaborators, audit: AuditLog) -> Result<Self> {
        config.validate()?;
        let prompts = PromptBuilder::new(config.prompt_max_chars);
        Ok(Self {
            validator: PlanValidator::new(&config.denylist)?,
            applicator: FixApplicator::new(
                config,
                Arc::clone(&collaborators.proposer),
                collaborators.syntax_checker,
            )?,
            gate: QualityGate::new(
                config,
                collaborators.test_runner,
                collaborators.linter,
                Arc::clone(&collaborators.proposer),
            ),
            proposer: collaborators.proposer,
            prompts,
            audit,
            max_iterations: config.max_iterations,
            proposer_timeout: config.proposer_timeout(),
        })
    }

    /// Run one unit to a terminal state.
    pub async fn run(&self, unit: SourceUnit) -> SessionReport {
        let session = RepairSession::new(unit, self.max_iterations);
        let span = SessionSpan::new(&session.session_id.to_string(), &session.unit_id);
        span.instrument(self.drive(session)).await
    }

    async fn drive(&self, mut session: RepairSession) -> SessionReport {
        let started = Instant::now();
        let session_id = session.session_id.to_string();
        METRICS.inc_sessions_started();
        obs::emit_session_started(&session_id, &session.unit_id, session.max_iterations);

        let mut context = RetryContext::Fresh;
        loop {
            METRICS.inc_iterations();

            // ANALYZING
            let validation = self.analyze(&session, &context).await;
            self.advance(&mut session, Phase::Fixing);

            // FIXING
            let fix = self
                .applicator
                .apply(&session.file_name, &session.current_source, &validation.plan)
                .await;
            obs::emit_fix_applied(&session_id, session.iteration, &fix.outcome);
            self.record_fix(&session, &validation.plan, &fix.outcome, fix.raw_proposal.as_deref());

            if let ApplyOutcome::Rejected { failures } = fix.outcome {
                METRICS.inc_fixes_rejected();
                session.last_rejection = Some(failures.clone());
                context = match context {
                    RetryContext::Failed { report, .. } => RetryContext::Failed {
                        report,
                        rejection: Some(failures),
                    },
                    _ => RetryContext::Rejected(failures),
                };
                if self.retry_or_abort(&mut session) {
                    continue;
                }
                break;
            }
            session.current_source = fix.candidate;
            self.advance(&mut session, Phase::Verifying);

            // VERIFYING
            let verdict = self.verify(&mut session).await;
            obs::emit_gate_evaluated(&session_id, session.iteration, &verdict);
            session.last_verdict = Some(verdict.clone());

            if verdict.passed {
                session.terminal_verdict = Some(verdict);
                self.advance(&mut session, Phase::Done);
                break;
            }
            context = RetryContext::Failed {
                report: verdict.failure_report.clone().unwrap_or_default(),
                rejection: None,
            };
            if !session.has_budget() {
                session.terminal_verdict = Some(verdict);
            }
            if !self.retry_or_abort(&mut session) {
                break;
            }
        }

        let report = session.into_report();
        let duration_ms = started.elapsed().as_millis() as u64;
        METRICS.inc_session_finished(report.is_done());
        obs::emit_session_finished(&session_id, report.status, report.iterations, duration_ms);
        self.record_finished(&report);
        report
    }

    /// `RETRYING` and back to `ANALYZING` if budget is left, else `ABORTED`.
    /// Returns whether the loop continues.
    fn retry_or_abort(&self, session: &mut RepairSession) -> bool {
        if !session.has_budget() {
            self.advance(session, Phase::Aborted);
            return false;
        }
        self.advance(session, Phase::Retrying);
        session.iteration += 1;
        self.advance(session, Phase::Analyzing);
        true
    }

    fn advance(&self, session: &mut RepairSession, to: Phase) {
        let from = session.transition(to);
        obs::emit_phase_transition(&session.session_id.to_string(), session.iteration, from, to);
    }

    // -----------------------------------------------------------------------
    // Phases
    // -----------------------------------------------------------------------

    async fn analyze(&self, session: &RepairSession, context: &RetryContext) -> ValidationOutcome {
        let unit = &session.file_name;
        let source = &session.current_source;
        let (kind, prompt, expected) = match context {
            RetryContext::Fresh => (PromptKind::Analyze, self.prompts.analyze(unit, source), None),
            RetryContext::Rejected(failures) => (
                PromptKind::Analyze,
                self.prompts.analyze_after_rejection(unit, source, failures),
                None,
            ),
            RetryContext::Failed { report, rejection } => {
                let mut prompt = self.prompts.analyze_failure(unit, source, report);
                if let Some(failures) = rejection {
                    prompt.push_str(&rejection_notes(failures));
                }
                (PromptKind::AnalyzeFailure, prompt, Some(report.actionable_items()))
            }
        };

        let request = ProposalRequest::new(kind, unit.as_str(), prompt);
        let (parsed, raw, status) =
            match propose_with_timeout(self.proposer.as_ref(), &request, self.proposer_timeout).await {
                Ok(raw) => {
                    let parsed = parse_plan(&raw);
                    let status = match parsed {
                        ParsedPlan::Parsed(_) => AuditStatus::Success,
                        ParsedPlan::Malformed { .. } => AuditStatus::Failure,
                    };
                    (parsed, Some(raw), status)
                }
                Err(err) => (
                    ParsedPlan::Malformed {
                        reason: err.to_string(),
                    },
                    None,
                    AuditStatus::Error,
                ),
            };
        let malformed = match &parsed {
            ParsedPlan::Malformed { reason } => Some(reason.clone()),
            ParsedPlan::Parsed(_) => None,
        };

        let raw_issues = plan_or_empty(parsed);
        let validation = self.validator.validate(&raw_issues, source);
        METRICS.add_issues_dropped(validation.dropped.len() as u64);
        obs::emit_plan_validated(
            &session.session_id.to_string(),
            session.iteration,
            validation.plan.len(),
            validation.dropped.len(),
        );
        if let Some(expected) = expected {
            if raw_issues.len() < expected {
                tracing::warn!(
                    expected = expected,
                    received = raw_issues.len(),
                    "failure analysis returned fewer entries than failures"
                );
            }
        }

        let action = match kind {
            PromptKind::AnalyzeFailure => AuditAction::FailureAnalysis,
            _ => AuditAction::Analysis,
        };
        self.record(
            session,
            "analyzer",
            action,
            status,
            json!({
                "kind": kind,
                "prompt": request.prompt,
                "raw_response": raw,
            }),
            json!({
                "malformed": malformed,
                "raw_issues": raw_issues.len(),
                "plan": validation.plan,
                "dropped": validation.dropped,
                "corrections": validation.corrections,
            }),
        );
        validation
    }

    async fn verify(&self, session: &mut RepairSession) -> Verdict {
        let suite = match &session.tests {
            Some(suite) => suite.clone(),
            None => {
                let module = session.module_name().to_string();
                let synthesized = self
                    .gate
                    .synthesize_tests(&session.file_name, &module, &session.original_source)
                    .await;
                self.record(
                    session,
                    "quality_gate",
                    AuditAction::TestGeneration,
                    if synthesized.raw.is_some() {
                        AuditStatus::Success
                    } else {
                        AuditStatus::Error
                    },
                    json!({ "module": module, "raw_response": synthesized.raw }),
                    json!({ "origin": synthesized.suite.origin, "file_name": synthesized.suite.file_name }),
                );
                session.tests = Some(synthesized.suite.clone());
                synthesized.suite
            }
        };

        let verdict = self
            .gate
            .evaluate(&session.file_name, &session.current_source, &suite)
            .await;
        self.record(
            session,
            "quality_gate",
            AuditAction::Verification,
            if verdict.passed {
                AuditStatus::Success
            } else {
                AuditStatus::Failure
            },
            json!({
                "candidate_digest": ContentDigest::from_bytes(session.current_source.as_bytes()),
                "tests_origin": suite.origin,
            }),
            serde_json::to_value(&verdict).unwrap_or(Value::Null),
        );
        verdict
    }

    // -----------------------------------------------------------------------
    // Audit
    // -----------------------------------------------------------------------

    fn record_fix(
        &self,
        session: &RepairSession,
        plan: &RefactoringPlan,
        outcome: &ApplyOutcome,
        raw: Option<&str>,
    ) {
        let status = match outcome {
            ApplyOutcome::Accepted => AuditStatus::Success,
            ApplyOutcome::Skipped => AuditStatus::Skipped,
            ApplyOutcome::Rejected { .. } => AuditStatus::Failure,
        };
        self.record(
            session,
            "fixer",
            AuditAction::Fix,
            status,
            json!({
                "plan": plan,
                "priority_breakdown": plan.priority_breakdown(),
            }),
            json!({
                "outcome": outcome,
                "raw_response": raw,
            }),
        );
    }

    fn record_finished(&self, report: &SessionReport) {
        let status = match report.status {
            SessionStatus::Done => AuditStatus::Success,
            SessionStatus::Aborted => AuditStatus::Failure,
        };
        self.audit.emit(AuditRecord {
            agent: "orchestrator".to_string(),
            model: self.proposer.model().to_string(),
            action: AuditAction::SessionFinished,
            timestamp: Utc::now(),
            details: AuditDetails {
                session_id: report.session_id.to_string(),
                unit: report.unit.clone(),
                iteration: report.iterations.saturating_sub(1),
                input: json!({ "transitions": report.transitions }),
                output: json!({
                    "status": report.status,
                    "iterations": report.iterations,
                    "changed": report.changed,
                    "final_verdict": report.final_verdict,
                    "last_rejection": report.last_rejection,
                }),
            },
            status,
        });
    }

    fn record(
        &self,
        session: &RepairSession,
        agent: &str,
        action: AuditAction,
        status: AuditStatus,
        input: Value,
        output: Value,
    ) {
        self.audit.emit(AuditRecord {
            agent: agent.to_string(),
            model: self.proposer.model().to_string(),
            action,
            timestamp: Utc::now(),
            details: AuditDetails {
                session_id: session.session_id.to_string(),
                unit: session.unit_id.clone(),
                iteration: session.iteration,
                input,
                output,
            },
            status,
        });
    }
}
