//! Structured observability hooks for repair sessions.
//!
//! - `SessionSpan`: RAII guard tagging everything inside a session with
//!   its `session_id` and `unit`
//! - `emit_*`: one structured `info!` event per lifecycle step

use tracing::{info, Instrument};

use crate::domain::{ApplyOutcome, Phase, SessionStatus, Verdict};

/// Session-scoped span.
///
/// Sessions run as futures, so use [`SessionSpan::instrument`] rather than
/// holding an entered guard across `.await`.
pub struct SessionSpan {
    span: tracing::Span,
}

impl SessionSpan {
    pub fn new(session_id: &str, unit: &str) -> Self {
        Self {
            span: tracing::info_span!("fixloop.session", session_id = %session_id, unit = %unit),
        }
    }

    /// Run `fut` inside the span.
    pub fn instrument<F: std::future::Future>(&self, fut: F) -> tracing::instrument::Instrumented<F> {
        fut.instrument(self.span.clone())
    }
}

pub fn emit_session_started(session_id: &str, unit: &str, max_iterations: u32) {
    info!(
        event = "session.started",
        session_id = %session_id,
        unit = %unit,
        max_iterations = max_iterations,
    );
}

pub fn emit_phase_transition(session_id: &str, iteration: u32, from: Phase, to: Phase) {
    info!(
        event = "session.phase",
        session_id = %session_id,
        iteration = iteration,
        from = %from,
        to = %to,
    );
}

/// Emit event: plan validated, with kept and dropped issue counts.
pub fn emit_plan_validated(session_id: &str, iteration: u32, kept: usize, dropped: usize) {
    info!(
        event = "plan.validated",
        session_id = %session_id,
        iteration = iteration,
        kept = kept,
        dropped = dropped,
    );
}

pub fn emit_fix_applied(session_id: &str, iteration: u32, outcome: &ApplyOutcome) {
    match outcome {
        ApplyOutcome::Rejected { failures } => tracing::warn!(
            event = "fix.applied",
            session_id = %session_id,
            iteration = iteration,
            outcome = outcome.label(),
            failed_checks = %failures
                .iter()
                .map(|f| f.check.as_str())
                .collect::<Vec<_>>()
                .join(","),
        ),
        _ => info!(
            event = "fix.applied",
            session_id = %session_id,
            iteration = iteration,
            outcome = outcome.label(),
        ),
    }
}

pub fn emit_gate_evaluated(session_id: &str, iteration: u32, verdict: &Verdict) {
    info!(
        event = "gate.evaluated",
        session_id = %session_id,
        iteration = iteration,
        tests_passed = verdict.tests_passed,
        lint_score = ?verdict.lint_score,
        passed = verdict.passed,
    );
}

pub fn emit_session_finished(session_id: &str, status: SessionStatus, iterations: u32, duration_ms: u64) {
    info!(
        event = "session.finished",
        session_id = %session_id,
        status = ?status,
        iterations = iterations,
        duration_ms = duration_ms,
    );
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_events_inside_session_span() {
        let span = SessionSpan::new("s-1", "calc.py");
        SessionSpan::instrument(&span, async {
            emit_phase_transition("s-1", 0, Phase::Analyzing, Phase::Fixing);
        })
        .await;
    }

    #[tokio::test]
    async fn test_session_span_instrument() {
        let span = SessionSpan::new("s-2", "calc.py");
        let value = SessionSpan::instrument(&span, async { 7 }).await;
        assert_eq!(value, 7);
    }
}
