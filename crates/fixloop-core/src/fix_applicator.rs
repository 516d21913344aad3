//! Fix application with regression guarding.
//!
//! The proposer rewrites the whole unit; the candidate is accepted only if
//! it passes every regression check. Fixes are all-or-nothing: on rejection
//! the returned candidate is the unchanged source.
//!
//! Syntax is checked twice: tree-sitter first, then the language's own
//! compiler through a [`SyntaxChecker`]. The compiler step fails closed.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use crate::config::RepairConfig;
use crate::denylist::DenylistMatcher;
use crate::domain::{line_count, ApplyOutcome, RefactoringPlan, RegressionCheck, RegressionFailure};
use crate::error::Result;
use crate::metrics::METRICS;
use crate::parse::clean_code_output;
use crate::prompts::PromptBuilder;
use crate::proposer::{propose_with_timeout, PromptKind, ProposalRequest, Proposer};
use crate::python;
use crate::tools::SyntaxChecker;

/// Result of one [`FixApplicator::apply`] call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FixResult {
    /// New source when accepted; the input source otherwise.
    pub candidate: String,
    pub outcome: ApplyOutcome,
    /// Proposer text as received, for the audit log.
    pub raw_proposal: Option<String>,
}

/// Turns a validated plan into a checked candidate source.
pub struct FixApplicator {
    proposer: Arc<dyn Proposer>,
    syntax_checker: Arc<dyn SyntaxChecker>,
    prompts: PromptBuilder,
    denylist: DenylistMatcher,
    max_growth_ratio: f64,
    proposer_timeout: Duration,
    syntax_timeout: Duration,
}

impl FixApplicator {
    pub fn new(
        config: &RepairConfig,
        proposer: Arc<dyn Proposer>,
        syntax_checker: Arc<dyn SyntaxChecker>,
    ) -> Result<Self> {
        Ok(Self {
            proposer,
            syntax_checker,
            prompts: PromptBuilder::new(config.prompt_max_chars),
            denylist: DenylistMatcher::new(&config.denylist)?,
            max_growth_ratio: config.max_growth_ratio,
            proposer_timeout: config.proposer_timeout(),
            syntax_timeout: config.syntax_timeout(),
        })
    }

    /// Apply `plan` to `source`.
    ///
    /// An empty plan is `Skipped` without calling the proposer.
    pub async fn apply(&self, unit: &str, source: &str, plan: &RefactoringPlan) -> FixResult {
        let unchanged = |outcome, raw_proposal| FixResult {
            candidate: source.to_string(),
            outcome,
            raw_proposal,
        };

        if plan.is_empty() {
            return unchanged(ApplyOutcome::Skipped, None);
        }

        let request = ProposalRequest::new(PromptKind::Fix, unit, self.prompts.fix(unit, source, plan));
        let raw = match propose_with_timeout(self.proposer.as_ref(), &request, self.proposer_timeout).await {
            Ok(raw) => raw,
            Err(err) => {
                tracing::warn!(unit = %unit, error = %err, "fix generation failed");
                return unchanged(
                    ApplyOutcome::Rejected {
                        failures: vec![RegressionFailure::new(
                            RegressionCheck::Generation,
                            err.to_string(),
                        )],
                    },
                    None,
                );
            }
        };

        let candidate = clean_code_output(&raw);
        if candidate.trim().is_empty() {
            return unchanged(
                ApplyOutcome::Rejected {
                    failures: vec![RegressionFailure::new(
                        RegressionCheck::Generation,
                        "proposer returned no code",
                    )],
                },
                Some(raw),
            );
        }

        let mut failures = check_regressions(source, &candidate, &self.denylist, self.max_growth_ratio);
        if !failures.iter().any(|f| f.check == RegressionCheck::Syntax) {
            failures.extend(self.compile(unit, &candidate).await);
        }
        if failures.is_empty() {
            FixResult {
                candidate,
                outcome: ApplyOutcome::Accepted,
                raw_proposal: Some(raw),
            }
        } else {
            unchanged(ApplyOutcome::Rejected { failures }, Some(raw))
        }
    }

    /// Compile `candidate`; `None` when it compiles. Tool failures reject.
    async fn compile(&self, unit: &str, candidate: &str) -> Option<RegressionFailure> {
        let checker = self.syntax_checker.name();
        let detail = match tokio::time::timeout(
            self.syntax_timeout,
            self.syntax_checker.check_syntax(unit, candidate),
        )
        .await
        {
            Ok(Ok(run)) if run.valid => return None,
            Ok(Ok(run)) => run.report,
            Ok(Err(err)) => {
                tracing::warn!(unit = %unit, tool = %checker, error = %err, "syntax check failed, rejecting");
                format!("syntax check unavailable: {err}")
            }
            Err(_) => {
                METRICS.inc_tool_timeouts();
                tracing::warn!(unit = %unit, tool = %checker, "syntax check timed out, rejecting");
                format!("{checker} timed out after {}s", self.syntax_timeout.as_secs())
            }
        };
        Some(RegressionFailure::new(RegressionCheck::Syntax, detail))
    }
}

/// Every regression check, all evaluated so the rejection lists each failure.
pub fn check_regressions(
    original: &str,
    candidate: &str,
    denylist: &DenylistMatcher,
    max_growth_ratio: f64,
) -> Vec<RegressionFailure> {
    let mut failures = Vec::new();

    let before = line_count(original).max(1);
    let after = line_count(candidate);
    let limit = before as f64 * max_growth_ratio;
    if after as f64 > limit {
        failures.push(RegressionFailure::new(
            RegressionCheck::Size,
            format!("{after} lines exceeds limit of {limit:.0} ({before} x {max_growth_ratio})"),
        ));
    }

    // A damaged original may lose definitions inside error nodes, so it is
    // compared by header names instead.
    let original_damaged = matches!(python::syntax_error(original), Ok(Some(_)));
    if original_damaged {
        let expected = python::definition_names(original);
        let actual = python::definition_names(candidate);
        if expected != actual {
            failures.push(RegressionFailure::new(
                RegressionCheck::Signatures,
                describe_diff(&expected, &actual, |name| format!("def {name}")),
            ));
        }
    } else {
        match (python::signatures(original), python::signatures(candidate)) {
            (Ok(expected), Ok(actual)) => {
                if expected != actual {
                    failures.push(RegressionFailure::new(
                        RegressionCheck::Signatures,
                        describe_diff(&expected, &actual, ToString::to_string),
                    ));
                }
            }
            (_, Err(err)) | (Err(err), _) => {
                failures.push(RegressionFailure::new(RegressionCheck::Signatures, err.to_string()));
            }
        }
    }

    match python::syntax_error(candidate) {
        Ok(None) => {}
        Ok(Some(line)) => failures.push(RegressionFailure::new(
            RegressionCheck::Syntax,
            format!("syntax error at line {line}"),
        )),
        Err(err) => failures.push(RegressionFailure::new(RegressionCheck::Syntax, err.to_string())),
    }

    let mut introduced = Vec::new();
    let original_imports = python::imports(original).unwrap_or_default();
    let candidate_imports = python::imports(candidate).unwrap_or_default();
    let banned_before = denylist.banned_imports(&original_imports);
    for banned in denylist.banned_imports(&candidate_imports) {
        if !banned_before.contains(banned) {
            introduced.push(format!("import {banned}"));
        }
    }
    let calls_before: BTreeMap<&str, usize> = denylist.count_calls(original).into_iter().collect();
    for (call, count) in denylist.count_calls(candidate) {
        if count > calls_before.get(call).copied().unwrap_or(0) {
            introduced.push(format!("{call}()"));
        }
    }
    if !introduced.is_empty() {
        failures.push(RegressionFailure::new(
            RegressionCheck::BannedImport,
            format!("introduces {}", introduced.join(", ")),
        ));
    }

    failures
}

fn describe_diff<T: PartialEq>(expected: &[T], actual: &[T], label: impl Fn(&T) -> String) -> String {
    let missing: Vec<String> = expected
        .iter()
        .filter(|item| !actual.contains(item))
        .map(&label)
        .collect();
    let added: Vec<String> = actual
        .iter()
        .filter(|item| !expected.contains(item))
        .map(&label)
        .collect();

    let mut parts = Vec::new();
    if !missing.is_empty() {
        parts.push(format!("missing {}", missing.join("; ")));
    }
    if !added.is_empty() {
        parts.push(format!("added {}", added.join("; ")));
    }
    if parts.is_empty() {
        parts.push("definitions reordered".to_string());
    }
    parts.join("; ")
}
