//! Deterministic collaborators for tests.
//!
//! Each fake replays a scripted queue and falls back to a fixed default
//! once the queue is empty. All of them count calls so tests can assert
//! that a phase was (or was not) reached.

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;

use crate::proposer::{PromptKind, ProposalRequest, Proposer, ProposerError};
use crate::tools::{
    LintRun, Linter, SyntaxChecker, SyntaxRun, TestRun, TestRunner, TestSuite, ToolError,
};

// ---------------------------------------------------------------------------
// ScriptedProposer
// ---------------------------------------------------------------------------

type Reply = Result<String, ProposerError>;

#[derive(Default)]
struct Script {
    queued: HashMap<PromptKind, VecDeque<Reply>>,
    defaults: HashMap<PromptKind, Reply>,
    calls: Vec<ProposalRequest>,
}

/// Proposer that replays per-kind responses.
pub struct ScriptedProposer {
    model: String,
    script: Mutex<Script>,
}

impl Default for ScriptedProposer {
    fn default() -> Self {
        Self::new("scripted")
    }
}

impl ScriptedProposer {
    pub fn new(model: impl Into<String>) -> Self {
        Self {
            model: model.into(),
            script: Mutex::new(Script::default()),
        }
    }

    /// Queue one response for `kind`.
    pub fn push(self, kind: PromptKind, text: impl Into<String>) -> Self {
        self.push_reply(kind, Ok(text.into()))
    }

    /// Queue one failure for `kind`.
    pub fn push_err(self, kind: PromptKind, err: ProposerError) -> Self {
        self.push_reply(kind, Err(err))
    }

    /// Response for `kind` once its queue is empty.
    pub fn with_default(self, kind: PromptKind, text: impl Into<String>) -> Self {
        self.lock().defaults.insert(kind, Ok(text.into()));
        self
    }

    fn push_reply(self, kind: PromptKind, reply: Reply) -> Self {
        self.lock().queued.entry(kind).or_default().push_back(reply);
        self
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Script> {
        // A panicking test thread may poison the lock; the script is still usable.
        self.script.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn calls(&self) -> Vec<ProposalRequest> {
        self.lock().calls.clone()
    }

    pub fn call_count(&self, kind: PromptKind) -> usize {
        self.lock().calls.iter().filter(|c| c.kind == kind).count()
    }

    pub fn total_calls(&self) -> usize {
        self.lock().calls.len()
    }
}

#[async_trait]
impl Proposer for ScriptedProposer {
    fn model(&self) -> &str {
        &self.model
    }

    async fn propose(&self, request: &ProposalRequest) -> Result<String, ProposerError> {
        let mut script = self.lock();
        script.calls.push(request.clone());
        if let Some(reply) = script.queued.get_mut(&request.kind).and_then(VecDeque::pop_front) {
            return reply;
        }
        script.defaults.get(&request.kind).cloned().unwrap_or_else(|| {
            Err(ProposerError::Request(format!(
                "no scripted response for {}",
                request.kind
            )))
        })
    }
}

// ---------------------------------------------------------------------------
// FakeTestRunner / FakeLinter / FakeSyntaxChecker
// ---------------------------------------------------------------------------

struct Replay<T> {
    queued: Mutex<VecDeque<Result<T, ToolError>>>,
    default: Result<T, ToolError>,
    delay: Option<Duration>,
    calls: AtomicUsize,
    sources: Mutex<Vec<String>>,
}

impl<T: Clone> Replay<T> {
    fn new(default: Result<T, ToolError>) -> Self {
        Self {
            queued: Mutex::new(VecDeque::new()),
            default,
            delay: None,
            calls: AtomicUsize::new(0),
            sources: Mutex::new(Vec::new()),
        }
    }

    async fn next(&self, source: &str) -> Result<T, ToolError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.sources
            .lock()
            .unwrap_or_else(|p| p.into_inner())
            .push(source.to_string());
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        let queued = self
            .queued
            .lock()
            .unwrap_or_else(|p| p.into_inner())
            .pop_front();
        queued.unwrap_or_else(|| self.default.clone())
    }

    fn push(&self, outcome: Result<T, ToolError>) {
        self.queued
            .lock()
            .unwrap_or_else(|p| p.into_inner())
            .push_back(outcome);
    }

    fn sources(&self) -> Vec<String> {
        self.sources.lock().unwrap_or_else(|p| p.into_inner()).clone()
    }
}

/// Test runner returning scripted [`TestRun`]s.
pub struct FakeTestRunner {
    replay: Replay<TestRun>,
}

impl FakeTestRunner {
    /// Every run passes unless scripted otherwise.
    pub fn passing() -> Self {
        Self::with_default(Ok(TestRun {
            passed: true,
            report: "1 passed".to_string(),
        }))
    }

    /// Every run fails with `report` unless scripted otherwise.
    pub fn failing(report: impl Into<String>) -> Self {
        Self::with_default(Ok(TestRun {
            passed: false,
            report: report.into(),
        }))
    }

    pub fn with_default(default: Result<TestRun, ToolError>) -> Self {
        Self {
            replay: Replay::new(default),
        }
    }

    /// Sleep before answering, to exercise timeouts.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.replay.delay = Some(delay);
        self
    }

    pub fn push(self, outcome: Result<TestRun, ToolError>) -> Self {
        self.replay.push(outcome);
        self
    }

    pub fn call_count(&self) -> usize {
        self.replay.calls.load(Ordering::SeqCst)
    }

    /// Sources the runner was asked to test, in call order.
    pub fn sources(&self) -> Vec<String> {
        self.replay.sources()
    }
}

#[async_trait]
impl TestRunner for FakeTestRunner {
    fn name(&self) -> &str {
        "fake-tests"
    }

    async fn run_tests(&self, _unit_file: &str, source: &str, _suite: &TestSuite) -> Result<TestRun, ToolError> {
        self.replay.next(source).await
    }
}

/// Linter returning scripted [`LintRun`]s.
pub struct FakeLinter {
    replay: Replay<LintRun>,
}

impl FakeLinter {
    /// Every run scores `score` unless scripted otherwise.
    pub fn scoring(score: f64) -> Self {
        Self::with_default(Ok(LintRun {
            score: Some(score),
            report: format!("Your code has been rated at {score:.2}/10"),
        }))
    }

    pub fn with_default(default: Result<LintRun, ToolError>) -> Self {
        Self {
            replay: Replay::new(default),
        }
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.replay.delay = Some(delay);
        self
    }

    pub fn push(self, outcome: Result<LintRun, ToolError>) -> Self {
        self.replay.push(outcome);
        self
    }

    pub fn call_count(&self) -> usize {
        self.replay.calls.load(Ordering::SeqCst)
    }

    pub fn sources(&self) -> Vec<String> {
        self.replay.sources()
    }
}

#[async_trait]
impl Linter for FakeLinter {
    fn name(&self) -> &str {
        "fake-lint"
    }

    async fn lint(&self, _unit_file: &str, source: &str) -> Result<LintRun, ToolError> {
        self.replay.next(source).await
    }
}

/// Syntax checker returning scripted [`SyntaxRun`]s.
pub struct FakeSyntaxChecker {
    replay: Replay<SyntaxRun>,
}

impl FakeSyntaxChecker {
    /// Every candidate compiles unless scripted otherwise.
    pub fn accepting() -> Self {
        Self::with_default(Ok(SyntaxRun::valid()))
    }

    pub fn with_default(default: Result<SyntaxRun, ToolError>) -> Self {
        Self {
            replay: Replay::new(default),
        }
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.replay.delay = Some(delay);
        self
    }

    pub fn push(self, outcome: Result<SyntaxRun, ToolError>) -> Self {
        self.replay.push(outcome);
        self
    }

    pub fn call_count(&self) -> usize {
        self.replay.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl SyntaxChecker for FakeSyntaxChecker {
    fn name(&self) -> &str {
        "fake-compile"
    }

    async fn check_syntax(&self, _unit_file: &str, source: &str) -> Result<SyntaxRun, ToolError> {
        self.replay.next(source).await
    }
}
