//! Global atomic counters for fixloop runs.
//!
//! Counters are bumped at the call site; [`Metrics::flush`] emits them as a
//! single `tracing::info!` event at the end of a run.

use std::sync::atomic::{AtomicU64, Ordering};

/// Global metrics singleton.
pub static METRICS: Metrics = Metrics::new();

/// Lock-free counters.
pub struct Metrics {
    sessions_started: AtomicU64,
    sessions_done: AtomicU64,
    sessions_aborted: AtomicU64,
    iterations: AtomicU64,
    fixes_rejected: AtomicU64,
    issues_dropped: AtomicU64,
    tool_timeouts: AtomicU64,
}

impl Default for Metrics {
    fn default() -> Self {
        Self::new()
    }
}

impl Metrics {
    pub const fn new() -> Self {
        Self {
            sessions_started: AtomicU64::new(0),
            sessions_done: AtomicU64::new(0),
            sessions_aborted: AtomicU64::new(0),
            iterations: AtomicU64::new(0),
            fixes_rejected: AtomicU64::new(0),
            issues_dropped: AtomicU64::new(0),
            tool_timeouts: AtomicU64::new(0),
        }
    }

    pub fn inc_sessions_started(&self) {
        self.sessions_started.fetch_add(1, Ordering::Relaxed);
    }

    /// Count a finished session under its terminal status.
    pub fn inc_session_finished(&self, done: bool) {
        if done {
            self.sessions_done.fetch_add(1, Ordering::Relaxed);
        } else {
            self.sessions_aborted.fetch_add(1, Ordering::Relaxed);
        }
    }

    pub fn inc_iterations(&self) {
        self.iterations.fetch_add(1, Ordering::Relaxed);
    }

    pub fn inc_fixes_rejected(&self) {
        self.fixes_rejected.fetch_add(1, Ordering::Relaxed);
        tracing::trace!(metric = "fixes_rejected", "counter incremented");
    }

    pub fn add_issues_dropped(&self, count: u64) {
        if count > 0 {
            self.issues_dropped.fetch_add(count, Ordering::Relaxed);
        }
    }

    pub fn inc_tool_timeouts(&self) {
        self.tool_timeouts.fetch_add(1, Ordering::Relaxed);
        tracing::trace!(metric = "tool_timeouts", "counter incremented");
    }

    /// Emit all counters as one `info!` event.
    pub fn flush(&self) {
        tracing::info!(
            metric = "flush",
            sessions_started = self.sessions_started(),
            sessions_done = self.sessions_done(),
            sessions_aborted = self.sessions_aborted(),
            iterations = self.iterations(),
            fixes_rejected = self.fixes_rejected(),
            issues_dropped = self.issues_dropped(),
            tool_timeouts = self.tool_timeouts(),
        );
    }

    pub fn sessions_started(&self) -> u64 {
        self.sessions_started.load(Ordering::Relaxed)
    }

    pub fn sessions_done(&self) -> u64 {
        self.sessions_done.load(Ordering::Relaxed)
    }

    pub fn sessions_aborted(&self) -> u64 {
        self.sessions_aborted.load(Ordering::Relaxed)
    }

    pub fn iterations(&self) -> u64 {
        self.iterations.load(Ordering::Relaxed)
    }

    pub fn fixes_rejected(&self) -> u64 {
        self.fixes_rejected.load(Ordering::Relaxed)
    }

    pub fn issues_dropped(&self) -> u64 {
        self.issues_dropped.load(Ordering::Relaxed)
    }

    pub fn tool_timeouts(&self) -> u64 {
        self.tool_timeouts.load(Ordering::Relaxed)
    }

    /// Reset all counters to zero (useful in tests).
    pub fn reset(&self) {
        for counter in [
            &self.sessions_started,
            &self.sessions_done,
            &self.sessions_aborted,
            &self.iterations,
            &self.fixes_rejected,
            &self.issues_dropped,
            &self.tool_timeouts,
        ] {
            counter.store(0, Ordering::Relaxed);
        }
    }
}
