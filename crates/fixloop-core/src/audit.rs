//! Append-only audit log.
//!
//! Sessions hold a cloneable [`AuditLog`] handle and send records over an
//! unbounded channel; a single writer task owns the file. Emitting never
//! blocks and never fails: a closed channel or a write error is logged and
//! dropped.

use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::io::AsyncWriteExt;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use crate::error::{RepairError, Result};

/// What the recorded step did.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuditAction {
    Analysis,
    FailureAnalysis,
    Fix,
    TestGeneration,
    Verification,
    SessionFinished,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AuditStatus {
    Success,
    Failure,
    Skipped,
    Error,
}

/// Decision context: what went in, what came out, and where.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuditDetails {
    pub session_id: String,
    pub unit: String,
    pub iteration: u32,
    pub input: Value,
    pub output: Value,
}

/// One line of the audit log.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuditRecord {
    pub agent: String,
    pub model: String,
    pub action: AuditAction,
    pub timestamp: DateTime<Utc>,
    pub details: AuditDetails,
    pub status: AuditStatus,
}

/// Cloneable, non-blocking handle to the audit sink.
#[derive(Debug, Clone, Default)]
pub struct AuditLog {
    tx: Option<mpsc::UnboundedSender<AuditRecord>>,
}

impl AuditLog {
    /// A sink that discards everything.
    pub fn disabled() -> Self {
        Self { tx: None }
    }

    /// A handle plus the receiving end, for custom writers and tests.
    pub fn channel() -> (Self, mpsc::UnboundedReceiver<AuditRecord>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx: Some(tx) }, rx)
    }

    pub fn is_enabled(&self) -> bool {
        self.tx.is_some()
    }

    pub fn emit(&self, record: AuditRecord) {
        let Some(tx) = &self.tx else {
            return;
        };
        if tx.send(record).is_err() {
            tracing::warn!("audit writer is gone, dropping record");
        }
    }
}

/// Open `path` for appending and spawn the single writer task.
///
/// The task ends once every [`AuditLog`] clone is dropped; await the handle
/// to make sure all records are on disk.
pub async fn spawn_jsonl_writer(path: &Path) -> Result<(AuditLog, JoinHandle<()>)> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        tokio::fs::create_dir_all(parent).await?;
    }
    let mut file = tokio::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .await?;

    let (log, mut rx) = AuditLog::channel();
    let path: PathBuf = path.to_path_buf();
    let handle = tokio::spawn(async move {
        while let Some(record) = rx.recv().await {
            let mut line = match serde_json::to_string(&record) {
                Ok(line) => line,
                Err(err) => {
                    tracing::warn!(error = %err, "failed to serialize audit record");
                    continue;
                }
            };
            line.push('\n');
            if let Err(err) = file.write_all(line.as_bytes()).await {
                tracing::warn!(path = %path.display(), error = %err, "failed to append audit record");
            }
        }
        if let Err(err) = file.flush().await {
            tracing::warn!(path = %path.display(), error = %err, "failed to flush audit log");
        }
    });

    Ok((log, handle))
}

/// Read every record of a JSONL audit log.
pub fn read_jsonl(path: &Path) -> Result<Vec<AuditRecord>> {
    let raw = std::fs::read_to_string(path)?;
    raw.lines()
        .filter(|line| !line.trim().is_empty())
        .map(|line| serde_json::from_str(line).map_err(RepairError::from))
        .collect()
}
