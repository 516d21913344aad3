//! Run report artifact: `report.json` plus a SHA-256 `report.digest`.

use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::domain::{SessionReport, SessionStatus};
use crate::error::{RepairError, Result};

pub const REPORT_SCHEMA_VERSION: &str = "1.0";
const REPORT_FILE: &str = "report.json";
const DIGEST_FILE: &str = "report.digest";

/// SHA-256 hex digest of some content.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ContentDigest(String);

impl ContentDigest {
    pub fn from_bytes(data: &[u8]) -> Self {
        let mut hasher = Sha256::new();
        hasher.update(data);
        ContentDigest(hex::encode(hasher.finalize()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// First 12 hex chars.
    pub fn short(&self) -> &str {
        &self.0[..12.min(self.0.len())]
    }
}

impl std::fmt::Display for ContentDigest {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Outcome of a whole run across units.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunReport {
    pub schema_version: String,
    pub generated_at: DateTime<Utc>,
    pub target_dir: String,
    pub done: usize,
    pub aborted: usize,
    pub sessions: Vec<SessionReport>,
}

impl RunReport {
    pub fn new(target_dir: impl Into<String>, mut sessions: Vec<SessionReport>) -> Self {
        sessions.sort_by(|a, b| a.unit.cmp(&b.unit));
        let done = sessions
            .iter()
            .filter(|s| s.status == SessionStatus::Done)
            .count();
        Self {
            schema_version: REPORT_SCHEMA_VERSION.to_string(),
            generated_at: Utc::now(),
            target_dir: target_dir.into(),
            done,
            aborted: sessions.len() - done,
            sessions,
        }
    }

    /// True when every unit ended `DONE`.
    pub fn all_done(&self) -> bool {
        self.aborted == 0
    }
}

/// Persist `<dir>/report.json` and `<dir>/report.digest`.
pub fn write_run_report(report: &RunReport, dir: &Path) -> Result<PathBuf> {
    std::fs::create_dir_all(dir)?;
    let report_path = dir.join(REPORT_FILE);
    let json = serde_json::to_vec_pretty(report)?;
    let digest = ContentDigest::from_bytes(&json);

    std::fs::write(&report_path, &json)?;
    std::fs::write(dir.join(DIGEST_FILE), digest.as_str().as_bytes())?;
    Ok(report_path)
}

/// Read `<dir>/report.json`, verifying it against `report.digest`.
pub fn read_run_report(dir: &Path) -> Result<RunReport> {
    let json = std::fs::read(dir.join(REPORT_FILE))?;
    let expected = std::fs::read_to_string(dir.join(DIGEST_FILE))?;
    let actual = ContentDigest::from_bytes(&json);
    if expected.trim() != actual.as_str() {
        return Err(RepairError::DigestMismatch {
            expected: expected.trim().to_string(),
            actual: actual.to_string(),
        });
    }
    Ok(serde_json::from_slice(&json)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{RepairSession, Phase, SourceUnit};

    fn session(unit: &str, done: bool) -> SessionReport {
        let mut session = RepairSession::new(SourceUnit::new(unit, unit, "x = 1\n"), 3);
        session.transition(if done { Phase::Done } else { Phase::Aborted });
        session.into_report()
    }

    #[test]
    fn test_digest_is_stable() {
        let a = ContentDigest::from_bytes(b"fixloop");
        let b = ContentDigest::from_bytes(b"fixloop");
        assert_eq!(a, b);
        assert_eq!(a.as_str().len(), 64);
        assert_eq!(a.short().len(), 12);
    }

    #[test]
    fn test_report_counts_and_order() {
        let report = RunReport::new("/src", vec![session("b.py", false), session("a.py", true)]);
        assert_eq!(report.done, 1);
        assert_eq!(report.aborted, 1);
        assert!(!report.all_done());
        assert_eq!(report.sessions[0].unit, "a.py");
    }

    #[test]
    fn test_write_then_read_verifies_digest() {
        let dir = tempfile::tempdir().expect("tempdir");
        let report = RunReport::new("/src", vec![session("a.py", true)]);
        write_run_report(&report, dir.path()).expect("write");
        let loaded = read_run_report(dir.path()).expect("read");
        assert_eq!(loaded, report);
    }

    #[test]
    fn test_tampered_report_rejected() {
        let dir = tempfile::tempdir().expect("tempdir");
        let report = RunReport::new("/src", vec![session("a.py", true)]);
        let path = write_run_report(&report, dir.path()).expect("write");
        let tampered = std::fs::read_to_string(&path)
            .expect("read")
            .replace("\"done\": 1", "\"done\": 2");
        std::fs::write(&path, tampered).expect("write");

        let err = read_run_report(dir.path()).unwrap_err();
        assert!(matches!(err, RepairError::DigestMismatch { .. }));
    }
}
