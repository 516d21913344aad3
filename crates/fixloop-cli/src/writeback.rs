//! Sandboxed write-back of repaired sources.

use std::path::{Component, Path, PathBuf};

use anyhow::{bail, Context, Result};
use fixloop_core::SessionReport;

/// What happened to one unit's file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteBack {
    Written,
    Unchanged,
    NotDone,
    DryRun,
}

/// Write the final source of a `DONE`, changed session back under `root`.
///
/// `root` must already be canonical. The unit id must be a plain relative
/// path that still resolves inside `root` after symlinks.
pub async fn write_back(root: &Path, report: &SessionReport, dry_run: bool) -> Result<WriteBack> {
    if !report.is_done() {
        return Ok(WriteBack::NotDone);
    }
    if !report.changed {
        return Ok(WriteBack::Unchanged);
    }

    let path = resolve_inside(root, &report.unit)?;
    if dry_run {
        tracing::info!(unit = %report.unit, "dry run, not writing repaired source");
        return Ok(WriteBack::DryRun);
    }
    tokio::fs::write(&path, &report.final_source)
        .await
        .with_context(|| format!("Failed to write {}", path.display()))?;
    Ok(WriteBack::Written)
}

fn resolve_inside(root: &Path, unit: &str) -> Result<PathBuf> {
    let relative = Path::new(unit);
    if !relative
        .components()
        .all(|c| matches!(c, Component::Normal(_)))
    {
        bail!("refusing to write {unit}: not a plain relative path");
    }
    let path = root.join(relative);
    let resolved = path
        .canonicalize()
        .with_context(|| format!("Failed to resolve {}", path.display()))?;
    if !resolved.starts_with(root) {
        bail!("refusing to write {unit}: resolves outside {}", root.display());
    }
    Ok(resolved)
}

#[cfg(test)]
mod tests {
    use super::*;
    use fixloop_core::domain::{Phase, RepairSession};
    use fixloop_core::SourceUnit;

    fn report(unit: &str, final_source: &str, phase: Phase) -> SessionReport {
        let mut session = RepairSession::new(SourceUnit::new(unit, unit, "x = 1\n"), 3);
        session.current_source = final_source.to_string();
        session.transition(phase);
        session.into_report()
    }

    fn root() -> (tempfile::TempDir, PathBuf) {
        let dir = tempfile::tempdir().expect("tempdir");
        let root = dir.path().canonicalize().expect("canonical");
        std::fs::write(root.join("calc.py"), "x = 1\n").expect("write");
        (dir, root)
    }

    #[tokio::test]
    async fn test_done_and_changed_is_written() {
        let (_dir, root) = root();
        let outcome = write_back(&root, &report("calc.py", "x = 2\n", Phase::Done), false)
            .await
            .expect("write back");
        assert_eq!(outcome, WriteBack::Written);
        assert_eq!(std::fs::read_to_string(root.join("calc.py")).expect("read"), "x = 2\n");
    }

    #[tokio::test]
    async fn test_aborted_and_dry_run_leave_file_alone() {
        let (_dir, root) = root();
        let aborted = write_back(&root, &report("calc.py", "x = 2\n", Phase::Aborted), false)
            .await
            .expect("aborted");
        let dry = write_back(&root, &report("calc.py", "x = 2\n", Phase::Done), true)
            .await
            .expect("dry run");
        let unchanged = write_back(&root, &report("calc.py", "x = 1\n", Phase::Done), false)
            .await
            .expect("unchanged");
        assert_eq!(aborted, WriteBack::NotDone);
        assert_eq!(dry, WriteBack::DryRun);
        assert_eq!(unchanged, WriteBack::Unchanged);
        assert_eq!(std::fs::read_to_string(root.join("calc.py")).expect("read"), "x = 1\n");
    }

    #[tokio::test]
    async fn test_escaping_paths_are_refused() {
        let (_dir, root) = root();
        for unit in ["../calc.py", "/etc/passwd"] {
            let result = write_back(&root, &report(unit, "x = 2\n", Phase::Done), false).await;
            assert!(result.is_err(), "{unit} should be refused");
        }
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_symlink_out_of_root_is_refused() {
        let (_dir, root) = root();
        let outside = tempfile::tempdir().expect("outside");
        let target = outside.path().join("victim.py");
        std::fs::write(&target, "x = 1\n").expect("write");
        std::os::unix::fs::symlink(&target, root.join("link.py")).expect("symlink");

        let result = write_back(&root, &report("link.py", "x = 2\n", Phase::Done), false).await;
        assert!(result.is_err());
        assert_eq!(std::fs::read_to_string(&target).expect("read"), "x = 1\n");
    }
}
