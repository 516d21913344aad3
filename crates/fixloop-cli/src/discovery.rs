//! Source unit discovery under a target directory.
//!
//! Every non-empty `.py` file is a unit, except test files (`test_*.py`,
//! `*_test.py`, `conftest.py`). A unit `foo.py` picks up `test_foo.py` or
//! `foo_test.py` from its own directory or a sibling `tests/` directory as
//! its existing suite.

use std::path::{Component, Path, PathBuf};

use anyhow::{Context, Result};
use fixloop_core::{SourceUnit, TestOrigin, TestSuite};
use walkdir::{DirEntry, WalkDir};

const SKIPPED_DIRS: &[&str] = &[
    "__pycache__",
    "venv",
    "node_modules",
    "build",
    "dist",
    "site-packages",
];

/// A unit found on disk, not yet read.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DiscoveredUnit {
    /// Path relative to the target directory, `/`-separated; the unit id.
    pub relative: String,
    pub path: PathBuf,
    pub tests: Option<PathBuf>,
}

/// Walk `root` and return its units sorted by relative path.
pub fn discover(root: &Path) -> Result<Vec<DiscoveredUnit>> {
    let mut units = Vec::new();
    let walker = WalkDir::new(root)
        .follow_links(false)
        .into_iter()
        .filter_entry(|entry| entry.depth() == 0 || !is_skipped_dir(entry));

    for entry in walker {
        let entry = entry.with_context(|| format!("Failed to walk {}", root.display()))?;
        if !entry.file_type().is_file() {
            continue;
        }
        let path = entry.path();
        let Some(name) = path.file_name().and_then(|n| n.to_str()) else {
            continue;
        };
        if !name.ends_with(".py") || is_test_file(name) {
            continue;
        }
        if entry.metadata().map(|m| m.len() == 0).unwrap_or(true) {
            tracing::debug!(path = %path.display(), "skipping empty file");
            continue;
        }

        let relative = relative_id(root, path)?;
        units.push(DiscoveredUnit {
            relative,
            path: path.to_path_buf(),
            tests: find_tests(path),
        });
    }

    units.sort_by(|a, b| a.relative.cmp(&b.relative));
    Ok(units)
}

/// Read every discovered unit.
///
/// A unit that cannot be read (permissions, non-UTF-8 bytes) is logged and
/// counted instead of failing the run. Returns the loaded units and the
/// number that failed.
pub async fn load_units(discovered: &[DiscoveredUnit]) -> (Vec<SourceUnit>, usize) {
    let mut units = Vec::with_capacity(discovered.len());
    let mut failed = 0;
    for unit in discovered {
        match load_unit(unit).await {
            Ok(loaded) => units.push(loaded),
            Err(err) => {
                failed += 1;
                tracing::warn!(unit = %unit.relative, error = %format!("{err:#}"), "skipping unreadable unit");
            }
        }
    }
    (units, failed)
}

/// Read a discovered unit and its suite.
pub async fn load_unit(unit: &DiscoveredUnit) -> Result<SourceUnit> {
    let source = tokio::fs::read_to_string(&unit.path)
        .await
        .with_context(|| format!("Failed to read {}", unit.path.display()))?;
    let file_name = unit
        .path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| unit.relative.clone());

    let mut loaded = SourceUnit::new(unit.relative.clone(), file_name, source);
    if let Some(tests_path) = &unit.tests {
        let code = tokio::fs::read_to_string(tests_path)
            .await
            .with_context(|| format!("Failed to read {}", tests_path.display()))?;
        let tests_name = tests_path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| format!("test_{}.py", loaded.module_name()));
        loaded = loaded.with_tests(TestSuite {
            file_name: tests_name,
            code,
            origin: TestOrigin::Existing,
        });
    }
    Ok(loaded)
}

pub fn is_test_file(name: &str) -> bool {
    name == "conftest.py" || name.starts_with("test_") || name.ends_with("_test.py")
}

fn is_skipped_dir(entry: &DirEntry) -> bool {
    if !entry.file_type().is_dir() {
        return false;
    }
    let name = entry.file_name().to_string_lossy();
    name.starts_with('.') || SKIPPED_DIRS.contains(&name.as_ref())
}

fn find_tests(path: &Path) -> Option<PathBuf> {
    let stem = path.file_stem()?.to_str()?;
    let dir = path.parent()?;
    let names = [format!("test_{stem}.py"), format!("{stem}_test.py")];
    [dir.to_path_buf(), dir.join("tests")]
        .iter()
        .flat_map(|d| names.iter().map(move |n| d.join(n)))
        .find(|candidate| candidate.is_file())
}

fn relative_id(root: &Path, path: &Path) -> Result<String> {
    let relative = path
        .strip_prefix(root)
        .with_context(|| format!("{} is outside {}", path.display(), root.display()))?;
    let parts: Vec<String> = relative
        .components()
        .filter_map(|c| match c {
            Component::Normal(part) => Some(part.to_string_lossy().into_owned()),
            _ => None,
        })
        .collect();
    Ok(parts.join("/"))
}
