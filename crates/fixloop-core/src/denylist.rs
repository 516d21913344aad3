//! Dangerous-primitive denylist.
//!
//! Two kinds of entries:
//! - `calls`: primitives that must not appear as a call in a suggestion or
//!   be newly introduced by a fix (`eval(`, `os.system(`, ...)
//! - `modules`: imports a fix must not introduce (`subprocess`, ...)

use std::collections::BTreeSet;

use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::error::Result;

/// Denylist entries as configured.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Denylist {
    pub calls: Vec<String>,
    pub modules: Vec<String>,
}

impl Default for Denylist {
    fn default() -> Self {
        let calls = [
            "eval",
            "exec",
            "__import__",
            "os.system",
            "os.popen",
            "os.remove",
            "os.unlink",
            "os.rmdir",
            "os.removedirs",
            "shutil.rmtree",
            "subprocess.run",
            "subprocess.call",
            "subprocess.check_call",
            "subprocess.check_output",
            "subprocess.Popen",
            "importlib.import_module",
        ];
        let modules = [
            "subprocess",
            "os.system",
            "os.popen",
            "shutil.rmtree",
            "importlib",
            "ctypes",
            "pty",
        ];
        Self {
            calls: calls.iter().map(|c| (*c).to_string()).collect(),
            modules: modules.iter().map(|m| (*m).to_string()).collect(),
        }
    }
}

/// Compiled form of a [`Denylist`].
#[derive(Debug, Clone)]
pub struct DenylistMatcher {
    calls: Vec<(String, Regex)>,
    modules: Vec<String>,
}

impl DenylistMatcher {
    pub fn new(denylist: &Denylist) -> Result<Self> {
        let mut calls = Vec::with_capacity(denylist.calls.len());
        for call in &denylist.calls {
            // Not preceded by an identifier char or a dot, so `ast.literal_eval(`
            // does not match `eval`.
            let pattern = format!(r"(?:^|[^\w.]){}\s*\(", regex::escape(call));
            calls.push((call.clone(), Regex::new(&pattern)?));
        }
        Ok(Self {
            calls,
            modules: denylist.modules.clone(),
        })
    }

    /// First denylisted call found in `text`, if any.
    pub fn find_call(&self, text: &str) -> Option<&str> {
        self.calls
            .iter()
            .find(|(_, re)| re.is_match(text))
            .map(|(name, _)| name.as_str())
    }

    /// Number of occurrences of each denylisted call in `text`.
    pub fn count_calls(&self, text: &str) -> Vec<(&str, usize)> {
        self.calls
            .iter()
            .map(|(name, re)| (name.as_str(), re.find_iter(text).count()))
            .collect()
    }

    /// Imports from `imports` that hit a denylisted module.
    ///
    /// `subprocess` matches `subprocess` and `subprocess.run`; `os.system`
    /// matches `from os import system` (recorded as `os.system`).
    pub fn banned_imports<'a>(&self, imports: &'a BTreeSet<String>) -> BTreeSet<&'a str> {
        imports
            .iter()
            .filter(|import| {
                self.modules.iter().any(|banned| {
                    import.as_str() == banned || import.starts_with(&format!("{banned}."))
                })
            })
            .map(String::as_str)
            .collect()
    }
}
