//! Plan validation.
//!
//! Filters raw proposer issues against the actual source. Each issue is
//! judged on its own and either kept (possibly with a corrected line) or
//! dropped with a reason. Validation is pure and never fails.

use std::collections::BTreeSet;

use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::denylist::{Denylist, DenylistMatcher};
use crate::domain::{line_count, Issue, Priority, RawIssue, RefactoringPlan};
use crate::error::Result;
use crate::python;

/// Why an issue was dropped.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "reason", rename_all = "snake_case")]
pub enum DropReason {
    MissingField { field: String },
    SnippetNotFound { snippet: String },
    DangerousSuggestion { primitive: String },
    DuplicateImport { module: String },
}

impl std::fmt::Display for DropReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DropReason::MissingField { field } => write!(f, "missing field `{field}`"),
            DropReason::SnippetNotFound { snippet } => {
                write!(f, "code snippet not found in source: {snippet:?}")
            }
            DropReason::DangerousSuggestion { primitive } => {
                write!(f, "suggestion calls denylisted `{primitive}`")
            }
            DropReason::DuplicateImport { module } => {
                write!(f, "suggests importing `{module}` which is already imported")
            }
        }
    }
}

/// A dropped issue, by its position in the raw plan.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DroppedIssue {
    pub index: usize,
    #[serde(flatten)]
    pub reason: DropReason,
}

/// A line number the validator changed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LineCorrection {
    pub index: usize,
    pub stated: Option<i64>,
    pub corrected: usize,
}

/// Validated plan plus what was dropped or corrected on the way.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidationOutcome {
    pub plan: RefactoringPlan,
    pub dropped: Vec<DroppedIssue>,
    pub corrections: Vec<LineCorrection>,
}

/// Filters and repairs raw issues.
#[derive(Debug, Clone)]
pub struct PlanValidator {
    denylist: DenylistMatcher,
    from_import: Regex,
    plain_import: Regex,
    removal: Regex,
}

impl PlanValidator {
    pub fn new(denylist: &Denylist) -> Result<Self> {
        Ok(Self {
            denylist: DenylistMatcher::new(denylist)?,
            from_import: Regex::new(r"(?i)\bfrom\s+([\w.]+)\s+import\s+(\w+(?:\s*,\s*\w+)*)")?,
            plain_import: Regex::new(r"(?i)(?:^|[^\w.])import\s+([\w.]+)")?,
            removal: Regex::new(r"(?i)\b(remove|delete|drop|unused)\b")?,
        })
    }

    /// Validate `raw` against `source`.
    ///
    /// Rules, in order, each dropping the issue on failure:
    /// 1. `description` and `suggestion` must be present and non-blank.
    /// 2. A `code_snippet` must occur in the source; `line` is overwritten
    ///    with the first match. Without a snippet, `line` is clamped.
    /// 3. The suggestion must not call a denylisted primitive.
    /// 4. The suggestion must not import something already imported.
    ///
    /// Survivors are stable-sorted by priority.
    pub fn validate(&self, raw: &[RawIssue], source: &str) -> ValidationOutcome {
        let lines = line_count(source);
        let imports = SourceImports {
            names: python::imports(source).unwrap_or_default(),
            modules: python::module_imports(source).unwrap_or_default(),
        };
        let mut kept = Vec::with_capacity(raw.len());
        let mut dropped = Vec::new();
        let mut corrections = Vec::new();

        for (index, issue) in raw.iter().enumerate() {
            let dropped_as = |reason| DroppedIssue { index, reason };

            let Some(description) = non_blank(issue.description.as_deref()) else {
                dropped.push(dropped_as(DropReason::MissingField {
                    field: "description".to_string(),
                }));
                continue;
            };
            let Some(suggestion) = non_blank(issue.suggestion.as_deref()) else {
                dropped.push(dropped_as(DropReason::MissingField {
                    field: "suggestion".to_string(),
                }));
                continue;
            };

            let snippet = non_blank(issue.code_snippet.as_deref()).map(str::trim);
            let line = match snippet {
                Some(snippet) => match locate(source, snippet) {
                    Some(found) => Some(found),
                    None => {
                        dropped.push(dropped_as(DropReason::SnippetNotFound {
                            snippet: snippet.to_string(),
                        }));
                        continue;
                    }
                },
                None => issue.line.and_then(|stated| clamp_line(stated, lines)),
            };

            if let Some(primitive) = self.denylist.find_call(suggestion) {
                dropped.push(dropped_as(DropReason::DangerousSuggestion {
                    primitive: primitive.to_string(),
                }));
                continue;
            }

            if let Some(module) = self.duplicate_import(suggestion, &imports) {
                dropped.push(dropped_as(DropReason::DuplicateImport { module }));
                continue;
            }

            if let Some(corrected) = line {
                if issue.line != Some(corrected as i64) {
                    corrections.push(LineCorrection {
                        index,
                        stated: issue.line,
                        corrected,
                    });
                }
            }

            kept.push(Issue {
                priority: issue
                    .priority
                    .as_deref()
                    .map_or(Priority::Low, Priority::parse_lenient),
                category: non_blank(issue.category.as_deref())
                    .unwrap_or("general")
                    .to_string(),
                description: description.to_string(),
                line,
                code_snippet: snippet.map(str::to_string),
                suggestion: suggestion.to_string(),
                requires_structural_change: issue.requires_structural_change,
            });
        }

        ValidationOutcome {
            plan: RefactoringPlan::from_issues(kept),
            dropped,
            corrections,
        }
    }

    /// Module the suggestion would re-import, if every name it imports is
    /// already imported. Suggestions about removing imports are left alone.
    fn duplicate_import(&self, suggestion: &str, imports: &SourceImports) -> Option<String> {
        if self.removal.is_match(suggestion) {
            return None;
        }

        for caps in self.from_import.captures_iter(suggestion) {
            let module = &caps[1];
            let all_present = caps[2]
                .split(',')
                .map(str::trim)
                .all(|name| imports.names.contains(&format!("{module}.{name}")));
            if all_present {
                return Some(module.to_string());
            }
        }

        let remainder = self.from_import.replace_all(suggestion, "");
        self.plain_import
            .captures_iter(&remainder)
            .map(|caps| caps[1].to_string())
            .find(|module| imports.modules.contains(module))
    }
}

/// What the source already imports.
struct SourceImports {
    /// Everything `python::imports` reports, including `from x import y` as `x.y`.
    names: BTreeSet<String>,
    /// Modules bound by plain `import` statements.
    modules: BTreeSet<String>,
}

fn non_blank(value: Option<&str>) -> Option<&str> {
    value.filter(|v| !v.trim().is_empty())
}

/// 1-based line of the first occurrence of `snippet` in `source`.
fn locate(source: &str, snippet: &str) -> Option<usize> {
    let offset = source.find(snippet)?;
    Some(source[..offset].matches('\n').count() + 1)
}

/// Clamp into `[1, lines]`; an empty source has no valid line.
fn clamp_line(stated: i64, lines: usize) -> Option<usize> {
    if lines == 0 {
        return None;
    }
    Some(stated.clamp(1, lines as i64) as usize)
}
