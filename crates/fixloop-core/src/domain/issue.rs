//! Issue and refactoring plan types.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Issue priority. Declaration order is rank order (CRITICAL first).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Priority {
    Critical,
    High,
    Medium,
    Low,
}

impl Priority {
    pub const ALL: [Priority; 4] = [
        Priority::Critical,
        Priority::High,
        Priority::Medium,
        Priority::Low,
    ];

    /// CRITICAL=0 ... LOW=3.
    pub fn rank(self) -> u8 {
        match self {
            Priority::Critical => 0,
            Priority::High => 1,
            Priority::Medium => 2,
            Priority::Low => 3,
        }
    }

    /// Case-insensitive parse; anything unrecognised is `Low`.
    pub fn parse_lenient(raw: &str) -> Self {
        match raw.trim().to_ascii_uppercase().as_str() {
            "CRITICAL" => Priority::Critical,
            "HIGH" => Priority::High,
            "MEDIUM" => Priority::Medium,
            _ => Priority::Low,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Priority::Critical => "CRITICAL",
            Priority::High => "HIGH",
            Priority::Medium => "MEDIUM",
            Priority::Low => "LOW",
        }
    }
}

impl std::fmt::Display for Priority {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// An issue exactly as the proposer emitted it. Nothing here is trusted.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RawIssue {
    pub priority: Option<String>,
    pub category: Option<String>,
    pub description: Option<String>,
    pub line: Option<i64>,
    pub code_snippet: Option<String>,
    pub suggestion: Option<String>,
    pub requires_structural_change: bool,
}

impl RawIssue {
    /// Lenient extraction from one JSON plan entry.
    ///
    /// Returns `None` for non-objects. `issue` is accepted as an alias for
    /// `description`; `line` may be a number or a numeric string.
    pub fn from_value(value: &Value) -> Option<Self> {
        let obj = value.as_object()?;
        let text = |key: &str| -> Option<String> {
            obj.get(key)
                .and_then(Value::as_str)
                .map(str::to_string)
        };
        let line = obj.get("line").and_then(|v| match v {
            Value::Number(n) => n.as_i64().or_else(|| n.as_f64().map(|f| f as i64)),
            Value::String(s) => s.trim().parse::<i64>().ok(),
            _ => None,
        });

        Some(Self {
            priority: text("priority"),
            category: text("category"),
            description: text("description").or_else(|| text("issue")),
            line,
            code_snippet: text("code_snippet"),
            suggestion: text("suggestion"),
            requires_structural_change: obj
                .get("requires_structural_change")
                .and_then(Value::as_bool)
                .unwrap_or(false),
        })
    }
}

/// A validated issue.
///
/// `line`, when present, is within `[1, line_count(source)]`; when
/// `code_snippet` is present it occurs verbatim at `line`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Issue {
    pub priority: Priority,
    pub category: String,
    pub description: String,
    pub line: Option<usize>,
    pub code_snippet: Option<String>,
    pub suggestion: String,
    pub requires_structural_change: bool,
}

/// Ordered issues for one iteration of one unit.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RefactoringPlan {
    pub issues: Vec<Issue>,
}

impl RefactoringPlan {
    /// Stable-sort `issues` by priority rank; equal ranks keep input order.
    pub fn from_issues(mut issues: Vec<Issue>) -> Self {
        issues.sort_by_key(|issue| issue.priority.rank());
        Self { issues }
    }

    pub fn is_empty(&self) -> bool {
        self.issues.is_empty()
    }

    pub fn len(&self) -> usize {
        self.issues.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Issue> {
        self.issues.iter()
    }

    /// Issue count per priority; every priority is present.
    pub fn priority_breakdown(&self) -> BTreeMap<Priority, usize> {
        let mut counts: BTreeMap<Priority, usize> =
            Priority::ALL.iter().map(|p| (*p, 0)).collect();
        for issue in &self.issues {
            *counts.entry(issue.priority).or_insert(0) += 1;
        }
        counts
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn issue(priority: Priority, description: &str) -> Issue {
        Issue {
            priority,
            category: "bug".to_string(),
            description: description.to_string(),
            line: None,
            code_snippet: None,
            suggestion: "fix it".to_string(),
            requires_structural_change: false,
        }
    }

    #[test]
    fn test_priority_parse_lenient() {
        assert_eq!(Priority::parse_lenient("critical"), Priority::Critical);
        assert_eq!(Priority::parse_lenient(" High "), Priority::High);
        assert_eq!(Priority::parse_lenient("urgent"), Priority::Low);
    }

    #[test]
    fn test_priority_serde_uses_upper_case() {
        let json = serde_json::to_string(&Priority::Critical).expect("serialize");
        assert_eq!(json, "\"CRITICAL\"");
    }

    #[test]
    fn test_plan_sort_is_stable() {
        let plan = RefactoringPlan::from_issues(vec![
            issue(Priority::Low, "a"),
            issue(Priority::High, "b"),
            issue(Priority::Low, "c"),
            issue(Priority::Critical, "d"),
            issue(Priority::High, "e"),
        ]);
        let order: Vec<&str> = plan.iter().map(|i| i.description.as_str()).collect();
        assert_eq!(order, vec!["d", "b", "e", "a", "c"]);
    }

    #[test]
    fn test_priority_breakdown_lists_all_levels() {
        let plan = RefactoringPlan::from_issues(vec![
            issue(Priority::High, "a"),
            issue(Priority::High, "b"),
        ]);
        let counts = plan.priority_breakdown();
        assert_eq!(counts[&Priority::High], 2);
        assert_eq!(counts[&Priority::Critical], 0);
        assert_eq!(counts.len(), 4);
    }

    #[test]
    fn test_raw_issue_accepts_aliases() {
        let raw = RawIssue::from_value(&json!({
            "priority": "HIGH",
            "issue": "Type error",
            "line": "7",
            "suggestion": "cast to int"
        }))
        .expect("object");
        assert_eq!(raw.description.as_deref(), Some("Type error"));
        assert_eq!(raw.line, Some(7));
        assert!(!raw.requires_structural_change);
    }

    #[test]
    fn test_raw_issue_rejects_non_objects() {
        assert!(RawIssue::from_value(&json!("just text")).is_none());
    }
}
