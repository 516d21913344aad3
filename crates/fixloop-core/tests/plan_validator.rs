//! Plan validation against the real source: line correction, hallucinated
//! snippets, dangerous suggestions and duplicate imports.

use fixloop_core::parse::{parse_plan, plan_or_empty};
use fixloop_core::{Denylist, DropReason, PlanValidator, Priority, RawIssue};

const SOURCE: &str = "\
import os
from typing import List


def total(values: List[int]) -> int:
    acc = 0
    for v in values: acc += v
    return acc
";

fn validator() -> PlanValidator {
    PlanValidator::new(&Denylist::default()).expect("validator")
}

fn issue(description: &str, snippet: Option<&str>, line: Option<i64>, suggestion: &str) -> RawIssue {
    RawIssue {
        priority: Some("MEDIUM".to_string()),
        category: Some("style".to_string()),
        description: Some(description.to_string()),
        line,
        code_snippet: snippet.map(str::to_string),
        suggestion: Some(suggestion.to_string()),
        requires_structural_change: false,
    }
}

#[test]
fn wrong_line_is_corrected_from_snippet() {
    let raw = vec![issue(
        "loop body on one line",
        Some("for v in values: acc += v"),
        Some(3),
        "put the body on its own line",
    )];

    let outcome = validator().validate(&raw, SOURCE);

    assert_eq!(outcome.plan.len(), 1);
    let kept = outcome.plan.iter().next().expect("kept issue");
    assert_eq!(kept.line, Some(7));
    assert_eq!(outcome.corrections.len(), 1);
    assert_eq!(outcome.corrections[0].stated, Some(3));
    assert_eq!(outcome.corrections[0].corrected, 7);
}

#[test]
fn dangerous_suggestion_drops_exactly_one_issue() {
    let raw = vec![
        issue("accumulator naming", Some("acc = 0"), Some(6), "rename acc to result"),
        issue("slow loop", Some("for v in values: acc += v"), Some(7), "use eval(\"sum(values)\") instead"),
        issue("missing docstring", None, Some(5), "add a docstring"),
    ];

    let outcome = validator().validate(&raw, SOURCE);

    assert_eq!(outcome.plan.len(), raw.len() - 1);
    assert_eq!(outcome.dropped.len(), 1);
    assert_eq!(outcome.dropped[0].index, 1);
    assert_eq!(
        outcome.dropped[0].reason,
        DropReason::DangerousSuggestion {
            primitive: "eval".to_string()
        }
    );
}

#[test]
fn hallucinated_snippet_is_dropped() {
    let raw = vec![issue(
        "division by zero",
        Some("return acc / len(values)"),
        Some(8),
        "guard against empty input",
    )];

    let outcome = validator().validate(&raw, SOURCE);

    assert!(outcome.plan.is_empty());
    assert!(matches!(
        outcome.dropped[0].reason,
        DropReason::SnippetNotFound { .. }
    ));
}

#[test]
fn reimporting_an_existing_module_is_dropped() {
    let raw = vec![
        issue("needs typing", None, None, "add `from typing import List`"),
        issue("needs os", None, None, "import os at the top"),
        issue("unused import", Some("import os"), Some(1), "remove the unused import os"),
    ];

    let outcome = validator().validate(&raw, SOURCE);

    assert_eq!(outcome.dropped.len(), 2);
    assert_eq!(
        outcome.dropped[0].reason,
        DropReason::DuplicateImport {
            module: "typing".to_string()
        }
    );
    assert_eq!(
        outcome.dropped[1].reason,
        DropReason::DuplicateImport {
            module: "os".to_string()
        }
    );
    assert_eq!(outcome.plan.len(), 1);
    assert_eq!(outcome.plan.iter().next().expect("kept").line, Some(1));
}

#[test]
fn stated_line_is_clamped_without_snippet() {
    let raw = vec![
        issue("too high", None, Some(400), "fix it"),
        issue("too low", None, Some(-2), "fix it"),
    ];

    let outcome = validator().validate(&raw, SOURCE);
    let lines: Vec<Option<usize>> = outcome.plan.iter().map(|i| i.line).collect();
    assert_eq!(lines, vec![Some(8), Some(1)]);
}

#[test]
fn proposer_json_flows_into_sorted_plan() {
    let text = r#"Here is the plan:
```json
{"refactoring_plan": [
  {"priority": "low", "issue": "naming", "code_snippet": "acc = 0", "suggestion": "rename"},
  {"priority": "CRITICAL", "description": "crash", "line": 8, "suggestion": "handle it"},
  {"priority": "BLOCKER", "description": "odd priority", "suggestion": "whatever"},
  {"description": "no suggestion"}
]}
```"#;

    let raw = plan_or_empty(parse_plan(text));
    assert_eq!(raw.len(), 4);

    let outcome = validator().validate(&raw, SOURCE);
    let priorities: Vec<Priority> = outcome.plan.iter().map(|i| i.priority).collect();
    assert_eq!(priorities, vec![Priority::Critical, Priority::Low, Priority::Low]);
    assert_eq!(outcome.plan.iter().nth(1).expect("naming").description, "naming");
    assert!(matches!(
        &outcome.dropped[0].reason,
        DropReason::MissingField { field } if field == "suggestion"
    ));
}
