//! Python source analysis backed by tree-sitter.
//!
//! Used by the plan validator (imports) and the fix applicator
//! (signatures, imports, syntax).

use std::cell::RefCell;
use std::collections::BTreeSet;

use tree_sitter::{Node, Parser, Tree};

use crate::error::{RepairError, Result};

thread_local! {
    static PYTHON_PARSER: RefCell<Parser> = RefCell::new({
        let mut p = Parser::new();
        // A failed set_language surfaces as a parse failure below.
        let _ = p.set_language(&tree_sitter_python::LANGUAGE.into());
        p
    });
}

fn parse(source: &str) -> Result<Tree> {
    PYTHON_PARSER
        .with(|p| p.borrow_mut().parse(source, None))
        .ok_or_else(|| RepairError::SourceAnalysis("tree-sitter returned no tree".to_string()))
}

fn text<'a>(node: &Node, source: &'a str) -> &'a str {
    node.utf8_text(source.as_bytes()).unwrap_or("")
}

/// A callable definition: qualified name plus normalized parameter list.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Signature {
    /// Dotted path through enclosing classes and functions, e.g. `Calc.add`.
    pub qualified_name: String,
    pub is_async: bool,
    /// One entry per parameter, whitespace removed, comments dropped.
    pub parameters: Vec<String>,
}

impl std::fmt::Display for Signature {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.is_async {
            f.write_str("async ")?;
        }
        write!(f, "def {}({})", self.qualified_name, self.parameters.join(", "))
    }
}

/// Ordered callable signatures in `source`, in definition order.
pub fn signatures(source: &str) -> Result<Vec<Signature>> {
    let tree = parse(source)?;
    let mut out = Vec::new();
    let mut scope = Vec::new();
    collect_signatures(tree.root_node(), source, &mut scope, &mut out);
    Ok(out)
}

fn collect_signatures(node: Node, source: &str, scope: &mut Vec<String>, out: &mut Vec<Signature>) {
    match node.kind() {
        "function_definition" => {
            let Some(name_node) = node.child_by_field_name("name") else {
                return;
            };
            let name = text(&name_node, source).to_string();
            let is_async = node.child(0).is_some_and(|c| c.kind() == "async");
            let parameters = node
                .child_by_field_name("parameters")
                .map(|params| parameter_list(params, source))
                .unwrap_or_default();

            scope.push(name);
            out.push(Signature {
                qualified_name: scope.join("."),
                is_async,
                parameters,
            });
            if let Some(body) = node.child_by_field_name("body") {
                collect_children(body, source, scope, out);
            }
            scope.pop();
        }
        "class_definition" => {
            let Some(name_node) = node.child_by_field_name("name") else {
                return;
            };
            scope.push(text(&name_node, source).to_string());
            if let Some(body) = node.child_by_field_name("body") {
                collect_children(body, source, scope, out);
            }
            scope.pop();
        }
        _ => collect_children(node, source, scope, out),
    }
}

fn collect_children(node: Node, source: &str, scope: &mut Vec<String>, out: &mut Vec<Signature>) {
    let mut cursor = node.walk();
    for child in node.named_children(&mut cursor) {
        collect_signatures(child, source, scope, out);
    }
}

fn parameter_list(params: Node, source: &str) -> Vec<String> {
    let mut cursor = params.walk();
    params
        .named_children(&mut cursor)
        .filter(|child| child.kind() != "comment")
        .map(|child| {
            text(&child, source)
                .chars()
                .filter(|c| !c.is_whitespace())
                .collect()
        })
        .collect()
}

/// Imported names in `source`.
///
/// `import a.b as c` yields `a.b`; `from x import y` yields both `x` and
/// `x.y`. Relative imports keep their leading dots.
pub fn imports(source: &str) -> Result<BTreeSet<String>> {
    collect_imports(source, true)
}

/// Modules bound by plain `import` statements.
///
/// `from x import y` binds `y`, not `x`, so it contributes nothing here.
pub fn module_imports(source: &str) -> Result<BTreeSet<String>> {
    collect_imports(source, false)
}

fn collect_imports(source: &str, include_from: bool) -> Result<BTreeSet<String>> {
    let tree = parse(source)?;
    let mut out = BTreeSet::new();
    let mut cursor = tree.walk();

    loop {
        let node = cursor.node();
        match node.kind() {
            "import_statement" => {
                let mut names = node.walk();
                for name in node.children_by_field_name("name", &mut names) {
                    out.insert(imported_name(name, source));
                }
            }
            "import_from_statement" if include_from => {
                if let Some(module) = node.child_by_field_name("module_name") {
                    let module = text(&module, source).to_string();
                    let mut names = node.walk();
                    for name in node.children_by_field_name("name", &mut names) {
                        out.insert(format!("{module}.{}", imported_name(name, source)));
                    }
                    out.insert(module);
                }
            }
            _ => {}
        }

        if cursor.goto_first_child() {
            continue;
        }
        while !cursor.goto_next_sibling() {
            if !cursor.goto_parent() {
                return Ok(out);
            }
        }
    }
}

fn imported_name(node: Node, source: &str) -> String {
    let target = if node.kind() == "aliased_import" {
        node.child_by_field_name("name").unwrap_or(node)
    } else {
        node
    };
    text(&target, source).to_string()
}

/// Names of `def` headers, in order, found line by line.
///
/// Does not depend on the parser, so a source whose syntax error swallows
/// neighbouring definitions into an error node still lists every header.
/// Nested definitions are listed unqualified.
pub fn definition_names(source: &str) -> Vec<String> {
    source.lines().filter_map(def_header_name).collect()
}

fn def_header_name(line: &str) -> Option<String> {
    let mut rest = line.trim_start();
    if let Some(after) = rest.strip_prefix("async") {
        if after.starts_with(char::is_whitespace) {
            rest = after.trim_start();
        }
    }
    let after = rest.strip_prefix("def")?;
    if !after.starts_with(char::is_whitespace) {
        return None;
    }
    let name: String = after
        .trim_start()
        .chars()
        .take_while(|c| c.is_alphanumeric() || *c == '_')
        .collect();
    (!name.is_empty()).then_some(name)
}

/// 1-based line of the first syntax error, or `None` if `source` parses cleanly.
pub fn syntax_error(source: &str) -> Result<Option<usize>> {
    let tree = parse(source)?;
    let root = tree.root_node();
    if !root.has_error() {
        return Ok(None);
    }

    let mut cursor = tree.walk();
    loop {
        let node = cursor.node();
        if node.is_error() || node.is_missing() {
            return Ok(Some(node.start_position().row + 1));
        }
        // Only descend into subtrees that contain the error.
        if node.has_error() && cursor.goto_first_child() {
            continue;
        }
        while !cursor.goto_next_sibling() {
            if !cursor.goto_parent() {
                return Ok(Some(1));
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const CALC: &str = "\
import math
from os import path as p, sep

class Calc:
    def add(self, a, b):  # sum
        return a + b

    async def fetch(self, url: str, retries: int = 3):
        pass

def top(x,
        # the divisor
        y=2):
    def inner():
        return x
    return inner() / y
";

    #[test]
    fn test_signatures_in_order_with_scopes() {
        let sigs = signatures(CALC).expect("signatures");
        let names: Vec<&str> = sigs.iter().map(|s| s.qualified_name.as_str()).collect();
        assert_eq!(names, vec!["Calc.add", "Calc.fetch", "top", "top.inner"]);
        assert!(sigs[1].is_async);
        assert_eq!(sigs[1].parameters, vec!["self", "url:str", "retries:int=3"]);
    }

    #[test]
    fn test_signature_ignores_comments_and_layout() {
        let sigs = signatures(CALC).expect("signatures");
        assert_eq!(sigs[2].parameters, vec!["x", "y=2"]);

        let reformatted = "def top(x, y = 2):\n    return x / y\n";
        let other = signatures(reformatted).expect("signatures");
        assert_eq!(other[0].parameters, sigs[2].parameters);
    }

    #[test]
    fn test_signature_display() {
        let sigs = signatures("async def go(a, *args, **kw):\n    pass\n").expect("signatures");
        assert_eq!(sigs[0].to_string(), "async def go(a, *args, **kw)");
    }

    #[test]
    fn test_imports() {
        let found = imports(CALC).expect("imports");
        assert!(found.contains("math"));
        assert!(found.contains("os"));
        assert!(found.contains("os.path"));
        assert!(found.contains("os.sep"));
        assert!(!found.contains("p"));
    }

    #[test]
    fn test_aliased_module_import() {
        let found = imports("import numpy as np\n").expect("imports");
        assert!(found.contains("numpy"));
    }

    #[test]
    fn test_from_import_does_not_bind_module() {
        let found = module_imports(CALC).expect("imports");
        assert!(found.contains("math"));
        assert!(!found.contains("os"));
        assert!(!found.contains("os.path"));
    }

    #[test]
    fn test_definition_names_survive_broken_header() {
        let broken = "def add(a, b)\n    return a + b\n\ndef mul(a, b):\n    return a * b\n";
        assert_eq!(definition_names(broken), vec!["add", "mul"]);

        let unclosed = "def add(a, b):\n    return (a + b\n\ndef mul(a, b):\n    return a * b\n";
        assert_eq!(definition_names(unclosed), vec!["add", "mul"]);
    }

    #[test]
    fn test_definition_names_layouts() {
        let names = definition_names(CALC);
        assert_eq!(names, vec!["add", "fetch", "top", "inner"]);
        assert!(definition_names("defaults = 1\nasync_def = 2\n").is_empty());
    }

    #[test]
    fn test_syntax_ok() {
        assert_eq!(syntax_error(CALC).expect("parse"), None);
    }

    #[test]
    fn test_syntax_error_line() {
        let broken = "def ok():\n    return 1\n\ndef broken(:\n    pass\n";
        let line = syntax_error(broken).expect("parse");
        assert!(line.is_some());
    }
}
