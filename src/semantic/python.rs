use regex::Regex;
use std::collections::HashMap;
use std::sync::LazyLock;
use tree_sitter::{Language, Node, Parser, Tree};

use super::construct::{Construct, ConstructKind, Role};
use super::fingerprint::{body_hash, interface_hash};
use super::{Import, SemanticIndexer, registry};

static CONST_NAME_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"^[A-Z][A-Z0-9_]*$").unwrap());

/// Base names that mark a class as an enum.
const ENUM_BASES: &[&str] = &["Enum", "IntEnum", "StrEnum", "Flag", "IntFlag"];

/// Parameter node kinds included in the normalized parameter list.
const PARAM_KINDS: &[&str] = &[
    "identifier",
    "typed_parameter",
    "default_parameter",
    "typed_default_parameter",
    "list_splat_pattern",
    "dictionary_splat_pattern",
];

/// Extracts constructs from Python source code.
///
/// Emits module-level variables and functions, classes (nested included,
/// with enum detection on the base list), class fields, and methods.
/// Decorators attach to the immediately following definition and widen
/// its span; `definition_line` still points at the `def`/`class` keyword.
pub struct PythonIndexer {
    language: Language,
}

impl PythonIndexer {
    pub fn new() -> Self {
        Self {
            language: tree_sitter_python::LANGUAGE.into(),
        }
    }

    fn parse(&self, source: &str) -> Option<Tree> {
        let mut parser = Parser::new();
        parser.set_language(&self.language).ok()?;
        parser.parse(source, None)
    }

    fn extract_block(
        &self,
        block: Node,
        source: &str,
        path: &str,
        scope: &[String],
        has_errors: bool,
        out: &mut Vec<Construct>,
    ) {
        let mut cursor = block.walk();
        for child in block.children(&mut cursor) {
            match child.kind() {
                "expression_statement" => {
                    let Some(expr) = child.child(0) else { continue };
                    if expr.kind() == "assignment" {
                        if let Some(c) =
                            self.parse_assignment(expr, source, path, scope, has_errors)
                        {
                            out.push(c);
                        }
                    }
                }
                "function_definition" => {
                    if let Some(c) =
                        self.parse_function(child, None, source, path, scope, has_errors)
                    {
                        out.push(c);
                    }
                }
                "class_definition" => {
                    self.parse_class(child, None, source, path, scope, has_errors, out);
                }
                "decorated_definition" => {
                    let Some(definition) = child.child_by_field_name("definition") else {
                        continue;
                    };
                    match definition.kind() {
                        "function_definition" => {
                            if let Some(c) = self.parse_function(
                                definition,
                                Some(child),
                                source,
                                path,
                                scope,
                                has_errors,
                            ) {
                                out.push(c);
                            }
                        }
                        "class_definition" => {
                            self.parse_class(
                                definition,
                                Some(child),
                                source,
                                path,
                                scope,
                                has_errors,
                                out,
                            );
                        }
                        _ => {}
                    }
                }
                _ => {}
            }
        }
    }

    /// `NAME = value`, `NAME: type = value`, or `NAME: type`.
    fn parse_assignment(
        &self,
        node: Node,
        source: &str,
        path: &str,
        scope: &[String],
        has_errors: bool,
    ) -> Option<Construct> {
        let left = node.child_by_field_name("left")?;
        if left.kind() != "identifier" {
            return None; // tuple targets, attribute assignments
        }

        let name = node_text(left, source);
        let kind = if scope.is_empty() {
            ConstructKind::Variable
        } else {
            ConstructKind::Field
        };
        let role = CONST_NAME_RE.is_match(name).then_some(Role::Const);

        let annotation = node.child_by_field_name("type").map(|t| node_text(t, source));
        let value = node.child_by_field_name("right");

        Some(Construct {
            path: path.to_string(),
            kind,
            qualname: qualify(scope, name),
            role,
            start_line: node.start_position().row as u32 + 1,
            end_line: node.end_position().row as u32 + 1,
            definition_line: node.start_position().row as u32 + 1,
            interface_hash: interface_hash(kind, annotation, &[], None),
            body_hash: body_hash(value, source),
            base_classes: None,
            has_parse_error: has_errors,
        })
    }

    fn parse_function(
        &self,
        node: Node,
        decorated: Option<Node>,
        source: &str,
        path: &str,
        scope: &[String],
        has_errors: bool,
    ) -> Option<Construct> {
        let name = node_text(node.child_by_field_name("name")?, source);
        let kind = if scope.is_empty() {
            ConstructKind::Function
        } else {
            ConstructKind::Method
        };

        let decorators = decorator_texts(decorated, source);
        let params = node
            .child_by_field_name("parameters")
            .map(|p| normalize_params(p, source))
            .unwrap_or_default();
        let return_type = node
            .child_by_field_name("return_type")
            .map(|t| node_text(t, source));

        let outer = decorated.unwrap_or(node);
        Some(Construct {
            path: path.to_string(),
            kind,
            qualname: qualify(scope, name),
            role: None,
            start_line: outer.start_position().row as u32 + 1,
            end_line: outer.end_position().row as u32 + 1,
            definition_line: node.start_position().row as u32 + 1,
            interface_hash: interface_hash(kind, return_type, &decorators, Some(&params)),
            body_hash: body_hash(node.child_by_field_name("body"), source),
            base_classes: None,
            has_parse_error: has_errors,
        })
    }

    #[allow(clippy::too_many_arguments)]
    fn parse_class(
        &self,
        node: Node,
        decorated: Option<Node>,
        source: &str,
        path: &str,
        scope: &[String],
        has_errors: bool,
        out: &mut Vec<Construct>,
    ) {
        let Some(name_node) = node.child_by_field_name("name") else {
            return;
        };
        let name = node_text(name_node, source);

        let superclasses = node.child_by_field_name("superclasses");
        let bases_text = superclasses.map(|s| node_text(s, source));

        // A class whose base list textually names an Enum variant is an
        // enum; everything else is a class.
        let kind = if bases_text.is_some_and(|t| ENUM_BASES.iter().any(|e| t.contains(e))) {
            ConstructKind::Enum
        } else {
            ConstructKind::Class
        };

        let base_classes = superclasses.map(|s| base_class_names(s, source));
        let decorators = decorator_texts(decorated, source);

        let outer = decorated.unwrap_or(node);
        out.push(Construct {
            path: path.to_string(),
            kind,
            qualname: qualify(scope, name),
            role: None,
            start_line: outer.start_position().row as u32 + 1,
            end_line: outer.end_position().row as u32 + 1,
            definition_line: node.start_position().row as u32 + 1,
            interface_hash: interface_hash(kind, bases_text, &decorators, None),
            body_hash: body_hash(node.child_by_field_name("body"), source),
            base_classes: base_classes.filter(|b| !b.is_empty()),
            has_parse_error: has_errors,
        });

        if let Some(body) = node.child_by_field_name("body") {
            let mut inner_scope = scope.to_vec();
            inner_scope.push(name.to_string());
            self.extract_block(body, source, path, &inner_scope, has_errors, out);
        }
    }
}

impl Default for PythonIndexer {
    fn default() -> Self {
        Self::new()
    }
}

impl SemanticIndexer for PythonIndexer {
    fn language(&self) -> &'static str {
        registry::PYTHON
    }

    fn index_file(&self, source: &str, path: &str) -> Vec<Construct> {
        let Some(tree) = self.parse(source) else {
            return Vec::new();
        };
        let root = tree.root_node();
        let has_errors = root.has_error();

        let mut constructs = Vec::new();
        self.extract_block(root, source, path, &[], has_errors, &mut constructs);
        constructs
    }

    /// Recognizes `from M import N [as L]`, `import M [as L]`, and
    /// relative imports (the leading-dot prefix stays in the module
    /// string). `from M import *` is skipped.
    fn extract_imports(&self, source: &str) -> HashMap<String, Import> {
        let mut imports = HashMap::new();
        let Some(tree) = self.parse(source) else {
            return imports;
        };

        let root = tree.root_node();
        let mut cursor = root.walk();
        for child in root.children(&mut cursor) {
            match child.kind() {
                "import_statement" => {
                    let mut names = child.walk();
                    for name_node in child.children_by_field_name("name", &mut names) {
                        match name_node.kind() {
                            "dotted_name" => {
                                let module = node_text(name_node, source).to_string();
                                imports.insert(
                                    module.clone(),
                                    Import {
                                        module: module.clone(),
                                        name: module,
                                    },
                                );
                            }
                            "aliased_import" => {
                                let (Some(name), Some(alias)) = (
                                    name_node.child_by_field_name("name"),
                                    name_node.child_by_field_name("alias"),
                                ) else {
                                    continue;
                                };
                                let module = node_text(name, source).to_string();
                                imports.insert(
                                    node_text(alias, source).to_string(),
                                    Import {
                                        module: module.clone(),
                                        name: module,
                                    },
                                );
                            }
                            _ => {}
                        }
                    }
                }
                "import_from_statement" => {
                    let Some(module_node) = child.child_by_field_name("module_name") else {
                        continue;
                    };
                    let module = node_text(module_node, source).to_string();

                    let mut names = child.walk();
                    for name_node in child.children_by_field_name("name", &mut names) {
                        match name_node.kind() {
                            "dotted_name" => {
                                let name = node_text(name_node, source).to_string();
                                imports.insert(
                                    name.clone(),
                                    Import {
                                        module: module.clone(),
                                        name,
                                    },
                                );
                            }
                            "aliased_import" => {
                                let (Some(name), Some(alias)) = (
                                    name_node.child_by_field_name("name"),
                                    name_node.child_by_field_name("alias"),
                                ) else {
                                    continue;
                                };
                                imports.insert(
                                    node_text(alias, source).to_string(),
                                    Import {
                                        module: module.clone(),
                                        name: node_text(name, source).to_string(),
                                    },
                                );
                            }
                            _ => {}
                        }
                    }
                }
                _ => {}
            }
        }

        imports
    }
}

fn qualify(scope: &[String], name: &str) -> String {
    if scope.is_empty() {
        name.to_string()
    } else {
        format!("{}.{name}", scope.join("."))
    }
}

fn node_text<'s>(node: Node, source: &'s str) -> &'s str {
    &source[node.byte_range()]
}

fn decorator_texts(decorated: Option<Node>, source: &str) -> Vec<String> {
    let Some(decorated) = decorated else {
        return Vec::new();
    };
    let mut cursor = decorated.walk();
    decorated
        .children(&mut cursor)
        .filter(|c| c.kind() == "decorator")
        .map(|c| node_text(c, source).to_string())
        .collect()
}

/// Parameter texts with collapsed whitespace, comma-joined. Defaults and
/// splat forms are kept as written.
fn normalize_params(params_node: Node, source: &str) -> String {
    let mut cursor = params_node.walk();
    params_node
        .children(&mut cursor)
        .filter(|c| PARAM_KINDS.contains(&c.kind()))
        .map(|c| {
            node_text(c, source)
                .split_whitespace()
                .collect::<Vec<_>>()
                .join(" ")
        })
        .collect::<Vec<_>>()
        .join(",")
}

/// Base names as written, in order: identifiers and dotted attributes.
/// Keyword arguments (metaclass=...) are skipped.
fn base_class_names(superclasses: Node, source: &str) -> Vec<String> {
    let mut cursor = superclasses.walk();
    superclasses
        .children(&mut cursor)
        .filter(|c| matches!(c.kind(), "identifier" | "attribute"))
        .map(|c| node_text(c, source).to_string())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn index(source: &str) -> Vec<Construct> {
        PythonIndexer::new().index_file(source, "test.py")
    }

    fn find<'c>(constructs: &'c [Construct], qualname: &str) -> &'c Construct {
        constructs
            .iter()
            .find(|c| c.qualname == qualname)
            .unwrap_or_else(|| panic!("missing construct {qualname}"))
    }

    #[test]
    fn module_variables_and_constants() {
        let constructs = index("MAX_RETRIES = 5\ntimeout = 30\n");

        let max = find(&constructs, "MAX_RETRIES");
        assert_eq!(max.kind, ConstructKind::Variable);
        assert_eq!(max.role, Some(Role::Const));
        assert_eq!(max.start_line, 1);

        let timeout = find(&constructs, "timeout");
        assert_eq!(timeout.role, None);
    }

    #[test]
    fn annotation_changes_interface_not_body() {
        let plain = index("MAX_RETRIES = 5\n");
        let typed = index("MAX_RETRIES: int = 5\n");

        let a = find(&plain, "MAX_RETRIES");
        let b = find(&typed, "MAX_RETRIES");
        assert_ne!(a.interface_hash, b.interface_hash);
        assert_eq!(a.body_hash, b.body_hash);
    }

    #[test]
    fn value_changes_body_not_interface() {
        let five = index("MAX_RETRIES = 5\n");
        let ten = index("MAX_RETRIES = 10\n");

        let a = find(&five, "MAX_RETRIES");
        let b = find(&ten, "MAX_RETRIES");
        assert_eq!(a.interface_hash, b.interface_hash);
        assert_ne!(a.body_hash, b.body_hash);
    }

    #[test]
    fn module_function_extracted() {
        let constructs = index("def helper(x, y=1):\n    return x + y\n");
        let f = find(&constructs, "helper");
        assert_eq!(f.kind, ConstructKind::Function);
    }

    #[test]
    fn class_with_members() {
        let source = "\
class User:
    role = \"member\"
    def validate(self):
        return True
    def _internal(self):
        pass
";
        let constructs = index(source);

        let class = find(&constructs, "User");
        assert_eq!(class.kind, ConstructKind::Class);

        let field = find(&constructs, "User.role");
        assert_eq!(field.kind, ConstructKind::Field);

        let method = find(&constructs, "User.validate");
        assert_eq!(method.kind, ConstructKind::Method);

        let indexer = PythonIndexer::new();
        let members = indexer.get_container_members(source, "test.py", "User", false, None);
        let names: Vec<&str> = members.iter().map(|m| m.qualname.as_str()).collect();
        assert_eq!(names, vec!["User.role", "User.validate"]);

        let all = indexer.get_container_members(source, "test.py", "User", true, None);
        assert_eq!(all.len(), 3);
    }

    #[test]
    fn decorators_widen_span_but_not_definition_line() {
        let source = "\
class Service:
    @staticmethod
    @cached
    def compute():
        return 1
";
        let constructs = index(source);
        let method = find(&constructs, "Service.compute");
        assert_eq!(method.start_line, 2);
        assert_eq!(method.definition_line, 4);
    }

    #[test]
    fn decorator_affects_interface_hash() {
        let plain = index("class A:\n    def m(self):\n        pass\n");
        let decorated = index("class A:\n    @staticmethod\n    def m(self):\n        pass\n");
        let a = find(&plain, "A.m");
        let b = find(&decorated, "A.m");
        assert_ne!(a.interface_hash, b.interface_hash);
        assert_eq!(a.body_hash, b.body_hash);
    }

    #[test]
    fn comment_and_whitespace_invariance() {
        let original = "def f(x):\n    return x * 2\n";
        let commented = "def f(x):\n    # doubled\n    return x  *  2\n";
        let a = index(original);
        let b = index(commented);
        assert_eq!(find(&a, "f").body_hash, find(&b, "f").body_hash);
        assert_eq!(find(&a, "f").interface_hash, find(&b, "f").interface_hash);
    }

    #[test]
    fn rename_keeps_body_hash() {
        let a = index("def original(x):\n    return x + 1\n");
        let b = index("def renamed(x):\n    return x + 1\n");
        assert_eq!(find(&a, "original").body_hash, find(&b, "renamed").body_hash);
        assert_eq!(
            find(&a, "original").interface_hash,
            find(&b, "renamed").interface_hash
        );
    }

    #[test]
    fn enum_detection_from_bases() {
        let constructs = index("from enum import Enum\nclass Color(Enum):\n    RED = 1\n");
        let color = find(&constructs, "Color");
        assert_eq!(color.kind, ConstructKind::Enum);

        let red = find(&constructs, "Color.RED");
        assert_eq!(red.kind, ConstructKind::Field);
        assert_eq!(red.role, Some(Role::Const));
    }

    #[test]
    fn base_classes_recorded_in_order() {
        let constructs = index("class Admin(User, Auditable):\n    pass\n");
        let admin = find(&constructs, "Admin");
        assert_eq!(
            admin.base_classes.as_deref(),
            Some(&["User".to_string(), "Auditable".to_string()][..])
        );

        let dotted = index("class Admin(models.User):\n    pass\n");
        assert_eq!(
            find(&dotted, "Admin").base_classes.as_deref(),
            Some(&["models.User".to_string()][..])
        );
    }

    #[test]
    fn nested_class_members_have_dotted_qualnames() {
        let source = "\
class Outer:
    class Inner:
        def helper(self):
            pass
    def top(self):
        pass
";
        let constructs = index(source);
        assert!(constructs.iter().any(|c| c.qualname == "Outer.Inner"));
        assert!(constructs.iter().any(|c| c.qualname == "Outer.Inner.helper"));

        // Direct members of Outer exclude Inner's own members.
        let indexer = PythonIndexer::new();
        let members = indexer.get_container_members(source, "test.py", "Outer", true, None);
        let names: Vec<&str> = members.iter().map(|m| m.qualname.as_str()).collect();
        assert!(names.contains(&"Outer.Inner"));
        assert!(names.contains(&"Outer.top"));
        assert!(!names.contains(&"Outer.Inner.helper"));
    }

    #[test]
    fn find_construct_requires_unique_match() {
        let indexer = PythonIndexer::new();
        let source = "x = 1\n";
        assert!(indexer.find_construct(source, "t.py", "x", None).is_some());
        assert!(indexer.find_construct(source, "t.py", "y", None).is_none());
        assert!(
            indexer
                .find_construct(source, "t.py", "x", Some(ConstructKind::Method))
                .is_none()
        );
    }

    #[test]
    fn parse_errors_flagged() {
        let constructs = index("def broken(:\n    pass\n\nx = 1\n");
        assert!(constructs.iter().all(|c| c.has_parse_error));
    }

    #[test]
    fn imports_extracted() {
        let source = "\
import os
import json as j
from models import User
from models import User as U
from . import sibling
from ..pkg import helper
from typing import *
";
        let imports = PythonIndexer::new().extract_imports(source);

        assert_eq!(imports["os"], Import { module: "os".into(), name: "os".into() });
        assert_eq!(imports["j"], Import { module: "json".into(), name: "json".into() });
        assert_eq!(
            imports["User"],
            Import { module: "models".into(), name: "User".into() }
        );
        assert_eq!(
            imports["U"],
            Import { module: "models".into(), name: "User".into() }
        );
        assert_eq!(
            imports["sibling"],
            Import { module: ".".into(), name: "sibling".into() }
        );
        assert_eq!(
            imports["helper"],
            Import { module: "..pkg".into(), name: "helper".into() }
        );
        // Wildcard import contributes nothing.
        assert!(!imports.values().any(|i| i.name == "*"));
    }

    #[test]
    fn annotated_field_without_value_hashes_sentinel() {
        let with_value = index("class C:\n    count: int = 0\n");
        let without = index("class C:\n    count: int\n");
        let a = find(&with_value, "C.count");
        let b = find(&without, "C.count");
        assert_eq!(a.interface_hash, b.interface_hash);
        assert_ne!(a.body_hash, b.body_hash);
    }
}
