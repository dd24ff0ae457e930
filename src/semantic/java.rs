use std::collections::HashMap;
use tree_sitter::{Language, Node, Parser, Tree};

use super::construct::{Construct, ConstructKind, Role};
use super::fingerprint::{body_hash, interface_hash};
use super::{Import, SemanticIndexer, registry};

/// Extracts constructs from Java source code.
///
/// Covers class/interface/enum declarations (nested included), fields
/// with multi-declarator handling (`int x, y;` yields two constructs
/// sharing the declaration's span), methods and constructors with
/// overload-safe qualnames (`Calculator.add(int,int)`), and enum
/// constants as const fields. Annotations and modifiers both feed the
/// interface hash.
pub struct JavaIndexer {
    language: Language,
}

impl JavaIndexer {
    pub fn new() -> Self {
        Self {
            language: tree_sitter_java::LANGUAGE.into(),
        }
    }

    fn parse(&self, source: &str) -> Option<Tree> {
        let mut parser = Parser::new();
        parser.set_language(&self.language).ok()?;
        parser.parse(source, None)
    }

    fn extract_declaration(
        &self,
        node: Node,
        source: &str,
        path: &str,
        scope: &[String],
        has_errors: bool,
        out: &mut Vec<Construct>,
    ) {
        match node.kind() {
            "class_declaration" => {
                self.extract_type(node, ConstructKind::Class, source, path, scope, has_errors, out)
            }
            "interface_declaration" => self.extract_type(
                node,
                ConstructKind::Interface,
                source,
                path,
                scope,
                has_errors,
                out,
            ),
            "enum_declaration" => self.extract_enum(node, source, path, scope, has_errors, out),
            "field_declaration" => self.extract_field(node, source, path, scope, has_errors, out),
            "method_declaration" => {
                if let Some(c) = self.extract_method(node, source, path, scope, has_errors) {
                    out.push(c);
                }
            }
            "constructor_declaration" => {
                if let Some(c) = self.extract_constructor(node, source, path, scope, has_errors) {
                    out.push(c);
                }
            }
            _ => {}
        }
    }

    #[allow(clippy::too_many_arguments)]
    fn extract_type(
        &self,
        node: Node,
        kind: ConstructKind,
        source: &str,
        path: &str,
        scope: &[String],
        has_errors: bool,
        out: &mut Vec<Construct>,
    ) {
        let Some(name) = declaration_name(node, source) else {
            return;
        };

        let superclass = node.child_by_field_name("superclass");
        let interfaces = node.child_by_field_name("interfaces");

        let mut base_classes = Vec::new();
        if let Some(sc) = superclass {
            extract_type_names(sc, source, &mut base_classes);
        }
        if let Some(ifs) = interfaces {
            extract_type_names(ifs, source, &mut base_classes);
        }

        // "extends Base" / "implements A, B" as written, used as the
        // annotation component of the interface hash.
        let mut parts = Vec::new();
        if let Some(sc) = superclass {
            parts.push(node_text(sc, source));
        }
        if let Some(ifs) = interfaces {
            parts.push(node_text(ifs, source));
        }
        let annotation = (!parts.is_empty()).then(|| parts.join(" "));

        let (modifiers, annotations) = modifiers_and_annotations(node, source);
        let decorators = [modifiers, annotations].concat();

        out.push(Construct {
            path: path.to_string(),
            kind,
            qualname: qualify(scope, &name),
            role: None,
            start_line: node.start_position().row as u32 + 1,
            end_line: node.end_position().row as u32 + 1,
            definition_line: node.start_position().row as u32 + 1,
            interface_hash: interface_hash(kind, annotation.as_deref(), &decorators, None),
            body_hash: body_hash(None, source),
            base_classes: (!base_classes.is_empty()).then_some(base_classes),
            has_parse_error: has_errors,
        });

        if let Some(body) = node.child_by_field_name("body") {
            let mut inner_scope = scope.to_vec();
            inner_scope.push(name);
            let mut cursor = body.walk();
            for child in body.children(&mut cursor) {
                self.extract_declaration(child, source, path, &inner_scope, has_errors, out);
            }
        }
    }

    fn extract_enum(
        &self,
        node: Node,
        source: &str,
        path: &str,
        scope: &[String],
        has_errors: bool,
        out: &mut Vec<Construct>,
    ) {
        let Some(name) = declaration_name(node, source) else {
            return;
        };

        // Enums can implement interfaces but never extend.
        let interfaces = node.child_by_field_name("interfaces");
        let mut base_classes = Vec::new();
        if let Some(ifs) = interfaces {
            extract_type_names(ifs, source, &mut base_classes);
        }
        let annotation = interfaces.map(|n| node_text(n, source));

        let (modifiers, annotations) = modifiers_and_annotations(node, source);
        let decorators = [modifiers, annotations].concat();

        out.push(Construct {
            path: path.to_string(),
            kind: ConstructKind::Enum,
            qualname: qualify(scope, &name),
            role: None,
            start_line: node.start_position().row as u32 + 1,
            end_line: node.end_position().row as u32 + 1,
            definition_line: node.start_position().row as u32 + 1,
            interface_hash: interface_hash(
                ConstructKind::Enum,
                annotation.as_deref(),
                &decorators,
                None,
            ),
            body_hash: body_hash(None, source),
            base_classes: (!base_classes.is_empty()).then_some(base_classes),
            has_parse_error: has_errors,
        });

        let Some(body) = node.child_by_field_name("body") else {
            return;
        };
        let mut inner_scope = scope.to_vec();
        inner_scope.push(name);

        let mut cursor = body.walk();
        for child in body.children(&mut cursor) {
            match child.kind() {
                "enum_constant" => {
                    if let Some(c) =
                        self.extract_enum_constant(child, source, path, &inner_scope, has_errors)
                    {
                        out.push(c);
                    }
                }
                // Methods and fields live inside the declarations block.
                "enum_body_declarations" => {
                    let mut decls = child.walk();
                    for decl in child.children(&mut decls) {
                        self.extract_declaration(
                            decl,
                            source,
                            path,
                            &inner_scope,
                            has_errors,
                            out,
                        );
                    }
                }
                _ => {}
            }
        }
    }

    fn extract_enum_constant(
        &self,
        node: Node,
        source: &str,
        path: &str,
        scope: &[String],
        has_errors: bool,
    ) -> Option<Construct> {
        let name = node_text(node.child_by_field_name("name")?, source);

        let (_, annotations) = modifiers_and_annotations(node, source);
        let arguments = node.child_by_field_name("arguments");

        Some(Construct {
            path: path.to_string(),
            kind: ConstructKind::Field,
            qualname: qualify(scope, name),
            role: Some(Role::Const),
            start_line: node.start_position().row as u32 + 1,
            end_line: node.end_position().row as u32 + 1,
            definition_line: node.start_position().row as u32 + 1,
            interface_hash: interface_hash(ConstructKind::Field, None, &annotations, None),
            body_hash: body_hash(arguments, source),
            base_classes: None,
            has_parse_error: has_errors,
        })
    }

    fn extract_field(
        &self,
        node: Node,
        source: &str,
        path: &str,
        scope: &[String],
        has_errors: bool,
        out: &mut Vec<Construct>,
    ) {
        let type_text = node.child_by_field_name("type").map(|t| node_text(t, source));

        let (modifiers, annotations) = modifiers_and_annotations(node, source);
        let is_const =
            modifiers.iter().any(|m| m == "static") && modifiers.iter().any(|m| m == "final");
        let decorators = [modifiers, annotations].concat();

        // One construct per declarator; all share the declaration's span.
        let mut cursor = node.walk();
        for child in node.children(&mut cursor) {
            if child.kind() != "variable_declarator" {
                continue;
            }
            let Some(name_node) = child.child_by_field_name("name") else {
                continue;
            };
            let name = node_text(name_node, source);
            let value = child.child_by_field_name("value");

            out.push(Construct {
                path: path.to_string(),
                kind: ConstructKind::Field,
                qualname: qualify(scope, name),
                role: is_const.then_some(Role::Const),
                start_line: node.start_position().row as u32 + 1,
                end_line: node.end_position().row as u32 + 1,
                definition_line: node.start_position().row as u32 + 1,
                interface_hash: interface_hash(ConstructKind::Field, type_text, &decorators, None),
                body_hash: body_hash(value, source),
                base_classes: None,
                has_parse_error: has_errors,
            });
        }
    }

    fn extract_method(
        &self,
        node: Node,
        source: &str,
        path: &str,
        scope: &[String],
        has_errors: bool,
    ) -> Option<Construct> {
        let name = declaration_name(node, source)?;

        let params_node = node.child_by_field_name("parameters");
        let param_types = params_node.map(|p| extract_param_types(p, source)).unwrap_or_default();
        let signature = format!("{name}({})", param_types.join(","));

        let return_text = node
            .child_by_field_name("type")
            .map_or("void", |t| node_text(t, source));
        let throws = throws_clause(node, source);

        let annotation = match throws {
            Some(t) => format!("{return_text} {t}"),
            None => return_text.to_string(),
        };

        let (modifiers, annotations) = modifiers_and_annotations(node, source);
        let decorators = [modifiers, annotations].concat();
        let params = param_types.join(",");

        Some(Construct {
            path: path.to_string(),
            kind: ConstructKind::Method,
            qualname: qualify(scope, &signature),
            role: None,
            start_line: node.start_position().row as u32 + 1,
            end_line: node.end_position().row as u32 + 1,
            definition_line: node.start_position().row as u32 + 1,
            interface_hash: interface_hash(
                ConstructKind::Method,
                Some(&annotation),
                &decorators,
                Some(&params),
            ),
            body_hash: body_hash(node.child_by_field_name("body"), source),
            base_classes: None,
            has_parse_error: has_errors,
        })
    }

    fn extract_constructor(
        &self,
        node: Node,
        source: &str,
        path: &str,
        scope: &[String],
        has_errors: bool,
    ) -> Option<Construct> {
        let name = declaration_name(node, source)?;

        let params_node = node.child_by_field_name("parameters");
        let param_types = params_node.map(|p| extract_param_types(p, source)).unwrap_or_default();
        let signature = format!("{name}({})", param_types.join(","));

        let throws = throws_clause(node, source);
        let (modifiers, annotations) = modifiers_and_annotations(node, source);
        let decorators = [modifiers, annotations].concat();
        let params = param_types.join(",");

        Some(Construct {
            path: path.to_string(),
            kind: ConstructKind::Method,
            qualname: qualify(scope, &signature),
            role: None,
            start_line: node.start_position().row as u32 + 1,
            end_line: node.end_position().row as u32 + 1,
            definition_line: node.start_position().row as u32 + 1,
            interface_hash: interface_hash(
                ConstructKind::Method,
                throws.as_deref(),
                &decorators,
                Some(&params),
            ),
            body_hash: body_hash(node.child_by_field_name("body"), source),
            base_classes: None,
            has_parse_error: has_errors,
        })
    }
}

impl Default for JavaIndexer {
    fn default() -> Self {
        Self::new()
    }
}

impl SemanticIndexer for JavaIndexer {
    fn language(&self) -> &'static str {
        registry::JAVA
    }

    fn index_file(&self, source: &str, path: &str) -> Vec<Construct> {
        let Some(tree) = self.parse(source) else {
            return Vec::new();
        };
        let root = tree.root_node();
        let has_errors = root.has_error();

        let mut constructs = Vec::new();
        let mut cursor = root.walk();
        for child in root.children(&mut cursor) {
            self.extract_declaration(child, source, path, &[], has_errors, &mut constructs);
        }
        constructs
    }

    /// Non-wildcard, non-static imports only: `import com.x.Y` maps the
    /// simple name Y to its full package path.
    fn extract_imports(&self, source: &str) -> HashMap<String, Import> {
        let mut imports = HashMap::new();
        let Some(tree) = self.parse(source) else {
            return imports;
        };

        let root = tree.root_node();
        let mut cursor = root.walk();
        for child in root.children(&mut cursor) {
            if child.kind() != "import_declaration" {
                continue;
            }

            let mut is_static = false;
            let mut is_wildcard = false;
            let mut target: Option<Node> = None;

            let mut parts = child.walk();
            for part in child.children(&mut parts) {
                match part.kind() {
                    "static" => is_static = true,
                    "asterisk" => is_wildcard = true,
                    "scoped_identifier" | "identifier" => target = Some(part),
                    _ => {}
                }
            }

            if is_static || is_wildcard {
                continue;
            }
            let Some(target) = target else { continue };

            let full_path = node_text(target, source).to_string();
            let simple_name = full_path.rsplit('.').next().unwrap_or(&full_path).to_string();
            imports.insert(
                simple_name.clone(),
                Import {
                    module: full_path,
                    name: simple_name,
                },
            );
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

fn declaration_name(node: Node, source: &str) -> Option<String> {
    node.child_by_field_name("name")
        .map(|n| node_text(n, source).to_string())
}

/// Split a node's `modifiers` wrapper into plain modifier tokens and
/// annotation texts. Annotations outside the wrapper are also picked up.
fn modifiers_and_annotations(node: Node, source: &str) -> (Vec<String>, Vec<String>) {
    let mut modifiers = Vec::new();
    let mut annotations = Vec::new();

    let mut cursor = node.walk();
    for child in node.children(&mut cursor) {
        match child.kind() {
            "marker_annotation" | "annotation" => {
                annotations.push(node_text(child, source).to_string())
            }
            "modifiers" => {
                let mut mods = child.walk();
                for m in child.children(&mut mods) {
                    match m.kind() {
                        "marker_annotation" | "annotation" => {
                            annotations.push(node_text(m, source).to_string())
                        }
                        _ => {
                            let text = node_text(m, source);
                            if !text.is_empty() {
                                modifiers.push(text.to_string());
                            }
                        }
                    }
                }
            }
            _ => {}
        }
    }

    (modifiers, annotations)
}

/// Parameter types for overload-safe signatures: spaces stripped,
/// generics kept, `...` appended for varargs.
fn extract_param_types(params_node: Node, source: &str) -> Vec<String> {
    let mut types = Vec::new();

    let mut cursor = params_node.walk();
    for child in params_node.children(&mut cursor) {
        match child.kind() {
            "formal_parameter" => {
                if let Some(type_node) = child.child_by_field_name("type") {
                    types.push(node_text(type_node, source).replace(' ', ""));
                }
            }
            "spread_parameter" => {
                let mut inner = child.walk();
                let type_node = child.children(&mut inner).find(|n| {
                    matches!(n.kind(), "type_identifier" | "generic_type" | "array_type")
                });
                if let Some(type_node) = type_node {
                    types.push(format!("{}...", node_text(type_node, source).replace(' ', "")));
                }
            }
            _ => {}
        }
    }

    types
}

fn throws_clause(node: Node, source: &str) -> Option<String> {
    let mut cursor = node.walk();
    node.children(&mut cursor)
        .find(|c| c.kind() == "throws")
        .map(|c| node_text(c, source).to_string())
}

/// Collect type names from superclass / super_interfaces wrappers,
/// stripping generic parameter lists (`List<T>` -> `List`) and keeping
/// scoped identifiers whole.
fn extract_type_names(node: Node, source: &str, out: &mut Vec<String>) {
    match node.kind() {
        "type_identifier" => out.push(node_text(node, source).to_string()),
        "scoped_type_identifier" => out.push(node_text(node, source).to_string()),
        "generic_type" => {
            let mut cursor = node.walk();
            if let Some(inner) = node
                .children(&mut cursor)
                .find(|c| matches!(c.kind(), "type_identifier" | "scoped_type_identifier"))
            {
                out.push(node_text(inner, source).to_string());
            }
        }
        "superclass" | "super_interfaces" | "type_list" => {
            let mut cursor = node.walk();
            for child in node.children(&mut cursor) {
                extract_type_names(child, source, out);
            }
        }
        _ => {}
    }
}
