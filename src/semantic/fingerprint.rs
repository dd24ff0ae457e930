use sha2::{Digest, Sha256};
use tree_sitter::Node;

use super::construct::ConstructKind;

/// Marker hashed when a construct has no type annotation.
const NO_ANNOTATION: &str = "<no-annotation>";
/// Marker hashed when a construct has no body or initializer.
const NO_DEFAULT: &str = "<no-default>";

/// Node kinds excluded from body hashing.
const COMMENT_KINDS: &[&str] = &["comment", "line_comment", "block_comment"];

/// Compute the interface hash: rename-resistant signature digest.
///
/// Includes the construct kind, type annotation (return type, declared
/// type, or extends/implements list), decorators sorted lexically, and a
/// pre-normalized parameter list. Excludes the construct name.
pub fn interface_hash(
    kind: ConstructKind,
    annotation: Option<&str>,
    decorators: &[String],
    params: Option<&str>,
) -> String {
    let mut components: Vec<&str> = vec![kind.as_str()];

    components.push(match annotation {
        Some(a) if !a.is_empty() => a,
        _ => NO_ANNOTATION,
    });

    let mut sorted: Vec<&str> = decorators.iter().map(String::as_str).collect();
    sorted.sort_unstable();
    components.extend(sorted);

    if let Some(p) = params {
        components.push(p);
    }

    short_hash(&components)
}

/// Compute the body hash: content digest over the node's leaf tokens,
/// excluding comments and whitespace. Reformatting and comment edits do
/// not change it; any token change does.
pub fn body_hash(node: Option<Node>, source: &str) -> String {
    let Some(node) = node else {
        return short_hash(&[NO_DEFAULT]);
    };

    let mut tokens: Vec<&str> = Vec::new();
    collect_tokens(node, source, &mut tokens);
    short_hash(&tokens)
}

fn collect_tokens<'s>(node: Node, source: &'s str, tokens: &mut Vec<&'s str>) {
    if COMMENT_KINDS.contains(&node.kind()) {
        return;
    }

    if node.child_count() == 0 {
        let text = source[node.byte_range()].trim();
        if !text.is_empty() {
            tokens.push(text);
        }
        return;
    }

    let mut cursor = node.walk();
    for child in node.children(&mut cursor) {
        collect_tokens(child, source, tokens);
    }
}

/// 16-char hex digest of the NUL-joined components.
fn short_hash(components: &[&str]) -> String {
    let mut hasher = Sha256::new();
    for (i, component) in components.iter().enumerate() {
        if i > 0 {
            hasher.update([0u8]);
        }
        hasher.update(component.as_bytes());
    }
    let digest = hasher.finalize();
    let mut hex = String::with_capacity(16);
    for byte in &digest[..8] {
        hex.push_str(&format!("{byte:02x}"));
    }
    hex
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn short_hash_is_16_hex_chars() {
        let h = short_hash(&["variable", "<no-annotation>"]);
        assert_eq!(h.len(), 16);
        assert!(h.chars().all(|c| c.is_ascii_hexdigit()));
    }

    #[test]
    fn component_boundaries_matter() {
        // "ab" + "c" must differ from "a" + "bc".
        assert_ne!(short_hash(&["ab", "c"]), short_hash(&["a", "bc"]));
    }

    #[test]
    fn interface_hash_ignores_decorator_order() {
        let a = interface_hash(
            ConstructKind::Method,
            Some("int"),
            &["@staticmethod".into(), "@cached".into()],
            Some("self,x"),
        );
        let b = interface_hash(
            ConstructKind::Method,
            Some("int"),
            &["@cached".into(), "@staticmethod".into()],
            Some("self,x"),
        );
        assert_eq!(a, b);
    }

    #[test]
    fn interface_hash_depends_on_annotation() {
        let untyped = interface_hash(ConstructKind::Variable, None, &[], None);
        let typed = interface_hash(ConstructKind::Variable, Some("int"), &[], None);
        assert_ne!(untyped, typed);

        // Empty annotation text collapses to the no-annotation marker.
        let empty = interface_hash(ConstructKind::Variable, Some(""), &[], None);
        assert_eq!(untyped, empty);
    }

    #[test]
    fn absent_body_hashes_sentinel() {
        assert_eq!(body_hash(None, ""), short_hash(&[NO_DEFAULT]));
    }
}
