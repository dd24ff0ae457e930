pub mod construct;
pub mod fingerprint;
pub mod inheritance;
pub mod java;
pub mod python;
pub mod registry;

use std::collections::HashMap;

pub use construct::{Construct, ConstructKind, Role};

/// One resolved import: the module (or package path) it came from and
/// the name as exported there.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Import {
    pub module: String,
    pub name: String,
}

/// Language-specific construct extractor.
///
/// Implementations are stateless across calls; a parser is created per
/// parse, so a cached instance can be shared within one thread.
pub trait SemanticIndexer: Send + Sync {
    fn language(&self) -> &'static str;

    /// Extract all constructs from source code.
    fn index_file(&self, source: &str, path: &str) -> Vec<Construct>;

    /// Import table: local name -> (module, original name). Wildcard and
    /// static imports are skipped.
    fn extract_imports(&self, source: &str) -> HashMap<String, Import>;

    /// Find a construct by exact qualname, with an optional kind filter
    /// for disambiguation. Zero or multiple matches yield None.
    fn find_construct(
        &self,
        source: &str,
        path: &str,
        qualname: &str,
        kind: Option<ConstructKind>,
    ) -> Option<Construct> {
        let constructs = self.index_file(source, path);
        find_in(&constructs, qualname, kind).cloned()
    }

    /// All direct members of a container (one qualname level below it).
    /// Nested containers' own members are excluded. Python honors
    /// `include_private` via the underscore-prefix convention; Java
    /// ignores it since visibility modifiers are not interpreted.
    fn get_container_members(
        &self,
        source: &str,
        path: &str,
        container_qualname: &str,
        include_private: bool,
        preindexed: Option<&[Construct]>,
    ) -> Vec<Construct> {
        let owned;
        let constructs = match preindexed {
            Some(c) => c,
            None => {
                owned = self.index_file(source, path);
                &owned
            }
        };

        let filter_private = self.language() == registry::PYTHON && !include_private;
        constructs
            .iter()
            .filter_map(|c| {
                let member_name = c.relative_id(container_qualname)?;
                if filter_private && member_name.starts_with('_') {
                    return None;
                }
                Some(c.clone())
            })
            .collect()
    }
}

/// Exact-qualname lookup over an already-indexed construct list.
/// Zero or multiple matches yield None.
pub fn find_in<'c>(
    constructs: &'c [Construct],
    qualname: &str,
    kind: Option<ConstructKind>,
) -> Option<&'c Construct> {
    let mut matches = constructs
        .iter()
        .filter(|c| c.qualname == qualname)
        .filter(|c| kind.is_none_or(|k| c.kind == k));
    let first = matches.next()?;
    if matches.next().is_some() {
        return None;
    }
    Some(first)
}
