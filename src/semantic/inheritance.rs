use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};

use super::construct::{Construct, ConstructKind};
use super::registry::JAVA;
use super::{Import, SemanticIndexer};

/// Depth cap on ancestor chains.
pub const MAX_INHERITANCE_DEPTH: usize = 10;

/// One ancestor in an inheritance chain.
#[derive(Debug, Clone)]
pub struct ChainEntry {
    pub path: String,
    pub qualname: String,
    pub construct: Construct,
}

/// Resolves inheritance relationships across files.
///
/// Works on demand: only the files needed to walk a chain are read and
/// indexed, never the whole import graph. Ancestor files are resolved
/// through the importing file's import table and read from the working
/// tree under the repo root.
pub struct InheritanceResolver {
    repo_root: PathBuf,
    language: &'static str,
    indexer: &'static dyn SemanticIndexer,

    constructs_by_path: HashMap<String, Vec<Construct>>,
    /// (path, qualname) -> container construct.
    class_lookup: HashMap<(String, String), Construct>,
    /// path -> local name -> (resolved file path, original name).
    import_map: HashMap<String, HashMap<String, (String, String)>>,
    source_cache: HashMap<String, String>,
}

impl InheritanceResolver {
    pub fn new(
        repo_root: impl Into<PathBuf>,
        language: &'static str,
        indexer: &'static dyn SemanticIndexer,
    ) -> Self {
        Self {
            repo_root: repo_root.into(),
            language,
            indexer,
            constructs_by_path: HashMap::new(),
            class_lookup: HashMap::new(),
            import_map: HashMap::new(),
            source_cache: HashMap::new(),
        }
    }

    /// Register a file's constructs (and optionally its source, needed
    /// for import parsing).
    pub fn add_file(&mut self, path: &str, constructs: &[Construct], source: Option<&str>) {
        for c in constructs {
            if matches!(
                c.kind,
                ConstructKind::Class | ConstructKind::Interface | ConstructKind::Enum
            ) {
                self.class_lookup
                    .insert((path.to_string(), c.qualname.clone()), c.clone());
            }
        }
        self.constructs_by_path
            .insert(path.to_string(), constructs.to_vec());

        if let Some(source) = source {
            self.source_cache.insert(path.to_string(), source.to_string());
        }
    }

    /// Full ancestor chain for a class, immediate parents first, each
    /// parent's own ancestors following it. Cycles are cut by a visited
    /// set; depth is capped.
    pub fn get_inheritance_chain(&mut self, path: &str, qualname: &str) -> Vec<ChainEntry> {
        let mut chain = Vec::new();
        let mut visited = HashSet::new();
        self.build_chain(path, qualname, &mut chain, &mut visited, 0);
        chain
    }

    fn build_chain(
        &mut self,
        path: &str,
        qualname: &str,
        chain: &mut Vec<ChainEntry>,
        visited: &mut HashSet<(String, String)>,
        depth: usize,
    ) {
        if depth >= MAX_INHERITANCE_DEPTH {
            return;
        }

        let Some(construct) = self.class_lookup.get(&(path.to_string(), qualname.to_string()))
        else {
            return;
        };
        let Some(base_classes) = construct.base_classes.clone() else {
            return;
        };

        self.ensure_imports_parsed(path);

        for base_name in &base_classes {
            let Some((resolved_path, resolved_qualname, resolved)) =
                self.resolve_base_class(path, base_name)
            else {
                continue; // stdlib / third-party / unresolved
            };

            let key = (resolved_path.clone(), resolved_qualname.clone());
            if !visited.insert(key) {
                continue;
            }

            chain.push(ChainEntry {
                path: resolved_path.clone(),
                qualname: resolved_qualname.clone(),
                construct: resolved,
            });

            self.build_chain(&resolved_path, &resolved_qualname, chain, visited, depth + 1);
        }
    }

    fn ensure_imports_parsed(&mut self, path: &str) {
        if self.import_map.contains_key(path) {
            return;
        }

        let raw: HashMap<String, Import> = match self.source_cache.get(path) {
            Some(source) => self.indexer.extract_imports(source),
            None => HashMap::new(),
        };

        let mut resolved = HashMap::new();
        for (local_name, import) in raw {
            if let Some(file_path) = self.resolve_module_path(&import.module, path) {
                resolved.insert(local_name, (file_path, import.name));
            }
        }

        self.import_map.insert(path.to_string(), resolved);
    }

    /// Resolve a base name as written in source to its defining file and
    /// qualname. Same-file definitions win; then the import table, with
    /// dotted names resolved through their first segment.
    fn resolve_base_class(
        &mut self,
        from_path: &str,
        base_name: &str,
    ) -> Option<(String, String, Construct)> {
        let local_key = (from_path.to_string(), base_name.to_string());
        if let Some(c) = self.class_lookup.get(&local_key) {
            return Some((from_path.to_string(), base_name.to_string(), c.clone()));
        }

        if let Some((module_alias, remainder)) = base_name.split_once('.') {
            let target = self
                .import_map
                .get(from_path)
                .and_then(|m| m.get(module_alias))
                .map(|(p, _)| p.clone());
            if let Some(module_path) = target {
                self.ensure_file_indexed(&module_path);
                let key = (module_path.clone(), remainder.to_string());
                if let Some(c) = self.class_lookup.get(&key) {
                    return Some((module_path, remainder.to_string(), c.clone()));
                }
            }
        }

        let target = self
            .import_map
            .get(from_path)
            .and_then(|m| m.get(base_name))
            .cloned();
        if let Some((module_path, original_name)) = target {
            self.ensure_file_indexed(&module_path);
            let key = (module_path.clone(), original_name.clone());
            if let Some(c) = self.class_lookup.get(&key) {
                return Some((module_path, original_name, c.clone()));
            }
        }

        None
    }

    fn ensure_file_indexed(&mut self, path: &str) {
        if self.constructs_by_path.contains_key(path) {
            return;
        }

        let full_path = self.repo_root.join(path);
        let Ok(source) = std::fs::read_to_string(&full_path) else {
            return;
        };
        let constructs = self.indexer.index_file(&source, path);
        self.add_file(path, &constructs, Some(&source));
    }

    fn resolve_module_path(&self, module: &str, from_path: &str) -> Option<String> {
        if self.language == JAVA {
            self.resolve_java_import(module)
        } else {
            self.resolve_python_import(module, from_path)
        }
    }

    /// Python: dotted module to `m/o/d.py` or `m/o/d/__init__.py`;
    /// leading dots climb from the importing file's directory.
    fn resolve_python_import(&self, module: &str, from_path: &str) -> Option<String> {
        if module.starts_with('.') {
            let dots = module.chars().take_while(|&c| c == '.').count();
            let remainder = &module[dots..];

            let mut dir = Path::new(from_path).parent().unwrap_or(Path::new(""));
            for _ in 0..dots.saturating_sub(1) {
                dir = dir.parent().unwrap_or(Path::new(""));
            }

            let candidate = if remainder.is_empty() {
                dir.to_path_buf()
            } else {
                dir.join(remainder.replace('.', "/"))
            };

            let py_path = format!("{}.py", candidate.display());
            if self.repo_root.join(&py_path).exists() {
                return Some(py_path);
            }
            let init_path = candidate.join("__init__.py").display().to_string();
            if self.repo_root.join(&init_path).exists() {
                return Some(init_path);
            }
            return None;
        }

        let slashed = module.replace('.', "/");
        let candidate = format!("{slashed}.py");
        if self.repo_root.join(&candidate).exists() {
            return Some(candidate);
        }
        let candidate = format!("{slashed}/__init__.py");
        if self.repo_root.join(&candidate).exists() {
            return Some(candidate);
        }

        None
    }

    /// Java: `com.example.User` to `com/example/User.java`, probed under
    /// the common source roots.
    fn resolve_java_import(&self, full_import: &str) -> Option<String> {
        let slashed = format!("{}.java", full_import.replace('.', "/"));
        for src_root in ["", "src/", "src/main/java/"] {
            let candidate = format!("{src_root}{slashed}");
            if self.repo_root.join(&candidate).exists() {
                return Some(candidate);
            }
        }
        None
    }
}

/// Member ids a container defines directly, used as the override mask
/// when walking a chain. Python methods key by bare name; Java methods
/// key by `name(params)`, so overloads are siblings rather than
/// overrides.
pub fn overridden_member_ids(members: &[Construct], container_qualname: &str) -> HashSet<String> {
    members
        .iter()
        .filter_map(|c| c.relative_id(container_qualname))
        .map(String::from)
        .collect()
}
