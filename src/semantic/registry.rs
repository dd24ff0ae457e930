use std::path::Path;
use std::sync::LazyLock;

use super::SemanticIndexer;
use super::java::JavaIndexer;
use super::python::PythonIndexer;
use crate::errors::{Error, Result};

pub const PYTHON: &str = "python";
pub const JAVA: &str = "java";

static PYTHON_INDEXER: LazyLock<PythonIndexer> = LazyLock::new(PythonIndexer::new);
static JAVA_INDEXER: LazyLock<JavaIndexer> = LazyLock::new(JavaIndexer::new);

/// Supported language identifiers, sorted.
pub fn supported_languages() -> Vec<&'static str> {
    vec![JAVA, PYTHON]
}

fn unsupported(language: &str) -> Error {
    Error::UnsupportedLanguage {
        language: language.to_string(),
        supported: supported_languages().join(", "),
    }
}

/// Detect the language of a file from its extension.
pub fn detect_language(path: &str) -> Result<&'static str> {
    let ext = Path::new(path)
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_lowercase());

    match ext.as_deref() {
        Some("py") | Some("pyw") => Ok(PYTHON),
        Some("java") => Ok(JAVA),
        Some(other) => Err(unsupported(&format!(".{other}"))),
        None => Err(unsupported("<no extension>")),
    }
}

/// Cached indexer instance for a language. Indexers are stateless across
/// calls; the cache lives for the process.
pub fn get_indexer(language: &str) -> Result<&'static dyn SemanticIndexer> {
    match language {
        PYTHON => Ok(&*PYTHON_INDEXER),
        JAVA => Ok(&*JAVA_INDEXER),
        other => Err(unsupported(other)),
    }
}

/// Language and indexer for a file path.
pub fn get_indexer_for_path(path: &str) -> Result<(&'static str, &'static dyn SemanticIndexer)> {
    let language = detect_language(path)?;
    Ok((language, get_indexer(language)?))
}
