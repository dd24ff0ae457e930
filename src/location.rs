use regex::Regex;
use std::sync::LazyLock;

use crate::errors::{Error, Result};
use crate::semantic::construct::ConstructKind;

static LINE_LOCATION_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^(.+):(\d+)(?:-(\d+))?$").unwrap());

/// A parsed target specification.
///
/// Two grammars:
/// - line-based: `PATH:N` or `PATH:N-M` with `1 <= N <= M`
/// - semantic: `PATH::QUALNAME` or `PATH::KIND:QUALNAME`
#[derive(Debug, Clone, PartialEq)]
pub enum TargetSpec {
    Line {
        path: String,
        start_line: u32,
        end_line: u32,
    },
    Semantic {
        path: String,
        kind: Option<ConstructKind>,
        qualname: String,
    },
}

/// Normalize a path to POSIX style (forward slashes).
pub fn normalize_path(path: &str) -> String {
    path.replace('\\', "/")
}

/// Parse a line-based location into (path, start_line, end_line).
pub fn parse_line_location(location: &str) -> Result<(String, u32, u32)> {
    let caps = LINE_LOCATION_RE.captures(location).ok_or_else(|| Error::InvalidLocation {
        location: location.to_string(),
        reason: "expected format 'path:line' or 'path:start-end'".to_string(),
    })?;

    let path = normalize_path(&caps[1]);
    let start: u32 = caps[2].parse().map_err(|_| Error::InvalidLocation {
        location: location.to_string(),
        reason: "line number out of range".to_string(),
    })?;
    let end: u32 = match caps.get(3) {
        Some(m) => m.as_str().parse().map_err(|_| Error::InvalidLocation {
            location: location.to_string(),
            reason: "line number out of range".to_string(),
        })?,
        None => start,
    };

    if start < 1 {
        return Err(Error::InvalidLineRange {
            start,
            end,
            reason: "start line must be >= 1".to_string(),
        });
    }
    if end < start {
        return Err(Error::InvalidLineRange {
            start,
            end,
            reason: "end line must be >= start line".to_string(),
        });
    }

    Ok((path, start, end))
}

/// Parse either grammar. A `::` separator selects the semantic form.
pub fn parse_target_spec(location: &str) -> Result<TargetSpec> {
    if let Some((path, target)) = location.split_once("::") {
        if path.is_empty() || target.is_empty() {
            return Err(Error::InvalidLocation {
                location: location.to_string(),
                reason: "expected 'path::QualName' or 'path::kind:QualName'".to_string(),
            });
        }

        // KIND:QUALNAME — the kind never contains a dot or parens, so
        // the first colon splits it off unambiguously.
        let (kind, qualname) = match target.split_once(':') {
            Some((kind_str, rest)) => {
                let kind = kind_str.parse::<ConstructKind>().map_err(|_| Error::InvalidLocation {
                    location: location.to_string(),
                    reason: format!("unknown construct kind '{kind_str}'"),
                })?;
                if rest.is_empty() {
                    return Err(Error::InvalidLocation {
                        location: location.to_string(),
                        reason: "missing qualified name".to_string(),
                    });
                }
                (Some(kind), rest.to_string())
            }
            None => (None, target.to_string()),
        };

        return Ok(TargetSpec::Semantic {
            path: normalize_path(path),
            kind,
            qualname,
        });
    }

    let (path, start_line, end_line) = parse_line_location(location)?;
    Ok(TargetSpec::Line {
        path,
        start_line,
        end_line,
    })
}
