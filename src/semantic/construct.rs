use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::errors::Error;

/// Kind of a parsed construct.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConstructKind {
    Variable,
    Function,
    Field,
    Method,
    Class,
    Interface,
    Enum,
}

impl ConstructKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Variable => "variable",
            Self::Function => "function",
            Self::Field => "field",
            Self::Method => "method",
            Self::Class => "class",
            Self::Interface => "interface",
            Self::Enum => "enum",
        }
    }

    /// Whether this kind may carry a container subscription for the
    /// given language. Python interfaces don't exist; Java tracks
    /// interfaces as containers.
    pub fn is_container(self, language: &str) -> bool {
        match language {
            "python" => matches!(self, Self::Class | Self::Enum),
            "java" => matches!(self, Self::Class | Self::Interface | Self::Enum),
            _ => false,
        }
    }
}

impl fmt::Display for ConstructKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ConstructKind {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "variable" => Ok(Self::Variable),
            "function" => Ok(Self::Function),
            "field" => Ok(Self::Field),
            "method" => Ok(Self::Method),
            "class" => Ok(Self::Class),
            "interface" => Ok(Self::Interface),
            "enum" => Ok(Self::Enum),
            other => Err(Error::InvalidLocation {
                location: other.to_string(),
                reason: "unknown construct kind".to_string(),
            }),
        }
    }
}

/// Role modifier on a construct. Only constants carry one today.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Const,
}

/// A parsed code construct: a semantic unit extracted from source, used
/// for subscriptions that track code by identity rather than line
/// numbers. Constructs are derived per parse and never mutated.
///
/// `qualname` is dotted ("User.role"); Java methods append a parenthesized
/// parameter type list for overload distinction ("Calculator.add(int,int)").
/// `start_line` includes attached decorators/annotations while
/// `definition_line` points at the bare `class`/`def`/declaration keyword.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Construct {
    pub path: String,
    pub kind: ConstructKind,
    pub qualname: String,
    pub role: Option<Role>,
    pub start_line: u32,
    pub end_line: u32,
    pub definition_line: u32,
    pub interface_hash: String,
    pub body_hash: String,
    /// Base class/interface names as written in source, in declaration
    /// order. Absent for non-containers and for containers without bases.
    pub base_classes: Option<Vec<String>>,
    pub has_parse_error: bool,
}

impl Construct {
    /// The member id of this construct relative to `container_qualname`,
    /// or None if it is not a direct member (nested members have a
    /// further dot in the suffix).
    pub fn relative_id(&self, container_qualname: &str) -> Option<&str> {
        let suffix = self
            .qualname
            .strip_prefix(container_qualname)?
            .strip_prefix('.')?;
        if suffix.contains('.') {
            return None;
        }
        Some(suffix)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kind_parsing() {
        assert_eq!("method".parse::<ConstructKind>().unwrap(), ConstructKind::Method);
        assert!("widget".parse::<ConstructKind>().is_err());
    }

    #[test]
    fn container_kinds_per_language() {
        assert!(ConstructKind::Class.is_container("python"));
        assert!(ConstructKind::Enum.is_container("python"));
        assert!(!ConstructKind::Interface.is_container("python"));
        assert!(ConstructKind::Interface.is_container("java"));
        assert!(!ConstructKind::Method.is_container("java"));
    }

    #[test]
    fn relative_ids() {
        let c = Construct {
            path: "models.py".into(),
            kind: ConstructKind::Method,
            qualname: "User.validate".into(),
            role: None,
            start_line: 10,
            end_line: 12,
            definition_line: 10,
            interface_hash: "aa".into(),
            body_hash: "bb".into(),
            base_classes: None,
            has_parse_error: false,
        };
        assert_eq!(c.relative_id("User"), Some("validate"));
        assert_eq!(c.relative_id("Use"), None);
        assert_eq!(c.relative_id("Other"), None);

        let nested = Construct {
            qualname: "User.Inner.helper".into(),
            ..c
        };
        assert_eq!(nested.relative_id("User"), None);
        assert_eq!(nested.relative_id("User.Inner"), Some("helper"));
    }
}
