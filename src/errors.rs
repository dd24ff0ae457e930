use std::path::PathBuf;
use thiserror::Error;

/// Core error type for subwatch.
#[derive(Error, Debug)]
pub enum Error {
    #[error("config not found at {}; run 'subwatch init' first", path.display())]
    ConfigNotFound { path: PathBuf },

    #[error("config already exists at {}; use --force to overwrite", path.display())]
    ConfigExists { path: PathBuf },

    #[error("unsupported schema version {found}; this tool supports version {supported}")]
    InvalidSchemaVersion { found: u32, supported: u32 },

    #[error("subscription not found: {0}")]
    SubscriptionNotFound(String),

    #[error("invalid location '{location}': {reason}")]
    InvalidLocation { location: String, reason: String },

    #[error("invalid line range {start}-{end}: {reason}")]
    InvalidLineRange { start: u32, end: u32, reason: String },

    #[error("file '{path}' not found at ref '{git_ref}'")]
    FileNotFoundAtRef { path: String, git_ref: String },

    #[error("not a git repository: {}", path.display())]
    NotAGitRepo { path: PathBuf },

    #[error("git command failed: {command}\n{stderr}")]
    Git { command: String, stderr: String },

    #[error("project not found: {0}")]
    ProjectNotFound(String),

    #[error("invalid project path '{path}': {reason}")]
    InvalidProjectPath { path: String, reason: String },

    #[error("scan not found: {0}")]
    ScanNotFound(String),

    #[error("unsupported language '{language}' (supported: {supported})")]
    UnsupportedLanguage { language: String, supported: String },

    #[error("I/O error: {context}")]
    Io {
        context: String,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid JSON in {context}")]
    Json {
        context: String,
        #[source]
        source: serde_json::Error,
    },
}

/// Coarse error category; collaborators map these onto CLI exit codes
/// or HTTP status codes (404 lookup, 400 invalid input, 409 conflict,
/// 500 environment/internal).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    Configuration,
    Lookup,
    Environment,
    Capability,
    Internal,
}

impl Error {
    pub fn io(context: impl Into<String>, source: std::io::Error) -> Self {
        Self::Io {
            context: context.into(),
            source,
        }
    }

    pub fn json(context: impl Into<String>, source: serde_json::Error) -> Self {
        Self::Json {
            context: context.into(),
            source,
        }
    }

    pub fn category(&self) -> ErrorCategory {
        match self {
            Self::ConfigNotFound { .. }
            | Self::ConfigExists { .. }
            | Self::InvalidSchemaVersion { .. } => ErrorCategory::Configuration,
            Self::SubscriptionNotFound(_)
            | Self::InvalidLocation { .. }
            | Self::InvalidLineRange { .. }
            | Self::FileNotFoundAtRef { .. }
            | Self::ProjectNotFound(_)
            | Self::InvalidProjectPath { .. }
            | Self::ScanNotFound(_) => ErrorCategory::Lookup,
            Self::NotAGitRepo { .. } | Self::Git { .. } => ErrorCategory::Environment,
            Self::UnsupportedLanguage { .. } => ErrorCategory::Capability,
            Self::Io { .. } | Self::Json { .. } => ErrorCategory::Internal,
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;
