use chrono::{SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use uuid::Uuid;

use crate::semantic::construct::{ConstructKind, Role};

/// Current UTC time as an ISO 8601 string with a `Z` suffix.
pub fn utc_now() -> String {
    Utc::now().to_rfc3339_opts(SecondsFormat::Micros, true)
}

fn generate_id() -> String {
    Uuid::new_v4().to_string()
}

/// Context lines around a subscription. Purely diagnostic; anchors are
/// never consulted when deciding whether a subscription triggered.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Anchor {
    pub context_before: Vec<String>,
    pub lines: Vec<String>,
    pub context_after: Vec<String>,
}

impl Anchor {
    /// Snapshot an anchor from file content. `start_line`/`end_line` are
    /// 1-based inclusive; `context` is the number of lines kept on each
    /// side, clamped to the file.
    pub fn capture(lines: &[String], start_line: u32, end_line: u32, context: usize) -> Self {
        let start_idx = (start_line as usize).saturating_sub(1).min(lines.len());
        let end_idx = (end_line as usize).min(lines.len());

        let before_start = start_idx.saturating_sub(context);
        let after_end = (end_idx + context).min(lines.len());

        Self {
            context_before: lines[before_start..start_idx].to_vec(),
            lines: lines[start_idx..end_idx].to_vec(),
            context_after: lines[end_idx..after_end].to_vec(),
        }
    }
}

/// Fingerprints of one container member, keyed in `baseline_members` by
/// the member's relative id (qualname suffix after the container's
/// qualname plus dot).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MemberFingerprint {
    pub kind: ConstructKind,
    pub interface_hash: String,
    pub body_hash: String,
}

/// Semantic identity of a watched construct. Located by fingerprints,
/// not line numbers, so it survives edits and relocations.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SemanticTarget {
    pub language: String,
    pub kind: ConstructKind,
    pub qualname: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub role: Option<Role>,
    pub interface_hash: String,
    pub body_hash: String,
    #[serde(default = "default_fingerprint_version")]
    pub fingerprint_version: u32,
    #[serde(default)]
    pub include_members: bool,
    #[serde(default)]
    pub include_private: bool,
    #[serde(default)]
    pub track_decorators: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub baseline_members: Option<BTreeMap<String, MemberFingerprint>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub baseline_container_qualname: Option<String>,
}

fn default_fingerprint_version() -> u32 {
    1
}

/// A subscription to a file line range, optionally backed by a semantic
/// target.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Subscription {
    pub id: String,
    /// Repo-relative, forward-slash path.
    pub path: String,
    /// 1-based inclusive.
    pub start_line: u32,
    /// 1-based inclusive.
    pub end_line: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub anchors: Option<Anchor>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub semantic: Option<SemanticTarget>,
    #[serde(default = "default_true")]
    pub active: bool,
    #[serde(default)]
    pub trigger_on_duplicate: bool,
    #[serde(default)]
    pub created_at: String,
    #[serde(default)]
    pub updated_at: String,
}

fn default_true() -> bool {
    true
}

impl Subscription {
    /// New subscription with a generated id and fresh timestamps.
    /// Optional fields are filled in by the caller.
    pub fn create(path: impl Into<String>, start_line: u32, end_line: u32) -> Self {
        let now = utc_now();
        Self {
            id: generate_id(),
            path: path.into(),
            start_line,
            end_line,
            label: None,
            description: None,
            anchors: None,
            semantic: None,
            active: true,
            trigger_on_duplicate: false,
            created_at: now.clone(),
            updated_at: now,
        }
    }
}

/// Repository-level configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RepoConfig {
    pub baseline_ref: String,
    #[serde(default)]
    pub created_at: String,
    #[serde(default)]
    pub updated_at: String,
}

/// Full persisted configuration: repo config plus subscriptions.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Config {
    pub schema_version: u32,
    pub repo: RepoConfig,
    #[serde(default)]
    pub subscriptions: Vec<Subscription>,
}

impl Config {
    pub fn create(baseline_ref: impl Into<String>) -> Self {
        let now = utc_now();
        Self {
            schema_version: crate::store::SCHEMA_VERSION,
            repo: RepoConfig {
                baseline_ref: baseline_ref.into(),
                created_at: now.clone(),
                updated_at: now,
            },
            subscriptions: Vec::new(),
        }
    }
}

/// A single hunk from a unified diff. When `old_count` is 0 the hunk is
/// a pure insertion and `old_start` names the line *after* which new
/// content appears.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Hunk {
    pub old_start: u32,
    pub old_count: u32,
    pub new_start: u32,
    pub new_count: u32,
}

/// Diff information for a single file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileDiff {
    pub old_path: String,
    pub new_path: String,
    /// Sorted ascending by `old_start`.
    pub hunks: Vec<Hunk>,
    pub is_rename: bool,
    pub is_new_file: bool,
    pub is_deleted_file: bool,
}

/// Why a subscription triggered or a proposal was emitted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Reason {
    OverlapHunk,
    InsertInsideRange,
    FileDeleted,
    FileNotFound,
    Rename,
    LineShift,
    InterfaceChanged,
    BodyChanged,
    SemanticLocation,
    MovedCrossFile,
    DuplicateFound,
    UnsupportedLanguage,
    SemanticTargetMissing,
    InheritedMemberChanged,
    ContainerRenamed,
    ContainerInterfaceChanged,
    MemberAdded,
    MemberRemoved,
    MemberInterfaceChanged,
    MemberBodyChanged,
    ParentDeleted,
    ParentInterfaceChanged,
}

impl Reason {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::OverlapHunk => "overlap_hunk",
            Self::InsertInsideRange => "insert_inside_range",
            Self::FileDeleted => "file_deleted",
            Self::FileNotFound => "file_not_found",
            Self::Rename => "rename",
            Self::LineShift => "line_shift",
            Self::InterfaceChanged => "interface_changed",
            Self::BodyChanged => "body_changed",
            Self::SemanticLocation => "semantic_location",
            Self::MovedCrossFile => "moved_cross_file",
            Self::DuplicateFound => "duplicate_found",
            Self::UnsupportedLanguage => "unsupported_language",
            Self::SemanticTargetMissing => "semantic_target_missing",
            Self::InheritedMemberChanged => "inherited_member_changed",
            Self::ContainerRenamed => "container_renamed",
            Self::ContainerInterfaceChanged => "container_interface_changed",
            Self::MemberAdded => "member_added",
            Self::MemberRemoved => "member_removed",
            Self::MemberInterfaceChanged => "member_interface_changed",
            Self::MemberBodyChanged => "member_body_changed",
            Self::ParentDeleted => "parent_deleted",
            Self::ParentInterfaceChanged => "parent_interface_changed",
        }
    }
}

impl fmt::Display for Reason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Classification of a detected change.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ChangeType {
    Structural,
    Content,
    Missing,
    Ambiguous,
    Aggregate,
    Added,
}

impl fmt::Display for ChangeType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Structural => "STRUCTURAL",
            Self::Content => "CONTENT",
            Self::Missing => "MISSING",
            Self::Ambiguous => "AMBIGUOUS",
            Self::Aggregate => "AGGREGATE",
            Self::Added => "ADDED",
        };
        f.write_str(s)
    }
}

/// Proposal confidence. Stage 1/2 matches are always high; only the
/// cross-file stage downgrades.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Confidence {
    High,
    Medium,
    Low,
}

/// A change to one container member, reported inside an AGGREGATE
/// trigger.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MemberChange {
    /// None for container-level entries (e.g. decorator changes).
    pub relative_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub qualname: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub baseline_qualname: Option<String>,
    pub kind: ConstructKind,
    pub change_type: ChangeType,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<Reason>,
}

/// Container-level changes inside an AGGREGATE trigger.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ContainerChanges {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub renamed: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub old_qualname: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub new_qualname: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub interface_changed: Option<bool>,
}

impl ContainerChanges {
    pub fn is_empty(&self) -> bool {
        self.renamed.is_none() && self.interface_changed.is_none()
    }
}

/// One inherited change propagated from an ancestor class.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InheritedChange {
    /// None when the ancestor class itself changed or disappeared.
    pub member_name: Option<String>,
    pub change_type: ChangeType,
    pub qualname: String,
    pub reason: Reason,
    pub parent_path: String,
    pub parent_qualname: String,
}

/// One ancestor in a materialized inheritance chain.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChainRef {
    pub path: String,
    pub qualname: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AggregateDetails {
    pub container_qualname: String,
    pub baseline_container_qualname: String,
    pub parent_subscription_id: String,
    pub container_changes: ContainerChanges,
    pub member_changes: Vec<MemberChange>,
    pub members_added: Vec<String>,
    pub members_removed: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub inherited_changes: Option<Vec<InheritedChange>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub inheritance_chain: Option<Vec<ChainRef>>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InheritedDetails {
    /// Always the literal "inherited".
    pub source: String,
    pub inherited_changes: Vec<InheritedChange>,
    pub inheritance_chain: Vec<ChainRef>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AmbiguousDetails {
    /// "path:line" per candidate when duplicates were found.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub locations: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Reason-dependent payload of a trigger. Shape is keyed by the
/// trigger's change_type / primary reason rather than a free-form map.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum TriggerDetails {
    Aggregate(AggregateDetails),
    Inherited(InheritedDetails),
    Ambiguous(AmbiguousDetails),
}

/// A subscription that was semantically affected.
#[derive(Debug, Clone, PartialEq)]
pub struct Trigger {
    pub subscription: Subscription,
    pub path: String,
    pub start_line: u32,
    pub end_line: u32,
    pub reasons: Vec<Reason>,
    pub matching_hunks: Vec<Hunk>,
    pub change_type: Option<ChangeType>,
    pub details: Option<TriggerDetails>,
}

impl Trigger {
    /// A plain line-based trigger (no change classification).
    pub fn lines(sub: &Subscription, reasons: Vec<Reason>, matching_hunks: Vec<Hunk>) -> Self {
        Self {
            subscription: sub.clone(),
            path: sub.path.clone(),
            start_line: sub.start_line,
            end_line: sub.end_line,
            reasons,
            matching_hunks,
            change_type: None,
            details: None,
        }
    }

    /// A classified semantic trigger anchored at the subscription's
    /// recorded location.
    pub fn semantic(sub: &Subscription, reason: Reason, change_type: ChangeType) -> Self {
        Self {
            subscription: sub.clone(),
            path: sub.path.clone(),
            start_line: sub.start_line,
            end_line: sub.end_line,
            reasons: vec![reason],
            matching_hunks: Vec::new(),
            change_type: Some(change_type),
            details: None,
        }
    }
}

/// A proposed, reviewable location update for a subscription.
#[derive(Debug, Clone, PartialEq)]
pub struct Proposal {
    pub subscription: Subscription,
    pub old_path: String,
    pub old_start: u32,
    pub old_end: u32,
    pub new_path: String,
    pub new_start: u32,
    pub new_end: u32,
    pub reasons: Vec<Reason>,
    pub confidence: Confidence,
    pub shift: Option<i64>,
    pub new_qualname: Option<String>,
    pub new_kind: Option<ConstructKind>,
}

/// Result of one scan.
#[derive(Debug, Clone)]
pub struct ScanResult {
    pub base_ref: String,
    /// The literal "WORKING" when the right-hand side is the working tree.
    pub target_ref: String,
    pub triggers: Vec<Trigger>,
    pub proposals: Vec<Proposal>,
    pub unchanged: Vec<Subscription>,
}

/// A registered project (git repository with subwatch initialized).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Project {
    pub id: String,
    pub name: String,
    /// Absolute path to the repository root.
    pub path: String,
    #[serde(default)]
    pub created_at: String,
    #[serde(default)]
    pub updated_at: String,
}

impl Project {
    pub fn create(name: impl Into<String>, path: impl Into<String>) -> Self {
        let now = utc_now();
        Self {
            id: generate_id(),
            name: name.into(),
            path: path.into(),
            created_at: now.clone(),
            updated_at: now,
        }
    }
}

/// A persisted scan result.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScanRecord {
    pub id: String,
    pub project_id: String,
    pub base_ref: String,
    pub target_ref: String,
    pub trigger_count: usize,
    pub proposal_count: usize,
    pub unchanged_count: usize,
    pub created_at: String,
    /// Full update document for the scan.
    pub scan_result: serde_json::Value,
}

impl ScanRecord {
    pub fn new(project_id: impl Into<String>, scan_result: serde_json::Value) -> Self {
        Self {
            id: generate_id(),
            project_id: project_id.into(),
            base_ref: scan_result["base_ref"].as_str().unwrap_or_default().to_string(),
            target_ref: scan_result["target_ref"].as_str().unwrap_or_default().to_string(),
            trigger_count: scan_result["triggers"].as_array().map_or(0, Vec::len),
            proposal_count: scan_result["proposals"].as_array().map_or(0, Vec::len),
            unchanged_count: 0,
            created_at: utc_now(),
            scan_result,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn lines(text: &str) -> Vec<String> {
        text.lines().map(String::from).collect()
    }

    #[test]
    fn anchor_capture_clamps_to_file() {
        let file = lines("a\nb\nc\nd\ne");
        let anchor = Anchor::capture(&file, 2, 3, 2);
        assert_eq!(anchor.context_before, vec!["a"]);
        assert_eq!(anchor.lines, vec!["b", "c"]);
        assert_eq!(anchor.context_after, vec!["d", "e"]);

        let anchor = Anchor::capture(&file, 1, 5, 2);
        assert!(anchor.context_before.is_empty());
        assert_eq!(anchor.lines.len(), 5);
        assert!(anchor.context_after.is_empty());
    }

    #[test]
    fn subscription_roundtrip() {
        let mut sub = Subscription::create("src/config.py", 3, 7);
        sub.label = Some("retries".into());
        sub.anchors = Some(Anchor {
            context_before: vec!["import os".into()],
            lines: vec!["MAX_RETRIES = 5".into()],
            context_after: vec![],
        });

        let json = serde_json::to_string(&sub).unwrap();
        let back: Subscription = serde_json::from_str(&json).unwrap();
        assert_eq!(sub, back);
    }

    #[test]
    fn subscription_defaults_on_load() {
        let json = r#"{
            "id": "abc",
            "path": "a.py",
            "start_line": 1,
            "end_line": 2
        }"#;
        let sub: Subscription = serde_json::from_str(json).unwrap();
        assert!(sub.active);
        assert!(!sub.trigger_on_duplicate);
        assert!(sub.semantic.is_none());
    }

    #[test]
    fn reason_serializes_snake_case() {
        assert_eq!(
            serde_json::to_string(&Reason::InsertInsideRange).unwrap(),
            "\"insert_inside_range\""
        );
        assert_eq!(
            serde_json::to_string(&ChangeType::Structural).unwrap(),
            "\"STRUCTURAL\""
        );
        assert_eq!(serde_json::to_string(&Confidence::High).unwrap(), "\"high\"");
    }

    #[test]
    fn semantic_target_fingerprint_version_defaults() {
        let json = r#"{
            "language": "python",
            "kind": "variable",
            "qualname": "MAX_RETRIES",
            "interface_hash": "aa",
            "body_hash": "bb"
        }"#;
        let target: SemanticTarget = serde_json::from_str(json).unwrap();
        assert_eq!(target.fingerprint_version, 1);
        assert!(!target.include_members);
    }
}
