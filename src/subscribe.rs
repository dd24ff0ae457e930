use std::collections::BTreeMap;

use crate::errors::{Error, Result};
use crate::git::GitRepo;
use crate::location::{TargetSpec, parse_target_spec};
use crate::models::{Anchor, MemberFingerprint, SemanticTarget, Subscription};
use crate::semantic::construct::Construct;
use crate::semantic::registry;

/// Default number of context lines snapshotted around a subscription.
pub const DEFAULT_ANCHOR_CONTEXT: usize = 2;

/// Options for creating a subscription.
#[derive(Debug, Clone)]
pub struct SubscribeOptions {
    pub label: Option<String>,
    pub description: Option<String>,
    /// Anchor context lines on each side.
    pub context: usize,
    /// Track every direct member of the target container.
    pub include_members: bool,
    /// Include underscore-prefixed members (Python only).
    pub include_private: bool,
    /// Report container decorator/signature changes on member scans.
    pub track_decorators: bool,
    /// Trigger when the target turns up in multiple files.
    pub trigger_on_duplicate: bool,
}

impl Default for SubscribeOptions {
    fn default() -> Self {
        Self {
            label: None,
            description: None,
            context: DEFAULT_ANCHOR_CONTEXT,
            include_members: false,
            include_private: false,
            track_decorators: false,
            trigger_on_duplicate: false,
        }
    }
}

/// Build a subscription from a location spec, validating it against the
/// baseline ref. Semantic targets are located and fingerprinted; for
/// container subscriptions the member baseline is captured here.
pub fn create_subscription(
    repo: &GitRepo,
    baseline: &str,
    location: &str,
    opts: &SubscribeOptions,
) -> Result<Subscription> {
    match parse_target_spec(location)? {
        TargetSpec::Line {
            path,
            start_line,
            end_line,
        } => {
            let lines = repo.show_file(baseline, &path)?;
            if end_line as usize > lines.len() {
                return Err(Error::InvalidLineRange {
                    start: start_line,
                    end: end_line,
                    reason: format!("exceeds file length ({} lines)", lines.len()),
                });
            }

            let mut sub = Subscription::create(path, start_line, end_line);
            sub.label = opts.label.clone();
            sub.description = opts.description.clone();
            sub.trigger_on_duplicate = opts.trigger_on_duplicate;
            sub.anchors = Some(Anchor::capture(&lines, start_line, end_line, opts.context));
            Ok(sub)
        }
        TargetSpec::Semantic {
            path,
            kind,
            qualname,
        } => {
            let lines = repo.show_file(baseline, &path)?;
            let source = lines.join("\n");

            let (language, indexer) = registry::get_indexer_for_path(&path)?;
            let construct = indexer
                .find_construct(&source, &path, &qualname, kind)
                .ok_or_else(|| Error::InvalidLocation {
                    location: location.to_string(),
                    reason: format!("construct '{qualname}' not found"),
                })?;

            let mut baseline_members = None;
            let mut baseline_container_qualname = None;

            if opts.include_members {
                if !construct.kind.is_container(language) {
                    return Err(Error::InvalidLocation {
                        location: location.to_string(),
                        reason: format!(
                            "--include-members requires a container kind; '{}' is a {}",
                            construct.qualname, construct.kind
                        ),
                    });
                }

                baseline_container_qualname = Some(construct.qualname.clone());

                let all = indexer.index_file(&source, &path);
                let members = indexer.get_container_members(
                    &source,
                    &path,
                    &construct.qualname,
                    opts.include_private,
                    Some(&all),
                );
                baseline_members = Some(member_fingerprints(&members, &construct.qualname));
            }

            let mut sub = Subscription::create(path, construct.start_line, construct.end_line);
            sub.label = opts.label.clone();
            sub.description = opts.description.clone();
            sub.trigger_on_duplicate = opts.trigger_on_duplicate;
            sub.anchors = Some(Anchor::capture(
                &lines,
                construct.start_line,
                construct.end_line,
                opts.context,
            ));
            sub.semantic = Some(SemanticTarget {
                language: language.to_string(),
                kind: construct.kind,
                qualname: construct.qualname.clone(),
                role: construct.role,
                interface_hash: construct.interface_hash.clone(),
                body_hash: construct.body_hash.clone(),
                fingerprint_version: 1,
                include_members: opts.include_members,
                include_private: opts.include_private,
                track_decorators: opts.track_decorators,
                baseline_members,
                baseline_container_qualname,
            });
            Ok(sub)
        }
    }
}

/// Member fingerprints keyed by relative id, ready for storage as a
/// container baseline.
pub fn member_fingerprints(
    members: &[Construct],
    container_qualname: &str,
) -> BTreeMap<String, MemberFingerprint> {
    members
        .iter()
        .filter_map(|m| {
            let relative_id = m.relative_id(container_qualname)?;
            Some((
                relative_id.to_string(),
                MemberFingerprint {
                    kind: m.kind,
                    interface_hash: m.interface_hash.clone(),
                    body_hash: m.body_hash.clone(),
                },
            ))
        })
        .collect()
}
