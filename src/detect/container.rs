use std::collections::BTreeMap;

use crate::models::{
    AggregateDetails, ChangeType, ContainerChanges, MemberChange, Reason, SemanticTarget,
    Subscription, Trigger, TriggerDetails,
};
use crate::semantic::construct::Construct;
use crate::semantic::SemanticIndexer;

/// Diff a container subscription's baseline member fingerprints against
/// the container's current members, keyed by relative id so a container
/// rename does not invalidate member bookkeeping.
///
/// Emits one AGGREGATE trigger covering removed, changed, and added
/// members plus container-level rename and (when tracked) decorator
/// changes. Returns None when nothing moved.
pub(crate) fn check_container_members(
    sub: &Subscription,
    semantic: &SemanticTarget,
    indexer: &dyn SemanticIndexer,
    source: &str,
    path: &str,
    current_container: &Construct,
    constructs: &[Construct],
) -> Option<Trigger> {
    let baseline_container_qualname = semantic
        .baseline_container_qualname
        .clone()
        .unwrap_or_else(|| semantic.qualname.clone());
    let current_container_qualname = current_container.qualname.clone();

    let current_members = indexer.get_container_members(
        source,
        path,
        &current_container_qualname,
        semantic.include_private,
        Some(constructs),
    );

    let mut current_by_relative_id: BTreeMap<&str, &Construct> = BTreeMap::new();
    for member in &current_members {
        if let Some(relative_id) = member.relative_id(&current_container_qualname) {
            current_by_relative_id.insert(relative_id, member);
        }
    }

    static EMPTY: BTreeMap<String, crate::models::MemberFingerprint> = BTreeMap::new();
    let baseline_members = semantic.baseline_members.as_ref().unwrap_or(&EMPTY);

    let mut member_changes: Vec<MemberChange> = Vec::new();
    let mut members_added: Vec<String> = Vec::new();
    let mut members_removed: Vec<String> = Vec::new();

    // Removals and fingerprint changes, against the baseline.
    for (relative_id, baseline_fp) in baseline_members {
        match current_by_relative_id.get(relative_id.as_str()) {
            None => {
                members_removed.push(relative_id.clone());
                member_changes.push(MemberChange {
                    relative_id: Some(relative_id.clone()),
                    qualname: None,
                    baseline_qualname: Some(format!("{baseline_container_qualname}.{relative_id}")),
                    kind: baseline_fp.kind,
                    change_type: ChangeType::Missing,
                    reason: Some(Reason::MemberRemoved),
                });
            }
            Some(current) => {
                if baseline_fp.interface_hash != current.interface_hash {
                    member_changes.push(MemberChange {
                        relative_id: Some(relative_id.clone()),
                        qualname: Some(current.qualname.clone()),
                        baseline_qualname: None,
                        kind: current.kind,
                        change_type: ChangeType::Structural,
                        reason: Some(Reason::InterfaceChanged),
                    });
                } else if baseline_fp.body_hash != current.body_hash {
                    member_changes.push(MemberChange {
                        relative_id: Some(relative_id.clone()),
                        qualname: Some(current.qualname.clone()),
                        baseline_qualname: None,
                        kind: current.kind,
                        change_type: ChangeType::Content,
                        reason: Some(Reason::BodyChanged),
                    });
                }
            }
        }
    }

    // Additions.
    for (relative_id, current) in &current_by_relative_id {
        if !baseline_members.contains_key(*relative_id) {
            members_added.push(relative_id.to_string());
            member_changes.push(MemberChange {
                relative_id: Some(relative_id.to_string()),
                qualname: Some(current.qualname.clone()),
                baseline_qualname: None,
                kind: current.kind,
                change_type: ChangeType::Added,
                reason: None,
            });
        }
    }

    // Container-level changes.
    let mut container_changes = ContainerChanges::default();
    if current_container_qualname != baseline_container_qualname {
        container_changes.renamed = Some(true);
        container_changes.old_qualname = Some(baseline_container_qualname.clone());
        container_changes.new_qualname = Some(current_container_qualname.clone());
    }
    if semantic.track_decorators && current_container.interface_hash != semantic.interface_hash {
        container_changes.interface_changed = Some(true);
        member_changes.push(MemberChange {
            relative_id: None,
            qualname: Some(current_container_qualname.clone()),
            baseline_qualname: None,
            kind: semantic.kind,
            change_type: ChangeType::Structural,
            reason: Some(Reason::ContainerInterfaceChanged),
        });
    }

    if member_changes.is_empty() && container_changes.is_empty() {
        return None;
    }

    let mut reasons: Vec<Reason> = Vec::new();
    if container_changes.renamed.is_some() {
        reasons.push(Reason::ContainerRenamed);
    }
    if !members_added.is_empty() {
        reasons.push(Reason::MemberAdded);
    }
    if !members_removed.is_empty() {
        reasons.push(Reason::MemberRemoved);
    }
    if member_changes.iter().any(|c| {
        c.change_type == ChangeType::Structural
            && c.reason != Some(Reason::ContainerInterfaceChanged)
    }) {
        reasons.push(Reason::MemberInterfaceChanged);
    }
    if member_changes.iter().any(|c| c.change_type == ChangeType::Content) {
        reasons.push(Reason::MemberBodyChanged);
    }
    if container_changes.interface_changed.is_some() {
        reasons.push(Reason::ContainerInterfaceChanged);
    }

    Some(Trigger {
        subscription: sub.clone(),
        path: path.to_string(),
        start_line: current_container.start_line,
        end_line: current_container.end_line,
        reasons,
        matching_hunks: Vec::new(),
        change_type: Some(ChangeType::Aggregate),
        details: Some(TriggerDetails::Aggregate(AggregateDetails {
            container_qualname: current_container_qualname,
            baseline_container_qualname,
            parent_subscription_id: sub.id.clone(),
            container_changes,
            member_changes,
            members_added,
            members_removed,
            inherited_changes: None,
            inheritance_chain: None,
        })),
    })
}
