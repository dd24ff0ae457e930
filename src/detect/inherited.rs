use std::collections::BTreeMap;

use super::Scan;
use crate::models::{
    ChainRef, ChangeType, InheritedChange, InheritedDetails, Reason, Subscription, Trigger,
    TriggerDetails,
};
use crate::semantic::SemanticIndexer;
use crate::semantic::construct::Construct;
use crate::semantic::inheritance::{InheritanceResolver, overridden_member_ids};

/// A change detected in one ancestor between base and target.
struct ParentChange {
    /// None when the ancestor class itself changed or disappeared.
    member_name: Option<String>,
    change_type: ChangeType,
    qualname: String,
    reason: Reason,
}

impl<'a> Scan<'a> {
    /// Propagate ancestor changes to a class-kind subscription.
    ///
    /// Walks the inheritance chain and reports ancestor member changes
    /// that reach the child: a member is masked once any class closer to
    /// the child (the child itself included) defines it. Python overrides
    /// key by bare name, Java by `name(params)`.
    pub(crate) fn check_inherited(
        &mut self,
        sub: &Subscription,
        indexer: &'static dyn SemanticIndexer,
        current_construct: &Construct,
        new_source: &str,
        new_path: &str,
    ) -> Option<Trigger> {
        let constructs = self.indexed(indexer, new_path, new_source);

        let mut resolver =
            InheritanceResolver::new(self.repo.root(), indexer.language(), indexer);
        resolver.add_file(new_path, &constructs, Some(new_source));

        let chain = resolver.get_inheritance_chain(new_path, &current_construct.qualname);
        if chain.is_empty() {
            return None;
        }

        let child_members = indexer.get_container_members(
            new_source,
            new_path,
            &current_construct.qualname,
            true,
            Some(&constructs),
        );
        let mut overridden_in_chain =
            overridden_member_ids(&child_members, &current_construct.qualname);

        let mut inherited_changes: Vec<InheritedChange> = Vec::new();

        for entry in &chain {
            let parent_changes =
                self.detect_parent_member_changes(indexer, &entry.path, &entry.qualname);

            for change in parent_changes {
                if let Some(member) = &change.member_name {
                    if overridden_in_chain.contains(member) {
                        continue; // masked by the child or an intermediate class
                    }
                }
                inherited_changes.push(InheritedChange {
                    member_name: change.member_name,
                    change_type: change.change_type,
                    qualname: change.qualname,
                    reason: change.reason,
                    parent_path: entry.path.clone(),
                    parent_qualname: entry.qualname.clone(),
                });
            }

            // This ancestor's own members mask grandparent changes for
            // everything below it.
            if let Ok(parent_source) = self.read_target_source(&entry.path) {
                let parent_constructs = self.indexed(indexer, &entry.path, &parent_source);
                let parent_members = indexer.get_container_members(
                    &parent_source,
                    &entry.path,
                    &entry.qualname,
                    true,
                    Some(&parent_constructs),
                );
                overridden_in_chain
                    .extend(overridden_member_ids(&parent_members, &entry.qualname));
            }
        }

        if inherited_changes.is_empty() {
            return None;
        }

        // Ancestor deletion is structural.
        let change_type = if inherited_changes
            .iter()
            .any(|c| matches!(c.change_type, ChangeType::Structural | ChangeType::Missing))
        {
            ChangeType::Structural
        } else {
            ChangeType::Content
        };

        Some(Trigger {
            subscription: sub.clone(),
            path: new_path.to_string(),
            start_line: current_construct.start_line,
            end_line: current_construct.end_line,
            reasons: vec![Reason::InheritedMemberChanged],
            matching_hunks: Vec::new(),
            change_type: Some(change_type),
            details: Some(TriggerDetails::Inherited(InheritedDetails {
                source: "inherited".to_string(),
                inherited_changes,
                inheritance_chain: chain
                    .iter()
                    .map(|e| ChainRef {
                        path: e.path.clone(),
                        qualname: e.qualname.clone(),
                    })
                    .collect(),
            })),
        })
    }

    /// Member-level diff of one ancestor between base_ref and the target
    /// side. An ancestor absent at base contributes nothing; absent at
    /// target it reports as MISSING.
    fn detect_parent_member_changes(
        &mut self,
        indexer: &'static dyn SemanticIndexer,
        parent_path: &str,
        parent_qualname: &str,
    ) -> Vec<ParentChange> {
        let mut changes = Vec::new();

        let Ok(base_lines) = self.repo.show_file(self.base_ref, parent_path) else {
            return changes; // parent didn't exist at base_ref
        };
        let base_source = base_lines.join("\n");
        let base_constructs = indexer.index_file(&base_source, parent_path);

        let Ok(target_source) = self.read_target_source(parent_path) else {
            changes.push(ParentChange {
                member_name: None,
                change_type: ChangeType::Missing,
                qualname: parent_qualname.to_string(),
                reason: Reason::ParentDeleted,
            });
            return changes;
        };
        let target_constructs = self.indexed(indexer, parent_path, &target_source);

        let base_members = direct_members(&base_constructs, parent_qualname);
        let target_members = direct_members(&target_constructs, parent_qualname);

        for (name, base_c) in &base_members {
            match target_members.get(name) {
                None => changes.push(ParentChange {
                    member_name: Some((*name).to_string()),
                    change_type: ChangeType::Missing,
                    qualname: format!("{parent_qualname}.{name}"),
                    reason: Reason::MemberRemoved,
                }),
                Some(target_c) => {
                    if base_c.interface_hash != target_c.interface_hash {
                        changes.push(ParentChange {
                            member_name: Some((*name).to_string()),
                            change_type: ChangeType::Structural,
                            qualname: format!("{parent_qualname}.{name}"),
                            reason: Reason::InterfaceChanged,
                        });
                    } else if base_c.body_hash != target_c.body_hash {
                        changes.push(ParentChange {
                            member_name: Some((*name).to_string()),
                            change_type: ChangeType::Content,
                            qualname: format!("{parent_qualname}.{name}"),
                            reason: Reason::BodyChanged,
                        });
                    }
                }
            }
        }

        // The ancestor class itself: gone entirely, or its signature
        // (bases, decorators) changed.
        let base_parent = base_constructs.iter().find(|c| c.qualname == parent_qualname);
        let target_parent = target_constructs.iter().find(|c| c.qualname == parent_qualname);

        match (base_parent, target_parent) {
            (Some(_), None) => changes.push(ParentChange {
                member_name: None,
                change_type: ChangeType::Missing,
                qualname: parent_qualname.to_string(),
                reason: Reason::ParentDeleted,
            }),
            (Some(base), Some(target)) if base.interface_hash != target.interface_hash => {
                changes.push(ParentChange {
                    member_name: None,
                    change_type: ChangeType::Structural,
                    qualname: parent_qualname.to_string(),
                    reason: Reason::ParentInterfaceChanged,
                });
            }
            _ => {}
        }

        changes
    }
}

/// Direct members of a container keyed by relative id, in stable order.
fn direct_members<'c>(
    constructs: &'c [Construct],
    container_qualname: &str,
) -> BTreeMap<&'c str, &'c Construct> {
    constructs
        .iter()
        .filter_map(|c| Some((c.relative_id(container_qualname)?, c)))
        .collect()
}
