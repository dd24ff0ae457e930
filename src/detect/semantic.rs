use super::Scan;
use super::container::check_container_members;
use crate::models::{
    AmbiguousDetails, ChangeType, Confidence, Proposal, Reason, SemanticTarget, Subscription,
    Trigger, TriggerDetails,
};
use crate::semantic::construct::{Construct, ConstructKind};
use crate::semantic::{SemanticIndexer, registry};

/// Quality of a fingerprint match, best first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub(crate) enum MatchTier {
    /// Same kind, both hashes match.
    Exact,
    /// Same kind and body hash: renamed with a signature change.
    Body,
    /// Same kind and interface hash: renamed with a body change.
    Interface,
    None,
}

impl<'a> Scan<'a> {
    /// Three-stage semantic check: exact qualname at the (possibly
    /// renamed) path, then a hash search in the same file, then a
    /// cross-file hash search over the rest of the diff.
    pub(crate) fn check_semantic(
        &mut self,
        sub: &Subscription,
    ) -> (Option<Trigger>, Option<Proposal>) {
        let Some(semantic) = sub.semantic.clone() else {
            return (None, None);
        };

        // A subscription in a language this build can't index still lets
        // the scan complete: surfaced as an AMBIGUOUS trigger, not an error.
        let indexer = match registry::get_indexer(&semantic.language) {
            Ok(indexer) => indexer,
            Err(e) => {
                let mut trigger =
                    Trigger::semantic(sub, Reason::UnsupportedLanguage, ChangeType::Ambiguous);
                trigger.details = Some(TriggerDetails::Ambiguous(AmbiguousDetails {
                    locations: None,
                    error: Some(e.to_string()),
                }));
                return (Some(trigger), None);
            }
        };

        let old_path = sub.path.clone();
        let new_path = self
            .rename_map
            .get(&old_path)
            .cloned()
            .unwrap_or_else(|| old_path.clone());

        let file_deleted = self.status_map.get(&old_path).is_some_and(|s| s == "D");
        let mut file_read_failed = false;
        let mut new_source: Option<String> = None;

        if !file_deleted {
            match self.read_target_source(&new_path) {
                Ok(source) => new_source = Some(source),
                Err(_) => file_read_failed = true,
            }
        }

        if let Some(source) = new_source.as_deref() {
            // Stage 1: exact qualname at the (possibly renamed) path.
            if let Some(construct) =
                indexer.find_construct(source, &new_path, &semantic.qualname, Some(semantic.kind))
            {
                let trigger =
                    self.classify_at_location(sub, &semantic, indexer, source, &new_path, &construct);

                let proposal = if old_path != new_path {
                    Some(relocation_proposal(
                        sub,
                        &new_path,
                        &construct,
                        vec![Reason::Rename],
                        Confidence::High,
                        &semantic,
                    ))
                } else if construct.start_line != sub.start_line
                    || construct.end_line != sub.end_line
                {
                    Some(relocation_proposal(
                        sub,
                        &new_path,
                        &construct,
                        vec![Reason::LineShift],
                        Confidence::High,
                        &semantic,
                    ))
                } else {
                    None
                };

                return (trigger, proposal);
            }

            // Stage 2: fingerprint search in the same file. Only a unique
            // best-tier match is taken; anything else falls through to the
            // cross-file stage.
            let constructs = self.indexed(indexer, &new_path, source);
            let (matches, _) = find_hash_candidates(&semantic, &constructs);
            if matches.len() == 1 {
                let construct = matches[0].clone();
                let trigger =
                    self.classify_at_location(sub, &semantic, indexer, source, &new_path, &construct);

                let proposal = relocation_proposal(
                    sub,
                    &new_path,
                    &construct,
                    vec![Reason::SemanticLocation],
                    Confidence::High,
                    &semantic,
                );
                return (trigger, Some(proposal));
            }
        }

        // Stage 3: cross-file hash search, attempted even when the
        // original file is gone.
        let (cross_matches, tier) = self.search_cross_file(&semantic, indexer, &old_path, &new_path);

        if let [(found_path, construct)] = cross_matches.as_slice() {
            let (found_path, construct) = (found_path.clone(), construct.clone());
            let found_source = self.read_target_source(&found_path).unwrap_or_default();

            let trigger = self.classify_at_location(
                sub,
                &semantic,
                indexer,
                &found_source,
                &found_path,
                &construct,
            );

            let confidence = match tier {
                MatchTier::Exact => Confidence::High,
                MatchTier::Body => Confidence::Medium,
                _ => Confidence::Low,
            };

            let proposal = relocation_proposal(
                sub,
                &found_path,
                &construct,
                vec![Reason::MovedCrossFile],
                confidence,
                &semantic,
            );
            return (trigger, Some(proposal));
        }

        if cross_matches.len() > 1 {
            if sub.trigger_on_duplicate {
                let locations: Vec<String> = cross_matches
                    .iter()
                    .map(|(path, c)| format!("{path}:{}", c.start_line))
                    .collect();
                let mut trigger =
                    Trigger::semantic(sub, Reason::DuplicateFound, ChangeType::Ambiguous);
                trigger.details = Some(TriggerDetails::Ambiguous(AmbiguousDetails {
                    locations: Some(locations),
                    error: None,
                }));
                return (Some(trigger), None);
            }
            // Duplicates without the flag: ambiguous, leave untouched.
            return (None, None);
        }

        // Not found anywhere.
        let reason = if file_deleted {
            Reason::FileDeleted
        } else if file_read_failed {
            Reason::FileNotFound
        } else {
            Reason::SemanticTargetMissing
        };
        (
            Some(Trigger::semantic(sub, reason, ChangeType::Missing)),
            None,
        )
    }

    /// Shared post-location logic for all three stages: classify the
    /// change (container diff for container subscriptions, fingerprint
    /// comparison otherwise), then fold in inherited changes for
    /// class-kind subscriptions.
    fn classify_at_location(
        &mut self,
        sub: &Subscription,
        semantic: &SemanticTarget,
        indexer: &'static dyn SemanticIndexer,
        source: &str,
        path: &str,
        construct: &Construct,
    ) -> Option<Trigger> {
        let constructs = self.indexed(indexer, path, source);

        let mut trigger = if semantic.include_members {
            check_container_members(sub, semantic, indexer, source, path, construct, &constructs)
        } else {
            classify_semantic_change(sub, semantic, construct)
        };

        if matches!(
            semantic.kind,
            ConstructKind::Class | ConstructKind::Interface | ConstructKind::Enum
        ) && !source.is_empty()
        {
            if let Some(inherited) = self.check_inherited(sub, indexer, construct, source, path) {
                merge_inherited(&mut trigger, inherited);
            }
        }

        trigger
    }

    /// Search the rest of the diff for the target. Candidates are the
    /// target-side files of the patch, excluding the subscription's own
    /// old/new paths, deleted files, and files of other languages.
    /// Returns all matches at the best tier found across files.
    fn search_cross_file(
        &mut self,
        semantic: &SemanticTarget,
        indexer: &'static dyn SemanticIndexer,
        old_path: &str,
        new_path: &str,
    ) -> (Vec<(String, Construct)>, MatchTier) {
        let candidates: Vec<String> = self
            .file_diffs
            .iter()
            .filter(|fd| {
                fd.new_path != old_path
                    && fd.new_path != new_path
                    && fd.old_path != old_path
                    && fd.old_path != new_path
            })
            .filter(|fd| {
                !fd.is_deleted_file && self.status_map.get(&fd.old_path).map(String::as_str) != Some("D")
            })
            .filter(|fd| {
                registry::detect_language(&fd.new_path).is_ok_and(|l| l == semantic.language)
            })
            .map(|fd| fd.new_path.clone())
            .collect();

        let mut found: Vec<(String, Construct, MatchTier)> = Vec::new();
        let mut best = MatchTier::None;

        for path in candidates {
            // Read/index failures skip just this candidate.
            let Ok(source) = self.read_target_source(&path) else {
                continue;
            };
            let constructs = self.indexed(indexer, &path, &source);

            let (matches, tier) = find_hash_candidates(semantic, &constructs);
            best = best.min(tier);
            for construct in matches {
                found.push((path.clone(), construct.clone(), tier));
            }
        }

        let matches = found
            .into_iter()
            .filter(|(_, _, tier)| *tier <= best)
            .map(|(path, construct, _)| (path, construct))
            .collect();
        (matches, best)
    }
}

/// Compare stored fingerprints against the located construct. Interface
/// changes win over body changes; equal hashes mean a cosmetic-only edit.
fn classify_semantic_change(
    sub: &Subscription,
    semantic: &SemanticTarget,
    construct: &Construct,
) -> Option<Trigger> {
    if semantic.interface_hash != construct.interface_hash {
        return Some(Trigger::semantic(
            sub,
            Reason::InterfaceChanged,
            ChangeType::Structural,
        ));
    }
    if semantic.body_hash != construct.body_hash {
        return Some(Trigger::semantic(sub, Reason::BodyChanged, ChangeType::Content));
    }
    None
}

/// All constructs matching the target's fingerprints at the best
/// populated tier.
pub(crate) fn find_hash_candidates<'c>(
    semantic: &SemanticTarget,
    constructs: &'c [Construct],
) -> (Vec<&'c Construct>, MatchTier) {
    let same_kind: Vec<&Construct> = constructs.iter().filter(|c| c.kind == semantic.kind).collect();

    let exact: Vec<&Construct> = same_kind
        .iter()
        .copied()
        .filter(|c| {
            c.interface_hash == semantic.interface_hash && c.body_hash == semantic.body_hash
        })
        .collect();
    if !exact.is_empty() {
        return (exact, MatchTier::Exact);
    }

    let body: Vec<&Construct> = same_kind
        .iter()
        .copied()
        .filter(|c| c.body_hash == semantic.body_hash)
        .collect();
    if !body.is_empty() {
        return (body, MatchTier::Body);
    }

    let interface: Vec<&Construct> = same_kind
        .iter()
        .copied()
        .filter(|c| c.interface_hash == semantic.interface_hash)
        .collect();
    if !interface.is_empty() {
        return (interface, MatchTier::Interface);
    }

    (Vec::new(), MatchTier::None)
}

/// Proposal pointing the subscription at the construct's target-side
/// location. `new_qualname`/`new_kind` are set only when they differ
/// from the stored target.
fn relocation_proposal(
    sub: &Subscription,
    new_path: &str,
    construct: &Construct,
    reasons: Vec<Reason>,
    confidence: Confidence,
    semantic: &SemanticTarget,
) -> Proposal {
    Proposal {
        subscription: sub.clone(),
        old_path: sub.path.clone(),
        old_start: sub.start_line,
        old_end: sub.end_line,
        new_path: new_path.to_string(),
        new_start: construct.start_line,
        new_end: construct.end_line,
        reasons,
        confidence,
        shift: None,
        new_qualname: (construct.qualname != semantic.qualname)
            .then(|| construct.qualname.clone()),
        new_kind: (construct.kind != semantic.kind).then_some(construct.kind),
    }
}

/// Fold an inherited-change trigger into the primary one: union of
/// reasons, inherited details merged under the existing payload.
fn merge_inherited(primary: &mut Option<Trigger>, inherited: Trigger) {
    match primary {
        None => *primary = Some(inherited),
        Some(trigger) => {
            if let Some(TriggerDetails::Inherited(details)) = inherited.details {
                match &mut trigger.details {
                    Some(TriggerDetails::Aggregate(agg)) => {
                        agg.inherited_changes = Some(details.inherited_changes);
                        agg.inheritance_chain = Some(details.inheritance_chain);
                    }
                    None => trigger.details = Some(TriggerDetails::Inherited(details)),
                    _ => {}
                }
            }
            if !trigger.reasons.contains(&Reason::InheritedMemberChanged) {
                trigger.reasons.push(Reason::InheritedMemberChanged);
            }
        }
    }
}
