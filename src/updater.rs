use std::collections::HashMap;

use crate::errors::Result;
use crate::git::GitRepo;
use crate::models::{Anchor, Subscription, utc_now};
use crate::semantic::registry;
use crate::store::ConfigStore;
use crate::subscribe::{DEFAULT_ANCHOR_CONTEXT, member_fingerprints};
use crate::update_doc::{ProposalDoc, UpdateDoc};

/// Result of applying an update document.
#[derive(Debug, Default)]
pub struct ApplyOutcome {
    /// Subscription ids that were (or in a dry run, would be) updated.
    pub applied: Vec<String>,
    pub warnings: Vec<String>,
}

/// Applies accepted proposals: rewrites subscription locations,
/// re-snapshots anchors, re-captures container baselines, and advances
/// the stored baseline ref.
///
/// A document whose target is the "WORKING" sentinel reads new content
/// from the working tree; the baseline stays put since there is no
/// commit to anchor it to.
///
/// Never halts on the first problem; per-proposal warnings accumulate
/// and the baseline only advances when at least one proposal applied.
pub struct Updater<'a> {
    store: &'a ConfigStore,
    repo: &'a GitRepo,
}

impl<'a> Updater<'a> {
    pub fn new(store: &'a ConfigStore, repo: &'a GitRepo) -> Self {
        Self { store, repo }
    }

    /// Apply the document's proposals. With `dry_run`, all validation
    /// runs and the would-apply set is returned without any write.
    pub fn apply(&self, doc: &UpdateDoc, dry_run: bool) -> Result<ApplyOutcome> {
        let mut outcome = ApplyOutcome::default();

        if doc.proposals.is_empty() {
            return Ok(outcome);
        }
        if doc.target_ref.is_empty() {
            outcome.warnings.push("no target_ref in update document".to_string());
            return Ok(outcome);
        }

        // A scan against the working tree records the literal sentinel.
        let target_ref = if doc.target_ref == "WORKING" {
            None
        } else {
            Some(doc.target_ref.as_str())
        };

        let mut config = self.store.load()?;
        let index_by_id: HashMap<String, usize> = config
            .subscriptions
            .iter()
            .enumerate()
            .map(|(i, s)| (s.id.clone(), i))
            .collect();

        for proposal in &doc.proposals {
            let short = short_id(&proposal.subscription_id);

            let Some(&idx) = index_by_id.get(&proposal.subscription_id) else {
                outcome
                    .warnings
                    .push(format!("subscription {short} not found, skipping"));
                continue;
            };

            let new_lines = match self.repo.read_lines(target_ref, &proposal.new_path) {
                Ok(lines) => lines,
                Err(e) => {
                    outcome.warnings.push(format!(
                        "cannot read {} at {} for {short}: {e}",
                        proposal.new_path,
                        short_ref(&doc.target_ref)
                    ));
                    continue;
                }
            };

            if proposal.new_start < 1 {
                outcome.warnings.push(format!(
                    "new range {}-{} starts before line 1 for {short}",
                    proposal.new_start, proposal.new_end
                ));
                continue;
            }
            if proposal.new_end < proposal.new_start {
                outcome.warnings.push(format!(
                    "new range {}-{} ends before it starts for {short}",
                    proposal.new_start, proposal.new_end
                ));
                continue;
            }
            if proposal.new_end as usize > new_lines.len() {
                outcome.warnings.push(format!(
                    "new range {}-{} exceeds file length ({} lines) for {short}",
                    proposal.new_start,
                    proposal.new_end,
                    new_lines.len()
                ));
                continue;
            }

            verify_anchor_overlap(
                &config.subscriptions[idx],
                &new_lines,
                proposal,
                &mut outcome.warnings,
            );

            if !dry_run {
                let sub = &mut config.subscriptions[idx];
                apply_to_subscription(sub, proposal, &new_lines);

                if sub.semantic.as_ref().is_some_and(|s| s.include_members) {
                    if let Err(e) = recapture_container_baseline(sub, &new_lines, &proposal.new_path)
                    {
                        outcome.warnings.push(format!(
                            "failed to recapture baseline members for {short}: {e}"
                        ));
                    }
                }
            }

            outcome.applied.push(proposal.subscription_id.clone());
        }

        if !dry_run && !outcome.applied.is_empty() {
            if let Some(target) = target_ref {
                config.repo.baseline_ref = target.to_string();
            }
            self.store.save(&mut config)?;
        }

        Ok(outcome)
    }
}

/// Jaccard-style sanity check: warn when fewer than half of the old
/// watched words survive at the proposed location. Diagnostic only.
fn verify_anchor_overlap(
    sub: &Subscription,
    new_lines: &[String],
    proposal: &ProposalDoc,
    warnings: &mut Vec<String>,
) {
    let Some(anchors) = &sub.anchors else { return };
    if anchors.lines.is_empty() {
        return;
    }

    let old_content = anchors.lines.join("\n");
    let new_content =
        new_lines[(proposal.new_start as usize - 1)..(proposal.new_end as usize)].join("\n");

    if old_content.trim() == new_content.trim() {
        return;
    }

    let old_words: std::collections::HashSet<&str> = old_content.split_whitespace().collect();
    let new_words: std::collections::HashSet<&str> = new_content.split_whitespace().collect();
    if old_words.is_empty() || new_words.is_empty() {
        return;
    }

    let overlap = old_words.intersection(&new_words).count() as f64 / old_words.len() as f64;
    if overlap < 0.5 {
        warnings.push(format!(
            "content at new location for {} differs significantly from original (overlap: {:.0}%)",
            short_id(&sub.id),
            overlap * 100.0
        ));
    }
}

fn apply_to_subscription(sub: &mut Subscription, proposal: &ProposalDoc, new_lines: &[String]) {
    sub.path = proposal.new_path.clone();
    sub.start_line = proposal.new_start;
    sub.end_line = proposal.new_end;
    sub.updated_at = utc_now();

    if let Some(semantic) = sub.semantic.as_mut() {
        if let Some(qualname) = &proposal.new_qualname {
            semantic.qualname = qualname.clone();
        }
        if let Some(kind) = proposal.new_kind {
            semantic.kind = kind;
        }
    }

    sub.anchors = Some(Anchor::capture(
        new_lines,
        proposal.new_start,
        proposal.new_end,
        DEFAULT_ANCHOR_CONTEXT,
    ));
}

/// Refresh a container subscription's fingerprints against the new
/// content: container hashes, baseline qualname, and member
/// fingerprints keyed by relative id.
fn recapture_container_baseline(
    sub: &mut Subscription,
    new_lines: &[String],
    new_path: &str,
) -> Result<()> {
    let Some(semantic) = sub.semantic.as_mut() else {
        return Ok(());
    };

    let indexer = registry::get_indexer(&semantic.language)?;
    let source = new_lines.join("\n");
    let qualname = semantic.qualname.clone();

    let constructs = indexer.index_file(&source, new_path);

    if let Some(container) =
        indexer.find_construct(&source, new_path, &qualname, Some(semantic.kind))
    {
        semantic.interface_hash = container.interface_hash.clone();
        semantic.body_hash = container.body_hash.clone();
        semantic.baseline_container_qualname = Some(qualname.clone());
    }

    let members = indexer.get_container_members(
        &source,
        new_path,
        &qualname,
        semantic.include_private,
        Some(&constructs),
    );
    semantic.baseline_members = Some(member_fingerprints(&members, &qualname));

    Ok(())
}

fn short_id(id: &str) -> &str {
    &id[..id.len().min(8)]
}

fn short_ref(r: &str) -> &str {
    &r[..r.len().min(12)]
}
