mod container;
mod inherited;
mod semantic;

use std::collections::HashMap;
use std::rc::Rc;

use crate::errors::Result;
use crate::git::GitRepo;
use crate::git::diff::{parse_name_status, parse_patch, ranges_overlap};
use crate::models::{
    Confidence, FileDiff, Hunk, Proposal, Reason, ScanResult, Subscription, Trigger,
};
use crate::semantic::{Construct, SemanticIndexer};

/// Detects changes affecting subscriptions between a base ref and a
/// target ref (or the working tree).
pub struct Detector<'r> {
    repo: &'r GitRepo,
}

impl<'r> Detector<'r> {
    pub fn new(repo: &'r GitRepo) -> Self {
        Self { repo }
    }

    /// Scan subscriptions for changes. `target_ref` of None compares
    /// against the working tree; the result's `target_ref` then reads
    /// "WORKING". Inactive subscriptions are skipped. Subscriptions are
    /// processed in input order, each one's stages running to completion
    /// before the next.
    pub fn scan(
        &self,
        subscriptions: &[Subscription],
        base_ref: &str,
        target_ref: Option<&str>,
    ) -> Result<ScanResult> {
        let display_target = target_ref.unwrap_or("WORKING").to_string();

        let active: Vec<&Subscription> = subscriptions.iter().filter(|s| s.active).collect();
        if active.is_empty() {
            return Ok(ScanResult {
                base_ref: base_ref.to_string(),
                target_ref: display_target,
                triggers: Vec::new(),
                proposals: Vec::new(),
                unchanged: Vec::new(),
            });
        }

        let patch_text = self.repo.diff_patch(base_ref, target_ref)?;
        let name_status_text = self.repo.diff_name_status(base_ref, target_ref)?;

        let file_diffs = parse_patch(&patch_text);
        let (rename_map, status_map) = parse_name_status(&name_status_text);

        let mut scan = Scan {
            repo: self.repo,
            base_ref,
            target_ref,
            file_diffs,
            rename_map,
            status_map,
            constructs: HashMap::new(),
        };

        let mut triggers = Vec::new();
        let mut proposals = Vec::new();
        let mut unchanged = Vec::new();

        for sub in active {
            if sub.semantic.is_some() {
                let (trigger, proposal) = scan.check_semantic(sub);
                let untouched = trigger.is_none() && proposal.is_none();
                if let Some(t) = trigger {
                    triggers.push(t);
                }
                if let Some(p) = proposal {
                    proposals.push(p);
                }
                if untouched {
                    unchanged.push(sub.clone());
                }
                continue;
            }

            let new_path = scan
                .rename_map
                .get(&sub.path)
                .cloned()
                .unwrap_or_else(|| sub.path.clone());
            let is_renamed = new_path != sub.path;
            let is_deleted = scan.status_map.get(&sub.path).is_some_and(|s| s == "D");
            let file_diff = scan.file_diff_for_old_path(&sub.path);

            if let Some(trigger) = check_trigger(sub, file_diff, is_deleted) {
                triggers.push(trigger);
            } else if let Some(proposal) = compute_proposal(sub, file_diff, is_renamed, &new_path) {
                proposals.push(proposal);
            } else {
                unchanged.push(sub.clone());
            }
        }

        Ok(ScanResult {
            base_ref: base_ref.to_string(),
            target_ref: display_target,
            triggers,
            proposals,
            unchanged,
        })
    }
}

/// Per-scan state: parsed diff data plus the construct cache keyed by
/// (path, language). Nothing here outlives one scan call.
pub(crate) struct Scan<'a> {
    pub repo: &'a GitRepo,
    pub base_ref: &'a str,
    pub target_ref: Option<&'a str>,
    pub file_diffs: Vec<FileDiff>,
    pub rename_map: HashMap<String, String>,
    pub status_map: HashMap<String, String>,
    constructs: HashMap<(String, String), Rc<Vec<Construct>>>,
}

impl<'a> Scan<'a> {
    pub fn file_diff_for_old_path(&self, path: &str) -> Option<&FileDiff> {
        self.file_diffs.iter().find(|fd| fd.old_path == path)
    }

    /// Target-side source of a file (at target_ref, or the working tree).
    pub fn read_target_source(&self, path: &str) -> Result<String> {
        self.repo.read_source(self.target_ref, path)
    }

    /// Index a file's target-side source, memoized per (path, language)
    /// so one scan parses each file at most once.
    pub fn indexed(
        &mut self,
        indexer: &dyn SemanticIndexer,
        path: &str,
        source: &str,
    ) -> Rc<Vec<Construct>> {
        let key = (path.to_string(), indexer.language().to_string());
        if let Some(cached) = self.constructs.get(&key) {
            return Rc::clone(cached);
        }
        let constructs = Rc::new(indexer.index_file(source, path));
        self.constructs.insert(key, Rc::clone(&constructs));
        constructs
    }
}

/// Check whether changes trigger a line-based subscription.
fn check_trigger(
    sub: &Subscription,
    file_diff: Option<&FileDiff>,
    is_deleted: bool,
) -> Option<Trigger> {
    if is_deleted {
        return Some(Trigger::lines(sub, vec![Reason::FileDeleted], Vec::new()));
    }

    let file_diff = file_diff?;
    if file_diff.is_deleted_file {
        return Some(Trigger::lines(sub, vec![Reason::FileDeleted], Vec::new()));
    }

    let mut matching_hunks: Vec<Hunk> = Vec::new();
    let mut reasons: Vec<Reason> = Vec::new();

    for hunk in &file_diff.hunks {
        if hunk.old_count > 0 {
            // Modification or deletion: inclusive overlap test.
            let hunk_end = hunk.old_start + hunk.old_count - 1;
            if ranges_overlap(sub.start_line, sub.end_line, hunk.old_start, hunk_end) {
                matching_hunks.push(*hunk);
                if !reasons.contains(&Reason::OverlapHunk) {
                    reasons.push(Reason::OverlapHunk);
                }
            }
        } else {
            // Pure insertion: old_start names the line AFTER which new
            // content appears. Triggers only between the first and last
            // watched lines; immediately after the range (old_start ==
            // end_line) or before it, the range merely shifts.
            if sub.start_line <= hunk.old_start && hunk.old_start < sub.end_line {
                matching_hunks.push(*hunk);
                if !reasons.contains(&Reason::InsertInsideRange) {
                    reasons.push(Reason::InsertInsideRange);
                }
            }
        }
    }

    if reasons.is_empty() {
        return None;
    }
    Some(Trigger::lines(sub, reasons, matching_hunks))
}

/// Compute a rename/shift proposal for a non-triggered subscription.
fn compute_proposal(
    sub: &Subscription,
    file_diff: Option<&FileDiff>,
    is_renamed: bool,
    new_path: &str,
) -> Option<Proposal> {
    let shift = file_diff.map_or(0, |fd| calculate_shift(sub, &fd.hunks));

    if shift == 0 && !is_renamed {
        return None;
    }

    let mut reasons = Vec::new();
    if is_renamed {
        reasons.push(Reason::Rename);
    }
    if shift != 0 {
        reasons.push(Reason::LineShift);
    }

    Some(Proposal {
        subscription: sub.clone(),
        old_path: sub.path.clone(),
        old_start: sub.start_line,
        old_end: sub.end_line,
        new_path: new_path.to_string(),
        new_start: (sub.start_line as i64 + shift) as u32,
        new_end: (sub.end_line as i64 + shift) as u32,
        reasons,
        confidence: Confidence::High,
        shift: (shift != 0).then_some(shift),
        new_qualname: None,
        new_kind: None,
    })
}

/// Net line shift over all hunks strictly before the subscription.
///
/// Only valid for non-triggered subscriptions: overlapping hunks would
/// have triggered, so they are never encountered here. Hunks after the
/// range end the sweep since they are sorted.
fn calculate_shift(sub: &Subscription, hunks: &[Hunk]) -> i64 {
    let mut sorted: Vec<Hunk> = hunks.to_vec();
    sorted.sort_by_key(|h| h.old_start);

    let mut shift = 0i64;
    for hunk in sorted {
        let delta = hunk.new_count as i64 - hunk.old_count as i64;

        if hunk.old_count == 0 {
            // Insertion affects lines strictly after old_start.
            if hunk.old_start < sub.start_line {
                shift += delta;
            }
        } else {
            let old_end = hunk.old_start + hunk.old_count - 1;
            if old_end < sub.start_line {
                shift += delta;
            } else if hunk.old_start > sub.end_line {
                break;
            }
        }
    }

    shift
}
