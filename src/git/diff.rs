use regex::Regex;
use std::collections::HashMap;
use std::sync::LazyLock;

use crate::models::{FileDiff, Hunk};

static HUNK_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^@@\s+-(\d+)(?:,(\d+))?\s+\+(\d+)(?:,(\d+))?\s+@@").unwrap());
static DIFF_HEADER_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^diff --git a/(.+) b/(.+)$").unwrap());
static RENAME_FROM_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^rename from (.+)$").unwrap());
static RENAME_TO_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"^rename to (.+)$").unwrap());

/// Parse a unified patch (`git diff -U0 --find-renames`) into per-file
/// hunk lists. Hunks within one file are sorted ascending by `old_start`
/// before emission.
pub fn parse_patch(diff_text: &str) -> Vec<FileDiff> {
    let mut file_diffs: Vec<FileDiff> = Vec::new();
    let mut current: Option<FileDiff> = None;

    for line in diff_text.lines() {
        if let Some(caps) = DIFF_HEADER_RE.captures(line) {
            if let Some(mut fd) = current.take() {
                fd.hunks.sort_by_key(|h| h.old_start);
                file_diffs.push(fd);
            }
            current = Some(FileDiff {
                old_path: caps[1].to_string(),
                new_path: caps[2].to_string(),
                hunks: Vec::new(),
                is_rename: false,
                is_new_file: false,
                is_deleted_file: false,
            });
            continue;
        }

        let Some(fd) = current.as_mut() else { continue };

        if line.starts_with("new file mode") {
            fd.is_new_file = true;
            continue;
        }
        if line.starts_with("deleted file mode") {
            fd.is_deleted_file = true;
            continue;
        }
        if let Some(caps) = RENAME_FROM_RE.captures(line) {
            fd.old_path = caps[1].to_string();
            fd.is_rename = true;
            continue;
        }
        if let Some(caps) = RENAME_TO_RE.captures(line) {
            fd.new_path = caps[1].to_string();
            fd.is_rename = true;
            continue;
        }

        if let Some(caps) = HUNK_RE.captures(line) {
            // An omitted count means 1 in unified-diff notation.
            let count = |i: usize| -> u32 { caps.get(i).map_or(1, |m| m.as_str().parse().unwrap_or(1)) };
            fd.hunks.push(Hunk {
                old_start: caps[1].parse().unwrap_or(0),
                old_count: count(2),
                new_start: caps[3].parse().unwrap_or(0),
                new_count: count(4),
            });
        }
    }

    if let Some(mut fd) = current.take() {
        fd.hunks.sort_by_key(|h| h.old_start);
        file_diffs.push(fd);
    }

    file_diffs
}

/// Parse `git diff --name-status --find-renames` output into
/// (rename_map, status_map). A rename entry is indexed by the old path
/// in both maps.
pub fn parse_name_status(text: &str) -> (HashMap<String, String>, HashMap<String, String>) {
    let mut rename_map = HashMap::new();
    let mut status_map = HashMap::new();

    for line in text.lines() {
        let parts: Vec<&str> = line.split('\t').collect();
        if parts.len() < 2 {
            continue;
        }

        let status = parts[0];
        if status.starts_with('R') {
            // Rename: R100\told_path\tnew_path
            if parts.len() >= 3 {
                rename_map.insert(parts[1].to_string(), parts[2].to_string());
                status_map.insert(parts[1].to_string(), status.to_string());
            }
        } else {
            status_map.insert(parts[1].to_string(), status.to_string());
        }
    }

    (rename_map, status_map)
}

/// Inclusive-inclusive range overlap: `max(starts) <= min(ends)`.
pub fn ranges_overlap(a_start: u32, a_end: u32, b_start: u32, b_end: u32) -> bool {
    a_start.max(b_start) <= a_end.min(b_end)
}
