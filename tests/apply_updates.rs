//! Updater: applying proposals, dry runs, warnings, baseline
//! advancement, and the scan/apply round-trip.

mod common;

use common::{FIVE_LINES, TestRepo};
use subwatch::detect::Detector;
use subwatch::models::{ScanResult, Subscription};
use subwatch::store::ConfigStore;
use subwatch::subscribe::{SubscribeOptions, create_subscription};
use subwatch::update_doc::{self, UpdateDoc};
use subwatch::updater::Updater;

fn scan(repo: &TestRepo, subs: &[Subscription], base: &str, target: Option<&str>) -> ScanResult {
    let git = repo.repo();
    Detector::new(&git).scan(subs, base, target).expect("scan")
}

/// Store with one subscription, ready for apply.
fn store_with(repo: &TestRepo, base: &str, sub: &Subscription) -> ConfigStore {
    let store = ConfigStore::new(repo.repo().root());
    store.init(base, false).unwrap();
    store.add_subscription(sub.clone()).unwrap();
    store
}

#[test]
fn shift_proposal_round_trips() {
    let repo = TestRepo::new();
    repo.write("test.txt", FIVE_LINES);
    let base = repo.commit("initial");

    let sub = Subscription::create("test.txt", 4, 5);
    let store = store_with(&repo, &base, &sub);

    repo.write("test.txt", "first\nsecond\nline 2\nline 3\nline 4\nline 5\n");
    let target = repo.commit("replace line 1 with two lines");

    let result = scan(&repo, &[sub.clone()], &base, Some(&target));
    assert_eq!(result.proposals.len(), 1);

    let doc = update_doc::from_scan(&result);
    let git = repo.repo();
    let outcome = Updater::new(&store, &git).apply(&doc, false).unwrap();
    assert_eq!(outcome.applied, vec![sub.id.clone()]);
    assert!(outcome.warnings.is_empty());

    // Location rewritten, anchor re-snapshotted, baseline advanced.
    let updated = store.get_subscription(&sub.id).unwrap();
    assert_eq!((updated.start_line, updated.end_line), (5, 6));
    assert_eq!(
        updated.anchors.as_ref().unwrap().lines,
        vec!["line 4", "line 5"]
    );
    assert_eq!(store.get_baseline().unwrap(), target);

    // Re-running the same scan from the advanced baseline is quiet.
    let rescan = scan(&repo, &[updated], &target, Some(&target));
    assert!(rescan.triggers.is_empty());
    assert!(rescan.proposals.is_empty());
    assert_eq!(rescan.unchanged.len(), 1);
}

#[test]
fn dry_run_writes_nothing() {
    let repo = TestRepo::new();
    repo.write("test.txt", FIVE_LINES);
    let base = repo.commit("initial");

    let sub = Subscription::create("test.txt", 4, 5);
    let store = store_with(&repo, &base, &sub);

    repo.write("test.txt", "first\nsecond\nline 2\nline 3\nline 4\nline 5\n");
    let target = repo.commit("shift");

    let result = scan(&repo, &[sub.clone()], &base, Some(&target));
    let doc = update_doc::from_scan(&result);

    let git = repo.repo();
    let outcome = Updater::new(&store, &git).apply(&doc, true).unwrap();
    assert_eq!(outcome.applied, vec![sub.id.clone()]);

    let untouched = store.get_subscription(&sub.id).unwrap();
    assert_eq!((untouched.start_line, untouched.end_line), (4, 5));
    assert_eq!(store.get_baseline().unwrap(), base);
}

#[test]
fn unknown_subscription_warns_and_skips() {
    let repo = TestRepo::new();
    repo.write("test.txt", FIVE_LINES);
    let base = repo.commit("initial");

    let sub = Subscription::create("test.txt", 4, 5);
    let store = store_with(&repo, &base, &sub);

    repo.write("test.txt", "x\nline 1\nline 2\nline 3\nline 4\nline 5\n");
    let target = repo.commit("shift");

    let result = scan(&repo, &[sub], &base, Some(&target));
    let mut doc = update_doc::from_scan(&result);
    doc.proposals[0].subscription_id = "does-not-exist".into();

    let git = repo.repo();
    let outcome = Updater::new(&store, &git).apply(&doc, false).unwrap();
    assert!(outcome.applied.is_empty());
    assert_eq!(outcome.warnings.len(), 1);
    assert!(outcome.warnings[0].contains("not found"));
    // Nothing applied, baseline stays put.
    assert_eq!(store.get_baseline().unwrap(), base);
}

#[test]
fn working_tree_document_applies_from_disk() {
    let repo = TestRepo::new();
    repo.write("test.txt", FIVE_LINES);
    let base = repo.commit("initial");

    let git = repo.repo();
    let sub = create_subscription(&git, &base, "test.txt:4-5", &SubscribeOptions::default()).unwrap();
    let store = store_with(&repo, &base, &sub);

    // Uncommitted edit shifting the range down by one.
    repo.write("test.txt", "HEADER\nline 1\nline 2\nline 3\nline 4\nline 5\n");

    let result = scan(&repo, &[sub.clone()], &base, None);
    assert_eq!(result.target_ref, "WORKING");
    assert_eq!(result.proposals.len(), 1);

    let doc = update_doc::from_scan(&result);
    assert_eq!(doc.target_ref, "WORKING");

    let outcome = Updater::new(&store, &git).apply(&doc, false).unwrap();
    assert_eq!(outcome.applied, vec![sub.id.clone()]);
    assert!(outcome.warnings.is_empty());

    // Location and anchors come from the working tree; the baseline
    // stays on the last commit since nothing new can anchor it.
    let updated = store.get_subscription(&sub.id).unwrap();
    assert_eq!((updated.start_line, updated.end_line), (5, 6));
    assert_eq!(
        updated.anchors.as_ref().unwrap().lines,
        vec!["line 4", "line 5"]
    );
    assert_eq!(store.get_baseline().unwrap(), base);
}

#[test]
fn inverted_range_proposal_warns_and_skips() {
    let repo = TestRepo::new();
    repo.write("test.txt", FIVE_LINES);
    let base = repo.commit("initial");

    let git = repo.repo();
    let sub = create_subscription(&git, &base, "test.txt:4-5", &SubscribeOptions::default()).unwrap();
    let store = store_with(&repo, &base, &sub);

    repo.write("test.txt", "x\nline 1\nline 2\nline 3\nline 4\nline 5\n");
    let target = repo.commit("shift");

    let result = scan(&repo, &[sub.clone()], &base, Some(&target));
    let mut doc = update_doc::from_scan(&result);
    doc.proposals[0].new_start = 5;
    doc.proposals[0].new_end = 3;

    let outcome = Updater::new(&store, &git).apply(&doc, false).unwrap();
    assert!(outcome.applied.is_empty());
    assert_eq!(outcome.warnings.len(), 1);
    assert!(outcome.warnings[0].contains("ends before it starts"));

    // Skipped entirely: no rewrite, no baseline advance.
    let untouched = store.get_subscription(&sub.id).unwrap();
    assert_eq!((untouched.start_line, untouched.end_line), (4, 5));
    assert_eq!(store.get_baseline().unwrap(), base);
}

#[test]
fn out_of_range_proposal_warns_and_skips() {
    let repo = TestRepo::new();
    repo.write("test.txt", FIVE_LINES);
    let base = repo.commit("initial");

    let sub = Subscription::create("test.txt", 4, 5);
    let store = store_with(&repo, &base, &sub);

    repo.write("test.txt", "x\nline 1\nline 2\nline 3\nline 4\nline 5\n");
    let target = repo.commit("shift");

    let result = scan(&repo, &[sub.clone()], &base, Some(&target));
    let mut doc = update_doc::from_scan(&result);
    doc.proposals[0].new_end = 999;

    let git = repo.repo();
    let outcome = Updater::new(&store, &git).apply(&doc, false).unwrap();
    assert!(outcome.applied.is_empty());
    assert!(outcome.warnings[0].contains("exceeds file length"));
}

#[test]
fn anchor_mismatch_warns_but_applies() {
    let repo = TestRepo::new();
    repo.write("test.txt", FIVE_LINES);
    let base = repo.commit("initial");

    let git = repo.repo();
    let sub = create_subscription(&git, &base, "test.txt:4-5", &SubscribeOptions::default()).unwrap();
    let store = store_with(&repo, &base, &sub);

    repo.write("test.txt", "x\nline 1\nline 2\nline 3\nline 4\nline 5\n");
    let target = repo.commit("shift");

    let result = scan(&repo, &[sub.clone()], &base, Some(&target));
    let mut doc = update_doc::from_scan(&result);
    // Steer the proposal at unrelated content.
    doc.proposals[0].new_start = 1;
    doc.proposals[0].new_end = 2;

    let outcome = Updater::new(&store, &git).apply(&doc, false).unwrap();
    assert_eq!(outcome.applied.len(), 1);
    assert_eq!(outcome.warnings.len(), 1);
    assert!(outcome.warnings[0].contains("differs significantly"));
}

#[test]
fn semantic_rename_updates_qualname() {
    let repo = TestRepo::new();
    repo.write("app.py", "def process(data):\n    return data.strip()\n");
    let base = repo.commit("initial");

    let git = repo.repo();
    let sub = create_subscription(
        &git,
        &base,
        "app.py::function:process",
        &SubscribeOptions::default(),
    )
    .unwrap();
    let store = store_with(&repo, &base, &sub);

    repo.write("app.py", "def process_input(data):\n    return data.strip()\n");
    let target = repo.commit("rename function");

    let result = scan(&repo, &[sub.clone()], &base, Some(&target));
    let doc = update_doc::from_scan(&result);
    assert_eq!(doc.proposals[0].new_qualname.as_deref(), Some("process_input"));

    Updater::new(&store, &git).apply(&doc, false).unwrap();

    let updated = store.get_subscription(&sub.id).unwrap();
    assert_eq!(
        updated.semantic.as_ref().unwrap().qualname,
        "process_input"
    );

    // Round-trip: the renamed target is now the baseline identity.
    let rescan = scan(&repo, &[updated], &target, Some(&target));
    assert!(rescan.triggers.is_empty());
    assert!(rescan.proposals.is_empty());
}

#[test]
fn container_baseline_recaptured_on_apply() {
    let initial = "\
class User:
    def validate(self):
        return True
";
    let repo = TestRepo::new();
    repo.write("models.py", initial);
    let base = repo.commit("initial");

    let git = repo.repo();
    let opts = SubscribeOptions {
        include_members: true,
        ..Default::default()
    };
    let sub = create_subscription(&git, &base, "models.py::class:User", &opts).unwrap();
    let store = store_with(&repo, &base, &sub);

    // Shift the class down and add a member in one commit: the scan
    // yields both an AGGREGATE trigger and a line-shift proposal.
    let changed = "\
import os

class User:
    def validate(self):
        return True

    def greet(self):
        return \"hi\"
";
    repo.write("models.py", changed);
    let target = repo.commit("shift and extend");

    let result = scan(&repo, &[sub.clone()], &base, Some(&target));
    assert_eq!(result.triggers.len(), 1);
    assert_eq!(result.proposals.len(), 1);

    let doc = update_doc::from_scan(&result);
    Updater::new(&store, &git).apply(&doc, false).unwrap();

    let updated = store.get_subscription(&sub.id).unwrap();
    let semantic = updated.semantic.as_ref().unwrap();
    let members = semantic.baseline_members.as_ref().unwrap();
    assert!(members.contains_key("validate"));
    assert!(members.contains_key("greet"));
    assert_eq!(
        semantic.baseline_container_qualname.as_deref(),
        Some("User")
    );

    // With the recaptured baseline, the same scan is quiet.
    let rescan = scan(&repo, &[updated], &target, Some(&target));
    assert!(rescan.triggers.is_empty());
    assert!(rescan.proposals.is_empty());
}

#[test]
fn empty_document_is_a_no_op() {
    let repo = TestRepo::new();
    repo.write("test.txt", FIVE_LINES);
    let base = repo.commit("initial");

    let sub = Subscription::create("test.txt", 1, 1);
    let store = store_with(&repo, &base, &sub);

    let doc = UpdateDoc {
        schema_version: 1,
        generated_at: String::new(),
        base_ref: base.clone(),
        target_ref: base.clone(),
        triggers: Vec::new(),
        proposals: Vec::new(),
    };

    let git = repo.repo();
    let outcome = Updater::new(&store, &git).apply(&doc, false).unwrap();
    assert!(outcome.applied.is_empty());
    assert!(outcome.warnings.is_empty());
    assert_eq!(store.get_baseline().unwrap(), base);
}
