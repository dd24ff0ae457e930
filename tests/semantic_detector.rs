//! Semantic detection for Python targets: classification, same-file
//! relocation, duplicates, missing targets, and language recovery.

mod common;

use common::TestRepo;
use subwatch::detect::Detector;
use subwatch::models::{
    ChangeType, Confidence, Reason, ScanResult, Subscription, TriggerDetails,
};
use subwatch::subscribe::{SubscribeOptions, create_subscription};

fn scan(repo: &TestRepo, subs: &[Subscription], base: &str, target: Option<&str>) -> ScanResult {
    let git = repo.repo();
    Detector::new(&git).scan(subs, base, target).expect("scan")
}

fn semantic_sub(repo: &TestRepo, baseline: &str, location: &str) -> Subscription {
    let git = repo.repo();
    create_subscription(&git, baseline, location, &SubscribeOptions::default())
        .expect("create subscription")
}

#[test]
fn value_change_is_content() {
    let repo = TestRepo::new();
    repo.write("config.py", "MAX_RETRIES = 5\nTIMEOUT = 30\n");
    let base = repo.commit("initial");

    let sub = semantic_sub(&repo, &base, "config.py::variable:MAX_RETRIES");

    repo.write("config.py", "MAX_RETRIES = 10\nTIMEOUT = 30\n");
    let target = repo.commit("bump retries");

    let result = scan(&repo, &[sub], &base, Some(&target));
    assert_eq!(result.triggers.len(), 1);

    let t = &result.triggers[0];
    assert_eq!(t.change_type, Some(ChangeType::Content));
    assert_eq!(t.reasons, vec![Reason::BodyChanged]);
}

#[test]
fn annotation_change_is_structural() {
    let repo = TestRepo::new();
    repo.write("config.py", "MAX_RETRIES = 5\n");
    let base = repo.commit("initial");

    let sub = semantic_sub(&repo, &base, "config.py::MAX_RETRIES");

    repo.write("config.py", "MAX_RETRIES: int = 5\n");
    let target = repo.commit("annotate");

    let result = scan(&repo, &[sub], &base, Some(&target));
    assert_eq!(result.triggers.len(), 1);

    let t = &result.triggers[0];
    assert_eq!(t.change_type, Some(ChangeType::Structural));
    assert_eq!(t.reasons, vec![Reason::InterfaceChanged]);
}

#[test]
fn cosmetic_reformat_is_unchanged() {
    let repo = TestRepo::new();
    repo.write("app.py", "def run(x):\n    return x * 2\n");
    let base = repo.commit("initial");

    let sub = semantic_sub(&repo, &base, "app.py::function:run");

    repo.write("app.py", "# entry point\ndef run(x):\n    # doubled\n    return x  *  2\n");
    let target = repo.commit("reformat");

    let result = scan(&repo, &[sub], &base, Some(&target));
    assert!(result.triggers.is_empty());
    // The definition moved down a line, so a relocation is proposed.
    assert_eq!(result.proposals.len(), 1);
    assert_eq!(result.proposals[0].reasons, vec![Reason::LineShift]);
}

#[test]
fn renamed_construct_found_by_hash() {
    let repo = TestRepo::new();
    repo.write("app.py", "def process(data):\n    return data.strip()\n");
    let base = repo.commit("initial");

    let sub = semantic_sub(&repo, &base, "app.py::function:process");

    repo.write("app.py", "def process_input(data):\n    return data.strip()\n");
    let target = repo.commit("rename function");

    let result = scan(&repo, &[sub], &base, Some(&target));
    assert!(result.triggers.is_empty());
    assert_eq!(result.proposals.len(), 1);

    let p = &result.proposals[0];
    assert_eq!(p.reasons, vec![Reason::SemanticLocation]);
    assert_eq!(p.confidence, Confidence::High);
    assert_eq!(p.new_qualname.as_deref(), Some("process_input"));
    assert_eq!(p.new_kind, None);
}

#[test]
fn method_rename_with_body_change_classifies_content() {
    let repo = TestRepo::new();
    repo.write(
        "models.py",
        "class User:\n    def validate(self):\n        return True\n",
    );
    let base = repo.commit("initial");

    let sub = semantic_sub(&repo, &base, "models.py::method:User.validate");

    // Renamed AND body changed: interface tier match inside the file.
    repo.write(
        "models.py",
        "class User:\n    def check(self):\n        return False\n",
    );
    let target = repo.commit("rename and edit");

    let result = scan(&repo, &[sub], &base, Some(&target));
    assert_eq!(result.proposals.len(), 1);
    assert_eq!(result.proposals[0].new_qualname.as_deref(), Some("User.check"));

    assert_eq!(result.triggers.len(), 1);
    assert_eq!(result.triggers[0].change_type, Some(ChangeType::Content));
}

#[test]
fn missing_target_triggers_missing() {
    let repo = TestRepo::new();
    repo.write("config.py", "MAX_RETRIES = 5\n\ndef helper():\n    return None\n");
    let base = repo.commit("initial");

    let sub = semantic_sub(&repo, &base, "config.py::MAX_RETRIES");

    // Only the function survives; no variable is left to match against.
    repo.write("config.py", "def helper():\n    return None\n");
    let target = repo.commit("drop the constant");

    let result = scan(&repo, &[sub], &base, Some(&target));
    assert_eq!(result.triggers.len(), 1);

    let t = &result.triggers[0];
    assert_eq!(t.change_type, Some(ChangeType::Missing));
    assert_eq!(t.reasons, vec![Reason::SemanticTargetMissing]);
    assert!(result.proposals.is_empty());
}

#[test]
fn deleted_file_triggers_missing_with_file_deleted() {
    let repo = TestRepo::new();
    repo.write("config.py", "MAX_RETRIES = 5\n");
    let base = repo.commit("initial");

    let sub = semantic_sub(&repo, &base, "config.py::MAX_RETRIES");

    repo.remove("config.py");
    let target = repo.commit("delete module");

    let result = scan(&repo, &[sub], &base, Some(&target));
    assert_eq!(result.triggers.len(), 1);

    let t = &result.triggers[0];
    assert_eq!(t.change_type, Some(ChangeType::Missing));
    assert_eq!(t.reasons, vec![Reason::FileDeleted]);
}

#[test]
fn file_rename_follows_construct() {
    let repo = TestRepo::new();
    repo.write("config.py", "MAX_RETRIES = 5\nTIMEOUT = 30\nDEBUG = False\n");
    let base = repo.commit("initial");

    let sub = semantic_sub(&repo, &base, "config.py::MAX_RETRIES");

    repo.rename("config.py", "settings.py");
    let target = repo.commit("rename module");

    let result = scan(&repo, &[sub], &base, Some(&target));
    assert!(result.triggers.is_empty());
    assert_eq!(result.proposals.len(), 1);

    let p = &result.proposals[0];
    assert_eq!(p.new_path, "settings.py");
    assert_eq!(p.reasons, vec![Reason::Rename]);
    assert_eq!(p.confidence, Confidence::High);
}

#[test]
fn unsupported_language_recovers_as_ambiguous() {
    let repo = TestRepo::new();
    repo.write("script.rb", "X = 1\n");
    let base = repo.commit("initial");

    // Hand-built subscription claiming a language this build can't index.
    let mut sub = Subscription::create("script.rb", 1, 1);
    sub.semantic = Some(subwatch::models::SemanticTarget {
        language: "ruby".into(),
        kind: subwatch::semantic::ConstructKind::Variable,
        qualname: "X".into(),
        role: None,
        interface_hash: "0000000000000000".into(),
        body_hash: "0000000000000000".into(),
        fingerprint_version: 1,
        include_members: false,
        include_private: false,
        track_decorators: false,
        baseline_members: None,
        baseline_container_qualname: None,
    });

    repo.write("script.rb", "X = 2\n");
    let target = repo.commit("edit");

    let result = scan(&repo, &[sub], &base, Some(&target));
    assert_eq!(result.triggers.len(), 1);

    let t = &result.triggers[0];
    assert_eq!(t.change_type, Some(ChangeType::Ambiguous));
    assert_eq!(t.reasons, vec![Reason::UnsupportedLanguage]);
    match &t.details {
        Some(TriggerDetails::Ambiguous(d)) => {
            assert!(d.error.as_deref().unwrap_or_default().contains("ruby"));
        }
        other => panic!("expected ambiguous details, got {other:?}"),
    }
}

#[test]
fn working_tree_semantic_scan() {
    let repo = TestRepo::new();
    repo.write("config.py", "MAX_RETRIES = 5\n");
    let base = repo.commit("initial");

    let sub = semantic_sub(&repo, &base, "config.py::MAX_RETRIES");

    // Uncommitted value change.
    repo.write("config.py", "MAX_RETRIES = 99\n");

    let result = scan(&repo, &[sub], &base, None);
    assert_eq!(result.target_ref, "WORKING");
    assert_eq!(result.triggers.len(), 1);
    assert_eq!(result.triggers[0].change_type, Some(ChangeType::Content));
}

#[test]
fn unique_qualname_required_at_creation() {
    let repo = TestRepo::new();
    repo.write("config.py", "A = 1\n");
    let base = repo.commit("initial");

    let git = repo.repo();
    let err = create_subscription(&git, &base, "config.py::B", &SubscribeOptions::default());
    assert!(err.is_err());
}
