//! Shared fixture: throwaway git repositories driven through the real
//! `git` binary, the same plumbing the crate itself shells out to.
#![allow(dead_code)]

use std::path::Path;
use std::process::Command;

use subwatch::git::GitRepo;

pub struct TestRepo {
    dir: tempfile::TempDir,
}

impl TestRepo {
    pub fn new() -> Self {
        let dir = tempfile::tempdir().expect("tempdir");
        let repo = Self { dir };
        repo.git(&["init", "-q"]);
        repo.git(&["config", "user.email", "test@example.com"]);
        repo.git(&["config", "user.name", "Test"]);
        repo
    }

    pub fn path(&self) -> &Path {
        self.dir.path()
    }

    pub fn git(&self, args: &[&str]) {
        let status = Command::new("git")
            .args(args)
            .current_dir(self.dir.path())
            .status()
            .expect("running git");
        assert!(status.success(), "git {args:?} failed");
    }

    pub fn write(&self, rel: &str, content: &str) {
        let path = self.dir.path().join(rel);
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).expect("mkdir");
        }
        std::fs::write(path, content).expect("write");
    }

    pub fn remove(&self, rel: &str) {
        std::fs::remove_file(self.dir.path().join(rel)).expect("remove");
    }

    pub fn rename(&self, from: &str, to: &str) {
        let to_path = self.dir.path().join(to);
        if let Some(parent) = to_path.parent() {
            std::fs::create_dir_all(parent).expect("mkdir");
        }
        std::fs::rename(self.dir.path().join(from), to_path).expect("rename");
    }

    /// Stage everything and commit; returns the new HEAD hash.
    pub fn commit(&self, message: &str) -> String {
        self.git(&["add", "-A"]);
        let status = Command::new("git")
            .args(["-c", "commit.gpgsign=false", "commit", "-q", "-m", message])
            .current_dir(self.dir.path())
            .status()
            .expect("running git commit");
        assert!(status.success(), "git commit failed");
        self.head()
    }

    pub fn head(&self) -> String {
        let output = Command::new("git")
            .args(["rev-parse", "HEAD"])
            .current_dir(self.dir.path())
            .output()
            .expect("rev-parse");
        String::from_utf8_lossy(&output.stdout).trim().to_string()
    }

    pub fn repo(&self) -> GitRepo {
        GitRepo::discover(self.dir.path()).expect("discover repo")
    }
}

/// The standard five-line fixture file used by the line-based scenarios.
pub const FIVE_LINES: &str = "line 1\nline 2\nline 3\nline 4\nline 5\n";
