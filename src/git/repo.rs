use std::path::{Path, PathBuf};
use std::process::{Command, Output};

use crate::errors::{Error, Result};
use crate::location::normalize_path;

/// Wrapper for git operations against one repository.
///
/// All commands run inside the repository root, which is resolved once
/// from a starting directory via `git rev-parse --show-toplevel`. Paths
/// crossing this boundary are normalized to forward-slash form.
pub struct GitRepo {
    root: PathBuf,
}

impl GitRepo {
    /// Find the repository containing `start_dir`.
    pub fn discover(start_dir: &Path) -> Result<Self> {
        let output = Command::new("git")
            .args(["rev-parse", "--show-toplevel"])
            .current_dir(start_dir)
            .output()
            .map_err(|e| Error::io("failed to run git", e))?;

        if !output.status.success() {
            return Err(Error::NotAGitRepo {
                path: start_dir.to_path_buf(),
            });
        }

        let root = String::from_utf8_lossy(&output.stdout).trim().to_string();
        Ok(Self {
            root: PathBuf::from(root),
        })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn run(&self, args: &[&str]) -> Result<Output> {
        Command::new("git")
            .args(args)
            .current_dir(&self.root)
            .output()
            .map_err(|e| Error::io(format!("git {}", args.join(" ")), e))
    }

    fn run_checked(&self, args: &[&str]) -> Result<Output> {
        let output = self.run(args)?;
        if !output.status.success() {
            return Err(Error::Git {
                command: format!("git {}", args.join(" ")),
                stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            });
        }
        Ok(output)
    }

    /// Current HEAD commit hash.
    pub fn head(&self) -> Result<String> {
        self.resolve_ref("HEAD")
    }

    /// Resolve a ref (branch, tag, abbreviated hash, ...) to a full
    /// commit hash.
    pub fn resolve_ref(&self, git_ref: &str) -> Result<String> {
        let output = self.run_checked(&["rev-parse", git_ref])?;
        Ok(String::from_utf8_lossy(&output.stdout).trim().to_string())
    }

    /// File content at a ref as newline-stripped lines.
    pub fn show_file(&self, git_ref: &str, path: &str) -> Result<Vec<String>> {
        let path = normalize_path(path);
        let spec = format!("{git_ref}:{path}");
        let output = self.run(&["show", &spec])?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();
            if stderr.contains("does not exist") || stderr.contains("exists on disk") {
                return Err(Error::FileNotFoundAtRef {
                    path,
                    git_ref: git_ref.to_string(),
                });
            }
            return Err(Error::Git {
                command: format!("git show {spec}"),
                stderr,
            });
        }

        let mut content = String::from_utf8_lossy(&output.stdout).into_owned();
        if content.ends_with('\n') {
            content.pop();
        }
        if content.is_empty() {
            return Ok(Vec::new());
        }
        Ok(content.split('\n').map(String::from).collect())
    }

    /// All tracked paths at a ref.
    pub fn list_files(&self, git_ref: &str) -> Result<Vec<String>> {
        let output = self.run_checked(&["ls-tree", "-r", "--name-only", git_ref])?;
        Ok(String::from_utf8_lossy(&output.stdout)
            .lines()
            .filter(|l| !l.is_empty())
            .map(String::from)
            .collect())
    }

    /// Unified diff between a ref and a target ref, or the working tree
    /// when `target` is None. Zero context lines, rename detection on.
    pub fn diff_patch(&self, base: &str, target: Option<&str>) -> Result<String> {
        let mut args = vec!["diff", "-U0", "--find-renames", base];
        if let Some(t) = target {
            args.push(t);
        }
        let output = self.run_checked(&args)?;
        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    }

    /// Name-status diff with rename detection, same target semantics as
    /// `diff_patch`.
    pub fn diff_name_status(&self, base: &str, target: Option<&str>) -> Result<String> {
        let mut args = vec!["diff", "--name-status", "--find-renames", base];
        if let Some(t) = target {
            args.push(t);
        }
        let output = self.run_checked(&args)?;
        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    }

    /// Full source of a file at a ref, or from the working tree when
    /// `git_ref` is None.
    pub fn read_source(&self, git_ref: Option<&str>, path: &str) -> Result<String> {
        match git_ref {
            Some(r) => Ok(self.show_file(r, path)?.join("\n")),
            None => {
                let abs = self.root.join(normalize_path(path));
                std::fs::read_to_string(&abs)
                    .map_err(|e| Error::io(format!("reading {}", abs.display()), e))
            }
        }
    }

    /// File content as newline-stripped lines, from a ref or the working
    /// tree when `git_ref` is None. Same line semantics as `show_file`.
    pub fn read_lines(&self, git_ref: Option<&str>, path: &str) -> Result<Vec<String>> {
        match git_ref {
            Some(r) => self.show_file(r, path),
            None => {
                let mut content = self.read_source(None, path)?;
                if content.ends_with('\n') {
                    content.pop();
                }
                if content.is_empty() {
                    return Ok(Vec::new());
                }
                Ok(content.split('\n').map(String::from).collect())
            }
        }
    }

    /// Number of lines in a file at a ref.
    pub fn file_line_count(&self, git_ref: &str, path: &str) -> Result<usize> {
        Ok(self.show_file(git_ref, path)?.len())
    }
}
