use directories::ProjectDirs;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use super::{SCHEMA_VERSION, write_atomic};
use crate::errors::{Error, Result};
use crate::git::GitRepo;
use crate::models::Project;

const PROJECTS_FILE: &str = "projects.json";

/// Root for the project registry and scan history. Overridable via
/// SUBWATCH_DATA_DIR (tests rely on this).
pub fn default_data_dir() -> PathBuf {
    if let Ok(dir) = std::env::var("SUBWATCH_DATA_DIR") {
        return PathBuf::from(dir);
    }
    ProjectDirs::from("", "", "subwatch")
        .map(|dirs| dirs.data_dir().to_path_buf())
        .unwrap_or_else(|| PathBuf::from(".subwatch-data"))
}

#[derive(Debug, Serialize, Deserialize)]
struct ProjectsDoc {
    schema_version: u32,
    projects: Vec<Project>,
}

/// Registry of git repositories known to subwatch.
pub struct ProjectStore {
    data_dir: PathBuf,
    path: PathBuf,
}

impl ProjectStore {
    pub fn new(data_dir: Option<PathBuf>) -> Self {
        let data_dir = data_dir.unwrap_or_else(default_data_dir);
        let path = data_dir.join(PROJECTS_FILE);
        Self { data_dir, path }
    }

    fn load(&self) -> Result<ProjectsDoc> {
        if !self.path.exists() {
            return Ok(ProjectsDoc {
                schema_version: SCHEMA_VERSION,
                projects: Vec::new(),
            });
        }
        let text = std::fs::read_to_string(&self.path)
            .map_err(|e| Error::io(format!("reading {}", self.path.display()), e))?;
        serde_json::from_str(&text).map_err(|e| Error::json(self.path.display().to_string(), e))
    }

    fn save(&self, doc: &ProjectsDoc) -> Result<()> {
        std::fs::create_dir_all(&self.data_dir)
            .map_err(|e| Error::io(format!("creating {}", self.data_dir.display()), e))?;
        let mut text =
            serde_json::to_string_pretty(doc).map_err(|e| Error::json("projects".to_string(), e))?;
        text.push('\n');
        write_atomic(&self.data_dir, &self.path, &text)
    }

    /// Register a repository. The path must point inside a git repo; its
    /// resolved root is stored. Re-registering a known root is an error.
    pub fn add_project(&self, path: &Path, name: Option<&str>) -> Result<Project> {
        let repo = GitRepo::discover(path).map_err(|_| Error::InvalidProjectPath {
            path: path.display().to_string(),
            reason: "not a git repository".to_string(),
        })?;
        let root = repo.root().to_path_buf();
        let root_str = root.display().to_string();

        let mut doc = self.load()?;
        if doc.projects.iter().any(|p| p.path == root_str) {
            return Err(Error::InvalidProjectPath {
                path: root_str,
                reason: "already registered".to_string(),
            });
        }

        let display_name = match name {
            Some(n) => n.to_string(),
            None => root
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_else(|| root_str.clone()),
        };

        let project = Project::create(display_name, root_str);
        doc.projects.push(project.clone());
        self.save(&doc)?;
        Ok(project)
    }

    pub fn list_projects(&self) -> Result<Vec<Project>> {
        Ok(self.load()?.projects)
    }

    /// Look up by id prefix.
    pub fn get_project(&self, id_prefix: &str) -> Result<Project> {
        let doc = self.load()?;
        let mut matches = doc.projects.into_iter().filter(|p| p.id.starts_with(id_prefix));
        let Some(first) = matches.next() else {
            return Err(Error::ProjectNotFound(id_prefix.to_string()));
        };
        if matches.next().is_some() {
            return Err(Error::ProjectNotFound(format!("{id_prefix} (ambiguous prefix)")));
        }
        Ok(first)
    }

    /// The registered project owning a repository root, if any.
    pub fn find_by_path(&self, root: &Path) -> Result<Option<Project>> {
        let root_str = root.display().to_string();
        Ok(self.load()?.projects.into_iter().find(|p| p.path == root_str))
    }

    pub fn remove_project(&self, id_prefix: &str) -> Result<Project> {
        let mut doc = self.load()?;
        let matching: Vec<usize> = doc
            .projects
            .iter()
            .enumerate()
            .filter(|(_, p)| p.id.starts_with(id_prefix))
            .map(|(i, _)| i)
            .collect();

        match matching.as_slice() {
            [] => Err(Error::ProjectNotFound(id_prefix.to_string())),
            [idx] => {
                let removed = doc.projects.remove(*idx);
                self.save(&doc)?;
                Ok(removed)
            }
            _ => Err(Error::ProjectNotFound(format!("{id_prefix} (ambiguous prefix)"))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::process::Command;

    fn git_dir() -> tempfile::TempDir {
        let dir = tempfile::tempdir().unwrap();
        Command::new("git")
            .args(["init", "-q"])
            .current_dir(dir.path())
            .status()
            .unwrap();
        dir
    }

    fn store() -> (tempfile::TempDir, ProjectStore) {
        let data = tempfile::tempdir().unwrap();
        let store = ProjectStore::new(Some(data.path().to_path_buf()));
        (data, store)
    }

    #[test]
    fn register_and_list() {
        let (_data, store) = store();
        let repo = git_dir();

        let project = store.add_project(repo.path(), Some("demo")).unwrap();
        assert_eq!(project.name, "demo");

        let listed = store.list_projects().unwrap();
        assert_eq!(listed.len(), 1);
        assert_eq!(listed[0].id, project.id);

        let found = store.get_project(&project.id[..8]).unwrap();
        assert_eq!(found.id, project.id);
    }

    #[test]
    fn non_repo_rejected() {
        let (_data, store) = store();
        let plain = tempfile::tempdir().unwrap();
        assert!(matches!(
            store.add_project(plain.path(), None),
            Err(Error::InvalidProjectPath { .. })
        ));
    }

    #[test]
    fn duplicate_rejected() {
        let (_data, store) = store();
        let repo = git_dir();
        store.add_project(repo.path(), None).unwrap();
        assert!(matches!(
            store.add_project(repo.path(), None),
            Err(Error::InvalidProjectPath { .. })
        ));
    }

    #[test]
    fn remove_project_by_prefix() {
        let (_data, store) = store();
        let repo = git_dir();
        let project = store.add_project(repo.path(), None).unwrap();

        store.remove_project(&project.id[..8]).unwrap();
        assert!(store.list_projects().unwrap().is_empty());
        assert!(matches!(
            store.get_project(&project.id),
            Err(Error::ProjectNotFound(_))
        ));
    }
}
