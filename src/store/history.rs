use std::path::PathBuf;

use super::projects::default_data_dir;
use super::write_atomic;
use crate::errors::{Error, Result};
use crate::models::ScanRecord;

const HISTORY_DIR: &str = "scan_history";

/// Persisted scan results, one JSON document per scan under
/// `<data>/scan_history/<project_id>/`.
pub struct ScanHistory {
    history_dir: PathBuf,
}

impl ScanHistory {
    pub fn new(data_dir: Option<PathBuf>) -> Self {
        let data_dir = data_dir.unwrap_or_else(default_data_dir);
        Self {
            history_dir: data_dir.join(HISTORY_DIR),
        }
    }

    fn project_dir(&self, project_id: &str) -> PathBuf {
        self.history_dir.join(project_id)
    }

    /// Persist one scan's update document.
    pub fn record(&self, project_id: &str, scan_result: serde_json::Value) -> Result<ScanRecord> {
        let record = ScanRecord::new(project_id, scan_result);

        let dir = self.project_dir(project_id);
        std::fs::create_dir_all(&dir)
            .map_err(|e| Error::io(format!("creating {}", dir.display()), e))?;

        let path = dir.join(format!("{}.json", record.id));
        let mut text = serde_json::to_string_pretty(&record)
            .map_err(|e| Error::json("scan record".to_string(), e))?;
        text.push('\n');
        write_atomic(&dir, &path, &text)?;

        Ok(record)
    }

    /// All records for a project, newest first.
    pub fn list(&self, project_id: &str) -> Result<Vec<ScanRecord>> {
        let dir = self.project_dir(project_id);
        if !dir.exists() {
            return Ok(Vec::new());
        }

        let entries = std::fs::read_dir(&dir)
            .map_err(|e| Error::io(format!("reading {}", dir.display()), e))?;

        let mut records = Vec::new();
        for entry in entries {
            let entry = entry.map_err(|e| Error::io("reading history entry".to_string(), e))?;
            let path = entry.path();
            if path.extension().and_then(|e| e.to_str()) != Some("json") {
                continue;
            }
            let Ok(text) = std::fs::read_to_string(&path) else {
                continue;
            };
            if let Ok(record) = serde_json::from_str::<ScanRecord>(&text) {
                records.push(record);
            }
        }

        records.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(records)
    }

    /// Look up one scan by id prefix.
    pub fn get(&self, project_id: &str, scan_id_prefix: &str) -> Result<ScanRecord> {
        let mut matches: Vec<ScanRecord> = self
            .list(project_id)?
            .into_iter()
            .filter(|r| r.id.starts_with(scan_id_prefix))
            .collect();

        match matches.len() {
            0 => Err(Error::ScanNotFound(scan_id_prefix.to_string())),
            1 => Ok(matches.remove(0)),
            _ => Err(Error::ScanNotFound(format!(
                "{scan_id_prefix} (ambiguous prefix)"
            ))),
        }
    }

    /// Delete a project's history; returns how many records went away.
    pub fn clear(&self, project_id: &str) -> Result<usize> {
        let count = self.list(project_id)?.len();
        let dir = self.project_dir(project_id);
        if dir.exists() {
            std::fs::remove_dir_all(&dir)
                .map_err(|e| Error::io(format!("removing {}", dir.display()), e))?;
        }
        Ok(count)
    }
}
