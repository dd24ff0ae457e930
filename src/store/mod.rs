pub mod history;
pub mod projects;

use std::path::{Path, PathBuf};

use crate::errors::{Error, Result};
use crate::models::{Config, Subscription, utc_now};

pub const SCHEMA_VERSION: u32 = 1;
pub const CONFIG_DIR: &str = ".subwatch";
pub const CONFIG_FILE: &str = "subscriptions.json";

/// Reads and writes the per-repository subscription configuration at
/// `.subwatch/subscriptions.json`.
///
/// Saves are atomic (write-temp-then-rename); the single-writer
/// assumption holds — concurrent writers coordinate outside this layer.
pub struct ConfigStore {
    config_dir: PathBuf,
    config_path: PathBuf,
}

impl ConfigStore {
    pub fn new(repo_root: &Path) -> Self {
        let config_dir = repo_root.join(CONFIG_DIR);
        let config_path = config_dir.join(CONFIG_FILE);
        Self {
            config_dir,
            config_path,
        }
    }

    pub fn config_dir(&self) -> &Path {
        &self.config_dir
    }

    pub fn exists(&self) -> bool {
        self.config_path.exists()
    }

    pub fn load(&self) -> Result<Config> {
        if !self.exists() {
            return Err(Error::ConfigNotFound {
                path: self.config_path.clone(),
            });
        }

        let text = std::fs::read_to_string(&self.config_path)
            .map_err(|e| Error::io(format!("reading {}", self.config_path.display()), e))?;

        // Check the version before deserializing the full document so a
        // future schema fails with the right error, not a parse error.
        let probe: serde_json::Value = serde_json::from_str(&text)
            .map_err(|e| Error::json(self.config_path.display().to_string(), e))?;
        let version = probe["schema_version"].as_u64().unwrap_or(0) as u32;
        if version != SCHEMA_VERSION {
            return Err(Error::InvalidSchemaVersion {
                found: version,
                supported: SCHEMA_VERSION,
            });
        }

        serde_json::from_str(&text).map_err(|e| Error::json(self.config_path.display().to_string(), e))
    }

    /// Save atomically: serialize to a temp file in the config dir, then
    /// rename over the target.
    pub fn save(&self, config: &mut Config) -> Result<()> {
        std::fs::create_dir_all(&self.config_dir)
            .map_err(|e| Error::io(format!("creating {}", self.config_dir.display()), e))?;

        config.repo.updated_at = utc_now();

        let mut text = serde_json::to_string_pretty(config)
            .map_err(|e| Error::json("subscriptions".to_string(), e))?;
        text.push('\n');

        write_atomic(&self.config_dir, &self.config_path, &text)
    }

    /// Create a fresh config anchored at `baseline_ref`.
    pub fn init(&self, baseline_ref: &str, force: bool) -> Result<Config> {
        if self.exists() && !force {
            return Err(Error::ConfigExists {
                path: self.config_path.clone(),
            });
        }

        let mut config = Config::create(baseline_ref);
        self.save(&mut config)?;
        Ok(config)
    }

    pub fn add_subscription(&self, sub: Subscription) -> Result<()> {
        let mut config = self.load()?;
        config.subscriptions.push(sub);
        self.save(&mut config)
    }

    pub fn list_subscriptions(&self, include_inactive: bool) -> Result<Vec<Subscription>> {
        let config = self.load()?;
        Ok(config
            .subscriptions
            .into_iter()
            .filter(|s| include_inactive || s.active)
            .collect())
    }

    /// Look up a subscription by id prefix. Ambiguous prefixes are an
    /// error, same as unknown ones.
    pub fn get_subscription(&self, id_prefix: &str) -> Result<Subscription> {
        let config = self.load()?;
        let mut matches = config.subscriptions.into_iter().filter(|s| s.id.starts_with(id_prefix));

        let Some(first) = matches.next() else {
            return Err(Error::SubscriptionNotFound(id_prefix.to_string()));
        };
        if matches.next().is_some() {
            return Err(Error::SubscriptionNotFound(format!(
                "{id_prefix} (ambiguous prefix)"
            )));
        }
        Ok(first)
    }

    /// Deactivate a subscription, or delete it entirely with `hard`.
    pub fn remove_subscription(&self, id_prefix: &str, hard: bool) -> Result<Subscription> {
        let mut config = self.load()?;

        let matching: Vec<usize> = config
            .subscriptions
            .iter()
            .enumerate()
            .filter(|(_, s)| s.id.starts_with(id_prefix))
            .map(|(i, _)| i)
            .collect();

        match matching.as_slice() {
            [] => return Err(Error::SubscriptionNotFound(id_prefix.to_string())),
            [idx] => {
                let removed = if hard {
                    config.subscriptions.remove(*idx)
                } else {
                    let sub = &mut config.subscriptions[*idx];
                    sub.active = false;
                    sub.updated_at = utc_now();
                    sub.clone()
                };
                self.save(&mut config)?;
                Ok(removed)
            }
            _ => Err(Error::SubscriptionNotFound(format!(
                "{id_prefix} (ambiguous prefix)"
            ))),
        }
    }

    /// Replace an existing subscription in place.
    pub fn update_subscription(&self, sub: Subscription) -> Result<()> {
        let mut config = self.load()?;
        let Some(slot) = config.subscriptions.iter_mut().find(|s| s.id == sub.id) else {
            return Err(Error::SubscriptionNotFound(sub.id));
        };
        *slot = Subscription {
            updated_at: utc_now(),
            ..sub
        };
        self.save(&mut config)
    }

    pub fn get_baseline(&self) -> Result<String> {
        Ok(self.load()?.repo.baseline_ref)
    }

    pub fn update_baseline(&self, new_ref: &str) -> Result<()> {
        let mut config = self.load()?;
        config.repo.baseline_ref = new_ref.to_string();
        self.save(&mut config)
    }
}

/// Write-temp-then-rename in the target's directory, cleaning up the
/// temp file on failure.
pub(crate) fn write_atomic(dir: &Path, target: &Path, text: &str) -> Result<()> {
    let temp_path = dir.join(format!(".{}.tmp", std::process::id()));

    std::fs::write(&temp_path, text)
        .map_err(|e| Error::io(format!("writing {}", temp_path.display()), e))?;

    std::fs::rename(&temp_path, target).map_err(|e| {
        let _ = std::fs::remove_file(&temp_path);
        Error::io(format!("renaming into {}", target.display()), e)
    })
}
