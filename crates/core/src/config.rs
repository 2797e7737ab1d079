//! Monitor configuration: watched resources and persistence settings.
//!
//! Loaded from a JSON file (created with defaults when missing), then
//! overridden from the environment.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::info;

use crate::kinds::ResourceKind;

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("reading config {path}: {source}")]
    Io { path: PathBuf, source: std::io::Error },
    #[error("parsing config {path}: {source}")]
    Parse { path: PathBuf, source: serde_json::Error },
    #[error("encoding config: {0}")]
    Encode(#[source] serde_json::Error),
    #[error("invalid config: {0}")]
    Invalid(String),
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct ResourceConfig {
    /// Resource tag, e.g. "pods".
    pub name: String,
    pub enabled: bool,
    /// Empty or absent means all namespaces.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub namespace: Option<String>,
    #[serde(default)]
    pub description: String,
}

impl ResourceConfig {
    pub fn new(name: &str, enabled: bool) -> Self {
        let description = match ResourceKind::from_resource_tag(name) {
            Some(k) => format!("Kubernetes {}", k.object_kind()),
            None => String::new(),
        };
        Self { name: name.to_string(), enabled, namespace: None, description }
    }

    pub fn with_namespace(mut self, ns: &str) -> Self {
        self.namespace = Some(ns.to_string());
        self
    }

    pub fn namespace(&self) -> Option<&str> {
        self.namespace.as_deref().filter(|s| !s.is_empty())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase", default)]
pub struct PersistenceConfig {
    pub enabled: bool,
    pub file_path: PathBuf,
    pub auto_save: bool,
    /// Seconds between auto-saves.
    pub save_interval: u64,
}

impl Default for PersistenceConfig {
    fn default() -> Self {
        Self { enabled: true, file_path: PathBuf::from("changes.json"), auto_save: true, save_interval: 30 }
    }
}

impl PersistenceConfig {
    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.save_interval.max(1))
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct MonitorConfig {
    #[serde(default = "default_resources")]
    pub resources: Vec<ResourceConfig>,
    #[serde(default)]
    pub persistence: PersistenceConfig,
}

fn default_resources() -> Vec<ResourceConfig> {
    let on = ["pods", "deployments", "services", "configmaps", "secrets"];
    ResourceKind::ALL
        .iter()
        .map(|k| ResourceConfig::new(k.resource_tag(), on.contains(&k.resource_tag())))
        .collect()
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self { resources: default_resources(), persistence: PersistenceConfig::default() }
    }
}

impl MonitorConfig {
    /// Load from `path`, writing defaults there first when the file is missing,
    /// then apply environment overrides.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let mut cfg = if path.exists() {
            let data = std::fs::read_to_string(path).map_err(|source| ConfigError::Io { path: path.to_path_buf(), source })?;
            serde_json::from_str::<MonitorConfig>(&data).map_err(|source| ConfigError::Parse { path: path.to_path_buf(), source })?
        } else {
            let cfg = MonitorConfig::default();
            cfg.save(path)?;
            info!(path = %path.display(), "created default configuration file");
            cfg
        };
        cfg.apply_env_overrides(|k| std::env::var(k).ok());
        cfg.validate()?;
        Ok(cfg)
    }

    pub fn save(&self, path: &Path) -> Result<(), ConfigError> {
        let data = serde_json::to_string_pretty(self).map_err(ConfigError::Encode)?;
        std::fs::write(path, data).map_err(|source| ConfigError::Io { path: path.to_path_buf(), source })
    }

    /// Overrides: `KMON_PERSIST_PATH` (or legacy `PERSISTENCE_FILE_PATH`) and
    /// `KMON_SAVE_INTERVAL`.
    pub fn apply_env_overrides<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        let path = lookup("KMON_PERSIST_PATH").or_else(|| lookup("PERSISTENCE_FILE_PATH"));
        if let Some(p) = path.filter(|p| !p.is_empty()) {
            info!(path = %p, "persistence file path from environment");
            self.persistence.file_path = PathBuf::from(p);
        }
        if let Some(secs) = lookup("KMON_SAVE_INTERVAL").and_then(|s| s.parse::<u64>().ok()) {
            self.persistence.save_interval = secs;
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.persistence.enabled && self.persistence.auto_save && self.persistence.save_interval == 0 {
            return Err(ConfigError::Invalid("persistence.saveInterval must be > 0 when autoSave is on".into()));
        }
        if self.persistence.enabled && self.persistence.file_path.as_os_str().is_empty() {
            return Err(ConfigError::Invalid("persistence.filePath is empty".into()));
        }
        Ok(())
    }

    pub fn enabled_resources(&self) -> Vec<ResourceConfig> {
        self.resources.iter().filter(|r| r.enabled).cloned().collect()
    }

    pub fn is_resource_enabled(&self, name: &str) -> bool {
        self.resources.iter().any(|r| r.name == name && r.enabled)
    }
}
