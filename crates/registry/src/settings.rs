//! Persistent settings: the environment store and workflow defaults.

use std::fs;
use std::path::Path;

use anyhow::{Context, Result};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

use pflow_util::atomic_write;

use crate::config::settings_path;

/// Durable settings persisted next to the workflow cache root.
///
/// `env` is the configured environment store: declared workflow inputs
/// whose name matches an entry are satisfied from it when neither the CLI
/// nor the process environment provides a value.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct Settings {
    /// Flat string-to-string environment store.
    #[serde(default)]
    pub env: IndexMap<String, String>,
    /// Model injected into LLM-bearing nodes that do not specify one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default_workflow_model: Option<String>,
}

impl Settings {
    /// Loads settings from the default location; missing or unreadable
    /// files yield defaults.
    pub fn load_default() -> Self {
        Self::load(&settings_path())
    }

    /// Loads settings from an explicit path, falling back to defaults.
    pub fn load(path: &Path) -> Self {
        fs::read_to_string(path)
            .ok()
            .and_then(|content| serde_json::from_str(&content).ok())
            .unwrap_or_default()
    }

    /// Persists settings to the default location.
    pub fn save_default(&self) -> Result<()> {
        self.save(&settings_path())
    }

    /// Persists settings to an explicit path via an atomic write.
    pub fn save(&self, path: &Path) -> Result<()> {
        let content = serde_json::to_string_pretty(self).context("serialize settings")?;
        atomic_write(path, &content)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trips_env_entries() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("settings.json");

        let mut settings = Settings::default();
        settings.env.insert("API_KEY".into(), "abc".into());
        settings.default_workflow_model = Some("test-model".into());
        settings.save(&path).expect("save settings");

        let loaded = Settings::load(&path);
        assert_eq!(loaded, settings);
    }

    #[test]
    fn missing_file_yields_defaults() {
        let dir = tempfile::tempdir().expect("tempdir");
        let loaded = Settings::load(&dir.path().join("absent.json"));
        assert!(loaded.env.is_empty());
        assert!(loaded.default_workflow_model.is_none());
    }

    #[test]
    fn corrupt_file_yields_defaults() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("settings.json");
        fs::write(&path, "{broken").expect("write corrupt");
        assert_eq!(Settings::load(&path), Settings::default());
    }
}
