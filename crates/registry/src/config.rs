//! Configuration path conventions.
//!
//! All durable state lives under a single configuration root, resolvable
//! through environment overrides for tests and alternate installs.

use std::env;
use std::path::PathBuf;

use dirs_next::config_dir;

/// Root directory for pflow configuration and stores.
///
/// `PFLOW_CONFIG_PATH` overrides the platform default when set and
/// non-empty.
pub fn default_config_root() -> PathBuf {
    if let Ok(path) = env::var("PFLOW_CONFIG_PATH")
        && !path.trim().is_empty()
    {
        return PathBuf::from(path);
    }
    config_dir().unwrap_or_else(|| PathBuf::from(".")).join("pflow")
}

/// Path of the settings document (environment store and defaults).
pub fn settings_path() -> PathBuf {
    default_config_root().join("settings.json")
}

/// Directory holding saved workflow documents.
///
/// `PFLOW_WORKFLOWS_PATH` overrides the default when set and non-empty.
pub fn default_workflows_path() -> PathBuf {
    if let Ok(path) = env::var("PFLOW_WORKFLOWS_PATH")
        && !path.trim().is_empty()
    {
        return PathBuf::from(path);
    }
    default_config_root().join("workflows")
}

/// Path of the serialized registry manifest.
pub fn registry_manifest_path() -> PathBuf {
    default_config_root().join("registry.json")
}
