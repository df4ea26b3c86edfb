//! The node type catalog.

use std::path::Path;

use anyhow::{Context, Result};
use chrono::Utc;
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use pflow_types::{NodeConstructor, NodeInterface};
use pflow_util::atomic_write;

/// One catalog entry: implementation locator, declared interface, and the
/// constructor when the implementation is linked into this binary.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NodeEntry {
    /// External kebab-case node type, e.g. `read-file`.
    pub name: String,
    /// Module path of the implementation.
    pub module: String,
    /// Implementation type name, e.g. `ReadFileNode`.
    pub class_name: String,
    /// Source file of the implementation, for diagnostics.
    pub file_path: String,
    /// One-line summary shown in listings.
    #[serde(default)]
    pub description: String,
    /// Declared inputs, outputs, params, and actions.
    #[serde(default)]
    pub interface: NodeInterface,
    /// True for LLM-bearing types that need a `model` parameter injected
    /// at compile time.
    #[serde(default)]
    pub requires_model: bool,
    /// Constructor; absent for entries loaded from a manifest.
    #[serde(skip)]
    pub constructor: Option<NodeConstructor>,
}

impl NodeEntry {
    /// Instantiates the node when a constructor is registered.
    pub fn instantiate(&self) -> Option<Box<dyn pflow_types::NodeBehavior>> {
        self.constructor.map(|build| build())
    }
}

/// Catalog of node types plus auxiliary scan metadata.
#[derive(Debug, Clone, Default)]
pub struct Registry {
    entries: IndexMap<String, NodeEntry>,
    metadata: IndexMap<String, Value>,
}

impl Registry {
    /// Creates an empty catalog.
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers an entry under its name, replacing any previous entry and
    /// stamping the scan timestamp.
    pub fn register(&mut self, entry: NodeEntry) {
        self.metadata.insert(
            "last_scan".to_string(),
            Value::String(Utc::now().to_rfc3339()),
        );
        self.entries.insert(entry.name.clone(), entry);
    }

    /// Full map of node types to entries.
    pub fn load(&self) -> &IndexMap<String, NodeEntry> {
        &self.entries
    }

    /// Looks up a single entry.
    pub fn get(&self, node_type: &str) -> Option<&NodeEntry> {
        self.entries.get(node_type)
    }

    /// Filtered subset of entries for the given types. Unknown types are
    /// simply absent from the result.
    pub fn get_nodes_metadata<'a, I>(&self, types: I) -> IndexMap<String, NodeEntry>
    where
        I: IntoIterator<Item = &'a str>,
    {
        types
            .into_iter()
            .filter_map(|node_type| {
                self.entries
                    .get(node_type)
                    .map(|entry| (node_type.to_string(), entry.clone()))
            })
            .collect()
    }

    /// Registered node type names.
    pub fn list_nodes(&self) -> Vec<String> {
        self.entries.keys().cloned().collect()
    }

    /// Reads an auxiliary metadata value, falling back to `default`.
    pub fn get_metadata(&self, key: &str, default: Value) -> Value {
        self.metadata.get(key).cloned().unwrap_or(default)
    }

    /// Writes an auxiliary metadata value.
    pub fn set_metadata(&mut self, key: impl Into<String>, value: Value) {
        self.metadata.insert(key.into(), value);
    }

    /// Serializes the interface-only manifest view of the catalog.
    pub fn to_manifest(&self) -> RegistryManifest {
        RegistryManifest {
            nodes: self.entries.clone(),
            metadata: self.metadata.clone(),
        }
    }

    /// Persists the manifest as pretty JSON via an atomic write.
    pub fn save_manifest(&self, path: &Path) -> Result<()> {
        let manifest = self.to_manifest();
        let content = serde_json::to_string_pretty(&manifest)
            .context("serialize registry manifest")?;
        atomic_write(path, &content)
    }

    /// Loads a catalog from a serialized manifest. Entries carry no
    /// constructors; pair with explicit registration to make them runnable.
    pub fn load_manifest(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("read registry manifest {}", path.display()))?;
        let manifest: RegistryManifest = serde_json::from_str(&content)
            .with_context(|| format!("parse registry manifest {}", path.display()))?;
        Ok(Self {
            entries: manifest.nodes,
            metadata: manifest.metadata,
        })
    }
}

/// Serialized catalog document: per-type entries plus a metadata map.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RegistryManifest {
    /// Node entries keyed by type.
    pub nodes: IndexMap<String, NodeEntry>,
    /// Scan timestamps, checksums, and other auxiliary values.
    #[serde(default)]
    pub metadata: IndexMap<String, Value>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use pflow_types::PortSpec;
    use serde_json::json;

    fn sample_entry(name: &str) -> NodeEntry {
        NodeEntry {
            name: name.to_string(),
            module: format!("pflow_nodes::{}", name.replace('-', "_")),
            class_name: "SampleNode".to_string(),
            file_path: "crates/nodes/src/sample.rs".to_string(),
            description: "sample".to_string(),
            interface: NodeInterface {
                outputs: vec![PortSpec::new("stdout", "str")],
                ..Default::default()
            },
            requires_model: false,
            constructor: None,
        }
    }

    #[test]
    fn register_and_filter() {
        let mut registry = Registry::new();
        registry.register(sample_entry("shell"));
        registry.register(sample_entry("read-file"));

        assert_eq!(registry.list_nodes(), vec!["shell", "read-file"]);
        let subset = registry.get_nodes_metadata(["shell", "missing"]);
        assert_eq!(subset.len(), 1);
        assert!(subset.contains_key("shell"));
    }

    #[test]
    fn metadata_defaults() {
        let mut registry = Registry::new();
        assert_eq!(registry.get_metadata("checksum", json!(null)), json!(null));
        registry.set_metadata("checksum", json!("abc"));
        assert_eq!(registry.get_metadata("checksum", json!(null)), json!("abc"));
    }

    #[test]
    fn manifest_round_trips_without_constructors() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("registry.json");

        let mut registry = Registry::new();
        registry.register(sample_entry("shell"));
        registry.save_manifest(&path).expect("save manifest");

        let loaded = Registry::load_manifest(&path).expect("load manifest");
        assert_eq!(loaded.list_nodes(), vec!["shell"]);
        let entry = loaded.get("shell").expect("entry");
        assert!(entry.constructor.is_none());
        assert_eq!(entry.interface.outputs[0].key, "stdout");
        assert!(
            loaded.get_metadata("last_scan", json!(null)).is_string(),
            "scan timestamp should survive the round trip"
        );
    }
}
