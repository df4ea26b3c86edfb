//! Saved-workflow persistence.
//!
//! A flat name-to-document store under the workflows directory. Writes are
//! atomic (write-to-temp + rename) so interleaved readers always see a
//! consistent snapshot; corrupt documents are skipped with a warning
//! rather than failing the whole listing.

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result, bail};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::warn;

use pflow_util::atomic_write;

use crate::config::default_workflows_path;

/// A persisted workflow document with its save metadata.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SavedWorkflow {
    /// Store key, also the file stem.
    pub name: String,
    /// Optional description shown in listings.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// When the document was saved.
    pub saved_at: DateTime<Utc>,
    /// The workflow IR document itself.
    pub ir: Value,
}

/// Flat name-to-document store for workflow IR.
#[derive(Debug, Clone)]
pub struct WorkflowStore {
    root: PathBuf,
}

impl WorkflowStore {
    /// Opens a store rooted at the given directory.
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Opens the store at the default workflows directory.
    pub fn open_default() -> Self {
        Self::new(default_workflows_path())
    }

    /// Directory backing this store.
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Saves a workflow document. Refuses to replace an existing document
    /// unless `overwrite` is set.
    pub fn save(
        &self,
        name: &str,
        ir: Value,
        description: Option<String>,
        overwrite: bool,
    ) -> Result<()> {
        validate_name(name)?;
        let path = self.document_path(name);
        if path.exists() && !overwrite {
            bail!("workflow '{name}' already exists; pass --overwrite to replace it");
        }

        let document = SavedWorkflow {
            name: name.to_string(),
            description,
            saved_at: Utc::now(),
            ir,
        };
        let content =
            serde_json::to_string_pretty(&document).context("serialize workflow document")?;
        atomic_write(&path, &content)
    }

    /// Loads a workflow document by name.
    pub fn load(&self, name: &str) -> Result<SavedWorkflow> {
        validate_name(name)?;
        let path = self.document_path(name);
        let content = fs::read_to_string(&path)
            .with_context(|| format!("workflow '{name}' not found at {}", path.display()))?;
        serde_json::from_str(&content)
            .with_context(|| format!("parse workflow document {}", path.display()))
    }

    /// Loads only the IR from a saved workflow.
    pub fn load_ir(&self, name: &str) -> Result<Value> {
        Ok(self.load(name)?.ir)
    }

    /// Lists all saved workflows sorted by name. Corrupt files are skipped
    /// with a warning.
    pub fn list_all(&self) -> Result<Vec<SavedWorkflow>> {
        if !self.root.exists() {
            return Ok(Vec::new());
        }

        let mut workflows = Vec::new();
        for entry in fs::read_dir(&self.root)
            .with_context(|| format!("read workflow dir {}", self.root.display()))?
        {
            let entry = entry.with_context(|| format!("walk {}", self.root.display()))?;
            let path = entry.path();
            if path.extension().and_then(|ext| ext.to_str()) != Some("json") {
                continue;
            }
            match fs::read_to_string(&path)
                .map_err(anyhow::Error::from)
                .and_then(|content| {
                    serde_json::from_str::<SavedWorkflow>(&content).map_err(anyhow::Error::from)
                }) {
                Ok(workflow) => workflows.push(workflow),
                Err(error) => {
                    warn!(path = %path.display(), %error, "skipping corrupt workflow document");
                }
            }
        }

        workflows.sort_by(|left, right| left.name.cmp(&right.name));
        Ok(workflows)
    }

    /// Returns true when a document with this name exists.
    pub fn exists(&self, name: &str) -> bool {
        validate_name(name).is_ok() && self.document_path(name).exists()
    }

    /// Deletes a saved workflow.
    pub fn delete(&self, name: &str) -> Result<()> {
        validate_name(name)?;
        let path = self.document_path(name);
        fs::remove_file(&path).with_context(|| format!("workflow '{name}' not found"))
    }

    fn document_path(&self, name: &str) -> PathBuf {
        self.root.join(format!("{name}.json"))
    }
}

fn validate_name(name: &str) -> Result<()> {
    if name.is_empty() {
        bail!("workflow name cannot be empty");
    }
    if name.contains(['/', '\\', '.']) {
        bail!("workflow name '{name}' cannot contain path separators or dots");
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn sample_ir() -> Value {
        json!({
            "ir_version": "0.1.0",
            "nodes": [{"id": "n1", "type": "shell", "params": {"command": "true"}}]
        })
    }

    #[test]
    fn save_load_round_trip() {
        let dir = tempfile::tempdir().expect("tempdir");
        let store = WorkflowStore::new(dir.path());

        store
            .save("greet", sample_ir(), Some("says hello".into()), false)
            .expect("save");
        assert!(store.exists("greet"));

        let loaded = store.load("greet").expect("load");
        assert_eq!(loaded.name, "greet");
        assert_eq!(loaded.description.as_deref(), Some("says hello"));
        assert_eq!(store.load_ir("greet").expect("load ir"), sample_ir());
    }

    #[test]
    fn refuses_overwrite_unless_instructed() {
        let dir = tempfile::tempdir().expect("tempdir");
        let store = WorkflowStore::new(dir.path());

        store.save("greet", sample_ir(), None, false).expect("save");
        assert!(store.save("greet", sample_ir(), None, false).is_err());
        store
            .save("greet", sample_ir(), None, true)
            .expect("overwrite");
    }

    #[test]
    fn list_skips_corrupt_documents() {
        let dir = tempfile::tempdir().expect("tempdir");
        let store = WorkflowStore::new(dir.path());

        store.save("beta", sample_ir(), None, false).expect("save");
        store.save("alpha", sample_ir(), None, false).expect("save");
        fs::write(dir.path().join("broken.json"), "{not json").expect("write corrupt");

        let listed = store.list_all().expect("list");
        let names: Vec<&str> = listed.iter().map(|w| w.name.as_str()).collect();
        assert_eq!(names, vec!["alpha", "beta"]);
    }

    #[test]
    fn delete_removes_document() {
        let dir = tempfile::tempdir().expect("tempdir");
        let store = WorkflowStore::new(dir.path());

        store.save("gone", sample_ir(), None, false).expect("save");
        store.delete("gone").expect("delete");
        assert!(!store.exists("gone"));
        assert!(store.delete("gone").is_err());
    }

    #[test]
    fn rejects_path_traversal_names() {
        let dir = tempfile::tempdir().expect("tempdir");
        let store = WorkflowStore::new(dir.path());
        assert!(store.save("../evil", sample_ir(), None, false).is_err());
        assert!(store.save("a.b", sample_ir(), None, false).is_err());
    }
}
