//! Saved-workflow store commands.

use std::path::Path;

use anyhow::{Context, Result};

use pflow_engine::{load_document, parse_markdown};
use pflow_registry::WorkflowStore;

/// Lists saved workflows, sorted by name.
pub fn list() -> Result<i32> {
    let store = WorkflowStore::open_default();
    let workflows = store.list_all()?;
    if workflows.is_empty() {
        println!("No saved workflows");
        return Ok(0);
    }
    for workflow in workflows {
        match &workflow.description {
            Some(description) => println!("{:<20} {description}", workflow.name),
            None => println!("{}", workflow.name),
        }
    }
    Ok(0)
}

/// Validates and saves a workflow file under a name.
pub fn save(name: &str, file: &Path, description: Option<String>, overwrite: bool) -> Result<i32> {
    let content =
        std::fs::read_to_string(file).with_context(|| format!("read {}", file.display()))?;
    let raw = if file.extension().and_then(|ext| ext.to_str()) == Some("md") {
        parse_markdown(&content)?.ir
    } else {
        serde_json::from_str(&content).with_context(|| format!("parse {}", file.display()))?
    };

    // Structural validation before anything lands in the store.
    load_document(raw.clone()).map_err(anyhow::Error::from)?;

    let store = WorkflowStore::open_default();
    store.save(name, raw, description, overwrite)?;
    println!("Saved workflow '{name}'");
    Ok(0)
}

/// Prints a saved workflow's IR as pretty JSON.
pub fn show(name: &str) -> Result<i32> {
    let store = WorkflowStore::open_default();
    let ir = store.load_ir(name)?;
    println!("{}", serde_json::to_string_pretty(&ir)?);
    Ok(0)
}

/// Deletes a saved workflow.
pub fn delete(name: &str) -> Result<i32> {
    let store = WorkflowStore::open_default();
    store.delete(name)?;
    println!("Deleted workflow '{name}'");
    Ok(0)
}
