//! File read/write nodes.

use std::fs;
use std::path::Path;

use serde_json::{Value, json};

use pflow_types::{DEFAULT_ACTION, NodeBehavior, NodeError, ParamMap, SharedStore};

/// Reads a UTF-8 text file into the shared store under `content`.
pub struct ReadFileNode;

impl NodeBehavior for ReadFileNode {
    fn prep(&self, _shared: &SharedStore, params: &ParamMap) -> Result<Value, NodeError> {
        let file_path = params
            .get("file_path")
            .and_then(Value::as_str)
            .ok_or_else(|| NodeError::fatal("read-file node requires a 'file_path' parameter"))?;
        Ok(json!(file_path))
    }

    fn exec(&self, prep: Value, _params: &ParamMap) -> Result<Value, NodeError> {
        let file_path = prep.as_str().unwrap_or_default();
        let content = fs::read_to_string(file_path)
            .map_err(|error| NodeError::transient(format!("failed to read {file_path}: {error}")))?;
        Ok(json!(content))
    }

    fn post(
        &self,
        shared: &mut SharedStore,
        prep: &Value,
        exec: Value,
        _params: &ParamMap,
    ) -> Result<String, NodeError> {
        shared.insert("content", exec);
        shared.insert("file_path", prep.clone());
        Ok(DEFAULT_ACTION.to_string())
    }
}

/// Writes content to a file, creating parent directories as needed.
/// Non-string content is serialized as pretty JSON.
pub struct WriteFileNode;

impl NodeBehavior for WriteFileNode {
    fn prep(&self, _shared: &SharedStore, params: &ParamMap) -> Result<Value, NodeError> {
        let file_path = params
            .get("file_path")
            .and_then(Value::as_str)
            .ok_or_else(|| NodeError::fatal("write-file node requires a 'file_path' parameter"))?;
        let content = params
            .get("content")
            .cloned()
            .ok_or_else(|| NodeError::fatal("write-file node requires a 'content' parameter"))?;
        Ok(json!({"file_path": file_path, "content": content}))
    }

    fn exec(&self, prep: Value, _params: &ParamMap) -> Result<Value, NodeError> {
        let file_path = prep["file_path"].as_str().unwrap_or_default();
        let rendered = match &prep["content"] {
            Value::String(text) => text.clone(),
            other => serde_json::to_string_pretty(other)
                .map_err(|error| NodeError::fatal(format!("unserializable content: {error}")))?,
        };

        if let Some(parent) = Path::new(file_path).parent()
            && !parent.as_os_str().is_empty()
        {
            fs::create_dir_all(parent).map_err(|error| {
                NodeError::transient(format!("failed to create {}: {error}", parent.display()))
            })?;
        }
        fs::write(file_path, &rendered)
            .map_err(|error| NodeError::transient(format!("failed to write {file_path}: {error}")))?;
        Ok(json!({"file_path": file_path, "bytes_written": rendered.len()}))
    }

    fn post(
        &self,
        shared: &mut SharedStore,
        _prep: &Value,
        exec: Value,
        _params: &ParamMap,
    ) -> Result<String, NodeError> {
        shared.insert("file_path", exec["file_path"].clone());
        shared.insert("bytes_written", exec["bytes_written"].clone());
        Ok(DEFAULT_ACTION.to_string())
    }
}
