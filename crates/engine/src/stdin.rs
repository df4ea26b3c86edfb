//! Piped-stdin handling.
//!
//! pflow accepts piped data on stdin in two modes: a workflow document
//! (JSON with an `ir_version` key) to execute, or plain data made
//! available to nodes under the shared store's `stdin` key.

use serde_json::Value;

use pflow_types::SharedStore;
use pflow_types::store::STDIN_KEY;

/// How piped stdin content should be interpreted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StdinMode {
    /// The content is a workflow IR document to execute.
    Workflow,
    /// The content is data for the shared store.
    Data,
}

/// Strips exactly one trailing newline, preserving any other whitespace
/// the sender intended. Empty content is treated as no input.
pub fn normalize_stdin(content: &str) -> Option<String> {
    if content.is_empty() {
        return None;
    }
    let trimmed = content.strip_suffix('\n').unwrap_or(content);
    Some(trimmed.to_string())
}

/// Classifies stdin content: a JSON object carrying `ir_version` is a
/// workflow document, everything else is data.
pub fn determine_stdin_mode(content: &str) -> StdinMode {
    if let Ok(Value::Object(map)) = serde_json::from_str::<Value>(content)
        && map.contains_key("ir_version")
    {
        return StdinMode::Workflow;
    }
    StdinMode::Data
}

/// Stores data-mode stdin content under the conventional `stdin` key.
pub fn populate_shared_store(shared: &mut SharedStore, content: &str) {
    shared.insert(STDIN_KEY, Value::String(content.to_string()));
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn strips_exactly_one_trailing_newline() {
        assert_eq!(normalize_stdin("data\n"), Some("data".to_string()));
        assert_eq!(normalize_stdin("data\n\n"), Some("data\n".to_string()));
        assert_eq!(normalize_stdin("  spaced  "), Some("  spaced  ".to_string()));
        assert_eq!(normalize_stdin(""), None);
    }

    #[test]
    fn classifies_workflow_documents() {
        let workflow = r#"{"ir_version": "0.1.0", "nodes": []}"#;
        assert_eq!(determine_stdin_mode(workflow), StdinMode::Workflow);
        assert_eq!(determine_stdin_mode(r#"{"other": 1}"#), StdinMode::Data);
        assert_eq!(determine_stdin_mode("plain text"), StdinMode::Data);
        assert_eq!(determine_stdin_mode("[1, 2, 3]"), StdinMode::Data);
    }

    #[test]
    fn populates_reserved_key() {
        let mut shared = SharedStore::new();
        populate_shared_store(&mut shared, "piped content");
        assert_eq!(shared.get("stdin"), Some(&json!("piped content")));
    }
}
