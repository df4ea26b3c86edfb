//! Mechanical IR fix-ups applied before validation.

use serde_json::{Value, json};

/// Fills boilerplate fields that authored and agent-generated documents
/// commonly omit. Mutates the document in place and is idempotent.
///
/// - `ir_version` defaults to `0.1.0`
/// - `edges` defaults to `[]`
/// - per-node legacy `parameters` is renamed to `params` when only the
///   former is present
pub fn normalize_ir(ir: &mut Value) {
    let Some(document) = ir.as_object_mut() else {
        return;
    };

    if !document.contains_key("ir_version") {
        document.insert("ir_version".to_string(), json!("0.1.0"));
    }
    if !document.contains_key("edges") {
        document.insert("edges".to_string(), json!([]));
    }

    if let Some(nodes) = document.get_mut("nodes").and_then(Value::as_array_mut) {
        for node in nodes.iter_mut().filter_map(Value::as_object_mut) {
            if node.contains_key("parameters") && !node.contains_key("params") {
                let legacy = node.remove("parameters").unwrap_or(Value::Null);
                node.insert("params".to_string(), legacy);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn fills_missing_boilerplate() {
        let mut ir = json!({"nodes": [{"id": "n1", "type": "test"}]});
        normalize_ir(&mut ir);
        assert_eq!(ir["ir_version"], "0.1.0");
        assert_eq!(ir["edges"], json!([]));
    }

    #[test]
    fn renames_legacy_parameters() {
        let mut ir = json!({
            "nodes": [{"id": "n1", "type": "test", "parameters": {"x": 1}}]
        });
        normalize_ir(&mut ir);
        assert_eq!(ir["nodes"][0]["params"], json!({"x": 1}));
        assert!(ir["nodes"][0].get("parameters").is_none());
    }

    #[test]
    fn params_wins_when_both_present() {
        let mut ir = json!({
            "nodes": [{"id": "n1", "type": "test", "params": {"a": 1}, "parameters": {"b": 2}}]
        });
        normalize_ir(&mut ir);
        assert_eq!(ir["nodes"][0]["params"], json!({"a": 1}));
    }

    #[test]
    fn normalization_is_idempotent() {
        let mut once = json!({"nodes": [{"id": "n1", "type": "test", "parameters": {"x": 1}}]});
        normalize_ir(&mut once);
        let mut twice = once.clone();
        normalize_ir(&mut twice);
        assert_eq!(once, twice);
    }
}
