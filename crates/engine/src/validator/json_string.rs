//! JSON-string template anti-pattern detection.
//!
//! A string parameter that is itself hand-built JSON carrying `${...}`
//! references fails at runtime the moment a substituted value contains a
//! quote, newline, or backslash: substitution is context-unaware and does
//! not escape for JSON. The fix is object syntax, which serializes with
//! proper escaping.

use serde_json::Value;

use pflow_registry::Registry;
use pflow_types::WorkflowIr;

use crate::template::extract_expressions;

/// Checks every string-typed node parameter for manually constructed JSON
/// carrying template references.
pub fn validate_json_string_templates(ir: &WorkflowIr, registry: &Registry) -> Vec<String> {
    let mut errors = Vec::new();

    for node in &ir.nodes {
        let Some(entry) = registry.get(&node.node_type) else {
            continue;
        };
        let param_types = entry.interface.param_types();

        for (param_key, param_value) in &node.params {
            let expected = param_types.get(param_key.as_str()).copied();
            if let Some(error) = check_param(param_key, param_value, expected, &node.id) {
                errors.push(error);
            }
        }
    }

    errors
}

fn check_param(
    param_key: &str,
    param_value: &Value,
    expected_type: Option<&str>,
    node_id: &str,
) -> Option<String> {
    if expected_type != Some("str") {
        return None;
    }
    let Value::String(text) = param_value else {
        return None;
    };
    if !text.contains("${") {
        return None;
    }

    let stripped = text.trim();
    let is_json_object = stripped.starts_with("{\"");
    let is_json_array = stripped.starts_with("[\"") || stripped.starts_with("[{");
    if !(is_json_object || is_json_array) {
        return None;
    }

    let kind = if is_json_object { "object" } else { "array" };
    let templates = extract_expressions(text);
    let template_mention = templates
        .first()
        .map(|expression| format!("${{{expression}}}"))
        .unwrap_or_else(|| "the template".to_string());

    let escaped_value = text.replace('\\', "\\\\").replace('"', "\\\"");

    Some(format!(
        "Node '{node_id}' parameter '{param_key}' will fail if {template_mention} contains \
         newlines or quotes.\n\n\
         Replace JSON string with {kind} syntax:\n  \
         \u{2717}  \"{param_key}\": \"{escaped_value}\"\n  \
         \u{2713}  \"{param_key}\": {text}\n\n\
         Objects are auto-serialized with proper JSON escaping."
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use pflow_registry::NodeEntry;
    use pflow_types::{NodeInterface, PortSpec};
    use serde_json::json;

    fn registry() -> Registry {
        let mut registry = Registry::new();
        registry.register(NodeEntry {
            name: "http".into(),
            module: "pflow_nodes::http".into(),
            class_name: "HttpNode".into(),
            file_path: "crates/nodes/src/http.rs".into(),
            description: "http request".into(),
            interface: NodeInterface {
                params: vec![
                    PortSpec::new("body_schema", "str"),
                    PortSpec::new("payload", "dict"),
                ],
                ..Default::default()
            },
            requires_model: false,
            constructor: None,
        });
        registry
    }

    fn ir_with_param(value: Value) -> WorkflowIr {
        WorkflowIr::from_value(json!({
            "ir_version": "0.1.0",
            "nodes": [{"id": "call", "type": "http", "params": {"body_schema": value}}]
        }))
        .expect("valid IR")
    }

    #[test]
    fn detects_json_object_string_with_template() {
        let ir = ir_with_param(json!("{\"content\": \"${text}\"}"));
        let errors = validate_json_string_templates(&ir, &registry());
        assert_eq!(errors.len(), 1);
        assert!(errors[0].contains("will fail if ${text} contains"));
        assert!(errors[0].contains("object syntax"));
        assert!(errors[0].contains("auto-serialized"));
    }

    #[test]
    fn detects_json_array_string_with_template() {
        let ir = ir_with_param(json!("[{\"x\": \"${y}\"}]"));
        let errors = validate_json_string_templates(&ir, &registry());
        assert_eq!(errors.len(), 1);
        assert!(errors[0].contains("array syntax"));
    }

    #[test]
    fn plain_template_strings_pass() {
        let ir = ir_with_param(json!("${text}"));
        assert!(validate_json_string_templates(&ir, &registry()).is_empty());
    }

    #[test]
    fn json_without_templates_passes() {
        let ir = ir_with_param(json!("{\"static\": true}"));
        assert!(validate_json_string_templates(&ir, &registry()).is_empty());
    }

    #[test]
    fn object_valued_params_pass() {
        let ir = WorkflowIr::from_value(json!({
            "ir_version": "0.1.0",
            "nodes": [{"id": "call", "type": "http",
                       "params": {"payload": {"content": "${text}"}}}]
        }))
        .expect("valid IR");
        assert!(validate_json_string_templates(&ir, &registry()).is_empty());
    }

    #[test]
    fn non_str_declared_params_pass() {
        // payload is declared dict; a JSON string there is a different
        // problem, not this anti-pattern.
        let ir = WorkflowIr::from_value(json!({
            "ir_version": "0.1.0",
            "nodes": [{"id": "call", "type": "http",
                       "params": {"payload": "{\"content\": \"${text}\"}"}}]
        }))
        .expect("valid IR");
        assert!(validate_json_string_templates(&ir, &registry()).is_empty());
    }
}
