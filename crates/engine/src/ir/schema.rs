//! Structural validation of a raw IR document.
//!
//! Equivalent to a JSON-schema pass plus the reference checks a schema
//! cannot express: every check produces a [`ValidationError`] carrying the
//! dotted path of the offending field and a fix suggestion. The first
//! failing check wins; callers wanting every problem compose this with the
//! workflow validator.

use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::{Map as JsonMap, Value};

use pflow_types::ValidationError;

static SEMVER_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^\d+\.\d+\.\d+$").expect("valid semver pattern"));
static BATCH_VAR_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[a-zA-Z_][a-zA-Z0-9_]*$").expect("valid batch variable pattern"));
static BATCH_ITEMS_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^\$\{.+\}$").expect("valid batch items pattern"));

const DOCUMENT_KEYS: &[&str] = &[
    "ir_version",
    "nodes",
    "edges",
    "start_node",
    "mappings",
    "inputs",
    "outputs",
    "enable_namespacing",
    "template_resolution_mode",
];
const NODE_KEYS: &[&str] = &["id", "type", "purpose", "params", "batch"];
const EDGE_KEYS: &[&str] = &["from", "to", "action"];
const BATCH_KEYS: &[&str] = &["items", "as", "error_handling"];
const INPUT_KEYS: &[&str] = &["description", "required", "type", "default"];
const OUTPUT_KEYS: &[&str] = &["description", "type", "source"];
const VALUE_TYPES: &[&str] = &["string", "number", "boolean", "object", "array"];

/// Validates an IR document against the structural rules.
///
/// Returns the first violation found, with a dotted path and suggestion.
pub fn validate_ir(ir: &Value) -> Result<(), ValidationError> {
    let document = ir.as_object().ok_or_else(|| {
        ValidationError::new("document must be a JSON object")
            .at("root")
            .suggest("Change type to 'object'")
    })?;

    reject_unknown_keys(document, DOCUMENT_KEYS, "")?;
    check_ir_version(document)?;
    check_nodes(document)?;
    check_edges(document)?;
    check_start_node(document)?;
    check_mappings(document)?;
    check_inputs(document)?;
    check_outputs(document)?;
    check_flags(document)?;
    check_edge_references(document)?;
    check_duplicate_node_ids(document)?;
    Ok(())
}

fn reject_unknown_keys(
    map: &JsonMap<String, Value>,
    allowed: &[&str],
    path_prefix: &str,
) -> Result<(), ValidationError> {
    for key in map.keys() {
        if !allowed.contains(&key.as_str()) {
            let path = if path_prefix.is_empty() {
                "root".to_string()
            } else {
                path_prefix.to_string()
            };
            return Err(ValidationError::new(format!(
                "Additional properties are not allowed ('{key}' was unexpected)"
            ))
            .at(path)
            .suggest("Remove unknown properties or check field names"));
        }
    }
    Ok(())
}

fn check_ir_version(document: &JsonMap<String, Value>) -> Result<(), ValidationError> {
    let Some(version) = document.get("ir_version") else {
        return Err(
            ValidationError::new("'ir_version' is a required property")
                .at("root")
                .suggest("Add the required field 'ir_version'"),
        );
    };
    let Some(version) = version.as_str() else {
        return Err(type_error("ir_version", version, "string"));
    };
    if !SEMVER_RE.is_match(version) {
        return Err(ValidationError::new(format!(
            "'{version}' does not match the IR version pattern"
        ))
        .at("ir_version")
        .suggest("Use semantic versioning format, e.g., '0.1.0'"));
    }
    Ok(())
}

fn check_nodes(document: &JsonMap<String, Value>) -> Result<(), ValidationError> {
    let Some(nodes) = document.get("nodes") else {
        return Err(ValidationError::new("'nodes' is a required property")
            .at("root")
            .suggest("Add the required field 'nodes'"));
    };
    let Some(nodes) = nodes.as_array() else {
        return Err(type_error("nodes", nodes, "array"));
    };
    if nodes.is_empty() {
        return Err(ValidationError::new("[] is too short")
            .at("nodes")
            .suggest("Add at least one node to the workflow"));
    }

    for (index, node) in nodes.iter().enumerate() {
        let path = format!("nodes[{index}]");
        let Some(node) = node.as_object() else {
            return Err(type_error(&path, node, "object"));
        };
        reject_unknown_keys(node, NODE_KEYS, &path)?;
        require_string(node, "id", &path)?;
        require_string(node, "type", &path)?;
        if let Some(purpose) = node.get("purpose")
            && !purpose.is_string()
        {
            return Err(type_error(&format!("{path}.purpose"), purpose, "string"));
        }
        if let Some(params) = node.get("params")
            && !params.is_object()
        {
            return Err(type_error(&format!("{path}.params"), params, "object"));
        }
        if let Some(batch) = node.get("batch") {
            check_batch(batch, &format!("{path}.batch"))?;
        }
    }
    Ok(())
}

fn check_batch(batch: &Value, path: &str) -> Result<(), ValidationError> {
    let Some(batch) = batch.as_object() else {
        return Err(type_error(path, batch, "object"));
    };
    reject_unknown_keys(batch, BATCH_KEYS, path)?;

    let Some(items) = batch.get("items") else {
        return Err(ValidationError::new("'items' is a required property")
            .at(path)
            .suggest("Add the required field 'items'"));
    };
    let Some(items) = items.as_str() else {
        return Err(type_error(&format!("{path}.items"), items, "string"));
    };
    if !BATCH_ITEMS_RE.is_match(items) {
        return Err(ValidationError::new(format!(
            "'{items}' is not a template reference"
        ))
        .at(format!("{path}.items"))
        .suggest("Point 'items' at an array with a template, e.g. '${node.files}'"));
    }

    if let Some(bind_as) = batch.get("as") {
        let Some(bind_as) = bind_as.as_str() else {
            return Err(type_error(&format!("{path}.as"), bind_as, "string"));
        };
        if !BATCH_VAR_RE.is_match(bind_as) {
            return Err(ValidationError::new(format!(
                "'{bind_as}' is not a valid variable name"
            ))
            .at(format!("{path}.as"))
            .suggest("Use a letter or underscore followed by letters, digits, or underscores"));
        }
    }

    if let Some(policy) = batch.get("error_handling") {
        let allowed = policy
            .as_str()
            .is_some_and(|p| p == "fail_fast" || p == "continue");
        if !allowed {
            return Err(ValidationError::new(format!(
                "{policy} is not one of ['fail_fast', 'continue']"
            ))
            .at(format!("{path}.error_handling"))
            .suggest("Use 'fail_fast' to stop on the first error or 'continue' to process all items"));
        }
    }
    Ok(())
}

fn check_edges(document: &JsonMap<String, Value>) -> Result<(), ValidationError> {
    let Some(edges) = document.get("edges") else {
        return Ok(());
    };
    let Some(edges) = edges.as_array() else {
        return Err(type_error("edges", edges, "array"));
    };
    for (index, edge) in edges.iter().enumerate() {
        let path = format!("edges[{index}]");
        let Some(edge) = edge.as_object() else {
            return Err(type_error(&path, edge, "object"));
        };
        reject_unknown_keys(edge, EDGE_KEYS, &path)?;
        require_string(edge, "from", &path)?;
        require_string(edge, "to", &path)?;
        if let Some(action) = edge.get("action")
            && !action.is_string()
        {
            return Err(type_error(&format!("{path}.action"), action, "string"));
        }
    }
    Ok(())
}

fn check_start_node(document: &JsonMap<String, Value>) -> Result<(), ValidationError> {
    let Some(start) = document.get("start_node") else {
        return Ok(());
    };
    let Some(start) = start.as_str() else {
        return Err(type_error("start_node", start, "string"));
    };
    let node_ids = collect_node_ids(document);
    if !node_ids.iter().any(|id| id == start) {
        return Err(ValidationError::new(format!(
            "start_node references non-existent node '{start}'"
        ))
        .at("start_node")
        .suggest(format!("Change to one of: {:?}", sorted(node_ids))));
    }
    Ok(())
}

fn check_mappings(document: &JsonMap<String, Value>) -> Result<(), ValidationError> {
    let Some(mappings) = document.get("mappings") else {
        return Ok(());
    };
    let Some(mappings) = mappings.as_object() else {
        return Err(type_error("mappings", mappings, "object"));
    };
    for (node_id, mapping) in mappings {
        let path = format!("mappings.{node_id}");
        let Some(mapping) = mapping.as_object() else {
            return Err(type_error(&path, mapping, "object"));
        };
        reject_unknown_keys(mapping, &["input_mappings", "output_mappings"], &path)?;
        for key in ["input_mappings", "output_mappings"] {
            if let Some(renames) = mapping.get(key) {
                let inner_path = format!("{path}.{key}");
                let Some(renames) = renames.as_object() else {
                    return Err(type_error(&inner_path, renames, "object"));
                };
                for (from, to) in renames {
                    if !to.is_string() {
                        return Err(type_error(&format!("{inner_path}.{from}"), to, "string"));
                    }
                }
            }
        }
    }
    Ok(())
}

fn check_inputs(document: &JsonMap<String, Value>) -> Result<(), ValidationError> {
    let Some(inputs) = document.get("inputs") else {
        return Ok(());
    };
    let Some(inputs) = inputs.as_object() else {
        return Err(type_error("inputs", inputs, "object"));
    };
    for (name, input) in inputs {
        let path = format!("inputs.{name}");
        let Some(input) = input.as_object() else {
            return Err(type_error(&path, input, "object"));
        };
        reject_unknown_keys(input, INPUT_KEYS, &path)?;
        if let Some(description) = input.get("description")
            && !description.is_string()
        {
            return Err(type_error(&format!("{path}.description"), description, "string"));
        }
        if let Some(required) = input.get("required")
            && !required.is_boolean()
        {
            return Err(type_error(&format!("{path}.required"), required, "boolean"));
        }
        if let Some(value_type) = input.get("type") {
            check_value_type(value_type, &format!("{path}.type"))?;
        }
    }
    Ok(())
}

fn check_outputs(document: &JsonMap<String, Value>) -> Result<(), ValidationError> {
    let Some(outputs) = document.get("outputs") else {
        return Ok(());
    };
    let Some(outputs) = outputs.as_object() else {
        return Err(type_error("outputs", outputs, "object"));
    };
    for (name, output) in outputs {
        let path = format!("outputs.{name}");
        let Some(output) = output.as_object() else {
            return Err(ValidationError::new(format!(
                "{} is not of type 'object'",
                short_value(output)
            ))
            .at(path)
            .suggest(
                "Each output must be an object, not a string.\n\n\
                 Wrong: \"story\": \"${generate_story.response}\"\n\
                 Right: \"story\": {\"source\": \"${generate_story.response}\"}",
            ));
        };
        for key in output.keys() {
            if !OUTPUT_KEYS.contains(&key.as_str()) {
                return Err(ValidationError::new(format!(
                    "Additional properties are not allowed ('{key}' was unexpected)"
                ))
                .at(path)
                .suggest(output_field_suggestion(key)));
            }
        }
        if let Some(value_type) = output.get("type") {
            check_value_type(value_type, &format!("{path}.type"))?;
        }
        if let Some(source) = output.get("source")
            && !source.is_string()
        {
            return Err(type_error(&format!("{path}.source"), source, "string"));
        }
    }
    Ok(())
}

fn output_field_suggestion(unexpected: &str) -> String {
    let mut lines =
        vec!["Output definitions can only have: description, type, source (all optional)".to_string()];
    match unexpected {
        "value" => lines.push("\nDid you mean 'source' instead of 'value'?".to_string()),
        "from" => lines.push("\nDid you mean 'source' instead of 'from'?".to_string()),
        other => lines.push(format!("\nUnknown field: '{other}'")),
    }
    lines.push(
        "\nExample:\n  \"story\": {\n    \"description\": \"The generated story\",\n    \
         \"type\": \"string\",\n    \"source\": \"${generate_story.response}\"\n  }"
            .to_string(),
    );
    lines.join("\n")
}

fn check_value_type(value_type: &Value, path: &str) -> Result<(), ValidationError> {
    let allowed = value_type
        .as_str()
        .is_some_and(|t| VALUE_TYPES.contains(&t));
    if !allowed {
        return Err(ValidationError::new(format!(
            "{} is not one of {:?}",
            short_value(value_type),
            VALUE_TYPES
        ))
        .at(path)
        .suggest(format!("Type must be one of: {}", VALUE_TYPES.join(", "))));
    }
    Ok(())
}

fn check_flags(document: &JsonMap<String, Value>) -> Result<(), ValidationError> {
    if let Some(flag) = document.get("enable_namespacing")
        && !flag.is_boolean()
    {
        return Err(type_error("enable_namespacing", flag, "boolean"));
    }
    if let Some(mode) = document.get("template_resolution_mode") {
        let allowed = mode
            .as_str()
            .is_some_and(|m| m == "strict" || m == "permissive");
        if !allowed {
            return Err(ValidationError::new(format!(
                "{} is not one of ['strict', 'permissive']",
                short_value(mode)
            ))
            .at("template_resolution_mode")
            .suggest("Use 'strict' to fail on unresolved templates or 'permissive' to warn"));
        }
    }
    Ok(())
}

fn check_edge_references(document: &JsonMap<String, Value>) -> Result<(), ValidationError> {
    let Some(edges) = document.get("edges").and_then(Value::as_array) else {
        return Ok(());
    };
    let node_ids = collect_node_ids(document);

    for (index, edge) in edges.iter().enumerate() {
        let Some(edge) = edge.as_object() else {
            continue;
        };
        for endpoint in ["from", "to"] {
            if let Some(reference) = edge.get(endpoint).and_then(Value::as_str)
                && !node_ids.iter().any(|id| id == reference)
            {
                return Err(ValidationError::new(format!(
                    "Edge references non-existent node '{reference}'"
                ))
                .at(format!("edges[{index}].{endpoint}"))
                .suggest(format!("Change to one of: {:?}", sorted(node_ids.clone()))));
            }
        }
    }
    Ok(())
}

fn check_duplicate_node_ids(document: &JsonMap<String, Value>) -> Result<(), ValidationError> {
    let Some(nodes) = document.get("nodes").and_then(Value::as_array) else {
        return Ok(());
    };
    let mut seen = Vec::new();
    for (index, node) in nodes.iter().enumerate() {
        let Some(id) = node.get("id").and_then(Value::as_str) else {
            continue;
        };
        if seen.contains(&id) {
            return Err(ValidationError::new(format!("Duplicate node ID '{id}'"))
                .at(format!("nodes[{index}].id"))
                .suggest("Use unique IDs for each node"));
        }
        seen.push(id);
    }
    Ok(())
}

fn collect_node_ids(document: &JsonMap<String, Value>) -> Vec<String> {
    document
        .get("nodes")
        .and_then(Value::as_array)
        .map(|nodes| {
            nodes
                .iter()
                .filter_map(|node| node.get("id").and_then(Value::as_str))
                .map(str::to_string)
                .collect()
        })
        .unwrap_or_default()
}

fn sorted(mut ids: Vec<String>) -> Vec<String> {
    ids.sort();
    ids
}

fn require_string(
    map: &JsonMap<String, Value>,
    key: &str,
    path: &str,
) -> Result<(), ValidationError> {
    let Some(value) = map.get(key) else {
        return Err(ValidationError::new(format!("'{key}' is a required property"))
            .at(path)
            .suggest(format!("Add the required field '{key}'")));
    };
    if !value.is_string() {
        return Err(type_error(&format!("{path}.{key}"), value, "string"));
    }
    Ok(())
}

fn type_error(path: &str, value: &Value, expected: &str) -> ValidationError {
    let actual = match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    };
    ValidationError::new(format!(
        "{} is not of type '{expected}'",
        short_value(value)
    ))
    .at(path)
    .suggest(format!("Change type from '{actual}' to '{expected}'"))
}

fn short_value(value: &Value) -> String {
    let rendered = value.to_string();
    if rendered.chars().count() > 60 {
        let prefix: String = rendered.chars().take(57).collect();
        format!("{prefix}...")
    } else {
        rendered
    }
}
