//! Runtime template resolution against the shared store.
//!
//! Resolution is an AST substitution over the parameter JSON tree: strings
//! that are exactly one `${path}` are replaced by the typed value, strings
//! with interpolation become concatenated text, and objects and arrays are
//! walked recursively. There is no stringify/re-parse round trip.

use serde_json::Value;

use pflow_types::{ParamMap, SharedStore, TemplateError, TemplateMode};

use super::{InterpolationPart, PathSegment, TemplateString, classify, parse_path};

/// Resolves every template reference in a parameter map.
///
/// In strict mode the first unresolved reference fails with a contextual
/// error; in permissive mode the literal `${...}` stays in place and a
/// warning is recorded per unresolved reference.
pub fn resolve_params(
    params: &ParamMap,
    shared: &SharedStore,
    mode: TemplateMode,
    node_id: &str,
) -> Result<(ParamMap, Vec<String>), TemplateError> {
    let mut resolved = ParamMap::new();
    let mut warnings = Vec::new();
    for (key, value) in params {
        let value = resolve_value(value, shared, mode, node_id, key, &mut warnings)?;
        resolved.insert(key.clone(), value);
    }
    Ok((resolved, warnings))
}

/// Substitutes only the references that resolve against `store`, leaving
/// everything else literal and silent. Used at compile time to bake
/// workflow inputs into params while deferring node-output references.
pub fn resolve_partial(params: &ParamMap, store: &SharedStore) -> ParamMap {
    let mut resolved = ParamMap::new();
    let mut warnings = Vec::new();
    for (key, value) in params {
        let value = resolve_value(
            value,
            store,
            TemplateMode::Permissive,
            "",
            key,
            &mut warnings,
        )
        .unwrap_or_else(|_| value.clone());
        resolved.insert(key.clone(), value);
    }
    resolved
}

fn resolve_value(
    value: &Value,
    shared: &SharedStore,
    mode: TemplateMode,
    node_id: &str,
    param: &str,
    warnings: &mut Vec<String>,
) -> Result<Value, TemplateError> {
    match value {
        Value::String(text) => resolve_string(text, shared, mode, node_id, param, warnings),
        Value::Array(items) => {
            let mut resolved = Vec::with_capacity(items.len());
            for item in items {
                resolved.push(resolve_value(item, shared, mode, node_id, param, warnings)?);
            }
            Ok(Value::Array(resolved))
        }
        Value::Object(map) => {
            let mut resolved = serde_json::Map::new();
            for (key, nested) in map {
                resolved.insert(
                    key.clone(),
                    resolve_value(nested, shared, mode, node_id, param, warnings)?,
                );
            }
            Ok(Value::Object(resolved))
        }
        other => Ok(other.clone()),
    }
}

fn resolve_string(
    text: &str,
    shared: &SharedStore,
    mode: TemplateMode,
    node_id: &str,
    param: &str,
    warnings: &mut Vec<String>,
) -> Result<Value, TemplateError> {
    match classify(text) {
        TemplateString::Literal => Ok(Value::String(text.to_string())),
        TemplateString::Single(expression) => {
            match resolve_single_expression(&expression, shared) {
                Some(value) => Ok(value),
                None => match mode {
                    TemplateMode::Strict => Err(unresolved_error(
                        node_id,
                        param,
                        &expression,
                        shared,
                    )),
                    TemplateMode::Permissive => {
                        warnings.push(unresolved_warning(node_id, param, &expression));
                        Ok(Value::String(text.to_string()))
                    }
                },
            }
        }
        TemplateString::Interpolation(parts) => {
            let mut output = String::new();
            for part in parts {
                match part {
                    InterpolationPart::Text(literal) => output.push_str(&literal),
                    InterpolationPart::Expression(expression) => {
                        match resolve_single_expression(&expression, shared) {
                            Some(value) => output.push_str(&coerce_to_string(&value)),
                            None => match mode {
                                TemplateMode::Strict => {
                                    return Err(unresolved_error(
                                        node_id,
                                        param,
                                        &expression,
                                        shared,
                                    ));
                                }
                                TemplateMode::Permissive => {
                                    warnings.push(unresolved_warning(node_id, param, &expression));
                                    output.push_str(&format!("${{{expression}}}"));
                                }
                            },
                        }
                    }
                }
            }
            Ok(Value::String(output))
        }
    }
}

/// Resolves one expression body to its typed value, or `None` when any
/// path step is missing.
pub fn resolve_single_expression(expression: &str, shared: &SharedStore) -> Option<Value> {
    let segments = parse_path(expression).ok()?;
    navigate(&Value::Object(shared.data().clone()), &segments)
}

/// Resolves a workflow output `source`: either a `${...}` template or a
/// plain `node_id[.key...]` dotted reference.
pub fn resolve_output_source(source: &str, shared: &SharedStore) -> Option<Value> {
    if source.contains("${") {
        match classify(source) {
            TemplateString::Single(expression) => resolve_single_expression(&expression, shared),
            TemplateString::Interpolation(parts) => {
                let mut output = String::new();
                for part in parts {
                    match part {
                        InterpolationPart::Text(literal) => output.push_str(&literal),
                        InterpolationPart::Expression(expression) => {
                            output
                                .push_str(&coerce_to_string(&resolve_single_expression(
                                    &expression,
                                    shared,
                                )?));
                        }
                    }
                }
                Some(Value::String(output))
            }
            TemplateString::Literal => Some(Value::String(source.to_string())),
        }
    } else {
        resolve_single_expression(source.trim(), shared)
    }
}

/// Walks a value along parsed path segments.
///
/// When an intermediate value is a string that begins with `{` or `[` and
/// parses as JSON, it is transparently parsed before descending. This
/// supports nodes whose declared output is an opaque string carrying JSON.
fn navigate(root: &Value, segments: &[PathSegment]) -> Option<Value> {
    let mut current = root.clone();
    for segment in segments {
        if let Value::String(text) = &current {
            let trimmed = text.trim_start();
            if (trimmed.starts_with('{') || trimmed.starts_with('['))
                && let Ok(parsed) = serde_json::from_str::<Value>(text)
            {
                current = parsed;
            }
        }
        current = match segment {
            PathSegment::Key(key) => current.get(key)?.clone(),
            PathSegment::Index(index) => current.get(index)?.clone(),
            PathSegment::First => current.as_array()?.first()?.clone(),
            PathSegment::Last => current.as_array()?.last()?.clone(),
        };
    }
    Some(current)
}

/// String coercion used by interpolation: strings pass through, numbers
/// and booleans render naturally, null renders empty, and containers
/// render as compact JSON.
pub fn coerce_to_string(value: &Value) -> String {
    match value {
        Value::String(text) => text.clone(),
        Value::Number(number) => number.to_string(),
        Value::Bool(flag) => flag.to_string(),
        Value::Null => String::new(),
        other => other.to_string(),
    }
}

fn unresolved_error(
    node_id: &str,
    param: &str,
    expression: &str,
    shared: &SharedStore,
) -> TemplateError {
    let mut available: Vec<&str> = shared
        .data()
        .keys()
        .map(String::as_str)
        .filter(|key| !key.starts_with("__"))
        .collect();
    available.sort_unstable();
    let message = if available.is_empty() {
        "the shared store has no matching value".to_string()
    } else {
        format!(
            "the shared store has no matching value. Available keys: {}",
            available.join(", ")
        )
    };
    TemplateError {
        node_id: node_id.to_string(),
        param: param.to_string(),
        expression: expression.to_string(),
        message,
    }
}

fn unresolved_warning(node_id: &str, param: &str, expression: &str) -> String {
    format!(
        "unresolved template ${{{expression}}} in parameter '{param}' of node '{node_id}' left as literal"
    )
}
