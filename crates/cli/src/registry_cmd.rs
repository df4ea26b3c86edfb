//! Registry inspection and single-node execution.

use std::time::Instant;

use anyhow::{Context, Result};
use serde_json::{Value, json};

use pflow_registry::Registry;
use pflow_types::{ERROR_ACTION, SharedStore};
use pflow_util::{
    find_similar_items, fuzzy_score, is_valid_parameter_name, mask_param_value, parse_param_pairs,
};

/// Prints every registered node type with its summary.
pub fn list() -> Result<i32> {
    let registry = pflow_nodes::builtin_registry();
    for name in registry.list_nodes() {
        let entry = registry.get(&name).context("registry entry vanished")?;
        println!("{name:<12} {}", entry.description);
    }
    Ok(0)
}

/// Prints a node type's declared interface.
pub fn describe(node_type: &str) -> Result<i32> {
    let registry = pflow_nodes::builtin_registry();
    let Some(entry) = registry.get(node_type) else {
        print_unknown_node(node_type, &registry);
        return Ok(1);
    };

    println!("{}: {}", entry.name, entry.description);
    println!("  implementation: {}::{}", entry.module, entry.class_name);
    if !entry.interface.params.is_empty() {
        println!("  params:");
        for port in &entry.interface.params {
            println!(
                "    {} ({}){}",
                port.key,
                port.port_type,
                port.description
                    .as_deref()
                    .map(|text| format!(" — {text}"))
                    .unwrap_or_default()
            );
        }
    }
    if !entry.interface.outputs.is_empty() {
        println!("  outputs:");
        for port in &entry.interface.outputs {
            for (path, port_type) in port.flattened_paths() {
                println!("    ${{{path}}} ({port_type})");
            }
        }
    }
    println!("  actions: {}", entry.interface.actions.join(", "));
    Ok(0)
}

/// Executes a single node with `key=value` parameters against a fresh
/// shared store.
pub fn run_single_node(
    node_type: &str,
    raw_params: &[String],
    json_output: bool,
    show_structure: bool,
    verbose: bool,
) -> Result<i32> {
    let parsed = parse_param_pairs(raw_params.iter().map(String::as_str))?;
    let invalid: Vec<&str> = parsed
        .iter()
        .map(|(key, _)| key.as_str())
        .filter(|key| !is_valid_parameter_name(key))
        .collect();
    if !invalid.is_empty() {
        eprintln!("Invalid parameter name(s): {}", invalid.join(", "));
        eprintln!("Parameter names cannot contain shell special characters ($, |, >, <, &, ;)");
        return Ok(1);
    }

    let registry = pflow_nodes::builtin_registry();
    let Some(entry) = registry.get(node_type) else {
        print_unknown_node(node_type, &registry);
        return Ok(1);
    };
    let node = entry
        .instantiate()
        .with_context(|| format!("node type '{node_type}' has no constructor"))?;

    let mut params = pflow_types::ParamMap::new();
    let mut shared = SharedStore::new();
    for (key, value) in parsed {
        shared.insert(key.clone(), value.clone());
        params.insert(key, value);
    }

    if verbose {
        eprintln!("Running node '{node_type}'...");
        for (key, value) in &params {
            eprintln!("  {key}: {}", mask_param_value(key, value));
        }
    }

    let started = Instant::now();
    let prep = node.prep(&shared, &params);
    let result = prep.and_then(|prep| {
        node.exec(prep.clone(), &params)
            .and_then(|exec| node.post(&mut shared, &prep, exec, &params))
    });
    let execution_time_ms = started.elapsed().as_millis() as u64;

    let action = match result {
        Ok(action) => action,
        Err(error) => {
            eprintln!("Node execution failed\n\nNode: {node_type}\nError: {error}");
            return Ok(1);
        }
    };

    if action == ERROR_ACTION {
        let message = shared.error().unwrap_or("Unknown error").to_string();
        if json_output {
            let rendered = json!({
                "success": false,
                "node_type": node_type,
                "error": message,
                "execution_time_ms": execution_time_ms,
            });
            println!("{}", serde_json::to_string_pretty(&rendered)?);
        } else {
            eprintln!("Node execution failed\n");
            eprintln!("Node: {node_type}");
            eprintln!("Error: {message}");
            eprintln!("\nExecution time: {execution_time_ms}ms");
        }
        return Ok(1);
    }

    let outputs = collect_outputs(&shared, &params);

    if json_output {
        let rendered = json!({
            "success": true,
            "node_type": node_type,
            "outputs": outputs,
            "execution_time_ms": execution_time_ms,
        });
        println!("{}", serde_json::to_string_pretty(&rendered)?);
        return Ok(0);
    }

    println!("\u{2713} Node executed successfully\n");
    if outputs.is_empty() {
        println!("No outputs returned");
    } else {
        println!("Outputs:");
        for (key, value) in &outputs {
            match value {
                Value::String(text) => println!("  {key}: {text}"),
                other => println!("  {key}: {}", serde_json::to_string_pretty(other)?),
            }
        }
    }

    if show_structure {
        println!("\nAvailable template paths:");
        let mut paths = Vec::new();
        for port in &entry.interface.outputs {
            if port.is_opaque() {
                if let Some(value) = outputs.get(&port.key) {
                    flatten_runtime_value(&port.key, value, 0, &mut paths);
                    continue;
                }
            }
            paths.extend(port.flattened_paths());
        }
        for (path, port_type) in paths {
            println!("  \u{2713} ${{{path}}} ({port_type})");
        }
        println!("\nUse these paths in workflow templates.");
    }

    if verbose {
        println!("\nAction returned: '{action}'");
    }
    println!("\nExecution time: {execution_time_ms}ms");
    Ok(0)
}

fn collect_outputs(
    shared: &SharedStore,
    params: &pflow_types::ParamMap,
) -> serde_json::Map<String, Value> {
    shared
        .data()
        .iter()
        .filter(|(key, _)| !params.contains_key(*key) && !key.starts_with("__"))
        .map(|(key, value)| (key.clone(), value.clone()))
        .collect()
}

/// Flattens an actual runtime value into `(path, type)` pairs, parsing
/// JSON-carrying strings transparently.
fn flatten_runtime_value(
    prefix: &str,
    value: &Value,
    depth: usize,
    paths: &mut Vec<(String, String)>,
) {
    if depth > 5 {
        paths.push((prefix.to_string(), type_name(value).to_string()));
        return;
    }
    if let Value::String(text) = value {
        let trimmed = text.trim_start();
        if (trimmed.starts_with('{') || trimmed.starts_with('['))
            && let Ok(parsed) = serde_json::from_str::<Value>(text)
        {
            flatten_runtime_value(prefix, &parsed, depth, paths);
            return;
        }
    }
    match value {
        Value::Object(map) => {
            paths.push((prefix.to_string(), "dict".to_string()));
            for (key, nested) in map {
                flatten_runtime_value(&format!("{prefix}.{key}"), nested, depth + 1, paths);
            }
        }
        Value::Array(items) => {
            paths.push((prefix.to_string(), "list".to_string()));
            if let Some(first) = items.first() {
                flatten_runtime_value(&format!("{prefix}[0]"), first, depth + 1, paths);
            }
        }
        other => paths.push((prefix.to_string(), type_name(other).to_string())),
    }
}

fn type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "bool",
        Value::Number(_) => "number",
        Value::String(_) => "str",
        Value::Array(_) => "list",
        Value::Object(_) => "dict",
    }
}

fn print_unknown_node(node_type: &str, registry: &Registry) {
    eprintln!("Unknown node type: '{node_type}'");
    let known = registry.list_nodes();
    let mut similar = find_similar_items(node_type, known.iter().map(String::as_str), 5);
    if similar.is_empty() {
        // Fall back to subsequence search so abbreviations still match.
        let mut scored: Vec<(i64, &String)> = known
            .iter()
            .filter_map(|name| fuzzy_score(name, node_type).map(|score| (score, name)))
            .collect();
        scored.sort_by(|left, right| right.0.cmp(&left.0));
        similar = scored
            .into_iter()
            .take(5)
            .map(|(_, name)| name.clone())
            .collect();
    }
    if similar.is_empty() {
        eprintln!("\nAvailable nodes:");
        for name in known.iter().take(10) {
            eprintln!("  - {name}");
        }
    } else {
        eprintln!("\nDid you mean:");
        for name in similar {
            eprintln!("  - {name}");
        }
    }
    eprintln!("\nTo see all available nodes: pflow registry list");
}
