//! Static template validation against declared node outputs.
//!
//! Every `${expr}` in node params and batch items is parsed into a root
//! and tail. Roots must name a workflow input, a prepared parameter, or a
//! node id; node-rooted tails are traversed through the producing node's
//! declared output structure. Traversals that land on an untyped output
//! become warnings (validated at runtime) rather than errors.

use serde_json::Value;

use pflow_registry::Registry;
use pflow_types::{ParamMap, PortSpec, WorkflowIr};
use pflow_util::find_similar_items;

use crate::validator::ValidationWarning;

use super::{PathSegment, extract_expressions, root_and_tail};

/// Validates every template reference in the workflow's node params and
/// batch items. Returns `(errors, warnings)`.
pub fn validate_workflow_templates(
    ir: &WorkflowIr,
    extracted_params: &ParamMap,
    registry: &Registry,
) -> (Vec<String>, Vec<ValidationWarning>) {
    let mut errors = Vec::new();
    let mut warnings = Vec::new();

    let mut input_roots: Vec<String> = ir.inputs.keys().cloned().collect();
    for key in extracted_params.keys() {
        if !input_roots.contains(key) {
            input_roots.push(key.clone());
        }
    }
    input_roots.push("stdin".to_string());
    let node_ids: Vec<String> = ir.nodes.iter().map(|node| node.id.clone()).collect();

    for node in &ir.nodes {
        let batch_var = node.batch.as_ref().map(|batch| batch.bind_as.as_str());

        let mut expressions = Vec::new();
        for (param, value) in &node.params {
            collect_expressions(value, param, &mut expressions);
        }
        if let Some(batch) = &node.batch {
            for expression in extract_expressions(&batch.items) {
                expressions.push(("batch.items".to_string(), expression));
            }
        }

        for (param, expression) in expressions {
            check_expression(
                ir,
                registry,
                &input_roots,
                &node_ids,
                batch_var,
                &node.id,
                &param,
                &expression,
                &mut errors,
                &mut warnings,
            );
        }
    }

    (errors, warnings)
}

fn collect_expressions(value: &Value, param: &str, out: &mut Vec<(String, String)>) {
    match value {
        Value::String(text) => {
            for expression in extract_expressions(text) {
                out.push((param.to_string(), expression));
            }
        }
        Value::Array(items) => {
            for item in items {
                collect_expressions(item, param, out);
            }
        }
        Value::Object(map) => {
            for nested in map.values() {
                collect_expressions(nested, param, out);
            }
        }
        _ => {}
    }
}

#[allow(clippy::too_many_arguments)]
fn check_expression(
    ir: &WorkflowIr,
    registry: &Registry,
    input_roots: &[String],
    node_ids: &[String],
    batch_var: Option<&str>,
    node_id: &str,
    param: &str,
    expression: &str,
    errors: &mut Vec<String>,
    warnings: &mut Vec<ValidationWarning>,
) {
    let Some((root, tail)) = root_and_tail(expression) else {
        errors.push(format!(
            "Node '{node_id}' parameter '{param}' has malformed template: '${{{expression}}}'\n\
             Use format: ${{variable}} or ${{node.output_key}}"
        ));
        return;
    };

    if batch_var == Some(root.as_str()) || input_roots.contains(&root) {
        return;
    }

    if node_ids.contains(&root) {
        check_node_reference(
            ir, registry, node_id, param, expression, &root, &tail, errors, warnings,
        );
        return;
    }

    errors.push(unknown_root_error(
        node_id,
        param,
        expression,
        &root,
        &tail,
        input_roots,
        node_ids,
    ));
}

#[allow(clippy::too_many_arguments)]
fn check_node_reference(
    ir: &WorkflowIr,
    registry: &Registry,
    node_id: &str,
    param: &str,
    expression: &str,
    producer: &str,
    tail: &[PathSegment],
    errors: &mut Vec<String>,
    warnings: &mut Vec<ValidationWarning>,
) {
    let Some(first_key) = tail.iter().find_map(|segment| match segment {
        PathSegment::Key(key) => Some(key.as_str()),
        _ => None,
    }) else {
        // Whole-namespace reference, e.g. `${get-data}`.
        return;
    };

    let Some(node_type) = ir.node(producer).map(|node| node.node_type.as_str()) else {
        return;
    };
    // Unknown node types are reported by the node-type check.
    let Some(entry) = registry.get(node_type) else {
        return;
    };

    let Some(port) = entry.interface.output(first_key) else {
        errors.push(unknown_output_error(
            node_id, param, expression, producer, first_key, &entry.interface.outputs,
        ));
        return;
    };

    let deeper: Vec<&PathSegment> = tail
        .iter()
        .skip_while(|segment| !matches!(segment, PathSegment::Key(key) if key == first_key))
        .skip(1)
        .collect();
    if deeper.is_empty() {
        return;
    }

    if port.is_opaque() || (port.structure.is_empty() && !deeper.is_empty()) {
        warnings.push(ValidationWarning::new(format!(
            "Template ${{{expression}}} in node '{node_id}' traverses the '{first_key}' output of \
             '{producer}' which has no declared structure; it will be validated at runtime"
        )));
        return;
    }

    traverse_structure(
        node_id, param, expression, producer, port, &deeper, errors, warnings,
    );
}

#[allow(clippy::too_many_arguments)]
fn traverse_structure(
    node_id: &str,
    param: &str,
    expression: &str,
    producer: &str,
    port: &PortSpec,
    deeper: &[&PathSegment],
    errors: &mut Vec<String>,
    warnings: &mut Vec<ValidationWarning>,
) {
    let mut fields = &port.structure;
    let mut current_type = port.port_type.clone();

    for segment in deeper {
        let PathSegment::Key(key) = segment else {
            // Index segments descend into list items without consuming a
            // structure level.
            continue;
        };
        if let Some(field) = fields.get(key) {
            current_type = field.field_type.clone();
            fields = &field.structure;
            continue;
        }
        if fields.is_empty() {
            let lowered = current_type.to_ascii_lowercase();
            if lowered == "any"
                || lowered == "dict"
                || lowered == "object"
                || lowered == "str"
                || lowered.starts_with("list")
            {
                warnings.push(ValidationWarning::new(format!(
                    "Template ${{{expression}}} in node '{node_id}' goes deeper than the declared \
                     structure of '{producer}.{}'; it will be validated at runtime",
                    port.key
                )));
            } else {
                errors.push(format!(
                    "Node '{node_id}' parameter '{param}' references '{key}' inside the \
                     '{current_type}'-typed field of '{producer}.{}'\nTemplate: ${{{expression}}}",
                    port.key
                ));
            }
            return;
        }

        let available: Vec<&str> = fields.keys().map(String::as_str).collect();
        let mut message = format!(
            "Node '{node_id}' parameter '{param}' references unknown field '{key}' of \
             '{producer}.{}'\nTemplate: ${{{expression}}}",
            port.key
        );
        message.push_str(&format!("\nAvailable fields: {}", available.join(", ")));
        let similar = find_similar_items(key, available.iter().copied(), 3);
        if !similar.is_empty() {
            message.push_str("\n\nDid you mean one of these?");
            for candidate in &similar {
                message.push_str(&format!("\n  - {candidate}"));
            }
        }
        errors.push(message);
        return;
    }
}

fn unknown_output_error(
    node_id: &str,
    param: &str,
    expression: &str,
    producer: &str,
    output_key: &str,
    outputs: &[PortSpec],
) -> String {
    let available: Vec<&str> = outputs.iter().map(|port| port.key.as_str()).collect();
    let mut lines = vec![
        format!(
            "Node '{node_id}' parameter '{param}' references unknown output '{output_key}' of node '{producer}'"
        ),
        format!("Template: ${{{expression}}}"),
    ];
    if available.is_empty() {
        lines.push(format!("\nNode '{producer}' declares no outputs."));
    } else {
        lines.push(format!("\nAvailable outputs: {}", available.join(", ")));
        let similar = find_similar_items(output_key, available.iter().copied(), 3);
        if let Some(best) = similar.first() {
            lines.push("\nDid you mean one of these?".to_string());
            for candidate in &similar {
                lines.push(format!("  - ${{{producer}.{candidate}}}"));
            }
            lines.push("\nSuggested fix:".to_string());
            lines.push(format!("  Change: \"${{{producer}.{output_key}}}\""));
            lines.push(format!("  To:     \"${{{producer}.{best}}}\""));
        }
    }
    lines.join("\n")
}

fn unknown_root_error(
    node_id: &str,
    param: &str,
    expression: &str,
    root: &str,
    tail: &[PathSegment],
    input_roots: &[String],
    node_ids: &[String],
) -> String {
    let mut lines = vec![
        format!(
            "Node '{node_id}' parameter '{param}' references unknown input or node '{root}'"
        ),
        format!("Template: ${{{expression}}}"),
    ];
    if !node_ids.is_empty() {
        lines.push("\nAvailable nodes in workflow:".to_string());
        for id in node_ids.iter().take(10) {
            lines.push(format!("  - {id}"));
        }
        if node_ids.len() > 10 {
            lines.push(format!("  ... and {} more", node_ids.len() - 10));
        }
    }
    let declared: Vec<&String> = input_roots.iter().filter(|name| *name != "stdin").collect();
    if !declared.is_empty() {
        lines.push(format!(
            "Available inputs: {}",
            declared
                .iter()
                .map(|name| name.as_str())
                .collect::<Vec<_>>()
                .join(", ")
        ));
    }

    let candidates: Vec<&str> = node_ids
        .iter()
        .map(String::as_str)
        .chain(input_roots.iter().map(String::as_str))
        .collect();
    let similar = find_similar_items(root, candidates, 3);
    if let Some(best) = similar.first() {
        let tail_text = render_tail(tail);
        lines.push("\nDid you mean one of these?".to_string());
        for candidate in &similar {
            lines.push(format!("  - ${{{candidate}{tail_text}}}"));
        }
        lines.push("\nSuggested fix:".to_string());
        lines.push(format!("  Change: \"${{{expression}}}\""));
        lines.push(format!("  To:     \"${{{best}{tail_text}}}\""));
    }
    lines.join("\n")
}

fn render_tail(tail: &[PathSegment]) -> String {
    let mut rendered = String::new();
    for segment in tail {
        match segment {
            PathSegment::Key(key) => {
                rendered.push('.');
                rendered.push_str(key);
            }
            PathSegment::Index(index) => rendered.push_str(&format!("[{index}]")),
            PathSegment::First => rendered.push_str("[first]"),
            PathSegment::Last => rendered.push_str("[last]"),
        }
    }
    rendered
}
