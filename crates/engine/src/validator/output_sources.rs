//! Workflow output source validation.
//!
//! An output `source` may name a node (`node_id` or `node_id.key`) or be a
//! template expression. Node references must point at existing nodes; the
//! output-key portion is deliberately not checked statically because node
//! outputs declared as `any` carry no reliable shape.

use pflow_types::WorkflowIr;
use pflow_util::find_similar_items;

use crate::template::extract_expressions;

/// Validates every declared output's `source` field.
pub fn validate_output_sources(ir: &WorkflowIr) -> Vec<String> {
    let mut errors = Vec::new();
    let node_ids: Vec<&str> = ir.nodes.iter().map(|node| node.id.as_str()).collect();

    for (output_name, output) in &ir.outputs {
        let Some(source) = output.source.as_deref() else {
            continue;
        };
        if source.trim().is_empty() {
            errors.push(format!(
                "Output '{output_name}' has empty source field. Use 'node_id' or \
                 'node_id.output_key' format."
            ));
            continue;
        }

        if source.contains("${") {
            errors.extend(validate_templated_source(output_name, source, &node_ids));
            continue;
        }

        let node_id = source.split('.').next().unwrap_or(source);
        if !node_ids.contains(&node_id) {
            errors.push(plain_reference_error(output_name, node_id, &node_ids));
        }
    }

    errors
}

fn validate_templated_source(output_name: &str, source: &str, node_ids: &[&str]) -> Vec<String> {
    let mut errors = Vec::new();
    let expressions = extract_expressions(source);
    if expressions.is_empty() {
        errors.push(format!(
            "Output '{output_name}' has malformed template: '{source}'\n\
             Use format: ${{variable}} or ${{node.output_key}}"
        ));
        return errors;
    }

    for expression in expressions {
        // Dotless roots may be workflow inputs; only node references are
        // checked here.
        let Some((node_id, output_key)) = expression.split_once('.') else {
            continue;
        };
        if !node_ids.contains(&node_id) {
            errors.push(template_reference_error(
                output_name,
                source,
                node_id,
                Some(output_key),
                node_ids,
            ));
        }
    }

    errors
}

fn plain_reference_error(output_name: &str, node_id: &str, node_ids: &[&str]) -> String {
    let mut available: Vec<&str> = node_ids.to_vec();
    available.sort_unstable();

    let mut lines = vec![format!(
        "Output '{output_name}' references non-existent node '{node_id}'."
    )];
    if available.is_empty() {
        lines.push("\nWorkflow has no nodes.".to_string());
    } else {
        lines.push(format!("\nAvailable nodes: {}", available.join(", ")));
        let similar = find_similar_items(node_id, available.iter().copied(), 3);
        if !similar.is_empty() {
            lines.push("\nDid you mean?".to_string());
            for suggestion in similar {
                lines.push(format!("  - {suggestion}"));
            }
        }
    }
    lines.join("\n")
}

fn template_reference_error(
    output_name: &str,
    source: &str,
    node_id: &str,
    output_key: Option<&str>,
    node_ids: &[&str],
) -> String {
    let mut available: Vec<&str> = node_ids.to_vec();
    available.sort_unstable();

    let mut lines = vec![
        format!("Output '{output_name}' source references non-existent node '{node_id}'"),
        format!("Template: {source}"),
    ];

    if available.is_empty() {
        lines.push("\nWorkflow has no nodes.".to_string());
        return lines.join("\n");
    }

    lines.push("\nAvailable nodes in workflow:".to_string());
    for node in available.iter().take(10) {
        lines.push(format!("  \u{2713} {node}"));
    }
    if available.len() > 10 {
        lines.push(format!("  ... and {} more", available.len() - 10));
    }

    let similar = find_similar_items(node_id, available.iter().copied(), 3);
    if let Some(best) = similar.first() {
        lines.push("\nDid you mean one of these?".to_string());
        for suggestion in &similar {
            let corrected = match output_key {
                Some(key) => format!("${{{suggestion}.{key}}}"),
                None => format!("${{{suggestion}}}"),
            };
            lines.push(format!("  - {corrected}"));
        }

        let corrected = match output_key {
            Some(key) => format!("${{{best}.{key}}}"),
            None => format!("${{{best}}}"),
        };
        lines.push("\nSuggested fix:".to_string());
        lines.push(format!("  Change: \"{source}\""));
        lines.push(format!("  To:     \"{corrected}\""));
    }

    lines.join("\n")
}
