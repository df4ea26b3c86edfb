//! Execution-order validation of data dependencies.
//!
//! Nodes are ordered by reachability from the entry node along edges. A
//! `${node.key}` reference inside a node's params must point at a node
//! that precedes it in that order; references to later or unreachable
//! nodes can never resolve at runtime.

use std::collections::{HashMap, VecDeque};

use serde_json::Value;

use pflow_types::WorkflowIr;

use crate::template::{extract_expressions, root_and_tail};

/// Validates that every node-rooted template reference points upstream.
pub fn validate_data_flow(ir: &WorkflowIr) -> Vec<String> {
    let mut errors = Vec::new();
    let order = execution_order(ir);

    for node in &ir.nodes {
        let Some(&position) = order.get(node.id.as_str()) else {
            continue;
        };
        let batch_var = node.batch.as_ref().map(|batch| batch.bind_as.as_str());

        for expression in node_expressions(node) {
            let Some((root, _tail)) = root_and_tail(&expression) else {
                continue;
            };
            if Some(root.as_str()) == batch_var || ir.node(&root).is_none() {
                // Inputs and unknown roots are the template check's concern.
                continue;
            }
            match order.get(root.as_str()) {
                Some(&producer_position) if producer_position < position => {}
                Some(_) => errors.push(format!(
                    "Node '{}' references output of node '{root}' which has not executed yet \
                     (template ${{{expression}}})",
                    node.id
                )),
                None => errors.push(format!(
                    "Node '{}' references output of node '{root}' which is unreachable from the \
                     start node (template ${{{expression}}})",
                    node.id
                )),
            }
        }
    }

    errors
}

/// Breadth-first positions of nodes reachable from the entry, following
/// edges regardless of action.
fn execution_order(ir: &WorkflowIr) -> HashMap<&str, usize> {
    let mut order = HashMap::new();
    let Some(entry) = ir.entry_node_id() else {
        return order;
    };

    let mut successors: HashMap<&str, Vec<&str>> = HashMap::new();
    for edge in &ir.edges {
        successors
            .entry(edge.from.as_str())
            .or_default()
            .push(edge.to.as_str());
    }

    let mut queue = VecDeque::from([entry]);
    while let Some(current) = queue.pop_front() {
        if order.contains_key(current) {
            continue;
        }
        let position = order.len();
        order.insert(current, position);
        for &next in successors.get(current).into_iter().flatten() {
            if !order.contains_key(next) {
                queue.push_back(next);
            }
        }
    }

    order
}

fn node_expressions(node: &pflow_types::NodeSpec) -> Vec<String> {
    let mut expressions = Vec::new();
    for value in node.params.values() {
        collect(value, &mut expressions);
    }
    if let Some(batch) = &node.batch {
        expressions.extend(extract_expressions(&batch.items));
    }
    expressions
}

fn collect(value: &Value, out: &mut Vec<String>) {
    match value {
        Value::String(text) => out.extend(extract_expressions(text)),
        Value::Array(items) => items.iter().for_each(|item| collect(item, out)),
        Value::Object(map) => map.values().for_each(|nested| collect(nested, out)),
        _ => {}
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn ir(value: Value) -> WorkflowIr {
        WorkflowIr::from_value(value).expect("valid IR")
    }

    #[test]
    fn forward_references_are_rejected() {
        let document = ir(json!({
            "ir_version": "0.1.0",
            "nodes": [
                {"id": "first", "type": "t", "params": {"x": "${second.out}"}},
                {"id": "second", "type": "t"}
            ],
            "edges": [{"from": "first", "to": "second"}]
        }));
        let errors = validate_data_flow(&document);
        assert_eq!(errors.len(), 1);
        assert!(errors[0].contains("has not executed yet"));
    }

    #[test]
    fn upstream_references_pass() {
        let document = ir(json!({
            "ir_version": "0.1.0",
            "nodes": [
                {"id": "first", "type": "t"},
                {"id": "second", "type": "t", "params": {"x": "${first.out}"}}
            ],
            "edges": [{"from": "first", "to": "second"}]
        }));
        assert!(validate_data_flow(&document).is_empty());
    }

    #[test]
    fn unreachable_producers_are_rejected() {
        let document = ir(json!({
            "ir_version": "0.1.0",
            "nodes": [
                {"id": "main", "type": "t", "params": {"x": "${island.out}"}},
                {"id": "island", "type": "t"}
            ],
            "edges": []
        }));
        let errors = validate_data_flow(&document);
        assert_eq!(errors.len(), 1);
        assert!(errors[0].contains("unreachable"));
    }

    #[test]
    fn input_references_are_ignored_here() {
        let document = ir(json!({
            "ir_version": "0.1.0",
            "nodes": [{"id": "only", "type": "t", "params": {"x": "${some_input}"}}],
            "inputs": {"some_input": {"type": "string"}}
        }));
        assert!(validate_data_flow(&document).is_empty());
    }

    #[test]
    fn respects_start_node_ordering() {
        let document = ir(json!({
            "ir_version": "0.1.0",
            "nodes": [
                {"id": "late", "type": "t", "params": {"x": "${early.out}"}},
                {"id": "early", "type": "t"}
            ],
            "edges": [{"from": "early", "to": "late"}],
            "start_node": "early"
        }));
        assert!(validate_data_flow(&document).is_empty());
    }
}
