//! The sequential flow scheduler.

use indexmap::IndexMap;
use serde_json::Value;
use tracing::{debug, info, warn};

use pflow_types::{
    BatchErrorHandling, BatchSpec, ERROR_ACTION, ExecutionRecord, SharedStore, TemplateMode,
};
use pflow_util::stable_value_hash;

use crate::compiler::CompiledFlow;
use crate::template::resolve::{resolve_params, resolve_single_expression};
use crate::template::{TemplateString, classify, resolve_output_source};

use super::wrapper::{DispatchResult, InstrumentedNode, NodeOutcome};

/// Final state of one workflow execution.
#[derive(Debug, Clone, Default)]
pub struct RunOutcome {
    /// True when the flow terminated naturally with no terminal error.
    pub success: bool,
    /// First node that returned the error action or aborted, if any.
    pub failed_node: Option<String>,
    /// Declared workflow outputs pulled from the shared store.
    pub outputs: IndexMap<String, Value>,
    /// Template warnings accumulated across the run (permissive mode).
    pub warnings: Vec<String>,
    /// Terminal error description when the run failed.
    pub error: Option<String>,
}

/// Executes a compiled flow against a shared store.
///
/// Starting from the entry node: resolve the node's params against the
/// current store, dispatch its lifecycle, look up the successor for the
/// returned action, and continue until no successor matches or a fatal
/// failure aborts the walk.
pub fn run_flow(flow: &CompiledFlow, shared: &mut SharedStore) -> RunOutcome {
    info!(
        entry = %flow.entry,
        node_count = flow.nodes.len(),
        mode = ?flow.mode,
        "workflow execution started"
    );

    let mut execution = ExecutionRecord::default();
    let mut warnings = Vec::new();
    let mut abort_error: Option<String> = None;
    let mut current = Some(flow.entry.clone());

    while let Some(node_id) = current.take() {
        let Some(node) = flow.nodes.get(&node_id) else {
            abort_error = Some(format!("compiled flow has no node '{node_id}'"));
            execution.failed_node.get_or_insert(node_id);
            break;
        };
        debug!(node_id = %node.node_id(), node_type = %node.node_type(), "node execution started");

        apply_input_mappings(flow, &node_id, shared);

        let dispatch = if let Some(batch) = node.batch() {
            match run_batch(node, batch, flow, shared, &mut warnings, &mut execution) {
                Ok(result) => result,
                Err(error) => {
                    warn!(node_id = %node.node_id(), %error, "batch execution failed");
                    shared.set_error(error.clone());
                    execution.failed_node.get_or_insert(node_id.clone());
                    abort_error = Some(error);
                    shared.set_execution(&execution);
                    break;
                }
            }
        } else {
            let (resolved, node_warnings) =
                match resolve_params(node.params(), shared, flow.mode, &node_id) {
                    Ok(resolved) => resolved,
                    Err(template_error) => {
                        warn!(node_id = %node_id, %template_error, "template resolution failed");
                        shared.set_error(template_error.to_string());
                        execution.failed_node.get_or_insert(node_id.clone());
                        abort_error = Some(template_error.to_string());
                        shared.set_execution(&execution);
                        break;
                    }
                };
            warnings.extend(node_warnings.iter().cloned());
            node.dispatch(shared, &resolved, flow.namespacing, node_warnings)
        };

        match dispatch.outcome {
            NodeOutcome::Completed { action } => {
                debug!(node_id = %node_id, %action, "node execution finished");
                apply_output_mappings(flow, &node_id, shared);
                execution.completed_nodes.push(node_id.clone());
                execution
                    .node_actions
                    .insert(node_id.clone(), action.clone());
                execution
                    .node_hashes
                    .insert(node_id.clone(), dispatch.state_hash);
                if action == ERROR_ACTION {
                    execution.failed_node.get_or_insert(node_id.clone());
                }
                shared.set_execution(&execution);
                current = node.successor(&action).map(str::to_string);
            }
            NodeOutcome::Aborted { error } => {
                warn!(node_id = %node_id, %error, "node execution aborted the flow");
                execution.failed_node.get_or_insert(node_id.clone());
                abort_error = Some(error);
                shared.set_execution(&execution);
            }
        }
    }

    let outputs = extract_outputs(flow, shared, &mut warnings);
    let success = abort_error.is_none() && shared.error().is_none();
    let error = abort_error.or_else(|| shared.error().map(str::to_string));

    info!(
        success,
        completed = execution.completed_nodes.len(),
        failed_node = execution.failed_node.as_deref().unwrap_or(""),
        "workflow execution finished"
    );

    RunOutcome {
        success,
        failed_node: execution.failed_node.clone(),
        outputs,
        warnings,
        error,
    }
}

/// Runs a batch node: one full lifecycle per resolved item, with the
/// bound variable refreshed before each iteration. Per-iteration primary
/// outputs are appended to a list stored under the node's output key.
fn run_batch(
    node: &InstrumentedNode,
    batch: &BatchSpec,
    flow: &CompiledFlow,
    shared: &mut SharedStore,
    warnings: &mut Vec<String>,
    execution: &mut ExecutionRecord,
) -> Result<DispatchResult, String> {
    let items = match resolve_batch_items(&batch.items, shared) {
        Some(items) => items,
        None => match flow.mode {
            TemplateMode::Strict => {
                return Err(format!(
                    "batch items '{}' for node '{}' did not resolve to an array",
                    batch.items,
                    node.node_id()
                ));
            }
            TemplateMode::Permissive => {
                warnings.push(format!(
                    "batch items '{}' for node '{}' left unresolved; running zero iterations",
                    batch.items,
                    node.node_id()
                ));
                Vec::new()
            }
        },
    };

    let primary_key = node.primary_output().unwrap_or("result").to_string();
    let mut collected: Vec<Value> = Vec::new();
    let mut total_duration = 0u64;
    let mut final_action = pflow_types::DEFAULT_ACTION.to_string();

    info!(
        node_id = %node.node_id(),
        items = items.len(),
        bind_as = %batch.bind_as,
        policy = ?batch.error_handling,
        "batch execution started"
    );

    for (index, item) in items.into_iter().enumerate() {
        shared.insert(batch.bind_as.clone(), item);

        let (resolved, node_warnings) =
            match resolve_params(node.params(), shared, flow.mode, node.node_id()) {
                Ok(resolved) => resolved,
                Err(error) => {
                    return Err(error.to_string());
                }
            };
        warnings.extend(node_warnings.iter().cloned());

        let result = node.dispatch(shared, &resolved, flow.namespacing, node_warnings);
        total_duration += result.duration_ms;

        match result.outcome {
            NodeOutcome::Completed { action } if action != ERROR_ACTION => {
                collected.push(shared.get(&primary_key).cloned().unwrap_or(Value::Null));
            }
            NodeOutcome::Completed { .. } => {
                let message = shared
                    .error()
                    .map(str::to_string)
                    .unwrap_or_else(|| format!("item {index} failed"));
                match batch.error_handling {
                    BatchErrorHandling::FailFast => {
                        warn!(node_id = %node.node_id(), index, "batch stopped on first failure");
                        execution.failed_node.get_or_insert(node.node_id().to_string());
                        final_action = ERROR_ACTION.to_string();
                        break;
                    }
                    BatchErrorHandling::Continue => {
                        debug!(node_id = %node.node_id(), index, "batch item failed, continuing");
                        collected.push(serde_json::json!({ "error": message }));
                        shared.remove(pflow_types::store::ERROR_KEY);
                    }
                }
            }
            NodeOutcome::Aborted { error } => {
                return Err(error);
            }
        }
    }

    shared.insert(primary_key.clone(), Value::Array(collected));
    if flow.namespacing {
        let list = shared.get(&primary_key).cloned().unwrap_or(Value::Null);
        shared.write_namespaced(node.node_id(), &primary_key, list);
    }

    let state_hash = stable_value_hash(&shared.snapshot());
    Ok(DispatchResult {
        outcome: NodeOutcome::Completed {
            action: final_action,
        },
        duration_ms: total_duration,
        state_hash,
    })
}

/// Copies values under the names a node expects to read, per its
/// declared input mappings (`node_key: store_key`).
fn apply_input_mappings(flow: &CompiledFlow, node_id: &str, shared: &mut SharedStore) {
    let Some(mapping) = flow.ir.mappings.get(node_id) else {
        return;
    };
    for (node_key, store_key) in &mapping.input_mappings {
        if let Some(value) = shared.get(store_key).cloned() {
            shared.insert(node_key.clone(), value);
        }
    }
}

/// Re-publishes a node's writes under renamed keys, per its declared
/// output mappings (`node_key: store_key`).
fn apply_output_mappings(flow: &CompiledFlow, node_id: &str, shared: &mut SharedStore) {
    let Some(mapping) = flow.ir.mappings.get(node_id) else {
        return;
    };
    for (node_key, store_key) in &mapping.output_mappings {
        if let Some(value) = shared.get(node_key).cloned() {
            shared.insert(store_key.clone(), value);
        }
    }
}

/// Resolves the batch `items` template to a concrete vector. A string
/// value that parses as a JSON array is accepted, matching the
/// transparent-parse rule elsewhere.
fn resolve_batch_items(items_template: &str, shared: &SharedStore) -> Option<Vec<Value>> {
    let expression = match classify(items_template) {
        TemplateString::Single(expression) => expression,
        _ => return None,
    };
    match resolve_single_expression(&expression, shared)? {
        Value::Array(items) => Some(items),
        Value::String(text) => serde_json::from_str::<Value>(&text)
            .ok()
            .and_then(|parsed| parsed.as_array().cloned()),
        _ => None,
    }
}

/// Pulls declared workflow outputs from the shared store. Outputs without
/// a source fall back to a top-level key of the same name.
fn extract_outputs(
    flow: &CompiledFlow,
    shared: &SharedStore,
    warnings: &mut Vec<String>,
) -> IndexMap<String, Value> {
    let mut outputs = IndexMap::new();
    for (name, spec) in &flow.ir.outputs {
        let resolved = match spec.source.as_deref() {
            Some(source) => resolve_output_source(source, shared),
            None => shared.get(name).cloned(),
        };
        match resolved {
            Some(value) => {
                outputs.insert(name.clone(), value);
            }
            None => warnings.push(format!(
                "workflow output '{name}' could not be resolved from the shared store"
            )),
        }
    }
    outputs
}
