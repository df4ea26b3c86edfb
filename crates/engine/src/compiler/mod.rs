//! Workflow compilation: validated IR to runnable graph.

pub mod inputs;

use std::sync::Arc;

use indexmap::IndexMap;
use tracing::debug;

use pflow_registry::Registry;
use pflow_types::{CompilationError, ParamMap, SharedStore, TemplateMode, WorkflowIr};
use pflow_util::{find_similar_items, is_valid_parameter_name};

use crate::runtime::observe::{MetricsCollector, TraceCollector};
use crate::runtime::wrapper::InstrumentedNode;
use crate::template::resolve::resolve_partial;

/// Inputs to a compilation beyond the document itself.
#[derive(Default)]
pub struct CompileOptions {
    /// Prepared initial parameters (CLI, environment, defaults merged).
    pub initial_params: ParamMap,
    /// Model injected into LLM-bearing nodes that do not specify one.
    pub default_model: Option<String>,
    /// Per-node timing sink.
    pub metrics: Option<Arc<dyn MetricsCollector>>,
    /// Per-node trace sink.
    pub trace: Option<Arc<dyn TraceCollector>>,
    /// Marks every node in this flow as part of the planning subsystem.
    pub is_planner: bool,
}

/// A compiled, wired, instrumented node graph ready to run.
#[derive(Debug)]
pub struct CompiledFlow {
    /// The source document.
    pub ir: WorkflowIr,
    /// Instantiated nodes keyed by id, in document order.
    pub nodes: IndexMap<String, InstrumentedNode>,
    /// Entry node id.
    pub entry: String,
    /// Template resolution mode for the run.
    pub mode: TemplateMode,
    /// Whether node outputs are namespaced under their node id.
    pub namespacing: bool,
    /// Initial parameters seeded into the shared store at run start.
    pub initial_params: ParamMap,
}

impl CompiledFlow {
    /// Creates the run's shared store, seeded with the initial parameters.
    pub fn initial_store(&self) -> SharedStore {
        let mut shared = SharedStore::new();
        for (key, value) in &self.initial_params {
            shared.insert(key.clone(), value.clone());
        }
        shared
    }
}

/// Compiles a validated IR document into a runnable flow.
pub fn compile_workflow(
    ir: &WorkflowIr,
    registry: &Registry,
    options: CompileOptions,
) -> Result<CompiledFlow, CompilationError> {
    let mut initial_params = options.initial_params;

    apply_input_defaults(ir, &mut initial_params)?;
    validate_declared_names(ir)?;

    let input_store = {
        let mut store = SharedStore::new();
        for (key, value) in &initial_params {
            store.insert(key.clone(), value.clone());
        }
        store
    };

    let mut nodes: IndexMap<String, InstrumentedNode> = IndexMap::new();
    for node_spec in &ir.nodes {
        let entry = registry.get(&node_spec.node_type).ok_or_else(|| {
            unknown_node_type_error(&node_spec.node_type, &node_spec.id, registry)
        })?;
        let inner = entry.instantiate().ok_or_else(|| {
            CompilationError::new(format!(
                "Node type '{}' has no registered implementation in this build",
                node_spec.node_type
            ))
            .at(format!("nodes.{}", node_spec.id))
        })?;

        // Workflow-input references are baked in now; node-output
        // references stay literal for per-node runtime resolution.
        let mut params = resolve_partial(&node_spec.params, &input_store);

        if entry.requires_model && !params.contains_key("model") {
            match &options.default_model {
                Some(model) => {
                    params.insert("model".to_string(), serde_json::json!(model));
                }
                None => return Err(missing_model_error(&node_spec.id)),
            }
        }

        let declared_outputs = entry
            .interface
            .outputs
            .iter()
            .map(|port| port.key.clone())
            .collect();

        let instrumented = InstrumentedNode::new(
            node_spec.id.clone(),
            node_spec.node_type.clone(),
            inner,
            params,
            node_spec.batch.clone(),
            declared_outputs,
            options.is_planner,
            options.metrics.clone(),
            options.trace.clone(),
        );
        nodes.insert(node_spec.id.clone(), instrumented);
    }

    for edge in &ir.edges {
        let node = nodes.get_mut(&edge.from).ok_or_else(|| {
            CompilationError::new(format!(
                "Edge references unknown node '{}'",
                edge.from
            ))
        })?;
        node.connect(edge.action.clone(), edge.to.clone());
    }

    let entry = ir
        .entry_node_id()
        .ok_or_else(|| CompilationError::new("workflow has no nodes"))?
        .to_string();

    debug!(
        node_count = nodes.len(),
        entry = %entry,
        "workflow compiled"
    );

    Ok(CompiledFlow {
        ir: ir.clone(),
        nodes,
        entry,
        mode: ir.template_resolution_mode,
        namespacing: ir.enable_namespacing,
        initial_params,
    })
}

/// Fills optional inputs from their declared defaults and fails when a
/// required input is still absent.
fn apply_input_defaults(
    ir: &WorkflowIr,
    initial_params: &mut ParamMap,
) -> Result<(), CompilationError> {
    for (name, input) in &ir.inputs {
        if !input.required
            && !initial_params.contains_key(name)
            && let Some(default) = &input.default
        {
            initial_params.insert(name.clone(), default.clone());
        }
    }
    match inputs::missing_required_inputs_error(ir, initial_params) {
        Some(error) => Err(error),
        None => Ok(()),
    }
}

fn validate_declared_names(ir: &WorkflowIr) -> Result<(), CompilationError> {
    for name in ir.inputs.keys() {
        if !is_valid_parameter_name(name) {
            return Err(invalid_name_error("Input", name, "inputs"));
        }
    }
    for name in ir.outputs.keys() {
        if !is_valid_parameter_name(name) {
            return Err(invalid_name_error("Output", name, "outputs"));
        }
    }
    Ok(())
}

fn invalid_name_error(kind: &str, name: &str, section: &str) -> CompilationError {
    CompilationError::new(format!("{kind} name '{name}' contains invalid characters"))
        .at(format!("{section}.{name}"))
        .suggest(
            "Names cannot contain shell special characters or '$', which conflicts with \
             template syntax. Use letters, digits, underscores, and hyphens, starting with a \
             letter or underscore.",
        )
}

fn unknown_node_type_error(
    node_type: &str,
    node_id: &str,
    registry: &Registry,
) -> CompilationError {
    let known = registry.list_nodes();
    let mut error = CompilationError::new(format!("Unknown node type: '{node_type}'"))
        .at(format!("nodes.{node_id}.type"));
    let similar = find_similar_items(node_type, known.iter().map(String::as_str), 3);
    if !similar.is_empty() {
        error = error.suggest(format!("Did you mean: {}", similar.join(", ")));
    }
    error
}

fn missing_model_error(node_id: &str) -> CompilationError {
    CompilationError::new(format!(
        "No model configured for LLM node '{node_id}'"
    ))
    .at(format!("nodes.{node_id}.params.model"))
    .suggest(
        "Configure a model one of these ways:\n  \
         1. pflow config set-model <model>\n  \
         2. add \"model\" to the node's params in the workflow\n  \
         3. pass model=<model> as a run parameter",
    )
}
