//! Workflow intermediate representation.
//!
//! The IR is the declarative document the compiler consumes, whether it was
//! authored as JSON or parsed from a `.pflow.md` file. The serde model here
//! is the *typed* view; structural acceptance (unknown-field suggestions,
//! duplicate ids, edge references) happens over the raw JSON value in the
//! engine's schema module before this model is produced.

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// IR format version accepted by this build.
pub const IR_VERSION: &str = "0.1.0";

/// A declarative workflow: nodes, edges, declared inputs and outputs.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct WorkflowIr {
    /// Semantic version of the IR format.
    pub ir_version: String,
    /// Ordered node descriptors; at least one.
    pub nodes: Vec<NodeSpec>,
    /// Edges connecting nodes, keyed by the action a node returns.
    #[serde(default)]
    pub edges: Vec<EdgeSpec>,
    /// Explicit entry node; the first node when absent.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub start_node: Option<String>,
    /// Declared workflow inputs keyed by name, preserving author order.
    #[serde(default)]
    pub inputs: IndexMap<String, InputSpec>,
    /// Declared workflow outputs keyed by name, preserving author order.
    #[serde(default)]
    pub outputs: IndexMap<String, OutputSpec>,
    /// Optional per-node key renamings for a node-aware view of the store.
    #[serde(default)]
    pub mappings: IndexMap<String, MappingSpec>,
    /// Namespace each node's writes under its id to prevent collisions.
    #[serde(default = "default_true")]
    pub enable_namespacing: bool,
    /// Behavior when a `${...}` reference cannot be resolved at runtime.
    #[serde(default)]
    pub template_resolution_mode: TemplateMode,
}

impl WorkflowIr {
    /// Returns the id of the node execution starts from.
    pub fn entry_node_id(&self) -> Option<&str> {
        self.start_node
            .as_deref()
            .or_else(|| self.nodes.first().map(|node| node.id.as_str()))
    }

    /// Looks up a node descriptor by id.
    pub fn node(&self, id: &str) -> Option<&NodeSpec> {
        self.nodes.iter().find(|node| node.id == id)
    }

    /// Deserializes the typed model from a raw JSON value.
    ///
    /// Callers are expected to run schema validation first; this only fails
    /// on shapes the schema would already have rejected.
    pub fn from_value(value: Value) -> Result<Self, serde_json::Error> {
        serde_json::from_value(value)
    }

    /// Serializes back to a raw JSON value.
    pub fn to_value(&self) -> Value {
        serde_json::to_value(self).unwrap_or(Value::Null)
    }
}

/// A single node descriptor within the IR.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct NodeSpec {
    /// Unique identifier among nodes.
    pub id: String,
    /// Registry key naming the implementation.
    #[serde(rename = "type")]
    pub node_type: String,
    /// Human description of what this node does in the workflow.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub purpose: Option<String>,
    /// Parameter values; strings may contain `${...}` references.
    #[serde(default)]
    pub params: IndexMap<String, Value>,
    /// When present, the node runs once per item of a resolved collection.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub batch: Option<BatchSpec>,
}

/// A directed edge keyed by the action returned from the source node.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct EdgeSpec {
    /// Source node id.
    pub from: String,
    /// Target node id.
    pub to: String,
    /// Action selecting this edge; `default` when unspecified.
    #[serde(default = "default_action")]
    pub action: String,
}

/// Declared workflow input.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct InputSpec {
    /// Human-readable description.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// Whether a value must be present before the first node starts.
    #[serde(default = "default_true")]
    pub required: bool,
    /// Data type hint.
    #[serde(default, rename = "type", skip_serializing_if = "Option::is_none")]
    pub value_type: Option<ValueType>,
    /// Default value used when no source provides one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default: Option<Value>,
}

impl Default for InputSpec {
    fn default() -> Self {
        Self {
            description: None,
            required: true,
            value_type: None,
            default: None,
        }
    }
}

/// Declared workflow output pulled from the shared store at run end.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct OutputSpec {
    /// Human-readable description.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// Data type hint.
    #[serde(default, rename = "type", skip_serializing_if = "Option::is_none")]
    pub value_type: Option<ValueType>,
    /// Where the value comes from: `node_id`, `node_id.key`, or `${...}`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source: Option<String>,
}

/// Per-node input/output key renamings.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct MappingSpec {
    /// Renames applied when the node reads from the shared store.
    #[serde(default)]
    pub input_mappings: IndexMap<String, String>,
    /// Renames applied when the node writes to the shared store.
    #[serde(default)]
    pub output_mappings: IndexMap<String, String>,
}

/// Batch configuration nested inside a node.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct BatchSpec {
    /// Template reference (`${...}`) to the iterable in the shared store.
    pub items: String,
    /// Variable name bound to the current item during each iteration.
    #[serde(default = "default_batch_var", rename = "as")]
    pub bind_as: String,
    /// How per-item failures are handled.
    #[serde(default)]
    pub error_handling: BatchErrorHandling,
}

/// Per-item error policy for batch nodes.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum BatchErrorHandling {
    /// Stop on the first failing item.
    #[default]
    FailFast,
    /// Record the failure per item and keep going.
    Continue,
}

/// Behavior when a template reference does not resolve at runtime.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum TemplateMode {
    /// Fail the run on the first unresolved reference.
    #[default]
    Strict,
    /// Leave the literal `${...}` in place and record a warning.
    Permissive,
}

/// Data type hints accepted for declared inputs and outputs.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum ValueType {
    String,
    Number,
    Boolean,
    Object,
    Array,
}

fn default_true() -> bool {
    true
}

fn default_action() -> String {
    "default".to_string()
}

fn default_batch_var() -> String {
    "item".to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn deserializes_minimal_document() {
        let raw = json!({
            "ir_version": "0.1.0",
            "nodes": [{"id": "n1", "type": "read-file", "params": {"file_path": "${path}"}}],
            "inputs": {"path": {"type": "string", "required": true}}
        });

        let ir = WorkflowIr::from_value(raw).expect("deserialize IR");
        assert_eq!(ir.ir_version, IR_VERSION);
        assert_eq!(ir.nodes.len(), 1);
        assert_eq!(ir.nodes[0].node_type, "read-file");
        assert!(ir.inputs["path"].required);
        assert!(ir.enable_namespacing);
        assert_eq!(ir.template_resolution_mode, TemplateMode::Strict);
    }

    #[test]
    fn entry_node_defaults_to_first() {
        let raw = json!({
            "ir_version": "0.1.0",
            "nodes": [
                {"id": "a", "type": "t"},
                {"id": "b", "type": "t"}
            ]
        });
        let mut ir = WorkflowIr::from_value(raw).expect("deserialize IR");
        assert_eq!(ir.entry_node_id(), Some("a"));

        ir.start_node = Some("b".into());
        assert_eq!(ir.entry_node_id(), Some("b"));
    }

    #[test]
    fn edge_action_defaults_to_default() {
        let edge: EdgeSpec = serde_json::from_value(json!({"from": "a", "to": "b"})).expect("edge");
        assert_eq!(edge.action, "default");
    }

    #[test]
    fn batch_defaults() {
        let batch: BatchSpec =
            serde_json::from_value(json!({"items": "${list.items}"})).expect("batch");
        assert_eq!(batch.bind_as, "item");
        assert_eq!(batch.error_handling, BatchErrorHandling::FailFast);
    }

    #[test]
    fn deserializes_yaml_authored_document() {
        let yaml = r#"
ir_version: "0.1.0"
nodes:
  - id: fetch
    type: http
    params:
      url: https://example.com
template_resolution_mode: permissive
"#;
        let ir: WorkflowIr = serde_yaml::from_str(yaml).expect("parse yaml IR");
        assert_eq!(ir.template_resolution_mode, TemplateMode::Permissive);
    }
}
