//! Declared node interfaces.
//!
//! Every registered node type documents the keys it reads, the keys it
//! writes, the parameters it accepts, and the actions it may return. The
//! template validator and the discovery surfaces both consume this model,
//! in particular the recursive [`StructureField`] tree describing nested
//! output shapes.

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Declared interface of a node type.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct NodeInterface {
    /// What the node does.
    #[serde(default)]
    pub description: String,
    /// Keys the node reads from the shared store or its params.
    #[serde(default)]
    pub inputs: Vec<PortSpec>,
    /// Keys the node writes to the shared store.
    #[serde(default)]
    pub outputs: Vec<PortSpec>,
    /// Parameters the node accepts.
    #[serde(default)]
    pub params: Vec<PortSpec>,
    /// Action strings the node may return from `post`.
    #[serde(default)]
    pub actions: Vec<String>,
}

impl NodeInterface {
    /// Finds a declared output by key.
    pub fn output(&self, key: &str) -> Option<&PortSpec> {
        self.outputs.iter().find(|port| port.key == key)
    }

    /// Builds a `param key -> declared type` map from `params` and `inputs`.
    ///
    /// Some nodes declare value-bearing keys under `inputs` rather than
    /// `params`; both feed the anti-pattern and type checks.
    pub fn param_types(&self) -> HashMap<&str, &str> {
        let mut types = HashMap::new();
        for port in self.params.iter().chain(self.inputs.iter()) {
            types.insert(port.key.as_str(), port.port_type.as_str());
        }
        types
    }
}

/// One declared input, output, or parameter of a node.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct PortSpec {
    /// Key name as it appears in the shared store or params.
    pub key: String,
    /// Declared type, e.g. `str`, `int`, `bool`, `dict`, `list`, `any`.
    #[serde(rename = "type", default)]
    pub port_type: String,
    /// Human-readable description.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// Nested shape for structured outputs; empty for scalars.
    #[serde(default, skip_serializing_if = "IndexMap::is_empty")]
    pub structure: IndexMap<String, StructureField>,
}

impl PortSpec {
    /// Creates a port with a key and type only.
    pub fn new(key: impl Into<String>, port_type: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            port_type: port_type.into(),
            description: None,
            structure: IndexMap::new(),
        }
    }

    /// Sets the description.
    pub fn describe(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    /// Sets the nested structure tree.
    pub fn with_structure(mut self, structure: IndexMap<String, StructureField>) -> Self {
        self.structure = structure;
        self
    }

    /// Returns true when the declared type defers shape knowledge to runtime.
    pub fn is_opaque(&self) -> bool {
        self.structure.is_empty()
            && matches!(
                self.port_type.to_ascii_lowercase().as_str(),
                "any" | "dict" | "object"
            )
    }

    /// Flattens this output's declared structure into `(dotted-path, type)`
    /// pairs, starting with the port itself.
    ///
    /// List-typed fields contribute a `key[]` path and descend into the item
    /// shape, so `files: list[dict]{name}` yields `files`, `files[]`, and
    /// `files[].name`.
    pub fn flattened_paths(&self) -> Vec<(String, String)> {
        let mut paths = vec![(self.key.clone(), self.port_type.clone())];
        flatten_structure(&self.key, &self.structure, &mut paths);
        paths
    }
}

/// One field inside a structured output shape.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct StructureField {
    /// Declared type of the field.
    #[serde(rename = "type", default)]
    pub field_type: String,
    /// Human-readable description.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// Nested fields, recursively.
    #[serde(default, skip_serializing_if = "IndexMap::is_empty")]
    pub structure: IndexMap<String, StructureField>,
}

impl StructureField {
    /// Creates a leaf field of the given type.
    pub fn leaf(field_type: impl Into<String>) -> Self {
        Self {
            field_type: field_type.into(),
            description: None,
            structure: IndexMap::new(),
        }
    }

    /// Creates a nested field with children.
    pub fn nested(
        field_type: impl Into<String>,
        structure: IndexMap<String, StructureField>,
    ) -> Self {
        Self {
            field_type: field_type.into(),
            description: None,
            structure,
        }
    }
}

fn flatten_structure(
    base: &str,
    structure: &IndexMap<String, StructureField>,
    paths: &mut Vec<(String, String)>,
) {
    for (name, field) in structure {
        let is_list = field.field_type.to_ascii_lowercase().starts_with("list");
        let path = format!("{base}.{name}");
        paths.push((path.clone(), field.field_type.clone()));
        if is_list {
            let item_path = format!("{path}[]");
            if !field.structure.is_empty() {
                flatten_structure(&item_path, &field.structure, paths);
            }
        } else if !field.structure.is_empty() {
            flatten_structure(&path, &field.structure, paths);
        }
    }
}
