//! Unified workflow validation.
//!
//! The single source of truth for rejecting malformed or incorrect
//! workflows before execution. Six checks compose in order: structure,
//! data flow, templates, node types, output sources, and the JSON-string
//! template anti-pattern. Errors prevent execution; warnings pass through
//! to the run.

mod data_flow;
mod json_string;
mod output_sources;

use serde_json::Value;
use tracing::debug;

use pflow_registry::Registry;
use pflow_types::{ParamMap, WorkflowIr};

/// A non-fatal validation finding, typically a template that can only be
/// checked at runtime.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationWarning {
    /// Human-readable description of what will be validated at runtime.
    pub message: String,
}

impl ValidationWarning {
    /// Creates a warning from a message.
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

impl std::fmt::Display for ValidationWarning {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.message)
    }
}

/// Orchestrates all workflow validation checks.
pub struct WorkflowValidator;

impl WorkflowValidator {
    /// Runs complete workflow validation over a normalized raw document.
    ///
    /// `extracted_params` enables template validation; `registry` enables
    /// the node-type, template, and anti-pattern checks;
    /// `skip_node_types` supports synthetic node types in tests.
    pub fn validate(
        ir: &Value,
        extracted_params: Option<&ParamMap>,
        registry: Option<&Registry>,
        skip_node_types: bool,
    ) -> (Vec<String>, Vec<ValidationWarning>) {
        let mut errors = Vec::new();
        let mut warnings = Vec::new();

        // 1. Structure
        if let Err(error) = crate::ir::validate_ir(ir) {
            errors.push(format!("Structure: {error}"));
        }

        // The remaining checks need the typed view; when even that fails,
        // the structural error above is all we can report.
        let Ok(document) = WorkflowIr::from_value(ir.clone()) else {
            return (errors, warnings);
        };

        // 2. Data flow
        errors.extend(data_flow::validate_data_flow(&document));

        // 3. Templates
        if let (Some(params), Some(registry)) = (extracted_params, registry) {
            let (template_errors, template_warnings) =
                crate::template::validate_workflow_templates(&document, params, registry);
            errors.extend(template_errors);
            warnings.extend(template_warnings);
        }

        // 4. Node types
        if !skip_node_types && let Some(registry) = registry {
            errors.extend(Self::validate_node_types(&document, registry));
        }

        // 5. Output sources
        errors.extend(output_sources::validate_output_sources(&document));

        // 6. JSON string template anti-pattern
        if let Some(registry) = registry {
            errors.extend(json_string::validate_json_string_templates(
                &document, registry,
            ));
        }

        if !errors.is_empty() {
            debug!(error_count = errors.len(), "validation found errors");
        } else if !warnings.is_empty() {
            debug!(
                warning_count = warnings.len(),
                "validation passed with runtime-validated templates"
            );
        } else {
            debug!("validation passed");
        }

        (errors, warnings)
    }

    fn validate_node_types(document: &WorkflowIr, registry: &Registry) -> Vec<String> {
        let mut errors = Vec::new();
        for node in &document.nodes {
            if registry.get(&node.node_type).is_none() {
                errors.push(format!("Unknown node type: '{}'", node.node_type));
            }
        }
        errors.dedup();
        errors
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn structural_errors_are_prefixed() {
        let ir = json!({"ir_version": "0.1.0", "nodes": []});
        let (errors, _) = WorkflowValidator::validate(&ir, None, None, true);
        assert!(errors.iter().any(|error| error.starts_with("Structure: ")));
    }

    #[test]
    fn unknown_node_types_reported_once() {
        let ir = json!({
            "ir_version": "0.1.0",
            "nodes": [
                {"id": "a", "type": "ghost"},
                {"id": "b", "type": "ghost"}
            ],
            "edges": [{"from": "a", "to": "b"}]
        });
        let registry = Registry::new();
        let (errors, _) = WorkflowValidator::validate(&ir, None, Some(&registry), false);
        let type_errors: Vec<&String> = errors
            .iter()
            .filter(|error| error.contains("Unknown node type"))
            .collect();
        assert_eq!(type_errors.len(), 1);
    }

    #[test]
    fn skip_node_types_suppresses_registry_check() {
        let ir = json!({
            "ir_version": "0.1.0",
            "nodes": [{"id": "a", "type": "ghost"}]
        });
        let registry = Registry::new();
        let (errors, _) = WorkflowValidator::validate(&ir, None, Some(&registry), true);
        assert!(errors.is_empty(), "unexpected errors: {errors:?}");
    }

    #[test]
    fn clean_workflow_passes() {
        let ir = json!({
            "ir_version": "0.1.0",
            "nodes": [{"id": "a", "type": "ghost", "params": {"x": 1}}],
            "edges": []
        });
        let (errors, warnings) = WorkflowValidator::validate(&ir, None, None, true);
        assert!(errors.is_empty());
        assert!(warnings.is_empty());
    }
}
