//! Workflow input preparation.
//!
//! Declared inputs are populated from four sources with a fixed
//! precedence, highest first: CLI parameters, process environment
//! variables whose name exactly matches an input (case-sensitive), the
//! configured environment store (`settings.env`), and IR-declared
//! defaults. Empty strings from any source are values, not gaps.

use indexmap::IndexMap;
use serde_json::Value;

use pflow_types::{CompilationError, ParamMap, WorkflowIr};
use pflow_util::is_valid_parameter_name;

/// Result of merging input sources.
#[derive(Debug, Clone, Default)]
pub struct PreparedInputs {
    /// Final merged parameter map handed to the compiler.
    pub params: ParamMap,
    /// Problems that prevent execution.
    pub errors: Vec<CompilationError>,
    /// Input names that fell through to their IR-declared default.
    pub resolved_defaults: Vec<String>,
    /// Input names satisfied from the process environment or the
    /// environment store, for operator-transparency logging.
    pub env_param_names: Vec<String>,
}

/// Merges CLI parameters, process environment, the environment store, and
/// declared defaults into the initial parameter map.
pub fn prepare_inputs(
    ir: &WorkflowIr,
    cli_params: &[(String, Value)],
    settings_env: &IndexMap<String, String>,
) -> PreparedInputs {
    let mut prepared = PreparedInputs::default();

    for (key, value) in cli_params {
        if !is_valid_parameter_name(key) {
            prepared.errors.push(
                CompilationError::new(format!("Invalid parameter name '{key}'")).suggest(
                    "Parameter names cannot contain shell special characters ($, |, >, <, &, ;) \
                     and must start with a letter or underscore",
                ),
            );
            continue;
        }
        prepared.params.insert(key.clone(), value.clone());
    }

    for (name, input) in &ir.inputs {
        if prepared.params.contains_key(name) {
            continue;
        }
        if let Ok(value) = std::env::var(name) {
            prepared.params.insert(name.clone(), Value::String(value));
            prepared.env_param_names.push(name.clone());
            continue;
        }
        if let Some(value) = settings_env.get(name) {
            prepared
                .params
                .insert(name.clone(), Value::String(value.clone()));
            prepared.env_param_names.push(name.clone());
            continue;
        }
        if let Some(default) = &input.default {
            prepared.params.insert(name.clone(), default.clone());
            prepared.resolved_defaults.push(name.clone());
        }
    }

    if let Some(error) = missing_required_inputs_error(ir, &prepared.params) {
        prepared.errors.push(error);
    }

    prepared
}

/// Builds the single missing-required-inputs error, one row per input, or
/// `None` when everything required is present.
pub fn missing_required_inputs_error(
    ir: &WorkflowIr,
    params: &ParamMap,
) -> Option<CompilationError> {
    let missing: Vec<(&String, Option<&str>)> = ir
        .inputs
        .iter()
        .filter(|(name, input)| input.required && !params.contains_key(*name))
        .map(|(name, input)| (name, input.description.as_deref()))
        .collect();

    match missing.as_slice() {
        [] => None,
        [(name, description)] => {
            let mut error =
                CompilationError::new(format!("Missing required input '{name}'"))
                    .at(format!("inputs.{name}"));
            if let Some(description) = description {
                error.message = format!("Missing required input '{name}' — {description}");
            }
            Some(error.suggest(format!("Provide it with: {name}=<value>")))
        }
        many => {
            let mut rows = vec!["Missing required inputs:".to_string()];
            for (name, description) in many {
                match description {
                    Some(description) => rows.push(format!("  {name} — {description}")),
                    None => rows.push(format!("  {name}")),
                }
            }
            Some(
                CompilationError::new(rows.join("\n"))
                    .at("inputs")
                    .suggest("Provide each missing input as key=value"),
            )
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn ir_with_inputs(inputs: Value) -> WorkflowIr {
        WorkflowIr::from_value(json!({
            "ir_version": "0.1.0",
            "nodes": [{"id": "n1", "type": "t"}],
            "inputs": inputs
        }))
        .expect("valid IR")
    }

    fn cli(pairs: &[(&str, Value)]) -> Vec<(String, Value)> {
        pairs
            .iter()
            .map(|(key, value)| (key.to_string(), value.clone()))
            .collect()
    }

    #[test]
    fn cli_beats_settings_env_and_default() {
        let ir = ir_with_inputs(json!({
            "api_url": {"type": "string", "default": "https://default"}
        }));
        let mut settings_env = IndexMap::new();
        settings_env.insert("api_url".to_string(), "https://settings".to_string());

        let prepared = prepare_inputs(&ir, &cli(&[("api_url", json!("https://cli"))]), &settings_env);
        assert!(prepared.errors.is_empty());
        assert_eq!(prepared.params["api_url"], json!("https://cli"));
        assert!(prepared.env_param_names.is_empty());
        assert!(prepared.resolved_defaults.is_empty());
    }

    #[test]
    fn process_env_beats_settings_env() {
        let ir = ir_with_inputs(json!({"PFLOW_TEST_INPUT_A": {"type": "string"}}));
        let mut settings_env = IndexMap::new();
        settings_env.insert("PFLOW_TEST_INPUT_A".to_string(), "from-settings".to_string());

        temp_env::with_var("PFLOW_TEST_INPUT_A", Some("from-shell"), || {
            let prepared = prepare_inputs(&ir, &[], &settings_env);
            assert_eq!(prepared.params["PFLOW_TEST_INPUT_A"], json!("from-shell"));
            assert_eq!(prepared.env_param_names, vec!["PFLOW_TEST_INPUT_A"]);
        });
    }

    #[test]
    fn settings_env_beats_default() {
        let ir = ir_with_inputs(json!({
            "region": {"type": "string", "default": "us"}
        }));
        let mut settings_env = IndexMap::new();
        settings_env.insert("region".to_string(), "eu".to_string());

        let prepared = prepare_inputs(&ir, &[], &settings_env);
        assert_eq!(prepared.params["region"], json!("eu"));
        assert_eq!(prepared.env_param_names, vec!["region"]);
    }

    #[test]
    fn default_used_when_nothing_else_provides() {
        let ir = ir_with_inputs(json!({
            "region": {"type": "string", "required": false, "default": "us"}
        }));
        let prepared = prepare_inputs(&ir, &[], &IndexMap::new());
        assert_eq!(prepared.params["region"], json!("us"));
        assert_eq!(prepared.resolved_defaults, vec!["region"]);
    }

    #[test]
    fn missing_required_input_is_single_error_with_path() {
        let ir = ir_with_inputs(json!({
            "file": {"type": "string", "required": true, "description": "Path to read"}
        }));
        let prepared = prepare_inputs(&ir, &[], &IndexMap::new());
        assert_eq!(prepared.errors.len(), 1);
        let error = &prepared.errors[0];
        assert_eq!(error.path, "inputs.file");
        assert!(error.message.contains("file"));
        assert!(error.message.contains("Path to read"));
    }

    #[test]
    fn multiple_missing_inputs_render_one_row_each() {
        let ir = ir_with_inputs(json!({
            "alpha": {"required": true},
            "beta": {"required": true, "description": "second"}
        }));
        let prepared = prepare_inputs(&ir, &[], &IndexMap::new());
        assert_eq!(prepared.errors.len(), 1);
        let message = &prepared.errors[0].message;
        assert!(message.contains("  alpha"));
        assert!(message.contains("  beta — second"));
    }

    #[test]
    fn empty_string_counts_as_a_value() {
        let ir = ir_with_inputs(json!({"name": {"required": true}}));
        let prepared = prepare_inputs(&ir, &cli(&[("name", json!(""))]), &IndexMap::new());
        assert!(prepared.errors.is_empty());
        assert_eq!(prepared.params["name"], json!(""));
    }

    #[test]
    fn invalid_parameter_names_are_rejected() {
        let ir = ir_with_inputs(json!({}));
        let prepared = prepare_inputs(&ir, &cli(&[("foo$bar", json!("x"))]), &IndexMap::new());
        assert_eq!(prepared.errors.len(), 1);
        assert!(prepared.errors[0].message.contains("foo$bar"));
        assert!(!prepared.params.contains_key("foo$bar"));
    }

    #[test]
    fn preparation_is_idempotent_over_defaults() {
        let ir = ir_with_inputs(json!({
            "region": {"required": false, "default": "us"}
        }));
        let first = prepare_inputs(&ir, &[], &IndexMap::new());
        let again_cli: Vec<(String, Value)> = first
            .params
            .iter()
            .map(|(key, value)| (key.clone(), value.clone()))
            .collect();
        let second = prepare_inputs(&ir, &again_cli, &IndexMap::new());
        assert_eq!(first.params, second.params);
    }
}
