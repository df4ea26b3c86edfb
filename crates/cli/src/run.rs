//! Workflow execution and validation commands.

use std::io::{IsTerminal, Read};
use std::path::Path;

use anyhow::{Context, Result, bail};
use serde_json::{Value, json};
use tracing::info;

use pflow_engine::compiler::{CompileOptions, compile_workflow};
use pflow_engine::runtime::{InMemoryMetrics, InMemoryTrace, run_flow};
use pflow_engine::stdin::{StdinMode, determine_stdin_mode, normalize_stdin, populate_shared_store};
use pflow_engine::validator::WorkflowValidator;
use pflow_engine::{load_document, parse_markdown, prepare_inputs};
use pflow_registry::{Settings, WorkflowStore};
use pflow_types::{TemplateMode, WorkflowIr};
use pflow_util::{mask_param_value, parse_param_pairs};

/// Loads a raw IR document from a file path, a saved workflow name, or
/// piped stdin carrying a workflow document.
fn load_raw_document(workflow: Option<&str>, piped: Option<&str>) -> Result<Value> {
    if let Some(reference) = workflow {
        let path = Path::new(reference);
        if path.exists() {
            let content = std::fs::read_to_string(path)
                .with_context(|| format!("read workflow {}", path.display()))?;
            if reference.ends_with(".md") {
                let parsed = parse_markdown(&content)?;
                for warning in &parsed.warnings {
                    eprintln!("warning: {warning}");
                }
                return Ok(parsed.ir);
            }
            return serde_json::from_str(&content)
                .with_context(|| format!("parse workflow JSON {}", path.display()));
        }
        let store = WorkflowStore::open_default();
        if store.exists(reference) {
            return store.load_ir(reference);
        }
        bail!("workflow '{reference}' is neither a file nor a saved workflow");
    }

    if let Some(content) = piped
        && determine_stdin_mode(content) == StdinMode::Workflow
    {
        return serde_json::from_str(content).context("parse workflow JSON from stdin");
    }
    bail!("no workflow given: pass a file, a saved name, or pipe a document on stdin");
}

/// Runs a workflow end to end. Returns the process exit code.
pub fn execute_workflow(
    workflow: Option<&str>,
    raw_params: &[String],
    output_format: &str,
    permissive: bool,
    verbose: bool,
) -> Result<i32> {
    let piped = read_piped_stdin();
    let raw = load_raw_document(workflow, piped.as_deref())?;
    let ir = load_document(raw.clone()).map_err(anyhow::Error::from)?;
    let ir = if permissive {
        WorkflowIr {
            template_resolution_mode: TemplateMode::Permissive,
            ..ir
        }
    } else {
        ir
    };

    let cli_params =
        parse_param_pairs(raw_params.iter().map(String::as_str)).context("parse parameters")?;
    let settings = Settings::load_default();
    let prepared = prepare_inputs(&ir, &cli_params, &settings.env);
    if !prepared.errors.is_empty() {
        for error in &prepared.errors {
            eprintln!("{error}");
        }
        return Ok(1);
    }
    if verbose {
        for name in &prepared.env_param_names {
            eprintln!("parameter '{name}' sourced from the environment");
        }
        for (key, value) in &prepared.params {
            eprintln!("  {key}: {}", mask_param_value(key, value));
        }
    }

    let registry = pflow_nodes::builtin_registry();
    let mut normalized = raw;
    pflow_engine::normalize_ir(&mut normalized);
    let (errors, warnings) =
        WorkflowValidator::validate(&normalized, Some(&prepared.params), Some(&registry), false);
    for warning in &warnings {
        eprintln!("warning: {warning}");
    }
    if !errors.is_empty() {
        for error in &errors {
            eprintln!("{error}");
        }
        return Ok(1);
    }

    let metrics = InMemoryMetrics::shared();
    let trace = InMemoryTrace::shared();
    let options = CompileOptions {
        initial_params: prepared.params,
        default_model: settings.default_workflow_model.clone(),
        metrics: Some(metrics.clone()),
        trace: Some(trace.clone()),
        is_planner: false,
    };
    let flow = compile_workflow(&ir, &registry, options).map_err(anyhow::Error::from)?;

    let mut shared = flow.initial_store();
    if let Some(content) = &piped
        && determine_stdin_mode(content) == StdinMode::Data
    {
        populate_shared_store(&mut shared, content);
    }

    let outcome = run_flow(&flow, &mut shared);
    info!(success = outcome.success, "run finished");

    for warning in &outcome.warnings {
        eprintln!("warning: {warning}");
    }

    let total_ms: u64 = metrics
        .records()
        .iter()
        .map(|record| record.duration_ms)
        .sum();

    if output_format == "json" {
        let rendered = json!({
            "success": outcome.success,
            "outputs": outcome.outputs,
            "failed_node": outcome.failed_node,
            "error": outcome.error,
            "execution_time_ms": total_ms,
        });
        println!("{}", serde_json::to_string_pretty(&rendered)?);
    } else if outcome.success {
        println!("\u{2713} Workflow completed successfully");
        if !outcome.outputs.is_empty() {
            println!("\nOutputs:");
            for (name, value) in &outcome.outputs {
                println!("  {name}: {}", render_value(value));
            }
        }
        println!("\nExecution time: {total_ms}ms");
        if verbose {
            let execution = shared.execution().unwrap_or_default();
            println!("Completed nodes: {}", execution.completed_nodes.join(", "));
        }
    } else {
        eprintln!("\u{2717} Workflow failed");
        if let Some(node) = &outcome.failed_node {
            eprintln!("Failed node: {node}");
        }
        if let Some(error) = &outcome.error {
            eprintln!("Error: {error}");
        }
        eprintln!("\nExecution time: {total_ms}ms");
    }

    Ok(if outcome.success { 0 } else { 1 })
}

/// Validates a workflow file and prints findings. Returns the exit code.
pub fn validate_workflow(file: &Path) -> Result<i32> {
    let content =
        std::fs::read_to_string(file).with_context(|| format!("read {}", file.display()))?;
    let mut raw: Value = if file.extension().and_then(|ext| ext.to_str()) == Some("md") {
        let parsed = parse_markdown(&content)?;
        for warning in &parsed.warnings {
            println!("warning: {warning}");
        }
        parsed.ir
    } else {
        serde_json::from_str(&content).with_context(|| format!("parse {}", file.display()))?
    };

    pflow_engine::normalize_ir(&mut raw);
    let registry = pflow_nodes::builtin_registry();
    let (errors, warnings) = WorkflowValidator::validate(&raw, None, Some(&registry), false);

    for warning in &warnings {
        println!("warning: {warning}");
    }
    if errors.is_empty() {
        println!("\u{2713} Workflow is valid");
        Ok(0)
    } else {
        for error in &errors {
            eprintln!("{error}");
        }
        eprintln!("\n{} validation error(s)", errors.len());
        Ok(1)
    }
}

fn read_piped_stdin() -> Option<String> {
    let mut stdin = std::io::stdin();
    if stdin.is_terminal() {
        return None;
    }
    let mut content = String::new();
    stdin.read_to_string(&mut content).ok()?;
    normalize_stdin(&content)
}

fn render_value(value: &Value) -> String {
    match value {
        Value::String(text) => text.clone(),
        other => serde_json::to_string_pretty(other).unwrap_or_else(|_| other.to_string()),
    }
}
