//! Settings commands.

use anyhow::Result;
use serde_json::Value;

use pflow_registry::Settings;
use pflow_util::mask_param_value;

/// Sets one environment store entry.
pub fn set_env(key: &str, value: &str) -> Result<i32> {
    let mut settings = Settings::load_default();
    settings.env.insert(key.to_string(), value.to_string());
    settings.save_default()?;
    println!("Set env entry '{key}'");
    Ok(0)
}

/// Sets the default workflow model injected into LLM nodes.
pub fn set_model(model: &str) -> Result<i32> {
    let mut settings = Settings::load_default();
    settings.default_workflow_model = Some(model.to_string());
    settings.save_default()?;
    println!("Set default workflow model to '{model}'");
    Ok(0)
}

/// Prints current settings with sensitive values masked.
pub fn show() -> Result<i32> {
    let settings = Settings::load_default();
    match &settings.default_workflow_model {
        Some(model) => println!("default_workflow_model: {model}"),
        None => println!("default_workflow_model: (not set)"),
    }
    if settings.env.is_empty() {
        println!("env: (empty)");
    } else {
        println!("env:");
        for (key, value) in &settings.env {
            println!(
                "  {key}: {}",
                mask_param_value(key, &Value::String(value.clone()))
            );
        }
    }
    Ok(0)
}
