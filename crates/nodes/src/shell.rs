//! Shell command node.

use std::process::Stdio;
use std::time::Duration;

use serde_json::{Value, json};
use tokio::io::AsyncWriteExt;

use pflow_types::{
    DEFAULT_ACTION, ERROR_ACTION, NodeBehavior, NodeError, ParamMap, RetryPolicy, SharedStore,
};

const DEFAULT_TIMEOUT_SECS: f64 = 30.0;
const TIMEOUT_EXIT_CODE: i64 = 124;

/// Runs a command through `sh -c`, capturing stdout, stderr, and the exit
/// code. Trailing newlines are stripped from the captured stdout by
/// default so path-like values compose safely into later templates;
/// `trim_stdout: false` opts out. A `timeout` parameter (seconds) bounds
/// the run; timing out records a non-zero status like any other failure.
pub struct ShellNode;

impl NodeBehavior for ShellNode {
    fn prep(&self, _shared: &SharedStore, params: &ParamMap) -> Result<Value, NodeError> {
        let command = params
            .get("command")
            .and_then(Value::as_str)
            .ok_or_else(|| NodeError::fatal("shell node requires a 'command' parameter"))?;
        Ok(json!({
            "command": command,
            "stdin": params.get("stdin").cloned().unwrap_or(Value::Null),
            "timeout": params
                .get("timeout")
                .and_then(Value::as_f64)
                .unwrap_or(DEFAULT_TIMEOUT_SECS),
        }))
    }

    fn exec(&self, prep: Value, _params: &ParamMap) -> Result<Value, NodeError> {
        let command = prep["command"].as_str().unwrap_or_default().to_string();
        let stdin_data = match &prep["stdin"] {
            Value::Null => None,
            Value::String(text) => Some(text.clone()),
            other => Some(other.to_string()),
        };
        let timeout = Duration::from_secs_f64(prep["timeout"].as_f64().unwrap_or(DEFAULT_TIMEOUT_SECS));

        let runtime = tokio::runtime::Runtime::new()
            .map_err(|error| NodeError::transient(format!("failed to start runtime: {error}")))?;
        runtime.block_on(run_command(&command, stdin_data, timeout))
    }

    fn post(
        &self,
        shared: &mut SharedStore,
        _prep: &Value,
        exec: Value,
        params: &ParamMap,
    ) -> Result<String, NodeError> {
        let trim = params
            .get("trim_stdout")
            .and_then(Value::as_bool)
            .unwrap_or(true);
        let stdout = exec["stdout"].as_str().unwrap_or_default();
        let stdout = if trim {
            stdout.trim_end_matches('\n').to_string()
        } else {
            stdout.to_string()
        };
        let stderr = exec["stderr"].as_str().unwrap_or_default().to_string();
        let exit_code = exec["exit_code"].as_i64().unwrap_or(-1);

        shared.insert("stdout", Value::String(stdout));
        shared.insert("stderr", Value::String(stderr.clone()));
        shared.insert("exit_code", json!(exit_code));

        if exit_code != 0 {
            let detail = if stderr.is_empty() {
                format!("command exited with status {exit_code}")
            } else {
                format!("command exited with status {exit_code}: {stderr}")
            };
            shared.set_error(detail);
            return Ok(ERROR_ACTION.to_string());
        }
        Ok(DEFAULT_ACTION.to_string())
    }

    fn retry_policy(&self, params: &ParamMap) -> RetryPolicy {
        RetryPolicy::from_params(params, RetryPolicy::default())
    }
}

async fn run_command(
    command: &str,
    stdin_data: Option<String>,
    timeout: Duration,
) -> Result<Value, NodeError> {
    let mut child = tokio::process::Command::new("sh")
        .arg("-c")
        .arg(command)
        .kill_on_drop(true)
        .stdin(if stdin_data.is_some() {
            Stdio::piped()
        } else {
            Stdio::null()
        })
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .spawn()
        .map_err(|error| NodeError::transient(format!("failed to spawn command: {error}")))?;

    if let Some(data) = stdin_data
        && let Some(mut stdin) = child.stdin.take()
    {
        stdin
            .write_all(data.as_bytes())
            .await
            .map_err(|error| NodeError::transient(format!("failed to write stdin: {error}")))?;
        drop(stdin);
    }

    match tokio::time::timeout(timeout, child.wait_with_output()).await {
        Ok(Ok(output)) => Ok(json!({
            "stdout": String::from_utf8_lossy(&output.stdout),
            "stderr": String::from_utf8_lossy(&output.stderr),
            "exit_code": output.status.code().unwrap_or(-1),
        })),
        Ok(Err(error)) => Err(NodeError::transient(format!(
            "failed to collect command output: {error}"
        ))),
        Err(_) => Ok(json!({
            "stdout": "",
            "stderr": format!("command timed out after {}s", timeout.as_secs_f64()),
            "exit_code": TIMEOUT_EXIT_CODE,
        })),
    }
}
