//! HTTP request node.

use std::time::Duration;

use serde_json::{Value, json};

use pflow_types::{
    DEFAULT_ACTION, ERROR_ACTION, NodeBehavior, NodeError, ParamMap, RetryPolicy, SharedStore,
};

const DEFAULT_TIMEOUT_SECS: f64 = 30.0;

/// Issues an HTTP request and stores the response.
///
/// The response body is parsed as JSON when possible and kept as text
/// otherwise; status codes at or above 400 route to the error action.
pub struct HttpNode;

impl NodeBehavior for HttpNode {
    fn prep(&self, _shared: &SharedStore, params: &ParamMap) -> Result<Value, NodeError> {
        let url = params
            .get("url")
            .and_then(Value::as_str)
            .ok_or_else(|| NodeError::fatal("http node requires a 'url' parameter"))?;
        let method = params
            .get("method")
            .and_then(Value::as_str)
            .unwrap_or("GET")
            .to_ascii_uppercase();
        Ok(json!({
            "url": url,
            "method": method,
            "headers": params.get("headers").cloned().unwrap_or(json!({})),
            "body": params.get("body").cloned().unwrap_or(Value::Null),
            "timeout": params
                .get("timeout")
                .and_then(Value::as_f64)
                .unwrap_or(DEFAULT_TIMEOUT_SECS),
        }))
    }

    fn exec(&self, prep: Value, _params: &ParamMap) -> Result<Value, NodeError> {
        let runtime = tokio::runtime::Runtime::new()
            .map_err(|error| NodeError::transient(format!("failed to start runtime: {error}")))?;
        runtime.block_on(send_request(&prep))
    }

    fn post(
        &self,
        shared: &mut SharedStore,
        _prep: &Value,
        exec: Value,
        _params: &ParamMap,
    ) -> Result<String, NodeError> {
        let status_code = exec["status_code"].as_i64().unwrap_or(0);
        shared.insert("status_code", json!(status_code));
        shared.insert("response", exec["body"].clone());

        if !(100..400).contains(&status_code) {
            shared.set_error(format!("http request failed with status {status_code}"));
            return Ok(ERROR_ACTION.to_string());
        }
        Ok(DEFAULT_ACTION.to_string())
    }

    fn retry_policy(&self, params: &ParamMap) -> RetryPolicy {
        RetryPolicy::from_params(
            params,
            RetryPolicy {
                max_retries: 3,
                wait: Duration::from_secs(1),
            },
        )
    }
}

async fn send_request(prep: &Value) -> Result<Value, NodeError> {
    let url = prep["url"].as_str().unwrap_or_default();
    let method = reqwest::Method::from_bytes(prep["method"].as_str().unwrap_or("GET").as_bytes())
        .map_err(|_| NodeError::fatal(format!("invalid http method '{}'", prep["method"])))?;
    let timeout = Duration::from_secs_f64(prep["timeout"].as_f64().unwrap_or(DEFAULT_TIMEOUT_SECS));

    let client = reqwest::Client::builder()
        .timeout(timeout)
        .build()
        .map_err(|error| NodeError::transient(format!("failed to build http client: {error}")))?;

    let mut request = client.request(method, url);
    if let Some(headers) = prep["headers"].as_object() {
        for (name, value) in headers {
            let rendered = match value {
                Value::String(text) => text.clone(),
                other => other.to_string(),
            };
            request = request.header(name, rendered);
        }
    }
    if !prep["body"].is_null() {
        request = request.json(&prep["body"]);
    }

    let response = request
        .send()
        .await
        .map_err(|error| NodeError::transient(format!("http request failed: {error}")))?;
    let status_code = response.status().as_u16();
    let text = response
        .text()
        .await
        .map_err(|error| NodeError::transient(format!("failed to read response body: {error}")))?;

    let body = serde_json::from_str::<Value>(&text).unwrap_or(Value::String(text));
    Ok(json!({"status_code": status_code, "body": body}))
}
