//! Language-model invocation node.
//!
//! Provider integration is an injected capability: the node drives any
//! [`LlmProvider`] and records the declared token-usage shape under the
//! conventional `llm_usage` key, where the instrumentation wrapper picks
//! it up for `__llm_calls__`.

use std::sync::Arc;
use std::time::Duration;

use serde_json::{Value, json};

use pflow_types::{
    DEFAULT_ACTION, LlmUsage, NodeBehavior, NodeError, ParamMap, RetryPolicy, SharedStore,
    store::LLM_USAGE_KEY,
};

/// One completed model invocation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LlmCompletion {
    /// Generated text.
    pub text: String,
    /// Token usage reported by the provider.
    pub usage: LlmUsage,
}

/// An opaque completion capability.
pub trait LlmProvider: Send + Sync {
    /// Generates a completion for the prompt against the given model.
    fn complete(&self, model: &str, prompt: &str) -> Result<LlmCompletion, NodeError>;
}

/// Invokes a language model with a prompt and stores the response.
pub struct LlmNode {
    provider: Option<Arc<dyn LlmProvider>>,
}

impl LlmNode {
    /// A node with no provider wired; execution fails with a clear
    /// message. The compiler still validates model injection for it.
    pub fn unconfigured() -> Self {
        Self { provider: None }
    }

    /// A node driving the given provider.
    pub fn with_provider(provider: Arc<dyn LlmProvider>) -> Self {
        Self {
            provider: Some(provider),
        }
    }
}

impl NodeBehavior for LlmNode {
    fn prep(&self, _shared: &SharedStore, params: &ParamMap) -> Result<Value, NodeError> {
        let model = params
            .get("model")
            .and_then(Value::as_str)
            .ok_or_else(|| NodeError::fatal("llm node requires a 'model' parameter"))?;
        let prompt = params
            .get("prompt")
            .and_then(Value::as_str)
            .ok_or_else(|| NodeError::fatal("llm node requires a 'prompt' parameter"))?;
        Ok(json!({"model": model, "prompt": prompt}))
    }

    fn exec(&self, prep: Value, _params: &ParamMap) -> Result<Value, NodeError> {
        let provider = self.provider.as_ref().ok_or_else(|| {
            NodeError::fatal(
                "no LLM provider is wired into this build; configure one before using llm nodes",
            )
        })?;
        let completion = provider.complete(
            prep["model"].as_str().unwrap_or_default(),
            prep["prompt"].as_str().unwrap_or_default(),
        )?;
        let usage = serde_json::to_value(&completion.usage)
            .map_err(|error| NodeError::fatal(format!("unserializable usage record: {error}")))?;
        Ok(json!({"response": completion.text, "usage": usage}))
    }

    fn post(
        &self,
        shared: &mut SharedStore,
        _prep: &Value,
        exec: Value,
        _params: &ParamMap,
    ) -> Result<String, NodeError> {
        shared.insert("response", exec["response"].clone());
        shared.insert(LLM_USAGE_KEY, exec["usage"].clone());
        Ok(DEFAULT_ACTION.to_string())
    }

    fn retry_policy(&self, params: &ParamMap) -> RetryPolicy {
        RetryPolicy::from_params(
            params,
            RetryPolicy {
                max_retries: 3,
                wait: Duration::ZERO,
            },
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    struct CannedProvider;

    impl LlmProvider for CannedProvider {
        fn complete(&self, model: &str, prompt: &str) -> Result<LlmCompletion, NodeError> {
            Ok(LlmCompletion {
                text: format!("{model} says: {prompt}"),
                usage: LlmUsage {
                    model: model.to_string(),
                    input_tokens: 10,
                    output_tokens: 5,
                    total_tokens: 15,
                    ..Default::default()
                },
            })
        }
    }

    struct FlakyProvider {
        calls: AtomicU32,
    }

    impl LlmProvider for FlakyProvider {
        fn complete(&self, model: &str, prompt: &str) -> Result<LlmCompletion, NodeError> {
            let call = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
            if call <= 2 {
                return Err(NodeError::transient(format!("overloaded ({call})")));
            }
            CannedProvider.complete(model, prompt)
        }
    }

    fn params() -> ParamMap {
        let mut params = ParamMap::new();
        params.insert("model".into(), json!("test-model"));
        params.insert("prompt".into(), json!("hi"));
        params
    }

    #[test]
    fn stores_response_and_usage() {
        let node = LlmNode::with_provider(Arc::new(CannedProvider));
        let params = params();
        let mut shared = SharedStore::new();
        let prep = node.prep(&shared, &params).expect("prep");
        let exec = node.exec(prep.clone(), &params).expect("exec");
        let action = node.post(&mut shared, &prep, exec, &params).expect("post");

        assert_eq!(action, DEFAULT_ACTION);
        assert_eq!(shared.get("response"), Some(&json!("test-model says: hi")));
        let usage = shared.get(LLM_USAGE_KEY).expect("usage");
        assert_eq!(usage["total_tokens"], json!(15));
        assert_eq!(usage["model"], json!("test-model"));
    }

    #[test]
    fn flaky_provider_is_transient() {
        let node = LlmNode::with_provider(Arc::new(FlakyProvider {
            calls: AtomicU32::new(0),
        }));
        let params = params();
        let prep = node.prep(&SharedStore::new(), &params).expect("prep");

        assert!(node.exec(prep.clone(), &params).expect_err("first").is_transient());
        assert!(node.exec(prep.clone(), &params).expect_err("second").is_transient());
        assert!(node.exec(prep, &params).is_ok());
    }

    #[test]
    fn unconfigured_provider_is_fatal() {
        let node = LlmNode::unconfigured();
        let params = params();
        let prep = node.prep(&SharedStore::new(), &params).expect("prep");
        let error = node.exec(prep, &params).expect_err("no provider");
        assert!(!error.is_transient());
    }

    #[test]
    fn missing_prompt_is_fatal() {
        let node = LlmNode::unconfigured();
        let mut params = ParamMap::new();
        params.insert("model".into(), json!("m"));
        let error = node
            .prep(&SharedStore::new(), &params)
            .expect_err("missing prompt");
        assert!(!error.is_transient());
    }
}
