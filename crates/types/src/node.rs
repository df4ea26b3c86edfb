//! Node lifecycle contract.
//!
//! Every node type implements the three-phase lifecycle the scheduler
//! drives: `prep` reads from the shared store and the resolved params,
//! `exec` performs the work on the prep value, and `post` writes outputs
//! back and returns an action string selecting the next edge. Cross-cutting
//! behavior (retry, timing, tracing) is layered on by the runtime, not
//! baked into implementations.

use std::time::Duration;

use indexmap::IndexMap;
use serde_json::Value;

use crate::error::NodeError;
use crate::store::SharedStore;

/// Resolved parameter mapping handed to each lifecycle phase.
pub type ParamMap = IndexMap<String, Value>;

/// Constructor registered per node type.
pub type NodeConstructor = fn() -> Box<dyn NodeBehavior>;

/// Conventional action selecting the default edge.
pub const DEFAULT_ACTION: &str = "default";
/// Reserved action selecting failure routing.
pub const ERROR_ACTION: &str = "error";

/// Retry behavior for transient `prep`/`exec` failures.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total attempts before the fallback runs (1 means no retry).
    pub max_retries: u32,
    /// Pause between attempts.
    pub wait: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 1,
            wait: Duration::ZERO,
        }
    }
}

impl RetryPolicy {
    /// Reads `max_retries` and `wait` overrides from a node's params,
    /// falling back to the given defaults.
    pub fn from_params(params: &ParamMap, defaults: RetryPolicy) -> Self {
        let max_retries = params
            .get("max_retries")
            .and_then(Value::as_u64)
            .map(|count| count.max(1) as u32)
            .unwrap_or(defaults.max_retries);
        let wait = params
            .get("wait")
            .and_then(Value::as_f64)
            .filter(|seconds| *seconds >= 0.0)
            .map(Duration::from_secs_f64)
            .unwrap_or(defaults.wait);
        Self { max_retries, wait }
    }
}

/// Decision made after retries are exhausted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FallbackOutcome {
    /// Record the message under `shared["error"]` and return the error
    /// action so failure routing can take over.
    ErrorAction(String),
    /// Abort the whole flow; reserved for nodes whose absence invalidates it.
    Fatal(String),
}

/// The uniform three-phase node lifecycle.
pub trait NodeBehavior: Send {
    /// Reads from the shared store and resolved params; the returned value
    /// is handed to `exec`. Transient failures here are retried.
    fn prep(&self, _shared: &SharedStore, _params: &ParamMap) -> Result<Value, NodeError> {
        Ok(Value::Null)
    }

    /// Pure computation on the prep value. Transient failures are retried.
    fn exec(&self, prep: Value, params: &ParamMap) -> Result<Value, NodeError>;

    /// Writes outputs to the shared store and returns the action string.
    fn post(
        &self,
        shared: &mut SharedStore,
        prep: &Value,
        exec: Value,
        params: &ParamMap,
    ) -> Result<String, NodeError>;

    /// Retry policy for this node given its resolved params.
    fn retry_policy(&self, params: &ParamMap) -> RetryPolicy {
        RetryPolicy::from_params(params, RetryPolicy::default())
    }

    /// Called after retries are exhausted. The default synthesizes a safe
    /// error action carrying the failure message.
    fn exec_fallback(&self, error: &NodeError) -> FallbackOutcome {
        FallbackOutcome::ErrorAction(error.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn retry_policy_reads_params() {
        let mut params = ParamMap::new();
        params.insert("max_retries".into(), json!(3));
        params.insert("wait".into(), json!(0.5));
        let policy = RetryPolicy::from_params(&params, RetryPolicy::default());
        assert_eq!(policy.max_retries, 3);
        assert_eq!(policy.wait, Duration::from_millis(500));
    }

    #[test]
    fn retry_policy_clamps_zero_attempts() {
        let mut params = ParamMap::new();
        params.insert("max_retries".into(), json!(0));
        let policy = RetryPolicy::from_params(&params, RetryPolicy::default());
        assert_eq!(policy.max_retries, 1);
    }

    #[test]
    fn retry_policy_defaults_pass_through() {
        let params = ParamMap::new();
        let defaults = RetryPolicy {
            max_retries: 4,
            wait: Duration::from_secs(1),
        };
        assert_eq!(RetryPolicy::from_params(&params, defaults), defaults);
    }
}
