//! The instrumentation wrapper around each compiled node.
//!
//! The wrapper drives the inner node's lifecycle with its retry policy,
//! records timing and trace rows, lifts `llm_usage` records into the
//! append-only `__llm_calls__` list, namespaces declared outputs, and
//! computes the deterministic post-state hash the scheduler stores in
//! `__execution__`. Successor wiring lives here too: the compiler calls
//! [`InstrumentedNode::connect`] per edge and the scheduler reads
//! [`InstrumentedNode::successor`] per returned action.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;

use serde_json::Value;

use pflow_types::{
    BatchSpec, ERROR_ACTION, FallbackOutcome, LLM_USAGE_KEY, LlmCallRecord, LlmUsage, NodeBehavior,
    NodeError, ParamMap, SharedStore,
};
use pflow_util::stable_value_hash;

use super::observe::{MetricsCollector, TraceCollector, TraceRow};

/// How one node dispatch ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NodeOutcome {
    /// The lifecycle completed; route along `action`.
    Completed { action: String },
    /// The flow must stop: a fatal failure or an exhausted fallback that
    /// declared itself unrecoverable.
    Aborted { error: String },
}

/// Result of one instrumented dispatch.
#[derive(Debug, Clone)]
pub struct DispatchResult {
    /// Routing outcome.
    pub outcome: NodeOutcome,
    /// Wall-clock duration of the lifecycle.
    pub duration_ms: u64,
    /// Deterministic hash of the shared store after `post`.
    pub state_hash: String,
}

/// A compiled node: the instantiated implementation plus instrumentation
/// context and successor wiring.
pub struct InstrumentedNode {
    node_id: String,
    node_type: String,
    inner: Box<dyn NodeBehavior>,
    params: ParamMap,
    batch: Option<BatchSpec>,
    declared_outputs: Vec<String>,
    successors: HashMap<String, String>,
    is_planner: bool,
    metrics: Option<Arc<dyn MetricsCollector>>,
    trace: Option<Arc<dyn TraceCollector>>,
}

impl std::fmt::Debug for InstrumentedNode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InstrumentedNode")
            .field("node_id", &self.node_id)
            .field("node_type", &self.node_type)
            .field("successors", &self.successors)
            .finish_non_exhaustive()
    }
}

impl InstrumentedNode {
    /// Wraps an instantiated node with its compile-time context.
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        node_id: impl Into<String>,
        node_type: impl Into<String>,
        inner: Box<dyn NodeBehavior>,
        params: ParamMap,
        batch: Option<BatchSpec>,
        declared_outputs: Vec<String>,
        is_planner: bool,
        metrics: Option<Arc<dyn MetricsCollector>>,
        trace: Option<Arc<dyn TraceCollector>>,
    ) -> Self {
        Self {
            node_id: node_id.into(),
            node_type: node_type.into(),
            inner,
            params,
            batch,
            declared_outputs,
            successors: HashMap::new(),
            is_planner,
            metrics,
            trace,
        }
    }

    /// Source id of this node.
    pub fn node_id(&self) -> &str {
        &self.node_id
    }

    /// Registered node type.
    pub fn node_type(&self) -> &str {
        &self.node_type
    }

    /// Unresolved (compile-time) params for this node.
    pub fn params(&self) -> &ParamMap {
        &self.params
    }

    /// Batch configuration, when this node iterates a collection.
    pub fn batch(&self) -> Option<&BatchSpec> {
        self.batch.as_ref()
    }

    /// Output keys declared by this node's registry interface.
    pub fn declared_outputs(&self) -> &[String] {
        &self.declared_outputs
    }

    /// The node's primary output key: the first declared output.
    pub fn primary_output(&self) -> Option<&str> {
        self.declared_outputs.first().map(String::as_str)
    }

    /// Attaches a successor for an action. The last wiring for a given
    /// action wins, matching edge-list order.
    pub fn connect(&mut self, action: impl Into<String>, successor_id: impl Into<String>) {
        self.successors.insert(action.into(), successor_id.into());
    }

    /// Looks up the successor for a returned action.
    pub fn successor(&self, action: &str) -> Option<&str> {
        self.successors.get(action).map(String::as_str)
    }

    /// Runs the full lifecycle once with resolved params, recording
    /// metrics and a trace row.
    pub fn dispatch(
        &self,
        shared: &mut SharedStore,
        resolved_params: &ParamMap,
        namespacing: bool,
        template_resolutions: Vec<String>,
    ) -> DispatchResult {
        let shared_before = self.trace.as_ref().map(|_| shared.snapshot());
        let usage_before = shared.get(LLM_USAGE_KEY).cloned();
        let is_planner = self.is_planner
            || shared
                .get(pflow_types::store::PLANNER_KEY)
                .and_then(Value::as_bool)
                .unwrap_or(false);
        let started = Instant::now();

        let outcome = self.run_lifecycle(shared, resolved_params, namespacing);
        let duration_ms = started.elapsed().as_millis() as u64;

        // Snapshot before the wrapper's own bookkeeping mutations land.
        let shared_after = shared.snapshot();
        let state_hash = stable_value_hash(&shared_after);

        self.lift_llm_usage(shared, usage_before.as_ref(), duration_ms, is_planner);

        if let Some(metrics) = &self.metrics {
            metrics.record_node_execution(&self.node_id, duration_ms, is_planner);
        }
        if let Some(trace) = &self.trace {
            let (success, error) = match &outcome {
                NodeOutcome::Completed { action } if action != ERROR_ACTION => (true, None),
                NodeOutcome::Completed { .. } => {
                    (false, shared.error().map(str::to_string))
                }
                NodeOutcome::Aborted { error } => (false, Some(error.clone())),
            };
            trace.record_node_execution(TraceRow {
                node_id: self.node_id.clone(),
                node_type: self.node_type.clone(),
                duration_ms,
                shared_before: shared_before.unwrap_or(Value::Null),
                shared_after,
                success,
                error,
                template_resolutions,
            });
        }

        DispatchResult {
            outcome,
            duration_ms,
            state_hash,
        }
    }

    fn run_lifecycle(
        &self,
        shared: &mut SharedStore,
        params: &ParamMap,
        namespacing: bool,
    ) -> NodeOutcome {
        let policy = self.inner.retry_policy(params);
        let mut last_error: Option<NodeError> = None;

        for attempt in 1..=policy.max_retries {
            let result = self
                .inner
                .prep(shared, params)
                .and_then(|prep| self.inner.exec(prep.clone(), params).map(|exec| (prep, exec)));
            match result {
                Ok((prep, exec)) => {
                    return match self.inner.post(shared, &prep, exec, params) {
                        Ok(action) => {
                            self.namespace_outputs(shared, namespacing);
                            NodeOutcome::Completed { action }
                        }
                        Err(error) => {
                            shared.set_error(error.to_string());
                            NodeOutcome::Aborted {
                                error: error.to_string(),
                            }
                        }
                    };
                }
                Err(NodeError::Fatal(message)) => {
                    shared.set_error(message.clone());
                    return NodeOutcome::Aborted { error: message };
                }
                Err(error) => {
                    tracing::warn!(
                        node_id = %self.node_id,
                        attempt,
                        max_retries = policy.max_retries,
                        %error,
                        "node attempt failed"
                    );
                    last_error = Some(error);
                    if attempt < policy.max_retries && !policy.wait.is_zero() {
                        std::thread::sleep(policy.wait);
                    }
                }
            }
        }

        let error = last_error.unwrap_or_else(|| NodeError::transient("retries exhausted"));
        match self.inner.exec_fallback(&error) {
            FallbackOutcome::ErrorAction(message) => {
                shared.set_error(message);
                self.namespace_outputs(shared, namespacing);
                NodeOutcome::Completed {
                    action: ERROR_ACTION.to_string(),
                }
            }
            FallbackOutcome::Fatal(message) => {
                shared.set_error(message.clone());
                NodeOutcome::Aborted { error: message }
            }
        }
    }

    /// Copies each declared output present at the top level into the
    /// node's namespace, per the shared-store convention.
    fn namespace_outputs(&self, shared: &mut SharedStore, namespacing: bool) {
        if !namespacing {
            return;
        }
        for key in &self.declared_outputs {
            if let Some(value) = shared.get(key).cloned() {
                shared.write_namespaced(&self.node_id, key, value);
            }
        }
    }

    /// Appends an `__llm_calls__` record when the node wrote a fresh
    /// `llm_usage` during this dispatch.
    fn lift_llm_usage(
        &self,
        shared: &mut SharedStore,
        usage_before: Option<&Value>,
        duration_ms: u64,
        is_planner: bool,
    ) {
        let Some(usage_value) = shared.get(LLM_USAGE_KEY).cloned() else {
            return;
        };
        if usage_before == Some(&usage_value) {
            return;
        }
        let Ok(usage) = serde_json::from_value::<LlmUsage>(usage_value) else {
            return;
        };
        let record = LlmCallRecord {
            node_id: self.node_id.clone(),
            is_planner,
            duration_ms,
            usage,
        };
        if let Ok(value) = serde_json::to_value(&record) {
            shared.append_llm_call(value);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::super::observe::{InMemoryMetrics, InMemoryTrace};
    use super::*;
    use pflow_types::{DEFAULT_ACTION, RetryPolicy};
    use serde_json::json;
    use std::sync::atomic::{AtomicU32, Ordering};

    struct EchoNode;

    impl NodeBehavior for EchoNode {
        fn exec(&self, _prep: Value, params: &ParamMap) -> Result<Value, NodeError> {
            Ok(params.get("text").cloned().unwrap_or(Value::Null))
        }

        fn post(
            &self,
            shared: &mut SharedStore,
            _prep: &Value,
            exec: Value,
            _params: &ParamMap,
        ) -> Result<String, NodeError> {
            shared.insert("content", exec);
            Ok(DEFAULT_ACTION.to_string())
        }
    }

    struct FlakyNode {
        failures_before_success: u32,
        attempts: AtomicU32,
    }

    impl NodeBehavior for FlakyNode {
        fn exec(&self, _prep: Value, _params: &ParamMap) -> Result<Value, NodeError> {
            let attempt = self.attempts.fetch_add(1, Ordering::SeqCst) + 1;
            if attempt <= self.failures_before_success {
                Err(NodeError::transient(format!("attempt {attempt} failed")))
            } else {
                Ok(json!("done"))
            }
        }

        fn post(
            &self,
            shared: &mut SharedStore,
            _prep: &Value,
            exec: Value,
            _params: &ParamMap,
        ) -> Result<String, NodeError> {
            shared.insert(
                LLM_USAGE_KEY,
                json!({"model": "m", "input_tokens": 1, "output_tokens": 2, "total_tokens": 3}),
            );
            shared.insert("response", exec);
            Ok(DEFAULT_ACTION.to_string())
        }

        fn retry_policy(&self, _params: &ParamMap) -> RetryPolicy {
            RetryPolicy {
                max_retries: 3,
                wait: std::time::Duration::ZERO,
            }
        }
    }

    struct FatalNode;

    impl NodeBehavior for FatalNode {
        fn exec(&self, _prep: Value, _params: &ParamMap) -> Result<Value, NodeError> {
            Err(NodeError::fatal("invariant broken"))
        }

        fn post(
            &self,
            _shared: &mut SharedStore,
            _prep: &Value,
            _exec: Value,
            _params: &ParamMap,
        ) -> Result<String, NodeError> {
            Ok(DEFAULT_ACTION.to_string())
        }
    }

    fn wrap(
        inner: Box<dyn NodeBehavior>,
        outputs: &[&str],
        metrics: Option<Arc<dyn MetricsCollector>>,
        trace: Option<Arc<dyn TraceCollector>>,
    ) -> InstrumentedNode {
        InstrumentedNode::new(
            "test_node",
            "test-type",
            inner,
            ParamMap::new(),
            None,
            outputs.iter().map(|key| key.to_string()).collect(),
            false,
            metrics,
            trace,
        )
    }

    #[test]
    fn dispatch_records_metrics_and_namespaces_outputs() {
        let metrics = InMemoryMetrics::shared();
        let node = wrap(Box::new(EchoNode), &["content"], Some(metrics.clone()), None);
        let mut shared = SharedStore::new();
        let mut params = ParamMap::new();
        params.insert("text".into(), json!("hello"));

        let result = node.dispatch(&mut shared, &params, true, vec![]);
        assert_eq!(
            result.outcome,
            NodeOutcome::Completed {
                action: DEFAULT_ACTION.to_string()
            }
        );
        assert_eq!(shared.get("content"), Some(&json!("hello")));
        assert_eq!(shared.get("test_node").unwrap()["content"], json!("hello"));

        let records = metrics.records();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].node_id, "test_node");
        assert!(!records[0].is_planner);
    }

    #[test]
    fn namespacing_disabled_leaves_top_level_only() {
        let node = wrap(Box::new(EchoNode), &["content"], None, None);
        let mut shared = SharedStore::new();
        let mut params = ParamMap::new();
        params.insert("text".into(), json!("hi"));

        node.dispatch(&mut shared, &params, false, vec![]);
        assert!(shared.get("test_node").is_none());
    }

    #[test]
    fn transient_failures_retry_then_succeed_with_one_llm_record() {
        let node = wrap(
            Box::new(FlakyNode {
                failures_before_success: 2,
                attempts: AtomicU32::new(0),
            }),
            &["response"],
            None,
            None,
        );
        let mut shared = SharedStore::new();

        let result = node.dispatch(&mut shared, &ParamMap::new(), true, vec![]);
        assert_eq!(
            result.outcome,
            NodeOutcome::Completed {
                action: DEFAULT_ACTION.to_string()
            }
        );
        assert_eq!(shared.llm_call_count(), 1);
        let calls = shared.get(pflow_types::store::LLM_CALLS_KEY).unwrap();
        assert_eq!(calls[0]["node_id"], json!("test_node"));
        assert_eq!(calls[0]["total_tokens"], json!(3));
    }

    #[test]
    fn exhausted_retries_fall_back_to_error_action() {
        let node = wrap(
            Box::new(FlakyNode {
                failures_before_success: 10,
                attempts: AtomicU32::new(0),
            }),
            &[],
            None,
            None,
        );
        let mut shared = SharedStore::new();

        let result = node.dispatch(&mut shared, &ParamMap::new(), true, vec![]);
        assert_eq!(
            result.outcome,
            NodeOutcome::Completed {
                action: ERROR_ACTION.to_string()
            }
        );
        assert!(shared.error().is_some());
        assert_eq!(shared.llm_call_count(), 0);
    }

    #[test]
    fn fatal_failure_aborts_without_retry() {
        let trace = InMemoryTrace::shared();
        let node = wrap(Box::new(FatalNode), &[], None, Some(trace.clone()));
        let mut shared = SharedStore::new();

        let result = node.dispatch(&mut shared, &ParamMap::new(), true, vec![]);
        assert!(matches!(result.outcome, NodeOutcome::Aborted { .. }));

        let rows = trace.rows();
        assert_eq!(rows.len(), 1);
        assert!(!rows[0].success);
        assert_eq!(rows[0].error.as_deref(), Some("invariant broken"));
    }

    #[test]
    fn trace_snapshots_bracket_the_mutation() {
        let trace = InMemoryTrace::shared();
        let node = wrap(Box::new(EchoNode), &["content"], None, Some(trace.clone()));
        let mut shared = SharedStore::new();
        shared.insert("seed", json!(1));
        let mut params = ParamMap::new();
        params.insert("text".into(), json!("hello"));

        node.dispatch(&mut shared, &params, true, vec!["warn-a".to_string()]);

        let rows = trace.rows();
        assert_eq!(rows.len(), 1);
        assert!(rows[0].success);
        assert!(rows[0].shared_before.get("content").is_none());
        assert_eq!(rows[0].shared_after["content"], json!("hello"));
        assert_eq!(rows[0].template_resolutions, vec!["warn-a"]);
        assert!(rows[0].duration_ms < 10_000);
    }

    #[test]
    fn stale_llm_usage_is_not_reappended() {
        let node = wrap(Box::new(EchoNode), &["content"], None, None);
        let mut shared = SharedStore::new();
        shared.insert(
            LLM_USAGE_KEY,
            json!({"model": "m", "input_tokens": 1, "output_tokens": 1, "total_tokens": 2}),
        );

        node.dispatch(&mut shared, &ParamMap::new(), true, vec![]);
        assert_eq!(shared.llm_call_count(), 0);
    }

    #[test]
    fn planner_key_in_store_classifies_calls() {
        let metrics = InMemoryMetrics::shared();
        let node = wrap(
            Box::new(FlakyNode {
                failures_before_success: 0,
                attempts: AtomicU32::new(0),
            }),
            &["response"],
            Some(metrics.clone()),
            None,
        );
        let mut shared = SharedStore::new();
        shared.insert(pflow_types::store::PLANNER_KEY, json!(true));

        node.dispatch(&mut shared, &ParamMap::new(), true, vec![]);

        assert!(metrics.records()[0].is_planner);
        let calls = shared.get(pflow_types::store::LLM_CALLS_KEY).unwrap();
        assert_eq!(calls[0]["is_planner"], json!(true));
    }

    #[test]
    fn last_connection_wins_per_action() {
        let mut node = wrap(Box::new(EchoNode), &[], None, None);
        node.connect("default", "first");
        node.connect("default", "second");
        assert_eq!(node.successor("default"), Some("second"));
        assert_eq!(node.successor("error"), None);
    }
}
