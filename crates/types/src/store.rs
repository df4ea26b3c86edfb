//! The shared key/value store passed through a flow.
//!
//! A single mutable mapping owned by the run. Nodes read from it during
//! `prep` and write their outputs during `post`; the scheduler and the
//! instrumentation wrapper maintain the reserved bookkeeping keys.

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use serde_json::{Map as JsonMap, Value};

/// Reserved key: error description set by a node returning the error action.
pub const ERROR_KEY: &str = "error";
/// Reserved key: piped stdin content captured before the run starts.
pub const STDIN_KEY: &str = "stdin";
/// Reserved key: append-only list of per-LLM-invocation usage records.
pub const LLM_CALLS_KEY: &str = "__llm_calls__";
/// Reserved key: execution bookkeeping maintained by the scheduler.
pub const EXECUTION_KEY: &str = "__execution__";
/// Reserved key: marks LLM calls issued by the planning layer.
pub const PLANNER_KEY: &str = "__is_planner__";
/// Conventional key a node writes its LLM usage record under.
pub const LLM_USAGE_KEY: &str = "llm_usage";

/// Mutable key/value store shared by every node in a flow.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SharedStore {
    data: JsonMap<String, Value>,
}

impl SharedStore {
    /// Creates an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a store seeded with the given entries.
    pub fn from_map(data: JsonMap<String, Value>) -> Self {
        Self { data }
    }

    /// Reads a top-level value.
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.data.get(key)
    }

    /// Writes a top-level value.
    pub fn insert(&mut self, key: impl Into<String>, value: Value) {
        self.data.insert(key.into(), value);
    }

    /// Removes a top-level value.
    pub fn remove(&mut self, key: &str) -> Option<Value> {
        self.data.remove(key)
    }

    /// Returns true when the key is present, even with an empty value.
    pub fn contains_key(&self, key: &str) -> bool {
        self.data.contains_key(key)
    }

    /// Immutable view of the underlying map.
    pub fn data(&self) -> &JsonMap<String, Value> {
        &self.data
    }

    /// Consumes the store, returning the underlying map.
    pub fn into_map(self) -> JsonMap<String, Value> {
        self.data
    }

    /// Deep-copy snapshot of the whole store as a JSON object.
    pub fn snapshot(&self) -> Value {
        Value::Object(self.data.clone())
    }

    /// Writes a value under `store[node_id][key]`, creating the namespace
    /// object when absent. A non-object already at `node_id` is replaced.
    pub fn write_namespaced(&mut self, node_id: &str, key: &str, value: Value) {
        let namespace = self
            .data
            .entry(node_id.to_string())
            .or_insert_with(|| Value::Object(JsonMap::new()));
        if !namespace.is_object() {
            *namespace = Value::Object(JsonMap::new());
        }
        if let Value::Object(map) = namespace {
            map.insert(key.to_string(), value);
        }
    }

    /// Sets the conventional `error` key.
    pub fn set_error(&mut self, message: impl Into<String>) {
        self.data
            .insert(ERROR_KEY.to_string(), Value::String(message.into()));
    }

    /// Reads the conventional `error` key when it holds a string.
    pub fn error(&self) -> Option<&str> {
        self.data.get(ERROR_KEY).and_then(Value::as_str)
    }

    /// Appends a record to the `__llm_calls__` list, creating it when absent.
    /// Existing entries are never overwritten.
    pub fn append_llm_call(&mut self, record: Value) {
        let calls = self
            .data
            .entry(LLM_CALLS_KEY.to_string())
            .or_insert_with(|| Value::Array(Vec::new()));
        if !calls.is_array() {
            *calls = Value::Array(Vec::new());
        }
        if let Value::Array(list) = calls {
            list.push(record);
        }
    }

    /// Number of recorded LLM calls.
    pub fn llm_call_count(&self) -> usize {
        self.data
            .get(LLM_CALLS_KEY)
            .and_then(Value::as_array)
            .map(Vec::len)
            .unwrap_or(0)
    }

    /// Serializes the execution record under `__execution__`.
    pub fn set_execution(&mut self, record: &ExecutionRecord) {
        if let Ok(value) = serde_json::to_value(record) {
            self.data.insert(EXECUTION_KEY.to_string(), value);
        }
    }

    /// Deserializes the execution record, when present and well-formed.
    pub fn execution(&self) -> Option<ExecutionRecord> {
        self.data
            .get(EXECUTION_KEY)
            .cloned()
            .and_then(|value| serde_json::from_value(value).ok())
    }
}

/// Scheduler bookkeeping stored under [`EXECUTION_KEY`].
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct ExecutionRecord {
    /// Node ids that reached `post`, in execution order.
    pub completed_nodes: Vec<String>,
    /// Action returned by each completed node.
    pub node_actions: IndexMap<String, String>,
    /// Deterministic hash of the shared store after each node's `post`.
    pub node_hashes: IndexMap<String, String>,
    /// First node that failed or returned the error action, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub failed_node: Option<String>,
}
