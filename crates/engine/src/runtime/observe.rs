//! Observability collectors.
//!
//! Collectors are shared, thread-safe sinks the instrumentation wrapper
//! feeds during a run. Implementations must be infallible: a collector
//! that cannot record simply drops the observation rather than disturbing
//! the executor.

use std::sync::{Arc, Mutex};

use serde_json::Value;

/// Per-node timing sink.
pub trait MetricsCollector: Send + Sync {
    /// Records one node execution.
    fn record_node_execution(&self, node_id: &str, duration_ms: u64, is_planner: bool);
}

/// Per-node trace sink with before/after store snapshots.
pub trait TraceCollector: Send + Sync {
    /// Records one node execution with its full context.
    fn record_node_execution(&self, row: TraceRow);
}

/// One recorded node execution.
#[derive(Debug, Clone, PartialEq)]
pub struct TraceRow {
    /// Node id in the workflow.
    pub node_id: String,
    /// Registered node type.
    pub node_type: String,
    /// Wall-clock duration of the lifecycle.
    pub duration_ms: u64,
    /// Deep copy of the shared store before `prep`.
    pub shared_before: Value,
    /// Deep copy of the shared store after `post`, taken before the
    /// wrapper's own bookkeeping mutations.
    pub shared_after: Value,
    /// Whether `post` completed normally.
    pub success: bool,
    /// Failure description when `success` is false.
    pub error: Option<String>,
    /// Template warnings emitted while resolving this node's params.
    pub template_resolutions: Vec<String>,
}

/// One recorded metric sample.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NodeMetric {
    pub node_id: String,
    pub duration_ms: u64,
    pub is_planner: bool,
}

/// In-memory metrics sink.
#[derive(Debug, Default)]
pub struct InMemoryMetrics {
    records: Mutex<Vec<NodeMetric>>,
}

impl InMemoryMetrics {
    /// Creates an empty shared sink.
    pub fn shared() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Copies out the recorded samples.
    pub fn records(&self) -> Vec<NodeMetric> {
        self.records.lock().map(|records| records.clone()).unwrap_or_default()
    }
}

impl MetricsCollector for InMemoryMetrics {
    fn record_node_execution(&self, node_id: &str, duration_ms: u64, is_planner: bool) {
        if let Ok(mut records) = self.records.lock() {
            records.push(NodeMetric {
                node_id: node_id.to_string(),
                duration_ms,
                is_planner,
            });
        }
    }
}

/// In-memory trace sink.
#[derive(Debug, Default)]
pub struct InMemoryTrace {
    rows: Mutex<Vec<TraceRow>>,
}

impl InMemoryTrace {
    /// Creates an empty shared sink.
    pub fn shared() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Copies out the recorded rows.
    pub fn rows(&self) -> Vec<TraceRow> {
        self.rows.lock().map(|rows| rows.clone()).unwrap_or_default()
    }
}

impl TraceCollector for InMemoryTrace {
    fn record_node_execution(&self, row: TraceRow) {
        if let Ok(mut rows) = self.rows.lock() {
            rows.push(row);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn metrics_accumulate_in_order() {
        let metrics = InMemoryMetrics::shared();
        metrics.record_node_execution("a", 5, false);
        metrics.record_node_execution("b", 7, true);

        let records = metrics.records();
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].node_id, "a");
        assert!(records[1].is_planner);
    }

    #[test]
    fn trace_rows_keep_snapshots() {
        let trace = InMemoryTrace::shared();
        trace.record_node_execution(TraceRow {
            node_id: "n".into(),
            node_type: "shell".into(),
            duration_ms: 3,
            shared_before: json!({}),
            shared_after: json!({"n": {"stdout": "hi"}}),
            success: true,
            error: None,
            template_resolutions: vec![],
        });

        let rows = trace.rows();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].shared_after["n"]["stdout"], json!("hi"));
    }
}
