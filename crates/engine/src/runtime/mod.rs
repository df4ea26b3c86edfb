//! Flow execution.
//!
//! The scheduler walks the compiled graph one node at a time, resolving
//! templates against the live shared store immediately before each node
//! runs, routing along edges keyed by the returned action, and keeping
//! the `__execution__` bookkeeping current after every node.

pub mod observe;
pub mod scheduler;
pub mod wrapper;

pub use observe::{
    InMemoryMetrics, InMemoryTrace, MetricsCollector, NodeMetric, TraceCollector, TraceRow,
};
pub use scheduler::{RunOutcome, run_flow};
pub use wrapper::{DispatchResult, InstrumentedNode, NodeOutcome};
