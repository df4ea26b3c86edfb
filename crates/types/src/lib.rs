//! Shared type definitions for the pflow workflow engine.
//!
//! This crate holds the domain model every other crate agrees on: the
//! workflow intermediate representation, the node lifecycle contract, the
//! shared key/value store passed through a run, declared node interfaces,
//! and the error taxonomy. Authoring order is preserved everywhere via
//! [`indexmap::IndexMap`] so documents round-trip predictably.

pub mod error;
pub mod interface;
pub mod ir;
pub mod node;
pub mod store;
pub mod telemetry;

pub use error::{CompilationError, NodeError, TemplateError, ValidationError};
pub use interface::{NodeInterface, PortSpec, StructureField};
pub use ir::{
    BatchErrorHandling, BatchSpec, EdgeSpec, InputSpec, MappingSpec, NodeSpec, OutputSpec,
    TemplateMode, ValueType, WorkflowIr,
};
pub use node::{
    DEFAULT_ACTION, ERROR_ACTION, FallbackOutcome, NodeBehavior, NodeConstructor, ParamMap,
    RetryPolicy,
};
pub use store::{
    ERROR_KEY, EXECUTION_KEY, ExecutionRecord, LLM_CALLS_KEY, LLM_USAGE_KEY, PLANNER_KEY,
    STDIN_KEY, SharedStore,
};
pub use telemetry::{LlmCallRecord, LlmUsage};
