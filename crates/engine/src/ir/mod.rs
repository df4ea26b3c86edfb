//! IR acceptance: normalization, structural validation, typed parsing.

mod normalize;
mod schema;

pub use normalize::normalize_ir;
pub use schema::validate_ir;

use pflow_types::{ValidationError, WorkflowIr};
use serde_json::Value;

/// Normalizes, structurally validates, and typed-parses a raw IR document.
pub fn load_document(mut raw: Value) -> Result<WorkflowIr, ValidationError> {
    normalize_ir(&mut raw);
    validate_ir(&raw)?;
    WorkflowIr::from_value(raw)
        .map_err(|error| ValidationError::new(format!("IR deserialization failed: {error}")))
}
