//! LLM usage records.
//!
//! Nodes that invoke a language model write an [`LlmUsage`] record under
//! the conventional `llm_usage` key; the instrumentation wrapper lifts it
//! into an [`LlmCallRecord`] with node context and appends it to the
//! append-only `__llm_calls__` list.

use serde::{Deserialize, Serialize};

/// Token usage reported by a single model invocation.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct LlmUsage {
    /// Model identifier the call was made against.
    pub model: String,
    /// Tokens consumed by the prompt.
    pub input_tokens: u64,
    /// Tokens produced in the response.
    pub output_tokens: u64,
    /// Total billed tokens.
    pub total_tokens: u64,
    /// Tokens written to the prompt cache, when the provider reports them.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cache_creation_input_tokens: Option<u64>,
    /// Tokens served from the prompt cache, when the provider reports them.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cache_read_input_tokens: Option<u64>,
}

/// One entry of the `__llm_calls__` list.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct LlmCallRecord {
    /// Node that issued the call.
    pub node_id: String,
    /// Whether the call was made by the planning layer.
    pub is_planner: bool,
    /// Wall-clock duration of the node execution that produced the call.
    pub duration_ms: u64,
    /// Usage fields flattened into the record.
    #[serde(flatten)]
    pub usage: LlmUsage,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn call_record_flattens_usage() {
        let record = LlmCallRecord {
            node_id: "summarize".into(),
            is_planner: false,
            duration_ms: 120,
            usage: LlmUsage {
                model: "test-model".into(),
                input_tokens: 100,
                output_tokens: 50,
                total_tokens: 150,
                ..Default::default()
            },
        };
        let value = serde_json::to_value(&record).expect("serialize record");
        assert_eq!(value["node_id"], json!("summarize"));
        assert_eq!(value["model"], json!("test-model"));
        assert_eq!(value["total_tokens"], json!(150));
        assert!(value.get("cache_read_input_tokens").is_none());
    }

    #[test]
    fn usage_round_trips_cache_fields() {
        let usage = LlmUsage {
            model: "m".into(),
            input_tokens: 1,
            output_tokens: 2,
            total_tokens: 3,
            cache_creation_input_tokens: Some(4),
            cache_read_input_tokens: Some(5),
        };
        let value = serde_json::to_value(&usage).expect("serialize usage");
        let back: LlmUsage = serde_json::from_value(value).expect("deserialize usage");
        assert_eq!(back, usage);
    }
}
