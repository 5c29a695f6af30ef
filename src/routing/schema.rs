//! Structured output schemas for responder replies
//!
//! Both the planner decision and the domain replies are requested from the
//! model as strict JSON schema output. The schemas are generated from the
//! Rust types with `schemars`, and the planner decision is additionally
//! checked with `jsonschema` before it is trusted.

use crate::llm::provider::{JsonSchemaDefinition, ResponseFormat};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// The planner's routing decision
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[schemars(deny_unknown_fields)]
pub struct PlannerDecisionOutput {
    /// Reply to send when no specialist takes the request
    pub reply: String,

    /// Name of the specialist agent that should answer (e.g. "Billing"),
    /// or "Planner" to answer directly
    pub agent_name: String,
}

impl PlannerDecisionOutput {
    /// Generate the JSON schema for this structure
    pub fn json_schema() -> Value {
        schema_value(schemars::schema_for!(PlannerDecisionOutput))
    }

    pub fn response_format() -> ResponseFormat {
        strict_format("planner_decision", Self::json_schema())
    }

    /// Parse model output and validate it against the generated schema
    pub fn parse(content: &str) -> Result<Self, String> {
        let value: Value = serde_json::from_str(content.trim())
            .map_err(|e| format!("Planner output is not JSON: {e}"))?;

        let schema = Self::json_schema();
        let validator = jsonschema::validator_for(&schema)
            .map_err(|e| format!("Schema compilation error: {e}"))?;

        validator.validate(&value).map_err(|errors| {
            let error_messages: Vec<String> = errors
                .map(|e| format!("At '{}': {}", e.instance_path, e))
                .collect();
            error_messages.join("; ")
        })?;

        serde_json::from_value(value).map_err(|e| format!("Invalid planner decision: {e}"))
    }
}

/// A domain specialist's reply
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[schemars(deny_unknown_fields)]
pub struct DomainReplyOutput {
    /// Answer for the user
    pub reply: String,

    /// Whether the specialist needs more information from the user
    pub human_input_required: bool,
}

impl DomainReplyOutput {
    pub fn json_schema() -> Value {
        schema_value(schemars::schema_for!(DomainReplyOutput))
    }

    pub fn response_format() -> ResponseFormat {
        strict_format("domain_reply", Self::json_schema())
    }

    /// Accept either the structured object or plain text
    ///
    /// Returns `None` only for empty output.
    pub fn parse_lenient(content: &str) -> Option<Self> {
        let trimmed = content.trim();
        if trimmed.is_empty() {
            return None;
        }

        if let Ok(Value::Object(map)) = serde_json::from_str::<Value>(trimmed) {
            if let Some(Value::String(reply)) = map.get("reply") {
                return Some(Self {
                    reply: reply.clone(),
                    human_input_required: map
                        .get("human_input_required")
                        .and_then(Value::as_bool)
                        .unwrap_or(false),
                });
            }
        }

        Some(Self {
            reply: trimmed.to_string(),
            human_input_required: false,
        })
    }
}

fn schema_value(schema: schemars::schema::RootSchema) -> Value {
    serde_json::to_value(schema).unwrap_or(Value::Null)
}

fn strict_format(name: &str, schema: Value) -> ResponseFormat {
    ResponseFormat::JsonSchema {
        json_schema: JsonSchemaDefinition {
            name: name.to_string(),
            strict: Some(true),
            schema,
        },
    }
}
