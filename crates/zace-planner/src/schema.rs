//! Strict planner JSON schema (§4.3): additional properties rejected,
//! `action="continue"` requires `toolCall`.

use serde::Deserialize;
use zace_core::model::{PlanResult, ToolCall};
use zace_core::types::{ParseMode, PlanAction};

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields, rename_all = "camelCase")]
struct RawToolCall {
    name: RawToolName,
    arguments: serde_json::Map<String, serde_json::Value>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "snake_case")]
enum RawToolName {
    ExecuteCommand,
    SearchSessionMessages,
    WriteSessionMessage,
}

impl RawToolName {
    fn as_str(&self) -> &'static str {
        match self {
            Self::ExecuteCommand => "execute_command",
            Self::SearchSessionMessages => "search_session_messages",
            Self::WriteSessionMessage => "write_session_message",
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum RawGates {
    List(Vec<String>),
    Declared(String),
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields, rename_all = "camelCase")]
struct RawPlanOutput {
    action: PlanAction,
    reasoning: String,
    #[serde(default)]
    user_message: Option<String>,
    #[serde(default)]
    tool_call: Option<RawToolCall>,
    #[serde(default)]
    gates: Option<RawGates>,
}

/// Why a candidate JSON value failed validation. Carried through the
/// pipeline for the repair prompt and the final invalid-output artifact.
#[derive(Debug, Clone)]
pub struct ParseReason(pub String);

impl std::fmt::Display for ParseReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Parse and validate one candidate JSON document against the planner
/// schema, producing a [`PlanResult`] skeleton (parse bookkeeping fields are
/// filled in by the pipeline).
pub fn validate(value: &serde_json::Value, parse_mode: ParseMode) -> Result<PlanResult, ParseReason> {
    let raw: RawPlanOutput =
        serde_json::from_value(value.clone()).map_err(|e| ParseReason(e.to_string()))?;

    if raw.reasoning.trim().is_empty() {
        return Err(ParseReason("reasoning must be non-empty".to_string()));
    }

    let (gate_commands, declared_none) = match raw.gates {
        None => (None, None),
        Some(RawGates::List(list)) => (Some(list), None),
        Some(RawGates::Declared(s)) if s == "none" => (None, Some(true)),
        Some(RawGates::Declared(other)) => {
            return Err(ParseReason(format!("gates must be an array or \"none\", got \"{other}\"")));
        }
    };

    let tool_call = raw.tool_call.map(|t| ToolCall {
        name: t.name.as_str().to_string(),
        arguments: t.arguments,
    });

    if raw.action == PlanAction::Continue && tool_call.is_none() {
        return Err(ParseReason("action=continue requires toolCall".to_string()));
    }

    Ok(PlanResult {
        action: raw.action,
        reasoning: raw.reasoning,
        user_message: raw.user_message,
        tool_call,
        completion_gate_commands: gate_commands,
        completion_gates_declared_none: declared_none,
        parse_mode,
        transport_structured: false,
        parse_attempts: 0,
        raw_invalid_count: 0,
        invalid_output_artifact_path: None,
        usage: None,
    })
}

/// The schema document sent to the provider as a response-format hint.
pub fn json_schema() -> serde_json::Value {
    serde_json::json!({
        "type": "object",
        "additionalProperties": false,
        "required": ["action", "reasoning"],
        "properties": {
            "action": { "enum": ["continue", "ask_user", "blocked", "complete"] },
            "reasoning": { "type": "string", "minLength": 1 },
            "userMessage": { "type": "string" },
            "toolCall": {
                "type": "object",
                "additionalProperties": false,
                "required": ["name", "arguments"],
                "properties": {
                    "name": { "enum": ["execute_command", "search_session_messages", "write_session_message"] },
                    "arguments": { "type": "object" },
                },
            },
            "gates": {
                "oneOf": [
                    { "type": "array", "items": { "type": "string" } },
                    { "const": "none" },
                ],
            },
        },
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn valid_continue_with_tool_call() {
        let value = json!({
            "action": "continue",
            "reasoning": "run the tests",
            "toolCall": { "name": "execute_command", "arguments": { "command": "bun test" } },
        });
        let result = validate(&value, ParseMode::SchemaTransport).unwrap();
        assert!(result.is_schema_valid());
        assert_eq!(result.tool_call.unwrap().name, "execute_command");
    }

    #[test]
    fn continue_without_tool_call_is_rejected() {
        let value = json!({ "action": "continue", "reasoning": "thinking" });
        assert!(validate(&value, ParseMode::SchemaTransport).is_err());
    }

    #[test]
    fn unknown_field_is_rejected() {
        let value = json!({ "action": "complete", "reasoning": "done", "extra": 1 });
        assert!(validate(&value, ParseMode::SchemaTransport).is_err());
    }

    #[test]
    fn gates_none_literal_is_accepted() {
        let value = json!({ "action": "complete", "reasoning": "done", "gates": "none" });
        let result = validate(&value, ParseMode::SchemaTransport).unwrap();
        assert_eq!(result.completion_gates_declared_none, Some(true));
    }

    #[test]
    fn gates_list_is_accepted() {
        let value = json!({ "action": "complete", "reasoning": "done", "gates": ["bun test"] });
        let result = validate(&value, ParseMode::SchemaTransport).unwrap();
        assert_eq!(result.completion_gate_commands.unwrap(), vec!["bun test".to_string()]);
    }

    #[test]
    fn empty_reasoning_is_rejected() {
        let value = json!({ "action": "complete", "reasoning": "   " });
        assert!(validate(&value, ParseMode::SchemaTransport).is_err());
    }
}
