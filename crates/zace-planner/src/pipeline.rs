//! The plan() recovery pipeline (§4.3): schema transport, prompt-mode
//! fallback, bounded repair loop, one-shot retry, legacy extraction, and
//! exhaustion.

use std::path::{Path, PathBuf};

use zace_core::model::PlanResult;
use zace_core::types::{ParseMode, PlanAction, PlannerOutputMode};
use zace_core::{AppError, ProviderErrorKind};

use crate::llm::PlannerLlmClient;
use crate::schema::{self, ParseReason};

/// Tunables for one `plan()` invocation.
#[derive(Debug, Clone)]
pub struct PlannerOptions {
    pub mode: PlannerOutputMode,
    pub max_repairs: u32,
    pub retry_on_failure: bool,
    pub artifacts_dir: PathBuf,
}

impl Default for PlannerOptions {
    fn default() -> Self {
        Self {
            mode: PlannerOutputMode::Auto,
            max_repairs: 2,
            retry_on_failure: true,
            artifacts_dir: PathBuf::from(".zace/artifacts"),
        }
    }
}

struct Attempt {
    response_preview: String,
    parse_reason: String,
    transport_structured: bool,
}

const PREVIEW_CHARS: usize = 400;

fn preview(text: &str) -> String {
    if text.chars().count() <= PREVIEW_CHARS {
        text.to_string()
    } else {
        text.chars().take(PREVIEW_CHARS).collect::<String>() + "..."
    }
}

fn try_parse(text: &str, mode: ParseMode) -> Result<PlanResult, ParseReason> {
    let value: serde_json::Value =
        serde_json::from_str(text.trim()).map_err(|e| ParseReason(e.to_string()))?;
    schema::validate(&value, mode)
}

/// Run the full recovery pipeline and always return a `PlanResult` — even
/// exhaustion produces one, with `action=blocked`.
pub async fn plan(client: &dyn PlannerLlmClient, prompt: &str, options: &PlannerOptions) -> PlanResult {
    let mut attempts: Vec<Attempt> = Vec::new();
    let schema_doc = schema::json_schema();

    // Step 1: schema transport, unless explicitly prompt_only.
    if options.mode != PlannerOutputMode::PromptOnly {
        match client.complete_with_schema(prompt, &schema_doc).await {
            Ok(response) => {
                match try_parse(&response.text, ParseMode::SchemaTransport) {
                    Ok(mut result) => {
                        result.transport_structured = response.transport_structured;
                        return finish(result, attempts.len() as u32 + 1, attempts.len() as u32);
                    }
                    Err(reason) => attempts.push(Attempt {
                        response_preview: preview(&response.text),
                        parse_reason: reason.0,
                        transport_structured: response.transport_structured,
                    }),
                }
            }
            Err(AppError::Provider { kind: ProviderErrorKind::InvalidMessageShape, .. }) => {
                // Retry once, forcing tool-role coercion via an amended prompt.
                let coerced_prompt = format!("{prompt}\n\nRespond using the tool-call role; do not use plain assistant text.");
                match client.complete_with_schema(&coerced_prompt, &schema_doc).await {
                    Ok(response) => match try_parse(&response.text, ParseMode::SchemaTransport) {
                        Ok(mut result) => {
                            result.transport_structured = response.transport_structured;
                            return finish(result, attempts.len() as u32 + 1, attempts.len() as u32);
                        }
                        Err(reason) => attempts.push(Attempt {
                            response_preview: preview(&response.text),
                            parse_reason: reason.0,
                            transport_structured: response.transport_structured,
                        }),
                    },
                    Err(e) => attempts.push(Attempt {
                        response_preview: String::new(),
                        parse_reason: format!("{e}"),
                        transport_structured: false,
                    }),
                }
            }
            Err(AppError::Provider { kind: ProviderErrorKind::ResponseFormatUnsupported, message }) => {
                attempts.push(Attempt {
                    response_preview: String::new(),
                    parse_reason: format!("response_format_unsupported: {message}"),
                    transport_structured: false,
                });
                if options.mode == PlannerOutputMode::SchemaStrict {
                    return exhaust(attempts, options, "schema transport unsupported and mode is schema_strict").await;
                }
            }
            Err(e) => attempts.push(Attempt {
                response_preview: String::new(),
                parse_reason: format!("{e}"),
                transport_structured: false,
            }),
        }
    }

    if options.mode == PlannerOutputMode::SchemaStrict {
        return exhaust(attempts, options, "schema_strict mode exhausted without a valid response").await;
    }

    // Step 2: prompt-mode fallback.
    if let Some(result) = try_prompt_mode(client, prompt, ParseMode::RepairJson, &mut attempts).await {
        return finish(result, attempts.len() as u32 + 1, attempts.len() as u32);
    }

    // Step 3: bounded repair loop.
    for _ in 0..options.max_repairs {
        let last = attempts.last().unwrap();
        let repair_prompt = format!(
            "{prompt}\n\nThe previous response was invalid ({}): \"{}\"\nReturn ONLY a JSON object matching the required schema.",
            last.parse_reason, last.response_preview
        );
        if let Some(result) = try_prompt_mode(client, &repair_prompt, ParseMode::RepairJson, &mut attempts).await {
            return finish(result, attempts.len() as u32 + 1, attempts.len() as u32);
        }
    }

    // Step 4: one-shot retry.
    if options.retry_on_failure {
        let retry_prompt = format!("{prompt}\n\nRetry: return ONLY a single valid JSON object for the schema above.");
        if let Some(result) = try_prompt_mode(client, &retry_prompt, ParseMode::RepairJson, &mut attempts).await {
            return finish(result, attempts.len() as u32 + 1, attempts.len() as u32);
        }
    }

    // Step 5: legacy best-effort extraction from the last raw response.
    if let Some(last) = attempts.last() {
        if let Some(value) = crate::legacy::extract_first_json_object(&last.response_preview) {
            if let Ok(mut result) = schema::validate(&value, ParseMode::Legacy) {
                result.transport_structured = false;
                return finish(result, attempts.len() as u32, attempts.len() as u32);
            }
        }
    }

    // Step 6: exhaustion.
    exhaust(attempts, options, "planner output unparseable after exhausting recovery").await
}

async fn try_prompt_mode(
    client: &dyn PlannerLlmClient,
    prompt: &str,
    mode: ParseMode,
    attempts: &mut Vec<Attempt>,
) -> Option<PlanResult> {
    let response = match client.complete_free_form(prompt).await {
        Ok(r) => r,
        Err(e) => {
            attempts.push(Attempt {
                response_preview: String::new(),
                parse_reason: format!("{e}"),
                transport_structured: false,
            });
            return None;
        }
    };

    let candidate = crate::legacy::extract_first_json_object(&response.text)
        .map(Ok)
        .unwrap_or_else(|| serde_json::from_str(response.text.trim()));

    match candidate {
        Ok(value) => match schema::validate(&value, mode) {
            Ok(mut result) => {
                result.transport_structured = false;
                Some(result)
            }
            Err(reason) => {
                attempts.push(Attempt {
                    response_preview: preview(&response.text),
                    parse_reason: reason.0,
                    transport_structured: false,
                });
                None
            }
        },
        Err(e) => {
            attempts.push(Attempt {
                response_preview: preview(&response.text),
                parse_reason: e.to_string(),
                transport_structured: false,
            });
            None
        }
    }
}

fn finish(mut result: PlanResult, parse_attempts: u32, raw_invalid_count: u32) -> PlanResult {
    result.parse_attempts = parse_attempts.max(1);
    result.raw_invalid_count = raw_invalid_count;
    result
}

async fn exhaust(attempts: Vec<Attempt>, options: &PlannerOptions, reasoning: &str) -> PlanResult {
    let artifact_path = persist_invalid_output(&attempts, &options.artifacts_dir).await;

    PlanResult {
        action: PlanAction::Blocked,
        reasoning: reasoning.to_string(),
        user_message: None,
        tool_call: None,
        completion_gate_commands: None,
        completion_gates_declared_none: None,
        parse_mode: ParseMode::Failed,
        transport_structured: false,
        parse_attempts: attempts.len() as u32,
        raw_invalid_count: attempts.len() as u32,
        invalid_output_artifact_path: artifact_path,
        usage: None,
    }
}

async fn persist_invalid_output(attempts: &[Attempt], dir: &Path) -> Option<String> {
    if attempts.is_empty() {
        return None;
    }
    let records: Vec<serde_json::Value> = attempts
        .iter()
        .enumerate()
        .map(|(i, a)| {
            serde_json::json!({
                "attempt": i + 1,
                "responsePreview": a.response_preview,
                "parseReason": a.parse_reason,
                "transportStructured": a.transport_structured,
            })
        })
        .collect();

    if tokio::fs::create_dir_all(dir).await.is_err() {
        return None;
    }
    let path = dir.join(format!("planner-invalid-{}.json", ulid::Ulid::new()));
    let body = serde_json::to_string_pretty(&records).ok()?;
    tokio::fs::write(&path, body).await.ok()?;
    Some(path.display().to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::LlmResponse;
    use async_trait::async_trait;
    use std::sync::Mutex;

    struct ScriptedClient {
        schema_responses: Mutex<Vec<Result<LlmResponse, AppError>>>,
        free_form_responses: Mutex<Vec<Result<LlmResponse, AppError>>>,
    }

    #[async_trait]
    impl PlannerLlmClient for ScriptedClient {
        async fn complete_with_schema(
            &self,
            _prompt: &str,
            _schema: &serde_json::Value,
        ) -> Result<LlmResponse, AppError> {
            self.schema_responses.lock().unwrap().remove(0)
        }

        async fn complete_free_form(&self, _prompt: &str) -> Result<LlmResponse, AppError> {
            self.free_form_responses.lock().unwrap().remove(0)
        }
    }

    fn structured(text: &str) -> Result<LlmResponse, AppError> {
        Ok(LlmResponse { text: text.to_string(), transport_structured: true })
    }

    fn free(text: &str) -> Result<LlmResponse, AppError> {
        Ok(LlmResponse { text: text.to_string(), transport_structured: false })
    }

    #[tokio::test]
    async fn schema_transport_success_short_circuits() {
        let client = ScriptedClient {
            schema_responses: Mutex::new(vec![structured(
                r#"{"action": "complete", "reasoning": "done"}"#,
            )]),
            free_form_responses: Mutex::new(vec![]),
        };
        let options = PlannerOptions::default();
        let result = plan(&client, "do the task", &options).await;
        assert_eq!(result.action, PlanAction::Complete);
        assert_eq!(result.parse_mode, ParseMode::SchemaTransport);
        assert!(result.transport_structured);
        assert_eq!(result.parse_attempts, 1);
        assert_eq!(result.raw_invalid_count, 0);
    }

    #[tokio::test]
    async fn response_format_unsupported_falls_through_to_prompt_mode() {
        let client = ScriptedClient {
            schema_responses: Mutex::new(vec![Err(AppError::provider(
                ProviderErrorKind::ResponseFormatUnsupported,
                "no response_format support",
            ))]),
            free_form_responses: Mutex::new(vec![free(
                r#"{"action": "ask_user", "reasoning": "need clarification", "userMessage": "which file?"}"#,
            )]),
        };
        let options = PlannerOptions::default();
        let result = plan(&client, "do the task", &options).await;
        assert_eq!(result.action, PlanAction::AskUser);
        assert_eq!(result.parse_mode, ParseMode::RepairJson);
        assert!(!result.transport_structured);
    }

    #[tokio::test]
    async fn schema_strict_mode_blocks_on_unsupported_transport() {
        let client = ScriptedClient {
            schema_responses: Mutex::new(vec![Err(AppError::provider(
                ProviderErrorKind::ResponseFormatUnsupported,
                "no support",
            ))]),
            free_form_responses: Mutex::new(vec![]),
        };
        let options = PlannerOptions {
            mode: PlannerOutputMode::SchemaStrict,
            ..PlannerOptions::default()
        };
        let dir = tempfile::tempdir().unwrap();
        let options = PlannerOptions { artifacts_dir: dir.path().to_path_buf(), ..options };
        let result = plan(&client, "do the task", &options).await;
        assert_eq!(result.action, PlanAction::Blocked);
        assert_eq!(result.parse_mode, ParseMode::Failed);
    }

    #[tokio::test]
    async fn repair_loop_recovers_after_one_invalid_attempt() {
        let client = ScriptedClient {
            schema_responses: Mutex::new(vec![structured("not json at all")]),
            free_form_responses: Mutex::new(vec![
                free("still not json"),
                free(r#"{"action": "complete", "reasoning": "done now"}"#),
            ]),
        };
        let options = PlannerOptions::default();
        let result = plan(&client, "do the task", &options).await;
        assert_eq!(result.action, PlanAction::Complete);
        assert!(result.raw_invalid_count >= 2);
    }

    #[tokio::test]
    async fn total_exhaustion_blocks_and_persists_artifact() {
        let dir = tempfile::tempdir().unwrap();
        let client = ScriptedClient {
            schema_responses: Mutex::new(vec![structured("garbage")]),
            free_form_responses: Mutex::new(vec![free("garbage"), free("garbage"), free("garbage"), free("garbage")]),
        };
        let options = PlannerOptions { artifacts_dir: dir.path().to_path_buf(), ..PlannerOptions::default() };
        let result = plan(&client, "do the task", &options).await;
        assert_eq!(result.action, PlanAction::Blocked);
        assert_eq!(result.parse_mode, ParseMode::Failed);
        let artifact_path = result.invalid_output_artifact_path.unwrap();
        assert!(Path::new(&artifact_path).exists());
    }

    #[test]
    fn preview_truncates_long_text() {
        let long = "a".repeat(1000);
        let p = preview(&long);
        assert!(p.ends_with("..."));
        assert!(p.chars().count() < 1000);
    }
}
