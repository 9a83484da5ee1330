//! The execute phase of one run-loop step (§4.6 steps 5-8): runs the
//! approved tool call, classifies failures, drives the bounded transient
//! retry loop, and folds the executor-analysis collaborator's opinion in
//! without ever overriding a `non_transient` verdict.

use std::collections::HashMap;
use std::time::Duration;

use serde_json::{Map, Value};
use tracing::info;

use zace_core::model::{ToolCall, ToolResult};
use zace_core::types::RetryCategory;
use zace_core::AppError;
use zace_session::Phase;

use crate::orchestrator::{emit, payload, RunCollaborators};

pub struct ExecuteOutcome {
    pub tool_result: ToolResult,
}

/// Execute `tool_call`, retrying transient failures up to
/// `config.transient_retry_max_attempts` times with capped backoff, and
/// record the retry verdict on the returned result's artifacts.
pub async fn execute_tool_call(
    tool_call: &ToolCall,
    collab: &mut RunCollaborators<'_>,
    step_num: u32,
) -> Result<ExecuteOutcome, AppError> {
    if tool_call.name != "execute_command" {
        return Err(AppError::validation(
            "execute_command",
            format!("unsupported tool `{}`; only execute_command is implemented", tool_call.name),
        ));
    }

    let command = tool_call
        .arguments
        .get("command")
        .and_then(Value::as_str)
        .ok_or_else(|| AppError::validation("execute_command", "requires a `command` argument"))?
        .to_string();
    let cwd = tool_call
        .arguments
        .get("cwd")
        .and_then(Value::as_str)
        .map(|s| collab.project_root.join(s))
        .unwrap_or_else(|| collab.project_root.to_path_buf());
    let env: HashMap<String, String> = tool_call
        .arguments
        .get("env")
        .and_then(Value::as_object)
        .map(|obj| {
            obj.iter()
                .filter_map(|(k, v)| v.as_str().map(|v| (k.clone(), v.to_string())))
                .collect()
        })
        .unwrap_or_default();
    let timeout_ms = tool_call
        .arguments
        .get("timeoutMs")
        .and_then(Value::as_u64)
        .unwrap_or(collab.config.shell_timeout_ms);

    let mut attempt = 0u32;
    loop {
        emit(
            collab,
            step_num,
            Phase::Executing,
            "tool_call_started",
            payload([("name", Value::String(tool_call.name.clone())), ("attempt", Value::from(attempt))]),
        );

        let result = collab
            .executor
            .execute(
                &command,
                Some(cwd.as_path()),
                &env,
                Some(timeout_ms),
                Some(collab.config.output_limit_chars),
                Some(collab.abort.clone()),
                collab.lsp,
            )
            .await?;

        let (category, reason) = classify(tool_call, &result);
        {
            let mut finished_payload: Map<String, Value> = payload([
                ("name", Value::String(tool_call.name.clone())),
                ("attempt", Value::from(attempt)),
                ("success", Value::from(result.success)),
            ]);
            if let Some(artifacts) = result.artifacts.as_ref() {
                finished_payload.insert("exitCode".to_string(), artifacts.exit_code.map(Value::from).unwrap_or(Value::Null));
            }
            emit(collab, step_num, Phase::Executing, "tool_call_finished", finished_payload);
        }
        let suppressed = suppress_retry_opinion(category);

        let analysis_allowed = match collab.config.executor_analysis {
            zace_config::ExecutorAnalysisMode::Never => false,
            zace_config::ExecutorAnalysisMode::Always => true,
            zace_config::ExecutorAnalysisMode::OnFailure => !result.success,
        };
        let mut retry_suppressed_reason = None;
        if analysis_allowed && !result.success {
            if let Ok(opinion) = collab
                .executor_analysis
                .analyze(&command, &result.output, result.error.as_deref())
                .await
            {
                if opinion.should_retry && category == RetryCategory::NonTransient {
                    retry_suppressed_reason =
                        Some(format!("executor analysis recommended retry but classifier said non_transient: {}", opinion.reason));
                }
            }
        }

        let should_retry = category == RetryCategory::Transient
            && !suppressed
            && attempt < collab.config.transient_retry_max_attempts;

        if suppressed {
            emit(
                collab,
                step_num,
                Phase::Executing,
                "retry_suppressed_non_transient",
                payload([
                    ("category", Value::String(format!("{category:?}").to_lowercase())),
                    ("reason", Value::String(reason.clone())),
                ]),
            );
        }

        let mut result = result;
        if let Some(artifacts) = result.artifacts.as_mut() {
            artifacts.retry_category = Some(category);
            artifacts.retry_suppressed_reason = retry_suppressed_reason.clone().or_else(|| {
                if suppressed {
                    Some(reason.clone())
                } else {
                    None
                }
            });
        }

        if !should_retry {
            return Ok(ExecuteOutcome { tool_result: result });
        }

        attempt += 1;
        let delay = backoff_delay_ms(attempt, collab.config.transient_retry_max_delay_ms);
        info!(step = step_num, attempt, delay_ms = delay, reason = %reason, "retrying transient tool failure");
        tokio::time::sleep(Duration::from_millis(delay)).await;
    }
}

fn classify(tool_call: &ToolCall, result: &ToolResult) -> (RetryCategory, String) {
    zace_retry::classify_retry(tool_call, result)
}

/// Loop-protection fuses (§4.6 step 8, §7): a `non_transient` verdict is
/// never retried even if something upstream asked for it.
fn suppress_retry_opinion(category: RetryCategory) -> bool {
    category == RetryCategory::NonTransient
}

fn backoff_delay_ms(attempt: u32, max_delay_ms: u64) -> u64 {
    let base = 250u64.saturating_mul(1u64 << attempt.min(8));
    base.min(max_delay_ms)
}
