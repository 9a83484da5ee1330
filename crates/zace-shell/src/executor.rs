//! Top-level shell executor: policy check, spawn, change detection, artifact
//! persistence, LSP probe, and output rendering (§4.1).

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use tokio::process::Command;
use ulid::Ulid;
use zace_core::model::{ToolResult, ToolResultArtifacts};
use zace_core::types::{ChangeSource, LifecycleEvent, ProgressSignal};
use zace_core::{AppError, signature};
use zace_lsp::LspRegistry;
use zace_process::{AbortSignal, ExecutionResult};

use crate::artifacts::{self, DEFAULT_OUTPUT_LIMIT_CHARS, Truncated};
use crate::change_detection::{self, GitSnapshot};
use crate::policy::CommandPolicy;
use crate::render::{self, LspRenderInfo, RenderInput};

/// Label used in the `[execution]` block. POSIX shells are always `sh`; the
/// Windows branch uses `powershell`.
#[cfg(unix)]
const SHELL_LABEL: &str = "sh";
#[cfg(windows)]
const SHELL_LABEL: &str = "powershell";

/// Owns the pieces of C1 that persist across calls: command policy and the
/// configured artifacts directory. The LSP registry (C2) is owned by the
/// caller and threaded through explicitly, since it outlives any one command.
pub struct ShellExecutor {
    policy: CommandPolicy,
    artifacts_dir: PathBuf,
}

impl ShellExecutor {
    pub fn new(policy: CommandPolicy, artifacts_dir: PathBuf) -> Self {
        Self { policy, artifacts_dir }
    }

    /// Run `command` to completion and produce a fully-populated `ToolResult`.
    #[allow(clippy::too_many_arguments)]
    pub async fn execute(
        &self,
        command: &str,
        cwd: Option<&Path>,
        env: &HashMap<String, String>,
        timeout_ms: Option<u64>,
        output_limit_chars: Option<usize>,
        abort: Option<AbortSignal>,
        lsp: &mut LspRegistry,
    ) -> Result<ToolResult, AppError> {
        if let Err(e) = self.policy.check(command) {
            return Ok(ToolResult {
                success: false,
                output: String::new(),
                error: Some(e.to_string()),
                artifacts: None,
            });
        }

        let cwd = cwd.map(Path::to_path_buf).unwrap_or_else(|| {
            std::env::current_dir().unwrap_or_else(|_| PathBuf::from("."))
        });
        let output_limit = output_limit_chars.unwrap_or(DEFAULT_OUTPUT_LIMIT_CHARS);
        let timeout = timeout_ms.map(Duration::from_millis);

        let before = GitSnapshot::take(&cwd);

        let mut cmd = platform_command(command, &cwd);
        for (k, v) in env {
            cmd.env(k, v);
        }

        let result: ExecutionResult = zace_process::run_with_lifecycle(cmd, timeout, abort)
            .await
            .map_err(|e| AppError::ToolExecution(format!("{e:#}")))?;

        let after = GitSnapshot::take(&cwd);
        let git_delta = before.diff(&after);
        let markers = change_detection::from_markers(&result.output, &result.stderr_output, &cwd);
        let redirects = change_detection::from_redirects(command, &cwd);
        let (changed_files, changed_files_source) = change_detection::union_sources(markers, git_delta, redirects);

        let run_id = Ulid::new().to_string();
        let artifact_paths = artifacts::persist(&self.artifacts_dir, &run_id, command, &result.output, &result.stderr_output)
            .map_err(|e| AppError::ToolExecution(format!("{e:#}")))?;

        let stdout_truncated = artifacts::truncate(&result.output, output_limit);
        let stderr_truncated = artifacts::truncate(&result.stderr_output, output_limit);

        let marker_lines: Vec<String> = [&result.output, &result.stderr_output]
            .iter()
            .flat_map(|text| text.lines())
            .filter(|line| line.starts_with("ZACE_"))
            .map(str::to_string)
            .collect();

        let lsp_outcome = if changed_files.is_empty() {
            None
        } else {
            match lsp.probe_files(&changed_files, &cwd).await {
                Ok(outcome) => Some(outcome),
                Err(e) => {
                    tracing::warn!(error = %format!("{e:#}"), "LSP probe failed");
                    None
                }
            }
        };

        let timed_out = result.lifecycle_event == LifecycleEvent::Timeout;
        let aborted = result.lifecycle_event == LifecycleEvent::Abort;

        let progress_signal = if !changed_files.is_empty() {
            ProgressSignal::FilesChanged
        } else if result.exit_code == 0 && result.lifecycle_event == LifecycleEvent::None {
            ProgressSignal::SuccessWithoutChanges
        } else {
            ProgressSignal::None
        };

        let lsp_render = lsp_outcome.as_ref().map(|o| LspRenderInfo {
            status: o.status,
            reason: o.reason.clone(),
            error_count: o.error_count,
            diagnostics_files: o.diagnostics_files.clone(),
        });

        let render_input = RenderInput {
            command,
            shell_label: SHELL_LABEL,
            cwd: &cwd.display().to_string(),
            stdout: &stdout_truncated,
            stderr: &stderr_truncated,
            artifacts: &artifact_paths,
            marker_lines: &marker_lines,
            lsp: lsp_render.as_ref(),
            duration_ms: result.duration_ms,
            exit_code: result.exit_code,
            timed_out,
            aborted,
            lifecycle_event: result.lifecycle_event,
        };
        let rendered = render::render(&render_input);

        let error = if timed_out {
            Some(format!("Command timed out after {}ms", timeout.map(|d| d.as_millis()).unwrap_or_default()))
        } else if aborted {
            Some("Command aborted".to_string())
        } else if result.exit_code != 0 {
            Some(result.summary.clone())
        } else {
            None
        };
        let success = error.is_none();

        let tool_artifacts = ToolResultArtifacts {
            changed_files,
            changed_files_source,
            command_signature: signature::stable_hash_of(
                "execute_command",
                &serde_json::json!({
                    "command": command,
                    "cwd": cwd.display().to_string(),
                }),
            ),
            duration_ms: result.duration_ms,
            exit_code: Some(result.exit_code),
            signal: None,
            lifecycle_event: result.lifecycle_event,
            timed_out,
            aborted,
            stdout_path: artifact_paths.stdout_path.display().to_string(),
            stderr_path: artifact_paths.stderr_path.display().to_string(),
            combined_path: artifact_paths.combined_path.display().to_string(),
            stdout_truncated: stdout_truncated.truncated,
            stderr_truncated: stderr_truncated.truncated,
            output_limit_chars: output_limit,
            progress_signal,
            lsp_status: lsp_outcome.as_ref().map(|o| o.status),
            lsp_status_reason: lsp_outcome.as_ref().and_then(|o| o.reason.clone()),
            lsp_error_count: lsp_outcome.as_ref().map(|o| o.error_count).unwrap_or(0),
            lsp_diagnostics_files: lsp_outcome.map(|o| o.diagnostics_files).unwrap_or_default(),
            retry_category: None,
            retry_suppressed_reason: None,
            write_regression_detected: None,
        };

        Ok(ToolResult {
            success,
            output: rendered,
            error,
            artifacts: Some(tool_artifacts),
        })
    }
}

#[cfg(unix)]
fn platform_command(command: &str, cwd: &Path) -> Command {
    let mut cmd = Command::new("sh");
    cmd.arg("-c").arg(command).current_dir(cwd);
    cmd
}

#[cfg(windows)]
fn platform_command(command: &str, cwd: &Path) -> Command {
    let mut cmd = Command::new("powershell");
    cmd.arg("-Command").arg(command).current_dir(cwd);
    cmd
}
