//! Assembles the rendered `ToolResult.output` text block (§4.1).
//!
//! Section order is fixed: `[stdout]`, `[stderr]`, `[artifacts]`, an optional
//! marker block, an optional `[lsp]` block, `[execution]`, then an optional
//! `[truncation]` block.

use zace_core::types::{LifecycleEvent, LspStatus};

use crate::artifacts::{ArtifactPaths, Truncated, truncation_guidance};

const COMMAND_PREVIEW_LIMIT: usize = 600;

/// Everything needed to render one command's output block.
pub struct RenderInput<'a> {
    pub command: &'a str,
    pub shell_label: &'a str,
    pub cwd: &'a str,
    pub stdout: &'a Truncated,
    pub stderr: &'a Truncated,
    pub artifacts: &'a ArtifactPaths,
    pub marker_lines: &'a [String],
    pub lsp: Option<&'a LspRenderInfo>,
    pub duration_ms: u64,
    pub exit_code: i32,
    pub timed_out: bool,
    pub aborted: bool,
    pub lifecycle_event: LifecycleEvent,
}

/// LSP feedback summary for the `[lsp]` block.
pub struct LspRenderInfo {
    pub status: LspStatus,
    pub reason: Option<String>,
    pub error_count: u32,
    pub diagnostics_files: Vec<String>,
}

fn preview_command(command: &str) -> String {
    if command.chars().count() <= COMMAND_PREVIEW_LIMIT {
        command.to_string()
    } else {
        let truncated: String = command.chars().take(COMMAND_PREVIEW_LIMIT - 3).collect();
        format!("{truncated}...")
    }
}

fn lifecycle_event_label(event: LifecycleEvent) -> &'static str {
    match event {
        LifecycleEvent::None => "none",
        LifecycleEvent::Abort => "abort",
        LifecycleEvent::Timeout => "timeout",
    }
}

fn lsp_status_label(status: LspStatus) -> &'static str {
    match status {
        LspStatus::Diagnostics => "diagnostics",
        LspStatus::NoErrors => "no_errors",
        LspStatus::NoActiveServer => "no_active_server",
        LspStatus::NoApplicableFiles => "no_applicable_files",
        LspStatus::NoChangedFiles => "no_changed_files",
        LspStatus::Failed => "failed",
        LspStatus::Disabled => "disabled",
    }
}

/// Assemble the full rendered output text.
pub fn render(input: &RenderInput) -> String {
    let mut out = String::new();

    out.push_str("[stdout]\n");
    out.push_str(&input.stdout.text);
    if !input.stdout.text.ends_with('\n') {
        out.push('\n');
    }

    out.push_str("[stderr]\n");
    out.push_str(&input.stderr.text);
    if !input.stderr.text.ends_with('\n') {
        out.push('\n');
    }

    out.push_str("[artifacts]\n");
    out.push_str(&format!("stdout: {}\n", input.artifacts.stdout_path.display()));
    out.push_str(&format!("stderr: {}\n", input.artifacts.stderr_path.display()));
    out.push_str(&format!("combined: {}\n", input.artifacts.combined_path.display()));

    if !input.marker_lines.is_empty() {
        out.push_str("[markers]\n");
        for line in input.marker_lines {
            out.push_str(line);
            out.push('\n');
        }
    }

    if let Some(lsp) = input.lsp {
        out.push_str("[lsp]\n");
        out.push_str(&format!("status: {}\n", lsp_status_label(lsp.status)));
        if let Some(reason) = &lsp.reason {
            out.push_str(&format!("reason: {reason}\n"));
        }
        out.push_str(&format!("errorCount: {}\n", lsp.error_count));
        if !lsp.diagnostics_files.is_empty() {
            out.push_str(&format!("diagnosticsFiles: {}\n", lsp.diagnostics_files.join(", ")));
        }
    }

    out.push_str("[execution]\n");
    out.push_str(&format!("shell: {}\n", input.shell_label));
    out.push_str(&format!("cwd: {}\n", input.cwd));
    out.push_str(&format!("durationMs: {}\n", input.duration_ms));
    out.push_str(&format!("exitCode: {}\n", input.exit_code));
    out.push_str(&format!("timedOut: {}\n", input.timed_out));
    out.push_str(&format!("aborted: {}\n", input.aborted));
    out.push_str(&format!("lifecycleEvent: {}\n", lifecycle_event_label(input.lifecycle_event)));
    out.push_str(&format!("command: {}\n", preview_command(input.command)));

    if input.stdout.truncated || input.stderr.truncated {
        out.push_str(&truncation_guidance(&input.artifacts.combined_path));
    }

    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    fn sample_artifacts() -> ArtifactPaths {
        ArtifactPaths {
            stdout_path: PathBuf::from("/tmp/a.stdout.txt"),
            stderr_path: PathBuf::from("/tmp/a.stderr.txt"),
            combined_path: PathBuf::from("/tmp/a.combined.txt"),
        }
    }

    #[test]
    fn sections_appear_in_fixed_order() {
        let stdout = Truncated { text: "hi\n".into(), truncated: false };
        let stderr = Truncated { text: String::new(), truncated: false };
        let artifacts = sample_artifacts();
        let input = RenderInput {
            command: "echo hi",
            shell_label: "bash",
            cwd: "/repo",
            stdout: &stdout,
            stderr: &stderr,
            artifacts: &artifacts,
            marker_lines: &[],
            lsp: None,
            duration_ms: 42,
            exit_code: 0,
            timed_out: false,
            aborted: false,
            lifecycle_event: LifecycleEvent::None,
        };
        let rendered = render(&input);
        let stdout_pos = rendered.find("[stdout]").unwrap();
        let stderr_pos = rendered.find("[stderr]").unwrap();
        let artifacts_pos = rendered.find("[artifacts]").unwrap();
        let execution_pos = rendered.find("[execution]").unwrap();
        assert!(stdout_pos < stderr_pos);
        assert!(stderr_pos < artifacts_pos);
        assert!(artifacts_pos < execution_pos);
        assert!(!rendered.contains("[truncation]"));
        assert!(!rendered.contains("[lsp]"));
    }

    #[test]
    fn truncation_block_appears_when_either_stream_truncated() {
        let stdout = Truncated { text: "cut".into(), truncated: true };
        let stderr = Truncated { text: String::new(), truncated: false };
        let artifacts = sample_artifacts();
        let input = RenderInput {
            command: "echo hi",
            shell_label: "bash",
            cwd: "/repo",
            stdout: &stdout,
            stderr: &stderr,
            artifacts: &artifacts,
            marker_lines: &[],
            lsp: None,
            duration_ms: 1,
            exit_code: 0,
            timed_out: false,
            aborted: false,
            lifecycle_event: LifecycleEvent::None,
        };
        let rendered = render(&input);
        assert!(rendered.contains("[truncation]"));
        let truncation_pos = rendered.find("[truncation]").unwrap();
        let execution_pos = rendered.find("[execution]").unwrap();
        assert!(execution_pos < truncation_pos);
    }

    #[test]
    fn lsp_block_included_when_present() {
        let stdout = Truncated { text: String::new(), truncated: false };
        let stderr = Truncated { text: String::new(), truncated: false };
        let artifacts = sample_artifacts();
        let lsp = LspRenderInfo {
            status: LspStatus::Diagnostics,
            reason: None,
            error_count: 2,
            diagnostics_files: vec!["src/lib.ts".to_string()],
        };
        let input = RenderInput {
            command: "tsc",
            shell_label: "bash",
            cwd: "/repo",
            stdout: &stdout,
            stderr: &stderr,
            artifacts: &artifacts,
            marker_lines: &[],
            lsp: Some(&lsp),
            duration_ms: 1,
            exit_code: 0,
            timed_out: false,
            aborted: false,
            lifecycle_event: LifecycleEvent::None,
        };
        let rendered = render(&input);
        assert!(rendered.contains("[lsp]"));
        assert!(rendered.contains("status: diagnostics"));
        assert!(rendered.contains("src/lib.ts"));
    }

    #[test]
    fn command_preview_is_truncated_past_limit() {
        let long_command = "x".repeat(1000);
        let preview = preview_command(&long_command);
        assert_eq!(preview.chars().count(), COMMAND_PREVIEW_LIMIT);
        assert!(preview.ends_with("..."));
    }
}
