//! Transient-vs-not failure classification (§4.6 step 8, §4.10).

use zace_core::model::{ToolCall, ToolResult};
use zace_core::types::{LifecycleEvent, RetryCategory};

/// Substrings that mark a failure as retry-worthy: connection resets,
/// resolver hiccups, and handshake timeouts — the kind of thing that
/// succeeds on a second attempt without any change to the command itself.
const TRANSIENT_MARKERS: &[&str] = &[
    "econnreset",
    "epipe",
    "etimedout",
    "eai_again",
    "enetunreach",
    "ehostunreach",
    "tls handshake timeout",
    "handshake timeout",
    "temporarily failed",
    "temporary failure",
    "connection reset",
    "connection timed out",
];

/// Substrings that mark a failure as a property of the command itself —
/// retrying verbatim will fail again the same way.
const NON_TRANSIENT_MARKERS: &[&str] = &[
    "bad usage",
    "invalid option",
    "usage:",
    "syntax error",
    "command not found",
    "permission denied",
    "no such file or directory",
    "unknown option",
];

/// Classify a tool call's failure. Returns `(category, reason)`; `reason`
/// is attached to `retrySuppressedReason` / telemetry when the classifier
/// disagrees with an executor-analysis suggestion to retry.
pub fn classify_retry(tool_call: &ToolCall, tool_result: &ToolResult) -> (RetryCategory, String) {
    if tool_result.success {
        return (
            RetryCategory::Unknown,
            format!("'{}' succeeded; no retry needed", tool_call.name),
        );
    }

    if let Some(artifacts) = &tool_result.artifacts {
        if artifacts.lifecycle_event == LifecycleEvent::Timeout || artifacts.timed_out {
            return (RetryCategory::Transient, "command timed out".to_string());
        }
    }

    let haystack = format!(
        "{} {}",
        tool_result.output,
        tool_result.error.as_deref().unwrap_or_default()
    );
    classify_retry_text(&haystack)
}

/// The text-pattern half of [`classify_retry`], exposed separately so
/// callers with only a combined output/error string (e.g. replaying a
/// persisted artifact) don't need to reconstruct a `ToolResult`.
pub fn classify_retry_text(haystack: &str) -> (RetryCategory, String) {
    let lower = haystack.to_ascii_lowercase();

    if let Some(marker) = TRANSIENT_MARKERS.iter().find(|m| lower.contains(*m)) {
        return (
            RetryCategory::Transient,
            format!("matched transient marker '{marker}'"),
        );
    }
    if let Some(marker) = NON_TRANSIENT_MARKERS.iter().find(|m| lower.contains(*m)) {
        return (
            RetryCategory::NonTransient,
            format!("matched non-transient marker '{marker}'"),
        );
    }
    (
        RetryCategory::Unknown,
        "no known transient or non-transient marker matched".to_string(),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::Map;
    use zace_core::model::ToolResultArtifacts;
    use zace_core::types::ProgressSignal;

    fn tool_call() -> ToolCall {
        ToolCall {
            name: "execute_command".to_string(),
            arguments: Map::new(),
        }
    }

    fn artifacts_with(lifecycle: LifecycleEvent, timed_out: bool) -> ToolResultArtifacts {
        ToolResultArtifacts {
            changed_files: vec![],
            changed_files_source: vec![],
            command_signature: "sig".into(),
            duration_ms: 1,
            exit_code: Some(1),
            signal: None,
            lifecycle_event: lifecycle,
            timed_out,
            aborted: false,
            stdout_path: "out".into(),
            stderr_path: "err".into(),
            combined_path: "combined".into(),
            stdout_truncated: false,
            stderr_truncated: false,
            output_limit_chars: 1000,
            progress_signal: ProgressSignal::None,
            lsp_status: None,
            lsp_status_reason: None,
            lsp_error_count: 0,
            lsp_diagnostics_files: vec![],
            retry_category: None,
            retry_suppressed_reason: None,
            write_regression_detected: None,
        }
    }

    #[test]
    fn success_is_unknown_no_retry() {
        let result = ToolResult {
            success: true,
            output: "ok".into(),
            error: None,
            artifacts: None,
        };
        let (category, _) = classify_retry(&tool_call(), &result);
        assert_eq!(category, RetryCategory::Unknown);
    }

    #[test]
    fn timeout_lifecycle_is_transient() {
        let result = ToolResult {
            success: false,
            output: String::new(),
            error: Some("Command timed out after 1000ms".into()),
            artifacts: Some(artifacts_with(LifecycleEvent::Timeout, true)),
        };
        let (category, _) = classify_retry(&tool_call(), &result);
        assert_eq!(category, RetryCategory::Transient);
    }

    #[test]
    fn econnreset_in_output_is_transient() {
        let result = ToolResult {
            success: false,
            output: "fetch failed: ECONNRESET".into(),
            error: None,
            artifacts: None,
        };
        let (category, _) = classify_retry(&tool_call(), &result);
        assert_eq!(category, RetryCategory::Transient);
    }

    #[test]
    fn bad_usage_is_non_transient() {
        let result = ToolResult {
            success: false,
            output: "sed: bad usage".into(),
            error: None,
            artifacts: None,
        };
        let (category, reason) = classify_retry(&tool_call(), &result);
        assert_eq!(category, RetryCategory::NonTransient);
        assert!(reason.contains("bad usage"));
    }

    #[test]
    fn unrecognized_failure_is_unknown() {
        let result = ToolResult {
            success: false,
            output: "something went wrong".into(),
            error: None,
            artifacts: None,
        };
        let (category, _) = classify_retry(&tool_call(), &result);
        assert_eq!(category, RetryCategory::Unknown);
    }
}
