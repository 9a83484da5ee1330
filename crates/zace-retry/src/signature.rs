//! Stable signatures for loop detection and approval caching (§4.10).
//!
//! Uses `zace_core::signature`'s canonical-JSON encoder so hashing never
//! depends on key insertion order or language-specific stringification
//! (§9 "Stable hashing").

use regex::Regex;
use serde_json::{Map, Value};
use std::sync::OnceLock;

use zace_core::model::ToolCall;
use zace_core::signature::stable_hash_of;

fn uuid_pattern() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(
            "[0-9a-fA-F]{8}-[0-9a-fA-F]{4}-[0-9a-fA-F]{4}-[0-9a-fA-F]{4}-[0-9a-fA-F]{12}",
        )
        .expect("static regex compiles")
    })
}

fn stdout_artifact_line_pattern() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?m)^stdout:.*$").expect("static regex compiles"))
}

fn whitespace_pattern() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\s+").expect("static regex compiles"))
}

/// `buildToolCallSignature(name, args, {workingDirectory?})` (§4.10):
/// stable-JSON(args) keyed by tool name. For `execute_command`, `command`
/// is trimmed and `cwd` resolved against `working_directory` before
/// hashing, so semantically identical calls collide regardless of
/// incidental whitespace or relative-vs-absolute cwd spelling.
pub fn build_tool_call_signature(tool_call: &ToolCall, working_directory: Option<&str>) -> String {
    let mut normalized = tool_call.arguments.clone();
    if tool_call.name == "execute_command" {
        normalize_execute_command_args(&mut normalized, working_directory);
    }
    stable_hash_of(&tool_call.name, &Value::Object(normalized))
}

fn normalize_execute_command_args(args: &mut Map<String, Value>, working_directory: Option<&str>) {
    if let Some(Value::String(command)) = args.get("command") {
        let trimmed = command.trim().to_string();
        args.insert("command".to_string(), Value::String(trimmed));
    }
    let cwd = match args.get("cwd").and_then(Value::as_str) {
        Some(cwd) => resolve_cwd(cwd, working_directory),
        None => working_directory.map(str::to_string),
    };
    if let Some(cwd) = cwd {
        args.insert("cwd".to_string(), Value::String(cwd));
    }
}

fn resolve_cwd(cwd: &str, working_directory: Option<&str>) -> Option<String> {
    let path = std::path::Path::new(cwd);
    if path.is_absolute() {
        return Some(path.to_string_lossy().into_owned());
    }
    match working_directory {
        Some(base) => Some(std::path::Path::new(base).join(path).to_string_lossy().into_owned()),
        None => Some(cwd.to_string()),
    }
}

/// Input to [`build_tool_loop_signature`].
pub struct ToolLoopInput<'a> {
    pub tool_name: &'a str,
    pub arguments: &'a Map<String, Value>,
    pub output: &'a str,
    pub success: bool,
}

const OUTPUT_TRUNCATE_CHARS: usize = 400;

/// `buildToolLoopSignature` (§4.10): like the tool-call signature, but also
/// folds in `success` and a normalized `output` — per-run identifiers
/// (UUIDs, `stdout:` artifact path lines) are stripped and whitespace
/// collapsed before truncating to 400 chars, so two attempts that differ
/// only by a fresh UUID or artifact path still collide.
pub fn build_tool_loop_signature(input: &ToolLoopInput) -> String {
    let normalized_output = normalize_output(input.output);
    let payload = serde_json::json!({
        "toolName": input.tool_name,
        "arguments": input.arguments,
        "output": normalized_output,
        "success": input.success,
    });
    stable_hash_of("tool-loop", &payload)
}

fn normalize_output(output: &str) -> String {
    let no_uuids = uuid_pattern().replace_all(output, "<uuid>");
    let no_artifact_lines = stdout_artifact_line_pattern().replace_all(&no_uuids, "stdout:<path>");
    let collapsed = whitespace_pattern().replace_all(&no_artifact_lines, " ");
    collapsed.trim().chars().take(OUTPUT_TRUNCATE_CHARS).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tool_call(command: &str, cwd: Option<&str>) -> ToolCall {
        let mut args = Map::new();
        args.insert("command".to_string(), Value::String(command.to_string()));
        if let Some(cwd) = cwd {
            args.insert("cwd".to_string(), Value::String(cwd.to_string()));
        }
        ToolCall {
            name: "execute_command".to_string(),
            arguments: args,
        }
    }

    #[test]
    fn whitespace_only_difference_in_command_collides() {
        let a = tool_call("  ls -la  ", None);
        let b = tool_call("ls -la", None);
        assert_eq!(
            build_tool_call_signature(&a, Some("/repo")),
            build_tool_call_signature(&b, Some("/repo"))
        );
    }

    #[test]
    fn relative_cwd_resolves_against_working_directory() {
        let a = tool_call("ls", Some("sub"));
        let b = tool_call("ls", Some("/repo/sub"));
        assert_eq!(
            build_tool_call_signature(&a, Some("/repo")),
            build_tool_call_signature(&b, Some("/repo"))
        );
    }

    #[test]
    fn different_commands_never_collide() {
        let a = tool_call("ls", None);
        let b = tool_call("rm -rf x", None);
        assert_ne!(
            build_tool_call_signature(&a, None),
            build_tool_call_signature(&b, None)
        );
    }

    #[test]
    fn tool_loop_signature_collapses_uuids_and_artifact_lines() {
        let args = Map::new();
        let a = ToolLoopInput {
            tool_name: "execute_command",
            arguments: &args,
            output: "stdout:/tmp/run-11111111-1111-1111-1111-111111111111/out.txt\nok",
            success: true,
        };
        let b = ToolLoopInput {
            tool_name: "execute_command",
            arguments: &args,
            output: "stdout:/tmp/run-22222222-2222-2222-2222-222222222222/out.txt\nok",
            success: true,
        };
        assert_eq!(build_tool_loop_signature(&a), build_tool_loop_signature(&b));
    }

    #[test]
    fn tool_loop_signature_differs_on_success() {
        let args = Map::new();
        let a = ToolLoopInput {
            tool_name: "execute_command",
            arguments: &args,
            output: "ok",
            success: true,
        };
        let b = ToolLoopInput {
            tool_name: "execute_command",
            arguments: &args,
            output: "ok",
            success: false,
        };
        assert_ne!(build_tool_loop_signature(&a), build_tool_loop_signature(&b));
    }
}
