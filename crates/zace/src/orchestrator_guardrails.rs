//! Run-loop stability guardrails (§4.6, §4.10): doom-loop detection with its
//! read-only inspection-loop exception, post-execution repetition, and
//! read-only stagnation after a write. Each guard is a pure function over
//! the orchestrator's [`LoopState`] plus whatever the caller already has in
//! hand — none of them own state beyond what `orchestrator.rs` threads in.

use std::collections::VecDeque;
use std::sync::OnceLock;

use regex::Regex;

use zace_core::model::{RunContext, ToolCall, ToolResult};
use zace_core::types::RunState;
use zace_config::RuntimeConfig;

use crate::orchestrator::LoopState;

/// Commands that only ever read state: used both for the doom-loop's
/// inspection-loop exception and the post-write read-only-stagnation guard.
const READONLY_VERBS: &[&str] = &[
    "ls", "cat", "grep", "rg", "find", "head", "tail", "wc", "pwd", "stat",
    "git status", "git diff", "git log", "git show", "git branch", "file",
    "tree", "which", "type", "echo",
];

/// Program names recognized as validation commands (§4.6 step 8's
/// `lastSuccessfulValidationStep` bookkeeping).
const VALIDATOR_PREFIXES: &[&str] = &[
    "cargo test", "cargo check", "cargo clippy", "cargo build",
    "npm test", "npm run test", "npm run lint", "npm run build",
    "yarn test", "yarn lint", "pnpm test", "pnpm lint",
    "bun test", "bun run test", "pytest", "python -m pytest",
    "go test", "go build", "go vet", "make test", "just test",
    "eslint", "tsc", "vitest", "jest", "ruff", "mypy",
];

fn first_token(command: &str) -> &str {
    command.trim().split_whitespace().next().unwrap_or("")
}

fn starts_with_any(command: &str, candidates: &[&str]) -> bool {
    let trimmed = command.trim();
    candidates.iter().any(|c| trimmed == *c || trimmed.starts_with(&format!("{c} ")))
}

pub fn is_readonly_inspection(command: &str) -> bool {
    let trimmed = command.trim();
    if trimmed.contains('>') || trimmed.contains(">>") {
        return false;
    }
    starts_with_any(trimmed, READONLY_VERBS)
}

pub fn is_validator_command(command: &str) -> bool {
    starts_with_any(command, VALIDATOR_PREFIXES)
}

fn mutating_pattern() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"(?i)\b(rm|mv|cp|mkdir|rmdir|touch|chmod|chown|sed\s+-i|git\s+(commit|push|reset|checkout)|npm\s+install|yarn\s+add|pip\s+install)\b")
            .expect("static pattern compiles")
    })
}

fn multi_statement(command: &str) -> bool {
    command.contains("&&") || command.contains("||") || command.contains('\n') || command.contains(';') || command.contains('|')
}

fn targets_runtime_scripts(command: &str) -> bool {
    command.contains(".zace/runtime/scripts")
}

/// §4.6 step 5's "runtime-script protocol" block: when enforced, a mutating
/// or multi-statement command that doesn't run through
/// `.zace/runtime/scripts` is rejected outright rather than executed.
pub fn check_runtime_script_protocol(config: &RuntimeConfig, tool_call: &ToolCall) -> Option<String> {
    if !config.runtime_script_enforced {
        return None;
    }
    let command = tool_call
        .arguments
        .get("command")
        .and_then(serde_json::Value::as_str)
        .unwrap_or_default();
    if targets_runtime_scripts(command) {
        return None;
    }
    let is_mutating = mutating_pattern().is_match(command) || command.contains('>');
    if is_mutating || multi_statement(command) {
        Some(format!(
            "runtime-script protocol: mutating or multi-statement commands must run from .zace/runtime/scripts (`{}`)",
            first_token(command)
        ))
    } else {
        None
    }
}

/// §4.10: `threshold` or more occurrences of the same tool-call signature in
/// the run's history is a doom loop.
pub fn is_doom_loop(history: &VecDeque<String>, signature: &str, threshold: u32) -> bool {
    let count = history.iter().filter(|s| s.as_str() == signature).count() as u32;
    count + 1 >= threshold
}

/// §4.6 step 7: three (by default) consecutive identical
/// `buildToolLoopSignature` results (same call, same output, same success)
/// in a row is a stall worth surfacing to the user.
pub fn post_execution_repetition(
    state: &mut LoopState,
    tool_call: &ToolCall,
    tool_result: &ToolResult,
    limit: u32,
) -> Option<String> {
    let input = zace_retry::ToolLoopInput {
        tool_name: &tool_call.name,
        arguments: &tool_call.arguments,
        output: &tool_result.output,
        success: tool_result.success,
    };
    let signature = zace_retry::build_tool_loop_signature(&input);

    if state.last_tool_loop_signature.as_deref() == Some(signature.as_str()) {
        state.last_tool_loop_signature_count += 1;
    } else {
        state.last_tool_loop_signature = Some(signature);
        state.last_tool_loop_signature_count = 1;
    }

    if state.last_tool_loop_signature_count >= limit {
        Some("post_execution_repetition".to_string())
    } else {
        None
    }
}

/// §4.6 step 9 guard: `window` or more steps of read-only inspection since
/// the last write, with no intervening validation, stalls progress toward
/// completion just as surely as a literal loop.
pub fn readonly_stagnation(ctx: &RunContext, state: &LoopState, window: u32) -> bool {
    if state.last_write_step == 0 {
        return false;
    }
    if state.last_successful_validation_step > state.last_write_step {
        return false;
    }
    let steps_since_write = ctx
        .steps
        .iter()
        .filter(|s| s.step > state.last_write_step);
    let mut inspected = 0u32;
    for step in steps_since_write {
        if step.state != RunState::Executing {
            continue;
        }
        let Some(tool_call) = &step.tool_call else { continue };
        let command = tool_call
            .arguments
            .get("command")
            .and_then(serde_json::Value::as_str)
            .unwrap_or_default();
        if is_readonly_inspection(command) {
            inspected += 1;
        } else {
            return false;
        }
    }
    inspected >= window
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn readonly_inspection_recognizes_common_verbs() {
        assert!(is_readonly_inspection("git status"));
        assert!(is_readonly_inspection("cat src/lib.rs"));
        assert!(!is_readonly_inspection("echo hi > out.txt"));
        assert!(!is_readonly_inspection("rm -rf target"));
    }

    #[test]
    fn validator_command_recognizes_known_runners() {
        assert!(is_validator_command("cargo test --workspace"));
        assert!(is_validator_command("npm run lint"));
        assert!(!is_validator_command("cat foo"));
    }

    #[test]
    fn runtime_script_protocol_blocks_raw_mutation_when_enforced() {
        let mut config = RuntimeConfig::default();
        config.runtime_script_enforced = true;
        let tool_call = ToolCall {
            name: "execute_command".to_string(),
            arguments: {
                let mut m = serde_json::Map::new();
                m.insert("command".to_string(), serde_json::Value::String("rm -rf build".to_string()));
                m
            },
        };
        assert!(check_runtime_script_protocol(&config, &tool_call).is_some());
    }

    #[test]
    fn runtime_script_protocol_allows_scripts_directory() {
        let mut config = RuntimeConfig::default();
        config.runtime_script_enforced = true;
        let tool_call = ToolCall {
            name: "execute_command".to_string(),
            arguments: {
                let mut m = serde_json::Map::new();
                m.insert(
                    "command".to_string(),
                    serde_json::Value::String("bash .zace/runtime/scripts/build.sh".to_string()),
                );
                m
            },
        };
        assert!(check_runtime_script_protocol(&config, &tool_call).is_none());
    }

    #[test]
    fn doom_loop_triggers_at_threshold() {
        let mut history = VecDeque::new();
        history.push_back("sig-a".to_string());
        history.push_back("sig-a".to_string());
        assert!(is_doom_loop(&history, "sig-a", 3));
        assert!(!is_doom_loop(&history, "sig-b", 3));
    }
}
