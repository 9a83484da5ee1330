//! The run loop's shared data model: the structures every component reads
//! or produces, as opposed to the small enums in [`crate::types`].
//!
//! Ownership follows the run loop: C6 (the orchestrator) owns `LoopState`
//! and the `RunContext` chain exclusively; C1 (shell) produces `ToolResult`
//! values it never retains; C3 (planner) produces `PlanResult`; C4
//! (completion gates) owns `CompletionPlan`.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::types::{
    ChangeSource, GateSource, LifecycleEvent, LspStatus, ParseMode, PlanAction, ProgressSignal,
    RetryCategory, RunState,
};

/// A tool call as emitted by the planner: a name plus a freeform argument map.
///
/// Dynamic tool arguments are kept as a JSON map here; each tool crate is
/// responsible for validating its own shape and producing a `ValidationError`
/// (via [`crate::AppError::validation`]) on mismatch.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolCall {
    pub name: String,
    pub arguments: serde_json::Map<String, serde_json::Value>,
}

/// Outcome of executing a `ToolCall`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolResult {
    pub success: bool,
    pub output: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub artifacts: Option<ToolResultArtifacts>,
}

/// Everything observed about a shell command's execution: what changed,
/// where its output landed, and what guardrail-relevant signals it produced.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolResultArtifacts {
    pub changed_files: Vec<String>,
    pub changed_files_source: Vec<ChangeSource>,
    pub command_signature: String,
    pub duration_ms: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub exit_code: Option<i32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub signal: Option<i32>,
    pub lifecycle_event: LifecycleEvent,
    pub timed_out: bool,
    pub aborted: bool,
    pub stdout_path: String,
    pub stderr_path: String,
    pub combined_path: String,
    pub stdout_truncated: bool,
    pub stderr_truncated: bool,
    pub output_limit_chars: usize,
    pub progress_signal: ProgressSignal,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub lsp_status: Option<LspStatus>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub lsp_status_reason: Option<String>,
    #[serde(default)]
    pub lsp_error_count: u32,
    #[serde(default)]
    pub lsp_diagnostics_files: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub retry_category: Option<RetryCategory>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub retry_suppressed_reason: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub write_regression_detected: Option<bool>,
}

/// One entry of the append-only step history.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Step {
    pub step: u32,
    pub state: RunState,
    pub reasoning: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_call: Option<ToolCall>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_result: Option<ToolResult>,
}

/// Script-catalog entry: a tool-registered script, tracked for reuse across
/// steps (`ZACE_SCRIPT_REGISTER` / `ZACE_SCRIPT_USE` markers, §6).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScriptCatalogEntry {
    pub path: String,
    pub purpose: String,
    pub last_touched_step: u32,
    pub times_used: u32,
}

/// Immutable-by-replacement run context. Every mutation produces a new
/// value; callers replace their held reference rather than mutate in place.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunContext {
    pub task: String,
    pub max_steps: u32,
    pub current_step: u32,
    pub state: RunState,
    pub steps: Vec<Step>,
    pub script_catalog: HashMap<String, ScriptCatalogEntry>,
    pub file_summaries: HashMap<String, String>,
}

impl RunContext {
    /// Create the initial context for a new run: zero steps, `Planning` state.
    pub fn new(task: impl Into<String>, max_steps: u32) -> Self {
        Self {
            task: task.into(),
            max_steps,
            current_step: 0,
            state: RunState::Planning,
            steps: Vec::new(),
            script_catalog: HashMap::new(),
            file_summaries: HashMap::new(),
        }
    }

    /// Replace the run state, returning the updated context.
    pub fn transition(mut self, state: RunState) -> Self {
        self.state = state;
        self
    }

    /// Append a step. Enforces `step.step == steps.len() + 1` — append-only,
    /// contiguous, one-indexed.
    pub fn add_step(mut self, step: Step) -> Self {
        debug_assert_eq!(step.step as usize, self.steps.len() + 1);
        self.steps.push(step);
        self.current_step = self.steps.len() as u32;
        self
    }

    pub fn update_script_catalog(mut self, id: String, entry: ScriptCatalogEntry) -> Self {
        self.script_catalog.insert(id, entry);
        self
    }
}

/// One validation command that must succeed before a run can complete.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Gate {
    pub command: String,
    pub label: String,
}

/// The ordered, deduplicated set of gates that must pass to complete.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CompletionPlan {
    pub gates: Vec<Gate>,
    pub source: GateSource,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub raw_spec: Option<String>,
}

impl CompletionPlan {
    pub fn empty() -> Self {
        Self {
            gates: Vec::new(),
            source: GateSource::None,
            raw_spec: None,
        }
    }

    /// Merge `gates` into this plan, deduplicating by normalized command
    /// text and assigning stable labels to newly inserted gates.
    pub fn merge(&mut self, commands: impl IntoIterator<Item = String>, from: GateSource) {
        let normalize = |s: &str| s.trim().to_string();
        let existing: std::collections::HashSet<String> =
            self.gates.iter().map(|g| normalize(&g.command)).collect();
        let mut added = false;
        for (i, command) in commands.into_iter().enumerate() {
            let normalized = normalize(&command);
            if existing.contains(&normalized) {
                continue;
            }
            added = true;
            let label = format!("gate-{}", self.gates.len() + i + 1);
            self.gates.push(Gate {
                command: normalized,
                label,
            });
        }
        self.source = match (self.source, added) {
            (GateSource::None, _) => from,
            (prev, true) if prev != from => GateSource::Merged,
            (prev, _) => prev,
        };
    }
}

/// LSP bootstrap state machine context (§4.2).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LspBootstrapContext {
    pub state: crate::types::LspBootstrapState,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_failure_reason: Option<String>,
    pub pending_changed_files: std::collections::BTreeSet<String>,
    pub provision_attempts: u32,
    /// Bounded ring of the 5 most recently attempted provisioning commands.
    pub attempted_commands: Vec<String>,
}

impl Default for LspBootstrapContext {
    fn default() -> Self {
        Self {
            state: crate::types::LspBootstrapState::Idle,
            last_failure_reason: None,
            pending_changed_files: std::collections::BTreeSet::new(),
            provision_attempts: 0,
            attempted_commands: Vec::new(),
        }
    }
}

impl LspBootstrapContext {
    pub const ATTEMPTED_COMMANDS_CAPACITY: usize = 5;

    pub fn record_attempted_command(&mut self, command: String) {
        self.attempted_commands.push(command);
        if self.attempted_commands.len() > Self::ATTEMPTED_COMMANDS_CAPACITY {
            self.attempted_commands.remove(0);
        }
    }
}

/// Resolution of a command-approval request (§4.5).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ApprovalDecision {
    Allow {
        scope: crate::types::ApprovalScope,
        required_approval: bool,
    },
    Deny {
        scope: crate::types::ApprovalScope,
        message: String,
    },
    RequestUser {
        command_signature: String,
        reason: String,
        message: String,
    },
}

/// Token-usage telemetry optionally attached to a `PlanResult`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Usage {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub input_tokens: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output_tokens: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub total_tokens: Option<u64>,
}

/// The planner's decision for a step, after parsing and recovery (§4.3).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlanResult {
    pub action: PlanAction,
    pub reasoning: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_message: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_call: Option<ToolCall>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub completion_gate_commands: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub completion_gates_declared_none: Option<bool>,
    pub parse_mode: ParseMode,
    /// Whether the provider actually honored the schema transport, as
    /// opposed to the value having been recovered via prompt-mode parsing.
    pub transport_structured: bool,
    pub parse_attempts: u32,
    pub raw_invalid_count: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub invalid_output_artifact_path: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub usage: Option<Usage>,
}

impl PlanResult {
    /// A `continue` action without a `toolCall` violates the planner
    /// schema's constraint (§4.3): "`action=continue` requires `toolCall`".
    pub fn is_schema_valid(&self) -> bool {
        !(self.action == PlanAction::Continue && self.tool_call.is_none())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn run_context_append_only_and_contiguous() {
        let ctx = RunContext::new("do the thing", 10);
        assert_eq!(ctx.current_step, 0);
        let ctx = ctx.add_step(Step {
            step: 1,
            state: RunState::Executing,
            reasoning: "first".into(),
            tool_call: None,
            tool_result: None,
        });
        assert_eq!(ctx.current_step, 1);
        assert_eq!(ctx.steps.len(), 1);
    }

    #[test]
    fn completion_plan_merge_dedupes_by_normalized_command() {
        let mut plan = CompletionPlan::empty();
        plan.merge(vec!["bun test".to_string()], GateSource::Planner);
        plan.merge(vec!["  bun test  ".to_string()], GateSource::AutoDiscovered);
        assert_eq!(plan.gates.len(), 1);
        assert_eq!(plan.source, GateSource::Planner);

        plan.merge(vec!["bun lint".to_string()], GateSource::AutoDiscovered);
        assert_eq!(plan.gates.len(), 2);
        assert_eq!(plan.source, GateSource::Merged);
    }

    #[test]
    fn plan_result_schema_validity() {
        let mut result = PlanResult {
            action: PlanAction::Continue,
            reasoning: "r".into(),
            user_message: None,
            tool_call: None,
            completion_gate_commands: None,
            completion_gates_declared_none: None,
            parse_mode: ParseMode::SchemaTransport,
            transport_structured: true,
            parse_attempts: 1,
            raw_invalid_count: 0,
            invalid_output_artifact_path: None,
            usage: None,
        };
        assert!(!result.is_schema_valid());
        result.tool_call = Some(ToolCall {
            name: "execute_command".into(),
            arguments: serde_json::Map::new(),
        });
        assert!(result.is_schema_valid());
    }

    #[test]
    fn lsp_bootstrap_attempted_commands_ring_is_bounded() {
        let mut ctx = LspBootstrapContext::default();
        for i in 0..8 {
            ctx.record_attempted_command(format!("cmd-{i}"));
        }
        assert_eq!(ctx.attempted_commands.len(), 5);
        assert_eq!(ctx.attempted_commands.first().unwrap(), "cmd-3");
    }
}
