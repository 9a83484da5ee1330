//! The run loop orchestrator (C6, §4.6): the single scheduler that drives
//! plan → approve → execute → observe → gate for one run, start to finish.
//!
//! Grounded in the teacher's `pipeline.rs`/`run_cmd.rs` split: a thin
//! `run()` driver here delegates the execution phase to
//! `orchestrator_execute` and the stability checks to
//! `orchestrator_guardrails`, the same way the teacher splits `pipeline.rs`
//! into `pipeline_execute.rs`/`pipeline_sandbox.rs` siblings rather than one
//! large file.

use std::collections::{HashSet, VecDeque};
use std::path::{Path, PathBuf};

use serde_json::{Map, Value};
use tracing::{info, warn};

use zace_approval::{ApprovalStore, SafetyClassifier};
use zace_core::model::{CompletionPlan, PlanResult, RunContext, Step, ToolCall};
use zace_core::types::{PlanAction, RunState};
use zace_gate::{self, CompletionContext, GateOutcome, RepeatedBlockTracker};
use zace_lsp::LspRegistry;
use zace_memory::{CompactionOptions, Message, MessageLog, Summarizer};
use zace_planner::llm::PlannerLlmClient;
use zace_planner::PlannerOptions;
use zace_process::AbortSignal;
use zace_retry::ExecutorAnalysisClient;
use zace_session::{EventWriter, Phase, SessionEntry};
use zace_shell::ShellExecutor;

use zace_config::RuntimeConfig;

use crate::orchestrator_execute::execute_tool_call;
use crate::orchestrator_guardrails as guard;

/// The mutable aggregates C6 exclusively owns across a run (§3 "Mutable
/// loop state"). `RunContext` carries the append-only step history
/// separately (§3's ownership note: C6 owns both, but `RunContext` is
/// replaced wholesale on each step while `LoopState` is mutated in place).
pub struct LoopState {
    pub completion_plan: CompletionPlan,
    pub consecutive_no_tool_continues: u32,
    pub tool_call_signature_history: VecDeque<String>,
    pub last_tool_loop_signature: Option<String>,
    pub last_tool_loop_signature_count: u32,
    pub repeated_block_tracker: RepeatedBlockTracker,
    pub last_write_step: u32,
    pub last_write_working_directory: Option<PathBuf>,
    pub last_write_lsp_error_count: u32,
    pub last_successful_validation_step: u32,
    pub last_completion_gate_failure: Option<String>,
    pub lsp_bootstrap: zace_core::model::LspBootstrapContext,
    /// Signatures that have already been granted one inspection-loop
    /// recovery pass this run (§4.6 step 6 exception) — never granted twice.
    pub inspection_loop_recovery_granted: HashSet<String>,
}

impl LoopState {
    pub fn new() -> Self {
        Self {
            completion_plan: CompletionPlan::empty(),
            consecutive_no_tool_continues: 0,
            tool_call_signature_history: VecDeque::new(),
            last_tool_loop_signature: None,
            last_tool_loop_signature_count: 0,
            repeated_block_tracker: RepeatedBlockTracker::default(),
            last_write_step: 0,
            last_write_working_directory: None,
            last_write_lsp_error_count: 0,
            last_successful_validation_step: 0,
            last_completion_gate_failure: None,
            lsp_bootstrap: zace_core::model::LspBootstrapContext::default(),
            inspection_loop_recovery_granted: HashSet::new(),
        }
    }
}

impl Default for LoopState {
    fn default() -> Self {
        Self::new()
    }
}

const MAX_CONSECUTIVE_NO_TOOL_CONTINUES: u32 = 2;
const POST_EXEC_REPETITION_LIMIT: u32 = 3;

/// Everything the orchestrator needs to drive one run, borrowed for the
/// run's lifetime. Not `Clone` — ownership of the live collaborators
/// (LSP registry, session sink, message log) stays with the caller
/// (`run_cmd`), which constructs this once per run.
pub struct RunCollaborators<'a> {
    pub planner_client: &'a dyn PlannerLlmClient,
    pub summarizer: &'a dyn Summarizer,
    pub safety_classifier: &'a dyn SafetyClassifier,
    pub executor_analysis: &'a dyn ExecutorAnalysisClient,
    pub executor: &'a ShellExecutor,
    pub lsp: &'a mut LspRegistry,
    pub approval_store: &'a ApprovalStore,
    pub one_shot_allowlist: &'a mut HashSet<String>,
    pub session: &'a mut EventWriter,
    pub memory: &'a mut MessageLog,
    pub config: &'a RuntimeConfig,
    pub project_root: &'a Path,
    pub artifacts_dir: PathBuf,
    pub abort: AbortSignal,
    pub run_id: String,
    pub session_id: String,
}

/// Final result of driving a run to a terminal state.
pub struct RunOutcome {
    pub context: RunContext,
    pub final_state: RunState,
    pub message: Option<String>,
}

pub(crate) fn payload(pairs: impl IntoIterator<Item = (&'static str, Value)>) -> Map<String, Value> {
    pairs.into_iter().map(|(k, v)| (k.to_string(), v)).collect()
}

pub(crate) fn emit(collab: &mut RunCollaborators<'_>, step: u32, phase: Phase, event: &str, payload: Map<String, Value>) {
    let entry = SessionEntry::RunEvent {
        run_id: collab.run_id.clone(),
        step,
        phase,
        event: event.to_string(),
        payload,
    };
    if let Err(e) = collab.session.append(&entry) {
        warn!(error = %e, event, "failed to append session event");
    }
}

/// Drive `ctx` to a terminal `RunState`, scheduling steps up to
/// `ctx.max_steps` (§4.6).
pub async fn run(mut ctx: RunContext, collab: &mut RunCollaborators<'_>, state: &mut LoopState) -> RunOutcome {
    if let Err(e) = collab.session.append(&SessionEntry::Run {
        run_id: collab.run_id.clone(),
        task: ctx.task.clone(),
        max_steps: ctx.max_steps,
    }) {
        warn!(error = %e, "failed to append run-start session entry");
    }
    emit(collab, 0, Phase::Planning, "run_started", Map::new());

    state.completion_plan.merge(zace_gate::parse_task_gates(&ctx.task), zace_core::types::GateSource::TaskExplicit);

    loop {
        if collab.abort.is_fired() {
            return finalize(ctx, collab, RunState::Interrupted, None).await;
        }
        if ctx.current_step >= ctx.max_steps {
            let message = state
                .last_completion_gate_failure
                .clone()
                .map(|f| format!("maximum steps reached; last completion-gate failure: {f}"))
                .unwrap_or_else(|| "maximum steps reached".to_string());
            return finalize(ctx, collab, RunState::Blocked, Some(message)).await;
        }

        let step_num = ctx.current_step + 1;
        ctx = ctx.transition(RunState::Planning);
        emit(collab, step_num, Phase::Planning, "plan_started", Map::new());
        emit(
            collab,
            step_num,
            Phase::Planning,
            "planner_schema_mode_selected",
            payload([("mode", Value::String(format!("{:?}", collab.config.planner_output_mode)))]),
        );

        let prompt = build_planner_prompt(&ctx, collab.memory);
        let options = PlannerOptions {
            mode: collab.config.planner_output_mode,
            max_repairs: collab.config.planner_parse_max_repairs,
            retry_on_failure: collab.config.planner_parse_retry_on_failure,
            artifacts_dir: collab.artifacts_dir.clone(),
        };
        let plan_result: PlanResult = zace_planner::plan(collab.planner_client, &prompt, &options).await;

        emit(
            collab,
            step_num,
            Phase::Planning,
            "plan_parsed",
            payload([
                ("parseMode", Value::String(format!("{:?}", plan_result.parse_mode))),
                ("parseAttempts", Value::from(plan_result.parse_attempts)),
                ("rawInvalidCount", Value::from(plan_result.raw_invalid_count)),
                ("transportStructured", Value::from(plan_result.transport_structured)),
                (
                    "invalidOutputArtifactPath",
                    plan_result
                        .invalid_output_artifact_path
                        .clone()
                        .map(Value::String)
                        .unwrap_or(Value::Null),
                ),
            ]),
        );
        collab.memory.add_message(Message::assistant(plan_result.reasoning.clone()));

        maybe_compact(collab, step_num).await;

        if !plan_result.is_schema_valid() {
            let step = Step {
                step: step_num,
                state: RunState::Error,
                reasoning: "planner returned continue without a toolCall".to_string(),
                tool_call: None,
                tool_result: None,
            };
            emit(collab, step_num, Phase::Planning, "tool_call_validation_failed", Map::new());
            ctx = ctx.add_step(step);

            state.consecutive_no_tool_continues += 1;
            if state.consecutive_no_tool_continues >= MAX_CONSECUTIVE_NO_TOOL_CONTINUES {
                emit(collab, step_num, Phase::Planning, "loop_guard_triggered", payload([("kind", Value::String("no_tool_progress".into()))]));
                return finalize(ctx, collab, RunState::WaitingForUser, Some("The planner keeps responding without a tool call.".to_string())).await;
            }
            continue;
        }

        match plan_result.action {
            PlanAction::AskUser => {
                ctx = ctx.add_step(Step {
                    step: step_num,
                    state: RunState::WaitingForUser,
                    reasoning: plan_result.reasoning.clone(),
                    tool_call: None,
                    tool_result: None,
                });
                return finalize(ctx, collab, RunState::WaitingForUser, plan_result.user_message).await;
            }
            PlanAction::Blocked => {
                ctx = ctx.add_step(Step {
                    step: step_num,
                    state: RunState::Blocked,
                    reasoning: plan_result.reasoning.clone(),
                    tool_call: None,
                    tool_result: None,
                });
                return finalize(ctx, collab, RunState::Blocked, Some(plan_result.reasoning)).await;
            }
            PlanAction::Complete => {
                ctx = ctx.add_step(Step {
                    step: step_num,
                    state: RunState::Executing,
                    reasoning: plan_result.reasoning.clone(),
                    tool_call: None,
                    tool_result: None,
                });
                match run_completion(step_num, &ctx, &plan_result, collab, state).await {
                    CompletionStepOutcome::Completed => {
                        return finalize(ctx, collab, RunState::Completed, plan_result.user_message).await;
                    }
                    CompletionStepOutcome::WaitingForUser(message) => {
                        return finalize(ctx, collab, RunState::WaitingForUser, Some(message)).await;
                    }
                    CompletionStepOutcome::Blocked { terminal: true, message } => {
                        return finalize(ctx, collab, RunState::WaitingForUser, Some(message)).await;
                    }
                    CompletionStepOutcome::Blocked { terminal: false, .. } => {
                        // Recorded; loop continues so the planner can remediate.
                    }
                }
            }
            PlanAction::Continue => {
                let Some(tool_call) = plan_result.tool_call.clone() else {
                    unreachable!("is_schema_valid guarantees a toolCall for Continue");
                };

                state.consecutive_no_tool_continues = 0;

                let cwd_hint = tool_call
                    .arguments
                    .get("cwd")
                    .and_then(Value::as_str)
                    .map(str::to_string);
                let signature = zace_retry::build_tool_call_signature(&tool_call, cwd_hint.as_deref());

                if let Some(reason) = guard::check_runtime_script_protocol(collab.config, &tool_call) {
                    let step = failed_step(step_num, &plan_result.reasoning, tool_call.clone(), &reason);
                    emit(collab, step_num, Phase::Executing, "protocol_block", Map::new());
                    ctx = ctx.add_step(step);
                    push_signature_history(state, signature);
                    continue;
                }

                if guard::is_doom_loop(&state.tool_call_signature_history, &signature, collab.config.doom_loop_threshold) {
                    let command = tool_call.arguments.get("command").and_then(Value::as_str).unwrap_or_default();
                    let had_success = ctx.steps.iter().any(|s| {
                        s.tool_call.as_ref().map(|tc| zace_retry::build_tool_call_signature(tc, cwd_hint.as_deref())) == Some(signature.clone())
                            && s.tool_result.as_ref().map(|r| r.success && r.artifacts.as_ref().map(|a| a.changed_files.is_empty()).unwrap_or(true)).unwrap_or(false)
                    });
                    if guard::is_readonly_inspection(command) && had_success && !state.inspection_loop_recovery_granted.contains(&signature) {
                        state.inspection_loop_recovery_granted.insert(signature.clone());
                        emit(collab, step_num, Phase::Executing, "inspection_loop_recovery_triggered", Map::new());
                    } else {
                        emit(collab, step_num, Phase::Executing, "loop_guard_triggered", payload([("kind", Value::String("doom_loop".into()))]));
                        ctx = ctx.add_step(Step {
                            step: step_num,
                            state: RunState::WaitingForUser,
                            reasoning: plan_result.reasoning.clone(),
                            tool_call: Some(tool_call),
                            tool_result: None,
                        });
                        return finalize(ctx, collab, RunState::WaitingForUser, Some("I keep proposing the same command without progress.".to_string())).await;
                    }
                }

                push_signature_history(state, signature.clone());

                emit(collab, step_num, Phase::Approval, "approval_check_started", Map::new());
                let mut approval_ctx = zace_approval::ApprovalContext {
                    classifier: collab.safety_classifier,
                    store: collab.approval_store,
                    one_shot_allowlist: collab.one_shot_allowlist,
                    session_id: &collab.session_id,
                };
                let command = tool_call.arguments.get("command").and_then(Value::as_str).unwrap_or_default();
                let cwd_for_approval = tool_call.arguments.get("cwd").and_then(Value::as_str);
                let decision = match zace_approval::resolve_command_approval(&mut approval_ctx, command, cwd_for_approval).await {
                    Ok(d) => d,
                    Err(e) => {
                        ctx = ctx.add_step(failed_step(step_num, &plan_result.reasoning, tool_call.clone(), &e.to_string()));
                        continue;
                    }
                };
                match decision {
                    zace_core::model::ApprovalDecision::Deny { message, .. } => {
                        ctx = ctx.add_step(failed_step(step_num, &plan_result.reasoning, tool_call.clone(), &message));
                        continue;
                    }
                    zace_core::model::ApprovalDecision::RequestUser { message, .. } => {
                        ctx = ctx.add_step(Step {
                            step: step_num,
                            state: RunState::WaitingForUser,
                            reasoning: plan_result.reasoning.clone(),
                            tool_call: Some(tool_call),
                            tool_result: None,
                        });
                        return finalize(ctx, collab, RunState::WaitingForUser, Some(message)).await;
                    }
                    zace_core::model::ApprovalDecision::Allow { .. } => {}
                }

                let outcome = execute_tool_call(&tool_call, collab, step_num).await;
                let tool_result = match outcome {
                    Ok(outcome) => outcome.tool_result,
                    Err(e) => {
                        ctx = ctx.add_step(failed_step(step_num, &plan_result.reasoning, tool_call.clone(), &e.to_string()));
                        continue;
                    }
                };

                post_execution_updates(collab, state, &tool_call, &tool_result, step_num);

                let step = Step {
                    step: step_num,
                    state: RunState::Executing,
                    reasoning: plan_result.reasoning.clone(),
                    tool_call: Some(tool_call.clone()),
                    tool_result: Some(tool_result.clone()),
                };
                ctx = ctx.add_step(step);

                if let Some(guard_event) = guard::post_execution_repetition(state, &tool_call, &tool_result, POST_EXEC_REPETITION_LIMIT) {
                    emit(collab, step_num, Phase::Finalizing, "loop_guard_triggered", payload([("kind", Value::String(guard_event))]));
                    return finalize(ctx, collab, RunState::WaitingForUser, Some("I keep getting the same result from this command.".to_string())).await;
                }

                if guard::readonly_stagnation(&ctx, state, collab.config.readonly_stagnation_window) {
                    emit(collab, step_num, Phase::Finalizing, "readonly_stagnation_guard_triggered", Map::new());
                    return finalize(ctx, collab, RunState::WaitingForUser, Some("I've only been inspecting since the last write with no new validation.".to_string())).await;
                }

                collab
                    .memory
                    .add_message(Message::tool(summarize_tool_result(&tool_result)));
            }
        }
    }
}

enum CompletionStepOutcome {
    Completed,
    WaitingForUser(String),
    Blocked { terminal: bool, message: String },
}

async fn run_completion(
    step_num: u32,
    ctx: &RunContext,
    plan_result: &PlanResult,
    collab: &mut RunCollaborators<'_>,
    state: &mut LoopState,
) -> CompletionStepOutcome {
    let write_occurred = state.last_write_step > state.last_successful_validation_step;
    let gate_cwd = state.last_write_working_directory.clone().unwrap_or_else(|| collab.project_root.to_path_buf());

    let completion_ctx = CompletionContext {
        project_root: collab.project_root,
        planner_gate_commands: plan_result.completion_gate_commands.as_deref(),
        planner_declared_none: plan_result.completion_gates_declared_none.unwrap_or(false),
        write_occurred_since_last_validation: write_occurred,
        last_write_step: state.last_write_step,
        last_successful_validation_step: state.last_successful_validation_step,
        lsp_bootstrap_state: state.lsp_bootstrap.state,
        lsp_auto_provision_budget_remaining: state.lsp_bootstrap.provision_attempts < collab.config.lsp_provision_max_attempts,
        gate_cwd: &gate_cwd,
    };

    let mut approval_ctx = zace_approval::ApprovalContext {
        classifier: collab.safety_classifier,
        store: collab.approval_store,
        one_shot_allowlist: collab.one_shot_allowlist,
        session_id: &collab.session_id,
    };

    let result = zace_gate::run_completion_pipeline(
        &completion_ctx,
        &mut state.completion_plan,
        collab.config,
        &mut approval_ctx,
        collab.executor,
        collab.lsp,
    )
    .await;

    match result {
        Ok(GateOutcome::Completed) => {
            emit(collab, step_num, Phase::Finalizing, "completion_gates_passed", Map::new());
            state.repeated_block_tracker.reset();
            CompletionStepOutcome::Completed
        }
        Ok(GateOutcome::WaitingForUser(message)) => {
            emit(collab, step_num, Phase::Finalizing, "completion_waiting_for_user", Map::new());
            CompletionStepOutcome::WaitingForUser(message)
        }
        Ok(GateOutcome::Blocked(reason)) => {
            let message = reason.message();
            state.last_completion_gate_failure = Some(message.clone());
            emit(
                collab,
                step_num,
                Phase::Finalizing,
                "completion_blocked",
                payload([("reason", Value::String(reason.reason_key()))]),
            );
            if matches!(reason, zace_gate::GateBlockReason::Masked { .. }) {
                emit(collab, step_num, Phase::Finalizing, "validation_gate_masked", Map::new());
            }
            let repeated = state
                .repeated_block_tracker
                .record(&reason.reason_key(), collab.config.completion_block_repeat_limit);
            if repeated {
                emit(collab, step_num, Phase::Finalizing, "completion_block_loop_guard_triggered", Map::new());
                CompletionStepOutcome::Blocked {
                    terminal: true,
                    message: format!("I am repeatedly blocked: {message}"),
                }
            } else {
                CompletionStepOutcome::Blocked { terminal: false, message }
            }
        }
        Err(e) => {
            state.last_completion_gate_failure = Some(e.to_string());
            CompletionStepOutcome::Blocked { terminal: false, message: e.to_string() }
        }
    }
}

fn push_signature_history(state: &mut LoopState, signature: String) {
    state.tool_call_signature_history.push_back(signature);
    while state.tool_call_signature_history.len() > 64 {
        state.tool_call_signature_history.pop_front();
    }
}

fn failed_step(step_num: u32, reasoning: &str, tool_call: ToolCall, error: &str) -> Step {
    Step {
        step: step_num,
        state: RunState::Executing,
        reasoning: reasoning.to_string(),
        tool_call: Some(tool_call),
        tool_result: Some(zace_core::model::ToolResult {
            success: false,
            output: String::new(),
            error: Some(error.to_string()),
            artifacts: None,
        }),
    }
}

fn post_execution_updates(
    collab: &mut RunCollaborators<'_>,
    state: &mut LoopState,
    tool_call: &ToolCall,
    tool_result: &zace_core::model::ToolResult,
    step_num: u32,
) {
    let Some(artifacts) = tool_result.artifacts.as_ref() else { return };

    let cwd = tool_call
        .arguments
        .get("cwd")
        .and_then(Value::as_str)
        .map(PathBuf::from)
        .unwrap_or_else(|| collab.project_root.to_path_buf());

    if !artifacts.changed_files.is_empty() {
        state.last_write_step = step_num;
        state.last_write_working_directory = Some(cwd);

        if artifacts.lsp_error_count > state.last_write_lsp_error_count + collab.config.write_regression_error_spike {
            emit(collab, step_num, Phase::Finalizing, "write_regression_detected", Map::new());
        }
        state.last_write_lsp_error_count = artifacts.lsp_error_count;
    }

    if let Some(status) = artifacts.lsp_status {
        let signal = zace_lsp::bootstrap::derive_signal(status);
        let event = zace_lsp::bootstrap::transition(&mut state.lsp_bootstrap, signal, artifacts.lsp_status_reason.clone());
        match event {
            zace_lsp::bootstrap::BootstrapEvent::Required => {
                emit(collab, step_num, Phase::Executing, "lsp_bootstrap_required", Map::new());
            }
            zace_lsp::bootstrap::BootstrapEvent::Cleared => {
                emit(collab, step_num, Phase::Executing, "lsp_bootstrap_cleared", Map::new());
            }
            zace_lsp::bootstrap::BootstrapEvent::None => {}
        }
    }

    let command = tool_call.arguments.get("command").and_then(Value::as_str).unwrap_or_default();
    if tool_result.success && guard::is_validator_command(command) {
        state.last_successful_validation_step = step_num;
    }
}

async fn maybe_compact(collab: &mut RunCollaborators<'_>, step_num: u32) {
    let options = CompactionOptions {
        model_context_tokens: 0,
        trigger_ratio: collab.config.compaction_trigger_ratio,
        preserve_recent_messages: collab.config.compaction_preserve_recent_messages,
    };
    // Without a live provider, context-window size is unknown; a real
    // transport supplies `model_context_tokens` via `PlanResult::usage`.
    // The check is still run so a non-zero context always participates.
    let input_tokens = collab.memory.estimated_tokens();
    if !collab.memory.should_compact(input_tokens, &options) {
        return;
    }
    match collab.memory.compact(collab.summarizer, &options).await {
        Ok(outcome) if outcome.triggered => {
            emit(
                collab,
                step_num,
                Phase::Planning,
                "compaction",
                payload([
                    ("messagesBefore", Value::from(outcome.messages_before)),
                    ("messagesAfter", Value::from(outcome.messages_after)),
                ]),
            );
            if let Some(summary) = outcome.summary {
                let _ = collab.session.append(&SessionEntry::Summary {
                    run_id: collab.run_id.clone(),
                    content: summary,
                });
            }
        }
        Ok(_) => {}
        Err(e) => warn!(error = %e, "compaction summarizer failed"),
    }
}

fn build_planner_prompt(ctx: &RunContext, memory: &MessageLog) -> String {
    let mut prompt = format!("Task: {}\nStep: {}/{}\n\n", ctx.task, ctx.current_step + 1, ctx.max_steps);
    for message in memory.messages().iter().rev().take(10).collect::<Vec<_>>().into_iter().rev() {
        prompt.push_str(&format!("[{:?}] {}\n", message.role, message.content));
    }
    prompt
}

fn summarize_tool_result(result: &zace_core::model::ToolResult) -> String {
    if let Some(artifacts) = &result.artifacts {
        format!(
            "success={} exit_code={:?} changed_files={}",
            result.success,
            artifacts.exit_code,
            artifacts.changed_files.len()
        )
    } else {
        format!("success={} error={:?}", result.success, result.error)
    }
}

async fn finalize(
    ctx: RunContext,
    collab: &mut RunCollaborators<'_>,
    final_state: RunState,
    message: Option<String>,
) -> RunOutcome {
    let step = ctx.current_step;
    let final_state_label = format!("{final_state:?}").to_lowercase();
    if let Err(e) = collab
        .session
        .append(&SessionEntry::final_state_set(collab.run_id.clone(), step, &final_state_label))
    {
        warn!(error = %e, "failed to append final_state_set session event");
    }
    let _ = collab.session.flush();
    info!(final_state = ?final_state, steps = ctx.current_step, "run finished");
    RunOutcome {
        context: ctx.transition(final_state),
        final_state,
        message,
    }
}
