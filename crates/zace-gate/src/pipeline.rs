//! The completion-gate pipeline itself (§4.4): bootstrap gate, gate merge,
//! auto-discovery, masking rejection, per-gate approval, sequential
//! execution, and the freshness check — in that order.

use std::collections::HashSet;
use std::path::Path;

use zace_core::model::{ApprovalDecision, CompletionPlan};
use zace_core::types::{GateSource, LspBootstrapState};
use zace_core::AppError;
use zace_approval::{resolve_command_approval, ApprovalContext};
use zace_config::RuntimeConfig;
use zace_shell::ShellExecutor;
use zace_lsp::LspRegistry;

use crate::discovery::discover_gates;
use crate::masking::detect_masking;

/// Inputs the run loop already tracks that the pipeline needs but doesn't
/// own (§4.4, §4.6 step 9).
pub struct CompletionContext<'a> {
    pub project_root: &'a Path,
    pub planner_gate_commands: Option<&'a [String]>,
    pub planner_declared_none: bool,
    pub write_occurred_since_last_validation: bool,
    pub last_write_step: u32,
    pub last_successful_validation_step: u32,
    pub lsp_bootstrap_state: LspBootstrapState,
    pub lsp_auto_provision_budget_remaining: bool,
    pub gate_cwd: &'a Path,
}

/// Why a completion attempt was blocked, for operator-facing messaging and
/// the repeated-block counter (§4.4 "Repeated identical blocking reason").
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GateBlockReason {
    BootstrapUnresolved,
    StrictNoneAfterWrite,
    Masked { command: String },
    ApprovalDenied { command: String, message: String },
    GateFailed { command: String, output: String },
    Freshness,
}

impl GateBlockReason {
    /// A stable-ish key for the repeated-block counter: two blocks for the
    /// same failing gate command collapse to the same reason even if the
    /// failure output differs run to run.
    pub fn reason_key(&self) -> String {
        match self {
            Self::BootstrapUnresolved => "bootstrap_unresolved".to_string(),
            Self::StrictNoneAfterWrite => "strict_none_after_write".to_string(),
            Self::Masked { command } => format!("masked:{command}"),
            Self::ApprovalDenied { command, .. } => format!("approval_denied:{command}"),
            Self::GateFailed { command, .. } => format!("gate_failed:{command}"),
            Self::Freshness => "freshness".to_string(),
        }
    }

    pub fn message(&self) -> String {
        match self {
            Self::BootstrapUnresolved => {
                "completion refused: LSP bootstrap has not resolved yet".to_string()
            }
            Self::StrictNoneAfterWrite => {
                "strict mode rejects `gates: none` after a write step".to_string()
            }
            Self::Masked { command } => format!("gate command masks failure: `{command}`"),
            Self::ApprovalDenied { command, message } => {
                format!("gate command `{command}` was denied: {message}")
            }
            Self::GateFailed { command, output } => format!("gate `{command}` failed:\n{output}"),
            Self::Freshness => "no successful validation since the last write".to_string(),
        }
    }
}

/// Result of one completion attempt.
#[derive(Debug)]
pub enum GateOutcome {
    Completed,
    Blocked(GateBlockReason),
    /// Bootstrap budget exhausted or a gate required approval mid-run.
    WaitingForUser(String),
}

/// Tracks consecutive identical blocking reasons (§4.4 "Repeated identical
/// blocking reason"): reaching `completionBlockRepeatLimit` in a row should
/// make the run loop finalize `waiting_for_user` instead of looping forever.
#[derive(Debug, Default)]
pub struct RepeatedBlockTracker {
    last_reason_key: Option<String>,
    consecutive_count: u32,
}

impl RepeatedBlockTracker {
    /// Records a block outcome; returns `true` once the limit is reached.
    pub fn record(&mut self, reason_key: &str, limit: u32) -> bool {
        if self.last_reason_key.as_deref() == Some(reason_key) {
            self.consecutive_count += 1;
        } else {
            self.last_reason_key = Some(reason_key.to_string());
            self.consecutive_count = 1;
        }
        self.consecutive_count >= limit
    }

    /// Any successful advance (or a different reason already handled by
    /// `record`) resets the streak.
    pub fn reset(&mut self) {
        self.last_reason_key = None;
        self.consecutive_count = 0;
    }
}

/// Runs the full completion-gate pipeline for one `complete` planner action.
#[allow(clippy::too_many_arguments)]
pub async fn run_completion_pipeline(
    ctx: &CompletionContext<'_>,
    plan: &mut CompletionPlan,
    config: &RuntimeConfig,
    approval_ctx: &mut ApprovalContext<'_>,
    executor: &ShellExecutor,
    lsp: &mut LspRegistry,
) -> Result<GateOutcome, AppError> {
    // Step 1: bootstrap gate.
    if config.completion_require_lsp && config.lsp_enabled {
        let unresolved = matches!(
            ctx.lsp_bootstrap_state,
            LspBootstrapState::Required
        ) || (ctx.lsp_bootstrap_state == LspBootstrapState::Failed
            && config.lsp_bootstrap_block_on_failed);
        if unresolved {
            if ctx.lsp_auto_provision_budget_remaining {
                return Ok(GateOutcome::Blocked(GateBlockReason::BootstrapUnresolved));
            }
            return Ok(GateOutcome::WaitingForUser(
                GateBlockReason::BootstrapUnresolved.message(),
            ));
        }
    }

    // Step 2: merge planner-declared gates.
    if let Some(commands) = ctx.planner_gate_commands {
        plan.merge(commands.iter().cloned(), GateSource::Planner);
    }

    // Step 3: auto-discovery.
    let strict = config.completion_validation_mode.is_strict();
    let should_discover = ctx.write_occurred_since_last_validation
        && ((strict && config.completion_require_discovered_gates)
            || (plan.gates.is_empty() && !ctx.planner_declared_none));
    if should_discover {
        let discovered = discover_gates(ctx.project_root);
        if !discovered.is_empty() {
            plan.merge(discovered, GateSource::AutoDiscovered);
        }
    }

    // Step 4: strict `gates: none` after writes.
    if strict
        && ctx.planner_declared_none
        && ctx.write_occurred_since_last_validation
        && plan.gates.is_empty()
    {
        return Ok(GateOutcome::Blocked(GateBlockReason::StrictNoneAfterWrite));
    }

    // Step 5: masking check.
    if config.gate_disallow_masking || strict {
        for gate in &plan.gates {
            if let Some(_reason) = detect_masking(&gate.command) {
                return Ok(GateOutcome::Blocked(GateBlockReason::Masked {
                    command: gate.command.clone(),
                }));
            }
        }
    }

    // Step 6 + 7: per-gate approval, then sequential execution.
    for gate in &plan.gates {
        let decision = resolve_command_approval(approval_ctx, &gate.command, Some(&ctx.gate_cwd.to_string_lossy()))
            .await?;
        match decision {
            ApprovalDecision::Deny { message, .. } => {
                return Ok(GateOutcome::Blocked(GateBlockReason::ApprovalDenied {
                    command: gate.command.clone(),
                    message,
                }));
            }
            ApprovalDecision::RequestUser { message, .. } => {
                return Ok(GateOutcome::WaitingForUser(message));
            }
            ApprovalDecision::Allow { .. } => {}
        }

        let result = executor
            .execute(
                &gate.command,
                Some(ctx.gate_cwd),
                &std::collections::HashMap::new(),
                Some(config.shell_timeout_ms),
                Some(config.output_limit_chars),
                None,
                lsp,
            )
            .await?;

        if !result.success {
            return Ok(GateOutcome::Blocked(GateBlockReason::GateFailed {
                command: gate.command.clone(),
                output: result.error.unwrap_or(result.output),
            }));
        }
    }

    // Step 8: freshness. Only meaningful once a write has actually happened;
    // a run that never wrote anything has nothing to re-validate.
    if ctx.write_occurred_since_last_validation && ctx.last_successful_validation_step <= ctx.last_write_step {
        return Ok(GateOutcome::Blocked(GateBlockReason::Freshness));
    }

    // Step 9: success.
    Ok(GateOutcome::Completed)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;
    use zace_approval::HeuristicClassifier;
    use zace_approval::ApprovalStore;

    fn base_context(project_root: &Path) -> CompletionContext<'_> {
        CompletionContext {
            project_root,
            planner_gate_commands: None,
            planner_declared_none: false,
            write_occurred_since_last_validation: false,
            last_write_step: 0,
            last_successful_validation_step: 0,
            lsp_bootstrap_state: LspBootstrapState::Ready,
            lsp_auto_provision_budget_remaining: true,
            gate_cwd: project_root,
        }
    }

    #[tokio::test]
    async fn empty_plan_with_no_write_completes() {
        let dir = tempfile::tempdir().unwrap();
        let config = RuntimeConfig::default();
        let mut plan = CompletionPlan::empty();
        let classifier = HeuristicClassifier::default();
        let store = ApprovalStore::default();
        let mut allowlist = HashSet::new();
        let mut approval_ctx = ApprovalContext {
            classifier: &classifier,
            store: &store,
            one_shot_allowlist: &mut allowlist,
            session_id: "s1",
        };
        let executor = ShellExecutor::new(
            zace_shell::policy::CommandPolicy::new(&[], &[]).unwrap(),
            PathBuf::from(dir.path()),
        );
        let mut lsp = LspRegistry::new(PathBuf::from(".zace/runtime/lsp/servers.json"), false);
        let ctx = base_context(dir.path());

        let outcome = run_completion_pipeline(
            &ctx,
            &mut plan,
            &config,
            &mut approval_ctx,
            &executor,
            &mut lsp,
        )
        .await
        .unwrap();

        assert!(matches!(outcome, GateOutcome::Completed));
    }

    #[tokio::test]
    async fn write_without_later_validation_blocks_on_freshness() {
        let dir = tempfile::tempdir().unwrap();
        let config = RuntimeConfig::default();
        let mut plan = CompletionPlan::empty();
        let classifier = HeuristicClassifier::default();
        let store = ApprovalStore::default();
        let mut allowlist = HashSet::new();
        let mut approval_ctx = ApprovalContext {
            classifier: &classifier,
            store: &store,
            one_shot_allowlist: &mut allowlist,
            session_id: "s1",
        };
        let executor = ShellExecutor::new(
            zace_shell::policy::CommandPolicy::new(&[], &[]).unwrap(),
            PathBuf::from(dir.path()),
        );
        let mut lsp = LspRegistry::new(PathBuf::from(".zace/runtime/lsp/servers.json"), false);
        let mut ctx = base_context(dir.path());
        ctx.write_occurred_since_last_validation = true;
        ctx.last_write_step = 2;
        ctx.last_successful_validation_step = 1;
        ctx.planner_declared_none = true;

        let outcome = run_completion_pipeline(
            &ctx,
            &mut plan,
            &config,
            &mut approval_ctx,
            &executor,
            &mut lsp,
        )
        .await
        .unwrap();

        assert!(matches!(outcome, GateOutcome::Blocked(GateBlockReason::Freshness)));
    }

    #[test]
    fn repeated_block_tracker_triggers_at_limit() {
        let mut tracker = RepeatedBlockTracker::default();
        assert!(!tracker.record("freshness", 2));
        assert!(tracker.record("freshness", 2));
    }

    #[test]
    fn repeated_block_tracker_resets_on_new_reason() {
        let mut tracker = RepeatedBlockTracker::default();
        tracker.record("freshness", 2);
        assert!(!tracker.record("masked:x", 2));
    }
}
