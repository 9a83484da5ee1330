//! Shared enums for the run loop's data model.
//!
//! These are the small, cross-cutting types that every component needs to
//! agree on. Bigger structures (completion plans, tool results, plan
//! results) live in the crate that owns the behavior producing them.

use serde::{Deserialize, Serialize};

/// Lifecycle state of a run. `Step` records append only; `currentStep` always
/// equals the number of recorded steps.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunState {
    Planning,
    Executing,
    WaitingForUser,
    Completed,
    Blocked,
    Interrupted,
    Error,
}

impl RunState {
    /// Terminal states end the run loop; no further steps are scheduled.
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            Self::WaitingForUser | Self::Completed | Self::Blocked | Self::Interrupted | Self::Error
        )
    }
}

/// How a shell command's file-level effect was detected.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChangeSource {
    Marker,
    GitDelta,
    InferredRedirect,
}

/// Coarse signal of whether a step made progress.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProgressSignal {
    FilesChanged,
    OutputChanged,
    SuccessWithoutChanges,
    None,
}

/// Why (and whether) a shell process was torn down before natural exit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LifecycleEvent {
    #[default]
    None,
    Abort,
    Timeout,
}

/// LSP feedback status attached to a shell `ToolResult`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LspStatus {
    Diagnostics,
    NoErrors,
    NoActiveServer,
    NoApplicableFiles,
    NoChangedFiles,
    Failed,
    Disabled,
}

/// Retry classification for a failed tool call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RetryCategory {
    Transient,
    NonTransient,
    Unknown,
}

/// How planner output was ultimately obtained.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ParseMode {
    SchemaTransport,
    RepairJson,
    Legacy,
    Failed,
}

/// Where a completion plan's gates came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GateSource {
    None,
    TaskExplicit,
    Planner,
    AutoDiscovered,
    Merged,
}

/// Planner's top-level decision for a step.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PlanAction {
    Continue,
    AskUser,
    Blocked,
    Complete,
}

/// Output-mode selection for the planner's schema transport.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PlannerOutputMode {
    #[default]
    Auto,
    PromptOnly,
    SchemaStrict,
}

/// LSP bootstrap state machine states (§4.2).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LspBootstrapState {
    Idle,
    Required,
    Probing,
    Ready,
    Failed,
}

/// Approval scope: how long an allow/deny decision is remembered for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ApprovalScope {
    Once,
    Session,
    Workspace,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn terminal_states() {
        assert!(RunState::Completed.is_terminal());
        assert!(RunState::Blocked.is_terminal());
        assert!(RunState::WaitingForUser.is_terminal());
        assert!(RunState::Interrupted.is_terminal());
        assert!(RunState::Error.is_terminal());
        assert!(!RunState::Planning.is_terminal());
        assert!(!RunState::Executing.is_terminal());
    }

    #[test]
    fn serde_round_trip_run_state() {
        let json = serde_json::to_string(&RunState::WaitingForUser).unwrap();
        assert_eq!(json, "\"waiting_for_user\"");
        let back: RunState = serde_json::from_str(&json).unwrap();
        assert_eq!(back, RunState::WaitingForUser);
    }

    #[test]
    fn serde_round_trip_plan_action() {
        for action in [
            PlanAction::Continue,
            PlanAction::AskUser,
            PlanAction::Blocked,
            PlanAction::Complete,
        ] {
            let json = serde_json::to_string(&action).unwrap();
            let back: PlanAction = serde_json::from_str(&json).unwrap();
            assert_eq!(back, action);
        }
    }
}
