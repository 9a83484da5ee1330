//! Bootstrap state machine (§4.2): derives a signal from a shell
//! `ToolResult`'s LSP status, then transitions the bootstrap context
//! according to the (previous state × signal) table.

use zace_core::model::LspBootstrapContext;
use zace_core::types::{LspBootstrapState, LspStatus};

/// Coarse signal the bootstrap FSM reacts to, derived from a tool result's
/// `lspStatus`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BootstrapSignal {
    Active,
    Failed,
    Required,
    None,
}

/// `no_active_server → required`, `failed → failed`,
/// `diagnostics|no_errors → active`, else `none`.
pub fn derive_signal(status: LspStatus) -> BootstrapSignal {
    match status {
        LspStatus::NoActiveServer => BootstrapSignal::Required,
        LspStatus::Failed => BootstrapSignal::Failed,
        LspStatus::Diagnostics | LspStatus::NoErrors => BootstrapSignal::Active,
        LspStatus::NoApplicableFiles
        | LspStatus::NoChangedFiles
        | LspStatus::Disabled => BootstrapSignal::None,
    }
}

/// Event emitted by a state transition, if any.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BootstrapEvent {
    None,
    Cleared,
    Required,
}

/// Apply one (state × signal) transition in place, returning the event (if
/// any) to emit. `reason` is the failure reason carried by `Failed`/`Required`
/// signals, compared against the context's stored reason to decide whether a
/// `required` event should re-fire while already in `required` state.
pub fn transition(
    ctx: &mut LspBootstrapContext,
    signal: BootstrapSignal,
    reason: Option<String>,
) -> BootstrapEvent {
    use BootstrapEvent as E;
    use BootstrapSignal as S;
    use LspBootstrapState as St;

    let (next_state, event) = match (ctx.state, signal) {
        (St::Idle, S::Active) => (St::Ready, E::None),
        (St::Idle, S::Failed) => (St::Failed, E::Required),
        (St::Idle, S::Required) => (St::Required, E::Required),
        (St::Idle, S::None) => (St::Idle, E::None),

        (St::Required, S::Active) => (St::Ready, E::Cleared),
        (St::Required, S::Failed) => {
            if ctx.last_failure_reason != reason {
                (St::Failed, E::Required)
            } else {
                (St::Required, E::None)
            }
        }
        (St::Required, S::Required) => (St::Required, E::None),
        (St::Required, S::None) => (St::Required, E::None),

        (St::Failed, S::Active) => (St::Ready, E::Cleared),
        (St::Failed, S::Failed) => (St::Failed, E::None),
        (St::Failed, S::Required) => (St::Required, E::Required),
        (St::Failed, S::None) => (St::Failed, E::None),

        (St::Ready, S::Active) => (St::Ready, E::None),
        (St::Ready, S::Failed) => (St::Failed, E::Required),
        (St::Ready, S::Required) => (St::Required, E::Required),
        (St::Ready, S::None) => (St::Ready, E::None),

        (St::Probing, S::Active) => (St::Ready, E::Cleared),
        (St::Probing, S::Failed) => (St::Failed, E::Required),
        (St::Probing, S::Required) => (St::Required, E::Required),
        (St::Probing, S::None) => (St::Probing, E::None),
    };

    ctx.state = next_state;
    if matches!(signal, S::Failed | S::Required) {
        ctx.last_failure_reason = reason;
    } else if matches!(next_state, St::Ready) {
        ctx.last_failure_reason = None;
    }

    event
}
