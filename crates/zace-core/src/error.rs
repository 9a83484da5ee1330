//! Error taxonomy surfaced to the run loop as tagged results, not exceptions.
//!
//! Each variant maps to a recovery policy documented on the orchestrator: most
//! are recorded as a failed step and the run continues, a handful finalize the
//! run. See `RunState` for the terminal states these errors can produce.

#[derive(thiserror::Error, Debug)]
pub enum AppError {
    /// Malformed tool-call arguments. Recorded as a failed step; the run continues.
    #[error("invalid arguments for tool '{tool}': {reason}")]
    Validation { tool: String, reason: String },

    /// Shell or artifact-write infrastructure failure.
    #[error("tool execution failed: {0}")]
    ToolExecution(String),

    /// LLM transport failure, subclassed for recovery routing.
    #[error("provider error ({kind:?}): {message}")]
    Provider {
        kind: ProviderErrorKind,
        message: String,
    },

    /// Planner output could not be parsed after all recovery attempts.
    #[error("planner output unparseable after exhausting recovery: {0}")]
    ParserFailure(String),

    /// Deny-pattern or runtime-script-protocol block.
    #[error("policy blocked command: {0}")]
    PolicyBlock(String),

    /// LSP bootstrap is required or failed and completion cannot proceed.
    #[error("LSP bootstrap unresolved: {0}")]
    BootstrapUnresolved(String),

    /// A stability guardrail (doom-loop, stagnation, repeated block) fired.
    #[error("loop guard triggered: {0}")]
    LoopGuardTriggered(String),

    /// The run was cancelled.
    #[error("run interrupted")]
    Interrupted,

    /// Project root could not be located.
    #[error("project root not found")]
    ProjectRootNotFound,

    /// Any other uncaught failure.
    #[error("{0}")]
    Uncaught(String),
}

/// Sub-classification of `ProviderError`, used to route recovery in the planner.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProviderErrorKind {
    ResponseFormatUnsupported,
    InvalidMessageShape,
    RateLimit,
    Other,
}

impl AppError {
    pub fn validation(tool: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Validation {
            tool: tool.into(),
            reason: reason.into(),
        }
    }

    pub fn provider(kind: ProviderErrorKind, message: impl Into<String>) -> Self {
        Self::Provider {
            kind,
            message: message.into(),
        }
    }

    /// Whether this error should finalize the run rather than being recorded
    /// as a recoverable failed step.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            Self::BootstrapUnresolved(_) | Self::LoopGuardTriggered(_) | Self::Interrupted
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn validation_display() {
        let err = AppError::validation("execute_command", "missing 'command' field");
        assert_eq!(
            err.to_string(),
            "invalid arguments for tool 'execute_command': missing 'command' field"
        );
    }

    #[test]
    fn provider_display_includes_kind() {
        let err = AppError::provider(ProviderErrorKind::RateLimit, "429 too many requests");
        assert!(err.to_string().contains("RateLimit"));
        assert!(err.to_string().contains("429"));
    }

    #[test]
    fn terminal_classification() {
        assert!(AppError::Interrupted.is_terminal());
        assert!(AppError::BootstrapUnresolved("required".into()).is_terminal());
        assert!(AppError::LoopGuardTriggered("doom loop".into()).is_terminal());
        assert!(!AppError::ProjectRootNotFound.is_terminal());
        assert!(!AppError::PolicyBlock("deny pattern".into()).is_terminal());
    }

    #[test]
    fn error_is_send_and_sync() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<AppError>();
    }
}
