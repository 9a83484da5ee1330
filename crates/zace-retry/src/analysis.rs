//! The executor-analysis LLM collaborator (§4.6 step 8): after a tool call
//! attempt, an optional LLM call may opine on whether the run loop should
//! retry and how long to wait before doing so. The final say still belongs
//! to [`crate::classify_retry`] — a `shouldRetry: true` opinion on a
//! `non_transient` failure is suppressed, never honored (§4.6, §7).

use async_trait::async_trait;
use zace_core::AppError;

/// One attempt's opinion from the executor-analysis collaborator.
#[derive(Debug, Clone)]
pub struct ExecutorAnalysis {
    pub should_retry: bool,
    pub retry_delay_ms: u64,
    pub reason: String,
}

/// Narrow seam to the LLM collaborator that reasons about a failed tool
/// call. Real analysis is out of CORE scope (§1); this trait is the only
/// surface the run loop depends on.
#[async_trait]
pub trait ExecutorAnalysisClient: Send + Sync {
    async fn analyze(&self, command: &str, output: &str, error: Option<&str>) -> Result<ExecutorAnalysis, AppError>;
}

/// A stand-in that never recommends a retry. Used when
/// `executorAnalysis = never`, and as a safe default before a real
/// collaborator is wired in.
#[derive(Debug, Default, Clone, Copy)]
pub struct NeverRetryAnalysis;

#[async_trait]
impl ExecutorAnalysisClient for NeverRetryAnalysis {
    async fn analyze(&self, _command: &str, _output: &str, _error: Option<&str>) -> Result<ExecutorAnalysis, AppError> {
        Ok(ExecutorAnalysis {
            should_retry: false,
            retry_delay_ms: 0,
            reason: "executor analysis disabled".to_string(),
        })
    }
}
