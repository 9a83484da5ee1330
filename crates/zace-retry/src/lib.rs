//! Retry classifier & stability signatures (C10): transient-vs-not failure
//! classification for the shell retry loop (§4.6 step 8), and the stable
//! signatures the doom-loop/repetition guardrails hash against (§4.6,
//! §4.10).

mod analysis;
mod classify;
mod signature;

pub use analysis::{ExecutorAnalysis, ExecutorAnalysisClient, NeverRetryAnalysis};
pub use classify::{classify_retry, classify_retry_text};
pub use signature::{build_tool_call_signature, build_tool_loop_signature, ToolLoopInput};
