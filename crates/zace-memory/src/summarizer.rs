//! The dedicated LLM call that produces a compaction summary (§4.7),
//! grounded in the teacher's `MemoryLlmClient` trait
//! (`csa-memory/src/llm_client.rs`) and its `NoopClient` test double
//! (`noop_client.rs`).

use async_trait::async_trait;
use zace_core::AppError;

use crate::message::Message;

/// Produces a single summary message standing in for everything it was
/// given. The orchestrator supplies everything except the most recent
/// `compactionPreserveRecentMessages` messages (§4.7).
#[async_trait]
pub trait Summarizer: Send + Sync {
    async fn summarize(&self, messages: &[Message]) -> Result<String, AppError>;
}

/// A deterministic stand-in used where no LLM collaborator is wired up
/// (tests, `doctor` dry-runs). Concatenates role tags rather than actually
/// compressing content — real summarization is an external collaborator
/// (§1: "the LLM HTTP transport" is out of CORE scope).
pub struct NoopSummarizer;

#[async_trait]
impl Summarizer for NoopSummarizer {
    async fn summarize(&self, messages: &[Message]) -> Result<String, AppError> {
        Ok(format!(
            "[summary of {} prior message(s)]",
            messages.len()
        ))
    }
}
