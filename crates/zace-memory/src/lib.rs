//! Memory & compaction (C7): the ordered message log a run's planner calls
//! are built from, and the token-ratio triggered summarization hand-off
//! that keeps it bounded (§4.7).
//!
//! Grounded in the teacher's `csa-memory` crate: a `MemoryLlmClient` trait
//! with a dedicated `summarize` operation and a no-op test double
//! (`llm_client.rs`/`noop_client.rs`), generalized here from cross-session
//! fact storage to the CORE's narrower in-run message log.

mod log;
mod message;
mod summarizer;
mod tokens;

pub use log::{CompactionOutcome, CompactionOptions, MessageLog};
pub use message::{Message, Role};
pub use summarizer::{NoopSummarizer, Summarizer};
pub use tokens::estimate_tokens;
