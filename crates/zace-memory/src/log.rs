//! [`MessageLog`]: the ordered, append-only message log and its token-ratio
//! triggered compaction (§4.7).
//!
//! Ownership: C7 owns the message log exclusively (§3); the orchestrator
//! only ever appends and asks whether compaction should run.

use zace_core::AppError;

use crate::message::{Message, Role};
use crate::summarizer::Summarizer;
use crate::tokens::estimate_messages_tokens;

/// Tunables for one compaction check (§4.6 step 4 / §4.7).
#[derive(Debug, Clone, Copy)]
pub struct CompactionOptions {
    pub model_context_tokens: u64,
    pub trigger_ratio: f64,
    pub preserve_recent_messages: u32,
}

/// Result of a `maybe_compact` call.
#[derive(Debug, Clone)]
pub struct CompactionOutcome {
    pub triggered: bool,
    pub summary: Option<String>,
    pub messages_before: usize,
    pub messages_after: usize,
}

impl CompactionOutcome {
    fn not_triggered(len: usize) -> Self {
        Self {
            triggered: false,
            summary: None,
            messages_before: len,
            messages_after: len,
        }
    }
}

/// Ordered log of `{role, content}` messages (§4.7), append-only through
/// [`MessageLog::add_message`].
#[derive(Debug, Clone)]
pub struct MessageLog {
    messages: Vec<Message>,
}

impl MessageLog {
    /// A new log always starts with exactly one system message — compaction
    /// depends on this invariant to know which message is "the original
    /// system prompt" (§4.7).
    pub fn new(system_prompt: impl Into<String>) -> Self {
        Self {
            messages: vec![Message::new(Role::System, system_prompt)],
        }
    }

    pub fn add_message(&mut self, message: Message) {
        self.messages.push(message);
    }

    pub fn messages(&self) -> &[Message] {
        &self.messages
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    pub fn estimated_tokens(&self) -> u64 {
        estimate_messages_tokens(&self.messages)
    }

    /// Whether `input_tokens / model_context_tokens >= trigger_ratio`
    /// (§4.6 step 4). `model_context_tokens == 0` never triggers — there's
    /// no ratio to compute.
    pub fn should_compact(&self, input_tokens: u64, options: &CompactionOptions) -> bool {
        if options.model_context_tokens == 0 {
            return false;
        }
        let ratio = input_tokens as f64 / options.model_context_tokens as f64;
        ratio >= options.trigger_ratio
    }

    /// Replace the log with: the original system prompt, a synthesized
    /// summary of everything else except the tail, and that tail verbatim
    /// (§4.7). A no-op (returns `triggered: false`) when there isn't enough
    /// history beyond the preserved tail to summarize.
    pub async fn compact(
        &mut self,
        summarizer: &dyn Summarizer,
        options: &CompactionOptions,
    ) -> Result<CompactionOutcome, AppError> {
        let preserve = options.preserve_recent_messages as usize;
        let before = self.messages.len();

        // Always at least the system message (index 0) plus the preserved tail.
        if before <= 1 + preserve {
            return Ok(CompactionOutcome::not_triggered(before));
        }

        let system = self.messages[0].clone();
        let tail_start = before - preserve;
        let middle = &self.messages[1..tail_start];
        let summary_text = summarizer.summarize(middle).await?;
        let tail: Vec<Message> = self.messages[tail_start..].to_vec();

        let mut compacted = Vec::with_capacity(2 + tail.len());
        compacted.push(system);
        compacted.push(Message::new(Role::System, format!("[compacted summary] {summary_text}")));
        compacted.extend(tail);

        let after = compacted.len();
        self.messages = compacted;

        Ok(CompactionOutcome {
            triggered: true,
            summary: Some(summary_text),
            messages_before: before,
            messages_after: after,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::summarizer::NoopSummarizer;

    #[test]
    fn new_log_starts_with_one_system_message() {
        let log = MessageLog::new("you are an agent");
        assert_eq!(log.len(), 1);
        assert_eq!(log.messages()[0].role, Role::System);
    }

    #[test]
    fn should_compact_honors_trigger_ratio() {
        let log = MessageLog::new("sys");
        let options = CompactionOptions {
            model_context_tokens: 1000,
            trigger_ratio: 0.8,
            preserve_recent_messages: 2,
        };
        assert!(!log.should_compact(700, &options));
        assert!(log.should_compact(800, &options));
        assert!(log.should_compact(900, &options));
    }

    #[test]
    fn zero_model_context_never_triggers() {
        let log = MessageLog::new("sys");
        let options = CompactionOptions {
            model_context_tokens: 0,
            trigger_ratio: 0.1,
            preserve_recent_messages: 0,
        };
        assert!(!log.should_compact(100, &options));
    }

    #[tokio::test]
    async fn compact_preserves_system_and_tail_verbatim() {
        let mut log = MessageLog::new("sys prompt");
        for i in 0..10 {
            log.add_message(Message::user(format!("turn {i}")));
        }
        let options = CompactionOptions {
            model_context_tokens: 100,
            trigger_ratio: 0.5,
            preserve_recent_messages: 3,
        };
        let outcome = log.compact(&NoopSummarizer, &options).await.unwrap();
        assert!(outcome.triggered);
        assert_eq!(outcome.messages_before, 11);
        // system + summary + 3 tail messages
        assert_eq!(log.len(), 5);
        assert_eq!(log.messages()[0].content, "sys prompt");
        assert!(log.messages()[1].content.starts_with("[compacted summary]"));
        assert_eq!(log.messages()[2].content, "turn 7");
        assert_eq!(log.messages()[4].content, "turn 9");
    }

    #[tokio::test]
    async fn compact_is_noop_when_history_fits_within_preserved_tail() {
        let mut log = MessageLog::new("sys");
        log.add_message(Message::user("only one"));
        let options = CompactionOptions {
            model_context_tokens: 100,
            trigger_ratio: 0.1,
            preserve_recent_messages: 5,
        };
        let outcome = log.compact(&NoopSummarizer, &options).await.unwrap();
        assert!(!outcome.triggered);
        assert_eq!(log.len(), 2);
    }
}
