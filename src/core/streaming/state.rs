//! Per-stream mutable state.

use tokio::time::Instant;

use crate::core::types::common::FinishReason;
use crate::core::types::usage::Usage;

/// Everything a stream reader task tracks between events. One instance per
/// stream, owned by the reader; lifecycle events are synthesized from
/// transitions recorded here, never stored.
#[derive(Debug)]
pub struct StreamState {
    /// Provider-assigned message ID, or a server-minted fallback.
    pub message_id: String,
    /// Effective model name as reported on the wire.
    pub model: String,
    /// Running usage; later reports absorb into earlier ones.
    pub usage: Usage,
    pub saw_usage: bool,
    pub finish_reason: Option<FinishReason>,
    /// Next chunk index to stamp; strictly monotonic from 0.
    pub chunk_index: u64,
    pub start: Instant,
    pub last_chunk: Instant,
    // Responses-API lifecycle flags.
    pub has_emitted_created: bool,
    pub has_emitted_in_progress: bool,
    pub text_item_added: bool,
    pub content_part_added: bool,
    /// Full text accumulated for `output_text.done`.
    pub accumulated_text: String,
    /// How many tool-call deltas this stream has produced. A stream's
    /// finish reason is forced to `tool_calls` only when this is non-zero.
    pub tool_call_count: u32,
    /// Next lifecycle sequence number.
    pub sequence_number: u64,
    pub created: i64,
}

impl StreamState {
    pub fn new(model: impl Into<String>) -> Self {
        let now = Instant::now();
        Self {
            message_id: format!("chatcmpl-{}", uuid::Uuid::new_v4()),
            model: model.into(),
            usage: Usage::default(),
            saw_usage: false,
            finish_reason: None,
            chunk_index: 0,
            start: now,
            last_chunk: now,
            has_emitted_created: false,
            has_emitted_in_progress: false,
            text_item_added: false,
            content_part_added: false,
            accumulated_text: String::new(),
            tool_call_count: 0,
            sequence_number: 0,
            created: chrono::Utc::now().timestamp(),
        }
    }

    pub fn record_usage(&mut self, usage: &Usage) {
        self.usage.absorb(usage);
        self.saw_usage = true;
    }

    pub fn record_text(&mut self, delta: &str) {
        self.accumulated_text.push_str(delta);
    }

    pub fn record_tool_call(&mut self) {
        self.tool_call_count += 1;
    }

    pub fn next_sequence(&mut self) -> u64 {
        let n = self.sequence_number;
        self.sequence_number += 1;
        n
    }

    /// Apply the tool-call override: a stream that emitted at least one
    /// tool-call delta finishes with `tool_calls`, otherwise the
    /// native-mapped reason stands.
    pub fn effective_finish_reason(&self) -> Option<FinishReason> {
        if self.tool_call_count > 0 {
            Some(FinishReason::ToolCalls)
        } else {
            self.finish_reason.clone()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_finish_reason_tool_call_override() {
        let mut state = StreamState::new("gemini-2.0-flash");
        state.finish_reason = Some(FinishReason::Stop);
        assert_eq!(state.effective_finish_reason(), Some(FinishReason::Stop));

        state.record_tool_call();
        assert_eq!(state.effective_finish_reason(), Some(FinishReason::ToolCalls));
    }

    #[test]
    fn test_sequence_numbers_monotonic() {
        let mut state = StreamState::new("m");
        assert_eq!(state.next_sequence(), 0);
        assert_eq!(state.next_sequence(), 1);
        assert_eq!(state.next_sequence(), 2);
    }

    #[test]
    fn test_usage_accumulates() {
        let mut state = StreamState::new("m");
        state.record_usage(&Usage::new(10, 0));
        state.record_usage(&Usage::new(10, 25));
        assert_eq!(state.usage.total_tokens, 35);
        assert!(state.saw_usage);
    }
}
