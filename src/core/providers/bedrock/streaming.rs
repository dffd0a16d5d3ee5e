//! ConverseStream EventStream conversion.

use std::collections::HashMap;

use super::translation::{convert_usage, map_stop_reason};
use crate::core::streaming::{FrameOutput, StreamState};
use crate::core::transport::eventstream::EventStreamFrame;
use crate::core::types::errors::{GatewayError, Result};
use crate::core::types::message::MessageRole;
use crate::core::types::response::{ChatChunk, ChatDelta};
use crate::core::types::tools::{FunctionCallDelta, ToolCallDelta};
use crate::core::types::StreamChunk;

/// Converter for one Converse stream. The `metadata` frame carries final
/// usage and is the last event on the wire; the reader must not drain past
/// it.
#[derive(Default)]
pub struct ConverseStreamConverter {
    /// contentBlockIndex → tool call index.
    tool_blocks: HashMap<u64, u32>,
    next_tool_index: u32,
    saw_message_stop: bool,
}

impl ConverseStreamConverter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn convert(
        &mut self,
        state: &mut StreamState,
        frame: EventStreamFrame,
    ) -> Result<FrameOutput> {
        let payload: serde_json::Value = serde_json::from_slice(&frame.payload)
            .map_err(|e| GatewayError::decode(format!("malformed converse frame: {}", e)))?;
        let event_type = frame.event_type.as_deref().unwrap_or_default();

        match event_type {
            "messageStart" => {
                let chunk = ChatChunk::new(state.message_id.clone(), state.model.clone())
                    .with_delta(ChatDelta {
                        role: Some(MessageRole::Assistant),
                        ..Default::default()
                    });
                Ok(FrameOutput::chunk(StreamChunk::Chat(chunk)))
            }

            "contentBlockStart" => {
                let index = payload
                    .get("contentBlockIndex")
                    .and_then(|v| v.as_u64())
                    .unwrap_or(0);
                if let Some(tool_use) = payload.pointer("/start/toolUse") {
                    let tool_index = self.next_tool_index;
                    self.next_tool_index += 1;
                    self.tool_blocks.insert(index, tool_index);
                    state.record_tool_call();

                    let chunk = ChatChunk::new(state.message_id.clone(), state.model.clone())
                        .with_delta(ChatDelta {
                            tool_calls: Some(vec![ToolCallDelta {
                                index: tool_index,
                                id: tool_use
                                    .get("toolUseId")
                                    .and_then(|v| v.as_str())
                                    .map(str::to_string),
                                call_type: Some("function".to_string()),
                                function: Some(FunctionCallDelta {
                                    name: tool_use
                                        .get("name")
                                        .and_then(|v| v.as_str())
                                        .map(str::to_string),
                                    arguments: None,
                                }),
                            }]),
                            ..Default::default()
                        });
                    return Ok(FrameOutput::chunk(StreamChunk::Chat(chunk)));
                }
                Ok(FrameOutput::none())
            }

            "contentBlockDelta" => {
                let index = payload
                    .get("contentBlockIndex")
                    .and_then(|v| v.as_u64())
                    .unwrap_or(0);
                let delta = payload.get("delta");

                if let Some(text) = delta.and_then(|d| d.get("text")).and_then(|t| t.as_str()) {
                    state.record_text(text);
                    let chunk = ChatChunk::content_delta(
                        state.message_id.clone(),
                        state.model.clone(),
                        text,
                    );
                    return Ok(FrameOutput::chunk(StreamChunk::Chat(chunk)));
                }

                if let Some(partial) = delta
                    .and_then(|d| d.pointer("/toolUse/input"))
                    .and_then(|i| i.as_str())
                {
                    let tool_index = self.tool_blocks.get(&index).copied().unwrap_or(0);
                    let chunk = ChatChunk::new(state.message_id.clone(), state.model.clone())
                        .with_delta(ChatDelta {
                            tool_calls: Some(vec![ToolCallDelta {
                                index: tool_index,
                                id: None,
                                call_type: None,
                                function: Some(FunctionCallDelta {
                                    name: None,
                                    arguments: Some(partial.to_string()),
                                }),
                            }]),
                            ..Default::default()
                        });
                    return Ok(FrameOutput::chunk(StreamChunk::Chat(chunk)));
                }
                Ok(FrameOutput::none())
            }

            "contentBlockStop" => Ok(FrameOutput::none()),

            "messageStop" => {
                self.saw_message_stop = true;
                let finish_reason = payload
                    .get("stopReason")
                    .and_then(|r| r.as_str())
                    .map(map_stop_reason);
                if let Some(reason) = &finish_reason {
                    state.finish_reason = Some(reason.clone());
                }
                let mut chunk = ChatChunk::new(state.message_id.clone(), state.model.clone());
                if let Some(reason) = finish_reason {
                    chunk = chunk.with_finish(reason);
                }
                // Usage arrives in the trailing metadata frame.
                Ok(FrameOutput::chunk(StreamChunk::Chat(chunk)))
            }

            "metadata" => {
                if let Some(usage) = payload.get("usage") {
                    state.record_usage(&convert_usage(usage));
                }
                let mut chunk = ChatChunk::new(state.message_id.clone(), state.model.clone());
                chunk.usage = Some(state.usage.clone());
                Ok(FrameOutput::finish(vec![StreamChunk::Chat(chunk)]))
            }

            _ => Ok(FrameOutput::none()),
        }
    }

    pub fn saw_message_stop(&self) -> bool {
        self.saw_message_stop
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::Bytes;

    fn frame(event_type: &str, payload: serde_json::Value) -> EventStreamFrame {
        EventStreamFrame {
            event_type: Some(event_type.to_string()),
            exception_type: None,
            message_type: Some("event".to_string()),
            payload: Bytes::from(payload.to_string()),
        }
    }

    #[test]
    fn test_text_delta() {
        let mut converter = ConverseStreamConverter::new();
        let mut state = StreamState::new("anthropic.claude-3-sonnet");
        let output = converter
            .convert(
                &mut state,
                frame(
                    "contentBlockDelta",
                    serde_json::json!({"contentBlockIndex": 0, "delta": {"text": "Hello"}}),
                ),
            )
            .unwrap();
        assert_eq!(output.chunks.len(), 1);
        assert_eq!(state.accumulated_text, "Hello");
    }

    #[test]
    fn test_message_stop_records_reason_without_finishing() {
        let mut converter = ConverseStreamConverter::new();
        let mut state = StreamState::new("m");
        let output = converter
            .convert(
                &mut state,
                frame("messageStop", serde_json::json!({"stopReason": "end_turn"})),
            )
            .unwrap();
        assert!(!output.done);
        assert_eq!(
            state.finish_reason,
            Some(crate::core::types::FinishReason::Stop)
        );
    }

    #[test]
    fn test_metadata_finishes_with_usage() {
        let mut converter = ConverseStreamConverter::new();
        let mut state = StreamState::new("m");
        let output = converter
            .convert(
                &mut state,
                frame(
                    "metadata",
                    serde_json::json!({"usage": {"inputTokens": 10, "outputTokens": 5, "totalTokens": 15}}),
                ),
            )
            .unwrap();
        assert!(output.done);
        match &output.chunks[0] {
            StreamChunk::Chat(chunk) => {
                assert_eq!(chunk.usage.as_ref().unwrap().total_tokens, 15);
            }
            _ => panic!("expected chat chunk"),
        }
    }

    #[test]
    fn test_tool_use_stream() {
        let mut converter = ConverseStreamConverter::new();
        let mut state = StreamState::new("m");
        converter
            .convert(
                &mut state,
                frame(
                    "contentBlockStart",
                    serde_json::json!({"contentBlockIndex": 1, "start": {"toolUse": {"toolUseId": "t1", "name": "f"}}}),
                ),
            )
            .unwrap();
        assert_eq!(state.tool_call_count, 1);

        let output = converter
            .convert(
                &mut state,
                frame(
                    "contentBlockDelta",
                    serde_json::json!({"contentBlockIndex": 1, "delta": {"toolUse": {"input": "{\"a\":"}}}),
                ),
            )
            .unwrap();
        match &output.chunks[0] {
            StreamChunk::Chat(chunk) => {
                let calls = chunk.choices[0].delta.tool_calls.as_ref().unwrap();
                assert_eq!(calls[0].index, 0);
            }
            _ => panic!("expected chat chunk"),
        }
    }
}
