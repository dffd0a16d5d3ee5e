//! Anthropic named-event SSE conversion.

use std::collections::HashMap;

use super::translation::{convert_usage, map_stop_reason};
use crate::core::streaming::{FrameOutput, StreamState};
use crate::core::transport::sse::SseFrame;
use crate::core::types::errors::{GatewayError, Result};
use crate::core::types::message::MessageRole;
use crate::core::types::response::{ChatChunk, ChatDelta};
use crate::core::types::tools::{FunctionCallDelta, ToolCallDelta};
use crate::core::types::{Provider, StreamChunk};

/// Converter for one messages stream. Named-event frames arrive already
/// paired by the SSE parser; this tracks content-block indexes so tool-use
/// argument deltas map onto stable tool-call indexes.
#[derive(Default)]
pub struct MessagesStreamConverter {
    /// content block index → tool call index.
    tool_blocks: HashMap<u64, u32>,
    next_tool_index: u32,
}

impl MessagesStreamConverter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn convert(
        &mut self,
        state: &mut StreamState,
        frame: SseFrame,
    ) -> Result<FrameOutput> {
        let (event, data) = match frame {
            SseFrame::Done => return Ok(FrameOutput::finish(Vec::new())),
            SseFrame::Event { event, data } => (event.unwrap_or_default(), data),
        };
        let value: serde_json::Value = serde_json::from_str(&data)
            .map_err(|e| GatewayError::decode(format!("malformed stream event: {}", e)))?;

        match event.as_str() {
            "message_start" => {
                if let Some(message) = value.get("message") {
                    if let Some(id) = message.get("id").and_then(|v| v.as_str()) {
                        state.message_id = id.to_string();
                    }
                    if let Some(model) = message.get("model").and_then(|v| v.as_str()) {
                        state.model = model.to_string();
                    }
                    if let Some(usage) = message.get("usage") {
                        state.record_usage(&convert_usage(usage));
                    }
                }
                let chunk = ChatChunk::new(state.message_id.clone(), state.model.clone())
                    .with_delta(ChatDelta {
                        role: Some(MessageRole::Assistant),
                        ..Default::default()
                    });
                Ok(FrameOutput::chunk(StreamChunk::Chat(chunk)))
            }

            "content_block_start" => {
                let index = value.get("index").and_then(|v| v.as_u64()).unwrap_or(0);
                let block = value.get("content_block");
                if block.and_then(|b| b.get("type")).and_then(|t| t.as_str()) == Some("tool_use") {
                    let tool_index = self.next_tool_index;
                    self.next_tool_index += 1;
                    self.tool_blocks.insert(index, tool_index);
                    state.record_tool_call();

                    let chunk = ChatChunk::new(state.message_id.clone(), state.model.clone())
                        .with_delta(ChatDelta {
                            tool_calls: Some(vec![ToolCallDelta {
                                index: tool_index,
                                id: block
                                    .and_then(|b| b.get("id"))
                                    .and_then(|v| v.as_str())
                                    .map(str::to_string),
                                call_type: Some("function".to_string()),
                                function: Some(FunctionCallDelta {
                                    name: block
                                        .and_then(|b| b.get("name"))
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

            "content_block_delta" => {
                let index = value.get("index").and_then(|v| v.as_u64()).unwrap_or(0);
                let delta = value.get("delta");
                match delta.and_then(|d| d.get("type")).and_then(|t| t.as_str()) {
                    Some("text_delta") => {
                        let text = delta
                            .and_then(|d| d.get("text"))
                            .and_then(|t| t.as_str())
                            .unwrap_or("");
                        state.record_text(text);
                        let chunk = ChatChunk::content_delta(
                            state.message_id.clone(),
                            state.model.clone(),
                            text,
                        );
                        Ok(FrameOutput::chunk(StreamChunk::Chat(chunk)))
                    }
                    Some("thinking_delta") => {
                        let thinking = delta
                            .and_then(|d| d.get("thinking"))
                            .and_then(|t| t.as_str())
                            .unwrap_or("");
                        let chunk = ChatChunk::new(state.message_id.clone(), state.model.clone())
                            .with_delta(ChatDelta {
                                reasoning: Some(thinking.to_string()),
                                ..Default::default()
                            });
                        Ok(FrameOutput::chunk(StreamChunk::Chat(chunk)))
                    }
                    Some("input_json_delta") => {
                        let partial = delta
                            .and_then(|d| d.get("partial_json"))
                            .and_then(|t| t.as_str())
                            .unwrap_or("");
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
                        Ok(FrameOutput::chunk(StreamChunk::Chat(chunk)))
                    }
                    _ => Ok(FrameOutput::none()),
                }
            }

            "content_block_stop" => Ok(FrameOutput::none()),

            "message_delta" => {
                if let Some(usage) = value.get("usage") {
                    state.record_usage(&convert_usage(usage));
                }
                let finish_reason = value
                    .get("delta")
                    .and_then(|d| d.get("stop_reason"))
                    .and_then(|r| r.as_str())
                    .map(map_stop_reason);
                if let Some(reason) = &finish_reason {
                    state.finish_reason = Some(reason.clone());
                }
                let mut chunk = ChatChunk::new(state.message_id.clone(), state.model.clone());
                if let Some(reason) = finish_reason {
                    chunk = chunk.with_finish(reason);
                }
                chunk.usage = if state.saw_usage {
                    Some(state.usage.clone())
                } else {
                    None
                };
                Ok(FrameOutput::chunk(StreamChunk::Chat(chunk)))
            }

            "message_stop" => {
                let mut chunk = ChatChunk::new(state.message_id.clone(), state.model.clone());
                chunk.usage = if state.saw_usage {
                    Some(state.usage.clone())
                } else {
                    None
                };
                Ok(FrameOutput::finish(vec![StreamChunk::Chat(chunk)]))
            }

            "ping" => Ok(FrameOutput::none()),

            "error" => {
                let detail = value.get("error");
                let message = detail
                    .and_then(|e| e.get("message"))
                    .and_then(|m| m.as_str())
                    .unwrap_or("stream error")
                    .to_string();
                let mut err = GatewayError::provider_api(Provider::Anthropic, 200, message);
                if let Some(t) = detail
                    .and_then(|e| e.get("type"))
                    .and_then(|t| t.as_str())
                {
                    err = err.with_error_type(t);
                }
                Err(err)
            }

            _ => Ok(FrameOutput::none()),
        }
    }
}
