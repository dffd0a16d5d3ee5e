//! Gemini/Vertex SSE conversion.
//!
//! Both bindings stream anonymous `data:` lines, each a complete
//! `GenerateContentResponse` fragment. A stream that produced at least one
//! function-call part finishes with `tool_calls`; otherwise the native
//! reason is mapped through the candidate table.

use super::translation::{convert_usage, map_finish_reason, tool_call_id};
use crate::core::streaming::{FrameOutput, StreamState};
use crate::core::transport::sse::SseFrame;
use crate::core::types::errors::{GatewayError, Result};
use crate::core::types::response::{ChatChunk, ChatDelta};
use crate::core::types::tools::{FunctionCallDelta, ToolCallDelta};
use crate::core::types::StreamChunk;

pub fn convert_generate_frame(
    state: &mut StreamState,
    frame: SseFrame,
) -> Result<FrameOutput> {
    let data = match frame {
        SseFrame::Done => return Ok(FrameOutput::finish(Vec::new())),
        SseFrame::Event { data, .. } => data,
    };

    let value: serde_json::Value = serde_json::from_str(&data)
        .map_err(|e| GatewayError::decode(format!("malformed stream fragment: {}", e)))?;

    if let Some(id) = value.get("responseId").and_then(|v| v.as_str()) {
        state.message_id = id.to_string();
    }
    if let Some(model) = value.get("modelVersion").and_then(|v| v.as_str()) {
        state.model = model.to_string();
    }
    if let Some(metadata) = value.get("usageMetadata") {
        state.record_usage(&convert_usage(metadata));
    }

    let mut chunks = Vec::new();
    let mut native_finish = None;

    if let Some(candidate) = value
        .get("candidates")
        .and_then(|c| c.as_array())
        .and_then(|c| c.first())
    {
        if let Some(parts) = candidate.pointer("/content/parts").and_then(|p| p.as_array()) {
            for part in parts {
                if let Some(text) = part.get("text").and_then(|t| t.as_str()) {
                    state.record_text(text);
                    chunks.push(StreamChunk::Chat(ChatChunk::content_delta(
                        state.message_id.clone(),
                        state.model.clone(),
                        text,
                    )));
                }
                if let Some(function_call) = part.get("functionCall") {
                    let index = state.tool_call_count;
                    state.record_tool_call();
                    let chunk = ChatChunk::new(state.message_id.clone(), state.model.clone())
                        .with_delta(ChatDelta {
                            tool_calls: Some(vec![ToolCallDelta {
                                index,
                                id: Some(tool_call_id(&state.model, index)),
                                call_type: Some("function".to_string()),
                                function: Some(FunctionCallDelta {
                                    name: function_call
                                        .get("name")
                                        .and_then(|n| n.as_str())
                                        .map(str::to_string),
                                    arguments: function_call
                                        .get("args")
                                        .map(|a| a.to_string()),
                                }),
                            }]),
                            ..Default::default()
                        });
                    chunks.push(StreamChunk::Chat(chunk));
                }
            }
        }
        native_finish = candidate
            .get("finishReason")
            .and_then(|r| r.as_str())
            .map(map_finish_reason);
    }

    if let Some(reason) = native_finish {
        state.finish_reason = Some(reason);
        // Tool-call streams override the native reason; silent streams keep
        // the mapped one.
        let effective = state.effective_finish_reason();
        let mut final_chunk = ChatChunk::new(state.message_id.clone(), state.model.clone());
        if let Some(reason) = effective {
            final_chunk = final_chunk.with_finish(reason);
        }
        if state.saw_usage {
            final_chunk.usage = Some(state.usage.clone());
        }
        chunks.push(StreamChunk::Chat(final_chunk));
        return Ok(FrameOutput::finish(chunks));
    }

    Ok(FrameOutput::chunks(chunks))
}
