//! Lifecycle synthesis over gateway backends.
//!
//! None of the SAP backends stream Responses-API events natively; they
//! stream deltas in their own formats. These converters extract text deltas
//! and usage from each backend's frames and synthesize the canonical
//! lifecycle around them.

use crate::core::providers::bedrock::translation as bedrock_translation;
use crate::core::providers::gemini::translation as gemini_translation;
use crate::core::streaming::{lifecycle, FrameOutput, StreamState};
use crate::core::transport::eventstream::EventStreamFrame;
use crate::core::transport::sse::SseFrame;
use crate::core::types::errors::{GatewayError, Result};
use crate::core::types::response::ChatChunk;
use crate::core::types::responses_api::ResponsesEvent;
use crate::core::types::StreamChunk;

fn wrap(events: Vec<ResponsesEvent>) -> Vec<StreamChunk> {
    events.into_iter().map(StreamChunk::Responses).collect()
}

/// Closing events when the wire ends without an explicit terminal frame.
pub fn close_lifecycle(state: &mut StreamState) -> Vec<StreamChunk> {
    wrap(lifecycle::on_complete(state))
}

/// Bedrock Converse frames → lifecycle events.
pub fn convert_bedrock_frame(
    state: &mut StreamState,
    frame: EventStreamFrame,
) -> Result<FrameOutput> {
    let payload: serde_json::Value = serde_json::from_slice(&frame.payload)
        .map_err(|e| GatewayError::decode(format!("malformed converse frame: {}", e)))?;

    match frame.event_type.as_deref().unwrap_or_default() {
        "messageStart" => Ok(FrameOutput::chunks(wrap(lifecycle::ensure_started(state)))),
        "contentBlockDelta" => {
            let Some(text) = payload.pointer("/delta/text").and_then(|t| t.as_str()) else {
                return Ok(FrameOutput::none());
            };
            Ok(FrameOutput::chunks(wrap(lifecycle::on_text_delta(
                state, text,
            ))))
        }
        "messageStop" => {
            if let Some(reason) = payload.get("stopReason").and_then(|r| r.as_str()) {
                state.finish_reason = Some(bedrock_translation::map_stop_reason(reason));
            }
            Ok(FrameOutput::none())
        }
        "metadata" => {
            if let Some(usage) = payload.get("usage") {
                state.record_usage(&bedrock_translation::convert_usage(usage));
            }
            Ok(FrameOutput::finish(wrap(lifecycle::on_complete(state))))
        }
        _ => Ok(FrameOutput::none()),
    }
}

/// Gemini SSE fragments → lifecycle events.
pub fn convert_vertex_frame(state: &mut StreamState, frame: SseFrame) -> Result<FrameOutput> {
    let data = match frame {
        SseFrame::Done => return Ok(FrameOutput::finish(wrap(lifecycle::on_complete(state)))),
        SseFrame::Event { data, .. } => data,
    };
    let value: serde_json::Value = serde_json::from_str(&data)
        .map_err(|e| GatewayError::decode(format!("malformed stream fragment: {}", e)))?;

    if let Some(metadata) = value.get("usageMetadata") {
        state.record_usage(&gemini_translation::convert_usage(metadata));
    }

    let mut chunks = Vec::new();
    let mut finished = false;
    if let Some(candidate) = value
        .get("candidates")
        .and_then(|c| c.as_array())
        .and_then(|c| c.first())
    {
        if let Some(parts) = candidate.pointer("/content/parts").and_then(|p| p.as_array()) {
            for part in parts {
                if let Some(text) = part.get("text").and_then(|t| t.as_str()) {
                    chunks.extend(wrap(lifecycle::on_text_delta(state, text)));
                }
            }
        }
        if let Some(reason) = candidate.get("finishReason").and_then(|r| r.as_str()) {
            state.finish_reason = Some(gemini_translation::map_finish_reason(reason));
            finished = true;
        }
    }

    if finished {
        chunks.extend(wrap(lifecycle::on_complete(state)));
        return Ok(FrameOutput::finish(chunks));
    }
    Ok(FrameOutput::chunks(chunks))
}

/// OpenAI-format chat chunks → lifecycle events.
pub fn convert_openai_frame(state: &mut StreamState, frame: SseFrame) -> Result<FrameOutput> {
    let data = match frame {
        SseFrame::Done => return Ok(FrameOutput::finish(wrap(lifecycle::on_complete(state)))),
        SseFrame::Event { data, .. } => data,
    };
    let chunk: ChatChunk = serde_json::from_str(&data)
        .map_err(|e| GatewayError::decode(format!("malformed stream chunk: {}", e)))?;

    if !chunk.id.is_empty() {
        state.message_id = chunk.id.clone();
    }
    if let Some(usage) = &chunk.usage {
        state.record_usage(usage);
    }

    let mut chunks = Vec::new();
    for choice in &chunk.choices {
        if let Some(text) = &choice.delta.content {
            chunks.extend(wrap(lifecycle::on_text_delta(state, text)));
        }
        if let Some(reason) = &choice.finish_reason {
            state.finish_reason = Some(reason.clone());
        }
    }
    Ok(FrameOutput::chunks(chunks))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::types::responses_api::ResponsesEventType;
    use bytes::Bytes;

    fn es_frame(event_type: &str, payload: serde_json::Value) -> EventStreamFrame {
        EventStreamFrame {
            event_type: Some(event_type.to_string()),
            exception_type: None,
            message_type: Some("event".to_string()),
            payload: Bytes::from(payload.to_string()),
        }
    }

    fn types_of(chunks: &[StreamChunk]) -> Vec<ResponsesEventType> {
        chunks
            .iter()
            .map(|chunk| match chunk {
                StreamChunk::Responses(event) => event.event_type,
                _ => panic!("expected responses event"),
            })
            .collect()
    }

    #[test]
    fn test_bedrock_lifecycle_sequence() {
        let mut state = StreamState::new("anthropic--claude-3-sonnet");
        let mut all = Vec::new();

        let out = convert_bedrock_frame(&mut state, es_frame("messageStart", serde_json::json!({"role": "assistant"}))).unwrap();
        all.extend(out.chunks);
        let out = convert_bedrock_frame(
            &mut state,
            es_frame("contentBlockDelta", serde_json::json!({"delta": {"text": "Hello"}})),
        )
        .unwrap();
        all.extend(out.chunks);
        let out = convert_bedrock_frame(
            &mut state,
            es_frame("contentBlockDelta", serde_json::json!({"delta": {"text": " world"}})),
        )
        .unwrap();
        all.extend(out.chunks);
        let out = convert_bedrock_frame(
            &mut state,
            es_frame("messageStop", serde_json::json!({"stopReason": "end_turn"})),
        )
        .unwrap();
        all.extend(out.chunks);
        let out = convert_bedrock_frame(
            &mut state,
            es_frame(
                "metadata",
                serde_json::json!({"usage": {"inputTokens": 7, "outputTokens": 2, "totalTokens": 9}}),
            ),
        )
        .unwrap();
        assert!(out.done);
        all.extend(out.chunks);

        assert_eq!(
            types_of(&all),
            vec![
                ResponsesEventType::Created,
                ResponsesEventType::InProgress,
                ResponsesEventType::OutputItemAdded,
                ResponsesEventType::ContentPartAdded,
                ResponsesEventType::OutputTextDelta,
                ResponsesEventType::OutputTextDelta,
                ResponsesEventType::OutputTextDone,
                ResponsesEventType::ContentPartDone,
                ResponsesEventType::OutputItemDone,
                ResponsesEventType::Completed,
            ]
        );

        // output_text.done carries the accumulated text; completed carries
        // final usage.
        let done = all
            .iter()
            .find_map(|chunk| match chunk {
                StreamChunk::Responses(event)
                    if event.event_type == ResponsesEventType::OutputTextDone =>
                {
                    Some(event)
                }
                _ => None,
            })
            .unwrap();
        assert_eq!(done.text.as_deref(), Some("Hello world"));

        let completed = match all.last().unwrap() {
            StreamChunk::Responses(event) => event,
            _ => panic!(),
        };
        assert_eq!(
            completed
                .response
                .as_ref()
                .unwrap()
                .usage
                .as_ref()
                .unwrap()
                .total_tokens,
            9
        );
    }

    #[test]
    fn test_openai_frame_lifecycle() {
        let mut state = StreamState::new("gpt-4o");
        let out = convert_openai_frame(
            &mut state,
            SseFrame::Event {
                event: None,
                data: r#"{"id":"c1","object":"chat.completion.chunk","created":1,"model":"gpt-4o","choices":[{"index":0,"delta":{"content":"Hi"}}]}"#.to_string(),
            },
        )
        .unwrap();
        // created, in_progress, item.added, part.added, delta
        assert_eq!(out.chunks.len(), 5);

        let out = convert_openai_frame(&mut state, SseFrame::Done).unwrap();
        assert!(out.done);
        assert_eq!(
            types_of(&out.chunks),
            vec![
                ResponsesEventType::OutputTextDone,
                ResponsesEventType::ContentPartDone,
                ResponsesEventType::OutputItemDone,
                ResponsesEventType::Completed,
            ]
        );
    }

    #[test]
    fn test_vertex_frame_finishes_on_reason() {
        let mut state = StreamState::new("gemini-1.5-pro");
        let out = convert_vertex_frame(
            &mut state,
            SseFrame::Event {
                event: None,
                data: serde_json::json!({
                    "candidates": [{"content": {"parts": [{"text": "done"}]}, "finishReason": "STOP"}],
                    "usageMetadata": {"promptTokenCount": 3, "candidatesTokenCount": 1, "totalTokenCount": 4}
                })
                .to_string(),
            },
        )
        .unwrap();
        assert!(out.done);
        let last = match out.chunks.last().unwrap() {
            StreamChunk::Responses(event) => event,
            _ => panic!(),
        };
        assert_eq!(last.event_type, ResponsesEventType::Completed);
    }
}
