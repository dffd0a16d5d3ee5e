//! Responses API translation for the OpenAI wire format.

use crate::core::context::RequestContext;
use crate::core::providers::openai_compat::{attach_raw, is_reasoning_model, merge_extra_params};
use crate::core::streaming::{FrameOutput, StreamState};
use crate::core::transport::sse::SseFrame;
use crate::core::types::errors::{GatewayError, Result};
use crate::core::types::responses_api::{
    ResponsesEvent, ResponsesEventType, ResponsesRequest, ResponsesResponse,
};
use crate::core::types::StreamChunk;

pub fn build_responses_payload(request: &ResponsesRequest, stream: bool) -> Result<serde_json::Value> {
    if request.input.is_empty() {
        return Err(GatewayError::operation("responses input must not be empty"));
    }

    let mut payload = serde_json::json!({
        "model": request.model,
        "input": request.input,
    });

    let params = &request.params;
    if !is_reasoning_model(&request.model) {
        if let Some(temperature) = params.temperature {
            if let Some(n) = serde_json::Number::from_f64(temperature) {
                payload["temperature"] = serde_json::Value::Number(n);
            }
        }
    }
    if let Some(top_p) = params.top_p {
        if let Some(n) = serde_json::Number::from_f64(top_p) {
            payload["top_p"] = serde_json::Value::Number(n);
        }
    }
    if let Some(max_output_tokens) = params.max_output_tokens {
        payload["max_output_tokens"] = max_output_tokens.into();
    }
    if let Some(instructions) = &params.instructions {
        payload["instructions"] = instructions.clone().into();
    }
    if let Some(tools) = &params.tools {
        payload["tools"] = serde_json::to_value(tools)?;
    }
    if let Some(tool_choice) = &params.tool_choice {
        payload["tool_choice"] = serde_json::to_value(tool_choice)?;
    }
    if let Some(reasoning) = &params.reasoning {
        payload["reasoning"] = reasoning.clone();
    }
    if let Some(include) = &params.include {
        payload["include"] = serde_json::to_value(include)?;
    }
    if stream {
        payload["stream"] = true.into();
    }
    merge_extra_params(&mut payload, &params.extra_params);
    Ok(payload)
}

pub fn parse_responses_response(ctx: &RequestContext, body: &[u8]) -> Result<ResponsesResponse> {
    let mut response: ResponsesResponse = serde_json::from_slice(body)
        .map_err(|e| GatewayError::decode(format!("malformed responses body: {}", e)))?;
    attach_raw(ctx, &mut response.extra_fields, body);
    Ok(response)
}

/// Pass through one native lifecycle event. The provider already streams the
/// canonical sequence; the gateway re-stamps sequence numbers so they stay
/// monotonic even when intermediate events are dropped, tracks usage, and
/// flags the terminal event.
pub fn convert_responses_frame(
    state: &mut StreamState,
    frame: SseFrame,
) -> Result<FrameOutput> {
    let data = match frame {
        SseFrame::Done => return Ok(FrameOutput::finish(Vec::new())),
        SseFrame::Event { data, .. } => data,
    };

    let value: serde_json::Value = serde_json::from_str(&data)
        .map_err(|e| GatewayError::decode(format!("malformed responses event: {}", e)))?;

    // Unknown event types (audio deltas, tool-call argument deltas not yet
    // surfaced) are skipped, not errors.
    let Ok(mut event) = serde_json::from_value::<ResponsesEvent>(value) else {
        return Ok(FrameOutput::none());
    };

    event.sequence_number = state.next_sequence();

    match event.event_type {
        ResponsesEventType::Created => state.has_emitted_created = true,
        ResponsesEventType::InProgress => state.has_emitted_in_progress = true,
        ResponsesEventType::OutputItemAdded => state.text_item_added = true,
        ResponsesEventType::ContentPartAdded => state.content_part_added = true,
        ResponsesEventType::OutputTextDelta => {
            if let Some(delta) = &event.delta {
                state.record_text(delta);
            }
        }
        ResponsesEventType::Completed | ResponsesEventType::Failed => {
            if let Some(response) = &event.response {
                if !response.id.is_empty() {
                    state.message_id = response.id.clone();
                }
                if let Some(usage) = &response.usage {
                    state.record_usage(usage);
                }
            }
            return Ok(FrameOutput::finish(vec![StreamChunk::Responses(event)]));
        }
        _ => {}
    }

    if let Some(response) = &event.response {
        if !response.id.is_empty() {
            state.message_id = response.id.clone();
        }
    }

    Ok(FrameOutput::chunk(StreamChunk::Responses(event)))
}
