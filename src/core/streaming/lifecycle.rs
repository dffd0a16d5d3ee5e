//! Responses-API lifecycle synthesis.
//!
//! Providers that natively stream lifecycle events pass them through.
//! Providers that only stream deltas get the canonical sequence synthesized
//! around their text:
//!
//! `created → in_progress → item.added → content_part.added → delta* →
//! output_text.done → content_part.done → item.done → completed`
//!
//! Events are derived from state transitions; nothing is buffered except the
//! accumulated text needed for `output_text.done`.

use super::state::StreamState;
use crate::core::types::responses_api::{
    OutputContent, OutputItem, ResponsesEvent, ResponsesEventType, ResponsesResponse,
};

fn item_id(state: &StreamState) -> String {
    format!("msg_{}", state.message_id)
}

fn response_snapshot(state: &StreamState, status: &str, output: Vec<OutputItem>) -> ResponsesResponse {
    ResponsesResponse {
        id: state.message_id.clone(),
        object: "response".to_string(),
        created_at: state.created,
        status: status.to_string(),
        model: state.model.clone(),
        output,
        usage: if state.saw_usage {
            Some(state.usage.clone())
        } else {
            None
        },
        stop_reason: None,
        extra_fields: Default::default(),
    }
}

/// `response.created` then `response.in_progress`, exactly once per stream.
pub fn ensure_started(state: &mut StreamState) -> Vec<ResponsesEvent> {
    let mut events = Vec::new();
    if !state.has_emitted_created {
        state.has_emitted_created = true;
        let mut event = ResponsesEvent::new(ResponsesEventType::Created, state.next_sequence());
        event.response = Some(response_snapshot(state, "in_progress", Vec::new()));
        events.push(event);
    }
    if !state.has_emitted_in_progress {
        state.has_emitted_in_progress = true;
        let mut event = ResponsesEvent::new(ResponsesEventType::InProgress, state.next_sequence());
        event.response = Some(response_snapshot(state, "in_progress", Vec::new()));
        events.push(event);
    }
    events
}

/// `output_item.added` then `content_part.added`, exactly once before the
/// first text delta.
pub fn ensure_text_open(state: &mut StreamState) -> Vec<ResponsesEvent> {
    let mut events = Vec::new();
    if !state.text_item_added {
        state.text_item_added = true;
        let mut event =
            ResponsesEvent::new(ResponsesEventType::OutputItemAdded, state.next_sequence());
        event.output_index = Some(0);
        event.item = Some(OutputItem::Message {
            id: Some(item_id(state)),
            role: "assistant".to_string(),
            status: Some("in_progress".to_string()),
            content: Vec::new(),
        });
        events.push(event);
    }
    if !state.content_part_added {
        state.content_part_added = true;
        let mut event =
            ResponsesEvent::new(ResponsesEventType::ContentPartAdded, state.next_sequence());
        event.item_id = Some(item_id(state));
        event.output_index = Some(0);
        event.content_index = Some(0);
        event.part = Some(OutputContent::OutputText {
            text: String::new(),
            annotations: Vec::new(),
            thought_signature: None,
        });
        events.push(event);
    }
    events
}

/// Lifecycle events for one text delta, including any pending start events.
pub fn on_text_delta(state: &mut StreamState, delta: &str) -> Vec<ResponsesEvent> {
    let mut events = ensure_started(state);
    events.extend(ensure_text_open(state));
    state.record_text(delta);

    let mut event =
        ResponsesEvent::new(ResponsesEventType::OutputTextDelta, state.next_sequence());
    event.item_id = Some(item_id(state));
    event.output_index = Some(0);
    event.content_index = Some(0);
    event.delta = Some(delta.to_string());
    events.push(event);
    events
}

/// Closing sequence. Carries the full accumulated text on
/// `output_text.done` and final usage plus the normalized stop reason on
/// `response.completed`.
pub fn on_complete(state: &mut StreamState) -> Vec<ResponsesEvent> {
    let mut events = ensure_started(state);

    if state.text_item_added {
        let mut done =
            ResponsesEvent::new(ResponsesEventType::OutputTextDone, state.next_sequence());
        done.item_id = Some(item_id(state));
        done.output_index = Some(0);
        done.content_index = Some(0);
        done.text = Some(state.accumulated_text.clone());
        events.push(done);

        let mut part_done =
            ResponsesEvent::new(ResponsesEventType::ContentPartDone, state.next_sequence());
        part_done.item_id = Some(item_id(state));
        part_done.output_index = Some(0);
        part_done.content_index = Some(0);
        part_done.part = Some(OutputContent::OutputText {
            text: state.accumulated_text.clone(),
            annotations: Vec::new(),
            thought_signature: None,
        });
        events.push(part_done);

        let mut item_done =
            ResponsesEvent::new(ResponsesEventType::OutputItemDone, state.next_sequence());
        item_done.output_index = Some(0);
        item_done.item = Some(OutputItem::Message {
            id: Some(item_id(state)),
            role: "assistant".to_string(),
            status: Some("completed".to_string()),
            content: vec![OutputContent::OutputText {
                text: state.accumulated_text.clone(),
                annotations: Vec::new(),
                thought_signature: None,
            }],
        });
        events.push(item_done);
    }

    let output = if state.text_item_added {
        vec![OutputItem::Message {
            id: Some(item_id(state)),
            role: "assistant".to_string(),
            status: Some("completed".to_string()),
            content: vec![OutputContent::OutputText {
                text: state.accumulated_text.clone(),
                annotations: Vec::new(),
                thought_signature: None,
            }],
        }]
    } else {
        Vec::new()
    };

    let mut completed =
        ResponsesEvent::new(ResponsesEventType::Completed, state.next_sequence());
    let mut snapshot = response_snapshot(state, "completed", output);
    snapshot.stop_reason = state.effective_finish_reason();
    completed.response = Some(snapshot);
    events.push(completed);
    events
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::types::usage::Usage;

    fn event_types(events: &[ResponsesEvent]) -> Vec<ResponsesEventType> {
        events.iter().map(|e| e.event_type).collect()
    }

    #[test]
    fn test_canonical_order_for_text_stream() {
        let mut state = StreamState::new("gpt-4o");
        let mut all = Vec::new();
        all.extend(on_text_delta(&mut state, "Hello"));
        all.extend(on_text_delta(&mut state, " world"));
        state.record_usage(&Usage::new(3, 2));
        all.extend(on_complete(&mut state));

        assert_eq!(
            event_types(&all),
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

        // Sequence numbers are monotonic with no gaps.
        let sequences: Vec<u64> = all.iter().map(|e| e.sequence_number).collect();
        assert_eq!(sequences, (0..all.len() as u64).collect::<Vec<_>>());
    }

    #[test]
    fn test_output_text_done_carries_full_text() {
        let mut state = StreamState::new("gpt-4o");
        on_text_delta(&mut state, "Hello");
        on_text_delta(&mut state, " world");
        let events = on_complete(&mut state);
        let done = events
            .iter()
            .find(|e| e.event_type == ResponsesEventType::OutputTextDone)
            .unwrap();
        assert_eq!(done.text.as_deref(), Some("Hello world"));
    }

    #[test]
    fn test_completed_carries_usage() {
        let mut state = StreamState::new("gpt-4o");
        on_text_delta(&mut state, "hi");
        state.record_usage(&Usage::new(10, 5));
        let events = on_complete(&mut state);
        let completed = events.last().unwrap();
        let usage = completed
            .response
            .as_ref()
            .unwrap()
            .usage
            .as_ref()
            .unwrap();
        assert_eq!(usage.total_tokens, 15);
    }

    #[test]
    fn test_completed_carries_stop_reason() {
        use crate::core::types::common::FinishReason;

        let mut state = StreamState::new("m");
        on_text_delta(&mut state, "x");
        state.finish_reason = Some(FinishReason::Length);
        let events = on_complete(&mut state);
        let completed = events.last().unwrap();
        assert_eq!(
            completed.response.as_ref().unwrap().stop_reason,
            Some(FinishReason::Length)
        );

        // A stream that produced tool calls overrides the native reason.
        let mut state = StreamState::new("m");
        on_text_delta(&mut state, "x");
        state.finish_reason = Some(FinishReason::Stop);
        state.record_tool_call();
        let events = on_complete(&mut state);
        assert_eq!(
            events.last().unwrap().response.as_ref().unwrap().stop_reason,
            Some(FinishReason::ToolCalls)
        );
    }

    #[test]
    fn test_start_events_not_duplicated() {
        let mut state = StreamState::new("gpt-4o");
        let first = on_text_delta(&mut state, "a");
        assert_eq!(first.len(), 5);
        let second = on_text_delta(&mut state, "b");
        assert_eq!(second.len(), 1);
        assert_eq!(second[0].event_type, ResponsesEventType::OutputTextDelta);
    }

    #[test]
    fn test_empty_stream_completes_without_text_events() {
        let mut state = StreamState::new("gpt-4o");
        let events = on_complete(&mut state);
        assert_eq!(
            event_types(&events),
            vec![
                ResponsesEventType::Created,
                ResponsesEventType::InProgress,
                ResponsesEventType::Completed,
            ]
        );
    }
}
