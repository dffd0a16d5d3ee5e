//! Streaming engines.
//!
//! Each stream is one reader task owning a mutable [`StreamState`]. The
//! drivers below run the shared loop (watch for cancellation and deadline,
//! pull wire bytes, frame them, hand frames to a provider converter, and
//! pump converted chunks through the [`StreamEmitter`]) while the converter
//! closures own everything provider-specific.

pub mod emitter;
pub mod lifecycle;
pub mod state;

pub use emitter::{open_channel, StreamEmitter};
pub use state::StreamState;

use bytes::Bytes;
use reqwest::Response;

use crate::core::transport::eventstream::{EventStreamDecoder, EventStreamFrame};
use crate::core::transport::sse::{SseFrame, SseMode, SseParser};
use crate::core::types::errors::GatewayError;
use crate::core::types::{Provider, StreamChunk};

/// What a converter produced for one wire frame.
#[derive(Debug)]
pub struct FrameOutput {
    pub chunks: Vec<StreamChunk>,
    /// True when this frame ends the stream. The last chunk (if any) is
    /// emitted as the final chunk; the reader returns without draining.
    pub done: bool,
}

impl FrameOutput {
    pub fn none() -> Self {
        Self {
            chunks: Vec::new(),
            done: false,
        }
    }

    pub fn chunk(chunk: StreamChunk) -> Self {
        Self {
            chunks: vec![chunk],
            done: false,
        }
    }

    pub fn chunks(chunks: Vec<StreamChunk>) -> Self {
        Self {
            chunks,
            done: false,
        }
    }

    pub fn finish(chunks: Vec<StreamChunk>) -> Self {
        Self { chunks, done: true }
    }
}

/// One turn of the reader loop.
enum WireEvent {
    Cancelled,
    DeadlineExceeded,
    Read(Result<Option<Bytes>, reqwest::Error>),
}

/// Emit converted chunks. Returns true when the stream must stop, either
/// because the converter flagged the final frame or the receiver went away.
async fn emit_output(emitter: &mut StreamEmitter, output: FrameOutput) -> bool {
    let FrameOutput { mut chunks, done } = output;
    if done {
        let last = chunks.pop();
        for chunk in chunks {
            if !emitter.emit(chunk).await {
                return true;
            }
        }
        if let Some(last) = last {
            emitter.emit_last(last).await;
        }
        return true;
    }
    for chunk in chunks {
        if !emitter.emit(chunk).await {
            return true;
        }
    }
    false
}

/// Drive an SSE body to completion. `convert` maps each frame to chunks and
/// flags the final one; `on_end` runs when the wire closes without an
/// explicit terminal frame and may synthesize closing chunks.
pub async fn drive_sse<C, E>(
    mut response: Response,
    mode: SseMode,
    mut emitter: StreamEmitter,
    mut convert: C,
    mut on_end: E,
) where
    C: FnMut(&mut StreamState, SseFrame) -> Result<FrameOutput, GatewayError> + Send,
    E: FnMut(&mut StreamState) -> Vec<StreamChunk> + Send,
{
    let cancel = emitter.cancellation();
    let deadline = emitter.deadline();
    let mut parser = SseParser::new(mode);

    let timeout = async move {
        match deadline {
            Some(at) => tokio::time::sleep_until(at).await,
            None => std::future::pending::<()>().await,
        }
    };
    tokio::pin!(timeout);

    loop {
        let event = tokio::select! {
            biased;
            _ = cancel.cancelled() => WireEvent::Cancelled,
            _ = &mut timeout => WireEvent::DeadlineExceeded,
            read = response.chunk() => WireEvent::Read(read),
        };

        match event {
            WireEvent::Cancelled => {
                // Close the body without draining; SSE carries no trailer
                // bytes. Exactly one terminal cancellation chunk ends the
                // stream.
                drop(response);
                emitter.fail_cancelled().await;
                return;
            }
            WireEvent::DeadlineExceeded => {
                drop(response);
                emitter.fail_timeout().await;
                return;
            }
            WireEvent::Read(Ok(Some(bytes))) => {
                for frame in parser.push(&bytes) {
                    match convert(&mut emitter.state, frame) {
                        Ok(output) => {
                            if emit_output(&mut emitter, output).await {
                                // Also covers terminal frames without a
                                // chunk ([DONE] markers).
                                emitter.close();
                                return;
                            }
                        }
                        Err(err) => {
                            emitter.fail(err).await;
                            return;
                        }
                    }
                }
            }
            WireEvent::Read(Ok(None)) => break,
            WireEvent::Read(Err(e)) => {
                emitter
                    .fail(GatewayError::decode(format!("stream read error: {}", e)))
                    .await;
                return;
            }
        }
    }

    // Wire closed without a terminal frame: let the converter close the
    // lifecycle, then close the channel.
    let closing = on_end(&mut emitter.state);
    emit_output(&mut emitter, FrameOutput::finish(closing)).await;
    emitter.close();
}

/// Drive an AWS EventStream body. After the final frame the reader returns
/// immediately: EventStream sends no trailer bytes and a drain would block
/// waiting for data past the final event.
pub async fn drive_eventstream<C, E>(
    mut response: Response,
    mut emitter: StreamEmitter,
    mut convert: C,
    mut on_end: E,
) where
    C: FnMut(&mut StreamState, EventStreamFrame) -> Result<FrameOutput, GatewayError> + Send,
    E: FnMut(&mut StreamState) -> Vec<StreamChunk> + Send,
{
    let cancel = emitter.cancellation();
    let deadline = emitter.deadline();
    let mut decoder = EventStreamDecoder::new();

    let timeout = async move {
        match deadline {
            Some(at) => tokio::time::sleep_until(at).await,
            None => std::future::pending::<()>().await,
        }
    };
    tokio::pin!(timeout);

    loop {
        let event = tokio::select! {
            biased;
            _ = cancel.cancelled() => WireEvent::Cancelled,
            _ = &mut timeout => WireEvent::DeadlineExceeded,
            read = response.chunk() => WireEvent::Read(read),
        };

        match event {
            WireEvent::Cancelled => {
                drop(response);
                emitter.fail_cancelled().await;
                return;
            }
            WireEvent::DeadlineExceeded => {
                drop(response);
                emitter.fail_timeout().await;
                return;
            }
            WireEvent::Read(Ok(Some(bytes))) => {
                let frames = match decoder.push(&bytes) {
                    Ok(frames) => frames,
                    Err(err) => {
                        emitter.fail(err).await;
                        return;
                    }
                };
                for frame in frames {
                    if frame.is_exception() {
                        emitter.fail(exception_error(&frame)).await;
                        return;
                    }
                    match convert(&mut emitter.state, frame) {
                        Ok(output) => {
                            if emit_output(&mut emitter, output).await {
                                emitter.close();
                                return;
                            }
                        }
                        Err(err) => {
                            emitter.fail(err).await;
                            return;
                        }
                    }
                }
            }
            WireEvent::Read(Ok(None)) => break,
            WireEvent::Read(Err(e)) => {
                emitter
                    .fail(GatewayError::decode(format!("stream read error: {}", e)))
                    .await;
                return;
            }
        }
    }

    let closing = on_end(&mut emitter.state);
    emit_output(&mut emitter, FrameOutput::finish(closing)).await;
    emitter.close();
}

/// Drain a chat-shaped stream into a single response. Convenience for
/// callers that asked for streaming upstream but need a unary result.
pub async fn collect_chat_stream(
    mut stream: crate::core::types::ChunkStream,
) -> Result<crate::core::types::ChatResponse, GatewayError> {
    use crate::core::types::response::{ChatChoice, ChatResponse};
    use crate::core::types::ChatMessage;
    use futures::StreamExt;

    let mut id = String::new();
    let mut model = String::new();
    let mut created = 0i64;
    let mut text = String::new();
    let mut finish_reason = None;
    let mut usage = None;
    let mut extra = crate::core::types::ResponseExtraFields::default();

    while let Some(item) = stream.next().await {
        let chunk = item?;
        if let StreamChunk::Chat(chat) = chunk {
            if id.is_empty() && !chat.id.is_empty() {
                id = chat.id.clone();
                model = chat.model.clone();
                created = chat.created;
            }
            for choice in chat.choices {
                if let Some(content) = choice.delta.content {
                    text.push_str(&content);
                }
                if let Some(reason) = choice.finish_reason {
                    finish_reason = Some(reason);
                }
            }
            if chat.usage.is_some() {
                usage = chat.usage;
            }
            extra = chat.extra_fields;
        }
    }

    Ok(ChatResponse {
        id,
        object: "chat.completion".to_string(),
        created,
        model,
        choices: vec![ChatChoice {
            index: 0,
            message: ChatMessage::assistant(text),
            finish_reason,
            logprobs: None,
        }],
        usage,
        system_fingerprint: None,
        extra_fields: extra,
    })
}

fn exception_error(frame: &EventStreamFrame) -> GatewayError {
    let message = serde_json::from_slice::<serde_json::Value>(&frame.payload)
        .ok()
        .and_then(|v| {
            v.get("message")
                .or_else(|| v.get("Message"))
                .and_then(|m| m.as_str())
                .map(str::to_string)
        })
        .unwrap_or_else(|| "event stream exception".to_string());
    let mut err = GatewayError::provider_api(Provider::Bedrock, 200, message);
    if let Some(t) = &frame.exception_type {
        err = err.with_error_type(t.clone());
    }
    err
}
