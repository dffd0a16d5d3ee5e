//! The channel pump: stamps, hooks, and pushes chunks.

use tokio::sync::mpsc;

use super::state::StreamState;
use crate::core::context::RequestContext;
use crate::core::hooks::{PostHookRunner, StreamResult};
use crate::core::types::common::{Provider, RequestType, DEFAULT_STREAM_BUFFER_SIZE};
use crate::core::types::errors::GatewayError;
use crate::core::types::{ChunkStream, StreamChunk};

/// Open the bounded stream channel. The receiver half goes back to the
/// caller; the sender half feeds a [`StreamEmitter`] inside the reader task.
pub fn open_channel() -> (mpsc::Sender<StreamResult>, ChunkStream) {
    let (tx, rx) = mpsc::channel(DEFAULT_STREAM_BUFFER_SIZE);
    (tx, ChunkStream::new(rx))
}

/// Owns the sending half of a stream: applies per-chunk metadata, runs the
/// post-hook, and pushes onto the bounded channel. A full channel blocks the
/// send, which blocks the reader, which blocks the wire.
pub struct StreamEmitter {
    tx: mpsc::Sender<StreamResult>,
    ctx: RequestContext,
    post_hook: PostHookRunner,
    pub state: StreamState,
    provider: Provider,
    model_requested: String,
    request_type: RequestType,
}

impl StreamEmitter {
    pub fn new(
        tx: mpsc::Sender<StreamResult>,
        ctx: RequestContext,
        post_hook: PostHookRunner,
        provider: Provider,
        model_requested: impl Into<String>,
        request_type: RequestType,
        state: StreamState,
    ) -> Self {
        Self {
            tx,
            ctx,
            post_hook,
            state,
            provider,
            model_requested: model_requested.into(),
            request_type,
        }
    }

    /// Owned cancellation handle for the reader's select loop.
    pub fn cancellation(&self) -> tokio_util::sync::CancellationToken {
        self.ctx.cancellation_token()
    }

    pub fn deadline(&self) -> Option<tokio::time::Instant> {
        self.ctx.deadline()
    }

    fn stamp(&mut self, chunk: &mut StreamChunk, final_chunk: bool) {
        let now = tokio::time::Instant::now();
        let latency = if final_chunk {
            now.duration_since(self.state.start)
        } else {
            now.duration_since(self.state.last_chunk)
        };
        self.state.last_chunk = now;

        let extra = chunk.extra_fields_mut();
        extra.provider = Some(self.provider.clone());
        extra.model_requested = Some(self.model_requested.clone());
        extra.request_type = Some(self.request_type);
        extra.chunk_index = Some(self.state.chunk_index);
        extra.latency_ms = Some(latency.as_millis() as u64);
        self.state.chunk_index += 1;
    }

    /// Emit one intermediate chunk. Returns false when the receiver is gone
    /// and the reader should stop.
    pub async fn emit(&mut self, mut chunk: StreamChunk) -> bool {
        self.stamp(&mut chunk, false);
        let item = (self.post_hook)(&self.ctx, Ok(chunk));
        self.tx.send(item).await.is_ok()
    }

    /// Emit the final chunk: overall stream latency is stamped and the
    /// context's stream-end indicator is set before the send.
    pub async fn emit_last(&mut self, mut chunk: StreamChunk) -> bool {
        self.stamp(&mut chunk, true);
        self.ctx.mark_stream_done();
        let item = (self.post_hook)(&self.ctx, Ok(chunk));
        self.tx.send(item).await.is_ok()
    }

    /// Emit a terminal error chunk. Exactly one of these ends a failed
    /// stream; the channel closes when the emitter is dropped afterwards.
    pub async fn fail(&mut self, err: GatewayError) {
        let err = err.contextualize(&self.provider, &self.model_requested, self.request_type);
        self.ctx.mark_stream_done();
        let item = (self.post_hook)(&self.ctx, Err(err));
        let _ = self.tx.send(item).await;
    }

    /// Terminal error for caller cancellation.
    pub async fn fail_cancelled(&mut self) {
        self.fail(GatewayError::cancelled()).await;
    }

    /// Terminal error for deadline exceeded.
    pub async fn fail_timeout(&mut self) {
        self.fail(GatewayError::timeout()).await;
    }

    /// Mark the stream done without emitting anything further. Used when the
    /// wire ended after the converter already produced its final chunk.
    pub fn close(self) {
        self.ctx.mark_stream_done();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::hooks::noop_post_hook;
    use crate::core::types::response::ChatChunk;
    use tokio_stream::StreamExt;

    fn emitter_pair() -> (StreamEmitter, ChunkStream) {
        let (tx, rx) = open_channel();
        let emitter = StreamEmitter::new(
            tx,
            RequestContext::new(),
            noop_post_hook(),
            Provider::OpenAi,
            "gpt-4o",
            RequestType::ChatCompletionStream,
            StreamState::new("gpt-4o"),
        );
        (emitter, rx)
    }

    #[tokio::test]
    async fn test_chunk_index_monotonic() {
        let (mut emitter, mut rx) = emitter_pair();
        for _ in 0..3 {
            assert!(emitter.emit(StreamChunk::Chat(ChatChunk::new("id", "m"))).await);
        }
        drop(emitter);

        let mut indices = Vec::new();
        while let Some(item) = rx.next().await {
            indices.push(item.unwrap().extra_fields().chunk_index.unwrap());
        }
        assert_eq!(indices, vec![0, 1, 2]);
    }

    #[tokio::test]
    async fn test_last_chunk_sets_stream_done() {
        let (tx, mut rx) = open_channel();
        let ctx = RequestContext::new();
        let mut emitter = StreamEmitter::new(
            tx,
            ctx.clone(),
            noop_post_hook(),
            Provider::OpenAi,
            "gpt-4o",
            RequestType::ChatCompletionStream,
            StreamState::new("gpt-4o"),
        );
        assert!(!ctx.stream_done());
        emitter.emit_last(StreamChunk::Chat(ChatChunk::new("id", "m"))).await;
        drop(emitter);
        assert!(ctx.stream_done());
        assert!(rx.next().await.is_some());
        // Channel closed after the final chunk.
        assert!(rx.next().await.is_none());
    }

    #[tokio::test]
    async fn test_metadata_stamped() {
        let (mut emitter, mut rx) = emitter_pair();
        emitter.emit(StreamChunk::Chat(ChatChunk::new("id", "m"))).await;
        drop(emitter);
        let chunk = rx.next().await.unwrap().unwrap();
        let extra = chunk.extra_fields();
        assert_eq!(extra.provider, Some(Provider::OpenAi));
        assert_eq!(extra.model_requested.as_deref(), Some("gpt-4o"));
        assert_eq!(extra.request_type, Some(RequestType::ChatCompletionStream));
        assert!(extra.latency_ms.is_some());
    }

    #[tokio::test]
    async fn test_fail_emits_single_terminal_error() {
        let (mut emitter, mut rx) = emitter_pair();
        emitter.fail_cancelled().await;
        drop(emitter);
        let err = rx.next().await.unwrap().unwrap_err();
        assert_eq!(err.kind, crate::core::types::errors::ErrorKind::RequestCancelled);
        assert_eq!(err.provider, Some(Provider::OpenAi));
        assert!(rx.next().await.is_none());
    }
}
