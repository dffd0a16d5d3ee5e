//! The post-hook seam.
//!
//! The plugin engine lives outside this crate; what it hands us is a single
//! function applied to every chunk inside the streaming pipeline, before the
//! chunk is pushed onto the output channel. The hook may mutate, wrap, or
//! replace the chunk (or the error).

use std::sync::Arc;

use crate::core::context::RequestContext;
use crate::core::types::errors::GatewayError;
use crate::core::types::StreamChunk;

/// The result type flowing through a stream channel.
pub type StreamResult = Result<StreamChunk, GatewayError>;

/// Caller-supplied per-chunk hook.
pub type PostHookRunner = Arc<dyn Fn(&RequestContext, StreamResult) -> StreamResult + Send + Sync>;

/// Identity hook for callers that don't install one.
pub fn noop_post_hook() -> PostHookRunner {
    Arc::new(|_ctx, item| item)
}
