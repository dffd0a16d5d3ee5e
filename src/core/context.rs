//! Per-request context.
//!
//! Crosscutting concerns ride here instead of on function signatures:
//! cancellation, deadlines, opt-in flags set by surrounding orchestration,
//! out-of-band values (pre-fetched auth tokens), and the stream-end
//! indicator observable after a stream's channel closes.

use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

use crate::core::transport::LargeResponseBody;

/// Context key under which a pre-fetched SAP AI Core bearer token may be
/// supplied, bypassing the token cache for this request.
pub const SAP_AI_CORE_AUTH_TOKEN_KEY: &str = "sap-ai-core-authorization-token";

#[derive(Clone)]
pub struct RequestContext {
    pub request_id: String,
    cancellation: CancellationToken,
    deadline: Option<tokio::time::Instant>,
    send_back_raw_response: bool,
    send_back_raw_request: bool,
    large_response_threshold: Option<usize>,
    values: Arc<Mutex<HashMap<String, serde_json::Value>>>,
    stream_done: Arc<AtomicBool>,
    large_response: Arc<Mutex<Option<LargeResponseBody>>>,
}

impl Default for RequestContext {
    fn default() -> Self {
        Self {
            request_id: uuid::Uuid::new_v4().to_string(),
            cancellation: CancellationToken::new(),
            deadline: None,
            send_back_raw_response: false,
            send_back_raw_request: false,
            large_response_threshold: None,
            values: Arc::new(Mutex::new(HashMap::new())),
            stream_done: Arc::new(AtomicBool::new(false)),
            large_response: Arc::new(Mutex::new(None)),
        }
    }
}

impl RequestContext {
    pub fn new() -> Self {
        Self::default()
    }

    /// Derive the context's cancellation from an existing token, so a parent
    /// scope can cancel this request along with its siblings.
    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancellation = token;
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.deadline = Some(tokio::time::Instant::now() + timeout);
        self
    }

    pub fn with_raw_response(mut self, enabled: bool) -> Self {
        self.send_back_raw_response = enabled;
        self
    }

    pub fn with_raw_request(mut self, enabled: bool) -> Self {
        self.send_back_raw_request = enabled;
        self
    }

    pub fn with_large_response_threshold(mut self, bytes: usize) -> Self {
        self.large_response_threshold = Some(bytes);
        self
    }

    pub fn with_value(self, key: impl Into<String>, value: serde_json::Value) -> Self {
        self.values.lock().insert(key.into(), value);
        self
    }

    pub fn cancel(&self) {
        self.cancellation.cancel();
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancellation.is_cancelled()
    }

    /// Resolves when the caller cancels.
    pub async fn cancelled(&self) {
        self.cancellation.cancelled().await
    }

    /// Owned handle to this context's cancellation, for select loops that
    /// must not borrow the context across await points.
    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancellation.clone()
    }

    pub fn deadline(&self) -> Option<tokio::time::Instant> {
        self.deadline
    }

    pub fn should_send_back_raw_response(&self) -> bool {
        self.send_back_raw_response
    }

    pub fn should_send_back_raw_request(&self) -> bool {
        self.send_back_raw_request
    }

    pub fn large_response_threshold(&self) -> Option<usize> {
        self.large_response_threshold
    }

    pub fn value(&self, key: &str) -> Option<serde_json::Value> {
        self.values.lock().get(key).cloned()
    }

    pub fn set_value(&self, key: impl Into<String>, value: serde_json::Value) {
        self.values.lock().insert(key.into(), value);
    }

    /// Pre-fetched SAP AI Core token, when the orchestrator supplied one.
    pub fn sap_auth_token(&self) -> Option<String> {
        self.value(SAP_AI_CORE_AUTH_TOKEN_KEY)
            .and_then(|v| v.as_str().map(str::to_string))
    }

    /// Set by the stream reader task when the final chunk has been pushed.
    pub fn mark_stream_done(&self) {
        self.stream_done.store(true, Ordering::SeqCst);
    }

    pub fn stream_done(&self) -> bool {
        self.stream_done.load(Ordering::SeqCst)
    }

    pub fn stash_large_response(&self, body: LargeResponseBody) {
        *self.large_response.lock() = Some(body);
    }

    /// Take the oversized-response handle, if the transport stashed one.
    pub fn take_large_response(&self) -> Option<LargeResponseBody> {
        self.large_response.lock().take()
    }
}

impl std::fmt::Debug for RequestContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RequestContext")
            .field("request_id", &self.request_id)
            .field("cancelled", &self.is_cancelled())
            .field("stream_done", &self.stream_done())
            .finish()
    }
}
