//! # unigate
//!
//! Core of a unified multi-provider LLM gateway: a request-routing,
//! format-translation, streaming, and credential-resolution layer between a
//! caller and a family of remote inference providers (OpenAI, Anthropic,
//! Azure, Bedrock, Vertex, Cohere, Gemini, HuggingFace, Nebius, ZAI,
//! SAP AI Core, and arbitrary OpenAI-compatible endpoints).
//!
//! Callers issue requests against a provider-agnostic schema; the core
//! dispatches them to the correct backend with the right authentication,
//! URL shape, payload encoding, and streaming protocol, and translates
//! responses back to the unified schema.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use unigate::core::dispatch::Dispatcher;
//! use unigate::core::context::RequestContext;
//! use unigate::core::providers::anthropic::{AnthropicConfig, AnthropicProvider};
//! use unigate::core::types::{ChatMessage, ChatParams, ChatRequest, Key, Provider};
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let mut dispatcher = Dispatcher::new();
//!     dispatcher.register(Arc::new(AnthropicProvider::new(AnthropicConfig::default())?));
//!
//!     let request = ChatRequest {
//!         provider: Provider::Anthropic,
//!         model: "claude-3-5-sonnet-20241022".to_string(),
//!         input: vec![ChatMessage::user("What is the capital of France?")],
//!         params: ChatParams::default(),
//!     };
//!
//!     let ctx = RequestContext::new();
//!     let key = Key::new("sk-ant-...");
//!     let response = dispatcher.chat_completion(&ctx, &key, request).await?;
//!     println!("{:?}", response.choices[0].message.content);
//!     Ok(())
//! }
//! ```
//!
//! The process-wide scheduler, plugin engine, HTTP surface, configuration
//! loading, and key-selection policy are collaborators of this crate, not
//! part of it. The only extension seam exposed here is the per-chunk
//! post-hook applied inside the streaming pipeline.

#![warn(clippy::all)]
#![allow(clippy::module_inception)]
#![allow(clippy::too_many_arguments)]
#![allow(clippy::result_large_err)]

pub mod core;
pub mod utils;

// Re-export the surface collaborators actually consume.
pub use crate::core::context::RequestContext;
pub use crate::core::dispatch::Dispatcher;
pub use crate::core::hooks::PostHookRunner;
pub use crate::core::traits::provider::LlmProvider;
pub use crate::core::types::errors::{ErrorKind, GatewayError, Result};
pub use crate::core::types::{GatewayRequest, GatewayResponse, Key, Provider, RequestType};
