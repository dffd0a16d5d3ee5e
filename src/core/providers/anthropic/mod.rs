//! Anthropic provider.

pub mod config;
pub mod provider;
pub mod streaming;
pub mod translation;

pub use config::AnthropicConfig;
pub use provider::AnthropicProvider;
