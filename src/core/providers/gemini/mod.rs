//! Google Gemini provider (AI Studio binding).
//!
//! The translation and streaming conversion here are shared with the Vertex
//! binding; only URL shape and auth differ between the two.

pub mod config;
pub mod provider;
pub mod streaming;
pub mod translation;

pub use config::GeminiConfig;
pub use provider::GeminiProvider;
