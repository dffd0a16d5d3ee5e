//! Azure OpenAI provider.

pub mod provider;

pub use provider::{AzureConfig, AzureProvider};
