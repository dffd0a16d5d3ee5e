//! SAP AI Core gateway provider.
//!
//! Deployments behind SAP AI Core serve three different wire formats; this
//! provider resolves the model to a running deployment, classifies its
//! backend, and routes through the matching translator family.

pub mod config;
pub mod provider;
pub mod responses_stream;

pub use config::SapAiCoreConfig;
pub use provider::SapAiCoreProvider;
