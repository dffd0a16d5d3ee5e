//! Core gateway machinery: unified schema, provider contract, dispatch,
//! streaming engines, transport, and credential caches.

pub mod caches;
pub mod context;
pub mod dispatch;
pub mod hooks;
pub mod providers;
pub mod streaming;
pub mod traits;
pub mod transport;
pub mod types;
