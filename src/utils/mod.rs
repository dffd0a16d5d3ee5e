//! Cross-cutting helpers shared by every provider implementation.

pub mod net;
