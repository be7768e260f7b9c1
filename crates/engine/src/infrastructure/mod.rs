//! Infrastructure implementations.
//!
//! Contains port trait implementations for external dependencies.

pub mod anthropic;
pub mod clock;
pub mod ollama;
pub mod openai;
pub mod ports;
pub mod provider;
pub mod resilient;
pub mod speech;
pub mod store;
mod streaming;
