//! debate-forge: multi-LLM panel debates with an embedding-scored
//! discussion strategist.
//!
//! This library provides the debate engine, the strategist that steers a
//! panelist at intervention turns, and the room/session layer that reveals a
//! transcript to websocket viewers one line at a time.

// Core modules
pub mod cli;
pub mod debate;
pub mod embedding;
pub mod error;
pub mod llm;
pub mod metrics;
pub mod server;
pub mod session;
pub mod strategy;
pub mod template;

#[cfg(test)]
mod test_support;

// Re-export commonly used error types
pub use error::{
    ConfigError, DebateError, DebateResult, EmbeddingError, LlmError, SessionError, SessionResult,
};
