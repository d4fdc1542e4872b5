//! LLM integration for debate-forge.
//!
//! Panelists and the discussion-state judge talk to chat models through the
//! [`LlmProvider`] capability. The concrete [`ChatClient`] speaks the
//! OpenAI-compatible `/chat/completions` protocol; which endpoint and model
//! version a tag maps to comes from `models.yml` via [`ModelsConfig`].
//!
//! ```ignore
//! use debate_forge::llm::{ClientFactory, LlmProvider, Message, ModelsConfig, SamplingParams};
//!
//! let models = ModelsConfig::load("configs/models.yml")?;
//! let client = models.create("OpenAI")?;
//! let text = client
//!     .complete(vec![Message::system(""), Message::user("Hello")], SamplingParams::default())
//!     .await?;
//! ```

pub mod client;
pub mod registry;

pub use client::{
    ChatClient, Choice, GenerationRequest, GenerationResponse, LlmProvider, Message,
    SamplingParams, Usage,
};
pub use registry::{
    expand_env_vars, resolve_clients, ClientFactory, ModelSettings, ModelsConfig,
};
