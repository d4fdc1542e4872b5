//! LLM-backed debate participants.

use futures::future::try_join_all;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use crate::error::{DebateError, DebateResult, LlmError};
use crate::llm::{LlmProvider, Message, SamplingParams};

/// A debate participant with a persona and its own conversation memory.
///
/// The first history entry is always the system message built from the
/// persona; history only grows.
pub struct Panelist {
    id: String,
    name: String,
    persona: String,
    model_tag: String,
    client: Arc<dyn LlmProvider>,
    sampling: SamplingParams,
    history: Vec<Message>,
}

impl std::fmt::Debug for Panelist {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Panelist")
            .field("id", &self.id)
            .field("name", &self.name)
            .field("model_tag", &self.model_tag)
            .field("history_len", &self.history.len())
            .finish()
    }
}

/// Input to [`Panelist::generate_speculative`]: one prompt or a batch.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum SpeculativePrompt {
    Single(String),
    Batch(Vec<String>),
}

/// Output of [`Panelist::generate_speculative`], shaped like its input.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum SpeculativeResponse {
    Single(String),
    Batch(Vec<String>),
}

impl TryFrom<serde_json::Value> for SpeculativePrompt {
    type Error = DebateError;

    /// Accepts a JSON string or an array of strings.
    fn try_from(value: serde_json::Value) -> Result<Self, Self::Error> {
        match value {
            serde_json::Value::String(prompt) => Ok(Self::Single(prompt)),
            serde_json::Value::Array(items) => items
                .into_iter()
                .map(|item| match item {
                    serde_json::Value::String(prompt) => Ok(prompt),
                    other => Err(DebateError::InvalidInput(format!(
                        "prompt batch must contain only strings, found {}",
                        json_kind(&other)
                    ))),
                })
                .collect::<Result<Vec<_>, _>>()
                .map(Self::Batch),
            other => Err(DebateError::InvalidInput(format!(
                "prompt must be a string or a list of strings, found {}",
                json_kind(&other)
            ))),
        }
    }
}

fn json_kind(value: &serde_json::Value) -> &'static str {
    match value {
        serde_json::Value::Null => "null",
        serde_json::Value::Bool(_) => "a boolean",
        serde_json::Value::Number(_) => "a number",
        serde_json::Value::String(_) => "a string",
        serde_json::Value::Array(_) => "an array",
        serde_json::Value::Object(_) => "an object",
    }
}

impl Panelist {
    pub fn new(
        id: impl Into<String>,
        name: impl Into<String>,
        persona: impl Into<String>,
        model_tag: impl Into<String>,
        client: Arc<dyn LlmProvider>,
        system_prompt: impl Into<String>,
    ) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            persona: persona.into(),
            model_tag: model_tag.into(),
            client,
            sampling: SamplingParams::default(),
            history: vec![Message::system(system_prompt)],
        }
    }

    /// Sampling parameters applied to every generation.
    pub fn with_sampling(mut self, sampling: SamplingParams) -> Self {
        self.sampling = sampling;
        self
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn persona(&self) -> &str {
        &self.persona
    }

    pub fn model_tag(&self) -> &str {
        &self.model_tag
    }

    /// The committed conversation, system message first.
    pub fn history(&self) -> &[Message] {
        &self.history
    }

    fn with_prompt(&self, prompt: &str) -> Vec<Message> {
        let mut messages = Vec::with_capacity(self.history.len() + 1);
        messages.extend(self.history.iter().cloned());
        messages.push(Message::user(prompt));
        messages
    }

    /// Generate a reply and commit the exchange to memory.
    pub async fn generate(&mut self, prompt: &str) -> Result<String, LlmError> {
        let response = self.generate_without_commit(prompt).await?;
        self.commit(prompt, &response);
        Ok(response)
    }

    /// Generate a reply without touching memory.
    pub async fn generate_without_commit(&self, prompt: &str) -> Result<String, LlmError> {
        self.client
            .complete(self.with_prompt(prompt), self.sampling)
            .await
    }

    /// Generate one independent reply per prompt, one call at a time.
    pub async fn generate_batch_without_commit(
        &self,
        prompts: &[String],
    ) -> Result<Vec<String>, LlmError> {
        let mut responses = Vec::with_capacity(prompts.len());
        for prompt in prompts {
            responses.push(self.generate_without_commit(prompt).await?);
        }
        Ok(responses)
    }

    /// Like [`Self::generate_batch_without_commit`] but with all calls in
    /// flight at once. Results keep prompt order.
    pub async fn generate_batch_concurrent(
        &self,
        prompts: &[String],
    ) -> Result<Vec<String>, LlmError> {
        try_join_all(prompts.iter().map(|p| self.generate_without_commit(p))).await
    }

    /// Non-committing generation for either input shape.
    pub async fn generate_speculative(
        &self,
        input: SpeculativePrompt,
    ) -> DebateResult<SpeculativeResponse> {
        Ok(match input {
            SpeculativePrompt::Single(prompt) => {
                SpeculativeResponse::Single(self.generate_without_commit(&prompt).await?)
            }
            SpeculativePrompt::Batch(prompts) => {
                SpeculativeResponse::Batch(self.generate_batch_without_commit(&prompts).await?)
            }
        })
    }

    /// Append a user/assistant pair, typically the winning speculative one.
    pub fn commit(&mut self, prompt: &str, response: &str) {
        self.history.push(Message::user(prompt));
        self.history.push(Message::assistant(response));

        if tracing::enabled!(tracing::Level::DEBUG) {
            let mut log = serde_json::Map::new();
            log.insert(
                self.id.clone(),
                serde_json::json!({ "name": &self.name, "log": &self.history }),
            );
            tracing::debug!(
                panelist = %self.id,
                history = %serde_json::to_string_pretty(&log).unwrap_or_default(),
                "Panelist history updated"
            );
        }
    }
}
