//! Discussion state classification.
//!
//! The judge asks an LLM to describe the current discussion state in free
//! text, embeds the answer, and snaps it to the nearest configured state
//! name. State-name embeddings are computed once at construction.

use ndarray::Array1;
use std::sync::Arc;

use crate::embedding::{argmin, euclidean_distance, Embedder};
use crate::error::{DebateError, DebateResult};
use crate::llm::{LlmProvider, Message, SamplingParams};
use crate::template::PromptTemplate;

/// Placeholder receiving the quoted comments.
pub const COMMENTS_PLACEHOLDER: &str = "__comments__";
/// Placeholder receiving the newline-joined state names.
pub const OPTIONS_PLACEHOLDER: &str = "__options__";

/// Classifies a discussion into one of a fixed set of states.
pub struct DiscussionStateJudge {
    state_names: Vec<String>,
    prompt: PromptTemplate,
    llm: Arc<dyn LlmProvider>,
    embedder: Arc<dyn Embedder>,
    state_embeddings: Vec<Array1<f64>>,
}

impl DiscussionStateJudge {
    /// Embed every state name up front.
    pub async fn new(
        state_names: Vec<String>,
        prompt: PromptTemplate,
        llm: Arc<dyn LlmProvider>,
        embedder: Arc<dyn Embedder>,
    ) -> DebateResult<Self> {
        if state_names.is_empty() {
            return Err(DebateError::InvalidInput(
                "state judge needs at least one state name".to_string(),
            ));
        }
        let state_embeddings = embedder.embed(&state_names).await?;
        if state_embeddings.len() != state_names.len() {
            return Err(crate::error::EmbeddingError::CountMismatch {
                expected: state_names.len(),
                actual: state_embeddings.len(),
            }
            .into());
        }
        tracing::debug!(
            states = ?state_names,
            model = embedder.model_name(),
            "Cached discussion state embeddings"
        );

        Ok(Self {
            state_names,
            prompt,
            llm,
            embedder,
            state_embeddings,
        })
    }

    pub fn state_names(&self) -> &[String] {
        &self.state_names
    }

    /// Fill the judging template with quoted comments and the state list.
    pub fn build_prompt(&self, previous_comments: &[String]) -> String {
        let comments = previous_comments
            .iter()
            .map(|c| format!("「{}」", c))
            .collect::<Vec<_>>()
            .join("\n");
        let options = self.state_names.join("\n");
        self.prompt.safe_substitute(&[
            (COMMENTS_PLACEHOLDER, comments.as_str()),
            (OPTIONS_PLACEHOLDER, options.as_str()),
        ])
    }

    /// Name of the state whose embedding is closest to `answer`.
    ///
    /// Ties go to the state listed first.
    pub fn nearest_state(&self, answer: &Array1<f64>) -> DebateResult<&str> {
        let distances = self
            .state_embeddings
            .iter()
            .map(|state| euclidean_distance(state, answer))
            .collect::<Result<Vec<_>, _>>()?;
        let index = argmin(&distances).ok_or_else(|| {
            DebateError::InvalidInput("no state embeddings to compare".to_string())
        })?;
        Ok(&self.state_names[index])
    }

    /// Classify the discussion so far.
    pub async fn classify(&self, previous_comments: &[String]) -> DebateResult<String> {
        let prompt = self.build_prompt(previous_comments);
        let answer = self
            .llm
            .complete(
                vec![Message::system(""), Message::user(prompt)],
                SamplingParams::default(),
            )
            .await?;

        let embedded = self.embedder.embed(std::slice::from_ref(&answer)).await?;
        let answer_embedding = embedded.into_iter().next().ok_or(
            crate::error::EmbeddingError::CountMismatch {
                expected: 1,
                actual: 0,
            },
        )?;

        let state = self.nearest_state(&answer_embedding)?.to_string();
        tracing::info!(state = %state, answer = %answer, "Judged discussion state");
        Ok(state)
    }
}
