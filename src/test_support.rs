//! Test doubles shared by unit tests.

use async_trait::async_trait;
use ndarray::Array1;
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use crate::embedding::Embedder;
use crate::error::{ConfigError, EmbeddingError, LlmError};
use crate::llm::{
    ClientFactory, Choice, GenerationRequest, GenerationResponse, LlmProvider, Message, Usage,
};

type Responder = Box<dyn Fn(&GenerationRequest) -> String + Send + Sync>;

/// Mock LLM provider replaying scripted responses and recording requests.
pub(crate) struct MockLlmProvider {
    responses: Mutex<Vec<String>>,
    responder: Option<Responder>,
    pub(crate) requests: Mutex<Vec<GenerationRequest>>,
    call_count: AtomicUsize,
}

impl MockLlmProvider {
    /// Replies in order; the last reply repeats once the script runs out.
    pub(crate) fn new(responses: Vec<&str>) -> Self {
        Self {
            responses: Mutex::new(responses.into_iter().map(String::from).collect()),
            responder: None,
            requests: Mutex::new(Vec::new()),
            call_count: AtomicUsize::new(0),
        }
    }

    /// Replies computed from the request.
    pub(crate) fn with_responder(
        responder: impl Fn(&GenerationRequest) -> String + Send + Sync + 'static,
    ) -> Self {
        Self {
            responses: Mutex::new(Vec::new()),
            responder: Some(Box::new(responder)),
            requests: Mutex::new(Vec::new()),
            call_count: AtomicUsize::new(0),
        }
    }

    pub(crate) fn calls(&self) -> usize {
        self.call_count.load(Ordering::SeqCst)
    }

    /// The last user message of every request, in call order.
    pub(crate) fn user_prompts(&self) -> Vec<String> {
        self.requests
            .lock()
            .expect("lock not poisoned")
            .iter()
            .filter_map(|r| r.messages.last().map(|m| m.content.clone()))
            .collect()
    }
}

#[async_trait]
impl LlmProvider for MockLlmProvider {
    async fn generate(&self, request: GenerationRequest) -> Result<GenerationResponse, LlmError> {
        let idx = self.call_count.fetch_add(1, Ordering::SeqCst);
        let content = match &self.responder {
            Some(responder) => responder(&request),
            None => {
                let responses = self.responses.lock().expect("lock not poisoned");
                responses
                    .get(idx)
                    .cloned()
                    .unwrap_or_else(|| responses.last().cloned().unwrap_or_default())
            }
        };
        self.requests
            .lock()
            .expect("lock not poisoned")
            .push(request);

        Ok(GenerationResponse {
            id: format!("mock-{}", idx),
            model: "mock-model".to_string(),
            choices: vec![Choice {
                index: 0,
                message: Message::assistant(content),
                finish_reason: "stop".to_string(),
            }],
            usage: Usage::default(),
        })
    }
}

/// Provider whose every call fails.
pub(crate) struct FailingLlmProvider;

#[async_trait]
impl LlmProvider for FailingLlmProvider {
    async fn generate(&self, _request: GenerationRequest) -> Result<GenerationResponse, LlmError> {
        Err(LlmError::ApiError {
            code: 401,
            message: "invalid api key".to_string(),
        })
    }
}

/// Embedder with a fixed text -> vector table; unknown texts map to zeros.
pub(crate) struct TableEmbedder {
    table: HashMap<String, Vec<f64>>,
    dimension: usize,
    pub(crate) batches: Mutex<Vec<Vec<String>>>,
}

impl TableEmbedder {
    pub(crate) fn new(dimension: usize, entries: Vec<(&str, Vec<f64>)>) -> Self {
        Self {
            table: entries
                .into_iter()
                .map(|(k, v)| (k.to_string(), v))
                .collect(),
            dimension,
            batches: Mutex::new(Vec::new()),
        }
    }

    pub(crate) fn batch_count(&self) -> usize {
        self.batches.lock().expect("lock not poisoned").len()
    }
}

#[async_trait]
impl Embedder for TableEmbedder {
    async fn embed(&self, texts: &[String]) -> Result<Vec<Array1<f64>>, EmbeddingError> {
        self.batches
            .lock()
            .expect("lock not poisoned")
            .push(texts.to_vec());
        Ok(texts
            .iter()
            .map(|t| match self.table.get(t) {
                Some(v) => Array1::from(v.clone()),
                None => Array1::zeros(self.dimension),
            })
            .collect())
    }

    fn model_name(&self) -> &str {
        "table"
    }
}

/// Factory handing out one shared provider for every tag.
pub(crate) struct SharedClientFactory {
    pub(crate) provider: Arc<dyn LlmProvider>,
    pub(crate) created: Mutex<Vec<String>>,
}

impl SharedClientFactory {
    pub(crate) fn new(provider: Arc<dyn LlmProvider>) -> Self {
        Self {
            provider,
            created: Mutex::new(Vec::new()),
        }
    }
}

impl ClientFactory for SharedClientFactory {
    fn create(&self, tag: &str) -> Result<Arc<dyn LlmProvider>, ConfigError> {
        self.created
            .lock()
            .expect("lock not poisoned")
            .push(tag.to_string());
        Ok(self.provider.clone())
    }
}
