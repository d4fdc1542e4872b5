//! OpenAI-compatible `/embeddings` client.

use async_trait::async_trait;
use ndarray::Array1;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::{Duration, Instant};

use super::Embedder;
use crate::error::EmbeddingError;
use crate::metrics::MetricsCollector;

const REQUEST_TIMEOUT_SECS: u64 = 60;
/// Sent in place of an empty text, which the endpoints reject.
const BLANK_INPUT: &str = " ";

/// Embedding client for `{api_base}/embeddings`.
///
/// Texts longer than `max_chars` are truncated from the left, so the most
/// recent part of an accumulated conversation is what gets embedded.
/// Empty texts are embedded as a single space.
pub struct HttpEmbedder {
    api_base: String,
    api_key: Option<String>,
    model: String,
    max_chars: Option<usize>,
    dimensions: Option<usize>,
    http_client: Client,
}

impl std::fmt::Debug for HttpEmbedder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HttpEmbedder")
            .field("api_base", &self.api_base)
            .field("model", &self.model)
            .field("max_chars", &self.max_chars)
            .finish()
    }
}

impl HttpEmbedder {
    pub fn new(
        api_base: impl Into<String>,
        api_key: Option<String>,
        model: impl Into<String>,
    ) -> Result<Self, EmbeddingError> {
        let http_client = Client::builder()
            .timeout(Duration::from_secs(REQUEST_TIMEOUT_SECS))
            .build()
            .map_err(|e| EmbeddingError::RequestFailed(e.to_string()))?;
        Ok(Self {
            api_base: api_base.into().trim_end_matches('/').to_string(),
            api_key,
            model: model.into(),
            max_chars: None,
            dimensions: None,
            http_client,
        })
    }

    /// Keep at most `max_chars` trailing characters of each input.
    pub fn with_max_chars(mut self, max_chars: Option<usize>) -> Self {
        self.max_chars = max_chars.filter(|n| *n > 0);
        self
    }

    /// Request reduced-dimension embeddings from models that support it.
    pub fn with_dimensions(mut self, dimensions: Option<usize>) -> Self {
        self.dimensions = dimensions;
        self
    }

    async fn request(&self, inputs: Vec<String>) -> Result<Vec<Array1<f64>>, EmbeddingError> {
        let expected = inputs.len();
        let body = ApiRequest {
            model: &self.model,
            input: inputs,
            dimensions: self.dimensions,
        };

        let mut http_request = self
            .http_client
            .post(format!("{}/embeddings", self.api_base))
            .header("Content-Type", "application/json");
        if let Some(ref api_key) = self.api_key {
            http_request = http_request.header("Authorization", format!("Bearer {}", api_key));
        }

        let response = http_request
            .json(&body)
            .send()
            .await
            .map_err(|e| EmbeddingError::RequestFailed(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let message = response
                .text()
                .await
                .unwrap_or_else(|_| "Failed to read error response".to_string());
            return Err(EmbeddingError::ApiError {
                code: status.as_u16(),
                message,
            });
        }

        let mut parsed: ApiResponse = response
            .json()
            .await
            .map_err(|e| EmbeddingError::MalformedResponse(e.to_string()))?;
        if parsed.data.len() != expected {
            return Err(EmbeddingError::CountMismatch {
                expected,
                actual: parsed.data.len(),
            });
        }
        parsed.data.sort_by_key(|d| d.index);
        Ok(parsed
            .data
            .into_iter()
            .map(|d| Array1::from(d.embedding))
            .collect())
    }
}

fn request_input(text: &str, max_chars: Option<usize>) -> String {
    if text.is_empty() {
        BLANK_INPUT.to_string()
    } else {
        truncate_left(text, max_chars)
    }
}

/// Keep the last `max_chars` characters of `text`.
fn truncate_left(text: &str, max_chars: Option<usize>) -> String {
    match max_chars {
        Some(max) => {
            let count = text.chars().count();
            if count <= max {
                text.to_string()
            } else {
                text.chars().skip(count - max).collect()
            }
        }
        None => text.to_string(),
    }
}

#[async_trait]
impl Embedder for HttpEmbedder {
    async fn embed(&self, texts: &[String]) -> Result<Vec<Array1<f64>>, EmbeddingError> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }
        let inputs = texts
            .iter()
            .map(|t| request_input(t, self.max_chars))
            .collect();

        let started = Instant::now();
        let result = self.request(inputs).await;
        MetricsCollector::new().record_embedding_request(
            &self.model,
            result.is_ok(),
            started.elapsed().as_secs_f64(),
        );
        result
    }

    fn model_name(&self) -> &str {
        &self.model
    }
}

#[derive(Debug, Serialize)]
struct ApiRequest<'a> {
    model: &'a str,
    input: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    dimensions: Option<usize>,
}

#[derive(Debug, Deserialize)]
struct ApiResponse {
    data: Vec<ApiEmbedding>,
}

#[derive(Debug, Deserialize)]
struct ApiEmbedding {
    #[serde(default)]
    index: usize,
    embedding: Vec<f64>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::{routing::post, Json, Router};
    use std::sync::{Arc, Mutex};

    #[test]
    fn test_truncate_left_keeps_tail() {
        assert_eq!(truncate_left("abcdef", Some(3)), "def");
        assert_eq!(truncate_left("議論ログ", Some(2)), "ログ");
        assert_eq!(truncate_left("abc", Some(10)), "abc");
        assert_eq!(truncate_left("abc", None), "abc");
    }

    /// Serve `/embeddings` locally, recording each request's inputs and
    /// answering with `[len, 1.0]` per input.
    async fn recording_endpoint() -> (String, Arc<Mutex<Vec<Vec<String>>>>) {
        let seen: Arc<Mutex<Vec<Vec<String>>>> = Arc::default();
        let recorder = Arc::clone(&seen);
        let app = Router::new().route(
            "/embeddings",
            post(move |Json(body): Json<serde_json::Value>| {
                let recorder = Arc::clone(&recorder);
                async move {
                    let inputs: Vec<String> =
                        serde_json::from_value(body["input"].clone()).unwrap();
                    let data: Vec<_> = inputs
                        .iter()
                        .enumerate()
                        .map(|(i, t)| {
                            serde_json::json!({"index": i, "embedding": [t.chars().count() as f64, 1.0]})
                        })
                        .collect();
                    recorder.lock().unwrap().push(inputs);
                    Json(serde_json::json!({"data": data}))
                }
            }),
        );
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        (format!("http://{}", addr), seen)
    }

    #[tokio::test]
    async fn test_empty_inputs_are_embedded_by_the_model() {
        let (api_base, seen) = recording_endpoint().await;
        let embedder = HttpEmbedder::new(api_base, None, "text-embedding-3-small")
            .unwrap()
            .with_max_chars(Some(3));

        let texts = vec![String::new(), "abcdef".to_string(), String::new()];
        let vectors = embedder.embed(&texts).await.unwrap();

        assert_eq!(*seen.lock().unwrap(), vec![vec![" ", "def", " "]]);
        assert_eq!(vectors.len(), 3);
        assert_eq!(vectors[0].to_vec(), vec![1.0, 1.0]);
        assert_eq!(vectors[1].to_vec(), vec![3.0, 1.0]);
        assert!(vectors.iter().all(|v| v.iter().any(|x| *x != 0.0)));
    }

    #[tokio::test]
    async fn test_no_texts_skip_request() {
        // Unroutable base: any request would fail.
        let embedder = HttpEmbedder::new("http://127.0.0.1:9", None, "m").unwrap();
        assert!(embedder.embed(&[]).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_request_failure_surfaces() {
        let embedder = HttpEmbedder::new("http://127.0.0.1:9", None, "m").unwrap();
        let result = embedder.embed(&["hello".to_string()]).await;
        assert!(matches!(result, Err(EmbeddingError::RequestFailed(_))));
    }

    #[test]
    fn test_request_serialization_skips_dimensions() {
        let body = ApiRequest {
            model: "m",
            input: vec!["x".to_string()],
            dimensions: None,
        };
        let json = serde_json::to_string(&body).unwrap();
        assert!(!json.contains("dimensions"));
    }

    #[test]
    fn test_response_parse() {
        let raw = r#"{"object":"list","data":[{"index":1,"embedding":[0.5]},{"index":0,"embedding":[0.25]}],"model":"m"}"#;
        let mut parsed: ApiResponse = serde_json::from_str(raw).unwrap();
        parsed.data.sort_by_key(|d| d.index);
        assert_eq!(parsed.data[0].embedding, vec![0.25]);
    }
}
