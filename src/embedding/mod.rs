//! Text embeddings for the discussion strategist.
//!
//! The state judge and the evaluator both need a deterministic
//! `text -> vector` capability. It is injected as an [`Embedder`] so one
//! backend instance can be shared by both:
//!
//! - [`HttpEmbedder`] calls an OpenAI-compatible `/embeddings` endpoint
//!   (hosted, or a local text-embeddings server).
//! - [`HashEmbedder`] is an offline hashed bag-of-features embedder used when
//!   no endpoint is configured and in tests.
//!
//! ```ignore
//! use debate_forge::embedding::{Embedder, HashEmbedder, rms_distance};
//!
//! let embedder = HashEmbedder::new(256);
//! let vectors = embedder.embed(&["賛成です".to_string(), "反対です".to_string()]).await?;
//! let d = rms_distance(&vectors[0], &vectors[1])?;
//! ```

pub mod distance;
pub mod hashed;
pub mod http;

use async_trait::async_trait;
use ndarray::Array1;

use crate::error::EmbeddingError;

pub use distance::{argmax, argmin, euclidean_distance, rms_distance};
pub use hashed::HashEmbedder;
pub use http::HttpEmbedder;

/// Converts texts into fixed-length vectors.
///
/// Implementations must be deterministic for a fixed model and input, and
/// must return exactly one vector per input, in input order.
#[async_trait]
pub trait Embedder: Send + Sync {
    /// Embed a batch of texts.
    async fn embed(&self, texts: &[String]) -> Result<Vec<Array1<f64>>, EmbeddingError>;

    /// Identifier of the underlying model, for logs.
    fn model_name(&self) -> &str;
}
