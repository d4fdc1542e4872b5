//! Offline hashed feature embedder.
//!
//! Texts are mapped into a fixed number of buckets by SHA-256 hashing of
//! whitespace tokens and character bigrams/trigrams, followed by a few
//! length statistics, then L2-normalised. Character n-grams carry most of
//! the signal for Japanese text, which has no whitespace tokens.

use async_trait::async_trait;
use ndarray::Array1;
use sha2::{Digest, Sha256};

use super::Embedder;
use crate::error::EmbeddingError;

/// Default embedding dimension.
pub const DEFAULT_DIMENSION: usize = 256;

/// Deterministic embedder that needs no model or network.
#[derive(Debug, Clone)]
pub struct HashEmbedder {
    dimension: usize,
}

impl Default for HashEmbedder {
    fn default() -> Self {
        Self::new(DEFAULT_DIMENSION)
    }
}

impl HashEmbedder {
    /// Dimensions below 8 are raised to 8 so every feature block is non-empty.
    pub fn new(dimension: usize) -> Self {
        Self {
            dimension: dimension.max(8),
        }
    }

    pub fn dimension(&self) -> usize {
        self.dimension
    }

    /// Embed a single text. The empty string maps to the zero vector.
    pub fn embed_text(&self, text: &str) -> Array1<f64> {
        let mut embedding = Array1::zeros(self.dimension);

        if text.is_empty() {
            return embedding;
        }

        let text_lower = text.to_lowercase();

        // Word features
        let words: Vec<&str> = text_lower.split_whitespace().collect();
        let word_dim = self.dimension / 4;
        for word in &words {
            let pos = hash_to_index(word, word_dim);
            embedding[pos] += 1.0 / words.len() as f64;
        }

        // Character bigrams and trigrams
        let chars: Vec<char> = text_lower.chars().filter(|c| !c.is_whitespace()).collect();
        let offset = word_dim;
        let ngram_dim = self.dimension - word_dim - 3;
        for n in 2..=3 {
            for window in chars.windows(n) {
                let gram: String = window.iter().collect();
                let pos = offset + hash_to_index(&gram, ngram_dim);
                embedding[pos] += 1.0;
            }
        }
        if chars.len() == 1 {
            let pos = offset + hash_to_index(&chars[0].to_string(), ngram_dim);
            embedding[pos] += 1.0;
        }

        // Text statistics
        let stats_offset = offset + ngram_dim;
        embedding[stats_offset] = (chars.len() as f64 / 1000.0).min(1.0);
        embedding[stats_offset + 1] = (words.len() as f64 / 200.0).min(1.0);
        let avg_word_len = if words.is_empty() {
            0.0
        } else {
            words.iter().map(|w| w.chars().count()).sum::<usize>() as f64 / words.len() as f64
        };
        embedding[stats_offset + 2] = (avg_word_len / 10.0).min(1.0);

        normalize(&mut embedding);
        embedding
    }
}

#[async_trait]
impl Embedder for HashEmbedder {
    async fn embed(&self, texts: &[String]) -> Result<Vec<Array1<f64>>, EmbeddingError> {
        Ok(texts.iter().map(|t| self.embed_text(t)).collect())
    }

    fn model_name(&self) -> &str {
        "hashed-ngrams"
    }
}

/// Hashes a string to an index in [0, max_index).
fn hash_to_index(input: &str, max_index: usize) -> usize {
    if max_index == 0 {
        return 0;
    }
    let mut hasher = Sha256::new();
    hasher.update(input.as_bytes());
    let hash_bytes = hasher.finalize();
    let hash_val = ((hash_bytes[0] as u32) << 24
        | (hash_bytes[1] as u32) << 16
        | (hash_bytes[2] as u32) << 8
        | hash_bytes[3] as u32) as usize;
    hash_val % max_index
}

/// Normalizes a vector to unit length (L2 norm).
fn normalize(v: &mut Array1<f64>) {
    let norm: f64 = v.iter().map(|x| x * x).sum::<f64>().sqrt();
    if norm > 1e-10 {
        v.mapv_inplace(|x| x / norm);
    }
}
