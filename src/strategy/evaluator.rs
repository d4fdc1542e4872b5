//! Embedding-distance reward for candidate discussions.

use std::sync::Arc;

use crate::embedding::{rms_distance, Embedder};
use crate::error::{DebateResult, EmbeddingError};

/// Scores hypothetical discussion continuations.
///
/// The score of a discussion is `impact * penalty` where
///
/// - `impact` is the RMS distance between the embedding of every segment
///   but the last and the embedding of all segments, i.e. how far the newest
///   comment moves the conversation;
/// - `penalty` is `exp(-d)` with `d` the RMS distance between the last two
///   segments. With fewer than two segments both sides are empty strings and
///   the penalty is exactly 1.
#[derive(Clone)]
pub struct DiscussionEvaluator {
    embedder: Arc<dyn Embedder>,
}

impl DiscussionEvaluator {
    pub fn new(embedder: Arc<dyn Embedder>) -> Self {
        Self { embedder }
    }

    /// Score every discussion. Issues two batched embed calls in total.
    pub async fn score(&self, discussions: &[Vec<String>]) -> DebateResult<Vec<f64>> {
        if discussions.is_empty() {
            return Ok(Vec::new());
        }
        let n = discussions.len();

        let mut impact_inputs = Vec::with_capacity(2 * n);
        impact_inputs.extend(discussions.iter().map(|d| prior_text(d)));
        impact_inputs.extend(discussions.iter().map(|d| d.concat()));

        let mut coherence_inputs = Vec::with_capacity(2 * n);
        let pairs: Vec<(String, String)> = discussions.iter().map(|d| last_pair(d)).collect();
        coherence_inputs.extend(pairs.iter().map(|(last, _)| last.clone()));
        coherence_inputs.extend(pairs.into_iter().map(|(_, new)| new));

        let impact_vectors = self.embed_exact(&impact_inputs).await?;
        let coherence_vectors = self.embed_exact(&coherence_inputs).await?;

        let mut scores = Vec::with_capacity(n);
        for i in 0..n {
            let impact = rms_distance(&impact_vectors[i], &impact_vectors[n + i])?;
            let distance = rms_distance(&coherence_vectors[i], &coherence_vectors[n + i])?;
            let penalty = (-distance).exp();
            scores.push(impact * penalty);
        }

        tracing::trace!(scores = ?scores, "Scored candidate discussions");
        Ok(scores)
    }

    async fn embed_exact(&self, texts: &[String]) -> DebateResult<Vec<ndarray::Array1<f64>>> {
        let vectors = self.embedder.embed(texts).await?;
        if vectors.len() != texts.len() {
            return Err(EmbeddingError::CountMismatch {
                expected: texts.len(),
                actual: vectors.len(),
            }
            .into());
        }
        Ok(vectors)
    }
}

fn prior_text(segments: &[String]) -> String {
    let end = segments.len().saturating_sub(1);
    segments[..end].concat()
}

/// `(previous, newest)` segments, or two empty strings for short discussions.
fn last_pair(segments: &[String]) -> (String, String) {
    match segments {
        [.., last, new] => (last.clone(), new.clone()),
        _ => (String::new(), String::new()),
    }
}
