use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::types::count_words;

/// Maps texts to fixed-length vectors. Implementations must return the same
/// dimensionality on every call.
pub trait Embedder: Send + Sync {
    fn dim(&self) -> usize;
    fn embed_batch(&self, texts: &[String]) -> anyhow::Result<Vec<Vec<f32>>>;

    fn embed(&self, text: &str) -> anyhow::Result<Vec<f32>> {
        self.embed_batch(&[text.to_string()])?
            .pop()
            .ok_or_else(|| anyhow::anyhow!("embedder returned no vector"))
    }
}

/// How a dense backend orders its raw scores.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum ScoreConvention {
    /// Higher is better (cosine similarity, inner product).
    #[default]
    Similarity,
    /// Lower is better (L2 or cosine distance).
    Distance,
}

impl ScoreConvention {
    /// Normalizes a raw score to "higher is better".
    pub fn normalize(self, raw: f32) -> f32 {
        match self {
            ScoreConvention::Similarity => raw,
            ScoreConvention::Distance => 1.0 / (1.0 + raw.max(0.0)),
        }
    }
}

/// Externally owned semantic search over the chunk corpus.
pub trait DenseSearch: Send + Sync {
    fn convention(&self) -> ScoreConvention {
        ScoreConvention::Similarity
    }

    fn similarity_search(&self, query: &str, k: usize) -> anyhow::Result<Vec<(String, f32)>>;
}

/// Scores (query, passage) pairs; one scalar per passage, higher is more relevant.
pub trait RelevanceModel: Send + Sync {
    fn name(&self) -> &str;
    fn score_pairs(&self, query: &str, passages: &[String]) -> anyhow::Result<Vec<f32>>;
}

/// Reranker availability, decided when the model is loaded and not per query.
#[derive(Clone)]
pub enum RerankerState {
    Loaded(Arc<dyn RelevanceModel>),
    Unavailable { reason: String },
}

impl RerankerState {
    pub fn unavailable(reason: impl Into<String>) -> Self {
        RerankerState::Unavailable { reason: reason.into() }
    }

    pub fn is_loaded(&self) -> bool {
        matches!(self, RerankerState::Loaded(_))
    }
}

impl fmt::Debug for RerankerState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RerankerState::Loaded(model) => f.debug_tuple("Loaded").field(&model.name()).finish(),
            RerankerState::Unavailable { reason } => {
                f.debug_struct("Unavailable").field("reason", reason).finish()
            }
        }
    }
}

/// Measures text length in tokens for chunking and context budgeting.
pub trait TokenCounter: Send + Sync {
    fn count(&self, text: &str) -> usize;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct WhitespaceTokens;

impl TokenCounter for WhitespaceTokens {
    fn count(&self, text: &str) -> usize {
        count_words(text)
    }
}

impl<F> TokenCounter for F
where
    F: Fn(&str) -> usize + Send + Sync,
{
    fn count(&self, text: &str) -> usize {
        self(text)
    }
}
