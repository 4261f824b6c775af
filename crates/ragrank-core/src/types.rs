//! Domain types used by the chunker, the sparse index and the retrieval pipeline.

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

pub type ChunkId = String;
pub type DocumentId = String;

/// One ingested source unit: an opaque id plus its page texts in order.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Document {
    pub id: DocumentId,
    pub pages: Vec<String>,
}

impl Document {
    pub fn new(id: impl Into<DocumentId>, pages: Vec<String>) -> Self {
        Self { id: id.into(), pages }
    }

    pub fn single_page(id: impl Into<DocumentId>, text: impl Into<String>) -> Self {
        Self::new(id, vec![text.into()])
    }
}

/// A contiguous span of normalized text derived from one document page.
///
/// - `chunk_id`: unique within the corpus (`"{document_id}:{page_index}:{n}"`)
/// - `document_id`: owning document
/// - `page_index`: zero-based page the text came from
/// - `text`: the passage, never empty
/// - `token_count`: whitespace word count of `text`, always at least 1
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Chunk {
    pub chunk_id: ChunkId,
    pub document_id: DocumentId,
    pub page_index: usize,
    pub text: String,
    pub token_count: usize,
}

impl Chunk {
    pub fn new(
        document_id: &str,
        page_index: usize,
        ordinal: usize,
        text: impl Into<String>,
    ) -> Result<Self> {
        let text = text.into();
        let token_count = count_words(&text);
        if token_count == 0 {
            return Err(Error::InvalidInput(format!(
                "chunk {ordinal} of {document_id} page {page_index} has no tokens"
            )));
        }
        Ok(Self {
            chunk_id: format!("{document_id}:{page_index}:{ordinal}"),
            document_id: document_id.to_string(),
            page_index,
            text,
            token_count,
        })
    }
}

/// Which pipeline stage produced a candidate's current score.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum CandidateSource {
    Dense,
    Sparse,
    Fused,
    Reranked,
}

/// A passage with a score, alive only for the duration of one query.
///
/// `score` is stage-specific but higher is always better. Dense results carry
/// no `chunk_id` because the external vector index returns inline text.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ScoredCandidate {
    pub chunk_id: Option<ChunkId>,
    pub text: String,
    pub score: f32,
    pub source: CandidateSource,
}

impl ScoredCandidate {
    pub fn new(text: impl Into<String>, score: f32, source: CandidateSource) -> Self {
        Self { chunk_id: None, text: text.into(), score, source }
    }

    pub fn with_chunk_id(mut self, chunk_id: impl Into<ChunkId>) -> Self {
        self.chunk_id = Some(chunk_id.into());
        self
    }
}

/// Whitespace-delimited word count, the default token measure.
pub fn count_words(text: &str) -> usize {
    text.split_whitespace().count()
}
