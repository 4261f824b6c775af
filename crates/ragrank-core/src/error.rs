use thiserror::Error;

/// Failure kinds shared by every stage of the retrieval pipeline.
///
/// Only `MalformedQuery` (and configuration problems) reach callers of
/// `retrieve` as a hard failure. The remaining kinds describe degraded
/// outcomes and are reported alongside an empty or fallback result.
#[derive(Debug, Error)]
pub enum Error {
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Malformed query: {0}")]
    MalformedQuery(String),

    #[error("Empty corpus: no chunks available to index or search")]
    EmptyCorpus,

    #[error("Reranker model unavailable: {0}")]
    ModelUnavailable(String),

    #[error("Context budget exhausted: no chunk fits within {max_tokens} tokens")]
    BudgetExhausted { max_tokens: usize },

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Index snapshot failed: {0}")]
    Snapshot(String),
}

pub type Result<T> = std::result::Result<T, Error>;
