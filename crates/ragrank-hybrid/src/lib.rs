//! ragrank-hybrid
//!
//! The online half of the pipeline: fusion of dense and sparse candidates,
//! reranking with fallback, context assembly, and the `RetrievalService` that
//! owns the index handle and runs queries.

pub mod context;
pub mod fusion;
pub mod rerank;
pub mod service;

pub use context::{build_context, content_hash, Context, ContextAssembler, ContextPassage};
pub use fusion::{fuse, normalize_dense};
pub use rerank::{apply_scores, RerankOutcome, Reranker};
pub use service::{ModelLoader, Retrieval, RetrievalService};
