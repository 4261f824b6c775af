//! ragrank-text
//!
//! Lexical side of retrieval: an in-memory BM25 index over chunk text, built
//! with tantivy's analyzers, plus the handle that rebuilds and swaps it.

pub mod handle;
pub mod index;
pub mod tantivy_utils;

pub use handle::{RebuildOptions, SparseIndexHandle};
pub use index::{Bm25Params, IndexStats, SparseIndex};
