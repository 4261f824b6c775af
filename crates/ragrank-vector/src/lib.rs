//! ragrank-vector
//!
//! In-process dense search adapter: embeds chunk text with any `Embedder` and
//! answers `DenseSearch` queries by brute-force comparison.

pub mod cache;
pub mod index;

pub use cache::{hash_content, EmbeddingCache};
pub use index::{InMemoryVectorIndex, Metric};
