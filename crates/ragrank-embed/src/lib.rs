//! ragrank-embed
//!
//! Model backends for reranking (candle + tokenizers): a BERT cross-encoder, an
//! embedding-feature MLP scorer, and a deterministic hash embedder for offline use.

pub mod cross_encoder;
pub mod device;
pub mod feature_scorer;
pub mod hash_embedder;
pub mod loader;
pub mod tokenize;

pub use cross_encoder::CrossEncoder;
pub use device::select_device;
pub use feature_scorer::{make_features, FeatureScorer};
pub use hash_embedder::HashEmbedder;
pub use loader::load_relevance_model;
