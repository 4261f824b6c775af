#![deny(unused_variables)]
#![deny(unused_imports)]

//! ragrank-core
//!
//! Shared domain types, the error enum, collaborator traits, configuration and
//! the ingestion side of the pipeline (chunker, corpus, text loader).

pub mod chunker;
pub mod config;
pub mod corpus;
pub mod data_processor;
pub mod error;
pub mod traits;
pub mod types;

pub use chunker::{chunk, Chunker, ChunkingConfig};
pub use corpus::Corpus;
pub use error::{Error, Result};
pub use types::{CandidateSource, Chunk, ChunkId, Document, DocumentId, ScoredCandidate};
