//! In-memory chunk corpus: documents in ingestion order with their chunks.
//!
//! The corpus never touches an index. Callers mutate it with `ingest` and
//! `delete`, then hand `chunks()` to an explicit index rebuild.

use tracing::debug;

use crate::chunker::Chunker;
use crate::error::{Error, Result};
use crate::types::{Chunk, Document};

#[derive(Debug, Default)]
pub struct Corpus {
    entries: Vec<Entry>,
}

#[derive(Debug)]
struct Entry {
    document: Document,
    chunks: Vec<Chunk>,
}

impl Corpus {
    pub fn new() -> Self {
        Self::default()
    }

    /// Chunks every page of `document` and stores it, replacing any document
    /// with the same id in place. Returns the number of chunks produced.
    pub fn ingest(&mut self, document: Document, chunker: &Chunker) -> Result<usize> {
        let mut chunks = Vec::new();
        for (page_index, page) in document.pages.iter().enumerate() {
            for (ordinal, text) in chunker.chunk(page).into_iter().enumerate() {
                chunks.push(Chunk::new(&document.id, page_index, ordinal, text)?);
            }
        }
        let produced = chunks.len();
        debug!(document = %document.id, pages = document.pages.len(), chunks = produced, "ingested document");

        let entry = Entry { document, chunks };
        match self.entries.iter_mut().find(|e| e.document.id == entry.document.id) {
            Some(existing) => *existing = entry,
            None => self.entries.push(entry),
        }
        Ok(produced)
    }

    /// Removes a document and all of its chunks.
    pub fn delete(&mut self, document_id: &str) -> Result<Document> {
        let position = self
            .entries
            .iter()
            .position(|e| e.document.id == document_id)
            .ok_or_else(|| Error::NotFound(format!("document '{document_id}'")))?;
        Ok(self.entries.remove(position).document)
    }

    pub fn document(&self, document_id: &str) -> Option<&Document> {
        self.entries.iter().map(|e| &e.document).find(|d| d.id == document_id)
    }

    pub fn documents(&self) -> impl Iterator<Item = &Document> {
        self.entries.iter().map(|e| &e.document)
    }

    /// All chunks in ingestion order; this order is the sparse index's
    /// insertion order and therefore its tie-break order.
    pub fn chunks(&self) -> Vec<Chunk> {
        self.entries.iter().flat_map(|e| e.chunks.iter().cloned()).collect()
    }

    pub fn document_count(&self) -> usize {
        self.entries.len()
    }

    pub fn chunk_count(&self) -> usize {
        self.entries.iter().map(|e| e.chunks.len()).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
