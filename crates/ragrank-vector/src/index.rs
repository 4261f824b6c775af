use anyhow::{anyhow, Result};
use indicatif::{ProgressBar, ProgressStyle};
use parking_lot::RwLock;
use std::collections::HashSet;
use std::sync::Arc;
use tracing::{debug, info};

use ragrank_core::traits::{DenseSearch, Embedder, ScoreConvention};
use ragrank_core::types::{Chunk, ChunkId};

use crate::cache::{hash_content, EmbeddingCache};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Metric {
    /// Cosine similarity, higher is better.
    #[default]
    Cosine,
    /// Euclidean distance, lower is better.
    L2,
}

struct Entry {
    chunk_id: ChunkId,
    text: String,
    vector: Vec<f32>,
}

/// Brute-force vector search over chunk embeddings.
///
/// Rebuilt from the corpus like the sparse index. Embeddings are cached by
/// content hash so a rebuild only embeds new or changed passages.
pub struct InMemoryVectorIndex {
    embedder: Arc<dyn Embedder>,
    metric: Metric,
    batch_size: usize,
    entries: RwLock<Arc<Vec<Entry>>>,
    cache: RwLock<EmbeddingCache>,
}

impl InMemoryVectorIndex {
    pub fn new(embedder: Arc<dyn Embedder>) -> Self {
        Self {
            embedder,
            metric: Metric::Cosine,
            batch_size: 64,
            entries: RwLock::new(Arc::new(Vec::new())),
            cache: RwLock::new(EmbeddingCache::new()),
        }
    }

    pub fn with_metric(mut self, metric: Metric) -> Self {
        self.metric = metric;
        self
    }

    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size.max(1);
        self
    }

    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn cached_vectors(&self) -> usize {
        self.cache.read().len()
    }

    /// Replaces the indexed passages with `chunks`, embedding only texts not
    /// already cached. Returns the number of newly embedded passages.
    pub fn index(&self, chunks: &[Chunk], show_progress: bool) -> Result<usize> {
        let hashes: Vec<String> = chunks.iter().map(|c| hash_content(&c.text)).collect();
        let mut pending: Vec<(String, String)> = Vec::new();
        {
            let cache = self.cache.read();
            let mut seen = HashSet::new();
            for (chunk, hash) in chunks.iter().zip(&hashes) {
                if cache.get(hash).is_none() && seen.insert(hash.clone()) {
                    pending.push((hash.clone(), chunk.text.clone()));
                }
            }
        }

        let pb = if show_progress { ProgressBar::new(pending.len() as u64) } else { ProgressBar::hidden() };
        pb.set_style(
            ProgressStyle::default_bar()
                .template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} passages {msg}")?
                .progress_chars("#>-"),
        );
        let dim = self.embedder.dim();
        let mut fresh = Vec::with_capacity(pending.len());
        for batch in pending.chunks(self.batch_size) {
            let texts: Vec<String> = batch.iter().map(|(_, text)| text.clone()).collect();
            let vectors = self.embedder.embed_batch(&texts)?;
            if vectors.len() != texts.len() {
                return Err(anyhow!("embedder returned {} vectors for {} texts", vectors.len(), texts.len()));
            }
            for ((hash, _), vector) in batch.iter().zip(vectors) {
                if vector.len() != dim {
                    return Err(anyhow!("embedding dimension {} does not match {}", vector.len(), dim));
                }
                fresh.push((hash.clone(), vector));
            }
            pb.inc(batch.len() as u64);
        }
        pb.finish_and_clear();

        let embedded = fresh.len();
        let mut cache = self.cache.write();
        for (hash, vector) in fresh {
            cache.put(hash, vector);
        }
        let mut entries = Vec::with_capacity(chunks.len());
        for (chunk, hash) in chunks.iter().zip(&hashes) {
            let vector = cache.get(hash).cloned().ok_or_else(|| anyhow!("missing embedding for {}", chunk.chunk_id))?;
            entries.push(Entry { chunk_id: chunk.chunk_id.clone(), text: chunk.text.clone(), vector });
        }
        let live: HashSet<String> = hashes.into_iter().collect();
        cache.retain_hashes(&live);
        drop(cache);

        *self.entries.write() = Arc::new(entries);
        info!(passages = chunks.len(), embedded, "dense index rebuilt");
        Ok(embedded)
    }

    /// Top-`k` `(chunk_id, raw score)` pairs for a query vector, best first;
    /// ties keep insertion order.
    pub fn search_vector(&self, query: &[f32], k: usize) -> Vec<(ChunkId, String, f32)> {
        let entries = Arc::clone(&self.entries.read());
        let mut scored: Vec<(usize, f32)> = entries
            .iter()
            .enumerate()
            .map(|(i, e)| (i, self.raw_score(query, &e.vector)))
            .collect();
        match self.metric {
            Metric::Cosine => scored.sort_by(|a, b| b.1.total_cmp(&a.1).then_with(|| a.0.cmp(&b.0))),
            Metric::L2 => scored.sort_by(|a, b| a.1.total_cmp(&b.1).then_with(|| a.0.cmp(&b.0))),
        }
        scored.truncate(k);
        scored
            .into_iter()
            .map(|(i, score)| (entries[i].chunk_id.clone(), entries[i].text.clone(), score))
            .collect()
    }

    fn raw_score(&self, a: &[f32], b: &[f32]) -> f32 {
        match self.metric {
            Metric::Cosine => {
                let dot: f32 = a.iter().zip(b).map(|(x, y)| x * y).sum();
                let na = a.iter().map(|x| x * x).sum::<f32>().sqrt();
                let nb = b.iter().map(|x| x * x).sum::<f32>().sqrt();
                if na == 0.0 || nb == 0.0 { 0.0 } else { dot / (na * nb) }
            }
            Metric::L2 => a.iter().zip(b).map(|(x, y)| (x - y) * (x - y)).sum::<f32>().sqrt(),
        }
    }
}

impl DenseSearch for InMemoryVectorIndex {
    fn convention(&self) -> ScoreConvention {
        match self.metric {
            Metric::Cosine => ScoreConvention::Similarity,
            Metric::L2 => ScoreConvention::Distance,
        }
    }

    fn similarity_search(&self, query: &str, k: usize) -> Result<Vec<(String, f32)>> {
        if k == 0 || self.is_empty() {
            return Ok(Vec::new());
        }
        let q = self.embedder.embed(query)?;
        let hits = self.search_vector(&q, k);
        debug!(query, hits = hits.len(), "dense search");
        Ok(hits.into_iter().map(|(_, text, score)| (text, score)).collect())
    }
}
