//! Immutable in-memory BM25 index over the chunk corpus.
//!
//! Build is a rayon map-reduce: each chunk is analyzed independently into term
//! frequencies, document frequencies are merged with a commutative count sum,
//! and postings are laid out in chunk insertion order. A built index is never
//! mutated; see [`crate::handle::SparseIndexHandle`] for rebuild and swap.

use std::collections::HashMap;
use std::fs::File;
use std::io::{BufReader, BufWriter, Write};
use std::path::Path;

use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use tantivy::tokenizer::TextAnalyzer;
use tracing::{debug, info};

use ragrank_core::error::{Error, Result};
use ragrank_core::types::{CandidateSource, Chunk, ChunkId, ScoredCandidate};

use crate::tantivy_utils::{analyze, build_analyzer};

const SNAPSHOT_VERSION: u32 = 1;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct Bm25Params {
    pub k1: f32,
    pub b: f32,
}

impl Default for Bm25Params {
    fn default() -> Self {
        Self { k1: 1.5, b: 0.75 }
    }
}

impl Bm25Params {
    /// `ln(1 + (N - df + 0.5) / (df + 0.5))`; always positive for `df <= N`.
    pub fn idf(corpus_size: usize, doc_freq: usize) -> f32 {
        let n = corpus_size as f32;
        let df = doc_freq as f32;
        (1.0 + (n - df + 0.5) / (df + 0.5)).ln()
    }

    /// Contribution of one query term to one chunk's score.
    pub fn term_weight(&self, idf: f32, term_frequency: u32, doc_len: u32, avgdl: f32) -> f32 {
        let tf = term_frequency as f32;
        let length_norm = 1.0 - self.b + self.b * (doc_len as f32 / avgdl.max(f32::EPSILON));
        idf * (tf * (self.k1 + 1.0)) / (tf + self.k1 * length_norm)
    }
}

/// One (chunk, term frequency) entry in a term's posting list.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct Posting {
    pub ordinal: u32,
    pub term_frequency: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct IndexedChunk {
    pub chunk_id: ChunkId,
    pub text: String,
    /// Number of analyzed terms, used as BM25 document length. Not the same
    /// as `Chunk::token_count` (whitespace words): punctuation splits and
    /// removed stop words change it.
    pub length: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct IndexStats {
    pub chunks: usize,
    pub terms: usize,
    pub avgdl: f32,
    pub generation: u64,
}

pub struct SparseIndex {
    chunks: Vec<IndexedChunk>,
    postings: HashMap<String, Vec<Posting>>,
    doc_freq: HashMap<String, u32>,
    avgdl: f32,
    params: Bm25Params,
    remove_stopwords: bool,
    analyzer: TextAnalyzer,
}

impl std::fmt::Debug for SparseIndex {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SparseIndex")
            .field("chunks", &self.chunks.len())
            .field("terms", &self.postings.len())
            .field("avgdl", &self.avgdl)
            .field("params", &self.params)
            .finish_non_exhaustive()
    }
}

impl SparseIndex {
    pub fn empty(params: Bm25Params, remove_stopwords: bool) -> Self {
        Self::build(&[], params, remove_stopwords)
    }

    pub fn build(chunks: &[Chunk], params: Bm25Params, remove_stopwords: bool) -> Self {
        let analyzer = build_analyzer(remove_stopwords);

        let analyzed: Vec<(u32, HashMap<String, u32>)> = chunks
            .par_iter()
            .map_init(|| analyzer.clone(), |analyzer, chunk| term_frequencies(analyzer, &chunk.text))
            .collect();

        let doc_freq = analyzed
            .par_iter()
            .fold(HashMap::new, |mut acc: HashMap<String, u32>, (_, tf)| {
                for term in tf.keys() {
                    *acc.entry(term.clone()).or_insert(0) += 1;
                }
                acc
            })
            .reduce(HashMap::new, merge_counts);

        let mut postings: HashMap<String, Vec<Posting>> = HashMap::with_capacity(doc_freq.len());
        let mut indexed = Vec::with_capacity(chunks.len());
        let mut total_len = 0u64;
        for (ordinal, (chunk, (length, tf))) in chunks.iter().zip(analyzed).enumerate() {
            let ordinal = ordinal as u32;
            for (term, term_frequency) in tf {
                postings.entry(term).or_default().push(Posting { ordinal, term_frequency });
            }
            total_len += u64::from(length);
            indexed.push(IndexedChunk { chunk_id: chunk.chunk_id.clone(), text: chunk.text.clone(), length });
        }
        let avgdl = if indexed.is_empty() { 0.0 } else { total_len as f32 / indexed.len() as f32 };

        debug!(chunks = indexed.len(), terms = postings.len(), avgdl, "built sparse index");
        Self { chunks: indexed, postings, doc_freq, avgdl, params, remove_stopwords, analyzer }
    }

    /// Top-`k` chunks containing at least one query term, by descending BM25
    /// score; equal scores keep insertion order. Each occurrence of a repeated
    /// query term contributes once.
    pub fn search(&self, query: &str, k: usize) -> Vec<ScoredCandidate> {
        if k == 0 || self.chunks.is_empty() {
            return Vec::new();
        }
        let mut scores: HashMap<u32, f32> = HashMap::new();
        for term in self.analyze(query) {
            let Some(postings) = self.postings.get(&term) else { continue };
            let idf = Bm25Params::idf(self.chunks.len(), postings.len());
            for posting in postings {
                let length = self.chunks[posting.ordinal as usize].length;
                *scores.entry(posting.ordinal).or_insert(0.0) +=
                    self.params.term_weight(idf, posting.term_frequency, length, self.avgdl);
            }
        }

        let mut ranked: Vec<(u32, f32)> = scores.into_iter().collect();
        ranked.sort_by(|a, b| b.1.total_cmp(&a.1).then_with(|| a.0.cmp(&b.0)));
        ranked.truncate(k);
        debug!(query, hits = ranked.len(), "sparse search");

        ranked
            .into_iter()
            .map(|(ordinal, score)| {
                let chunk = &self.chunks[ordinal as usize];
                ScoredCandidate::new(chunk.text.clone(), score, CandidateSource::Sparse)
                    .with_chunk_id(chunk.chunk_id.clone())
            })
            .collect()
    }

    /// BM25 score of a single chunk, `None` when the chunk is not indexed.
    pub fn score(&self, query: &str, chunk_id: &str) -> Option<f32> {
        let ordinal = self.chunks.iter().position(|c| c.chunk_id == chunk_id)? as u32;
        let length = self.chunks[ordinal as usize].length;
        let score = self
            .analyze(query)
            .iter()
            .filter_map(|term| {
                let postings = self.postings.get(term)?;
                let posting = postings.iter().find(|p| p.ordinal == ordinal)?;
                let idf = Bm25Params::idf(self.chunks.len(), postings.len());
                Some(self.params.term_weight(idf, posting.term_frequency, length, self.avgdl))
            })
            .sum();
        Some(score)
    }

    pub fn analyze(&self, text: &str) -> Vec<String> {
        let mut analyzer = self.analyzer.clone();
        analyze(&mut analyzer, text)
    }

    pub fn doc_freq(&self, term: &str) -> usize {
        self.doc_freq.get(term).map_or(0, |df| *df as usize)
    }

    pub fn len(&self) -> usize {
        self.chunks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.chunks.is_empty()
    }

    pub fn avgdl(&self) -> f32 {
        self.avgdl
    }

    pub fn params(&self) -> Bm25Params {
        self.params
    }

    pub fn stats(&self) -> IndexStats {
        IndexStats { chunks: self.chunks.len(), terms: self.postings.len(), avgdl: self.avgdl, generation: 0 }
    }

    /// Writes a JSON snapshot via a temp file in the target directory and an
    /// atomic rename, so a failed write never clobbers the previous snapshot.
    pub fn save_snapshot(&self, path: &Path) -> Result<()> {
        let dir = match path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent,
            _ => Path::new("."),
        };
        std::fs::create_dir_all(dir)
            .map_err(|e| Error::Snapshot(format!("create {}: {e}", dir.display())))?;
        let mut tmp = tempfile::NamedTempFile::new_in(dir)
            .map_err(|e| Error::Snapshot(format!("temp file in {}: {e}", dir.display())))?;
        {
            let mut writer = BufWriter::new(tmp.as_file_mut());
            let snapshot = SnapshotRef {
                version: SNAPSHOT_VERSION,
                params: self.params,
                remove_stopwords: self.remove_stopwords,
                avgdl: self.avgdl,
                chunks: &self.chunks,
                postings: &self.postings,
                doc_freq: &self.doc_freq,
            };
            serde_json::to_writer(&mut writer, &snapshot)
                .map_err(|e| Error::Snapshot(format!("serialize: {e}")))?;
            writer.flush().map_err(|e| Error::Snapshot(format!("flush: {e}")))?;
        }
        tmp.as_file().sync_all().map_err(|e| Error::Snapshot(format!("sync: {e}")))?;
        tmp.persist(path).map_err(|e| Error::Snapshot(format!("persist {}: {}", path.display(), e.error)))?;
        info!(path = %path.display(), chunks = self.chunks.len(), "saved sparse index snapshot");
        Ok(())
    }

    pub fn load_snapshot(path: &Path) -> Result<Self> {
        let file = File::open(path).map_err(|e| Error::Snapshot(format!("open {}: {e}", path.display())))?;
        let snapshot: Snapshot = serde_json::from_reader(BufReader::new(file))
            .map_err(|e| Error::Snapshot(format!("parse {}: {e}", path.display())))?;
        if snapshot.version != SNAPSHOT_VERSION {
            return Err(Error::Snapshot(format!(
                "unsupported snapshot version {} (expected {SNAPSHOT_VERSION})",
                snapshot.version
            )));
        }
        let index = Self {
            chunks: snapshot.chunks,
            postings: snapshot.postings,
            doc_freq: snapshot.doc_freq,
            avgdl: snapshot.avgdl,
            params: snapshot.params,
            remove_stopwords: snapshot.remove_stopwords,
            analyzer: build_analyzer(snapshot.remove_stopwords),
        };
        index.check_consistency()?;
        info!(path = %path.display(), chunks = index.len(), "loaded sparse index snapshot");
        Ok(index)
    }

    /// Every posting points at an indexed chunk and the df table matches the postings.
    fn check_consistency(&self) -> Result<()> {
        let n = self.chunks.len();
        if self.doc_freq.len() != self.postings.len() {
            return Err(Error::Snapshot("document-frequency table does not match postings".into()));
        }
        for (term, postings) in &self.postings {
            if postings.iter().any(|p| p.ordinal as usize >= n) {
                return Err(Error::Snapshot(format!("posting for '{term}' references a missing chunk")));
            }
            if self.doc_freq.get(term).map(|df| *df as usize) != Some(postings.len()) {
                return Err(Error::Snapshot(format!("document frequency for '{term}' is inconsistent")));
            }
        }
        Ok(())
    }
}

#[derive(Serialize)]
struct SnapshotRef<'a> {
    version: u32,
    params: Bm25Params,
    remove_stopwords: bool,
    avgdl: f32,
    chunks: &'a [IndexedChunk],
    postings: &'a HashMap<String, Vec<Posting>>,
    doc_freq: &'a HashMap<String, u32>,
}

#[derive(Deserialize)]
struct Snapshot {
    version: u32,
    params: Bm25Params,
    remove_stopwords: bool,
    avgdl: f32,
    chunks: Vec<IndexedChunk>,
    postings: HashMap<String, Vec<Posting>>,
    doc_freq: HashMap<String, u32>,
}

fn term_frequencies(analyzer: &mut TextAnalyzer, text: &str) -> (u32, HashMap<String, u32>) {
    let terms = analyze(analyzer, text);
    let mut tf: HashMap<String, u32> = HashMap::new();
    for term in &terms {
        *tf.entry(term.clone()).or_insert(0) += 1;
    }
    (terms.len() as u32, tf)
}

fn merge_counts(mut left: HashMap<String, u32>, right: HashMap<String, u32>) -> HashMap<String, u32> {
    for (term, count) in right {
        *left.entry(term).or_insert(0) += count;
    }
    left
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn idf_matches_reference_values() {
        // N = 3, df = 2 -> ln(1 + 1.5 / 2.5)
        assert!((Bm25Params::idf(3, 2) - 1.6f32.ln()).abs() < 1e-6);
        assert!(Bm25Params::idf(3, 3) > 0.0);
    }

    #[test]
    fn merge_counts_is_order_independent() {
        let a: HashMap<String, u32> = [("x".to_string(), 2), ("y".to_string(), 1)].into();
        let b: HashMap<String, u32> = [("x".to_string(), 1), ("z".to_string(), 4)].into();
        assert_eq!(merge_counts(a.clone(), b.clone()), merge_counts(b, a));
    }
}
