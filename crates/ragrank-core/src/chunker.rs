//! Sentence-window chunking with a small-chunk merge pass and soft overlap.
//!
//! The pipeline is: sentence segmentation (UAX #29) → greedy windowing under
//! `max_tokens` → hard split of oversized sentences → merge of chunks below
//! `min_tokens` into their predecessor → prefix of the previous chunk's last
//! `overlap_tokens` words. Output is deterministic for identical inputs.

use serde::{Deserialize, Serialize};
use unicode_segmentation::UnicodeSegmentation;

use crate::error::{Error, Result};
use crate::traits::{TokenCounter, WhitespaceTokens};

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct ChunkingConfig {
    pub max_tokens: usize,
    pub min_tokens: usize,
    pub overlap_tokens: usize,
}

impl Default for ChunkingConfig {
    fn default() -> Self {
        Self { max_tokens: 350, min_tokens: 80, overlap_tokens: 40 }
    }
}

impl ChunkingConfig {
    pub fn new(max_tokens: usize, min_tokens: usize, overlap_tokens: usize) -> Self {
        Self { max_tokens, min_tokens, overlap_tokens }
    }

    /// Requires `max_tokens > min_tokens > 0` and `overlap_tokens < max_tokens`.
    pub fn validate(&self) -> Result<()> {
        if self.min_tokens == 0 {
            return Err(Error::InvalidConfig("chunking.min_tokens must be > 0".into()));
        }
        if self.max_tokens <= self.min_tokens {
            return Err(Error::InvalidConfig(format!(
                "chunking.max_tokens ({}) must exceed chunking.min_tokens ({})",
                self.max_tokens, self.min_tokens
            )));
        }
        if self.overlap_tokens >= self.max_tokens {
            return Err(Error::InvalidConfig(format!(
                "chunking.overlap_tokens ({}) must be below chunking.max_tokens ({})",
                self.overlap_tokens, self.max_tokens
            )));
        }
        Ok(())
    }
}

pub struct Chunker {
    config: ChunkingConfig,
    counter: Box<dyn TokenCounter>,
}

impl std::fmt::Debug for Chunker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Chunker").field("config", &self.config).finish_non_exhaustive()
    }
}

impl Chunker {
    pub fn new(config: ChunkingConfig) -> Result<Self> {
        Self::with_counter(config, Box::new(WhitespaceTokens))
    }

    /// Uses `counter` in place of whitespace word counting for window sizing
    /// and the merge threshold. Hard splits and overlap still cut on words.
    pub fn with_counter(config: ChunkingConfig, counter: Box<dyn TokenCounter>) -> Result<Self> {
        config.validate()?;
        Ok(Self { config, counter })
    }

    pub fn config(&self) -> &ChunkingConfig {
        &self.config
    }

    pub fn chunk(&self, text: &str) -> Vec<String> {
        let windows = self.window(text);
        let merged = self.merge_small(windows);
        apply_overlap(&merged, self.config.overlap_tokens)
    }

    fn window(&self, text: &str) -> Vec<String> {
        let max = self.config.max_tokens;
        let mut chunks = Vec::new();
        let mut current: Vec<&str> = Vec::new();
        let mut current_len = 0usize;

        for sentence in split_sentences(text) {
            let len = self.counter.count(sentence);
            if len > max {
                // Close the open window first so output keeps input order.
                flush(&mut chunks, &mut current);
                current_len = 0;
                chunks.extend(hard_split(sentence, max));
                continue;
            }
            if current_len + len > max && !current.is_empty() {
                flush(&mut chunks, &mut current);
                current_len = 0;
            }
            current.push(sentence);
            current_len += len;
        }
        flush(&mut chunks, &mut current);
        chunks
    }

    fn merge_small(&self, chunks: Vec<String>) -> Vec<String> {
        let mut merged: Vec<String> = Vec::with_capacity(chunks.len());
        for chunk in chunks {
            if self.counter.count(&chunk) < self.config.min_tokens {
                if let Some(previous) = merged.last_mut() {
                    previous.push(' ');
                    previous.push_str(&chunk);
                    continue;
                }
            }
            merged.push(chunk);
        }
        merged
    }
}

/// Chunks `text` with the default whitespace token counter.
pub fn chunk(
    text: &str,
    max_tokens: usize,
    min_tokens: usize,
    overlap_tokens: usize,
) -> Result<Vec<String>> {
    let chunker = Chunker::new(ChunkingConfig::new(max_tokens, min_tokens, overlap_tokens))?;
    Ok(chunker.chunk(text))
}

/// Sentences in document order, trimmed, with blank ones removed.
pub fn split_sentences(text: &str) -> Vec<&str> {
    text.unicode_sentences().map(str::trim).filter(|s| !s.is_empty()).collect()
}

fn flush(chunks: &mut Vec<String>, current: &mut Vec<&str>) {
    if current.is_empty() {
        return;
    }
    chunks.push(current.join(" "));
    current.clear();
}

fn hard_split(sentence: &str, max_words: usize) -> Vec<String> {
    let words: Vec<&str> = sentence.split_whitespace().collect();
    words.chunks(max_words.max(1)).map(|piece| piece.join(" ")).collect()
}

fn apply_overlap(chunks: &[String], overlap_tokens: usize) -> Vec<String> {
    chunks
        .iter()
        .enumerate()
        .map(|(idx, chunk)| {
            if idx == 0 || overlap_tokens == 0 {
                return chunk.clone();
            }
            let previous: Vec<&str> = chunks[idx - 1].split_whitespace().collect();
            let start = previous.len().saturating_sub(overlap_tokens);
            format!("{} {}", previous[start..].join(" "), chunk)
        })
        .collect()
}
