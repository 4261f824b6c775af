use serde::Serialize;
use std::collections::HashSet;
use std::fmt;
use tracing::debug;

use ragrank_core::config::ContextSettings;
use ragrank_core::traits::{TokenCounter, WhitespaceTokens};

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ContextPassage {
    /// 1-based position in the context.
    pub position: usize,
    pub text: String,
    pub token_count: usize,
}

/// Deduplicated passages in rank order, within the token budget.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Context {
    pub passages: Vec<ContextPassage>,
    pub total_tokens: usize,
}

impl Context {
    pub fn is_empty(&self) -> bool {
        self.passages.is_empty()
    }

    pub fn len(&self) -> usize {
        self.passages.len()
    }

    pub fn texts(&self) -> Vec<String> {
        self.passages.iter().map(|p| p.text.clone()).collect()
    }

    /// `[CHUNK i]\n<text>` blocks separated by a blank line.
    pub fn render(&self) -> String {
        self.passages
            .iter()
            .map(|p| format!("[CHUNK {}]\n{}", p.position, p.text))
            .collect::<Vec<_>>()
            .join("\n\n")
    }
}

impl fmt::Display for Context {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.render())
    }
}

pub fn normalize_whitespace(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// blake3 digest of the whitespace-normalized text.
pub fn content_hash(text: &str) -> blake3::Hash {
    blake3::hash(normalize_whitespace(text).as_bytes())
}

pub struct ContextAssembler {
    max_tokens: usize,
    min_chunk_tokens: usize,
    counter: Box<dyn TokenCounter>,
}

impl ContextAssembler {
    pub fn new(settings: ContextSettings) -> Self {
        Self::with_counter(settings, WhitespaceTokens)
    }

    pub fn with_counter(settings: ContextSettings, counter: impl TokenCounter + 'static) -> Self {
        Self {
            max_tokens: settings.max_tokens,
            min_chunk_tokens: settings.min_chunk_tokens,
            counter: Box::new(counter),
        }
    }

    pub fn max_tokens(&self) -> usize {
        self.max_tokens
    }

    /// Dedupe by content hash (first wins), drop passages under
    /// `min_chunk_tokens`, then take passages in order until the next one
    /// would overflow `max_tokens`.
    pub fn assemble<S: AsRef<str>>(&self, ranked: &[S]) -> Context {
        let mut seen = HashSet::new();
        let mut passages = Vec::new();
        let mut total_tokens = 0usize;
        for text in ranked.iter().map(AsRef::as_ref) {
            if !seen.insert(content_hash(text)) {
                continue;
            }
            let token_count = self.counter.count(text);
            if token_count < self.min_chunk_tokens {
                continue;
            }
            if total_tokens + token_count > self.max_tokens {
                break;
            }
            total_tokens += token_count;
            passages.push(ContextPassage { position: passages.len() + 1, text: text.to_string(), token_count });
        }
        debug!(input = ranked.len(), kept = passages.len(), total_tokens, "assembled context");
        Context { passages, total_tokens }
    }
}

/// Formatted context for `ranked` using whitespace token counts.
pub fn build_context<S: AsRef<str>>(ranked: &[S], max_tokens: usize, min_chunk_tokens: usize) -> String {
    ContextAssembler::new(ContextSettings { max_tokens, min_chunk_tokens }).assemble(ranked).render()
}
