use std::collections::HashMap;

/// Content-addressed embedding cache, keyed by the blake3 hash of a passage's
/// text. One cache belongs to one index and therefore to one embedder.
#[derive(Debug, Default)]
pub struct EmbeddingCache {
    entries: HashMap<String, Vec<f32>>,
}

pub fn hash_content(s: &str) -> String {
    blake3::hash(s.as_bytes()).to_hex().to_string()
}

impl EmbeddingCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, content_hash: &str) -> Option<&Vec<f32>> {
        self.entries.get(content_hash)
    }

    pub fn put(&mut self, content_hash: String, vector: Vec<f32>) {
        self.entries.insert(content_hash, vector);
    }

    /// Drops vectors whose hash is not in `live`.
    pub fn retain_hashes(&mut self, live: &std::collections::HashSet<String>) {
        self.entries.retain(|h, _| live.contains(h));
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
