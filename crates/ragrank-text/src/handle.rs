use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Instant;

use parking_lot::{Mutex, RwLock};
use tracing::{info, warn};

use ragrank_core::error::Result;
use ragrank_core::types::Chunk;

use crate::index::{Bm25Params, IndexStats, SparseIndex};

#[derive(Debug, Clone, Default)]
pub struct RebuildOptions {
    pub params: Bm25Params,
    pub remove_stopwords: bool,
    pub snapshot_path: Option<PathBuf>,
}

/// Shared owner of the current sparse index.
///
/// Queries take an `Arc` snapshot and search it without holding any lock, so a
/// query always sees exactly one index version. A rebuild constructs the new
/// index off to the side and swaps the pointer; rebuilds are serialized.
pub struct SparseIndexHandle {
    current: RwLock<Arc<SparseIndex>>,
    generation: AtomicU64,
    rebuild_lock: Mutex<()>,
}

impl std::fmt::Debug for SparseIndexHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SparseIndexHandle")
            .field("generation", &self.generation())
            .field("chunks", &self.snapshot().len())
            .finish()
    }
}

impl Default for SparseIndexHandle {
    fn default() -> Self {
        Self::new(SparseIndex::empty(Bm25Params::default(), false))
    }
}

impl SparseIndexHandle {
    pub fn new(index: SparseIndex) -> Self {
        Self {
            current: RwLock::new(Arc::new(index)),
            generation: AtomicU64::new(0),
            rebuild_lock: Mutex::new(()),
        }
    }

    pub fn snapshot(&self) -> Arc<SparseIndex> {
        Arc::clone(&self.current.read())
    }

    pub fn generation(&self) -> u64 {
        self.generation.load(Ordering::Acquire)
    }

    pub fn stats(&self) -> IndexStats {
        IndexStats { generation: self.generation(), ..self.snapshot().stats() }
    }

    /// Publishes `index` and returns the new generation.
    pub fn replace(&self, index: SparseIndex) -> u64 {
        let next = Arc::new(index);
        let mut current = self.current.write();
        *current = next;
        self.generation.fetch_add(1, Ordering::AcqRel) + 1
    }

    /// Builds a fresh index from `chunks` and swaps it in. When a snapshot path
    /// is configured the new index is persisted first; if that fails the
    /// previous index stays current.
    pub fn rebuild(&self, chunks: &[Chunk], options: &RebuildOptions) -> Result<IndexStats> {
        let _guard = self.rebuild_lock.lock();
        let started = Instant::now();
        let index = SparseIndex::build(chunks, options.params, options.remove_stopwords);

        if let Some(path) = &options.snapshot_path {
            if let Err(e) = index.save_snapshot(path) {
                warn!(error = %e, "sparse rebuild aborted; keeping previous index");
                return Err(e);
            }
        }

        let stats = index.stats();
        let generation = self.replace(index);
        info!(
            chunks = stats.chunks,
            terms = stats.terms,
            generation,
            elapsed_ms = started.elapsed().as_millis() as u64,
            "sparse index rebuilt"
        );
        Ok(IndexStats { generation, ..stats })
    }
}
