use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use serde::Serialize;
use tracing::{debug, info, warn};

use ragrank_core::config::{expand_path, RerankSettings, Settings};
use ragrank_core::error::{Error, Result};
use ragrank_core::traits::{DenseSearch, RerankerState};
use ragrank_core::types::{Chunk, ScoredCandidate};
use ragrank_text::{Bm25Params, IndexStats, RebuildOptions, SparseIndex, SparseIndexHandle};

use crate::context::{Context, ContextAssembler};
use crate::fusion::{fuse, normalize_dense};
use crate::rerank::{RerankOutcome, Reranker};

/// Resolves the reranker from settings; called at `init` and on every rebuild.
pub type ModelLoader = Box<dyn Fn(&RerankSettings) -> RerankerState + Send + Sync>;

/// Result of one `retrieve` call. `notices` lists degraded conditions
/// (empty corpus, reranker fallback, empty budget) that did not fail the query.
#[derive(Debug, Serialize)]
pub struct Retrieval {
    pub query: String,
    pub context: Context,
    pub candidates: Vec<ScoredCandidate>,
    #[serde(skip)]
    pub notices: Vec<Error>,
}

impl Retrieval {
    fn empty(query: &str, notices: Vec<Error>) -> Self {
        Self { query: query.to_string(), context: Context::default(), candidates: Vec::new(), notices }
    }

    pub fn text(&self) -> String {
        self.context.render()
    }

    /// True when the reranker fell back to the fused order.
    pub fn fell_back(&self) -> bool {
        self.notices.iter().any(|n| matches!(n, Error::ModelUnavailable(_)))
    }
}

/// Owns the sparse index handle, the dense search collaborator and the
/// reranker; every query goes through `retrieve`.
pub struct RetrievalService {
    settings: Settings,
    sparse: SparseIndexHandle,
    dense: Arc<dyn DenseSearch>,
    reranker: Reranker,
    model_loader: ModelLoader,
    assembler: ContextAssembler,
    shut_down: AtomicBool,
}

impl RetrievalService {
    pub fn init(settings: Settings, dense: Arc<dyn DenseSearch>, model_loader: ModelLoader) -> Result<Self> {
        settings.validate()?;
        let sparse = match snapshot_path(&settings) {
            Some(path) if path.is_file() => match SparseIndex::load_snapshot(&path) {
                Ok(index) => SparseIndexHandle::new(index),
                Err(e) => {
                    warn!(error = %e, "ignoring unreadable sparse snapshot; starting empty");
                    SparseIndexHandle::new(SparseIndex::empty(Bm25Params::default(), settings.sparse.remove_stopwords))
                }
            },
            _ => SparseIndexHandle::new(SparseIndex::empty(Bm25Params::default(), settings.sparse.remove_stopwords)),
        };
        let reranker = Reranker::new(
            model_loader(&settings.rerank),
            Duration::from_millis(settings.rerank.timeout_ms),
        );
        let assembler = ContextAssembler::new(settings.context);
        info!(chunks = sparse.snapshot().len(), reranker = ?reranker.state(), "retrieval service initialized");
        Ok(Self { settings, sparse, dense, reranker, model_loader, assembler, shut_down: AtomicBool::new(false) })
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    pub fn sparse_index(&self) -> &SparseIndexHandle {
        &self.sparse
    }

    pub fn reranker_state(&self) -> RerankerState {
        self.reranker.state()
    }

    /// Rebuilds the sparse index from the full chunk corpus and re-resolves the
    /// reranker. On failure the previous index stays active.
    pub fn rebuild_sparse_index(&self, chunks: &[Chunk]) -> Result<IndexStats> {
        if chunks.is_empty() {
            warn!(error = %Error::EmptyCorpus, "rebuilding sparse index over an empty corpus");
        }
        let options = RebuildOptions {
            params: Bm25Params::default(),
            remove_stopwords: self.settings.sparse.remove_stopwords,
            snapshot_path: snapshot_path(&self.settings),
        };
        let stats = self.sparse.rebuild(chunks, &options)?;
        self.reload_reranker();
        Ok(stats)
    }

    /// Re-runs the model loader; returns whether a model is now loaded.
    pub fn reload_reranker(&self) -> bool {
        let state = (self.model_loader)(&self.settings.rerank);
        let loaded = state.is_loaded();
        self.reranker.set_state(state);
        loaded
    }

    pub async fn retrieve_default(&self, query: &str) -> Result<Retrieval> {
        let d = self.settings.retrieval;
        self.retrieve(query, d.top_k_dense, d.top_k_sparse, d.final_k).await
    }

    /// End-to-end pipeline: dense and sparse search concurrently, fuse, rerank,
    /// assemble. Only a blank query fails; everything else degrades.
    pub async fn retrieve(&self, query: &str, top_k_dense: usize, top_k_sparse: usize, final_k: usize) -> Result<Retrieval> {
        if query.trim().is_empty() {
            return Err(Error::MalformedQuery("query is empty".into()));
        }
        if self.shut_down.load(Ordering::Acquire) {
            return Err(Error::InvalidInput("retrieval service has been shut down".into()));
        }
        let started = Instant::now();
        let mut notices = Vec::new();

        let index = self.sparse.snapshot();
        if index.is_empty() {
            notices.push(Error::EmptyCorpus);
        }
        let sparse_query = query.to_string();
        let sparse_task = tokio::task::spawn_blocking(move || index.search(&sparse_query, top_k_sparse));

        let dense = Arc::clone(&self.dense);
        let dense_query = query.to_string();
        let dense_task = tokio::task::spawn_blocking(move || {
            let convention = dense.convention();
            dense.similarity_search(&dense_query, top_k_dense).map(|hits| normalize_dense(hits, convention))
        });

        let (sparse_result, dense_result) = tokio::join!(sparse_task, dense_task);
        let sparse_hits = sparse_result.unwrap_or_else(|e| {
            warn!(error = %e, "sparse search task failed");
            Vec::new()
        });
        let dense_hits = match dense_result {
            Ok(Ok(hits)) => hits,
            Ok(Err(e)) => {
                warn!(error = %e, "dense search failed; continuing with sparse results");
                Vec::new()
            }
            Err(e) => {
                warn!(error = %e, "dense search task failed");
                Vec::new()
            }
        };

        if dense_hits.is_empty() && sparse_hits.is_empty() {
            debug!(query, "no candidates from either source");
            return Ok(Retrieval::empty(query, notices));
        }

        let fused = fuse(&dense_hits, &sparse_hits, &self.settings.fusion, final_k);
        let RerankOutcome { candidates, fallback } = self.reranker.rerank(query, fused, final_k).await;
        notices.extend(fallback);

        let texts: Vec<&str> = candidates.iter().map(|c| c.text.as_str()).collect();
        let context = self.assembler.assemble(&texts);
        if context.is_empty() {
            notices.push(Error::BudgetExhausted { max_tokens: self.assembler.max_tokens() });
        }

        info!(
            dense = dense_hits.len(),
            sparse = sparse_hits.len(),
            passages = context.len(),
            tokens = context.total_tokens,
            notices = notices.len(),
            elapsed_ms = started.elapsed().as_millis() as u64,
            "retrieve"
        );
        Ok(Retrieval { query: query.to_string(), context, candidates, notices })
    }

    /// Direct access to the reranking stage.
    pub async fn rerank(&self, query: &str, candidates: Vec<ScoredCandidate>, top_k: usize) -> RerankOutcome {
        self.reranker.rerank(query, candidates, top_k).await
    }

    /// Releases the model and rejects further queries.
    pub fn shutdown(&self) {
        if !self.shut_down.swap(true, Ordering::AcqRel) {
            self.reranker.set_state(RerankerState::unavailable("service shut down"));
            info!("retrieval service shut down");
        }
    }
}

fn snapshot_path(settings: &Settings) -> Option<PathBuf> {
    settings.sparse.snapshot_path.as_deref().map(expand_path)
}
