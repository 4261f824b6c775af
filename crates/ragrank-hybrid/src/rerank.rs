//! Reranking stage: scores the fused pool with the loaded relevance model and
//! falls back to the fused order whenever the model cannot produce a full,
//! finite score vector in time.

use parking_lot::RwLock;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, warn};

use ragrank_core::error::Error;
use ragrank_core::traits::{RelevanceModel, RerankerState};
use ragrank_core::types::{CandidateSource, ScoredCandidate};

#[derive(Debug)]
pub struct RerankOutcome {
    pub candidates: Vec<ScoredCandidate>,
    /// Set when the fused order was kept instead of model scores.
    pub fallback: Option<Error>,
}

impl RerankOutcome {
    pub fn is_fallback(&self) -> bool {
        self.fallback.is_some()
    }
}

pub struct Reranker {
    state: RwLock<RerankerState>,
    timeout: Duration,
}

impl Reranker {
    pub fn new(state: RerankerState, timeout: Duration) -> Self {
        Self { state: RwLock::new(state), timeout }
    }

    pub fn state(&self) -> RerankerState {
        self.state.read().clone()
    }

    pub fn set_state(&self, state: RerankerState) {
        *self.state.write() = state;
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    fn model(&self) -> Result<Arc<dyn RelevanceModel>, Error> {
        match &*self.state.read() {
            RerankerState::Loaded(model) => Ok(Arc::clone(model)),
            RerankerState::Unavailable { reason } => Err(Error::ModelUnavailable(reason.clone())),
        }
    }

    /// Scores on the calling thread with no timeout.
    pub fn rerank_blocking(&self, query: &str, candidates: Vec<ScoredCandidate>, top_k: usize) -> RerankOutcome {
        if candidates.is_empty() {
            return RerankOutcome { candidates, fallback: None };
        }
        let model = match self.model() {
            Ok(model) => model,
            Err(e) => return fallback(candidates, top_k, e),
        };
        let passages: Vec<String> = candidates.iter().map(|c| c.text.clone()).collect();
        match model.score_pairs(query, &passages) {
            Ok(scores) => finish(candidates, &scores, top_k),
            Err(e) => fallback(candidates, top_k, Error::ModelUnavailable(format!("inference failed: {e:#}"))),
        }
    }

    /// Scores the whole pool in one batch on the blocking pool, bounded by the
    /// configured timeout.
    pub async fn rerank(&self, query: &str, candidates: Vec<ScoredCandidate>, top_k: usize) -> RerankOutcome {
        if candidates.is_empty() {
            return RerankOutcome { candidates, fallback: None };
        }
        let model = match self.model() {
            Ok(model) => model,
            Err(e) => return fallback(candidates, top_k, e),
        };

        let started = Instant::now();
        let query = query.to_string();
        let passages: Vec<String> = candidates.iter().map(|c| c.text.clone()).collect();
        let task = tokio::task::spawn_blocking(move || model.score_pairs(&query, &passages));
        match tokio::time::timeout(self.timeout, task).await {
            Ok(Ok(Ok(scores))) => {
                debug!(pairs = candidates.len(), elapsed_ms = started.elapsed().as_millis() as u64, "reranked");
                finish(candidates, &scores, top_k)
            }
            Ok(Ok(Err(e))) => fallback(candidates, top_k, Error::ModelUnavailable(format!("inference failed: {e:#}"))),
            Ok(Err(join_error)) => {
                fallback(candidates, top_k, Error::ModelUnavailable(format!("scoring task failed: {join_error}")))
            }
            Err(_) => fallback(
                candidates,
                top_k,
                Error::ModelUnavailable(format!("scoring timed out after {} ms", self.timeout.as_millis())),
            ),
        }
    }
}

/// Attaches model scores, stable-sorts descending and truncates to `top_k`.
/// Rejects a score vector of the wrong length or with non-finite entries.
pub fn apply_scores(
    candidates: Vec<ScoredCandidate>,
    scores: &[f32],
    top_k: usize,
) -> Result<Vec<ScoredCandidate>, (Vec<ScoredCandidate>, Error)> {
    if scores.len() != candidates.len() {
        let e = Error::ModelUnavailable(format!("model returned {} scores for {} candidates", scores.len(), candidates.len()));
        return Err((candidates, e));
    }
    if let Some(i) = scores.iter().position(|s| !s.is_finite()) {
        let e = Error::ModelUnavailable(format!("model returned a non-finite score at position {i}"));
        return Err((candidates, e));
    }
    let mut ranked: Vec<ScoredCandidate> = candidates
        .into_iter()
        .zip(scores)
        .map(|(c, &score)| ScoredCandidate { score, source: CandidateSource::Reranked, ..c })
        .collect();
    ranked.sort_by(|a, b| b.score.total_cmp(&a.score));
    ranked.truncate(top_k);
    Ok(ranked)
}

fn finish(candidates: Vec<ScoredCandidate>, scores: &[f32], top_k: usize) -> RerankOutcome {
    match apply_scores(candidates, scores, top_k) {
        Ok(candidates) => RerankOutcome { candidates, fallback: None },
        Err((candidates, e)) => fallback(candidates, top_k, e),
    }
}

fn fallback(mut candidates: Vec<ScoredCandidate>, top_k: usize, reason: Error) -> RerankOutcome {
    warn!(error = %reason, "rerank fallback; keeping fused order");
    candidates.truncate(top_k);
    RerankOutcome { candidates, fallback: Some(reason) }
}
