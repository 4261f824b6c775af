//! Weighted score fusion of dense and sparse candidate lists.

use tracing::debug;

use ragrank_core::config::FusionSettings;
use ragrank_core::traits::ScoreConvention;
use ragrank_core::types::{CandidateSource, ScoredCandidate};

/// Converts raw dense hits to candidates with "higher is better" scores.
/// Hits with a non-finite score are dropped.
pub fn normalize_dense(raw: Vec<(String, f32)>, convention: ScoreConvention) -> Vec<ScoredCandidate> {
    let total = raw.len();
    let candidates: Vec<ScoredCandidate> = raw
        .into_iter()
        .filter(|(_, score)| score.is_finite())
        .map(|(text, score)| ScoredCandidate::new(text, convention.normalize(score), CandidateSource::Dense))
        .collect();
    if candidates.len() < total {
        debug!(dropped = total - candidates.len(), "dropped dense hits with non-finite scores");
    }
    candidates
}

/// Number of fused candidates handed to the reranker.
pub fn pool_size(settings: &FusionSettings, final_k: usize) -> usize {
    settings.oversample.saturating_mul(final_k)
}

/// Scales each source by its weight, concatenates dense then sparse, and
/// stable-sorts by weighted score. Duplicates across sources are kept; the
/// context assembler removes them. Returns at most `oversample * final_k`.
pub fn fuse(
    dense: &[ScoredCandidate],
    sparse: &[ScoredCandidate],
    settings: &FusionSettings,
    final_k: usize,
) -> Vec<ScoredCandidate> {
    let weighted = |candidates: &[ScoredCandidate], weight: f32| {
        candidates
            .iter()
            .map(move |c| ScoredCandidate { score: c.score * weight, source: CandidateSource::Fused, ..c.clone() })
            .collect::<Vec<_>>()
    };

    let mut fused = weighted(dense, settings.dense_weight);
    fused.extend(weighted(sparse, settings.sparse_weight));
    // Vec::sort_by is stable: equal scores keep dense-before-sparse and per-source order.
    fused.sort_by(|a, b| b.score.total_cmp(&a.score));
    fused.truncate(pool_size(settings, final_k));
    debug!(dense = dense.len(), sparse = sparse.len(), pool = fused.len(), "fused candidates");
    fused
}
