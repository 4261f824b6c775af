use anyhow::{anyhow, bail, Result};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{info, warn};

use ragrank_core::config::{expand_path, RerankSettings, RerankerKind};
use ragrank_core::traits::{Embedder, RelevanceModel, RerankerState};

use crate::cross_encoder::CrossEncoder;
use crate::feature_scorer::{FeatureScorer, WEIGHTS_FILE};

/// Resolves the configured reranker once. Any failure (disabled, missing
/// files, bad weights, no embedder for the feature scorer) yields
/// `RerankerState::Unavailable` with the reason.
pub fn load_relevance_model(settings: &RerankSettings, embedder: Option<Arc<dyn Embedder>>) -> RerankerState {
    match try_load(settings, embedder) {
        Ok(model) => {
            info!(model = model.name(), "reranker loaded");
            RerankerState::Loaded(model)
        }
        Err(e) => {
            warn!(kind = ?settings.kind, error = %e, "reranker unavailable; fused order will be kept");
            RerankerState::unavailable(e.to_string())
        }
    }
}

fn try_load(settings: &RerankSettings, embedder: Option<Arc<dyn Embedder>>) -> Result<Arc<dyn RelevanceModel>> {
    match settings.kind {
        RerankerKind::None => bail!("reranking disabled by configuration"),
        RerankerKind::CrossEncoder => {
            let dir = model_dir(settings)?;
            Ok(Arc::new(CrossEncoder::load(&dir, settings.max_length)?))
        }
        RerankerKind::EmbeddingMlp => {
            let dir = model_dir(settings)?;
            let embedder = embedder.ok_or_else(|| anyhow!("embedding_mlp reranker requires an embedder"))?;
            Ok(Arc::new(FeatureScorer::load(&dir.join(WEIGHTS_FILE), embedder, settings.hidden_dim)?))
        }
    }
}

fn model_dir(settings: &RerankSettings) -> Result<PathBuf> {
    let raw = settings.model_dir.as_deref().ok_or_else(|| anyhow!("rerank.model_dir is not set"))?;
    let dir = expand_path(raw);
    if !dir.is_dir() {
        bail!("reranker model directory not found: {}", dir.display());
    }
    Ok(dir)
}
