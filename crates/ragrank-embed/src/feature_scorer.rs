use anyhow::{anyhow, Result};
use std::path::Path;
use std::sync::Arc;

use candle_core::{DType, Device, Tensor};
use candle_nn::{linear, Linear, Module, VarBuilder};
use tracing::{debug, info};

use ragrank_core::traits::{Embedder, RelevanceModel};

use crate::device::select_device;

pub const WEIGHTS_FILE: &str = "reranker.safetensors";

/// `[q, p, q * p]` for one query/passage embedding pair.
pub fn make_features(query: &[f32], passage: &[f32]) -> Vec<f32> {
    let mut features = Vec::with_capacity(query.len() * 3);
    features.extend_from_slice(query);
    features.extend_from_slice(passage);
    features.extend(query.iter().zip(passage).map(|(q, p)| q * p));
    features
}

/// Two-layer feed-forward scorer (`3d -> hidden -> 1`, ReLU) over embedding
/// features. Weights are stored under `fc1` and `fc2`.
pub struct FeatureScorer {
    embedder: Arc<dyn Embedder>,
    hidden: Linear,
    output: Linear,
    device: Device,
}

impl FeatureScorer {
    pub fn load(weights_path: &Path, embedder: Arc<dyn Embedder>, hidden_dim: usize) -> Result<Self> {
        if !weights_path.is_file() {
            return Err(anyhow!("reranker weights missing: {}", weights_path.display()));
        }
        let device = select_device();
        let weights = candle_core::safetensors::load(weights_path, &device)?;
        let vb = VarBuilder::from_tensors(weights, DType::F32, &device);
        let scorer = Self::from_var_builder(vb, embedder, hidden_dim)?;
        info!(path = %weights_path.display(), hidden_dim, "feature scorer loaded");
        Ok(scorer)
    }

    pub fn from_var_builder(vb: VarBuilder, embedder: Arc<dyn Embedder>, hidden_dim: usize) -> Result<Self> {
        let input_dim = embedder.dim() * 3;
        let device = vb.device().clone();
        let hidden = linear(input_dim, hidden_dim, vb.pp("fc1"))?;
        let output = linear(hidden_dim, 1, vb.pp("fc2"))?;
        Ok(Self { embedder, hidden, output, device })
    }
}

impl RelevanceModel for FeatureScorer {
    fn name(&self) -> &str {
        "embedding-mlp"
    }

    fn score_pairs(&self, query: &str, passages: &[String]) -> Result<Vec<f32>> {
        if passages.is_empty() {
            return Ok(Vec::new());
        }
        let dim = self.embedder.dim();
        let q = self.embedder.embed(query)?;
        let vectors = self.embedder.embed_batch(passages)?;
        if vectors.len() != passages.len() {
            return Err(anyhow!("embedder returned {} vectors for {} passages", vectors.len(), passages.len()));
        }

        let mut rows = Vec::with_capacity(passages.len() * dim * 3);
        for p in &vectors {
            if p.len() != dim || q.len() != dim {
                return Err(anyhow!("embedding dimension mismatch: expected {dim}"));
            }
            rows.extend(make_features(&q, p));
        }
        let features = Tensor::from_vec(rows, (passages.len(), dim * 3), &self.device)?;
        let hidden = self.hidden.forward(&features)?.relu()?;
        let scores = self.output.forward(&hidden)?.squeeze(1)?.to_device(&Device::Cpu)?.to_vec1::<f32>()?;
        debug!(pairs = passages.len(), "feature scorer scored batch");
        Ok(scores)
    }
}
