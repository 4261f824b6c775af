use anyhow::{anyhow, Context, Result};
use std::path::Path;
use std::time::Instant;

use candle_core::{DType, Device};
use candle_nn::{linear, Linear, Module, VarBuilder};
use candle_transformers::models::bert::{BertModel, Config as BertConfig, DTYPE};
use tokenizers::{Tokenizer, TruncationParams, TruncationStrategy};
use tracing::{debug, info};

use ragrank_core::traits::RelevanceModel;

use crate::device::select_device;
use crate::tokenize::encode_pairs;

pub const CONFIG_FILE: &str = "config.json";
pub const TOKENIZER_FILE: &str = "tokenizer.json";
pub const WEIGHTS_FILE: &str = "model.safetensors";

/// BERT sequence classifier scoring (query, passage) pairs with one logit each,
/// e.g. an ms-marco MiniLM cross-encoder exported to safetensors.
pub struct CrossEncoder {
    model: BertModel,
    pooler: Linear,
    classifier: Linear,
    tokenizer: Tokenizer,
    device: Device,
    pad_id: u32,
    max_length: usize,
    name: String,
}

impl CrossEncoder {
    pub fn load(model_dir: &Path, max_length: usize) -> Result<Self> {
        let started = Instant::now();
        for file in [CONFIG_FILE, TOKENIZER_FILE, WEIGHTS_FILE] {
            let path = model_dir.join(file);
            if !path.is_file() {
                return Err(anyhow!("cross-encoder file missing: {}", path.display()));
            }
        }

        let config_path = model_dir.join(CONFIG_FILE);
        let raw_config = std::fs::read_to_string(&config_path)
            .with_context(|| format!("failed to read {}", config_path.display()))?;
        let config: BertConfig = serde_json::from_str(&raw_config)
            .with_context(|| format!("invalid BERT config {}", config_path.display()))?;
        let hidden_size = serde_json::from_str::<serde_json::Value>(&raw_config)?
            .get("hidden_size")
            .and_then(|v| v.as_u64())
            .ok_or_else(|| anyhow!("{} has no hidden_size", config_path.display()))? as usize;

        let tokenizer_path = model_dir.join(TOKENIZER_FILE);
        let mut tokenizer = Tokenizer::from_file(&tokenizer_path)
            .map_err(|e| anyhow!("Failed to load tokenizer from {}: {}", tokenizer_path.display(), e))?;
        tokenizer
            .with_truncation(Some(TruncationParams {
                max_length,
                strategy: TruncationStrategy::LongestFirst,
                ..Default::default()
            }))
            .map_err(|e| anyhow!("Failed to configure truncation: {}", e))?;
        tokenizer.with_padding(None);
        let pad_id = tokenizer.token_to_id("[PAD]").unwrap_or(0);

        let device = select_device();
        let weights_path = model_dir.join(WEIGHTS_FILE);
        let weights = candle_core::safetensors::load(&weights_path, &device)?;
        let vb = VarBuilder::from_tensors(weights, DTYPE, &device);
        let model = BertModel::load(vb.pp("bert"), &config)?;
        let pooler = linear(hidden_size, hidden_size, vb.pp("bert.pooler.dense"))?;
        let classifier = linear(hidden_size, 1, vb.pp("classifier"))?;

        let name = model_dir
            .file_name()
            .map(|s| s.to_string_lossy().to_string())
            .unwrap_or_else(|| "cross-encoder".to_string());
        info!(model = %name, hidden_size, max_length, elapsed_ms = started.elapsed().as_millis() as u64, "cross-encoder loaded");
        Ok(Self { model, pooler, classifier, tokenizer, device, pad_id, max_length, name })
    }
}

impl RelevanceModel for CrossEncoder {
    fn name(&self) -> &str {
        &self.name
    }

    fn score_pairs(&self, query: &str, passages: &[String]) -> Result<Vec<f32>> {
        if passages.is_empty() {
            return Ok(Vec::new());
        }
        let started = Instant::now();
        let batch = encode_pairs(&self.tokenizer, query, passages, self.max_length, self.pad_id, &self.device)?;
        let hidden = self
            .model
            .forward(&batch.input_ids, &batch.token_type_ids, Some(&batch.attention_mask))?;
        // [CLS] token -> pooler (tanh) -> single relevance logit
        let cls = hidden.narrow(1, 0, 1)?.squeeze(1)?;
        let pooled = self.pooler.forward(&cls)?.tanh()?;
        let logits = self.classifier.forward(&pooled)?;
        let scores = logits.squeeze(1)?.to_dtype(DType::F32)?.to_device(&Device::Cpu)?.to_vec1::<f32>()?;
        debug!(pairs = passages.len(), elapsed_ms = started.elapsed().as_millis() as u64, "cross-encoder scored batch");
        Ok(scores)
    }
}
