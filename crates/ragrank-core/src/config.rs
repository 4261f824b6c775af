//! Lightweight configuration loader, typed settings and path helpers.
//!
//! Uses Figment to merge `config.toml` + `config.<env>.toml` + `APP_*` env vars
//! (`__` separates nested keys, e.g. `APP_RERANK__KIND=none`). Every settings
//! section has serde defaults, so an empty configuration is valid.

use figment::{
    providers::{Env, Format, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};
use std::env;
use std::path::PathBuf;

use crate::chunker::ChunkingConfig;
use crate::error::Error;

pub struct Config {
    figment: Figment,
}

impl Config {
    pub fn load() -> anyhow::Result<Self> {
        let env_name = env::var("RUST_ENV").unwrap_or_else(|_| "dev".to_string());

        let mut figment = Figment::new().merge(Toml::file("config.toml"));
        match env_name.as_str() {
            "dev" | "development" => figment = figment.merge(Toml::file("config.dev.toml")),
            "prod" | "production" => figment = figment.merge(Toml::file("config.prod.toml")),
            "test" | "testing" => figment = figment.merge(Toml::file("config.test.toml")),
            _ => {}
        }
        figment = figment.merge(Env::prefixed("APP_").split("__"));

        let config = Self { figment };
        config.validate()?;
        Ok(config)
    }

    pub fn get<T>(&self, key: &str) -> anyhow::Result<T>
    where
        T: serde::de::DeserializeOwned,
    {
        self.figment
            .extract_inner(key)
            .map_err(|e| anyhow::anyhow!("Failed to get '{}': {}", key, e))
    }

    /// Extracts and validates the full typed settings tree.
    pub fn settings(&self) -> anyhow::Result<Settings> {
        let settings: Settings = self
            .figment
            .extract()
            .map_err(|e| anyhow::anyhow!("Failed to extract settings: {}", e))?;
        settings.validate()?;
        Ok(settings)
    }

    fn validate(&self) -> anyhow::Result<()> {
        self.settings().map(|_| ())
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct Settings {
    pub data: DataSettings,
    pub chunking: ChunkingConfig,
    pub sparse: SparseSettings,
    pub fusion: FusionSettings,
    pub rerank: RerankSettings,
    pub context: ContextSettings,
    pub retrieval: RetrievalDefaults,
}

impl Settings {
    pub fn validate(&self) -> Result<(), Error> {
        self.chunking.validate()?;
        self.fusion.validate()?;
        self.rerank.validate()?;
        if self.retrieval.final_k == 0 {
            return Err(Error::InvalidConfig("retrieval.final_k must be > 0".into()));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct DataSettings {
    pub raw_txt_dir: String,
}

impl Default for DataSettings {
    fn default() -> Self {
        Self { raw_txt_dir: "data/raw".to_string() }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct SparseSettings {
    /// Drop common English stop words when analyzing chunk and query text.
    pub remove_stopwords: bool,
    /// Where to snapshot the sparse index after each rebuild; in-memory only when unset.
    pub snapshot_path: Option<String>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct FusionSettings {
    pub dense_weight: f32,
    pub sparse_weight: f32,
    /// Rerank pool size as a multiple of `final_k`.
    pub oversample: usize,
}

impl Default for FusionSettings {
    fn default() -> Self {
        Self { dense_weight: 0.6, sparse_weight: 0.4, oversample: 2 }
    }
}

impl FusionSettings {
    pub fn validate(&self) -> Result<(), Error> {
        let weights = [self.dense_weight, self.sparse_weight];
        if weights.iter().any(|w| !w.is_finite() || *w < 0.0) {
            return Err(Error::InvalidConfig(format!(
                "fusion weights must be finite and non-negative, got dense={} sparse={}",
                self.dense_weight, self.sparse_weight
            )));
        }
        if self.dense_weight + self.sparse_weight <= 0.0 {
            return Err(Error::InvalidConfig("fusion weights must not both be zero".into()));
        }
        if self.oversample == 0 {
            return Err(Error::InvalidConfig("fusion.oversample must be > 0".into()));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum RerankerKind {
    /// Sequence-classification model scoring (query, passage) text pairs.
    #[default]
    CrossEncoder,
    /// Feed-forward scorer over `[q, p, q * p]` embedding features.
    EmbeddingMlp,
    /// No model; the fused order is kept.
    None,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct RerankSettings {
    pub kind: RerankerKind,
    pub model_dir: Option<String>,
    /// Token limit per (query, passage) pair for the cross-encoder.
    pub max_length: usize,
    pub timeout_ms: u64,
    /// Hidden width of the embedding-feature scorer.
    pub hidden_dim: usize,
}

impl RerankSettings {
    pub fn validate(&self) -> Result<(), Error> {
        if self.timeout_ms == 0 {
            return Err(Error::InvalidConfig("rerank.timeout_ms must be > 0".into()));
        }
        if self.max_length == 0 {
            return Err(Error::InvalidConfig("rerank.max_length must be > 0".into()));
        }
        Ok(())
    }
}

impl Default for RerankSettings {
    fn default() -> Self {
        Self {
            kind: RerankerKind::CrossEncoder,
            model_dir: None,
            max_length: 512,
            timeout_ms: 5_000,
            hidden_dim: 256,
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct ContextSettings {
    pub max_tokens: usize,
    pub min_chunk_tokens: usize,
}

impl Default for ContextSettings {
    fn default() -> Self {
        Self { max_tokens: 1400, min_chunk_tokens: 20 }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct RetrievalDefaults {
    pub top_k_dense: usize,
    pub top_k_sparse: usize,
    pub final_k: usize,
}

impl Default for RetrievalDefaults {
    fn default() -> Self {
        Self { top_k_dense: 20, top_k_sparse: 20, final_k: 8 }
    }
}

/// Expand a user-provided path string:
/// - Expands leading '~' to the user's home directory
/// - Expands ${VAR} and $VAR environment variables
/// - Returns a PathBuf without attempting to canonicalize
pub fn expand_path<S: AsRef<str>>(input: S) -> PathBuf {
    let s = input.as_ref();
    // Expand env vars first
    let expanded_env = shellexpand::env(s).unwrap_or(std::borrow::Cow::Borrowed(s));
    // Expand ~ at start
    let expanded = shellexpand::tilde(&expanded_env);
    PathBuf::from(expanded.as_ref())
}
