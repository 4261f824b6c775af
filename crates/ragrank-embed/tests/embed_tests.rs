use std::path::Path;
use std::sync::Arc;

use candle_core::{DType, Device};
use candle_nn::{linear, VarBuilder, VarMap};
use candle_transformers::models::bert::{BertModel, Config as BertConfig};
use ragrank_core::config::{RerankSettings, RerankerKind};
use ragrank_core::traits::{Embedder, RelevanceModel, RerankerState};
use ragrank_embed::tokenize::encode_pairs;
use ragrank_embed::{load_relevance_model, make_features, CrossEncoder, FeatureScorer, HashEmbedder};
use tempfile::TempDir;
use tokenizers::Tokenizer;

fn cosine(a: &[f32], b: &[f32]) -> f32 {
    a.iter().zip(b).map(|(x, y)| x * y).sum()
}

#[test]
fn hash_embedder_is_normalized_and_deterministic() {
    let embedder = HashEmbedder::new(64);
    let texts = vec!["hello world".to_string(), "hello world".to_string()];
    let embs = embedder.embed_batch(&texts).expect("embed_batch");

    assert_eq!(embs[0].len(), 64);
    let norm: f32 = embs[0].iter().map(|x| x * x).sum::<f32>().sqrt();
    assert!((norm - 1.0).abs() <= 1e-3, "vector is L2-normalized (norm={norm})");
    assert_eq!(embs[0], embs[1]);
}

#[test]
fn hash_embedder_places_shared_words_closer() {
    let embedder = HashEmbedder::new(256);
    let q = embedder.embed("rainwater catchment").unwrap();
    let near = embedder.embed("Rainwater catchment tank sizing").unwrap();
    let far = embedder.embed("sourdough starter feeding").unwrap();
    assert!(cosine(&q, &near) > cosine(&q, &far));
}

#[test]
fn features_concatenate_query_passage_and_product() {
    let f = make_features(&[1.0, 2.0], &[3.0, 4.0]);
    assert_eq!(f, vec![1.0, 2.0, 3.0, 4.0, 3.0, 8.0]);
}

fn random_scorer(varmap: &VarMap, embedder: Arc<dyn Embedder>) -> FeatureScorer {
    let vb = VarBuilder::from_varmap(varmap, DType::F32, &Device::Cpu);
    FeatureScorer::from_var_builder(vb, embedder, 8).expect("scorer")
}

#[test]
fn feature_scorer_scores_every_passage_deterministically() {
    let embedder: Arc<dyn Embedder> = Arc::new(HashEmbedder::new(16));
    let varmap = VarMap::new();
    let scorer = random_scorer(&varmap, embedder);

    let passages = vec!["one passage".to_string(), "another passage".to_string(), "third".to_string()];
    let first = scorer.score_pairs("query", &passages).unwrap();
    let second = scorer.score_pairs("query", &passages).unwrap();
    assert_eq!(first.len(), 3);
    assert!(first.iter().all(|s| s.is_finite()));
    assert_eq!(first, second);
    assert!(scorer.score_pairs("query", &[]).unwrap().is_empty());
}

#[test]
fn saved_feature_scorer_weights_load_through_settings() {
    let tmp = TempDir::new().unwrap();
    let embedder: Arc<dyn Embedder> = Arc::new(HashEmbedder::new(16));
    let varmap = VarMap::new();
    let scorer = random_scorer(&varmap, Arc::clone(&embedder));
    varmap.save(tmp.path().join("reranker.safetensors")).expect("save weights");

    let settings = RerankSettings {
        kind: RerankerKind::EmbeddingMlp,
        model_dir: Some(tmp.path().to_string_lossy().to_string()),
        hidden_dim: 8,
        ..RerankSettings::default()
    };
    let passages = vec!["alpha".to_string(), "beta gamma".to_string()];
    match load_relevance_model(&settings, Some(embedder)) {
        RerankerState::Loaded(model) => {
            let loaded = model.score_pairs("alpha", &passages).unwrap();
            let original = scorer.score_pairs("alpha", &passages).unwrap();
            for (a, b) in loaded.iter().zip(&original) {
                assert!((a - b).abs() < 1e-5);
            }
        }
        other => panic!("expected a loaded model, got {other:?}"),
    }
}

#[test]
fn disabled_or_missing_models_resolve_to_unavailable() {
    let disabled = RerankSettings { kind: RerankerKind::None, ..RerankSettings::default() };
    assert!(!load_relevance_model(&disabled, None).is_loaded());

    let tmp = TempDir::new().unwrap();
    let missing = RerankSettings {
        kind: RerankerKind::CrossEncoder,
        model_dir: Some(tmp.path().to_string_lossy().to_string()),
        ..RerankSettings::default()
    };
    match load_relevance_model(&missing, None) {
        RerankerState::Unavailable { reason } => assert!(reason.contains("config.json"), "{reason}"),
        other => panic!("expected unavailable, got {other:?}"),
    }

    let unset = RerankSettings::default();
    assert!(!load_relevance_model(&unset, None).is_loaded());

    let no_embedder = RerankSettings { kind: RerankerKind::EmbeddingMlp, ..missing };
    assert!(!load_relevance_model(&no_embedder, None).is_loaded());
}

const TINY_BERT_CONFIG: &str = r#"{
  "vocab_size": 16,
  "hidden_size": 8,
  "num_hidden_layers": 1,
  "num_attention_heads": 2,
  "intermediate_size": 16,
  "hidden_act": "gelu",
  "hidden_dropout_prob": 0.0,
  "max_position_embeddings": 64,
  "type_vocab_size": 2,
  "initializer_range": 0.02,
  "layer_norm_eps": 1e-12,
  "pad_token_id": 0,
  "position_embedding_type": "absolute",
  "use_cache": false,
  "classifier_dropout": null,
  "model_type": "bert"
}"#;

const TINY_TOKENIZER: &str = r#"{
  "version": "1.0",
  "truncation": null,
  "padding": null,
  "added_tokens": [
    {"id": 0, "content": "[PAD]", "single_word": false, "lstrip": false, "rstrip": false, "normalized": false, "special": true},
    {"id": 1, "content": "[UNK]", "single_word": false, "lstrip": false, "rstrip": false, "normalized": false, "special": true},
    {"id": 2, "content": "[CLS]", "single_word": false, "lstrip": false, "rstrip": false, "normalized": false, "special": true},
    {"id": 3, "content": "[SEP]", "single_word": false, "lstrip": false, "rstrip": false, "normalized": false, "special": true}
  ],
  "normalizer": {"type": "Lowercase"},
  "pre_tokenizer": {"type": "Whitespace"},
  "post_processor": {
    "type": "TemplateProcessing",
    "single": [
      {"SpecialToken": {"id": "[CLS]", "type_id": 0}},
      {"Sequence": {"id": "A", "type_id": 0}},
      {"SpecialToken": {"id": "[SEP]", "type_id": 0}}
    ],
    "pair": [
      {"SpecialToken": {"id": "[CLS]", "type_id": 0}},
      {"Sequence": {"id": "A", "type_id": 0}},
      {"SpecialToken": {"id": "[SEP]", "type_id": 0}},
      {"Sequence": {"id": "B", "type_id": 1}},
      {"SpecialToken": {"id": "[SEP]", "type_id": 1}}
    ],
    "special_tokens": {
      "[CLS]": {"id": "[CLS]", "ids": [2], "tokens": ["[CLS]"]},
      "[SEP]": {"id": "[SEP]", "ids": [3], "tokens": ["[SEP]"]}
    }
  },
  "decoder": null,
  "model": {
    "type": "WordLevel",
    "vocab": {
      "[PAD]": 0, "[UNK]": 1, "[CLS]": 2, "[SEP]": 3,
      "water": 4, "tank": 5, "rain": 6, "barrel": 7, "filter": 8, "ceramic": 9,
      "gutter": 10, "clean": 11, "roof": 12, "storage": 13
    },
    "unk_token": "[UNK]"
  }
}"#;

/// Writes a one-layer BERT classifier with random weights in the on-disk
/// layout the cross-encoder expects.
fn write_tiny_cross_encoder(dir: &Path) {
    std::fs::write(dir.join("config.json"), TINY_BERT_CONFIG).unwrap();
    std::fs::write(dir.join("tokenizer.json"), TINY_TOKENIZER).unwrap();

    let config: BertConfig = serde_json::from_str(TINY_BERT_CONFIG).unwrap();
    let varmap = VarMap::new();
    let vb = VarBuilder::from_varmap(&varmap, DType::F32, &Device::Cpu);
    BertModel::load(vb.pp("bert"), &config).expect("bert");
    linear(8, 8, vb.pp("bert.pooler.dense")).expect("pooler");
    linear(8, 1, vb.pp("classifier")).expect("classifier");
    varmap.save(dir.join("model.safetensors")).expect("save weights");
}

fn tiny_tokenizer(dir: &Path) -> Tokenizer {
    let path = dir.join("tokenizer.json");
    std::fs::write(&path, TINY_TOKENIZER).unwrap();
    Tokenizer::from_file(&path).expect("tokenizer")
}

#[test]
fn encode_pairs_pads_to_the_longest_pair() {
    let tmp = TempDir::new().unwrap();
    let tokenizer = tiny_tokenizer(tmp.path());
    let passages = vec!["rain".to_string(), "ceramic filter clean roof".to_string()];

    let batch = encode_pairs(&tokenizer, "water tank", &passages, 512, 0, &Device::Cpu).unwrap();
    assert_eq!(batch.input_ids.dims(), &[2, 9]);
    assert_eq!(batch.token_type_ids.dims(), &[2, 9]);
    assert_eq!(batch.attention_mask.dims(), &[2, 9]);

    let ids = batch.input_ids.to_vec2::<u32>().unwrap();
    let types = batch.token_type_ids.to_vec2::<u32>().unwrap();
    let mask = batch.attention_mask.to_vec2::<u32>().unwrap();
    assert_eq!(ids[0], vec![2, 4, 5, 3, 6, 3, 0, 0, 0]);
    assert_eq!(ids[1], vec![2, 4, 5, 3, 9, 8, 11, 12, 3]);
    assert_eq!(types[0], vec![0, 0, 0, 0, 1, 1, 0, 0, 0]);
    assert_eq!(types[1], vec![0, 0, 0, 0, 1, 1, 1, 1, 1]);
    assert_eq!(mask[0], vec![1, 1, 1, 1, 1, 1, 0, 0, 0]);
    assert_eq!(mask[1], vec![1; 9]);
}

#[test]
fn encode_pairs_truncates_each_pair_to_max_len() {
    let tmp = TempDir::new().unwrap();
    let tokenizer = tiny_tokenizer(tmp.path());
    let passages = vec!["rain".to_string(), "ceramic filter clean roof".to_string()];

    let batch = encode_pairs(&tokenizer, "water tank", &passages, 5, 0, &Device::Cpu).unwrap();
    assert_eq!(batch.input_ids.dims(), &[2, 5]);
    let mask = batch.attention_mask.to_vec2::<u32>().unwrap();
    assert_eq!(mask, vec![vec![1; 5], vec![1; 5]]);
}

#[test]
fn cross_encoder_scores_every_pair_through_settings() {
    let tmp = TempDir::new().unwrap();
    write_tiny_cross_encoder(tmp.path());
    let settings = RerankSettings {
        kind: RerankerKind::CrossEncoder,
        model_dir: Some(tmp.path().to_string_lossy().to_string()),
        max_length: 32,
        ..RerankSettings::default()
    };

    let model = match load_relevance_model(&settings, None) {
        RerankerState::Loaded(model) => model,
        other => panic!("expected a loaded cross-encoder, got {other:?}"),
    };
    let passages = vec![
        "rain barrel".to_string(),
        "ceramic water filter".to_string(),
        "clean the gutter before storage".to_string(),
    ];
    let first = model.score_pairs("water tank", &passages).unwrap();
    let second = model.score_pairs("water tank", &passages).unwrap();
    assert_eq!(first.len(), passages.len());
    assert!(first.iter().all(|s| s.is_finite()));
    assert_eq!(first, second);
    assert!(model.score_pairs("water tank", &[]).unwrap().is_empty());
}

#[test]
fn cross_encoder_truncates_passages_longer_than_the_model() {
    let tmp = TempDir::new().unwrap();
    write_tiny_cross_encoder(tmp.path());
    let encoder = CrossEncoder::load(tmp.path(), 16).expect("load");

    // 200 words would overflow the 64 position embeddings without truncation.
    let long = "water ".repeat(200);
    let scores = encoder.score_pairs("rain barrel", &[long, "tank".to_string()]).unwrap();
    assert_eq!(scores.len(), 2);
    assert!(scores.iter().all(|s| s.is_finite()));
}
