use std::sync::Arc;
use std::time::Duration;

use ragrank_core::traits::{RelevanceModel, RerankerState};
use ragrank_core::{CandidateSource, Error, ScoredCandidate};
use ragrank_hybrid::{apply_scores, Reranker};

/// Scores a passage by how many query words it contains.
struct OverlapModel;

impl RelevanceModel for OverlapModel {
    fn name(&self) -> &str {
        "overlap"
    }

    fn score_pairs(&self, query: &str, passages: &[String]) -> anyhow::Result<Vec<f32>> {
        let terms: Vec<&str> = query.split_whitespace().collect();
        Ok(passages
            .iter()
            .map(|p| p.split_whitespace().filter(|w| terms.contains(w)).count() as f32)
            .collect())
    }
}

struct FixedScores(Vec<f32>);

impl RelevanceModel for FixedScores {
    fn name(&self) -> &str {
        "fixed"
    }

    fn score_pairs(&self, _query: &str, _passages: &[String]) -> anyhow::Result<Vec<f32>> {
        Ok(self.0.clone())
    }
}

struct FailingModel;

impl RelevanceModel for FailingModel {
    fn name(&self) -> &str {
        "failing"
    }

    fn score_pairs(&self, _query: &str, _passages: &[String]) -> anyhow::Result<Vec<f32>> {
        anyhow::bail!("device lost")
    }
}

struct SlowModel(Duration);

impl RelevanceModel for SlowModel {
    fn name(&self) -> &str {
        "slow"
    }

    fn score_pairs(&self, _query: &str, passages: &[String]) -> anyhow::Result<Vec<f32>> {
        std::thread::sleep(self.0);
        Ok(vec![1.0; passages.len()])
    }
}

fn fused(texts: &[&str]) -> Vec<ScoredCandidate> {
    texts
        .iter()
        .enumerate()
        .map(|(i, t)| ScoredCandidate::new(*t, 10.0 - i as f32, CandidateSource::Fused))
        .collect()
}

fn texts(candidates: &[ScoredCandidate]) -> Vec<&str> {
    candidates.iter().map(|c| c.text.as_str()).collect()
}

fn loaded(model: impl RelevanceModel + 'static) -> Reranker {
    Reranker::new(RerankerState::Loaded(Arc::new(model)), Duration::from_secs(5))
}

#[tokio::test]
async fn model_scores_reorder_and_truncate() {
    let reranker = loaded(OverlapModel);
    let outcome = reranker
        .rerank("wood stove", fused(&["garden beds", "wood stove install", "stove pipe", "wood"]), 3)
        .await;

    assert!(!outcome.is_fallback());
    assert_eq!(texts(&outcome.candidates), vec!["wood stove install", "stove pipe", "wood"]);
    assert!(outcome.candidates.iter().all(|c| c.source == CandidateSource::Reranked));
    assert_eq!(outcome.candidates[0].score, 2.0);
}

#[tokio::test]
async fn unavailable_model_keeps_fused_order() {
    let reranker = Reranker::new(RerankerState::unavailable("no weights"), Duration::from_secs(1));
    let input = fused(&["a", "b", "c"]);
    let outcome = reranker.rerank("q", input.clone(), 10).await;

    assert_eq!(outcome.candidates, input, "identity on content and order");
    assert!(matches!(outcome.fallback, Some(Error::ModelUnavailable(_))));

    let truncated = reranker.rerank("q", input, 2).await;
    assert_eq!(texts(&truncated.candidates), vec!["a", "b"]);
}

#[tokio::test]
async fn inference_errors_fall_back() {
    let outcome = loaded(FailingModel).rerank("q", fused(&["a", "b"]), 5).await;
    assert_eq!(texts(&outcome.candidates), vec!["a", "b"]);
    match outcome.fallback {
        Some(Error::ModelUnavailable(reason)) => assert!(reason.contains("device lost"), "{reason}"),
        other => panic!("expected fallback, got {other:?}"),
    }
}

#[tokio::test]
async fn wrong_score_count_or_nan_falls_back() {
    let short = loaded(FixedScores(vec![1.0])).rerank("q", fused(&["a", "b"]), 5).await;
    assert!(short.is_fallback());
    assert_eq!(texts(&short.candidates), vec!["a", "b"]);

    let nan = loaded(FixedScores(vec![1.0, f32::NAN])).rerank("q", fused(&["a", "b"]), 5).await;
    assert!(nan.is_fallback());
    assert!(nan.candidates.iter().all(|c| c.source == CandidateSource::Fused));
}

#[tokio::test]
async fn slow_model_times_out_into_fallback() {
    let reranker = Reranker::new(
        RerankerState::Loaded(Arc::new(SlowModel(Duration::from_millis(300)))),
        Duration::from_millis(20),
    );
    let outcome = reranker.rerank("q", fused(&["a", "b", "c"]), 2).await;
    assert_eq!(texts(&outcome.candidates), vec!["a", "b"]);
    match outcome.fallback {
        Some(Error::ModelUnavailable(reason)) => assert!(reason.contains("timed out"), "{reason}"),
        other => panic!("expected timeout fallback, got {other:?}"),
    }
}

#[test]
fn equal_scores_keep_input_order() {
    let ranked = apply_scores(fused(&["x", "y", "z"]), &[1.0, 2.0, 1.0], 3).unwrap();
    assert_eq!(texts(&ranked), vec!["y", "x", "z"]);
}

#[test]
fn blocking_rerank_matches_async_contract() {
    let reranker = loaded(OverlapModel);
    let outcome = reranker.rerank_blocking("seed", fused(&["compost", "seed saving", "seed"]), 2);
    assert_eq!(texts(&outcome.candidates), vec!["seed saving", "seed"]);

    let empty = reranker.rerank_blocking("seed", Vec::new(), 2);
    assert!(empty.candidates.is_empty() && !empty.is_fallback());
}
