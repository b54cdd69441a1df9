use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use fragdb_core::traits::CrossEncoderModel;
use fragdb_core::types::{FragmentKind, SearchResult};
use fragdb_embed::{CrossEncoderScorer, MemoryCache, OverlapCrossEncoder};

fn result(id: &str, preview: &str, score: f32) -> SearchResult {
    SearchResult {
        fragment_id: id.to_string(),
        kind: FragmentKind::Function,
        name: id.to_string(),
        file_path: format!("src/{id}.js"),
        file_name: format!("{id}.js"),
        content_preview: preview.to_string(),
        vector_score: score,
        keyword_score: None,
        score,
        cross_score: None,
    }
}

struct CountingOverlap {
    calls: Arc<AtomicUsize>,
}

impl CrossEncoderModel for CountingOverlap {
    fn name(&self) -> &str {
        "counting-overlap"
    }
    fn predict(&self, query: &str, passage: &str) -> anyhow::Result<f32> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        OverlapCrossEncoder.predict(query, passage)
    }
}

struct FailingModel;

impl CrossEncoderModel for FailingModel {
    fn name(&self) -> &str {
        "failing"
    }
    fn predict(&self, _query: &str, _passage: &str) -> anyhow::Result<f32> {
        anyhow::bail!("model backend unavailable")
    }
}

#[test]
fn score_is_cached_by_pair_identity() {
    let calls = Arc::new(AtomicUsize::new(0));
    let scorer = CrossEncoderScorer::new(
        Box::new(CountingOverlap { calls: calls.clone() }),
        Some(Box::new(MemoryCache::new(16).expect("cache"))),
    );

    let a = scorer.score("login form", "function login() {}").expect("score");
    let b = scorer.score("login form", "function login() {}").expect("score");
    assert_eq!(a, b);
    assert_eq!(calls.load(Ordering::SeqCst), 1, "repeat pair served from cache");

    scorer.score("login form", "other passage").expect("score");
    assert_eq!(calls.load(Ordering::SeqCst), 2, "different passage is a new pair");
}

#[test]
fn rerank_sorts_by_cross_score_and_attaches_it() {
    let scorer = CrossEncoderScorer::new(Box::new(OverlapCrossEncoder), None);
    let candidates = vec![
        result("a", "nothing relevant here", 0.9),
        result("b", "login form with login button", 0.5),
        result("c", "partial login mention", 0.6),
    ];
    let reranked = scorer.rerank("login form", candidates, 2);

    assert_eq!(reranked.len(), 2);
    assert_eq!(reranked[0].fragment_id, "b");
    assert_eq!(reranked[1].fragment_id, "c");
    assert!(reranked[0].cross_score.expect("cross score") > reranked[1].cross_score.expect("cross score"));
    // Pre-rerank fields are untouched.
    assert_eq!(reranked[0].score, 0.5);
    assert_eq!(reranked[0].vector_score, 0.5);
}

#[test]
fn rerank_fails_soft_on_model_error() {
    let scorer = CrossEncoderScorer::new(Box::new(FailingModel), None);
    let candidates = vec![
        result("a", "first", 0.9),
        result("b", "second", 0.8),
        result("c", "third", 0.7),
    ];
    let reranked = scorer.rerank("query", candidates, 2);

    assert_eq!(reranked.len(), 2, "truncated to top_k");
    assert_eq!(reranked[0].fragment_id, "a", "pre-rerank order preserved");
    assert_eq!(reranked[1].fragment_id, "b");
    assert!(reranked[0].cross_score.is_none(), "no cross score on fallback");
}
