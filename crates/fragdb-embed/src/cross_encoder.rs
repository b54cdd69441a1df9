//! Second-stage reranking with a pairwise relevance model.

use anyhow::Result;
use tracing::{debug, warn};

use fragdb_core::traits::{CrossEncoderModel, EmbeddingCache};
use fragdb_core::types::{CacheStats, SearchResult};

/// Cache key for a (query, passage) pair.
pub fn pair_key(query: &str, passage: &str) -> String {
    let mut hasher = blake3::Hasher::new();
    hasher.update(query.as_bytes());
    hasher.update(&[0x1f]);
    hasher.update(passage.as_bytes());
    hasher.finalize().to_hex().to_string()
}

/// Scores (query, passage) pairs and reranks candidate lists. Scores are
/// cached by pair identity; a cache write commits only after the model call
/// returned successfully.
pub struct CrossEncoderScorer {
    model: Box<dyn CrossEncoderModel>,
    cache: Option<Box<dyn EmbeddingCache<f32>>>,
}

impl CrossEncoderScorer {
    pub fn new(
        model: Box<dyn CrossEncoderModel>,
        cache: Option<Box<dyn EmbeddingCache<f32>>>,
    ) -> Self {
        Self { model, cache }
    }

    pub fn model_name(&self) -> &str {
        self.model.name()
    }

    pub fn score(&self, query: &str, passage: &str) -> Result<f32> {
        let key = pair_key(query, passage);
        if let Some(cached) = self.cache.as_ref().and_then(|c| c.get(&key)) {
            return Ok(cached);
        }
        let score = self.model.predict(query, passage)?;
        if let Some(cache) = &self.cache {
            cache.save(&key, &score);
        }
        Ok(score)
    }

    /// Rerank `candidates` by pairwise relevance to `query`: every candidate
    /// is scored independently against its content preview, the list is
    /// sorted descending and truncated to `top_k` with `cross_score`
    /// attached. Any model error fails soft: the incoming order is returned
    /// truncated to `top_k`, without cross scores.
    pub fn rerank(
        &self,
        query: &str,
        candidates: Vec<SearchResult>,
        top_k: usize,
    ) -> Vec<SearchResult> {
        if candidates.is_empty() {
            return candidates;
        }
        let mut scores: Vec<f32> = Vec::with_capacity(candidates.len());
        for i in 0..candidates.len() {
            let outcome = self.score(query, &candidates[i].content_preview);
            match outcome {
                Ok(score) => scores.push(score),
                Err(e) => {
                    warn!(
                        model = self.model.name(),
                        error = %e,
                        "cross-encoder failed, keeping pre-rerank order"
                    );
                    let mut fallback = candidates;
                    fallback.truncate(top_k);
                    return fallback;
                }
            }
        }
        debug!(candidates = scores.len(), top_k, "reranked");
        let mut scored: Vec<(f32, SearchResult)> = scores.into_iter().zip(candidates).collect();
        scored.sort_by(|a, b| b.0.partial_cmp(&a.0).unwrap_or(std::cmp::Ordering::Equal));
        scored
            .into_iter()
            .take(top_k)
            .map(|(score, mut result)| {
                result.cross_score = Some(score);
                result
            })
            .collect()
    }

    pub fn cache_stats(&self) -> Option<CacheStats> {
        self.cache.as_ref().map(|c| c.stats())
    }
}

/// Lexical-overlap relevance model: the fraction of query terms occurring
/// in the passage. A stand-in for a neural cross-encoder that keeps the
/// rerank path fully functional offline; deterministic by construction.
pub struct OverlapCrossEncoder;

impl CrossEncoderModel for OverlapCrossEncoder {
    fn name(&self) -> &str {
        "lexical-overlap"
    }

    fn predict(&self, query: &str, passage: &str) -> Result<f32> {
        let passage_lower = passage.to_lowercase();
        let query_lower = query.to_lowercase();
        let terms: Vec<&str> = query_lower.split_whitespace().collect();
        if terms.is_empty() {
            return Ok(0.0);
        }
        let hits = terms.iter().filter(|t| passage_lower.contains(**t)).count();
        Ok(hits as f32 / terms.len() as f32)
    }
}

/// Default reranker selection: enabled with the lexical-overlap model when
/// `FRAGDB_ENABLE_RERANKER` is set; a neural model is wired in by
/// constructing [`CrossEncoderScorer`] directly.
pub fn get_default_cross_encoder() -> Option<CrossEncoderScorer> {
    let enabled = std::env::var("FRAGDB_ENABLE_RERANKER")
        .ok()
        .map(|v| v == "1" || v.eq_ignore_ascii_case("true"))
        .unwrap_or(false);
    if !enabled {
        return None;
    }
    let cache = crate::cache::MemoryCache::new(4096)
        .map(|c| Box::new(c) as Box<dyn EmbeddingCache<f32>>)
        .ok();
    Some(CrossEncoderScorer::new(Box::new(OverlapCrossEncoder), cache))
}
