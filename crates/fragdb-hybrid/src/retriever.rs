//! Hybrid retrieval: vector search plus keyword scoring, fused by
//! max-normalized weighted sum, with optional cross-encoder reranking.

use anyhow::Result;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::debug;

use fragdb_core::types::{Filter, SearchResult};
use fragdb_embed::CrossEncoderScorer;
use fragdb_text::{KeywordHit, KeywordScorer};
use fragdb_vector::FragmentIndex;

/// Per-call search parameters.
#[derive(Debug, Clone)]
pub struct SearchOptions {
    pub k: usize,
    /// Weight of the vector leg in the fused score; the keyword leg gets
    /// the complement.
    pub ensemble_weight: f32,
    pub rerank: bool,
    pub filters: Option<Filter>,
}

impl Default for SearchOptions {
    fn default() -> Self {
        Self { k: 10, ensemble_weight: 0.5, rerank: false, filters: None }
    }
}

/// Orchestrates the two retrieval legs and the optional rerank stage over
/// one shared [`FragmentIndex`].
pub struct HybridRetriever {
    index: Arc<FragmentIndex>,
    keyword: KeywordScorer,
    scorer: Option<CrossEncoderScorer>,
    /// Candidate pool widening factor when reranking runs; rerank needs a
    /// wider pool than `k` to be useful.
    rerank_pool_multiplier: usize,
}

impl HybridRetriever {
    pub fn new(index: Arc<FragmentIndex>, scorer: Option<CrossEncoderScorer>) -> Self {
        Self { index, keyword: KeywordScorer::new(), scorer, rerank_pool_multiplier: 2 }
    }

    pub fn with_rerank_pool_multiplier(mut self, multiplier: usize) -> Self {
        self.rerank_pool_multiplier = multiplier.max(1);
        self
    }

    pub fn index(&self) -> &Arc<FragmentIndex> {
        &self.index
    }

    pub fn scorer(&self) -> Option<&CrossEncoderScorer> {
        self.scorer.as_ref()
    }

    /// Retrieve up to `opts.k` fragments for a query vector, optionally
    /// fusing with keyword scores for `query_text` and reranking.
    ///
    /// Reranking degrades gracefully: without a configured scorer or a
    /// usable query text the fused ranking is returned as-is, and a scorer
    /// failure falls back to the fused order inside the scorer itself.
    pub fn search(
        &self,
        query_text: Option<&str>,
        query_vector: &[f32],
        opts: &SearchOptions,
    ) -> Result<Vec<SearchResult>> {
        let text = query_text.map(str::trim).filter(|t| !t.is_empty());
        let rerank_active = opts.rerank && self.scorer.is_some() && text.is_some();
        let candidate_k = if rerank_active {
            opts.k * self.rerank_pool_multiplier
        } else {
            opts.k
        };

        let vector_hits = self.index.search(query_vector, candidate_k, opts.filters.as_ref())?;

        let keyword_hits: Vec<KeywordHit> = match text {
            Some(query) => {
                // The filter narrows both legs; a lexical-only discovery must
                // not bypass it.
                let mut snapshot = self.index.metadata_snapshot();
                if let Some(filter) = opts.filters.as_ref() {
                    snapshot.retain(|(_, record)| record.matches(filter));
                }
                self.keyword
                    .search(query, snapshot.iter().map(|(id, r)| (id, r)), candidate_k)
            }
            None => Vec::new(),
        };
        debug!(
            vector = vector_hits.len(),
            keyword = keyword_hits.len(),
            candidate_k,
            "hybrid legs collected"
        );

        let mut fused = self.fuse(vector_hits, &keyword_hits, opts.ensemble_weight, text.is_some());

        match (rerank_active, &self.scorer, text) {
            (true, Some(scorer), Some(query)) => Ok(scorer.rerank(query, fused, opts.k)),
            _ => {
                fused.truncate(opts.k);
                Ok(fused)
            }
        }
    }

    /// Fuse the two ranked lists. Each list is normalized by its own
    /// maximum (an empty list contributes 0), then combined as
    /// `weight * vector + (1 - weight) * keyword`. Ids discovered only
    /// lexically are materialized from the metadata store with a zero
    /// vector score. The sort is stable, so equal fused scores keep
    /// vector-then-keyword discovery order.
    fn fuse(
        &self,
        vector_hits: Vec<SearchResult>,
        keyword_hits: &[KeywordHit],
        ensemble_weight: f32,
        keyword_ran: bool,
    ) -> Vec<SearchResult> {
        if !keyword_ran {
            return vector_hits;
        }
        let weight = ensemble_weight.clamp(0.0, 1.0);
        let vector_max = vector_hits.iter().map(|r| r.vector_score).fold(0.0f32, f32::max);
        let keyword_max = keyword_hits.iter().map(|h| h.score).fold(0.0f32, f32::max);

        let mut results: Vec<SearchResult> = Vec::with_capacity(vector_hits.len());
        let mut by_id: HashMap<String, usize> = HashMap::new();

        for mut result in vector_hits {
            let normalized = if vector_max > 0.0 { result.vector_score / vector_max } else { 0.0 };
            result.score = weight * normalized;
            by_id.insert(result.fragment_id.clone(), results.len());
            results.push(result);
        }

        for hit in keyword_hits {
            let normalized = if keyword_max > 0.0 { hit.score / keyword_max } else { 0.0 };
            let contribution = (1.0 - weight) * normalized;
            if let Some(&position) = by_id.get(&hit.fragment_id) {
                results[position].keyword_score = Some(hit.score);
                results[position].score += contribution;
            } else if let Some(record) = self.index.get_metadata(&hit.fragment_id) {
                let mut result = SearchResult::from_record(&hit.fragment_id, &record, 0.0);
                result.keyword_score = Some(hit.score);
                result.score = contribution;
                by_id.insert(hit.fragment_id.clone(), results.len());
                results.push(result);
            }
        }

        results.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap_or(std::cmp::Ordering::Equal));
        results
    }
}
