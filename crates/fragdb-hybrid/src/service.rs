//! Dependency-injected service bundling the index, the embedding
//! generator and the retriever behind the public search surface. There are
//! no hidden globals: construct one, share it, drop it.

use anyhow::{Context, Result};
use std::sync::Arc;
use tracing::info;

use fragdb_core::types::{
    CacheStats, Fragment, FragmentMetadataRecord, IndexStats, SearchResult,
};
use fragdb_embed::{CrossEncoderScorer, EmbeddingGenerator};
use fragdb_vector::FragmentIndex;

use crate::dedup::ResultDeduplicator;
use crate::retriever::{HybridRetriever, SearchOptions};

pub struct SearchService {
    index: Arc<FragmentIndex>,
    embedder: EmbeddingGenerator,
    retriever: HybridRetriever,
    dedup: ResultDeduplicator,
}

impl SearchService {
    pub fn new(
        index: Arc<FragmentIndex>,
        embedder: EmbeddingGenerator,
        scorer: Option<CrossEncoderScorer>,
    ) -> Self {
        let retriever = HybridRetriever::new(index.clone(), scorer);
        Self { index, embedder, retriever, dedup: ResultDeduplicator::new() }
    }

    pub fn index(&self) -> &Arc<FragmentIndex> {
        &self.index
    }

    pub fn embedder(&self) -> &EmbeddingGenerator {
        &self.embedder
    }

    /// Embed and index a batch of producer fragments. Returns how many
    /// were newly added (already-present ids are skipped by the index).
    pub fn index_fragments(&self, fragments: &[Fragment]) -> Result<usize> {
        let embeddings = self.embedder.embed_fragments(fragments)?;
        let added = self.index.add(fragments, &embeddings)?;
        info!(batch = fragments.len(), added, "fragments indexed");
        Ok(added)
    }

    /// Full search contract: embed the query text, run hybrid retrieval,
    /// deduplicate per file. Embedding failure or a dimension mismatch is
    /// a hard error; reranking problems degrade inside the retriever.
    pub fn search(&self, query: &str, opts: &SearchOptions) -> Result<Vec<SearchResult>> {
        let query_vector = self
            .embedder
            .embed_text(query)
            .context("query embedding failed")?;
        let results = self.retriever.search(Some(query), &query_vector, opts)?;
        Ok(self.dedup.deduplicate(results))
    }

    /// Similarity search against an already-indexed fragment, excluding it.
    pub fn similar(&self, fragment_id: &str, k: usize) -> Result<Vec<SearchResult>> {
        self.index.similar(fragment_id, k)
    }

    pub fn get_fragment(&self, fragment_id: &str) -> Option<FragmentMetadataRecord> {
        self.index.get_metadata(fragment_id)
    }

    pub fn fragments_by_file(&self, file_path: &str) -> Vec<SearchResult> {
        self.index.fragments_by_file(file_path)
    }

    pub fn stats(&self) -> IndexStats {
        self.index.stats()
    }

    pub fn embedding_cache_stats(&self) -> Option<CacheStats> {
        self.embedder.cache_stats()
    }

    /// Drop the whole index, in memory and on disk.
    pub fn reset(&self) {
        self.index.clear();
    }
}
