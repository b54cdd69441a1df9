//! Cache-aware embedding generation for fragments and queries.

use anyhow::{Context, Result};
use std::collections::HashMap;
use tracing::debug;

use fragdb_core::traits::{EmbeddingCache, EmbeddingModel};
use fragdb_core::types::{CacheStats, Fragment, FragmentId};
use fragdb_core::Error;

use crate::context::EmbeddingTextBuilder;

/// Turns fragments and query strings into fixed-dimension vectors, going
/// through the cache keyed by fragment id before touching the model.
pub struct EmbeddingGenerator {
    model: Box<dyn EmbeddingModel>,
    cache: Option<Box<dyn EmbeddingCache<Vec<f32>>>>,
    text_builder: EmbeddingTextBuilder,
}

impl EmbeddingGenerator {
    pub fn new(
        model: Box<dyn EmbeddingModel>,
        cache: Option<Box<dyn EmbeddingCache<Vec<f32>>>>,
    ) -> Self {
        Self { model, cache, text_builder: EmbeddingTextBuilder::default() }
    }

    pub fn with_text_builder(mut self, text_builder: EmbeddingTextBuilder) -> Self {
        self.text_builder = text_builder;
        self
    }

    pub fn dimension(&self) -> usize {
        self.model.dimension()
    }

    pub fn model_name(&self) -> &str {
        self.model.name()
    }

    pub fn text_builder(&self) -> &EmbeddingTextBuilder {
        &self.text_builder
    }

    /// Embed free text (queries). Model failures are hard errors; a zero
    /// vector substituted here would silently corrupt ranking.
    pub fn embed_text(&self, text: &str) -> Result<Vec<f32>> {
        let vector = self
            .model
            .encode(text)
            .with_context(|| Error::Embedding(format!("model '{}' inference", self.model.name())))?;
        self.check_dimension(&vector)?;
        Ok(vector)
    }

    /// Embed one fragment, consulting the cache by fragment id first. The
    /// cache write commits only after a successful model call.
    pub fn embed_fragment(&self, fragment: &Fragment) -> Result<Vec<f32>> {
        if let Some(cached) = self.cache_get(&fragment.id) {
            return Ok(cached);
        }
        let text = self.text_builder.build(fragment);
        let vector = self.embed_text(&text)?;
        self.cache_save(&fragment.id, &vector);
        Ok(vector)
    }

    /// Embed raw texts as a batch, in input order.
    pub fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        let vectors = self
            .model
            .encode_batch(texts)
            .with_context(|| Error::Embedding(format!("model '{}' batch inference", self.model.name())))?;
        for vector in &vectors {
            self.check_dimension(vector)?;
        }
        Ok(vectors)
    }

    /// Embed many fragments, sending only cache misses to the model and
    /// merging cached and fresh vectors. The returned map covers every
    /// input fragment; fresh vectors are written back to the cache.
    pub fn embed_fragments(
        &self,
        fragments: &[Fragment],
    ) -> Result<HashMap<FragmentId, Vec<f32>>> {
        let mut embeddings: HashMap<FragmentId, Vec<f32>> = HashMap::new();
        let mut pending_texts: Vec<String> = Vec::new();
        let mut pending_ids: Vec<&FragmentId> = Vec::new();

        for fragment in fragments {
            if let Some(cached) = self.cache_get(&fragment.id) {
                embeddings.insert(fragment.id.clone(), cached);
                continue;
            }
            pending_texts.push(self.text_builder.build(fragment));
            pending_ids.push(&fragment.id);
        }
        debug!(
            total = fragments.len(),
            cached = embeddings.len(),
            fresh = pending_ids.len(),
            "embedding fragments"
        );

        if !pending_texts.is_empty() {
            let fresh = self.embed_batch(&pending_texts)?;
            if fresh.len() != pending_ids.len() {
                return Err(Error::Embedding(format!(
                    "model returned {} vectors for {} texts",
                    fresh.len(),
                    pending_ids.len()
                ))
                .into());
            }
            for (id, vector) in pending_ids.into_iter().zip(fresh) {
                self.cache_save(id, &vector);
                embeddings.insert(id.clone(), vector);
            }
        }
        Ok(embeddings)
    }

    pub fn cache_stats(&self) -> Option<CacheStats> {
        self.cache.as_ref().map(|c| c.stats())
    }

    pub fn clear_cache(&self) {
        if let Some(cache) = &self.cache {
            cache.clear();
        }
    }

    fn check_dimension(&self, vector: &[f32]) -> Result<()> {
        if vector.len() != self.model.dimension() {
            return Err(Error::DimensionMismatch {
                expected: self.model.dimension(),
                actual: vector.len(),
            }
            .into());
        }
        Ok(())
    }

    fn cache_get(&self, id: &str) -> Option<Vec<f32>> {
        let cached = self.cache.as_ref()?.get(id)?;
        // A cached vector of the wrong dimension (stale model swap) is a miss.
        if cached.len() != self.model.dimension() {
            debug!(id, "cached vector has stale dimension, regenerating");
            return None;
        }
        Some(cached)
    }

    fn cache_save(&self, id: &str, vector: &[f32]) {
        if let Some(cache) = &self.cache {
            cache.save(id, &vector.to_vec());
        }
    }
}
