use crate::types::{CacheStats, Fragment};

/// Opaque text-embedding capability. Implementations must keep `dimension`
/// constant for the lifetime of any index built against them.
pub trait EmbeddingModel: Send + Sync {
    fn dimension(&self) -> usize;
    fn name(&self) -> &str;
    fn encode(&self, text: &str) -> anyhow::Result<Vec<f32>>;
    fn encode_batch(&self, texts: &[String]) -> anyhow::Result<Vec<Vec<f32>>> {
        texts.iter().map(|t| self.encode(t)).collect()
    }
}

/// Opaque pairwise relevance capability used by the reranking stage.
pub trait CrossEncoderModel: Send + Sync {
    fn name(&self) -> &str;
    fn predict(&self, query: &str, passage: &str) -> anyhow::Result<f32>;
}

/// Pure memoization layer for computed values (embedding vectors, pair
/// scores). Its absence or loss never changes results, only latency, so
/// `get` and `save` swallow backend errors at their origin.
pub trait EmbeddingCache<T>: Send + Sync {
    fn get(&self, key: &str) -> Option<T>;
    fn save(&self, key: &str, value: &T);
    fn contains(&self, key: &str) -> bool;
    fn clear(&self);
    fn stats(&self) -> CacheStats;
}

/// Upstream producer of [`Fragment`] records. Fragment extraction is
/// external to this engine; only `id` stability and schema conformance are
/// assumed.
pub trait FragmentSource {
    fn fragments(&self) -> anyhow::Result<Vec<Fragment>>;
}
