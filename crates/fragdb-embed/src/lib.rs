//! fragdb-embed
//!
//! Embedding generation with content-addressed caching, embedding-text
//! construction under a fixed character budget, and cross-encoder
//! reranking. Model weights are an external concern: anything implementing
//! the core `EmbeddingModel` / `CrossEncoderModel` capabilities plugs in.

pub mod cache;
pub mod context;
pub mod cross_encoder;
pub mod device;
pub mod generator;
pub mod model;
pub mod pool;
pub mod tokenize;

pub use cache::{disk_cache_at, DiskCache, MemoryCache};
pub use context::EmbeddingTextBuilder;
pub use cross_encoder::{get_default_cross_encoder, CrossEncoderScorer, OverlapCrossEncoder};
pub use generator::EmbeddingGenerator;
pub use model::{get_default_embedding_model, HashingEmbedder, XlmRobertaEncoder};
pub use pool::masked_mean_l2;
