//! Built-in implementations of the [`EmbeddingModel`] capability: a local
//! XLM-Roberta encoder loaded through candle, and a deterministic hashing
//! embedder for offline and test use.

use anyhow::{anyhow, Result};
use std::path::{Path, PathBuf};

use candle_core::{DType, Device, Tensor};
use candle_nn::VarBuilder;
use candle_transformers::models::xlm_roberta::{Config as XLMRobertaConfig, XLMRobertaModel};
use tokenizers::Tokenizer;
use tracing::{info, warn};

use fragdb_core::traits::EmbeddingModel;

use crate::device::select_device;
use crate::pool::masked_mean_l2;
use crate::tokenize::tokenize_on_device;

const MAX_SEQ_LEN: usize = 256;

/// Local XLM-Roberta sentence encoder (BGE-M3 weights layout): tokenizer +
/// config + weights loaded from one directory, masked mean pooling, unit
/// normalization.
pub struct XlmRobertaEncoder {
    model: XLMRobertaModel,
    tokenizer: Tokenizer,
    device: Device,
    dimension: usize,
    model_name: String,
}

impl XlmRobertaEncoder {
    pub fn from_dir(model_dir: &Path) -> Result<Self> {
        let device = select_device();

        let tokenizer_path = model_dir.join("tokenizer.json");
        let tokenizer = Tokenizer::from_file(&tokenizer_path).map_err(|e| {
            anyhow!("Failed to load tokenizer from {}: {}", tokenizer_path.display(), e)
        })?;

        let config_path = model_dir.join("config.json");
        let config: XLMRobertaConfig =
            serde_json::from_str(&std::fs::read_to_string(&config_path)?)?;
        let dimension = config.hidden_size;

        let weights_path = model_dir.join("pytorch_model.bin");
        let weights = candle_core::pickle::read_all(&weights_path)?;
        let weights_map: std::collections::HashMap<String, Tensor> =
            weights.into_iter().collect();
        let vb = VarBuilder::from_tensors(weights_map, DType::F32, &device);
        let model = XLMRobertaModel::new(&config, vb)?;

        let model_name = model_dir
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_else(|| "xlm-roberta".to_string());
        info!(model = %model_name, dimension, "encoder loaded");

        Ok(Self { model, tokenizer, device, dimension, model_name })
    }

    pub fn from_env() -> Result<Self> {
        Self::from_dir(&resolve_model_dir()?)
    }
}

impl EmbeddingModel for XlmRobertaEncoder {
    fn dimension(&self) -> usize {
        self.dimension
    }

    fn name(&self) -> &str {
        &self.model_name
    }

    fn encode(&self, text: &str) -> Result<Vec<f32>> {
        let (input_ids, attention_mask) =
            tokenize_on_device(&self.tokenizer, text, MAX_SEQ_LEN, &self.device)?;
        let token_type_ids = Tensor::zeros((1, MAX_SEQ_LEN), DType::I64, &self.device)?;
        let hidden_states =
            self.model
                .forward(&input_ids, &attention_mask, &token_type_ids, None, None, None)?;
        let pooled = masked_mean_l2(&hidden_states, &attention_mask)?;
        let embedding: Vec<f32> = pooled.to_device(&Device::Cpu)?.squeeze(0)?.to_vec1()?;
        if embedding.len() != self.dimension {
            return Err(fragdb_core::Error::DimensionMismatch {
                expected: self.dimension,
                actual: embedding.len(),
            }
            .into());
        }
        Ok(embedding)
    }
}

/// Deterministic hashing embedder: tokens are bucketed by their xxHash64
/// value and the resulting sparse vector is L2-normalized. Shares the
/// `EmbeddingModel` contract so the full pipeline runs without model
/// weights; similarity is token overlap, which is stable across runs.
pub struct HashingEmbedder {
    dimension: usize,
}

impl HashingEmbedder {
    pub fn new(dimension: usize) -> Self {
        Self { dimension }
    }
}

impl EmbeddingModel for HashingEmbedder {
    fn dimension(&self) -> usize {
        self.dimension
    }

    fn name(&self) -> &str {
        "hashing-embedder"
    }

    fn encode(&self, text: &str) -> Result<Vec<f32>> {
        use std::hash::{Hash, Hasher};
        use twox_hash::XxHash64;

        let mut v = vec![0f32; self.dimension];
        for (i, token) in text.split_whitespace().enumerate() {
            let mut hasher = XxHash64::with_seed(0);
            token.hash(&mut hasher);
            let h = hasher.finish();
            let idx = (h as usize) % self.dimension;
            let val = (((h >> 32) as u32) as f32) / (u32::MAX as f32);
            v[idx] += val + (i as f32 % 3.0) * 0.01;
        }
        let norm = (v.iter().map(|x| x * x).sum::<f32>()).sqrt().max(1e-6);
        for x in &mut v {
            *x /= norm;
        }
        Ok(v)
    }
}

/// Default model selection: the hashing embedder when
/// `FRAGDB_USE_FAKE_EMBEDDINGS` is set, otherwise the local XLM-Roberta
/// encoder resolved from the model directory.
pub fn get_default_embedding_model() -> Result<Box<dyn EmbeddingModel>> {
    let use_fake = std::env::var("FRAGDB_USE_FAKE_EMBEDDINGS")
        .ok()
        .map(|v| v == "1" || v.eq_ignore_ascii_case("true"))
        .unwrap_or(false);
    if use_fake {
        warn!("using hashing embedder (FRAGDB_USE_FAKE_EMBEDDINGS set)");
        return Ok(Box::new(HashingEmbedder::new(1024)));
    }
    Ok(Box::new(XlmRobertaEncoder::from_env()?))
}

fn resolve_model_dir() -> Result<PathBuf> {
    if let Ok(dir) = std::env::var("FRAGDB_MODEL_DIR") {
        let p = PathBuf::from(&dir);
        if p.exists() {
            return Ok(p);
        }
    }
    if let Ok(dir) = std::env::var("MODEL_DIR") {
        let p = PathBuf::from(&dir);
        if p.exists() {
            return Ok(p);
        }
    }
    let root = Path::new("../models/bge-m3");
    if root.exists() {
        return Ok(root.to_path_buf());
    }
    let legacy = Path::new("models/bge-m3");
    if legacy.exists() {
        return Ok(legacy.to_path_buf());
    }
    Err(anyhow!("Could not locate an embedding model directory"))
}
