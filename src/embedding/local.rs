//! Local ONNX Runtime embedding provider.
//!
//! Runs all-MiniLM-L6-v2 via `ort`: tokenization, inference, mean pooling over
//! the attention mask, and L2 normalization. Inference is CPU-bound, so
//! [`LocalEmbeddingProvider::embed`] moves it onto the blocking pool.

use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use ort::session::Session;
use ort::value::Tensor;
use tokenizers::Tokenizer;

use super::{l2_normalize, EmbeddingProvider, LOCAL_EMBEDDING_DIM};
use crate::config::EmbeddingConfig;
use crate::error::{MemoryError, Result};

/// Maximum sequence length for all-MiniLM-L6-v2 (trained at 256).
const MAX_SEQ_LEN: usize = 256;

const PROVIDER: &str = "local";

fn inference_error(e: impl std::fmt::Display) -> MemoryError {
    MemoryError::upstream(PROVIDER, e.to_string())
}

/// Loaded model and tokenizer. All methods are synchronous.
struct OnnxModel {
    session: Mutex<Session>,
    tokenizer: Tokenizer,
}

// Safety: Tokenizer is Send+Sync and the Session is only reached through the Mutex.
unsafe impl Send for OnnxModel {}
unsafe impl Sync for OnnxModel {}

impl OnnxModel {
    fn load(config: &EmbeddingConfig) -> Result<Self> {
        let cache_dir = crate::config::expand_tilde(&config.cache_dir);
        let model_path = cache_dir.join("model.onnx");
        let tokenizer_path = cache_dir.join("tokenizer.json");

        for (what, path) in [("ONNX model", &model_path), ("tokenizer", &tokenizer_path)] {
            if !path.exists() {
                return Err(MemoryError::Config(format!(
                    "{what} not found at {}. Run `memory-mcp model download` first.",
                    path.display()
                )));
            }
        }

        let load_error = |e: &dyn std::fmt::Display| {
            MemoryError::Config(format!("failed to load ONNX model: {e}"))
        };
        let session = Session::builder()
            .map_err(|e| load_error(&e))?
            .with_optimization_level(ort::session::builder::GraphOptimizationLevel::Level3)
            .map_err(|e| load_error(&e))?
            .with_intra_threads(4)
            .map_err(|e| load_error(&e))?
            .commit_from_file(&model_path)
            .map_err(|e| load_error(&e))?;

        tracing::info!(model = %model_path.display(), "ONNX model loaded");

        let mut tokenizer = Tokenizer::from_file(&tokenizer_path)
            .map_err(|e| MemoryError::Config(format!("failed to load tokenizer: {e}")))?;
        tokenizer
            .with_truncation(Some(tokenizers::TruncationParams {
                max_length: MAX_SEQ_LEN,
                ..Default::default()
            }))
            .map_err(|e| MemoryError::Config(format!("failed to set truncation: {e}")))?;
        tokenizer.with_padding(Some(tokenizers::PaddingParams {
            strategy: tokenizers::PaddingStrategy::BatchLongest,
            ..Default::default()
        }));

        Ok(Self {
            session: Mutex::new(session),
            tokenizer,
        })
    }

    fn embed_batch(&self, texts: &[&str]) -> Result<Vec<Vec<f32>>> {
        if texts.is_empty() {
            return Ok(vec![]);
        }

        let encodings = self
            .tokenizer
            .encode_batch(texts.to_vec(), true)
            .map_err(|e| inference_error(format!("tokenization failed: {e}")))?;

        let batch_size = encodings.len();
        let seq_len = encodings[0].get_ids().len();

        let mut input_ids = Vec::with_capacity(batch_size * seq_len);
        let mut attention_mask = Vec::with_capacity(batch_size * seq_len);
        for encoding in &encodings {
            input_ids.extend(encoding.get_ids().iter().map(|&id| id as i64));
            attention_mask.extend(encoding.get_attention_mask().iter().map(|&m| m as i64));
        }

        let shape = vec![batch_size as i64, seq_len as i64];
        let ids_tensor = Tensor::from_array((shape.clone(), input_ids.into_boxed_slice()))
            .map_err(inference_error)?;
        let mask_tensor =
            Tensor::from_array((shape.clone(), attention_mask.clone().into_boxed_slice()))
                .map_err(inference_error)?;
        // Single-segment input: token_type_ids are all zero.
        let type_tensor =
            Tensor::from_array((shape, vec![0i64; batch_size * seq_len].into_boxed_slice()))
                .map_err(inference_error)?;

        let mut session = self
            .session
            .lock()
            .map_err(|e| inference_error(format!("session lock poisoned: {e}")))?;
        let outputs = session
            .run(ort::inputs! {
                "input_ids" => ids_tensor,
                "attention_mask" => mask_tensor,
                "token_type_ids" => type_tensor,
            })
            .map_err(inference_error)?;

        // Output name varies by export.
        let token_embeddings = outputs
            .get("token_embeddings")
            .or_else(|| outputs.get("last_hidden_state"))
            .unwrap_or_else(|| &outputs[0]);
        let (out_shape, data) = token_embeddings
            .try_extract_tensor::<f32>()
            .map_err(inference_error)?;

        let dims: &[i64] = &out_shape;
        if dims.len() != 3 || dims[2] != LOCAL_EMBEDDING_DIM as i64 {
            return Err(inference_error(format!(
                "unexpected token_embeddings shape {dims:?}, expected [batch, seq, {LOCAL_EMBEDDING_DIM}]"
            )));
        }
        let hidden = dims[2] as usize;
        let out_seq = dims[1] as usize;

        let pooled = (0..batch_size)
            .map(|b| {
                let mut sum = vec![0.0f32; hidden];
                let mut count = 0.0f32;
                for s in 0..out_seq {
                    if attention_mask[b * seq_len + s] == 0 {
                        continue;
                    }
                    let row = &data[(b * out_seq + s) * hidden..][..hidden];
                    sum.iter_mut().zip(row).for_each(|(acc, x)| *acc += x);
                    count += 1.0;
                }
                if count > 0.0 {
                    sum.iter_mut().for_each(|x| *x /= count);
                }
                l2_normalize(&sum)
            })
            .collect();

        Ok(pooled)
    }
}

/// all-MiniLM-L6-v2 on the local CPU.
pub struct LocalEmbeddingProvider {
    model: Arc<OnnxModel>,
    model_name: String,
}

impl LocalEmbeddingProvider {
    pub fn new(config: &EmbeddingConfig) -> Result<Self> {
        if config.dimensions != LOCAL_EMBEDDING_DIM {
            return Err(MemoryError::Config(format!(
                "the local provider produces {LOCAL_EMBEDDING_DIM} dimensions, but embedding.dimensions is {}",
                config.dimensions
            )));
        }
        Ok(Self {
            model: Arc::new(OnnxModel::load(config)?),
            model_name: config.model.clone(),
        })
    }
}

#[async_trait]
impl EmbeddingProvider for LocalEmbeddingProvider {
    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        let model = Arc::clone(&self.model);
        let text = text.to_string();
        let mut batch = tokio::task::spawn_blocking(move || model.embed_batch(&[text.as_str()]))
            .await??;
        batch
            .pop()
            .ok_or_else(|| inference_error("model returned no embedding"))
    }

    fn dimensions(&self) -> usize {
        LOCAL_EMBEDDING_DIM
    }

    fn model_name(&self) -> &str {
        &self.model_name
    }

    fn provider_name(&self) -> &'static str {
        PROVIDER
    }
}
