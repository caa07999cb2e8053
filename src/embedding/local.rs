//! Local ONNX Runtime embedding provider.
//!
//! Implements [`EmbeddingProvider`] with all-MiniLM-L6-v2 via `ort`:
//! tokenization, inference, attention-masked mean pooling, and L2
//! normalization. Everything runs on-device; no text leaves the machine.

use std::sync::Mutex;

use anyhow::{Context, Result};
use ndarray::{s, Array1, ArrayView3};
use ort::session::Session;
use ort::value::Tensor;
use tokenizers::Tokenizer;

use super::{EmbeddingProvider, EMBEDDING_DIM};
use crate::config::EmbeddingConfig;

/// Maximum sequence length for all-MiniLM-L6-v2 (trained at 256).
const MAX_SEQ_LEN: usize = 256;

/// Tokenized batch ready for inference.
struct EncodedBatch {
    input_ids: Vec<i64>,
    attention_mask: Vec<i64>,
    batch_size: usize,
    seq_len: usize,
}

pub struct LocalEmbedder {
    session: Mutex<Session>,
    tokenizer: Tokenizer,
}

// Safety: Tokenizer is Send+Sync. Session is behind a Mutex, which guarantees
// exclusive access during run().
unsafe impl Send for LocalEmbedder {}
unsafe impl Sync for LocalEmbedder {}

impl LocalEmbedder {
    pub fn new(config: &EmbeddingConfig) -> Result<Self> {
        let cache_dir = crate::config::expand_tilde(&config.cache_dir);
        let model_path = cache_dir.join("model.onnx");
        let tokenizer_path = cache_dir.join("tokenizer.json");

        anyhow::ensure!(
            model_path.exists(),
            "ONNX model not found at {}. Run `engram model download` first.",
            model_path.display()
        );
        anyhow::ensure!(
            tokenizer_path.exists(),
            "Tokenizer not found at {}. Run `engram model download` first.",
            tokenizer_path.display()
        );

        let session = Session::builder()?
            .with_optimization_level(ort::session::builder::GraphOptimizationLevel::Level3)?
            .with_intra_threads(4)?
            .commit_from_file(&model_path)
            .context("failed to load ONNX model")?;

        tracing::info!(model = %model_path.display(), "ONNX model loaded");

        let mut tokenizer = Tokenizer::from_file(&tokenizer_path)
            .map_err(|e| anyhow::anyhow!("failed to load tokenizer: {e}"))?;

        tokenizer
            .with_truncation(Some(tokenizers::TruncationParams {
                max_length: MAX_SEQ_LEN,
                ..Default::default()
            }))
            .map_err(|e| anyhow::anyhow!("failed to set truncation: {e}"))?;

        tokenizer.with_padding(Some(tokenizers::PaddingParams {
            strategy: tokenizers::PaddingStrategy::BatchLongest,
            ..Default::default()
        }));

        tracing::info!(tokenizer = %tokenizer_path.display(), "tokenizer loaded");

        Ok(Self {
            session: Mutex::new(session),
            tokenizer,
        })
    }

    fn encode(&self, texts: &[&str]) -> Result<EncodedBatch> {
        let encodings = self
            .tokenizer
            .encode_batch(texts.to_vec(), true)
            .map_err(|e| anyhow::anyhow!("tokenization failed: {e}"))?;

        let batch_size = encodings.len();
        let seq_len = encodings[0].get_ids().len();

        let mut input_ids = Vec::with_capacity(batch_size * seq_len);
        let mut attention_mask = Vec::with_capacity(batch_size * seq_len);
        for encoding in &encodings {
            input_ids.extend(encoding.get_ids().iter().map(|&id| id as i64));
            attention_mask.extend(encoding.get_attention_mask().iter().map(|&m| m as i64));
        }

        Ok(EncodedBatch {
            input_ids,
            attention_mask,
            batch_size,
            seq_len,
        })
    }
}

impl EmbeddingProvider for LocalEmbedder {
    fn embed(&self, text: &str) -> Result<Vec<f32>> {
        let results = self.embed_batch(&[text])?;
        Ok(results.into_iter().next().expect("batch had one input"))
    }

    fn embed_batch(&self, texts: &[&str]) -> Result<Vec<Vec<f32>>> {
        if texts.is_empty() {
            return Ok(vec![]);
        }

        let batch = self.encode(texts)?;
        let shape = vec![batch.batch_size as i64, batch.seq_len as i64];

        let input_ids = Tensor::from_array((shape.clone(), batch.input_ids.into_boxed_slice()))?;
        let attention =
            Tensor::from_array((shape.clone(), batch.attention_mask.clone().into_boxed_slice()))?;
        // token_type_ids: all zeros (single sentence, no segment B)
        let token_types = vec![0i64; batch.batch_size * batch.seq_len];
        let token_types = Tensor::from_array((shape, token_types.into_boxed_slice()))?;

        let mut session = self
            .session
            .lock()
            .map_err(|e| anyhow::anyhow!("session lock poisoned: {e}"))?;

        let outputs = session.run(ort::inputs! {
            "input_ids" => input_ids,
            "attention_mask" => attention,
            "token_type_ids" => token_types,
        })?;

        // The output name varies by ONNX export. Try common names, fall back to index 0.
        let hidden = outputs
            .get("token_embeddings")
            .or_else(|| outputs.get("last_hidden_state"))
            .unwrap_or_else(|| &outputs[0]);

        let (out_shape, data) = hidden
            .try_extract_tensor::<f32>()
            .context("failed to extract token embeddings tensor")?;

        let dims: &[i64] = &out_shape;
        anyhow::ensure!(
            dims.len() == 3 && dims[2] == EMBEDDING_DIM as i64,
            "unexpected token embeddings shape: {dims:?}, expected [batch, seq, {EMBEDDING_DIM}]"
        );
        let out_seq_len = dims[1] as usize;

        let hidden = ArrayView3::from_shape(
            (batch.batch_size, out_seq_len, EMBEDDING_DIM),
            data,
        )
        .context("token embeddings tensor has inconsistent shape")?;

        // Attention-masked mean pooling, then L2 normalization
        let mut results = Vec::with_capacity(batch.batch_size);
        for b in 0..batch.batch_size {
            let mut pooled = Array1::<f32>::zeros(EMBEDDING_DIM);
            let mut count = 0.0f32;
            for t in 0..out_seq_len.min(batch.seq_len) {
                if batch.attention_mask[b * batch.seq_len + t] > 0 {
                    pooled += &hidden.slice(s![b, t, ..]);
                    count += 1.0;
                }
            }
            if count > 0.0 {
                pooled /= count;
            }
            results.push(l2_normalize(pooled.as_slice().expect("contiguous array")));
        }

        Ok(results)
    }
}

/// L2-normalize a vector. Returns a zero vector if the input norm is zero.
fn l2_normalize(v: &[f32]) -> Vec<f32> {
    let norm: f32 = v.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm > 0.0 {
        v.iter().map(|x| x / norm).collect()
    } else {
        v.to_vec()
    }
}
