//! Dual encoder - shared-weight text-to-vector model
//!
//! One model embeds both natural-language queries and code fragments into the
//! same 256-dimensional unit-norm space. The pipeline per text: tokenize with
//! truncation, run the transformer encoder, take the first-position hidden
//! state, dropout (training only), linear projection, layer norm, L2
//! normalization.
//!
//! Tokenization ([`Tokenize`]) and encoding ([`TokenEncoder`]) are separate
//! pure stages composed by [`DualEncoder`], so the projection head and
//! everything downstream can be exercised with the deterministic stub in
//! [`stub`] without live pretrained weights.

pub mod bert;
pub mod stub;

use candle_core::{Device, Tensor};
use candle_nn::{layer_norm, linear, Dropout, LayerNorm, Linear, Module, VarBuilder};
use std::sync::Arc;
use thiserror::Error;

/// Output dimension of every embedding vector.
pub const EMBEDDING_DIM: usize = 256;

/// Default truncation limit, in tokens.
pub const MAX_TOKENS: usize = 128;

/// Default dropout probability on the pooled state.
pub const DROPOUT_PROB: f32 = 0.2;

/// Encoder errors
#[derive(Debug, Error)]
pub enum EncoderError {
    #[error("Tokenization failed: {0}")]
    Tokenization(String),

    #[error("Model loading failed: {0}")]
    ModelLoad(String),

    #[error("Tensor error: {0}")]
    Tensor(#[from] candle_core::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Empty input batch")]
    EmptyBatch,
}

/// A tokenized batch, padded to a common length.
///
/// All tensors are `[batch, seq_len]`; `attention_mask` is 1 for real tokens
/// and 0 for padding.
#[derive(Debug)]
pub struct TokenBatch {
    pub input_ids: Tensor,
    pub token_type_ids: Tensor,
    pub attention_mask: Tensor,
}

/// Pure text-to-token stage.
pub trait Tokenize: Send + Sync {
    /// Tokenize a batch, truncating each text to `max_tokens`.
    fn encode_batch(
        &self,
        texts: &[&str],
        max_tokens: usize,
        device: &Device,
    ) -> Result<TokenBatch, EncoderError>;
}

/// Pure token-to-vector stage: token ids to per-position hidden states.
pub trait TokenEncoder: Send + Sync {
    /// Forward pass returning hidden states `[batch, seq_len, hidden]`.
    fn forward(&self, batch: &TokenBatch) -> Result<Tensor, EncoderError>;

    /// Width of the hidden states this encoder produces.
    fn hidden_size(&self) -> usize;
}

/// HuggingFace tokenizer wrapper.
pub struct HfTokenizer {
    inner: tokenizers::Tokenizer,
}

impl HfTokenizer {
    pub fn from_file(path: &std::path::Path) -> Result<Self, EncoderError> {
        let inner = tokenizers::Tokenizer::from_file(path)
            .map_err(|e| EncoderError::Tokenization(format!("{e}")))?;
        Ok(Self { inner })
    }
}

impl Tokenize for HfTokenizer {
    fn encode_batch(
        &self,
        texts: &[&str],
        max_tokens: usize,
        device: &Device,
    ) -> Result<TokenBatch, EncoderError> {
        let encodings = self
            .inner
            .encode_batch(texts.to_vec(), true)
            .map_err(|e| EncoderError::Tokenization(format!("{e}")))?;

        let rows: Vec<Vec<u32>> = encodings
            .iter()
            .map(|enc| {
                let ids = enc.get_ids();
                ids[..ids.len().min(max_tokens)].to_vec()
            })
            .collect();

        pad_batch(&rows, device)
    }
}

/// Pad truncated id rows to a common length and build the batch tensors.
pub(crate) fn pad_batch(rows: &[Vec<u32>], device: &Device) -> Result<TokenBatch, EncoderError> {
    if rows.is_empty() {
        return Err(EncoderError::EmptyBatch);
    }
    let batch = rows.len();
    // Every row gets at least one position so the first-position pool is defined
    let seq_len = rows.iter().map(|r| r.len()).max().unwrap_or(0).max(1);

    let mut ids = Vec::with_capacity(batch * seq_len);
    let mut mask = Vec::with_capacity(batch * seq_len);
    for row in rows {
        for i in 0..seq_len {
            match row.get(i) {
                Some(&id) => {
                    ids.push(id);
                    mask.push(1u32);
                }
                None => {
                    ids.push(0);
                    mask.push(0);
                }
            }
        }
    }

    let input_ids = Tensor::from_vec(ids, (batch, seq_len), device)?;
    let attention_mask = Tensor::from_vec(mask, (batch, seq_len), device)?;
    let token_type_ids = input_ids.zeros_like()?;

    Ok(TokenBatch {
        input_ids,
        token_type_ids,
        attention_mask,
    })
}

/// Dropout + projection + layer norm on the pooled hidden state.
pub struct ProjectionHead {
    dropout: Dropout,
    project: Linear,
    norm: LayerNorm,
}

impl ProjectionHead {
    /// Build the head under `vb`'s prefix so its parameters live in the same
    /// var map as the encoder and travel with checkpoints.
    pub fn new(hidden_size: usize, dropout_prob: f32, vb: VarBuilder) -> Result<Self, EncoderError> {
        let project = linear(hidden_size, EMBEDDING_DIM, vb.pp("project"))?;
        let norm = layer_norm(EMBEDDING_DIM, 1e-5, vb.pp("norm"))?;
        Ok(Self {
            dropout: Dropout::new(dropout_prob),
            project,
            norm,
        })
    }

    /// `[batch, hidden]` pooled states to `[batch, EMBEDDING_DIM]` unit vectors.
    pub fn forward(&self, pooled: &Tensor, train: bool) -> Result<Tensor, EncoderError> {
        let dropped = self.dropout.forward(pooled, train)?;
        let projected = self.project.forward(&dropped)?;
        let normed = self.norm.forward(&projected)?;
        Ok(l2_normalize(&normed)?)
    }
}

/// Shared-weight encoder for queries and code fragments.
pub struct DualEncoder {
    tokenizer: Arc<dyn Tokenize>,
    encoder: Arc<dyn TokenEncoder>,
    head: ProjectionHead,
    device: Device,
    max_tokens: usize,
}

impl DualEncoder {
    pub fn new(
        tokenizer: Arc<dyn Tokenize>,
        encoder: Arc<dyn TokenEncoder>,
        head: ProjectionHead,
        device: Device,
        max_tokens: usize,
    ) -> Self {
        Self {
            tokenizer,
            encoder,
            head,
            device,
            max_tokens,
        }
    }

    pub fn device(&self) -> &Device {
        &self.device
    }

    /// Full forward pass: texts to `[batch, EMBEDDING_DIM]` unit-norm vectors.
    ///
    /// `train` enables dropout on the pooled state; evaluation passes are
    /// deterministic.
    pub fn forward(&self, texts: &[&str], train: bool) -> Result<Tensor, EncoderError> {
        if texts.is_empty() {
            return Err(EncoderError::EmptyBatch);
        }
        let batch = self
            .tokenizer
            .encode_batch(texts, self.max_tokens, &self.device)?;
        let hidden = self.encoder.forward(&batch)?;
        // First-position ("aggregate") hidden state
        let pooled = hidden.narrow(1, 0, 1)?.squeeze(1)?;
        self.head.forward(&pooled, train)
    }

    /// Embed texts in evaluation mode, order-preserving.
    pub fn embed(&self, texts: &[&str]) -> Result<Vec<Vec<f32>>, EncoderError> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }
        let vectors = self.forward(texts, false)?;
        Ok(vectors.to_vec2::<f32>()?)
    }

    /// Embed a single text in evaluation mode.
    pub fn embed_one(&self, text: &str) -> Result<Vec<f32>, EncoderError> {
        let mut vectors = self.embed(&[text])?;
        vectors
            .pop()
            .ok_or(EncoderError::EmptyBatch)
    }
}

/// Row-wise L2 normalization of a `[batch, dim]` tensor.
pub fn l2_normalize(t: &Tensor) -> candle_core::Result<Tensor> {
    let norm = t.sqr()?.sum_keepdim(1)?.sqrt()?;
    t.broadcast_div(&norm)
}

/// Dot product of two unit-norm vectors; equals cosine similarity.
pub fn dot(a: &[f32], b: &[f32]) -> f32 {
    a.iter().zip(b.iter()).map(|(x, y)| x * y).sum()
}
