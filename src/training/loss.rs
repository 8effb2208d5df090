//! In-batch-negative contrastive objective.
//!
//! For a batch of N pairs, the similarity matrix between the natural-language
//! and code embeddings is `[N, N]`; row i's positive class is column i and the
//! remaining N-1 columns act as free negatives. Cross-entropy over each row
//! pulls the paired embeddings together and pushes the rest apart.
//!
//! The batch composition defines the negative set: duplicate or near-duplicate
//! pairs in one batch weaken the signal. Known limitation, not corrected here.

use candle_core::Tensor;
use candle_nn::loss::cross_entropy;

/// Contrastive loss over two `[N, dim]` unit-norm embedding matrices.
///
/// `temperature` scales the similarity logits; smaller values sharpen the
/// softmax.
pub fn contrastive_loss(
    nl_embeddings: &Tensor,
    code_embeddings: &Tensor,
    temperature: f64,
) -> candle_core::Result<Tensor> {
    let logits = nl_embeddings
        .matmul(&code_embeddings.t()?)?
        .affine(1.0 / temperature, 0.0)?;

    let n = logits.dim(0)?;
    let labels = Tensor::arange(0u32, n as u32, logits.device())?;
    cross_entropy(&logits, &labels)
}
