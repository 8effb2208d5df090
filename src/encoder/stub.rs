//! Deterministic stub stages for tests and offline development.
//!
//! [`HashTokenizer`] hashes whitespace-separated words into a small id space;
//! [`StubTokenEncoder`] looks the ids up in a fixed pseudo-random table. Both
//! are pure functions of their input, so every pipeline property (norms,
//! determinism, ranking) can be checked without pretrained weights.

use super::{pad_batch, EncoderError, TokenBatch, Tokenize, TokenEncoder};
use candle_core::{DType, Device, Tensor};

/// Whitespace tokenizer with hashed ids.
pub struct HashTokenizer {
    vocab_size: u32,
}

impl HashTokenizer {
    pub fn new(vocab_size: u32) -> Self {
        Self { vocab_size }
    }

    fn token_id(&self, word: &str) -> u32 {
        // FNV-1a, reduced into the vocab
        let mut hash: u64 = 0xcbf29ce484222325;
        for byte in word.bytes() {
            hash ^= byte as u64;
            hash = hash.wrapping_mul(0x100000001b3);
        }
        (hash % self.vocab_size as u64) as u32
    }
}

impl Tokenize for HashTokenizer {
    fn encode_batch(
        &self,
        texts: &[&str],
        max_tokens: usize,
        device: &Device,
    ) -> Result<TokenBatch, EncoderError> {
        let rows: Vec<Vec<u32>> = texts
            .iter()
            .map(|text| {
                text.split_whitespace()
                    .take(max_tokens)
                    .map(|word| self.token_id(word))
                    .collect()
            })
            .collect();
        pad_batch(&rows, device)
    }
}

/// Token encoder backed by a fixed embedding table.
pub struct StubTokenEncoder {
    table: Tensor,
    hidden_size: usize,
}

impl StubTokenEncoder {
    pub fn new(vocab_size: usize, hidden_size: usize, device: &Device) -> Result<Self, EncoderError> {
        // Fixed pseudo-random table; the same everywhere, every run
        let values: Vec<f32> = (0..vocab_size * hidden_size)
            .map(|i| ((i as f32) * 0.618033988 + 0.5).sin())
            .collect();
        let table = Tensor::from_vec(values, (vocab_size, hidden_size), device)?;
        Ok(Self { table, hidden_size })
    }
}

impl TokenEncoder for StubTokenEncoder {
    fn forward(&self, batch: &TokenBatch) -> Result<Tensor, EncoderError> {
        let (batch_size, seq_len) = batch.input_ids.dims2()?;
        let flat = batch.input_ids.flatten_all()?;
        let hidden = self
            .table
            .index_select(&flat, 0)?
            .reshape((batch_size, seq_len, self.hidden_size))?;

        // The first position carries a masked mean over the sequence, so the
        // pooled state depends on every token rather than only the first one.
        let mask = batch.attention_mask.to_dtype(DType::F32)?.unsqueeze(2)?;
        let summed = hidden.broadcast_mul(&mask)?.sum(1)?;
        let counts = mask.sum(1)?.maximum(1.0)?;
        let pooled = summed.broadcast_div(&counts)?.unsqueeze(1)?;
        if seq_len == 1 {
            return Ok(pooled);
        }
        let rest = hidden.narrow(1, 1, seq_len - 1)?;
        Ok(Tensor::cat(&[pooled, rest], 1)?)
    }

    fn hidden_size(&self) -> usize {
        self.hidden_size
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hash_tokenizer_is_stable() {
        let tokenizer = HashTokenizer::new(64);
        assert_eq!(tokenizer.token_id("loop"), tokenizer.token_id("loop"));
        // Different words land on different ids for this vocab size
        assert_ne!(tokenizer.token_id("loop"), tokenizer.token_id("index"));
    }

    #[test]
    fn test_stub_encoder_shapes() {
        let device = Device::Cpu;
        let tokenizer = HashTokenizer::new(64);
        let encoder = StubTokenEncoder::new(64, 16, &device).unwrap();

        let batch = tokenizer
            .encode_batch(&["one two three", "four"], 128, &device)
            .unwrap();
        let hidden = encoder.forward(&batch).unwrap();
        assert_eq!(hidden.dims(), &[2, 3, 16]);
    }

    #[test]
    fn test_first_position_reflects_later_tokens() {
        let device = Device::Cpu;
        let tokenizer = HashTokenizer::new(64);
        let encoder = StubTokenEncoder::new(64, 16, &device).unwrap();

        // Same first word, different tails; the pooled position must differ
        let batch = tokenizer
            .encode_batch(&["def close_socket conn", "def parse_header line"], 128, &device)
            .unwrap();
        let hidden = encoder.forward(&batch).unwrap();
        let first = hidden.narrow(1, 0, 1).unwrap().squeeze(1).unwrap();
        let rows = first.to_vec2::<f32>().unwrap();
        assert_ne!(rows[0], rows[1]);
    }

    #[test]
    fn test_stub_encoder_deterministic() {
        let device = Device::Cpu;
        let tokenizer = HashTokenizer::new(64);
        let encoder = StubTokenEncoder::new(64, 16, &device).unwrap();

        let a = tokenizer.encode_batch(&["same text"], 128, &device).unwrap();
        let b = tokenizer.encode_batch(&["same text"], 128, &device).unwrap();
        let ha = encoder.forward(&a).unwrap().to_vec3::<f32>().unwrap();
        let hb = encoder.forward(&b).unwrap().to_vec3::<f32>().unwrap();
        assert_eq!(ha, hb);
    }
}
