//! Pretrained BERT-family token encoder.
//!
//! Loads a code-pretrained BERT checkpoint (config + safetensors + tokenizer)
//! into a [`VarMap`] so the last K transformer blocks and the projection head
//! stay trainable while everything else is frozen. The frozen/trainable split
//! is by parameter name: only variables returned by [`trainable_vars`] are
//! handed to the optimizer.

use super::{
    DualEncoder, EncoderError, HfTokenizer, ProjectionHead, TokenBatch, TokenEncoder,
    DROPOUT_PROB,
};
use candle_core::{DType, Device, Tensor, Var};
use candle_nn::{VarBuilder, VarMap};
use candle_transformers::models::bert::{BertModel, Config as BertConfig};
use std::fs::File;
use std::path::Path;
use std::sync::Arc;

/// Default number of trailing transformer blocks left trainable.
pub const DEFAULT_UNFREEZE_LAYERS: usize = 4;

/// BERT encoder stage backed by candle.
pub struct BertTokenEncoder {
    model: BertModel,
    hidden_size: usize,
}

impl BertTokenEncoder {
    /// Build the model graph inside `varmap` and overwrite its parameters
    /// from `model.safetensors` in `model_dir`.
    pub fn load(
        model_dir: &Path,
        varmap: &mut VarMap,
        device: &Device,
    ) -> Result<(Self, usize), EncoderError> {
        let config_file = File::open(model_dir.join("config.json"))?;
        let config: BertConfig = serde_json::from_reader(config_file)?;

        let vb = VarBuilder::from_varmap(varmap, DType::F32, device);
        let model = BertModel::load(vb, &config)
            .map_err(|e| EncoderError::ModelLoad(format!("bert graph: {e}")))?;

        let weights = model_dir.join("model.safetensors");
        varmap
            .load(&weights)
            .map_err(|e| EncoderError::ModelLoad(format!("{}: {e}", weights.display())))?;

        let hidden_size = config.hidden_size;
        Ok((
            Self { model, hidden_size },
            config.num_hidden_layers,
        ))
    }
}

impl TokenEncoder for BertTokenEncoder {
    fn forward(&self, batch: &TokenBatch) -> Result<Tensor, EncoderError> {
        Ok(self.model.forward(
            &batch.input_ids,
            &batch.token_type_ids,
            Some(&batch.attention_mask),
        )?)
    }

    fn hidden_size(&self) -> usize {
        self.hidden_size
    }
}

/// Load the full dual encoder from a model directory containing
/// `config.json`, `model.safetensors`, and `tokenizer.json`.
///
/// `max_tokens` is the per-text truncation limit the encoder will apply.
/// Returns the encoder, the var map holding all of its parameters, and the
/// pretrained encoder's layer count (needed to resolve the unfreeze split).
pub fn load_pretrained(
    model_dir: &Path,
    max_tokens: usize,
    device: &Device,
) -> Result<(DualEncoder, VarMap, usize), EncoderError> {
    let mut varmap = VarMap::new();
    let (encoder, num_layers) = BertTokenEncoder::load(model_dir, &mut varmap, device)?;
    let hidden_size = encoder.hidden_size();

    let vb = VarBuilder::from_varmap(&varmap, DType::F32, device);
    let head = ProjectionHead::new(hidden_size, DROPOUT_PROB, vb.pp("head"))?;

    let tokenizer = HfTokenizer::from_file(&model_dir.join("tokenizer.json"))?;

    let dual = DualEncoder::new(
        Arc::new(tokenizer),
        Arc::new(encoder),
        head,
        device.clone(),
        max_tokens,
    );
    Ok((dual, varmap, num_layers))
}

/// Select the adaptable parameters: the projection head plus the last
/// `unfreeze_layers` transformer blocks. Everything else stays frozen.
///
/// The result is sorted by name so optimizer state lines up across runs.
pub fn trainable_vars(varmap: &VarMap, unfreeze_layers: usize, num_layers: usize) -> Vec<Var> {
    let first_trainable = num_layers.saturating_sub(unfreeze_layers);
    let data = varmap.data().lock().expect("var map lock");

    let mut named: Vec<(&String, &Var)> = data
        .iter()
        .filter(|(name, _)| {
            name.starts_with("head.")
                || encoder_layer_index(name).is_some_and(|i| i >= first_trainable)
        })
        .collect();
    named.sort_by(|a, b| a.0.cmp(b.0));
    named.into_iter().map(|(_, var)| var.clone()).collect()
}

/// Parse the block index out of names like `encoder.layer.11.attention...`.
fn encoder_layer_index(name: &str) -> Option<usize> {
    name.strip_prefix("encoder.layer.")?
        .split('.')
        .next()?
        .parse()
        .ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use candle_nn::VarBuilder;

    #[test]
    fn test_encoder_layer_index() {
        assert_eq!(
            encoder_layer_index("encoder.layer.11.attention.self.query.weight"),
            Some(11)
        );
        assert_eq!(encoder_layer_index("encoder.layer.0.output.dense.bias"), Some(0));
        assert_eq!(encoder_layer_index("embeddings.word_embeddings.weight"), None);
        assert_eq!(encoder_layer_index("head.project.weight"), None);
    }

    #[test]
    fn test_trainable_vars_selects_head_and_tail_layers() {
        let device = Device::Cpu;
        let varmap = VarMap::new();
        let vb = VarBuilder::from_varmap(&varmap, DType::F32, &device);

        // Minimal graph standing in for a 4-layer encoder plus head
        for i in 0..4 {
            vb.pp(format!("encoder.layer.{i}"))
                .get_with_hints((2, 2), "weight", candle_nn::init::ZERO)
                .unwrap();
        }
        vb.pp("embeddings")
            .get_with_hints((2, 2), "word_embeddings.weight", candle_nn::init::ZERO)
            .unwrap();
        let _head = ProjectionHead::new(2, 0.0, vb.pp("head")).unwrap();

        // Last 2 of 4 layers + head (projection weight/bias, norm weight/bias)
        let vars = trainable_vars(&varmap, 2, 4);
        assert_eq!(vars.len(), 2 + 4);

        // Unfreezing more layers than exist trains everything under encoder.layer
        let all_layers = trainable_vars(&varmap, 16, 4);
        assert_eq!(all_layers.len(), 4 + 4);
    }
}
