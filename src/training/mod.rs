//! Contrastive trainer - offline fine-tuning of the dual encoder
//!
//! Fits the encoder's adaptable parameters (projection head + the unfrozen
//! tail of the transformer) on (natural language, code) pairs with the
//! in-batch-negative contrastive objective. Training is single-threaded,
//! synchronous, and blocking: batches run strictly sequentially and the run
//! occupies the process for its full duration.
//!
//! Per epoch the mean validation loss is computed in evaluation mode; an
//! improvement persists a `best` checkpoint, and a `final` checkpoint is
//! always written after the last epoch.

pub mod checkpoint;
pub mod data;
pub mod loss;

pub use checkpoint::{Checkpoint, CheckpointTag};
pub use data::{Batch, PairCorpus, TrainingPair};
pub use loss::contrastive_loss;

use crate::encoder::DualEncoder;
use candle_core::backprop::GradStore;
use candle_core::Var;
use candle_nn::{AdamW, Optimizer, ParamsAdamW, VarMap};
use rand::SeedableRng;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use thiserror::Error;

/// Training errors
#[derive(Debug, Error)]
pub enum TrainingError {
    #[error("Validation partition is empty; refusing to train without one")]
    EmptyValidation,

    #[error("Training partition is empty")]
    EmptyTrain,

    #[error("Loss diverged to a non-finite value in epoch {epoch}")]
    Diverged { epoch: usize },

    #[error("Corpus error: {0}")]
    Corpus(String),

    #[error("Checkpoint error: {0}")]
    Checkpoint(String),

    #[error("Encoder error: {0}")]
    Encoder(#[from] crate::encoder::EncoderError),

    #[error("Tensor error: {0}")]
    Tensor(#[from] candle_core::Error),
}

/// Hyperparameters for one training run.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TrainerConfig {
    pub epochs: usize,
    pub learning_rate: f64,
    pub batch_size: usize,
    pub temperature: f64,
    /// Fraction of total steps spent ramping the learning rate up.
    pub warmup_fraction: f64,
    /// Global gradient norm ceiling applied before every step.
    pub clip_norm: f64,
    pub weight_decay: f64,
    /// Shuffle seed, fixed so runs are reproducible.
    pub seed: u64,
}

impl Default for TrainerConfig {
    fn default() -> Self {
        Self {
            epochs: 5,
            learning_rate: 2e-5,
            batch_size: 16,
            temperature: 0.07,
            warmup_fraction: 0.1,
            clip_norm: 1.0,
            weight_decay: 0.01,
            seed: 42,
        }
    }
}

/// One epoch's losses.
#[derive(Debug, Clone, Serialize)]
pub struct EpochReport {
    pub epoch: usize,
    pub train_loss: f32,
    pub validation_loss: f32,
}

/// Outcome of a completed run.
#[derive(Debug)]
pub struct TrainingSummary {
    pub epochs: Vec<EpochReport>,
    pub best: Option<Checkpoint>,
    pub final_checkpoint: Checkpoint,
}

/// Offline contrastive fine-tuning loop.
pub struct ContrastiveTrainer {
    encoder: DualEncoder,
    varmap: VarMap,
    trainable: Vec<Var>,
    config: TrainerConfig,
    checkpoint_dir: PathBuf,
}

impl ContrastiveTrainer {
    pub fn new(
        encoder: DualEncoder,
        varmap: VarMap,
        trainable: Vec<Var>,
        config: TrainerConfig,
        checkpoint_dir: PathBuf,
    ) -> Self {
        Self {
            encoder,
            varmap,
            trainable,
            config,
            checkpoint_dir,
        }
    }

    pub fn encoder(&self) -> &DualEncoder {
        &self.encoder
    }

    /// Run the full training loop over `corpus`.
    ///
    /// An empty validation partition is a configuration error and is rejected
    /// before any training happens. A non-finite loss aborts the run as a
    /// failed epoch rather than being silently recovered.
    pub fn train(&mut self, corpus: &PairCorpus) -> Result<TrainingSummary, TrainingError> {
        if corpus.validation.is_empty() {
            return Err(TrainingError::EmptyValidation);
        }
        if corpus.train.is_empty() {
            return Err(TrainingError::EmptyTrain);
        }

        let mut rng = rand::rngs::StdRng::seed_from_u64(self.config.seed);
        let batches_per_epoch = corpus.train.len().div_ceil(self.config.batch_size.max(1));
        let total_steps = batches_per_epoch * self.config.epochs;
        let warmup_steps = (self.config.warmup_fraction * total_steps as f64) as usize;

        let params = ParamsAdamW {
            lr: self.config.learning_rate,
            weight_decay: self.config.weight_decay,
            ..Default::default()
        };
        let mut optimizer = AdamW::new(self.trainable.clone(), params)?;

        let mut step = 0usize;
        let mut best_validation_loss = f32::INFINITY;
        let mut best: Option<Checkpoint> = None;
        let mut epochs = Vec::with_capacity(self.config.epochs);
        let mut last_validation_loss = f32::INFINITY;

        for epoch in 1..=self.config.epochs {
            let mut train_loss_sum = 0.0f32;
            let batches = corpus.train_batches(self.config.batch_size, &mut rng);
            let batch_count = batches.len();

            for batch in batches {
                let nl = self.encoder.forward(&batch.natural_language, true)?;
                let code = self.encoder.forward(&batch.code, true)?;
                let loss = contrastive_loss(&nl, &code, self.config.temperature)?;

                let loss_value = loss.to_scalar::<f32>()?;
                if !loss_value.is_finite() {
                    return Err(TrainingError::Diverged { epoch });
                }

                let mut grads = loss.backward()?;
                clip_grad_norm(&self.trainable, &mut grads, self.config.clip_norm)?;
                optimizer.set_learning_rate(learning_rate_at(
                    step,
                    warmup_steps,
                    total_steps,
                    self.config.learning_rate,
                ));
                optimizer.step(&grads)?;

                step += 1;
                train_loss_sum += loss_value;
            }

            let train_loss = train_loss_sum / batch_count as f32;
            let validation_loss = self.validate(corpus, epoch)?;
            last_validation_loss = validation_loss;

            tracing::info!(
                epoch,
                total = self.config.epochs,
                train_loss,
                validation_loss,
                "epoch complete"
            );
            epochs.push(EpochReport {
                epoch,
                train_loss,
                validation_loss,
            });

            if validation_loss < best_validation_loss {
                best_validation_loss = validation_loss;
                let snapshot = checkpoint::persist(
                    &self.varmap,
                    &self.checkpoint_dir,
                    CheckpointTag::Best,
                    validation_loss,
                )?;
                tracing::info!(validation_loss, "validation improved, best checkpoint saved");
                best = Some(snapshot);
            }
        }

        let final_checkpoint = checkpoint::persist(
            &self.varmap,
            &self.checkpoint_dir,
            CheckpointTag::Final,
            last_validation_loss,
        )?;

        Ok(TrainingSummary {
            epochs,
            best,
            final_checkpoint,
        })
    }

    /// Mean validation loss in evaluation mode; no gradient updates.
    fn validate(&self, corpus: &PairCorpus, epoch: usize) -> Result<f32, TrainingError> {
        let batches = corpus.validation_batches(self.config.batch_size);
        let batch_count = batches.len();
        let mut loss_sum = 0.0f32;

        for batch in batches {
            let nl = self.encoder.forward(&batch.natural_language, false)?;
            let code = self.encoder.forward(&batch.code, false)?;
            let loss = contrastive_loss(&nl, &code, self.config.temperature)?;
            let loss_value = loss.to_scalar::<f32>()?;
            if !loss_value.is_finite() {
                return Err(TrainingError::Diverged { epoch });
            }
            loss_sum += loss_value;
        }

        Ok(loss_sum / batch_count as f32)
    }
}

/// Linear warmup to the base rate, then linear decay to zero.
fn learning_rate_at(step: usize, warmup_steps: usize, total_steps: usize, base: f64) -> f64 {
    if total_steps == 0 {
        return base;
    }
    if step < warmup_steps {
        return base * step as f64 / warmup_steps.max(1) as f64;
    }
    let remaining = total_steps.saturating_sub(step) as f64;
    let decay_span = total_steps.saturating_sub(warmup_steps).max(1) as f64;
    base * (remaining / decay_span).clamp(0.0, 1.0)
}

/// Scale every gradient so the global L2 norm stays at or below `max_norm`.
fn clip_grad_norm(
    vars: &[Var],
    grads: &mut GradStore,
    max_norm: f64,
) -> Result<(), candle_core::Error> {
    let mut squared_sum = 0.0f64;
    for var in vars {
        if let Some(grad) = grads.get(var.as_tensor()) {
            squared_sum += grad.sqr()?.sum_all()?.to_scalar::<f32>()? as f64;
        }
    }
    let norm = squared_sum.sqrt();
    if norm <= max_norm || norm == 0.0 {
        return Ok(());
    }

    let scale = max_norm / norm;
    for var in vars {
        if let Some(grad) = grads.remove(var.as_tensor()) {
            grads.insert(var.as_tensor(), grad.affine(scale, 0.0)?);
        }
    }
    Ok(())
}
