//! Checkpoint persistence.
//!
//! A checkpoint is an opaque safetensors snapshot of every parameter in the
//! encoder's var map, tagged `best` or `final`, with the validation loss at
//! capture time recorded in a JSON sidecar.

use super::TrainingError;
use candle_nn::VarMap;
use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Which snapshot this is within a training run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CheckpointTag {
    /// Lowest validation loss seen so far.
    Best,
    /// State after the last epoch, regardless of validation outcome.
    Final,
}

impl CheckpointTag {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Best => "best",
            Self::Final => "final",
        }
    }
}

/// A persisted parameter snapshot.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Checkpoint {
    pub tag: CheckpointTag,
    pub validation_loss: f32,
    pub captured_at: chrono::DateTime<Utc>,
    pub weights_path: PathBuf,
}

/// Write the snapshot (`<tag>.safetensors`) and its metadata sidecar
/// (`<tag>.json`) under `dir`, overwriting any previous snapshot of the same
/// tag from this run.
pub fn persist(
    varmap: &VarMap,
    dir: &Path,
    tag: CheckpointTag,
    validation_loss: f32,
) -> Result<Checkpoint, TrainingError> {
    std::fs::create_dir_all(dir)
        .map_err(|e| TrainingError::Checkpoint(format!("{}: {e}", dir.display())))?;

    let weights_path = dir.join(format!("{}.safetensors", tag.as_str()));
    varmap
        .save(&weights_path)
        .map_err(|e| TrainingError::Checkpoint(format!("{}: {e}", weights_path.display())))?;

    let checkpoint = Checkpoint {
        tag,
        validation_loss,
        captured_at: Utc::now(),
        weights_path: weights_path.clone(),
    };

    let metadata_path = dir.join(format!("{}.json", tag.as_str()));
    let metadata = serde_json::to_string_pretty(&checkpoint)
        .map_err(|e| TrainingError::Checkpoint(format!("metadata encode: {e}")))?;
    std::fs::write(&metadata_path, metadata)
        .map_err(|e| TrainingError::Checkpoint(format!("{}: {e}", metadata_path.display())))?;

    Ok(checkpoint)
}

#[cfg(test)]
mod tests {
    use super::*;
    use candle_core::{DType, Device};
    use candle_nn::VarBuilder;

    #[test]
    fn test_persist_writes_weights_and_metadata() {
        let dir = tempfile::tempdir().unwrap();
        let varmap = VarMap::new();
        let vb = VarBuilder::from_varmap(&varmap, DType::F32, &Device::Cpu);
        vb.get_with_hints((4, 4), "head.project.weight", candle_nn::init::ZERO)
            .unwrap();

        let checkpoint = persist(&varmap, dir.path(), CheckpointTag::Best, 0.42).unwrap();

        assert!(checkpoint.weights_path.exists());
        assert_eq!(checkpoint.validation_loss, 0.42);

        let metadata: Checkpoint = serde_json::from_str(
            &std::fs::read_to_string(dir.path().join("best.json")).unwrap(),
        )
        .unwrap();
        assert_eq!(metadata.tag, CheckpointTag::Best);
        assert_eq!(metadata.validation_loss, 0.42);
    }

    #[test]
    fn test_best_and_final_coexist() {
        let dir = tempfile::tempdir().unwrap();
        let varmap = VarMap::new();
        let vb = VarBuilder::from_varmap(&varmap, DType::F32, &Device::Cpu);
        vb.get_with_hints((2, 2), "w", candle_nn::init::ZERO).unwrap();

        persist(&varmap, dir.path(), CheckpointTag::Best, 0.5).unwrap();
        persist(&varmap, dir.path(), CheckpointTag::Final, 0.7).unwrap();

        assert!(dir.path().join("best.safetensors").exists());
        assert!(dir.path().join("final.safetensors").exists());
    }
}
