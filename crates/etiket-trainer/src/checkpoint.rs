//! # Training Checkpoints
//!
//! Serialized snapshot written after every completed epoch: model weights,
//! tagger architecture, optimizer state, and the epoch counter. Reading one
//! back is the only entry point for `resume_train`.

use std::path::Path;

use serde::{Deserialize, Serialize};

use etiket_core::error::{EtiketError, Result};
use etiket_core::model::TaggerConfig;
use etiket_core::tags::TagDictionary;

use crate::optim::Optimizer;

/// Everything needed to continue an interrupted training run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CheckpointState {
    pub config: TaggerConfig,
    pub num_tags: usize,
    pub model_params: Vec<f32>,
    pub optimizer: Optimizer,
    /// Number of fully completed epochs; resume starts at this epoch index.
    pub completed_epochs: usize,
    /// Shuffle seed, so the resumed run replays the same epoch order.
    pub shuffle_seed: u64,
}

impl CheckpointState {
    pub fn save(&self, path: &Path) -> Result<()> {
        let json = serde_json::to_string(self)?;
        std::fs::write(path, json)?;
        Ok(())
    }

    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Err(EtiketError::Config(format!(
                "checkpoint not found at {}",
                path.display()
            )));
        }
        let content = std::fs::read_to_string(path)?;
        let state: Self = serde_json::from_str(&content)
            .map_err(|e| EtiketError::Data(format!("malformed checkpoint: {}", e)))?;
        state.optimizer.check_param_count(state.model_params.len())?;
        Ok(state)
    }

    /// Reject checkpoints that do not belong to the given tag dictionary.
    pub fn check_compatible(&self, dictionary: &TagDictionary) -> Result<()> {
        if self.num_tags != dictionary.len() {
            return Err(EtiketError::ResumeMismatch(format!(
                "checkpoint was trained with {} tags, dictionary has {}",
                self.num_tags,
                dictionary.len()
            )));
        }
        let expected = self.num_tags * self.config.hidden_size + self.num_tags * self.num_tags;
        if self.model_params.len() != expected {
            return Err(EtiketError::ResumeMismatch(format!(
                "checkpoint holds {} parameters, architecture expects {}",
                self.model_params.len(),
                expected
            )));
        }
        Ok(())
    }
}
