//! # Run Parameters
//!
//! The single source of truth for one experiment invocation. Built once,
//! validated, persisted to `params.json` before training starts, and
//! reloaded verbatim on resume or evaluate. No collaborator mutates it.

use std::fmt;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use etiket_core::error::{EtiketError, Result};
use etiket_core::model::{EmbeddingType, TaggerConfig};

/// Optimizer selector. Stochastic gradient descent is the default.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum OptimizerKind {
    #[default]
    Sgd,
    Adam,
}

impl fmt::Display for OptimizerKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OptimizerKind::Sgd => write!(f, "sgd"),
            OptimizerKind::Adam => write!(f, "adam"),
        }
    }
}

/// Compute device selector, threaded explicitly through the run instead of
/// living in ambient global state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum DeviceKind {
    Cpu,
    #[default]
    Gpu,
}

impl fmt::Display for DeviceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DeviceKind::Cpu => write!(f, "cpu"),
            DeviceKind::Gpu => write!(f, "gpu"),
        }
    }
}

/// Immutable-after-creation record of everything one run needs.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunParameters {
    pub model_name: String,
    pub embedding_type: EmbeddingType,
    pub tag_type: String,
    pub bert_model_dirpath_or_name: String,
    pub model_output_dirpath: PathBuf,
    pub optimizer: OptimizerKind,
    pub learning_rate: f64,
    pub max_epochs: usize,
    pub mini_batch_size: usize,
    pub device: DeviceKind,
}

impl RunParameters {
    pub const DEFAULT_LEARNING_RATE: f64 = 0.05;
    pub const DEFAULT_MAX_EPOCHS: usize = 10;
    pub const DEFAULT_MINI_BATCH_SIZE: usize = 16;
    pub const DEFAULT_TAG_TYPE: &'static str = "ner";

    /// Check the invariants a training phase relies on.
    pub fn validate(&self) -> Result<()> {
        if self.model_name.is_empty() {
            return Err(EtiketError::Config("model_name must not be empty".into()));
        }
        if self.tag_type.is_empty() {
            return Err(EtiketError::Config("tag_type must not be empty".into()));
        }
        if !(self.learning_rate > 0.0) {
            return Err(EtiketError::Config(format!(
                "learning_rate must be positive, got {}",
                self.learning_rate
            )));
        }
        if self.max_epochs == 0 {
            return Err(EtiketError::Config("max_epochs must be at least 1".into()));
        }
        if self.mini_batch_size == 0 {
            return Err(EtiketError::Config(
                "mini_batch_size must be at least 1".into(),
            ));
        }
        Ok(())
    }

    /// Default tagger architecture for this run.
    pub fn tagger_config(&self) -> TaggerConfig {
        TaggerConfig::new(self.embedding_type)
    }

    /// Persist to `params.json` in the output directory.
    pub fn save(&self, path: &Path) -> Result<()> {
        let json = serde_json::to_string_pretty(self)?;
        std::fs::write(path, json)?;
        Ok(())
    }

    /// Reload a persisted record. A missing file is fatal: resume and
    /// evaluate must not reconstruct parameters from defaults.
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Err(EtiketError::Config(format!(
                "params file not found at {}",
                path.display()
            )));
        }
        let content = std::fs::read_to_string(path)?;
        let params: Self = serde_json::from_str(&content)
            .map_err(|e| EtiketError::Data(format!("malformed params file: {}", e)))?;
        params.validate()?;
        Ok(params)
    }
}

/// Deterministic artifact layout under one run's output directory.
#[derive(Debug, Clone)]
pub struct ArtifactPaths {
    base: PathBuf,
}

impl ArtifactPaths {
    pub fn new(model_output_dirpath: &Path) -> Self {
        Self {
            base: model_output_dirpath.to_path_buf(),
        }
    }

    pub fn base(&self) -> &Path {
        &self.base
    }

    pub fn params(&self) -> PathBuf {
        self.base.join("params.json")
    }

    pub fn tag_dictionary(&self) -> PathBuf {
        self.base.join("tag_dictionary.pickle")
    }

    pub fn checkpoint(&self) -> PathBuf {
        self.base.join("checkpoint.pt")
    }

    pub fn final_model(&self) -> PathBuf {
        self.base.join("final-model.pt")
    }

    pub fn evaluation(&self) -> PathBuf {
        self.base.join("evaluation.txt")
    }

    pub fn loss_log(&self) -> PathBuf {
        self.base.join("loss.tsv")
    }
}
