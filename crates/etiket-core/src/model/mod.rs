//! # Tagging Model
//!
//! The model factory side of a run: a [`TaggerConfig`] plus a
//! [`TagDictionary`](crate::tags::TagDictionary) produce a trainable
//! [`SequenceTagger`]. Emission scoring runs over hashed sparse features
//! ([`features`]), sequence decoding is Viterbi over a learned transition
//! matrix ([`crf`]).

pub mod crf;
pub mod features;
pub mod viterbi;

use std::fmt;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{EtiketError, Result};
use crate::tags::TagDictionary;

pub use crf::{CrfTagger, SparseGrad};
pub use features::{FeatureExtractor, SentenceFeatures};
pub use viterbi::ViterbiDecoder;

/// The closed set of supported embedding families.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EmbeddingType {
    /// Subword-chunk features in the style of wordpiece tokenization.
    Bert,
    /// Word identity and suffix features (stacked word-embedding analogue).
    Flair,
    /// Character n-gram features.
    Char,
}

impl fmt::Display for EmbeddingType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EmbeddingType::Bert => write!(f, "bert"),
            EmbeddingType::Flair => write!(f, "flair"),
            EmbeddingType::Char => write!(f, "char"),
        }
    }
}

/// Architecture hyperparameters of the tagger.
///
/// `hidden_size` is the hashed feature space size; `rnn_layers` is the
/// context window radius in tokens; `dropout` drops individual features
/// during training steps.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaggerConfig {
    pub embedding_type: EmbeddingType,
    pub hidden_size: usize,
    pub rnn_layers: usize,
    pub dropout: f64,
}

impl TaggerConfig {
    pub fn new(embedding_type: EmbeddingType) -> Self {
        Self {
            embedding_type,
            hidden_size: 256,
            rnn_layers: 2,
            dropout: 0.5,
        }
    }

    /// Reject values a training run cannot work with.
    pub fn validate(&self) -> Result<()> {
        if self.hidden_size == 0 {
            return Err(EtiketError::Config("hidden_size must be positive".into()));
        }
        if !(0.0..1.0).contains(&self.dropout) {
            return Err(EtiketError::Config(format!(
                "dropout must be in [0, 1), got {}",
                self.dropout
            )));
        }
        Ok(())
    }
}

/// A trainable sequence tagger: feature extractor plus CRF scorer.
#[derive(Debug, Clone)]
pub struct SequenceTagger {
    config: TaggerConfig,
    extractor: FeatureExtractor,
    crf: CrfTagger,
}

/// On-disk form of a tagger. The extractor is rebuilt from the config.
#[derive(Serialize, Deserialize)]
struct SavedTagger {
    config: TaggerConfig,
    crf: CrfTagger,
}

impl SequenceTagger {
    /// Build a fresh tagger for the given tag dictionary.
    pub fn new(config: TaggerConfig, tag_dictionary: &TagDictionary) -> Result<Self> {
        config.validate()?;
        if tag_dictionary.is_empty() {
            return Err(EtiketError::Config(
                "tag dictionary holds no labels beyond the unknown slot".into(),
            ));
        }
        let extractor = FeatureExtractor::new(
            config.embedding_type,
            config.hidden_size,
            config.rnn_layers,
        );
        let crf = CrfTagger::new(tag_dictionary.len(), config.hidden_size);
        Ok(Self {
            config,
            extractor,
            crf,
        })
    }

    pub fn config(&self) -> &TaggerConfig {
        &self.config
    }

    pub fn num_tags(&self) -> usize {
        self.crf.num_tags()
    }

    pub fn extractor(&self) -> &FeatureExtractor {
        &self.extractor
    }

    pub fn crf(&self) -> &CrfTagger {
        &self.crf
    }

    pub fn crf_mut(&mut self) -> &mut CrfTagger {
        &mut self.crf
    }

    /// Predict tag indices for a token sequence.
    pub fn predict(&self, tokens: &[String]) -> Result<Vec<usize>> {
        let features = self.extractor.extract(tokens);
        self.crf.predict(&features)
    }

    /// Persist config and weights to disk as one artifact.
    pub fn save(&self, path: &Path) -> Result<()> {
        let saved = SavedTagger {
            config: self.config.clone(),
            crf: self.crf.clone(),
        };
        let json = serde_json::to_string(&saved)?;
        std::fs::write(path, json)?;
        Ok(())
    }

    /// Reload a persisted tagger. A missing file is a configuration error.
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Err(EtiketError::Config(format!(
                "model not found at {}",
                path.display()
            )));
        }
        let content = std::fs::read_to_string(path)?;
        let saved: SavedTagger = serde_json::from_str(&content)
            .map_err(|e| EtiketError::Data(format!("malformed model file: {}", e)))?;
        let extractor = FeatureExtractor::new(
            saved.config.embedding_type,
            saved.config.hidden_size,
            saved.config.rnn_layers,
        );
        Ok(Self {
            config: saved.config,
            extractor,
            crf: saved.crf,
        })
    }
}
