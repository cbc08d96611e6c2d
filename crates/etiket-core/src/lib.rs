//! # Etiket Core
//!
//! Data model and tagging model for the etiket sequence-labeling toolkit:
//! column-format corpora with train/dev/test splits, tag dictionaries with a
//! reserved unknown slot, and a feature-based CRF tagger decoded with
//! Viterbi.
//!
//! ## Quick Start
//!
//! ```rust
//! use etiket_core::model::{EmbeddingType, SequenceTagger, TaggerConfig};
//! use etiket_core::tags::TagDictionary;
//!
//! let dict = TagDictionary::from_labels(["O", "B-PER", "I-PER"]);
//! let tagger = SequenceTagger::new(TaggerConfig::new(EmbeddingType::Char), &dict).unwrap();
//!
//! let tokens: Vec<String> = ["Ali", "geldi"].iter().map(|s| s.to_string()).collect();
//! let tags = tagger.predict(&tokens).unwrap();
//! assert_eq!(tags.len(), 2);
//! ```

pub mod corpus;
pub mod error;
pub mod model;
pub mod tags;

// Re-export primary API
pub use corpus::{ColumnFormat, Corpus, CorpusStats, Sentence, SplitStats};
pub use error::{EtiketError, Result};
pub use model::{
    CrfTagger, EmbeddingType, FeatureExtractor, SequenceTagger, TaggerConfig, ViterbiDecoder,
};
pub use tags::{TagDictionary, UNK_TAG};
