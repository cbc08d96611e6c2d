//! # Tag Dictionary
//!
//! The closed vocabulary of output labels for a tagging run. Index 0 is
//! reserved for the unknown-label slot so that labels never seen during
//! training can still be scored without growing the dictionary.

use std::collections::HashMap;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{EtiketError, Result};

/// The reserved unknown-label string, always at index 0.
pub const UNK_TAG: &str = "<unk>";

/// Ordered set of unique label strings plus the reserved unknown slot.
///
/// Built once from the training split, persisted next to the model, and
/// reloaded on evaluate/resume so label indices stay stable across runs.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TagDictionary {
    tags: Vec<String>,
    #[serde(skip)]
    index: HashMap<String, usize>,
}

impl TagDictionary {
    /// Create a dictionary containing only the unknown slot.
    pub fn new() -> Self {
        let mut dict = Self {
            tags: vec![UNK_TAG.to_string()],
            index: HashMap::new(),
        };
        dict.rebuild_index();
        dict
    }

    /// Build a dictionary from label sequences, in first-seen order.
    pub fn from_labels<'a, I>(labels: I) -> Self
    where
        I: IntoIterator<Item = &'a str>,
    {
        let mut dict = Self::new();
        for label in labels {
            dict.add(label);
        }
        dict
    }

    /// Insert a label if not present, returning its index.
    pub fn add(&mut self, label: &str) -> usize {
        if let Some(&idx) = self.index.get(label) {
            return idx;
        }
        let idx = self.tags.len();
        self.tags.push(label.to_string());
        self.index.insert(label.to_string(), idx);
        idx
    }

    /// Index of a label, if it is part of the dictionary.
    pub fn index_of(&self, label: &str) -> Option<usize> {
        self.index.get(label).copied()
    }

    /// Index of a label, falling back to the unknown slot.
    #[must_use]
    pub fn index_or_unk(&self, label: &str) -> usize {
        self.index_of(label).unwrap_or(0)
    }

    /// Label string at the given index, if valid.
    pub fn tag_at(&self, idx: usize) -> Option<&str> {
        self.tags.get(idx).map(String::as_str)
    }

    /// Number of entries, including the unknown slot.
    #[must_use]
    pub fn len(&self) -> usize {
        self.tags.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        // The unknown slot is always present.
        self.tags.len() <= 1
    }

    /// All tags in index order, `<unk>` first.
    pub fn tags(&self) -> &[String] {
        &self.tags
    }

    /// Persist the dictionary to disk as JSON.
    pub fn save(&self, path: &Path) -> Result<()> {
        let json = serde_json::to_string_pretty(self)?;
        std::fs::write(path, json)?;
        Ok(())
    }

    /// Reload a persisted dictionary.
    ///
    /// A missing file is a configuration error: evaluation and resume must
    /// never proceed with a partial or empty dictionary.
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Err(EtiketError::Config(format!(
                "tag dictionary not found at {}",
                path.display()
            )));
        }
        let content = std::fs::read_to_string(path)?;
        let mut dict: Self = serde_json::from_str(&content)
            .map_err(|e| EtiketError::Data(format!("malformed tag dictionary: {}", e)))?;
        if dict.tags.first().map(String::as_str) != Some(UNK_TAG) {
            return Err(EtiketError::Data(format!(
                "tag dictionary at {} lacks the reserved unknown slot",
                path.display()
            )));
        }
        dict.rebuild_index();
        Ok(dict)
    }

    fn rebuild_index(&mut self) {
        self.index = self
            .tags
            .iter()
            .enumerate()
            .map(|(i, t)| (t.clone(), i))
            .collect();
    }
}

impl Default for TagDictionary {
    fn default() -> Self {
        Self::new()
    }
}
