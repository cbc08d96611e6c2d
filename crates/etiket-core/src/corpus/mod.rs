//! # Labeled Corpus
//!
//! Train/dev/test splits of column-format data, tag dictionary construction,
//! per-split statistics, and one-shot train downsampling.

pub mod column;

use std::collections::BTreeMap;
use std::fmt;
use std::path::{Path, PathBuf};

use tracing::info;

use crate::error::{EtiketError, Result};
use crate::tags::TagDictionary;

pub use column::{ColumnFormat, read_column_file, read_column_lines};

/// One labeled sentence: parallel token and label sequences.
#[derive(Debug, Clone, PartialEq)]
pub struct Sentence {
    pub tokens: Vec<String>,
    pub labels: Vec<String>,
}

impl Sentence {
    pub fn new(tokens: Vec<String>, labels: Vec<String>) -> Self {
        debug_assert_eq!(tokens.len(), labels.len());
        Self { tokens, labels }
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.tokens.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.tokens.is_empty()
    }
}

/// The roles a corpus file can play.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SplitRole {
    Train,
    Dev,
    Test,
}

impl SplitRole {
    fn suffix(&self) -> &'static str {
        match self {
            SplitRole::Train => "train",
            SplitRole::Dev => "dev",
            SplitRole::Test => "test",
        }
    }
}

/// A labeled corpus split into train/dev/test partitions.
#[derive(Debug, Clone)]
pub struct Corpus {
    pub train: Vec<Sentence>,
    pub dev: Vec<Sentence>,
    pub test: Vec<Sentence>,
    tag_type: String,
}

impl Corpus {
    /// Assemble a corpus from already-parsed splits.
    pub fn from_splits(
        train: Vec<Sentence>,
        dev: Vec<Sentence>,
        test: Vec<Sentence>,
        tag_type: &str,
    ) -> Self {
        Self {
            train,
            dev,
            test,
            tag_type: tag_type.to_string(),
        }
    }

    /// Load a corpus from a data folder, discovering one file per role by
    /// filename: the first entry whose name ends in `.train`, `.dev`, and
    /// `.test` respectively. All three roles are required.
    pub fn load_folder(data_folder: &Path, format: &ColumnFormat, tag_type: &str) -> Result<Self> {
        let train_file = find_role_file(data_folder, SplitRole::Train)?;
        let dev_file = find_role_file(data_folder, SplitRole::Dev)?;
        let test_file = find_role_file(data_folder, SplitRole::Test)?;

        let corpus = Self {
            train: read_column_file(&train_file, format, tag_type)?,
            dev: read_column_file(&dev_file, format, tag_type)?,
            test: read_column_file(&test_file, format, tag_type)?,
            tag_type: tag_type.to_string(),
        };

        if corpus.train.is_empty() {
            return Err(EtiketError::Data(format!(
                "training split {} contains no sentences",
                train_file.display()
            )));
        }

        info!(
            train = corpus.train.len(),
            dev = corpus.dev.len(),
            test = corpus.test.len(),
            "corpus loaded"
        );
        Ok(corpus)
    }

    /// Load a corpus that consists of a single test file. Used when an
    /// alternate evaluation file is supplied: the tag dictionary must then
    /// come from the persisted model artifact, never from this data.
    pub fn load_test_only(test_file: &Path, format: &ColumnFormat, tag_type: &str) -> Result<Self> {
        let test = read_column_file(test_file, format, tag_type)?;
        if test.is_empty() {
            return Err(EtiketError::Data(format!(
                "evaluation file {} contains no sentences",
                test_file.display()
            )));
        }
        Ok(Self {
            train: Vec::new(),
            dev: Vec::new(),
            test,
            tag_type: tag_type.to_string(),
        })
    }

    /// The label layer this corpus was loaded with.
    pub fn tag_type(&self) -> &str {
        &self.tag_type
    }

    /// Build the tag dictionary from the training split, in first-seen order.
    pub fn make_tag_dictionary(&self) -> TagDictionary {
        TagDictionary::from_labels(
            self.train
                .iter()
                .flat_map(|s| s.labels.iter().map(String::as_str)),
        )
    }

    /// Per-split sentence/token counts and training tag frequencies.
    pub fn obtain_statistics(&self) -> CorpusStats {
        let mut tag_counts = BTreeMap::new();
        for sentence in &self.train {
            for label in &sentence.labels {
                *tag_counts.entry(label.clone()).or_insert(0usize) += 1;
            }
        }
        CorpusStats {
            train: SplitStats::of(&self.train),
            dev: SplitStats::of(&self.dev),
            test: SplitStats::of(&self.test),
            train_tag_counts: tag_counts,
        }
    }

    /// Downsample to `round(percentage * len)` randomly chosen sentences.
    ///
    /// One-shot and non-reversible; applied before search or training.
    /// `percentage` must lie in `(0, 1]`; `1.0` is a no-op. When
    /// `train_only` is set, dev and test splits are left untouched.
    pub fn downsample(&mut self, percentage: f64, train_only: bool, seed: u64) -> Result<()> {
        if !(percentage > 0.0 && percentage <= 1.0) {
            return Err(EtiketError::Config(format!(
                "downsample percentage must be in (0, 1], got {}",
                percentage
            )));
        }
        if percentage == 1.0 {
            return Ok(());
        }

        let mut rng = oorandom::Rand64::new(seed as u128);
        downsample_split(&mut self.train, percentage, &mut rng);
        if !train_only {
            downsample_split(&mut self.dev, percentage, &mut rng);
            downsample_split(&mut self.test, percentage, &mut rng);
        }
        info!(
            train = self.train.len(),
            percentage, train_only, "corpus downsampled"
        );
        Ok(())
    }
}

fn downsample_split(split: &mut Vec<Sentence>, percentage: f64, rng: &mut oorandom::Rand64) {
    let keep = (percentage * split.len() as f64).round() as usize;
    let mut indices: Vec<usize> = (0..split.len()).collect();
    // Fisher-Yates, then keep the first `keep` indices in corpus order.
    for i in (1..indices.len()).rev() {
        let j = (rng.rand_u64() % (i as u64 + 1)) as usize;
        indices.swap(i, j);
    }
    indices.truncate(keep);
    indices.sort_unstable();
    *split = indices.into_iter().map(|i| split[i].clone()).collect();
}

fn find_role_file(data_folder: &Path, role: SplitRole) -> Result<PathBuf> {
    let entries = std::fs::read_dir(data_folder).map_err(|e| {
        EtiketError::Config(format!(
            "cannot read data folder {}: {}",
            data_folder.display(),
            e
        ))
    })?;

    let mut candidates: Vec<PathBuf> = entries
        .filter_map(|e| e.ok())
        .map(|e| e.path())
        .filter(|p| {
            p.is_file()
                && p.file_name()
                    .and_then(|n| n.to_str())
                    .is_some_and(|n| n.ends_with(&format!(".{}", role.suffix())))
        })
        .collect();
    candidates.sort();

    candidates.into_iter().next().ok_or_else(|| {
        EtiketError::Config(format!(
            "no .{} file found in {}",
            role.suffix(),
            data_folder.display()
        ))
    })
}

/// Sentence and token counts for one split.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SplitStats {
    pub sentences: usize,
    pub tokens: usize,
}

impl SplitStats {
    fn of(split: &[Sentence]) -> Self {
        Self {
            sentences: split.len(),
            tokens: split.iter().map(Sentence::len).sum(),
        }
    }
}

/// Corpus-wide statistics, printable after loading.
#[derive(Debug, Clone)]
pub struct CorpusStats {
    pub train: SplitStats,
    pub dev: SplitStats,
    pub test: SplitStats,
    pub train_tag_counts: BTreeMap<String, usize>,
}

impl fmt::Display for CorpusStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(
            f,
            "train: {} sentences / {} tokens",
            self.train.sentences, self.train.tokens
        )?;
        writeln!(
            f,
            "dev:   {} sentences / {} tokens",
            self.dev.sentences, self.dev.tokens
        )?;
        writeln!(
            f,
            "test:  {} sentences / {} tokens",
            self.test.sentences, self.test.tokens
        )?;
        for (tag, count) in &self.train_tag_counts {
            writeln!(f, "  {}: {}", tag, count)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sentence(n: usize) -> Sentence {
        Sentence::new(vec![format!("tok{}", n)], vec!["O".to_string()])
    }

    fn corpus_with_sizes(train: usize, dev: usize, test: usize) -> Corpus {
        Corpus {
            train: (0..train).map(sentence).collect(),
            dev: (0..dev).map(sentence).collect(),
            test: (0..test).map(sentence).collect(),
            tag_type: "ner".to_string(),
        }
    }

    #[test]
    fn downsample_train_only_leaves_other_splits() {
        let mut corpus = corpus_with_sizes(100, 20, 30);
        corpus.downsample(0.1, true, 42).unwrap();
        assert_eq!(corpus.train.len(), 10);
        assert_eq!(corpus.dev.len(), 20);
        assert_eq!(corpus.test.len(), 30);
    }

    #[test]
    fn downsample_rounds_to_nearest() {
        let mut corpus = corpus_with_sizes(15, 0, 0);
        corpus.downsample(0.5, true, 7).unwrap();
        // round(0.5 * 15) = 8
        assert_eq!(corpus.train.len(), 8);
    }

    #[test]
    fn downsample_full_percentage_is_noop() {
        let mut corpus = corpus_with_sizes(10, 5, 5);
        let before = corpus.train.clone();
        corpus.downsample(1.0, true, 42).unwrap();
        assert_eq!(corpus.train, before);
    }

    #[test]
    fn downsample_rejects_zero_and_above_one() {
        let mut corpus = corpus_with_sizes(10, 0, 0);
        assert!(matches!(
            corpus.downsample(0.0, true, 1),
            Err(EtiketError::Config(_))
        ));
        assert!(matches!(
            corpus.downsample(1.5, true, 1),
            Err(EtiketError::Config(_))
        ));
    }

    #[test]
    fn downsample_preserves_sentence_order() {
        let mut corpus = corpus_with_sizes(50, 0, 0);
        corpus.downsample(0.2, true, 3).unwrap();
        let nums: Vec<usize> = corpus
            .train
            .iter()
            .map(|s| s.tokens[0][3..].parse().unwrap())
            .collect();
        let mut sorted = nums.clone();
        sorted.sort_unstable();
        assert_eq!(nums, sorted);
    }

    #[test]
    fn tag_dictionary_from_train_split() {
        let train = vec![
            Sentence::new(
                vec!["a".into(), "b".into()],
                vec!["O".into(), "B-PER".into()],
            ),
            Sentence::new(vec!["c".into()], vec!["B-LOC".into()]),
        ];
        let corpus = Corpus {
            train,
            dev: Vec::new(),
            test: Vec::new(),
            tag_type: "ner".to_string(),
        };
        let dict = corpus.make_tag_dictionary();
        assert_eq!(dict.tags(), ["<unk>", "O", "B-PER", "B-LOC"]);
    }

    #[test]
    fn statistics_counts_tokens_and_tags() {
        let corpus = corpus_with_sizes(3, 1, 2);
        let stats = corpus.obtain_statistics();
        assert_eq!(stats.train.sentences, 3);
        assert_eq!(stats.train.tokens, 3);
        assert_eq!(stats.train_tag_counts.get("O"), Some(&3));
    }
}
