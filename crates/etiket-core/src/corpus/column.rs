//! Column-format corpus files (CoNLL style).
//!
//! One token per line, columns separated by whitespace, sentences separated
//! by blank lines. Column 0 is the token text; the remaining columns are
//! named label layers (e.g. `ner`), selected by the run's tag type.

use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;

use crate::corpus::Sentence;
use crate::error::{EtiketError, Result};

/// Maps a label layer name to its column index.
///
/// The default layout matches the corpus this project ships with:
/// column 0 is the token, column 1 is the `ner` layer.
#[derive(Debug, Clone)]
pub struct ColumnFormat {
    layers: Vec<(String, usize)>,
}

impl ColumnFormat {
    /// Layout with a single label layer at column 1.
    pub fn single_layer(tag_type: &str) -> Self {
        Self {
            layers: vec![(tag_type.to_string(), 1)],
        }
    }

    /// Column index of a label layer, if declared.
    pub fn column_of(&self, tag_type: &str) -> Option<usize> {
        self.layers
            .iter()
            .find(|(name, _)| name == tag_type)
            .map(|(_, col)| *col)
    }
}

impl Default for ColumnFormat {
    fn default() -> Self {
        Self::single_layer("ner")
    }
}

/// Parse one column-format file into sentences.
pub fn read_column_file(path: &Path, format: &ColumnFormat, tag_type: &str) -> Result<Vec<Sentence>> {
    let file = File::open(path).map_err(|e| {
        EtiketError::Data(format!("cannot open corpus file {}: {}", path.display(), e))
    })?;
    read_column_lines(BufReader::new(file), format, tag_type).map_err(|e| match e {
        EtiketError::Data(msg) => EtiketError::Data(format!("{}: {}", path.display(), msg)),
        other => other,
    })
}

/// Parse column-format content from any reader. Used directly by tests.
pub fn read_column_lines<R: BufRead>(
    reader: R,
    format: &ColumnFormat,
    tag_type: &str,
) -> Result<Vec<Sentence>> {
    let label_col = format.column_of(tag_type).ok_or_else(|| {
        EtiketError::Config(format!("unknown tag type {:?} for column format", tag_type))
    })?;

    let mut sentences = Vec::new();
    let mut tokens: Vec<String> = Vec::new();
    let mut labels: Vec<String> = Vec::new();

    for (line_no, line) in reader.lines().enumerate() {
        let line = line?;
        let line = line.trim();

        if line.is_empty() {
            if !tokens.is_empty() {
                sentences.push(Sentence::new(
                    std::mem::take(&mut tokens),
                    std::mem::take(&mut labels),
                ));
            }
            continue;
        }

        if line.starts_with('#') {
            continue;
        }

        let columns: Vec<&str> = line.split_whitespace().collect();
        if columns.len() <= label_col {
            return Err(EtiketError::Data(format!(
                "line {}: expected at least {} columns, got {}",
                line_no + 1,
                label_col + 1,
                columns.len()
            )));
        }

        tokens.push(columns[0].to_string());
        labels.push(columns[label_col].to_string());
    }

    // Last sentence may not be followed by a blank line.
    if !tokens.is_empty() {
        sentences.push(Sentence::new(tokens, labels));
    }

    Ok(sentences)
}
