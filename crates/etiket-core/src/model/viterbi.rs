//! # Viterbi Decoding
//!
//! Finds the most likely tag sequence given per-token emission scores and a
//! tag-transition matrix.

use crate::error::{EtiketError, Result};

/// Viterbi decoder over a fixed tag set.
#[derive(Debug, Clone)]
pub struct ViterbiDecoder {
    num_tags: usize,
}

/// Path score and backpointer for one DP cell.
#[derive(Debug, Clone, Copy)]
struct PathState {
    score: f32,
    prev_tag: Option<usize>,
}

impl ViterbiDecoder {
    pub fn new(num_tags: usize) -> Self {
        Self { num_tags }
    }

    /// Decode the optimal tag sequence.
    ///
    /// `emission_scores` has shape `[seq_len, num_tags]`;
    /// `transition_matrix` has shape `[num_tags, num_tags]`, indexed
    /// `[prev][curr]`.
    pub fn decode(
        &self,
        emission_scores: &[Vec<f32>],
        transition_matrix: &[Vec<f32>],
    ) -> Result<Vec<usize>> {
        let seq_len = emission_scores.len();
        if seq_len == 0 {
            return Ok(Vec::new());
        }

        if emission_scores[0].len() != self.num_tags {
            return Err(EtiketError::Data(format!(
                "emission score dimension mismatch: expected {}, got {}",
                self.num_tags,
                emission_scores[0].len()
            )));
        }
        if transition_matrix.len() != self.num_tags {
            return Err(EtiketError::Data(format!(
                "transition matrix dimension mismatch: expected {}, got {}",
                self.num_tags,
                transition_matrix.len()
            )));
        }

        let mut dp: Vec<Vec<PathState>> = vec![
            vec![
                PathState {
                    score: f32::NEG_INFINITY,
                    prev_tag: None
                };
                self.num_tags
            ];
            seq_len
        ];

        for tag in 0..self.num_tags {
            dp[0][tag].score = emission_scores[0][tag];
        }

        for pos in 1..seq_len {
            for curr_tag in 0..self.num_tags {
                let mut best_score = f32::NEG_INFINITY;
                let mut best_prev = None;

                for prev_tag in 0..self.num_tags {
                    let score = dp[pos - 1][prev_tag].score
                        + transition_matrix[prev_tag][curr_tag]
                        + emission_scores[pos][curr_tag];

                    if score > best_score {
                        best_score = score;
                        best_prev = Some(prev_tag);
                    }
                }

                dp[pos][curr_tag].score = best_score;
                dp[pos][curr_tag].prev_tag = best_prev;
            }
        }

        // Best final tag, then backtrack.
        let mut best_final_tag = 0;
        let mut best_final_score = f32::NEG_INFINITY;
        for tag in 0..self.num_tags {
            if dp[seq_len - 1][tag].score > best_final_score {
                best_final_score = dp[seq_len - 1][tag].score;
                best_final_tag = tag;
            }
        }

        let mut path = Vec::with_capacity(seq_len);
        path.push(best_final_tag);
        let mut curr_tag = best_final_tag;

        for pos in (1..seq_len).rev() {
            curr_tag = dp[pos][curr_tag].prev_tag.unwrap_or(0);
            path.push(curr_tag);
        }

        path.reverse();
        Ok(path)
    }
}
