//! # Linear-Chain CRF Scorer
//!
//! Emission weights over hashed sparse features plus a tag-transition
//! matrix, stored as one flat parameter vector so optimizers and
//! checkpoints can treat the model as a single weight slice. Trained with
//! structured-perceptron updates, decoded with Viterbi.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::model::features::SentenceFeatures;
use crate::model::viterbi::ViterbiDecoder;

/// CRF parameters for a fixed tag set and feature space.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CrfTagger {
    num_tags: usize,
    buckets: usize,
    /// Layout: `[num_tags * buckets]` emission weights, then
    /// `[num_tags * num_tags]` transition weights indexed `[prev][curr]`.
    params: Vec<f32>,
}

/// A sparse gradient: flat parameter index and signed magnitude.
pub type SparseGrad = Vec<(usize, f32)>;

impl CrfTagger {
    pub fn new(num_tags: usize, buckets: usize) -> Self {
        Self {
            num_tags,
            buckets,
            params: vec![0.0; num_tags * buckets + num_tags * num_tags],
        }
    }

    pub fn num_tags(&self) -> usize {
        self.num_tags
    }

    pub fn buckets(&self) -> usize {
        self.buckets
    }

    pub fn params(&self) -> &[f32] {
        &self.params
    }

    pub fn params_mut(&mut self) -> &mut [f32] {
        &mut self.params
    }

    /// Replace all parameters, e.g. when restoring a checkpoint.
    pub fn set_params(&mut self, params: Vec<f32>) -> Result<()> {
        if params.len() != self.params.len() {
            return Err(crate::error::EtiketError::ResumeMismatch(format!(
                "parameter count mismatch: model has {}, checkpoint has {}",
                self.params.len(),
                params.len()
            )));
        }
        self.params = params;
        Ok(())
    }

    #[inline]
    fn emission_idx(&self, tag: usize, feature: usize) -> usize {
        tag * self.buckets + feature
    }

    #[inline]
    fn transition_idx(&self, prev: usize, curr: usize) -> usize {
        self.num_tags * self.buckets + prev * self.num_tags + curr
    }

    fn emission(&self, tag: usize, features: &[usize]) -> f32 {
        features
            .iter()
            .map(|&f| self.params[self.emission_idx(tag, f)])
            .sum()
    }

    fn transition(&self, prev: usize, curr: usize) -> f32 {
        self.params[self.transition_idx(prev, curr)]
    }

    /// Emission score matrix of shape `[seq_len, num_tags]`.
    pub fn emissions(&self, features: &SentenceFeatures) -> Vec<Vec<f32>> {
        features
            .iter()
            .map(|token_feats| {
                (0..self.num_tags)
                    .map(|tag| self.emission(tag, token_feats))
                    .collect()
            })
            .collect()
    }

    fn transition_matrix(&self) -> Vec<Vec<f32>> {
        (0..self.num_tags)
            .map(|prev| {
                (0..self.num_tags)
                    .map(|curr| self.transition(prev, curr))
                    .collect()
            })
            .collect()
    }

    /// Most likely tag sequence for the given token features.
    pub fn predict(&self, features: &SentenceFeatures) -> Result<Vec<usize>> {
        let emissions = self.emissions(features);
        let transitions = self.transition_matrix();
        ViterbiDecoder::new(self.num_tags).decode(&emissions, &transitions)
    }

    /// Unnormalized path score of a label sequence.
    pub fn sequence_score(&self, features: &SentenceFeatures, labels: &[usize]) -> f32 {
        let mut score = 0.0;
        for (pos, token_feats) in features.iter().enumerate() {
            score += self.emission(labels[pos], token_feats);
            if pos > 0 {
                score += self.transition(labels[pos - 1], labels[pos]);
            }
        }
        score
    }

    /// Structured-perceptron gradient: positive mass on the gold path,
    /// negative mass on the predicted path, aggregated per parameter.
    /// Empty when the prediction already matches the gold sequence.
    pub fn margin_gradient(
        &self,
        features: &SentenceFeatures,
        gold: &[usize],
        predicted: &[usize],
    ) -> SparseGrad {
        debug_assert_eq!(gold.len(), predicted.len());
        let mut grad: HashMap<usize, f32> = HashMap::new();

        for (pos, token_feats) in features.iter().enumerate() {
            if gold[pos] != predicted[pos] {
                for &f in token_feats {
                    *grad.entry(self.emission_idx(gold[pos], f)).or_insert(0.0) += 1.0;
                    *grad
                        .entry(self.emission_idx(predicted[pos], f))
                        .or_insert(0.0) -= 1.0;
                }
            }
            if pos > 0 {
                let gold_pair = (gold[pos - 1], gold[pos]);
                let pred_pair = (predicted[pos - 1], predicted[pos]);
                if gold_pair != pred_pair {
                    *grad
                        .entry(self.transition_idx(gold_pair.0, gold_pair.1))
                        .or_insert(0.0) += 1.0;
                    *grad
                        .entry(self.transition_idx(pred_pair.0, pred_pair.1))
                        .or_insert(0.0) -= 1.0;
                }
            }
        }

        let mut grad: SparseGrad = grad
            .into_iter()
            .filter(|(_, magnitude)| *magnitude != 0.0)
            .collect();
        grad.sort_unstable_by_key(|(idx, _)| *idx);
        grad
    }

    /// Structured hinge loss of one sentence: how far the predicted path
    /// outscores the gold path. Zero when the gold path wins.
    pub fn hinge_loss(&self, features: &SentenceFeatures, gold: &[usize]) -> Result<f32> {
        let predicted = self.predict(features)?;
        let margin =
            self.sequence_score(features, &predicted) - self.sequence_score(features, gold);
        Ok(margin.max(0.0))
    }
}
