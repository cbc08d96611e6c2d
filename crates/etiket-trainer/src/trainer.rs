//! # Model Trainer
//!
//! Drives structured-perceptron training of a [`SequenceTagger`] over
//! mini-batches, scores the dev split after every epoch, checkpoints each
//! completed epoch, and hosts the learning-rate finder sweep.

use std::collections::HashMap;
use std::io::Write;
use std::path::{Path, PathBuf};

use tracing::{debug, info};

use etiket_core::corpus::Corpus;
use etiket_core::error::{EtiketError, Result};
use etiket_core::model::{SequenceTagger, SparseGrad};
use etiket_core::tags::TagDictionary;

use crate::checkpoint::CheckpointState;
use crate::metrics;
use crate::optim::Optimizer;
use crate::params::{ArtifactPaths, OptimizerKind, RunParameters};

/// Default shuffle seed for fresh training runs.
pub const DEFAULT_SHUFFLE_SEED: u64 = 1371;

/// One epoch's training record.
#[derive(Debug, Clone)]
pub struct EpochRecord {
    pub epoch: usize,
    pub train_loss: f64,
    pub dev_micro_f1: Option<f64>,
}

/// What a finished (or resumed-and-finished) training run produced.
#[derive(Debug, Clone)]
pub struct TrainingSummary {
    pub completed_epochs: usize,
    pub epochs: Vec<EpochRecord>,
}

/// Owns a tagger and an optimizer for the duration of one training phase.
#[derive(Debug)]
pub struct ModelTrainer {
    tagger: SequenceTagger,
    optimizer: Optimizer,
    completed_epochs: usize,
    shuffle_seed: u64,
}

impl ModelTrainer {
    /// Fresh trainer around a newly built model.
    pub fn new(tagger: SequenceTagger, kind: OptimizerKind, learning_rate: f64) -> Self {
        let param_count = tagger.crf().params().len();
        Self {
            tagger,
            optimizer: Optimizer::new(kind, learning_rate, param_count),
            completed_epochs: 0,
            shuffle_seed: DEFAULT_SHUFFLE_SEED,
        }
    }

    /// Rebuild a trainer from a checkpoint, picking up at the recorded epoch.
    pub fn from_checkpoint(state: CheckpointState, dictionary: &TagDictionary) -> Result<Self> {
        state.check_compatible(dictionary)?;
        let mut tagger = SequenceTagger::new(state.config, dictionary)?;
        tagger.crf_mut().set_params(state.model_params)?;
        state
            .optimizer
            .check_param_count(tagger.crf().params().len())?;
        Ok(Self {
            tagger,
            optimizer: state.optimizer,
            completed_epochs: state.completed_epochs,
            shuffle_seed: state.shuffle_seed,
        })
    }

    pub fn tagger(&self) -> &SequenceTagger {
        &self.tagger
    }

    pub fn completed_epochs(&self) -> usize {
        self.completed_epochs
    }

    /// Run training to `max_epochs`, checkpointing each completed epoch when
    /// `checkpointing` is set, and write the final model to the output path.
    pub fn train(
        &mut self,
        corpus: &Corpus,
        dictionary: &TagDictionary,
        params: &RunParameters,
        paths: &ArtifactPaths,
        checkpointing: bool,
    ) -> Result<TrainingSummary> {
        if self.completed_epochs >= params.max_epochs {
            info!(
                completed = self.completed_epochs,
                max = params.max_epochs,
                "nothing to train: checkpoint already covers max_epochs"
            );
            self.tagger.save(&paths.final_model())?;
            return Ok(TrainingSummary {
                completed_epochs: self.completed_epochs,
                epochs: Vec::new(),
            });
        }

        let mut records = Vec::new();
        let mut loss_lines = vec!["epoch\ttrain_loss\tdev_micro_f1".to_string()];

        for epoch in self.completed_epochs..params.max_epochs {
            let train_loss = self.train_one_epoch(corpus, dictionary, params, epoch)?;

            let dev_micro_f1 = if corpus.dev.is_empty() {
                None
            } else {
                Some(metrics::evaluate(&self.tagger, &corpus.dev, dictionary)?.micro_f1)
            };

            info!(
                epoch = epoch + 1,
                max_epochs = params.max_epochs,
                train_loss,
                dev_micro_f1 = dev_micro_f1.unwrap_or(f64::NAN),
                "epoch complete"
            );

            self.completed_epochs = epoch + 1;
            records.push(EpochRecord {
                epoch: epoch + 1,
                train_loss,
                dev_micro_f1,
            });
            loss_lines.push(format!(
                "{}\t{:.6}\t{}",
                epoch + 1,
                train_loss,
                dev_micro_f1
                    .map(|f| format!("{:.4}", f))
                    .unwrap_or_else(|| "-".to_string())
            ));
            std::fs::write(paths.loss_log(), loss_lines.join("\n") + "\n")?;

            if checkpointing {
                self.checkpoint().save(&paths.checkpoint())?;
                debug!(epoch = epoch + 1, "checkpoint written");
            }
        }

        self.tagger.save(&paths.final_model())?;
        info!(path = %paths.final_model().display(), "final model saved");

        Ok(TrainingSummary {
            completed_epochs: self.completed_epochs,
            epochs: records,
        })
    }

    fn train_one_epoch(
        &mut self,
        corpus: &Corpus,
        dictionary: &TagDictionary,
        params: &RunParameters,
        epoch: usize,
    ) -> Result<f64> {
        // Per-epoch RNG: the same seed and epoch replay the same order, so
        // a resumed run walks the trajectory the interrupted one would have.
        let mut rng = oorandom::Rand64::new((self.shuffle_seed.wrapping_add(epoch as u64)) as u128);
        let dropout = self.tagger.config().dropout;
        let extractor = self.tagger.extractor().clone();

        let mut indices: Vec<usize> = (0..corpus.train.len()).collect();
        for i in (1..indices.len()).rev() {
            let j = (rng.rand_u64() % (i as u64 + 1)) as usize;
            indices.swap(i, j);
        }

        let mut total_loss = 0.0f64;
        let mut sentences_seen = 0usize;

        // One optimizer step per mini-batch: gradients are accumulated over
        // the whole chunk against the weights it started with.
        for batch in indices.chunks(params.mini_batch_size) {
            let mut batch_grad: HashMap<usize, f32> = HashMap::new();
            for &sent_idx in batch {
                let sentence = &corpus.train[sent_idx];
                if sentence.is_empty() {
                    continue;
                }

                let features = extractor.extract_with_dropout(&sentence.tokens, dropout, &mut rng);
                let gold: Vec<usize> = sentence
                    .labels
                    .iter()
                    .map(|l| dictionary.index_or_unk(l))
                    .collect();

                let crf = self.tagger.crf();
                let predicted = crf.predict(&features)?;
                let margin = crf.sequence_score(&features, &predicted)
                    - crf.sequence_score(&features, &gold);
                total_loss += f64::from(margin.max(0.0));

                for (param_idx, magnitude) in crf.margin_gradient(&features, &gold, &predicted) {
                    *batch_grad.entry(param_idx).or_insert(0.0) += magnitude;
                }
                sentences_seen += 1;
            }

            if !batch_grad.is_empty() {
                let mut grad: SparseGrad = batch_grad
                    .into_iter()
                    .filter(|(_, magnitude)| *magnitude != 0.0)
                    .collect();
                grad.sort_unstable_by_key(|(param_idx, _)| *param_idx);
                self.optimizer
                    .apply(self.tagger.crf_mut().params_mut(), &grad);
            }
        }

        Ok(if sentences_seen == 0 {
            0.0
        } else {
            total_loss / sentences_seen as f64
        })
    }

    fn checkpoint(&self) -> CheckpointState {
        CheckpointState {
            config: self.tagger.config().clone(),
            num_tags: self.tagger.num_tags(),
            model_params: self.tagger.crf().params().to_vec(),
            optimizer: self.optimizer.clone(),
            completed_epochs: self.completed_epochs,
            shuffle_seed: self.shuffle_seed,
        }
    }

    /// Sweep geometrically increasing learning rates over single batches,
    /// recording `(learning_rate, loss)` pairs to a TSV log.
    ///
    /// Works on a throwaway copy of the model: no checkpoint is committed
    /// and persisted artifacts are never touched.
    pub fn find_learning_rate(
        &self,
        corpus: &Corpus,
        dictionary: &TagDictionary,
        params: &RunParameters,
        output_dir: &Path,
        iterations: usize,
        start_lr: f64,
        end_lr: f64,
    ) -> Result<PathBuf> {
        if corpus.train.is_empty() {
            return Err(EtiketError::Data(
                "learning-rate finder needs a non-empty training split".into(),
            ));
        }
        if !(start_lr > 0.0 && end_lr > start_lr) {
            return Err(EtiketError::Config(format!(
                "learning-rate sweep needs 0 < start < end, got {}..{}",
                start_lr, end_lr
            )));
        }

        let mut probe_tagger = self.tagger.clone();
        let mut probe_opt = Optimizer::new(
            params.optimizer,
            start_lr,
            probe_tagger.crf().params().len(),
        );
        let extractor = probe_tagger.extractor().clone();
        let mut rng = oorandom::Rand64::new(self.shuffle_seed as u128);

        std::fs::create_dir_all(output_dir)?;
        let log_path = output_dir.join("learning_rate_search_log.tsv");
        let mut log = std::fs::File::create(&log_path)?;
        writeln!(log, "learning_rate\tloss")?;

        let growth = (end_lr / start_lr).powf(1.0 / (iterations.max(2) - 1) as f64);
        let mut lr = start_lr;

        for iteration in 0..iterations {
            probe_opt.set_learning_rate(lr as f32);

            let mut batch_loss = 0.0f64;
            let mut batch_count = 0usize;
            let mut batch_grad: HashMap<usize, f32> = HashMap::new();
            for _ in 0..params.mini_batch_size {
                let idx = (rng.rand_u64() % corpus.train.len() as u64) as usize;
                let sentence = &corpus.train[idx];
                if sentence.is_empty() {
                    continue;
                }
                let features = extractor.extract(&sentence.tokens);
                let gold: Vec<usize> = sentence
                    .labels
                    .iter()
                    .map(|l| dictionary.index_or_unk(l))
                    .collect();

                let crf = probe_tagger.crf();
                let predicted = crf.predict(&features)?;
                let margin = crf.sequence_score(&features, &predicted)
                    - crf.sequence_score(&features, &gold);
                batch_loss += f64::from(margin.max(0.0));

                for (param_idx, magnitude) in crf.margin_gradient(&features, &gold, &predicted) {
                    *batch_grad.entry(param_idx).or_insert(0.0) += magnitude;
                }
                batch_count += 1;
            }

            if !batch_grad.is_empty() {
                let mut grad: SparseGrad = batch_grad
                    .into_iter()
                    .filter(|(_, magnitude)| *magnitude != 0.0)
                    .collect();
                grad.sort_unstable_by_key(|(param_idx, _)| *param_idx);
                probe_opt.apply(probe_tagger.crf_mut().params_mut(), &grad);
            }

            let loss = if batch_count == 0 {
                0.0
            } else {
                batch_loss / batch_count as f64
            };
            writeln!(log, "{:.10}\t{:.6}", lr, loss)?;
            debug!(iteration, lr, loss, "learning-rate probe");

            lr *= growth;
        }

        info!(path = %log_path.display(), "learning-rate sweep logged");
        Ok(log_path)
    }
}
