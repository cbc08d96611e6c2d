//! # Hyperparameter Search
//!
//! Bounded random-sampling search over a declared parameter space. Each
//! trial builds a fresh model, trains it briefly on the (downsampled)
//! training split, and scores it on dev micro-F1. A failing trial is
//! isolated: it is recorded with a score of negative infinity and the
//! search continues.

use std::fmt::Write as _;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use etiket_core::corpus::Corpus;
use etiket_core::error::{EtiketError, Result};
use etiket_core::model::{EmbeddingType, SequenceTagger, TaggerConfig};
use etiket_core::tags::TagDictionary;

use crate::metrics;
use crate::optim::Optimizer;
use crate::params::OptimizerKind;

/// How often an identical configuration may be re-sampled before the
/// duplicate is accepted as-is.
const DUPLICATE_RESAMPLE_LIMIT: usize = 10;

/// A sampling rule for one numeric parameter.
#[derive(Debug, Clone)]
pub enum SamplingRule {
    /// Pick one of the listed values uniformly.
    Choice(Vec<f64>),
    /// Uniform over `[low, high)`.
    Uniform { low: f64, high: f64 },
    /// Log-uniform over `[low, high)`; both bounds must be positive.
    LogUniform { low: f64, high: f64 },
}

impl SamplingRule {
    fn sample(&self, rng: &mut oorandom::Rand64) -> Result<f64> {
        match self {
            SamplingRule::Choice(options) => {
                if options.is_empty() {
                    return Err(EtiketError::Config(
                        "categorical sampling rule has no options".into(),
                    ));
                }
                let idx = (rng.rand_u64() % options.len() as u64) as usize;
                Ok(options[idx])
            }
            SamplingRule::Uniform { low, high } => Ok(low + rng.rand_float() * (high - low)),
            SamplingRule::LogUniform { low, high } => {
                if !(*low > 0.0 && high > low) {
                    return Err(EtiketError::Config(format!(
                        "log-uniform rule needs 0 < low < high, got {}..{}",
                        low, high
                    )));
                }
                let log_low = low.ln();
                let log_high = high.ln();
                Ok((log_low + rng.rand_float() * (log_high - log_low)).exp())
            }
        }
    }
}

/// The full parameter space a search explores. Every parameter the model
/// factory consumes must carry a rule before `optimize` starts.
#[derive(Debug, Clone)]
pub struct SearchSpace {
    pub embeddings: Vec<EmbeddingType>,
    pub hidden_size: Option<SamplingRule>,
    pub rnn_layers: Option<SamplingRule>,
    pub dropout: Option<SamplingRule>,
    pub learning_rate: Option<SamplingRule>,
    pub mini_batch_size: Option<SamplingRule>,
}

impl SearchSpace {
    /// Empty space; callers add one rule per parameter.
    pub fn new() -> Self {
        Self {
            embeddings: Vec::new(),
            hidden_size: None,
            rnn_layers: None,
            dropout: None,
            learning_rate: None,
            mini_batch_size: None,
        }
    }

    /// The standard space used by the `hyperparameter_search` phase:
    /// the run's own embedding type, the usual hidden-size ladder, one or
    /// two recurrent layers, a dropout grid, and the run's batch size.
    pub fn standard(embedding_type: EmbeddingType, learning_rate: f64) -> Self {
        Self {
            embeddings: vec![embedding_type],
            hidden_size: Some(SamplingRule::Choice(vec![32.0, 64.0, 128.0, 256.0, 512.0])),
            rnn_layers: Some(SamplingRule::Choice(vec![1.0, 2.0])),
            dropout: Some(SamplingRule::Choice(vec![0.3, 0.4, 0.5, 0.6, 0.7])),
            learning_rate: Some(SamplingRule::Choice(vec![learning_rate])),
            mini_batch_size: Some(SamplingRule::Choice(vec![16.0])),
        }
    }

    /// Check the completeness invariant.
    pub fn validate(&self) -> Result<()> {
        if self.embeddings.is_empty() {
            return Err(EtiketError::Config(
                "search space lacks an embeddings entry".into(),
            ));
        }
        for (name, rule) in [
            ("hidden_size", &self.hidden_size),
            ("rnn_layers", &self.rnn_layers),
            ("dropout", &self.dropout),
            ("learning_rate", &self.learning_rate),
            ("mini_batch_size", &self.mini_batch_size),
        ] {
            if rule.is_none() {
                return Err(EtiketError::Config(format!(
                    "search space lacks a rule for {}",
                    name
                )));
            }
        }
        Ok(())
    }

    fn sample(&self, rng: &mut oorandom::Rand64) -> Result<TrialConfig> {
        fn rule<'a>(r: &'a Option<SamplingRule>, name: &str) -> Result<&'a SamplingRule> {
            r.as_ref().ok_or_else(|| {
                EtiketError::Config(format!("search space lacks a rule for {}", name))
            })
        }

        let embedding_idx = (rng.rand_u64() % self.embeddings.len() as u64) as usize;
        Ok(TrialConfig {
            embedding_type: self.embeddings[embedding_idx],
            hidden_size: rule(&self.hidden_size, "hidden_size")?.sample(rng)?.round() as usize,
            rnn_layers: rule(&self.rnn_layers, "rnn_layers")?.sample(rng)?.round() as usize,
            dropout: rule(&self.dropout, "dropout")?.sample(rng)?,
            learning_rate: rule(&self.learning_rate, "learning_rate")?.sample(rng)?,
            mini_batch_size: rule(&self.mini_batch_size, "mini_batch_size")?
                .sample(rng)?
                .round() as usize,
        })
    }
}

impl Default for SearchSpace {
    fn default() -> Self {
        Self::new()
    }
}

/// One sampled configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrialConfig {
    pub embedding_type: EmbeddingType,
    pub hidden_size: usize,
    pub rnn_layers: usize,
    pub dropout: f64,
    pub learning_rate: f64,
    pub mini_batch_size: usize,
}

impl TrialConfig {
    fn tagger_config(&self) -> TaggerConfig {
        TaggerConfig {
            embedding_type: self.embedding_type,
            hidden_size: self.hidden_size,
            rnn_layers: self.rnn_layers,
            dropout: self.dropout,
        }
    }
}

/// Outcome of one trial.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrialRecord {
    pub trial: usize,
    pub config: TrialConfig,
    /// Mean dev micro-F1 over the trial's training runs; negative infinity
    /// for a failed trial.
    pub score: f64,
    pub error: Option<String>,
}

/// Full search outcome, also rendered to `param_selection.txt`.
#[derive(Debug, Clone)]
pub struct SearchReport {
    pub trials: Vec<TrialRecord>,
    pub best_trial: Option<usize>,
}

/// Runs bounded random search and persists the report.
pub struct ParamSelector {
    base_path: PathBuf,
    max_epochs: usize,
    training_runs: usize,
    seed: u64,
}

impl ParamSelector {
    /// `base_path` is the `hyperparameter_search/<model_name>` directory.
    pub fn new(base_path: &Path, max_epochs: usize, training_runs: usize, seed: u64) -> Self {
        Self {
            base_path: base_path.to_path_buf(),
            max_epochs,
            training_runs: training_runs.max(1),
            seed,
        }
    }

    /// Run `max_evals` trials and write `param_selection.txt`.
    ///
    /// Duplicate configurations are re-sampled up to a fixed limit; if the
    /// space is too small to yield a fresh configuration the duplicate is
    /// kept, so the report always holds exactly `max_evals` records.
    pub fn optimize(
        &self,
        space: &SearchSpace,
        corpus: &Corpus,
        dictionary: &TagDictionary,
        max_evals: usize,
    ) -> Result<SearchReport> {
        space.validate()?;
        if max_evals == 0 {
            return Err(EtiketError::Config("max_evals must be at least 1".into()));
        }

        let mut rng = oorandom::Rand64::new(self.seed as u128);
        let mut trials: Vec<TrialRecord> = Vec::with_capacity(max_evals);

        for trial_no in 0..max_evals {
            let mut config = space.sample(&mut rng)?;
            for _ in 0..DUPLICATE_RESAMPLE_LIMIT {
                if !trials.iter().any(|t| t.config == config) {
                    break;
                }
                config = space.sample(&mut rng)?;
            }

            let record = match self.run_trial(&config, corpus, dictionary, trial_no) {
                Ok(score) => TrialRecord {
                    trial: trial_no,
                    config,
                    score,
                    error: None,
                },
                Err(e) => {
                    warn!(trial = trial_no, error = %e, "trial failed, recording and continuing");
                    TrialRecord {
                        trial: trial_no,
                        config,
                        score: f64::NEG_INFINITY,
                        error: Some(e.to_string()),
                    }
                }
            };
            info!(trial = trial_no, score = record.score, "trial finished");
            trials.push(record);
        }

        let best_trial = trials
            .iter()
            .filter(|t| t.score.is_finite())
            .max_by(|a, b| a.score.total_cmp(&b.score))
            .map(|t| t.trial);

        let report = SearchReport { trials, best_trial };
        self.write_report(&report)?;
        Ok(report)
    }

    /// One trial: average dev micro-F1 over `training_runs` short runs.
    fn run_trial(
        &self,
        config: &TrialConfig,
        corpus: &Corpus,
        dictionary: &TagDictionary,
        trial_no: usize,
    ) -> Result<f64> {
        let tagger_config = config.tagger_config();
        tagger_config.validate().map_err(|e| {
            EtiketError::Trial(format!("invalid sampled configuration: {}", e))
        })?;

        let mut scores = Vec::with_capacity(self.training_runs);
        for run in 0..self.training_runs {
            let mut tagger = SequenceTagger::new(tagger_config.clone(), dictionary)
                .map_err(|e| EtiketError::Trial(e.to_string()))?;
            let mut optimizer = Optimizer::new(
                OptimizerKind::Sgd,
                config.learning_rate,
                tagger.crf().params().len(),
            );
            let mut rng = oorandom::Rand64::new(
                (self.seed ^ (trial_no as u64).wrapping_mul(0x9e37_79b9)) as u128 + run as u128,
            );
            let extractor = tagger.extractor().clone();

            for _epoch in 0..self.max_epochs {
                for sentence in &corpus.train {
                    if sentence.is_empty() {
                        continue;
                    }
                    let features =
                        extractor.extract_with_dropout(&sentence.tokens, config.dropout, &mut rng);
                    let gold: Vec<usize> = sentence
                        .labels
                        .iter()
                        .map(|l| dictionary.index_or_unk(l))
                        .collect();
                    let crf = tagger.crf_mut();
                    let predicted = crf
                        .predict(&features)
                        .map_err(|e| EtiketError::Trial(e.to_string()))?;
                    let grad = crf.margin_gradient(&features, &gold, &predicted);
                    optimizer.apply(crf.params_mut(), &grad);
                }
            }

            let dev = if corpus.dev.is_empty() {
                &corpus.train
            } else {
                &corpus.dev
            };
            let report = metrics::evaluate(&tagger, dev, dictionary)
                .map_err(|e| EtiketError::Trial(e.to_string()))?;
            scores.push(report.micro_f1);
        }

        Ok(scores.iter().sum::<f64>() / scores.len() as f64)
    }

    fn write_report(&self, report: &SearchReport) -> Result<()> {
        std::fs::create_dir_all(&self.base_path)?;

        let mut out = String::new();
        for record in &report.trials {
            let _ = writeln!(out, "evaluation run {}", record.trial + 1);
            let _ = writeln!(out, "\tembedding_type: {}", record.config.embedding_type);
            let _ = writeln!(out, "\thidden_size: {}", record.config.hidden_size);
            let _ = writeln!(out, "\trnn_layers: {}", record.config.rnn_layers);
            let _ = writeln!(out, "\tdropout: {}", record.config.dropout);
            let _ = writeln!(out, "\tlearning_rate: {}", record.config.learning_rate);
            let _ = writeln!(out, "\tmini_batch_size: {}", record.config.mini_batch_size);
            let _ = match &record.error {
                Some(err) => writeln!(out, "\tresult: failed ({})", err),
                None => writeln!(out, "\tdev score: {:.4}", record.score),
            };
            let _ = writeln!(out, "{}", "-".repeat(40));
        }
        let _ = match report.best_trial {
            Some(best) => writeln!(out, "best evaluation run: {}", best + 1),
            None => writeln!(out, "no successful evaluation run"),
        };

        let path = self.base_path.join("param_selection.txt");
        std::fs::write(&path, out)?;
        info!(path = %path.display(), "search report written");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use etiket_core::corpus::Sentence;
    use std::path::PathBuf;

    fn sentence(tokens: &[&str], labels: &[&str]) -> Sentence {
        Sentence::new(
            tokens.iter().map(|s| s.to_string()).collect(),
            labels.iter().map(|s| s.to_string()).collect(),
        )
    }

    fn tiny_corpus() -> Corpus {
        let train = vec![
            sentence(&["Ali", "geldi"], &["B-PER", "O"]),
            sentence(&["dün", "yağdı"], &["O", "O"]),
        ];
        let dev = vec![sentence(&["Ali", "gitti"], &["B-PER", "O"])];
        Corpus::from_splits(train, dev, Vec::new(), "ner")
    }

    fn temp_search_dir(label: &str) -> PathBuf {
        let dir = std::env::temp_dir().join(format!(
            "etiket-search-{}-{}",
            label,
            std::process::id()
        ));
        std::fs::create_dir_all(&dir).unwrap();
        dir
    }

    #[test]
    fn sampling_rules_respect_ranges() {
        let mut rng = oorandom::Rand64::new(5);
        let uniform = SamplingRule::Uniform {
            low: 0.2,
            high: 0.8,
        };
        let log_uniform = SamplingRule::LogUniform {
            low: 1e-4,
            high: 1.0,
        };
        for _ in 0..100 {
            let u = uniform.sample(&mut rng).unwrap();
            assert!((0.2..0.8).contains(&u));
            let l = log_uniform.sample(&mut rng).unwrap();
            assert!(l >= 1e-4 && l <= 1.0);
        }
    }

    #[test]
    fn choice_rule_only_emits_options() {
        let mut rng = oorandom::Rand64::new(11);
        let rule = SamplingRule::Choice(vec![32.0, 64.0]);
        for _ in 0..50 {
            let v = rule.sample(&mut rng).unwrap();
            assert!(v == 32.0 || v == 64.0);
        }
    }

    #[test]
    fn incomplete_space_fails_validation() {
        let mut space = SearchSpace::standard(EmbeddingType::Char, 0.05);
        space.dropout = None;
        let err = space.validate().unwrap_err();
        assert!(err.to_string().contains("dropout"));

        let mut space = SearchSpace::standard(EmbeddingType::Char, 0.05);
        space.embeddings.clear();
        assert!(space.validate().is_err());
    }

    #[test]
    fn optimize_records_exactly_max_evals_trials() {
        let corpus = tiny_corpus();
        let dictionary = corpus.make_tag_dictionary();
        let dir = temp_search_dir("count");
        let selector = ParamSelector::new(&dir, 1, 1, 42);
        let space = SearchSpace::standard(EmbeddingType::Char, 0.1);

        let report = selector
            .optimize(&space, &corpus, &dictionary, 5)
            .unwrap();

        assert_eq!(report.trials.len(), 5);
        assert!(report.best_trial.is_some());
        assert!(dir.join("param_selection.txt").exists());

        let rendered = std::fs::read_to_string(dir.join("param_selection.txt")).unwrap();
        assert_eq!(rendered.matches("evaluation run ").count(), 5);

        std::fs::remove_dir_all(&dir).ok();
    }

    #[test]
    fn duplicate_configurations_are_resampled() {
        let corpus = tiny_corpus();
        let dictionary = corpus.make_tag_dictionary();
        let dir = temp_search_dir("dedupe");
        let selector = ParamSelector::new(&dir, 1, 1, 7);
        // Space large enough that 5 distinct samples exist.
        let space = SearchSpace::standard(EmbeddingType::Char, 0.1);

        let report = selector
            .optimize(&space, &corpus, &dictionary, 5)
            .unwrap();

        for (i, a) in report.trials.iter().enumerate() {
            for b in report.trials.iter().skip(i + 1) {
                assert_ne!(a.config, b.config, "trials {} and {}", a.trial, b.trial);
            }
        }

        std::fs::remove_dir_all(&dir).ok();
    }

    #[test]
    fn zero_evals_is_config_error() {
        let corpus = tiny_corpus();
        let dictionary = corpus.make_tag_dictionary();
        let dir = temp_search_dir("zero");
        let selector = ParamSelector::new(&dir, 1, 1, 1);
        let space = SearchSpace::standard(EmbeddingType::Char, 0.1);

        let err = selector
            .optimize(&space, &corpus, &dictionary, 0)
            .unwrap_err();
        assert!(matches!(err, EtiketError::Config(_)));

        std::fs::remove_dir_all(&dir).ok();
    }
}
