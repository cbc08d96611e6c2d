//! # Experiment Runner
//!
//! Owns one invocation's [`RunParameters`], selects the requested lifecycle
//! phase, and drives corpus loading, model building, training, search, and
//! evaluation. Every artifact lands in a deterministic layout under the
//! run's output directory so any phase can be resumed or audited later.

use std::path::{Path, PathBuf};

use tracing::info;

use etiket_core::corpus::{ColumnFormat, Corpus};
use etiket_core::error::Result;
use etiket_core::model::SequenceTagger;
use etiket_core::tags::TagDictionary;

use crate::checkpoint::CheckpointState;
use crate::metrics;
use crate::params::{ArtifactPaths, RunParameters};
use crate::search::{ParamSelector, SearchSpace};
use crate::trainer::{DEFAULT_SHUFFLE_SEED, ModelTrainer};

/// Fraction of the training split kept during hyperparameter search.
pub const SEARCH_DOWNSAMPLE: f64 = 0.1;
/// Default number of search trials.
pub const SEARCH_MAX_EVALS: usize = 10;
/// Epochs per search trial.
pub const SEARCH_MAX_EPOCHS: usize = 5;
/// Training runs averaged per trial.
pub const SEARCH_TRAINING_RUNS: usize = 3;
/// Default learning-rate sweep length.
pub const LR_FIND_ITERATIONS: usize = 400;
/// Learning-rate sweep bounds.
pub const LR_FIND_START: f64 = 1e-7;
pub const LR_FIND_END: f64 = 10.0;

/// The closed set of lifecycle phases, each carrying exactly the inputs it
/// needs beyond the shared run parameters.
#[derive(Debug, Clone, PartialEq)]
pub enum Phase {
    HyperparameterSearch { max_evals: usize },
    FindLearningRate { iterations: usize },
    Train,
    ResumeTrain,
    Evaluate { other_test_file: Option<PathBuf> },
}

/// Drives one lifecycle phase start-to-finish.
#[derive(Debug)]
pub struct ExperimentRunner {
    params: RunParameters,
    data_folder: PathBuf,
    search_root: PathBuf,
}

impl ExperimentRunner {
    pub fn new(params: RunParameters, data_folder: &Path) -> Result<Self> {
        params.validate()?;
        Ok(Self {
            params,
            data_folder: data_folder.to_path_buf(),
            search_root: PathBuf::from("hyperparameter_search"),
        })
    }

    /// Override where search and sweep reports land. The report directory
    /// for a run is `<search_root>/<model_name>/`.
    pub fn with_search_root(mut self, root: &Path) -> Self {
        self.search_root = root.to_path_buf();
        self
    }

    pub fn params(&self) -> &RunParameters {
        &self.params
    }

    fn search_dir(&self) -> PathBuf {
        self.search_root.join(&self.params.model_name)
    }

    /// Execute the requested phase. Fatal errors surface immediately; only
    /// individual search trials are isolated.
    pub fn run(&self, phase: Phase) -> Result<()> {
        info!(
            model = %self.params.model_name,
            device = %self.params.device,
            "starting phase {:?}", phase
        );
        match phase {
            Phase::HyperparameterSearch { max_evals } => self.hyperparameter_search(max_evals),
            Phase::FindLearningRate { iterations } => self.find_learning_rate(iterations),
            Phase::Train => self.train(),
            Phase::ResumeTrain => self.resume_train(),
            Phase::Evaluate { other_test_file } => self.evaluate(other_test_file.as_deref()),
        }
    }

    fn load_corpus(&self, tag_type: &str) -> Result<Corpus> {
        let format = ColumnFormat::single_layer(tag_type);
        let corpus = Corpus::load_folder(&self.data_folder, &format, tag_type)?;
        info!("corpus statistics:\n{}", corpus.obtain_statistics());
        Ok(corpus)
    }

    fn hyperparameter_search(&self, max_evals: usize) -> Result<()> {
        let mut corpus = self.load_corpus(&self.params.tag_type)?;
        corpus.downsample(SEARCH_DOWNSAMPLE, true, DEFAULT_SHUFFLE_SEED)?;
        let dictionary = corpus.make_tag_dictionary();

        let space = SearchSpace::standard(self.params.embedding_type, self.params.learning_rate);
        let base_path = self.search_dir();
        let selector = ParamSelector::new(
            &base_path,
            SEARCH_MAX_EPOCHS,
            SEARCH_TRAINING_RUNS,
            DEFAULT_SHUFFLE_SEED,
        );
        let report = selector.optimize(&space, &corpus, &dictionary, max_evals)?;

        info!(
            trials = report.trials.len(),
            best = ?report.best_trial,
            "now inspect {} to pick the best hyperparameters",
            base_path.join("param_selection.txt").display()
        );
        Ok(())
    }

    fn find_learning_rate(&self, iterations: usize) -> Result<()> {
        let corpus = self.load_corpus(&self.params.tag_type)?;
        let dictionary = corpus.make_tag_dictionary();
        let tagger = SequenceTagger::new(self.params.tagger_config(), &dictionary)?;
        let trainer = ModelTrainer::new(tagger, self.params.optimizer, self.params.learning_rate);

        trainer.find_learning_rate(
            &corpus,
            &dictionary,
            &self.params,
            &self.search_dir(),
            iterations,
            LR_FIND_START,
            LR_FIND_END,
        )?;
        Ok(())
    }

    fn train(&self) -> Result<()> {
        let corpus = self.load_corpus(&self.params.tag_type)?;
        let dictionary = corpus.make_tag_dictionary();
        let paths = ArtifactPaths::new(&self.params.model_output_dirpath);
        std::fs::create_dir_all(paths.base())?;

        // Persist dictionary and parameters before the first epoch: a crash
        // mid-training must still leave reproducible configuration on disk.
        dictionary.save(&paths.tag_dictionary())?;
        self.params.save(&paths.params())?;

        let tagger = SequenceTagger::new(self.params.tagger_config(), &dictionary)?;
        let mut trainer =
            ModelTrainer::new(tagger, self.params.optimizer, self.params.learning_rate);
        trainer.train(&corpus, &dictionary, &self.params, &paths, true)?;
        Ok(())
    }

    fn resume_train(&self) -> Result<()> {
        let paths = ArtifactPaths::new(&self.params.model_output_dirpath);

        // The recorded run configuration wins over whatever the CLI passed.
        let recorded = RunParameters::load(&paths.params())?;
        let dictionary = TagDictionary::load(&paths.tag_dictionary())?;
        let checkpoint = CheckpointState::load(&paths.checkpoint())?;
        let corpus = self.load_corpus(&recorded.tag_type)?;

        let mut trainer = ModelTrainer::from_checkpoint(checkpoint, &dictionary)?;
        info!(
            completed = trainer.completed_epochs(),
            max_epochs = recorded.max_epochs,
            "resuming training"
        );
        trainer.train(&corpus, &dictionary, &recorded, &paths, true)?;
        Ok(())
    }

    fn evaluate(&self, other_test_file: Option<&Path>) -> Result<()> {
        let paths = ArtifactPaths::new(&self.params.model_output_dirpath);

        let recorded = RunParameters::load(&paths.params())?;
        // The dictionary must come from the persisted artifact. Alternate
        // test data may contain unseen labels; those map to the unknown
        // slot and never expand the dictionary. A missing dictionary file
        // is fatal here.
        let dictionary = TagDictionary::load(&paths.tag_dictionary())?;
        let tagger = SequenceTagger::load(&paths.final_model())?;

        let format = ColumnFormat::single_layer(&recorded.tag_type);
        let corpus = match other_test_file {
            Some(file) => Corpus::load_test_only(file, &format, &recorded.tag_type)?,
            None => Corpus::load_folder(&self.data_folder, &format, &recorded.tag_type)?,
        };

        let report = metrics::evaluate(&tagger, &corpus.test, &dictionary)?;
        std::fs::write(paths.evaluation(), report.to_string())?;
        info!(
            accuracy = report.accuracy,
            micro_f1 = report.micro_f1,
            path = %paths.evaluation().display(),
            "evaluation report written"
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::params::{DeviceKind, OptimizerKind};
    use etiket_core::error::EtiketError;
    use etiket_core::model::EmbeddingType;

    fn params(output: &Path) -> RunParameters {
        RunParameters {
            model_name: "runner_test".into(),
            embedding_type: EmbeddingType::Char,
            tag_type: "ner".into(),
            bert_model_dirpath_or_name: "bert-base-multilingual-cased".into(),
            model_output_dirpath: output.to_path_buf(),
            optimizer: OptimizerKind::Sgd,
            learning_rate: 0.05,
            max_epochs: 1,
            mini_batch_size: 16,
            device: DeviceKind::Cpu,
        }
    }

    fn temp_dir(label: &str) -> PathBuf {
        let dir = std::env::temp_dir().join(format!(
            "etiket-runner-{}-{}",
            label,
            std::process::id()
        ));
        std::fs::create_dir_all(&dir).unwrap();
        dir
    }

    #[test]
    fn invalid_params_are_rejected_at_construction() {
        let dir = temp_dir("invalid");
        let mut bad = params(&dir);
        bad.learning_rate = -1.0;
        let err = ExperimentRunner::new(bad, &dir).unwrap_err();
        assert!(matches!(err, EtiketError::Config(_)));
        std::fs::remove_dir_all(&dir).ok();
    }

    #[test]
    fn evaluate_without_artifacts_is_fatal() {
        let dir = temp_dir("no-artifacts");
        let runner = ExperimentRunner::new(params(&dir), &dir).unwrap();
        let err = runner
            .run(Phase::Evaluate {
                other_test_file: None,
            })
            .unwrap_err();
        assert!(matches!(err, EtiketError::Config(_)));
        std::fs::remove_dir_all(&dir).ok();
    }

    #[test]
    fn evaluate_without_tag_dictionary_is_fatal() {
        // params.json present but the dictionary artifact missing: the
        // runner must stop, not continue with an empty dictionary.
        let dir = temp_dir("no-dict");
        let run_params = params(&dir);
        let paths = ArtifactPaths::new(&dir);
        run_params.save(&paths.params()).unwrap();

        let runner = ExperimentRunner::new(run_params, &dir).unwrap();
        let err = runner
            .run(Phase::Evaluate {
                other_test_file: None,
            })
            .unwrap_err();
        match err {
            EtiketError::Config(msg) => assert!(msg.contains("tag dictionary")),
            other => panic!("expected Config error, got {:?}", other),
        }
        std::fs::remove_dir_all(&dir).ok();
    }

    #[test]
    fn resume_without_prior_run_is_fatal() {
        let dir = temp_dir("no-resume");
        let runner = ExperimentRunner::new(params(&dir), &dir).unwrap();
        let err = runner.run(Phase::ResumeTrain).unwrap_err();
        assert!(matches!(err, EtiketError::Config(_)));
        std::fs::remove_dir_all(&dir).ok();
    }

    #[test]
    fn train_without_data_folder_is_fatal() {
        let dir = temp_dir("no-data");
        let missing = dir.join("does-not-exist");
        let runner = ExperimentRunner::new(params(&dir), &missing).unwrap();
        let err = runner.run(Phase::Train).unwrap_err();
        assert!(matches!(err, EtiketError::Config(_)));
        std::fs::remove_dir_all(&dir).ok();
    }
}
