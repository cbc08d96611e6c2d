//! End-to-end lifecycle tests: train, resume, and evaluate through the
//! experiment runner, against a small synthetic column-format corpus on
//! disk.

use std::path::PathBuf;

use etiket_core::error::EtiketError;
use etiket_core::model::EmbeddingType;
use etiket_core::tags::{TagDictionary, UNK_TAG};
use etiket_trainer::params::{ArtifactPaths, DeviceKind, OptimizerKind, RunParameters};
use etiket_trainer::runner::{ExperimentRunner, Phase};

/// Ten two-token sentences over exactly two distinct tags.
const TRAIN: &str = "\
Ali tag1
geldi tag2

Ayşe tag1
gitti tag2

Veli tag1
uyudu tag2

Can tag1
koştu tag2

Ece tag1
durdu tag2

Ali tag1
gitti tag2

Ayşe tag1
uyudu tag2

Veli tag1
koştu tag2

Can tag1
durdu tag2

Ece tag1
geldi tag2
";

const DEV: &str = "\
Ali tag1
koştu tag2
";

const TEST: &str = "\
Veli tag1
geldi tag2
";

/// Test split carrying a label never seen during training.
const ALTERNATE_TEST: &str = "\
Acme tag3
geldi tag2
";

struct Fixture {
    root: PathBuf,
    data_folder: PathBuf,
    output: PathBuf,
}

impl Fixture {
    fn new(label: &str) -> Self {
        let root = std::env::temp_dir().join(format!(
            "etiket-lifecycle-{}-{}",
            label,
            std::process::id()
        ));
        let data_folder = root.join("data");
        let output = root.join("model");
        std::fs::create_dir_all(&data_folder).unwrap();

        std::fs::write(data_folder.join("corpus.train"), TRAIN).unwrap();
        std::fs::write(data_folder.join("corpus.dev"), DEV).unwrap();
        std::fs::write(data_folder.join("corpus.test"), TEST).unwrap();

        Self {
            root,
            data_folder,
            output,
        }
    }

    fn params(&self, max_epochs: usize) -> RunParameters {
        RunParameters {
            model_name: "lifecycle_test".into(),
            embedding_type: EmbeddingType::Char,
            tag_type: "ner".into(),
            bert_model_dirpath_or_name: "bert-base-multilingual-cased".into(),
            model_output_dirpath: self.output.clone(),
            optimizer: OptimizerKind::Adam,
            learning_rate: 0.1,
            max_epochs,
            mini_batch_size: 16,
            device: DeviceKind::Cpu,
        }
    }

    fn runner(&self, max_epochs: usize) -> ExperimentRunner {
        ExperimentRunner::new(self.params(max_epochs), &self.data_folder).unwrap()
    }

    fn paths(&self) -> ArtifactPaths {
        ArtifactPaths::new(&self.output)
    }
}

impl Drop for Fixture {
    fn drop(&mut self) {
        std::fs::remove_dir_all(&self.root).ok();
    }
}

#[test]
fn train_persists_all_artifacts() {
    let fixture = Fixture::new("train");
    fixture.runner(3).run(Phase::Train).unwrap();

    let paths = fixture.paths();
    assert!(paths.final_model().exists());
    assert!(paths.checkpoint().exists());
    assert!(paths.loss_log().exists());

    // Dictionary holds exactly the two training tags plus the unknown slot.
    let dictionary = TagDictionary::load(&paths.tag_dictionary()).unwrap();
    assert_eq!(dictionary.tags(), [UNK_TAG, "tag1", "tag2"]);

    // params.json round-trips the configured learning rate.
    let raw: serde_json::Value =
        serde_json::from_str(&std::fs::read_to_string(paths.params()).unwrap()).unwrap();
    assert_eq!(raw["learning_rate"].as_f64(), Some(0.1));
    assert_eq!(raw["optimizer"].as_str(), Some("adam"));
}

#[test]
fn resume_picks_up_from_recorded_epoch() {
    let fixture = Fixture::new("resume");

    // Short run leaves a checkpoint at epoch 2.
    fixture.runner(2).run(Phase::Train).unwrap();
    let paths = fixture.paths();
    let before: serde_json::Value =
        serde_json::from_str(&std::fs::read_to_string(paths.checkpoint()).unwrap()).unwrap();
    assert_eq!(before["completed_epochs"].as_u64(), Some(2));

    // Bump max_epochs in the recorded params, then resume.
    let mut recorded = RunParameters::load(&paths.params()).unwrap();
    recorded.max_epochs = 4;
    recorded.save(&paths.params()).unwrap();

    fixture.runner(4).run(Phase::ResumeTrain).unwrap();
    let after: serde_json::Value =
        serde_json::from_str(&std::fs::read_to_string(paths.checkpoint()).unwrap()).unwrap();
    assert_eq!(after["completed_epochs"].as_u64(), Some(4));
}

#[test]
fn evaluate_writes_report_from_own_test_split() {
    let fixture = Fixture::new("evaluate");
    fixture.runner(3).run(Phase::Train).unwrap();
    fixture
        .runner(3)
        .run(Phase::Evaluate {
            other_test_file: None,
        })
        .unwrap();

    let report = std::fs::read_to_string(fixture.paths().evaluation()).unwrap();
    assert!(report.contains("accuracy"));
    assert!(report.contains("tag1"));
}

#[test]
fn evaluate_with_alternate_file_maps_unseen_labels_to_unk() {
    let fixture = Fixture::new("alternate");
    fixture.runner(3).run(Phase::Train).unwrap();

    let alternate = fixture.data_folder.join("alternate.test");
    std::fs::write(&alternate, ALTERNATE_TEST).unwrap();

    // tag3 is not in the persisted dictionary; evaluation must not grow the
    // dictionary or fail on it.
    fixture
        .runner(3)
        .run(Phase::Evaluate {
            other_test_file: Some(alternate),
        })
        .unwrap();

    let dictionary = TagDictionary::load(&fixture.paths().tag_dictionary()).unwrap();
    assert_eq!(dictionary.tags(), [UNK_TAG, "tag1", "tag2"]);

    let report = std::fs::read_to_string(fixture.paths().evaluation()).unwrap();
    assert!(report.contains(UNK_TAG));
}

#[test]
fn evaluate_after_deleting_dictionary_is_fatal() {
    let fixture = Fixture::new("deleted-dict");
    fixture.runner(2).run(Phase::Train).unwrap();
    std::fs::remove_file(fixture.paths().tag_dictionary()).unwrap();

    let err = fixture
        .runner(2)
        .run(Phase::Evaluate {
            other_test_file: None,
        })
        .unwrap_err();
    assert!(matches!(err, EtiketError::Config(_)));
}

#[test]
fn hyperparameter_search_writes_bounded_report() {
    let fixture = Fixture::new("search");
    let search_root = fixture.root.join("search");

    // The search root is injected so the report lands under the fixture,
    // without touching process-wide state like the working directory.
    fixture
        .runner(2)
        .with_search_root(&search_root)
        .run(Phase::HyperparameterSearch { max_evals: 3 })
        .unwrap();

    let report =
        std::fs::read_to_string(search_root.join("lifecycle_test/param_selection.txt")).unwrap();
    assert_eq!(report.matches("evaluation run ").count(), 3);
    assert!(report.contains("best evaluation run"));
}
