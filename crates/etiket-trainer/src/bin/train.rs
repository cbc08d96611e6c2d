//! Etiket training CLI
//!
//! Single entry point for the experiment lifecycle: hyperparameter search,
//! learning-rate finding, training, resumption, and evaluation of a
//! sequence tagger over a column-format corpus.

use std::path::PathBuf;

use anyhow::Result;
use clap::{Parser, ValueEnum};
use tracing::error;

use etiket_core::model::EmbeddingType;
use etiket_trainer::params::{DeviceKind, OptimizerKind, RunParameters};
use etiket_trainer::runner::{
    ExperimentRunner, LR_FIND_ITERATIONS, Phase, SEARCH_MAX_EVALS,
};

/// Lifecycle phase to execute.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum CommandArg {
    #[value(name = "hyperparameter_search")]
    HyperparameterSearch,
    #[value(name = "find_learning_rate")]
    FindLearningRate,
    Train,
    #[value(name = "resume_train")]
    ResumeTrain,
    Evaluate,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum EmbeddingArg {
    Bert,
    Flair,
    Char,
}

impl From<EmbeddingArg> for EmbeddingType {
    fn from(arg: EmbeddingArg) -> Self {
        match arg {
            EmbeddingArg::Bert => EmbeddingType::Bert,
            EmbeddingArg::Flair => EmbeddingType::Flair,
            EmbeddingArg::Char => EmbeddingType::Char,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum OptimizerArg {
    Sgd,
    Adam,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum DeviceArg {
    Cpu,
    Gpu,
}

/// CLI arguments
#[derive(Parser)]
#[command(name = "train")]
#[command(about = "Train and evaluate sequence taggers over column-format corpora")]
#[command(version)]
struct Cli {
    /// Lifecycle phase to run
    #[arg(long = "command", value_enum)]
    command: CommandArg,

    /// Embedding family; required for phases that build a model
    #[arg(long = "embedding_type", value_enum)]
    embedding_type: Option<EmbeddingArg>,

    /// Name of the model; also names the default output directory
    #[arg(long = "model_name", default_value = "default_model_name")]
    model_name: String,

    /// Pretrained BERT identifier or local directory
    #[arg(
        long = "bert_model_dirpath_or_name",
        default_value = "bert-base-multilingual-cased"
    )]
    bert_model_dirpath_or_name: String,

    /// Output directory; defaults to ./models/<model_name>
    #[arg(long = "model_output_dirpath")]
    model_output_dirpath: Option<PathBuf>,

    /// Alternate column-format test file for evaluation
    #[arg(long = "other_test_file_for_evaluation")]
    other_test_file_for_evaluation: Option<PathBuf>,

    /// Optimizer selector
    #[arg(long = "optimizer", value_enum, default_value = "sgd")]
    optimizer: OptimizerArg,

    #[arg(long = "learning_rate", default_value_t = 0.05)]
    learning_rate: f64,

    #[arg(long = "max_epochs", default_value_t = 10)]
    max_epochs: usize,

    #[arg(long = "mini_batch_size", default_value_t = 16)]
    mini_batch_size: usize,

    /// Folder holding the .train/.dev/.test corpus files
    #[arg(long = "data_folder", default_value = "./data")]
    data_folder: PathBuf,

    /// Compute device, threaded through the run explicitly
    #[arg(long = "device", value_enum, default_value = "gpu")]
    device: DeviceArg,
}

fn main() {
    tracing_subscriber::fmt().with_target(false).init();

    if let Err(e) = run() {
        error!("{:#}", e);
        std::process::exit(1);
    }
}

fn run() -> Result<()> {
    let cli = Cli::parse();

    let embedding_type = match (cli.command, cli.embedding_type) {
        (
            CommandArg::HyperparameterSearch | CommandArg::FindLearningRate | CommandArg::Train,
            None,
        ) => anyhow::bail!("--embedding_type is required for the {:?} phase", cli.command),
        // Resume and evaluate read the recorded parameters from disk; the
        // CLI value is only a placeholder there.
        (_, choice) => choice.map(EmbeddingType::from).unwrap_or(EmbeddingType::Char),
    };

    let model_output_dirpath = cli
        .model_output_dirpath
        .unwrap_or_else(|| PathBuf::from("./models").join(&cli.model_name));

    let params = RunParameters {
        model_name: cli.model_name,
        embedding_type,
        tag_type: RunParameters::DEFAULT_TAG_TYPE.to_string(),
        bert_model_dirpath_or_name: cli.bert_model_dirpath_or_name,
        model_output_dirpath,
        optimizer: match cli.optimizer {
            OptimizerArg::Sgd => OptimizerKind::Sgd,
            OptimizerArg::Adam => OptimizerKind::Adam,
        },
        learning_rate: cli.learning_rate,
        max_epochs: cli.max_epochs,
        mini_batch_size: cli.mini_batch_size,
        device: match cli.device {
            DeviceArg::Cpu => DeviceKind::Cpu,
            DeviceArg::Gpu => DeviceKind::Gpu,
        },
    };

    let phase = match cli.command {
        CommandArg::HyperparameterSearch => Phase::HyperparameterSearch {
            max_evals: SEARCH_MAX_EVALS,
        },
        CommandArg::FindLearningRate => Phase::FindLearningRate {
            iterations: LR_FIND_ITERATIONS,
        },
        CommandArg::Train => Phase::Train,
        CommandArg::ResumeTrain => Phase::ResumeTrain,
        CommandArg::Evaluate => Phase::Evaluate {
            other_test_file: cli.other_test_file_for_evaluation,
        },
    };

    let runner = ExperimentRunner::new(params, &cli.data_folder)?;
    runner.run(phase)?;
    Ok(())
}
