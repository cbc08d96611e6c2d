//! # Etiket Trainer
//!
//! The experiment lifecycle for etiket sequence taggers: run parameters and
//! their on-disk layout, optimizers, per-epoch checkpointing, training and
//! resumption, evaluation reports, the learning-rate finder, and bounded
//! hyperparameter search. The `train` binary is the single CLI entry point.

pub mod checkpoint;
pub mod metrics;
pub mod optim;
pub mod params;
pub mod runner;
pub mod search;
pub mod trainer;

pub use checkpoint::CheckpointState;
pub use metrics::{EvaluationReport, TagMetrics};
pub use optim::Optimizer;
pub use params::{ArtifactPaths, DeviceKind, OptimizerKind, RunParameters};
pub use runner::{ExperimentRunner, Phase};
pub use search::{ParamSelector, SamplingRule, SearchReport, SearchSpace, TrialConfig};
pub use trainer::{ModelTrainer, TrainingSummary};
